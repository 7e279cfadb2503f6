//! Incremental sort.
//!
//! The view keeps a shadow list of containers ordered by `(key, source
//! index)`. Each container caches its key, so locating it again is a binary
//! search even after the item's live key has changed; the source index
//! breaks ties so equal keys keep their source order regardless of history.

use crate::container::{ContainerList, ItemContainer};
use crate::view::{contract_violation, observe, out_of_range, DerivedView, Upstream};
use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::RefCell;
use core::cmp::Ordering;
use rivulet_core::{ChangeEvent, Error, ReadList};
use rivulet_reactive::{
    ChangeListener, CountListener, EventHub, ListRef, ObservableList, Property, Subscription,
    Trigger,
};

const VIEW: &str = "SortedList";

type KeyFn<T, K> = Rc<dyn Fn(&T) -> K>;
type CompareFn<K> = Rc<dyn Fn(&K, &K) -> Ordering>;
type Slot<T, K> = Rc<ItemContainer<T, K>>;

struct SortState<T, K> {
    entries: ContainerList<T, K>,
    sorted: Vec<Slot<T, K>>,
}

/// A live view of the source ordered by a key.
///
/// Items with equal keys appear in source order.
pub struct SortedList<T, K> {
    this: Weak<Self>,
    source: ListRef<T>,
    key_of: KeyFn<T, K>,
    compare: CompareFn<K>,
    trigger: Option<Trigger<T>>,
    state: RefCell<SortState<T, K>>,
    hub: EventHub<T>,
    upstream: Upstream,
}

impl<T: Clone + 'static> SortedList<T, T> {
    /// Sorts items by comparing them directly.
    pub fn by_comparison<C>(source: ListRef<T>, compare: C) -> Rc<Self>
    where
        C: Fn(&T, &T) -> Ordering + 'static,
    {
        Self::new(source, T::clone, compare, None)
    }
}

impl<T: Clone + 'static, K: Ord + 'static> SortedList<T, K> {
    /// Sorts items by a key in natural order.
    pub fn by_key<F>(source: ListRef<T>, key: F) -> Rc<Self>
    where
        F: Fn(&T) -> K + 'static,
    {
        Self::new(source, key, K::cmp, None)
    }
}

impl<T: Clone + 'static, K: Ord + Clone + 'static> SortedList<T, K> {
    /// Sorts items by a key that is itself observable; setting an item's key
    /// property re-positions that item.
    pub fn by_dynamic_key<F>(source: ListRef<T>, selector: F) -> Rc<Self>
    where
        F: Fn(&T) -> Property<K> + 'static,
    {
        let selector = Rc::new(selector);
        let watch = selector.clone();
        Self::new(
            source,
            move |item: &T| selector(item).get(),
            K::cmp,
            Some(Trigger::on_property(move |item: &T| watch(item))),
        )
    }
}

impl<T: Clone + 'static, K: 'static> SortedList<T, K> {
    /// Sorts items by a key under a custom ordering.
    pub fn by_key_with<F, C>(source: ListRef<T>, key: F, compare: C) -> Rc<Self>
    where
        F: Fn(&T) -> K + 'static,
        C: Fn(&K, &K) -> Ordering + 'static,
    {
        Self::new(source, key, compare, None)
    }

    /// Creates a sorted view; with a trigger, an item is re-keyed and
    /// re-positioned whenever the trigger fires for it.
    pub fn new<F, C>(source: ListRef<T>, key: F, compare: C, trigger: Option<Trigger<T>>) -> Rc<Self>
    where
        F: Fn(&T) -> K + 'static,
        C: Fn(&K, &K) -> Ordering + 'static,
    {
        let view = Rc::new_cyclic(|this| Self {
            this: this.clone(),
            source: source.clone(),
            key_of: Rc::new(key),
            compare: Rc::new(compare),
            trigger,
            state: RefCell::new(SortState {
                entries: ContainerList::new(),
                sorted: Vec::new(),
            }),
            hub: EventHub::new(),
            upstream: Upstream::new(),
        });
        view.rebuild();
        view.upstream
            .hold(observe(&source, &view, |view: &Self, event| view.on_source_change(event)));
        view
    }

    /// Returns the sorted position of the item at `source_index`.
    pub fn sorted_index_of(&self, source_index: usize) -> Option<usize> {
        let state = self.state.borrow();
        let container = state.entries.get(source_index)?;
        self.locate(&state.sorted, container)
    }

    fn order(&self, a: &Slot<T, K>, b: &Slot<T, K>) -> Ordering {
        (self.compare)(&a.state(), &b.state()).then(a.source_index().cmp(&b.source_index()))
    }

    fn locate(&self, sorted: &[Slot<T, K>], container: &Slot<T, K>) -> Option<usize> {
        match sorted.binary_search_by(|entry| self.order(entry, container)) {
            Ok(pos) if Rc::ptr_eq(&sorted[pos], container) => Some(pos),
            _ => sorted.iter().position(|c| Rc::ptr_eq(c, container)),
        }
    }

    fn insertion_point(&self, sorted: &[Slot<T, K>], container: &Slot<T, K>) -> usize {
        sorted.partition_point(|entry| self.order(entry, container) == Ordering::Less)
    }

    /// Bounds of the run of entries whose key equals `key`.
    fn key_run(&self, sorted: &[Slot<T, K>], key: &K) -> (usize, usize) {
        let lo = sorted.partition_point(|c| (self.compare)(&c.state(), key) == Ordering::Less);
        let hi = sorted.partition_point(|c| (self.compare)(&c.state(), key) != Ordering::Greater);
        (lo, hi)
    }

    fn wrap(&self, item: T, index: usize) -> Slot<T, K> {
        let key = (self.key_of)(&item);
        let container = ItemContainer::new(item, index, key);
        if let Some(trigger) = &self.trigger {
            container.attach(trigger, self.this.clone(), |view: &Self, c| view.rekey(c));
        }
        container
    }

    fn rebuild(&self) {
        let items = self.source.to_vec();
        let mut state = self.state.borrow_mut();
        state.entries.clear();
        for (index, item) in items.into_iter().enumerate() {
            let container = self.wrap(item, index);
            state.entries.push(container);
        }
        let mut sorted: Vec<Slot<T, K>> = state.entries.iter().cloned().collect();
        sorted.sort_by(|a, b| self.order(a, b));
        state.sorted = sorted;
    }

    fn on_source_change(&self, event: &ChangeEvent<T>) {
        match event {
            ChangeEvent::Add { index, items } => self.on_add(*index, items),
            ChangeEvent::Remove { index, items } => self.on_remove(*index, items.len()),
            ChangeEvent::Replace {
                index,
                old_items,
                new_items,
            } => {
                if old_items.len() == new_items.len() {
                    for offset in 0..new_items.len() {
                        self.replace_one(index + offset, &new_items[offset]);
                    }
                } else {
                    if !old_items.is_empty() {
                        self.on_remove(*index, old_items.len());
                    }
                    if !new_items.is_empty() {
                        self.on_add(*index, new_items);
                    }
                }
            }
            ChangeEvent::Move {
                old_index,
                new_index,
                items,
            } => self.on_move(*old_index, *new_index, items.len()),
            ChangeEvent::Reset => {
                let old_len = self.len();
                self.rebuild();
                let new_len = self.len();
                tracing::debug!(target: "rivulet_incremental::sort", old_len, new_len, "sorted view rebuilt");
                self.hub.emit(&ChangeEvent::Reset, old_len, new_len);
            }
        }
    }

    fn on_add(&self, index: usize, items: &[T]) {
        let block: Vec<Slot<T, K>> = {
            let mut state = self.state.borrow_mut();
            if index > state.entries.len() {
                out_of_range(VIEW, index, 0, state.entries.len());
            }
            let block: Vec<_> = items
                .iter()
                .enumerate()
                .map(|(offset, item)| self.wrap(item.clone(), index + offset))
                .collect();
            state.entries.insert_block(index, block.clone());
            block
        };
        for container in block {
            let event = {
                let mut state = self.state.borrow_mut();
                let pos = self.insertion_point(&state.sorted, &container);
                state.sorted.insert(pos, container.clone());
                ChangeEvent::add_one(pos, container.item().clone())
            };
            let len = self.len();
            self.hub.emit(&event, len - 1, len);
        }
    }

    fn on_remove(&self, index: usize, count: usize) {
        {
            let state = self.state.borrow();
            if index + count > state.entries.len() {
                out_of_range(VIEW, index, count, state.entries.len());
            }
        }
        for offset in 0..count {
            let event = {
                let mut state = self.state.borrow_mut();
                let container = state.entries.as_slice()[index + offset].clone();
                let pos = self.take_sorted(&mut state.sorted, &container);
                ChangeEvent::remove_one(pos, container.item().clone())
            };
            let len = self.len();
            self.hub.emit(&event, len + 1, len);
        }
        self.state.borrow_mut().entries.remove_block(index, count);
    }

    fn take_sorted(&self, sorted: &mut Vec<Slot<T, K>>, container: &Slot<T, K>) -> usize {
        match self.locate(sorted, container) {
            Some(pos) => {
                sorted.remove(pos);
                pos
            }
            None => contract_violation(VIEW, Error::index_out_of_range(container.source_index(), sorted.len())),
        }
    }

    /// Swaps the item at `index` for `item`; a single Replace when the new
    /// item sorts into the same position, otherwise Remove then Add.
    fn replace_one(&self, index: usize, item: &T) {
        let (old_item, from, container) = {
            let mut state = self.state.borrow_mut();
            let Some(old) = state.entries.get(index).cloned() else {
                out_of_range(VIEW, index, 1, state.entries.len());
            };
            let from = self.take_sorted(&mut state.sorted, &old);
            let container = self.wrap(item.clone(), index);
            state.entries.remove_block(index, 1);
            state.entries.insert_block(index, alloc::vec![container.clone()]);
            let to = self.insertion_point(&state.sorted, &container);
            if to == from {
                state.sorted.insert(to, container);
                let len = state.sorted.len();
                drop(state);
                self.hub.emit(
                    &ChangeEvent::replace(from, alloc::vec![old.item().clone()], alloc::vec![item.clone()]),
                    len,
                    len,
                );
                return;
            }
            (old.item().clone(), from, container)
        };
        let len = self.len();
        self.hub.emit(&ChangeEvent::remove_one(from, old_item), len + 1, len);

        let event = {
            let mut state = self.state.borrow_mut();
            let to = self.insertion_point(&state.sorted, &container);
            state.sorted.insert(to, container.clone());
            ChangeEvent::add_one(to, item.clone())
        };
        self.hub.emit(&event, len, len + 1);
    }

    fn on_move(&self, old_index: usize, new_index: usize, count: usize) {
        let span: Vec<Slot<T, K>> = {
            let mut state = self.state.borrow_mut();
            let len = state.entries.len();
            if old_index + count > len || new_index + count > len {
                out_of_range(VIEW, core::cmp::max(old_index, new_index), count, len);
            }
            state.entries.move_block(old_index, new_index, count);
            let start = core::cmp::min(old_index, new_index);
            let end = core::cmp::max(old_index, new_index) + count;
            state.entries.as_slice()[start..end].to_vec()
        };
        // Keys are unchanged, so only runs of equal keys can be out of order.
        let mut fixed: Vec<usize> = Vec::new();
        for container in span {
            let (lo, hi) = {
                let state = self.state.borrow();
                let key = container.state();
                self.key_run(&state.sorted, &key)
            };
            if hi - lo > 1 && !fixed.contains(&lo) {
                fixed.push(lo);
                self.restore_run(lo, hi);
            }
        }
    }

    /// Re-orders `lo..hi` (all equal keys) by source index, one Move per
    /// displaced item.
    fn restore_run(&self, lo: usize, hi: usize) {
        let mut next = lo;
        while next < hi {
            let event = {
                let mut state = self.state.borrow_mut();
                let sorted = &mut state.sorted;
                let best = (next..hi)
                    .min_by_key(|&i| sorted[i].source_index())
                    .unwrap_or(next);
                if best == next {
                    None
                } else {
                    let container = sorted.remove(best);
                    let item = container.item().clone();
                    sorted.insert(next, container);
                    Some(ChangeEvent::moved(best, next, alloc::vec![item]))
                }
            };
            if let Some(event) = event {
                let len = self.len();
                self.hub.emit(&event, len, len);
            }
            next += 1;
        }
    }

    fn rekey(&self, container: &Slot<T, K>) {
        let key = (self.key_of)(container.item());
        let event = {
            let mut state = self.state.borrow_mut();
            let current = state
                .entries
                .get(container.source_index())
                .map_or(false, |c| Rc::ptr_eq(c, container));
            if !current {
                return;
            }
            let from = self.take_sorted(&mut state.sorted, container);
            *container.state_mut() = key;
            let to = self.insertion_point(&state.sorted, container);
            state.sorted.insert(to, container.clone());
            (from != to).then(|| ChangeEvent::moved(from, to, alloc::vec![container.item().clone()]))
        };
        if let Some(event) = event {
            let len = self.len();
            self.hub.emit(&event, len, len);
        }
    }
}

impl<T: Clone + 'static, K: 'static> DerivedView for SortedList<T, K> {
    fn dispose(&self) {
        if self.upstream.dispose() {
            self.state.borrow().entries.detach_all();
            tracing::debug!(target: "rivulet_incremental::sort", "sorted view disposed");
        }
    }

    fn is_disposed(&self) -> bool {
        self.upstream.is_disposed()
    }
}

impl<T: Clone + 'static, K: 'static> ReadList<T> for SortedList<T, K> {
    fn len(&self) -> usize {
        self.state.borrow().sorted.len()
    }

    fn get(&self, index: usize) -> Option<T> {
        self.state.borrow().sorted.as_slice().get(index).map(|c| c.item().clone())
    }

    fn to_vec(&self) -> Vec<T> {
        self.state.borrow().sorted.iter().map(|c| c.item().clone()).collect()
    }
}

impl<T: Clone + 'static, K: 'static> ObservableList<T> for SortedList<T, K> {
    fn subscribe(&self, listener: ChangeListener<T>) -> Subscription {
        self.hub.subscribe(listener)
    }

    fn subscribe_count(&self, listener: CountListener) -> Subscription {
        self.hub.subscribe_count(listener)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use core::cmp::Reverse;
    use rivulet_reactive::{ObservableListExt, ObservableVec};

    fn record<T: Clone + 'static, K: 'static>(
        view: &SortedList<T, K>,
    ) -> (Rc<RefCell<Vec<ChangeEvent<T>>>>, Subscription) {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        let sub = view.on_change(move |e| sink.borrow_mut().push(e.clone()));
        (events, sub)
    }

    #[test]
    fn test_initial_sort() {
        let source = ObservableVec::new(vec![3, 1, 7, 5, 4, 6, 2]);
        let view = SortedList::by_comparison(source.as_list(), |a: &i32, b: &i32| a.cmp(b));
        assert_eq!(view.to_vec(), vec![1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(view.sorted_index_of(0), Some(2));
    }

    #[test]
    fn test_get_reads_sorted_position() {
        let source = ObservableVec::new(vec![30, 10, 20]);
        let view = SortedList::by_key(source.as_list(), |x: &i32| *x);
        assert_eq!(view.get(0), Some(10));
        assert_eq!(view.get(2), Some(30));
        assert_eq!(view.get(3), None);
    }

    #[test]
    fn test_add_and_remove_emit_sorted_positions() {
        let source = ObservableVec::new(vec![5, 1, 9]);
        let view = SortedList::by_key(source.as_list(), |x: &i32| *x);
        let (events, _sub) = record(&view);

        source.insert_many(1, vec![7, 0]).unwrap();
        assert_eq!(view.to_vec(), vec![0, 1, 5, 7, 9]);
        source.remove_at(0).unwrap();
        assert_eq!(view.to_vec(), vec![0, 1, 7, 9]);

        assert_eq!(
            *events.borrow(),
            vec![
                ChangeEvent::add_one(2, 7),
                ChangeEvent::add_one(0, 0),
                ChangeEvent::remove_one(2, 5),
            ]
        );
    }

    #[test]
    fn test_ties_follow_source_order() {
        let source = ObservableVec::new(vec![(1, 'a'), (0, 'b'), (1, 'c')]);
        let view = SortedList::by_key(source.as_list(), |p: &(i32, char)| p.0);
        assert_eq!(view.to_vec(), vec![(0, 'b'), (1, 'a'), (1, 'c')]);

        source.insert(0, (1, 'z')).unwrap();
        assert_eq!(view.to_vec(), vec![(0, 'b'), (1, 'z'), (1, 'a'), (1, 'c')]);
    }

    #[test]
    fn test_move_with_distinct_keys_is_silent() {
        let source = ObservableVec::new(vec![3, 1, 7, 5, 4, 6, 2]);
        let view = SortedList::by_key(source.as_list(), |x: &i32| *x);
        let (events, _sub) = record(&view);

        source.move_item(1, 3).unwrap();
        assert_eq!(view.to_vec(), vec![1, 2, 3, 4, 5, 6, 7]);
        assert!(events.borrow().is_empty());
        assert_eq!(view.sorted_index_of(3), Some(0));
    }

    #[test]
    fn test_move_reorders_equal_keys() {
        let source = ObservableVec::new(vec![(1, 'a'), (2, 'x'), (1, 'b')]);
        let view = SortedList::by_key(source.as_list(), |p: &(i32, char)| p.0);
        let (events, _sub) = record(&view);

        source.move_item(2, 0).unwrap();
        assert_eq!(view.to_vec(), vec![(1, 'b'), (1, 'a'), (2, 'x')]);
        assert_eq!(*events.borrow(), vec![ChangeEvent::moved(1, 0, vec![(1, 'b')])]);
    }

    #[test]
    fn test_replace_same_position() {
        let source = ObservableVec::new(vec![10, 20, 30]);
        let view = SortedList::by_key(source.as_list(), |x: &i32| *x);
        let (events, _sub) = record(&view);

        source.set(1, 21).unwrap();
        source.set(0, 40).unwrap();
        assert_eq!(view.to_vec(), vec![21, 30, 40]);
        assert_eq!(
            *events.borrow(),
            vec![
                ChangeEvent::replace(1, vec![20], vec![21]),
                ChangeEvent::remove_one(0, 10),
                ChangeEvent::add_one(2, 40),
            ]
        );
    }

    #[test]
    fn test_descending_with_custom_order() {
        let source = ObservableVec::new(vec![2, 9, 4]);
        let view = SortedList::by_key(source.as_list(), |x: &i32| Reverse(*x));
        assert_eq!(view.to_vec(), vec![9, 4, 2]);

        let view = SortedList::by_key_with(source.as_list(), |x: &i32| *x, |a, b| b.cmp(a));
        source.push(5);
        assert_eq!(view.to_vec(), vec![9, 5, 4, 2]);
    }

    #[test]
    fn test_dynamic_key_moves_item() {
        let a = Property::new(1);
        let b = Property::new(2);
        let c = Property::new(3);
        let source = ObservableVec::new(vec![a.clone(), b.clone(), c.clone()]);
        let view = SortedList::by_dynamic_key(source.as_list(), |p: &Property<i32>| p.clone());
        let (events, _sub) = record(&view);

        a.set(10);
        let keys: Vec<i32> = view.to_vec().iter().map(Property::get).collect();
        assert_eq!(keys, vec![2, 3, 10]);
        assert_eq!(events.borrow().len(), 1);
        assert_eq!(events.borrow()[0].old_index(), Some(0));
        assert_eq!(events.borrow()[0].new_index(), Some(2));

        // Same position: no event.
        b.set(2);
        assert_eq!(events.borrow().len(), 1);
    }

    #[test]
    fn test_removed_item_trigger_is_detached() {
        let a = Property::new(1);
        let source = ObservableVec::new(vec![a.clone()]);
        let view = SortedList::by_dynamic_key(source.as_list(), |p: &Property<i32>| p.clone());
        assert_eq!(a.subscriber_count(), 1);
        source.clear();
        assert_eq!(a.subscriber_count(), 0);
        assert!(view.is_empty());
    }
}
