//! Incremental filter.
//!
//! Every source item gets a container recording whether it passes the
//! predicate and how many included items precede it. The filtered index of
//! an included item is exactly that count, so a source edit translates into
//! at most one filtered event plus a shift of the later counts.

use crate::container::{ContainerList, ItemContainer};
use crate::view::{contract_violation, observe, out_of_range, DerivedView, Upstream};
use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::RefCell;
use rivulet_core::{ChangeEvent, Error, ReadList};
use rivulet_reactive::{
    ChangeListener, CountListener, EventHub, ListRef, ObservableList, Subscription, Trigger,
};

const VIEW: &str = "FilteredList";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FilterSlot {
    included: bool,
    /// Number of included items before this one in source order.
    local_index: usize,
}

type Slot<T> = Rc<ItemContainer<T, FilterSlot>>;

struct FilterState<T> {
    entries: ContainerList<T, FilterSlot>,
    visible: Vec<T>,
}

impl<T: Clone + 'static> FilterState<T> {
    /// Filtered index an item inserted at source `index` would receive.
    fn local_before(&self, index: usize) -> usize {
        match self.entries.get(index) {
            Some(container) => container.state().local_index,
            None => self.visible.len(),
        }
    }

    fn shift_from(&self, start: usize, delta: isize) {
        if delta == 0 {
            return;
        }
        for container in &self.entries.as_slice()[start..] {
            let mut slot = container.state_mut();
            slot.local_index = (slot.local_index as isize + delta) as usize;
        }
    }

    /// Recomputes local indices for `start..end` from the prefix before it.
    fn recount(&self, start: usize, end: usize) {
        let mut running = if start == 0 {
            0
        } else {
            let prev = self.entries.as_slice()[start - 1].state();
            prev.local_index + usize::from(prev.included)
        };
        for container in &self.entries.as_slice()[start..end] {
            let mut slot = container.state_mut();
            slot.local_index = running;
            if slot.included {
                running += 1;
            }
        }
    }
}

/// A live view of the source items that satisfy a predicate, in source order.
///
/// With a trigger, an item whose watched state changes is re-evaluated and
/// enters or leaves the view without any source mutation.
pub struct FilteredList<T> {
    this: Weak<Self>,
    source: ListRef<T>,
    predicate: Rc<dyn Fn(&T) -> bool>,
    trigger: Option<Trigger<T>>,
    state: RefCell<FilterState<T>>,
    hub: EventHub<T>,
    upstream: Upstream,
}

impl<T: Clone + 'static> FilteredList<T> {
    /// Creates a filtered view over `source`.
    pub fn new<P>(source: ListRef<T>, predicate: P) -> Rc<Self>
    where
        P: Fn(&T) -> bool + 'static,
    {
        Self::build(source, Rc::new(predicate), None)
    }

    /// Creates a filtered view that re-evaluates an item when `trigger`
    /// fires for it.
    pub fn with_trigger<P>(source: ListRef<T>, predicate: P, trigger: Trigger<T>) -> Rc<Self>
    where
        P: Fn(&T) -> bool + 'static,
    {
        Self::build(source, Rc::new(predicate), Some(trigger))
    }

    fn build(
        source: ListRef<T>,
        predicate: Rc<dyn Fn(&T) -> bool>,
        trigger: Option<Trigger<T>>,
    ) -> Rc<Self> {
        let view = Rc::new_cyclic(|this| Self {
            this: this.clone(),
            source: source.clone(),
            predicate,
            trigger,
            state: RefCell::new(FilterState {
                entries: ContainerList::new(),
                visible: Vec::new(),
            }),
            hub: EventHub::new(),
            upstream: Upstream::new(),
        });
        view.rebuild();
        view.upstream
            .hold(observe(&source, &view, |view: &Self, event| view.on_source_change(event)));
        view
    }

    /// Returns the filtered index of the item at `source_index`, if it is
    /// currently included.
    pub fn filtered_index_of(&self, source_index: usize) -> Option<usize> {
        let state = self.state.borrow();
        let container = state.entries.get(source_index)?;
        let slot = *container.state();
        slot.included.then_some(slot.local_index)
    }

    /// Re-evaluates the predicate for every item, emitting one event per
    /// item that entered or left the view.
    pub fn refresh(&self) {
        let count = self.state.borrow().entries.len();
        for index in 0..count {
            let container = self.state.borrow().entries.get(index).cloned();
            if let Some(container) = container {
                self.reevaluate(&container);
            }
        }
    }

    fn rebuild(&self) {
        let items = self.source.to_vec();
        let mut state = self.state.borrow_mut();
        state.entries.clear();
        state.visible.clear();
        for (index, item) in items.into_iter().enumerate() {
            let container = self.wrap(item, index, state.visible.len());
            if container.state().included {
                state.visible.push(container.item().clone());
            }
            state.entries.push(container);
        }
    }

    fn wrap(&self, item: T, index: usize, local_index: usize) -> Slot<T> {
        let included = (self.predicate)(&item);
        let container = ItemContainer::new(
            item,
            index,
            FilterSlot {
                included,
                local_index,
            },
        );
        if let Some(trigger) = &self.trigger {
            container.attach(trigger, self.this.clone(), |view: &Self, c| view.reevaluate(c));
        }
        container
    }

    fn on_source_change(&self, event: &ChangeEvent<T>) {
        match event {
            ChangeEvent::Add { index, items } => self.on_add(*index, items),
            ChangeEvent::Remove { index, items } => self.on_remove(*index, items.len()),
            ChangeEvent::Replace {
                index,
                old_items,
                new_items,
            } => self.on_replace(*index, old_items.len(), new_items),
            ChangeEvent::Move {
                old_index,
                new_index,
                items,
            } => self.on_move(*old_index, *new_index, items.len()),
            ChangeEvent::Reset => self.on_reset(),
        }
    }

    fn on_add(&self, index: usize, items: &[T]) {
        let (event, old_len, new_len) = {
            let mut state = self.state.borrow_mut();
            if index > state.entries.len() {
                out_of_range(VIEW, index, 0, state.entries.len());
            }
            let base = state.local_before(index);
            let mut running = base;
            let mut block = Vec::with_capacity(items.len());
            let mut added = Vec::new();
            for (offset, item) in items.iter().enumerate() {
                let container = self.wrap(item.clone(), index + offset, running);
                if container.state().included {
                    added.push(item.clone());
                    running += 1;
                }
                block.push(container);
            }
            let end = index + block.len();
            state.entries.insert_block(index, block);
            state.shift_from(end, added.len() as isize);

            let old_len = state.visible.len();
            state.visible.splice(base..base, added.iter().cloned());
            (ChangeEvent::add(base, added), old_len, state.visible.len())
        };
        if old_len != new_len {
            self.hub.emit(&event, old_len, new_len);
        }
    }

    fn on_remove(&self, index: usize, count: usize) {
        let (event, old_len, new_len) = {
            let mut state = self.state.borrow_mut();
            if index + count > state.entries.len() {
                out_of_range(VIEW, index, count, state.entries.len());
            }
            let base = state.local_before(index);
            let removed = state.entries.remove_block(index, count);
            let included = removed.iter().filter(|c| c.state().included).count();
            state.shift_from(index, -(included as isize));

            let old_len = state.visible.len();
            let gone: Vec<T> = state.visible.drain(base..base + included).collect();
            (ChangeEvent::remove(base, gone), old_len, state.visible.len())
        };
        if old_len != new_len {
            self.hub.emit(&event, old_len, new_len);
        }
    }

    fn on_replace(&self, index: usize, old_count: usize, new_items: &[T]) {
        if old_count == new_items.len() && self.replace_in_place(index, new_items) {
            return;
        }
        if old_count > 0 {
            self.on_remove(index, old_count);
        }
        if !new_items.is_empty() {
            self.on_add(index, new_items);
        }
    }

    /// Swaps containers one for one when every replaced item keeps its
    /// inclusion. Returns false, leaving the state untouched, otherwise.
    fn replace_in_place(&self, index: usize, new_items: &[T]) -> bool {
        let event = {
            let mut state = self.state.borrow_mut();
            if index + new_items.len() > state.entries.len() {
                out_of_range(VIEW, index, new_items.len(), state.entries.len());
            }
            let same_shape = new_items.iter().enumerate().all(|(offset, item)| {
                state.entries.as_slice()[index + offset].state().included == (self.predicate)(item)
            });
            if !same_shape {
                return false;
            }
            let base = state.local_before(index);
            let mut block = Vec::with_capacity(new_items.len());
            let mut fresh = Vec::new();
            let mut running = base;
            for (offset, item) in new_items.iter().enumerate() {
                let container = self.wrap(item.clone(), index + offset, running);
                if container.state().included {
                    fresh.push(item.clone());
                    running += 1;
                }
                block.push(container);
            }
            state.entries.remove_block(index, new_items.len());
            state.entries.insert_block(index, block);

            let stale: Vec<T> = state
                .visible
                .splice(base..base + fresh.len(), fresh.iter().cloned())
                .collect();
            (!fresh.is_empty()).then(|| ChangeEvent::replace(base, stale, fresh))
        };
        if let Some(event) = event {
            let len = self.len();
            self.hub.emit(&event, len, len);
        }
        true
    }

    fn on_move(&self, old_index: usize, new_index: usize, count: usize) {
        let event = {
            let mut state = self.state.borrow_mut();
            let len = state.entries.len();
            if old_index + count > len || new_index + count > len {
                contract_violation(
                    VIEW,
                    Error::range_out_of_bounds(core::cmp::max(old_index, new_index), count, len),
                );
            }
            let from = state.local_before(old_index);
            let included = state.entries.as_slice()[old_index..old_index + count]
                .iter()
                .filter(|c| c.state().included)
                .count();

            state.entries.move_block(old_index, new_index, count);
            let start = core::cmp::min(old_index, new_index);
            let end = core::cmp::max(old_index, new_index) + count;
            state.recount(start, end);

            let to = state.local_before(new_index);
            if included == 0 || from == to {
                None
            } else {
                let block: Vec<T> = state.visible.drain(from..from + included).collect();
                state.visible.splice(to..to, block.iter().cloned());
                Some(ChangeEvent::moved(from, to, block))
            }
        };
        if let Some(event) = event {
            let len = self.len();
            self.hub.emit(&event, len, len);
        }
    }

    fn on_reset(&self) {
        let old_len = self.len();
        self.rebuild();
        let new_len = self.len();
        tracing::debug!(
            target: "rivulet_incremental::filter",
            old_len,
            new_len,
            "filtered view rebuilt"
        );
        self.hub.emit(&ChangeEvent::Reset, old_len, new_len);
    }

    fn reevaluate(&self, container: &Slot<T>) {
        let included = (self.predicate)(container.item());
        let event = {
            let mut state = self.state.borrow_mut();
            let index = container.source_index();
            let is_current = state
                .entries
                .get(index)
                .map_or(false, |c| Rc::ptr_eq(c, container));
            if !is_current {
                return;
            }
            let slot = *container.state();
            if slot.included == included {
                return;
            }
            container.state_mut().included = included;
            let item = container.item().clone();
            if included {
                state.shift_from(index + 1, 1);
                state.visible.insert(slot.local_index, item.clone());
                ChangeEvent::add_one(slot.local_index, item)
            } else {
                state.shift_from(index + 1, -1);
                let gone = state.visible.remove(slot.local_index);
                ChangeEvent::remove_one(slot.local_index, gone)
            }
        };
        let new_len = self.len();
        let old_len = if included { new_len - 1 } else { new_len + 1 };
        self.hub.emit(&event, old_len, new_len);
    }
}

impl<T: Clone + 'static> DerivedView for FilteredList<T> {
    fn dispose(&self) {
        if self.upstream.dispose() {
            self.state.borrow().entries.detach_all();
            tracing::debug!(target: "rivulet_incremental::filter", "filtered view disposed");
        }
    }

    fn is_disposed(&self) -> bool {
        self.upstream.is_disposed()
    }
}

impl<T: Clone> ReadList<T> for FilteredList<T> {
    fn len(&self) -> usize {
        self.state.borrow().visible.len()
    }

    fn get(&self, index: usize) -> Option<T> {
        self.state.borrow().visible.as_slice().get(index).cloned()
    }

    fn to_vec(&self) -> Vec<T> {
        self.state.borrow().visible.clone()
    }
}

impl<T: Clone + 'static> ObservableList<T> for FilteredList<T> {
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
    use rivulet_reactive::{ObservableListExt, ObservableVec, Property};

    fn record<T: Clone + 'static>(
        view: &FilteredList<T>,
    ) -> (Rc<RefCell<Vec<ChangeEvent<T>>>>, Subscription) {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        let sub = view.on_change(move |e| sink.borrow_mut().push(e.clone()));
        (events, sub)
    }

    fn evens(source: &Rc<ObservableVec<i32>>) -> Rc<FilteredList<i32>> {
        FilteredList::new(source.as_list(), |x| x % 2 == 0)
    }

    #[test]
    fn test_initial_contents() {
        let source = ObservableVec::new((1..=10).collect());
        let view = evens(&source);
        assert_eq!(view.to_vec(), vec![2, 4, 6, 8, 10]);
        assert_eq!(view.filtered_index_of(3), Some(1));
        assert_eq!(view.filtered_index_of(2), None);
    }

    #[test]
    fn test_add_emits_at_filtered_index() {
        let source = ObservableVec::new(vec![1, 2, 3, 4]);
        let view = evens(&source);
        let (events, _sub) = record(&view);

        source.insert_many(2, vec![6, 7, 8]).unwrap();
        source.insert(0, 5).unwrap();

        assert_eq!(view.to_vec(), vec![2, 6, 8, 4]);
        assert_eq!(*events.borrow(), vec![ChangeEvent::add(1, vec![6, 8])]);
    }

    #[test]
    fn test_remove() {
        let source = ObservableVec::new(vec![1, 2, 3, 4, 6]);
        let view = evens(&source);
        let (events, _sub) = record(&view);

        source.remove_range(1, 3).unwrap();
        assert_eq!(view.to_vec(), vec![6]);
        assert_eq!(*events.borrow(), vec![ChangeEvent::remove(0, vec![2, 4])]);

        source.remove_at(0).unwrap();
        assert_eq!(events.borrow().len(), 1);
    }

    #[test]
    fn test_replace_same_shape_is_single_replace() {
        let source = ObservableVec::new(vec![1, 2, 3]);
        let view = evens(&source);
        let (events, _sub) = record(&view);

        source.set(1, 4).unwrap();
        assert_eq!(view.to_vec(), vec![4]);
        assert_eq!(*events.borrow(), vec![ChangeEvent::replace(0, vec![2], vec![4])]);
    }

    #[test]
    fn test_replace_flip_is_remove_then_add() {
        let source = ObservableVec::new(vec![1, 2, 3]);
        let view = evens(&source);
        let (events, _sub) = record(&view);

        source.set(1, 5).unwrap();
        source.set(2, 8).unwrap();
        assert_eq!(view.to_vec(), vec![8]);
        assert_eq!(
            *events.borrow(),
            vec![ChangeEvent::remove(0, vec![2]), ChangeEvent::add(0, vec![8])]
        );
    }

    #[test]
    fn test_move() {
        let source = ObservableVec::new(vec![2, 1, 4, 3, 6]);
        let view = evens(&source);
        let (events, _sub) = record(&view);

        source.move_item(0, 4).unwrap();
        assert_eq!(view.to_vec(), vec![4, 6, 2]);
        assert_eq!(*events.borrow(), vec![ChangeEvent::moved(0, 2, vec![2])]);

        // An excluded item moving around changes nothing visible.
        source.move_item(0, 2).unwrap();
        assert_eq!(events.borrow().len(), 1);
        assert_eq!(view.filtered_index_of(4), Some(2));
    }

    #[test]
    fn test_reset_rebuilds() {
        let source = ObservableVec::new(vec![1, 2]);
        let view = evens(&source);
        let (events, _sub) = record(&view);

        source.reset(vec![4, 5, 6]);
        assert_eq!(view.to_vec(), vec![4, 6]);
        assert_eq!(*events.borrow(), vec![ChangeEvent::Reset]);
    }

    #[test]
    fn test_trigger_flips_inclusion() {
        let a = Property::new(1);
        let b = Property::new(2);
        let c = Property::new(4);
        let source = ObservableVec::new(vec![a.clone(), b.clone(), c.clone()]);
        let view = FilteredList::with_trigger(
            source.as_list(),
            |p: &Property<i32>| p.get() % 2 == 0,
            Trigger::on_property(|p: &Property<i32>| p.clone()),
        );
        let counts = Rc::new(RefCell::new(Vec::new()));
        let sink = counts.clone();
        let _sub = view.on_count(move |n| sink.borrow_mut().push(*n));

        a.set(6);
        assert_eq!(view.len(), 3);
        assert_eq!(view.filtered_index_of(2), Some(2));

        b.set(3);
        assert_eq!(view.len(), 2);
        assert!(view.get(0).unwrap().ptr_eq(&a));
        assert!(view.get(1).unwrap().ptr_eq(&c));
        assert_eq!(*counts.borrow(), vec![3, 2]);
    }

    #[test]
    fn test_refresh_reevaluates_everything() {
        let flag = Rc::new(core::cell::Cell::new(0));
        let source = ObservableVec::new(vec![1, 2, 3, 4]);
        let f = flag.clone();
        let view = FilteredList::new(source.as_list(), move |x| x % 2 == f.get());
        assert_eq!(view.to_vec(), vec![2, 4]);

        flag.set(1);
        view.refresh();
        assert_eq!(view.to_vec(), vec![1, 3]);
    }

    #[test]
    fn test_dispose_stops_tracking() {
        let source = ObservableVec::new(vec![2]);
        let view = evens(&source);
        view.dispose();
        source.push(4);
        assert!(view.is_disposed());
        assert_eq!(view.to_vec(), vec![2]);
    }

    #[test]
    fn test_dropping_view_detaches_from_source() {
        let source = ObservableVec::new(vec![2]);
        let view = evens(&source);
        drop(view);
        source.push(4);
        assert_eq!(source.len(), 2);
    }
}
