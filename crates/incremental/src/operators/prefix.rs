//! Take-while view: the longest source prefix whose items all satisfy a
//! predicate.
//!
//! Changes strictly after the boundary (the first failing item) never affect
//! the view. An edit inside the run is reported at its own position; only
//! removing the boundary item, or inserting a failing one, moves the
//! boundary, and only the items that cross it are reported.

use crate::container::{ContainerList, ItemContainer};
use crate::view::{check_event, observe, DerivedView, Upstream};
use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::RefCell;
use rivulet_core::{ChangeEvent, ReadList};
use rivulet_reactive::{
    ChangeListener, CountListener, EventHub, ListRef, ObservableList, Subscription, Trigger,
};

const VIEW: &str = "TakeWhileList";

type Slot<T> = Rc<ItemContainer<T, ()>>;

struct PrefixState<T> {
    entries: ContainerList<T, ()>,
    visible: Vec<T>,
}

/// A live view of the source's leading run of matching items.
pub struct TakeWhileList<T> {
    this: Weak<Self>,
    source: ListRef<T>,
    predicate: Rc<dyn Fn(&T) -> bool>,
    trigger: Option<Trigger<T>>,
    state: RefCell<PrefixState<T>>,
    hub: EventHub<T>,
    upstream: Upstream,
}

impl<T: Clone + 'static> TakeWhileList<T> {
    pub fn new<P>(source: ListRef<T>, predicate: P) -> Rc<Self>
    where
        P: Fn(&T) -> bool + 'static,
    {
        Self::build(source, Rc::new(predicate), None)
    }

    /// Like `new`, re-testing an item whenever `trigger` fires for it.
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
            state: RefCell::new(PrefixState {
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

    fn wrap(&self, item: T, index: usize) -> Slot<T> {
        let container = ItemContainer::new(item, index, ());
        if let Some(trigger) = &self.trigger {
            container.attach(trigger, self.this.clone(), |view: &Self, c| view.retest(c));
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
        state.visible.clear();
        let run = self.scan(&state, 0);
        state.visible = run;
    }

    /// Matching items from `start` up to the first failure.
    fn scan(&self, state: &PrefixState<T>, start: usize) -> Vec<T> {
        state.entries.as_slice()[start.min(state.entries.len())..]
            .iter()
            .map(|c| c.item())
            .take_while(|item| (self.predicate)(item))
            .cloned()
            .collect()
    }

    /// Inserts source items at `index`. Only a block at or before the
    /// boundary can change the run: it either joins the run whole or cuts
    /// it at its first failing item.
    fn insert(
        &self,
        state: &mut PrefixState<T>,
        index: usize,
        items: &[T],
        out: &mut Vec<ChangeEvent<T>>,
    ) {
        let block = self.wrap_block(index, items);
        state.entries.insert_block(index, block);
        if index > state.visible.len() {
            return;
        }
        let passing = items.iter().take_while(|item| (self.predicate)(item)).count();
        if passing == items.len() {
            state.visible.splice(index..index, items.iter().cloned());
            out.push(ChangeEvent::add(index, items.to_vec()));
            return;
        }
        let cut: Vec<T> = state.visible.drain(index..).collect();
        if !cut.is_empty() {
            out.push(ChangeEvent::remove(index, cut));
        }
        if passing > 0 {
            state.visible.extend(items[..passing].iter().cloned());
            out.push(ChangeEvent::add(index, items[..passing].to_vec()));
        }
    }

    /// Removes `count` source items at `index`. Removing the boundary item
    /// lets the run grow past it.
    fn remove(
        &self,
        state: &mut PrefixState<T>,
        index: usize,
        count: usize,
        out: &mut Vec<ChangeEvent<T>>,
    ) {
        state.entries.remove_block(index, count);
        let len = state.visible.len();
        if index > len {
            return;
        }
        let end = core::cmp::min(index + count, len);
        if end > index {
            let gone: Vec<T> = state.visible.drain(index..end).collect();
            out.push(ChangeEvent::remove(index, gone));
        }
        if index + count > len {
            let fresh = self.scan(state, index);
            if !fresh.is_empty() {
                state.visible.extend(fresh.iter().cloned());
                out.push(ChangeEvent::add(index, fresh));
            }
        }
    }

    fn on_source_change(&self, event: &ChangeEvent<T>) {
        if event.is_reset() {
            let old_len = self.len();
            self.rebuild();
            let new_len = self.len();
            tracing::debug!(target: "rivulet_incremental::prefix", old_len, new_len, "prefix rebuilt");
            self.hub.emit(&ChangeEvent::Reset, old_len, new_len);
            return;
        }
        let old_len = self.len();
        let events = {
            let mut state = self.state.borrow_mut();
            check_event(VIEW, event, state.entries.len());
            let len = state.visible.len();
            let mut out = Vec::new();
            match event {
                ChangeEvent::Replace {
                    index,
                    old_items,
                    new_items,
                } if old_items.len() == new_items.len()
                    && index + new_items.len() <= len
                    && new_items.iter().all(|item| (self.predicate)(item)) =>
                {
                    state.entries.remove_block(*index, old_items.len());
                    let block = self.wrap_block(*index, new_items);
                    state.entries.insert_block(*index, block);
                    let stale: Vec<T> = state
                        .visible
                        .splice(*index..*index + new_items.len(), new_items.iter().cloned())
                        .collect();
                    out.push(ChangeEvent::replace(*index, stale, new_items.clone()));
                }
                ChangeEvent::Move {
                    old_index,
                    new_index,
                    items,
                } if core::cmp::max(*old_index, *new_index) + items.len() <= len => {
                    state.entries.move_block(*old_index, *new_index, items.len());
                    if old_index != new_index {
                        let block: Vec<T> = state
                            .visible
                            .drain(*old_index..*old_index + items.len())
                            .collect();
                        state.visible.splice(*new_index..*new_index, block.iter().cloned());
                        out.push(ChangeEvent::moved(*old_index, *new_index, block));
                    }
                }
                ChangeEvent::Move {
                    old_index,
                    new_index,
                    items,
                } if core::cmp::min(*old_index, *new_index) > len => {
                    state.entries.move_block(*old_index, *new_index, items.len());
                }
                _ => {
                    for step in event.primitives() {
                        match step {
                            ChangeEvent::Add { index, items } => {
                                self.insert(&mut state, index, &items, &mut out)
                            }
                            ChangeEvent::Remove { index, items } => {
                                self.remove(&mut state, index, items.len(), &mut out)
                            }
                            _ => {}
                        }
                    }
                }
            }
            out
        };
        self.emit_all(events, old_len);
    }

    /// Emits `events` in order, tracking the length each one leaves behind.
    fn emit_all(&self, events: Vec<ChangeEvent<T>>, old_len: usize) {
        let mut len = old_len;
        for event in events {
            let next = match event.len_delta() {
                Some(delta) => (len as isize + delta) as usize,
                None => self.len(),
            };
            self.hub.emit(&event, len, next);
            len = next;
        }
    }

    fn wrap_block(&self, index: usize, items: &[T]) -> Vec<Slot<T>> {
        items
            .iter()
            .enumerate()
            .map(|(offset, item)| self.wrap(item.clone(), index + offset))
            .collect()
    }

    /// Re-tests one item after its trigger fired. Only the item at the
    /// boundary can extend the run and only an item inside it can cut it.
    fn retest(&self, container: &Slot<T>) {
        let old_len = self.len();
        let events = {
            let mut state = self.state.borrow_mut();
            let index = container.source_index();
            let current = state
                .entries
                .get(index)
                .map_or(false, |c| Rc::ptr_eq(c, container));
            if !current {
                return;
            }
            let passes = (self.predicate)(container.item());
            let len = state.visible.len();
            let mut out = Vec::new();
            if index < len && !passes {
                let cut: Vec<T> = state.visible.drain(index..).collect();
                out.push(ChangeEvent::remove(index, cut));
            } else if index == len && passes {
                let fresh = self.scan(&state, index);
                state.visible.extend(fresh.iter().cloned());
                out.push(ChangeEvent::add(index, fresh));
            }
            out
        };
        if !events.is_empty() {
            tracing::trace!(target: "rivulet_incremental::prefix", "boundary moved by trigger");
            self.emit_all(events, old_len);
        }
    }
}

impl<T: Clone + 'static> DerivedView for TakeWhileList<T> {
    fn dispose(&self) {
        if self.upstream.dispose() {
            self.state.borrow().entries.detach_all();
            tracing::debug!(target: "rivulet_incremental::prefix", "prefix disposed");
        }
    }

    fn is_disposed(&self) -> bool {
        self.upstream.is_disposed()
    }
}

impl<T: Clone> ReadList<T> for TakeWhileList<T> {
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

impl<T: Clone + 'static> ObservableList<T> for TakeWhileList<T> {
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

    #[test]
    fn test_prefix_stops_at_first_failure() {
        let source = ObservableVec::new(vec![1, 2, 5, 3]);
        let view = TakeWhileList::new(source.as_list(), |x: &i32| *x < 4);
        assert_eq!(view.to_vec(), vec![1, 2]);

        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        let _sub = view.on_change(move |e| sink.borrow_mut().push(e.clone()));

        source.push(0);
        assert!(events.borrow().is_empty());

        source.remove_at(2).unwrap();
        assert_eq!(view.to_vec(), vec![1, 2, 3, 0]);
        assert_eq!(events.borrow()[0], ChangeEvent::add(2, vec![3, 0]));

        source.insert(1, 9).unwrap();
        assert_eq!(view.to_vec(), vec![1]);
        assert_eq!(events.borrow()[1], ChangeEvent::remove(1, vec![2, 3, 0]));
    }

    #[test]
    fn test_replace_inside_prefix() {
        let source = ObservableVec::new(vec![1, 2, 3, 7]);
        let view = TakeWhileList::new(source.as_list(), |x: &i32| *x < 5);
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        let _sub = view.on_change(move |e| sink.borrow_mut().push(e.clone()));

        source.set(1, 4).unwrap();
        assert_eq!(view.to_vec(), vec![1, 4, 3]);
        assert_eq!(events.borrow()[0], ChangeEvent::replace(1, vec![2], vec![4]));

        source.move_item(2, 0).unwrap();
        assert_eq!(view.to_vec(), vec![3, 1, 4]);
        assert_eq!(events.borrow()[1], ChangeEvent::moved(2, 0, vec![3]));

        source.move_item(3, 0).unwrap();
        assert!(view.is_empty());
        assert_eq!(events.borrow()[2], ChangeEvent::remove(0, vec![3, 1, 4]));
        assert_eq!(events.borrow().len(), 3);
    }

    #[test]
    fn test_insert_inside_prefix_is_an_add() {
        let source = ObservableVec::new((0..100).collect());
        let view = TakeWhileList::new(source.as_list(), |x: &i32| *x < 1000);
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        let _sub = view.on_change(move |e| sink.borrow_mut().push(e.clone()));

        source.insert(0, 5).unwrap();
        assert_eq!(*events.borrow(), vec![ChangeEvent::add(0, vec![5])]);
        assert_eq!(view.len(), 101);

        source.insert_many(50, vec![7, 2000, 8]).unwrap();
        assert_eq!(view.len(), 51);
        assert_eq!(view.get(50), Some(7));
        assert_eq!(events.borrow()[1].len_delta(), Some(-51));
        assert_eq!(events.borrow()[2], ChangeEvent::add(50, vec![7]));
    }

    #[test]
    fn test_remove_boundary_extends_prefix() {
        let source = ObservableVec::new(vec![1, 2, 9, 3, 4, 9]);
        let view = TakeWhileList::new(source.as_list(), |x: &i32| *x < 5);
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        let _sub = view.on_change(move |e| sink.borrow_mut().push(e.clone()));

        source.remove_range(1, 2).unwrap();
        assert_eq!(view.to_vec(), vec![1, 3, 4]);
        assert_eq!(
            *events.borrow(),
            vec![ChangeEvent::remove(1, vec![2]), ChangeEvent::add(1, vec![3, 4])]
        );
    }

    #[test]
    fn test_trigger_truncates_and_extends() {
        let cells: Vec<Property<bool>> = (0..4).map(|_| Property::new(true)).collect();
        let source = ObservableVec::new(cells.clone());
        let view = TakeWhileList::with_trigger(
            source.as_list(),
            |p: &Property<bool>| p.get(),
            Trigger::on_property(|p: &Property<bool>| p.clone()),
        );
        assert_eq!(view.len(), 4);

        cells[1].set(false);
        assert_eq!(view.len(), 1);
        cells[3].set(false);
        assert_eq!(view.len(), 1);
        cells[1].set(true);
        assert_eq!(view.len(), 3);
    }

    #[test]
    fn test_trigger_without_change_emits_nothing() {
        let cells: Vec<Property<bool>> = (0..4).map(|_| Property::new(true)).collect();
        cells[2].set(false);
        let source = ObservableVec::new(cells.clone());
        let view = TakeWhileList::with_trigger(
            source.as_list(),
            |p: &Property<bool>| p.get(),
            Trigger::on_property(|p: &Property<bool>| p.clone()),
        );
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        let _sub = view.on_change(move |e| sink.borrow_mut().push(e.clone()));

        cells[0].set(true);
        cells[2].set(false);
        cells[3].set(false);
        assert!(events.borrow().is_empty());
        assert_eq!(view.len(), 2);

        cells[2].set(true);
        assert_eq!(view.len(), 3);
        assert_eq!(events.borrow().len(), 1);
        assert!(matches!(&events.borrow()[0], ChangeEvent::Add { index: 2, items } if items.len() == 1));
    }

    #[test]
    fn test_reset() {
        let source = ObservableVec::new(vec![1, 9]);
        let view = TakeWhileList::new(source.as_list(), |x: &i32| *x < 5);
        source.reset(vec![2, 3, 4]);
        assert_eq!(view.to_vec(), vec![2, 3, 4]);
    }
}
