//! Windowed view: `source[offset .. offset + max_count]`.
//!
//! Every source event is split into primitive inserts and removals. For each
//! step the window loses a block (items removed, pushed out of the tail, or
//! shifted out of the front) and gains a block (inserted items, items shifted
//! in from the front, or refill at the tail).

use crate::view::{contract_violation, observe, DerivedView, Upstream};
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;
use rivulet_core::{check_insert_index, check_range, ChangeEvent, ReadList};
use rivulet_reactive::{
    ChangeListener, CountListener, EventHub, ListRef, ObservableList, Subscription,
};

const VIEW: &str = "RangeList";

struct RangeState<T> {
    mirror: Vec<T>,
    offset: usize,
    max_count: usize,
}

impl<T: Clone> RangeState<T> {
    fn visible(&self) -> &[T] {
        let len = self.mirror.len();
        let start = self.offset.min(len);
        let end = self.offset.saturating_add(self.max_count).min(len);
        &self.mirror[start..end]
    }

    fn insert(&mut self, index: usize, items: &[T], out: &mut Vec<ChangeEvent<T>>) {
        let (offset, max) = (self.offset, self.max_count);
        let shown = self.visible().len();
        let start = index.max(offset);
        let new_len = self.mirror.len() + items.len();
        let entering = start
            .saturating_add(items.len())
            .min(offset.saturating_add(max))
            .min(new_len)
            .saturating_sub(start);
        let overflow = (shown + entering).saturating_sub(max);
        if overflow > 0 {
            let tail = self.visible()[shown - overflow..].to_vec();
            out.push(ChangeEvent::remove(shown - overflow, tail));
        }
        self.mirror.splice(index..index, items.iter().cloned());
        if entering > 0 {
            let added = self.mirror[start..start + entering].to_vec();
            out.push(ChangeEvent::add(start - offset, added));
        }
    }

    fn remove(&mut self, index: usize, count: usize, out: &mut Vec<ChangeEvent<T>>) {
        let shown = self.visible().len();
        let local = index.max(self.offset) - self.offset;
        let leaving = count.min(shown.saturating_sub(local));
        if leaving > 0 {
            let gone = self.visible()[local..local + leaving].to_vec();
            out.push(ChangeEvent::remove(local, gone));
        }
        self.mirror.drain(index..index + count);
        let kept = shown - leaving;
        let refill = &self.visible()[kept.min(self.visible().len())..];
        if !refill.is_empty() {
            out.push(ChangeEvent::add(kept, refill.to_vec()));
        }
    }

    fn replace_in_place(&mut self, index: usize, items: &[T], out: &mut Vec<ChangeEvent<T>>) {
        let start = index.max(self.offset);
        let end = (index + items.len())
            .min(self.offset.saturating_add(self.max_count))
            .min(self.mirror.len());
        let old = if start < end {
            self.mirror[start..end].to_vec()
        } else {
            Vec::new()
        };
        self.mirror.splice(index..index + items.len(), items.iter().cloned());
        if start < end {
            let new = self.mirror[start..end].to_vec();
            out.push(ChangeEvent::replace(start - self.offset, old, new));
        }
    }
}

/// A live window over a source.
pub struct RangeList<T> {
    source: ListRef<T>,
    state: RefCell<RangeState<T>>,
    hub: EventHub<T>,
    upstream: Upstream,
}

impl<T: Clone + 'static> RangeList<T> {
    /// Shows at most `max_count` items starting at `offset`.
    pub fn new(source: ListRef<T>, offset: usize, max_count: usize) -> Rc<Self> {
        let view = Rc::new(Self {
            source: source.clone(),
            state: RefCell::new(RangeState {
                mirror: source.to_vec(),
                offset,
                max_count,
            }),
            hub: EventHub::new(),
            upstream: Upstream::new(),
        });
        view.upstream
            .hold(observe(&source, &view, |view: &Self, event| view.on_source_change(event)));
        view
    }

    pub fn offset(&self) -> usize {
        self.state.borrow().offset
    }

    pub fn max_count(&self) -> usize {
        self.state.borrow().max_count
    }

    /// Moves the window and announces the new contents with a Reset.
    pub fn set_window(&self, offset: usize, max_count: usize) {
        let old_len = self.len();
        {
            let mut state = self.state.borrow_mut();
            if state.offset == offset && state.max_count == max_count {
                return;
            }
            state.offset = offset;
            state.max_count = max_count;
        }
        let new_len = self.len();
        tracing::debug!(target: "rivulet_incremental::range", offset, max_count, "window moved");
        self.hub.emit(&ChangeEvent::Reset, old_len, new_len);
    }

    fn on_source_change(&self, event: &ChangeEvent<T>) {
        let old_len = self.len();
        let events = {
            let mut state = self.state.borrow_mut();
            let len = state.mirror.len();
            let mut out = Vec::new();
            match event {
                ChangeEvent::Reset => {
                    state.mirror = self.source.to_vec();
                    out.push(ChangeEvent::Reset);
                }
                ChangeEvent::Replace {
                    index,
                    old_items,
                    new_items,
                } if old_items.len() == new_items.len() => {
                    if let Err(err) = check_range(*index, old_items.len(), len) {
                        contract_violation(VIEW, err);
                    }
                    state.replace_in_place(*index, new_items, &mut out);
                }
                _ => {
                    for step in event.primitives() {
                        let len = state.mirror.len();
                        match step {
                            ChangeEvent::Add { index, items } => {
                                if let Err(err) = check_insert_index(index, len) {
                                    contract_violation(VIEW, err);
                                }
                                state.insert(index, &items, &mut out);
                            }
                            ChangeEvent::Remove { index, items } => {
                                if let Err(err) = check_range(index, items.len(), len) {
                                    contract_violation(VIEW, err);
                                }
                                state.remove(index, items.len(), &mut out);
                            }
                            _ => {}
                        }
                    }
                }
            }
            out
        };
        let mut len = old_len;
        for event in events {
            let next = match &event {
                ChangeEvent::Add { items, .. } => len + items.len(),
                ChangeEvent::Remove { items, .. } => len - items.len(),
                ChangeEvent::Reset => self.len(),
                _ => len,
            };
            self.hub.emit(&event, len, next);
            len = next;
        }
    }
}

impl<T: Clone + 'static> DerivedView for RangeList<T> {
    fn dispose(&self) {
        if self.upstream.dispose() {
            tracing::debug!(target: "rivulet_incremental::range", "range disposed");
        }
    }

    fn is_disposed(&self) -> bool {
        self.upstream.is_disposed()
    }
}

impl<T: Clone> ReadList<T> for RangeList<T> {
    fn len(&self) -> usize {
        self.state.borrow().visible().len()
    }

    fn get(&self, index: usize) -> Option<T> {
        self.state.borrow().visible().get(index).cloned()
    }

    fn to_vec(&self) -> Vec<T> {
        self.state.borrow().visible().to_vec()
    }
}

impl<T: Clone + 'static> ObservableList<T> for RangeList<T> {
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
    use rivulet_reactive::{ObservableListExt, ObservableVec};

    type Window = (Rc<ObservableVec<i32>>, Rc<RangeList<i32>>);

    fn window(items: Vec<i32>, offset: usize, max: usize) -> Window {
        let source = ObservableVec::new(items);
        let view = RangeList::new(source.as_list(), offset, max);
        (source, view)
    }

    /// Replays the view's events onto a copy and checks it matches.
    fn replay(view: &Rc<RangeList<i32>>) -> (Rc<RefCell<Vec<i32>>>, Subscription) {
        let copy = Rc::new(RefCell::new(view.to_vec()));
        let sink = copy.clone();
        let weak = Rc::downgrade(view);
        let sub = view.on_change(move |e| {
            let mut copy = sink.borrow_mut();
            match e {
                ChangeEvent::Add { index, items } => {
                    copy.splice(*index..*index, items.iter().copied());
                }
                ChangeEvent::Remove { index, items } => {
                    copy.drain(*index..*index + items.len());
                }
                ChangeEvent::Replace {
                    index,
                    old_items,
                    new_items,
                } => {
                    copy.splice(*index..*index + old_items.len(), new_items.iter().copied());
                }
                ChangeEvent::Move { .. } => unreachable!("range never moves"),
                ChangeEvent::Reset => {
                    if let Some(view) = weak.upgrade() {
                        *copy = view.to_vec();
                    }
                }
            }
        });
        (copy, sub)
    }

    #[test]
    fn test_initial_window() {
        let (_, view) = window((0..10).collect(), 2, 3);
        assert_eq!(view.to_vec(), vec![2, 3, 4]);
        let (_, view) = window(vec![1, 2], 5, 3);
        assert!(view.is_empty());
    }

    #[test]
    fn test_insert_inside_pushes_tail_out() {
        let (source, view) = window((0..6).collect(), 1, 3);
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        let _sub = view.on_change(move |e| sink.borrow_mut().push(e.clone()));

        source.insert(2, 99).unwrap();
        assert_eq!(view.to_vec(), vec![1, 99, 2]);
        assert_eq!(
            *events.borrow(),
            vec![ChangeEvent::remove(2, vec![3]), ChangeEvent::add(1, vec![99])]
        );
    }

    #[test]
    fn test_insert_before_shifts_window() {
        let (source, view) = window((0..6).collect(), 2, 2);
        let (copy, _sub) = replay(&view);
        source.insert(0, 50).unwrap();
        assert_eq!(view.to_vec(), vec![1, 2]);
        assert_eq!(*copy.borrow(), view.to_vec());
        source.insert_many(1, vec![60, 61, 62]).unwrap();
        assert_eq!(view.to_vec(), vec![61, 62]);
        assert_eq!(*copy.borrow(), view.to_vec());
    }

    #[test]
    fn test_remove_pulls_items_in() {
        let (source, view) = window((0..6).collect(), 1, 3);
        let (copy, _sub) = replay(&view);
        source.remove_at(2).unwrap();
        assert_eq!(view.to_vec(), vec![1, 3, 4]);
        source.remove_at(0).unwrap();
        assert_eq!(view.to_vec(), vec![3, 4, 5]);
        source.remove_range(2, 2).unwrap();
        assert_eq!(view.to_vec(), vec![3]);
        assert_eq!(*copy.borrow(), view.to_vec());
    }

    #[test]
    fn test_replace_and_move_stay_consistent() {
        let (source, view) = window((0..8).collect(), 2, 4);
        let (copy, _sub) = replay(&view);
        source.set(3, 30).unwrap();
        assert_eq!(view.to_vec(), vec![2, 30, 4, 5]);
        source.set(0, 10).unwrap();
        assert_eq!(view.to_vec(), vec![2, 30, 4, 5]);
        source.move_item(7, 0).unwrap();
        assert_eq!(view.to_vec(), vec![1, 2, 30, 4]);
        source.replace_range(1, 3, vec![8]).unwrap();
        assert_eq!(*copy.borrow(), view.to_vec());
        assert_eq!(view.to_vec(), source.items()[2..6].to_vec());
    }

    #[test]
    fn test_set_window_resets() {
        let (_, view) = window((0..6).collect(), 0, 2);
        let (copy, _sub) = replay(&view);
        view.set_window(3, 10);
        assert_eq!(view.to_vec(), vec![3, 4, 5]);
        assert_eq!(*copy.borrow(), vec![3, 4, 5]);
        assert_eq!((view.offset(), view.max_count()), (3, 10));
    }
}
