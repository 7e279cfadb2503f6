//! Reversed view.
//!
//! Holds no items: source position `j` is view position `len - 1 - j`, so
//! every event is re-indexed against the source length before or after the
//! change and its item blocks are reversed.

use crate::view::{observe, out_of_range, DerivedView, Upstream};
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::Cell;
use rivulet_core::{ChangeEvent, ReadList};
use rivulet_reactive::{
    ChangeListener, CountListener, EventHub, ListRef, ObservableList, Subscription,
};

const VIEW: &str = "ReversedList";

fn reversed<T: Clone>(items: &[T]) -> Vec<T> {
    items.iter().rev().cloned().collect()
}

/// The source in reverse order.
///
/// Reads go straight to the source; after `dispose` the view still reflects
/// the source's current contents but raises no further events.
pub struct ReversedList<T> {
    source: ListRef<T>,
    len: Cell<usize>,
    hub: EventHub<T>,
    upstream: Upstream,
}

impl<T: Clone + 'static> ReversedList<T> {
    pub fn new(source: ListRef<T>) -> Rc<Self> {
        let view = Rc::new(Self {
            source: source.clone(),
            len: Cell::new(source.len()),
            hub: EventHub::new(),
            upstream: Upstream::new(),
        });
        view.upstream
            .hold(observe(&source, &view, |view: &Self, event| view.on_source_change(event)));
        view
    }

    fn on_source_change(&self, event: &ChangeEvent<T>) {
        let old_len = self.len.get();
        let new_len = self.source.len();
        self.len.set(new_len);
        let check = |start: usize, count: usize, len: usize| {
            if start + count > len {
                out_of_range(VIEW, start, count, len);
            }
        };
        let events = match event {
            ChangeEvent::Add { index, items } => {
                check(*index, items.len(), new_len);
                alloc::vec![ChangeEvent::add(new_len - index - items.len(), reversed(items))]
            }
            ChangeEvent::Remove { index, items } => {
                check(*index, items.len(), old_len);
                alloc::vec![ChangeEvent::remove(old_len - index - items.len(), reversed(items))]
            }
            ChangeEvent::Replace {
                index,
                old_items,
                new_items,
            } => {
                check(*index, old_items.len(), old_len);
                check(*index, new_items.len(), new_len);
                if old_items.len() == new_items.len() {
                    alloc::vec![ChangeEvent::replace(
                        new_len - index - new_items.len(),
                        reversed(old_items),
                        reversed(new_items),
                    )]
                } else {
                    // The block's reversed start differs before and after.
                    event
                        .primitives()
                        .into_iter()
                        .map(|step| match step {
                            ChangeEvent::Remove { index, items } => {
                                ChangeEvent::remove(old_len - index - items.len(), reversed(&items))
                            }
                            ChangeEvent::Add { index, items } => {
                                ChangeEvent::add(new_len - index - items.len(), reversed(&items))
                            }
                            other => other,
                        })
                        .collect()
                }
            }
            ChangeEvent::Move {
                old_index,
                new_index,
                items,
            } => {
                let count = items.len();
                check(*old_index, count, new_len);
                check(*new_index, count, new_len);
                alloc::vec![ChangeEvent::moved(
                    new_len - old_index - count,
                    new_len - new_index - count,
                    reversed(items),
                )]
            }
            ChangeEvent::Reset => alloc::vec![ChangeEvent::Reset],
        };
        let mut len = old_len;
        for event in events {
            let next = match &event {
                ChangeEvent::Add { items, .. } => len + items.len(),
                ChangeEvent::Remove { items, .. } => len - items.len(),
                ChangeEvent::Reset => new_len,
                _ => len,
            };
            self.hub.emit(&event, len, next);
            len = next;
        }
    }
}

impl<T: Clone + 'static> DerivedView for ReversedList<T> {
    fn dispose(&self) {
        if self.upstream.dispose() {
            tracing::debug!(target: "rivulet_incremental::reversed", "reversed view disposed");
        }
    }

    fn is_disposed(&self) -> bool {
        self.upstream.is_disposed()
    }
}

impl<T: Clone + 'static> ReadList<T> for ReversedList<T> {
    fn len(&self) -> usize {
        self.source.len()
    }

    fn get(&self, index: usize) -> Option<T> {
        let len = self.source.len();
        if index >= len {
            return None;
        }
        self.source.get(len - 1 - index)
    }

    fn to_vec(&self) -> Vec<T> {
        let mut items = self.source.to_vec();
        items.reverse();
        items
    }
}

impl<T: Clone + 'static> ObservableList<T> for ReversedList<T> {
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
    use core::cell::RefCell;
    use rivulet_reactive::{ObservableListExt, ObservableVec};

    type Log = Rc<RefCell<Vec<ChangeEvent<i32>>>>;

    fn setup(items: Vec<i32>) -> (Rc<ObservableVec<i32>>, Rc<ReversedList<i32>>, Log, Subscription) {
        let source = ObservableVec::new(items);
        let view = ReversedList::new(source.as_list());
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        let sub = view.on_change(move |e| sink.borrow_mut().push(e.clone()));
        (source, view, events, sub)
    }

    #[test]
    fn test_add_and_remove_invert_indices() {
        let (source, view, events, _sub) = setup(vec![1, 2, 3]);
        assert_eq!(view.to_vec(), vec![3, 2, 1]);

        source.insert_many(1, vec![7, 8]).unwrap();
        assert_eq!(view.to_vec(), vec![3, 2, 8, 7, 1]);
        assert_eq!(events.borrow()[0], ChangeEvent::add(2, vec![8, 7]));

        source.remove_at(0).unwrap();
        assert_eq!(view.to_vec(), vec![3, 2, 8, 7]);
        assert_eq!(events.borrow()[1], ChangeEvent::remove(4, vec![1]));
    }

    #[test]
    fn test_move_inverts_both_ends() {
        let (source, view, events, _sub) = setup(vec![1, 2, 3, 4]);
        source.move_item(0, 3).unwrap();
        assert_eq!(view.to_vec(), vec![1, 4, 3, 2]);
        assert_eq!(events.borrow()[0], ChangeEvent::moved(3, 0, vec![1]));
    }

    #[test]
    fn test_unequal_replace_is_split() {
        let (source, view, events, _sub) = setup(vec![1, 2, 3]);
        source.replace_range(0, 2, vec![9]).unwrap();
        assert_eq!(view.to_vec(), vec![3, 9]);
        assert_eq!(
            *events.borrow(),
            vec![ChangeEvent::remove(1, vec![2, 1]), ChangeEvent::add(1, vec![9])]
        );

        source.set(1, 5).unwrap();
        assert_eq!(events.borrow()[2], ChangeEvent::replace(0, vec![3], vec![5]));
    }
}
