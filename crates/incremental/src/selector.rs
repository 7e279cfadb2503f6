//! Single-item selection that follows upstream edits.
//!
//! The selection is an index into the source plus the item found there.
//! Source events shift, clamp or re-resolve the index so it keeps pointing at
//! the same logical place:
//!
//! | Source event | Selection |
//! |---|---|
//! | Add at or before it | shifts forward by the added count |
//! | Remove before it | shifts back by the removed count |
//! | Remove covering it | clamps to `min(start, len - 1)` |
//! | Replace covering it | stays, item re-resolved |
//! | Replace before it | shifts by the length difference |
//! | Move | translated through the move |
//! | Reset | first item, or none when empty |

use crate::view::{observe, DerivedView, Upstream};
use alloc::rc::Rc;
use core::cell::RefCell;
use rivulet_core::{check_index, translate_through_move, ChangeEvent, Error, Result};
use rivulet_reactive::{Callback, ListRef, ListenerList, ObservableVec, Subscription};

/// The current selection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection<T> {
    pub index: Option<usize>,
    pub item: Option<T>,
}

impl<T> Selection<T> {
    fn none() -> Self {
        Self {
            index: None,
            item: None,
        }
    }
}

/// Tracks one selected position in a read-only source.
pub struct Selector<T> {
    source: ListRef<T>,
    selection: RefCell<Selection<T>>,
    listeners: Rc<ListenerList<Selection<T>>>,
    upstream: Upstream,
}

impl<T: Clone + PartialEq + 'static> Selector<T> {
    /// Creates a selector with nothing selected.
    pub fn new(source: ListRef<T>) -> Rc<Self> {
        let view = Rc::new(Self {
            source: source.clone(),
            selection: RefCell::new(Selection::none()),
            listeners: ListenerList::new(),
            upstream: Upstream::new(),
        });
        view.upstream
            .hold(observe(&source, &view, |view: &Self, event| view.on_source_change(event)));
        view
    }

    pub fn selection(&self) -> Selection<T> {
        self.selection.borrow().clone()
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selection.borrow().index
    }

    pub fn selected_item(&self) -> Option<T> {
        self.selection.borrow().item.clone()
    }

    /// Selects the item at `index`, or clears the selection with `None`.
    pub fn select(&self, index: Option<usize>) -> Result<()> {
        if let Some(index) = index {
            check_index(index, self.source.len())?;
        }
        self.settle(index);
        Ok(())
    }

    /// Selects the first item equal to `item`. Returns false, leaving the
    /// selection untouched, if there is none.
    pub fn select_item(&self, item: &T) -> bool {
        let found = (0..self.source.len()).find(|&i| self.source.get(i).as_ref() == Some(item));
        match found {
            Some(index) => {
                self.settle(Some(index));
                true
            }
            None => false,
        }
    }

    pub fn clear_selection(&self) {
        self.settle(None);
    }

    /// Registers a listener called whenever the selected index or item
    /// changes.
    pub fn subscribe_selection<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Selection<T>) + 'static,
    {
        let callback: Callback<Selection<T>> = Rc::new(listener);
        self.listeners.subscribe(callback)
    }

    /// Stores `index`, resolves its item and notifies if anything changed.
    fn settle(&self, index: Option<usize>) {
        let next = Selection {
            index,
            item: index.and_then(|i| self.source.get(i)),
        };
        let changed = {
            let mut selection = self.selection.borrow_mut();
            if *selection == next {
                false
            } else {
                *selection = next.clone();
                true
            }
        };
        if changed {
            tracing::trace!(
                target: "rivulet_incremental::selector",
                index = ?next.index,
                "selection changed"
            );
            self.listeners.notify(&next);
        }
    }

    fn on_source_change(&self, event: &ChangeEvent<T>) {
        let len = self.source.len();
        let last = len.checked_sub(1);
        let current = self.selected_index();
        let next = match (event, current) {
            (ChangeEvent::Reset, _) => last.map(|_| 0),
            (_, None) => None,
            (ChangeEvent::Add { index, items }, Some(s)) => {
                Some(if *index <= s { s + items.len() } else { s })
            }
            (ChangeEvent::Remove { index, items }, Some(s)) => {
                if index + items.len() <= s {
                    Some(s - items.len())
                } else if *index <= s {
                    last.map(|last| core::cmp::min(*index, last))
                } else {
                    Some(s)
                }
            }
            (
                ChangeEvent::Replace {
                    index,
                    old_items,
                    new_items,
                },
                Some(s),
            ) => {
                if index + old_items.len() <= s {
                    Some(s + new_items.len() - old_items.len())
                } else {
                    last.map(|last| core::cmp::min(s, last))
                }
            }
            (
                ChangeEvent::Move {
                    old_index,
                    new_index,
                    items,
                },
                Some(s),
            ) => Some(translate_through_move(s, *old_index, *new_index, items.len())),
        };
        self.settle(next);
    }
}

impl<T: Clone + PartialEq + 'static> DerivedView for Selector<T> {
    fn dispose(&self) {
        if self.upstream.dispose() {
            self.listeners.clear();
            tracing::debug!(target: "rivulet_incremental::selector", "selector disposed");
        }
    }

    fn is_disposed(&self) -> bool {
        self.upstream.is_disposed()
    }
}

/// A selector over a mutable source that can edit around the selection.
pub struct EditableSelector<T> {
    source: Rc<ObservableVec<T>>,
    selector: Rc<Selector<T>>,
}

impl<T: Clone + PartialEq + 'static> EditableSelector<T> {
    pub fn new(source: Rc<ObservableVec<T>>) -> Self {
        let selector = Selector::new(source.as_list());
        Self { source, selector }
    }

    pub fn selector(&self) -> &Rc<Selector<T>> {
        &self.selector
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selector.selected_index()
    }

    pub fn selected_item(&self) -> Option<T> {
        self.selector.selected_item()
    }

    pub fn select(&self, index: Option<usize>) -> Result<()> {
        self.selector.select(index)
    }

    pub fn select_item(&self, item: &T) -> bool {
        self.selector.select_item(item)
    }

    fn require(&self) -> Result<usize> {
        self.selector.selected_index().ok_or(Error::NoSelection)
    }

    /// Replaces the selected item, returning the previous one. The
    /// selection stays on the same index.
    pub fn replace_selected(&self, item: T) -> Result<T> {
        let index = self.require()?;
        self.source.set(index, item)
    }

    /// Removes the selected item. The selection moves to the item that
    /// took its place, or to the new last item.
    pub fn remove_selected(&self) -> Result<T> {
        let index = self.require()?;
        self.source.remove_at(index)
    }

    /// Inserts `item` right after the selection and selects it.
    ///
    /// Returns the index of the inserted item.
    pub fn insert_after_selected(&self, item: T) -> Result<usize> {
        let index = self.require()? + 1;
        self.source.insert(index, item)?;
        self.selector.select(Some(index))?;
        Ok(index)
    }
}
