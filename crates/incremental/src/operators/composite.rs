//! Concatenation of observable parts.
//!
//! The composite keeps an offset table over its parts: `offsets[i + 1] ==
//! offsets[i] + len(part i)`. A part's own event is lifted into flattened
//! coordinates by adding the part's offset; any change to a part's length
//! re-derives the offsets of the parts after it.

use crate::view::{observe, out_of_range, DerivedView, Upstream};
use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use rivulet_core::{ChangeEvent, ReadList};
use rivulet_reactive::{
    ChangeListener, CountListener, EventHub, ListRef, ObservableList, ObservableVec, Subscription,
};

const VIEW: &str = "CompositeList";

struct Part<T> {
    list: ListRef<T>,
    /// Position of the part in the parent list, shared with its listener.
    index: Rc<Cell<usize>>,
    offset: usize,
    count: usize,
    _subscription: Subscription,
}

struct CompositeState<T> {
    parts: Vec<Part<T>>,
    items: Vec<T>,
}

impl<T> CompositeState<T> {
    fn offset_at(&self, index: usize) -> usize {
        match self.parts.as_slice().get(index) {
            Some(part) => part.offset,
            None => self.items.len(),
        }
    }

    /// Re-derives index and offset for every part from `start` on.
    fn update_range(&mut self, start: usize) {
        let mut offset = match start.checked_sub(1).and_then(|i| self.parts.as_slice().get(i)) {
            Some(prev) => prev.offset + prev.count,
            None => 0,
        };
        for (i, part) in self.parts.iter_mut().enumerate().skip(start) {
            part.index.set(i);
            part.offset = offset;
            offset += part.count;
        }
    }
}

/// A live concatenation of a list of observable lists.
///
/// Both the parts themselves and the list of parts may change.
pub struct CompositeList<T> {
    this: Weak<Self>,
    parent: ListRef<ListRef<T>>,
    state: RefCell<CompositeState<T>>,
    hub: EventHub<T>,
    upstream: Upstream,
}

impl<T: Clone + 'static> CompositeList<T> {
    /// Concatenates the lists held by `parent`, following its changes.
    pub fn new(parent: ListRef<ListRef<T>>) -> Rc<Self> {
        let view = Rc::new_cyclic(|this| Self {
            this: this.clone(),
            parent: parent.clone(),
            state: RefCell::new(CompositeState {
                parts: Vec::new(),
                items: Vec::new(),
            }),
            hub: EventHub::new(),
            upstream: Upstream::new(),
        });
        view.rebuild();
        view.upstream
            .hold(observe(&parent, &view, |view: &Self, event| view.on_parent_change(event)));
        view
    }

    /// Concatenates a fixed sequence of lists.
    pub fn from_parts(parts: Vec<ListRef<T>>) -> Rc<Self> {
        Self::new(ObservableVec::new(parts).as_list())
    }

    /// Flattened start position of every part.
    pub fn offsets(&self) -> Vec<usize> {
        self.state.borrow().parts.iter().map(|p| p.offset).collect()
    }

    pub fn part_count(&self) -> usize {
        self.state.borrow().parts.len()
    }

    fn attach(&self, list: ListRef<T>, index: usize, offset: usize) -> Part<T> {
        let cell = Rc::new(Cell::new(index));
        let view = self.this.clone();
        let position = cell.clone();
        let subscription = list.subscribe(Rc::new(move |event: &ChangeEvent<T>| {
            if let Some(view) = view.upgrade() {
                view.on_part_change(position.get(), event);
            }
        }));
        Part {
            count: list.len(),
            list,
            index: cell,
            offset,
            _subscription: subscription,
        }
    }

    fn rebuild(&self) {
        let lists = self.parent.to_vec();
        let mut parts = Vec::with_capacity(lists.len());
        let mut items = Vec::new();
        for (index, list) in lists.into_iter().enumerate() {
            let part = self.attach(list, index, items.len());
            items.extend(part.list.to_vec());
            parts.push(part);
        }
        let mut state = self.state.borrow_mut();
        state.parts = parts;
        state.items = items;
    }

    fn on_part_change(&self, index: usize, event: &ChangeEvent<T>) {
        let (lifted, old_len) = {
            let mut state = self.state.borrow_mut();
            let old_len = state.items.len();
            let Some(part) = state.parts.as_slice().get(index) else {
                out_of_range(VIEW, index, 1, state.parts.len());
            };
            let (offset, count) = (part.offset, part.count);
            let lifted = match event {
                ChangeEvent::Add { index, items } => {
                    if *index > count {
                        out_of_range(VIEW, *index, 0, count);
                    }
                    let at = offset + index;
                    state.items.splice(at..at, items.iter().cloned());
                    Some(ChangeEvent::add(at, items.clone()))
                }
                ChangeEvent::Remove { index, items } => {
                    if index + items.len() > count {
                        out_of_range(VIEW, *index, items.len(), count);
                    }
                    let at = offset + index;
                    let removed: Vec<T> = state.items.drain(at..at + items.len()).collect();
                    Some(ChangeEvent::remove(at, removed))
                }
                ChangeEvent::Replace {
                    index,
                    old_items,
                    new_items,
                } => {
                    if index + old_items.len() > count {
                        out_of_range(VIEW, *index, old_items.len(), count);
                    }
                    let at = offset + index;
                    let removed: Vec<T> = state
                        .items
                        .splice(at..at + old_items.len(), new_items.iter().cloned())
                        .collect();
                    Some(ChangeEvent::replace(at, removed, new_items.clone()))
                }
                ChangeEvent::Move {
                    old_index,
                    new_index,
                    items,
                } => {
                    let n = items.len();
                    if old_index + n > count || new_index + n > count {
                        out_of_range(VIEW, core::cmp::max(*old_index, *new_index), n, count);
                    }
                    let block: Vec<T> = state
                        .items
                        .drain(offset + old_index..offset + old_index + n)
                        .collect();
                    let at = offset + new_index;
                    state.items.splice(at..at, block.iter().cloned());
                    Some(ChangeEvent::moved(offset + old_index, at, block))
                }
                ChangeEvent::Reset => {
                    let fresh = state.parts[index].list.to_vec();
                    let stale: Vec<T> = state
                        .items
                        .splice(offset..offset + count, fresh.iter().cloned())
                        .collect();
                    (!stale.is_empty() || !fresh.is_empty())
                        .then(|| ChangeEvent::replace(offset, stale, fresh))
                }
            };
            let new_count = (count + state.items.len()) - old_len;
            state.parts[index].count = new_count;
            if new_count != count {
                state.update_range(index + 1);
            }
            (lifted, old_len)
        };
        if let Some(event) = lifted {
            let new_len = self.len();
            self.hub.emit(&event, old_len, new_len);
        }
    }

    fn on_parent_change(&self, event: &ChangeEvent<ListRef<T>>) {
        if event.is_reset() {
            let old_len = self.len();
            self.rebuild();
            let new_len = self.len();
            tracing::debug!(
                target: "rivulet_incremental::composite",
                parts = self.part_count(),
                old_len,
                new_len,
                "composite rebuilt"
            );
            self.hub.emit(&ChangeEvent::Reset, old_len, new_len);
            return;
        }

        let (lifted, old_len) = {
            let mut state = self.state.borrow_mut();
            let old_len = state.items.len();
            let part_count = state.parts.len();
            let lifted = match event {
                ChangeEvent::Add { index, items } => {
                    if *index > part_count {
                        out_of_range(VIEW, *index, 0, part_count);
                    }
                    let at = state.offset_at(*index);
                    let (_, added) = self.splice_parts(&mut state, *index, 0, items);
                    ChangeEvent::add(at, added)
                }
                ChangeEvent::Remove { index, items } => {
                    if index + items.len() > part_count {
                        out_of_range(VIEW, *index, items.len(), part_count);
                    }
                    let at = state.offset_at(*index);
                    let (removed, _) = self.splice_parts(&mut state, *index, items.len(), &[]);
                    ChangeEvent::remove(at, removed)
                }
                ChangeEvent::Replace {
                    index,
                    old_items,
                    new_items,
                } => {
                    if index + old_items.len() > part_count {
                        out_of_range(VIEW, *index, old_items.len(), part_count);
                    }
                    let at = state.offset_at(*index);
                    let (stale, fresh) =
                        self.splice_parts(&mut state, *index, old_items.len(), new_items);
                    ChangeEvent::replace(at, stale, fresh)
                }
                ChangeEvent::Move {
                    old_index,
                    new_index,
                    items,
                } => {
                    let n = items.len();
                    if old_index + n > part_count || new_index + n > part_count {
                        out_of_range(VIEW, core::cmp::max(*old_index, *new_index), n, part_count);
                    }
                    let from = state.offset_at(*old_index);
                    let end = state.offset_at(old_index + n);
                    let moved: Vec<Part<T>> = state.parts.drain(*old_index..old_index + n).collect();
                    state.parts.splice(*new_index..*new_index, moved);
                    state.update_range(core::cmp::min(*old_index, *new_index));
                    let to = state.offset_at(*new_index);
                    let block: Vec<T> = state.items.drain(from..end).collect();
                    state.items.splice(to..to, block.iter().cloned());
                    ChangeEvent::moved(from, to, block)
                }
                ChangeEvent::Reset => ChangeEvent::Reset,
            };
            (lifted, old_len)
        };
        tracing::trace!(
            target: "rivulet_incremental::composite",
            action = ?event.action(),
            "parts spliced"
        );
        // Empty parts produce no visible change.
        if lifted.validate().is_ok() {
            let new_len = self.len();
            self.hub.emit(&lifted, old_len, new_len);
        }
    }

    /// Replaces `remove` parts at `index` with parts for `lists`, splicing
    /// their contents into the flattened items. Returns the removed and the
    /// inserted contents.
    fn splice_parts(
        &self,
        state: &mut CompositeState<T>,
        index: usize,
        remove: usize,
        lists: &[ListRef<T>],
    ) -> (Vec<T>, Vec<T>) {
        let at = state.offset_at(index);
        let end = state.offset_at(index + remove);
        state.parts.drain(index..index + remove);
        let mut fresh = Vec::new();
        let mut incoming = Vec::with_capacity(lists.len());
        for (k, list) in lists.iter().enumerate() {
            let part = self.attach(list.clone(), index + k, at + fresh.len());
            fresh.extend(part.list.to_vec());
            incoming.push(part);
        }
        state.parts.splice(index..index, incoming);
        let stale: Vec<T> = state.items.splice(at..end, fresh.iter().cloned()).collect();
        state.update_range(index);
        (stale, fresh)
    }
}

impl<T: Clone + 'static> DerivedView for CompositeList<T> {
    fn dispose(&self) {
        if self.upstream.dispose() {
            // Dropping the parts drops their subscriptions.
            let parts = core::mem::take(&mut self.state.borrow_mut().parts);
            drop(parts);
            tracing::debug!(target: "rivulet_incremental::composite", "composite disposed");
        }
    }

    fn is_disposed(&self) -> bool {
        self.upstream.is_disposed()
    }
}

impl<T: Clone> ReadList<T> for CompositeList<T> {
    fn len(&self) -> usize {
        self.state.borrow().items.len()
    }

    fn get(&self, index: usize) -> Option<T> {
        self.state.borrow().items.as_slice().get(index).cloned()
    }

    fn to_vec(&self) -> Vec<T> {
        self.state.borrow().items.clone()
    }
}

impl<T: Clone + 'static> ObservableList<T> for CompositeList<T> {
    fn subscribe(&self, listener: ChangeListener<T>) -> Subscription {
        self.hub.subscribe(listener)
    }

    fn subscribe_count(&self, listener: CountListener) -> Subscription {
        self.hub.subscribe_count(listener)
    }
}
