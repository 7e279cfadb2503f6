//! Per-item containers.
//!
//! A container wraps one source item together with the derived state a view
//! keeps for it (inclusion flag, cached key, group position, ...), the item's
//! current index in the source, and the item's trigger registration.

use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::{Cell, Ref, RefCell, RefMut};
use rivulet_reactive::{Trigger, TriggerHandle};

/// One wrapped source item with view-specific state `S`.
pub struct ItemContainer<T, S> {
    item: T,
    source_index: Cell<usize>,
    state: RefCell<S>,
    trigger: RefCell<Option<TriggerHandle>>,
}

impl<T: 'static, S: 'static> ItemContainer<T, S> {
    pub fn new(item: T, source_index: usize, state: S) -> Rc<Self> {
        Rc::new(Self {
            item,
            source_index: Cell::new(source_index),
            state: RefCell::new(state),
            trigger: RefCell::new(None),
        })
    }

    /// Starts watching the item with `trigger`.
    ///
    /// When the trigger fires, `on_fire` runs with the owning view and this
    /// container, provided both are still alive. A previous registration is
    /// replaced.
    pub fn attach<V, F>(self: &Rc<Self>, trigger: &Trigger<T>, view: Weak<V>, on_fire: F)
    where
        V: 'static,
        F: Fn(&V, &Rc<Self>) + 'static,
    {
        let container = Rc::downgrade(self);
        let handle = trigger.attach(
            &self.item,
            Rc::new(move || {
                if let (Some(view), Some(container)) = (view.upgrade(), container.upgrade()) {
                    if container.is_attached() {
                        on_fire(&view, &container);
                    }
                }
            }),
        );
        *self.trigger.borrow_mut() = Some(handle);
    }
}

impl<T, S> ItemContainer<T, S> {
    #[inline]
    pub fn item(&self) -> &T {
        &self.item
    }

    /// Position of the item in the source sequence.
    #[inline]
    pub fn source_index(&self) -> usize {
        self.source_index.get()
    }

    #[inline]
    pub fn set_source_index(&self, index: usize) {
        self.source_index.set(index);
    }

    pub fn state(&self) -> Ref<'_, S> {
        self.state.borrow()
    }

    pub fn state_mut(&self) -> RefMut<'_, S> {
        self.state.borrow_mut()
    }

    /// Drops the trigger registration, if any.
    pub fn detach(&self) {
        let handle = self.trigger.borrow_mut().take();
        drop(handle);
    }

    pub fn is_attached(&self) -> bool {
        self.trigger.borrow().is_some()
    }
}

/// Source-ordered containers with `source_index` kept equal to the position.
pub struct ContainerList<T, S> {
    entries: Vec<Rc<ItemContainer<T, S>>>,
}

impl<T, S> Default for ContainerList<T, S> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: 'static, S: 'static> ContainerList<T, S> {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Rc<ItemContainer<T, S>>> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> core::slice::Iter<'_, Rc<ItemContainer<T, S>>> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[Rc<ItemContainer<T, S>>] {
        &self.entries
    }

    /// Appends a container without renumbering; its index must already be
    /// `len()`.
    pub fn push(&mut self, container: Rc<ItemContainer<T, S>>) {
        debug_assert_eq!(container.source_index(), self.entries.len());
        self.entries.push(container);
    }

    /// Inserts `block` at `index` and renumbers the suffix.
    pub fn insert_block(&mut self, index: usize, block: Vec<Rc<ItemContainer<T, S>>>) {
        self.entries.splice(index..index, block);
        self.renumber(index, self.entries.len());
    }

    /// Removes `count` containers at `index`, detaches them and renumbers the
    /// suffix.
    pub fn remove_block(&mut self, index: usize, count: usize) -> Vec<Rc<ItemContainer<T, S>>> {
        let removed: Vec<_> = self.entries.drain(index..index + count).collect();
        for container in &removed {
            container.detach();
        }
        self.renumber(index, self.entries.len());
        removed
    }

    /// Moves the block `old..old + count` so it starts at `new`, renumbering
    /// only the span the move touched.
    pub fn move_block(&mut self, old: usize, new: usize, count: usize) {
        if old == new || count == 0 {
            return;
        }
        let block: Vec<_> = self.entries.drain(old..old + count).collect();
        self.entries.splice(new..new, block);
        let start = core::cmp::min(old, new);
        let end = core::cmp::max(old, new) + count;
        self.renumber(start, end);
    }

    /// Rewrites `source_index` for positions `start..end`.
    pub fn renumber(&self, start: usize, end: usize) {
        for (offset, container) in self.entries[start..end].iter().enumerate() {
            container.set_source_index(start + offset);
        }
    }

    /// Removes and detaches every container.
    pub fn clear(&mut self) -> Vec<Rc<ItemContainer<T, S>>> {
        let removed = core::mem::take(&mut self.entries);
        for container in &removed {
            container.detach();
        }
        removed
    }

    /// Detaches every trigger while keeping the containers.
    pub fn detach_all(&self) {
        for container in &self.entries {
            container.detach();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use rivulet_reactive::Property;

    fn containers(items: &[i32]) -> ContainerList<i32, ()> {
        let mut list = ContainerList::new();
        for (i, item) in items.iter().enumerate() {
            list.push(ItemContainer::new(*item, i, ()));
        }
        list
    }

    fn snapshot(list: &ContainerList<i32, ()>) -> Vec<(i32, usize)> {
        list.iter().map(|c| (*c.item(), c.source_index())).collect()
    }

    #[test]
    fn test_insert_block_renumbers_suffix() {
        let mut list = containers(&[1, 2, 3]);
        list.insert_block(1, vec![ItemContainer::new(9, 0, ()), ItemContainer::new(8, 0, ())]);
        assert_eq!(snapshot(&list), vec![(1, 0), (9, 1), (8, 2), (2, 3), (3, 4)]);
    }

    #[test]
    fn test_remove_block() {
        let mut list = containers(&[1, 2, 3, 4]);
        let removed = list.remove_block(1, 2);
        assert_eq!(removed.len(), 2);
        assert_eq!(snapshot(&list), vec![(1, 0), (4, 1)]);
    }

    #[test]
    fn test_move_block() {
        let mut list = containers(&[0, 1, 2, 3, 4, 5]);
        list.move_block(1, 3, 2);
        assert_eq!(
            snapshot(&list),
            vec![(0, 0), (3, 1), (4, 2), (1, 3), (2, 4), (5, 5)]
        );
        list.move_block(3, 0, 2);
        assert_eq!(
            snapshot(&list),
            vec![(1, 0), (2, 1), (0, 2), (3, 3), (4, 4), (5, 5)]
        );
    }

    #[test]
    fn test_attach_and_detach() {
        let property = Property::new(0);
        let trigger = Trigger::on_property(|p: &Property<i32>| p.clone());
        let view = Rc::new(Cell::new(0));
        let container = ItemContainer::new(property.clone(), 0, ());

        container.attach(&trigger, Rc::downgrade(&view), |v: &Cell<i32>, _| v.set(v.get() + 1));
        property.set(1);
        assert_eq!(view.get(), 1);

        container.detach();
        property.set(2);
        assert_eq!(view.get(), 1);
        assert_eq!(property.subscriber_count(), 0);
    }

    #[test]
    fn test_trigger_ignored_after_view_dropped() {
        let property = Property::new(0);
        let trigger = Trigger::on_property(|p: &Property<i32>| p.clone());
        let view = Rc::new(Cell::new(0));
        let container = ItemContainer::new(property.clone(), 0, ());
        container.attach(&trigger, Rc::downgrade(&view), |v: &Cell<i32>, _| v.set(v.get() + 1));

        drop(view);
        property.set(1);
        assert!(container.is_attached());
    }
}
