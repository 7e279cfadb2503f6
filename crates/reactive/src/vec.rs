//! Base mutable observable collection.
//!
//! `ObservableVec` is the root of every view graph: callers mutate it, and it
//! raises exactly one `ChangeEvent` per mutation after its own storage has
//! been updated.

use crate::observable::{ListRef, ObservableList};
use crate::subscription::{ChangeListener, CountListener, EventHub, Subscription};
use alloc::rc::Rc;
use alloc::vec;
use alloc::vec::Vec;
use core::cell::RefCell;
use rivulet_core::{check_index, check_insert_index, check_range, ChangeEvent, ReadList, Result};

/// A mutable sequence that notifies listeners of every change.
///
/// # Example
///
/// ```ignore
/// use rivulet_reactive::{ObservableListExt, ObservableVec};
///
/// let numbers = ObservableVec::new(vec![1, 2, 3]);
/// let _sub = numbers.on_change(|event| println!("{:?}", event));
/// numbers.push(4); // prints Add { index: 3, items: [4] }
/// ```
pub struct ObservableVec<T> {
    items: RefCell<Vec<T>>,
    hub: EventHub<T>,
}

impl<T: Clone + 'static> ObservableVec<T> {
    /// Creates a shared observable vector with initial items.
    pub fn new(items: Vec<T>) -> Rc<Self> {
        Rc::new(Self {
            items: RefCell::new(items),
            hub: EventHub::new(),
        })
    }

    /// Creates an empty shared observable vector.
    pub fn empty() -> Rc<Self> {
        Self::new(Vec::new())
    }

    /// Returns this vector as a type-erased list handle.
    pub fn as_list(self: &Rc<Self>) -> ListRef<T> {
        self.clone()
    }

    /// Returns a snapshot of the items.
    pub fn items(&self) -> Vec<T> {
        self.items.borrow().clone()
    }

    /// Appends an item.
    pub fn push(&self, item: T) {
        let index = self.items.borrow().len();
        self.commit_add(index, vec![item]);
    }

    /// Appends several items as one Add event.
    pub fn extend(&self, items: Vec<T>) {
        if items.is_empty() {
            return;
        }
        let index = self.items.borrow().len();
        self.commit_add(index, items);
    }

    /// Inserts an item at `index`.
    pub fn insert(&self, index: usize, item: T) -> Result<()> {
        self.insert_many(index, vec![item])
    }

    /// Inserts several items at `index` as one Add event.
    pub fn insert_many(&self, index: usize, items: Vec<T>) -> Result<()> {
        check_insert_index(index, self.len())?;
        if !items.is_empty() {
            self.commit_add(index, items);
        }
        Ok(())
    }

    /// Removes and returns the item at `index`.
    pub fn remove_at(&self, index: usize) -> Result<T> {
        let mut removed = self.remove_range(index, 1)?;
        Ok(removed.remove(0))
    }

    /// Removes `count` items starting at `index` as one Remove event.
    pub fn remove_range(&self, index: usize, count: usize) -> Result<Vec<T>> {
        let old_len = self.len();
        check_range(index, count, old_len)?;
        if count == 0 {
            return Ok(Vec::new());
        }
        let removed: Vec<T> = self
            .items
            .borrow_mut()
            .drain(index..index + count)
            .collect();
        self.hub.emit(
            &ChangeEvent::remove(index, removed.clone()),
            old_len,
            old_len - count,
        );
        Ok(removed)
    }

    /// Replaces the item at `index`, returning the previous one.
    pub fn set(&self, index: usize, item: T) -> Result<T> {
        let len = self.len();
        check_index(index, len)?;
        let old = core::mem::replace(&mut self.items.borrow_mut()[index], item.clone());
        self.hub
            .emit(&ChangeEvent::replace(index, vec![old.clone()], vec![item]), len, len);
        Ok(old)
    }

    /// Replaces `count` items starting at `index` with `items` as one Replace
    /// event. The lengths may differ.
    pub fn replace_range(&self, index: usize, count: usize, items: Vec<T>) -> Result<Vec<T>> {
        let old_len = self.len();
        check_range(index, count, old_len)?;
        if count == 0 && items.is_empty() {
            return Ok(Vec::new());
        }
        let new_len = old_len - count + items.len();
        let old: Vec<T> = self
            .items
            .borrow_mut()
            .splice(index..index + count, items.iter().cloned())
            .collect();
        self.hub
            .emit(&ChangeEvent::replace(index, old.clone(), items), old_len, new_len);
        Ok(old)
    }

    /// Moves one item from `old_index` to `new_index`.
    pub fn move_item(&self, old_index: usize, new_index: usize) -> Result<()> {
        self.move_range(old_index, 1, new_index)
    }

    /// Moves the block `old_index..old_index + count` so that it starts at
    /// `new_index` in the resulting sequence.
    pub fn move_range(&self, old_index: usize, count: usize, new_index: usize) -> Result<()> {
        let len = self.len();
        check_range(old_index, count, len)?;
        check_range(new_index, count, len)?;
        if count == 0 || old_index == new_index {
            return Ok(());
        }
        let block: Vec<T> = {
            let mut items = self.items.borrow_mut();
            let block: Vec<T> = items.drain(old_index..old_index + count).collect();
            items.splice(new_index..new_index, block.iter().cloned());
            block
        };
        self.hub
            .emit(&ChangeEvent::moved(old_index, new_index, block), len, len);
        Ok(())
    }

    /// Removes every item and raises Reset.
    pub fn clear(&self) {
        self.reset(Vec::new());
    }

    /// Replaces the whole content and raises Reset.
    pub fn reset(&self, items: Vec<T>) {
        let old_len = self.len();
        let new_len = items.len();
        *self.items.borrow_mut() = items;
        self.hub.emit(&ChangeEvent::Reset, old_len, new_len);
    }

    fn commit_add(&self, index: usize, items: Vec<T>) {
        let old_len = self.len();
        let new_len = old_len + items.len();
        {
            let mut storage = self.items.borrow_mut();
            storage.splice(index..index, items.iter().cloned());
        }
        self.hub.emit(&ChangeEvent::add(index, items), old_len, new_len);
    }
}

impl<T: Clone + PartialEq + 'static> ObservableVec<T> {
    /// Returns the index of the first item equal to `item`.
    pub fn index_of(&self, item: &T) -> Option<usize> {
        self.items.borrow().iter().position(|x| x == item)
    }

    /// Removes the first item equal to `item`.
    ///
    /// Returns true if an item was removed.
    pub fn remove_item(&self, item: &T) -> bool {
        match self.index_of(item) {
            Some(index) => self.remove_range(index, 1).is_ok(),
            None => false,
        }
    }
}

impl<T: Clone> ReadList<T> for ObservableVec<T> {
    fn len(&self) -> usize {
        self.items.borrow().len()
    }

    fn get(&self, index: usize) -> Option<T> {
        self.items.borrow().as_slice().get(index).cloned()
    }

    fn to_vec(&self) -> Vec<T> {
        self.items.borrow().clone()
    }
}

impl<T: Clone + 'static> ObservableList<T> for ObservableVec<T> {
    fn subscribe(&self, listener: ChangeListener<T>) -> Subscription {
        self.hub.subscribe(listener)
    }

    fn subscribe_count(&self, listener: CountListener) -> Subscription {
        self.hub.subscribe_count(listener)
    }
}
