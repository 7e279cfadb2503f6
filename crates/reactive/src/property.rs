//! Observable values and item-level triggers.
//!
//! A `Property` is a shared value that notifies subscribers when it is set.
//! A `Trigger` is the item-level capability derived views use to learn that
//! a watched part of one item changed without any collection mutation.

use crate::subscription::{ListenerList, Subscription};
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;

struct PropertyInner<V> {
    value: RefCell<V>,
    listeners: Rc<ListenerList<V>>,
}

/// A shared observable value.
///
/// Clones share the same underlying value and listeners.
pub struct Property<V> {
    inner: Rc<PropertyInner<V>>,
}

impl<V> Clone for Property<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for Property<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Property").field(&*self.inner.value.borrow()).finish()
    }
}

impl<V: Default + 'static> Default for Property<V> {
    fn default() -> Self {
        Self::new(V::default())
    }
}

impl<V: 'static> Property<V> {
    /// Creates a property holding `value`.
    pub fn new(value: V) -> Self {
        Self {
            inner: Rc::new(PropertyInner {
                value: RefCell::new(value),
                listeners: ListenerList::new(),
            }),
        }
    }

    /// Reads the value through a closure.
    pub fn with<R>(&self, f: impl FnOnce(&V) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Stores `value` and notifies every subscriber.
    pub fn set(&self, value: V) {
        *self.inner.value.borrow_mut() = value;
        self.notify();
    }

    /// Mutates the value in place and notifies every subscriber.
    pub fn update(&self, f: impl FnOnce(&mut V)) {
        f(&mut self.inner.value.borrow_mut());
        self.notify();
    }

    /// Registers a listener invoked with the new value after each change.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&V) + 'static,
    {
        self.inner.listeners.subscribe(Rc::new(listener))
    }

    /// Returns true if both handles share the same value.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.listeners.len()
    }

    fn notify(&self) {
        let value = self.inner.value.borrow();
        self.inner.listeners.notify(&value);
    }
}

impl<V: Clone + 'static> Property<V> {
    /// Returns a copy of the value.
    pub fn get(&self) -> V {
        self.inner.value.borrow().clone()
    }
}

impl<V: PartialEq + 'static> Property<V> {
    /// Stores `value` and notifies only if it differs from the current one.
    ///
    /// Returns true if the value changed.
    pub fn set_if_changed(&self, value: V) -> bool {
        if *self.inner.value.borrow() == value {
            return false;
        }
        self.set(value);
        true
    }
}

/// Callback handed to a trigger; invoked when the watched state changes.
pub type Notify = Rc<dyn Fn()>;

type WatchFn<T> = dyn Fn(&T, Notify) -> Vec<Subscription>;

/// Item-level trigger capability.
///
/// Given an item and a callback, a trigger registers whatever observation is
/// needed so that the callback runs whenever the watched part of that item
/// changes. The returned handle keeps the observation alive.
pub struct Trigger<T> {
    watch: Rc<WatchFn<T>>,
}

impl<T> Clone for Trigger<T> {
    fn clone(&self) -> Self {
        Self {
            watch: self.watch.clone(),
        }
    }
}

impl<T: 'static> Trigger<T> {
    /// Creates a trigger from a raw watch function.
    pub fn new<F>(watch: F) -> Self
    where
        F: Fn(&T, Notify) -> Vec<Subscription> + 'static,
    {
        Self {
            watch: Rc::new(watch),
        }
    }

    /// Creates a trigger that fires whenever the property selected from the
    /// item is set.
    pub fn on_property<V, F>(selector: F) -> Self
    where
        V: 'static,
        F: Fn(&T) -> Property<V> + 'static,
    {
        Self::new(move |item, notify| {
            let property = selector(item);
            let sub = property.subscribe(move |_| notify());
            alloc::vec![sub]
        })
    }

    /// Creates a trigger that fires when either trigger fires.
    pub fn or(self, other: Trigger<T>) -> Self {
        Self::new(move |item, notify| {
            let mut subs = (self.watch)(item, notify.clone());
            subs.extend((other.watch)(item, notify));
            subs
        })
    }

    /// Starts watching `item`.
    pub fn attach(&self, item: &T, notify: Notify) -> TriggerHandle {
        TriggerHandle {
            subscriptions: (self.watch)(item, notify),
        }
    }
}

/// Keeps one item's trigger observation alive; dropping it detaches.
#[derive(Debug, Default)]
pub struct TriggerHandle {
    subscriptions: Vec<Subscription>,
}

impl TriggerHandle {
    /// Detaches the trigger now.
    pub fn detach(self) {
        drop(self);
    }

    /// Returns true if any observation is still registered.
    pub fn is_attached(&self) -> bool {
        self.subscriptions.iter().any(Subscription::is_active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use core::cell::Cell;

    #[test]
    fn test_property_set_notifies() {
        let p = Property::new(1);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        let _sub = p.subscribe(move |v| s.borrow_mut().push(*v));

        p.set(2);
        p.update(|v| *v += 1);

        assert_eq!(p.get(), 3);
        assert_eq!(*seen.borrow(), vec![2, 3]);
    }

    #[test]
    fn test_property_set_if_changed() {
        let p = Property::new(5);
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        let _sub = p.subscribe(move |_| h.set(h.get() + 1));

        assert!(!p.set_if_changed(5));
        assert!(p.set_if_changed(6));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_property_clone_shares_value() {
        let a = Property::new(1);
        let b = a.clone();
        b.set(9);
        assert_eq!(a.get(), 9);
        assert!(a.ptr_eq(&b));
    }

    #[test]
    fn test_trigger_on_property() {
        let item = Rc::new(Property::new(0));
        let trigger = Trigger::on_property(|p: &Rc<Property<i32>>| (**p).clone());
        let fired = Rc::new(Cell::new(0));
        let f = fired.clone();

        let handle = trigger.attach(&item, Rc::new(move || f.set(f.get() + 1)));
        assert!(handle.is_attached());
        item.set(1);
        item.set(2);
        assert_eq!(fired.get(), 2);

        handle.detach();
        item.set(3);
        assert_eq!(fired.get(), 2);
        assert_eq!(item.subscriber_count(), 0);
    }

    #[test]
    fn test_trigger_or() {
        let a = Property::new(0);
        let b = Property::new(0);
        let item = (a.clone(), b.clone());
        let trigger = Trigger::on_property(|i: &(Property<i32>, Property<i32>)| i.0.clone())
            .or(Trigger::on_property(|i: &(Property<i32>, Property<i32>)| i.1.clone()));
        let fired = Rc::new(Cell::new(0));
        let f = fired.clone();
        let _handle = trigger.attach(&item, Rc::new(move || f.set(f.get() + 1)));

        a.set(1);
        b.set(1);
        assert_eq!(fired.get(), 2);
    }
}
