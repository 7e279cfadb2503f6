//! Listener registries and subscription handles.
//!
//! A `ListenerList` owns the callbacks registered on one publisher. Each
//! registration returns a `Subscription` guard; dropping the guard (or calling
//! `unsubscribe`) removes the callback. Listeners are invoked in subscription
//! order, and the list is snapshotted before dispatch so a listener may
//! subscribe or unsubscribe while a notification is in flight.

use alloc::boxed::Box;
use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use rivulet_core::ChangeEvent;

/// Unique identifier for a subscription within one listener list.
pub type SubscriptionId = u64;

/// A registered callback receiving `&A`.
pub type Callback<A> = Rc<dyn Fn(&A)>;

/// Callback type for collection change notifications.
pub type ChangeListener<T> = Callback<ChangeEvent<T>>;

/// Callback type for count change notifications.
pub type CountListener = Callback<usize>;

/// Handle to a registered listener.
///
/// The listener stays registered for as long as this handle lives.
#[must_use = "dropping a Subscription unsubscribes its listener"]
pub struct Subscription {
    id: SubscriptionId,
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Creates a subscription that runs `cancel` when released.
    pub fn new<F>(id: SubscriptionId, cancel: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        Self {
            id,
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Creates a subscription that is not attached to anything.
    pub fn empty() -> Self {
        Self { id: 0, cancel: None }
    }

    /// Returns the subscription ID.
    #[inline]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns whether this subscription still holds a registration.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }

    /// Removes the listener now.
    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl core::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Ordered registry of callbacks for one publisher.
pub struct ListenerList<A: ?Sized> {
    listeners: RefCell<Vec<(SubscriptionId, Callback<A>)>>,
    next_id: Cell<SubscriptionId>,
}

impl<A: ?Sized + 'static> ListenerList<A> {
    /// Creates a new, shared, empty listener list.
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            listeners: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
        })
    }

    /// Registers `callback` and returns its subscription guard.
    pub fn subscribe(self: &Rc<Self>, callback: Callback<A>) -> Subscription {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.listeners.borrow_mut().push((id, callback));

        let weak: Weak<Self> = Rc::downgrade(self);
        Subscription::new(id, move || {
            if let Some(list) = weak.upgrade() {
                list.unsubscribe(id);
            }
        })
    }

    /// Removes the listener with this ID.
    ///
    /// Returns true if the listener was found and removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(sid, _)| *sid != id);
        listeners.len() != before
    }

    /// Invokes every listener, in subscription order.
    pub fn notify(&self, arg: &A) {
        let snapshot: Vec<Callback<A>> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for callback in snapshot {
            callback(arg);
        }
    }

    /// Returns the number of registered listeners.
    #[inline]
    pub fn len(&self) -> usize {
        self.listeners.borrow().len()
    }

    /// Returns true if there are no listeners.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.listeners.borrow().is_empty()
    }

    /// Removes every listener.
    pub fn clear(&self) {
        self.listeners.borrow_mut().clear();
    }
}

/// The produced interface of an observable sequence: one change-listener list
/// and one count-listener list.
pub struct EventHub<T> {
    changes: Rc<ListenerList<ChangeEvent<T>>>,
    counts: Rc<ListenerList<usize>>,
}

impl<T: 'static> Default for EventHub<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> EventHub<T> {
    /// Creates a hub with no listeners.
    pub fn new() -> Self {
        Self {
            changes: ListenerList::new(),
            counts: ListenerList::new(),
        }
    }

    /// Registers a change listener.
    pub fn subscribe(&self, listener: ChangeListener<T>) -> Subscription {
        self.changes.subscribe(listener)
    }

    /// Registers a count listener.
    pub fn subscribe_count(&self, listener: CountListener) -> Subscription {
        self.counts.subscribe(listener)
    }

    /// Raises `event`, then the new count if it differs from `old_len`.
    ///
    /// Callers must have finished mutating their own state before calling.
    pub fn emit(&self, event: &ChangeEvent<T>, old_len: usize, new_len: usize) {
        self.changes.notify(event);
        if old_len != new_len {
            self.counts.notify(&new_len);
        }
    }

    /// Returns the number of change listeners.
    #[inline]
    pub fn listener_count(&self) -> usize {
        self.changes.len()
    }

    /// Drops every listener.
    pub fn clear(&self) {
        self.changes.clear();
        self.counts.clear();
    }
}
