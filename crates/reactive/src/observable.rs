//! The observable sequence interface.
//!
//! `ObservableList` is both what derived views consume from their sources and
//! what they expose to their own listeners, so views compose to any depth.

use crate::subscription::{ChangeListener, CountListener, Subscription};
use alloc::rc::Rc;
use rivulet_core::{ChangeEvent, ReadList};

/// A readable sequence that raises one `ChangeEvent` per mutation and a
/// count notification whenever its length changes.
pub trait ObservableList<T>: ReadList<T> {
    /// Registers a change listener.
    fn subscribe(&self, listener: ChangeListener<T>) -> Subscription;

    /// Registers a count listener.
    fn subscribe_count(&self, listener: CountListener) -> Subscription;
}

/// Shared, type-erased handle to an observable sequence.
pub type ListRef<T> = Rc<dyn ObservableList<T>>;

/// Convenience helpers over any observable sequence.
pub trait ObservableListExt<T>: ObservableList<T> {
    /// Registers a change listener from a closure.
    fn on_change<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ChangeEvent<T>) + 'static,
    {
        self.subscribe(Rc::new(listener))
    }

    /// Registers a count listener from a closure.
    fn on_count<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&usize) + 'static,
    {
        self.subscribe_count(Rc::new(listener))
    }
}

impl<T, L: ObservableList<T> + ?Sized> ObservableListExt<T> for L {}

/// Converts a concrete shared view into a `ListRef`.
pub trait IntoListRef<T> {
    fn into_list_ref(self) -> ListRef<T>;
}

impl<T, L> IntoListRef<T> for Rc<L>
where
    L: ObservableList<T> + 'static,
{
    fn into_list_ref(self) -> ListRef<T> {
        self
    }
}
