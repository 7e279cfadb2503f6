//! Plumbing shared by every derived view.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;
use rivulet_core::{ChangeEvent, Error};
use rivulet_reactive::{ListRef, Subscription};

/// Lifecycle shared by all derived views.
pub trait DerivedView {
    /// Drops the upstream subscriptions and every per-item trigger.
    ///
    /// After disposal the view keeps its last contents but no longer follows
    /// its sources.
    fn dispose(&self);

    /// Returns true once `dispose` has been called.
    fn is_disposed(&self) -> bool;
}

/// The upstream subscriptions one view holds.
#[derive(Default)]
pub(crate) struct Upstream {
    subscriptions: RefCell<Vec<Subscription>>,
    disposed: core::cell::Cell<bool>,
}

impl Upstream {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn hold(&self, subscription: Subscription) {
        self.subscriptions.borrow_mut().push(subscription);
    }

    /// Releases every subscription. Returns false if already disposed.
    pub(crate) fn dispose(&self) -> bool {
        if self.disposed.replace(true) {
            return false;
        }
        let subscriptions = core::mem::take(&mut *self.subscriptions.borrow_mut());
        drop(subscriptions);
        true
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.get()
    }
}

/// Subscribes `view` to `source` through a weak reference, so the upstream
/// listener never keeps the view alive.
pub(crate) fn observe<T, V, F>(source: &ListRef<T>, view: &Rc<V>, handler: F) -> Subscription
where
    T: 'static,
    V: 'static,
    F: Fn(&V, &ChangeEvent<T>) + 'static,
{
    let weak = Rc::downgrade(view);
    source.subscribe(Rc::new(move |event| {
        if let Some(view) = weak.upgrade() {
            handler(&view, event);
        }
    }))
}

/// Reports an internal inconsistency and aborts the current notification.
///
/// Called from change handlers, where there is no caller to hand a `Result`
/// back to; the panic unwinds out of the mutation that raised the event.
#[cold]
#[track_caller]
pub(crate) fn contract_violation(view: &'static str, err: Error) -> ! {
    tracing::error!(
        target: "rivulet_incremental",
        view,
        error = %err,
        "derived view is out of sync with its source"
    );
    panic!("{view}: {err}")
}

/// Shorthand for an upstream event whose indices do not fit this view.
#[cold]
#[track_caller]
pub(crate) fn out_of_range(view: &'static str, start: usize, count: usize, len: usize) -> ! {
    contract_violation(view, Error::range_out_of_bounds(start, count, len))
}

/// Checks that `event` fits a source of `len` items as it was before the
/// event, aborting the notification otherwise.
#[track_caller]
pub(crate) fn check_event<T>(view: &'static str, event: &ChangeEvent<T>, len: usize) {
    let fits = match event {
        ChangeEvent::Add { index, .. } => *index <= len,
        ChangeEvent::Remove { index, items } => index + items.len() <= len,
        ChangeEvent::Replace {
            index, old_items, ..
        } => index + old_items.len() <= len,
        ChangeEvent::Move {
            old_index,
            new_index,
            items,
        } => core::cmp::max(*old_index, *new_index) + items.len() <= len,
        ChangeEvent::Reset => true,
    };
    if !fits {
        let start = event.first_affected().unwrap_or(0);
        let count = event.old_items().len().max(event.new_items().len());
        out_of_range(view, start, count, len);
    }
}
