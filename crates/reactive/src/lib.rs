//! Rivulet Reactive - observable sequences and notification plumbing.
//!
//! This crate implements the interface every rivulet view consumes and
//! produces: a readable sequence that raises one change event per mutation
//! plus a count notification when its length changes.
//!
//! # Core Concepts
//!
//! - `ObservableList`: the consumed/produced sequence interface
//! - `ObservableVec`: the base mutable collection at the root of a view graph
//! - `ListenerList` / `EventHub`: ordered, re-entrancy safe listener registries
//! - `Subscription`: guard that unsubscribes on drop or explicit `unsubscribe`
//! - `Property`: a shared observable value
//! - `Trigger`: item-level "this item's watched state changed" capability
//!
//! # Example
//!
//! ```ignore
//! use rivulet_reactive::{ObservableListExt, ObservableVec};
//!
//! let source = ObservableVec::new(vec![1, 2, 3]);
//! let _sub = source.on_change(|event| {
//!     println!("{:?}", event.action());
//! });
//! source.push(4);
//! ```

#![no_std]

extern crate alloc;

pub mod observable;
pub mod property;
pub mod subscription;
pub mod vec;

pub use observable::{IntoListRef, ListRef, ObservableList, ObservableListExt};
pub use property::{Notify, Property, Trigger, TriggerHandle};
pub use subscription::{
    Callback, ChangeListener, CountListener, EventHub, ListenerList, Subscription, SubscriptionId,
};
pub use vec::ObservableVec;

// Re-export commonly used types from dependencies
pub use rivulet_core::{ChangeAction, ChangeEvent, ReadList};
