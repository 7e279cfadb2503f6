//! Derived views.
//!
//! Each view subscribes to its source(s), keeps whatever index it needs to
//! translate one upstream event into a small number of downstream events,
//! and re-exposes the `ObservableList` interface so views compose:
//! - Filter: items passing a (possibly live) predicate
//! - Sort: items ordered by a comparer or a (possibly live) key
//! - Transform: 1:1 projection, static or observable per item
//! - Group: items partitioned by key into observable groups
//! - Composite: concatenation of a list of lists
//! - Set operations: distinct, union, intersect, except
//! - Join / Zip: pairing by key or by position
//! - Range / Reversed / Prefix: positional windows

mod composite;
mod filter;
mod group;
mod join;
mod prefix;
mod range;
mod reversed;
mod set_ops;
mod sort;
mod transform;
mod zip;

pub use composite::CompositeList;
pub use filter::FilteredList;
pub use group::{Group, GroupRef, GroupedList, GroupedListBuilder};
pub use join::{JoinedList, JoinedListBuilder};
pub use prefix::TakeWhileList;
pub use range::RangeList;
pub use reversed::ReversedList;
pub use set_ops::{SetOperation, SetOperationList};
pub use sort::SortedList;
pub use transform::{DynamicTransformedList, TransformedList, TransformedListBuilder};
pub use zip::ZippedList;
