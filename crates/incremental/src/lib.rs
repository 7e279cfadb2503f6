//! Rivulet Incremental - derived views kept in sync with observable sources.
//!
//! Every view in this crate subscribes to one or more `ObservableList`s and
//! turns each upstream change event into the minimal set of change events on
//! its own contents, maintaining just enough auxiliary state (inclusion
//! counts, cached sort keys, group positions, part offsets) to do so without
//! re-reading the source.
//!
//! # Core Concepts
//!
//! - `ItemContainer` / `ContainerList`: per-item wrappers carrying a view's
//!   bookkeeping, the item's source index and its trigger registration
//! - `DerivedView`: lifecycle shared by every view (`dispose`)
//! - `Trigger`: lets an item re-enter a view's logic without a source event
//!
//! # Views
//!
//! - `FilteredList`, `SortedList`, `TransformedList`, `DynamicTransformedList`
//! - `GroupedList` with explicit and implicit groups
//! - `CompositeList`: flattened concatenation of a list of lists
//! - `SetOperationList`: distinct, union, intersect, except
//! - `JoinedList`, `ZippedList`
//! - `RangeList`, `ReversedList`, `TakeWhileList`
//! - `Selector` / `EditableSelector`: a selection that follows source edits
//!
//! Views must be held (they are returned as `Rc`) for as long as they should
//! stay live; the source only holds a weak reference to them.
//!
//! # Example
//!
//! ```ignore
//! use rivulet_incremental::{FilteredList, SortedList};
//! use rivulet_reactive::ObservableVec;
//!
//! let source = ObservableVec::new(vec![5, 1, 4, 2, 3]);
//! let odd = FilteredList::new(source.as_list(), |x: &i32| x % 2 == 1);
//! let sorted = SortedList::by_key(odd.clone(), |x: &i32| *x);
//!
//! source.push(7);
//! assert_eq!(sorted.to_vec(), vec![1, 3, 5, 7]);
//! ```

#![no_std]

extern crate alloc;

pub mod container;
pub mod operators;
pub mod selector;
mod view;

pub use container::{ContainerList, ItemContainer};
pub use operators::{
    CompositeList, DynamicTransformedList, FilteredList, Group, GroupRef, GroupedList,
    GroupedListBuilder, JoinedList, JoinedListBuilder, RangeList, ReversedList, SetOperation,
    SetOperationList, SortedList, TakeWhileList, TransformedList, TransformedListBuilder,
    ZippedList,
};
pub use selector::{EditableSelector, Selection, Selector};
pub use view::DerivedView;
