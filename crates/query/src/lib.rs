//! Rivulet Query - chainable combinators over observable sequences.
//!
//! This crate layers a fluent API on top of `rivulet-incremental`:
//!
//! - `ListQueryExt`: one method per derived view (`filter`, `map`,
//!   `group_by`, `join`, `skip_take`, ...), each returning the view as a
//!   `ListRef` so calls chain
//! - `OrderedQuery`: multi-level sorting via `order_by` / `then_by`
//!
//! A chain built here behaves exactly like the same views constructed by
//! hand; the combinators only pick the constructor.
//!
//! # Example
//!
//! ```ignore
//! use rivulet_query::ListQueryExt;
//! use rivulet_reactive::ObservableVec;
//!
//! let scores = ObservableVec::new(vec![("ann", 72), ("bob", 91), ("cy", 85)]);
//! let top = scores
//!     .as_list()
//!     .filter(|s: &(&'static str, i32)| s.1 >= 80)
//!     .order_by_descending(|s: &(&'static str, i32)| s.1)
//!     .into_list()
//!     .map(|s: &(&'static str, i32)| s.0);
//!
//! scores.push(("dee", 95));
//! assert_eq!(top.to_vec(), vec!["dee", "bob", "cy"]);
//! ```

#![no_std]

extern crate alloc;

mod ext;
mod ordered;

pub use ext::ListQueryExt;
pub use ordered::OrderedQuery;
