//! Rivulet Core - change events, diff application and errors.
//!
//! This crate provides the vocabulary shared by every rivulet component:
//!
//! - `ChangeEvent`: one batch of positional edits (Add, Remove, Replace, Move, Reset)
//! - `ReadList`: read access to a positional sequence
//! - `SequenceMut` / `apply_change`: mirror a source event onto a materialized target
//! - `Error`: contract violations raised when indices or events do not fit
//!
//! # Example
//!
//! ```rust
//! use rivulet_core::{apply_change, ChangeEvent};
//!
//! let source = vec![1, 2, 3];
//! let mut doubled = vec![2, 6];
//!
//! let applied = apply_change(
//!     &mut doubled,
//!     &source,
//!     &ChangeEvent::add(1, vec![2]),
//!     |x| x * 2,
//!     |_| {},
//! )
//! .unwrap();
//!
//! assert_eq!(doubled, vec![2, 4, 6]);
//! assert_eq!(applied, ChangeEvent::add(1, vec![4]));
//! ```

#![no_std]

extern crate alloc;

pub mod change;
pub mod diff;
mod error;

pub use change::{move_steps, translate_through_move, ChangeAction, ChangeEvent};
pub use diff::{apply_change, ReadList, SequenceMut};
pub use error::{check_index, check_insert_index, check_range, Error, Result};
