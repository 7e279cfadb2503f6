//! Error types for rivulet.
//!
//! Every failure in this domain is a logic error: an index that does not fit
//! the sequence it addresses, an event that violates its own shape, or a
//! derived view that has drifted from its source. Nothing here is transient,
//! so there is nothing to retry.

use crate::change::ChangeAction;
use alloc::string::String;

/// Result type alias for rivulet operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error types for rivulet operations.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A single index does not address an element of the sequence.
    #[error("index {index} is out of range for a sequence of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// A block `start..end` does not fit inside the sequence.
    #[error("range {start}..{end} is out of bounds for a sequence of length {len}")]
    RangeOutOfBounds { start: usize, end: usize, len: usize },

    /// A change event does not satisfy its own shape invariants.
    #[error("malformed {action:?} event: {reason}")]
    MalformedEvent {
        action: ChangeAction,
        reason: &'static str,
    },

    /// A mirrored sequence no longer has the length of its source.
    #[error("derived sequence is out of sync: target has {target_len} items, source has {source_len}")]
    OutOfSync { target_len: usize, source_len: usize },

    /// An explicit group with this key is already declared.
    #[error("group {0} is already declared")]
    DuplicateGroup(String),

    /// No explicit group with this key is declared.
    #[error("group {0} is not declared")]
    GroupNotFound(String),

    /// The operation needs a selected item but nothing is selected.
    #[error("no item is selected")]
    NoSelection,
}

impl Error {
    /// Creates an index out of range error.
    pub fn index_out_of_range(index: usize, len: usize) -> Self {
        Error::IndexOutOfRange { index, len }
    }

    /// Creates a range out of bounds error for `start..start + count`.
    pub fn range_out_of_bounds(start: usize, count: usize, len: usize) -> Self {
        Error::RangeOutOfBounds {
            start,
            end: start.saturating_add(count),
            len,
        }
    }

    /// Creates a malformed event error.
    pub fn malformed(action: ChangeAction, reason: &'static str) -> Self {
        Error::MalformedEvent { action, reason }
    }

    /// Creates an out of sync error.
    pub fn out_of_sync(target_len: usize, source_len: usize) -> Self {
        Error::OutOfSync {
            target_len,
            source_len,
        }
    }
}

/// Checks that `index` addresses an element of a sequence of length `len`.
#[inline]
pub fn check_index(index: usize, len: usize) -> Result<()> {
    if index < len {
        Ok(())
    } else {
        Err(Error::index_out_of_range(index, len))
    }
}

/// Checks that `index` is a valid insertion point (`index <= len`).
#[inline]
pub fn check_insert_index(index: usize, len: usize) -> Result<()> {
    if index <= len {
        Ok(())
    } else {
        Err(Error::index_out_of_range(index, len))
    }
}

/// Checks that `start..start + count` fits inside a sequence of length `len`.
#[inline]
pub fn check_range(start: usize, count: usize, len: usize) -> Result<()> {
    match start.checked_add(count) {
        Some(end) if end <= len => Ok(()),
        _ => Err(Error::range_out_of_bounds(start, count, len)),
    }
}
