//! Change event model.
//!
//! A `ChangeEvent` describes one batch of edits to a positional sequence.
//! Every observable sequence in rivulet raises exactly one event per
//! mutation, and every derived view consumes and produces this vocabulary.

use crate::error::{Error, Result};
use alloc::vec;
use alloc::vec::Vec;

/// The kind of a change event, without its payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeAction {
    Add,
    Remove,
    Replace,
    Move,
    Reset,
}

/// A single change notification on a positional sequence.
///
/// - `Add`: `items` were inserted so that the first lands at `index`.
/// - `Remove`: `items` were removed starting at `index`.
/// - `Replace`: `old_items` starting at `index` were replaced by `new_items`.
///   Lengths may differ, in which case the event means "remove the old block,
///   insert the new one at the same index".
/// - `Move`: the contiguous block `items` that started at `old_index` now
///   starts at `new_index`, where `new_index` is measured in the sequence after
///   the move. The block keeps its internal order.
/// - `Reset`: all prior state is void; re-read the sequence from scratch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangeEvent<T> {
    Add {
        index: usize,
        items: Vec<T>,
    },
    Remove {
        index: usize,
        items: Vec<T>,
    },
    Replace {
        index: usize,
        old_items: Vec<T>,
        new_items: Vec<T>,
    },
    Move {
        old_index: usize,
        new_index: usize,
        items: Vec<T>,
    },
    Reset,
}

impl<T> ChangeEvent<T> {
    /// Creates an Add event.
    #[inline]
    pub fn add(index: usize, items: Vec<T>) -> Self {
        ChangeEvent::Add { index, items }
    }

    /// Creates an Add event for a single item.
    #[inline]
    pub fn add_one(index: usize, item: T) -> Self {
        ChangeEvent::Add {
            index,
            items: vec![item],
        }
    }

    /// Creates a Remove event.
    #[inline]
    pub fn remove(index: usize, items: Vec<T>) -> Self {
        ChangeEvent::Remove { index, items }
    }

    /// Creates a Remove event for a single item.
    #[inline]
    pub fn remove_one(index: usize, item: T) -> Self {
        ChangeEvent::Remove {
            index,
            items: vec![item],
        }
    }

    /// Creates a Replace event.
    #[inline]
    pub fn replace(index: usize, old_items: Vec<T>, new_items: Vec<T>) -> Self {
        ChangeEvent::Replace {
            index,
            old_items,
            new_items,
        }
    }

    /// Creates a Move event.
    #[inline]
    pub fn moved(old_index: usize, new_index: usize, items: Vec<T>) -> Self {
        ChangeEvent::Move {
            old_index,
            new_index,
            items,
        }
    }

    /// Creates a Reset event.
    #[inline]
    pub fn reset() -> Self {
        ChangeEvent::Reset
    }

    /// Returns the kind of this event.
    pub fn action(&self) -> ChangeAction {
        match self {
            ChangeEvent::Add { .. } => ChangeAction::Add,
            ChangeEvent::Remove { .. } => ChangeAction::Remove,
            ChangeEvent::Replace { .. } => ChangeAction::Replace,
            ChangeEvent::Move { .. } => ChangeAction::Move,
            ChangeEvent::Reset => ChangeAction::Reset,
        }
    }

    /// Returns true if this is a Reset.
    #[inline]
    pub fn is_reset(&self) -> bool {
        matches!(self, ChangeEvent::Reset)
    }

    /// Items present in the sequence after the change (empty for Remove and Reset).
    pub fn new_items(&self) -> &[T] {
        match self {
            ChangeEvent::Add { items, .. } | ChangeEvent::Move { items, .. } => items,
            ChangeEvent::Replace { new_items, .. } => new_items,
            ChangeEvent::Remove { .. } | ChangeEvent::Reset => &[],
        }
    }

    /// Items present in the sequence before the change (empty for Add and Reset).
    pub fn old_items(&self) -> &[T] {
        match self {
            ChangeEvent::Remove { items, .. } | ChangeEvent::Move { items, .. } => items,
            ChangeEvent::Replace { old_items, .. } => old_items,
            ChangeEvent::Add { .. } | ChangeEvent::Reset => &[],
        }
    }

    /// Starting index of `new_items`, if the event has one.
    pub fn new_index(&self) -> Option<usize> {
        match self {
            ChangeEvent::Add { index, .. } | ChangeEvent::Replace { index, .. } => Some(*index),
            ChangeEvent::Move { new_index, .. } => Some(*new_index),
            ChangeEvent::Remove { .. } | ChangeEvent::Reset => None,
        }
    }

    /// Starting index of `old_items`, if the event has one.
    pub fn old_index(&self) -> Option<usize> {
        match self {
            ChangeEvent::Remove { index, .. } | ChangeEvent::Replace { index, .. } => Some(*index),
            ChangeEvent::Move { old_index, .. } => Some(*old_index),
            ChangeEvent::Add { .. } | ChangeEvent::Reset => None,
        }
    }

    /// The lowest index the event touches, or `None` for Reset.
    pub fn first_affected(&self) -> Option<usize> {
        match self {
            ChangeEvent::Add { index, .. }
            | ChangeEvent::Remove { index, .. }
            | ChangeEvent::Replace { index, .. } => Some(*index),
            ChangeEvent::Move {
                old_index,
                new_index,
                ..
            } => Some(core::cmp::min(*old_index, *new_index)),
            ChangeEvent::Reset => None,
        }
    }

    /// Net change in sequence length, or `None` for Reset.
    pub fn len_delta(&self) -> Option<isize> {
        match self {
            ChangeEvent::Add { items, .. } => Some(items.len() as isize),
            ChangeEvent::Remove { items, .. } => Some(-(items.len() as isize)),
            ChangeEvent::Replace {
                old_items,
                new_items,
                ..
            } => Some(new_items.len() as isize - old_items.len() as isize),
            ChangeEvent::Move { .. } => Some(0),
            ChangeEvent::Reset => None,
        }
    }

    /// Checks the shape invariants: Add, Remove and Move carry at least one
    /// item; Replace carries at least one item on one side.
    pub fn validate(&self) -> Result<()> {
        match self {
            ChangeEvent::Add { items, .. } if items.is_empty() => {
                Err(Error::malformed(ChangeAction::Add, "no items"))
            }
            ChangeEvent::Remove { items, .. } if items.is_empty() => {
                Err(Error::malformed(ChangeAction::Remove, "no items"))
            }
            ChangeEvent::Move { items, .. } if items.is_empty() => {
                Err(Error::malformed(ChangeAction::Move, "no items"))
            }
            ChangeEvent::Replace {
                old_items,
                new_items,
                ..
            } if old_items.is_empty() && new_items.is_empty() => {
                Err(Error::malformed(ChangeAction::Replace, "no items"))
            }
            _ => Ok(()),
        }
    }

    /// Maps every carried item, keeping indices.
    pub fn map<U, F>(&self, mut f: F) -> ChangeEvent<U>
    where
        F: FnMut(&T) -> U,
    {
        match self {
            ChangeEvent::Add { index, items } => ChangeEvent::Add {
                index: *index,
                items: items.iter().map(&mut f).collect(),
            },
            ChangeEvent::Remove { index, items } => ChangeEvent::Remove {
                index: *index,
                items: items.iter().map(&mut f).collect(),
            },
            ChangeEvent::Replace {
                index,
                old_items,
                new_items,
            } => ChangeEvent::Replace {
                index: *index,
                old_items: old_items.iter().map(&mut f).collect(),
                new_items: new_items.iter().map(&mut f).collect(),
            },
            ChangeEvent::Move {
                old_index,
                new_index,
                items,
            } => ChangeEvent::Move {
                old_index: *old_index,
                new_index: *new_index,
                items: items.iter().map(&mut f).collect(),
            },
            ChangeEvent::Reset => ChangeEvent::Reset,
        }
    }

    /// Adds `offset` to every index, e.g. to lift a sub-sequence event into
    /// the coordinates of a concatenated view.
    pub fn shifted(self, offset: usize) -> Self {
        match self {
            ChangeEvent::Add { index, items } => ChangeEvent::Add {
                index: index + offset,
                items,
            },
            ChangeEvent::Remove { index, items } => ChangeEvent::Remove {
                index: index + offset,
                items,
            },
            ChangeEvent::Replace {
                index,
                old_items,
                new_items,
            } => ChangeEvent::Replace {
                index: index + offset,
                old_items,
                new_items,
            },
            ChangeEvent::Move {
                old_index,
                new_index,
                items,
            } => ChangeEvent::Move {
                old_index: old_index + offset,
                new_index: new_index + offset,
                items,
            },
            ChangeEvent::Reset => ChangeEvent::Reset,
        }
    }
}

impl<T: Clone> ChangeEvent<T> {
    /// Decomposes the event into Add/Remove steps (Reset stays Reset).
    ///
    /// Replace becomes Remove of the old block then Add of the new block;
    /// Move becomes Remove at `old_index` then Add at `new_index`. Applying the
    /// steps in order yields the same sequence as applying the event.
    pub fn primitives(&self) -> Vec<ChangeEvent<T>> {
        match self {
            ChangeEvent::Add { .. } | ChangeEvent::Remove { .. } | ChangeEvent::Reset => {
                vec![self.clone()]
            }
            ChangeEvent::Replace {
                index,
                old_items,
                new_items,
            } => {
                let mut steps = Vec::with_capacity(2);
                if !old_items.is_empty() {
                    steps.push(ChangeEvent::remove(*index, old_items.clone()));
                }
                if !new_items.is_empty() {
                    steps.push(ChangeEvent::add(*index, new_items.clone()));
                }
                steps
            }
            ChangeEvent::Move {
                old_index,
                new_index,
                items,
            } => {
                if old_index == new_index {
                    return Vec::new();
                }
                vec![
                    ChangeEvent::remove(*old_index, items.clone()),
                    ChangeEvent::add(*new_index, items.clone()),
                ]
            }
        }
    }
}

/// Decomposes a block move into single-item moves.
///
/// Moving the block `old..old + count` so that it starts at `new` is the same
/// as applying the returned `(from, to)` single-item moves in order.
pub fn move_steps(old: usize, new: usize, count: usize) -> Vec<(usize, usize)> {
    if old == new || count == 0 {
        return Vec::new();
    }
    if new > old {
        (0..count).map(|_| (old, new + count - 1)).collect()
    } else {
        (0..count).map(|k| (old + k, new + k)).collect()
    }
}

/// Translates a position through a block move of `count` items from `old` to `new`.
pub fn translate_through_move(position: usize, old: usize, new: usize, count: usize) -> usize {
    if position >= old && position < old + count {
        return new + (position - old);
    }
    // Outside the block: the block was removed, then reinserted.
    let after_remove = if position >= old + count {
        position - count
    } else {
        position
    };
    if after_remove >= new {
        after_remove + count
    } else {
        after_remove
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn apply_move(v: &mut Vec<i32>, from: usize, to: usize) {
        let x = v.remove(from);
        v.insert(to, x);
    }

    #[test]
    fn test_accessors() {
        let e = ChangeEvent::replace(2, vec![1, 2], vec![3]);
        assert_eq!(e.action(), ChangeAction::Replace);
        assert_eq!(e.old_items(), &[1, 2]);
        assert_eq!(e.new_items(), &[3]);
        assert_eq!(e.old_index(), Some(2));
        assert_eq!(e.new_index(), Some(2));
        assert_eq!(e.len_delta(), Some(-1));

        let m = ChangeEvent::moved(4, 1, vec![7]);
        assert_eq!(m.first_affected(), Some(1));
        assert_eq!(m.len_delta(), Some(0));
        assert!(ChangeEvent::<i32>::reset().first_affected().is_none());
    }

    #[test]
    fn test_validate() {
        assert!(ChangeEvent::add(0, vec![1]).validate().is_ok());
        assert!(ChangeEvent::<i32>::add(0, vec![]).validate().is_err());
        assert!(ChangeEvent::<i32>::moved(0, 1, vec![]).validate().is_err());
        assert!(ChangeEvent::replace(0, vec![], vec![1]).validate().is_ok());
        assert!(ChangeEvent::<i32>::reset().validate().is_ok());
    }

    #[test]
    fn test_map_and_shift() {
        let e = ChangeEvent::add(1, vec![1, 2]).map(|x| x * 10).shifted(3);
        assert_eq!(e, ChangeEvent::add(4, vec![10, 20]));
    }

    #[test]
    fn test_primitives_of_move() {
        let steps = ChangeEvent::moved(0, 2, vec![1, 2]).primitives();
        assert_eq!(
            steps,
            vec![
                ChangeEvent::remove(0, vec![1, 2]),
                ChangeEvent::add(2, vec![1, 2]),
            ]
        );
        assert!(ChangeEvent::moved(3, 3, vec![1]).primitives().is_empty());
    }

    #[test]
    fn test_move_steps_forward() {
        let mut v = vec![0, 1, 2, 3, 4, 5];
        for (from, to) in move_steps(1, 3, 2) {
            apply_move(&mut v, from, to);
        }
        assert_eq!(v, vec![0, 3, 4, 1, 2, 5]);
    }

    #[test]
    fn test_move_steps_backward() {
        let mut v = vec![0, 1, 2, 3, 4, 5];
        for (from, to) in move_steps(3, 0, 3) {
            apply_move(&mut v, from, to);
        }
        assert_eq!(v, vec![3, 4, 5, 0, 1, 2]);
    }

    #[test]
    fn test_translate_through_move() {
        // [0,1,2,3,4,5] move block 1..3 to 3 -> [0,3,4,1,2,5]
        let before = [0, 1, 2, 3, 4, 5];
        let after = [0, 3, 4, 1, 2, 5];
        for (pos, value) in before.iter().enumerate() {
            let moved = translate_through_move(pos, 1, 3, 2);
            assert_eq!(after[moved], *value);
        }
    }
}
