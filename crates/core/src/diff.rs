//! Generic diff application.
//!
//! `apply_change` mirrors one source `ChangeEvent` onto a target sequence
//! that holds a materialized (possibly transformed) copy of the source,
//! keeping the two the same length after every event.

use crate::change::ChangeEvent;
use crate::error::{check_insert_index, check_range, Error, Result};
use alloc::vec::Vec;

/// Read access to a positional sequence.
pub trait ReadList<T> {
    /// Returns the number of items.
    fn len(&self) -> usize;

    /// Returns a copy of the item at `index`, if any.
    fn get(&self, index: usize) -> Option<T>;

    /// Returns true if the sequence is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns all items in order.
    fn to_vec(&self) -> Vec<T> {
        (0..self.len()).filter_map(|i| self.get(i)).collect()
    }
}

impl<T: Clone> ReadList<T> for [T] {
    fn len(&self) -> usize {
        <[T]>::len(self)
    }

    fn get(&self, index: usize) -> Option<T> {
        <[T]>::get(self, index).cloned()
    }

    fn to_vec(&self) -> Vec<T> {
        <[T]>::to_vec(self)
    }
}

impl<T: Clone> ReadList<T> for Vec<T> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn get(&self, index: usize) -> Option<T> {
        self.as_slice().get(index).cloned()
    }

    fn to_vec(&self) -> Vec<T> {
        self.clone()
    }
}

/// Positional mutation of a target sequence.
pub trait SequenceMut<U> {
    /// Returns the number of elements.
    fn len(&self) -> usize;

    /// Inserts `value` at `index`, shifting later elements up.
    fn insert(&mut self, index: usize, value: U);

    /// Removes and returns the element at `index`.
    fn remove(&mut self, index: usize) -> U;

    /// Replaces the element at `index`, returning the previous one.
    fn replace(&mut self, index: usize, value: U) -> U;

    /// Removes every element, returning them in order.
    fn clear(&mut self) -> Vec<U>;
}

impl<U> SequenceMut<U> for Vec<U> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn insert(&mut self, index: usize, value: U) {
        Vec::insert(self, index, value);
    }

    fn remove(&mut self, index: usize) -> U {
        Vec::remove(self, index)
    }

    fn replace(&mut self, index: usize, value: U) -> U {
        core::mem::replace(&mut self[index], value)
    }

    fn clear(&mut self) -> Vec<U> {
        core::mem::take(self)
    }
}

/// Applies one source change to `target`, materializing new source items with
/// `materialize` and reporting every element that leaves `target` to
/// `on_evicted`.
///
/// Returns the equivalent event expressed over the target's element type.
/// Fails if the event does not fit the target's current bounds, or if the
/// target length differs from `source.len()` afterwards; either means the
/// caller has fallen out of sync with its source.
pub fn apply_change<T, U, S, L, M, E>(
    target: &mut S,
    source: &L,
    event: &ChangeEvent<T>,
    mut materialize: M,
    mut on_evicted: E,
) -> Result<ChangeEvent<U>>
where
    U: Clone,
    S: SequenceMut<U> + ?Sized,
    L: ReadList<T> + ?Sized,
    M: FnMut(&T) -> U,
    E: FnMut(&U),
{
    event.validate()?;
    let applied = match event {
        ChangeEvent::Add { index, items } => {
            check_insert_index(*index, target.len())?;
            let mut added = Vec::with_capacity(items.len());
            for (offset, item) in items.iter().enumerate() {
                let value = materialize(item);
                added.push(value.clone());
                target.insert(index + offset, value);
            }
            ChangeEvent::add(*index, added)
        }
        ChangeEvent::Remove { index, items } => {
            check_range(*index, items.len(), target.len())?;
            let removed = remove_block(target, *index, items.len(), &mut on_evicted);
            ChangeEvent::remove(*index, removed)
        }
        ChangeEvent::Replace {
            index,
            old_items,
            new_items,
        } => {
            check_range(*index, old_items.len(), target.len())?;
            if old_items.len() == new_items.len() {
                let mut old = Vec::with_capacity(old_items.len());
                let mut new = Vec::with_capacity(new_items.len());
                for (offset, item) in new_items.iter().enumerate() {
                    let value = materialize(item);
                    new.push(value.clone());
                    let previous = target.replace(index + offset, value);
                    on_evicted(&previous);
                    old.push(previous);
                }
                ChangeEvent::replace(*index, old, new)
            } else {
                let old = remove_block(target, *index, old_items.len(), &mut on_evicted);
                let mut new = Vec::with_capacity(new_items.len());
                for (offset, item) in new_items.iter().enumerate() {
                    let value = materialize(item);
                    new.push(value.clone());
                    target.insert(index + offset, value);
                }
                ChangeEvent::replace(*index, old, new)
            }
        }
        ChangeEvent::Move {
            old_index,
            new_index,
            items,
        } => {
            let count = items.len();
            check_range(*old_index, count, target.len())?;
            check_range(*new_index, count, target.len())?;
            let mut block = Vec::with_capacity(count);
            for _ in 0..count {
                block.push(target.remove(*old_index));
            }
            for (offset, value) in block.iter().enumerate() {
                target.insert(new_index + offset, value.clone());
            }
            ChangeEvent::moved(*old_index, *new_index, block)
        }
        ChangeEvent::Reset => {
            for value in target.clear() {
                on_evicted(&value);
            }
            for index in 0..source.len() {
                if let Some(item) = source.get(index) {
                    target.insert(index, materialize(&item));
                }
            }
            ChangeEvent::Reset
        }
    };

    if target.len() != source.len() {
        return Err(Error::out_of_sync(target.len(), source.len()));
    }
    Ok(applied)
}

fn remove_block<U, S, E>(target: &mut S, index: usize, count: usize, on_evicted: &mut E) -> Vec<U>
where
    S: SequenceMut<U> + ?Sized,
    E: FnMut(&U),
{
    let mut removed = Vec::with_capacity(count);
    for _ in 0..count {
        let value = target.remove(index);
        on_evicted(&value);
        removed.push(value);
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::{String, ToString};
    use alloc::vec;

    fn mirror(source: &[i32]) -> Vec<String> {
        source.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn test_apply_add() {
        let source = vec![1, 2, 3, 4];
        let mut target = mirror(&[1, 4]);
        let out = apply_change(
            &mut target,
            &source,
            &ChangeEvent::add(1, vec![2, 3]),
            |x| x.to_string(),
            |_| {},
        )
        .unwrap();
        assert_eq!(target, mirror(&source));
        assert_eq!(out, ChangeEvent::add(1, vec!["2".to_string(), "3".to_string()]));
    }

    #[test]
    fn test_apply_remove_evicts() {
        let source = vec![1, 4];
        let mut target = mirror(&[1, 2, 3, 4]);
        let mut evicted = Vec::new();
        let out = apply_change(
            &mut target,
            &source,
            &ChangeEvent::remove(1, vec![2, 3]),
            |x| x.to_string(),
            |s: &String| evicted.push(s.clone()),
        )
        .unwrap();
        assert_eq!(target, mirror(&source));
        assert_eq!(evicted, vec!["2".to_string(), "3".to_string()]);
        assert_eq!(out.old_items().len(), 2);
    }

    #[test]
    fn test_apply_replace_same_length() {
        let source = vec![1, 9, 3];
        let mut target = mirror(&[1, 2, 3]);
        let mut evicted = Vec::new();
        apply_change(
            &mut target,
            &source,
            &ChangeEvent::replace(1, vec![2], vec![9]),
            |x| x.to_string(),
            |s: &String| evicted.push(s.clone()),
        )
        .unwrap();
        assert_eq!(target, mirror(&source));
        assert_eq!(evicted, vec!["2".to_string()]);
    }

    #[test]
    fn test_apply_replace_different_length() {
        let source = vec![1, 7, 8, 9, 3];
        let mut target = mirror(&[1, 2, 3]);
        let out = apply_change(
            &mut target,
            &source,
            &ChangeEvent::replace(1, vec![2], vec![7, 8, 9]),
            |x| x.to_string(),
            |_| {},
        )
        .unwrap();
        assert_eq!(target, mirror(&source));
        assert_eq!(out.len_delta(), Some(2));
    }

    #[test]
    fn test_apply_move() {
        let source = vec![0, 3, 4, 1, 2, 5];
        let mut target = mirror(&[0, 1, 2, 3, 4, 5]);
        apply_change(
            &mut target,
            &source,
            &ChangeEvent::moved(1, 3, vec![1, 2]),
            |x| x.to_string(),
            |_| {},
        )
        .unwrap();
        assert_eq!(target, mirror(&source));
    }

    #[test]
    fn test_apply_reset() {
        let source = vec![5, 6];
        let mut target = mirror(&[1, 2, 3]);
        let mut evicted = 0;
        let out = apply_change(
            &mut target,
            &source,
            &ChangeEvent::Reset,
            |x| x.to_string(),
            |_| evicted += 1,
        )
        .unwrap();
        assert!(out.is_reset());
        assert_eq!(evicted, 3);
        assert_eq!(target, mirror(&source));
    }

    #[test]
    fn test_apply_out_of_bounds() {
        let source = vec![1];
        let mut target = mirror(&[1]);
        let err = apply_change(
            &mut target,
            &source,
            &ChangeEvent::remove(3, vec![1]),
            |x| x.to_string(),
            |_| {},
        )
        .unwrap_err();
        assert!(matches!(err, Error::RangeOutOfBounds { .. }));
    }

    #[test]
    fn test_apply_detects_drift() {
        let source = vec![1, 2, 3];
        let mut target = mirror(&[1]);
        let err = apply_change(
            &mut target,
            &source,
            &ChangeEvent::add(1, vec![2]),
            |x| x.to_string(),
            |_| {},
        )
        .unwrap_err();
        assert_eq!(err, Error::out_of_sync(2, 3));
    }
}
