//! Property-based tests for composed query chains.
//!
//! A chain built once and then fed random edits must always equal the same
//! chain evaluated eagerly over the current source.

use proptest::prelude::*;
use rivulet_query::ListQueryExt;
use rivulet_reactive::{ListRef, ObservableVec, ReadList};

#[derive(Clone, Debug)]
enum Edit {
    Insert(usize, i64),
    Remove(usize),
    Set(usize, i64),
    Move(usize, usize),
    Reset(Vec<i64>),
}

fn value_strategy() -> impl Strategy<Value = i64> {
    -50i64..50
}

fn edit_strategy() -> impl Strategy<Value = Edit> {
    prop_oneof![
        3 => (any::<usize>(), value_strategy()).prop_map(|(i, v)| Edit::Insert(i, v)),
        2 => any::<usize>().prop_map(Edit::Remove),
        3 => (any::<usize>(), value_strategy()).prop_map(|(i, v)| Edit::Set(i, v)),
        2 => (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Edit::Move(a, b)),
        1 => prop::collection::vec(value_strategy(), 0..10).prop_map(Edit::Reset),
    ]
}

fn apply(source: &ObservableVec<i64>, edit: &Edit) {
    let len = source.len();
    match edit {
        Edit::Insert(i, v) => source.insert(i % (len + 1), *v).unwrap(),
        Edit::Remove(i) if len > 0 => {
            source.remove_at(i % len).unwrap();
        }
        Edit::Set(i, v) if len > 0 => {
            source.set(i % len, *v).unwrap();
        }
        Edit::Move(a, b) if len > 0 => source.move_item(a % len, b % len).unwrap(),
        Edit::Reset(items) => source.reset(items.clone()),
        _ => {}
    }
}

/// filter, map, two-level order, then a window.
fn eager(items: &[i64]) -> Vec<i64> {
    let mut mapped: Vec<i64> = items
        .iter()
        .filter(|x| *x % 3 != 0)
        .map(|x| x * 2)
        .collect();
    mapped.sort_by(|a, b| (a / 10).cmp(&(b / 10)).then(b.cmp(a)));
    mapped.into_iter().skip(1).take(6).collect()
}

proptest! {
    #[test]
    fn chain_matches_eager_evaluation(
        initial in prop::collection::vec(value_strategy(), 0..15),
        edits in prop::collection::vec(edit_strategy(), 0..40),
    ) {
        let source = ObservableVec::new(initial);
        let list: ListRef<i64> = source.as_list();
        let result = list
            .filter(|x: &i64| x % 3 != 0)
            .map(|x: &i64| x * 2)
            .order_by(|x: &i64| x / 10)
            .then_by_descending(|x: &i64| *x)
            .into_list()
            .skip_take(1, 6);
        prop_assert_eq!(result.to_vec(), eager(&source.items()));

        for edit in &edits {
            apply(&source, edit);
            prop_assert_eq!(result.to_vec(), eager(&source.items()));
        }
    }

    #[test]
    fn reversed_prefix_matches_eager_evaluation(
        initial in prop::collection::vec(value_strategy(), 0..15),
        edits in prop::collection::vec(edit_strategy(), 0..40),
    ) {
        let source = ObservableVec::new(initial);
        let list: ListRef<i64> = source.as_list();
        let result = list.reversed().take_while(|x: &i64| *x >= -40);

        for edit in &edits {
            apply(&source, edit);
            let expected: Vec<i64> = source
                .items()
                .into_iter()
                .rev()
                .take_while(|x| *x >= -40)
                .collect();
            prop_assert_eq!(result.to_vec(), expected);
        }
    }
}
