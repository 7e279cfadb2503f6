//! End-to-end scenarios, one per view family.

use rivulet_core::{ChangeEvent, ReadList};
use rivulet_incremental::{CompositeList, FilteredList, GroupedList, Selector, SortedList};
use rivulet_reactive::{ListRef, ObservableListExt, ObservableVec, Subscription};
use std::cell::RefCell;
use std::rc::Rc;

type EventLog<T> = Rc<RefCell<Vec<ChangeEvent<T>>>>;

/// Records every event a view raises.
fn record<T: Clone + 'static>(view: &ListRef<T>) -> (EventLog<T>, Subscription) {
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    let sub = view.on_change(move |e| sink.borrow_mut().push(e.clone()));
    (events, sub)
}

#[test]
fn test_filter_scenario() {
    let source = ObservableVec::new((1..=10).collect::<Vec<i32>>());
    let even = FilteredList::new(source.as_list(), |x: &i32| x % 2 == 0);
    assert_eq!(even.to_vec(), vec![2, 4, 6, 8, 10]);

    let counts = Rc::new(RefCell::new(Vec::new()));
    let sink = counts.clone();
    let _sub = even.on_count(move |n| sink.borrow_mut().push(*n));

    source.extend(vec![11, 12, 14]);
    source.insert(12, 13).unwrap();
    assert_eq!(even.to_vec(), vec![2, 4, 6, 8, 10, 12, 14]);
    assert_eq!(even.len(), 7);
    assert_eq!(counts.borrow().last(), Some(&7));
}

#[test]
fn test_sort_scenario() {
    let source = ObservableVec::new(vec![3, 1, 7, 5, 4, 6, 2]);
    let sorted: ListRef<i32> =
        SortedList::by_comparison(source.as_list(), |a: &i32, b: &i32| a.cmp(b));
    assert_eq!(sorted.to_vec(), vec![1, 2, 3, 4, 5, 6, 7]);

    let (events, _sub) = record(&sorted);
    source.move_item(1, 3).unwrap();
    assert_eq!(source.items(), vec![3, 7, 5, 1, 4, 6, 2]);
    assert_eq!(sorted.to_vec(), vec![1, 2, 3, 4, 5, 6, 7]);
    assert!(events.borrow().is_empty());
}

#[test]
fn test_group_scenario() {
    let source = ObservableVec::new((0..20).collect::<Vec<i32>>());
    let grouped = GroupedList::builder(source.as_list(), |x: &i32| x % 2)
        .explicit_group(1)
        .include_implicit_groups(false)
        .build();
    assert_eq!(grouped.len(), 1);
    let odd = grouped.group(&1).unwrap();
    assert_eq!(odd.to_vec(), (0..20).filter(|x| x % 2 == 1).collect::<Vec<_>>());

    grouped.set_include_implicit_groups(true);
    assert_eq!(grouped.len(), 2);
    let even = grouped.group(&0).unwrap();
    assert!(!even.is_explicit());
    assert_eq!(even.to_vec(), (0..20).filter(|x| x % 2 == 0).collect::<Vec<_>>());
}

#[test]
fn test_composite_scenario() {
    let first = ObservableVec::new(vec![1, 2, 3]);
    let second = ObservableVec::new(vec![4, 5, 6]);
    let flat = CompositeList::from_parts(vec![first.as_list(), second.as_list()]);
    assert_eq!(flat.to_vec(), vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(flat.offsets(), vec![0, 3]);

    first.extend(vec![4, 5, 6]);
    assert_eq!(flat.offsets(), vec![0, 6]);
    assert_eq!(flat.to_vec(), vec![1, 2, 3, 4, 5, 6, 4, 5, 6]);
}

#[test]
fn test_selector_scenario() {
    let source = ObservableVec::new((1..=6).collect::<Vec<i32>>());
    let selector = Selector::new(source.as_list());
    selector.select(Some(1)).unwrap();
    assert_eq!(selector.selected_item(), Some(2));

    assert!(source.remove_item(&2));
    assert_eq!(selector.selected_index(), Some(1));
    assert_eq!(selector.selected_item(), Some(3));
}

#[test]
fn test_views_compose() {
    let source = ObservableVec::new(vec![9, 4, 7, 2, 8]);
    let even: ListRef<i32> = FilteredList::new(source.as_list(), |x: &i32| x % 2 == 0);
    let sorted: ListRef<i32> = SortedList::by_key(even.clone(), |x: &i32| *x);
    let grouped = GroupedList::new(sorted.clone(), |x: &i32| *x > 4);

    source.push(6);
    source.remove_item(&2);
    assert_eq!(sorted.to_vec(), vec![4, 6, 8]);
    assert_eq!(grouped.group(&true).unwrap().to_vec(), vec![6, 8]);
    assert_eq!(grouped.group(&false).unwrap().to_vec(), vec![4]);
}
