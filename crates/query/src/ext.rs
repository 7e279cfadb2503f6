//! Query combinators on `ListRef`.

use crate::ordered::OrderedQuery;
use alloc::rc::Rc;
use alloc::vec;
use core::cmp::Ordering;
use core::fmt::Debug;
use core::hash::Hash;
use rivulet_incremental::{
    CompositeList, DynamicTransformedList, FilteredList, GroupRef, GroupedList, JoinedList,
    RangeList, ReversedList, Selector, SetOperationList, SortedList, TakeWhileList,
    TransformedList, ZippedList,
};
use rivulet_reactive::{ListRef, Property, Trigger};

/// Builds derived views from an observable sequence.
///
/// Every combinator returns the new view as a `ListRef`, so calls chain.
/// Each view holds its source strongly and is held only weakly by it, so
/// keeping the last `ListRef` of a chain keeps the whole chain live.
pub trait ListQueryExt<T> {
    /// Items matching `predicate`, in source order.
    fn filter<P>(&self, predicate: P) -> ListRef<T>
    where
        P: Fn(&T) -> bool + 'static;

    /// Like `filter`, re-testing an item whenever `trigger` fires for it.
    fn filter_with_trigger<P>(&self, predicate: P, trigger: Trigger<T>) -> ListRef<T>
    where
        P: Fn(&T) -> bool + 'static;

    fn map<U, F>(&self, selector: F) -> ListRef<U>
    where
        U: Clone + 'static,
        F: Fn(&T) -> U + 'static;

    /// Projects each item to an observable value; the view follows the
    /// values as they change.
    fn map_dynamic<R, F>(&self, selector: F) -> ListRef<R>
    where
        R: Clone + 'static,
        F: Fn(&T) -> Property<R> + 'static;

    /// Stable sort under `compare`.
    fn sort_by<C>(&self, compare: C) -> ListRef<T>
    where
        C: Fn(&T, &T) -> Ordering + 'static;

    fn order_by<K, F>(&self, key: F) -> OrderedQuery<T>
    where
        K: Ord + 'static,
        F: Fn(&T) -> K + 'static;

    fn order_by_descending<K, F>(&self, key: F) -> OrderedQuery<T>
    where
        K: Ord + 'static,
        F: Fn(&T) -> K + 'static;

    /// The groups of items sharing a key, in order of first appearance.
    fn group_by<K, F>(&self, key: F) -> ListRef<GroupRef<K, T>>
    where
        K: Hash + Eq + Clone + Debug + 'static,
        F: Fn(&T) -> K + 'static;

    /// This sequence followed by `other`.
    fn concat(&self, other: ListRef<T>) -> ListRef<T>;

    fn distinct(&self) -> ListRef<T>
    where
        T: Hash + Eq;

    fn union(&self, other: ListRef<T>) -> ListRef<T>
    where
        T: Hash + Eq;

    fn intersect(&self, other: ListRef<T>) -> ListRef<T>
    where
        T: Hash + Eq;

    fn except(&self, other: ListRef<T>) -> ListRef<T>
    where
        T: Hash + Eq;

    /// Inner join on equal keys.
    fn join<I, K, R, FO, FI, F>(
        &self,
        inner: ListRef<I>,
        outer_key: FO,
        inner_key: FI,
        combine: F,
    ) -> ListRef<R>
    where
        I: Clone + 'static,
        K: Hash + Eq + Clone + 'static,
        R: Clone + 'static,
        FO: Fn(&T) -> K + 'static,
        FI: Fn(&I) -> K + 'static,
        F: Fn(&T, &I) -> R + 'static;

    fn zip<B, R, F>(&self, other: ListRef<B>, combine: F) -> ListRef<R>
    where
        B: Clone + 'static,
        R: Clone + 'static,
        F: Fn(&T, &B) -> R + 'static;

    /// At most `take` items, starting after the first `skip`.
    fn skip_take(&self, skip: usize, take: usize) -> ListRef<T>;

    fn reversed(&self) -> ListRef<T>;

    /// The leading items matching `predicate`.
    fn take_while<P>(&self, predicate: P) -> ListRef<T>
    where
        P: Fn(&T) -> bool + 'static;

    /// A selection over this sequence, initially empty.
    fn selector(&self) -> Rc<Selector<T>>
    where
        T: PartialEq;
}

impl<T: Clone + 'static> ListQueryExt<T> for ListRef<T> {
    fn filter<P>(&self, predicate: P) -> ListRef<T>
    where
        P: Fn(&T) -> bool + 'static,
    {
        FilteredList::new(self.clone(), predicate)
    }

    fn filter_with_trigger<P>(&self, predicate: P, trigger: Trigger<T>) -> ListRef<T>
    where
        P: Fn(&T) -> bool + 'static,
    {
        FilteredList::with_trigger(self.clone(), predicate, trigger)
    }

    fn map<U, F>(&self, selector: F) -> ListRef<U>
    where
        U: Clone + 'static,
        F: Fn(&T) -> U + 'static,
    {
        TransformedList::new(self.clone(), selector)
    }

    fn map_dynamic<R, F>(&self, selector: F) -> ListRef<R>
    where
        R: Clone + 'static,
        F: Fn(&T) -> Property<R> + 'static,
    {
        DynamicTransformedList::new(self.clone(), selector)
    }

    fn sort_by<C>(&self, compare: C) -> ListRef<T>
    where
        C: Fn(&T, &T) -> Ordering + 'static,
    {
        SortedList::by_comparison(self.clone(), compare)
    }

    fn order_by<K, F>(&self, key: F) -> OrderedQuery<T>
    where
        K: Ord + 'static,
        F: Fn(&T) -> K + 'static,
    {
        OrderedQuery::new(self.clone(), key, false)
    }

    fn order_by_descending<K, F>(&self, key: F) -> OrderedQuery<T>
    where
        K: Ord + 'static,
        F: Fn(&T) -> K + 'static,
    {
        OrderedQuery::new(self.clone(), key, true)
    }

    fn group_by<K, F>(&self, key: F) -> ListRef<GroupRef<K, T>>
    where
        K: Hash + Eq + Clone + Debug + 'static,
        F: Fn(&T) -> K + 'static,
    {
        GroupedList::new(self.clone(), key)
    }

    fn concat(&self, other: ListRef<T>) -> ListRef<T> {
        CompositeList::from_parts(vec![self.clone(), other])
    }

    fn distinct(&self) -> ListRef<T>
    where
        T: Hash + Eq,
    {
        SetOperationList::distinct(self.clone())
    }

    fn union(&self, other: ListRef<T>) -> ListRef<T>
    where
        T: Hash + Eq,
    {
        SetOperationList::union(self.clone(), other)
    }

    fn intersect(&self, other: ListRef<T>) -> ListRef<T>
    where
        T: Hash + Eq,
    {
        SetOperationList::intersect(self.clone(), other)
    }

    fn except(&self, other: ListRef<T>) -> ListRef<T>
    where
        T: Hash + Eq,
    {
        SetOperationList::except(self.clone(), other)
    }

    fn join<I, K, R, FO, FI, F>(
        &self,
        inner: ListRef<I>,
        outer_key: FO,
        inner_key: FI,
        combine: F,
    ) -> ListRef<R>
    where
        I: Clone + 'static,
        K: Hash + Eq + Clone + 'static,
        R: Clone + 'static,
        FO: Fn(&T) -> K + 'static,
        FI: Fn(&I) -> K + 'static,
        F: Fn(&T, &I) -> R + 'static,
    {
        JoinedList::new(self.clone(), inner, outer_key, inner_key, combine)
    }

    fn zip<B, R, F>(&self, other: ListRef<B>, combine: F) -> ListRef<R>
    where
        B: Clone + 'static,
        R: Clone + 'static,
        F: Fn(&T, &B) -> R + 'static,
    {
        ZippedList::new(self.clone(), other, combine)
    }

    fn skip_take(&self, skip: usize, take: usize) -> ListRef<T> {
        RangeList::new(self.clone(), skip, take)
    }

    fn reversed(&self) -> ListRef<T> {
        ReversedList::new(self.clone())
    }

    fn take_while<P>(&self, predicate: P) -> ListRef<T>
    where
        P: Fn(&T) -> bool + 'static,
    {
        TakeWhileList::new(self.clone(), predicate)
    }

    fn selector(&self) -> Rc<Selector<T>>
    where
        T: PartialEq,
    {
        Selector::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::String;
    use alloc::vec::Vec;
    use rivulet_reactive::{ObservableVec, ReadList};

    #[test]
    fn test_chain_filter_sort_map() {
        let source = ObservableVec::new(vec![5, 2, 8, 1, 9, 4]);
        let view = source
            .as_list()
            .filter(|x: &i32| *x > 2)
            .order_by(|x: &i32| *x)
            .into_list()
            .map(|x: &i32| x * 10);
        assert_eq!(view.to_vec(), vec![40, 50, 80, 90]);

        source.push(3);
        source.remove_item(&8);
        assert_eq!(view.to_vec(), vec![30, 40, 50, 90]);
    }

    #[test]
    fn test_then_by_breaks_ties() {
        let people = ObservableVec::new(vec![("b", 30), ("a", 30), ("c", 20), ("d", 40)]);
        let view = people
            .as_list()
            .order_by_descending(|p: &(&'static str, i32)| p.1)
            .then_by(|p: &(&'static str, i32)| p.0)
            .into_list();
        let names: Vec<&str> = view.to_vec().iter().map(|p| p.0).collect();
        assert_eq!(names, vec!["d", "a", "b", "c"]);

        people.push(("aa", 30));
        let names: Vec<&str> = view.to_vec().iter().map(|p| p.0).collect();
        assert_eq!(names, vec!["d", "a", "aa", "b", "c"]);
    }

    #[test]
    fn test_group_by_and_concat() {
        let words = ObservableVec::new(vec![
            String::from("apple"),
            String::from("bean"),
            String::from("avocado"),
        ]);
        let groups = words.as_list().group_by(|w: &String| w.chars().next());
        assert_eq!(groups.len(), 2);
        assert_eq!(groups.get(0).map(|g| g.len()), Some(2));

        let more = ObservableVec::new(vec![String::from("cherry")]);
        let all = words.as_list().concat(more.as_list());
        more.push(String::from("date"));
        assert_eq!(all.len(), 5);
    }

    #[test]
    fn test_positional_combinators() {
        let source = ObservableVec::new((1..=8).collect::<Vec<i32>>());
        let page = source.as_list().skip_take(2, 3);
        let backwards = page.reversed();
        let small = source.as_list().take_while(|x: &i32| *x < 4);
        assert_eq!(backwards.to_vec(), vec![5, 4, 3]);
        assert_eq!(small.to_vec(), vec![1, 2, 3]);

        source.remove_at(0).unwrap();
        assert_eq!(backwards.to_vec(), vec![6, 5, 4]);
        assert_eq!(small.to_vec(), vec![2, 3]);
    }

    #[test]
    fn test_set_join_zip() {
        let a = ObservableVec::new(vec![1, 2, 2, 3]);
        let b = ObservableVec::new(vec![2, 3, 4]);
        assert_eq!(a.as_list().distinct().to_vec(), vec![1, 2, 3]);
        assert_eq!(a.as_list().union(b.as_list()).to_vec(), vec![1, 2, 3, 4]);
        assert_eq!(a.as_list().intersect(b.as_list()).to_vec(), vec![2, 3]);
        assert_eq!(a.as_list().except(b.as_list()).to_vec(), vec![1]);

        let joined = a
            .as_list()
            .join(b.as_list(), |x: &i32| *x, |y: &i32| *y, |x: &i32, y: &i32| x * y);
        assert_eq!(joined.to_vec(), vec![4, 4, 9]);

        let zipped = a.as_list().zip(b.as_list(), |x: &i32, y: &i32| x + y);
        assert_eq!(zipped.to_vec(), vec![3, 5, 6]);
    }

    #[test]
    fn test_selector_from_query() {
        let source = ObservableVec::new(vec![1, 2, 3]);
        let selector = source.as_list().reversed().selector();
        selector.select(Some(0)).unwrap();
        assert_eq!(selector.selected_item(), Some(3));
        source.push(4);
        assert_eq!(selector.selected_index(), Some(1));
        assert_eq!(selector.selected_item(), Some(3));
    }
}
