//! Multi-level ordering.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cmp::Ordering;
use rivulet_incremental::SortedList;
use rivulet_reactive::{ListRef, Trigger};

type Comparer<T> = Rc<dyn Fn(&T, &T) -> Ordering>;

/// A pending sort: one or more keys, compared in order until one differs.
///
/// Nothing is built until [`OrderedQuery::into_list`].
pub struct OrderedQuery<T> {
    source: ListRef<T>,
    levels: Vec<Comparer<T>>,
    trigger: Option<Trigger<T>>,
}

fn by_key<T, K, F>(key: F, descending: bool) -> Comparer<T>
where
    T: 'static,
    K: Ord + 'static,
    F: Fn(&T) -> K + 'static,
{
    Rc::new(move |a: &T, b: &T| {
        let ord = key(a).cmp(&key(b));
        if descending {
            ord.reverse()
        } else {
            ord
        }
    })
}

impl<T: Clone + 'static> OrderedQuery<T> {
    pub(crate) fn new<K, F>(source: ListRef<T>, key: F, descending: bool) -> Self
    where
        K: Ord + 'static,
        F: Fn(&T) -> K + 'static,
    {
        Self {
            source,
            levels: alloc::vec![by_key(key, descending)],
            trigger: None,
        }
    }

    /// Breaks ties by `key`, ascending.
    pub fn then_by<K, F>(mut self, key: F) -> Self
    where
        K: Ord + 'static,
        F: Fn(&T) -> K + 'static,
    {
        self.levels.push(by_key(key, false));
        self
    }

    /// Breaks ties by `key`, descending.
    pub fn then_by_descending<K, F>(mut self, key: F) -> Self
    where
        K: Ord + 'static,
        F: Fn(&T) -> K + 'static,
    {
        self.levels.push(by_key(key, true));
        self
    }

    /// Re-positions an item whenever `trigger` fires for it.
    pub fn trigger(mut self, trigger: Trigger<T>) -> Self {
        self.trigger = Some(trigger);
        self
    }

    /// Builds the sorted view.
    ///
    /// Items equal under every level keep their source order.
    pub fn into_list(self) -> ListRef<T> {
        tracing::trace!(
            target: "rivulet_query::ordered",
            levels = self.levels.len(),
            live = self.trigger.is_some(),
            "building sorted view"
        );
        let levels = self.levels;
        let compare = move |a: &T, b: &T| {
            levels
                .iter()
                .map(|level| level(a, b))
                .find(|ord| ord.is_ne())
                .unwrap_or(Ordering::Equal)
        };
        SortedList::new(self.source, T::clone, compare, self.trigger)
    }
}
