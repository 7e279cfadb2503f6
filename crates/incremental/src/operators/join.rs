//! Incremental inner join.
//!
//! Both sides are indexed by key. An outer item has one key; an inner item
//! may carry several, so one inner item can join outer items under
//! different keys. A result exists for every `(outer, inner)` pair whose
//! keys currently match, in the order the pairs were formed.
//!
//! Source order does not matter to the join, so source moves only update
//! container positions.

use crate::container::{ContainerList, ItemContainer};
use crate::view::{observe, out_of_range, DerivedView, Upstream};
use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::RefCell;
use core::hash::Hash;
use hashbrown::HashMap;
use rivulet_core::{ChangeEvent, ReadList};
use rivulet_reactive::{
    ChangeListener, CountListener, EventHub, ListRef, ObservableList, Property, Subscription,
    Trigger,
};

const VIEW: &str = "JoinedList";

enum Combinator<O, I, R> {
    Static(Rc<dyn Fn(&O, &I) -> R>),
    Dynamic(Rc<dyn Fn(&O, &I) -> Property<R>>),
}

struct OuterSlot<K> {
    id: u64,
    key: K,
}

struct InnerSlot<K> {
    id: u64,
    keys: Vec<K>,
}

type Outer<O, K> = Rc<ItemContainer<O, OuterSlot<K>>>;
type Inner<I, K> = Rc<ItemContainer<I, InnerSlot<K>>>;

struct Pair<R> {
    id: u64,
    outer: u64,
    inner: u64,
    value: R,
    _watch: Option<Subscription>,
}

struct JoinState<O, I, K, R> {
    outers: ContainerList<O, OuterSlot<K>>,
    inners: ContainerList<I, InnerSlot<K>>,
    outer_index: HashMap<K, Vec<Outer<O, K>>>,
    inner_index: HashMap<K, Vec<Inner<I, K>>>,
    pairs: Vec<Pair<R>>,
    next_id: u64,
}

impl<O, I, K, R> JoinState<O, I, K, R>
where
    O: 'static,
    I: 'static,
    K: Hash + Eq + Clone + 'static,
{
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn index_outer(&mut self, container: &Outer<O, K>) {
        let key = container.state().key.clone();
        self.outer_index.entry(key).or_default().push(container.clone());
    }

    fn unindex_outer(&mut self, container: &Outer<O, K>) {
        let key = container.state().key.clone();
        if let Some(list) = self.outer_index.get_mut(&key) {
            list.retain(|c| !Rc::ptr_eq(c, container));
            if list.is_empty() {
                self.outer_index.remove(&key);
            }
        }
    }

    fn index_inner(&mut self, container: &Inner<I, K>) {
        let keys = container.state().keys.clone();
        for key in keys {
            self.inner_index.entry(key).or_default().push(container.clone());
        }
    }

    fn unindex_inner(&mut self, container: &Inner<I, K>) {
        let keys = container.state().keys.clone();
        for key in keys {
            if let Some(list) = self.inner_index.get_mut(&key) {
                list.retain(|c| !Rc::ptr_eq(c, container));
                if list.is_empty() {
                    self.inner_index.remove(&key);
                }
            }
        }
    }
}

/// Removes duplicate keys, keeping first occurrences.
fn dedup_keys<K: PartialEq>(keys: Vec<K>) -> Vec<K> {
    let mut unique: Vec<K> = Vec::with_capacity(keys.len());
    for key in keys {
        if !unique.contains(&key) {
            unique.push(key);
        }
    }
    unique
}

/// Configures a [`JoinedList`].
pub struct JoinedListBuilder<O, I, K> {
    outer: ListRef<O>,
    inner: ListRef<I>,
    outer_key: Rc<dyn Fn(&O) -> K>,
    inner_keys: Rc<dyn Fn(&I) -> Vec<K>>,
    outer_trigger: Option<Trigger<O>>,
    inner_trigger: Option<Trigger<I>>,
}

impl<O, I, K> JoinedListBuilder<O, I, K>
where
    O: Clone + 'static,
    I: Clone + 'static,
    K: Hash + Eq + Clone + 'static,
{
    pub fn new<FO, FI>(outer: ListRef<O>, inner: ListRef<I>, outer_key: FO, inner_key: FI) -> Self
    where
        FO: Fn(&O) -> K + 'static,
        FI: Fn(&I) -> K + 'static,
    {
        Self {
            outer,
            inner,
            outer_key: Rc::new(outer_key),
            inner_keys: Rc::new(move |item: &I| alloc::vec![inner_key(item)]),
            outer_trigger: None,
            inner_trigger: None,
        }
    }

    /// Lets each inner item match under several keys.
    pub fn inner_keys<F>(mut self, keys: F) -> Self
    where
        F: Fn(&I) -> Vec<K> + 'static,
    {
        self.inner_keys = Rc::new(keys);
        self
    }

    /// Re-keys an outer item whenever `trigger` fires for it.
    pub fn outer_trigger(mut self, trigger: Trigger<O>) -> Self {
        self.outer_trigger = Some(trigger);
        self
    }

    /// Re-keys an inner item whenever `trigger` fires for it.
    pub fn inner_trigger(mut self, trigger: Trigger<I>) -> Self {
        self.inner_trigger = Some(trigger);
        self
    }

    /// Finishes with a plain result selector.
    pub fn combine<R, F>(self, combine: F) -> Rc<JoinedList<O, I, K, R>>
    where
        R: Clone + 'static,
        F: Fn(&O, &I) -> R + 'static,
    {
        JoinedList::build(self, Combinator::Static(Rc::new(combine)))
    }

    /// Finishes with a selector whose results are observable; setting a
    /// result property replaces that result in place.
    pub fn combine_dynamic<R, F>(self, combine: F) -> Rc<JoinedList<O, I, K, R>>
    where
        R: Clone + 'static,
        F: Fn(&O, &I) -> Property<R> + 'static,
    {
        JoinedList::build(self, Combinator::Dynamic(Rc::new(combine)))
    }
}

/// A live inner join of two sources.
pub struct JoinedList<O, I, K, R> {
    this: Weak<Self>,
    outer: ListRef<O>,
    inner: ListRef<I>,
    outer_key: Rc<dyn Fn(&O) -> K>,
    inner_keys: Rc<dyn Fn(&I) -> Vec<K>>,
    outer_trigger: Option<Trigger<O>>,
    inner_trigger: Option<Trigger<I>>,
    combine: Combinator<O, I, R>,
    state: RefCell<JoinState<O, I, K, R>>,
    hub: EventHub<R>,
    upstream: Upstream,
}

impl<O, I, K, R> JoinedList<O, I, K, R>
where
    O: Clone + 'static,
    I: Clone + 'static,
    K: Hash + Eq + Clone + 'static,
    R: Clone + 'static,
{
    /// Joins on single keys with a plain result selector.
    pub fn new<FO, FI, F>(
        outer: ListRef<O>,
        inner: ListRef<I>,
        outer_key: FO,
        inner_key: FI,
        combine: F,
    ) -> Rc<Self>
    where
        FO: Fn(&O) -> K + 'static,
        FI: Fn(&I) -> K + 'static,
        F: Fn(&O, &I) -> R + 'static,
    {
        JoinedListBuilder::new(outer, inner, outer_key, inner_key).combine(combine)
    }

    fn build(config: JoinedListBuilder<O, I, K>, combine: Combinator<O, I, R>) -> Rc<Self> {
        let view = Rc::new_cyclic(|this| Self {
            this: this.clone(),
            outer: config.outer.clone(),
            inner: config.inner.clone(),
            outer_key: config.outer_key,
            inner_keys: config.inner_keys,
            outer_trigger: config.outer_trigger,
            inner_trigger: config.inner_trigger,
            combine,
            state: RefCell::new(JoinState {
                outers: ContainerList::new(),
                inners: ContainerList::new(),
                outer_index: HashMap::new(),
                inner_index: HashMap::new(),
                pairs: Vec::new(),
                next_id: 0,
            }),
            hub: EventHub::new(),
            upstream: Upstream::new(),
        });
        view.rebuild();
        view.upstream.hold(observe(&config.outer, &view, |view: &Self, event| {
            view.on_outer_change(event)
        }));
        view.upstream.hold(observe(&config.inner, &view, |view: &Self, event| {
            view.on_inner_change(event)
        }));
        view
    }

    fn wrap_outer(&self, state: &mut JoinState<O, I, K, R>, item: O, index: usize) -> Outer<O, K> {
        let key = (self.outer_key)(&item);
        let id = state.next_id();
        let container = ItemContainer::new(item, index, OuterSlot { id, key });
        if let Some(trigger) = &self.outer_trigger {
            container.attach(trigger, self.this.clone(), |view: &Self, c| view.rekey_outer(c));
        }
        container
    }

    fn wrap_inner(&self, state: &mut JoinState<O, I, K, R>, item: I, index: usize) -> Inner<I, K> {
        let keys = dedup_keys((self.inner_keys)(&item));
        let id = state.next_id();
        let container = ItemContainer::new(item, index, InnerSlot { id, keys });
        if let Some(trigger) = &self.inner_trigger {
            container.attach(trigger, self.this.clone(), |view: &Self, c| view.rekey_inner(c));
        }
        container
    }

    /// Forms the result for one pair.
    fn pair(&self, state: &mut JoinState<O, I, K, R>, outer: &Outer<O, K>, inner: &Inner<I, K>) -> R {
        let id = state.next_id();
        let (value, watch) = match &self.combine {
            Combinator::Static(f) => (f(outer.item(), inner.item()), None),
            Combinator::Dynamic(f) => {
                let property = f(outer.item(), inner.item());
                let view = self.this.clone();
                let watch = property.subscribe(move |value: &R| {
                    if let Some(view) = view.upgrade() {
                        view.on_result_changed(id, value.clone());
                    }
                });
                (property.get(), Some(watch))
            }
        };
        state.pairs.push(Pair {
            id,
            outer: outer.state().id,
            inner: inner.state().id,
            value: value.clone(),
            _watch: watch,
        });
        value
    }

    fn pair_outer(&self, state: &mut JoinState<O, I, K, R>, outer: &Outer<O, K>) -> Vec<R> {
        let key = outer.state().key.clone();
        let partners = state.inner_index.get(&key).cloned().unwrap_or_default();
        partners
            .iter()
            .map(|inner| self.pair(state, outer, inner))
            .collect()
    }

    fn pair_inner(&self, state: &mut JoinState<O, I, K, R>, inner: &Inner<I, K>) -> Vec<R> {
        let keys = inner.state().keys.clone();
        let mut values = Vec::new();
        for key in keys {
            let partners = state.outer_index.get(&key).cloned().unwrap_or_default();
            for outer in &partners {
                values.push(self.pair(state, outer, inner));
            }
        }
        values
    }

    fn rebuild(&self) {
        let outers = self.outer.to_vec();
        let inners = self.inner.to_vec();
        let mut state = self.state.borrow_mut();
        state.outers.clear();
        state.inners.clear();
        state.outer_index.clear();
        state.inner_index.clear();
        state.pairs.clear();
        for (index, item) in inners.into_iter().enumerate() {
            let container = self.wrap_inner(&mut state, item, index);
            state.index_inner(&container);
            state.inners.push(container);
        }
        for (index, item) in outers.into_iter().enumerate() {
            let container = self.wrap_outer(&mut state, item, index);
            state.index_outer(&container);
            self.pair_outer(&mut state, &container);
            state.outers.push(container);
        }
    }

    fn reset(&self) {
        let old_len = self.len();
        self.rebuild();
        let new_len = self.len();
        tracing::debug!(target: "rivulet_incremental::join", old_len, new_len, "join rebuilt");
        self.hub.emit(&ChangeEvent::Reset, old_len, new_len);
    }

    /// Appends freshly formed results as one Add.
    fn publish(&self, values: Vec<R>) {
        if values.is_empty() {
            return;
        }
        let new_len = self.len();
        let old_len = new_len - values.len();
        self.hub.emit(&ChangeEvent::add(old_len, values), old_len, new_len);
    }

    /// Removes every result matching `doomed` in one pass. Contiguous
    /// results leave as one Remove; runs are reported from the back so each
    /// index holds when applied in order.
    fn retract<F>(&self, doomed: F)
    where
        F: Fn(&Pair<R>) -> bool,
    {
        let runs = {
            let mut state = self.state.borrow_mut();
            let pairs = core::mem::take(&mut state.pairs);
            let mut kept = Vec::with_capacity(pairs.len());
            let mut runs: Vec<(usize, Vec<R>)> = Vec::new();
            for (pos, pair) in pairs.into_iter().enumerate() {
                if !doomed(&pair) {
                    kept.push(pair);
                    continue;
                }
                match runs.last_mut() {
                    Some((start, values)) if *start + values.len() == pos => {
                        values.push(pair.value)
                    }
                    _ => runs.push((pos, alloc::vec![pair.value])),
                }
            }
            state.pairs = kept;
            runs
        };
        let mut len = self.len() + runs.iter().map(|(_, values)| values.len()).sum::<usize>();
        for (start, values) in runs.into_iter().rev() {
            let count = values.len();
            self.hub.emit(&ChangeEvent::remove(start, values), len, len - count);
            len -= count;
        }
    }

    fn on_outer_change(&self, event: &ChangeEvent<O>) {
        match event {
            ChangeEvent::Add { index, items } => self.add_outers(*index, items),
            ChangeEvent::Remove { index, items } => self.remove_outers(*index, items.len()),
            ChangeEvent::Replace {
                index,
                old_items,
                new_items,
            } => {
                if !old_items.is_empty() {
                    self.remove_outers(*index, old_items.len());
                }
                if !new_items.is_empty() {
                    self.add_outers(*index, new_items);
                }
            }
            ChangeEvent::Move {
                old_index,
                new_index,
                items,
            } => {
                let mut state = self.state.borrow_mut();
                let len = state.outers.len();
                if old_index + items.len() > len || new_index + items.len() > len {
                    out_of_range(VIEW, core::cmp::max(*old_index, *new_index), items.len(), len);
                }
                state.outers.move_block(*old_index, *new_index, items.len());
            }
            ChangeEvent::Reset => self.reset(),
        }
    }

    fn on_inner_change(&self, event: &ChangeEvent<I>) {
        match event {
            ChangeEvent::Add { index, items } => self.add_inners(*index, items),
            ChangeEvent::Remove { index, items } => self.remove_inners(*index, items.len()),
            ChangeEvent::Replace {
                index,
                old_items,
                new_items,
            } => {
                if !old_items.is_empty() {
                    self.remove_inners(*index, old_items.len());
                }
                if !new_items.is_empty() {
                    self.add_inners(*index, new_items);
                }
            }
            ChangeEvent::Move {
                old_index,
                new_index,
                items,
            } => {
                let mut state = self.state.borrow_mut();
                let len = state.inners.len();
                if old_index + items.len() > len || new_index + items.len() > len {
                    out_of_range(VIEW, core::cmp::max(*old_index, *new_index), items.len(), len);
                }
                state.inners.move_block(*old_index, *new_index, items.len());
            }
            ChangeEvent::Reset => self.reset(),
        }
    }

    fn add_outers(&self, index: usize, items: &[O]) {
        let values = {
            let mut state = self.state.borrow_mut();
            if index > state.outers.len() {
                out_of_range(VIEW, index, 0, state.outers.len());
            }
            let mut block = Vec::with_capacity(items.len());
            let mut values = Vec::new();
            for (offset, item) in items.iter().enumerate() {
                let container = self.wrap_outer(&mut state, item.clone(), index + offset);
                state.index_outer(&container);
                values.extend(self.pair_outer(&mut state, &container));
                block.push(container);
            }
            state.outers.insert_block(index, block);
            values
        };
        self.publish(values);
    }

    fn remove_outers(&self, index: usize, count: usize) {
        let ids: Vec<u64> = {
            let mut state = self.state.borrow_mut();
            if index + count > state.outers.len() {
                out_of_range(VIEW, index, count, state.outers.len());
            }
            let removed = state.outers.remove_block(index, count);
            for container in &removed {
                state.unindex_outer(container);
            }
            removed.iter().map(|c| c.state().id).collect()
        };
        self.retract(|pair| ids.contains(&pair.outer));
    }

    fn add_inners(&self, index: usize, items: &[I]) {
        let values = {
            let mut state = self.state.borrow_mut();
            if index > state.inners.len() {
                out_of_range(VIEW, index, 0, state.inners.len());
            }
            let mut block = Vec::with_capacity(items.len());
            let mut values = Vec::new();
            for (offset, item) in items.iter().enumerate() {
                let container = self.wrap_inner(&mut state, item.clone(), index + offset);
                state.index_inner(&container);
                values.extend(self.pair_inner(&mut state, &container));
                block.push(container);
            }
            state.inners.insert_block(index, block);
            values
        };
        self.publish(values);
    }

    fn remove_inners(&self, index: usize, count: usize) {
        let ids: Vec<u64> = {
            let mut state = self.state.borrow_mut();
            if index + count > state.inners.len() {
                out_of_range(VIEW, index, count, state.inners.len());
            }
            let removed = state.inners.remove_block(index, count);
            for container in &removed {
                state.unindex_inner(container);
            }
            removed.iter().map(|c| c.state().id).collect()
        };
        self.retract(|pair| ids.contains(&pair.inner));
    }

    fn rekey_outer(&self, container: &Outer<O, K>) {
        let key = (self.outer_key)(container.item());
        {
            let mut state = self.state.borrow_mut();
            let current = state
                .outers
                .get(container.source_index())
                .map_or(false, |c| Rc::ptr_eq(c, container));
            if !current || container.state().key == key {
                return;
            }
            state.unindex_outer(container);
            container.state_mut().key = key;
            state.index_outer(container);
        }
        let id = container.state().id;
        self.retract(|pair| pair.outer == id);
        let values = {
            let mut state = self.state.borrow_mut();
            self.pair_outer(&mut state, container)
        };
        self.publish(values);
    }

    fn rekey_inner(&self, container: &Inner<I, K>) {
        let keys = dedup_keys((self.inner_keys)(container.item()));
        {
            let mut state = self.state.borrow_mut();
            let current = state
                .inners
                .get(container.source_index())
                .map_or(false, |c| Rc::ptr_eq(c, container));
            if !current || container.state().keys == keys {
                return;
            }
            state.unindex_inner(container);
            container.state_mut().keys = keys;
            state.index_inner(container);
        }
        let id = container.state().id;
        self.retract(|pair| pair.inner == id);
        let values = {
            let mut state = self.state.borrow_mut();
            self.pair_inner(&mut state, container)
        };
        self.publish(values);
    }

    fn on_result_changed(&self, id: u64, value: R) {
        let event = {
            let mut state = self.state.borrow_mut();
            let Some(pos) = state.pairs.iter().position(|p| p.id == id) else {
                return;
            };
            let old = core::mem::replace(&mut state.pairs[pos].value, value.clone());
            ChangeEvent::replace(pos, alloc::vec![old], alloc::vec![value])
        };
        let len = self.len();
        self.hub.emit(&event, len, len);
    }
}

impl<O, I, K, R> DerivedView for JoinedList<O, I, K, R>
where
    O: Clone + 'static,
    I: Clone + 'static,
    K: Hash + Eq + Clone + 'static,
    R: Clone + 'static,
{
    fn dispose(&self) {
        if self.upstream.dispose() {
            let mut state = self.state.borrow_mut();
            state.outers.detach_all();
            state.inners.detach_all();
            for pair in state.pairs.iter_mut() {
                pair._watch = None;
            }
            tracing::debug!(target: "rivulet_incremental::join", "join disposed");
        }
    }

    fn is_disposed(&self) -> bool {
        self.upstream.is_disposed()
    }
}

impl<O, I, K, R: Clone> ReadList<R> for JoinedList<O, I, K, R> {
    fn len(&self) -> usize {
        self.state.borrow().pairs.len()
    }

    fn get(&self, index: usize) -> Option<R> {
        self.state.borrow().pairs.as_slice().get(index).map(|p| p.value.clone())
    }

    fn to_vec(&self) -> Vec<R> {
        self.state.borrow().pairs.iter().map(|p| p.value.clone()).collect()
    }
}

impl<O, I, K, R> ObservableList<R> for JoinedList<O, I, K, R>
where
    O: 'static,
    I: 'static,
    K: 'static,
    R: Clone + 'static,
{
    fn subscribe(&self, listener: ChangeListener<R>) -> Subscription {
        self.hub.subscribe(listener)
    }

    fn subscribe_count(&self, listener: CountListener) -> Subscription {
        self.hub.subscribe_count(listener)
    }
}
