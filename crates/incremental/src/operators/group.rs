//! Incremental grouping.
//!
//! Every source item resolves to a key and, through the key, to at most one
//! group. Each container remembers its group and its position inside that
//! group; a member's position is found by scanning back to the nearest
//! earlier item of the same group, and later members of that group are
//! shifted. The cost of an edit is therefore proportional to the source
//! suffix it touches.
//!
//! During one source event every group and the group list itself receive at
//! most one notification, raised after all state has been updated, so a
//! listener always observes contents that match the event it receives.
//! Emptied implicit groups are the exception: they are removed from the
//! group list one at a time, each removal with its own event.

use crate::container::{ContainerList, ItemContainer};
use crate::view::{contract_violation, observe, out_of_range, DerivedView, Upstream};
use alloc::format;
use alloc::rc::{Rc, Weak};
use alloc::vec;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::fmt::Debug;
use core::hash::Hash;
use hashbrown::HashMap;
use rivulet_core::{move_steps, ChangeEvent, Error, ReadList, Result};
use rivulet_reactive::{
    ChangeListener, CountListener, EventHub, ListRef, ObservableList, Property, Subscription,
    Trigger,
};

const VIEW: &str = "GroupedList";

/// One group of a [`GroupedList`]: a key and the source items that map to
/// it, in source order.
pub struct Group<K, T> {
    key: K,
    explicit: Cell<bool>,
    members: RefCell<Vec<T>>,
    hub: EventHub<T>,
}

impl<K: 'static, T: Clone + 'static> Group<K, T> {
    fn new(key: K, explicit: bool) -> Rc<Self> {
        Rc::new(Self {
            key,
            explicit: Cell::new(explicit),
            members: RefCell::new(Vec::new()),
            hub: EventHub::new(),
        })
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    /// Explicit groups are declared by the caller and survive being empty.
    pub fn is_explicit(&self) -> bool {
        self.explicit.get()
    }
}

impl<K, T: Clone> ReadList<T> for Group<K, T> {
    fn len(&self) -> usize {
        self.members.borrow().len()
    }

    fn get(&self, index: usize) -> Option<T> {
        self.members.borrow().as_slice().get(index).cloned()
    }

    fn to_vec(&self) -> Vec<T> {
        self.members.borrow().clone()
    }
}

impl<K: 'static, T: Clone + 'static> ObservableList<T> for Group<K, T> {
    fn subscribe(&self, listener: ChangeListener<T>) -> Subscription {
        self.hub.subscribe(listener)
    }

    fn subscribe_count(&self, listener: CountListener) -> Subscription {
        self.hub.subscribe_count(listener)
    }
}

impl<K: Debug, T> Debug for Group<K, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Group")
            .field("key", &self.key)
            .field("explicit", &self.explicit.get())
            .field("len", &self.members.borrow().len())
            .finish()
    }
}

/// Shared handle to one group.
pub type GroupRef<K, T> = Rc<Group<K, T>>;

struct GroupSlot<K, T> {
    key: K,
    group: Option<GroupRef<K, T>>,
    group_index: usize,
}

type Slot<K, T> = Rc<ItemContainer<T, GroupSlot<K, T>>>;

/// Notifications collected while the state is borrowed.
struct Outbox<K, T> {
    created: Vec<GroupRef<K, T>>,
    members: Vec<(GroupRef<K, T>, ChangeEvent<T>, usize)>,
    shrunk: Vec<GroupRef<K, T>>,
}

impl<K, T> Default for Outbox<K, T> {
    fn default() -> Self {
        Self {
            created: Vec::new(),
            members: Vec::new(),
            shrunk: Vec::new(),
        }
    }
}

impl<K: 'static, T: Clone + 'static> Outbox<K, T> {
    fn pending(&mut self, group: &GroupRef<K, T>) -> Option<&mut ChangeEvent<T>> {
        self.members
            .iter_mut()
            .find(|(g, _, _)| Rc::ptr_eq(g, group))
            .map(|(_, event, _)| event)
    }

    /// Records `item` entering `group` at `pos`, extending a pending Add.
    fn added(&mut self, group: &GroupRef<K, T>, pos: usize, item: T, old_len: usize) {
        if let Some(ChangeEvent::Add { items, .. }) = self.pending(group) {
            items.push(item);
            return;
        }
        self.members
            .push((group.clone(), ChangeEvent::add_one(pos, item), old_len));
    }

    /// Records `item` leaving `group` from `pos`, extending a pending Remove.
    fn removed(&mut self, group: &GroupRef<K, T>, pos: usize, item: T, old_len: usize) {
        if let Some(ChangeEvent::Remove { items, .. }) = self.pending(group) {
            items.push(item);
        } else {
            self.members
                .push((group.clone(), ChangeEvent::remove_one(pos, item), old_len));
        }
        if !self.shrunk.iter().any(|g| Rc::ptr_eq(g, group)) {
            self.shrunk.push(group.clone());
        }
    }

    fn event(&mut self, group: &GroupRef<K, T>, event: ChangeEvent<T>, old_len: usize) {
        self.members.push((group.clone(), event, old_len));
    }
}

struct GroupState<K, T> {
    entries: ContainerList<T, GroupSlot<K, T>>,
    groups: Vec<GroupRef<K, T>>,
    lookup: HashMap<K, GroupRef<K, T>>,
    include_implicit: bool,
}

impl<K, T> GroupState<K, T>
where
    K: Hash + Eq + Clone + Debug + 'static,
    T: Clone + 'static,
{
    /// Finds the group for `key`, creating an implicit one when allowed.
    fn resolve(&mut self, key: &K, outbox: &mut Outbox<K, T>) -> Option<GroupRef<K, T>> {
        if let Some(group) = self.lookup.get(key) {
            return Some(group.clone());
        }
        if !self.include_implicit {
            return None;
        }
        let group = Group::new(key.clone(), false);
        tracing::trace!(target: "rivulet_incremental::group", key = ?key, "implicit group created");
        self.lookup.insert(key.clone(), group.clone());
        outbox.created.push(group.clone());
        Some(group)
    }

    /// Position inside `group` for the item at source `index`: one past the
    /// nearest earlier member of the same group.
    fn position_in_group(&self, index: usize, group: &GroupRef<K, T>) -> usize {
        self.nearest_member_before(index, group).map_or(0, |pos| pos + 1)
    }

    fn nearest_member_before(&self, index: usize, group: &GroupRef<K, T>) -> Option<usize> {
        self.entries.as_slice()[..index].iter().rev().find_map(|c| {
            let slot = c.state();
            match &slot.group {
                Some(g) if Rc::ptr_eq(g, group) => Some(slot.group_index),
                _ => None,
            }
        })
    }

    /// Adds `delta` to the group index of members of the given groups from
    /// source position `start` on.
    fn shift_after(&self, start: usize, deltas: &[(GroupRef<K, T>, isize)]) {
        if deltas.is_empty() {
            return;
        }
        for container in &self.entries.as_slice()[start..] {
            let mut slot = container.state_mut();
            let Some(group) = slot.group.clone() else {
                continue;
            };
            if let Some((_, delta)) = deltas.iter().find(|(g, _)| Rc::ptr_eq(g, &group)) {
                slot.group_index = (slot.group_index as isize + delta) as usize;
            }
        }
    }

    /// Places the container in the group its key resolves to.
    fn assign(&mut self, container: &Slot<K, T>, outbox: &mut Outbox<K, T>) -> Option<GroupRef<K, T>> {
        let key = container.state().key.clone();
        let group = self.resolve(&key, outbox)?;
        let pos = self.position_in_group(container.source_index(), &group);
        let old_len = group.len();
        group.members.borrow_mut().insert(pos, container.item().clone());
        {
            let mut slot = container.state_mut();
            slot.group = Some(group.clone());
            slot.group_index = pos;
        }
        outbox.added(&group, pos, container.item().clone(), old_len);
        Some(group)
    }

    /// Takes the container out of its group, if any.
    fn unassign(&self, container: &Slot<K, T>, outbox: &mut Outbox<K, T>) -> Option<GroupRef<K, T>> {
        let (group, pos) = {
            let mut slot = container.state_mut();
            let group = slot.group.take()?;
            (group, slot.group_index)
        };
        let old_len = group.len();
        if pos >= old_len {
            out_of_range(VIEW, pos, 1, old_len);
        }
        let item = group.members.borrow_mut().remove(pos);
        outbox.removed(&group, pos, item, old_len);
        Some(group)
    }
}

type KeyFn<T, K> = Rc<dyn Fn(&T) -> K>;

/// Configures a [`GroupedList`].
pub struct GroupedListBuilder<K, T> {
    source: ListRef<T>,
    key_of: KeyFn<T, K>,
    explicit: Vec<K>,
    include_implicit: bool,
    trigger: Option<Trigger<T>>,
}

impl<K, T> GroupedListBuilder<K, T>
where
    K: Hash + Eq + Clone + Debug + 'static,
    T: Clone + 'static,
{
    pub fn new<F>(source: ListRef<T>, key: F) -> Self
    where
        F: Fn(&T) -> K + 'static,
    {
        Self {
            source,
            key_of: Rc::new(key),
            explicit: Vec::new(),
            include_implicit: true,
            trigger: None,
        }
    }

    /// Declares an explicit group. Repeated keys are declared once.
    pub fn explicit_group(mut self, key: K) -> Self {
        if !self.explicit.contains(&key) {
            self.explicit.push(key);
        }
        self
    }

    pub fn explicit_groups<I: IntoIterator<Item = K>>(self, keys: I) -> Self {
        keys.into_iter().fold(self, Self::explicit_group)
    }

    /// Whether items whose key has no explicit group get a group of their
    /// own. Defaults to true.
    pub fn include_implicit_groups(mut self, include: bool) -> Self {
        self.include_implicit = include;
        self
    }

    /// Re-keys an item whenever `trigger` fires for it.
    pub fn trigger(mut self, trigger: Trigger<T>) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn build(self) -> Rc<GroupedList<K, T>> {
        let mut lookup = HashMap::new();
        let mut groups = Vec::with_capacity(self.explicit.len());
        for key in self.explicit {
            let group = Group::new(key.clone(), true);
            lookup.insert(key, group.clone());
            groups.push(group);
        }
        let view = Rc::new_cyclic(|this| GroupedList {
            this: this.clone(),
            source: self.source.clone(),
            key_of: self.key_of,
            trigger: self.trigger,
            state: RefCell::new(GroupState {
                entries: ContainerList::new(),
                groups,
                lookup,
                include_implicit: self.include_implicit,
            }),
            hub: EventHub::new(),
            upstream: Upstream::new(),
        });
        view.populate();
        view.upstream.hold(observe(&self.source, &view, |view: &GroupedList<K, T>, event| {
            view.on_source_change(event)
        }));
        view
    }
}

/// A live partition of the source into keyed groups.
///
/// The view is a list of groups; each group is itself observable.
pub struct GroupedList<K, T> {
    this: Weak<Self>,
    source: ListRef<T>,
    key_of: KeyFn<T, K>,
    trigger: Option<Trigger<T>>,
    state: RefCell<GroupState<K, T>>,
    hub: EventHub<GroupRef<K, T>>,
    upstream: Upstream,
}

impl<K, T> GroupedList<K, T>
where
    K: Hash + Eq + Clone + Debug + 'static,
    T: Clone + 'static,
{
    /// Groups by a static key with implicit groups enabled.
    pub fn new<F>(source: ListRef<T>, key: F) -> Rc<Self>
    where
        F: Fn(&T) -> K + 'static,
    {
        GroupedListBuilder::new(source, key).build()
    }

    pub fn builder<F>(source: ListRef<T>, key: F) -> GroupedListBuilder<K, T>
    where
        F: Fn(&T) -> K + 'static,
    {
        GroupedListBuilder::new(source, key)
    }

    /// Groups by a key held in a property of each item; setting the property
    /// moves the item to its new group.
    pub fn by_dynamic_key<F>(source: ListRef<T>, selector: F) -> Rc<Self>
    where
        F: Fn(&T) -> Property<K> + 'static,
    {
        let selector = Rc::new(selector);
        let watch = selector.clone();
        GroupedListBuilder::new(source, move |item: &T| selector(item).get())
            .trigger(Trigger::on_property(move |item: &T| watch(item)))
            .build()
    }

    /// Returns the group for `key`, if it currently exists.
    pub fn group(&self, key: &K) -> Option<GroupRef<K, T>> {
        self.state.borrow().lookup.get(key).cloned()
    }

    pub fn include_implicit_groups(&self) -> bool {
        self.state.borrow().include_implicit
    }

    /// Declares an explicit group and fills it with the matching items.
    ///
    /// An existing implicit group for `key` is promoted and returned.
    pub fn add_explicit_group(&self, key: K) -> Result<GroupRef<K, T>> {
        let mut outbox = Outbox::default();
        let group = {
            let mut state = self.state.borrow_mut();
            if let Some(group) = state.lookup.get(&key) {
                if group.is_explicit() {
                    return Err(Error::DuplicateGroup(format!("{key:?}")));
                }
                group.explicit.set(true);
                return Ok(group.clone());
            }
            let group = Group::new(key.clone(), true);
            {
                let mut members = group.members.borrow_mut();
                for container in state.entries.iter() {
                    let mut slot = container.state_mut();
                    if slot.group.is_none() && slot.key == key {
                        slot.group = Some(group.clone());
                        slot.group_index = members.len();
                        members.push(container.item().clone());
                    }
                }
            }
            state.lookup.insert(key, group.clone());
            outbox.created.push(group.clone());
            group
        };
        tracing::trace!(target: "rivulet_incremental::group", key = ?group.key(), "explicit group declared");
        self.flush(outbox);
        Ok(group)
    }

    /// Withdraws an explicit group.
    ///
    /// With implicit groups enabled, a non-empty group stays as an implicit
    /// one; otherwise its items become ungrouped and the group is dropped.
    pub fn remove_explicit_group(&self, key: &K) -> Result<()> {
        let (group, had_members) = {
            let mut state = self.state.borrow_mut();
            let group = match state.lookup.get(key) {
                Some(group) if group.is_explicit() => group.clone(),
                _ => return Err(Error::GroupNotFound(format!("{key:?}"))),
            };
            if state.include_implicit && !group.is_empty() {
                group.explicit.set(false);
                return Ok(());
            }
            for container in state.entries.iter() {
                let mut slot = container.state_mut();
                if slot.group.as_ref().map_or(false, |g| Rc::ptr_eq(g, &group)) {
                    slot.group = None;
                }
            }
            let had_members = group.len();
            group.members.borrow_mut().clear();
            state.lookup.remove(key);
            (group, had_members)
        };
        tracing::trace!(target: "rivulet_incremental::group", key = ?key, "explicit group withdrawn");
        if had_members > 0 {
            group.hub.emit(&ChangeEvent::Reset, had_members, 0);
        }
        self.drop_group(&group);
        Ok(())
    }

    /// Enables or disables implicit groups.
    ///
    /// Enabling creates a group for every key that has items but no explicit
    /// group. Disabling clears and drops every implicit group; explicit
    /// groups are kept, possibly empty.
    pub fn set_include_implicit_groups(&self, include: bool) {
        if include {
            let outbox = {
                let mut state = self.state.borrow_mut();
                if state.include_implicit {
                    return;
                }
                state.include_implicit = true;
                let mut outbox = Outbox::default();
                let ungrouped: Vec<Slot<K, T>> = state
                    .entries
                    .iter()
                    .filter(|c| c.state().group.is_none())
                    .cloned()
                    .collect();
                for container in ungrouped {
                    let key = container.state().key.clone();
                    if let Some(group) = state.resolve(&key, &mut outbox) {
                        let mut slot = container.state_mut();
                        let mut members = group.members.borrow_mut();
                        slot.group = Some(group.clone());
                        slot.group_index = members.len();
                        members.push(container.item().clone());
                    }
                }
                outbox
            };
            tracing::trace!(
                target: "rivulet_incremental::group",
                created = outbox.created.len(),
                "implicit groups enabled"
            );
            self.flush(outbox);
        } else {
            let implicit = {
                let mut state = self.state.borrow_mut();
                if !state.include_implicit {
                    return;
                }
                state.include_implicit = false;
                for container in state.entries.iter() {
                    let mut slot = container.state_mut();
                    if slot.group.as_ref().map_or(false, |g| !g.is_explicit()) {
                        slot.group = None;
                    }
                }
                let implicit: Vec<(GroupRef<K, T>, usize)> = state
                    .groups
                    .iter()
                    .filter(|g| !g.is_explicit())
                    .map(|g| (g.clone(), g.len()))
                    .collect();
                for (group, _) in &implicit {
                    group.members.borrow_mut().clear();
                    state.lookup.remove(group.key());
                }
                implicit
            };
            tracing::trace!(
                target: "rivulet_incremental::group",
                removed = implicit.len(),
                "implicit groups disabled"
            );
            for (group, old_len) in &implicit {
                group.hub.emit(&ChangeEvent::Reset, *old_len, 0);
            }
            for (group, _) in &implicit {
                self.drop_group(group);
            }
        }
    }

    fn wrap(&self, item: T, index: usize) -> Slot<K, T> {
        let key = (self.key_of)(&item);
        let container = ItemContainer::new(
            item,
            index,
            GroupSlot {
                key,
                group: None,
                group_index: 0,
            },
        );
        if let Some(trigger) = &self.trigger {
            container.attach(trigger, self.this.clone(), |view: &Self, c| view.rekey(c));
        }
        container
    }

    /// Wraps every source item and assigns groups; explicit groups must
    /// already be registered and empty.
    fn populate(&self) -> Vec<GroupRef<K, T>> {
        let items = self.source.to_vec();
        let mut state = self.state.borrow_mut();
        let mut outbox = Outbox::default();
        for (index, item) in items.into_iter().enumerate() {
            let container = self.wrap(item, index);
            state.entries.push(container.clone());
            let key = container.state().key.clone();
            if let Some(group) = state.resolve(&key, &mut outbox) {
                let mut slot = container.state_mut();
                let mut members = group.members.borrow_mut();
                slot.group = Some(group.clone());
                slot.group_index = members.len();
                members.push(container.item().clone());
            }
        }
        state.groups.extend(outbox.created.iter().cloned());
        outbox.created
    }

    fn on_source_change(&self, event: &ChangeEvent<T>) {
        match event {
            ChangeEvent::Add { index, items } => self.on_add(*index, items),
            ChangeEvent::Remove { index, items } => self.on_remove(*index, items.len()),
            ChangeEvent::Replace {
                index,
                old_items,
                new_items,
            } => {
                if old_items.len() == new_items.len() {
                    for (offset, item) in new_items.iter().enumerate() {
                        self.replace_one(index + offset, item);
                    }
                } else {
                    if !old_items.is_empty() {
                        self.on_remove(*index, old_items.len());
                    }
                    if !new_items.is_empty() {
                        self.on_add(*index, new_items);
                    }
                }
            }
            ChangeEvent::Move {
                old_index,
                new_index,
                items,
            } => {
                {
                    let state = self.state.borrow();
                    let len = state.entries.len();
                    if old_index + items.len() > len || new_index + items.len() > len {
                        out_of_range(VIEW, core::cmp::max(*old_index, *new_index), items.len(), len);
                    }
                }
                for (from, to) in move_steps(*old_index, *new_index, items.len()) {
                    self.move_one(from, to);
                }
            }
            ChangeEvent::Reset => self.on_reset(),
        }
    }

    fn on_add(&self, index: usize, items: &[T]) {
        let outbox = {
            let mut state = self.state.borrow_mut();
            if index > state.entries.len() {
                out_of_range(VIEW, index, 0, state.entries.len());
            }
            let block: Vec<Slot<K, T>> = items
                .iter()
                .enumerate()
                .map(|(offset, item)| self.wrap(item.clone(), index + offset))
                .collect();
            state.entries.insert_block(index, block.clone());

            let mut outbox = Outbox::default();
            let mut deltas: Vec<(GroupRef<K, T>, isize)> = Vec::new();
            for container in &block {
                if let Some(group) = state.assign(container, &mut outbox) {
                    match deltas.iter_mut().find(|(g, _)| Rc::ptr_eq(g, &group)) {
                        Some((_, delta)) => *delta += 1,
                        None => deltas.push((group, 1)),
                    }
                }
            }
            state.shift_after(index + block.len(), &deltas);
            outbox
        };
        self.flush(outbox);
    }

    fn on_remove(&self, index: usize, count: usize) {
        let outbox = {
            let mut state = self.state.borrow_mut();
            if index + count > state.entries.len() {
                out_of_range(VIEW, index, count, state.entries.len());
            }
            let removed = state.entries.remove_block(index, count);
            let mut outbox = Outbox::default();
            let mut deltas: Vec<(GroupRef<K, T>, isize)> = Vec::new();
            for container in &removed {
                // Earlier members of the block already left the same group.
                let group = container.state().group.clone();
                if let Some(group) = group {
                    if let Some((_, delta)) = deltas.iter().find(|(g, _)| Rc::ptr_eq(g, &group)) {
                        container.state_mut().group_index -= delta.unsigned_abs();
                    }
                }
                if let Some(group) = state.unassign(container, &mut outbox) {
                    match deltas.iter_mut().find(|(g, _)| Rc::ptr_eq(g, &group)) {
                        Some((_, delta)) => *delta -= 1,
                        None => deltas.push((group, -1)),
                    }
                }
            }
            state.shift_after(index, &deltas);
            outbox
        };
        self.flush(outbox);
    }

    fn replace_one(&self, index: usize, item: &T) {
        let outbox = {
            let mut state = self.state.borrow_mut();
            let Some(old) = state.entries.get(index).cloned() else {
                out_of_range(VIEW, index, 1, state.entries.len());
            };
            let key = (self.key_of)(item);
            let target = state.lookup.get(&key).cloned();
            let (group, pos) = {
                let slot = old.state();
                (slot.group.clone(), slot.group_index)
            };
            let same_group = match (&group, &target) {
                (Some(a), Some(b)) => Rc::ptr_eq(a, b),
                (None, None) => !state.include_implicit,
                _ => false,
            };
            if !same_group {
                None
            } else {
                let container = self.wrap(item.clone(), index);
                {
                    let mut slot = container.state_mut();
                    slot.group = group.clone();
                    slot.group_index = pos;
                }
                state.entries.remove_block(index, 1);
                state.entries.insert_block(index, vec![container]);
                let mut outbox = Outbox::default();
                if let Some(group) = group {
                    let len = group.len();
                    let previous =
                        core::mem::replace(&mut group.members.borrow_mut()[pos], item.clone());
                    outbox.event(&group, ChangeEvent::replace(pos, vec![previous], vec![item.clone()]), len);
                }
                Some(outbox)
            }
        };
        match outbox {
            Some(outbox) => self.flush(outbox),
            None => {
                self.on_remove(index, 1);
                self.on_add(index, core::slice::from_ref(item));
            }
        }
    }

    /// Moves one source item from `from` to `to` and mirrors the move inside
    /// its group.
    fn move_one(&self, from: usize, to: usize) {
        let outbox = {
            let mut state = self.state.borrow_mut();
            let Some(container) = state.entries.get(from).cloned() else {
                out_of_range(VIEW, from, 1, state.entries.len());
            };
            state.entries.move_block(from, to, 1);
            let Some(group) = container.state().group.clone() else {
                return;
            };
            let old_pos = container.state().group_index;
            // Members the item jumped over still carry their old positions.
            let new_pos = match state.nearest_member_before(to, &group) {
                Some(pos) if pos > old_pos => pos,
                Some(pos) => pos + 1,
                None => 0,
            };
            if old_pos == new_pos {
                return;
            }
            {
                let mut members = group.members.borrow_mut();
                let item = members.remove(old_pos);
                members.insert(new_pos, item);
            }
            // Members of this group inside the touched span are renumbered in
            // source order, starting from the lower of the two positions.
            let (start, end) = (core::cmp::min(from, to), core::cmp::max(from, to));
            let mut next = core::cmp::min(old_pos, new_pos);
            for c in &state.entries.as_slice()[start..=end] {
                let mut slot = c.state_mut();
                if slot.group.as_ref().map_or(false, |g| Rc::ptr_eq(g, &group)) {
                    slot.group_index = next;
                    next += 1;
                }
            }
            let mut outbox = Outbox::default();
            let len = group.len();
            outbox.event(
                &group,
                ChangeEvent::moved(old_pos, new_pos, vec![container.item().clone()]),
                len,
            );
            outbox
        };
        self.flush(outbox);
    }

    fn rekey(&self, container: &Slot<K, T>) {
        let key = (self.key_of)(container.item());
        let outbox = {
            let mut state = self.state.borrow_mut();
            let index = container.source_index();
            let current = state
                .entries
                .get(index)
                .map_or(false, |c| Rc::ptr_eq(c, container));
            if !current {
                return;
            }
            let target = state.lookup.get(&key).cloned();
            let unchanged = match (&container.state().group, &target) {
                (Some(a), Some(b)) => Rc::ptr_eq(a, b),
                (None, None) => !state.include_implicit,
                _ => false,
            };
            if unchanged {
                container.state_mut().key = key;
                return;
            }
            let mut outbox = Outbox::default();
            if let Some(group) = state.unassign(container, &mut outbox) {
                state.shift_after(index + 1, &[(group, -1)]);
            }
            container.state_mut().key = key;
            if let Some(group) = state.assign(container, &mut outbox) {
                state.shift_after(index + 1, &[(group, 1)]);
            }
            outbox
        };
        self.flush(outbox);
    }

    fn on_reset(&self) {
        let previous = {
            let mut state = self.state.borrow_mut();
            state.entries.clear();
            let previous: Vec<(GroupRef<K, T>, usize)> = core::mem::take(&mut state.groups)
                .into_iter()
                .map(|g| {
                    let len = g.len();
                    g.members.borrow_mut().clear();
                    (g, len)
                })
                .collect();
            state.lookup.clear();
            for (group, _) in previous.iter().filter(|(g, _)| g.is_explicit()) {
                state.lookup.insert(group.key().clone(), group.clone());
                state.groups.push(group.clone());
            }
            previous
        };
        let old_len = previous.len();
        let created = self.populate();
        let new_len = self.len();
        tracing::debug!(
            target: "rivulet_incremental::group",
            old_groups = old_len,
            new_groups = new_len,
            implicit = created.len(),
            "grouping rebuilt"
        );
        for (group, len) in &previous {
            group.hub.emit(&ChangeEvent::Reset, *len, group.len());
        }
        self.hub.emit(&ChangeEvent::Reset, old_len, new_len);
    }

    /// Publishes collected notifications: new groups first, then member
    /// changes, then removal of implicit groups left empty.
    fn flush(&self, outbox: Outbox<K, T>) {
        let Outbox {
            created,
            members,
            shrunk,
        } = outbox;

        let announced: Vec<GroupRef<K, T>> = {
            let mut state = self.state.borrow_mut();
            let mut announced = Vec::with_capacity(created.len());
            for group in created {
                if group.is_empty() && !group.is_explicit() {
                    state.lookup.remove(group.key());
                } else {
                    announced.push(group);
                }
            }
            state.groups.extend(announced.iter().cloned());
            announced
        };
        if !announced.is_empty() {
            let new_len = self.len();
            let old_len = new_len - announced.len();
            self.hub.emit(&ChangeEvent::add(old_len, announced.clone()), old_len, new_len);
        }

        for (group, event, old_len) in members {
            if announced.iter().any(|g| Rc::ptr_eq(g, &group)) {
                continue;
            }
            group.hub.emit(&event, old_len, group.len());
        }

        for group in shrunk {
            if group.is_empty() && !group.is_explicit() {
                let registered = {
                    let mut state = self.state.borrow_mut();
                    let registered = state
                        .lookup
                        .get(group.key())
                        .map_or(false, |g| Rc::ptr_eq(g, &group));
                    if registered {
                        state.lookup.remove(group.key());
                    }
                    registered
                };
                if registered {
                    tracing::trace!(target: "rivulet_incremental::group", key = ?group.key(), "implicit group emptied");
                    self.drop_group(&group);
                }
            }
        }
    }

    /// Removes `group` from the group list and announces the removal.
    fn drop_group(&self, group: &GroupRef<K, T>) {
        let (pos, old_len) = {
            let mut state = self.state.borrow_mut();
            let old_len = state.groups.len();
            let Some(pos) = state.groups.iter().position(|g| Rc::ptr_eq(g, group)) else {
                contract_violation(VIEW, Error::GroupNotFound(format!("{:?}", group.key())));
            };
            state.groups.remove(pos);
            (pos, old_len)
        };
        self.hub
            .emit(&ChangeEvent::remove_one(pos, group.clone()), old_len, old_len - 1);
    }
}

impl<K, T> DerivedView for GroupedList<K, T>
where
    K: Hash + Eq + Clone + Debug + 'static,
    T: Clone + 'static,
{
    fn dispose(&self) {
        if self.upstream.dispose() {
            self.state.borrow().entries.detach_all();
            tracing::debug!(target: "rivulet_incremental::group", "grouping disposed");
        }
    }

    fn is_disposed(&self) -> bool {
        self.upstream.is_disposed()
    }
}

impl<K, T> ReadList<GroupRef<K, T>> for GroupedList<K, T> {
    fn len(&self) -> usize {
        self.state.borrow().groups.len()
    }

    fn get(&self, index: usize) -> Option<GroupRef<K, T>> {
        self.state.borrow().groups.as_slice().get(index).cloned()
    }

    fn to_vec(&self) -> Vec<GroupRef<K, T>> {
        self.state.borrow().groups.clone()
    }
}

impl<K, T> ObservableList<GroupRef<K, T>> for GroupedList<K, T>
where
    K: 'static,
    T: 'static,
{
    fn subscribe(&self, listener: ChangeListener<GroupRef<K, T>>) -> Subscription {
        self.hub.subscribe(listener)
    }

    fn subscribe_count(&self, listener: CountListener) -> Subscription {
        self.hub.subscribe_count(listener)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rivulet_reactive::{ObservableListExt, ObservableVec};

    fn keys(view: &GroupedList<i32, i32>) -> Vec<i32> {
        view.to_vec().iter().map(|g| *g.key()).collect()
    }

    fn record(group: &GroupRef<i32, i32>) -> (Rc<RefCell<Vec<ChangeEvent<i32>>>>, Subscription) {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        let sub = group.on_change(move |e| sink.borrow_mut().push(e.clone()));
        (events, sub)
    }

    #[test]
    fn test_implicit_groups_in_creation_order() {
        let source = ObservableVec::new(vec![3, 4, 5, 6, 7]);
        let view = GroupedList::new(source.as_list(), |x: &i32| x % 3);
        assert_eq!(keys(&view), vec![0, 1, 2]);
        assert_eq!(view.group(&1).unwrap().to_vec(), vec![4, 7]);
        assert_eq!(view.group(&0).unwrap().to_vec(), vec![3, 6]);
    }

    #[test]
    fn test_add_inserts_in_source_order() {
        let source = ObservableVec::new(vec![1, 2, 5]);
        let view = GroupedList::new(source.as_list(), |x: &i32| x % 2);
        let odd = view.group(&1).unwrap();
        let (events, _sub) = record(&odd);

        source.insert_many(1, vec![3, 4, 9]).unwrap();
        assert_eq!(odd.to_vec(), vec![1, 3, 9, 5]);
        assert_eq!(view.group(&0).unwrap().to_vec(), vec![4, 2]);
        assert_eq!(*events.borrow(), vec![ChangeEvent::add(1, vec![3, 9])]);
    }

    #[test]
    fn test_remove_drops_empty_implicit_group() {
        let source = ObservableVec::new(vec![1, 2, 3]);
        let view = GroupedList::new(source.as_list(), |x: &i32| x % 2);
        let counts = Rc::new(RefCell::new(Vec::new()));
        let sink = counts.clone();
        let _sub = view.on_count(move |n| sink.borrow_mut().push(*n));

        source.remove_at(1).unwrap();
        assert_eq!(keys(&view), vec![1]);
        assert!(view.group(&0).is_none());
        assert_eq!(*counts.borrow(), vec![1]);

        source.push(8);
        assert_eq!(keys(&view), vec![1, 0]);
        assert_eq!(*counts.borrow(), vec![1, 2]);
    }

    #[test]
    fn test_remove_block_with_several_members_of_one_group() {
        let source = ObservableVec::new((0..10).collect());
        let view = GroupedList::new(source.as_list(), |x: &i32| x % 2);
        let even = view.group(&0).unwrap();
        let (events, _sub) = record(&even);

        source.remove_range(0, 4).unwrap();
        assert_eq!(even.to_vec(), vec![4, 6, 8]);
        assert_eq!(view.group(&1).unwrap().to_vec(), vec![5, 7, 9]);
        assert_eq!(*events.borrow(), vec![ChangeEvent::remove(0, vec![0, 2])]);

        source.remove_range(1, 3).unwrap();
        assert_eq!(source.items(), vec![4, 8, 9]);
        assert_eq!(even.to_vec(), vec![4, 8]);
        assert_eq!(view.group(&1).unwrap().to_vec(), vec![9]);
    }

    #[test]
    fn test_explicit_groups_without_implicit() {
        let source = ObservableVec::new((0..20).collect());
        let view = GroupedList::builder(source.as_list(), |x: &i32| x % 2)
            .explicit_group(1)
            .include_implicit_groups(false)
            .build();
        assert_eq!(keys(&view), vec![1]);
        let odd: Vec<i32> = (0..20).filter(|x| x % 2 == 1).collect();
        assert_eq!(view.group(&1).unwrap().to_vec(), odd);

        view.set_include_implicit_groups(true);
        assert_eq!(keys(&view), vec![1, 0]);
        assert_eq!(view.group(&0).unwrap().len(), 10);

        view.set_include_implicit_groups(false);
        assert_eq!(keys(&view), vec![1]);
        source.push(100);
        assert_eq!(view.len(), 1);
    }

    #[test]
    fn test_explicit_group_survives_empty() {
        let source = ObservableVec::new(vec![1]);
        let view = GroupedList::builder(source.as_list(), |x: &i32| x % 2)
            .explicit_group(1)
            .build();
        source.remove_at(0).unwrap();
        assert_eq!(keys(&view), vec![1]);
        assert!(view.group(&1).unwrap().is_empty());
    }

    #[test]
    fn test_add_and_remove_explicit_group() {
        let source = ObservableVec::new(vec![1, 2, 3, 4]);
        let view = GroupedList::builder(source.as_list(), |x: &i32| x % 2)
            .include_implicit_groups(false)
            .build();
        assert!(view.is_empty());

        let even = view.add_explicit_group(0).unwrap();
        assert_eq!(even.to_vec(), vec![2, 4]);
        assert_eq!(
            view.add_explicit_group(0).unwrap_err(),
            Error::DuplicateGroup("0".into())
        );

        view.remove_explicit_group(&0).unwrap();
        assert!(view.is_empty());
        assert_eq!(
            view.remove_explicit_group(&0),
            Err(Error::GroupNotFound("0".into()))
        );
    }

    #[test]
    fn test_remove_explicit_group_demotes_when_implicit_enabled() {
        let source = ObservableVec::new(vec![1, 3]);
        let view = GroupedList::builder(source.as_list(), |x: &i32| x % 2)
            .explicit_group(1)
            .build();
        view.remove_explicit_group(&1).unwrap();
        let group = view.group(&1).unwrap();
        assert!(!group.is_explicit());
        source.clear();
        assert!(view.is_empty());
    }

    #[test]
    fn test_move_within_group() {
        let source = ObservableVec::new(vec![1, 2, 3, 4, 5]);
        let view = GroupedList::new(source.as_list(), |x: &i32| x % 2);
        let odd = view.group(&1).unwrap();
        let (events, _sub) = record(&odd);

        source.move_item(0, 4).unwrap();
        assert_eq!(odd.to_vec(), vec![3, 5, 1]);
        assert_eq!(*events.borrow(), vec![ChangeEvent::moved(0, 2, vec![1])]);

        // Moving an even item past odd ones leaves the odd group alone.
        source.move_item(0, 1).unwrap();
        assert_eq!(events.borrow().len(), 1);
        assert_eq!(view.group(&0).unwrap().to_vec(), vec![2, 4]);
    }

    #[test]
    fn test_replace_in_same_group() {
        let source = ObservableVec::new(vec![1, 2, 3]);
        let view = GroupedList::new(source.as_list(), |x: &i32| x % 2);
        let odd = view.group(&1).unwrap();
        let (events, _sub) = record(&odd);

        source.set(2, 7).unwrap();
        assert_eq!(odd.to_vec(), vec![1, 7]);
        assert_eq!(*events.borrow(), vec![ChangeEvent::replace(1, vec![3], vec![7])]);

        source.set(2, 8).unwrap();
        assert_eq!(odd.to_vec(), vec![1]);
        assert_eq!(view.group(&0).unwrap().to_vec(), vec![2, 8]);
    }

    #[test]
    fn test_dynamic_key_regroups() {
        let a = Property::new(0);
        let b = Property::new(0);
        let source = ObservableVec::new(vec![a.clone(), b.clone()]);
        let view = GroupedList::by_dynamic_key(source.as_list(), |p: &Property<i32>| p.clone());
        assert_eq!(view.len(), 1);

        a.set(1);
        assert_eq!(view.len(), 2);
        assert_eq!(view.group(&0).unwrap().len(), 1);
        assert!(view.group(&1).unwrap().get(0).unwrap().ptr_eq(&a));

        b.set(1);
        assert_eq!(view.len(), 1);
        assert_eq!(view.group(&1).unwrap().len(), 2);
        assert!(view.group(&0).is_none());
    }

    #[test]
    fn test_reset_keeps_explicit_groups() {
        let source = ObservableVec::new(vec![1, 2]);
        let view = GroupedList::builder(source.as_list(), |x: &i32| x % 2)
            .explicit_group(5)
            .build();
        assert_eq!(keys(&view), vec![5, 1, 0]);

        source.reset(vec![4]);
        assert_eq!(keys(&view), vec![5, 0]);
        assert_eq!(view.group(&0).unwrap().to_vec(), vec![4]);
    }
}
