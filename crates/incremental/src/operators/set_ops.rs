//! Distinct, union, intersection and difference.
//!
//! Each distinct value has a presence count per source. A value is shown
//! while its counts satisfy the operation; it enters the view when that
//! first holds and leaves when it stops holding. Shown values keep the
//! order in which they became visible. Moves never change visibility.

use crate::view::{contract_violation, observe, DerivedView, Upstream};
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::hash::Hash;
use hashbrown::HashMap;
use rivulet_core::{ChangeAction, ChangeEvent, Error, ReadList};
use rivulet_reactive::{
    ChangeListener, CountListener, EventHub, ListRef, ObservableList, Subscription,
};

const VIEW: &str = "SetOperationList";

/// Which set operation a [`SetOperationList`] maintains.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetOperation {
    /// Values of the first source, once each.
    Distinct,
    /// Values present in either source.
    Union,
    /// Values present in both sources.
    Intersect,
    /// Values present in the first source and absent from the second.
    Except,
}

impl SetOperation {
    fn admits(self, presence: &Presence) -> bool {
        let (a, b) = (presence.counts[0] > 0, presence.counts[1] > 0);
        match self {
            SetOperation::Distinct => a,
            SetOperation::Union => a || b,
            SetOperation::Intersect => a && b,
            SetOperation::Except => a && !b,
        }
    }
}

#[derive(Default, Debug)]
struct Presence {
    counts: [usize; 2],
    shown: bool,
}

struct SetState<T> {
    presence: HashMap<T, Presence>,
    visible: Vec<T>,
}

impl<T: Hash + Eq + Clone> SetState<T> {
    /// Brings `value`'s visibility in line with its counts.
    fn settle(&mut self, op: SetOperation, value: &T) -> Option<ChangeEvent<T>> {
        let presence = self.presence.get_mut(value)?;
        let wanted = op.admits(presence);
        let event = if wanted && !presence.shown {
            presence.shown = true;
            self.visible.push(value.clone());
            Some(ChangeEvent::add_one(self.visible.len() - 1, value.clone()))
        } else if !wanted && presence.shown {
            presence.shown = false;
            let pos = self.visible.iter().position(|v| v == value)?;
            let gone = self.visible.remove(pos);
            Some(ChangeEvent::remove_one(pos, gone))
        } else {
            None
        };
        if self
            .presence
            .get(value)
            .map_or(false, |p| p.counts == [0, 0] && !p.shown)
        {
            self.presence.remove(value);
        }
        event
    }
}

/// A live set operation over one or two sources.
pub struct SetOperationList<T> {
    op: SetOperation,
    sources: [Option<ListRef<T>>; 2],
    state: RefCell<SetState<T>>,
    hub: EventHub<T>,
    upstream: Upstream,
}

impl<T: Hash + Eq + Clone + 'static> SetOperationList<T> {
    /// Every value of `source`, once, in order of first appearance.
    pub fn distinct(source: ListRef<T>) -> Rc<Self> {
        Self::new(SetOperation::Distinct, source, None)
    }

    pub fn union(first: ListRef<T>, second: ListRef<T>) -> Rc<Self> {
        Self::new(SetOperation::Union, first, Some(second))
    }

    pub fn intersect(first: ListRef<T>, second: ListRef<T>) -> Rc<Self> {
        Self::new(SetOperation::Intersect, first, Some(second))
    }

    pub fn except(first: ListRef<T>, second: ListRef<T>) -> Rc<Self> {
        Self::new(SetOperation::Except, first, Some(second))
    }

    /// Creates the view; a missing second source counts as empty.
    pub fn new(op: SetOperation, first: ListRef<T>, second: Option<ListRef<T>>) -> Rc<Self> {
        let view = Rc::new(Self {
            op,
            sources: [Some(first.clone()), second.clone()],
            state: RefCell::new(SetState {
                presence: HashMap::new(),
                visible: Vec::new(),
            }),
            hub: EventHub::new(),
            upstream: Upstream::new(),
        });
        {
            let mut state = view.state.borrow_mut();
            for side in 0..2 {
                let Some(list) = &view.sources[side] else {
                    continue;
                };
                for value in list.to_vec() {
                    state.presence.entry(value).or_default().counts[side] += 1;
                }
            }
            let order: Vec<T> = view.ordered_values();
            for value in order {
                state.settle(op, &value);
            }
        }
        view.upstream
            .hold(observe(&first, &view, |view: &Self, event| view.on_side_change(0, event)));
        if let Some(second) = second {
            view.upstream
                .hold(observe(&second, &view, |view: &Self, event| view.on_side_change(1, event)));
        }
        view
    }

    pub fn operation(&self) -> SetOperation {
        self.op
    }

    /// Values of both sources in source order, first source first.
    fn ordered_values(&self) -> Vec<T> {
        self.sources
            .iter()
            .flatten()
            .flat_map(|list| list.to_vec())
            .collect()
    }

    fn count(&self, side: usize, values: &[T], add: bool) {
        for value in values {
            let event = {
                let mut state = self.state.borrow_mut();
                let presence = state.presence.entry(value.clone()).or_default();
                if add {
                    presence.counts[side] += 1;
                } else if presence.counts[side] == 0 {
                    drop(state);
                    contract_violation(
                        VIEW,
                        Error::malformed(ChangeAction::Remove, "value was never added"),
                    );
                } else {
                    presence.counts[side] -= 1;
                }
                state.settle(self.op, value)
            };
            self.emit(event);
        }
    }

    fn emit(&self, event: Option<ChangeEvent<T>>) {
        if let Some(event) = event {
            let new_len = self.len();
            let old_len = match event {
                ChangeEvent::Add { .. } => new_len - 1,
                _ => new_len + 1,
            };
            self.hub.emit(&event, old_len, new_len);
        }
    }

    fn on_side_change(&self, side: usize, event: &ChangeEvent<T>) {
        match event {
            ChangeEvent::Add { items, .. } => self.count(side, items, true),
            ChangeEvent::Remove { items, .. } => self.count(side, items, false),
            ChangeEvent::Replace {
                old_items,
                new_items,
                ..
            } => {
                self.count(side, old_items, false);
                self.count(side, new_items, true);
            }
            ChangeEvent::Move { .. } => {}
            ChangeEvent::Reset => self.recount(side),
        }
    }

    /// Recounts one side from scratch and publishes every visibility change.
    fn recount(&self, side: usize) {
        let Some(list) = &self.sources[side] else {
            return;
        };
        let values = list.to_vec();
        let shown: Vec<T> = {
            let mut state = self.state.borrow_mut();
            for presence in state.presence.values_mut() {
                presence.counts[side] = 0;
            }
            for value in &values {
                state.presence.entry(value.clone()).or_default().counts[side] += 1;
            }
            state.visible.clone()
        };
        tracing::debug!(
            target: "rivulet_incremental::set_ops",
            side,
            values = values.len(),
            "side recounted"
        );
        for value in shown.iter().chain(self.ordered_values().iter()) {
            let event = self.state.borrow_mut().settle(self.op, value);
            self.emit(event);
        }
        self.state
            .borrow_mut()
            .presence
            .retain(|_, p| p.shown || p.counts != [0, 0]);
    }
}

impl<T: Hash + Eq + Clone + 'static> DerivedView for SetOperationList<T> {
    fn dispose(&self) {
        if self.upstream.dispose() {
            tracing::debug!(target: "rivulet_incremental::set_ops", op = ?self.op, "set view disposed");
        }
    }

    fn is_disposed(&self) -> bool {
        self.upstream.is_disposed()
    }
}

impl<T: Clone> ReadList<T> for SetOperationList<T> {
    fn len(&self) -> usize {
        self.state.borrow().visible.len()
    }

    fn get(&self, index: usize) -> Option<T> {
        self.state.borrow().visible.as_slice().get(index).cloned()
    }

    fn to_vec(&self) -> Vec<T> {
        self.state.borrow().visible.clone()
    }
}

impl<T: Hash + Eq + Clone + 'static> ObservableList<T> for SetOperationList<T> {
    fn subscribe(&self, listener: ChangeListener<T>) -> Subscription {
        self.hub.subscribe(listener)
    }

    fn subscribe_count(&self, listener: CountListener) -> Subscription {
        self.hub.subscribe_count(listener)
    }
}
