//! Positional pairing of two sources.

use crate::view::{contract_violation, observe, DerivedView, Upstream};
use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::RefCell;
use rivulet_core::{apply_change, ChangeEvent, ReadList};
use rivulet_reactive::{
    ChangeListener, CountListener, EventHub, ListRef, ObservableList, Property, Subscription,
};

const VIEW: &str = "ZippedList";

enum Combinator<A, B, R> {
    Static(Rc<dyn Fn(&A, &B) -> R>),
    Dynamic(Rc<dyn Fn(&A, &B) -> Property<R>>),
}

struct Zipped<R> {
    id: u64,
    value: R,
    _watch: Option<Subscription>,
}

struct ZipState<A, B, R> {
    left: Vec<A>,
    right: Vec<B>,
    pairs: Vec<Zipped<R>>,
    next_id: u64,
}

/// Pairs `first[i]` with `second[i]` for every `i` below the shorter length.
pub struct ZippedList<A, B, R> {
    this: Weak<Self>,
    first: ListRef<A>,
    second: ListRef<B>,
    combine: Combinator<A, B, R>,
    state: RefCell<ZipState<A, B, R>>,
    hub: EventHub<R>,
    upstream: Upstream,
}

impl<A, B, R> ZippedList<A, B, R>
where
    A: Clone + 'static,
    B: Clone + 'static,
    R: Clone + 'static,
{
    pub fn new<F>(first: ListRef<A>, second: ListRef<B>, combine: F) -> Rc<Self>
    where
        F: Fn(&A, &B) -> R + 'static,
    {
        Self::build(first, second, Combinator::Static(Rc::new(combine)))
    }

    /// Zips with a combinator whose results can change on their own.
    pub fn dynamic<F>(first: ListRef<A>, second: ListRef<B>, combine: F) -> Rc<Self>
    where
        F: Fn(&A, &B) -> Property<R> + 'static,
    {
        Self::build(first, second, Combinator::Dynamic(Rc::new(combine)))
    }

    fn build(first: ListRef<A>, second: ListRef<B>, combine: Combinator<A, B, R>) -> Rc<Self> {
        let view = Rc::new_cyclic(|this| Self {
            this: this.clone(),
            first: first.clone(),
            second: second.clone(),
            combine,
            state: RefCell::new(ZipState {
                left: first.to_vec(),
                right: second.to_vec(),
                pairs: Vec::new(),
                next_id: 0,
            }),
            hub: EventHub::new(),
            upstream: Upstream::new(),
        });
        {
            let mut state = view.state.borrow_mut();
            let len = state.left.len().min(state.right.len());
            let fresh = view.pair_range(&mut state, 0, len);
            state.pairs = fresh;
        }
        view.upstream
            .hold(observe(&first, &view, |view: &Self, event| view.on_first_change(event)));
        view.upstream
            .hold(observe(&second, &view, |view: &Self, event| view.on_second_change(event)));
        view
    }

    fn pair_range(&self, state: &mut ZipState<A, B, R>, start: usize, end: usize) -> Vec<Zipped<R>> {
        let mut fresh = Vec::with_capacity(end.saturating_sub(start));
        for index in start..end {
            state.next_id += 1;
            let id = state.next_id;
            let (a, b) = (&state.left[index], &state.right[index]);
            let zipped = match &self.combine {
                Combinator::Static(f) => Zipped {
                    id,
                    value: f(a, b),
                    _watch: None,
                },
                Combinator::Dynamic(f) => {
                    let property = f(a, b);
                    let view = self.this.clone();
                    let watch = property.subscribe(move |value: &R| {
                        if let Some(view) = view.upgrade() {
                            view.on_result_changed(id, value.clone());
                        }
                    });
                    Zipped {
                        id,
                        value: property.get(),
                        _watch: Some(watch),
                    }
                }
            };
            fresh.push(zipped);
        }
        fresh
    }

    fn on_first_change(&self, event: &ChangeEvent<A>) {
        let applied = {
            let mut state = self.state.borrow_mut();
            apply_change(&mut state.left, &*self.first, event, A::clone, |_| {})
        };
        if let Err(err) = applied {
            contract_violation(VIEW, err);
        }
        self.repair(event.first_affected(), bounded_end(event));
    }

    fn on_second_change(&self, event: &ChangeEvent<B>) {
        let applied = {
            let mut state = self.state.borrow_mut();
            apply_change(&mut state.right, &*self.second, event, B::clone, |_| {})
        };
        if let Err(err) = applied {
            contract_violation(VIEW, err);
        }
        self.repair(event.first_affected(), bounded_end(event));
    }

    /// Re-pairs from `start` (to `end` when the change kept both lengths),
    /// emitting a Replace for the overlapping block and an Add or Remove
    /// for the tail. `None` means the side was reset.
    fn repair(&self, start: Option<usize>, end: Option<usize>) {
        let Some(start) = start else {
            let old_len = self.len();
            {
                let mut state = self.state.borrow_mut();
                let len = state.left.len().min(state.right.len());
                let fresh = self.pair_range(&mut state, 0, len);
                state.pairs = fresh;
            }
            let new_len = self.len();
            tracing::debug!(target: "rivulet_incremental::zip", old_len, new_len, "zip rebuilt");
            self.hub.emit(&ChangeEvent::Reset, old_len, new_len);
            return;
        };
        let (old_len, events) = {
            let mut state = self.state.borrow_mut();
            let old_len = state.pairs.len();
            let new_len = state.left.len().min(state.right.len());
            if start >= old_len.max(new_len) {
                return;
            }
            let stop = match end {
                Some(end) if old_len == new_len => end.min(new_len),
                _ => new_len,
            };
            let stop = stop.max(start);
            let fresh = self.pair_range(&mut state, start, stop);
            let old_stop = if stop == new_len { old_len } else { stop };
            let stale: Vec<Zipped<R>> = state.pairs.splice(start..old_stop, fresh).collect();

            let common = (stop - start).min(stale.len());
            let mut events = Vec::with_capacity(2);
            let values = |from: &[Zipped<R>]| from.iter().map(|z| z.value.clone()).collect::<Vec<_>>();
            if common > 0 {
                events.push(ChangeEvent::replace(
                    start,
                    values(&stale[..common]),
                    values(&state.pairs[start..start + common]),
                ));
            }
            if stale.len() > common {
                events.push(ChangeEvent::remove(start + common, values(&stale[common..])));
            } else if stop - start > common {
                events.push(ChangeEvent::add(
                    start + common,
                    values(&state.pairs[start + common..stop]),
                ));
            }
            (old_len, events)
        };
        let mut len = old_len;
        for event in events {
            let next = match &event {
                ChangeEvent::Add { items, .. } => len + items.len(),
                ChangeEvent::Remove { items, .. } => len - items.len(),
                _ => len,
            };
            self.hub.emit(&event, len, next);
            len = next;
        }
    }

    fn on_result_changed(&self, id: u64, value: R) {
        let event = {
            let mut state = self.state.borrow_mut();
            let Some(pos) = state.pairs.iter().position(|z| z.id == id) else {
                return;
            };
            let old = core::mem::replace(&mut state.pairs[pos].value, value.clone());
            ChangeEvent::replace(pos, alloc::vec![old], alloc::vec![value])
        };
        let len = self.len();
        self.hub.emit(&event, len, len);
    }
}

/// End of the touched span for events that keep the source length.
fn bounded_end<T>(event: &ChangeEvent<T>) -> Option<usize> {
    match event {
        ChangeEvent::Replace {
            index,
            old_items,
            new_items,
        } if old_items.len() == new_items.len() => Some(index + new_items.len()),
        ChangeEvent::Move {
            old_index,
            new_index,
            items,
        } => Some(core::cmp::max(*old_index, *new_index) + items.len()),
        _ => None,
    }
}

impl<A, B, R> DerivedView for ZippedList<A, B, R>
where
    A: Clone + 'static,
    B: Clone + 'static,
    R: Clone + 'static,
{
    fn dispose(&self) {
        if self.upstream.dispose() {
            for pair in self.state.borrow_mut().pairs.iter_mut() {
                pair._watch = None;
            }
            tracing::debug!(target: "rivulet_incremental::zip", "zip disposed");
        }
    }

    fn is_disposed(&self) -> bool {
        self.upstream.is_disposed()
    }
}

impl<A, B, R: Clone> ReadList<R> for ZippedList<A, B, R> {
    fn len(&self) -> usize {
        self.state.borrow().pairs.len()
    }

    fn get(&self, index: usize) -> Option<R> {
        self.state.borrow().pairs.as_slice().get(index).map(|z| z.value.clone())
    }

    fn to_vec(&self) -> Vec<R> {
        self.state.borrow().pairs.iter().map(|z| z.value.clone()).collect()
    }
}

impl<A: 'static, B: 'static, R: Clone + 'static> ObservableList<R> for ZippedList<A, B, R> {
    fn subscribe(&self, listener: ChangeListener<R>) -> Subscription {
        self.hub.subscribe(listener)
    }

    fn subscribe_count(&self, listener: CountListener) -> Subscription {
        self.hub.subscribe_count(listener)
    }
}
