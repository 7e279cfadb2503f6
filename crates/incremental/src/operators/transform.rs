//! One-to-one projections.
//!
//! `TransformedList` maps every source item once through a plain selector
//! and mirrors source events through `apply_change`. `DynamicTransformedList`
//! maps each item to an observable value and surfaces later changes of that
//! value as a Replace at the item's position.

use crate::container::{ContainerList, ItemContainer};
use crate::view::{contract_violation, observe, out_of_range, DerivedView, Upstream};
use alloc::boxed::Box;
use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::RefCell;
use rivulet_core::{apply_change, ChangeEvent, ReadList};
use rivulet_reactive::{
    ChangeListener, CountListener, EventHub, ListRef, ObservableList, Property, Subscription,
};

type Selector<T, U> = Rc<dyn Fn(&T) -> U>;
type Evict<U> = Box<dyn Fn(&U)>;

/// A live projection of every source item through a selector.
pub struct TransformedList<T, U> {
    source: ListRef<T>,
    selector: Selector<T, U>,
    on_evict: Option<Evict<U>>,
    items: RefCell<Vec<U>>,
    hub: EventHub<U>,
    upstream: Upstream,
}

/// Configures a [`TransformedList`].
pub struct TransformedListBuilder<T, U> {
    source: ListRef<T>,
    selector: Selector<T, U>,
    on_evict: Option<Evict<U>>,
}

impl<T: 'static, U: Clone + 'static> TransformedListBuilder<T, U> {
    pub fn new<F>(source: ListRef<T>, selector: F) -> Self
    where
        F: Fn(&T) -> U + 'static,
    {
        Self {
            source,
            selector: Rc::new(selector),
            on_evict: None,
        }
    }

    /// Called for every value that permanently leaves the view: removed,
    /// replaced, or discarded by a Reset.
    pub fn on_evict<F>(mut self, f: F) -> Self
    where
        F: Fn(&U) + 'static,
    {
        self.on_evict = Some(Box::new(f));
        self
    }

    pub fn build(self) -> Rc<TransformedList<T, U>> {
        let items: Vec<U> = self.source.to_vec().iter().map(|item| (self.selector)(item)).collect();
        let view = Rc::new(TransformedList {
            source: self.source.clone(),
            selector: self.selector,
            on_evict: self.on_evict,
            items: RefCell::new(items),
            hub: EventHub::new(),
            upstream: Upstream::new(),
        });
        view.upstream.hold(observe(&self.source, &view, |view: &TransformedList<T, U>, event| {
            view.on_source_change(event)
        }));
        view
    }
}

impl<T: 'static, U: Clone + 'static> TransformedList<T, U> {
    /// Creates a projection without an eviction callback.
    pub fn new<F>(source: ListRef<T>, selector: F) -> Rc<Self>
    where
        F: Fn(&T) -> U + 'static,
    {
        TransformedListBuilder::new(source, selector).build()
    }

    pub fn builder<F>(source: ListRef<T>, selector: F) -> TransformedListBuilder<T, U>
    where
        F: Fn(&T) -> U + 'static,
    {
        TransformedListBuilder::new(source, selector)
    }

    fn on_source_change(&self, event: &ChangeEvent<T>) {
        let old_len = self.len();
        let applied = {
            let mut items = self.items.borrow_mut();
            let selector = &self.selector;
            let result = apply_change(
                &mut *items,
                &*self.source,
                event,
                |item| selector(item),
                |value| {
                    if let Some(evict) = &self.on_evict {
                        evict(value);
                    }
                },
            );
            match result {
                Ok(applied) => applied,
                Err(err) => contract_violation("TransformedList", err),
            }
        };
        let new_len = self.len();
        if applied.is_reset() {
            tracing::debug!(target: "rivulet_incremental::transform", old_len, new_len, "projection rebuilt");
        }
        self.hub.emit(&applied, old_len, new_len);
    }
}

impl<T: 'static, U: Clone + 'static> DerivedView for TransformedList<T, U> {
    fn dispose(&self) {
        if self.upstream.dispose() {
            tracing::debug!(target: "rivulet_incremental::transform", "projection disposed");
        }
    }

    fn is_disposed(&self) -> bool {
        self.upstream.is_disposed()
    }
}

impl<T, U: Clone> ReadList<U> for TransformedList<T, U> {
    fn len(&self) -> usize {
        self.items.borrow().len()
    }

    fn get(&self, index: usize) -> Option<U> {
        self.items.borrow().as_slice().get(index).cloned()
    }

    fn to_vec(&self) -> Vec<U> {
        self.items.borrow().clone()
    }
}

impl<T: 'static, U: Clone + 'static> ObservableList<U> for TransformedList<T, U> {
    fn subscribe(&self, listener: ChangeListener<U>) -> Subscription {
        self.hub.subscribe(listener)
    }

    fn subscribe_count(&self, listener: CountListener) -> Subscription {
        self.hub.subscribe_count(listener)
    }
}

const DYNAMIC_VIEW: &str = "DynamicTransformedList";

struct MappedSlot<R> {
    value: R,
    watch: Option<Subscription>,
}

type Mapped<T, R> = Rc<ItemContainer<T, MappedSlot<R>>>;

/// A projection whose per-item value is itself observable.
///
/// Setting the property an item was mapped to replaces that item's value in
/// place, with no source mutation involved.
pub struct DynamicTransformedList<T, R> {
    this: Weak<Self>,
    source: ListRef<T>,
    selector: Selector<T, Property<R>>,
    entries: RefCell<ContainerList<T, MappedSlot<R>>>,
    hub: EventHub<R>,
    upstream: Upstream,
}

impl<T: Clone + 'static, R: Clone + 'static> DynamicTransformedList<T, R> {
    pub fn new<F>(source: ListRef<T>, selector: F) -> Rc<Self>
    where
        F: Fn(&T) -> Property<R> + 'static,
    {
        let view = Rc::new_cyclic(|this| Self {
            this: this.clone(),
            source: source.clone(),
            selector: Rc::new(selector),
            entries: RefCell::new(ContainerList::new()),
            hub: EventHub::new(),
            upstream: Upstream::new(),
        });
        view.rebuild();
        view.upstream
            .hold(observe(&source, &view, |view: &Self, event| view.on_source_change(event)));
        view
    }

    fn wrap(&self, item: T, index: usize) -> Mapped<T, R> {
        let property = (self.selector)(&item);
        let container = ItemContainer::new(
            item,
            index,
            MappedSlot {
                value: property.get(),
                watch: None,
            },
        );
        let view = self.this.clone();
        let weak = Rc::downgrade(&container);
        let watch = property.subscribe(move |value: &R| {
            if let (Some(view), Some(container)) = (view.upgrade(), weak.upgrade()) {
                view.on_value_changed(&container, value.clone());
            }
        });
        container.state_mut().watch = Some(watch);
        container
    }

    fn values(block: &[Mapped<T, R>]) -> Vec<R> {
        block.iter().map(|c| c.state().value.clone()).collect()
    }

    fn release(block: &[Mapped<T, R>]) {
        for container in block {
            container.state_mut().watch = None;
        }
    }

    fn rebuild(&self) {
        let items = self.source.to_vec();
        let mut entries = self.entries.borrow_mut();
        Self::release(&entries.clear());
        for (index, item) in items.into_iter().enumerate() {
            let container = self.wrap(item, index);
            entries.push(container);
        }
    }

    fn on_source_change(&self, event: &ChangeEvent<T>) {
        let old_len = self.len();
        let applied = {
            let mut entries = self.entries.borrow_mut();
            let len = entries.len();
            match event {
                ChangeEvent::Add { index, items } => {
                    if *index > len {
                        out_of_range(DYNAMIC_VIEW, *index, 0, len);
                    }
                    let block: Vec<_> = items
                        .iter()
                        .enumerate()
                        .map(|(offset, item)| self.wrap(item.clone(), index + offset))
                        .collect();
                    let values = Self::values(&block);
                    entries.insert_block(*index, block);
                    ChangeEvent::add(*index, values)
                }
                ChangeEvent::Remove { index, items } => {
                    if index + items.len() > len {
                        out_of_range(DYNAMIC_VIEW, *index, items.len(), len);
                    }
                    let removed = entries.remove_block(*index, items.len());
                    Self::release(&removed);
                    ChangeEvent::remove(*index, Self::values(&removed))
                }
                ChangeEvent::Replace {
                    index,
                    old_items,
                    new_items,
                } => {
                    if index + old_items.len() > len {
                        out_of_range(DYNAMIC_VIEW, *index, old_items.len(), len);
                    }
                    let removed = entries.remove_block(*index, old_items.len());
                    Self::release(&removed);
                    let block: Vec<_> = new_items
                        .iter()
                        .enumerate()
                        .map(|(offset, item)| self.wrap(item.clone(), index + offset))
                        .collect();
                    let values = Self::values(&block);
                    entries.insert_block(*index, block);
                    ChangeEvent::replace(*index, Self::values(&removed), values)
                }
                ChangeEvent::Move {
                    old_index,
                    new_index,
                    items,
                } => {
                    let count = items.len();
                    if old_index + count > len || new_index + count > len {
                        out_of_range(DYNAMIC_VIEW, core::cmp::max(*old_index, *new_index), count, len);
                    }
                    let values = Self::values(&entries.as_slice()[*old_index..old_index + count]);
                    entries.move_block(*old_index, *new_index, count);
                    ChangeEvent::moved(*old_index, *new_index, values)
                }
                ChangeEvent::Reset => {
                    drop(entries);
                    self.rebuild();
                    ChangeEvent::Reset
                }
            }
        };
        let new_len = self.len();
        if applied.is_reset() {
            tracing::debug!(target: "rivulet_incremental::transform", old_len, new_len, "dynamic projection rebuilt");
        }
        self.hub.emit(&applied, old_len, new_len);
    }

    fn on_value_changed(&self, container: &Mapped<T, R>, value: R) {
        let event = {
            let entries = self.entries.borrow();
            let index = container.source_index();
            let current = entries.get(index).map_or(false, |c| Rc::ptr_eq(c, container));
            if !current {
                return;
            }
            let old = core::mem::replace(&mut container.state_mut().value, value.clone());
            ChangeEvent::replace(index, alloc::vec![old], alloc::vec![value])
        };
        let len = self.len();
        self.hub.emit(&event, len, len);
    }
}

impl<T: Clone + 'static, R: Clone + 'static> DerivedView for DynamicTransformedList<T, R> {
    fn dispose(&self) {
        if self.upstream.dispose() {
            Self::release(self.entries.borrow().as_slice());
            tracing::debug!(target: "rivulet_incremental::transform", "dynamic projection disposed");
        }
    }

    fn is_disposed(&self) -> bool {
        self.upstream.is_disposed()
    }
}

impl<T: 'static, R: Clone + 'static> ReadList<R> for DynamicTransformedList<T, R> {
    fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    fn get(&self, index: usize) -> Option<R> {
        self.entries
            .borrow()
            .as_slice()
            .get(index)
            .map(|c| c.state().value.clone())
    }
}

impl<T: Clone + 'static, R: Clone + 'static> ObservableList<R> for DynamicTransformedList<T, R> {
    fn subscribe(&self, listener: ChangeListener<R>) -> Subscription {
        self.hub.subscribe(listener)
    }

    fn subscribe_count(&self, listener: CountListener) -> Subscription {
        self.hub.subscribe_count(listener)
    }
}
