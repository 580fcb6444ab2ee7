//! Observable Collection
//!
//! [`ObservableVec`] owns an ordered sequence and routes every structural
//! mutation through change capture: one [`MutationRecord`] per logical
//! operation, a will-change notification before the write and a did-change
//! notification after it. While a batch is open the records are buffered and
//! observers hear a single projected change set when the outermost batch
//! closes.
//!
//! # Handles
//!
//! `ObservableVec` is a handle: clones share the same contents, observers and
//! batch state, the same way a signal's clones share one value. Identity, not
//! contents, decides which target an observer is attached to.
//!
//! # Reentrancy
//!
//! No borrow of the contents is held while callbacks run, so an observer may
//! read the collection from inside a notification. Mutations made there are
//! queued, not applied: every observer of the current notification sees the
//! contents its record describes. Once delivery finishes the queued
//! mutations run in the order they were made, each with its own will-change
//! and did-change. While a batch is open they join the batch instead.
//!
//! Queued mutators return before anything changed, so the ones that hand
//! back elements (`pop`, `remove`, `remove_at_indexes`, `replace`) refuse
//! with [`Error::ReentrantMutation`] during delivery. Use `discard`,
//! `discard_at_indexes` or `set` there.
//!
//! # Example
//!
//! ```rust,ignore
//! let items = ObservableVec::from_vec(vec!["a", "b"]);
//! items.add_observer(&view_adapter);
//!
//! items.batch_updates(|items| {
//!     items.remove(0)?;
//!     items.push("c")
//! })??;
//! ```

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::ops::Range;
use std::rc::Rc;

use super::batch::{BatchState, BatchWindow, CloseOutcome};
use super::projection::{project, CapturedMutation};
use super::record::{IndexSet, Move, MutationKind, MutationRecord};
use crate::error::{merge, CallbackError, CallbackFailure, CallbackResult, Error, Result};
use crate::observe::{notify, Dispatcher, ObjectKey, ObserverKey, ObserverRef, SubscriptionTable, TargetId, UpdateSource};

/// Sentinel key: "any index in the collection".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct AnyIndex;

/// Notification delivered to collection observers.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionEvent<T> {
    /// A mutation is about to be applied. Not sent while batching.
    WillChange(MutationRecord),
    /// A mutation was applied. `removed` holds the elements that left for
    /// remove records (and the old contents for unknown records).
    DidChange { record: MutationRecord, removed: Vec<T> },
    /// The outermost batch opened.
    WillBeginBatchUpdates,
    /// The outermost batch closed, after its coalesced records were sent.
    DidEndBatchUpdates { forced: bool },
}

impl<T> CollectionEvent<T> {
    fn name(&self) -> &'static str {
        match self {
            CollectionEvent::WillChange(_) => "will_change",
            CollectionEvent::DidChange { .. } => "did_change",
            CollectionEvent::WillBeginBatchUpdates => "will_begin_batch_updates",
            CollectionEvent::DidEndBatchUpdates { .. } => "did_end_batch_updates",
        }
    }

    fn record(&self) -> Option<&MutationRecord> {
        match self {
            CollectionEvent::WillChange(record) | CollectionEvent::DidChange { record, .. } => Some(record),
            CollectionEvent::WillBeginBatchUpdates | CollectionEvent::DidEndBatchUpdates { .. } => None,
        }
    }
}

/// Observer protocol for ordered collections.
///
/// One callback covers every change kind; relocations get their own
/// callback so they are never mistaken for a remove plus an insert.
pub trait CollectionObserver<T> {
    fn did_change(&self, items: &ObservableVec<T>, record: &MutationRecord, removed: &[T]) -> CallbackResult;

    fn did_move(&self, _items: &ObservableVec<T>, _from: usize, _to: usize) -> CallbackResult {
        Ok(())
    }

    fn will_change(&self, _items: &ObservableVec<T>, _record: &MutationRecord) -> CallbackResult {
        Ok(())
    }

    fn will_begin_batch_updates(&self, _items: &ObservableVec<T>) -> CallbackResult {
        Ok(())
    }

    fn did_end_batch_updates(&self, _items: &ObservableVec<T>, _forced: bool) -> CallbackResult {
        Ok(())
    }
}

fn route<T, O: CollectionObserver<T>>(
    observer: &O,
    items: &ObservableVec<T>,
    event: &CollectionEvent<T>,
) -> CallbackResult {
    match event {
        CollectionEvent::WillChange(record) => observer.will_change(items, record),
        CollectionEvent::DidChange { record, removed } => match record.move_indices() {
            Some(Move { from, to }) => observer.did_move(items, from, to),
            None => observer.did_change(items, record, removed),
        },
        CollectionEvent::WillBeginBatchUpdates => observer.will_begin_batch_updates(items),
        CollectionEvent::DidEndBatchUpdates { forced } => observer.did_end_batch_updates(items, *forced),
    }
}

type CollectionCallback<T> = dyn Fn(&dyn Any, &ObservableVec<T>, &CollectionEvent<T>) -> CallbackResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attachment {
    Attach,
    Detach,
}

type ElementHook<T> = dyn Fn(&ObservableVec<T>, &T, Attachment);

/// A mutation made from inside a callback, replayed once delivery finishes.
type Queued<T> = Box<dyn FnOnce(&ObservableVec<T>) -> Result<()>>;

struct VecInner<T> {
    items: RefCell<Vec<T>>,
    table: SubscriptionTable<AnyIndex, CollectionCallback<T>>,
    batch: RefCell<BatchWindow<T>>,
    /// Each emission is a run of events delivered inside one frame.
    dispatcher: Dispatcher<Vec<CollectionEvent<T>>>,
    queued: RefCell<VecDeque<Queued<T>>>,
    draining: Cell<bool>,
    element_hook: RefCell<Option<Rc<ElementHook<T>>>>,
}

/// An ordered collection that reports its structural changes.
pub struct ObservableVec<T> {
    inner: Rc<VecInner<T>>,
}

impl<T> Clone for ObservableVec<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> ObservableVec<T> {
    /// Identity of this collection.
    pub fn id(&self) -> TargetId {
        self.inner.dispatcher.target()
    }

    pub fn len(&self) -> usize {
        self.inner.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `f` over the current contents.
    ///
    /// The contents are borrowed for the duration; mutating the collection
    /// from inside `f` panics.
    pub fn with_items<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        f(&self.inner.items.borrow())
    }

    /// Whether a batch is open.
    pub fn is_batching(&self) -> bool {
        self.inner.batch.borrow().is_open()
    }

    /// Current batch nesting depth.
    pub fn batch_depth(&self) -> usize {
        self.inner.batch.borrow().depth()
    }

    pub fn batch_state(&self) -> BatchState {
        self.inner.batch.borrow().state()
    }

    /// Mutations made from callbacks and still waiting to run.
    pub fn queued_mutations(&self) -> usize {
        self.inner.queued.borrow().len()
    }

    /// Live observers.
    pub fn observer_count(&self) -> usize {
        self.inner.table.count(&AnyIndex)
    }

    /// Whether `observer` is subscribed.
    pub fn has_observer<O: ?Sized>(&self, observer: &Rc<O>) -> bool {
        self.inner.table.contains(ObserverKey::of(observer), &AnyIndex)
    }

    /// Unsubscribe `observer`. Returns `false` if it was not subscribed.
    pub fn remove_observer<O: ?Sized>(&self, observer: &Rc<O>) -> bool {
        self.inner.table.unsubscribe(ObserverKey::of(observer), None) > 0
    }

    /// Handle that can read and observe but not mutate.
    pub fn read_only(&self) -> ReadOnlyVec<T> {
        ReadOnlyVec { items: self.clone() }
    }

    /// Whether a mutation made now has to wait for the current delivery.
    fn defers_mutations(&self) -> bool {
        self.inner.dispatcher.is_dispatching() && !self.is_batching()
    }

    fn refuse_reentrant(&self, operation: &'static str) -> Result<()> {
        if self.defers_mutations() {
            return Err(Error::ReentrantMutation { operation });
        }
        Ok(())
    }

    fn defer(&self, operation: &'static str, run: impl FnOnce(&Self) -> Result<()> + 'static) -> Result<()> {
        tracing::trace!(target = %self.id(), operation, "queued nested mutation");
        self.inner.queued.borrow_mut().push_back(Box::new(run));
        Ok(())
    }

    /// Run the queued mutations in order. Only callback failures are
    /// reported; a queued mutation that no longer fits is dropped.
    fn drain_queued(&self) -> Result<()> {
        if self.inner.dispatcher.is_dispatching() || self.inner.draining.replace(true) {
            return Ok(());
        }

        let mut result = Ok(());
        loop {
            let next = self.inner.queued.borrow_mut().pop_front();
            let Some(run) = next else {
                break;
            };
            match run(self) {
                Ok(()) => {}
                Err(Error::CallbackFailures(failures)) => {
                    result = merge(result, Err(Error::CallbackFailures(failures)));
                }
                Err(error) => {
                    tracing::warn!(target = %self.id(), %error, "queued mutation no longer applies; dropped");
                }
            }
        }
        self.inner.draining.set(false);
        result
    }
}

impl<T: Clone + PartialEq + 'static> ObservableVec<T> {
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    pub fn from_vec(items: Vec<T>) -> Self {
        Self {
            inner: Rc::new(VecInner {
                items: RefCell::new(items),
                table: SubscriptionTable::new(),
                batch: RefCell::new(BatchWindow::new()),
                dispatcher: Dispatcher::new(TargetId::new()),
                queued: RefCell::new(VecDeque::new()),
                draining: Cell::new(false),
                element_hook: RefCell::new(None),
            }),
        }
    }

    // =========================================================================
    // READ
    // =========================================================================

    pub fn get(&self, index: usize) -> Option<T> {
        self.inner.items.borrow().get(index).cloned()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.inner.items.borrow().clone()
    }

    pub fn index_of(&self, element: &T) -> Option<usize> {
        self.inner.items.borrow().iter().position(|item| item == element)
    }

    pub fn contains(&self, element: &T) -> bool {
        self.index_of(element).is_some()
    }

    // =========================================================================
    // OBSERVE
    // =========================================================================

    /// Subscribe an observer implementing the collection protocol.
    ///
    /// The observer is held weakly. Adding it again replaces the earlier
    /// subscription.
    pub fn add_observer<O: CollectionObserver<T> + 'static>(&self, observer: &Rc<O>) {
        self.add_observer_fn(observer, route::<T, O>);
    }

    /// Subscribe `observer` with a plain callback over every event.
    pub fn add_observer_fn<O, F>(&self, observer: &Rc<O>, callback: F)
    where
        O: Any,
        F: Fn(&O, &ObservableVec<T>, &CollectionEvent<T>) -> CallbackResult + 'static,
    {
        let callback: Rc<CollectionCallback<T>> = Rc::new(
            move |observer: &dyn Any, items: &ObservableVec<T>, event: &CollectionEvent<T>| {
                match observer.downcast_ref::<O>() {
                    Some(observer) => callback(observer, items, event),
                    None => Ok(()),
                }
            },
        );
        self.inner.table.subscribe(ObserverRef::new(observer), AnyIndex, callback);
    }

    // =========================================================================
    // INSERT
    // =========================================================================

    /// Append `value`. From a callback, it lands at the end as it is once
    /// the earlier queued mutations have run.
    pub fn push(&self, value: T) -> Result<()> {
        if self.defers_mutations() {
            return self.defer("push", move |items| items.push(value));
        }
        let at = self.len();
        self.insert(at, value)
    }

    pub fn insert(&self, index: usize, value: T) -> Result<()> {
        self.insert_many(index, [value])
    }

    /// Insert `values` contiguously starting at `at`, as one record.
    pub fn insert_many(&self, at: usize, values: impl IntoIterator<Item = T>) -> Result<()> {
        check_insert_at(at, self.len())?;
        let values: Vec<T> = values.into_iter().collect();
        if values.is_empty() {
            return Ok(());
        }
        let indexes = IndexSet::from_range(at..at + values.len());
        self.insert_at_indexes(indexes, values)
    }

    /// Append `values` as one record.
    pub fn extend(&self, values: impl IntoIterator<Item = T>) -> Result<()> {
        let values: Vec<T> = values.into_iter().collect();
        if self.defers_mutations() {
            return self.defer("extend", move |items| items.extend(values));
        }
        let at = self.len();
        self.insert_many(at, values)
    }

    /// Insert `values` so that they end up at `indexes`, as one record.
    ///
    /// `indexes` refer to positions in the resulting collection.
    pub fn insert_at_indexes(&self, indexes: IndexSet, values: Vec<T>) -> Result<()> {
        if indexes.len() != values.len() {
            return Err(Error::LengthMismatch {
                indexes: indexes.len(),
                elements: values.len(),
            });
        }
        if indexes.is_empty() {
            return Ok(());
        }
        check_insert_indexes(&indexes, self.len())?;
        if self.defers_mutations() {
            return self.defer("insert", move |items| items.insert_at_indexes(indexes, values));
        }

        let positions = indexes.clone();
        self.perform(MutationRecord::insert(indexes), move |items| {
            for (index, value) in positions.iter().zip(values.iter().cloned()) {
                items.insert(index, value);
            }
            (values, Vec::new())
        })
        .map(drop)
    }

    // =========================================================================
    // REMOVE
    // =========================================================================

    /// Remove and return the last element, if any.
    pub fn pop(&self) -> Result<Option<T>> {
        self.refuse_reentrant("pop")?;
        match self.len() {
            0 => Ok(None),
            len => self.remove(len - 1).map(Some),
        }
    }

    pub fn remove(&self, index: usize) -> Result<T> {
        self.refuse_reentrant("remove")?;
        let mut removed = self.remove_at_indexes(IndexSet::single(index))?;
        // One index in, one element out.
        Ok(removed.remove(0))
    }

    /// Remove the elements at `indexes` as one record, returning them in
    /// ascending index order.
    pub fn remove_at_indexes(&self, indexes: IndexSet) -> Result<Vec<T>> {
        self.refuse_reentrant("remove_at_indexes")?;
        if indexes.is_empty() {
            return Ok(Vec::new());
        }
        check_existing(&indexes, self.len())?;
        self.take_at_indexes(indexes)
    }

    /// Remove the element at `index` without handing it back.
    pub fn discard(&self, index: usize) -> Result<()> {
        self.discard_at_indexes(IndexSet::single(index))
    }

    /// Remove the elements at `indexes` as one record without handing them
    /// back. Usable from callbacks.
    pub fn discard_at_indexes(&self, indexes: IndexSet) -> Result<()> {
        if indexes.is_empty() {
            return Ok(());
        }
        check_existing(&indexes, self.len())?;
        if self.defers_mutations() {
            return self.defer("discard", move |items| items.discard_at_indexes(indexes));
        }
        self.take_at_indexes(indexes).map(drop)
    }

    pub fn remove_range(&self, range: Range<usize>) -> Result<()> {
        let len = self.len();
        if range.start > range.end {
            return Err(Error::IndexOutOfBounds { index: range.start, len });
        }
        if range.end > len {
            return Err(Error::IndexOutOfBounds {
                index: range.end - 1,
                len,
            });
        }
        self.discard_at_indexes(IndexSet::from_range(range))
    }

    /// Remove everything as one record.
    pub fn clear(&self) -> Result<()> {
        if self.defers_mutations() {
            return self.defer("clear", |items| items.clear());
        }
        self.remove_range(0..self.len())
    }

    fn take_at_indexes(&self, indexes: IndexSet) -> Result<Vec<T>> {
        let positions = indexes.clone();
        self.perform(MutationRecord::remove(indexes), move |items| {
            let mut removed: Vec<T> = positions.iter().rev().map(|index| items.remove(index)).collect();
            removed.reverse();
            (Vec::new(), removed)
        })
        .map(|(_, removed)| removed)
    }

    // =========================================================================
    // UPDATE / MOVE
    // =========================================================================

    /// Swap the element at `index` for `value`, reported as an update.
    pub fn replace(&self, index: usize, value: T) -> Result<T> {
        self.refuse_reentrant("replace")?;
        check_existing(&IndexSet::single(index), self.len())?;
        self.swap_in(index, value).map(|mut old| old.remove(0))
    }

    /// Like [`replace`](Self::replace), without handing the old element
    /// back. Usable from callbacks.
    pub fn set(&self, index: usize, value: T) -> Result<()> {
        check_existing(&IndexSet::single(index), self.len())?;
        if self.defers_mutations() {
            return self.defer("set", move |items| items.set(index, value));
        }
        self.swap_in(index, value).map(drop)
    }

    fn swap_in(&self, index: usize, value: T) -> Result<Vec<T>> {
        self.perform(MutationRecord::update(IndexSet::single(index)), move |items| {
            let old = std::mem::replace(&mut items[index], value.clone());
            (vec![value], vec![old])
        })
        .map(|(_, old)| old)
    }

    /// Relocate one element so it ends up at `to`.
    ///
    /// `from == to` changes nothing and produces no record.
    pub fn move_item(&self, from: usize, to: usize) -> Result<()> {
        check_existing(&IndexSet::from([from, to]), self.len())?;
        if from == to {
            return Ok(());
        }
        if self.defers_mutations() {
            return self.defer("move_item", move |items| items.move_item(from, to));
        }

        self.perform(MutationRecord::moved(from, to), move |items| {
            let value = items.remove(from);
            items.insert(to, value);
            (Vec::new(), Vec::new())
        })
        .map(drop)
    }

    /// Report the elements at `indexes` as updated without changing them.
    pub fn update_at(&self, indexes: IndexSet) -> Result<()> {
        if indexes.is_empty() {
            return Ok(());
        }
        check_existing(&indexes, self.len())?;
        if self.defers_mutations() {
            return self.defer("update_at", move |items| items.update_at(indexes));
        }

        self.perform(MutationRecord::update(indexes), |_| (Vec::new(), Vec::new()))
            .map(drop)
    }

    /// Report every element equal to `element` as updated. Does nothing if
    /// the collection does not hold it.
    pub fn send_update_notification(&self, element: &T) -> Result<()> {
        let indexes = self.indexes_where(|item| item == element);
        self.update_at(indexes)
    }

    /// Replace the whole contents, reported as an unknown change whose
    /// `removed` carries the old contents.
    pub fn replace_all(&self, values: Vec<T>) -> Result<()> {
        if self.defers_mutations() {
            return self.defer("replace_all", move |items| items.replace_all(values));
        }
        self.perform(MutationRecord::unknown(), move |items| {
            let old = std::mem::replace(items, values.clone());
            (values, old)
        })
        .map(drop)
    }

    // =========================================================================
    // BATCH
    // =========================================================================

    /// Open a batch, or nest inside the one already open.
    ///
    /// Only the outermost open notifies observers.
    pub fn begin_batch_updates(&self) -> Result<()> {
        if self.defers_mutations() {
            return self.defer("begin_batch_updates", |items| items.begin_batch_updates());
        }
        let len = self.len();
        let outermost = self.inner.batch.borrow_mut().open(len);
        if !outermost {
            tracing::trace!(target = %self.id(), depth = self.batch_depth(), "nested batch opened");
            return Ok(());
        }
        tracing::debug!(target = %self.id(), len, "batch opened");
        let result = self.emit(vec![CollectionEvent::WillBeginBatchUpdates]);
        merge(result, self.drain_queued())
    }

    /// Close one batch level.
    ///
    /// The outermost close projects the buffered mutations and delivers the
    /// resulting records followed by `DidEndBatchUpdates`, unless nothing was
    /// captured and `force` is false. Closing with no batch open does nothing.
    pub fn end_batch_updates(&self, force: bool) -> Result<()> {
        if self.defers_mutations() {
            return self.defer("end_batch_updates", move |items| items.end_batch_updates(force));
        }
        let outcome = self.inner.batch.borrow_mut().close(force);
        match outcome {
            CloseOutcome::Unbalanced => {
                tracing::debug!(target = %self.id(), "end_batch_updates without a matching begin; ignored");
                Ok(())
            }
            CloseOutcome::StillOpen { depth } => {
                tracing::trace!(target = %self.id(), depth, "nested batch closed");
                Ok(())
            }
            CloseOutcome::Suppressed => {
                tracing::debug!(target = %self.id(), "batch closed without changes");
                Ok(())
            }
            CloseOutcome::Flush {
                base_len,
                pending,
                forced,
            } => {
                let projection = project(base_len, &pending);
                tracing::debug!(
                    target = %self.id(),
                    captured = pending.len(),
                    changes = ?projection.changes,
                    forced,
                    "batch closed"
                );

                let mut removed = Some(projection.removed);
                let mut events: Vec<CollectionEvent<T>> = projection
                    .changes
                    .records()
                    .into_iter()
                    .map(|record| {
                        let removed = match record.kind() {
                            MutationKind::Remove => removed.take().unwrap_or_default(),
                            _ => Vec::new(),
                        };
                        CollectionEvent::DidChange { record, removed }
                    })
                    .collect();
                events.push(CollectionEvent::DidEndBatchUpdates { forced });

                let result = self.emit(events);
                self.inner.batch.borrow_mut().finish();
                merge(result, self.drain_queued())
            }
        }
    }

    /// Run `f` inside a batch and close it without forcing.
    pub fn batch_updates<R>(&self, f: impl FnOnce(&Self) -> R) -> Result<R> {
        let begin = self.begin_batch_updates();
        let value = f(self);
        let end = self.end_batch_updates(false);
        merge(begin, end)?;
        Ok(value)
    }

    // =========================================================================
    // CHANGE CAPTURE
    // =========================================================================

    /// Apply one logical mutation: will-change, write, then did-change or
    /// buffer into the open batch. Queued mutations run afterwards.
    ///
    /// Callers validate first. Nothing reaches the contents while this
    /// collection is delivering, so the check still holds when `apply` runs.
    /// `apply` returns the elements that were added and removed.
    fn perform(
        &self,
        record: MutationRecord,
        apply: impl FnOnce(&mut Vec<T>) -> (Vec<T>, Vec<T>),
    ) -> Result<(Vec<T>, Vec<T>)> {
        let will = if self.is_batching() {
            Ok(())
        } else {
            self.emit(vec![CollectionEvent::WillChange(record.clone())])
        };

        let (inserted, removed) = {
            let mut items = self.inner.items.borrow_mut();
            apply(&mut *items)
        };
        tracing::trace!(target = %self.id(), ?record, "captured mutation");
        self.run_element_hook(&inserted, &removed);

        let captured = CapturedMutation {
            record,
            inserted: inserted.clone(),
            removed: removed.clone(),
        };
        let immediate = self.inner.batch.borrow_mut().capture(captured);
        let did = match immediate {
            Some(captured) => self.emit(vec![CollectionEvent::DidChange {
                record: captured.record,
                removed: captured.removed,
            }]),
            None => Ok(()),
        };

        merge(merge(will, did), self.drain_queued())?;
        Ok((inserted, removed))
    }

    fn emit(&self, events: Vec<CollectionEvent<T>>) -> Result<()> {
        let target = self.id();
        self.inner.dispatcher.emit(events, |events| {
            let mut failures: Vec<CallbackFailure> = Vec::new();
            for event in events {
                let snapshot = self.inner.table.lookup(&AnyIndex);
                tracing::trace!(
                    %target,
                    event = event.name(),
                    record = ?event.record(),
                    observers = snapshot.len(),
                    "dispatching collection event"
                );
                failures.extend(notify(target, &snapshot, |observer, callback| {
                    callback(observer, self, event)
                }));
            }
            failures
        })
    }

    fn indexes_where(&self, mut predicate: impl FnMut(&T) -> bool) -> IndexSet {
        self.inner
            .items
            .borrow()
            .iter()
            .enumerate()
            .filter(|(_, item)| predicate(item))
            .map(|(index, _)| index)
            .collect()
    }

    fn run_element_hook(&self, inserted: &[T], removed: &[T]) {
        let hook = self.inner.element_hook.borrow().clone();
        if let Some(hook) = hook {
            for element in removed {
                hook(self, element, Attachment::Detach);
            }
            for element in inserted {
                hook(self, element, Attachment::Attach);
            }
        }
    }
}

impl<T> ObservableVec<T>
where
    T: UpdateSource + Clone + PartialEq + 'static,
{
    /// Follow each element's update notifications and report them as update
    /// records for the element's indices.
    ///
    /// Elements are attached as they are inserted and detached when the last
    /// copy leaves the collection. Both directions of the link are weak.
    pub fn enable_automatic_updates(&self) {
        let hook: Rc<ElementHook<T>> = Rc::new(|items: &ObservableVec<T>, element: &T, attachment: Attachment| {
            let observed = element.observed();
            let source = observed.id();
            match attachment {
                Attachment::Attach => {
                    let collection = Rc::downgrade(&items.inner);
                    observed.add_observer(&items.inner, ObjectKey::Update, move |_, _| {
                        let Some(inner) = collection.upgrade() else {
                            return Ok(());
                        };
                        let items = ObservableVec { inner };
                        let indexes = items.indexes_where(|item| item.observed().id() == source);
                        items.update_at(indexes).map_err(CallbackError::new)
                    });
                }
                Attachment::Detach => {
                    let still_held = items.inner.items.borrow().iter().any(|item| item.observed().id() == source);
                    if !still_held {
                        observed.remove_observer(&items.inner, Some(&ObjectKey::Update));
                    }
                }
            }
        });

        *self.inner.element_hook.borrow_mut() = Some(Rc::clone(&hook));
        let current = self.to_vec();
        for element in &current {
            hook(self, element, Attachment::Attach);
        }
    }

    /// Stop following element updates.
    pub fn disable_automatic_updates(&self) {
        if self.inner.element_hook.borrow_mut().take().is_none() {
            return;
        }
        for element in self.to_vec() {
            element
                .observed()
                .remove_observer(&self.inner, Some(&ObjectKey::Update));
        }
    }
}

impl<T: Clone + PartialEq + 'static> Default for ObservableVec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + PartialEq + 'static> From<Vec<T>> for ObservableVec<T> {
    fn from(items: Vec<T>) -> Self {
        Self::from_vec(items)
    }
}

impl<T: Clone + PartialEq + 'static> FromIterator<T> for ObservableVec<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

impl<T: fmt::Debug> fmt::Debug for ObservableVec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableVec")
            .field("id", &self.id())
            .field("items", &self.inner.items.borrow())
            .field("observers", &self.observer_count())
            .field("batch", &self.batch_state())
            .finish()
    }
}

fn check_insert_at(at: usize, len: usize) -> Result<()> {
    if at > len {
        return Err(Error::IndexOutOfBounds { index: at, len });
    }
    Ok(())
}

/// Each target index may be at most the length reached after the earlier
/// insertions of the same record.
fn check_insert_indexes(indexes: &IndexSet, len: usize) -> Result<()> {
    for (inserted, index) in indexes.iter().enumerate() {
        check_insert_at(index, len + inserted)?;
    }
    Ok(())
}

fn check_existing(indexes: &IndexSet, len: usize) -> Result<()> {
    match indexes.last() {
        Some(index) if index >= len => Err(Error::IndexOutOfBounds { index, len }),
        _ => Ok(()),
    }
}

/// Read-and-observe view of an [`ObservableVec`].
pub struct ReadOnlyVec<T> {
    items: ObservableVec<T>,
}

impl<T> Clone for ReadOnlyVec<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
        }
    }
}

impl<T> ReadOnlyVec<T> {
    pub fn id(&self) -> TargetId {
        self.items.id()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn with_items<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        self.items.with_items(f)
    }

    pub fn is_batching(&self) -> bool {
        self.items.is_batching()
    }

    pub fn observer_count(&self) -> usize {
        self.items.observer_count()
    }

    pub fn remove_observer<O: ?Sized>(&self, observer: &Rc<O>) -> bool {
        self.items.remove_observer(observer)
    }
}

impl<T: Clone + PartialEq + 'static> ReadOnlyVec<T> {
    pub fn get(&self, index: usize) -> Option<T> {
        self.items.get(index)
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.items.to_vec()
    }

    pub fn index_of(&self, element: &T) -> Option<usize> {
        self.items.index_of(element)
    }

    pub fn contains(&self, element: &T) -> bool {
        self.items.contains(element)
    }

    pub fn add_observer<O: CollectionObserver<T> + 'static>(&self, observer: &Rc<O>) {
        self.items.add_observer(observer);
    }

    pub fn add_observer_fn<O, F>(&self, observer: &Rc<O>, callback: F)
    where
        O: Any,
        F: Fn(&O, &ObservableVec<T>, &CollectionEvent<T>) -> CallbackResult + 'static,
    {
        self.items.add_observer_fn(observer, callback);
    }
}

impl<T: fmt::Debug> fmt::Debug for ReadOnlyVec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReadOnlyVec").field(&self.items).finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
