//! Consumer Sink
//!
//! Drives a list-style view from an [`ObservableVec`]. The data source
//! observes the collection and turns each notification into view calls:
//! item-level insert, delete, move and reload calls when animating, or a
//! full reload otherwise.
//!
//! Batches map onto the view's own update grouping: the outermost batch
//! opening calls `begin_updates`, its coalesced records become item calls,
//! and its close calls `end_updates`.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::collection::{ChangeSet, CollectionObserver, IndexSet, MutationKind, MutationRecord, ObservableVec};
use crate::config::SinkConfig;
use crate::error::{ApplyError, CallbackResult};

/// The view side of a data source.
///
/// Indices follow the usual batch-update convention: deletions and reloads
/// refer to the contents before the update group, insertions to the contents
/// after it.
pub trait CollectionView {
    fn insert_items(&self, indexes: &IndexSet);
    fn delete_items(&self, indexes: &IndexSet);
    fn move_item(&self, from: usize, to: usize);
    fn reload_items(&self, indexes: &IndexSet);
    fn reload_data(&self);
    fn begin_updates(&self);
    fn end_updates(&self, animated: bool);
}

type ReuseIdentifier<T> = dyn Fn(&T, usize) -> String;

/// Feeds a [`CollectionView`] from a backing collection.
pub struct CollectionViewDataSource<T, V> {
    view: V,
    config: SinkConfig,
    backing: RefCell<ObservableVec<T>>,
    reuse_identifier: Box<ReuseIdentifier<T>>,
    in_batch: Cell<bool>,
    reload_pending: Cell<bool>,
}

impl<T, V> CollectionViewDataSource<T, V>
where
    T: Clone + PartialEq + 'static,
    V: CollectionView + 'static,
{
    /// Create a data source observing `backing`.
    ///
    /// `reuse_identifier` maps an element and its index to the identifier
    /// of the cell kind that displays it.
    pub fn new(
        view: V,
        backing: ObservableVec<T>,
        config: SinkConfig,
        reuse_identifier: impl Fn(&T, usize) -> String + 'static,
    ) -> Rc<Self> {
        let source = Rc::new(Self {
            view,
            config,
            backing: RefCell::new(backing.clone()),
            reuse_identifier: Box::new(reuse_identifier),
            in_batch: Cell::new(false),
            reload_pending: Cell::new(false),
        });
        backing.add_observer(&source);
        source
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn config(&self) -> SinkConfig {
        self.config
    }

    /// The collection currently being displayed.
    pub fn backing(&self) -> ObservableVec<T> {
        self.backing.borrow().clone()
    }

    /// Display a different collection and reload the view.
    pub fn set_backing_array(self: &Rc<Self>, backing: ObservableVec<T>) {
        let previous = self.backing.replace(backing.clone());
        previous.remove_observer(self);
        backing.add_observer(self);

        self.in_batch.set(false);
        self.reload_pending.set(false);
        tracing::debug!(from = %previous.id(), to = %backing.id(), "data source backing replaced");
        self.view.reload_data();
    }

    pub fn number_of_items(&self) -> usize {
        self.backing.borrow().len()
    }

    pub fn object_at(&self, index: usize) -> Option<T> {
        self.backing.borrow().get(index)
    }

    pub fn reuse_identifier_at(&self, index: usize) -> Option<String> {
        let element = self.object_at(index)?;
        Some((self.reuse_identifier)(&element, index))
    }

    fn apply_record(&self, record: &MutationRecord) {
        match record.kind() {
            MutationKind::Insert => self.view.insert_items(record.indexes()),
            MutationKind::Remove => self.view.delete_items(record.indexes()),
            MutationKind::Update => self.view.reload_items(record.indexes()),
            MutationKind::Move => {
                if let Some(mv) = record.move_indices() {
                    self.view.move_item(mv.from, mv.to);
                }
            }
            MutationKind::Unknown => self.reload(),
        }
    }

    /// Reload now, or at the end of the current batch.
    fn reload(&self) {
        if self.in_batch.get() {
            self.reload_pending.set(true);
        } else {
            self.view.reload_data();
        }
    }
}

impl<T, V> CollectionObserver<T> for CollectionViewDataSource<T, V>
where
    T: Clone + PartialEq + 'static,
    V: CollectionView + 'static,
{
    fn did_change(&self, _items: &ObservableVec<T>, record: &MutationRecord, _removed: &[T]) -> CallbackResult {
        if self.config.animate_changes {
            self.apply_record(record);
        } else {
            self.reload();
        }
        Ok(())
    }

    fn did_move(&self, _items: &ObservableVec<T>, from: usize, to: usize) -> CallbackResult {
        if self.config.animate_changes {
            self.view.move_item(from, to);
        } else {
            self.reload();
        }
        Ok(())
    }

    fn will_begin_batch_updates(&self, _items: &ObservableVec<T>) -> CallbackResult {
        self.in_batch.set(true);
        if self.config.animate_changes {
            self.view.begin_updates();
        }
        Ok(())
    }

    fn did_end_batch_updates(&self, _items: &ObservableVec<T>, forced: bool) -> CallbackResult {
        self.in_batch.set(false);
        if self.config.animate_changes {
            self.view.end_updates(true);
        }

        let pending = self.reload_pending.replace(false);
        if forced || pending || self.config.reload_after_animation {
            tracing::trace!(forced, pending, "reloading after batch");
            self.view.reload_data();
        }
        Ok(())
    }
}

impl<T: fmt::Debug, V: fmt::Debug> fmt::Debug for CollectionViewDataSource<T, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionViewDataSource")
            .field("view", &self.view)
            .field("config", &self.config)
            .field("backing", &self.backing)
            .field("in_batch", &self.in_batch.get())
            .finish_non_exhaustive()
    }
}

/// A consumer-side mirror of a collection's rows.
///
/// Applies a [`ChangeSet`] the way a view performs a batch update, so the
/// result can be compared against the collection itself.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PresentedRows<T> {
    rows: Vec<T>,
}

impl<T: Clone> PresentedRows<T> {
    pub fn new(rows: Vec<T>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[T] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Apply `changes`, falling back to copying `current` when they do not
    /// fit the presented rows.
    pub fn apply(&mut self, changes: &ChangeSet, current: &[T]) {
        if let Err(error) = self.try_apply(changes, current) {
            tracing::warn!(%error, ?changes, rows = self.rows.len(), "change set does not fit presented rows; resyncing");
            self.rows = current.to_vec();
        }
    }

    /// Apply `changes` the way a view performs a batch update.
    ///
    /// Deletes removals and move sources in descending order, then inserts
    /// insertions and move targets in ascending order. Moved rows carry their
    /// presented value along; insertions read from `current`. Rows flagged as
    /// updated (by pre-batch index) are refreshed from `current` wherever they
    /// end up. On error the presented rows are left as they were.
    pub fn try_apply(&mut self, changes: &ChangeSet, current: &[T]) -> Result<(), ApplyError> {
        if changes.reload {
            self.rows = current.to_vec();
            return Ok(());
        }

        let len = self.rows.len();
        let mut deletions = changes.removed.clone();
        for mv in &changes.moves {
            if !deletions.insert(mv.from) {
                return Err(ApplyError::Overlap { index: mv.from });
            }
        }
        for index in deletions.last().into_iter().chain(changes.updated.last()) {
            if index >= len {
                return Err(ApplyError::IndexOutOfRange { index, len });
            }
        }

        let mut rows: Vec<(T, bool)> = self
            .rows
            .iter()
            .enumerate()
            .map(|(index, row)| (row.clone(), changes.updated.contains(index)))
            .collect();

        let mut carried: BTreeMap<usize, (T, bool)> = BTreeMap::new();
        for index in deletions.iter().rev() {
            let row = rows.remove(index);
            if !changes.removed.contains(index) {
                carried.insert(index, row);
            }
        }

        let mut insertions = changes.inserted.clone();
        let mut sources: BTreeMap<usize, usize> = BTreeMap::new();
        for mv in &changes.moves {
            if !insertions.insert(mv.to) {
                return Err(ApplyError::Overlap { index: mv.to });
            }
            sources.insert(mv.to, mv.from);
        }
        for index in insertions.iter() {
            if index > rows.len() || index >= current.len() {
                return Err(ApplyError::IndexOutOfRange {
                    index,
                    len: current.len(),
                });
            }
            let row = match sources.get(&index).and_then(|from| carried.remove(from)) {
                Some(row) => row,
                None => (current[index].clone(), false),
            };
            rows.insert(index, row);
        }

        if rows.len() != current.len() {
            return Err(ApplyError::LengthMismatch {
                expected: current.len(),
                actual: rows.len(),
            });
        }
        self.rows = rows
            .into_iter()
            .zip(current)
            .map(|((row, stale), fresh)| if stale { fresh.clone() } else { row })
            .collect();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::Move;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Insert(Vec<usize>),
        Delete(Vec<usize>),
        Move(usize, usize),
        Reload(Vec<usize>),
        ReloadData,
        Begin,
        End(bool),
    }

    #[derive(Debug, Default)]
    struct RecordingView {
        calls: RefCell<Vec<Call>>,
    }

    impl RecordingView {
        fn take(&self) -> Vec<Call> {
            self.calls.take()
        }
    }

    impl CollectionView for RecordingView {
        fn insert_items(&self, indexes: &IndexSet) {
            self.calls.borrow_mut().push(Call::Insert(indexes.iter().collect()));
        }

        fn delete_items(&self, indexes: &IndexSet) {
            self.calls.borrow_mut().push(Call::Delete(indexes.iter().collect()));
        }

        fn move_item(&self, from: usize, to: usize) {
            self.calls.borrow_mut().push(Call::Move(from, to));
        }

        fn reload_items(&self, indexes: &IndexSet) {
            self.calls.borrow_mut().push(Call::Reload(indexes.iter().collect()));
        }

        fn reload_data(&self) {
            self.calls.borrow_mut().push(Call::ReloadData);
        }

        fn begin_updates(&self) {
            self.calls.borrow_mut().push(Call::Begin);
        }

        fn end_updates(&self, animated: bool) {
            self.calls.borrow_mut().push(Call::End(animated));
        }
    }

    fn source(
        items: &ObservableVec<&'static str>,
        config: SinkConfig,
    ) -> Rc<CollectionViewDataSource<&'static str, RecordingView>> {
        CollectionViewDataSource::new(RecordingView::default(), items.clone(), config, |item, _| {
            format!("cell-{}", item.len())
        })
    }

    #[test]
    fn forwards_unbatched_changes() {
        let items = ObservableVec::from_vec(vec!["a", "b", "c"]);
        let source = source(&items, SinkConfig::default());

        items.push("d").unwrap();
        items.remove(0).unwrap();
        items.move_item(0, 2).unwrap();
        items.replace(1, "x").unwrap();
        items.replace_all(vec!["z"]).unwrap();

        assert_eq!(
            source.view().take(),
            vec![
                Call::Insert(vec![3]),
                Call::Delete(vec![0]),
                Call::Move(0, 2),
                Call::Reload(vec![1]),
                Call::ReloadData,
            ]
        );
    }

    #[test]
    fn batch_is_wrapped_in_update_group() {
        let items = ObservableVec::from_vec(vec!["a", "b", "c", "d"]);
        let source = source(&items, SinkConfig::default());

        items
            .batch_updates(|items| {
                items.remove(0).unwrap();
                items.push("e").unwrap();
            })
            .unwrap();

        assert_eq!(
            source.view().take(),
            vec![
                Call::Begin,
                Call::Delete(vec![0]),
                Call::Insert(vec![3]),
                Call::End(true)
            ]
        );
    }

    #[test]
    fn forced_or_configured_batches_reload_afterwards() {
        let items = ObservableVec::from_vec(vec!["a"]);
        let source = source(&items, SinkConfig::default());

        items.begin_batch_updates().unwrap();
        items.end_batch_updates(true).unwrap();
        assert_eq!(
            source.view().take(),
            vec![Call::Begin, Call::End(true), Call::ReloadData]
        );

        let config = SinkConfig {
            reload_after_animation: true,
            ..SinkConfig::default()
        };
        let other = ObservableVec::from_vec(vec!["a"]);
        let reloading = self::source(&other, config);
        other.batch_updates(|items| items.push("b")).unwrap().unwrap();
        assert_eq!(
            reloading.view().take(),
            vec![Call::Begin, Call::Insert(vec![1]), Call::End(true), Call::ReloadData]
        );
    }

    #[test]
    fn unknown_inside_batch_reloads_after_end() {
        let items = ObservableVec::from_vec(vec!["a"]);
        let source = source(&items, SinkConfig::default());

        items
            .batch_updates(|items| items.replace_all(vec!["b", "c"]))
            .unwrap()
            .unwrap();

        assert_eq!(
            source.view().take(),
            vec![Call::Begin, Call::End(true), Call::ReloadData]
        );
    }

    #[test]
    fn reload_only_mode_never_animates() {
        let items = ObservableVec::from_vec(vec!["a"]);
        let source = source(&items, SinkConfig::reload_only());

        items.push("b").unwrap();
        items
            .batch_updates(|items| {
                items.push("c").unwrap();
                items.move_item(0, 2).unwrap();
            })
            .unwrap();

        assert_eq!(source.view().take(), vec![Call::ReloadData, Call::ReloadData]);
    }

    #[test]
    fn data_source_queries_follow_backing() {
        let items = ObservableVec::from_vec(vec!["a", "bb"]);
        let source = source(&items, SinkConfig::default());

        assert_eq!(source.number_of_items(), 2);
        assert_eq!(source.object_at(1), Some("bb"));
        assert_eq!(source.reuse_identifier_at(1).as_deref(), Some("cell-2"));
        assert_eq!(source.reuse_identifier_at(2), None);

        let replacement = ObservableVec::from_vec(vec!["ccc"]);
        source.set_backing_array(replacement.clone());
        assert_eq!(source.view().take(), vec![Call::ReloadData]);
        assert_eq!(source.number_of_items(), 1);
        assert_eq!(items.observer_count(), 0);

        items.push("ignored").unwrap();
        replacement.push("d").unwrap();
        assert_eq!(source.view().take(), vec![Call::Insert(vec![1])]);
    }

    #[test]
    fn presented_rows_apply_pre_and_post_indices() {
        let mut rows = PresentedRows::new(vec!['A', 'B', 'C', 'D']);
        let current = vec!['D', 'X', 'B', 'c'];
        let changes = ChangeSet {
            removed: IndexSet::single(0),
            inserted: IndexSet::single(1),
            updated: IndexSet::single(2),
            moves: vec![Move { from: 3, to: 0 }],
            reload: false,
        };

        rows.try_apply(&changes, &current).unwrap();
        assert_eq!(rows.rows(), current.as_slice());
    }

    #[test]
    fn moved_rows_carry_their_presented_value() {
        // The moved row keeps what it showed unless it was flagged as updated.
        let mut rows = PresentedRows::new(vec!['A', 'B', 'C']);
        let changes = ChangeSet {
            moves: vec![Move { from: 0, to: 2 }],
            ..ChangeSet::default()
        };
        rows.try_apply(&changes, &['B', 'C', 'X']).unwrap();
        assert_eq!(rows.rows(), &['B', 'C', 'A']);

        let mut rows = PresentedRows::new(vec!['A', 'B', 'C']);
        let changes = ChangeSet {
            updated: IndexSet::single(0),
            ..changes
        };
        rows.try_apply(&changes, &['B', 'C', 'X']).unwrap();
        assert_eq!(rows.rows(), &['B', 'C', 'X']);
    }

    #[test]
    fn strict_apply_rejects_change_sets_that_do_not_fit() {
        let mut rows = PresentedRows::new(vec!['A', 'B']);
        let bogus = ChangeSet {
            removed: IndexSet::single(7),
            inserted: IndexSet::single(9),
            ..ChangeSet::default()
        };
        assert!(matches!(
            rows.try_apply(&bogus, &['Q', 'R']),
            Err(ApplyError::IndexOutOfRange { index: 7, len: 2 })
        ));
        assert_eq!(rows.rows(), &['A', 'B']);

        let overlapping = ChangeSet {
            removed: IndexSet::single(0),
            moves: vec![Move { from: 0, to: 1 }],
            ..ChangeSet::default()
        };
        assert!(matches!(
            rows.try_apply(&overlapping, &['B', 'A']),
            Err(ApplyError::Overlap { index: 0 })
        ));

        let short = ChangeSet {
            removed: IndexSet::single(1),
            ..ChangeSet::default()
        };
        assert!(matches!(
            rows.try_apply(&short, &['A', 'B']),
            Err(ApplyError::LengthMismatch { expected: 2, actual: 1 })
        ));
        assert_eq!(rows.rows(), &['A', 'B']);
    }

    #[test]
    fn presented_rows_resync_on_mismatch() {
        let mut rows = PresentedRows::new(vec![1, 2]);
        let changes = ChangeSet {
            removed: IndexSet::single(5),
            ..ChangeSet::default()
        };

        rows.apply(&changes, &[9]);
        assert_eq!(rows.rows(), &[9]);

        rows.apply(&ChangeSet::reload(), &[7, 8]);
        assert_eq!(rows.rows(), &[7, 8]);
    }
}
