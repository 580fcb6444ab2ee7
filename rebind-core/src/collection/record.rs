//! Mutation Records
//!
//! The vocabulary shared by change capture, batching, projection and the
//! consumer side: index sets, mutation kinds, and the coalesced change set a
//! view applies in one animated pass.

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Ordered set of collection indices.
///
/// Always sorted ascending and free of duplicates. Small sets (the common
/// single-element case) stay inline.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<usize>", into = "Vec<usize>")]
pub struct IndexSet {
    indices: SmallVec<[usize; 4]>,
}

impl IndexSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A set holding one index.
    pub fn single(index: usize) -> Self {
        let mut indices = SmallVec::new();
        indices.push(index);
        Self { indices }
    }

    /// A set holding every index in `range`.
    pub fn from_range(range: Range<usize>) -> Self {
        Self {
            indices: range.collect(),
        }
    }

    /// Add `index`. Returns `false` if it was already present.
    pub fn insert(&mut self, index: usize) -> bool {
        match self.indices.binary_search(&index) {
            Ok(_) => false,
            Err(pos) => {
                self.indices.insert(pos, index);
                true
            }
        }
    }

    /// Remove `index`. Returns `false` if it was absent.
    pub fn remove(&mut self, index: usize) -> bool {
        match self.indices.binary_search(&index) {
            Ok(pos) => {
                self.indices.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        self.indices.binary_search(&index).is_ok()
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn first(&self) -> Option<usize> {
        self.indices.first().copied()
    }

    pub fn last(&self) -> Option<usize> {
        self.indices.last().copied()
    }

    /// Indices in ascending order. Reverse it for descending removal.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = usize> + ExactSizeIterator + '_ {
        self.indices.iter().copied()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.indices
    }

    /// Maximal runs of consecutive indices.
    ///
    /// `{1, 2, 3, 7, 9, 10}` yields `1..4`, `7..8`, `9..11`.
    pub fn ranges(&self) -> Vec<Range<usize>> {
        let mut ranges: Vec<Range<usize>> = Vec::new();
        for index in self.iter() {
            match ranges.last_mut() {
                Some(run) if run.end == index => run.end += 1,
                _ => ranges.push(index..index + 1),
            }
        }
        ranges
    }
}

impl FromIterator<usize> for IndexSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut indices: SmallVec<[usize; 4]> = iter.into_iter().collect();
        indices.sort_unstable();
        indices.dedup();
        Self { indices }
    }
}

impl Extend<usize> for IndexSet {
    fn extend<I: IntoIterator<Item = usize>>(&mut self, iter: I) {
        for index in iter {
            self.insert(index);
        }
    }
}

impl From<Vec<usize>> for IndexSet {
    fn from(indices: Vec<usize>) -> Self {
        indices.into_iter().collect()
    }
}

impl From<IndexSet> for Vec<usize> {
    fn from(set: IndexSet) -> Self {
        set.indices.into_vec()
    }
}

impl<const N: usize> From<[usize; N]> for IndexSet {
    fn from(indices: [usize; N]) -> Self {
        indices.into_iter().collect()
    }
}

impl fmt::Debug for IndexSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// The kind of structural change a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Insert,
    Remove,
    Move,
    Update,
    /// The contents changed in a way indices cannot describe; reload.
    Unknown,
}

/// A single element relocation.
///
/// In a projected [`ChangeSet`], `from` is a pre-batch index and `to` a
/// post-batch index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Move {
    pub from: usize,
    pub to: usize,
}

/// One structural change to an ordered collection. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationRecord {
    kind: MutationKind,
    indexes: IndexSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    moved: Option<Move>,
}

impl MutationRecord {
    /// Elements now live at `indexes` (indices after the insertion).
    pub fn insert(indexes: IndexSet) -> Self {
        Self::with_indexes(MutationKind::Insert, indexes)
    }

    /// Elements at `indexes` (indices before the removal) are gone.
    pub fn remove(indexes: IndexSet) -> Self {
        Self::with_indexes(MutationKind::Remove, indexes)
    }

    /// Elements at `indexes` changed in place.
    pub fn update(indexes: IndexSet) -> Self {
        Self::with_indexes(MutationKind::Update, indexes)
    }

    /// The element at `from` now lives at `to`.
    pub fn moved(from: usize, to: usize) -> Self {
        Self {
            kind: MutationKind::Move,
            indexes: IndexSet::new(),
            moved: Some(Move { from, to }),
        }
    }

    pub fn unknown() -> Self {
        Self::with_indexes(MutationKind::Unknown, IndexSet::new())
    }

    fn with_indexes(kind: MutationKind, indexes: IndexSet) -> Self {
        Self {
            kind,
            indexes,
            moved: None,
        }
    }

    pub fn kind(&self) -> MutationKind {
        self.kind
    }

    /// Affected indices. Empty for moves and unknown changes.
    pub fn indexes(&self) -> &IndexSet {
        &self.indexes
    }

    /// The relocation, for move records.
    pub fn move_indices(&self) -> Option<Move> {
        self.moved
    }
}

/// Coalesced result of a batch, ready for a view to animate.
///
/// Apply `removed` and every move's `from` against the pre-batch contents in
/// descending order, then `inserted` and every move's `to` in ascending order
/// against the post-batch contents. `updated` refers to pre-batch indices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub removed: IndexSet,
    pub inserted: IndexSet,
    pub updated: IndexSet,
    pub moves: Vec<Move>,
    /// Set when the batch contained an unknown change; the index sets are
    /// then empty and the consumer should reload everything.
    pub reload: bool,
}

impl ChangeSet {
    /// A change set that asks for a full reload.
    pub fn reload() -> Self {
        Self {
            reload: true,
            ..Self::default()
        }
    }

    /// Whether applying this change set would do nothing.
    pub fn is_empty(&self) -> bool {
        !self.reload
            && self.removed.is_empty()
            && self.inserted.is_empty()
            && self.updated.is_empty()
            && self.moves.is_empty()
    }

    /// Render as records: remove, insert, one record per move, update.
    pub fn records(&self) -> Vec<MutationRecord> {
        if self.reload {
            return vec![MutationRecord::unknown()];
        }

        let mut records = Vec::new();
        if !self.removed.is_empty() {
            records.push(MutationRecord::remove(self.removed.clone()));
        }
        if !self.inserted.is_empty() {
            records.push(MutationRecord::insert(self.inserted.clone()));
        }
        records.extend(self.moves.iter().map(|mv| MutationRecord::moved(mv.from, mv.to)));
        if !self.updated.is_empty() {
            records.push(MutationRecord::update(self.updated.clone()));
        }
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_set_stays_sorted_and_unique() {
        let mut set: IndexSet = [5, 1, 3, 1].into();
        assert_eq!(set.as_slice(), &[1, 3, 5]);

        assert!(set.insert(2));
        assert!(!set.insert(3));
        assert!(set.remove(5));
        assert!(!set.remove(5));
        assert_eq!(set.iter().rev().collect::<Vec<_>>(), vec![3, 2, 1]);
        assert_eq!(set.first(), Some(1));
        assert_eq!(set.last(), Some(3));
    }

    #[test]
    fn index_set_ranges_merge_adjacent() {
        let set: IndexSet = [1, 2, 3, 7, 9, 10].into();
        assert_eq!(set.ranges(), vec![1..4, 7..8, 9..11]);
        assert!(IndexSet::new().ranges().is_empty());
        assert_eq!(IndexSet::from_range(4..7).ranges(), vec![4..7]);
    }

    #[test]
    fn index_set_serializes_as_plain_array() {
        let set: IndexSet = [3, 0].into();
        assert_eq!(serde_json::to_string(&set).unwrap(), "[0,3]");

        let back: IndexSet = serde_json::from_str("[4,2,2]").unwrap();
        assert_eq!(back.as_slice(), &[2, 4]);
    }

    #[test]
    fn move_record_has_no_indexes() {
        let record = MutationRecord::moved(0, 2);
        assert_eq!(record.kind(), MutationKind::Move);
        assert!(record.indexes().is_empty());
        assert_eq!(record.move_indices(), Some(Move { from: 0, to: 2 }));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "move");
        assert_eq!(json["moved"]["to"], 2);
    }

    #[test]
    fn change_set_records_order() {
        let changes = ChangeSet {
            removed: IndexSet::single(4),
            inserted: IndexSet::single(0),
            updated: IndexSet::single(1),
            moves: vec![Move { from: 2, to: 3 }],
            reload: false,
        };

        let kinds: Vec<_> = changes.records().iter().map(|r| r.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                MutationKind::Remove,
                MutationKind::Insert,
                MutationKind::Move,
                MutationKind::Update
            ]
        );
        assert!(!changes.is_empty());
        assert!(ChangeSet::default().is_empty());
        assert_eq!(ChangeSet::reload().records(), vec![MutationRecord::unknown()]);
    }
}
