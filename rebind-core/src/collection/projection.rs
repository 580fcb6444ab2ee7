//! Index Projection
//!
//! Turns the mutations captured during a batch into one [`ChangeSet`] a view
//! can apply in a single pass.
//!
//! # Algorithm
//!
//! Replay the batch on a list of slots instead of on the elements:
//!
//! 1. Start with one `Original(i)` slot per pre-batch element.
//! 2. Inserts add `Inserted(n)` slots, numbered in capture order.
//! 3. Removes take slots out. A removed original is remembered together with
//!    its element; a removed inserted slot simply cancels the insertion.
//! 4. Moves relocate a slot and flag an original as moved.
//! 5. Updates flag an original (inserted slots are fresh anyway). A
//!    replacement remembers the original's pre-batch element, or overwrites
//!    the element an inserted slot holds.
//!
//! Afterwards the slot positions give post-batch indices directly. Removed
//! originals are paired with surviving inserted slots holding an equal
//! element: each removal, in capture order, takes the earliest-captured
//! matching insertion and the pair is reported as a move. What is left over
//! becomes plain removes (pre-batch indices) and inserts (post-batch indices).
//!
//! An unknown change anywhere in the batch short-circuits to a reload.

use std::collections::{BTreeMap, BTreeSet};

use super::record::{ChangeSet, IndexSet, Move, MutationKind, MutationRecord};

/// A mutation as captured by an observable collection, with the elements it
/// added or took away.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedMutation<T> {
    pub record: MutationRecord,
    /// For inserts: the new elements, in ascending index order.
    pub inserted: Vec<T>,
    /// For removes: the elements that left, in ascending index order.
    pub removed: Vec<T>,
}

// Updates produced by a replacement carry both sides: `removed` holds the
// replaced elements and `inserted` their replacements, index for index.

impl<T> CapturedMutation<T> {
    pub fn new(record: MutationRecord) -> Self {
        Self {
            record,
            inserted: Vec::new(),
            removed: Vec::new(),
        }
    }

    pub fn inserting(indexes: IndexSet, elements: Vec<T>) -> Self {
        Self {
            inserted: elements,
            ..Self::new(MutationRecord::insert(indexes))
        }
    }

    pub fn removing(indexes: IndexSet, elements: Vec<T>) -> Self {
        Self {
            removed: elements,
            ..Self::new(MutationRecord::remove(indexes))
        }
    }
}

/// Output of [`project`].
#[derive(Debug, Clone, PartialEq)]
pub struct Projection<T> {
    pub changes: ChangeSet,
    /// Pre-batch elements at `changes.removed`, ascending.
    pub removed: Vec<T>,
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Original(usize),
    Inserted(usize),
}

/// Project `captured`, recorded against a collection that held `base_len`
/// elements when the batch opened.
///
/// Update records may carry the element they replaced (`removed`) and its
/// replacement (`inserted`), one per index. Replaced originals are reported
/// with their pre-batch element, and an updated original that ends up paired
/// into a move stays in `updated` so the moved row is refreshed.
///
/// Records that do not fit the replayed state indicate a capture bug; they
/// trip a debug assertion and degrade to a reload in release builds.
pub fn project<T: Clone + PartialEq>(base_len: usize, captured: &[CapturedMutation<T>]) -> Projection<T> {
    let mut slots: Vec<Slot> = (0..base_len).map(Slot::Original).collect();
    let mut fresh_values: Vec<T> = Vec::new();
    let mut removed: Vec<(usize, T)> = Vec::new();
    let mut moved: BTreeSet<usize> = BTreeSet::new();
    let mut updated = IndexSet::new();
    // Pre-batch element of every original replaced during the batch.
    let mut replaced: BTreeMap<usize, T> = BTreeMap::new();

    for mutation in captured {
        let record = &mutation.record;
        let fits = match record.kind() {
            MutationKind::Insert => {
                replay_insert(&mut slots, &mut fresh_values, record.indexes(), &mutation.inserted)
            }
            MutationKind::Remove => {
                let Some(taken) = replay_remove(&mut slots, record.indexes(), &mutation.removed) else {
                    return inconsistent(record);
                };
                for (original, value) in taken {
                    moved.remove(&original);
                    removed.push((original, value));
                }
                true
            }
            MutationKind::Move => match record.move_indices() {
                Some(Move { from, to }) if from < slots.len() && to < slots.len() => {
                    let slot = slots.remove(from);
                    slots.insert(to, slot);
                    if let Slot::Original(original) = slot {
                        moved.insert(original);
                    }
                    true
                }
                _ => false,
            },
            MutationKind::Update => {
                for (position, index) in record.indexes().iter().enumerate() {
                    match slots.get(index) {
                        Some(Slot::Original(original)) => {
                            updated.insert(*original);
                            if let Some(old) = mutation.removed.get(position) {
                                replaced.entry(*original).or_insert_with(|| old.clone());
                            }
                        }
                        Some(Slot::Inserted(seq)) => {
                            if let Some(new) = mutation.inserted.get(position) {
                                fresh_values[*seq] = new.clone();
                            }
                        }
                        None => return inconsistent(record),
                    }
                }
                true
            }
            MutationKind::Unknown => {
                return Projection {
                    changes: ChangeSet::reload(),
                    removed: Vec::new(),
                };
            }
        };
        if !fits {
            return inconsistent(record);
        }
    }

    let mut final_position: Vec<Option<usize>> = vec![None; base_len];
    let mut fresh: Vec<(usize, usize)> = Vec::new();
    for (position, slot) in slots.iter().enumerate() {
        match *slot {
            Slot::Original(original) => final_position[original] = Some(position),
            Slot::Inserted(seq) => fresh.push((seq, position)),
        }
    }
    // Earliest-captured insertion first, for stable pairing.
    fresh.sort_unstable_by_key(|&(seq, _)| seq);

    // Pairing compares the element as it was when removed with the element
    // the insertion finally holds.
    let mut moves = Vec::new();
    let mut unpaired = Vec::new();
    for (original, value) in removed {
        match fresh.iter().position(|&(seq, _)| fresh_values[seq] == value) {
            Some(at) => {
                let (_, to) = fresh.remove(at);
                moves.push(Move { from: original, to });
            }
            None => {
                updated.remove(original);
                let before = replaced.remove(&original).unwrap_or(value);
                unpaired.push((original, before));
            }
        }
    }
    moves.extend(
        moved
            .into_iter()
            .filter_map(|original| final_position[original].map(|to| Move { from: original, to })),
    );
    moves.sort_unstable_by_key(|mv| mv.from);
    unpaired.sort_unstable_by_key(|&(original, _)| original);

    let changes = ChangeSet {
        removed: unpaired.iter().map(|&(original, _)| original).collect(),
        inserted: fresh.iter().map(|&(_, position)| position).collect(),
        updated,
        moves,
        reload: false,
    };
    Projection {
        changes,
        removed: unpaired.into_iter().map(|(_, value)| value).collect(),
    }
}

fn replay_insert<T: Clone>(
    slots: &mut Vec<Slot>,
    fresh_values: &mut Vec<T>,
    indexes: &IndexSet,
    elements: &[T],
) -> bool {
    if indexes.len() != elements.len() {
        return false;
    }
    for (index, value) in indexes.iter().zip(elements) {
        if index > slots.len() {
            return false;
        }
        slots.insert(index, Slot::Inserted(fresh_values.len()));
        fresh_values.push(value.clone());
    }
    true
}

/// Take the slots at `indexes` out, returning the originals among them in
/// ascending order with their elements.
fn replay_remove<T: Clone>(
    slots: &mut Vec<Slot>,
    indexes: &IndexSet,
    elements: &[T],
) -> Option<Vec<(usize, T)>> {
    if indexes.len() != elements.len() || indexes.last().is_some_and(|last| last >= slots.len()) {
        return None;
    }
    let mut taken = Vec::new();
    for (index, value) in indexes.iter().zip(elements).rev() {
        if let Slot::Original(original) = slots.remove(index) {
            taken.push((original, value.clone()));
        }
    }
    taken.reverse();
    Some(taken)
}

fn inconsistent<T>(record: &MutationRecord) -> Projection<T> {
    if cfg!(debug_assertions) {
        panic!("captured record does not fit the batch: {record:?}");
    }
    tracing::warn!(?record, "captured record does not fit the batch; falling back to reload");
    Projection {
        changes: ChangeSet::reload(),
        removed: Vec::new(),
    }
}
