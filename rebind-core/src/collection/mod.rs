//! Observable Collections
//!
//! This module implements change capture for ordered collections and the
//! batching machinery that turns many mutations into one animated update.
//!
//! # Concepts
//!
//! ## Mutation Records
//!
//! Every logical operation on an [`ObservableVec`] produces exactly one
//! [`MutationRecord`]: insert, remove, move, update, or unknown. Bulk
//! operations produce one record covering all affected indices.
//!
//! ## Batches
//!
//! Between `begin_batch_updates` and the matching `end_batch_updates`,
//! records are buffered in a [`BatchWindow`]. Batches nest; only the
//! outermost pair is visible to observers.
//!
//! ## Projection
//!
//! When the outermost batch closes, [`project`] reduces the buffered records
//! to a [`ChangeSet`] whose indices a view can apply directly: removals in
//! pre-batch coordinates, insertions in post-batch coordinates, and a
//! remove/insert of the same element reported as a move.

mod batch;
mod projection;
mod record;
mod vec;

pub use batch::{BatchState, BatchWindow, CloseOutcome};
pub use projection::{project, CapturedMutation, Projection};
pub use record::{ChangeSet, IndexSet, Move, MutationKind, MutationRecord};
pub use vec::{AnyIndex, CollectionEvent, CollectionObserver, ObservableVec, ReadOnlyVec};
