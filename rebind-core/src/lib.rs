//! Rebind Core
//!
//! This crate provides key-value observation and collection-change
//! notification for list-backed views. It implements:
//!
//! - A per-target observation registry with weak observers
//! - Property observation for model objects
//! - Change capture for ordered collections
//! - Nested batch updates projected into one animatable change set
//! - A data source that drives a list view from a collection
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `observe`: subscription tables, observer lifetimes and dispatch
//! - `collection`: the observable collection, mutation records, batching and
//!   index projection
//! - `sink`: the consumer side, mapping notifications onto view calls
//! - `config`: consumer settings
//! - `error`: error types shared by the rest
//!
//! Everything is single-threaded: targets and observers live on one thread
//! and are shared through `Rc`.
//!
//! # Example
//!
//! ```rust,ignore
//! use rebind_core::collection::ObservableVec;
//! use rebind_core::sink::CollectionViewDataSource;
//! use rebind_core::config::SinkConfig;
//!
//! let rows = ObservableVec::from_vec(vec!["inbox", "drafts"]);
//! let source = CollectionViewDataSource::new(view, rows.clone(), SinkConfig::default(), |_, _| "cell".into());
//!
//! // One begin/end update group on the view, one delete, one insert.
//! rows.batch_updates(|rows| {
//!     rows.remove(0)?;
//!     rows.push("sent")
//! })??;
//! ```

pub mod collection;
pub mod config;
pub mod error;
pub mod observe;
pub mod sink;

pub use collection::{
    ChangeSet, CollectionEvent, CollectionObserver, IndexSet, Move, MutationKind, MutationRecord, ObservableVec,
    ReadOnlyVec,
};
pub use config::SinkConfig;
pub use error::{ApplyError, CallbackError, CallbackFailure, CallbackResult, Error, Result};
pub use observe::{ObjectEvent, ObjectKey, Observed, TargetId, UpdateSource};
pub use sink::{CollectionView, CollectionViewDataSource, PresentedRows};
