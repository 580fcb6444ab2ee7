//! Error types.
//!
//! Two kinds of failure reach callers: contract violations on a mutator
//! (an index past the end, or a reentrant call that needs an answer now)
//! and observer callbacks that returned an error.
//! Callback failures never stop delivery; they are collected and returned
//! once every callback for the operation has run.

use std::error::Error as StdError;

use thiserror::Error;

use crate::observe::{ObserverKey, TargetId};

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// What an observer callback returns.
pub type CallbackResult = std::result::Result<(), CallbackError>;

/// Errors surfaced by observable targets.
#[derive(Debug, Error)]
pub enum Error {
    /// A mutator was handed an index outside the collection.
    ///
    /// The collection is left untouched.
    #[error("index {index} out of bounds for collection of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// A bulk insert was given a different number of indices and elements.
    #[error("{indexes} indices given for {elements} elements")]
    LengthMismatch { indexes: usize, elements: usize },

    /// A mutator that hands back elements was called from inside a
    /// notification of the same collection. Mutations made there are queued,
    /// so there is nothing to hand back yet.
    #[error("{operation} cannot run while the collection is notifying its observers")]
    ReentrantMutation { operation: &'static str },

    /// One or more callbacks failed while delivering a notification.
    ///
    /// The mutation that triggered delivery has already been applied.
    #[error("{} observer callback(s) failed", .0.len())]
    CallbackFailures(Vec<CallbackFailure>),
}

impl Error {
    /// The callback failures carried by this error, if any.
    pub fn callback_failures(&self) -> &[CallbackFailure] {
        match self {
            Error::CallbackFailures(failures) => failures,
            _ => &[],
        }
    }
}

/// Combine two outcomes, concatenating callback failures.
///
/// Any other error wins over callback failures.
pub(crate) fn merge(first: Result<()>, second: Result<()>) -> Result<()> {
    match (first, second) {
        (Ok(()), other) | (other, Ok(())) => other,
        (Err(Error::CallbackFailures(mut a)), Err(Error::CallbackFailures(b))) => {
            a.extend(b);
            Err(Error::CallbackFailures(a))
        }
        (Err(Error::CallbackFailures(_)), Err(other)) | (Err(other), Err(_)) => Err(other),
    }
}

/// A change set that cannot be applied to a set of presented rows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    /// An index lies past the rows it refers to.
    #[error("index {index} out of range for {len} rows")]
    IndexOutOfRange { index: usize, len: usize },

    /// An index is both removed and moved, or both inserted and a move target.
    #[error("index {index} is used by more than one change")]
    Overlap { index: usize },

    /// Applying the changes left a different number of rows than expected.
    #[error("applying the changes left {actual} rows, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Error returned by an observer callback.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct CallbackError(Box<dyn StdError + Send + Sync>);

impl CallbackError {
    /// Wrap a message or any error type.
    pub fn new(error: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self(error.into())
    }
}

/// A single failed callback, recorded during dispatch.
#[derive(Debug, Error)]
#[error("{observer} failed while observing {target}: {error}")]
pub struct CallbackFailure {
    pub target: TargetId,
    pub observer: ObserverKey,
    #[source]
    pub error: CallbackError,
}
