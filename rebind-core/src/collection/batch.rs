//! Batch Coordinator
//!
//! Buffers captured mutations while a batch is open so observers receive one
//! aggregate notification instead of one per mutation.
//!
//! # State Machine
//!
//! ```text
//! Closed --open--> Open(1) --open--> Open(n) --close--> Open(n-1)
//! Open(1) --close--> Closing --finish--> Closed     (flush)
//! Open(1) --close--> Closed                        (nothing captured, not forced)
//! ```
//!
//! Only the outermost open/close pair is visible to observers. Closing a
//! window that is not open is a no-op.

use std::mem;

use super::projection::CapturedMutation;

/// Where a [`BatchWindow`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Closed,
    Open { depth: usize },
    /// The outermost close is delivering the aggregate notification.
    Closing,
}

/// Result of [`BatchWindow::close`].
#[derive(Debug)]
pub enum CloseOutcome<T> {
    /// There was no open batch.
    Unbalanced,
    /// An inner close; the batch stays open at `depth`.
    StillOpen { depth: usize },
    /// Nothing was captured and the close was not forced: stay silent.
    Suppressed,
    /// The outermost close: project and deliver `pending`, then call
    /// [`BatchWindow::finish`].
    Flush {
        base_len: usize,
        pending: Vec<CapturedMutation<T>>,
        forced: bool,
    },
}

/// One target's batch window.
#[derive(Debug)]
pub struct BatchWindow<T> {
    state: BatchState,
    base_len: usize,
    pending: Vec<CapturedMutation<T>>,
}

impl<T> BatchWindow<T> {
    pub fn new() -> Self {
        Self {
            state: BatchState::Closed,
            base_len: 0,
            pending: Vec::new(),
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Current nesting depth; zero unless open.
    pub fn depth(&self) -> usize {
        match self.state {
            BatchState::Open { depth } => depth,
            BatchState::Closed | BatchState::Closing => 0,
        }
    }

    /// Whether mutations are currently being buffered.
    pub fn is_open(&self) -> bool {
        matches!(self.state, BatchState::Open { .. })
    }

    /// Number of mutations buffered so far.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Open (or nest) the batch. `len` is the collection length right now.
    ///
    /// Returns `true` on the outermost open, when observers should hear
    /// `will begin batch updates`.
    pub fn open(&mut self, len: usize) -> bool {
        match self.state {
            BatchState::Open { depth } => {
                self.state = BatchState::Open { depth: depth + 1 };
                false
            }
            BatchState::Closed | BatchState::Closing => {
                self.state = BatchState::Open { depth: 1 };
                self.base_len = len;
                self.pending.clear();
                true
            }
        }
    }

    /// Buffer `mutation` if the batch is open, otherwise hand it back for
    /// immediate delivery.
    pub fn capture(&mut self, mutation: CapturedMutation<T>) -> Option<CapturedMutation<T>> {
        if self.is_open() {
            self.pending.push(mutation);
            None
        } else {
            Some(mutation)
        }
    }

    /// Close one level. Only the `force` flag of the outermost close counts.
    pub fn close(&mut self, force: bool) -> CloseOutcome<T> {
        match self.state {
            BatchState::Closed | BatchState::Closing => CloseOutcome::Unbalanced,
            BatchState::Open { depth } if depth > 1 => {
                self.state = BatchState::Open { depth: depth - 1 };
                CloseOutcome::StillOpen { depth: depth - 1 }
            }
            BatchState::Open { .. } => {
                if self.pending.is_empty() && !force {
                    self.state = BatchState::Closed;
                    return CloseOutcome::Suppressed;
                }
                self.state = BatchState::Closing;
                CloseOutcome::Flush {
                    base_len: self.base_len,
                    pending: mem::take(&mut self.pending),
                    forced: force,
                }
            }
        }
    }

    /// Leave `Closing` once the aggregate notification has been delivered.
    ///
    /// A batch reopened by an observer during delivery is left alone.
    pub fn finish(&mut self) {
        if self.state == BatchState::Closing {
            self.state = BatchState::Closed;
        }
    }
}

impl<T> Default for BatchWindow<T> {
    fn default() -> Self {
        Self::new()
    }
}
