//! Dispatcher
//!
//! Delivers one notification to every subscriber of a key, synchronously and
//! in registration order.
//!
//! # How Dispatch Works
//!
//! 1. The caller takes a snapshot from the [`SubscriptionTable`].
//!
//! 2. For each entry the observer is upgraded right before its callback runs.
//!    An observer destroyed earlier in the same walk is skipped.
//!
//! 3. A failing callback is logged and recorded; the walk continues.
//!
//! # Nested Notifications
//!
//! A callback may mutate the target it is observing. [`Dispatcher::emit`]
//! notices the target is already inside a [`DispatchFrame`] and queues the new
//! notification. The queue is drained, in order, once the current walk
//! finishes, so no subscriber sees a notification interleaved with another.
//!
//! [`SubscriptionTable`]: super::SubscriptionTable

use std::any::Any;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;

use super::frame::DispatchFrame;
use super::lifecycle::TargetId;
use super::table::Subscription;
use crate::error::{CallbackFailure, CallbackResult, Error, Result};

/// Invoke each subscription in `snapshot` with `invoke`.
///
/// Returns the failures in the order they occurred.
pub fn notify<K, C: ?Sized>(
    target: TargetId,
    snapshot: &[Subscription<K, C>],
    mut invoke: impl FnMut(&dyn Any, &C) -> CallbackResult,
) -> Vec<CallbackFailure> {
    let mut failures = Vec::new();

    for subscription in snapshot {
        let observer = subscription.observer();
        let Some(strong) = observer.upgrade() else {
            tracing::trace!(%target, observer = %observer.key(), "skipping destroyed observer");
            continue;
        };

        if let Err(error) = invoke(&*strong, subscription.callback().as_ref()) {
            tracing::warn!(%target, observer = %observer.key(), %error, "observer callback failed");
            failures.push(CallbackFailure {
                target,
                observer: observer.key(),
                error,
            });
        }
    }

    failures
}

/// Per-target notification queue.
///
/// Owns the deferral queue for notifications raised while the target is
/// already dispatching.
pub struct Dispatcher<E> {
    target: TargetId,
    deferred: RefCell<VecDeque<E>>,
}

impl<E> Dispatcher<E> {
    pub fn new(target: TargetId) -> Self {
        Self {
            target,
            deferred: RefCell::new(VecDeque::new()),
        }
    }

    pub fn target(&self) -> TargetId {
        self.target
    }

    /// Whether this target is delivering a notification right now.
    pub fn is_dispatching(&self) -> bool {
        DispatchFrame::is_active(self.target)
    }

    /// Number of notifications waiting for the current frame to finish.
    pub fn pending(&self) -> usize {
        self.deferred.borrow().len()
    }

    /// Deliver `event` through `deliver`, or queue it if this target is
    /// already dispatching.
    ///
    /// The outermost call drains the queue before returning and reports every
    /// failure seen along the way, including those of queued notifications.
    pub fn emit(
        &self,
        event: E,
        mut deliver: impl FnMut(&E) -> Vec<CallbackFailure>,
    ) -> Result<()> {
        if self.is_dispatching() {
            self.deferred.borrow_mut().push_back(event);
            tracing::trace!(target = %self.target, "deferred nested notification");
            return Ok(());
        }

        let mut failures = {
            let _frame = DispatchFrame::enter(self.target);
            deliver(&event)
        };

        loop {
            let next = self.deferred.borrow_mut().pop_front();
            let Some(event) = next else {
                break;
            };
            let _frame = DispatchFrame::enter(self.target);
            failures.extend(deliver(&event));
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::CallbackFailures(failures))
        }
    }
}

impl<E> fmt::Debug for Dispatcher<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("target", &self.target)
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CallbackError;
    use crate::observe::{ObserverRef, SubscriptionTable};
    use std::cell::Cell;
    use std::rc::Rc;

    type Callback = dyn Fn(&Cell<Vec<u32>>) -> CallbackResult;

    fn push(value: u32) -> Rc<Callback> {
        Rc::new(move |log: &Cell<Vec<u32>>| {
            let mut seen = log.take();
            seen.push(value);
            log.set(seen);
            Ok(())
        })
    }

    #[test]
    fn notify_runs_in_registration_order() {
        let table: SubscriptionTable<(), Callback> = SubscriptionTable::new();
        let observers: Vec<Rc<()>> = (0..3).map(|_| Rc::new(())).collect();
        for (i, observer) in observers.iter().enumerate() {
            table.subscribe(ObserverRef::new(observer), (), push(i as u32));
        }

        let log = Cell::new(Vec::new());
        let failures = notify(TargetId::new(), &table.lookup(&()), |_, cb| cb(&log));

        assert!(failures.is_empty());
        assert_eq!(log.take(), vec![0, 1, 2]);
    }

    #[test]
    fn failing_callback_does_not_stop_the_rest() {
        let table: SubscriptionTable<(), Callback> = SubscriptionTable::new();
        let first = Rc::new(());
        let broken = Rc::new(());
        let last = Rc::new(());

        table.subscribe(ObserverRef::new(&first), (), push(1));
        table.subscribe(
            ObserverRef::new(&broken),
            (),
            Rc::new(|_: &Cell<Vec<u32>>| Err(CallbackError::new("broken"))),
        );
        table.subscribe(ObserverRef::new(&last), (), push(3));

        let log = Cell::new(Vec::new());
        let failures = notify(TargetId::new(), &table.lookup(&()), |_, cb| cb(&log));

        assert_eq!(log.take(), vec![1, 3]);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].observer, crate::observe::ObserverKey::of(&broken));
    }

    #[test]
    fn observer_destroyed_mid_walk_is_skipped() {
        let table: SubscriptionTable<(), Callback> = SubscriptionTable::new();
        let first = Rc::new(());
        let second = Rc::new(());

        table.subscribe(ObserverRef::new(&first), (), push(1));
        table.subscribe(ObserverRef::new(&second), (), push(2));

        let snapshot = table.lookup(&());
        drop(second);

        let log = Cell::new(Vec::new());
        notify(TargetId::new(), &snapshot, |_, cb| cb(&log));
        assert_eq!(log.take(), vec![1]);
    }

    #[test]
    fn emit_defers_nested_events_until_frame_completes() {
        let dispatcher: Rc<Dispatcher<u32>> = Rc::new(Dispatcher::new(TargetId::new()));
        let order = Rc::new(RefCell::new(Vec::new()));

        let inner = Rc::clone(&dispatcher);
        let log = Rc::clone(&order);
        let deliver = move |event: &u32| {
            log.borrow_mut().push(format!("start {event}"));
            if *event == 1 {
                // Raised mid-walk: must wait for event 1 to finish.
                inner.emit(2, |_| Vec::new()).unwrap();
                assert_eq!(inner.pending(), 1);
            }
            log.borrow_mut().push(format!("end {event}"));
            Vec::new()
        };

        dispatcher.emit(1, deliver).unwrap();

        assert_eq!(
            *order.borrow(),
            vec!["start 1", "end 1", "start 2", "end 2"]
        );
        assert_eq!(dispatcher.pending(), 0);
        assert!(!dispatcher.is_dispatching());
    }

    #[test]
    fn emit_aggregates_failures() {
        let dispatcher: Dispatcher<()> = Dispatcher::new(TargetId::new());
        let observer = Rc::new(());
        let err = dispatcher
            .emit((), |_| {
                vec![CallbackFailure {
                    target: dispatcher.target(),
                    observer: crate::observe::ObserverKey::of(&observer),
                    error: CallbackError::new("nope"),
                }]
            })
            .unwrap_err();

        assert_eq!(err.callback_failures().len(), 1);
    }
}
