//! Identity and liveness for the two sides of a subscription.
//!
//! Targets are identified by a [`TargetId`] handed out when they are created.
//! Observers are identified by the address of their `Rc` allocation and held
//! only through a `Weak`, so subscribing never extends an observer's lifetime.
//! Every lookup checks liveness before handing out a callback; entries whose
//! observer has gone away are skipped and reclaimed.

use std::any::Any;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for an observed target.
///
/// Every observable collection and every embedded [`Observed`](super::Observed)
/// gets one on creation. Clones of a handle share the id, so lookups are by
/// identity rather than by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    /// Generate a new unique target ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for TargetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "target#{}", self.0)
    }
}

/// Identity of an observer.
///
/// Derived from the observer's allocation address. The address stays reserved
/// as long as the registry holds a `Weak` to it, so two live observers can
/// never share a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverKey(usize);

impl ObserverKey {
    /// Key for the observer behind `observer`.
    pub fn of<O: ?Sized>(observer: &Rc<O>) -> Self {
        Self(Rc::as_ptr(observer) as *const () as usize)
    }
}

impl fmt::Display for ObserverKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer@{:#x}", self.0)
    }
}

/// A weak reference to an observer plus its identity.
#[derive(Clone)]
pub struct ObserverRef {
    key: ObserverKey,
    observer: Weak<dyn Any>,
}

impl ObserverRef {
    /// Capture a weak reference to `observer`.
    pub fn new<O: Any>(observer: &Rc<O>) -> Self {
        let weak: Weak<O> = Rc::downgrade(observer);
        Self {
            key: ObserverKey::of(observer),
            observer: weak,
        }
    }

    pub fn key(&self) -> ObserverKey {
        self.key
    }

    /// Whether the observer is still alive.
    pub fn is_alive(&self) -> bool {
        self.observer.strong_count() > 0
    }

    /// Upgrade to a strong reference for the duration of one callback.
    pub fn upgrade(&self) -> Option<Rc<dyn Any>> {
        self.observer.upgrade()
    }
}

impl fmt::Debug for ObserverRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRef")
            .field("key", &self.key)
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_ids_are_unique() {
        let id1 = TargetId::new();
        let id2 = TargetId::new();
        let id3 = TargetId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn observer_key_follows_allocation() {
        let a = Rc::new(1u8);
        let a2 = a.clone();
        let b = Rc::new(1u8);

        assert_eq!(ObserverKey::of(&a), ObserverKey::of(&a2));
        assert_ne!(ObserverKey::of(&a), ObserverKey::of(&b));
    }

    #[test]
    fn observer_ref_does_not_keep_observer_alive() {
        let observer = Rc::new(String::from("watcher"));
        let weak = ObserverRef::new(&observer);

        assert!(weak.is_alive());
        assert!(weak.upgrade().is_some());

        drop(observer);

        assert!(!weak.is_alive());
        assert!(weak.upgrade().is_none());
    }
}
