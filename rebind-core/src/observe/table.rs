//! Subscription Table
//!
//! Per-target registry mapping a key to the observers interested in it.
//!
//! # Ordering
//!
//! Entries live in an `IndexMap` keyed by `(observer, key)`, so iteration order
//! is registration order. Re-subscribing the same observer under the same key
//! replaces the callback in place; it keeps its original position and is never
//! duplicated.
//!
//! # Reentrancy
//!
//! [`SubscriptionTable::lookup`] returns a snapshot. Callers iterate the
//! snapshot, never the live table, so a callback may subscribe or unsubscribe
//! (itself or anyone else) without invalidating the walk in progress.

use std::cell::RefCell;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use indexmap::IndexMap;

use super::lifecycle::{ObserverKey, ObserverRef};

/// One registered (observer, key, callback) triple.
pub struct Subscription<K, C: ?Sized> {
    observer: ObserverRef,
    key: K,
    callback: Rc<C>,
}

impl<K, C: ?Sized> Subscription<K, C> {
    pub fn observer(&self) -> &ObserverRef {
        &self.observer
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn callback(&self) -> &Rc<C> {
        &self.callback
    }
}

impl<K: Clone, C: ?Sized> Clone for Subscription<K, C> {
    fn clone(&self) -> Self {
        Self {
            observer: self.observer.clone(),
            key: self.key.clone(),
            callback: Rc::clone(&self.callback),
        }
    }
}

impl<K: fmt::Debug, C: ?Sized> fmt::Debug for Subscription<K, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("observer", &self.observer)
            .field("key", &self.key)
            .finish()
    }
}

/// Registry of subscriptions for a single observed target.
///
/// `K` is the key type (a property name or a sentinel) and `C` the callback
/// type, usually an unsized `dyn Fn(..)`.
pub struct SubscriptionTable<K, C: ?Sized> {
    entries: RefCell<IndexMap<(ObserverKey, K), Subscription<K, C>>>,
}

impl<K, C> SubscriptionTable<K, C>
where
    K: Clone + Eq + Hash,
    C: ?Sized,
{
    pub fn new() -> Self {
        Self {
            entries: RefCell::new(IndexMap::new()),
        }
    }

    /// Register `callback` for `observer` under `key`, replacing any existing
    /// callback for the same pair.
    pub fn subscribe(&self, observer: ObserverRef, key: K, callback: Rc<C>) {
        let slot = (observer.key(), key.clone());
        let subscription = Subscription {
            observer,
            key,
            callback,
        };
        let replaced = self
            .entries
            .borrow_mut()
            .insert(slot, subscription)
            .is_some();
        tracing::trace!(replaced, "subscription registered");
    }

    /// Remove the subscription for `observer` under `key`, or every
    /// subscription of `observer` when `key` is `None`.
    ///
    /// Returns the number of entries removed.
    pub fn unsubscribe(&self, observer: ObserverKey, key: Option<&K>) -> usize {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        match key {
            Some(key) => {
                entries.shift_remove(&(observer, key.clone()));
            }
            None => entries.retain(|(owner, _), _| *owner != observer),
        }
        before - entries.len()
    }

    /// Snapshot of the live subscriptions for `key`, in registration order.
    ///
    /// Entries whose observer has been destroyed are dropped from the table
    /// before the snapshot is taken.
    pub fn lookup(&self, key: &K) -> Vec<Subscription<K, C>> {
        self.purge_expired();
        self.entries
            .borrow()
            .values()
            .filter(|sub| sub.key == *key)
            .cloned()
            .collect()
    }

    /// Whether `observer` is subscribed under `key`.
    pub fn contains(&self, observer: ObserverKey, key: &K) -> bool {
        self.entries
            .borrow()
            .get(&(observer, key.clone()))
            .is_some_and(|sub| sub.observer.is_alive())
    }

    /// Number of live subscriptions under `key`.
    pub fn count(&self, key: &K) -> usize {
        self.entries
            .borrow()
            .values()
            .filter(|sub| sub.key == *key && sub.observer.is_alive())
            .count()
    }

    /// Number of live subscriptions across every key.
    pub fn len(&self) -> usize {
        self.entries
            .borrow()
            .values()
            .filter(|sub| sub.observer.is_alive())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry whose observer no longer exists.
    ///
    /// Returns the number of entries reclaimed.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|_, sub| sub.observer.is_alive());
        let purged = before - entries.len();
        if purged > 0 {
            tracing::trace!(purged, "reclaimed subscriptions of destroyed observers");
        }
        purged
    }

    /// Remove everything.
    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

impl<K, C> Default for SubscriptionTable<K, C>
where
    K: Clone + Eq + Hash,
    C: ?Sized,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, C: ?Sized> fmt::Debug for SubscriptionTable<K, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionTable")
            .field("entries", &self.entries.borrow().len())
            .finish()
    }
}
