//! Property Observation
//!
//! [`Observed`] is embedded in a model struct and gives it a subscription
//! table keyed by an enumerated property type. The model calls
//! [`Observed::did_set`] (or wraps the write in [`Observed::change`]) at each
//! setter; there is no runtime interception.
//!
//! # Update Notifications
//!
//! Besides per-property subscriptions there is one sentinel key,
//! [`ObjectKey::Update`]. A model registers the properties that count as "the
//! object changed" with [`Observed::register_for_updates`]; setting any of
//! them, or calling [`Observed::send_update_notification`], notifies the
//! `Update` subscribers. Collections holding the object use this to report
//! update records for its index.
//!
//! # Example
//!
//! ```rust,ignore
//! #[derive(Clone, PartialEq, Eq, Hash, Debug)]
//! enum Field { Name, Age }
//!
//! struct Person { name: RefCell<String>, observed: Observed<Field> }
//!
//! impl Person {
//!     fn set_name(&self, name: &str) -> Result<()> {
//!         self.observed.change(Field::Name, || *self.name.borrow_mut() = name.into())
//!     }
//! }
//! ```

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use indexmap::IndexSet as KeySet;

use super::dispatch::{notify, Dispatcher};
use super::lifecycle::{ObserverKey, ObserverRef, TargetId};
use super::table::SubscriptionTable;
use crate::error::{CallbackFailure, CallbackResult, Result};

/// Bound for property identifiers.
pub trait PropertyKey: Clone + Eq + Hash + fmt::Debug + 'static {}

impl<T> PropertyKey for T where T: Clone + Eq + Hash + fmt::Debug + 'static {}

/// What a subscription on an [`Observed`] listens to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ObjectKey<P> {
    /// A single named property.
    Property(P),
    /// The "object updated" sentinel.
    Update,
}

/// Notification delivered to property observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectEvent<P> {
    /// The property is about to change.
    WillChange(P),
    /// The property changed.
    DidChange(P),
    /// The object as a whole should be considered updated.
    Updated,
}

/// Queued form of a notification; one `Did` fans out to the property and,
/// when registered, to the update sentinel.
#[derive(Debug)]
enum Notice<P> {
    Will(P),
    Did { key: P, update: bool },
    Update,
}

type ObjectCallback<P> = dyn Fn(&dyn Any, &ObjectEvent<P>) -> CallbackResult;

/// Observation state embedded in a model object.
pub struct Observed<P: PropertyKey> {
    table: SubscriptionTable<ObjectKey<P>, ObjectCallback<P>>,
    update_keys: RefCell<KeySet<P>>,
    dispatcher: Dispatcher<Notice<P>>,
}

impl<P: PropertyKey> Observed<P> {
    pub fn new() -> Self {
        Self {
            table: SubscriptionTable::new(),
            update_keys: RefCell::new(KeySet::new()),
            dispatcher: Dispatcher::new(TargetId::new()),
        }
    }

    /// Identity of this target.
    pub fn id(&self) -> TargetId {
        self.dispatcher.target()
    }

    /// Subscribe `observer` to `key`. The observer is held weakly; the
    /// callback receives it back as `&O`.
    pub fn add_observer<O, F>(&self, observer: &Rc<O>, key: ObjectKey<P>, callback: F)
    where
        O: Any,
        F: Fn(&O, &ObjectEvent<P>) -> CallbackResult + 'static,
    {
        let callback: Rc<ObjectCallback<P>> =
            Rc::new(move |observer: &dyn Any, event: &ObjectEvent<P>| {
                match observer.downcast_ref::<O>() {
                    Some(observer) => callback(observer, event),
                    None => Ok(()),
                }
            });
        self.table.subscribe(ObserverRef::new(observer), key, callback);
    }

    /// Remove `observer`'s subscription to `key`, or all of its subscriptions
    /// when `key` is `None`. Returns how many were removed.
    pub fn remove_observer<O: ?Sized>(&self, observer: &Rc<O>, key: Option<&ObjectKey<P>>) -> usize {
        self.table.unsubscribe(ObserverKey::of(observer), key)
    }

    /// Live observers subscribed to `key`.
    pub fn observer_count(&self, key: &ObjectKey<P>) -> usize {
        self.table.count(key)
    }

    /// Announce that `key` is about to change.
    ///
    /// Skipped when raised from inside one of this object's own callbacks;
    /// by the time a queued notice is delivered the write has happened.
    pub fn will_set(&self, key: P) -> Result<()> {
        if self.dispatcher.is_dispatching() {
            return Ok(());
        }
        self.emit(Notice::Will(key))
    }

    /// Announce that `key` changed.
    pub fn did_set(&self, key: P) -> Result<()> {
        let update = self.update_keys.borrow().contains(&key);
        self.emit(Notice::Did { key, update })
    }

    /// Run `apply` between `will_set` and `did_set` for `key`.
    ///
    /// `apply` always runs; failures from either phase are reported together.
    pub fn change<R>(&self, key: P, apply: impl FnOnce() -> R) -> Result<R> {
        let will = self.will_set(key.clone());
        let value = apply();
        let did = self.did_set(key);
        crate::error::merge(will, did)?;
        Ok(value)
    }

    /// Treat writes to any of `keys` as object updates.
    pub fn register_for_updates(&self, keys: impl IntoIterator<Item = P>) {
        self.update_keys.borrow_mut().extend(keys);
    }

    /// Stop treating writes to `keys` as object updates.
    pub fn unregister_for_updates(&self, keys: impl IntoIterator<Item = P>) {
        let mut registered = self.update_keys.borrow_mut();
        for key in keys {
            registered.shift_remove(&key);
        }
    }

    pub fn unregister_all_updates(&self) {
        self.update_keys.borrow_mut().clear();
    }

    pub fn is_registered_for_updates(&self, key: &P) -> bool {
        self.update_keys.borrow().contains(key)
    }

    /// Keys currently registered for updates, in registration order.
    pub fn update_keys(&self) -> Vec<P> {
        self.update_keys.borrow().iter().cloned().collect()
    }

    /// Notify `Update` subscribers without any property having changed.
    ///
    /// Used for derived values the model cannot attribute to one setter.
    pub fn send_update_notification(&self) -> Result<()> {
        self.emit(Notice::Update)
    }

    fn emit(&self, notice: Notice<P>) -> Result<()> {
        let target = self.id();
        self.dispatcher.emit(notice, |notice| match notice {
            Notice::Will(key) => self.deliver(
                target,
                &ObjectKey::Property(key.clone()),
                &ObjectEvent::WillChange(key.clone()),
            ),
            Notice::Did { key, update } => {
                let mut failures = self.deliver(
                    target,
                    &ObjectKey::Property(key.clone()),
                    &ObjectEvent::DidChange(key.clone()),
                );
                if *update {
                    failures.extend(self.deliver(target, &ObjectKey::Update, &ObjectEvent::Updated));
                }
                failures
            }
            Notice::Update => self.deliver(target, &ObjectKey::Update, &ObjectEvent::Updated),
        })
    }

    fn deliver(
        &self,
        target: TargetId,
        key: &ObjectKey<P>,
        event: &ObjectEvent<P>,
    ) -> Vec<CallbackFailure> {
        let snapshot = self.table.lookup(key);
        tracing::trace!(%target, ?event, observers = snapshot.len(), "dispatching property event");
        notify(target, &snapshot, |observer, callback| callback(observer, event))
    }
}

impl<P: PropertyKey> Default for Observed<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: PropertyKey> fmt::Debug for Observed<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observed")
            .field("id", &self.id())
            .field("observers", &self.table.len())
            .field("update_keys", &self.update_keys.borrow())
            .finish()
    }
}

/// A type that exposes an [`Observed`] so collections can follow its updates.
pub trait UpdateSource {
    type Key: PropertyKey;

    fn observed(&self) -> &Observed<Self::Key>;
}

impl<T: UpdateSource + ?Sized> UpdateSource for Rc<T> {
    type Key = T::Key;

    fn observed(&self) -> &Observed<Self::Key> {
        (**self).observed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CallbackError;
    use std::cell::Cell;

    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    enum Field {
        Name,
        Age,
    }

    #[derive(Default)]
    struct Recorder {
        events: RefCell<Vec<ObjectEvent<Field>>>,
    }

    impl Recorder {
        fn record(&self, event: &ObjectEvent<Field>) -> CallbackResult {
            self.events.borrow_mut().push(event.clone());
            Ok(())
        }
    }

    #[test]
    fn property_subscription_sees_only_its_key() {
        let observed = Observed::<Field>::new();
        let recorder = Rc::new(Recorder::default());
        observed.add_observer(&recorder, ObjectKey::Property(Field::Name), Recorder::record);

        observed.did_set(Field::Age).unwrap();
        observed.change(Field::Name, || ()).unwrap();

        assert_eq!(
            *recorder.events.borrow(),
            vec![
                ObjectEvent::WillChange(Field::Name),
                ObjectEvent::DidChange(Field::Name)
            ]
        );
    }

    #[test]
    fn registered_keys_post_updates() {
        let observed = Observed::<Field>::new();
        let recorder = Rc::new(Recorder::default());
        observed.add_observer(&recorder, ObjectKey::Update, Recorder::record);

        observed.did_set(Field::Name).unwrap();
        assert!(recorder.events.borrow().is_empty());

        observed.register_for_updates([Field::Name, Field::Age]);
        observed.did_set(Field::Name).unwrap();
        assert_eq!(*recorder.events.borrow(), vec![ObjectEvent::Updated]);

        observed.unregister_for_updates([Field::Name]);
        assert_eq!(observed.update_keys(), vec![Field::Age]);
        observed.did_set(Field::Name).unwrap();
        assert_eq!(recorder.events.borrow().len(), 1);

        observed.unregister_all_updates();
        assert!(!observed.is_registered_for_updates(&Field::Age));
    }

    #[test]
    fn manual_update_notification() {
        let observed = Observed::<Field>::new();
        let recorder = Rc::new(Recorder::default());
        observed.add_observer(&recorder, ObjectKey::Update, Recorder::record);

        observed.send_update_notification().unwrap();
        assert_eq!(*recorder.events.borrow(), vec![ObjectEvent::Updated]);
    }

    #[test]
    fn dropped_observer_is_not_called() {
        let observed = Observed::<Field>::new();
        let recorder = Rc::new(Recorder::default());
        observed.add_observer(&recorder, ObjectKey::Property(Field::Age), Recorder::record);
        assert_eq!(observed.observer_count(&ObjectKey::Property(Field::Age)), 1);

        drop(recorder);

        observed.did_set(Field::Age).unwrap();
        assert_eq!(observed.observer_count(&ObjectKey::Property(Field::Age)), 0);
    }

    #[test]
    fn remove_observer_by_key_or_entirely() {
        let observed = Observed::<Field>::new();
        let recorder = Rc::new(Recorder::default());
        observed.add_observer(&recorder, ObjectKey::Property(Field::Name), Recorder::record);
        observed.add_observer(&recorder, ObjectKey::Update, Recorder::record);

        assert_eq!(observed.remove_observer(&recorder, Some(&ObjectKey::Update)), 1);
        assert_eq!(observed.remove_observer(&recorder, None), 1);

        observed.did_set(Field::Name).unwrap();
        assert!(recorder.events.borrow().is_empty());
    }

    #[test]
    fn change_applies_even_when_callbacks_fail() {
        let observed = Observed::<Field>::new();
        let observer = Rc::new(());
        observed.add_observer(&observer, ObjectKey::Property(Field::Name), |_, _| {
            Err(CallbackError::new("rejected"))
        });

        let applied = Cell::new(false);
        let err = observed.change(Field::Name, || applied.set(true)).unwrap_err();

        assert!(applied.get());
        // One failure from the will phase, one from the did phase.
        assert_eq!(err.callback_failures().len(), 2);
    }
}
