//! Observation Registry
//!
//! This module implements the registry and dispatch engine shared by every
//! observable target in the crate.
//!
//! # Concepts
//!
//! ## Subscription Table
//!
//! Each target owns a [`SubscriptionTable`] mapping a key (a property, or a
//! sentinel such as "any index") to the observers interested in it, in
//! registration order. Subscribing the same observer twice under one key
//! replaces the earlier callback.
//!
//! ## Lifecycle
//!
//! Observers are held weakly ([`ObserverRef`]). The table belongs to the
//! target, so when the target goes away its subscriptions go with it; when an
//! observer goes away its entries are skipped at dispatch and reclaimed on the
//! next lookup. No explicit unsubscribe is needed for correctness.
//!
//! ## Dispatch
//!
//! [`notify`] walks a snapshot of the table and isolates failing callbacks.
//! [`Dispatcher`] adds per-target deferral: notifications raised while the
//! target is already dispatching wait for the current walk to complete.
//!
//! # Threading
//!
//! Everything here is single-threaded (`Rc`, `RefCell`, thread-local frame
//! stack). Reentrancy, not contention, is the hazard being handled.

mod dispatch;
mod frame;
mod lifecycle;
mod object;
mod table;

pub use dispatch::{notify, Dispatcher};
pub use frame::DispatchFrame;
pub use lifecycle::{ObserverKey, ObserverRef, TargetId};
pub use object::{ObjectEvent, ObjectKey, Observed, PropertyKey, UpdateSource};
pub use table::{Subscription, SubscriptionTable};
