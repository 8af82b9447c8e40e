#![forbid(unsafe_code)]

//! Type-erased callable bindings.
//!
//! A [`Slot`] wraps one connectable callable — a free function, a method
//! bound to a shared receiver, or a generic callable bound to a receiver —
//! behind the policy's uniform erased representation, together with the
//! [`SlotKey`] identifying the binding and, for tracked receivers, a handle
//! to the receiver's lifetime tracker.
//!
//! Receivers are captured as `Weak` references: a slot never extends its
//! receiver's lifetime, and invoking a slot whose receiver has been
//! destroyed yields `None` instead of touching freed state.

use std::sync::{Arc, Weak};

use crate::key::SlotKey;
use crate::policy::{LockPolicy, SingleThread, ThreadSafe};
use crate::tracker::{EdgeCell, SlotTracker, Tracked};

/// Conversion of a receiver-bound callable into a policy's erased form.
///
/// Implemented for every `Fn(&T, &A) -> R` with the extra marker bounds
/// each policy needs (`Send + Sync` for [`ThreadSafe`], nothing further
/// for [`SingleThread`]). Blanket implementations cover plain methods and
/// closures alike; implementing it by hand is possible but rarely useful.
pub trait BoundSlot<P: LockPolicy, T, A, R>: Sized {
    /// Erase `self`, binding it to `receiver`.
    fn into_erased(self, receiver: Weak<T>) -> P::Erased<A, R>;
}

impl<T, A, R, F> BoundSlot<SingleThread, T, A, R> for F
where
    T: 'static,
    A: 'static,
    R: 'static,
    F: Fn(&T, &A) -> R + 'static,
{
    fn into_erased(self, receiver: Weak<T>) -> <SingleThread as LockPolicy>::Erased<A, R> {
        std::rc::Rc::new(move |args: &A| receiver.upgrade().map(|t| (self)(&t, args)))
    }
}

impl<T, A, R, F> BoundSlot<ThreadSafe, T, A, R> for F
where
    T: Send + Sync + 'static,
    A: 'static,
    R: 'static,
    F: Fn(&T, &A) -> R + Send + Sync + 'static,
{
    fn into_erased(self, receiver: Weak<T>) -> <ThreadSafe as LockPolicy>::Erased<A, R> {
        Arc::new(move |args: &A| receiver.upgrade().map(|t| (self)(&t, args)))
    }
}

/// One type-erased callable binding, ready to connect to a
/// [`Signal`](crate::Signal) with matching argument and return types.
pub struct Slot<A: 'static, R: 'static = (), P: LockPolicy = SingleThread> {
    pub(crate) key: SlotKey,
    pub(crate) call: P::Erased<A, R>,
    pub(crate) edges: Option<Arc<EdgeCell<P>>>,
}

impl<A: 'static, R: 'static, P: LockPolicy> Slot<A, R, P> {
    /// Bind a free function (or capture-less closure).
    #[must_use]
    pub fn from_fn(f: fn(&A) -> R) -> Self {
        Self {
            key: SlotKey::of_fn(f),
            call: P::erase_fn(f),
            edges: None,
        }
    }

    /// Bind a method to a shared receiver instance.
    ///
    /// If the receiver exposes a tracker, connecting this slot also records
    /// the reciprocal edge for automatic disconnection.
    #[must_use]
    pub fn from_method<T>(receiver: &Arc<T>, method: fn(&T, &A) -> R) -> Self
    where
        T: Tracked<P>,
        fn(&T, &A) -> R: BoundSlot<P, T, A, R>,
    {
        Self {
            key: SlotKey::of_method(receiver, method),
            call: method.into_erased(Arc::downgrade(receiver)),
            edges: receiver.tracker().map(SlotTracker::share),
        }
    }

    /// Bind a generic callable to a shared receiver instance.
    ///
    /// Identity comes from the callable's type, so the binding cannot be
    /// re-derived later from a different closure; keep the [`SlotKey`]
    /// returned by connect if you need targeted disconnection.
    #[must_use]
    pub fn from_closure<T, F>(receiver: &Arc<T>, f: F) -> Self
    where
        T: Tracked<P>,
        F: BoundSlot<P, T, A, R> + 'static,
    {
        Self {
            key: SlotKey::of_closure::<F, T>(receiver),
            call: f.into_erased(Arc::downgrade(receiver)),
            edges: receiver.tracker().map(SlotTracker::share),
        }
    }

    /// Identity of this binding.
    #[must_use]
    pub fn key(&self) -> SlotKey {
        self.key
    }

    /// Invoke the underlying callable.
    ///
    /// Returns `None` when the bound receiver has already been destroyed.
    pub fn invoke(&self, args: &A) -> Option<R> {
        P::invoke(&self.call, args)
    }
}
