#![forbid(unsafe_code)]

//! Slot identity keys.
//!
//! A [`SlotKey`] names one (callable, receiver) binding so that a later
//! `disconnect` — or an automatic detach when either side is destroyed —
//! can find exactly the entry that `connect` created. Keys are plain
//! values: `Copy`, comparable, hashable, and immutable once built.

use std::any::TypeId;
use std::sync::Arc;

/// Receiver slot of a key when the callable is not bound to an instance.
const NO_RECEIVER: usize = 0;

/// Identity of the callable half of a binding.
///
/// Free functions and methods are identified by their code address; generic
/// callables (closures, function objects) by their `TypeId`, since a closure
/// value has no stable address we could take safely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallableId {
    /// Function or method address.
    Address(usize),
    /// Concrete type of a generic callable.
    Type(TypeId),
}

/// Identity of one subscription: which callable, bound to which receiver.
///
/// Two bindings with equal keys are the same subscription. The receiver
/// half is the receiver's allocation address, or a sentinel for free
/// functions, so the same method connected on two different instances
/// yields two distinct keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotKey {
    callable: CallableId,
    receiver: usize,
}

impl SlotKey {
    /// Key for a free function (or capture-less closure coerced to one).
    #[must_use]
    pub fn of_fn<A: 'static, R: 'static>(f: fn(&A) -> R) -> Self {
        Self {
            callable: CallableId::Address(f as usize),
            receiver: NO_RECEIVER,
        }
    }

    /// Key for a method bound to a shared receiver instance.
    #[must_use]
    pub fn of_method<T, A: 'static, R: 'static>(receiver: &Arc<T>, method: fn(&T, &A) -> R) -> Self {
        Self {
            callable: CallableId::Address(method as usize),
            receiver: Arc::as_ptr(receiver) as usize,
        }
    }

    /// Key for a generic callable of type `F` bound to a shared receiver.
    #[must_use]
    pub fn of_closure<F: 'static, T>(receiver: &Arc<T>) -> Self {
        Self {
            callable: CallableId::Type(TypeId::of::<F>()),
            receiver: Arc::as_ptr(receiver) as usize,
        }
    }

    /// The callable half of this key.
    #[must_use]
    pub fn callable(&self) -> CallableId {
        self.callable
    }

    /// Whether this binding references a receiver instance.
    #[must_use]
    pub fn has_receiver(&self) -> bool {
        self.receiver != NO_RECEIVER
    }
}
