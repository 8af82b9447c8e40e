#![forbid(unsafe_code)]

//! Synchronization policies.
//!
//! Every registry in this crate — a signal's slot list, a tracker's edge
//! list — is guarded by a policy chosen once, at the type level, when the
//! signal/tracker pair is instantiated:
//!
//! - [`SingleThread`]: no locking. All operations on a signal and its
//!   tracked receivers must stay on one logical thread.
//! - [`ThreadSafe`]: every registry access runs inside a mutex-guarded
//!   critical section. Slot invocation happens *outside* the lock (fire
//!   snapshots the registry first), so slow subscribers never serialize
//!   unrelated work and re-entrant connects cannot deadlock.
//!
//! The policy also fixes the erased-callable representation: `Rc` of a
//! plain `dyn Fn` for single-threaded use, `Arc` of a `Send + Sync` one for
//! shared use. Erased callables return `Option`: `None` means the bound
//! receiver has already been destroyed and the call was skipped.
//!
//! # Invariants
//!
//! 1. No policy operation holds more than one critical section at a time.
//! 2. `with` releases the critical section before its result is used.
//! 3. A poisoned mutex is recovered, not propagated: a panicking subscriber
//!    must not brick the channel for every other subscriber.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Mutex, PoisonError};

use crate::key::SlotKey;
use crate::signal::SignalCore;

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::SingleThread {}
    impl Sealed for super::ThreadSafe {}
}

/// Erased callable under [`SingleThread`].
pub type LocalSlot<A, R> = Rc<dyn Fn(&A) -> Option<R>>;

/// Erased callable under [`ThreadSafe`].
pub type SharedSlot<A, R> = Arc<dyn Fn(&A) -> Option<R> + Send + Sync>;

/// Strategy governing how signal and tracker registries are guarded and
/// how callables are erased. Chosen per instantiation, never at runtime.
///
/// Sealed: the two policies below are the complete set.
pub trait LockPolicy: sealed::Sealed + Sized + 'static {
    /// Interior-mutability cell guarding a registry.
    type Cell<T>;

    /// Type-erased callable representation: invoke-with-args, return
    /// `Some(result)`, or `None` when the receiver is gone.
    type Erased<A: 'static, R: 'static>: Clone;

    /// Wrap a fresh registry value in this policy's cell.
    fn cell<T>(value: T) -> Self::Cell<T>;

    /// Run `f` with exclusive access to the cell's contents.
    ///
    /// The critical section covers exactly the duration of `f`.
    fn with<T, U>(cell: &Self::Cell<T>, f: impl FnOnce(&mut T) -> U) -> U;

    /// Erase a free function.
    fn erase_fn<A: 'static, R: 'static>(f: fn(&A) -> R) -> Self::Erased<A, R>;

    /// Invoke an erased callable.
    fn invoke<A: 'static, R: 'static>(slot: &Self::Erased<A, R>, args: &A) -> Option<R>;

    /// Build the detach edge a lifetime tracker stores for `core`: an
    /// erased callable that removes a key from the channel's registry
    /// without calling back into the tracker.
    ///
    /// Holds the channel weakly; detaching after the channel died is a
    /// no-op, not an error.
    fn channel_detach<A: 'static, R: 'static>(
        core: &Arc<SignalCore<A, R, Self>>,
    ) -> Self::Erased<SlotKey, ()>;
}

/// Unsynchronized policy: single logical thread, no locking.
///
/// Concurrent use of a [`SingleThread`] signal is a bug in the caller, not
/// a checked error; the `!Send` erased representation keeps such signals
/// from crossing threads in the first place.
#[derive(Debug, Default, Clone, Copy)]
pub struct SingleThread;

/// Mutex-guarded policy: registry accesses are serialized, signals and
/// trackers may be shared freely across threads.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSafe;

impl LockPolicy for SingleThread {
    type Cell<T> = RefCell<T>;
    type Erased<A: 'static, R: 'static> = LocalSlot<A, R>;

    fn cell<T>(value: T) -> Self::Cell<T> {
        RefCell::new(value)
    }

    fn with<T, U>(cell: &Self::Cell<T>, f: impl FnOnce(&mut T) -> U) -> U {
        let mut guard = cell.borrow_mut();
        f(&mut guard)
    }

    fn erase_fn<A: 'static, R: 'static>(f: fn(&A) -> R) -> Self::Erased<A, R> {
        Rc::new(move |args: &A| Some(f(args)))
    }

    fn invoke<A: 'static, R: 'static>(slot: &Self::Erased<A, R>, args: &A) -> Option<R> {
        slot(args)
    }

    fn channel_detach<A: 'static, R: 'static>(
        core: &Arc<SignalCore<A, R, Self>>,
    ) -> Self::Erased<SlotKey, ()> {
        let core = Arc::downgrade(core);
        Rc::new(move |key: &SlotKey| {
            if let Some(core) = core.upgrade() {
                core.remove_silent(*key);
            }
            Some(())
        })
    }
}

impl LockPolicy for ThreadSafe {
    type Cell<T> = Mutex<T>;
    type Erased<A: 'static, R: 'static> = SharedSlot<A, R>;

    fn cell<T>(value: T) -> Self::Cell<T> {
        Mutex::new(value)
    }

    fn with<T, U>(cell: &Self::Cell<T>, f: impl FnOnce(&mut T) -> U) -> U {
        let mut guard = cell.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    fn erase_fn<A: 'static, R: 'static>(f: fn(&A) -> R) -> Self::Erased<A, R> {
        Arc::new(move |args: &A| Some(f(args)))
    }

    fn invoke<A: 'static, R: 'static>(slot: &Self::Erased<A, R>, args: &A) -> Option<R> {
        slot(args)
    }

    fn channel_detach<A: 'static, R: 'static>(
        core: &Arc<SignalCore<A, R, Self>>,
    ) -> Self::Erased<SlotKey, ()> {
        let core = Arc::downgrade(core);
        Arc::new(move |key: &SlotKey| {
            if let Some(core) = core.upgrade() {
                core.remove_silent(*key);
            }
            Some(())
        })
    }
}
