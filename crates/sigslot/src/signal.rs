#![forbid(unsafe_code)]

//! The event channel: an ordered registry of connected slots.
//!
//! # Design
//!
//! [`Signal<A, R, P>`] is a cheap cloneable handle over shared channel
//! state. Connecting stores a type-erased callable under its [`SlotKey`];
//! firing walks the registry in subscription order and invokes every slot
//! with a shared reference to the arguments. When a receiver exposes a
//! lifetime tracker, connect also records the reciprocal edge, so that
//! destroying either side automatically cleans up the other.
//!
//! # Invariants
//!
//! 1. At most one registry entry per key; a duplicate connect replaces the
//!    stored callable in place and keeps the original fire position.
//! 2. Fire order is subscription order.
//! 3. `fire` invokes a snapshot taken at entry: slots connected mid-fire do
//!    not run in that call, slots disconnected mid-fire still do. A
//!    receiver destroyed mid-fire is the exception — its slot is skipped,
//!    never invoked against freed state.
//! 4. No lock is held while subscriber callables run; re-entrant connect,
//!    disconnect, and fire from inside a slot are permitted.
//! 5. Dropping the last handle detaches the channel from every tracker
//!    that references it.
//!
//! # Failure Modes
//!
//! - **Subscriber panics during fire**: the panic propagates to the `fire`
//!   caller; remaining slots in that snapshot are not invoked. The registry
//!   itself stays consistent (the snapshot was already taken).
//! - **Disconnect of an unknown key**: silent no-op, by contract.

use std::fmt;
use std::mem;
use std::ops::ControlFlow;
use std::sync::{Arc, Weak};

use crate::key::SlotKey;
use crate::policy::{LockPolicy, SingleThread};
use crate::slot::{BoundSlot, Slot};
use crate::tracker::{self, EdgeCell, Tracked};

/// One registry entry: a keyed erased callable plus, for tracked
/// receivers, a weak handle to the receiver's edge registry.
pub(crate) struct Entry<A: 'static, R: 'static, P: LockPolicy> {
    key: SlotKey,
    slot: P::Erased<A, R>,
    edges: Option<Weak<EdgeCell<P>>>,
}

/// Shared channel state: the ordered slot registry.
///
/// Public only so that [`LockPolicy`] implementations can build detach
/// edges around it; user code works with [`Signal`].
pub struct SignalCore<A: 'static, R: 'static, P: LockPolicy> {
    registry: P::Cell<Vec<Entry<A, R, P>>>,
}

impl<A: 'static, R: 'static, P: LockPolicy> SignalCore<A, R, P> {
    /// Channel identity used in tracker edges: the core's address, stable
    /// for the lifetime of the channel.
    fn id(&self) -> usize {
        std::ptr::from_ref(self) as usize
    }

    /// Insert an entry, replacing an existing one with the same key in
    /// place. Returns true when an entry was replaced.
    fn insert(&self, entry: Entry<A, R, P>) -> bool {
        P::with(&self.registry, |reg| {
            if let Some(existing) = reg.iter_mut().find(|e| e.key == entry.key) {
                *existing = entry;
                true
            } else {
                reg.push(entry);
                false
            }
        })
    }

    /// Remove an entry without releasing its tracker edge.
    ///
    /// This is the channel side of a tracker-initiated detach: the tracker
    /// is already dropping its own edge and must not be re-entered.
    pub(crate) fn remove_silent(&self, key: SlotKey) {
        P::with(&self.registry, |reg| reg.retain(|e| e.key != key));
    }

    /// Remove an entry and release the reciprocal tracker edge, if any.
    fn remove(&self, key: SlotKey) -> bool {
        let removed = P::with(&self.registry, |reg| {
            reg.iter()
                .position(|e| e.key == key)
                .map(|at| reg.remove(at))
        });
        match removed {
            Some(entry) => {
                self.release_tracker_edge(&entry);
                true
            }
            None => false,
        }
    }

    /// Drain the registry, releasing every reciprocal tracker edge.
    fn clear(&self) {
        let drained = P::with(&self.registry, |reg| mem::take(reg));
        for entry in &drained {
            self.release_tracker_edge(entry);
        }
    }

    fn release_tracker_edge(&self, entry: &Entry<A, R, P>) {
        if let Some(cell) = entry.edges.as_ref().and_then(Weak::upgrade) {
            tracker::release_edge::<P>(&cell, entry.key, self.id());
        }
    }

    /// Clone the current slot list, in order, under the lock.
    fn snapshot(&self) -> Vec<P::Erased<A, R>> {
        P::with(&self.registry, |reg| {
            reg.iter().map(|e| e.slot.clone()).collect()
        })
    }

    fn is_empty(&self) -> bool {
        P::with(&self.registry, |reg| reg.is_empty())
    }

    fn len(&self) -> usize {
        P::with(&self.registry, |reg| reg.len())
    }
}

impl<A: 'static, R: 'static, P: LockPolicy> Drop for SignalCore<A, R, P> {
    fn drop(&mut self) {
        // Last handle gone: revoke this channel from every tracker that
        // still references it, before the registry is released.
        self.clear();
    }
}

/// A typed event channel ("signal").
///
/// `A` is the argument shape (use a tuple for multi-argument events), `R`
/// the slot return type consumed by [`fire_accumulate`], and `P` the
/// [`LockPolicy`] governing concurrent access.
///
/// Cloning a `Signal` creates a new handle to the **same** channel. The
/// channel is destroyed when the last handle drops.
///
/// [`fire_accumulate`]: Signal::fire_accumulate
pub struct Signal<A: 'static, R: 'static = (), P: LockPolicy = SingleThread> {
    core: Arc<SignalCore<A, R, P>>,
}

impl<A: 'static, R: 'static, P: LockPolicy> Signal<A, R, P> {
    /// Create an empty channel.
    #[must_use]
    pub fn new() -> Self {
        Self {
            core: Arc::new(SignalCore {
                registry: P::cell(Vec::new()),
            }),
        }
    }

    /// Connect a free function (or capture-less closure).
    ///
    /// Free functions have no receiver to track; disconnect explicitly via
    /// [`disconnect`](Signal::disconnect) or drop the whole channel.
    pub fn connect(&self, f: fn(&A) -> R) -> SlotKey {
        self.connect_slot(Slot::from_fn(f))
    }

    /// Connect a method bound to a shared receiver instance.
    ///
    /// If the receiver exposes a [`SlotTracker`](crate::SlotTracker)
    /// through [`Tracked`], the connection is revoked automatically when
    /// the receiver drops; otherwise the caller owns disconnection.
    pub fn connect_method<T>(&self, receiver: &Arc<T>, method: fn(&T, &A) -> R) -> SlotKey
    where
        T: Tracked<P>,
        fn(&T, &A) -> R: BoundSlot<P, T, A, R>,
    {
        self.connect_slot(Slot::from_method(receiver, method))
    }

    /// Connect a generic callable bound to a shared receiver instance.
    ///
    /// The binding is identified by the callable's type; keep the returned
    /// [`SlotKey`] for targeted disconnection.
    pub fn connect_with<T, F>(&self, receiver: &Arc<T>, f: F) -> SlotKey
    where
        T: Tracked<P>,
        F: BoundSlot<P, T, A, R> + 'static,
    {
        self.connect_slot(Slot::from_closure(receiver, f))
    }

    /// Connect a pre-built [`Slot`].
    ///
    /// A connect with a key already present replaces the stored callable
    /// in place; the binding keeps its original fire position and never
    /// double-fires.
    pub fn connect_slot(&self, slot: Slot<A, R, P>) -> SlotKey {
        let Slot { key, call, edges } = slot;
        // Registry entry first, reciprocal edge second: if the receiver's
        // teardown runs in between, its tracker refuses the edge and the
        // entry is removed here instead of lingering uncollectable.
        let replaced = self.core.insert(Entry {
            key,
            slot: call,
            edges: edges.as_ref().map(Arc::downgrade),
        });
        if let Some(cell) = edges {
            let detach = P::channel_detach(&self.core);
            if !tracker::record_edge::<P>(&cell, key, self.core.id(), detach) {
                self.core.remove_silent(key);
            }
        }
        log_connect(key, replaced);
        key
    }

    /// Disconnect a free function. No-op if it was never connected.
    pub fn disconnect(&self, f: fn(&A) -> R) {
        self.disconnect_key(SlotKey::of_fn(f));
    }

    /// Disconnect a bound method. No-op if it was never connected.
    pub fn disconnect_method<T>(&self, receiver: &Arc<T>, method: fn(&T, &A) -> R) {
        self.disconnect_key(SlotKey::of_method(receiver, method));
    }

    /// Disconnect by key. No-op if the key is absent.
    pub fn disconnect_key(&self, key: SlotKey) {
        let removed = self.core.remove(key);
        log_disconnect(key, removed);
    }

    /// Disconnect every slot, releasing all reciprocal tracker edges.
    pub fn disconnect_all(&self) {
        self.core.clear();
    }

    /// Invoke every connected slot, in subscription order, discarding
    /// return values.
    ///
    /// Slots observe the arguments by shared reference; nothing is cloned
    /// per subscriber. Firing an empty channel returns immediately.
    pub fn fire(&self, args: A) {
        let snapshot = self.core.snapshot();
        log_fire(snapshot.len());
        for slot in &snapshot {
            P::invoke(slot, &args);
        }
    }

    /// Invoke every connected slot in order, folding each return value
    /// into `accumulate`.
    ///
    /// Returning [`ControlFlow::Break`] stops delivery to the remaining
    /// slots in the snapshot.
    pub fn fire_accumulate<F>(&self, args: A, mut accumulate: F)
    where
        F: FnMut(R) -> ControlFlow<()>,
    {
        let snapshot = self.core.snapshot();
        log_fire(snapshot.len());
        for slot in &snapshot {
            if let Some(value) = P::invoke(slot, &args)
                && accumulate(value).is_break()
            {
                break;
            }
        }
    }

    /// Whether no slots are connected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.core.is_empty()
    }

    /// Number of connected slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.core.len()
    }
}

impl<A: 'static, R: 'static, P: LockPolicy> Clone for Signal<A, R, P> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<A: 'static, R: 'static, P: LockPolicy> Default for Signal<A, R, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: 'static, R: 'static, P: LockPolicy> fmt::Debug for Signal<A, R, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal").field("slots", &self.len()).finish()
    }
}

#[cfg(feature = "tracing")]
fn log_connect(key: SlotKey, replaced: bool) {
    tracing::debug!(message = "signal.connect", ?key, replaced);
}

#[cfg(not(feature = "tracing"))]
fn log_connect(_key: SlotKey, _replaced: bool) {}

#[cfg(feature = "tracing")]
fn log_disconnect(key: SlotKey, removed: bool) {
    tracing::debug!(message = "signal.disconnect", ?key, removed);
}

#[cfg(not(feature = "tracing"))]
fn log_disconnect(_key: SlotKey, _removed: bool) {}

#[cfg(feature = "tracing")]
fn log_fire(slots: usize) {
    tracing::trace!(message = "signal.fire", slots);
}

#[cfg(not(feature = "tracing"))]
fn log_fire(_slots: usize) {}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::SlotTracker;

    /// Single-threaded tracked receiver recording calls and last argument.
    struct Probe {
        tracker: SlotTracker<SingleThread>,
        calls: Cell<u32>,
        last: Cell<i32>,
    }

    impl Probe {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                tracker: SlotTracker::new(),
                calls: Cell::new(0),
                last: Cell::new(0),
            })
        }

        fn on_event(&self, args: &i32) {
            self.calls.set(self.calls.get() + 1);
            self.last.set(*args);
        }
    }

    impl Tracked<SingleThread> for Probe {
        fn tracker(&self) -> Option<&SlotTracker<SingleThread>> {
            Some(&self.tracker)
        }
    }

    #[test]
    fn fire_invokes_once_with_arguments() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        static LAST: AtomicUsize = AtomicUsize::new(0);

        fn record(args: &(usize, usize)) {
            CALLS.fetch_add(1, Ordering::SeqCst);
            LAST.store(args.0 * 100 + args.1, Ordering::SeqCst);
        }

        let signal: Signal<(usize, usize)> = Signal::new();
        signal.connect(record);
        signal.fire((3, 7));

        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
        assert_eq!(LAST.load(Ordering::SeqCst), 307);
    }

    #[test]
    fn free_and_method_slots_fire_in_subscription_order() {
        static FREE_SEEN: AtomicUsize = AtomicUsize::new(0);

        fn free_slot(args: &i32) {
            FREE_SEEN.fetch_add(*args as usize, Ordering::SeqCst);
        }

        let signal: Signal<i32> = Signal::new();
        let probe = Probe::new();

        signal.connect(free_slot);
        signal.connect_method(&probe, Probe::on_event);

        signal.fire(5);
        assert_eq!(FREE_SEEN.load(Ordering::SeqCst), 5);
        assert_eq!(probe.calls.get(), 1);
        assert_eq!(probe.last.get(), 5);

        signal.disconnect_method(&probe, Probe::on_event);
        signal.fire(7);
        assert_eq!(FREE_SEEN.load(Ordering::SeqCst), 12);
        // The method slot never saw the second fire.
        assert_eq!(probe.calls.get(), 1);
        assert_eq!(probe.last.get(), 5);
    }

    #[test]
    fn disconnect_unknown_is_noop() {
        fn never(_: &i32) {}

        let signal: Signal<i32> = Signal::new();
        signal.disconnect(never);
        assert!(signal.is_empty());
        signal.fire(1);
    }

    #[test]
    fn duplicate_connect_replaces_in_place() {
        let signal: Signal<i32, i32> = Signal::new();
        let probe = Probe::new();
        let other = Probe::new();

        // One closure type (one literal), three values: key identity is
        // (closure type, receiver).
        let make = |v: i32| move |_: &Probe, _: &i32| v;

        signal.connect_with(&probe, make(1));
        signal.connect_with(&other, make(10));
        // Same closure type, same receiver: same key, replaced in place.
        let replaced = signal.connect_with(&probe, make(2));

        assert_eq!(signal.len(), 2);
        assert_eq!(probe.tracker.len(), 1);

        let mut seen = Vec::new();
        signal.fire_accumulate(0, |v| {
            seen.push(v);
            ControlFlow::Continue(())
        });
        // Replacement kept the original position and fires once.
        assert_eq!(seen, vec![2, 10]);

        signal.disconnect_key(replaced);
        assert_eq!(signal.len(), 1);
        assert!(probe.tracker.is_empty());
    }

    #[test]
    fn fire_accumulate_folds_in_order() {
        let signal: Signal<(), i32> = Signal::new();
        let probe = Probe::new();

        // Three distinct closure literals are three distinct types, hence
        // three bindings on the same receiver.
        signal.connect_with(&probe, |_: &Probe, _: &()| 1);
        signal.connect_with(&probe, |_: &Probe, _: &()| 2);
        signal.connect_with(&probe, |_: &Probe, _: &()| 3);

        let mut sum = 0;
        let mut order = Vec::new();
        signal.fire_accumulate((), |v| {
            sum += v;
            order.push(v);
            ControlFlow::Continue(())
        });
        assert_eq!(sum, 6);
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn fire_accumulate_early_termination() {
        let signal: Signal<(), i32> = Signal::new();
        let probe = Probe::new();

        signal.connect_with(&probe, |_: &Probe, _: &()| 1);
        signal.connect_with(&probe, |_: &Probe, _: &()| 2);

        let mut seen = Vec::new();
        signal.fire_accumulate((), |v| {
            seen.push(v);
            ControlFlow::Break(())
        });
        assert_eq!(seen, vec![1]);
    }

    #[test]
    fn receiver_drop_disconnects() {
        let signal: Signal<i32> = Signal::new();
        let probe = Probe::new();

        signal.connect_method(&probe, Probe::on_event);
        assert!(!signal.is_empty());
        assert_eq!(probe.tracker.len(), 1);

        drop(probe);
        assert!(signal.is_empty());
        // Firing after the receiver died invokes nothing and does not fault.
        signal.fire(9);
    }

    #[test]
    fn channel_drop_releases_tracker_edges() {
        let probe = Probe::new();
        {
            let signal: Signal<i32> = Signal::new();
            signal.connect_method(&probe, Probe::on_event);
            assert_eq!(probe.tracker.len(), 1);
        }
        assert!(probe.tracker.is_empty());
    }

    #[test]
    fn clone_is_same_channel() {
        let signal: Signal<i32> = Signal::new();
        let alias = signal.clone();
        let probe = Probe::new();

        alias.connect_method(&probe, Probe::on_event);
        signal.fire(4);
        assert_eq!(probe.calls.get(), 1);

        // Dropping one handle does not tear the channel down.
        drop(alias);
        signal.fire(4);
        assert_eq!(probe.calls.get(), 2);
        assert_eq!(probe.tracker.len(), 1);
    }

    #[test]
    fn one_receiver_two_channels() {
        let first: Signal<i32> = Signal::new();
        let second: Signal<i32> = Signal::new();
        let probe = Probe::new();

        first.connect_method(&probe, Probe::on_event);
        second.connect_method(&probe, Probe::on_event);
        assert_eq!(probe.tracker.len(), 2);

        // Dropping one channel releases exactly its own edge.
        drop(first);
        assert_eq!(probe.tracker.len(), 1);

        second.fire(11);
        assert_eq!(probe.calls.get(), 1);
    }

    #[test]
    fn disconnect_all_releases_edges() {
        let signal: Signal<i32> = Signal::new();
        let probe = Probe::new();

        signal.connect_method(&probe, Probe::on_event);
        signal.connect(|_: &i32| {});
        assert_eq!(signal.len(), 2);

        signal.disconnect_all();
        assert!(signal.is_empty());
        assert!(probe.tracker.is_empty());

        signal.fire(1);
        assert_eq!(probe.calls.get(), 0);
    }

    #[test]
    fn subscriber_panic_propagates_and_channel_survives() {
        use std::panic::{AssertUnwindSafe, catch_unwind};

        let signal: Signal<i32> = Signal::new();
        let head = Probe::new();
        let tail = Probe::new();

        signal.connect_method(&head, Probe::on_event);
        let bomb = signal.connect_with(&head, |_: &Probe, _: &i32| panic!("subscriber failure"));
        signal.connect_method(&tail, Probe::on_event);

        let outcome = catch_unwind(AssertUnwindSafe(|| signal.fire(5)));
        assert!(outcome.is_err());
        // Delivery stopped at the panicking slot: earlier slots ran,
        // later ones in the snapshot did not.
        assert_eq!(head.calls.get(), 1);
        assert_eq!(tail.calls.get(), 0);

        // The registry is untouched and the channel stays usable.
        assert_eq!(signal.len(), 3);
        signal.disconnect_key(bomb);
        signal.fire(6);
        assert_eq!(head.calls.get(), 2);
        assert_eq!(tail.calls.get(), 1);

        // Automatic detachment still works after the panic.
        drop(head);
        assert_eq!(signal.len(), 1);
    }

    #[test]
    fn connect_slot_after_receiver_death_leaves_no_entry() {
        let signal: Signal<i32> = Signal::new();
        let probe = Probe::new();
        let slot = Slot::from_method(&probe, Probe::on_event);

        // The receiver dies while the pre-built slot is in flight; its
        // tracker refuses the edge, so the connect must not leave an
        // uncollectable registry entry behind.
        drop(probe);
        let key = signal.connect_slot(slot);

        assert!(signal.is_empty());
        assert_eq!(signal.len(), 0);
        signal.fire(1);
        signal.disconnect_key(key);
    }

    #[test]
    fn connect_during_fire_is_excluded_from_snapshot() {
        struct Reentrant {
            tracker: SlotTracker<SingleThread>,
            signal: Signal<i32, (), SingleThread>,
            added: Cell<bool>,
        }

        impl Tracked<SingleThread> for Reentrant {
            fn tracker(&self) -> Option<&SlotTracker<SingleThread>> {
                Some(&self.tracker)
            }
        }

        let signal: Signal<i32> = Signal::new();
        let probe = Probe::new();
        let reentrant = Arc::new(Reentrant {
            tracker: SlotTracker::new(),
            signal: signal.clone(),
            added: Cell::new(false),
        });

        signal.connect_with(&reentrant, |me: &Reentrant, _: &i32| {
            if !me.added.get() {
                me.added.set(true);
                me.signal.connect(|_: &i32| panic!("must not fire in this call"));
            }
        });
        signal.connect_method(&probe, Probe::on_event);

        signal.fire(1);
        // The probe (snapshotted) fired; the mid-fire connect did not.
        assert_eq!(probe.calls.get(), 1);
        assert_eq!(signal.len(), 3);
    }

    #[test]
    fn disconnect_during_fire_still_invokes_snapshot() {
        struct Remover {
            tracker: SlotTracker<SingleThread>,
            signal: Signal<i32, (), SingleThread>,
            victim: RefCell<Option<SlotKey>>,
        }

        impl Tracked<SingleThread> for Remover {
            fn tracker(&self) -> Option<&SlotTracker<SingleThread>> {
                Some(&self.tracker)
            }
        }

        let signal: Signal<i32> = Signal::new();
        let probe = Probe::new();
        let remover = Arc::new(Remover {
            tracker: SlotTracker::new(),
            signal: signal.clone(),
            victim: RefCell::new(None),
        });

        signal.connect_with(&remover, |me: &Remover, _: &i32| {
            if let Some(key) = me.victim.borrow_mut().take() {
                me.signal.disconnect_key(key);
            }
        });
        let victim = signal.connect_method(&probe, Probe::on_event);
        *remover.victim.borrow_mut() = Some(victim);

        signal.fire(1);
        // Removed mid-fire, but it was in the snapshot: still invoked once.
        assert_eq!(probe.calls.get(), 1);
        assert_eq!(signal.len(), 1);

        signal.fire(2);
        assert_eq!(probe.calls.get(), 1);
    }

    #[test]
    fn reentrant_fire_takes_its_own_snapshot() {
        struct Chain {
            tracker: SlotTracker<SingleThread>,
            inner: Signal<i32, (), SingleThread>,
        }

        impl Tracked<SingleThread> for Chain {
            fn tracker(&self) -> Option<&SlotTracker<SingleThread>> {
                Some(&self.tracker)
            }
        }

        let outer: Signal<i32> = Signal::new();
        let inner: Signal<i32> = Signal::new();
        let probe = Probe::new();
        let chain = Arc::new(Chain {
            tracker: SlotTracker::new(),
            inner: inner.clone(),
        });

        inner.connect_method(&probe, Probe::on_event);
        outer.connect_with(&chain, |me: &Chain, args: &i32| me.inner.fire(*args + 1));

        outer.fire(10);
        assert_eq!(probe.calls.get(), 1);
        assert_eq!(probe.last.get(), 11);
    }

    #[test]
    fn debug_reports_slot_count() {
        let signal: Signal<i32> = Signal::new();
        signal.connect(|_: &i32| {});
        assert_eq!(format!("{signal:?}"), "Signal { slots: 1 }");
    }
}
