#![forbid(unsafe_code)]

//! Synchronous, in-process signal/slot dispatch with automatic connection
//! lifetime management.
//!
//! A [`Signal`] is a typed event channel: callables subscribe to it and are
//! invoked, in subscription order, every time it fires. The interesting
//! guarantee is symmetric automatic disconnection — no garbage collection,
//! no manual bookkeeping:
//!
//! - A receiver that embeds a [`SlotTracker`] (exposed via [`Tracked`]) is
//!   unsubscribed from every signal it is connected to when it drops.
//! - A signal that drops revokes itself from every receiver that was
//!   tracking it.
//!
//! Dangling-callback invocation is impossible either way: cross-references
//! between channels and receivers are always `Weak`.
//!
//! # Architecture
//!
//! - [`key`]: value identity of one (callable, receiver) binding.
//! - [`slot`]: type-erased callables and the [`BoundSlot`] erasure trait.
//! - [`policy`]: the [`LockPolicy`] strategy — [`SingleThread`] (no
//!   locking) or [`ThreadSafe`] (mutex-guarded critical sections), chosen
//!   per instantiation.
//! - [`tracker`]: the subscriber-side lifetime tracker.
//! - [`signal`]: the channel itself — connect, disconnect, fire,
//!   fire-accumulate.
//! - [`emitter`]: a fire-only facade over a privately owned channel.
//!
//! # Example
//!
//! ```
//! use std::cell::Cell;
//! use std::sync::Arc;
//!
//! use sigslot::{Signal, SlotTracker, Tracked};
//!
//! struct Counter {
//!     tracker: SlotTracker,
//!     total: Cell<i32>,
//! }
//!
//! impl Tracked for Counter {
//!     fn tracker(&self) -> Option<&SlotTracker> {
//!         Some(&self.tracker)
//!     }
//! }
//!
//! impl Counter {
//!     fn add(&self, amount: &i32) {
//!         self.total.set(self.total.get() + amount);
//!     }
//! }
//!
//! let on_tick: Signal<i32> = Signal::new();
//! let counter = Arc::new(Counter {
//!     tracker: SlotTracker::new(),
//!     total: Cell::new(0),
//! });
//!
//! on_tick.connect_method(&counter, Counter::add);
//! on_tick.fire(5);
//! assert_eq!(counter.total.get(), 5);
//!
//! drop(counter); // auto-disconnects
//! assert!(on_tick.is_empty());
//! ```

pub mod emitter;
pub mod key;
pub mod policy;
pub mod signal;
pub mod slot;
pub mod tracker;

pub use emitter::Emitter;
pub use key::{CallableId, SlotKey};
pub use policy::{LockPolicy, SingleThread, ThreadSafe};
pub use signal::Signal;
pub use slot::{BoundSlot, Slot};
pub use tracker::{SlotTracker, Tracked};
