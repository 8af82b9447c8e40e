#![forbid(unsafe_code)]

//! Fire-only signal facade.
//!
//! [`Emitter`] composes a private [`Signal`] and re-exposes only the
//! broadcasting half of its surface: fire, clear, emptiness. A component
//! that wants to announce events without letting callers tamper with its
//! subscription list embeds an `Emitter` privately, wires its own slots
//! through [`signal`](Emitter::signal), and hands out nothing.

use std::fmt;
use std::ops::ControlFlow;

use crate::policy::{LockPolicy, SingleThread};
use crate::signal::Signal;

/// Restricted wrapper around one owned [`Signal`]: fire, clear, and
/// emptiness only.
pub struct Emitter<A: 'static, R: 'static = (), P: LockPolicy = SingleThread> {
    signal: Signal<A, R, P>,
}

impl<A: 'static, R: 'static, P: LockPolicy> Emitter<A, R, P> {
    /// Create an emitter over a fresh, empty channel.
    #[must_use]
    pub fn new() -> Self {
        Self {
            signal: Signal::new(),
        }
    }

    /// Invoke every connected slot. See [`Signal::fire`].
    pub fn fire(&self, args: A) {
        self.signal.fire(args);
    }

    /// Invoke every connected slot, folding return values. See
    /// [`Signal::fire_accumulate`].
    pub fn fire_accumulate<F>(&self, args: A, accumulate: F)
    where
        F: FnMut(R) -> ControlFlow<()>,
    {
        self.signal.fire_accumulate(args, accumulate);
    }

    /// Disconnect every slot.
    pub fn clear(&self) {
        self.signal.disconnect_all();
    }

    /// Whether no slots are connected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.signal.is_empty()
    }

    /// The underlying channel, for the owning object's internal wiring.
    ///
    /// Keep the emitter private and this stays an encapsulation boundary:
    /// external callers see fire/clear/is_empty and nothing else.
    #[must_use]
    pub fn signal(&self) -> &Signal<A, R, P> {
        &self.signal
    }
}

impl<A: 'static, R: 'static, P: LockPolicy> Default for Emitter<A, R, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: 'static, R: 'static, P: LockPolicy> fmt::Debug for Emitter<A, R, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("slots", &self.signal.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::sync::Arc;

    use super::*;
    use crate::{SlotTracker, Tracked};

    struct Listener {
        tracker: SlotTracker<SingleThread>,
        heard: Cell<u32>,
    }

    impl Tracked<SingleThread> for Listener {
        fn tracker(&self) -> Option<&SlotTracker<SingleThread>> {
            Some(&self.tracker)
        }
    }

    impl Listener {
        fn hear(&self, _: &u32) {
            self.heard.set(self.heard.get() + 1);
        }
    }

    /// A component broadcasting through a privately owned emitter.
    struct Broadcaster {
        on_change: Emitter<u32>,
    }

    impl Broadcaster {
        fn subscribe(&self, listener: &Arc<Listener>) {
            self.on_change.signal().connect_method(listener, Listener::hear);
        }
    }

    #[test]
    fn emitter_delegates_fire_and_clear() {
        let broadcaster = Broadcaster {
            on_change: Emitter::new(),
        };
        let listener = Arc::new(Listener {
            tracker: SlotTracker::new(),
            heard: Cell::new(0),
        });

        assert!(broadcaster.on_change.is_empty());
        broadcaster.subscribe(&listener);
        assert!(!broadcaster.on_change.is_empty());

        broadcaster.on_change.fire(1);
        assert_eq!(listener.heard.get(), 1);

        broadcaster.on_change.clear();
        assert!(broadcaster.on_change.is_empty());
        assert!(listener.tracker.is_empty());

        broadcaster.on_change.fire(2);
        assert_eq!(listener.heard.get(), 1);
    }

    #[test]
    fn emitter_drop_detaches_listeners() {
        let listener = Arc::new(Listener {
            tracker: SlotTracker::new(),
            heard: Cell::new(0),
        });
        {
            let broadcaster = Broadcaster {
                on_change: Emitter::new(),
            };
            broadcaster.subscribe(&listener);
            assert_eq!(listener.tracker.len(), 1);
        }
        assert!(listener.tracker.is_empty());
    }
}
