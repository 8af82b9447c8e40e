#![forbid(unsafe_code)]

//! Subscriber-side connection lifetime tracking.
//!
//! A receiver that embeds a [`SlotTracker`] and exposes it through
//! [`Tracked`] gets automatic disconnection: when the receiver is dropped,
//! the tracker walks its recorded edges and removes the matching entry from
//! every signal that still holds one, before the receiver's memory goes
//! away. Symmetrically, a signal that is dropped removes its edges from
//! every tracker that references it. Neither side ever owns the other; all
//! cross-references are `Weak`.
//!
//! # Invariants
//!
//! 1. For every `(key, channel)` edge held by a tracker, the same key is
//!    present in that channel's registry, and that registry entry points
//!    back at this tracker — at every quiescent point the relation is
//!    symmetric.
//! 2. Edges are keyed by `(key, channel)`, not key alone: the same binding
//!    may be connected to several signals, and dropping one signal must
//!    release exactly its own edge.
//! 3. Detaching never re-enters: the tracker's teardown path removes
//!    registry entries through [`SignalCore::remove_silent`], which does
//!    not call back into the tracker, and the channel's teardown path
//!    edits the edge list directly without invoking detach callables.
//! 4. Once a tracker's destruction has begun, [`record_edge`] refuses new
//!    edges, so a connect racing the receiver's drop can detect the loss
//!    and undo its registry insert instead of leaving an orphan entry.
//!
//! [`SignalCore::remove_silent`]: crate::signal::SignalCore

use std::fmt;
use std::mem;
use std::sync::Arc;

use crate::key::SlotKey;
use crate::policy::{LockPolicy, SingleThread};

/// Shared edge registry of one tracker. Signals hold this weakly.
pub(crate) type EdgeCell<P> = <P as LockPolicy>::Cell<EdgeList<P>>;

/// Edge storage plus the teardown flag checked by [`record_edge`].
///
/// `open` is cleared at the start of the tracker's drop, before the edges
/// drain, and never set again: a cell outliving its tracker (a connect in
/// flight still holds the `Arc`) permanently refuses new edges.
pub(crate) struct EdgeList<P: LockPolicy> {
    edges: Vec<Edge<P>>,
    open: bool,
}

/// One reciprocal edge: this receiver's `key` is registered in the channel
/// identified by `channel`, and `detach` removes it there.
pub(crate) struct Edge<P: LockPolicy> {
    pub(crate) key: SlotKey,
    pub(crate) channel: usize,
    pub(crate) detach: P::Erased<SlotKey, ()>,
}

/// Record an edge, replacing any previous edge for the same binding in the
/// same channel (duplicate connect is replace-in-place on both sides).
///
/// Returns `false` without recording when the tracker's destruction has
/// already begun; the caller must then undo whatever channel-side state it
/// created for this binding, since no teardown path will.
pub(crate) fn record_edge<P: LockPolicy>(
    cell: &EdgeCell<P>,
    key: SlotKey,
    channel: usize,
    detach: P::Erased<SlotKey, ()>,
) -> bool {
    P::with(cell, |list| {
        if !list.open {
            return false;
        }
        list.edges.retain(|e| !(e.key == key && e.channel == channel));
        list.edges.push(Edge {
            key,
            channel,
            detach,
        });
        true
    })
}

/// Remove the edge for one binding in one channel. No-op if absent.
pub(crate) fn release_edge<P: LockPolicy>(cell: &EdgeCell<P>, key: SlotKey, channel: usize) {
    P::with(cell, |list| {
        list.edges.retain(|e| !(e.key == key && e.channel == channel));
    });
}

/// Capability trait for receivers that participate in automatic
/// disconnection.
///
/// The signal queries this once per connect. The default answer is `None`:
/// such receivers are accepted, but the caller owns explicit disconnection.
/// Receivers that embed a [`SlotTracker`] override [`tracker`] to opt in.
///
/// [`tracker`]: Tracked::tracker
pub trait Tracked<P: LockPolicy = SingleThread>: 'static {
    /// The receiver's lifetime tracker, if it has one.
    fn tracker(&self) -> Option<&SlotTracker<P>> {
        None
    }
}

/// Per-receiver registry of active subscription edges.
///
/// Embed one in a receiver type and expose it via [`Tracked`]; every
/// connection made through that receiver is then revoked automatically
/// when the receiver drops.
pub struct SlotTracker<P: LockPolicy = SingleThread> {
    edges: Arc<EdgeCell<P>>,
}

impl<P: LockPolicy> SlotTracker<P> {
    /// Create a tracker with no edges.
    #[must_use]
    pub fn new() -> Self {
        Self {
            edges: Arc::new(P::cell(EdgeList {
                edges: Vec::new(),
                open: true,
            })),
        }
    }

    /// Strong handle to the edge registry, for channel-side bookkeeping.
    pub(crate) fn share(&self) -> Arc<EdgeCell<P>> {
        Arc::clone(&self.edges)
    }

    /// Drop the edges recorded for `key` without notifying any channel.
    ///
    /// This is the callee side of a channel-initiated disconnect; calling
    /// it directly leaves the channel's entry in place until the channel
    /// removes it itself. No-op if the key is absent.
    pub fn release(&self, key: SlotKey) {
        P::with(&self.edges, |list| list.edges.retain(|e| e.key != key));
    }

    /// Detach from every channel this tracker references.
    ///
    /// Each referenced channel removes its registry entry for the edge's
    /// key; channels that have already been destroyed are skipped. Invoked
    /// implicitly on drop.
    pub fn release_all(&self) {
        // Drain first, invoke after: no lock is held while the channels
        // take theirs.
        let drained = P::with(&self.edges, |list| mem::take(&mut list.edges));
        for edge in drained {
            P::invoke(&edge.detach, &edge.key);
        }
    }

    /// Whether any edges remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        P::with(&self.edges, |list| list.edges.is_empty())
    }

    /// Number of recorded edges.
    #[must_use]
    pub fn len(&self) -> usize {
        P::with(&self.edges, |list| list.edges.len())
    }
}

impl<P: LockPolicy> Default for SlotTracker<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: LockPolicy> Drop for SlotTracker<P> {
    fn drop(&mut self) {
        // Close before draining: a connect racing this drop either gets
        // its detach invoked below, or is refused and undoes itself.
        P::with(&self.edges, |list| list.open = false);
        self.release_all();
    }
}

impl<P: LockPolicy> fmt::Debug for SlotTracker<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotTracker")
            .field("edges", &self.len())
            .finish()
    }
}
