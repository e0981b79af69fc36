//! Schedule fetches for gossiped inventory announcements.
//!
//! Peers advertise opaque, content-addressed inventory items; this crate
//! tracks which peers hold which items and requests each item's payload from
//! exactly one peer at a time. A request that is not completed within the
//! configured timeout is retried against the next untried announcer, in
//! ascending peer order, until a payload arrives or no candidate remains.
//!
//! Construction yields an [`Engine`], which owns the background worker, and a
//! cloneable [`Scheduler`] handle through which the network layer reports
//! connects, disconnects, announcements, and completed deliveries.

mod config;
mod engine;
mod metrics;
mod queue;
mod state;

#[cfg(test)]
pub mod mocks;

pub use config::Config;
pub use engine::{Engine, Scheduler};

use std::{fmt::Debug, hash::Hash, time::Instant};

/// Identifier for an inventory item.
///
/// Items are opaque to the scheduler: value equality and a total order are
/// the only semantics relied upon.
pub trait Key: Clone + Ord + Hash + Debug + Send + 'static {}
impl<T: Clone + Ord + Hash + Debug + Send + 'static> Key for T {}

/// Stable identifier for a connected peer.
///
/// Identifiers must be unique for the lifetime of a connection; reuse after a
/// disconnect is permitted. Candidate selection breaks ties by picking the
/// smallest identifier, so the order must be total.
pub trait PeerId: Clone + Ord + Hash + Debug + Send + 'static {}
impl<T: Clone + Ord + Hash + Debug + Send + 'static> PeerId for T {}

/// Outbound handle by which the scheduler requests an item from one peer.
///
/// `fetch` is called with the scheduler lock held and must enqueue the
/// request and return without blocking.
pub trait Sender: Send + 'static {
    /// Type used to identify the requested item.
    type Key: Key;

    /// Enqueue a request for the full payload of `key`.
    fn fetch(&mut self, key: Self::Key);
}

/// Monotonic time source, injected for test determinism.
pub trait Clock: Send + 'static {
    /// Current monotonic time in microseconds.
    fn now_micros(&self) -> u64;
}

/// Clock backed by [`Instant`], measuring from construction.
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a clock whose epoch is now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_micros(&self) -> u64 {
        self.origin.elapsed().as_micros().min(u64::MAX as u128) as u64
    }
}
