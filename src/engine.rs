//! The worker loop and the external entry points.

use crate::{
    config::Config,
    metrics::Metrics,
    state::{Announced, Dispatched, State},
    Clock, Key, PeerId, Sender,
};
use parking_lot::{Condvar, Mutex, MutexGuard};
use prometheus_client::registry::Registry;
use std::{sync::Arc, thread, time::Duration};
use tracing::debug;

/// State shared between the worker and every [`Scheduler`] handle.
struct Shared<P: PeerId, K: Key, S: Sender<Key = K>> {
    /// The single critical region: peer registry, request table, and work
    /// queue move together.
    state: Mutex<State<P, K, S>>,

    /// Signals the worker that the earliest deadline may have advanced.
    wake: Condvar,

    metrics: Metrics,
}

/// Owns the scheduler worker: the long-running task that pops due work-queue
/// entries, selects a peer for each, and issues the fetch.
///
/// Created together with its [`Scheduler`] handle by [`Engine::new`];
/// consumed by [`Engine::start`].
pub struct Engine<C: Clock, P: PeerId, K: Key, S: Sender<Key = K>> {
    clock: C,
    timeout_micros: u64,
    shared: Arc<Shared<P, K, S>>,
}

impl<C: Clock, P: PeerId, K: Key, S: Sender<Key = K>> Engine<C, P, K, S> {
    /// Create the engine and the handle callers use to drive it.
    ///
    /// Metrics are registered against `registry`.
    pub fn new(clock: C, cfg: Config, registry: &mut Registry) -> (Self, Scheduler<P, K, S>) {
        let shared = Arc::new(Shared {
            state: Mutex::new(State::new()),
            wake: Condvar::new(),
            metrics: Metrics::init(registry),
        });
        let engine = Self {
            clock,
            timeout_micros: cfg.request_timeout.as_micros().min(u64::MAX as u128) as u64,
            shared: shared.clone(),
        };
        let scheduler = Scheduler {
            shared,
            max_per_peer: cfg.max_per_peer,
        };
        (engine, scheduler)
    }

    /// Spawn the worker thread.
    ///
    /// The thread runs until a handle calls [`Scheduler::stop`], at which
    /// point the returned handle becomes joinable.
    pub fn start(self) -> thread::JoinHandle<()> {
        thread::Builder::new()
            .name("invfetch".into())
            .spawn(move || self.run())
            .expect("failed to spawn scheduler worker")
    }

    fn run(self) {
        debug!("worker started");
        let mut state = self.shared.state.lock();
        while !state.stopped {
            match self.service(&mut state) {
                // Nothing queued: sleep until an entry point wakes us.
                None => self.shared.wake.wait(&mut state),
                // Next deadline in the future: sleep at most until then.
                // A wake-up or the timeout both fall through to re-check.
                Some(wait) if !wait.is_zero() => {
                    let _ = self.shared.wake.wait_for(&mut state, wait);
                }
                // Already due again; go straight back around.
                Some(_) => {}
            }
        }
        debug!("worker stopped");
    }

    /// Dispatch every due entry, then report the time until the next
    /// deadline (`None` when the queue is empty).
    fn service(&self, state: &mut MutexGuard<'_, State<P, K, S>>) -> Option<Duration> {
        let metrics = &self.shared.metrics;
        let now = self.clock.now_micros();
        while let Some(item) = state.pop_due(now) {
            match state.dispatch(item, now, self.timeout_micros) {
                Dispatched::Requested { retry } => {
                    metrics.requests_issued.inc();
                    if retry {
                        metrics.retries.inc();
                    }
                }
                Dispatched::Abandoned => {
                    metrics.abandoned.inc();
                }
                Dispatched::Stale => {
                    metrics.stale_entries.inc();
                }
            }
        }
        metrics.outstanding_requests.set(state.requests.len() as i64);
        state
            .next_due()
            .map(|due| Duration::from_micros(due.saturating_sub(self.clock.now_micros())))
    }

    /// Run one pass of the worker without blocking.
    #[cfg(test)]
    pub(crate) fn tick(&self) -> Option<Duration> {
        let mut state = self.shared.state.lock();
        self.service(&mut state)
    }
}

/// Cloneable handle through which the network layer drives the scheduler.
///
/// Every method takes the global lock, applies its effect, and returns; none
/// blocks on anything else.
pub struct Scheduler<P: PeerId, K: Key, S: Sender<Key = K>> {
    shared: Arc<Shared<P, K, S>>,
    max_per_peer: usize,
}

impl<P: PeerId, K: Key, S: Sender<Key = K>> Clone for Scheduler<P, K, S> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            max_per_peer: self.max_per_peer,
        }
    }
}

impl<P: PeerId, K: Key, S: Sender<Key = K>> Scheduler<P, K, S> {
    /// Register a newly connected peer.
    pub fn connect(&self, peer: P) {
        let mut state = self.shared.state.lock();
        state.connect(peer);
        self.shared.metrics.connected_peers.set(state.peers.len() as i64);
    }

    /// Deregister `peer`, re-triggering selection for any item it was
    /// in-flight for.
    ///
    /// Panics if the peer was never registered.
    pub fn disconnect(&self, peer: &P) {
        let mut state = self.shared.state.lock();
        let requeued = state.disconnect(peer);
        self.shared.metrics.connected_peers.set(state.peers.len() as i64);
        if requeued > 0 {
            self.shared.wake.notify_one();
        }
    }

    /// Record that `peer` holds `item`, binding `sender` as the peer's
    /// current outbound handle. The first announce of an item begins a
    /// request.
    ///
    /// Panics if the peer was never registered.
    pub fn announce(&self, peer: P, sender: S, item: K) {
        let mut state = self.shared.state.lock();
        match state.announce(peer, sender, item, self.max_per_peer) {
            Announced::New => {
                self.shared.wake.notify_one();
            }
            Announced::Known => {}
            Announced::Dropped => {
                self.shared.metrics.announces_dropped.inc();
            }
        }
        self.shared
            .metrics
            .outstanding_requests
            .set(state.requests.len() as i64);
    }

    /// Record that the payload for `item` arrived, from any peer, and was
    /// accepted. Items with no outstanding request are ignored.
    pub fn complete(&self, item: &K) {
        let mut state = self.shared.state.lock();
        if state.complete(item) {
            self.shared.metrics.completed.inc();
        } else {
            self.shared.metrics.unknown_completes.inc();
        }
        self.shared
            .metrics
            .outstanding_requests
            .set(state.requests.len() as i64);
    }

    /// Number of items with an outstanding request.
    pub fn outstanding(&self) -> usize {
        self.shared.state.lock().requests.len()
    }

    /// Signal the worker to exit. In-flight fetches are not recalled; a late
    /// completion after stop is a no-op.
    pub fn stop(&self) {
        let mut state = self.shared.state.lock();
        state.stopped = true;
        self.shared.wake.notify_one();
    }
}
