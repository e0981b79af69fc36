//! Shared scheduler state: the peer registry, the request table, and the
//! work queue, kept mutually consistent under one lock.

use crate::{queue::WorkQueue, Key, PeerId, Sender};
use std::collections::{hash_map, BTreeSet, HashMap, HashSet};
use tracing::{debug, trace};

/// Per-peer state.
pub(crate) struct PeerState<K: Key, S> {
    /// Items announced by this peer whose request is still outstanding.
    pub(crate) items: HashSet<K>,

    /// Outbound handle bound by the most recent announce.
    pub(crate) sender: Option<S>,
}

impl<K: Key, S> PeerState<K, S> {
    fn new() -> Self {
        Self {
            items: HashSet::new(),
            sender: None,
        }
    }
}

/// State of one outstanding item request.
pub(crate) struct Request<P: PeerId> {
    /// Peers that have announced the item, in ascending order.
    pub(crate) candidates: BTreeSet<P>,

    /// Candidates not yet asked for the item; always a subset of
    /// `candidates`.
    pub(crate) untried: BTreeSet<P>,

    /// Peer currently expected to deliver the payload, if any.
    pub(crate) in_flight: Option<P>,
}

/// Outcome of recording an announce.
pub(crate) enum Announced {
    /// First announce of the item: a request row and an immediately-due
    /// queue entry were created, so the worker needs a wake-up.
    New,
    /// The item already had a request row; the peer was merged in.
    Known,
    /// The peer is at its outstanding-item bound; nothing was recorded.
    Dropped,
}

/// Outcome of dispatching a due queue entry.
pub(crate) enum Dispatched {
    /// A fetch was issued; `retry` marks attempts after the first.
    Requested { retry: bool },
    /// No untried candidate remained; the request was forgotten.
    Abandoned,
    /// The request row was already gone (raced with a completion).
    Stale,
}

pub(crate) struct State<P: PeerId, K: Key, S: Sender<Key = K>> {
    /// Registered peers.
    pub(crate) peers: HashMap<P, PeerState<K, S>>,

    /// Outstanding item requests.
    pub(crate) requests: HashMap<K, Request<P>>,

    /// Deadline-ordered queue; every request row has exactly one entry.
    pub(crate) queue: WorkQueue<K>,

    /// Set by `stop`; the worker exits once it observes the flag.
    pub(crate) stopped: bool,
}

impl<P: PeerId, K: Key, S: Sender<Key = K>> State<P, K, S> {
    pub(crate) fn new() -> Self {
        Self {
            peers: HashMap::new(),
            requests: HashMap::new(),
            queue: WorkQueue::new(),
            stopped: false,
        }
    }

    /// Register a peer. Registering an already-known peer is a no-op.
    pub(crate) fn connect(&mut self, peer: P) {
        self.peers.entry(peer).or_insert_with(PeerState::new);
    }

    /// Deregister a peer, purging it from every request it announced.
    ///
    /// Items the peer was in-flight for are re-queued as immediately due so
    /// the next candidate can be selected. Returns the number of items
    /// re-queued. Requests whose candidate set became empty are left for the
    /// worker to abandon on its next visit.
    ///
    /// Panics if the peer was never registered.
    pub(crate) fn disconnect(&mut self, peer: &P) -> usize {
        let state = self
            .peers
            .remove(peer)
            .expect("disconnect of unregistered peer");
        let mut requeued = 0;
        for item in state.items {
            let Some(request) = self.requests.get_mut(&item) else {
                continue;
            };
            request.candidates.remove(peer);
            request.untried.remove(peer);
            if request.in_flight.as_ref() == Some(peer) {
                debug!(?item, ?peer, "in-flight peer disconnected, re-queueing");
                request.in_flight = None;
                // Replaces the now-stale retry deadline.
                self.queue.put(item, 0);
                requeued += 1;
            }
        }
        requeued
    }

    /// Record that `peer` claims to hold `item`, binding `sender` as the
    /// peer's current outbound handle.
    ///
    /// Panics if the peer was never registered.
    pub(crate) fn announce(
        &mut self,
        peer: P,
        sender: S,
        item: K,
        max_per_peer: usize,
    ) -> Announced {
        let state = self
            .peers
            .get_mut(&peer)
            .expect("announce from unregistered peer");
        // The latest announce's handle is authoritative, even when the
        // announce itself is dropped below.
        state.sender = Some(sender);

        // Bounding outstanding items per peer indirectly bounds every data
        // structure.
        if !state.items.contains(&item) && state.items.len() >= max_per_peer {
            trace!(?item, ?peer, "peer at outstanding-item bound, dropping announce");
            return Announced::Dropped;
        }
        trace!(?item, ?peer, "announce");

        let outcome = match self.requests.entry(item.clone()) {
            hash_map::Entry::Vacant(entry) => {
                entry.insert(Request {
                    candidates: BTreeSet::from([peer.clone()]),
                    untried: BTreeSet::from([peer.clone()]),
                    in_flight: None,
                });
                // First announce of the item by anyone: due immediately.
                self.queue.put(item.clone(), 0);
                Announced::New
            }
            hash_map::Entry::Occupied(mut entry) => {
                let request = entry.get_mut();
                if request.candidates.insert(peer.clone()) {
                    // First announce by this peer: eligible for selection.
                    request.untried.insert(peer.clone());
                }
                Announced::Known
            }
        };
        state.items.insert(item);
        outcome
    }

    /// Retire an item whose payload arrived and was accepted.
    ///
    /// Returns `true` if an outstanding request was forgotten. Unknown items
    /// return `false`: a peer may deliver after a retry already completed
    /// the item.
    pub(crate) fn complete(&mut self, item: &K) -> bool {
        if self.requests.contains_key(item) {
            trace!(?item, "completed");
            self.forget(item);
            true
        } else {
            trace!(?item, "completed item is not outstanding");
            false
        }
    }

    /// Remove every record of `item`: the request row, its queue entry, and
    /// the item's membership in each candidate peer's set. Afterwards the
    /// item is as if it had never been announced.
    fn forget(&mut self, item: &K) {
        let request = self.requests.remove(item).expect("forget of unknown item");
        for peer in &request.candidates {
            let state = self
                .peers
                .get_mut(peer)
                .expect("candidate is not a registered peer");
            state.items.remove(item);
        }
        self.queue.remove(item);
    }

    /// The earliest deadline in the work queue, if any.
    pub(crate) fn next_due(&self) -> Option<u64> {
        self.queue.next_due()
    }

    /// Pop the earliest queue entry if it is due at `now`.
    pub(crate) fn pop_due(&mut self, now: u64) -> Option<K> {
        if self.queue.next_due()? > now {
            return None;
        }
        self.queue.pop_first().map(|(item, _)| item)
    }

    /// Act on a popped queue entry: pick the smallest untried announcer,
    /// issue a fetch through its bound handle, and schedule the retry
    /// deadline. Forgets the request instead when no untried candidate
    /// remains.
    pub(crate) fn dispatch(&mut self, item: K, now: u64, timeout_micros: u64) -> Dispatched {
        let Some(request) = self.requests.get_mut(&item) else {
            // The entry outlived its row: a completion raced with the pop.
            trace!(?item, "due entry has no request row");
            return Dispatched::Stale;
        };
        if request.untried.is_empty() {
            debug!(?item, "no untried peer remains, giving up");
            self.forget(&item);
            return Dispatched::Abandoned;
        }
        let peer = request.untried.pop_first().expect("untried is non-empty");
        // A still-set in-flight peer is a previous attempt that timed out.
        // It is not re-added to untried, so each candidate is asked at most
        // once.
        let retry = request.in_flight.replace(peer.clone()).is_some();
        let sender = self
            .peers
            .get_mut(&peer)
            .expect("candidate is not a registered peer")
            .sender
            .as_mut()
            .expect("candidate peer has no bound handle");
        debug!(?item, ?peer, retry, "requesting item");
        sender.fetch(item.clone());
        self.queue.put(item, now + timeout_micros);
        Dispatched::Requested { retry }
    }
}

#[cfg(test)]
impl<P: PeerId, K: Key, S: Sender<Key = K>> State<P, K, S> {
    /// Panics unless every cross-structure invariant holds.
    pub(crate) fn assert_invariants(&self) {
        for (peer, state) in &self.peers {
            for item in &state.items {
                let request = self
                    .requests
                    .get(item)
                    .expect("peer item without request row");
                assert!(
                    request.candidates.contains(peer),
                    "peer holds item it is not a candidate for"
                );
            }
        }
        for (item, request) in &self.requests {
            for peer in &request.candidates {
                let state = self.peers.get(peer).expect("candidate is not registered");
                assert!(
                    state.items.contains(item),
                    "candidate does not hold the item"
                );
            }
            assert!(request.untried.is_subset(&request.candidates));
            if let Some(peer) = &request.in_flight {
                assert!(!request.untried.contains(peer));
                assert!(request.candidates.contains(peer));
            }
            let due = self
                .queue
                .get(item)
                .expect("request row without queue entry");
            match request.in_flight {
                None => assert_eq!(due, 0, "never-tried request must be immediately due"),
                Some(_) => assert!(due > 0, "in-flight request must carry a retry deadline"),
            }
            if request.candidates.is_empty() {
                assert!(request.in_flight.is_none());
                assert_eq!(due, 0);
            }
        }
        assert_eq!(self.queue.len(), self.requests.len());
        let mut last = None;
        for (item, due) in self.queue.iter() {
            assert!(self.requests.contains_key(item));
            assert!(last <= Some(due), "queue must be ordered by deadline");
            last = Some(due);
        }
    }
}
