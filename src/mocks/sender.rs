use crate::{Key, PeerId};
use parking_lot::Mutex;
use std::sync::Arc;

/// Shared log of every fetch issued through [`Sender`] handles, in order.
#[derive(Clone)]
pub struct Journal<P: PeerId, K: Key> {
    fetches: Arc<Mutex<Vec<(P, K)>>>,
}

impl<P: PeerId, K: Key> Journal<P, K> {
    pub fn new() -> Self {
        Self {
            fetches: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create an outbound handle whose fetches are attributed to `peer`.
    pub fn sender(&self, peer: P) -> Sender<P, K> {
        Sender {
            peer,
            journal: self.clone(),
        }
    }

    /// Every `(peer, item)` fetch issued so far.
    pub fn fetches(&self) -> Vec<(P, K)> {
        self.fetches.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.fetches.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.fetches.lock().is_empty()
    }
}

impl<P: PeerId, K: Key> Default for Journal<P, K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Recording outbound handle attributed to one peer.
#[derive(Clone)]
pub struct Sender<P: PeerId, K: Key> {
    peer: P,
    journal: Journal<P, K>,
}

impl<P: PeerId, K: Key> crate::Sender for Sender<P, K> {
    type Key = K;

    fn fetch(&mut self, key: K) {
        self.journal.fetches.lock().push((self.peer.clone(), key));
    }
}
