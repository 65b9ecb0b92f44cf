//! The session's current DPoP key pair, tagged with a generation epoch.
//!
//! Switching algorithms quickly can leave several generations in flight. Each
//! request takes a [`Ticket`] with a new epoch; only the newest ticket may
//! commit, so a slow RSA generation cannot overwrite a later ES256 choice.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;
use tracing::debug;

use crate::algorithm::Algorithm;
use crate::error::KeyGenError;
use crate::keys::{KeyPair, generate_key_pair};

/// Permission to commit the result of one generation request.
#[derive(Debug)]
pub struct Ticket {
    epoch: u64,
    algorithm: Algorithm,
}

impl Ticket {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }
}

/// A value together with the epoch that produced it.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub epoch: u64,
    pub value: T,
}

#[derive(Debug, Clone)]
pub enum Commit {
    /// The key pair is now the session's current one.
    Current(Versioned<Arc<KeyPair>>),
    /// A newer request was issued first; the key pair was discarded.
    Superseded { epoch: u64, latest: u64 },
}

#[derive(Debug, Default)]
pub struct KeySession {
    latest: AtomicU64,
    current: RwLock<Option<Versioned<Arc<KeyPair>>>>,
}

impl KeySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a generation request. Any earlier ticket becomes stale.
    pub fn begin(&self, algorithm: Algorithm) -> Ticket {
        let epoch = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(epoch, alg = %algorithm, "key generation requested");
        Ticket { epoch, algorithm }
    }

    /// Store `key_pair` if `ticket` is still the newest request.
    pub async fn commit(&self, ticket: Ticket, key_pair: KeyPair) -> Commit {
        let mut slot = self.current.write().await;

        let latest = self.latest.load(Ordering::SeqCst);
        if ticket.epoch != latest {
            debug!(epoch = ticket.epoch, latest, "discarding superseded key pair");
            return Commit::Superseded {
                epoch: ticket.epoch,
                latest,
            };
        }

        let versioned = Versioned {
            epoch: ticket.epoch,
            value: Arc::new(key_pair),
        };
        *slot = Some(versioned.clone());
        debug!(epoch = ticket.epoch, alg = %ticket.algorithm, "key pair committed");
        Commit::Current(versioned)
    }

    /// Generate a key pair for `algorithm` and commit it if still wanted.
    ///
    /// Generation failures are returned as-is and never retried.
    pub async fn regenerate(&self, algorithm: Algorithm) -> Result<Commit, KeyGenError> {
        let ticket = self.begin(algorithm);
        let key_pair = generate_key_pair(algorithm).await?;
        Ok(self.commit(ticket, key_pair).await)
    }

    pub async fn current(&self) -> Option<Arc<KeyPair>> {
        self.current
            .read()
            .await
            .as_ref()
            .map(|v| Arc::clone(&v.value))
    }

    pub async fn current_versioned(&self) -> Option<Versioned<Arc<KeyPair>>> {
        self.current.read().await.clone()
    }

    /// Epoch of the newest request, committed or not.
    pub fn latest_epoch(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }
}
