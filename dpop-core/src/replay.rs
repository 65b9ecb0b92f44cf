//! DPoP `jti` replay protection.

use std::collections::HashMap;
use std::{future::Future, pin::Pin};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

/// Replay check result:
/// - `Ok(true)`: first time (stored)
/// - `Ok(false)`: replay detected (already exists)
/// - `Err(_)`: store failure (treat as fail-closed)
pub trait ReplayStore: Send + Sync {
    fn check_and_store<'a>(
        &'a self,
        key: &'a str,
        ttl_secs: u64,
    ) -> Pin<Box<dyn Future<Output = Result<bool, ReplayError>> + Send + 'a>>;
}

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("replay key must not be empty")]
    EmptyKey,

    #[error("replay ttl {0}s is out of range")]
    InvalidTtl(u64),
}

/// In-process replay store. Expired entries are swept on every insert.
#[derive(Debug)]
pub struct MemoryReplayStore {
    prefix: String,
    seen: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl Default for MemoryReplayStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryReplayStore {
    pub fn new() -> Self {
        Self::new_with_prefix("dpop:replay")
    }

    pub fn new_with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            seen: Mutex::new(HashMap::new()),
        }
    }

    pub fn key(&self, raw: &str) -> String {
        format!("{}:{}", self.prefix, raw)
    }

    pub async fn len(&self) -> usize {
        self.seen.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub(crate) async fn check_and_store_at(
        &self,
        key: &str,
        ttl_secs: u64,
        now: DateTime<Utc>,
    ) -> Result<bool, ReplayError> {
        if key.is_empty() {
            return Err(ReplayError::EmptyKey);
        }
        let ttl = i64::try_from(ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or(ReplayError::InvalidTtl(ttl_secs))?;

        let mut seen = self.seen.lock().await;
        seen.retain(|_, expires_at| *expires_at > now);

        let full_key = self.key(key);
        if seen.contains_key(&full_key) {
            return Ok(false);
        }
        seen.insert(full_key, now + ttl);
        Ok(true)
    }
}

impl ReplayStore for MemoryReplayStore {
    fn check_and_store<'a>(
        &'a self,
        key: &'a str,
        ttl_secs: u64,
    ) -> Pin<Box<dyn Future<Output = Result<bool, ReplayError>> + Send + 'a>> {
        Box::pin(self.check_and_store_at(key, ttl_secs, Utc::now()))
    }
}
