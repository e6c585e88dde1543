// ============================
// crates/backend-lib/src/store.rs
// ============================
//! Shared state store abstraction with an in-memory implementation.
//!
//! The shared store is the only synchronization primitive across
//! server instances: plain keys with TTL hold room documents, and
//! ordered sets back the sliding-window rate limiter. A production
//! deployment points this trait at Redis; `MemoryStore` serves the
//! single-instance mode and every test.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors surfaced by store backends
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store corruption: {0}")]
    Corrupt(String),
}

/// Trait for shared state store backends
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Fetch the bytes stored under `key`, if any
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Store `value` under `key`, expiring after `ttl`
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError>;

    /// Remove `key`; absent keys are a no-op
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Add `member` with `score` to the ordered set at `key`
    async fn zadd(&self, key: &str, member: String, score: f64) -> Result<(), StoreError>;

    /// Remove ordered-set members with scores in `[min, max]`
    async fn zremrangebyscore(&self, key: &str, min: f64, max: f64) -> Result<(), StoreError>;

    /// Count members of the ordered set at `key`
    async fn zcard(&self, key: &str) -> Result<usize, StoreError>;

    /// Refresh the TTL of `key`
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Availability probe
    async fn ping(&self) -> Result<(), StoreError>;
}

struct ValueEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

struct ZSetEntry {
    /// member -> score; range ops scan scores
    members: BTreeMap<String, f64>,
    expires_at: Instant,
}

/// In-memory implementation of the `SharedStore` trait.
///
/// Expiry is lazy: entries past their deadline are treated as absent
/// on read and dropped on the next write to the same key. The
/// `available` switch lets tests exercise outage paths.
pub struct MemoryStore {
    values: DashMap<String, ValueEntry>,
    zsets: DashMap<String, ZSetEntry>,
    available: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            values: DashMap::new(),
            zsets: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate an outage (or recovery) of the backing store.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store offline".to_string()))
        }
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.check_available()?;
        let now = Instant::now();
        match self.values.get(key) {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.value.clone())),
            _ => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        self.check_available()?;
        self.values.insert(
            key.to_string(),
            ValueEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check_available()?;
        self.values.remove(key);
        Ok(())
    }

    async fn zadd(&self, key: &str, member: String, score: f64) -> Result<(), StoreError> {
        self.check_available()?;
        let now = Instant::now();
        let mut entry = self.zsets.entry(key.to_string()).or_insert_with(|| ZSetEntry {
            members: BTreeMap::new(),
            // zadd alone never persists a key; expire() sets the real TTL
            expires_at: now + Duration::from_secs(60),
        });
        if entry.expires_at <= now {
            entry.members.clear();
            entry.expires_at = now + Duration::from_secs(60);
        }
        entry.members.insert(member, score);
        Ok(())
    }

    async fn zremrangebyscore(&self, key: &str, min: f64, max: f64) -> Result<(), StoreError> {
        self.check_available()?;
        if let Some(mut entry) = self.zsets.get_mut(key) {
            entry
                .members
                .retain(|_, score| *score < min || *score > max);
        }
        Ok(())
    }

    async fn zcard(&self, key: &str) -> Result<usize, StoreError> {
        self.check_available()?;
        let now = Instant::now();
        match self.zsets.get(key) {
            Some(entry) if entry.expires_at > now => Ok(entry.members.len()),
            _ => Ok(0),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        self.check_available()?;
        let deadline = Instant::now() + ttl;
        if let Some(mut entry) = self.values.get_mut(key) {
            entry.expires_at = deadline;
        }
        if let Some(mut entry) = self.zsets.get_mut(key) {
            entry.expires_at = deadline;
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_roundtrip_and_delete() {
        let store = MemoryStore::new();
        store
            .put("room:10000", b"payload".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();

        let got = store.get("room:10000").await.unwrap();
        assert_eq!(got.as_deref(), Some(b"payload".as_ref()));

        store.delete("room:10000").await.unwrap();
        assert!(store.get("room:10000").await.unwrap().is_none());
        // Deleting an absent key is a no-op
        store.delete("room:10000").await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_value_reads_as_absent() {
        let store = MemoryStore::new();
        store
            .put("room:10001", b"v".to_vec(), Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store.get("room:10001").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_zset_window_ops() {
        let store = MemoryStore::new();
        for (member, score) in [("a", 1.0), ("b", 2.0), ("c", 3.0), ("d", 4.0)] {
            store
                .zadd("rl:x", member.to_string(), score)
                .await
                .unwrap();
        }
        assert_eq!(store.zcard("rl:x").await.unwrap(), 4);

        store.zremrangebyscore("rl:x", 0.0, 2.0).await.unwrap();
        assert_eq!(store.zcard("rl:x").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_store_errors() {
        let store = MemoryStore::new();
        store.set_available(false);
        assert!(matches!(
            store.get("k").await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.ping().await.is_err());

        store.set_available(true);
        assert!(store.ping().await.is_ok());
    }
}
