//! Out-of-band slot locks keyed by (business, staff, start)

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};

use crate::error::AppResult;

/// Expiring mutual-exclusion keys shared by every server instance
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Take `key` for `owner`. Succeeds when the key is free or already held
    /// by `owner`, in which case the TTL is refreshed.
    async fn try_acquire(&self, key: &str, owner: &str, ttl: Duration) -> AppResult<bool>;

    /// Release `key`. With an owner, only that owner may release it.
    async fn release(&self, key: &str, owner: Option<&str>) -> AppResult<bool>;

    /// Current holder of `key`, if the lock is live
    async fn holder(&self, key: &str) -> AppResult<Option<String>>;

    /// Drop expired entries; backends with native expiry have nothing to do
    async fn purge_expired(&self) -> AppResult<usize> {
        Ok(0)
    }
}

/// Process-local lock store for single-instance deployments and tests
#[derive(Default)]
pub struct MemoryLockStore {
    entries: DashMap<String, (String, Instant)>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn try_acquire(&self, key: &str, owner: &str, ttl: Duration) -> AppResult<bool> {
        let now = Instant::now();
        let expires = now + ttl;
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut e) => {
                let (holder, until) = e.get();
                if *until > now && holder != owner {
                    return Ok(false);
                }
                e.insert((owner.to_string(), expires));
                Ok(true)
            }
            Entry::Vacant(e) => {
                e.insert((owner.to_string(), expires));
                Ok(true)
            }
        }
    }

    async fn release(&self, key: &str, owner: Option<&str>) -> AppResult<bool> {
        let removed = match owner {
            Some(owner) => self.entries.remove_if(key, |_, (holder, _)| holder == owner),
            None => self.entries.remove(key),
        };
        Ok(removed.is_some())
    }

    async fn holder(&self, key: &str) -> AppResult<Option<String>> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .filter(|e| e.value().1 > now)
            .map(|e| e.value().0.clone()))
    }

    async fn purge_expired(&self) -> AppResult<usize> {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, (_, until)| *until > now);
        Ok(before - self.entries.len())
    }
}

/// Slot lock operations on top of a [`LockStore`]
#[derive(Clone)]
pub struct SlotLockManager {
    store: Arc<dyn LockStore>,
    ttl: Duration,
}

impl SlotLockManager {
    pub fn new(store: Arc<dyn LockStore>, ttl_minutes: i64) -> Self {
        Self {
            store,
            ttl: Duration::from_secs(ttl_minutes.max(1) as u64 * 60),
        }
    }

    pub fn key(business_id: i32, staff_id: i32, start: DateTime<Utc>) -> String {
        format!("slot_lock:{}:{}:{}", business_id, staff_id, start.to_rfc3339())
    }

    pub async fn lock(&self, key: &str, session_id: &str) -> AppResult<bool> {
        let acquired = self.store.try_acquire(key, session_id, self.ttl).await?;
        tracing::debug!(key, session_id, acquired, "Slot lock requested");
        Ok(acquired)
    }

    pub async fn unlock(&self, key: &str, session_id: Option<&str>) -> AppResult<bool> {
        self.store.release(key, session_id).await
    }

    pub async fn holder(&self, key: &str) -> AppResult<Option<String>> {
        self.store.holder(key).await
    }

    pub async fn purge_expired(&self) -> AppResult<usize> {
        self.store.purge_expired().await
    }
}
