//! Cached server settings.
//!
//! Wraps storage's settings read behind a periodic-staleness cache.
//! Readers of a fresh cache take a shared lock and clone the current
//! snapshot; a stale cache is refreshed under the exclusive lock so
//! concurrent callers coalesce into a single storage read.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;

use crate::error::Result;
use crate::models::{AuthSettings, AuthSettingsUpdate};
use crate::storage::Storage;

const REFRESH_INTERVAL: Duration = Duration::from_secs(30);

struct CacheState {
    settings: AuthSettings,
    next_update: Instant,
}

/// Thread-safe settings cache with a 30 second staleness bound.
#[derive(Clone)]
pub struct SettingsCache {
    storage: Arc<dyn Storage>,
    state: Arc<RwLock<CacheState>>,
}

impl SettingsCache {
    /// Build the cache, seeding any missing stored settings with
    /// defaults (existing values are never overwritten).
    pub async fn new(storage: Arc<dyn Storage>) -> Result<Self> {
        storage
            .update_settings(&AuthSettings::default().as_update(), false)
            .await?;
        let settings = storage.get_settings().await?;
        Ok(Self {
            storage,
            state: Arc::new(RwLock::new(CacheState {
                settings,
                next_update: Instant::now() + REFRESH_INTERVAL,
            })),
        })
    }

    /// Current settings, re-read from storage if the cache is stale.
    pub async fn get(&self) -> Result<AuthSettings> {
        {
            let state = self.state.read().await;
            if Instant::now() < state.next_update {
                return Ok(state.settings.clone());
            }
        }

        let mut state = self.state.write().await;
        // A concurrent caller may have refreshed while this one waited
        // for the exclusive lock.
        if Instant::now() < state.next_update {
            return Ok(state.settings.clone());
        }

        let settings = self.storage.get_settings().await?;
        state.settings = settings.clone();
        state.next_update = Instant::now() + REFRESH_INTERVAL;
        debug!("Refreshed settings cache");
        Ok(settings)
    }

    /// Write settings through to storage and refresh immediately.
    pub async fn update(&self, update: &AuthSettingsUpdate, overwrite: bool) -> Result<()> {
        self.storage.update_settings(update, overwrite).await?;

        let mut state = self.state.write().await;
        state.settings = self.storage.get_settings().await?;
        state.next_update = Instant::now() + REFRESH_INTERVAL;
        Ok(())
    }

    /// Force the next read to hit storage.
    #[cfg(test)]
    pub async fn expire(&self) {
        let mut state = self.state.write().await;
        state.next_update = Instant::now() - Duration::from_secs(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStorage;

    async fn setup() -> (Arc<dyn Storage>, SettingsCache) {
        let storage: Arc<dyn Storage> =
            Arc::new(SqliteStorage::connect(":memory:").await.unwrap());
        let cache = SettingsCache::new(storage.clone()).await.unwrap();
        (storage, cache)
    }

    #[tokio::test]
    async fn test_seeds_defaults() {
        let (storage, cache) = setup().await;
        let settings = cache.get().await.unwrap();
        assert!(!settings.login_allowed);
        // The defaults were persisted, not just cached.
        assert_eq!(storage.get_settings().await.unwrap(), settings);
    }

    #[tokio::test]
    async fn test_serves_cached_snapshot_until_stale() {
        let (storage, cache) = setup().await;

        storage
            .update_settings(
                &AuthSettingsUpdate {
                    login_allowed: Some(true),
                    ..Default::default()
                },
                true,
            )
            .await
            .unwrap();

        // Fresh cache still serves the old snapshot.
        assert!(!cache.get().await.unwrap().login_allowed);

        cache.expire().await;
        assert!(cache.get().await.unwrap().login_allowed);
    }

    #[tokio::test]
    async fn test_update_refreshes_immediately() {
        let (_storage, cache) = setup().await;
        cache
            .update(
                &AuthSettingsUpdate {
                    login_allowed: Some(true),
                    ..Default::default()
                },
                true,
            )
            .await
            .unwrap();
        assert!(cache.get().await.unwrap().login_allowed);
    }
}
