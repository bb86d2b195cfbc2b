//! Vendor-local id to canonical id resolution
//!
//! Lookups go through one read-through cache per tier. The podcast cache is
//! LRU-bounded (512 by default); the episode cache is unbounded unless a
//! capacity is configured. Misses are cached too, so a mapping that appears
//! mid-run is only picked up by a fresh resolver.

use async_trait::async_trait;
use lru::LruCache;
use podmetrics_common::types::{Tier, Vendor};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::config::{LoaderConfig, DEFAULT_PODCAST_CACHE_CAPACITY};
use crate::error::LoaderResult;

/// Read-only provider-mapping lookup: zero or one canonical id per
/// `(provider code, provider-local id, data category)`.
#[async_trait]
pub trait ProviderMapping: Send + Sync {
    async fn internal_id(
        &self,
        provider_code: &str,
        provider_id: &str,
        data_category: &str,
    ) -> LoaderResult<Option<Uuid>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverCacheConfig {
    pub podcast_capacity: NonZeroUsize,
    /// `None` = unbounded
    pub episode_capacity: Option<NonZeroUsize>,
}

impl Default for ResolverCacheConfig {
    fn default() -> Self {
        Self {
            podcast_capacity: NonZeroUsize::new(DEFAULT_PODCAST_CACHE_CAPACITY)
                .unwrap_or(NonZeroUsize::MIN),
            episode_capacity: None,
        }
    }
}

impl From<&LoaderConfig> for ResolverCacheConfig {
    fn from(config: &LoaderConfig) -> Self {
        Self {
            podcast_capacity: NonZeroUsize::new(config.podcast_cache_capacity)
                .unwrap_or(NonZeroUsize::MIN),
            episode_capacity: config.episode_cache_capacity.and_then(NonZeroUsize::new),
        }
    }
}

type IdCache = Mutex<LruCache<(Vendor, String), Option<Uuid>>>;

pub struct IdentifierResolver {
    mapping: Arc<dyn ProviderMapping>,
    podcasts: IdCache,
    episodes: IdCache,
}

impl IdentifierResolver {
    pub fn new(mapping: Arc<dyn ProviderMapping>, config: ResolverCacheConfig) -> Self {
        let episodes = match config.episode_capacity {
            Some(capacity) => LruCache::new(capacity),
            None => LruCache::unbounded(),
        };
        Self {
            mapping,
            podcasts: Mutex::new(LruCache::new(config.podcast_capacity)),
            episodes: Mutex::new(episodes),
        }
    }

    /// Canonical id for a vendor-local id, or `None` when no mapping exists yet.
    pub async fn resolve(
        &self,
        vendor: Vendor,
        tier: Tier,
        vendor_local_id: &str,
    ) -> LoaderResult<Option<Uuid>> {
        let cache = match tier {
            Tier::Podcast => &self.podcasts,
            Tier::Episode => &self.episodes,
        };
        let key = (vendor, vendor_local_id.to_string());

        let cached = lock(cache).get(&key).copied();
        if let Some(hit) = cached {
            return Ok(hit);
        }

        let resolved = self
            .mapping
            .internal_id(vendor.code(), vendor_local_id, tier.name())
            .await?;
        lock(cache).put(key, resolved);
        Ok(resolved)
    }

    pub fn cached(&self, tier: Tier) -> usize {
        match tier {
            Tier::Podcast => lock(&self.podcasts).len(),
            Tier::Episode => lock(&self.episodes).len(),
        }
    }
}

fn lock(cache: &IdCache) -> std::sync::MutexGuard<'_, LruCache<(Vendor, String), Option<Uuid>>> {
    cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Mapping table held in memory; counts lookups so cache behavior is observable.
#[derive(Default)]
pub struct MemoryProviderMapping {
    ids: HashMap<(String, String, String), Uuid>,
    lookups: AtomicUsize,
}

impl MemoryProviderMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, vendor: Vendor, tier: Tier, provider_id: &str, internal_id: Uuid) -> Self {
        self.insert(vendor, tier, provider_id, internal_id);
        self
    }

    pub fn insert(&mut self, vendor: Vendor, tier: Tier, provider_id: &str, internal_id: Uuid) {
        self.ids.insert(
            (
                vendor.code().to_string(),
                provider_id.to_string(),
                tier.name().to_string(),
            ),
            internal_id,
        );
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderMapping for MemoryProviderMapping {
    async fn internal_id(
        &self,
        provider_code: &str,
        provider_id: &str,
        data_category: &str,
    ) -> LoaderResult<Option<Uuid>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .ids
            .get(&(
                provider_code.to_string(),
                provider_id.to_string(),
                data_category.to_string(),
            ))
            .copied())
    }
}
