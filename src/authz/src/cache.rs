//! TTL caching in front of a role source
//!
//! `CachingRoleStore` wraps any `RoleSource` and memoizes the full role map:
//!
//! 1. process-local memo (expires after the TTL)
//! 2. optional external TTL cache, keyed `<prefix>roles`
//! 3. the backing source
//!
//! Cache failures are logged and skipped; they never fail a read that the
//! backing source can answer.

use crate::error::Result;
use crate::hierarchy::HierarchyRuleSource;
use crate::store::{RoleFilter, RoleSource};
use crate::types::{RoleDescriptor, RoleMap};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default time-to-live for the cached role map (1 hour)
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Default key prefix in the external cache
pub const DEFAULT_KEY_PREFIX: &str = "rolevote.access.";

/// Key suffix of the cached role map
const ROLES_KEY: &str = "roles";

/// Value with an expiry instant
#[derive(Debug, Clone)]
pub struct CachedValue<T> {
    pub value: T,
    pub expires_at: Instant,
}

impl<T> CachedValue<T> {
    /// Wrap a value that expires after `ttl`
    pub fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    /// Checks if this value is past its expiry
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Returns the value if not expired, None otherwise
    pub fn get(&self) -> Option<&T> {
        if self.is_expired() {
            None
        } else {
            Some(&self.value)
        }
    }
}

/// External key/value cache with per-entry TTL
#[async_trait]
pub trait TtlCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// In-process TTL cache
#[derive(Default)]
pub struct InMemoryTtlCache {
    entries: DashMap<String, CachedValue<Vec<u8>>>,
}

impl InMemoryTtlCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry
    pub fn purge_expired(&self) {
        self.entries.retain(|_, entry| !entry.is_expired());
    }
}

#[async_trait]
impl TtlCache for InMemoryTtlCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if let Some(entry) = self.entries.get(key) {
            if let Some(value) = entry.get() {
                return Ok(Some(value.clone()));
            }
            // Expired - remove
            drop(entry);
            self.entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        self.entries.insert(key.to_string(), CachedValue::new(value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Caching store settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// Time-to-live of the cached role map
    pub ttl: Duration,

    /// Prefix of every key written to the external cache
    pub key_prefix: String,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

/// Caching store statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Reads answered by the local memo
    pub local_hits: u64,
    /// Reads answered by the external cache
    pub external_hits: u64,
    /// Reads that went to the backing source
    pub backing_fetches: u64,
    /// External cache failures (including undecodable entries)
    pub cache_errors: u64,
}

impl StoreStats {
    /// Fraction of role-map reads served without the backing source
    pub fn hit_rate(&self) -> f64 {
        let hits = self.local_hits + self.external_hits;
        let total = hits + self.backing_fetches;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct StoreCounters {
    local_hits: AtomicU64,
    external_hits: AtomicU64,
    backing_fetches: AtomicU64,
    cache_errors: AtomicU64,
}

/// Caching decorator around a role source
///
/// Only the role map is cached; every other read delegates to the backing
/// source. `CachingRoleStore` is itself a `RoleSource`, so decorators chain.
pub struct CachingRoleStore {
    backing: Arc<dyn RoleSource>,
    external: Option<Arc<dyn TtlCache>>,
    settings: CacheSettings,
    local: RwLock<Option<CachedValue<Arc<RoleMap>>>>,
    /// Bumped by every invalidation; reads started earlier must not cache
    generation: AtomicU64,
    counters: StoreCounters,
}

impl CachingRoleStore {
    /// Wrap `backing` with a local memo only
    pub fn new(backing: Arc<dyn RoleSource>) -> Self {
        Self::with_settings(backing, None, CacheSettings::default())
    }

    /// Wrap `backing` with a local memo and an external cache
    pub fn with_cache(backing: Arc<dyn RoleSource>, external: Arc<dyn TtlCache>) -> Self {
        Self::with_settings(backing, Some(external), CacheSettings::default())
    }

    pub fn with_settings(
        backing: Arc<dyn RoleSource>,
        external: Option<Arc<dyn TtlCache>>,
        settings: CacheSettings,
    ) -> Self {
        Self {
            backing,
            external,
            settings,
            local: RwLock::new(None),
            generation: AtomicU64::new(0),
            counters: StoreCounters::default(),
        }
    }

    /// The decorated source
    pub fn backing(&self) -> &Arc<dyn RoleSource> {
        &self.backing
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// External key of the cached role map
    pub fn roles_key(&self) -> String {
        format!("{}{}", self.settings.key_prefix, ROLES_KEY)
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            local_hits: self.counters.local_hits.load(Ordering::Relaxed),
            external_hits: self.counters.external_hits.load(Ordering::Relaxed),
            backing_fetches: self.counters.backing_fetches.load(Ordering::Relaxed),
            cache_errors: self.counters.cache_errors.load(Ordering::Relaxed),
        }
    }

    fn local_roles(&self) -> Option<Arc<RoleMap>> {
        self.local.read().as_ref().and_then(|cached| cached.get().cloned())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Store `roles` in the local memo unless an invalidation happened since `generation`
    fn remember(&self, roles: &Arc<RoleMap>, generation: u64) {
        let mut local = self.local.write();
        if self.is_current(generation) {
            *local = Some(CachedValue::new(Arc::clone(roles), self.settings.ttl));
        }
    }

    fn cache_failure(&self, key: &str, operation: &str, error: &dyn std::fmt::Display) {
        self.counters.cache_errors.fetch_add(1, Ordering::Relaxed);
        warn!(key, operation, error = %error, "Role cache unavailable, using backing source");
    }

    async fn read_external(&self, cache: &dyn TtlCache, key: &str) -> Option<Arc<RoleMap>> {
        let bytes = match cache.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                self.cache_failure(key, "get", &e);
                return None;
            }
        };

        match serde_json::from_slice::<RoleMap>(&bytes) {
            Ok(roles) => Some(Arc::new(roles)),
            Err(e) => {
                self.cache_failure(key, "decode", &e);
                None
            }
        }
    }

    async fn write_external(&self, cache: &dyn TtlCache, key: &str, roles: &RoleMap) {
        let bytes = match serde_json::to_vec(roles) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.cache_failure(key, "encode", &e);
                return;
            }
        };

        if let Err(e) = cache.set(key, bytes, self.settings.ttl).await {
            self.cache_failure(key, "set", &e);
        }
    }

    /// Drop the local memo and the external entry
    ///
    /// The next `roles()` call fetches from the backing source. A fetch
    /// already in flight still returns its result but does not cache it. A
    /// failing external delete is logged; the local memo is cleared
    /// regardless.
    pub async fn invalidate(&self) {
        {
            let mut local = self.local.write();
            self.generation.fetch_add(1, Ordering::SeqCst);
            *local = None;
        }

        if let Some(cache) = &self.external {
            let key = self.roles_key();
            if let Err(e) = cache.delete(&key).await {
                self.cache_failure(&key, "delete", &e);
            }
        }

        info!(key = %self.roles_key(), "Role cache invalidated");
    }
}

#[async_trait]
impl RoleSource for CachingRoleStore {
    fn prefix(&self) -> &str {
        self.backing.prefix()
    }

    async fn roles(&self) -> Result<Arc<RoleMap>> {
        if let Some(roles) = self.local_roles() {
            self.counters.local_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(roles);
        }

        let key = self.roles_key();
        let generation = self.generation.load(Ordering::SeqCst);

        if let Some(cache) = &self.external {
            if let Some(roles) = self.read_external(cache.as_ref(), &key).await {
                self.counters.external_hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, roles = roles.len(), "Role map served from external cache");
                self.remember(&roles, generation);
                return Ok(roles);
            }
        }

        let roles = self.backing.roles().await?;
        self.counters.backing_fetches.fetch_add(1, Ordering::Relaxed);
        debug!(roles = roles.len(), "Role map fetched from backing source");

        if !self.is_current(generation) {
            debug!(key = %key, "Role cache invalidated during fetch, result not cached");
            return Ok(roles);
        }

        if let Some(cache) = &self.external {
            self.write_external(cache.as_ref(), &key, &roles).await;

            // An invalidation may have deleted the entry while it was being written
            if !self.is_current(generation) {
                if let Err(e) = cache.delete(&key).await {
                    self.cache_failure(&key, "delete", &e);
                }
                return Ok(roles);
            }
        }

        self.remember(&roles, generation);
        Ok(roles)
    }

    async fn role_names(&self) -> Result<BTreeSet<String>> {
        self.backing.role_names().await
    }

    async fn role(&self, name: &str) -> Result<Option<RoleDescriptor>> {
        self.backing.role(name).await
    }

    async fn find_by(&self, filter: &RoleFilter) -> Result<Vec<RoleDescriptor>> {
        self.backing.find_by(filter).await
    }

    async fn hierarchy_rules(&self) -> Result<Vec<HierarchyRuleSource>> {
        self.backing.hierarchy_rules().await
    }

    async fn invalidate(&self) {
        CachingRoleStore::invalidate(self).await;
        self.backing.invalidate().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthzError;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    /// Backing source that counts role-map fetches
    struct CountingSource {
        roles: Arc<RoleMap>,
        fetches: AtomicUsize,
    }

    impl CountingSource {
        fn new(names: &[&str]) -> Arc<Self> {
            let roles = names
                .iter()
                .map(|name| {
                    (
                        name.to_string(),
                        RoleDescriptor {
                            name: name.to_string(),
                            title: format!("Title {}", name),
                            options: None,
                            group: None,
                            presets: Vec::new(),
                        },
                    )
                })
                .collect();

            Arc::new(Self {
                roles: Arc::new(roles),
                fetches: AtomicUsize::new(0),
            })
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RoleSource for CountingSource {
        fn prefix(&self) -> &str {
            "EAB_"
        }

        async fn roles(&self) -> Result<Arc<RoleMap>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::clone(&self.roles))
        }

        async fn role_names(&self) -> Result<BTreeSet<String>> {
            Ok(self.roles.keys().cloned().collect())
        }

        async fn role(&self, name: &str) -> Result<Option<RoleDescriptor>> {
            Ok(self.roles.get(name).cloned())
        }

        async fn find_by(&self, filter: &RoleFilter) -> Result<Vec<RoleDescriptor>> {
            Ok(self.roles.values().filter(|r| filter.matches(r)).cloned().collect())
        }

        async fn hierarchy_rules(&self) -> Result<Vec<HierarchyRuleSource>> {
            Ok(vec![HierarchyRuleSource::pattern("ROLE_ADMIN", "^EAB_")])
        }
    }

    /// Backing source whose first fetch waits until released
    ///
    /// The served map holds a single role `EAB_v<version>`, with the version
    /// read when the fetch starts.
    struct GatedSource {
        version: AtomicUsize,
        fetches: AtomicUsize,
        entered: Notify,
        release: Notify,
    }

    impl GatedSource {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                version: AtomicUsize::new(1),
                fetches: AtomicUsize::new(0),
                entered: Notify::new(),
                release: Notify::new(),
            })
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }

        fn snapshot(&self) -> RoleMap {
            let name = format!("EAB_v{}", self.version.load(Ordering::SeqCst));
            let descriptor = RoleDescriptor {
                name: name.clone(),
                title: name.clone(),
                options: None,
                group: None,
                presets: Vec::new(),
            };
            [(name, descriptor)].into_iter().collect()
        }
    }

    #[async_trait]
    impl RoleSource for GatedSource {
        fn prefix(&self) -> &str {
            "EAB_"
        }

        async fn roles(&self) -> Result<Arc<RoleMap>> {
            let first = self.fetches.fetch_add(1, Ordering::SeqCst) == 0;
            let roles = self.snapshot();
            if first {
                self.entered.notify_one();
                self.release.notified().await;
            }
            Ok(Arc::new(roles))
        }

        async fn role_names(&self) -> Result<BTreeSet<String>> {
            Ok(self.snapshot().into_keys().collect())
        }

        async fn role(&self, name: &str) -> Result<Option<RoleDescriptor>> {
            Ok(self.snapshot().remove(name))
        }

        async fn find_by(&self, filter: &RoleFilter) -> Result<Vec<RoleDescriptor>> {
            Ok(self.snapshot().into_values().filter(|r| filter.matches(r)).collect())
        }

        async fn hierarchy_rules(&self) -> Result<Vec<HierarchyRuleSource>> {
            Ok(Vec::new())
        }
    }

    /// External cache that always fails
    struct BrokenCache;

    #[async_trait]
    impl TtlCache for BrokenCache {
        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
            Err(AuthzError::Cache("connection refused".to_string()))
        }

        async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<()> {
            Err(AuthzError::Cache("connection refused".to_string()))
        }

        async fn delete(&self, _key: &str) -> Result<()> {
            Err(AuthzError::Cache("connection refused".to_string()))
        }
    }

    #[test]
    fn test_cached_value_expiry() {
        let fresh = CachedValue::new(1, Duration::from_secs(60));
        assert_eq!(fresh.get(), Some(&1));

        let stale = CachedValue::new(1, Duration::ZERO);
        assert!(stale.is_expired());
        assert!(stale.get().is_none());
    }

    #[tokio::test]
    async fn test_in_memory_cache() {
        let cache = InMemoryTtlCache::new();

        assert!(cache.get("k").await.unwrap().is_none());
        cache.set("k", b"v".to_vec(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"v".to_vec()));

        cache.delete("k").await.unwrap();
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_memory_cache_ttl() {
        let cache = InMemoryTtlCache::new();
        cache.set("k", b"v".to_vec(), Duration::from_secs(10)).await.unwrap();
        cache.set("other", b"v".to_vec(), Duration::from_secs(100)).await.unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;

        assert!(cache.get("k").await.unwrap().is_none());
        assert_eq!(cache.len(), 1);

        cache.set("short", b"v".to_vec(), Duration::from_secs(1)).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        cache.purge_expired();
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_local_memo_without_external_cache() {
        let backing = CountingSource::new(&["EAB_A", "EAB_B"]);
        let store = CachingRoleStore::new(backing.clone());

        let first = store.roles().await.unwrap();
        let second = store.roles().await.unwrap();

        assert_eq!(backing.fetches(), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.stats().local_hits, 1);
    }

    #[tokio::test]
    async fn test_fetch_counts_with_invalidation() {
        let backing = CountingSource::new(&["EAB_A"]);
        let cache = Arc::new(InMemoryTtlCache::new());
        let store = CachingRoleStore::with_cache(backing.clone(), cache.clone());

        store.roles().await.unwrap();
        assert_eq!(backing.fetches(), 1);

        store.roles().await.unwrap();
        assert_eq!(backing.fetches(), 1);

        store.invalidate().await;
        assert!(cache.get(&store.roles_key()).await.unwrap().is_none());

        store.roles().await.unwrap();
        assert_eq!(backing.fetches(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_during_fetch_forces_refetch() {
        let backing = GatedSource::new();
        let cache = Arc::new(InMemoryTtlCache::new());
        let store = Arc::new(CachingRoleStore::with_cache(backing.clone(), cache.clone()));

        let in_flight = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.roles().await.unwrap() })
        };
        backing.entered.notified().await;

        // Roles change while the first fetch is still running
        backing.version.store(2, Ordering::SeqCst);
        store.invalidate().await;
        backing.release.notify_one();

        let stale = in_flight.await.unwrap();
        assert!(stale.contains_key("EAB_v1"));
        assert!(cache.get(&store.roles_key()).await.unwrap().is_none());

        let fresh = store.roles().await.unwrap();
        assert_eq!(backing.fetches(), 2);
        assert!(fresh.contains_key("EAB_v2"));
        assert!(cache.get(&store.roles_key()).await.unwrap().is_some());

        store.roles().await.unwrap();
        assert_eq!(backing.fetches(), 2);
    }

    #[tokio::test]
    async fn test_external_hit_skips_backing() {
        let backing = CountingSource::new(&["EAB_A", "EAB_B"]);
        let cache = Arc::new(InMemoryTtlCache::new());

        // Another process already populated the shared cache
        let warm = CachingRoleStore::with_cache(backing.clone(), cache.clone());
        warm.roles().await.unwrap();
        assert_eq!(backing.fetches(), 1);

        let cold = CachingRoleStore::with_cache(backing.clone(), cache.clone());
        let roles = cold.roles().await.unwrap();

        assert_eq!(backing.fetches(), 1);
        assert_eq!(roles.len(), 2);
        assert_eq!(roles["EAB_B"].title, "Title EAB_B");
        assert_eq!(cold.stats().external_hits, 1);
    }

    #[tokio::test]
    async fn test_custom_key_prefix() {
        let backing = CountingSource::new(&["EAB_A"]);
        let cache = Arc::new(InMemoryTtlCache::new());
        let settings = CacheSettings {
            ttl: Duration::from_secs(5),
            key_prefix: "tenant42.".to_string(),
        };
        let store = CachingRoleStore::with_settings(backing, Some(cache.clone() as Arc<dyn TtlCache>), settings);

        store.roles().await.unwrap();

        assert_eq!(store.roles_key(), "tenant42.roles");
        assert!(cache.get("tenant42.roles").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_memo_expires() {
        let backing = CountingSource::new(&["EAB_A"]);
        let settings = CacheSettings {
            ttl: Duration::from_secs(30),
            ..Default::default()
        };
        let store = CachingRoleStore::with_settings(backing.clone(), None, settings);

        store.roles().await.unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;
        store.roles().await.unwrap();
        assert_eq!(backing.fetches(), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        store.roles().await.unwrap();
        assert_eq!(backing.fetches(), 2);
    }

    #[tokio::test]
    async fn test_broken_cache_falls_back() {
        let backing = CountingSource::new(&["EAB_A"]);
        let store = CachingRoleStore::with_cache(backing.clone(), Arc::new(BrokenCache));

        let roles = store.roles().await.unwrap();
        assert!(roles.contains_key("EAB_A"));
        assert_eq!(backing.fetches(), 1);

        // get + set failed
        assert_eq!(store.stats().cache_errors, 2);

        store.invalidate().await;
        store.roles().await.unwrap();
        assert_eq!(backing.fetches(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let backing = CountingSource::new(&["EAB_A"]);
        let cache = Arc::new(InMemoryTtlCache::new());
        let store = CachingRoleStore::with_cache(backing.clone(), cache.clone());

        cache
            .set(&store.roles_key(), b"not json".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();

        let roles = store.roles().await.unwrap();
        assert_eq!(roles.len(), 1);
        assert_eq!(backing.fetches(), 1);
        assert_eq!(store.stats().cache_errors, 1);

        // Overwritten with a valid entry
        let bytes = cache.get(&store.roles_key()).await.unwrap().unwrap();
        assert!(serde_json::from_slice::<RoleMap>(&bytes).is_ok());
    }

    #[tokio::test]
    async fn test_other_reads_delegate() {
        let backing = CountingSource::new(&["EAB_A", "EAB_B"]);
        let store = CachingRoleStore::new(backing.clone());

        assert_eq!(store.prefix(), "EAB_");
        assert_eq!(store.role_names().await.unwrap().len(), 2);
        assert!(store.role("EAB_A").await.unwrap().is_some());
        assert_eq!(store.find_by(&RoleFilter::new().names(["EAB_B"])).await.unwrap().len(), 1);
        assert_eq!(store.hierarchy_rules().await.unwrap().len(), 1);

        // None of those touch the role map
        assert_eq!(backing.fetches(), 0);
    }

    #[tokio::test]
    async fn test_chained_invalidation() {
        let backing = CountingSource::new(&["EAB_A"]);
        let inner = Arc::new(CachingRoleStore::new(backing.clone()));
        let outer = CachingRoleStore::new(inner.clone());

        outer.roles().await.unwrap();
        outer.roles().await.unwrap();
        assert_eq!(backing.fetches(), 1);

        RoleSource::invalidate(&outer).await;
        outer.roles().await.unwrap();
        assert_eq!(backing.fetches(), 2);
        assert_eq!(inner.stats().backing_fetches, 2);
    }

    #[test]
    fn test_stats_hit_rate() {
        let stats = StoreStats {
            local_hits: 2,
            external_hits: 1,
            backing_fetches: 1,
            cache_errors: 0,
        };
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
        assert_eq!(StoreStats::default().hit_rate(), 0.0);
    }
}
