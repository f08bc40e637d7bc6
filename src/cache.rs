//! Resource Cache
//!
//! One JSON file per provider under the cache directory. Reads and writes for
//! the same provider are serialized by a per-provider lock; different
//! providers never wait on each other. Writes go to a unique temp file that
//! is renamed over the target, so readers see either the old or the new
//! entry and never a partial one.

use crate::error::CacheError;
use crate::provider::ProviderResources;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// File name suffix of cache entries: `<provider>_resources.json`
pub const CACHE_SUFFIX: &str = "_resources.json";

const TMP_SUFFIX: &str = ".tmp";

/// On-disk cache entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(with = "timestamp_format")]
    pub timestamp: DateTime<Utc>,
    pub provider: String,
    pub resources: ProviderResources,
}

impl CacheEntry {
    pub fn new(provider: &str, resources: ProviderResources) -> Self {
        Self {
            timestamp: Utc::now(),
            provider: provider.to_string(),
            resources,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.timestamp)
    }
}

/// RFC 3339 on write; offset-less ISO-8601 is accepted on read as UTC
mod timestamp_format {
    use super::*;

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(serde::de::Error::custom)
    }
}

/// Metadata about one cache file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryInfo {
    pub timestamp: DateTime<Utc>,
    /// Age in hours, rounded to one decimal
    pub age_hours: f64,
    pub file_size: u64,
    pub regions_count: usize,
    pub instance_types_count: usize,
}

/// Status of one cache file
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntryStatus {
    Cached(EntryInfo),
    Corrupted { error: String },
}

/// File-backed cache of provider resources
pub struct ResourceCache {
    dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ResourceCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a provider's cache file
    pub fn entry_path(&self, provider: &str) -> Result<PathBuf, CacheError> {
        validate_provider(provider)?;
        Ok(self.dir.join(format!("{}{}", provider, CACHE_SUFFIX)))
    }

    /// Get or create the lock for a provider
    fn lock_for(&self, provider: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(provider.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Cached resources if present, valid and younger than `ttl`
    pub async fn get(&self, provider: &str, ttl: Duration) -> Option<ProviderResources> {
        self.get_at(provider, ttl, Utc::now()).await
    }

    /// [`get`](Self::get) evaluated at an explicit instant
    pub async fn get_at(
        &self,
        provider: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Option<ProviderResources> {
        let path = self.entry_path(provider).ok()?;
        let lock = self.lock_for(provider);
        let _guard = lock.lock().await;

        let content = match fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Failed to read cache for {}: {}", provider, e);
                return None;
            }
        };

        let entry = match parse_entry(&content, provider, now) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Ignoring corrupted cache for {}: {}", provider, e);
                return None;
            }
        };

        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        if entry.age(now) > ttl {
            tracing::debug!("Cache for {} expired ({} old)", provider, entry.age(now));
            return None;
        }

        tracing::debug!("Cache hit for {}", provider);
        Some(entry.resources)
    }

    /// Store resources for a provider, stamped with the current time
    pub async fn put(&self, provider: &str, resources: &ProviderResources) -> Result<(), CacheError> {
        let entry = CacheEntry::new(provider, resources.clone());
        self.put_entry(&entry).await
    }

    /// Store a complete entry, replacing the provider's file atomically
    pub async fn put_entry(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let path = self.entry_path(&entry.provider)?;
        let content = serde_json::to_vec_pretty(entry)?;

        let lock = self.lock_for(&entry.provider);
        let _guard = lock.lock().await;

        fs::create_dir_all(&self.dir).await?;
        write_atomic(&path, &content).await?;

        tracing::debug!("Cached {} resources ({} bytes)", entry.provider, content.len());
        Ok(())
    }

    /// Remove one provider's entry, or every entry. Returns the number removed.
    pub async fn clear(&self, provider: Option<&str>) -> Result<usize, CacheError> {
        let providers = match provider {
            Some(name) => {
                validate_provider(name)?;
                vec![name.to_string()]
            }
            None => self.cached_providers().await?,
        };

        let mut cleared = 0;
        for name in providers {
            let path = self.entry_path(&name)?;
            let lock = self.lock_for(&name);
            let _guard = lock.lock().await;

            match fs::remove_file(&path).await {
                Ok(()) => cleared += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Failed to clear cache for {}: {}", name, e),
            }
        }

        Ok(cleared)
    }

    /// Per-provider metadata for every cache file, sorted by provider
    pub async fn status(&self) -> Result<BTreeMap<String, EntryStatus>, CacheError> {
        let now = Utc::now();
        let mut report = BTreeMap::new();

        for provider in self.cached_providers().await? {
            let path = self.entry_path(&provider)?;
            let lock = self.lock_for(&provider);
            let _guard = lock.lock().await;

            let status = match read_info(&path, &provider, now).await {
                Ok(info) => EntryStatus::Cached(info),
                Err(e) => EntryStatus::Corrupted {
                    error: e.to_string(),
                },
            };
            report.insert(provider, status);
        }

        Ok(report)
    }

    /// Delete cache files (and orphaned temp files) last modified before
    /// `now - max_age`. Returns the number of files removed.
    pub async fn prune(&self, max_age: Duration) -> Result<usize, CacheError> {
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut removed = 0;

        for file_name in self.list_files().await? {
            if !file_name.ends_with(CACHE_SUFFIX) && !file_name.ends_with(TMP_SUFFIX) {
                continue;
            }

            // Temp files share their target's lock so in-flight writes are not pruned
            let lock = file_owner(&file_name).map(|p| self.lock_for(p));
            let _guard = match &lock {
                Some(lock) => Some(lock.lock().await),
                None => None,
            };

            let path = self.dir.join(&file_name);
            let modified = match fs::metadata(&path).await.and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) => {
                    tracing::warn!("Failed to check {}: {}", path.display(), e);
                    continue;
                }
            };

            if modified < cutoff {
                match fs::remove_file(&path).await {
                    Ok(()) => {
                        tracing::debug!("Pruned {}", path.display());
                        removed += 1;
                    }
                    Err(e) => tracing::warn!("Failed to delete {}: {}", path.display(), e),
                }
            }
        }

        Ok(removed)
    }

    /// Providers that currently have a cache file
    async fn cached_providers(&self) -> Result<Vec<String>, CacheError> {
        let mut providers: Vec<String> = self
            .list_files()
            .await?
            .into_iter()
            .filter_map(|name| name.strip_suffix(CACHE_SUFFIX).map(str::to_string))
            .filter(|name| validate_provider(name).is_ok())
            .collect();
        providers.sort();
        Ok(providers)
    }

    async fn list_files(&self) -> Result<Vec<String>, CacheError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }
}

/// Provider identifiers double as file names
fn validate_provider(provider: &str) -> Result<(), CacheError> {
    let valid = !provider.is_empty()
        && provider
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(CacheError::Invalid(format!("invalid provider name: {:?}", provider)))
    }
}

/// Provider owning a cache file or one of its temp files
/// (`<provider>_resources.json` or `<provider>_resources.json.<uuid>.tmp`)
fn file_owner(file_name: &str) -> Option<&str> {
    let target = match file_name.strip_suffix(TMP_SUFFIX) {
        Some(tmp) => tmp.rsplit_once('.').map(|(target, _uuid)| target)?,
        None => file_name,
    };
    target
        .strip_suffix(CACHE_SUFFIX)
        .filter(|provider| validate_provider(provider).is_ok())
}

fn parse_entry(content: &[u8], provider: &str, now: DateTime<Utc>) -> Result<CacheEntry, CacheError> {
    let entry: CacheEntry = serde_json::from_slice(content)?;

    if entry.provider != provider {
        return Err(CacheError::Invalid(format!(
            "entry belongs to {:?}, not {:?}",
            entry.provider, provider
        )));
    }
    if entry.timestamp > now {
        return Err(CacheError::Invalid(format!(
            "timestamp {} is in the future",
            entry.timestamp
        )));
    }

    Ok(entry)
}

async fn read_info(path: &Path, provider: &str, now: DateTime<Utc>) -> Result<EntryInfo, CacheError> {
    let content = fs::read(path).await?;
    let file_size = fs::metadata(path).await?.len();
    let entry = parse_entry(&content, provider, now)?;

    let age_secs = entry.age(now).num_milliseconds() as f64 / 1000.0;
    Ok(EntryInfo {
        timestamp: entry.timestamp,
        age_hours: (age_secs / 3600.0 * 10.0).round() / 10.0,
        file_size,
        regions_count: entry.resources.regions.len(),
        instance_types_count: entry.resources.instance_type_count(),
    })
}

/// Write `contents` to a unique temp file beside `path`, sync it, then
/// rename it over `path`. The temp file is removed if any step fails.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"))?;
    let tmp = path.with_file_name(format!(
        "{}.{}{}",
        file_name,
        Uuid::new_v4().simple(),
        TMP_SUFFIX
    ));

    let result: std::io::Result<()> = async {
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, path).await
    }
    .await;

    if result.is_err() {
        let _ = fs::remove_file(&tmp).await;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::tempdir;

    const SIX_HOURS: Duration = Duration::from_secs(6 * 3600);

    fn resources(regions: &[&str]) -> ProviderResources {
        ProviderResources {
            regions: regions.iter().map(|r| r.to_string()).collect(),
            instance_types: BTreeMap::from([
                ("*".to_string(), vec!["small".to_string(), "large".to_string()]),
                ("nyc1".to_string(), vec!["small".to_string()]),
            ]),
            ..Default::default()
        }
    }

    fn tmp_files(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok()?.file_name().into_string().ok())
            .filter(|n| n.ends_with(TMP_SUFFIX))
            .collect()
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let dir = tempdir().unwrap();
        let cache = ResourceCache::new(dir.path());

        assert!(cache.get("acme", SIX_HOURS).await.is_none());

        cache.put("acme", &resources(&["nyc1"])).await.unwrap();
        let cached = cache.get("acme", SIX_HOURS).await.unwrap();
        assert_eq!(cached, resources(&["nyc1"]));
        assert!(dir.path().join("acme_resources.json").exists());
        assert!(tmp_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_ttl_boundaries() {
        let dir = tempdir().unwrap();
        let cache = ResourceCache::new(dir.path());
        let written = Utc::now() - chrono::Duration::hours(1);
        cache
            .put_entry(&CacheEntry {
                timestamp: written,
                provider: "acme".into(),
                resources: resources(&["nyc1"]),
            })
            .await
            .unwrap();

        let just_before = written + chrono::Duration::hours(6) - chrono::Duration::seconds(1);
        let just_after = written + chrono::Duration::hours(6) + chrono::Duration::seconds(1);

        assert!(cache.get_at("acme", SIX_HOURS, just_before).await.is_some());
        assert!(cache.get_at("acme", SIX_HOURS, just_after).await.is_none());
    }

    #[tokio::test]
    async fn test_stale_then_refreshed() {
        let dir = tempdir().unwrap();
        let cache = ResourceCache::new(dir.path());
        cache
            .put_entry(&CacheEntry {
                timestamp: Utc::now() - chrono::Duration::hours(7),
                provider: "acme".into(),
                resources: resources(&["old"]),
            })
            .await
            .unwrap();

        assert!(cache.get("acme", SIX_HOURS).await.is_none());
        // a stale read leaves the file in place
        assert!(cache.entry_path("acme").unwrap().exists());

        cache.put("acme", &resources(&["new"])).await.unwrap();
        let cached = cache.get("acme", SIX_HOURS).await.unwrap();
        assert_eq!(cached.regions, vec!["new"]);
    }

    #[tokio::test]
    async fn test_corrupted_file_is_a_miss_and_reported() {
        let dir = tempdir().unwrap();
        let cache = ResourceCache::new(dir.path());
        std::fs::write(dir.path().join("broken_resources.json"), "{\"timestamp\": 12").unwrap();
        std::fs::write(
            dir.path().join("partial_resources.json"),
            r#"{"timestamp": "2024-01-01T00:00:00", "provider": "partial"}"#,
        )
        .unwrap();
        cache.put("good", &resources(&["nyc1"])).await.unwrap();

        assert!(cache.get("broken", SIX_HOURS).await.is_none());
        assert!(cache.get("partial", SIX_HOURS).await.is_none());

        let status = cache.status().await.unwrap();
        assert_eq!(status.len(), 3);
        assert!(matches!(status["broken"], EntryStatus::Corrupted { .. }));
        assert!(matches!(status["partial"], EntryStatus::Corrupted { .. }));
        match &status["good"] {
            EntryStatus::Cached(info) => {
                assert_eq!(info.regions_count, 1);
                assert_eq!(info.instance_types_count, 3);
                assert_eq!(info.age_hours, 0.0);
                assert!(info.file_size > 0);
            }
            other => panic!("unexpected status: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_future_and_mismatched_entries_are_corrupted() {
        let dir = tempdir().unwrap();
        let cache = ResourceCache::new(dir.path());
        cache
            .put_entry(&CacheEntry {
                timestamp: Utc::now() + chrono::Duration::hours(2),
                provider: "future".into(),
                resources: resources(&["nyc1"]),
            })
            .await
            .unwrap();
        let other = serde_json::to_vec(&CacheEntry::new("someone-else", resources(&["x"]))).unwrap();
        std::fs::write(dir.path().join("moved_resources.json"), other).unwrap();

        assert!(cache.get("future", SIX_HOURS).await.is_none());
        assert!(cache.get("moved", SIX_HOURS).await.is_none());
    }

    #[tokio::test]
    async fn test_naive_timestamps_are_accepted() {
        let dir = tempdir().unwrap();
        let cache = ResourceCache::new(dir.path());
        let ts = (Utc::now() - chrono::Duration::minutes(5)).naive_utc();
        let content = serde_json::json!({
            "timestamp": ts.format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            "provider": "legacy",
            "resources": {"regions": ["fra1"], "instance_types": {}, "database_types": {},
                          "kubernetes_versions": null, "storage_types": null}
        });
        std::fs::write(dir.path().join("legacy_resources.json"), content.to_string()).unwrap();

        let cached = cache.get("legacy", SIX_HOURS).await.unwrap();
        assert_eq!(cached.regions, vec!["fra1"]);
    }

    #[tokio::test]
    async fn test_interrupted_write_leaves_target_intact() {
        let dir = tempdir().unwrap();
        let cache = ResourceCache::new(dir.path());
        cache.put("acme", &resources(&["old"])).await.unwrap();

        // crash after the temp write, before the rename
        std::fs::write(
            dir.path().join("acme_resources.json.deadbeef.tmp"),
            "{\"timestamp\": \"2024-01-01T00:0",
        )
        .unwrap();

        let cached = cache.get("acme", SIX_HOURS).await.unwrap();
        assert_eq!(cached.regions, vec!["old"]);
        assert_eq!(cache.status().await.unwrap().len(), 1);

        tokio::time::sleep(Duration::from_millis(20)).await;
        let removed = cache.prune(Duration::ZERO).await.unwrap();
        assert_eq!(removed, 2);
        assert!(tmp_files(dir.path()).is_empty());
    }

    #[test]
    fn test_file_owner() {
        assert_eq!(file_owner("acme_resources.json"), Some("acme"));
        assert_eq!(file_owner("acme_resources.json.0123abcd.tmp"), Some("acme"));
        assert_eq!(file_owner("stray.tmp"), None);
        assert_eq!(file_owner("notes.txt"), None);
    }

    #[tokio::test]
    async fn test_prune_waits_for_writer_of_temp_file() {
        let dir = tempdir().unwrap();
        let cache = ResourceCache::new(dir.path());
        let tmp = dir.path().join("acme_resources.json.0123abcd.tmp");
        std::fs::write(&tmp, "{").unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let lock = cache.lock_for("acme");
        let held = lock.lock().await;
        let blocked = tokio::time::timeout(Duration::from_millis(50), cache.prune(Duration::ZERO));
        assert!(blocked.await.is_err(), "temp file of a locked provider must not be pruned");
        assert!(tmp.exists());

        drop(held);
        assert_eq!(cache.prune(Duration::ZERO).await.unwrap(), 1);
        assert!(!tmp.exists());
    }

    #[tokio::test]
    async fn test_concurrent_writes_same_key_end_in_one_state() {
        let dir = tempdir().unwrap();
        let cache = Arc::new(ResourceCache::new(dir.path()));

        let writers: Vec<_> = (0..16)
            .map(|i| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move {
                    let region = format!("region-{}", i);
                    cache.put("acme", &resources(&[region.as_str()])).await
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        let cached = cache.get("acme", SIX_HOURS).await.unwrap();
        let expected: BTreeSet<String> = (0..16).map(|i| format!("region-{}", i)).collect();
        assert_eq!(cached.regions.len(), 1);
        assert!(expected.contains(&cached.regions[0]));
        assert!(tmp_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_locks_are_per_provider() {
        let dir = tempdir().unwrap();
        let cache = ResourceCache::new(dir.path());

        let lock = cache.lock_for("acme");
        let _held = lock.lock().await;

        let other_resources = resources(&["a"]);
        let other = tokio::time::timeout(Duration::from_secs(5), cache.put("globex", &other_resources));
        assert!(other.await.is_ok(), "different provider must not wait");

        let same_resources = resources(&["a"]);
        let same = tokio::time::timeout(Duration::from_millis(50), cache.put("acme", &same_resources));
        assert!(same.await.is_err(), "same provider must wait for the lock");
    }

    #[tokio::test]
    async fn test_clear_one_and_all() {
        let dir = tempdir().unwrap();
        let cache = ResourceCache::new(dir.path());
        for name in ["a", "b", "c"] {
            cache.put(name, &resources(&["nyc1"])).await.unwrap();
        }

        assert_eq!(cache.clear(Some("a")).await.unwrap(), 1);
        assert_eq!(cache.clear(Some("a")).await.unwrap(), 0);
        assert_eq!(cache.clear(None).await.unwrap(), 2);
        assert!(cache.status().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_prune_keeps_recent_files() {
        let dir = tempdir().unwrap();
        let cache = ResourceCache::new(dir.path());
        cache.put("acme", &resources(&["nyc1"])).await.unwrap();

        assert_eq!(cache.prune(Duration::from_secs(7 * 86400)).await.unwrap(), 0);
        assert!(cache.get("acme", SIX_HOURS).await.is_some());
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty() {
        let dir = tempdir().unwrap();
        let cache = ResourceCache::new(dir.path().join("not-created"));
        assert!(cache.status().await.unwrap().is_empty());
        assert_eq!(cache.clear(None).await.unwrap(), 0);
        assert_eq!(cache.prune(Duration::ZERO).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rejects_path_like_provider_names() {
        let dir = tempdir().unwrap();
        let cache = ResourceCache::new(dir.path());
        assert!(cache.put("../escape", &resources(&[])).await.is_err());
        assert!(cache.clear(Some("a/b")).await.is_err());
        assert!(cache.get("../escape", SIX_HOURS).await.is_none());
    }
}
