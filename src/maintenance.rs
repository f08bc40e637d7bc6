//! Cache Maintenance
//!
//! Status reporting, explicit invalidation and age-based cleanup over a
//! [`ResourceCache`]. Holds no state of its own.

use crate::cache::{EntryInfo, EntryStatus, ResourceCache};
use crate::error::CacheError;
use std::time::Duration;

/// Freshness of one cache entry relative to its provider's TTL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
    Corrupted,
}

impl std::fmt::Display for Freshness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Freshness::Fresh => write!(f, "fresh"),
            Freshness::Stale => write!(f, "stale"),
            Freshness::Corrupted => write!(f, "corrupted"),
        }
    }
}

/// One row of the status report
#[derive(Debug, Clone, PartialEq)]
pub struct StatusRow {
    pub provider: String,
    pub freshness: Freshness,
    /// `None` when the entry is corrupted
    pub info: Option<EntryInfo>,
}

pub struct CacheMaintenance<'a, F> {
    cache: &'a ResourceCache,
    ttl_for: F,
}

impl<'a, F> CacheMaintenance<'a, F>
where
    F: Fn(&str) -> Duration,
{
    /// `ttl_for` maps a provider name to the TTL its reads use
    pub fn new(cache: &'a ResourceCache, ttl_for: F) -> Self {
        Self { cache, ttl_for }
    }

    /// Classified status of every cache entry, sorted by provider
    pub async fn report(&self) -> Result<Vec<StatusRow>, CacheError> {
        let status = self.cache.status().await?;

        Ok(status
            .into_iter()
            .map(|(provider, status)| match status {
                EntryStatus::Cached(info) => {
                    let ttl_hours = (self.ttl_for)(&provider).as_secs_f64() / 3600.0;
                    let freshness = if info.age_hours < ttl_hours {
                        Freshness::Fresh
                    } else {
                        Freshness::Stale
                    };
                    StatusRow {
                        provider,
                        freshness,
                        info: Some(info),
                    }
                }
                EntryStatus::Corrupted { error } => {
                    tracing::debug!("Cache for {} is corrupted: {}", provider, error);
                    StatusRow {
                        provider,
                        freshness: Freshness::Corrupted,
                        info: None,
                    }
                }
            })
            .collect())
    }

    /// Drop one provider's entry, or all entries
    pub async fn invalidate(&self, provider: Option<&str>) -> Result<usize, CacheError> {
        let cleared = self.cache.clear(provider).await?;
        tracing::info!("Cleared {} cache entries", cleared);
        Ok(cleared)
    }

    /// Delete entries not modified within `max_age_days`
    pub async fn cleanup(&self, max_age_days: u64) -> Result<usize, CacheError> {
        let max_age = Duration::from_secs(max_age_days.saturating_mul(86_400));
        let removed = self.cache.prune(max_age).await?;
        tracing::info!("Removed {} cache files older than {} days", removed, max_age_days);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheEntry;
    use crate::provider::ProviderResources;
    use chrono::Utc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_report_classifies_entries() {
        let dir = tempdir().unwrap();
        let cache = ResourceCache::new(dir.path());
        let resources = ProviderResources {
            regions: vec!["nyc1".into()],
            ..Default::default()
        };
        cache.put("fresh", &resources).await.unwrap();
        cache
            .put_entry(&CacheEntry {
                timestamp: Utc::now() - chrono::Duration::hours(8),
                provider: "old".into(),
                resources: resources.clone(),
            })
            .await
            .unwrap();
        std::fs::write(dir.path().join("bad_resources.json"), "nope").unwrap();

        let maintenance = CacheMaintenance::new(&cache, |_| Duration::from_secs(6 * 3600));
        let rows = maintenance.report().await.unwrap();

        let summary: Vec<(&str, Freshness)> =
            rows.iter().map(|r| (r.provider.as_str(), r.freshness)).collect();
        assert_eq!(
            summary,
            vec![
                ("bad", Freshness::Corrupted),
                ("fresh", Freshness::Fresh),
                ("old", Freshness::Stale),
            ]
        );
        assert_eq!(rows[2].info.as_ref().unwrap().age_hours, 8.0);
    }

    #[test]
    fn test_freshness_display_matches_variant() {
        assert_eq!(Freshness::Fresh.to_string(), "fresh");
        assert_eq!(Freshness::Stale.to_string(), "stale");
        assert_eq!(Freshness::Corrupted.to_string(), "corrupted");
    }

    #[tokio::test]
    async fn test_invalidate_and_cleanup() {
        let dir = tempdir().unwrap();
        let cache = ResourceCache::new(dir.path());
        cache.put("a", &ProviderResources::default()).await.unwrap();
        cache.put("b", &ProviderResources::default()).await.unwrap();

        let maintenance = CacheMaintenance::new(&cache, |_| Duration::from_secs(3600));
        assert_eq!(maintenance.cleanup(7).await.unwrap(), 0);
        assert_eq!(maintenance.invalidate(Some("a")).await.unwrap(), 1);
        assert_eq!(maintenance.invalidate(None).await.unwrap(), 1);
        assert!(maintenance.report().await.unwrap().is_empty());
    }
}
