//! Provider Resources
//!
//! Snapshot of one provider's catalog at fetch time, plus the helpers that
//! every provider client uses to shape raw API listings into it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// Wildcard key in `instance_types` holding the union of sizes across all regions
pub const ALL_REGIONS: &str = "*";

/// Resources available from a provider
///
/// Maps are ordered so that serialization and schema output are stable
/// across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderResources {
    #[serde(default)]
    pub regions: Vec<String>,
    /// region (or [`ALL_REGIONS`]) -> instance sizes
    #[serde(default)]
    pub instance_types: BTreeMap<String, Vec<String>>,
    /// engine -> versions, newest first
    #[serde(default)]
    pub database_types: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub kubernetes_versions: Option<Vec<String>>,
    /// Part of the cached contract; the generator does not read it yet
    #[serde(default)]
    pub storage_types: Option<Vec<String>>,
}

impl ProviderResources {
    /// Convert to a plain JSON document for caching
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "regions": self.regions,
            "instance_types": self.instance_types,
            "database_types": self.database_types,
            "kubernetes_versions": self.kubernetes_versions,
            "storage_types": self.storage_types,
        })
    }

    /// Rebuild from a cached JSON document
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Union of instance types across every region, sorted and deduplicated
    pub fn all_instance_types(&self) -> Vec<String> {
        self.instance_types
            .values()
            .flatten()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Total number of instance type entries across all region keys
    pub fn instance_type_count(&self) -> usize {
        self.instance_types.values().map(Vec::len).sum()
    }
}

/// An instance size together with the regions it can be launched in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeOffer {
    pub slug: String,
    pub regions: Vec<String>,
}

/// Group sizes by region
///
/// Each region lists the sizes whose own region list contains it; regions
/// without any size are left out. The wildcard entry is always present.
pub fn group_sizes_by_region(
    regions: &[String],
    sizes: &[SizeOffer],
) -> BTreeMap<String, Vec<String>> {
    let mut instance_types = BTreeMap::new();

    for region in regions {
        let available: BTreeSet<&str> = sizes
            .iter()
            .filter(|size| size.regions.iter().any(|r| r == region))
            .map(|size| size.slug.as_str())
            .collect();

        if !available.is_empty() {
            instance_types.insert(
                region.clone(),
                available.into_iter().map(str::to_string).collect(),
            );
        }
    }

    let all_sizes: BTreeSet<&str> = sizes.iter().map(|size| size.slug.as_str()).collect();
    instance_types.insert(
        ALL_REGIONS.to_string(),
        all_sizes.into_iter().map(str::to_string).collect(),
    );

    instance_types
}

/// Sort version strings newest first
pub fn sort_versions_desc(mut versions: Vec<String>) -> Vec<String> {
    versions.sort_by(|a, b| compare_versions(b, a));
    versions.dedup();
    versions
}

/// Compare two version strings component-wise
///
/// Digit runs compare numerically, everything else lexically, so `1.30`
/// orders after `1.9`. Falls back to plain string order on ties.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left = version_tokens(a);
    let right = version_tokens(b);

    for (l, r) in left.iter().zip(right.iter()) {
        let ordering = match (l.parse::<u64>(), r.parse::<u64>()) {
            (Ok(l), Ok(r)) => l.cmp(&r),
            _ => l.cmp(r),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    left.len().cmp(&right.len()).then_with(|| a.cmp(b))
}

fn version_tokens(version: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = None;
    let mut numeric = false;

    for (idx, c) in version.char_indices() {
        if !c.is_ascii_alphanumeric() {
            if let Some(s) = start.take() {
                tokens.push(&version[s..idx]);
            }
            continue;
        }
        match start {
            Some(s) if c.is_ascii_digit() != numeric => {
                tokens.push(&version[s..idx]);
                start = Some(idx);
                numeric = c.is_ascii_digit();
            }
            Some(_) => {}
            None => {
                start = Some(idx);
                numeric = c.is_ascii_digit();
            }
        }
    }
    if let Some(s) = start {
        tokens.push(&version[s..]);
    }

    tokens
}
