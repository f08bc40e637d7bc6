//! DigitalOcean
//!
//! Regions, droplet sizes, managed database engines and DOKS versions from
//! the DigitalOcean v2 API.

use super::auth::{token_from_env, CredentialSpec};
use super::client::ResourceClient;
use super::http::ApiHttpClient;
use super::resources::{
    group_sizes_by_region, sort_versions_desc, ProviderResources, SizeOffer, ALL_REGIONS,
};
use crate::config::ClientSettings;
use crate::error::RequestError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;

const STATIC_REGIONS: &[&str] = &[
    "nyc1", "nyc3", "ams3", "sgp1", "lon1", "fra1", "tor1", "blr1", "sfo3",
];

const STATIC_SIZES: &[&str] = &[
    "s-1vcpu-1gb",
    "s-1vcpu-2gb",
    "s-2vcpu-2gb",
    "s-2vcpu-4gb",
    "s-4vcpu-8gb",
    "s-6vcpu-16gb",
];

const STATIC_KUBERNETES: &[&str] = &["1.30", "1.29", "1.28"];

fn static_database_types() -> BTreeMap<String, Vec<String>> {
    [
        ("postgres", &["16", "15", "14", "13", "12"][..]),
        ("mysql", &["8.0"][..]),
        ("redis", &["7", "6"][..]),
    ]
    .into_iter()
    .map(|(engine, versions)| (engine.to_string(), to_strings(versions)))
    .collect()
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// DigitalOcean catalog client
pub struct DigitalOceanClient {
    http: ApiHttpClient,
    base_url: String,
    token: Option<String>,
}

impl DigitalOceanClient {
    pub const NAME: &'static str = "digitalocean";
    pub const BASE_URL: &'static str = "https://api.digitalocean.com/v2";
    pub const TOKEN_VAR: &'static str = "DIGITALOCEAN_TOKEN";

    /// Create a client reading its token from `DIGITALOCEAN_TOKEN`
    pub fn new(settings: ClientSettings) -> Self {
        Self {
            http: ApiHttpClient::new(settings),
            base_url: Self::BASE_URL.to_string(),
            token: token_from_env(Self::TOKEN_VAR),
        }
    }

    /// Point the client at another API root (mirrors, tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn http(&self) -> &ApiHttpClient {
        &self.http
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn fetch_regions(&self, token: &str) -> Result<Vec<String>, RequestError> {
        let body = self.http.get_json(&self.url("regions"), token).await?;
        Ok(parse_regions(&body))
    }

    async fn fetch_sizes(&self, token: &str) -> Result<Vec<SizeOffer>, RequestError> {
        let body = self.http.get_json(&self.url("sizes"), token).await?;
        Ok(parse_sizes(&body))
    }

    async fn fetch_database_options(
        &self,
        token: &str,
    ) -> Result<BTreeMap<String, Vec<String>>, RequestError> {
        let body = self
            .http
            .get_json(&self.url("databases/options"), token)
            .await?;
        Ok(parse_database_options(&body))
    }

    async fn fetch_kubernetes_versions(&self, token: &str) -> Result<Vec<String>, RequestError> {
        let body = self
            .http
            .get_json(&self.url("kubernetes/options"), token)
            .await?;
        Ok(parse_kubernetes_versions(&body))
    }
}

#[async_trait]
impl ResourceClient for DigitalOceanClient {
    fn provider_name(&self) -> &str {
        Self::NAME
    }

    fn auth_config(&self) -> Vec<CredentialSpec> {
        vec![CredentialSpec {
            env_var: Self::TOKEN_VAR,
            description: "Personal Access Token from the DigitalOcean control panel",
        }]
    }

    fn has_credentials(&self) -> bool {
        self.token.is_some()
    }

    fn settings(&self) -> &ClientSettings {
        self.http.settings()
    }

    async fn fetch_resources(&self) -> Result<ProviderResources, RequestError> {
        let Some(token) = self.token.as_deref() else {
            tracing::info!("No {} found, using static fallback data", Self::TOKEN_VAR);
            return Ok(self.static_fallback());
        };

        self.http.open()?;

        let (regions, sizes, databases, kubernetes) = tokio::join!(
            self.fetch_regions(token),
            self.fetch_sizes(token),
            self.fetch_database_options(token),
            self.fetch_kubernetes_versions(token),
        );

        let fallback = self.static_fallback();

        let regions = regions.unwrap_or_else(|e| {
            tracing::warn!("Failed to fetch regions: {}", e);
            fallback.regions.clone()
        });

        let instance_types = match sizes {
            Ok(sizes) if !sizes.is_empty() => group_sizes_by_region(&regions, &sizes),
            Ok(_) => {
                tracing::warn!("No available sizes returned, using fallback");
                fallback.instance_types.clone()
            }
            Err(e) => {
                tracing::warn!("Failed to fetch sizes: {}", e);
                fallback.instance_types.clone()
            }
        };

        let database_types = databases.unwrap_or_else(|e| {
            tracing::warn!("Failed to fetch database options: {}", e);
            fallback.database_types.clone()
        });

        let kubernetes_versions = match kubernetes {
            Ok(versions) => Some(versions),
            Err(e) => {
                tracing::warn!("Failed to fetch kubernetes versions: {}", e);
                fallback.kubernetes_versions.clone()
            }
        };

        Ok(ProviderResources {
            regions,
            instance_types,
            database_types,
            kubernetes_versions,
            storage_types: None,
        })
    }

    fn static_fallback(&self) -> ProviderResources {
        let sizes = to_strings(STATIC_SIZES);
        let mut instance_types: BTreeMap<String, Vec<String>> = STATIC_REGIONS
            .iter()
            .map(|region| (region.to_string(), sizes.clone()))
            .collect();
        instance_types.insert(ALL_REGIONS.to_string(), sizes);

        ProviderResources {
            regions: to_strings(STATIC_REGIONS),
            instance_types,
            database_types: static_database_types(),
            kubernetes_versions: Some(to_strings(STATIC_KUBERNETES)),
            storage_types: None,
        }
    }

    fn close(&self) {
        self.http.close();
    }
}

/// Available regions that advertise a feature list, sorted
fn parse_regions(body: &Value) -> Vec<String> {
    let mut regions: Vec<String> = body
        .get("regions")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter(|r| {
                    r.get("available").and_then(Value::as_bool).unwrap_or(false)
                        && r.get("features").is_some()
                })
                .filter_map(|r| r.get("slug").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    regions.sort();
    regions
}

/// Available sizes that can be launched in at least one region
fn parse_sizes(body: &Value) -> Vec<SizeOffer> {
    body.get("sizes")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter(|s| s.get("available").and_then(Value::as_bool).unwrap_or(false))
                .filter_map(|s| {
                    let slug = s.get("slug")?.as_str()?.to_string();
                    let regions: Vec<String> = s
                        .get("regions")?
                        .as_array()?
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect();
                    (!regions.is_empty()).then_some(SizeOffer { slug, regions })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Engine -> versions (newest first)
///
/// Accepts both `options.engines: [{name, versions: [{slug}]}]` and the map
/// form `options: {engine: {versions: ["16", ...]}}`.
fn parse_database_options(body: &Value) -> BTreeMap<String, Vec<String>> {
    let Some(options) = body.get("options") else {
        return BTreeMap::new();
    };

    let engines: Vec<(String, &Value)> = match options.get("engines").and_then(Value::as_array) {
        Some(list) => list
            .iter()
            .filter_map(|e| {
                let name = e.get("name")?.as_str()?;
                Some((name.to_lowercase(), e.get("versions")?))
            })
            .collect(),
        None => options
            .as_object()
            .map(|map| {
                map.iter()
                    .filter_map(|(name, e)| Some((name.to_lowercase(), e.get("versions")?)))
                    .collect()
            })
            .unwrap_or_default(),
    };

    engines
        .into_iter()
        .filter_map(|(name, versions)| {
            let versions = version_strings(versions);
            (!versions.is_empty()).then(|| (name, sort_versions_desc(versions)))
        })
        .collect()
}

fn parse_kubernetes_versions(body: &Value) -> Vec<String> {
    let versions = body
        .get("options")
        .and_then(|o| o.get("versions"))
        .map(version_strings)
        .unwrap_or_default();
    sort_versions_desc(versions)
}

/// Version entries are either plain strings or objects with a `slug`
fn version_strings(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(_) => v.get("slug").and_then(Value::as_str).map(str::to_string),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}
