//! Hetzner Cloud
//!
//! Locations and server types from the Hetzner Cloud API. Hetzner offers no
//! managed databases or Kubernetes, so those categories stay empty.

use super::auth::{token_from_env, CredentialSpec};
use super::client::ResourceClient;
use super::http::ApiHttpClient;
use super::resources::{group_sizes_by_region, ProviderResources, SizeOffer, ALL_REGIONS};
use crate::config::ClientSettings;
use crate::error::RequestError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use url::Url;

const PER_PAGE: u64 = 50;

/// Upper bound on followed pages, in case the API keeps pointing forward
const MAX_PAGES: u64 = 100;

const STATIC_LOCATIONS: &[&str] = &["ash", "fsn1", "hel1", "hil", "nbg1", "sin"];

const STATIC_SERVER_TYPES: &[&str] = &["cpx11", "cpx21", "cpx31", "cx22", "cx32", "cx42", "cx52"];

/// Hetzner Cloud catalog client
pub struct HetznerClient {
    http: ApiHttpClient,
    base_url: String,
    token: Option<String>,
}

impl HetznerClient {
    pub const NAME: &'static str = "hetzner";
    pub const BASE_URL: &'static str = "https://api.hetzner.cloud/v1";
    pub const TOKEN_VAR: &'static str = "HCLOUD_TOKEN";

    pub fn new(settings: ClientSettings) -> Self {
        Self {
            http: ApiHttpClient::new(settings),
            base_url: Self::BASE_URL.to_string(),
            token: token_from_env(Self::TOKEN_VAR),
        }
    }

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

    fn page_url(&self, path: &str, page: u64) -> Result<String, RequestError> {
        let mut url = Url::parse(&format!("{}/{}", self.base_url, path))
            .map_err(|e| RequestError::InvalidUrl(format!("{}: {}", self.base_url, e)))?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("per_page", &PER_PAGE.to_string());
        Ok(url.into())
    }

    /// Fetch all pages of a list endpoint (auto-paginate)
    async fn fetch_all(&self, path: &str, key: &str, token: &str) -> Result<Vec<Value>, RequestError> {
        let mut items = Vec::new();
        let mut page = 1;

        loop {
            let body = self.http.get_json(&self.page_url(path, page)?, token).await?;
            if let Some(arr) = body.get(key).and_then(Value::as_array) {
                items.extend(arr.iter().cloned());
            }

            match next_page(&body) {
                Some(next) if next > page && next <= MAX_PAGES => page = next,
                _ => break,
            }
        }

        Ok(items)
    }

    async fn fetch_locations(&self, token: &str) -> Result<Vec<String>, RequestError> {
        let items = self.fetch_all("locations", "locations", token).await?;
        Ok(parse_locations(&items))
    }

    async fn fetch_server_types(&self, token: &str) -> Result<Vec<SizeOffer>, RequestError> {
        let items = self.fetch_all("server_types", "server_types", token).await?;
        Ok(parse_server_types(&items))
    }
}

#[async_trait]
impl ResourceClient for HetznerClient {
    fn provider_name(&self) -> &str {
        Self::NAME
    }

    fn auth_config(&self) -> Vec<CredentialSpec> {
        vec![CredentialSpec {
            env_var: Self::TOKEN_VAR,
            description: "API token from the Hetzner Cloud console (Security > API tokens)",
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

        let (locations, server_types) =
            tokio::join!(self.fetch_locations(token), self.fetch_server_types(token));

        let fallback = self.static_fallback();

        let regions = locations.unwrap_or_else(|e| {
            tracing::warn!("Failed to fetch locations: {}", e);
            fallback.regions.clone()
        });

        let instance_types = match server_types {
            Ok(types) if !types.is_empty() => group_sizes_by_region(&regions, &types),
            Ok(_) => fallback.instance_types.clone(),
            Err(e) => {
                tracing::warn!("Failed to fetch server types: {}", e);
                fallback.instance_types.clone()
            }
        };

        Ok(ProviderResources {
            regions,
            instance_types,
            ..ProviderResources::default()
        })
    }

    fn static_fallback(&self) -> ProviderResources {
        let types: Vec<String> = STATIC_SERVER_TYPES.iter().map(|s| s.to_string()).collect();
        let mut instance_types: BTreeMap<String, Vec<String>> = STATIC_LOCATIONS
            .iter()
            .map(|location| (location.to_string(), types.clone()))
            .collect();
        instance_types.insert(ALL_REGIONS.to_string(), types);

        ProviderResources {
            regions: STATIC_LOCATIONS.iter().map(|s| s.to_string()).collect(),
            instance_types,
            ..ProviderResources::default()
        }
    }

    fn close(&self) {
        self.http.close();
    }
}

fn next_page(body: &Value) -> Option<u64> {
    body.get("meta")?
        .get("pagination")?
        .get("next_page")?
        .as_u64()
}

fn parse_locations(items: &[Value]) -> Vec<String> {
    let mut locations: Vec<String> = items
        .iter()
        .filter_map(|l| l.get("name").and_then(Value::as_str))
        .map(str::to_string)
        .collect();
    locations.sort();
    locations.dedup();
    locations
}

/// Server types that are not deprecated, with the locations they are priced in
fn parse_server_types(items: &[Value]) -> Vec<SizeOffer> {
    items
        .iter()
        .filter(|t| {
            let deprecated = t.get("deprecated").and_then(Value::as_bool).unwrap_or(false);
            let deprecation = t.get("deprecation").is_some_and(|d| !d.is_null());
            !deprecated && !deprecation
        })
        .filter_map(|t| {
            let slug = t.get("name")?.as_str()?.to_string();
            let regions: Vec<String> = t
                .get("prices")?
                .as_array()?
                .iter()
                .filter_map(|p| p.get("location").and_then(Value::as_str))
                .map(str::to_string)
                .collect();
            (!regions.is_empty()).then_some(SizeOffer { slug, regions })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_server_types_skips_deprecated() {
        let items = vec![
            json!({"name": "cx22", "deprecated": false, "prices": [{"location": "fsn1"}, {"location": "nbg1"}]}),
            json!({"name": "cx11", "deprecated": true, "prices": [{"location": "fsn1"}]}),
            json!({"name": "cpx11", "deprecation": {"announced": "2024-01-01"}, "prices": [{"location": "fsn1"}]}),
            json!({"name": "ccx13", "deprecation": null, "prices": []}),
        ];

        let types = parse_server_types(&items);
        assert_eq!(types.len(), 1);
        assert_eq!(types[0].slug, "cx22");
        assert_eq!(types[0].regions, vec!["fsn1", "nbg1"]);
    }

    #[test]
    fn test_next_page() {
        assert_eq!(next_page(&json!({"meta": {"pagination": {"next_page": 2}}})), Some(2));
        assert_eq!(next_page(&json!({"meta": {"pagination": {"next_page": null}}})), None);
        assert_eq!(next_page(&json!({})), None);
    }

    #[test]
    fn test_page_url() {
        let client = HetznerClient::new(ClientSettings::default()).with_base_url("http://localhost:1234/v1/");
        assert_eq!(
            client.page_url("locations", 3).unwrap(),
            "http://localhost:1234/v1/locations?page=3&per_page=50"
        );
    }

    #[test]
    fn test_static_fallback_has_no_databases() {
        let client = HetznerClient::new(ClientSettings::default());
        let fallback = client.static_fallback();
        assert!(fallback.database_types.is_empty());
        assert!(fallback.kubernetes_versions.is_none());
        assert_eq!(fallback.regions, STATIC_LOCATIONS);
    }
}
