//! Provider Client
//!
//! The capability set every provider variant implements, the scoped session
//! that guarantees connection release, and the lookup table the schema
//! generator resolves provider names through.

use super::auth::CredentialSpec;
use super::digitalocean::DigitalOceanClient;
use super::hetzner::HetznerClient;
use super::resources::ProviderResources;
use crate::config::{ClientSettings, Config};
use crate::error::RequestError;
use async_trait::async_trait;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

/// A source of live catalog data for one provider
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Provider identifier (e.g. "digitalocean"); also the cache key
    fn provider_name(&self) -> &str;

    /// Credentials this client reads from the environment
    fn auth_config(&self) -> Vec<CredentialSpec>;

    /// Whether every required credential is present
    fn has_credentials(&self) -> bool;

    fn settings(&self) -> &ClientSettings;

    fn cache_ttl(&self) -> Duration {
        self.settings().cache_ttl()
    }

    /// Fetch the provider's current catalog
    ///
    /// Without credentials this returns the static fallback without touching
    /// the network. Categories that fail individually fall back on their own.
    async fn fetch_resources(&self) -> Result<ProviderResources, RequestError>;

    /// Hard-coded catalog used when live data is unavailable
    fn static_fallback(&self) -> ProviderResources;

    /// Release network resources
    fn close(&self);
}

/// Borrowed client that is closed when the session ends, on every exit path
pub struct ClientSession<'a> {
    client: &'a dyn ResourceClient,
}

impl<'a> ClientSession<'a> {
    pub fn new(client: &'a dyn ResourceClient) -> Self {
        Self { client }
    }
}

impl<'a> Deref for ClientSession<'a> {
    type Target = dyn ResourceClient + 'a;

    fn deref(&self) -> &Self::Target {
        self.client
    }
}

impl Drop for ClientSession<'_> {
    fn drop(&mut self) {
        self.client.close();
    }
}

/// Ordered table of provider clients keyed by provider name
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    clients: Vec<Arc<dyn ResourceClient>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in providers configured from `config`
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(DigitalOceanClient::new(
            config.settings_for(DigitalOceanClient::NAME),
        )));
        registry.register(Arc::new(HetznerClient::new(
            config.settings_for(HetznerClient::NAME),
        )));
        registry
    }

    /// Add a client, replacing any existing client with the same name
    pub fn register(&mut self, client: Arc<dyn ResourceClient>) {
        match self
            .clients
            .iter_mut()
            .find(|c| c.provider_name() == client.provider_name())
        {
            Some(slot) => *slot = client,
            None => self.clients.push(client),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ResourceClient>> {
        self.clients.iter().find(|c| c.provider_name() == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.clients
            .iter()
            .map(|c| c.provider_name().to_string())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ResourceClient>> {
        self.clients.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn close_all(&self) {
        for client in &self.clients {
            client.close();
        }
    }
}
