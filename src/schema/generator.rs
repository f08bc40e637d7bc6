//! Schema Generator
//!
//! Resolves each requested provider's catalog (cache first, then live, then
//! static fallback), builds its fragment and merges everything into the base
//! schema.

use super::fragment::{build_fragment, SchemaFragment};
use super::default_base_schema;
use crate::cache::ResourceCache;
use crate::error::{Result, SchemaError};
use crate::provider::{ClientSession, ProviderRegistry, ProviderResources, ResourceClient};
use futures::future::join_all;
use serde_json::{Map, Value};
use std::sync::Arc;

/// How provider catalogs are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerateOptions {
    /// Read the cache before fetching, and write fetched catalogs back
    pub use_cache: bool,
    /// Always fetch live and overwrite the cache
    pub force_refresh: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            force_refresh: false,
        }
    }
}

/// Dynamic schema generator
pub struct SchemaGenerator {
    cache: Arc<ResourceCache>,
    registry: ProviderRegistry,
    base_schema: Value,
}

impl SchemaGenerator {
    pub fn new(cache: Arc<ResourceCache>, registry: ProviderRegistry) -> Self {
        Self {
            cache,
            registry,
            base_schema: default_base_schema().clone(),
        }
    }

    /// Replace the structural base schema that fragments are merged into
    pub fn with_base_schema(mut self, base_schema: Value) -> Self {
        self.base_schema = base_schema;
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    /// Generate the merged schema for `providers` (all registered when `None`)
    ///
    /// Unknown provider names are rejected before any network or cache access.
    pub async fn generate(
        &self,
        providers: Option<&[String]>,
        options: GenerateOptions,
    ) -> Result<Value> {
        let names: Vec<String> = match providers {
            Some(requested) => {
                let mut unique: Vec<String> = Vec::new();
                for name in requested {
                    if !unique.contains(name) {
                        unique.push(name.clone());
                    }
                }
                unique
            }
            None => self.registry.names(),
        };

        if names.is_empty() {
            return Err(SchemaError::NoProviders);
        }

        let clients = names
            .iter()
            .map(|name| {
                self.registry
                    .get(name)
                    .cloned()
                    .ok_or_else(|| SchemaError::UnknownProvider(name.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::info!("Generating schema for providers: {}", names.join(", "));

        let resolved = join_all(
            clients
                .iter()
                .map(|client| self.resolve_resources(client.as_ref(), options)),
        )
        .await;

        let fragments: Vec<SchemaFragment> = clients
            .iter()
            .zip(resolved.iter())
            .map(|(client, resources)| build_fragment(client.provider_name(), resources))
            .collect();

        merge_schemas(self.base_schema.clone(), fragments)
    }

    /// Resolve one provider's catalog; never fails
    pub async fn resolve_resources(
        &self,
        client: &dyn ResourceClient,
        options: GenerateOptions,
    ) -> ProviderResources {
        let name = client.provider_name();

        if options.use_cache && !options.force_refresh {
            if let Some(cached) = self.cache.get(name, client.cache_ttl()).await {
                tracing::info!("Using cached {} resources", name);
                return cached;
            }
        }

        let session = ClientSession::new(client);
        match session.fetch_resources().await {
            Ok(resources) => {
                let write_back = options.use_cache || options.force_refresh;
                if write_back && session.has_credentials() {
                    if let Err(e) = self.cache.put(name, &resources).await {
                        tracing::warn!("Failed to cache {} resources: {}", name, e);
                    }
                }
                resources
            }
            Err(e) => {
                tracing::warn!("Failed to fetch {} resources, using fallback: {}", name, e);
                session.static_fallback()
            }
        }
    }

    /// Release every client's network resources
    pub fn close(&self) {
        self.registry.close_all();
    }
}

/// Merge provider fragments into the base schema
///
/// Definitions are unioned into `definitions`; conditionals are appended to
/// `allOf` after any rules the base schema already carries.
pub fn merge_schemas(base_schema: Value, fragments: Vec<SchemaFragment>) -> Result<Value> {
    let Value::Object(mut result) = base_schema else {
        return Err(SchemaError::InvalidBaseSchema(
            "base schema must be a JSON object".to_string(),
        ));
    };

    let definitions = result
        .entry("definitions")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| SchemaError::InvalidBaseSchema("`definitions` is not an object".to_string()))?;

    let mut conditionals = Vec::with_capacity(fragments.len());
    for fragment in fragments {
        definitions.extend(fragment.definitions);
        conditionals.push(fragment.conditional);
    }

    if !conditionals.is_empty() {
        let all_of = result
            .entry("allOf")
            .or_insert_with(|| Value::Array(Vec::new()))
            .as_array_mut()
            .ok_or_else(|| SchemaError::InvalidBaseSchema("`allOf` is not an array".to_string()))?;
        all_of.extend(conditionals);
    }

    Ok(Value::Object(result))
}
