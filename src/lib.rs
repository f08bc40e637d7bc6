//! cloudschema
//!
//! Builds a JSON Schema for deployment configuration files whose allowed
//! regions, instance sizes and database versions come from each cloud
//! provider's live catalog. Catalogs are cached on disk with a TTL and fall
//! back to bundled static data when the provider cannot be reached.
//!
//! - [`provider`] - Provider clients, retry policy and catalog shaping
//! - [`cache`] - TTL-governed per-provider catalog cache
//! - [`schema`] - Fragment construction and merging into the base schema
//! - [`maintenance`] - Cache status, invalidation and cleanup
//! - [`editor`] - YAML language server wiring for VS Code and Neovim
//! - [`config`] - Persistent settings

pub mod cache;
pub mod config;
pub mod editor;
pub mod error;
pub mod maintenance;
pub mod provider;
pub mod schema;

/// Version injected at compile time via CLOUDSCHEMA_VERSION env var (set by CI/CD),
/// or the crate version for local builds.
pub const VERSION: &str = match option_env!("CLOUDSCHEMA_VERSION") {
    Some(v) => v,
    None => env!("CARGO_PKG_VERSION"),
};

pub use cache::ResourceCache;
pub use config::Config;
pub use error::{CacheError, InstallError, RequestError, SchemaError};
pub use maintenance::CacheMaintenance;
pub use schema::{GenerateOptions, SchemaGenerator};
