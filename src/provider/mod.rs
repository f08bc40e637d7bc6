//! Provider API interaction module
//!
//! Fetches a provider's current catalog (regions, instance sizes, database
//! engine versions, Kubernetes versions) from its REST API, with retry,
//! per-category fallback and a static offline answer.
//!
//! # Module Structure
//!
//! - [`auth`] - Bearer tokens from the environment
//! - [`client`] - The [`ResourceClient`] capability set and provider lookup table
//! - [`http`] - HTTP client with lazy connection setup and retry/backoff
//! - [`resources`] - The [`ProviderResources`] snapshot and shaping helpers
//! - [`digitalocean`], [`hetzner`] - Concrete providers
//!
//! # Example
//!
//! ```ignore
//! use cloudschema::provider::{ClientSession, DigitalOceanClient};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let client = DigitalOceanClient::new(Default::default());
//!     let session = ClientSession::new(&client);
//!     let resources = session.fetch_resources().await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod digitalocean;
pub mod hetzner;
pub mod http;
pub mod resources;

pub use auth::CredentialSpec;
pub use client::{ClientSession, ProviderRegistry, ResourceClient};
pub use digitalocean::DigitalOceanClient;
pub use hetzner::HetznerClient;
pub use resources::{ProviderResources, SizeOffer, ALL_REGIONS};
