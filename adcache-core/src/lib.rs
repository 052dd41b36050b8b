//! # adcache core
//!
//! In-memory access token cache for clients of an OAuth2-style identity
//! provider.
//!
//! This crate provides:
//! - Identity and credential types ([`Authority`], [`UserInfo`], [`AuthResult`])
//! - A shared, thread-safe [`TokenCache`] holding one entry per logical key
//! - [`CacheDriver`], which resolves `(resource, user)` lookups against the
//!   cache and redeems refresh tokens through an injected [`TokenIssuer`],
//!   including multi-resource refresh tokens and `common` authority fallback
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use adcache_core::{CacheDriver, TokenCache};
//!
//! let cache = Arc::new(TokenCache::new());
//! let driver = CacheDriver::new("https://login.example.com/contoso", client_id, cache, issuer);
//!
//! let token = driver.find("https://graph.example.com", Some("user@contoso.com"))?;
//! send_request(token.access_token().expose());
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod model;
pub mod store;
pub mod token;

// Re-export commonly used types at crate root
pub use model::{
    Authority,
    IdentityToken,
    UserInfo,
};

pub use store::{
    CacheEntry,
    CacheKey,
    MrrtKey,
    Secret,
    TokenCache,
};

pub use token::{
    AuthError,
    AuthResult,
    TokenIssuer,
};

pub use driver::CacheDriver;

pub use config::{
    ConfigError,
    DriverConfig,
};

pub use error::AdCacheError;
