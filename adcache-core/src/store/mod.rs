//! Cache entries and their storage.
//!
//! This module provides:
//! - [`Secret`] - A wrapper for token values that prevents accidental logging
//! - [`CacheEntry`] - One cached credential bound to an authority and client
//! - [`CacheKey`] / [`MrrtKey`] - The exact and multi-resource lookup keys
//! - [`TokenCache`] - The shared in-memory store
//!
//! # Keys
//!
//! An entry's logical key is `(authority, client_id, resource, user_id?)`.
//! The store holds at most one entry per logical key. Entries carrying a
//! multi-resource refresh token are also reachable through the broader
//! `(authority, client_id, user_id?)` key, with the resource ignored.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use adcache_core::{AuthResult, Authority, CacheEntry, TokenCache};
//!
//! let cache = TokenCache::new();
//! let result = AuthResult::new("at", "graph", chrono::Duration::hours(1));
//! cache.add(CacheEntry::new(Arc::new(result), Authority::new("a/common"), "client"));
//!
//! let hits = cache.query(|e| e.resource() == "graph");
//! assert_eq!(hits.len(), 1);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::model::Authority;
use crate::token::AuthResult;

mod memory;

pub use memory::TokenCache;

/// A secret value that prevents accidental exposure in logs.
///
/// The inner value is only accessible via [`expose()`](Secret::expose).
/// Debug and Display implementations show `[REDACTED]` instead of the value,
/// and the buffer is zeroed when the secret is dropped.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Secret(String);

impl Secret {
    /// Create a new secret from a string value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret value.
    ///
    /// Use sparingly and never log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Secret {}

/// Exact lookup key of a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub authority: Authority,
    pub client_id: String,
    pub resource: String,
    pub user_id: Option<String>,
}

/// Resource-independent key of a multi-resource refresh token entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MrrtKey {
    pub authority: Authority,
    pub client_id: String,
    pub user_id: Option<String>,
}

/// One cached credential.
///
/// Entries are replaced as a whole, never edited: the payload is a shared
/// `Arc<AuthResult>` so lookups can hand back the very instance that was
/// stored.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    auth_result: Arc<AuthResult>,
    authority: Authority,
    client_id: String,
}

impl CacheEntry {
    pub fn new(
        auth_result: Arc<AuthResult>,
        authority: Authority,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            auth_result,
            authority,
            client_id: client_id.into(),
        }
    }

    pub fn auth_result(&self) -> &Arc<AuthResult> {
        &self.auth_result
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn resource(&self) -> &str {
        self.auth_result.resource()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.auth_result.user_id()
    }

    pub fn is_multi_resource_refresh_token(&self) -> bool {
        self.auth_result.is_multi_resource_refresh_token()
    }

    pub fn expires_on(&self) -> DateTime<Utc> {
        self.auth_result.expires_on()
    }

    /// Whether this entry belongs to the given authority and client.
    pub fn is_bound_to(&self, authority: &Authority, client_id: &str) -> bool {
        &self.authority == authority && self.client_id == client_id
    }

    pub fn key(&self) -> CacheKey {
        CacheKey {
            authority: self.authority.clone(),
            client_id: self.client_id.clone(),
            resource: self.resource().to_string(),
            user_id: self.user_id().map(str::to_string),
        }
    }

    /// The broader key, present only for multi-resource refresh tokens.
    pub fn mrrt_key(&self) -> Option<MrrtKey> {
        self.is_multi_resource_refresh_token().then(|| MrrtKey {
            authority: self.authority.clone(),
            client_id: self.client_id.clone(),
            user_id: self.user_id().map(str::to_string),
        })
    }
}
