//! Token lookup and refresh for one authority and client.
//!
//! [`CacheDriver`] resolves "a usable token for (resource, user)" against the
//! shared [`TokenCache`], calling the injected [`TokenIssuer`] only when the
//! cache cannot answer on its own.
//!
//! # Resolution order
//!
//! 1. Exact match on `(authority, client_id, resource, user)`. A fresh entry
//!    is returned as the very same `Arc`; an expired one is refreshed.
//! 2. A multi-resource refresh token of the same user under this authority,
//!    exchanged for the requested resource.
//! 3. On a tenant-scoped authority, a multi-resource refresh token of the same
//!    user cached under the issuer's `common` authority.
//! 4. Otherwise [`AuthError::NotFound`], with the cache left untouched.
//!
//! When no user id is given, a user-less entry for the resource is an exact
//! match. Failing that, a `common` authority with exactly one cached user
//! resolves to that user; more than one is [`AuthError::AmbiguousUser`].
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use adcache_core::{AuthError, AuthResult, CacheDriver, Secret, TokenCache};
//!
//! let cache = Arc::new(TokenCache::new());
//! let issuer = |_rt: &Secret, resource: &str| -> Result<AuthResult, AuthError> {
//!     Ok(AuthResult::new("fresh", resource, chrono::Duration::hours(1)))
//! };
//! let driver = CacheDriver::new("https://login.example.com/common", "client", cache, issuer);
//!
//! let seeded =
//!     AuthResult::new("at", "graph", chrono::Duration::hours(1)).with_refresh_token("rt");
//! driver.create_add_entry(seeded, None)?;
//!
//! let token = driver.find("graph", None)?;
//! assert_eq!(token.access_token().expose(), "at");
//! # Ok::<(), AuthError>(())
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::DriverConfig;
use crate::model::Authority;
use crate::store::{CacheEntry, CacheKey, MrrtKey, TokenCache};
use crate::token::{AuthError, AuthResult, TokenIssuer};

/// Cache lookup and refresh engine bound to one authority and client id.
///
/// # Type Parameters
///
/// * `I` - The token issuer used to redeem refresh tokens
pub struct CacheDriver<I: TokenIssuer> {
    authority: Authority,
    client_id: String,
    cache: Arc<TokenCache>,
    issuer: I,
    config: DriverConfig,
}

impl<I: TokenIssuer> CacheDriver<I> {
    /// Create a driver with the default configuration.
    pub fn new(
        authority: impl Into<Authority>,
        client_id: impl Into<String>,
        cache: Arc<TokenCache>,
        issuer: I,
    ) -> Self {
        Self::with_config(authority, client_id, cache, issuer, DriverConfig::default())
    }

    /// Create a driver with an explicit configuration.
    pub fn with_config(
        authority: impl Into<Authority>,
        client_id: impl Into<String>,
        cache: Arc<TokenCache>,
        issuer: I,
        config: DriverConfig,
    ) -> Self {
        Self {
            authority: authority.into(),
            client_id: client_id.into(),
            cache,
            issuer,
            config,
        }
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn cache(&self) -> &Arc<TokenCache> {
        &self.cache
    }

    pub fn issuer(&self) -> &I {
        &self.issuer
    }

    /// Get a usable token for `resource` and `user_id`, refreshing if needed.
    ///
    /// A cached, unexpired token is returned as the same `Arc` every time
    /// and costs no issuer call. Issuer failures are returned unchanged and
    /// leave the cache as it was.
    pub fn find(
        &self,
        resource: &str,
        user_id: Option<&str>,
    ) -> Result<Arc<AuthResult>, AuthError> {
        let span = tracing::debug_span!(
            "find",
            correlation_id = %Uuid::new_v4(),
            authority = %self.authority,
            resource
        );
        let _enter = span.enter();

        let user = match user_id {
            Some(user) => Some(user.to_string()),
            None if self.exact_entry(resource, None).is_some() => None,
            None => self.resolve_user(resource)?,
        };

        if let Some(entry) = self.exact_entry(resource, user.as_deref()) {
            let cached = entry.auth_result();
            if !cached.expires_within(self.config.expiry_buffer()) {
                debug!(user = ?user, "Using cached access token");
                return Ok(Arc::clone(cached));
            }

            if cached.refresh_token().is_some() {
                info!(user = ?user, "Access token expired, attempting refresh");
                return self.refresh_from(&entry, resource);
            }

            debug!(user = ?user, "Access token expired and no refresh token is cached");
        }

        if let Some(entry) = self.mrrt_entry(&self.authority, user.as_deref()) {
            info!(
                user = ?user,
                from = entry.resource(),
                "Redeeming multi-resource refresh token"
            );
            return self.refresh_from(&entry, resource);
        }

        let may_use_common =
            self.config.common_authority_fallback && !self.authority.is_common() && user.is_some();
        if may_use_common {
            let common = self.authority.common();
            if let Some(entry) = self.mrrt_entry(&common, user.as_deref()) {
                info!(
                    user = ?user,
                    %common,
                    "Redeeming multi-resource refresh token from common authority"
                );
                return self.refresh_from(&entry, resource);
            }
        }

        debug!(user = ?user, "No usable token in cache");
        Err(AuthError::NotFound {
            resource: resource.to_string(),
            user,
        })
    }

    /// Seed the cache with a freshly issued result.
    ///
    /// `resource_override`, when given, replaces the result's own resource.
    /// Returns the instance now held by the cache.
    pub fn create_add_entry(
        &self,
        auth_result: AuthResult,
        resource_override: Option<&str>,
    ) -> Result<Arc<AuthResult>, AuthError> {
        let unusable = auth_result.access_token().is_empty()
            && auth_result.refresh_token().is_none_or(|rt| rt.is_empty());
        if unusable {
            return Err(AuthError::InvalidEntry {
                message: "result carries neither an access token nor a refresh token".to_string(),
            });
        }

        let auth_result = match resource_override {
            Some(resource) => auth_result.with_resource(resource),
            None => auth_result,
        };

        debug!(
            authority = %self.authority,
            resource = auth_result.resource(),
            user = ?auth_result.user_id(),
            "Adding cache entry"
        );
        Ok(self.store(auth_result))
    }

    /// Drop every entry of this authority and client for `user_id`.
    pub fn remove_user(&self, user_id: Option<&str>) -> usize {
        let removed = self.cache.remove(|e| {
            e.is_bound_to(&self.authority, &self.client_id) && e.user_id() == user_id
        });
        info!(authority = %self.authority, user = ?user_id, removed, "Removed cached tokens");
        removed
    }

    /// Pick the user a lookup without a user id stands for.
    fn resolve_user(&self, resource: &str) -> Result<Option<String>, AuthError> {
        if !self.authority.is_common() {
            return Ok(None);
        }

        let users: BTreeSet<String> = self
            .cache
            .query(|e| e.is_bound_to(&self.authority, &self.client_id))
            .iter()
            .filter_map(|e| e.user_id().map(str::to_string))
            .collect();

        match users.len() {
            0 | 1 => Ok(users.into_iter().next()),
            n => {
                debug!(users = n, "Cannot pick a user without a user id");
                Err(AuthError::AmbiguousUser {
                    resource: resource.to_string(),
                    users: n,
                })
            }
        }
    }

    fn exact_entry(&self, resource: &str, user_id: Option<&str>) -> Option<CacheEntry> {
        let key = CacheKey {
            authority: self.authority.clone(),
            client_id: self.client_id.clone(),
            resource: resource.to_string(),
            user_id: user_id.map(str::to_string),
        };
        self.cache.query(|e| e.key() == key).into_iter().next()
    }

    /// The longest-lived multi-resource refresh token of `user_id` under `authority`.
    fn mrrt_entry(&self, authority: &Authority, user_id: Option<&str>) -> Option<CacheEntry> {
        let key = MrrtKey {
            authority: authority.clone(),
            client_id: self.client_id.clone(),
            user_id: user_id.map(str::to_string),
        };
        self.cache
            .query(|e| {
                e.mrrt_key().as_ref() == Some(&key) && e.auth_result().refresh_token().is_some()
            })
            .into_iter()
            .max_by_key(CacheEntry::expires_on)
    }

    /// Redeem `source`'s refresh token for `resource` and cache the result.
    ///
    /// The result is stored under `source`'s user, which is the user the
    /// lookup resolved to, whatever identity the issuer reports. No cache
    /// lock is held during the issuer call.
    fn refresh_from(
        &self,
        source: &CacheEntry,
        resource: &str,
    ) -> Result<Arc<AuthResult>, AuthError> {
        let source = source.auth_result();
        let refresh_token = source.refresh_token().ok_or_else(|| AuthError::NotFound {
            resource: resource.to_string(),
            user: source.user_id().map(str::to_string),
        })?;

        let issued = self
            .issuer
            .exchange_refresh_token(refresh_token, resource)
            .inspect_err(|e| warn!(error = %e, "Token refresh failed"))?;

        let refreshed = issued
            .with_resource(resource)
            .or_refresh_token(refresh_token)
            .with_identity(source.user_info().cloned());

        info!(
            user = ?refreshed.user_id(),
            mrrt = refreshed.is_multi_resource_refresh_token(),
            "Refreshed access token"
        );
        Ok(self.store(refreshed))
    }

    fn store(&self, auth_result: AuthResult) -> Arc<AuthResult> {
        let auth_result = Arc::new(auth_result);
        self.cache.add(CacheEntry::new(
            Arc::clone(&auth_result),
            self.authority.clone(),
            self.client_id.clone(),
        ));
        auth_result
    }
}

impl<I: TokenIssuer> std::fmt::Debug for CacheDriver<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheDriver")
            .field("authority", &self.authority)
            .field("client_id", &self.client_id)
            .field("cache", &self.cache)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IdentityToken, UserInfo};
    use crate::store::Secret;
    use chrono::Duration;

    fn user(id: &str) -> UserInfo {
        UserInfo::from_id_token(&IdentityToken::new("subject", Some(id.to_string())))
    }

    fn failing_issuer(_rt: &Secret, _resource: &str) -> Result<AuthResult, AuthError> {
        Err(AuthError::IssuerRejected {
            message: "invalid_grant".to_string(),
        })
    }

    #[test]
    fn test_find_not_found() {
        let cache = Arc::new(TokenCache::new());
        let driver = CacheDriver::new("a/common", "123", cache, failing_issuer);

        let result = driver.find("graph", Some("a@m.com"));
        assert!(matches!(result, Err(AuthError::NotFound { .. })));
    }

    #[test]
    fn test_seed_and_find() {
        let cache = Arc::new(TokenCache::new());
        let driver = CacheDriver::new("a/tent1", "123", Arc::clone(&cache), failing_issuer);

        let seeded = driver
            .create_add_entry(
                AuthResult::new("at", "graph", Duration::hours(1)).with_user_info(user("a@m.com")),
                None,
            )
            .unwrap();

        let found = driver.find("graph", Some("a@m.com")).unwrap();
        assert!(Arc::ptr_eq(&seeded, &found));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_create_add_entry_rejects_empty_result() {
        let cache = Arc::new(TokenCache::new());
        let driver = CacheDriver::new("a/tent1", "123", Arc::clone(&cache), failing_issuer);

        let empty = AuthResult::new("", "graph", Duration::hours(1));
        let result = driver.create_add_entry(empty, None);
        assert!(matches!(result, Err(AuthError::InvalidEntry { .. })));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_other_client_is_invisible() {
        let cache = Arc::new(TokenCache::new());
        let seeding = CacheDriver::new("a/tent1", "other", Arc::clone(&cache), failing_issuer);
        seeding
            .create_add_entry(AuthResult::new("at", "graph", Duration::hours(1)), None)
            .unwrap();

        let driver = CacheDriver::new("a/tent1", "123", cache, failing_issuer);
        assert!(matches!(driver.find("graph", None), Err(AuthError::NotFound { .. })));
    }

    #[test]
    fn test_expiry_buffer_forces_refresh() {
        let cache = Arc::new(TokenCache::new());
        let issuer = |_rt: &Secret, resource: &str| -> Result<AuthResult, AuthError> {
            Ok(AuthResult::new("refreshed", resource, Duration::hours(1)))
        };
        let config = DriverConfig {
            expiry_buffer_secs: 600,
            ..DriverConfig::default()
        };
        let driver = CacheDriver::with_config("a/tent1", "123", cache, issuer, config);

        let near_expiry =
            AuthResult::new("near-expiry", "graph", Duration::minutes(5)).with_refresh_token("rt");
        driver.create_add_entry(near_expiry, None).unwrap();

        let found = driver.find("graph", None).unwrap();
        assert_eq!(found.access_token().expose(), "refreshed");
        assert_eq!(found.refresh_token().unwrap().expose(), "rt");
    }

    #[test]
    fn test_refresh_replaces_userless_entry_despite_issued_identity() {
        let cache = Arc::new(TokenCache::new());
        let issuer = |_rt: &Secret, resource: &str| -> Result<AuthResult, AuthError> {
            Ok(AuthResult::new("refreshed", resource, Duration::hours(1))
                .with_user_info(user("a@m.com")))
        };
        let driver = CacheDriver::new("a/tent1", "123", Arc::clone(&cache), issuer);

        let stale = AuthResult::new("stale", "graph", Duration::hours(-1)).with_refresh_token("rt");
        driver.create_add_entry(stale, None).unwrap();

        let first = driver.find("graph", None).unwrap();
        let second = driver.find("graph", None).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.access_token().expose(), "refreshed");
        assert!(first.user_id().is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_refresh_stores_under_resolved_user() {
        let cache = Arc::new(TokenCache::new());
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let issuer = move |_rt: &Secret, resource: &str| -> Result<AuthResult, AuthError> {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(AuthResult::new("refreshed", resource, Duration::hours(1))
                .with_user_info(user("someone@else.com")))
        };
        let driver = CacheDriver::new("a/tent1", "123", Arc::clone(&cache), issuer);

        let stale = AuthResult::new("stale", "graph", Duration::hours(-1))
            .with_refresh_token("rt")
            .with_user_info(user("a@m.com"));
        driver.create_add_entry(stale, None).unwrap();

        let first = driver.find("graph", None).unwrap();
        let second = driver.find("graph", Some("a@m.com")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.user_id(), Some("a@m.com"));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_expired_without_refresh_token_is_a_miss() {
        let cache = Arc::new(TokenCache::new());
        let driver = CacheDriver::new("a/tent1", "123", Arc::clone(&cache), failing_issuer);
        driver
            .create_add_entry(AuthResult::new("stale", "graph", Duration::hours(-1)), None)
            .unwrap();

        assert!(matches!(driver.find("graph", None), Err(AuthError::NotFound { .. })));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_remove_user() {
        let cache = Arc::new(TokenCache::new());
        let driver = CacheDriver::new("a/common", "123", Arc::clone(&cache), failing_issuer);
        for resource in ["graph", "manage"] {
            let seed =
                AuthResult::new("at", resource, Duration::hours(1)).with_user_info(user("a@m.com"));
            driver.create_add_entry(seed, None).unwrap();
        }
        driver
            .create_add_entry(
                AuthResult::new("at", "graph", Duration::hours(1)).with_user_info(user("b@m.com")),
                None,
            )
            .unwrap();

        assert_eq!(driver.remove_user(Some("a@m.com")), 2);
        assert_eq!(cache.len(), 1);
        assert!(driver.find("graph", Some("b@m.com")).is_ok());
    }
}
