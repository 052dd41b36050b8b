//! Issued credentials and the issuer seam.
//!
//! This module provides:
//! - [`AuthResult`] - One issued credential (access token, refresh token, expiry)
//! - [`AuthError`] - The single error kind surfaced by cache lookups
//! - [`TokenIssuer`] - Trait for exchanging a refresh token for a new credential

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::UserInfo;
use crate::store::Secret;

/// Error type for token resolution.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Nothing cached or derivable for the requested resource/user.
    #[error(
        "no usable token for resource `{resource}` and user {}",
        .user.as_deref().unwrap_or("<none>")
    )]
    NotFound {
        resource: String,
        user: Option<String>,
    },

    /// No user id was given and more than one user has cached tokens.
    #[error(
        "ambiguous user for resource `{resource}`: {users} users cached, a user id is required"
    )]
    AmbiguousUser { resource: String, users: usize },

    /// The issuer refused the refresh token.
    #[error("issuer rejected refresh token: {message}")]
    IssuerRejected { message: String },

    /// The exchange with the issuer failed before a verdict was reached.
    #[error("token exchange failed: {message}")]
    Transport { message: String },

    /// A result cannot be seeded into the cache.
    #[error("invalid cache entry: {message}")]
    InvalidEntry { message: String },

    /// Identity token claims are unusable.
    #[error("invalid identity token: {message}")]
    InvalidIdToken { message: String },
}

impl AuthError {
    /// Whether this error came from the issuer during a refresh.
    pub fn is_refresh_failure(&self) -> bool {
        matches!(self, Self::IssuerRejected { .. } | Self::Transport { .. })
    }
}

/// One issued credential.
///
/// Values are immutable once built. The `with_*` methods consume and return
/// the value so a result can be assembled before it is handed to the cache;
/// once cached it is shared as `Arc<AuthResult>` and never changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResult {
    token_type: String,
    access_token: Secret,
    refresh_token: Option<Secret>,
    expires_on: DateTime<Utc>,
    user_info: Option<UserInfo>,
    resource: String,
    is_multi_resource_refresh_token: bool,
}

impl AuthResult {
    /// Create a bearer credential for `resource` expiring `expires_in` from now.
    pub fn new(
        access_token: impl Into<String>,
        resource: impl Into<String>,
        expires_in: Duration,
    ) -> Self {
        let expires_on = Utc::now()
            .checked_add_signed(expires_in)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            token_type: "Bearer".to_string(),
            access_token: Secret::new(access_token),
            refresh_token: None,
            expires_on,
            user_info: None,
            resource: resource.into(),
            is_multi_resource_refresh_token: false,
        }
    }

    /// Set the token type.
    pub fn with_token_type(mut self, token_type: impl Into<String>) -> Self {
        self.token_type = token_type.into();
        self
    }

    /// Attach a refresh token.
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(Secret::new(refresh_token));
        self
    }

    /// Attach the identity this credential was issued to.
    pub fn with_user_info(mut self, user_info: UserInfo) -> Self {
        self.user_info = Some(user_info);
        self
    }

    /// Mark the refresh token as valid for any resource.
    pub fn with_multi_resource_refresh_token(mut self, mrrt: bool) -> Self {
        self.is_multi_resource_refresh_token = mrrt;
        self
    }

    /// Override the absolute expiry instant.
    pub fn with_expires_on(mut self, expires_on: DateTime<Utc>) -> Self {
        self.expires_on = expires_on;
        self
    }

    /// Re-scope the credential to another resource.
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = resource.into();
        self
    }

    /// Keep `fallback` when the issuer did not rotate the refresh token.
    pub(crate) fn or_refresh_token(mut self, fallback: &Secret) -> Self {
        if self.refresh_token.is_none() {
            self.refresh_token = Some(fallback.clone());
        }
        self
    }

    /// Replace the attached identity, clearing it when `user_info` is `None`.
    pub(crate) fn with_identity(mut self, user_info: Option<UserInfo>) -> Self {
        self.user_info = user_info;
        self
    }

    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    pub fn access_token(&self) -> &Secret {
        &self.access_token
    }

    pub fn refresh_token(&self) -> Option<&Secret> {
        self.refresh_token.as_ref()
    }

    pub fn expires_on(&self) -> DateTime<Utc> {
        self.expires_on
    }

    pub fn user_info(&self) -> Option<&UserInfo> {
        self.user_info.as_ref()
    }

    /// The user id of the attached identity, if any.
    pub fn user_id(&self) -> Option<&str> {
        self.user_info.as_ref().map(UserInfo::user_id)
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn is_multi_resource_refresh_token(&self) -> bool {
        self.is_multi_resource_refresh_token
    }

    /// Check if this credential has expired.
    pub fn is_expired(&self) -> bool {
        self.expires_within(Duration::zero())
    }

    /// Check if this credential expires within the given duration.
    pub fn expires_within(&self, duration: Duration) -> bool {
        Utc::now()
            .checked_add_signed(duration)
            .map(|horizon| self.expires_on <= horizon)
            .unwrap_or(true)
    }
}

/// Exchanges a refresh token for a new credential.
///
/// The cache driver calls this whenever it has to refresh. Implementations
/// talk to the identity provider; the driver never holds a cache lock while
/// the call is in flight.
///
/// Closures with the matching signature implement the trait, which keeps
/// test doubles short:
///
/// ```
/// use adcache_core::{AuthError, AuthResult, Secret, TokenIssuer};
///
/// let issuer = |_rt: &Secret, resource: &str| -> Result<AuthResult, AuthError> {
///     Ok(AuthResult::new("at", resource, chrono::Duration::hours(1)))
/// };
/// let result = issuer
///     .exchange_refresh_token(&Secret::new("rt"), "graph")
///     .unwrap();
/// assert_eq!(result.resource(), "graph");
/// ```
pub trait TokenIssuer: Send + Sync {
    /// Exchange `refresh_token` for a credential scoped to `resource`.
    ///
    /// The response is authoritative for the multi-resource flag, the
    /// tokens and the expiry.
    fn exchange_refresh_token(
        &self,
        refresh_token: &Secret,
        resource: &str,
    ) -> Result<AuthResult, AuthError>;
}

impl<F> TokenIssuer for F
where
    F: Fn(&Secret, &str) -> Result<AuthResult, AuthError> + Send + Sync,
{
    fn exchange_refresh_token(
        &self,
        refresh_token: &Secret,
        resource: &str,
    ) -> Result<AuthResult, AuthError> {
        self(refresh_token, resource)
    }
}
