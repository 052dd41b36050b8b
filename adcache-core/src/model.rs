//! Identity types shared by the cache and the driver.
//!
//! This module defines:
//! - [`Authority`] - Identity provider issuer, tenant-scoped or `common`
//! - [`IdentityToken`] - Already-decoded claims of an identity token
//! - [`UserInfo`] - Identity descriptor derived from an [`IdentityToken`]

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::token::AuthError;

/// Tenant segment of the tenant-less authority.
pub const COMMON_TENANT: &str = "common";

/// Identity provider issuer endpoint.
///
/// The last path segment is the tenant. An authority whose tenant is
/// `common` spans every tenant the user belongs to.
///
/// Authorities are normalized: trailing slashes are trimmed and the value is
/// lowercased, so `https://login.example.com/Common/` and
/// `https://login.example.com/common` compare equal.
///
/// # Examples
///
/// ```
/// use adcache_core::Authority;
///
/// let tenant = Authority::new("https://login.example.com/contoso");
/// assert!(!tenant.is_common());
/// assert_eq!(tenant.common().as_str(), "https://login.example.com/common");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Authority(String);

impl Authority {
    /// Create a new normalized authority.
    pub fn new(authority: impl Into<String>) -> Self {
        let authority = authority.into();
        Self(authority.trim_end_matches('/').to_ascii_lowercase())
    }

    /// Get the authority as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The tenant segment (everything after the last `/`).
    pub fn tenant(&self) -> &str {
        match self.0.rsplit_once('/') {
            Some((_, tenant)) => tenant,
            None => &self.0,
        }
    }

    /// Whether this is the tenant-less `common` authority.
    pub fn is_common(&self) -> bool {
        self.tenant() == COMMON_TENANT
    }

    /// The same issuer with its tenant replaced.
    pub fn with_tenant(&self, tenant: &str) -> Self {
        match self.0.rsplit_once('/') {
            Some((base, _)) => Self::new(format!("{}/{}", base, tenant)),
            None => Self::new(tenant),
        }
    }

    /// The `common` authority of the same issuer.
    pub fn common(&self) -> Self {
        self.with_tenant(COMMON_TENANT)
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Authority {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Authority {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Claims extracted from an identity token.
///
/// The token itself is decoded elsewhere; only the two claims the cache keys
/// on are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityToken {
    subject: String,
    upn: Option<String>,
}

impl IdentityToken {
    /// Create an identity token from its subject and optional UPN.
    pub fn new(subject: impl Into<String>, upn: Option<String>) -> Self {
        Self {
            subject: subject.into(),
            upn: upn.filter(|u| !u.is_empty()),
        }
    }

    /// Build from an already-decoded claims object.
    ///
    /// Reads the `sub` and `upn` string claims. Everything else is ignored.
    pub fn from_claims(claims: &serde_json::Value) -> Result<Self, AuthError> {
        let subject = claims
            .get("sub")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AuthError::InvalidIdToken {
                message: "missing `sub` claim".to_string(),
            })?;

        let upn = claims
            .get("upn")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        Ok(Self::new(subject, upn))
    }

    /// Stable per-tenant identity id.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// User principal name, if the token carried one.
    pub fn upn(&self) -> Option<&str> {
        self.upn.as_deref()
    }
}

/// Identity a cached credential belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserInfo {
    user_id: String,
    unique_id: String,
}

impl UserInfo {
    /// Derive user info from an identity token.
    ///
    /// The user id is the UPN when present, otherwise the subject.
    pub fn from_id_token(id_token: &IdentityToken) -> Self {
        let user_id = id_token.upn().unwrap_or(id_token.subject()).to_string();
        Self {
            user_id,
            unique_id: id_token.subject().to_string(),
        }
    }

    /// The id callers look tokens up by.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The subject the user id was derived from.
    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }
}
