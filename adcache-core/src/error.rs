//! Top-level error types for adcache.

use thiserror::Error;

use crate::config::ConfigError;
use crate::token::AuthError;

/// Top-level error type encompassing all adcache errors.
#[derive(Debug, Error)]
pub enum AdCacheError {
    /// Error from token resolution.
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    /// Error loading configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_auth_error() {
        let err: AdCacheError = AuthError::AmbiguousUser {
            resource: "graph".to_string(),
            users: 2,
        }
        .into();
        assert!(matches!(err, AdCacheError::Auth(AuthError::AmbiguousUser { users: 2, .. })));
        assert!(err.to_string().starts_with("auth error: ambiguous user"));
    }

    #[test]
    fn test_from_config_error() {
        let err: AdCacheError = ConfigError::ConfigDirUnavailable.into();
        assert_eq!(err.to_string(), "configuration error: configuration directory not available");
    }
}
