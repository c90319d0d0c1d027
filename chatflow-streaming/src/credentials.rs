//! Credential sources for the bearer token.
//!
//! Token issuance lives elsewhere; the client only reads whatever the
//! provider currently holds, once per session.

use std::fmt;

/// Default environment variable holding the API token.
pub const DEFAULT_TOKEN_ENV: &str = "CHATFLOW_API_TOKEN";

/// Source of the bearer credential.
pub trait CredentialProvider: Send + Sync {
    /// Current credential, if any.
    fn credential(&self) -> Option<String>;
}

impl<F> CredentialProvider for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn credential(&self) -> Option<String> {
        self()
    }
}

/// A fixed credential.
#[derive(Clone, Default)]
pub struct StaticCredential(Option<String>);

impl StaticCredential {
    /// Create from a token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    /// A provider that never has a credential.
    pub fn none() -> Self {
        Self(None)
    }
}

impl fmt::Debug for StaticCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StaticCredential")
            .field(&self.0.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl CredentialProvider for StaticCredential {
    fn credential(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Reads the credential from an environment variable on every call.
#[derive(Debug, Clone)]
pub struct EnvCredential {
    var: String,
}

impl EnvCredential {
    /// Read from a specific variable.
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvCredential {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_ENV)
    }
}

impl CredentialProvider for EnvCredential {
    fn credential(&self) -> Option<String> {
        std::env::var(&self.var).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_credential() {
        assert_eq!(
            StaticCredential::new("tok").credential(),
            Some("tok".to_string())
        );
        assert_eq!(StaticCredential::none().credential(), None);
    }

    #[test]
    fn test_debug_redacts_token() {
        let debug = format!("{:?}", StaticCredential::new("secret"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_closure_provider() {
        let provider = || Some("from-closure".to_string());
        assert_eq!(provider.credential().as_deref(), Some("from-closure"));
    }

    #[test]
    fn test_env_credential_missing_var() {
        let provider = EnvCredential::new("CHATFLOW_TEST_TOKEN_THAT_IS_NEVER_SET");
        assert_eq!(provider.credential(), None);
    }
}
