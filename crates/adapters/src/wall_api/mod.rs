//! Community wall platform API adapters

mod read;
mod write;

pub use read::WallSource;
pub use write::WallPublisher;

use reposter_domain::{PublishError, SourceError};
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::sync::Arc;

/// API version sent with every request when none is configured
pub const DEFAULT_API_VERSION: &str = "5.131";

/// Access tokens keyed by account name; clones share the same map
#[derive(Clone, Default)]
pub struct AccountTokens {
    tokens: Arc<HashMap<String, SecretString>>,
}

impl AccountTokens {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a token; a map already shared with clones is copied first
    pub fn insert(&mut self, account: impl Into<String>, token: SecretString) {
        match Arc::get_mut(&mut self.tokens) {
            Some(tokens) => {
                tokens.insert(account.into(), token);
            }
            None => {
                let mut tokens: HashMap<String, SecretString> = self
                    .tokens
                    .iter()
                    .map(|(k, v)| (k.clone(), SecretString::new(v.expose_secret().into())))
                    .collect();
                tokens.insert(account.into(), token);
                self.tokens = Arc::new(tokens);
            }
        }
    }

    pub fn with(mut self, account: impl Into<String>, token: SecretString) -> Self {
        self.insert(account, token);
        self
    }

    pub fn contains(&self, account: &str) -> bool {
        self.tokens.contains_key(account)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    fn read_token(&self, account: &str) -> Result<&SecretString, SourceError> {
        self.tokens
            .get(account)
            .ok_or_else(|| SourceError::Auth(format!("No token for account '{}'", account)))
    }

    fn write_token(&self, account: &str) -> Result<&SecretString, PublishError> {
        self.tokens
            .get(account)
            .ok_or_else(|| PublishError::Auth(format!("No token for account '{}'", account)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_account_is_auth_error() {
        let tokens = AccountTokens::new().with("reader", SecretString::new("t".into()));

        assert!(tokens.read_token("reader").is_ok());
        assert!(matches!(
            tokens.read_token("other"),
            Err(SourceError::Auth(_))
        ));
        assert!(matches!(
            tokens.write_token("other"),
            Err(PublishError::Auth(_))
        ));
    }
}
