//! Access to the OAuth tokens stored for logged in users.

use async_trait::async_trait;
use ras_authn_core::{Identity, OAuthToken, UserAuth};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TokenServiceError {
    #[error("No stored token for {0}")]
    NotFound(String),

    #[error("Token storage error: {0}")]
    Storage(String),
}

/// Stored OAuth tokens, keyed by the user's auth module and auth id.
#[async_trait]
pub trait OAuthTokenService: Send + Sync {
    /// The token currently stored for `identity`, if any.
    async fn get_current_oauth_token(&self, identity: &Identity) -> Option<OAuthToken>;

    /// Drop every token stored for `user_auth`.
    async fn invalidate_oauth_tokens(&self, user_auth: &UserAuth) -> Result<(), TokenServiceError>;
}

type TokenKey = (String, String);

/// In-memory implementation of [`OAuthTokenService`]
#[derive(Clone, Default)]
pub struct InMemoryTokenService {
    tokens: Arc<RwLock<HashMap<TokenKey, OAuthToken>>>,
}

impl InMemoryTokenService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn store(
        &self,
        auth_module: impl Into<String>,
        auth_id: impl Into<String>,
        token: OAuthToken,
    ) {
        let mut tokens = self.tokens.write().await;
        tokens.insert((auth_module.into(), auth_id.into()), token);
    }

    /// Store the token an identity came back with, if it carries one.
    pub async fn store_identity_token(&self, identity: &Identity) {
        if let Some(token) = &identity.oauth_token {
            self.store(
                identity.authenticated_by.clone(),
                identity.auth_id.clone(),
                token.clone(),
            )
            .await;
        }
    }

    pub async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tokens.read().await.is_empty()
    }
}

#[async_trait]
impl OAuthTokenService for InMemoryTokenService {
    async fn get_current_oauth_token(&self, identity: &Identity) -> Option<OAuthToken> {
        let tokens = self.tokens.read().await;
        tokens
            .get(&(identity.authenticated_by.clone(), identity.auth_id.clone()))
            .cloned()
    }

    async fn invalidate_oauth_tokens(&self, user_auth: &UserAuth) -> Result<(), TokenServiceError> {
        let mut tokens = self.tokens.write().await;
        let key = (user_auth.auth_module.clone(), user_auth.auth_id.clone());

        match tokens.remove(&key) {
            Some(_) => {
                debug!("Invalidated OAuth tokens for user {}", user_auth.user_id);
                Ok(())
            }
            None => Err(TokenServiceError::NotFound(format!(
                "{}/{}",
                user_auth.auth_module, user_auth.auth_id
            ))),
        }
    }
}
