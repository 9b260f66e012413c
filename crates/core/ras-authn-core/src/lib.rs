//! Core identity types and client traits for request authentication.
//!
//! Authentication clients (OAuth, and anything else that turns an inbound
//! request into an [`Identity`]) implement the traits in this crate so the
//! surrounding session framework can drive them without knowing the protocol.

mod identity;
mod request;
mod token;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

pub use identity::{
    ClientParams, DEFAULT_ORG_ID, Identity, OrgId, RoleType, UserAuth, UserLookupParams,
};
pub use request::AuthnRequest;
pub use token::OAuthToken;

/// Prefix shared by every registered client name.
pub const CLIENT_PREFIX: &str = "auth.client.";

/// `Redirect::extra` key holding the hashed OAuth state.
pub const KEY_OAUTH_STATE: &str = "oauth_state";

/// `Redirect::extra` key holding the raw PKCE code verifier.
pub const KEY_OAUTH_PKCE: &str = "oauth_pkce";

/// Builds the full client name, e.g. `auth.client.azuread`.
pub fn client_with_prefix(name: &str) -> String {
    format!("{CLIENT_PREFIX}{name}")
}

#[derive(Debug, Error)]
pub enum AuthnError {
    #[error("Invalid role: {0}")]
    InvalidRole(String),

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),
}

pub type AuthnResult<T> = Result<T, AuthnError>;

/// Where to send the browser next, plus values the caller has to persist
/// (typically as cookies) before doing so.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redirect {
    pub url: String,
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

impl Redirect {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            extra: HashMap::new(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// A client that can authenticate an inbound request.
#[async_trait]
pub trait AuthnClient: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    fn name(&self) -> &str;

    async fn authenticate(&self, request: &AuthnRequest) -> Result<Identity, Self::Error>;
}

/// A client whose login starts by redirecting the browser elsewhere.
#[async_trait]
pub trait RedirectClient: AuthnClient {
    async fn redirect_url(&self, request: &AuthnRequest) -> Result<Redirect, Self::Error>;
}

/// A client that takes part in logout.
///
/// Returns the redirect to follow after the local session is gone, or `None`
/// when the client has nowhere to send the browser.
#[async_trait]
pub trait LogoutClient: Send + Sync {
    async fn logout(&self, identity: &Identity, user_auth: &UserAuth) -> Option<Redirect>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_with_prefix() {
        assert_eq!(client_with_prefix("azuread"), "auth.client.azuread");
    }

    #[test]
    fn test_redirect_extra() {
        let redirect = Redirect::new("https://idp.example.com/authorize")
            .with_extra(KEY_OAUTH_STATE, "hashed")
            .with_extra(KEY_OAUTH_PKCE, "verifier");

        assert_eq!(redirect.url, "https://idp.example.com/authorize");
        assert_eq!(redirect.extra.get(KEY_OAUTH_STATE).unwrap(), "hashed");
        assert_eq!(redirect.extra.get(KEY_OAUTH_PKCE).unwrap(), "verifier");
    }
}
