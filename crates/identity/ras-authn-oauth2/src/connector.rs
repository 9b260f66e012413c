//! Capability contract every OAuth provider connector implements.

use crate::pkce::CODE_CHALLENGE_METHOD;
use crate::settings::OAuthInfo;
use async_trait::async_trait;
use ras_authn_core::OAuthToken;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub const HOSTED_DOMAIN_PARAM_NAME: &str = "hd";

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid token response: {0}")]
    InvalidTokenResponse(String),

    #[error("Invalid user info response: {0}")]
    InvalidUserInfoResponse(String),

    #[error("Invalid connector configuration: {0}")]
    Config(String),

    /// A failure whose message is meant for the end user, e.g. "user is not
    /// a member of an allowed organization".
    #[error("{0}")]
    Social(String),
}

/// Extra option for the authorization URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthCodeOption {
    HostedDomain(String),
    /// PKCE challenge, always sent with the `S256` method.
    S256Challenge(String),
    Param { key: String, value: String },
}

impl AuthCodeOption {
    /// Query parameters the option expands to.
    pub fn params(&self) -> Vec<(&str, &str)> {
        match self {
            AuthCodeOption::HostedDomain(domain) => {
                vec![(HOSTED_DOMAIN_PARAM_NAME, domain.as_str())]
            }
            AuthCodeOption::S256Challenge(challenge) => vec![
                ("code_challenge", challenge.as_str()),
                ("code_challenge_method", CODE_CHALLENGE_METHOD),
            ],
            AuthCodeOption::Param { key, value } => vec![(key.as_str(), value.as_str())],
        }
    }
}

/// Extra option for the code exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOption {
    /// PKCE code verifier matching the challenge sent earlier.
    Verifier(String),
    Param { key: String, value: String },
}

impl ExchangeOption {
    pub fn param(&self) -> (&str, &str) {
        match self {
            ExchangeOption::Verifier(verifier) => ("code_verifier", verifier.as_str()),
            ExchangeOption::Param { key, value } => (key.as_str(), value.as_str()),
        }
    }
}

/// User info as reported by the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicUserInfo {
    pub id: String,
    pub name: String,
    pub email: String,
    pub login: String,
    /// Role hint, e.g. `Admin`. Empty when the provider has no opinion.
    pub role: String,
    pub is_server_admin: Option<bool>,
    pub groups: Vec<String>,
}

/// Per-provider OAuth2/OIDC client adapter.
#[async_trait]
pub trait SocialConnector: Send + Sync {
    fn auth_code_url(&self, state: &str, options: &[AuthCodeOption]) -> String;

    async fn exchange(
        &self,
        code: &str,
        options: &[ExchangeOption],
    ) -> Result<OAuthToken, ConnectorError>;

    async fn user_info(
        &self,
        client: &reqwest::Client,
        token: &OAuthToken,
    ) -> Result<BasicUserInfo, ConnectorError>;

    fn is_email_allowed(&self, email: &str) -> bool;

    fn is_signup_allowed(&self) -> bool;

    /// HTTP client to talk to the provider on behalf of `token`.
    fn client(&self, token: &OAuthToken) -> reqwest::Client;
}

/// Resolves provider configuration and connectors by provider name.
///
/// Configuration is looked up per request; callers get a snapshot that stays
/// fixed for the rest of that request.
pub trait SocialService: Send + Sync {
    fn oauth_info(&self, provider: &str) -> Option<OAuthInfo>;

    fn connector(&self, provider: &str) -> Option<Arc<dyn SocialConnector>>;
}

/// Fixed set of providers, built once at startup.
///
/// Disabled providers keep their configuration but have no connector.
#[derive(Clone, Default)]
pub struct StaticSocialService {
    infos: HashMap<String, OAuthInfo>,
    connectors: HashMap<String, Arc<dyn SocialConnector>>,
}

impl StaticSocialService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(
        mut self,
        provider: impl Into<String>,
        info: OAuthInfo,
        connector: Arc<dyn SocialConnector>,
    ) -> Self {
        let provider = provider.into();
        self.connectors.insert(provider.clone(), connector);
        self.infos.insert(provider, info);
        self
    }

    /// Register a provider's configuration without a connector.
    pub fn with_info(mut self, provider: impl Into<String>, info: OAuthInfo) -> Self {
        let provider = provider.into();
        self.connectors.remove(&provider);
        self.infos.insert(provider, info);
        self
    }

    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.infos.keys().map(String::as_str)
    }
}

impl SocialService for StaticSocialService {
    fn oauth_info(&self, provider: &str) -> Option<OAuthInfo> {
        self.infos.get(provider).cloned()
    }

    fn connector(&self, provider: &str) -> Option<Arc<dyn SocialConnector>> {
        self.connectors.get(provider).map(Arc::clone)
    }
}
