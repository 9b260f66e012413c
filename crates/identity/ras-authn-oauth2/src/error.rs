//! OAuth login error types.

use crate::connector::ConnectorError;
use thiserror::Error;

pub type OAuthResult<T> = Result<T, OAuthError>;

/// Every failure is terminal for the request that hit it; nothing in this
/// crate retries.
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("OAuth client is disabled: {0}")]
    ClientDisabled(String),

    #[error("OAuth provider not configured: {0}")]
    ProviderNotFound(String),

    #[error("Missing saved oauth state")]
    MissingState,

    #[error("Provided state does not match stored state")]
    InvalidState,

    #[error("Identity provider returned an error: {0}")]
    CallbackError(String),

    #[error("Missing required pkce cookie")]
    MissingPkce,

    #[error("Failed to exchange code to token")]
    ExchangeFailed(#[source] ConnectorError),

    #[error("Failed to get user info")]
    UserInfoFailed(#[source] ConnectorError),

    #[error("Provider didn't return an email address")]
    MissingRequiredEmail,

    #[error("Required email domain not fulfilled")]
    EmailNotAllowed,

    #[error("Timed out during {0}")]
    Timeout(&'static str),

    #[error("Failed to read from the system random source: {0}")]
    Entropy(#[from] rand::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] config::ConfigError),
}

impl OAuthError {
    /// Stable identifier for the failure, safe to hand to a browser.
    pub fn message_id(&self) -> &'static str {
        match self {
            OAuthError::ClientDisabled(_) => "auth.oauth.client.disabled",
            OAuthError::ProviderNotFound(_) => "auth.oauth.provider.missing",
            OAuthError::MissingState => "auth.oauth.state.missing",
            OAuthError::InvalidState => "auth.oauth.state.invalid",
            OAuthError::CallbackError(_) => "auth.oauth.callback.error",
            OAuthError::MissingPkce => "auth.oauth.pkce.missing",
            OAuthError::ExchangeFailed(_) => "auth.oauth.token.exchange",
            OAuthError::UserInfoFailed(_) => "auth.oauth.userinfo.failed",
            OAuthError::MissingRequiredEmail => "auth.oauth.email.missing",
            OAuthError::EmailNotAllowed => "auth.oauth.email.not-allowed",
            OAuthError::Timeout(_) => "auth.oauth.timeout",
            OAuthError::Entropy(_) => "auth.oauth.entropy",
            OAuthError::Config(_) => "auth.oauth.config",
        }
    }
}
