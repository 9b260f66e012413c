//! OAuth2 authorization code login with optional PKCE.
//!
//! [`OAuthClient`] drives the three request-scoped operations of an OAuth
//! login: building the authorization redirect, authenticating the callback
//! and logging out (including OIDC RP-initiated logout). Providers plug in
//! through the [`SocialConnector`] and [`SocialService`] traits; stored tokens
//! are reached through [`OAuthTokenService`].

mod client;
mod connector;
mod cookies;
mod error;
mod generic;
mod logout;
mod mapper;
mod pkce;
mod settings;
mod token;
mod types;


pub use client::{LogoutResult, OAuthClient};
pub use connector::{
    AuthCodeOption, BasicUserInfo, ConnectorError, ExchangeOption, HOSTED_DOMAIN_PARAM_NAME,
    SocialConnector, SocialService, StaticSocialService,
};
pub use cookies::{
    LoginCookies, OAUTH_CODE_QUERY_NAME, OAUTH_ERROR_DESCRIPTION_QUERY_NAME,
    OAUTH_ERROR_QUERY_NAME, OAUTH_PKCE_COOKIE_NAME, OAUTH_STATE_COOKIE_NAME,
    OAUTH_STATE_QUERY_NAME, hash_state, verify_state,
};
pub use error::{OAuthError, OAuthResult};
pub use generic::GenericConnector;
pub use logout::{is_oidc_logout, logout_url, signout_redirect_url, with_id_token_hint};
pub use mapper::{IdentityMapper, org_roles};
pub use pkce::{
    CODE_CHALLENGE_METHOD, PkceChallenge, derive_code_challenge, gen_pkce_code_verifier,
    generate_state,
};
pub use settings::{OAuthConfig, OAuthInfo, OAuthSettings};
pub use token::{InMemoryTokenService, OAuthTokenService, TokenServiceError};
pub use types::TokenResponse;

// Re-export common types for convenience
pub use ras_authn_core::{
    AuthnClient, AuthnRequest, Identity, LogoutClient, OAuthToken, Redirect, RedirectClient,
    UserAuth,
};
