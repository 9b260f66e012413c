//! OAuth login client: starts the login, handles the callback and logs out.

use crate::connector::{AuthCodeOption, ExchangeOption, SocialConnector, SocialService};
use crate::cookies::{
    LoginCookies, OAUTH_CODE_QUERY_NAME, OAUTH_ERROR_DESCRIPTION_QUERY_NAME,
    OAUTH_ERROR_QUERY_NAME, OAUTH_PKCE_COOKIE_NAME, OAUTH_STATE_COOKIE_NAME,
    OAUTH_STATE_QUERY_NAME, hash_state, verify_state,
};
use crate::error::{OAuthError, OAuthResult};
use crate::logout::{logout_url, signout_redirect_url};
use crate::mapper::IdentityMapper;
use crate::pkce::{PkceChallenge, generate_state};
use crate::settings::{OAuthInfo, OAuthSettings};
use crate::token::{OAuthTokenService, TokenServiceError};
use async_trait::async_trait;
use ras_authn_core::{
    AuthnClient, AuthnRequest, Identity, KEY_OAUTH_PKCE, KEY_OAUTH_STATE, LogoutClient, Redirect,
    RedirectClient, UserAuth, client_with_prefix,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Outcome of a logout.
#[derive(Debug)]
pub struct LogoutResult {
    /// Where to send the browser, if the provider has a logout endpoint.
    pub redirect: Option<Redirect>,
    /// Outcome of dropping the stored tokens. Failures don't stop the logout.
    pub invalidation: Result<(), TokenServiceError>,
}

impl LogoutResult {
    pub fn ok(&self) -> bool {
        self.redirect.is_some()
    }
}

/// Login client for a single OAuth provider.
#[derive(Clone)]
pub struct OAuthClient {
    name: String,
    provider: String,
    module_name: String,
    settings: Arc<OAuthSettings>,
    social_service: Arc<dyn SocialService>,
    token_service: Arc<dyn OAuthTokenService>,
    request_timeout: Duration,
}

impl OAuthClient {
    pub fn new(
        provider: impl Into<String>,
        settings: Arc<OAuthSettings>,
        social_service: Arc<dyn SocialService>,
        token_service: Arc<dyn OAuthTokenService>,
    ) -> Self {
        let provider = provider.into();
        let request_timeout = settings.http_timeout();

        Self {
            name: client_with_prefix(&provider),
            module_name: format!("oauth_{provider}"),
            provider,
            settings,
            social_service,
            token_service,
            request_timeout,
        }
    }

    /// Upper bound for each call to the identity provider.
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Auth module identities from this client are tagged with, e.g. `oauth_okta`.
    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    pub fn login_cookies(&self) -> LoginCookies {
        LoginCookies::from_settings(&self.settings)
    }

    fn enabled_provider(&self) -> OAuthResult<(OAuthInfo, Arc<dyn SocialConnector>)> {
        let info = self
            .social_service
            .oauth_info(&self.provider)
            .ok_or_else(|| OAuthError::ProviderNotFound(self.provider.clone()))?;

        if !info.enabled {
            return Err(OAuthError::ClientDisabled(self.provider.clone()));
        }

        let connector = self
            .social_service
            .connector(&self.provider)
            .ok_or_else(|| OAuthError::ProviderNotFound(self.provider.clone()))?;

        Ok((info, connector))
    }

    /// Build the authorization URL to send the browser to.
    ///
    /// The returned redirect carries the hashed state and, with PKCE, the raw
    /// code verifier in `extra`; both must be stored as cookies before
    /// redirecting.
    pub async fn redirect_url(&self, _request: &AuthnRequest) -> OAuthResult<Redirect> {
        let (info, connector) = self.enabled_provider()?;

        let mut options = Vec::new();
        if let Some(hosted_domain) = info.hosted_domain() {
            options.push(AuthCodeOption::HostedDomain(hosted_domain.to_string()));
        }

        let mut code_verifier = None;
        if info.use_pkce {
            let pkce = PkceChallenge::generate()?;
            options.push(AuthCodeOption::S256Challenge(pkce.code_challenge));
            code_verifier = Some(pkce.code_verifier);
        }

        let state = generate_state()?;
        let hashed_state = hash_state(&state, &self.settings.secret_key, &info.client_secret);

        let mut redirect = Redirect::new(connector.auth_code_url(&state, &options))
            .with_extra(KEY_OAUTH_STATE, hashed_state);
        if let Some(code_verifier) = code_verifier {
            redirect = redirect.with_extra(KEY_OAUTH_PKCE, code_verifier);
        }

        info!("Started OAuth login for provider: {}", self.provider);
        Ok(redirect)
    }

    /// Complete the login from the identity provider's callback.
    pub async fn authenticate(&self, request: &AuthnRequest) -> OAuthResult<Identity> {
        let state_cookie = request
            .cookie(OAUTH_STATE_COOKIE_NAME)
            .filter(|value| !value.is_empty())
            .ok_or(OAuthError::MissingState)?;

        let (info, connector) = self.enabled_provider()?;

        let state = request
            .query_param(OAUTH_STATE_QUERY_NAME)
            .unwrap_or_default();
        if !verify_state(
            &state_cookie,
            &state,
            &self.settings.secret_key,
            &info.client_secret,
        ) {
            warn!("OAuth state mismatch for provider: {}", self.provider);
            return Err(OAuthError::InvalidState);
        }

        if let Some(error) = request.query_param(OAUTH_ERROR_QUERY_NAME) {
            let description = request
                .query_param(OAUTH_ERROR_DESCRIPTION_QUERY_NAME)
                .unwrap_or_default();
            warn!(
                "Provider {} returned an error on callback: {}",
                self.provider, error
            );
            return Err(OAuthError::CallbackError(if description.is_empty() {
                error
            } else {
                format!("{error}: {description}")
            }));
        }

        let mut options = Vec::new();
        if info.use_pkce {
            let code_verifier = request
                .cookie(OAUTH_PKCE_COOKIE_NAME)
                .filter(|value| !value.is_empty())
                .ok_or(OAuthError::MissingPkce)?;
            options.push(ExchangeOption::Verifier(code_verifier));
        }

        let code = request.query_param(OAUTH_CODE_QUERY_NAME).unwrap_or_default();
        let mut token = timeout(self.request_timeout, connector.exchange(&code, &options))
            .await
            .map_err(|_| OAuthError::Timeout("token exchange"))?
            .map_err(OAuthError::ExchangeFailed)?;
        // some providers return lower case or no token type at all
        token.token_type = "Bearer".to_string();

        let http_client = connector.client(&token);
        let user_info = timeout(
            self.request_timeout,
            connector.user_info(&http_client, &token),
        )
        .await
        .map_err(|_| OAuthError::Timeout("user info"))?
        .map_err(OAuthError::UserInfoFailed)?;

        if user_info.email.is_empty() {
            return Err(OAuthError::MissingRequiredEmail);
        }

        if !connector.is_email_allowed(&user_info.email) {
            debug!("Email domain not allowed for provider: {}", self.provider);
            return Err(OAuthError::EmailNotAllowed);
        }

        let identity = IdentityMapper {
            provider: &self.provider,
            settings: &self.settings,
            info: &info,
            allow_sign_up: connector.is_signup_allowed(),
        }
        .map(user_info, token);

        info!(
            "Authenticated user {} via provider: {}",
            identity.auth_id, self.provider
        );
        Ok(identity)
    }

    /// Drop the user's stored tokens and work out where to send the browser.
    pub async fn logout(&self, identity: &Identity, user_auth: &UserAuth) -> LogoutResult {
        // read before invalidation removes it
        let token = self.token_service.get_current_oauth_token(identity).await;

        let invalidation = self.token_service.invalidate_oauth_tokens(user_auth).await;
        if let Err(e) = &invalidation {
            warn!(
                "Failed to invalidate OAuth tokens for user {}: {}",
                user_auth.user_id, e
            );
        }

        let redirect = self
            .social_service
            .oauth_info(&self.provider)
            .filter(|info| info.enabled)
            .and_then(|info| {
                signout_redirect_url(&self.settings, &info)
                    .map(|url| Redirect::new(logout_url(url, token.as_ref())))
            });

        if redirect.is_none() {
            debug!("No logout redirect for provider: {}", self.provider);
        }

        LogoutResult {
            redirect,
            invalidation,
        }
    }
}

#[async_trait]
impl AuthnClient for OAuthClient {
    type Error = OAuthError;

    fn name(&self) -> &str {
        &self.name
    }

    async fn authenticate(&self, request: &AuthnRequest) -> OAuthResult<Identity> {
        OAuthClient::authenticate(self, request).await
    }
}

#[async_trait]
impl RedirectClient for OAuthClient {
    async fn redirect_url(&self, request: &AuthnRequest) -> OAuthResult<Redirect> {
        OAuthClient::redirect_url(self, request).await
    }
}

#[async_trait]
impl LogoutClient for OAuthClient {
    async fn logout(&self, identity: &Identity, user_auth: &UserAuth) -> Option<Redirect> {
        OAuthClient::logout(self, identity, user_auth).await.redirect
    }
}
