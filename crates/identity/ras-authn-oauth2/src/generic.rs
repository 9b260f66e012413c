//! Generic OAuth2/OIDC connector.
//!
//! Talks the plain authorization code protocol: builds the authorization URL,
//! exchanges the code at the token endpoint and reads claims from the ID
//! token and the user info endpoint. Claim names are configurable through
//! [`OAuthInfo`].

use crate::connector::{
    AuthCodeOption, BasicUserInfo, ConnectorError, ExchangeOption, SocialConnector,
    StaticSocialService,
};
use crate::settings::{OAuthConfig, OAuthInfo};
use crate::types::TokenResponse;
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use ras_authn_core::OAuthToken;
use reqwest::Client;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

#[derive(Clone)]
pub struct GenericConnector {
    info: OAuthInfo,
    auth_url: Url,
    redirect_uri: String,
    http_client: Client,
}

impl GenericConnector {
    pub fn new(
        info: OAuthInfo,
        redirect_uri: impl Into<String>,
        http_timeout: Duration,
    ) -> Result<Self, ConnectorError> {
        let auth_url = Url::parse(&info.auth_url)
            .map_err(|e| ConnectorError::Config(format!("invalid auth_url: {e}")))?;
        let http_client = Client::builder().timeout(http_timeout).build()?;

        Ok(Self {
            info,
            auth_url,
            redirect_uri: redirect_uri.into(),
            http_client,
        })
    }

    /// Claims from the ID token payload followed by the user info endpoint,
    /// the latter taking precedence.
    async fn claims(&self, client: &Client, token: &OAuthToken) -> Result<Map<String, Value>, ConnectorError> {
        let mut claims = token
            .id_token()
            .and_then(|id_token| match decode_id_token_claims(id_token) {
                Ok(claims) => Some(claims),
                Err(e) => {
                    warn!("Ignoring undecodable ID token: {}", e);
                    None
                }
            })
            .unwrap_or_default();

        if !self.info.api_url.is_empty() {
            let response = client
                .get(&self.info.api_url)
                .bearer_auth(&token.access_token)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                error!("User info request failed: {}", body);
                return Err(ConnectorError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            let user_info: Map<String, Value> = response
                .json()
                .await
                .map_err(|e| ConnectorError::InvalidUserInfoResponse(e.to_string()))?;
            claims.extend(user_info);
        }

        if claims.is_empty() {
            return Err(ConnectorError::InvalidUserInfoResponse(
                "neither the ID token nor the user info endpoint returned claims".to_string(),
            ));
        }

        Ok(claims)
    }

    fn build_user_info(&self, claims: &Map<String, Value>) -> BasicUserInfo {
        let id = ["sub", "id"]
            .iter()
            .find_map(|key| claim_string(claims, key))
            .unwrap_or_default();
        let email = claim_string(claims, &self.info.email_attribute).unwrap_or_default();
        let login = claim_string(claims, &self.info.login_attribute).unwrap_or_else(|| email.clone());

        BasicUserInfo {
            id,
            name: claim_string(claims, "name").unwrap_or_default(),
            email,
            login,
            role: claim_string(claims, &self.info.role_attribute).unwrap_or_default(),
            is_server_admin: None,
            groups: claim_strings(claims, &self.info.groups_attribute),
        }
    }
}

#[async_trait]
impl SocialConnector for GenericConnector {
    fn auth_code_url(&self, state: &str, options: &[AuthCodeOption]) -> String {
        let mut url = self.auth_url.clone();
        {
            let mut params = url.query_pairs_mut();
            params.append_pair("response_type", "code");
            params.append_pair("client_id", &self.info.client_id);
            params.append_pair("redirect_uri", &self.redirect_uri);
            if !self.info.scopes.is_empty() {
                params.append_pair("scope", &self.info.scopes.join(" "));
            }
            params.append_pair("state", state);

            for (key, value) in options.iter().flat_map(AuthCodeOption::params) {
                params.append_pair(key, value);
            }
        }

        url.to_string()
    }

    async fn exchange(
        &self,
        code: &str,
        options: &[ExchangeOption],
    ) -> Result<OAuthToken, ConnectorError> {
        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.info.client_id.as_str()),
            ("client_secret", self.info.client_secret.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];
        params.extend(options.iter().map(ExchangeOption::param));

        let response = self
            .http_client
            .post(&self.info.token_url)
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Token exchange failed: {}", body);
            return Err(ConnectorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| ConnectorError::InvalidTokenResponse(e.to_string()))?;

        debug!("Exchanged authorization code for {}", self.info.name);
        Ok(token_response.into())
    }

    async fn user_info(
        &self,
        client: &Client,
        token: &OAuthToken,
    ) -> Result<BasicUserInfo, ConnectorError> {
        let claims = self.claims(client, token).await?;
        let user_info = self.build_user_info(&claims);

        if user_info.id.is_empty() {
            return Err(ConnectorError::InvalidUserInfoResponse(
                "missing subject claim".to_string(),
            ));
        }

        debug!("Retrieved user info for subject: {}", user_info.id);
        Ok(user_info)
    }

    fn is_email_allowed(&self, email: &str) -> bool {
        if self.info.allowed_domains.is_empty() {
            return true;
        }

        let Some((_, domain)) = email.rsplit_once('@') else {
            return false;
        };

        self.info
            .allowed_domains
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(domain))
    }

    fn is_signup_allowed(&self) -> bool {
        self.info.allow_sign_up
    }

    fn client(&self, _token: &OAuthToken) -> Client {
        self.http_client.clone()
    }
}

impl StaticSocialService {
    /// One [`GenericConnector`] per enabled provider. Disabled providers are
    /// registered with their configuration only, so clients report them as
    /// disabled rather than unknown.
    pub fn from_config(config: &OAuthConfig) -> Result<Self, ConnectorError> {
        config
            .providers
            .iter()
            .try_fold(Self::new(), |service, (provider, info)| {
                if !info.enabled {
                    debug!("OAuth provider {} is disabled", provider);
                    return Ok(service.with_info(provider.clone(), info.clone()));
                }

                let connector = GenericConnector::new(
                    info.clone(),
                    config.settings.redirect_uri(provider),
                    config.settings.http_timeout(),
                )?;
                Ok(service.with_provider(provider.clone(), info.clone(), Arc::new(connector)))
            })
    }
}

/// Payload of a JWT, without signature verification. The token came straight
/// from the token endpoint over the back channel.
fn decode_id_token_claims(id_token: &str) -> Result<Map<String, Value>, ConnectorError> {
    let payload = id_token
        .split('.')
        .nth(1)
        .ok_or_else(|| ConnectorError::InvalidTokenResponse("malformed ID token".to_string()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| ConnectorError::InvalidTokenResponse(e.to_string()))?;

    serde_json::from_slice(&bytes).map_err(|e| ConnectorError::InvalidTokenResponse(e.to_string()))
}

fn claim_string(claims: &Map<String, Value>, key: &str) -> Option<String> {
    match claims.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn claim_strings(claims: &Map<String, Value>, key: &str) -> Vec<String> {
    match claims.get(key) {
        Some(Value::Array(values)) => values
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect(),
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}
