//! State and PKCE cookies for the login round trip.
//!
//! The state cookie never holds the state itself, only an HMAC of it keyed by
//! the process secret and the provider's client secret. The callback hashes
//! the `state` query parameter the same way and compares the two.

use crate::settings::OAuthSettings;
use cookie::{Cookie, SameSite};
use hmac::{Hmac, Mac};
use http::HeaderValue;
use ras_authn_core::{AuthnResult, KEY_OAUTH_PKCE, KEY_OAUTH_STATE, Redirect};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

pub const OAUTH_STATE_COOKIE_NAME: &str = "oauth_state";
pub const OAUTH_PKCE_COOKIE_NAME: &str = "oauth_code_verifier";

pub const OAUTH_STATE_QUERY_NAME: &str = "state";
pub const OAUTH_CODE_QUERY_NAME: &str = "code";
pub const OAUTH_ERROR_QUERY_NAME: &str = "error";
pub const OAUTH_ERROR_DESCRIPTION_QUERY_NAME: &str = "error_description";

/// Hex encoded HMAC-SHA256 of `state`, keyed by both secrets.
pub fn hash_state(state: &str, secret_key: &str, client_secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret_key.as_bytes()).expect("HMAC can take key of any size");
    mac.update(state.as_bytes());
    mac.update(client_secret.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Check the state returned by the identity provider against the stored
/// cookie value (constant-time).
pub fn verify_state(
    cookie_value: &str,
    query_state: &str,
    secret_key: &str,
    client_secret: &str,
) -> bool {
    if cookie_value.is_empty() {
        return false;
    }

    let expected = hash_state(query_state, secret_key, client_secret);
    cookie_value.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Writes and clears the login cookies.
///
/// Both cookies are `HttpOnly`, `SameSite=Lax` (they must survive the top
/// level redirect back from the identity provider), scoped to the login path
/// and live for a single round trip.
#[derive(Debug, Clone)]
pub struct LoginCookies {
    path: String,
    max_age_seconds: i64,
    secure: bool,
}

impl LoginCookies {
    pub fn new(path: impl Into<String>, max_age_seconds: u64, secure: bool) -> Self {
        Self {
            path: path.into(),
            max_age_seconds: i64::try_from(max_age_seconds).unwrap_or(i64::MAX),
            secure,
        }
    }

    pub fn from_settings(settings: &OAuthSettings) -> Self {
        Self::new(
            settings.login_path(),
            settings.cookie_max_age_seconds,
            settings.cookie_secure,
        )
    }

    fn build(&self, name: &'static str, value: String, max_age_seconds: i64) -> Cookie<'static> {
        Cookie::build((name, value))
            .path(self.path.clone())
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .max_age(cookie::time::Duration::seconds(max_age_seconds))
            .build()
    }

    /// `Set-Cookie` values persisting what a login redirect asked for.
    pub fn set_cookie_headers(&self, redirect: &Redirect) -> AuthnResult<Vec<HeaderValue>> {
        [
            (OAUTH_STATE_COOKIE_NAME, KEY_OAUTH_STATE),
            (OAUTH_PKCE_COOKIE_NAME, KEY_OAUTH_PKCE),
        ]
        .into_iter()
        .filter_map(|(name, key)| {
            let value = redirect.extra.get(key).filter(|v| !v.is_empty())?;
            Some(self.header(self.build(name, value.clone(), self.max_age_seconds)))
        })
        .collect()
    }

    /// `Set-Cookie` values expiring both login cookies once the callback
    /// consumed them.
    pub fn clear_cookie_headers(&self) -> AuthnResult<Vec<HeaderValue>> {
        [OAUTH_STATE_COOKIE_NAME, OAUTH_PKCE_COOKIE_NAME]
            .into_iter()
            .map(|name| self.header(self.build(name, String::new(), 0)))
            .collect()
    }

    fn header(&self, cookie: Cookie<'static>) -> AuthnResult<HeaderValue> {
        HeaderValue::from_str(&cookie.to_string()).map_err(|e| {
            warn!("Cannot encode login cookie {} as a header: {}", cookie.name(), e);
            e.into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ras_authn_core::AuthnError;

    #[test]
    fn test_hash_state_is_deterministic() {
        let a = hash_state("some-state", "secret", "client-secret");
        let b = hash_state("some-state", "secret", "client-secret");

        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, "some-state");
    }

    #[test]
    fn test_hash_state_depends_on_both_secrets() {
        let base = hash_state("some-state", "secret", "client-secret");

        assert_ne!(base, hash_state("other-state", "secret", "client-secret"));
        assert_ne!(base, hash_state("some-state", "other-secret", "client-secret"));
        assert_ne!(base, hash_state("some-state", "secret", "other-client-secret"));
    }

    #[test]
    fn test_verify_state() {
        let cookie = hash_state("some-state", "secret", "client-secret");

        assert!(verify_state(&cookie, "some-state", "secret", "client-secret"));
        assert!(!verify_state(&cookie, "some-other-state", "secret", "client-secret"));
        assert!(!verify_state(&cookie, "some-state", "secret", "rotated"));
        assert!(!verify_state("", "some-state", "secret", "client-secret"));
        // the raw state is not a valid cookie value
        assert!(!verify_state("some-state", "some-state", "secret", "client-secret"));
    }

    #[test]
    fn test_set_cookie_headers() {
        let cookies = LoginCookies::new("/login", 600, true);
        let redirect = Redirect::new("https://idp.example.com/authorize")
            .with_extra(KEY_OAUTH_STATE, "hashed-state")
            .with_extra(KEY_OAUTH_PKCE, "verifier");

        let headers = cookies.set_cookie_headers(&redirect).unwrap();
        assert_eq!(headers.len(), 2);

        let state = headers[0].to_str().unwrap();
        assert!(state.starts_with("oauth_state=hashed-state"));
        assert!(state.contains("HttpOnly"));
        assert!(state.contains("Secure"));
        assert!(state.contains("SameSite=Lax"));
        assert!(state.contains("Path=/login"));
        assert!(state.contains("Max-Age=600"));

        let pkce = headers[1].to_str().unwrap();
        assert!(pkce.starts_with("oauth_code_verifier=verifier"));
    }

    #[test]
    fn test_set_cookie_headers_without_pkce() {
        let cookies = LoginCookies::new("/login", 600, false);
        let redirect = Redirect::new("https://idp.example.com/authorize")
            .with_extra(KEY_OAUTH_STATE, "hashed-state");

        let headers = cookies.set_cookie_headers(&redirect).unwrap();
        assert_eq!(headers.len(), 1);
        assert!(!headers[0].to_str().unwrap().contains("Secure"));
    }

    #[test]
    fn test_clear_cookie_headers() {
        let settings = OAuthSettings {
            app_sub_url: "/sub".to_string(),
            ..Default::default()
        };
        let headers = LoginCookies::from_settings(&settings)
            .clear_cookie_headers()
            .unwrap();

        assert_eq!(headers.len(), 2);
        for header in &headers {
            let value = header.to_str().unwrap();
            assert!(value.contains("Max-Age=0"));
            assert!(value.contains("Path=/sub/login"));
        }
        assert!(headers[0].to_str().unwrap().starts_with("oauth_state="));
        assert!(headers[1].to_str().unwrap().starts_with("oauth_code_verifier="));
    }

    #[test]
    fn test_unencodable_cookie_path_is_an_error() {
        let cookies = LoginCookies::new("/log\nin", 600, false);
        let redirect = Redirect::new("https://idp.example.com/authorize")
            .with_extra(KEY_OAUTH_STATE, "hashed-state");

        assert!(matches!(
            cookies.set_cookie_headers(&redirect),
            Err(AuthnError::InvalidHeader(_))
        ));
        assert!(cookies.clear_cookie_headers().is_err());
    }
}
