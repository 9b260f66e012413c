//! Post logout redirect URLs, including OIDC RP-initiated logout.

use crate::settings::{OAuthInfo, OAuthSettings};
use ras_authn_core::OAuthToken;
use url::form_urlencoded::{byte_serialize, parse};

const POST_LOGOUT_REDIRECT_URI_PARAM: &str = "post_logout_redirect_uri";
const ID_TOKEN_HINT_PARAM: &str = "id_token_hint";

/// The provider's own logout URL, falling back to the process-wide one.
pub fn signout_redirect_url<'a>(settings: &'a OAuthSettings, info: &'a OAuthInfo) -> Option<&'a str> {
    info.signout_redirect_url().or_else(|| {
        settings
            .signout_redirect_url
            .as_deref()
            .filter(|url| !url.is_empty())
    })
}

/// Splits a URL into the part before the query, the raw query and the raw
/// fragment (including its `#`). Relative URLs are fine.
fn split_url(url: &str) -> (&str, Option<&str>, &str) {
    let (rest, fragment) = match url.find('#') {
        Some(idx) => url.split_at(idx),
        None => (url, ""),
    };

    match rest.split_once('?') {
        Some((base, query)) => (base, Some(query), fragment),
        None => (rest, None, fragment),
    }
}

/// Whether `redirect_url` points at an OIDC end session endpoint, i.e. asks
/// the provider to send the browser back afterwards.
pub fn is_oidc_logout(redirect_url: &str) -> bool {
    let (_, query, _) = split_url(redirect_url);
    query.is_some_and(|query| {
        parse(query.as_bytes()).any(|(key, _)| key == POST_LOGOUT_REDIRECT_URI_PARAM)
    })
}

/// Append `id_token_hint` to the query. Everything else in the URL is kept
/// byte for byte.
pub fn with_id_token_hint(redirect_url: &str, id_token: &str) -> String {
    let (base, query, fragment) = split_url(redirect_url);
    let hint: String = byte_serialize(id_token.as_bytes()).collect();

    match query.filter(|q| !q.is_empty()) {
        Some(query) => format!("{base}?{query}&{ID_TOKEN_HINT_PARAM}={hint}{fragment}"),
        None => format!("{base}?{ID_TOKEN_HINT_PARAM}={hint}{fragment}"),
    }
}

/// Final logout URL for a user holding `token`.
pub fn logout_url(redirect_url: &str, token: Option<&OAuthToken>) -> String {
    if !is_oidc_logout(redirect_url) {
        return redirect_url.to_string();
    }

    match token.filter(|t| t.valid()).and_then(OAuthToken::id_token) {
        Some(id_token) => with_id_token_hint(redirect_url, id_token),
        None => redirect_url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::{Map, Value};

    const OIDC_LOGOUT: &str =
        "http://idp.com/logout?post_logout_redirect_uri=http%3A%3A%2F%2Flocalhost%3A3000%2Flogin";

    fn token_with_id_token(id_token: &str) -> OAuthToken {
        let mut extra = Map::new();
        extra.insert("id_token".to_string(), Value::String(id_token.to_string()));
        OAuthToken::new("access").with_extra(extra)
    }

    #[test]
    fn test_signout_redirect_url_precedence() {
        let global = OAuthSettings {
            signout_redirect_url: Some("http://idp.com/logout".to_string()),
            ..Default::default()
        };
        let client = OAuthInfo {
            signout_redirect_url: Some("http://some-idp.com/logout".to_string()),
            ..Default::default()
        };

        assert_eq!(
            signout_redirect_url(&global, &client),
            Some("http://some-idp.com/logout")
        );
        assert_eq!(
            signout_redirect_url(&global, &OAuthInfo::default()),
            Some("http://idp.com/logout")
        );
        assert_eq!(
            signout_redirect_url(&OAuthSettings::default(), &OAuthInfo::default()),
            None
        );

        let empty_global = OAuthSettings {
            signout_redirect_url: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(signout_redirect_url(&empty_global, &OAuthInfo::default()), None);
    }

    #[test]
    fn test_is_oidc_logout() {
        assert!(is_oidc_logout(OIDC_LOGOUT));
        assert!(!is_oidc_logout("http://idp.com/logout"));
        assert!(!is_oidc_logout("http://idp.com/logout?redirect=http%3A%2F%2Fexample.com"));
        assert!(!is_oidc_logout("not a url"));
    }

    #[test]
    fn test_with_id_token_hint_keeps_query() {
        let url = with_id_token_hint(OIDC_LOGOUT, "some.id.token");
        assert_eq!(
            url,
            "http://idp.com/logout?post_logout_redirect_uri=http%3A%3A%2F%2Flocalhost%3A3000%2Flogin&id_token_hint=some.id.token"
        );
    }

    #[test]
    fn test_with_id_token_hint_encodes_token() {
        let url = with_id_token_hint("http://idp.com/logout", "a b+c");
        assert_eq!(url, "http://idp.com/logout?id_token_hint=a+b%2Bc");
    }

    #[test]
    fn test_relative_and_bare_urls_are_kept_as_configured() {
        let relative = "/oidc/logout?post_logout_redirect_uri=%2Flogin";
        assert!(is_oidc_logout(relative));
        assert_eq!(
            with_id_token_hint(relative, "some.id.token"),
            "/oidc/logout?post_logout_redirect_uri=%2Flogin&id_token_hint=some.id.token"
        );

        // no path normalization on a bare host
        assert_eq!(
            with_id_token_hint("http://idp.com?post_logout_redirect_uri=x", "tok"),
            "http://idp.com?post_logout_redirect_uri=x&id_token_hint=tok"
        );

        // the fragment stays last
        assert_eq!(
            with_id_token_hint("http://idp.com/logout?post_logout_redirect_uri=x#end", "tok"),
            "http://idp.com/logout?post_logout_redirect_uri=x&id_token_hint=tok#end"
        );
        assert!(!is_oidc_logout("http://idp.com/logout#post_logout_redirect_uri=x"));
    }

    #[test]
    fn test_logout_url() {
        let token = token_with_id_token("some.id.token");

        assert!(logout_url(OIDC_LOGOUT, Some(&token)).contains("id_token_hint=some.id.token"));
        assert_eq!(logout_url(OIDC_LOGOUT, None), OIDC_LOGOUT);

        // plain logout URLs never get a hint
        assert_eq!(
            logout_url("http://idp.com/logout", Some(&token)),
            "http://idp.com/logout"
        );

        let expired = token_with_id_token("some.id.token")
            .with_expiry(Utc::now() - Duration::minutes(5));
        assert_eq!(logout_url(OIDC_LOGOUT, Some(&expired)), OIDC_LOGOUT);

        let no_id_token = OAuthToken::new("access");
        assert_eq!(logout_url(OIDC_LOGOUT, Some(&no_id_token)), OIDC_LOGOUT);
    }
}
