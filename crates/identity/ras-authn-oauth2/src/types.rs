//! OAuth2 protocol types.

use chrono::{TimeDelta, Utc};
use ras_authn_core::OAuthToken;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// OAuth2 token response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    pub expires_in: Option<i64>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    pub id_token: Option<String>,
    #[serde(flatten)]
    pub additional_fields: Map<String, Value>,
}

impl From<TokenResponse> for OAuthToken {
    fn from(response: TokenResponse) -> Self {
        let mut extra = response.additional_fields;
        if let Some(id_token) = response.id_token {
            extra.insert("id_token".to_string(), Value::String(id_token));
        }
        if let Some(scope) = response.scope {
            extra.insert("scope".to_string(), Value::String(scope));
        }
        if let Some(expires_in) = response.expires_in {
            extra.insert("expires_in".to_string(), Value::from(expires_in));
        }

        OAuthToken {
            access_token: response.access_token,
            token_type: response.token_type.unwrap_or_default(),
            refresh_token: response.refresh_token,
            // lifetimes too large to represent are treated as no expiry
            expiry: response
                .expires_in
                .filter(|secs| *secs > 0)
                .and_then(TimeDelta::try_seconds)
                .and_then(|lifetime| Utc::now().checked_add_signed(lifetime)),
            extra,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_response_to_token() {
        let json = r#"{
            "access_token": "access",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "refresh",
            "scope": "openid email",
            "id_token": "some.id.token",
            "ext_expires_in": 3600
        }"#;

        let response: TokenResponse = serde_json::from_str(json).unwrap();
        let token = OAuthToken::from(response);

        assert_eq!(token.access_token, "access");
        assert_eq!(token.token_type, "bearer");
        assert_eq!(token.refresh_token.as_deref(), Some("refresh"));
        assert_eq!(token.id_token(), Some("some.id.token"));
        assert_eq!(token.extra("scope").unwrap(), "openid email");
        assert_eq!(token.extra("ext_expires_in").unwrap(), 3600);
        assert!(token.valid());
    }

    #[test]
    fn test_huge_expires_in_means_no_expiry() {
        for expires_in in ["9223372036854775807", "1000000000000000"] {
            let json = format!(r#"{{"access_token": "access", "expires_in": {expires_in}}}"#);
            let response: TokenResponse = serde_json::from_str(&json).unwrap();
            let token = OAuthToken::from(response);

            assert_eq!(token.expiry, None);
            assert!(token.valid());
            assert!(token.extra("expires_in").is_some());
        }
    }

    #[test]
    fn test_minimal_token_response() {
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token": "access"}"#).unwrap();
        let token = OAuthToken::from(response);

        assert_eq!(token.token_type, "");
        assert_eq!(token.expiry, None);
        assert!(token.extra.is_empty());
    }
}
