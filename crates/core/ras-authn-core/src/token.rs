//! OAuth token carried on an identity.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Tokens are treated as expired this long before their actual expiry.
const EXPIRY_DELTA_SECONDS: i64 = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    pub token_type: String,
    pub refresh_token: Option<String>,
    pub expiry: Option<DateTime<Utc>>,
    /// Extra fields returned by the token endpoint, e.g. `id_token`.
    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl OAuthToken {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            ..Default::default()
        }
    }

    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(expiry);
        self
    }

    pub fn with_extra(mut self, extra: Map<String, Value>) -> Self {
        self.extra = extra;
        self
    }

    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// The OIDC ID token, when the token endpoint returned one.
    pub fn id_token(&self) -> Option<&str> {
        self.extra("id_token").and_then(Value::as_str)
    }

    pub fn is_expired(&self) -> bool {
        match self.expiry {
            Some(expiry) => expiry - Duration::seconds(EXPIRY_DELTA_SECONDS) < Utc::now(),
            None => false,
        }
    }

    pub fn valid(&self) -> bool {
        !self.access_token.is_empty() && !self.is_expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_token_validity() {
        assert!(!OAuthToken::default().valid());
        assert!(OAuthToken::new("access").valid());

        let fresh = OAuthToken::new("access").with_expiry(Utc::now() + Duration::minutes(10));
        assert!(fresh.valid());

        let expired = OAuthToken::new("access").with_expiry(Utc::now() - Duration::minutes(1));
        assert!(expired.is_expired());
        assert!(!expired.valid());

        // inside the skew margin
        let expiring = OAuthToken::new("access").with_expiry(Utc::now() + Duration::seconds(5));
        assert!(!expiring.valid());
    }

    #[test]
    fn test_id_token_extra() {
        let mut extra = Map::new();
        extra.insert("id_token".to_string(), json!("some.id.token"));
        extra.insert("expires_in".to_string(), json!(3600));

        let token = OAuthToken::new("access").with_extra(extra);
        assert_eq!(token.id_token(), Some("some.id.token"));
        assert_eq!(token.extra("expires_in"), Some(&json!(3600)));

        let mut extra = Map::new();
        extra.insert("id_token".to_string(), json!(42));
        let token = OAuthToken::new("access").with_extra(extra);
        assert_eq!(token.id_token(), None);
    }
}
