//! OAuth login configuration.
//!
//! Configuration is layered the usual way: built-in defaults, then an
//! optional TOML file, then environment variables prefixed with `RAS_AUTH`
//! using `__` for nesting (`RAS_AUTH__SETTINGS__SECRET_KEY`,
//! `RAS_AUTH__PROVIDERS__GENERIC__CLIENT_SECRET`).

use crate::error::{OAuthError, OAuthResult};
use config::{Config as ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Process-wide settings shared by every OAuth provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthSettings {
    /// Secret mixed into every state hash.
    pub secret_key: String,

    /// Public root URL of the application, used to build callback URLs.
    pub root_url: String,

    /// Sub path the application is served from, e.g. `/app`.
    pub app_sub_url: String,

    /// Logout redirect used when a provider doesn't set its own.
    pub signout_redirect_url: Option<String>,

    /// Look users up by email when linking an OAuth login to an existing
    /// account. Allows account takeover through email collisions.
    pub oauth_allow_insecure_email_lookup: bool,

    pub auto_assign_org: bool,
    pub auto_assign_org_id: i64,

    /// Max age of the state and PKCE cookies (one login round trip).
    pub cookie_max_age_seconds: u64,

    /// Mark login cookies `Secure`; enable when served over TLS.
    pub cookie_secure: bool,

    /// Timeout for calls to the identity provider.
    pub http_timeout_seconds: u64,
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            root_url: "http://localhost:3000".to_string(),
            app_sub_url: String::new(),
            signout_redirect_url: None,
            oauth_allow_insecure_email_lookup: false,
            auto_assign_org: true,
            auto_assign_org_id: 1,
            cookie_max_age_seconds: 600, // 10 minutes
            cookie_secure: false,
            http_timeout_seconds: 30,
        }
    }
}

impl OAuthSettings {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }

    /// Path the login cookies are scoped to.
    pub fn login_path(&self) -> String {
        format!("{}/login", self.app_sub_url.trim_end_matches('/'))
    }

    /// Callback URL registered with the identity provider.
    pub fn redirect_uri(&self, provider: &str) -> String {
        format!(
            "{}{}/{}",
            self.root_url.trim_end_matches('/'),
            self.login_path(),
            provider
        )
    }
}

/// Configuration of a single OAuth provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthInfo {
    /// Display name of the provider.
    pub name: String,
    pub enabled: bool,
    pub use_pkce: bool,
    /// Restricts Google-style logins to a single hosted domain.
    pub hosted_domain: Option<String>,

    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub api_url: String,
    pub scopes: Vec<String>,

    /// Email domains allowed to log in; empty allows every domain.
    pub allowed_domains: Vec<String>,
    pub allow_sign_up: bool,

    /// Overrides the process-wide logout redirect for this provider.
    pub signout_redirect_url: Option<String>,
    pub allow_insecure_email_lookup: bool,

    // Claim names read from the user info response
    pub email_attribute: String,
    pub login_attribute: String,
    pub role_attribute: String,
    pub groups_attribute: String,
}

impl Default for OAuthInfo {
    fn default() -> Self {
        Self {
            name: String::new(),
            enabled: false,
            use_pkce: false,
            hosted_domain: None,
            client_id: String::new(),
            client_secret: String::new(),
            auth_url: String::new(),
            token_url: String::new(),
            api_url: String::new(),
            scopes: vec![
                "openid".to_string(),
                "email".to_string(),
                "profile".to_string(),
            ],
            allowed_domains: Vec::new(),
            allow_sign_up: true,
            signout_redirect_url: None,
            allow_insecure_email_lookup: false,
            email_attribute: "email".to_string(),
            login_attribute: "preferred_username".to_string(),
            role_attribute: "role".to_string(),
            groups_attribute: "groups".to_string(),
        }
    }
}

impl OAuthInfo {
    pub fn hosted_domain(&self) -> Option<&str> {
        self.hosted_domain.as_deref().filter(|hd| !hd.is_empty())
    }

    pub fn signout_redirect_url(&self) -> Option<&str> {
        self.signout_redirect_url
            .as_deref()
            .filter(|url| !url.is_empty())
    }
}

/// Settings plus every configured provider, keyed by provider name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    pub settings: OAuthSettings,
    pub providers: HashMap<String, OAuthInfo>,
}

impl OAuthConfig {
    pub fn new(settings: OAuthSettings) -> Self {
        Self {
            settings,
            providers: HashMap::new(),
        }
    }

    pub fn add_provider(mut self, provider: impl Into<String>, info: OAuthInfo) -> Self {
        self.providers.insert(provider.into(), info);
        self
    }

    /// Load configuration from an optional TOML file and the environment
    pub fn load(path: Option<&Path>) -> OAuthResult<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = path {
            info!("Loading OAuth configuration from {}", path.display());
            builder = builder.add_source(File::from(path));
        } else {
            debug!("No OAuth configuration file given, using defaults and environment");
        }

        builder = builder.add_source(
            Environment::with_prefix("RAS_AUTH")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: OAuthConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> OAuthResult<()> {
        if self.settings.secret_key.is_empty() {
            warn!("OAuth secret_key is empty - state hashes only depend on client secrets");
        }

        if self.settings.cookie_max_age_seconds == 0 {
            return Err(invalid("cookie_max_age_seconds must be greater than 0"));
        }

        if self.settings.http_timeout_seconds == 0 {
            return Err(invalid("http_timeout_seconds must be greater than 0"));
        }

        for (provider, info) in self.providers.iter().filter(|(_, info)| info.enabled) {
            if info.client_id.is_empty() {
                return Err(invalid(format!("provider '{provider}' has no client_id")));
            }

            for (field, value) in [("auth_url", &info.auth_url), ("token_url", &info.token_url)] {
                url::Url::parse(value).map_err(|e| {
                    invalid(format!("provider '{provider}' has an invalid {field}: {e}"))
                })?;
            }
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> OAuthError {
    OAuthError::Config(config::ConfigError::Message(message.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let settings = OAuthSettings::default();
        assert_eq!(settings.cookie_max_age_seconds, 600);
        assert_eq!(settings.http_timeout(), Duration::from_secs(30));
        assert_eq!(settings.login_path(), "/login");
        assert_eq!(
            settings.redirect_uri("generic"),
            "http://localhost:3000/login/generic"
        );
        assert!(!settings.oauth_allow_insecure_email_lookup);
    }

    #[test]
    fn test_sub_url_paths() {
        let settings = OAuthSettings {
            root_url: "https://example.com/".to_string(),
            app_sub_url: "/app/".to_string(),
            ..Default::default()
        };

        assert_eq!(settings.login_path(), "/app/login");
        assert_eq!(
            settings.redirect_uri("okta"),
            "https://example.com/app/login/okta"
        );
    }

    #[test]
    fn test_empty_optionals_are_ignored() {
        let info = OAuthInfo {
            hosted_domain: Some(String::new()),
            signout_redirect_url: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(info.hosted_domain(), None);
        assert_eq!(info.signout_redirect_url(), None);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[settings]
secret_key = "file-secret"
signout_redirect_url = "http://idp.com/logout"
oauth_allow_insecure_email_lookup = true

[providers.generic]
name = "Generic OAuth"
enabled = true
use_pkce = true
client_id = "client"
client_secret = "secret"
auth_url = "https://idp.example.com/authorize"
token_url = "https://idp.example.com/token"
api_url = "https://idp.example.com/userinfo"
allowed_domains = ["example.com"]
"#
        )
        .unwrap();

        let config = OAuthConfig::load(Some(file.path())).unwrap();

        assert_eq!(config.settings.secret_key, "file-secret");
        assert_eq!(
            config.settings.signout_redirect_url.as_deref(),
            Some("http://idp.com/logout")
        );
        assert!(config.settings.oauth_allow_insecure_email_lookup);
        assert_eq!(config.settings.cookie_max_age_seconds, 600);

        let generic = config.providers.get("generic").unwrap();
        assert!(generic.enabled);
        assert!(generic.use_pkce);
        assert_eq!(generic.allowed_domains, vec!["example.com".to_string()]);
        // defaults fill in what the file leaves out
        assert!(generic.allow_sign_up);
        assert_eq!(generic.role_attribute, "role");
    }

    #[test]
    fn test_validate_rejects_enabled_provider_without_urls() {
        let config = OAuthConfig::default().add_provider(
            "broken",
            OAuthInfo {
                enabled: true,
                client_id: "client".to_string(),
                ..Default::default()
            },
        );

        assert!(matches!(config.validate(), Err(OAuthError::Config(_))));

        // disabled providers are not validated
        let config = OAuthConfig::default().add_provider("off", OAuthInfo::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_timeouts() {
        let config = OAuthConfig::new(OAuthSettings {
            http_timeout_seconds: 0,
            ..Default::default()
        });
        assert!(config.validate().is_err());
    }
}
