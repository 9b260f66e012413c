use anyhow::{Context, Result};
use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, Uri, header::SET_COOKIE},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use cookie::{Cookie, SameSite};
use ras_authn_oauth2::{
    AuthnRequest, Identity, InMemoryTokenService, OAUTH_CODE_QUERY_NAME, OAUTH_ERROR_QUERY_NAME,
    OAuthClient, OAuthConfig, OAuthError, StaticSocialService, UserAuth, generate_state,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const SESSION_COOKIE_NAME: &str = "demo_session";

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    clients: Arc<HashMap<String, OAuthClient>>,
    tokens: InMemoryTokenService,
    sessions: Arc<RwLock<HashMap<String, Identity>>>,
}

impl AppState {
    async fn session(&self, request: &AuthnRequest) -> Option<Identity> {
        let session_id = request.cookie(SESSION_COOKIE_NAME)?;
        self.sessions.read().await.get(&session_id).cloned()
    }
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn with_cookies(mut response: Response, cookies: Vec<HeaderValue>) -> Response {
    for cookie in cookies {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    response
}

/// `Set-Cookie` value for the demo session. `None` expires it.
fn session_cookie(session_id: Option<&str>) -> Result<HeaderValue> {
    let mut builder = Cookie::build((SESSION_COOKIE_NAME, session_id.unwrap_or_default()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);
    if session_id.is_none() {
        builder = builder.max_age(cookie::time::Duration::ZERO);
    }

    HeaderValue::from_str(&builder.build().to_string()).context("Invalid session cookie")
}

fn login_error(err: &OAuthError) -> Response {
    warn!("Login failed: {}", err);
    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Login failed</title></head>
<body>
    <h1>Login failed</h1>
    <p><code>{}</code></p>
    <a href="/">Try again</a>
</body>
</html>"#,
        err.message_id()
    );
    (StatusCode::UNAUTHORIZED, Html(html)).into_response()
}

/// Handler for the root page: the signed in user, or a login link per provider
async fn index_handler(State(state): State<AppState>, headers: HeaderMap) -> Html<String> {
    let request = AuthnRequest::new(headers, Uri::default());

    let body = match state.session(&request).await {
        Some(identity) => format!(
            r#"<p>Signed in as <strong>{}</strong> ({}) via {}</p>
    <a href="/logout/{}">Log out</a>"#,
            escape_html(&identity.login),
            escape_html(&identity.email),
            escape_html(&identity.authenticated_by),
            escape_html(identity.authenticated_by.trim_start_matches("oauth_")),
        ),
        None => {
            let mut providers: Vec<&String> = state.clients.keys().collect();
            providers.sort();
            let links: String = providers
                .into_iter()
                .map(|p| {
                    let p = escape_html(p);
                    format!(r#"<li><a href="/login/{p}">Sign in with {p}</a></li>"#)
                })
                .collect();
            format!("<ul>{links}</ul>")
        }
    };

    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head><title>OAuth login demo</title></head>
<body>
    <h1>OAuth login demo</h1>
    {body}
</body>
</html>"#
    ))
}

/// Starts the login, or completes it when the provider redirects back
async fn login_handler(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    let Some(client) = state.clients.get(&provider) else {
        return (StatusCode::NOT_FOUND, format!("Unknown provider: {provider}")).into_response();
    };

    let request = AuthnRequest::new(headers, uri);
    let is_callback = request.query_param(OAUTH_CODE_QUERY_NAME).is_some()
        || request.query_param(OAUTH_ERROR_QUERY_NAME).is_some();

    if is_callback {
        complete_login(&state, client, &request).await
    } else {
        start_login(client, &request).await
    }
}

async fn start_login(client: &OAuthClient, request: &AuthnRequest) -> Response {
    let redirect = match client.redirect_url(request).await {
        Ok(redirect) => redirect,
        Err(e) => return login_error(&e),
    };

    match client.login_cookies().set_cookie_headers(&redirect) {
        Ok(cookies) => with_cookies(Redirect::to(&redirect.url).into_response(), cookies),
        Err(e) => {
            error!("Failed to persist login state: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn complete_login(
    state: &AppState,
    client: &OAuthClient,
    request: &AuthnRequest,
) -> Response {
    // the login cookies are single use, whatever the outcome
    let mut cookies = match client.login_cookies().clear_cookie_headers() {
        Ok(cookies) => cookies,
        Err(e) => {
            error!("Failed to expire login cookies: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let identity = match client.authenticate(request).await {
        Ok(identity) => identity,
        Err(e) => return with_cookies(login_error(&e), cookies),
    };

    let session_id = match generate_state() {
        Ok(id) => id,
        Err(e) => {
            error!("Failed to create session: {}", e);
            return with_cookies(StatusCode::INTERNAL_SERVER_ERROR.into_response(), cookies);
        }
    };

    info!(
        "User {} signed in via {}",
        identity.login,
        client.provider()
    );
    state.tokens.store_identity_token(&identity).await;
    state
        .sessions
        .write()
        .await
        .insert(session_id.clone(), identity);

    match session_cookie(Some(&session_id)) {
        Ok(session_cookie) => cookies.push(session_cookie),
        Err(e) => error!("{:#}", e),
    }

    with_cookies(Redirect::to("/").into_response(), cookies)
}

/// Ends the local session and follows the provider's logout redirect
async fn logout_handler(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
) -> Response {
    let request = AuthnRequest::new(headers, Uri::default());
    let clear_session: Vec<HeaderValue> = match session_cookie(None) {
        Ok(cookie) => vec![cookie],
        Err(e) => {
            error!("{:#}", e);
            Vec::new()
        }
    };

    let identity = match request.cookie(SESSION_COOKIE_NAME) {
        Some(session_id) => state.sessions.write().await.remove(&session_id),
        None => None,
    };

    let (Some(identity), Some(client)) = (identity, state.clients.get(&provider)) else {
        return with_cookies(Redirect::to("/").into_response(), clear_session);
    };

    let user_auth = UserAuth {
        user_id: 0,
        auth_module: identity.authenticated_by.clone(),
        auth_id: identity.auth_id.clone(),
    };
    let result = client.logout(&identity, &user_auth).await;
    let target = result
        .redirect
        .map(|redirect| redirect.url)
        .unwrap_or_else(|| "/".to_string());

    info!("User {} signed out of {}", identity.login, provider);
    with_cookies(Redirect::to(&target).into_response(), clear_session)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "oauth_login_server=info,ras_authn_oauth2=debug,tower_http=info".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var("RAS_AUTH_CONFIG").ok().map(PathBuf::from);
    let config = OAuthConfig::load(config_path.as_deref())
        .context("Failed to load OAuth configuration")?;

    let settings = Arc::new(config.settings.clone());
    let social_service = Arc::new(
        StaticSocialService::from_config(&config).context("Failed to build OAuth connectors")?,
    );
    let tokens = InMemoryTokenService::new();

    let clients: HashMap<String, OAuthClient> = config
        .providers
        .iter()
        .filter(|(_, info)| info.enabled)
        .map(|(provider, _)| {
            let client = OAuthClient::new(
                provider.clone(),
                settings.clone(),
                social_service.clone(),
                Arc::new(tokens.clone()),
            );
            (provider.clone(), client)
        })
        .collect();

    if clients.is_empty() {
        warn!("No enabled OAuth providers configured");
    }
    for provider in clients.keys() {
        info!(
            "OAuth provider {} enabled, callback URL: {}",
            provider,
            settings.redirect_uri(provider)
        );
    }

    let app_state = AppState {
        clients: Arc::new(clients),
        tokens,
        sessions: Arc::new(RwLock::new(HashMap::new())),
    };

    let app = Router::new()
        .route("/", get(index_handler))
        .route("/login/{provider}", get(login_handler))
        .route("/logout/{provider}", get(logout_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let host = std::env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = std::env::var("SERVER_PORT").unwrap_or_else(|_| "3000".to_string());
    let bind_addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;

    info!("Server running on http://{}", bind_addr);
    warn!(
        "This is an example application. Do not use in production without proper security review."
    );

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
