//! Read-only view over an inbound HTTP request.

use crate::AuthnResult;
use cookie::Cookie;
use http::header::COOKIE;
use http::{HeaderMap, HeaderValue, Uri};

#[derive(Debug, Clone, Default)]
pub struct AuthnRequest {
    headers: HeaderMap,
    uri: Uri,
}

impl AuthnRequest {
    pub fn new(headers: HeaderMap, uri: Uri) -> Self {
        Self { headers, uri }
    }

    pub fn from_parts(parts: &http::request::Parts) -> Self {
        Self::new(parts.headers.clone(), parts.uri.clone())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Value of the first cookie named `name`. An empty value is returned
    /// as `Some("")`, an absent cookie as `None`.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(Cookie::split_parse)
            .filter_map(Result::ok)
            .find(|cookie| cookie.name() == name)
            .map(|cookie| cookie.value().to_string())
    }

    /// Decoded value of the first query parameter named `name`.
    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.uri.query()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    /// Adds a cookie to the request, as a browser would send it.
    pub fn add_cookie(&mut self, name: &str, value: &str) -> AuthnResult<()> {
        let header = HeaderValue::from_str(&Cookie::new(name, value).to_string())?;
        self.headers.append(COOKIE, header);
        Ok(())
    }
}
