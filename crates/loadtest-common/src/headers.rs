//! Request headers and CSRF token plumbing.

use crate::error::LoadResult;
use http::header::{CONNECTION, CONTENT_TYPE, SET_COOKIE};
use http::{HeaderMap, HeaderName, HeaderValue};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::warn;

/// Cookie set by the API on login
pub const TOKEN_COOKIE: &str = "csrftoken";

/// Header carrying the token on authenticated calls
pub const TOKEN_HEADER: &str = "x-csrftoken";

/// Cookie name to value
pub type CookieMap = BTreeMap<String, String>;

/// The parts of an HTTP response the harness looks at
///
/// `headers` and `cookies` return `None` when the response does not expose
/// that collection at all.
pub trait ResponseView: Send + Sync {
    fn status_code(&self) -> u16;

    fn text(&self) -> &str;

    fn headers(&self) -> Option<&HeaderMap>;

    fn cookies(&self) -> Option<&CookieMap>;
}

/// Base JSON headers
pub fn base_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers
}

/// Base headers plus the CSRF token header
///
/// A missing or empty token, or one that cannot be sent as a header value,
/// yields the base headers unchanged.
pub fn headers_with_token(token: Option<&str>) -> HeaderMap {
    let mut headers = base_headers();
    if let Some(value) = token
        .filter(|t| !t.is_empty())
        .and_then(|t| HeaderValue::from_str(t).ok())
    {
        headers.insert(HeaderName::from_static(TOKEN_HEADER), value);
    }
    headers
}

/// Extract the token using the default `csrftoken` cookie name
pub fn extract_token(response: &dyn ResponseView) -> Option<String> {
    static DEFAULT: OnceLock<TokenExtractor> = OnceLock::new();
    DEFAULT.get_or_init(TokenExtractor::default).extract(response)
}

/// Finds a named token in a response's `Set-Cookie` header or cookie jar
#[derive(Debug, Clone)]
pub struct TokenExtractor {
    cookie_name: String,
    pattern: Regex,
}

impl TokenExtractor {
    pub fn new(cookie_name: impl Into<String>) -> LoadResult<Self> {
        let cookie_name = cookie_name.into();
        let pattern = Regex::new(&format!(
            "{}=([a-zA-Z0-9]+);",
            regex::escape(&cookie_name)
        ))?;
        Ok(Self {
            cookie_name,
            pattern,
        })
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Look for the token, header first, then cookies
    ///
    /// Missing collections, non-text header values and absent entries all
    /// come back as `None`.
    pub fn extract(&self, response: &dyn ResponseView) -> Option<String> {
        self.search_set_cookie(response)
            .or_else(|| self.search_cookies(response))
    }

    fn search_set_cookie(&self, response: &dyn ResponseView) -> Option<String> {
        let headers = response.headers()?;

        // Several Set-Cookie lines are searched as one folded value
        let folded = headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect::<Vec<_>>()
            .join(", ");

        self.pattern
            .captures(&folded)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    fn search_cookies(&self, response: &dyn ResponseView) -> Option<String> {
        response
            .cookies()?
            .get(&self.cookie_name)
            .filter(|v| !v.is_empty())
            .cloned()
    }
}

impl Default for TokenExtractor {
    fn default() -> Self {
        Self::new(TOKEN_COOKIE).expect("default token pattern is valid")
    }
}

/// Render a header map as a name to value mapping, skipping non-text values
pub fn header_mapping(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut mapping = BTreeMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            warn!("Skipping non-text value of response header {}", name);
            continue;
        };
        mapping
            .entry(name.as_str().to_string())
            .and_modify(|existing: &mut String| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    mapping
}
