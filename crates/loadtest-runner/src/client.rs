use http::{HeaderMap, Method};
use loadtest_common::{CookieMap, LoadError, LoadResult, ResponseView};
use std::time::Duration;
use tracing::trace;

/// HTTP client for one simulated user
///
/// Each user gets its own cookie store, so session cookies set at login are
/// sent back on later calls.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> LoadResult<Self> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .build()
            .map_err(|e| LoadError::Http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for an API path
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and read the whole response
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        headers: HeaderMap,
        body: Option<&serde_json::Value>,
    ) -> LoadResult<CapturedResponse> {
        let url = self.url(path);
        trace!("{} {}", method, url);

        let mut request = self.client.request(method, &url).headers(headers);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| LoadError::Http(format!("Request to {} failed: {}", url, e)))?;

        CapturedResponse::capture(response).await
    }
}

/// A fully read HTTP response
#[derive(Debug, Clone, Default)]
pub struct CapturedResponse {
    status: u16,
    text: String,
    headers: Option<HeaderMap>,
    cookies: Option<CookieMap>,
}

impl CapturedResponse {
    /// Read status, headers, cookies and body from a `reqwest` response
    pub async fn capture(response: reqwest::Response) -> LoadResult<Self> {
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let cookies = response
            .cookies()
            .map(|c| (c.name().to_string(), c.value().to_string()))
            .collect::<CookieMap>();

        let text = response
            .text()
            .await
            .map_err(|e| LoadError::Http(format!("Failed to read response body: {}", e)))?;

        Ok(Self {
            status,
            text,
            headers: Some(headers),
            cookies: Some(cookies),
        })
    }

    /// Stand-in for a request that never produced a response
    ///
    /// Status 0, the error as body, no headers or cookies.
    pub fn transport_failure(error: &LoadError) -> Self {
        Self {
            status: 0,
            text: error.to_string(),
            headers: None,
            cookies: None,
        }
    }

    pub fn new(status: u16, text: impl Into<String>) -> Self {
        Self {
            status,
            text: text.into(),
            headers: Some(HeaderMap::new()),
            cookies: Some(CookieMap::new()),
        }
    }

    /// Parse the body as JSON
    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_str(&self.text).ok()
    }
}

impl ResponseView for CapturedResponse {
    fn status_code(&self) -> u16 {
        self.status
    }

    fn text(&self) -> &str {
        &self.text
    }

    fn headers(&self) -> Option<&HeaderMap> {
        self.headers.as_ref()
    }

    fn cookies(&self) -> Option<&CookieMap> {
        self.cookies.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_base_and_path() {
        let client = ApiClient::new("http://localhost:8000/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000");
        assert_eq!(client.url("/api/tests"), "http://localhost:8000/api/tests");
    }

    #[test]
    fn test_transport_failure_has_no_collections() {
        let error = LoadError::Http("connection refused".to_string());
        let response = CapturedResponse::transport_failure(&error);
        assert_eq!(response.status_code(), 0);
        assert!(response.text().contains("connection refused"));
        assert!(response.headers().is_none());
        assert!(response.cookies().is_none());
    }

    #[test]
    fn test_json_body() {
        let response = CapturedResponse::new(201, r#"{"test_id": 42}"#);
        assert_eq!(response.json().unwrap()["test_id"], 42);
        assert!(CapturedResponse::new(200, "not json").json().is_none());
    }
}
