//! # HTTP Retrieval Utilities
//!
//! An asynchronous client wrapper around `reqwest`, composed with
//! `reqwest_middleware`. The only middleware installed is [`RequestLogger`],
//! which traces every request with credentials masked. There is deliberately
//! no retry middleware: failed requests go back to the caller as-is.

use std::time::{Duration, Instant};

use http::Extensions;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::{Request, Response};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, Middleware, Next};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::errors::{CollarError, Result};

/// Query parameters whose values never reach the logs.
pub const SECRET_QUERY_KEYS: [&str; 3] = ["collarkey", "pwd", "password"];

const USER_AGENT: &str = concat!("lib_collar/", env!("CARGO_PKG_VERSION"));

/// A response read to completion.
///
/// Non-2xx answers are not errors at this layer; callers decide.
#[derive(Debug)]
pub struct ApiResponse {
    /// The numeric HTTP status code.
    pub status: u16,
    /// Indicates if the status code was in the 2xx range.
    pub success: bool,
    /// The URL after redirects.
    pub final_url: Url,
    /// The headers returned by the server.
    pub headers: HeaderMap,
    /// The response body as text.
    pub body: String,
}

impl ApiResponse {
    /// Value of the `Content-Type` header, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Deserializes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.body)
    }
}

/// Client construction options.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Whole-request timeout.
    pub timeout: Duration,
    /// Keep cookies between requests (needed for portal sessions).
    pub cookie_store: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            cookie_store: false,
        }
    }
}

/// A flexible asynchronous HTTP client.
///
/// Built on top of `reqwest_middleware`, it holds a base URL that relative
/// paths are joined onto.
#[derive(Clone)]
pub struct ApiClient {
    /// The underlying middleware-enabled client.
    inner: ClientWithMiddleware,
    /// The base URL to which all relative paths are joined.
    base_url: Url,
}

impl ApiClient {
    /// Creates a new `ApiClient`.
    ///
    /// # Errors
    /// [`CollarError::Config`] if `base_url` is not an absolute URL or the
    /// TLS backend cannot be initialised.
    pub fn new(base_url: &str, options: &ClientOptions) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| CollarError::Config(format!("invalid base URL {:?}: {}", base_url, e)))?;

        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .cookie_store(options.cookie_store)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| CollarError::Config(format!("cannot build HTTP client: {}", e)))?;

        let inner = ClientBuilder::new(client).with(RequestLogger).build();

        Ok(Self { inner, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Joins a relative path onto the base URL.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| CollarError::Config(format!("cannot join {:?} onto {}: {}", path, self.base_url, e)))
    }

    /// Performs a GET and reads the full body.
    pub async fn get(&self, url: Url) -> reqwest_middleware::Result<ApiResponse> {
        let response = self.inner.get(url).send().await?;
        read_response(response).await
    }

    /// Posts URL-encoded form fields and reads the full body.
    pub async fn post_form(&self, url: Url, fields: &[(String, String)]) -> reqwest_middleware::Result<ApiResponse> {
        let response = self.inner.post(url).form(fields).send().await?;
        read_response(response).await
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient").field("base_url", &self.base_url.as_str()).finish()
    }
}

async fn read_response(response: Response) -> reqwest_middleware::Result<ApiResponse> {
    let status = response.status();
    let final_url = response.url().clone();
    let headers = response.headers().clone();
    let body = response.text().await?;
    Ok(ApiResponse {
        status: status.as_u16(),
        success: status.is_success(),
        final_url,
        headers,
        body,
    })
}

/// Returns the URL as text with the values of [`SECRET_QUERY_KEYS`] masked.
pub fn mask_url_secrets(url: &Url) -> String {
    if url.query().is_none() {
        return url.to_string();
    }
    let mut masked = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let value = if SECRET_QUERY_KEYS.iter().any(|s| k.eq_ignore_ascii_case(s)) {
                "*****".to_string()
            } else {
                v.into_owned()
            };
            (k.into_owned(), value)
        })
        .collect();
    masked.query_pairs_mut().clear().extend_pairs(pairs);
    masked.to_string()
}

/// Middleware tracing method, masked URL, status and elapsed time of every
/// request.
#[derive(Debug, Clone, Copy)]
pub struct RequestLogger;

#[async_trait::async_trait]
impl Middleware for RequestLogger {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        let method = req.method().clone();
        let url = mask_url_secrets(req.url());
        let started = Instant::now();

        let result = next.run(req, extensions).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(response) => debug!(
                %method,
                %url,
                status = response.status().as_u16(),
                elapsed_ms,
                "HTTP request completed"
            ),
            Err(e) => warn!(%method, %url, elapsed_ms, error = %e, "HTTP request failed"),
        }
        result
    }
}

/// Status code carried by a middleware error, if the server answered.
pub fn error_status(error: &reqwest_middleware::Error) -> Option<u16> {
    match error {
        reqwest_middleware::Error::Reqwest(e) => e.status().map(|s| s.as_u16()),
        reqwest_middleware::Error::Middleware(_) => None,
    }
}

/// Human-readable description of a middleware error.
pub fn describe_error(error: &reqwest_middleware::Error) -> String {
    match error {
        reqwest_middleware::Error::Reqwest(e) if e.is_timeout() => format!("request timed out: {}", e),
        reqwest_middleware::Error::Reqwest(e) if e.is_connect() => format!("connection failed: {}", e),
        other => other.to_string(),
    }
}
