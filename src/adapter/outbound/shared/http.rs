//! Rate-limited, retrying REST client shared by the venue adapters.
//!
//! Requests are rebuilt for every attempt so signed requests carry a fresh
//! timestamp or nonce. Each attempt first passes the connector's
//! [`RateLimiter`], then is sent with the configured timeout. Non-success
//! responses are classified by the venue's own error classifier.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client as HttpClient, Method};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::rate_limiter::RateLimiter;
use super::retry::{retry, RetryPolicy};
use crate::domain::{RateQuota, VenueId};
use crate::error::VenueError;

/// Maps a non-success HTTP status and body to a venue error.
pub type ErrorClassifier = fn(u16, &str) -> VenueError;

#[derive(Debug, Clone)]
pub struct RequestBody {
    pub content_type: &'static str,
    pub content: String,
}

/// One outbound request. The query string is sent exactly as given so that
/// it matches what was signed.
#[derive(Debug, Clone)]
pub struct RestRequest {
    pub method: Method,
    pub path: String,
    pub query: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Option<RequestBody>,
}

impl RestRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: String::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    #[must_use]
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    #[must_use]
    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    #[must_use]
    pub fn json(mut self, content: impl Into<String>) -> Self {
        self.body = Some(RequestBody {
            content_type: "application/json",
            content: content.into(),
        });
        self
    }

    #[must_use]
    pub fn form(mut self, content: impl Into<String>) -> Self {
        self.body = Some(RequestBody {
            content_type: "application/x-www-form-urlencoded",
            content: content.into(),
        });
        self
    }

    /// Path plus query, as most venues sign it.
    #[must_use]
    pub fn path_and_query(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query)
        }
    }
}

/// Settings for one venue's REST client.
#[derive(Debug, Clone)]
pub struct RestSettings {
    pub base_url: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub quota: RateQuota,
}

pub struct RestClient {
    venue: VenueId,
    http: HttpClient,
    base_url: String,
    limiter: RateLimiter,
    retry: RetryPolicy,
    classify: ErrorClassifier,
}

impl RestClient {
    #[must_use]
    pub fn new(venue: VenueId, settings: RestSettings, classify: ErrorClassifier) -> Self {
        let http = HttpClient::builder()
            .timeout(settings.timeout)
            .build()
            .unwrap_or_else(|err| {
                warn!(venue = %venue, error = %err, "Failed to build HTTP client, using defaults");
                HttpClient::new()
            });

        Self {
            venue,
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            limiter: RateLimiter::new(settings.quota),
            retry: settings.retry,
            classify,
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub const fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Send a request built by `build` and decode its JSON body.
    pub async fn send<T, B>(&self, operation: &str, build: B) -> Result<T, VenueError>
    where
        T: DeserializeOwned,
        B: Fn() -> Result<RestRequest, VenueError>,
    {
        self.send_with(operation, build, |body| {
            serde_json::from_str(body).map_err(VenueError::from)
        })
        .await
    }

    /// Like [`send`](Self::send) with a custom decoder. The decoder runs
    /// inside the retry loop, so it may report transient venue errors that
    /// arrive with a success status.
    pub async fn send_with<T, B, D>(&self, operation: &str, build: B, decode: D) -> Result<T, VenueError>
    where
        B: Fn() -> Result<RestRequest, VenueError>,
        D: Fn(&str) -> Result<T, VenueError>,
    {
        let this = self;
        let build = &build;
        let decode = &decode;
        retry(self.retry, operation, move || async move {
            let request = build()?;
            this.limiter.acquire().await;
            let body = this.dispatch(request).await?;
            decode(&body)
        })
        .await
    }

    async fn dispatch(&self, request: RestRequest) -> Result<String, VenueError> {
        let url = format!("{}{}", self.base_url, request.path_and_query());
        debug!(venue = %self.venue, method = %request.method, path = %request.path, "Sending request");

        let mut builder = self.http.request(request.method, &url);
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder
                .header(CONTENT_TYPE, body.content_type)
                .body(body.content);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| VenueError::from_reqwest(&e))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| VenueError::from_reqwest(&e))?;

        if status.is_success() {
            Ok(text)
        } else {
            Err((self.classify)(status.as_u16(), &text))
        }
    }
}

/// Status-based classification used when a venue body carries nothing better.
#[must_use]
pub fn classify_status(status: u16, message: &str) -> VenueError {
    let message = if message.trim().is_empty() {
        format!("HTTP {status}")
    } else {
        message.trim().to_string()
    };
    match status {
        401 | 403 => VenueError::Authentication(message),
        408 => VenueError::Timeout(message),
        418 | 429 => VenueError::RateLimited(message),
        500..=599 => VenueError::Server { status, message },
        _ => VenueError::Rejected {
            code: None,
            message,
        },
    }
}

/// Form-encode parameters in the given order.
#[must_use]
pub fn encode_params<K, V>(params: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        serializer.append_pair(key.as_ref(), value.as_ref());
    }
    serializer.finish()
}
