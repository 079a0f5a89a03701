use std::sync::Arc;
use std::time::Duration;

use apiguard_domain::{Failure, ResilienceConfig, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, RETRY_AFTER};
use reqwest::{Client as ReqwestClient, Method, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, instrument};

/// Supplies the authentication headers for each request
///
/// Implementations own credential storage and refresh; the adapter asks for
/// headers before every attempt.
#[async_trait]
pub trait AuthHeaderProvider: Send + Sync {
    async fn auth_headers(&self) -> Result<HeaderMap>;
}

/// Fixed header set, for API keys that never rotate during the process
#[derive(Debug, Clone, Default)]
pub struct StaticHeaders {
    headers: HeaderMap,
}

impl StaticHeaders {
    pub fn new(headers: HeaderMap) -> Self {
        Self { headers }
    }

    /// Add one header; fails with `Failure::Config` on an invalid name or value
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| Failure::config(format!("invalid header name '{name}': {err}")))?;
        let mut value = HeaderValue::from_str(value)
            .map_err(|err| Failure::config(format!("invalid value for header '{name}': {err}")))?;
        value.set_sensitive(true);
        self.headers.insert(name, value);
        Ok(self)
    }
}

#[async_trait]
impl AuthHeaderProvider for StaticHeaders {
    async fn auth_headers(&self) -> Result<HeaderMap> {
        Ok(self.headers.clone())
    }
}

/// One HTTP request per call, with the response mapped onto [`Failure`]
///
/// The adapter never retries, paces or times out on its own; wrap
/// [`send`](Self::send) in a `ResilientExecutor` attempt for that.
#[derive(Clone)]
pub struct HttpAttempt {
    client: ReqwestClient,
    base_url: String,
    auth: Arc<dyn AuthHeaderProvider>,
    default_retry_after: Duration,
    request_timeout: Option<Duration>,
}

impl std::fmt::Debug for HttpAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAttempt")
            .field("base_url", &self.base_url)
            .field("default_retry_after", &self.default_retry_after)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl HttpAttempt {
    pub fn builder(base_url: impl Into<String>) -> HttpAttemptBuilder {
        HttpAttemptBuilder::new(base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Perform exactly one request and decode the JSON body
    ///
    /// An empty success body decodes to `Value::Null`.
    ///
    /// # Errors
    /// - `RateLimited` for 429, carrying the `Retry-After` hint or the
    ///   configured default
    /// - `Auth` for 401/403, `Rejected` for any other 4xx
    /// - `Upstream` for 5xx and for bodies that are not JSON
    /// - `Network`/`Timeout` when no response arrived
    #[instrument(skip(self, query, body), fields(method = %method, path = %path))]
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let headers = self.auth.auth_headers().await?;
        let mut request = self
            .client
            .request(method, self.url(path))
            .headers(headers)
            .header(ACCEPT, "application/json");
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|err| self.transport_failure(&err))?;
        let status = response.status();
        debug!(status = status.as_u16(), "Received HTTP response");

        if status.is_success() {
            self.decode(status, response).await
        } else {
            Err(self.status_failure(status, response).await)
        }
    }

    pub async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        self.send(Method::GET, path, query, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        self.send(Method::POST, path, &[], Some(body)).await
    }

    async fn decode(&self, status: StatusCode, response: Response) -> Result<Value> {
        let bytes = response.bytes().await.map_err(|err| self.transport_failure(&err))?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|err| {
            Failure::upstream(Some(status.as_u16()), format!("Invalid JSON response: {err}"))
        })
    }

    async fn status_failure(&self, status: StatusCode, response: Response) -> Failure {
        let code = status.as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| parse_retry_after(value, Utc::now()));
        let text = response.text().await.unwrap_or_default();
        let message = error_message(&text).unwrap_or_else(|| format!("HTTP {code}"));

        match status {
            StatusCode::TOO_MANY_REQUESTS => Failure::RateLimited {
                retry_after: Some(retry_after.unwrap_or(self.default_retry_after)),
            },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Failure::Auth { status: Some(code), message }
            }
            status if status.is_client_error() => Failure::Rejected { status: code, message },
            _ => Failure::upstream(Some(code), message),
        }
    }

    fn transport_failure(&self, err: &reqwest::Error) -> Failure {
        if err.is_timeout() {
            return Failure::Timeout { timeout: self.request_timeout.unwrap_or_default() };
        }
        if err.is_connect() {
            return Failure::network(format!("Connection failed: {err}"));
        }
        if err.is_decode() || err.is_body() {
            return Failure::upstream(None, format!("Unreadable response body: {err}"));
        }
        Failure::network(err.to_string())
    }
}

/// `Retry-After` as delay seconds or an HTTP-date relative to `now`
///
/// A date in the past yields zero; anything unparsable, negative or too large
/// for a `Duration` yields `None`.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<f64>() {
        return Duration::try_from_secs_f64(seconds).ok();
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

/// `message` field of a JSON error body, or the raw text when not JSON
fn error_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => {
            map.get("message").and_then(Value::as_str).map(str::to_string)
        }
        Ok(_) => None,
        Err(_) => Some(body.to_string()),
    }
}

/// Builder for [`HttpAttempt`]
pub struct HttpAttemptBuilder {
    base_url: String,
    auth: Arc<dyn AuthHeaderProvider>,
    default_retry_after: Duration,
    request_timeout: Option<Duration>,
    user_agent: Option<String>,
    default_headers: Option<HeaderMap>,
}

impl HttpAttemptBuilder {
    fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth: Arc::new(StaticHeaders::default()),
            default_retry_after: Duration::from_secs(2),
            request_timeout: None,
            user_agent: None,
            default_headers: None,
        }
    }

    /// Take the rate-limit fallback hint from `config`: twice the pacing
    /// interval
    pub fn config(mut self, config: &ResilienceConfig) -> Self {
        self.default_retry_after = config.rate_limit_delay() * 2;
        self
    }

    pub fn auth<A: AuthHeaderProvider + 'static>(mut self, auth: A) -> Self {
        self.auth = Arc::new(auth);
        self
    }

    pub fn shared_auth(mut self, auth: Arc<dyn AuthHeaderProvider>) -> Self {
        self.auth = auth;
        self
    }

    /// Hint used for a 429 without a usable `Retry-After` header
    pub fn default_retry_after(mut self, delay: Duration) -> Self {
        self.default_retry_after = delay;
        self
    }

    /// Client-level timeout; normally left unset so the executor's deadline
    /// applies
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn default_headers(mut self, headers: HeaderMap) -> Self {
        self.default_headers = Some(headers);
        self
    }

    /// # Errors
    /// `Failure::Config` for a base URL that is not http(s) or a client that
    /// cannot be built.
    pub fn build(self) -> Result<HttpAttempt> {
        let base_url = self.base_url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Failure::config(format!(
                "base URL must start with http:// or https://, got '{base_url}'"
            )));
        }

        let mut builder = ReqwestClient::builder().no_proxy();
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }
        if let Some(headers) = self.default_headers {
            builder = builder.default_headers(headers);
        }
        let client = builder
            .build()
            .map_err(|err| Failure::config(format!("failed to build HTTP client: {err}")))?;

        Ok(HttpAttempt {
            client,
            base_url,
            auth: self.auth,
            default_retry_after: self.default_retry_after,
            request_timeout: self.request_timeout,
        })
    }
}
