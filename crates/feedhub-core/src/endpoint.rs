//! Feed-side and Hub-side HTTP endpoints.

use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::FeedError;
use crate::http_client::{HttpAuth, HttpClient, HttpMethod, HttpRequest};
use crate::retry::AttemptPolicy;

/// Per-call transport options.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    pub timeout: Duration,
    pub attempts: AttemptPolicy,
    pub verbose: bool,
    /// Statuses accepted as success; anything else is a [`FeedError::Status`].
    pub expected_statuses: Vec<u16>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            attempts: AttemptPolicy::default(),
            verbose: false,
            expected_statuses: vec![200],
        }
    }
}

impl RequestOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_attempts(mut self, attempts: AttemptPolicy) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.attempts.max_attempts = max_attempts;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn expects(&self, status: u16) -> bool {
        self.expected_statuses.contains(&status)
    }
}

/// Diagnostic summary of one request, rendered only when something is logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsgHead {
    pub method: HttpMethod,
    pub url: String,
    pub started_at: OffsetDateTime,
    pub latency: Duration,
    pub attempts: u32,
}

impl MsgHead {
    fn pending(method: HttpMethod, url: &str) -> Self {
        Self {
            method,
            url: url.to_owned(),
            started_at: OffsetDateTime::now_utc(),
            latency: Duration::ZERO,
            attempts: 0,
        }
    }

    pub fn render(&self) -> String {
        let started = self
            .started_at
            .format(&Rfc3339)
            .unwrap_or_else(|_| self.started_at.unix_timestamp().to_string());
        if self.attempts == 0 {
            return format!("{} {} (not sent)", self.method, self.url);
        }
        format!(
            "{} {} ({} ms, {} attempt{}, started {started})",
            self.method,
            self.url,
            self.latency.as_millis(),
            self.attempts,
            if self.attempts == 1 { "" } else { "s" },
        )
    }
}

/// Body and status of a response that passed the expected-status check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub body: String,
    pub status_code: u16,
    pub msg_head: MsgHead,
}

/// One side of a Feed: either its own API or the Hub it talks to.
#[derive(Clone)]
pub struct Endpoint {
    name: String,
    base_url: String,
    auth: HttpAuth,
    defaults: RequestOptions,
    client: Arc<dyn HttpClient>,
}

impl Debug for Endpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl Endpoint {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        client: Arc<dyn HttpClient>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            auth: HttpAuth::None,
            defaults: RequestOptions::default(),
            client,
        }
    }

    pub fn with_auth(mut self, auth: HttpAuth) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_defaults(mut self, defaults: RequestOptions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn defaults(&self) -> &RequestOptions {
        &self.defaults
    }

    pub fn url_for(&self, path: &str, query: &BTreeMap<String, String>) -> String {
        let mut url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        if !query.is_empty() {
            let pairs = query
                .iter()
                .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
                .collect::<Vec<_>>()
                .join("&");
            url.push('?');
            url.push_str(&pairs);
        }
        url
    }

    /// Summary of a request that has been planned but not sent.
    pub fn pending_head(&self, method: HttpMethod, path: &str, query: &BTreeMap<String, String>) -> MsgHead {
        MsgHead::pending(method, &self.url_for(path, query))
    }

    pub async fn get(
        &self,
        path: &str,
        params: &BTreeMap<String, String>,
        options: &RequestOptions,
    ) -> Result<RawResponse, FeedError> {
        let request = HttpRequest::get(self.url_for(path, params));
        self.perform(request, options).await
    }

    pub async fn post(
        &self,
        path: &str,
        body: String,
        options: &RequestOptions,
    ) -> Result<RawResponse, FeedError> {
        let request = HttpRequest::post(self.url_for(path, &BTreeMap::new())).with_body(body);
        self.perform(request, options).await
    }

    async fn perform(
        &self,
        request: HttpRequest,
        options: &RequestOptions,
    ) -> Result<RawResponse, FeedError> {
        let request = request
            .with_auth(&self.auth)
            .with_timeout(options.timeout);
        let mut head = MsgHead::pending(request.method, &request.url);

        if options.attempts.max_attempts == 0 {
            return Err(FeedError::Status {
                status_code: 0,
                body: None,
                msg_head: Some(head),
            });
        }

        let clock = Instant::now();
        let mut attempt = 0;
        loop {
            attempt += 1;
            tracing::debug!(
                endpoint = %self.name,
                method = %request.method,
                url = %request.url,
                attempt,
                "sending request"
            );

            let outcome = self.client.execute(request.clone()).await;
            head.latency = clock.elapsed();
            head.attempts = attempt;

            match outcome {
                Ok(response) if options.expects(response.status) => {
                    tracing::debug!(
                        endpoint = %self.name,
                        status = response.status,
                        latency_ms = head.latency.as_millis() as u64,
                        "response received"
                    );
                    return Ok(RawResponse {
                        body: response.body,
                        status_code: response.status,
                        msg_head: head,
                    });
                }
                Ok(response) => {
                    let body = serde_json::from_str::<Value>(&response.body).ok();
                    return Err(FeedError::Status {
                        status_code: response.status,
                        body,
                        msg_head: Some(head),
                    });
                }
                Err(error) if options.attempts.allows_retry_after(attempt) => {
                    let delay = options.attempts.delay_for_attempt(attempt - 1);
                    tracing::warn!(
                        endpoint = %self.name,
                        url = %request.url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "socket failure, trying again"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    return Err(FeedError::Socket {
                        code: error.kind().code(),
                        message: error.message().to_owned(),
                        msg_head: Some(head),
                    });
                }
            }
        }
    }
}
