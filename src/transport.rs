use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use reqwest::{header::HeaderMap, Method, StatusCode};

use crate::{Result, RetryError};

/// Read-only view of one attempt's response.
///
/// The evaluator and backoff policies only ever look at the status and the
/// headers; the body stays untouched until the caller reads it.
pub trait AttemptResponse {
    fn status(&self) -> StatusCode;
    fn headers(&self) -> &HeaderMap;
}

impl AttemptResponse for reqwest::Response {
    fn status(&self) -> StatusCode {
        reqwest::Response::status(self)
    }

    fn headers(&self) -> &HeaderMap {
        reqwest::Response::headers(self)
    }
}

/// Trace payload for a single attempt.
///
/// `current_attempt` is 1-based. `extra` holds caller-supplied values that
/// travel unchanged across every attempt of the request.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TraceRequestContext {
    pub current_attempt: usize,
    pub extra: BTreeMap<String, String>,
}

impl TraceRequestContext {
    /// Builds the context for the 0-based `attempt_index`.
    pub fn for_attempt(attempt_index: usize, extra: BTreeMap<String, String>) -> Self {
        Self {
            current_attempt: attempt_index + 1,
            extra,
        }
    }
}

/// Pass-through transport options, applied identically to every attempt.
#[derive(Clone, Default)]
pub struct RequestOptions {
    pub query: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub timeout: Option<Duration>,
    pub basic_auth: Option<(String, Option<String>)>,
    pub bearer_auth: Option<String>,
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("query", &self.query)
            .field("body", &self.body.as_ref().map(Vec::len))
            .field("timeout", &self.timeout)
            .field(
                "basic_auth",
                &self
                    .basic_auth
                    .as_ref()
                    .map(|(username, password)| (username, password.as_ref().map(|_| "<redacted>"))),
            )
            .field("bearer_auth", &self.bearer_auth.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Everything a transport needs to issue one attempt.
#[derive(Clone, Copy, Debug)]
pub struct AttemptRequest<'a> {
    pub method: &'a Method,
    pub url: &'a str,
    pub headers: &'a HeaderMap,
    pub options: &'a RequestOptions,
    pub trace: &'a TraceRequestContext,
}

/// Issues a single HTTP request.
///
/// Implementations must be safe to share between concurrent requests; the
/// retry client holds one transport and calls it from every attempt loop.
pub trait Transport: Send + Sync {
    type Response: AttemptResponse + Send + 'static;

    fn issue<'a>(
        &'a self,
        request: AttemptRequest<'a>,
    ) -> impl Future<Output = Result<Self::Response>> + Send + 'a;

    /// Releases transport resources. Only called when the retry client owns
    /// the transport.
    fn close(&self) {}
}

/// Default transport backed by a `reqwest::Client`.
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Returns the wrapped session.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }
}

impl Transport for ReqwestTransport {
    type Response = reqwest::Response;

    fn issue<'a>(
        &'a self,
        request: AttemptRequest<'a>,
    ) -> impl Future<Output = Result<Self::Response>> + Send + 'a {
        let mut builder = self
            .http
            .request(request.method.clone(), request.url)
            .headers(request.headers.clone());

        let options = request.options;
        if !options.query.is_empty() {
            builder = builder.query(&options.query);
        }
        if let Some(body) = &options.body {
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some((username, password)) = &options.basic_auth {
            builder = builder.basic_auth(username, password.as_ref());
        }
        if let Some(token) = &options.bearer_auth {
            builder = builder.bearer_auth(token);
        }

        #[cfg(feature = "tracing")]
        tracing::trace!(
            current_attempt = request.trace.current_attempt,
            method = %request.method,
            url = request.url,
            "issuing request"
        );

        async move { builder.send().await.map_err(RetryError::Transport) }
    }
}
