use std::collections::BTreeMap;
use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::time::Duration;

use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE},
    Method,
};
use serde::Serialize;
use tokio::time::sleep;

use crate::{
    evaluate::{evaluate_error, evaluate_response, Decision},
    rotation, AttemptRequest, AttemptResponse, BackoffStrategy, RequestOptions, Result,
    RetryClient, RetryError, RetryOptions, ScopedResponse, Targets, TraceRequestContext,
    Transport,
};

/// Request shape for one attempt slot.
///
/// A request built from several params uses entry `min(attempt, len - 1)` for
/// each attempt, so method, URL and headers can all change between attempts.
#[derive(Clone, Debug)]
pub struct RequestParams {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub trace_request_ctx: BTreeMap<String, String>,
}

impl RequestParams {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            trace_request_ctx: BTreeMap::new(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_trace_request_ctx(mut self, ctx: BTreeMap<String, String>) -> Self {
        self.trace_request_ctx = ctx;
        self
    }
}

enum Outcome<R> {
    Response(R),
    Failed(RetryError),
}

/// A retried request under construction.
///
/// Nothing is sent until the context is driven: [`RequestContext::send`]
/// yields a [`ScopedResponse`] that releases the response on drop, while
/// awaiting the context directly yields the bare response.
#[must_use = "a RequestContext does nothing until sent or awaited"]
pub struct RequestContext<'a, T: Transport> {
    client: &'a RetryClient<T>,
    params: Vec<RequestParams>,
    options: RequestOptions,
    retry_options: Option<RetryOptions>,
    raise_for_status: Option<bool>,
    deferred: Option<RetryError>,
}

impl<T: Transport> fmt::Debug for RequestContext<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("params", &self.params)
            .field("options", &self.options)
            .field("retry_options", &self.retry_options)
            .field("raise_for_status", &self.raise_for_status)
            .finish()
    }
}

impl<'a, T: Transport> RequestContext<'a, T> {
    pub(crate) fn new(client: &'a RetryClient<T>, params: Vec<RequestParams>) -> Self {
        Self {
            client,
            params,
            options: RequestOptions::default(),
            retry_options: None,
            raise_for_status: None,
            deferred: None,
        }
    }

    pub(crate) fn from_targets(client: &'a RetryClient<T>, method: Method, targets: Targets) -> Self {
        let params = targets
            .into_inner()
            .into_iter()
            .map(|url| RequestParams::new(method.clone(), url))
            .collect();
        Self::new(client, params)
    }

    /// Replaces the client's default retry options for this request.
    pub fn retry_options(mut self, options: RetryOptions) -> Self {
        self.retry_options = Some(options);
        self
    }

    pub fn raise_for_status(mut self, enabled: bool) -> Self {
        self.raise_for_status = Some(enabled);
        self
    }

    /// Adds a header to every attempt.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        for params in &mut self.params {
            params.headers.insert(name.clone(), value.clone());
        }
        self
    }

    /// Merges headers into every attempt.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        for params in &mut self.params {
            params.headers.extend(headers.clone());
        }
        self
    }

    pub fn query<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.options
            .query
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.options.body = Some(body.into());
        self
    }

    /// Serializes `value` as the JSON body of every attempt.
    pub fn json<B: Serialize + ?Sized>(mut self, value: &B) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => {
                self.options.body = Some(body);
                self = self.header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            }
            Err(err) => self.deferred = Some(RetryError::Encode(err)),
        }
        self
    }

    pub fn basic_auth(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.options.basic_auth = Some((username.into(), password));
        self
    }

    pub fn bearer_auth(mut self, token: impl Into<String>) -> Self {
        self.options.bearer_auth = Some(token.into());
        self
    }

    /// Per-attempt timeout. The retry sequence as a whole is unbounded.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    /// Extra values reported with every attempt's trace context.
    pub fn trace_request_ctx<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let extra: BTreeMap<String, String> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        for params in &mut self.params {
            params.trace_request_ctx.extend(extra.clone());
        }
        self
    }

    /// Runs the attempt loop and scopes the final response.
    pub async fn send(self) -> Result<ScopedResponse<T::Response>> {
        self.run().await.map(ScopedResponse::new)
    }

    async fn run(self) -> Result<T::Response> {
        if let Some(err) = self.deferred {
            return Err(err);
        }
        self.client.ensure_open()?;

        let retry_options = self
            .retry_options
            .unwrap_or_else(|| self.client.retry_options().clone());
        retry_options.validate()?;
        if self.params.is_empty() {
            return Err(RetryError::NoTargets);
        }
        let raise_for_status = self
            .raise_for_status
            .unwrap_or_else(|| self.client.raises_for_status());

        let mut attempt = 0usize;
        loop {
            let Some(params) = rotation::select(&self.params, attempt) else {
                return Err(RetryError::NoTargets);
            };
            let trace = TraceRequestContext::for_attempt(attempt, params.trace_request_ctx.clone());
            let is_final = trace.current_attempt >= retry_options.attempts;

            #[cfg(feature = "tracing")]
            tracing::debug!(
                "attempt {} out of {} ({} {})",
                trace.current_attempt,
                retry_options.attempts,
                params.method,
                params.url
            );

            self.client.notify_attempt(&trace);
            let issued = self
                .client
                .transport()
                .issue(AttemptRequest {
                    method: &params.method,
                    url: &params.url,
                    headers: &params.headers,
                    options: &self.options,
                    trace: &trace,
                })
                .await;

            let outcome = match issued {
                Ok(response) => {
                    match evaluate_response(&retry_options, &params.method, &response, is_final) {
                        Decision::Continue => Outcome::Response(response),
                        Decision::Stop => {
                            let status = response.status();
                            if !(raise_for_status && status.as_u16() >= 400) {
                                return Ok(response);
                            }
                            drop(response);
                            Outcome::Failed(RetryError::Status {
                                status: status.as_u16(),
                                url: params.url.clone(),
                            })
                        }
                    }
                }
                Err(err) => Outcome::Failed(err),
            };

            let outcome = match outcome {
                Outcome::Failed(err)
                    if evaluate_error(&retry_options, &err, is_final) == Decision::Stop =>
                {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("giving up on attempt {}: {}", trace.current_attempt, err);
                    return Err(err);
                }
                outcome => outcome,
            };

            let delay = {
                let observed = match &outcome {
                    Outcome::Response(response) => Some(response as &dyn AttemptResponse),
                    Outcome::Failed(_) => None,
                };
                retry_options.backoff.get_timeout(attempt, observed)
            };
            let Some(delay) = delay else {
                #[cfg(feature = "tracing")]
                tracing::debug!("backoff stopped retrying after attempt {}", trace.current_attempt);
                return match outcome {
                    Outcome::Response(response) => Ok(response),
                    Outcome::Failed(err) => Err(err),
                };
            };

            #[cfg(feature = "tracing")]
            match &outcome {
                Outcome::Response(response) => tracing::debug!(
                    "retrying after response code {} in {:?}",
                    response.status(),
                    delay
                ),
                Outcome::Failed(err) => {
                    tracing::debug!("retrying after error {} in {:?}", err, delay)
                }
            }

            // Release the intermediate response before waiting.
            drop(outcome);
            sleep(delay).await;
            attempt += 1;
        }
    }
}

impl<'a, T: Transport + 'a> IntoFuture for RequestContext<'a, T> {
    type Output = Result<T::Response>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send + 'a>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.run())
    }
}
