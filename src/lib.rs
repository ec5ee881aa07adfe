//! `retry-http` retries async HTTP requests with pluggable backoff policies.
//!
//! A [`RetryClient`] wraps one [`Transport`] (by default a `reqwest::Client`)
//! and exposes one builder per verb:
//! - [`RetryClient::get`], [`RetryClient::post`], ... for a single URL or a
//!   failover list of URLs
//! - [`RetryClient::requests`] for attempts that rotate through full
//!   [`RequestParams`]
//!
//! Each request runs an attempt loop driven by [`RetryOptions`]: statuses,
//! error kinds and an optional response callback decide whether to try
//! again, and a [`Backoff`] policy decides how long to wait in between. The
//! final attempt's response or error is always surfaced verbatim.
//!
//! ```no_run
//! use retry_http::{ExponentialBackoff, RetryClient, RetryOptions};
//!
//! # async fn run() -> retry_http::Result<()> {
//! let client = RetryClient::new();
//! let options = RetryOptions::exponential(ExponentialBackoff::default()).with_attempts(5);
//!
//! let mut response = client
//!     .get(["https://primary.example/ping", "https://backup.example/ping"])
//!     .retry_options(options)
//!     .send()
//!     .await?;
//! println!("{}", response.text().await?);
//!
//! client.close();
//! # Ok(())
//! # }
//! ```

mod backoff;
mod client;
mod error;
mod evaluate;
mod options;
mod request;
mod response;
mod rotation;
mod transport;

pub use backoff::{
    Backoff, BackoffStrategy, ExponentialBackoff, FibonacciBackoff, JitterBackoff, ListBackoff,
    RandomBackoff,
};
pub use client::{AttemptHook, RetryClient};
pub use error::{ErrorKind, RetryError};
pub use evaluate::{evaluate_error, evaluate_response, Decision};
pub use options::{default_methods, EvaluateResponseCallback, RetryOptions};
pub use request::{RequestContext, RequestParams};
pub use response::ScopedResponse;
pub use rotation::Targets;
pub use transport::{
    AttemptRequest, AttemptResponse, ReqwestTransport, RequestOptions, TraceRequestContext,
    Transport,
};

pub type Result<T> = std::result::Result<T, RetryError>;
