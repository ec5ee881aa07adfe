use std::fmt;

/// Stable classification of attempt failures.
///
/// [`RetryOptions::exceptions`](crate::RetryOptions::exceptions) is a set of
/// these kinds; an error is retried only when its kind is a member.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The attempt hit a request or connect timeout.
    Timeout,
    /// The connection could not be established.
    Connect,
    /// The request failed while being sent.
    Request,
    /// Reading or writing the body failed.
    Body,
    /// Decoding the response failed.
    Decode,
    /// Too many redirects, or a redirect loop.
    Redirect,
    /// The request could not be built (bad URL, bad header, ...).
    Builder,
    /// An error status surfaced through `raise_for_status`.
    Status,
    /// Anything else.
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Request => "request",
            Self::Body => "body",
            Self::Decode => "decode",
            Self::Redirect => "redirect",
            Self::Builder => "builder",
            Self::Status => "status",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    /// Network or request execution error from `reqwest`.
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    /// Failure reported by a non-reqwest [`Transport`](crate::Transport).
    #[error("transport error ({kind}): {source}")]
    Custom {
        /// Classification used by the retry evaluator.
        kind: ErrorKind,
        /// Underlying failure.
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Error status raised because `raise_for_status` was enabled.
    #[error("http error {status} for {url}")]
    Status { status: u16, url: String },
    /// Retry options failed validation before any attempt was issued.
    #[error("invalid retry options: {0}")]
    InvalidOptions(String),
    /// The request was built with an empty target list.
    #[error("no target url given")]
    NoTargets,
    /// The client was used after [`RetryClient::close`](crate::RetryClient::close).
    #[error("retry client is closed")]
    Closed,
    /// The scoped response was already released or taken.
    #[error("response already released")]
    Released,
    /// Request body serialization failed.
    #[error("encode error: {0}")]
    Encode(serde_json::Error),
}

impl RetryError {
    /// Wraps an arbitrary failure from a custom transport.
    pub fn custom(
        kind: ErrorKind,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Custom {
            kind,
            source: source.into(),
        }
    }

    /// Returns the kind matched against the retry allow-list.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(err) => classify_reqwest(err),
            Self::Custom { kind, .. } => *kind,
            Self::Status { .. } => ErrorKind::Status,
            Self::Encode(_) | Self::InvalidOptions(_) | Self::NoTargets => ErrorKind::Builder,
            Self::Closed | Self::Released => ErrorKind::Other,
        }
    }
}

fn classify_reqwest(err: &reqwest::Error) -> ErrorKind {
    if err.is_timeout() {
        ErrorKind::Timeout
    } else if err.is_connect() {
        ErrorKind::Connect
    } else if err.is_builder() {
        ErrorKind::Builder
    } else if err.is_redirect() {
        ErrorKind::Redirect
    } else if err.is_status() {
        ErrorKind::Status
    } else if err.is_body() {
        ErrorKind::Body
    } else if err.is_decode() {
        ErrorKind::Decode
    } else if err.is_request() {
        ErrorKind::Request
    } else {
        ErrorKind::Other
    }
}
