use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use reqwest::Method;

use crate::{
    AttemptResponse, Backoff, ErrorKind, ExponentialBackoff, FibonacciBackoff, JitterBackoff,
    ListBackoff, RandomBackoff, Result, RetryError,
};

/// Caller-supplied response check. Returning `false` asks for another attempt.
pub type EvaluateResponseCallback = Arc<dyn Fn(&dyn AttemptResponse) -> bool + Send + Sync>;

/// Configures when and how a request is retried.
///
/// Options given to a single request replace the client defaults as a whole;
/// fields are never merged.
#[derive(Clone)]
pub struct RetryOptions {
    /// Total number of attempts, including the first one. Must be at least 1.
    pub attempts: usize,
    /// Statuses retried in addition to the 5xx rule.
    pub statuses: HashSet<u16>,
    /// Error kinds that are retried; any other error is surfaced at once.
    pub exceptions: HashSet<ErrorKind>,
    /// Methods whose responses may be retried.
    pub methods: HashSet<Method>,
    /// Retry every status >= 500.
    pub retry_all_server_errors: bool,
    pub evaluate_response_callback: Option<EvaluateResponseCallback>,
    pub backoff: Backoff,
}

impl fmt::Debug for RetryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOptions")
            .field("attempts", &self.attempts)
            .field("statuses", &self.statuses)
            .field("exceptions", &self.exceptions)
            .field("methods", &self.methods)
            .field("retry_all_server_errors", &self.retry_all_server_errors)
            .field(
                "evaluate_response_callback",
                &self.evaluate_response_callback.as_ref().map(|_| "<callback>"),
            )
            .field("backoff", &self.backoff)
            .finish()
    }
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self::new(Backoff::default())
    }
}

/// Methods retried unless the caller narrows the set.
pub fn default_methods() -> HashSet<Method> {
    [
        Method::HEAD,
        Method::GET,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
        Method::TRACE,
        Method::POST,
        Method::CONNECT,
        Method::PATCH,
    ]
    .into_iter()
    .collect()
}

impl RetryOptions {
    /// Three attempts with the given backoff and default triggers.
    pub fn new(backoff: impl Into<Backoff>) -> Self {
        Self {
            attempts: 3,
            statuses: HashSet::new(),
            exceptions: HashSet::new(),
            methods: default_methods(),
            retry_all_server_errors: true,
            evaluate_response_callback: None,
            backoff: backoff.into(),
        }
    }

    pub fn exponential(policy: ExponentialBackoff) -> Self {
        Self::new(policy)
    }

    pub fn random(policy: RandomBackoff) -> Self {
        Self::new(policy)
    }

    /// One attempt per listed timeout.
    pub fn list(timeouts: impl Into<Vec<f64>>) -> Self {
        let policy = ListBackoff::new(timeouts);
        let attempts = policy.timeouts().len();
        Self {
            attempts,
            ..Self::new(policy)
        }
    }

    pub fn fibonacci(policy: FibonacciBackoff) -> Self {
        Self::new(policy)
    }

    pub fn jitter(policy: JitterBackoff) -> Self {
        Self::new(policy)
    }

    pub fn with_attempts(mut self, attempts: usize) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.statuses = statuses.into_iter().collect();
        self
    }

    pub fn with_exceptions(mut self, exceptions: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.exceptions = exceptions.into_iter().collect();
        self
    }

    pub fn with_methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods = methods.into_iter().collect();
        self
    }

    pub fn with_retry_all_server_errors(mut self, enabled: bool) -> Self {
        self.retry_all_server_errors = enabled;
        self
    }

    pub fn with_evaluate_response_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&dyn AttemptResponse) -> bool + Send + Sync + 'static,
    {
        self.evaluate_response_callback = Some(Arc::new(callback));
        self
    }

    pub fn with_backoff(mut self, backoff: impl Into<Backoff>) -> Self {
        self.backoff = backoff.into();
        self
    }

    /// Rejects configurations the attempt loop cannot run.
    pub fn validate(&self) -> Result<()> {
        if self.attempts == 0 {
            return Err(RetryError::InvalidOptions(
                "attempts must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}
