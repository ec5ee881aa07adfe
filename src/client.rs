use std::fmt;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use reqwest::Method;

use crate::{
    RequestContext, RequestParams, ReqwestTransport, Result, RetryError, RetryOptions, Targets,
    TraceRequestContext, Transport,
};

/// Observer invoked with each attempt's trace context before it is issued.
pub type AttemptHook = Arc<dyn Fn(&TraceRequestContext) + Send + Sync>;

/// Retrying HTTP client.
///
/// Wraps one [`Transport`] and a set of default [`RetryOptions`]. Every verb
/// method returns a [`RequestContext`] builder; nothing is sent until that
/// context is sent or awaited. The client can be shared by reference between
/// concurrent requests.
pub struct RetryClient<T: Transport = ReqwestTransport> {
    transport: T,
    owns_transport: bool,
    closed: AtomicBool,
    retry_options: RetryOptions,
    raise_for_status: bool,
    attempt_hook: Option<AttemptHook>,
}

impl<T: Transport> fmt::Debug for RetryClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryClient")
            .field("owns_transport", &self.owns_transport)
            .field("closed", &self.is_closed())
            .field("retry_options", &self.retry_options)
            .field("raise_for_status", &self.raise_for_status)
            .field("attempt_hook", &self.attempt_hook.as_ref().map(|_| "<hook>"))
            .finish()
    }
}

impl RetryClient<ReqwestTransport> {
    /// Creates a client with its own `reqwest::Client`.
    pub fn new() -> Self {
        Self::build(ReqwestTransport::default(), true)
    }

    /// Creates a client on top of an existing session. The session is not
    /// closed by [`RetryClient::close`].
    pub fn with_session(http: reqwest::Client) -> Self {
        Self::with_transport(ReqwestTransport::new(http))
    }
}

impl Default for RetryClient<ReqwestTransport> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport> RetryClient<T> {
    /// Creates a client over an externally owned transport.
    pub fn with_transport(transport: T) -> Self {
        Self::build(transport, false)
    }

    /// Creates a client that owns `transport` and closes it on
    /// [`RetryClient::close`].
    pub fn owning(transport: T) -> Self {
        Self::build(transport, true)
    }

    fn build(transport: T, owns_transport: bool) -> Self {
        Self {
            transport,
            owns_transport,
            closed: AtomicBool::new(false),
            retry_options: RetryOptions::default(),
            raise_for_status: false,
            attempt_hook: None,
        }
    }

    /// Sets the default retry options used when a request gives none.
    pub fn with_options(mut self, opts: RetryOptions) -> Self {
        self.retry_options = opts;
        self
    }

    /// Turns 4xx/5xx final responses into [`RetryError::Status`].
    pub fn with_raise_for_status(mut self, enabled: bool) -> Self {
        self.raise_for_status = enabled;
        self
    }

    /// Registers an observer for the current attempt number.
    pub fn with_attempt_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&TraceRequestContext) + Send + Sync + 'static,
    {
        self.attempt_hook = Some(Arc::new(hook));
        self
    }

    pub fn retry_options(&self) -> &RetryOptions {
        &self.retry_options
    }

    pub fn raises_for_status(&self) -> bool {
        self.raise_for_status
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn owns_transport(&self) -> bool {
        self.owns_transport
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Marks the client closed, closing the transport if the client owns it.
    ///
    /// Closing twice is a no-op.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.owns_transport {
            self.transport.close();
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("retry client closed");
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(RetryError::Closed)
        } else {
            Ok(())
        }
    }

    pub(crate) fn notify_attempt(&self, trace: &TraceRequestContext) {
        if let Some(hook) = &self.attempt_hook {
            hook(trace);
        }
    }

    pub fn request(&self, method: Method, targets: impl Into<Targets>) -> RequestContext<'_, T> {
        RequestContext::from_targets(self, method, targets.into())
    }

    /// Builds a request whose attempts rotate through `params_list`.
    pub fn requests(&self, params_list: Vec<RequestParams>) -> RequestContext<'_, T> {
        RequestContext::new(self, params_list)
    }

    pub fn get(&self, targets: impl Into<Targets>) -> RequestContext<'_, T> {
        self.request(Method::GET, targets)
    }

    pub fn head(&self, targets: impl Into<Targets>) -> RequestContext<'_, T> {
        self.request(Method::HEAD, targets)
    }

    pub fn options(&self, targets: impl Into<Targets>) -> RequestContext<'_, T> {
        self.request(Method::OPTIONS, targets)
    }

    pub fn post(&self, targets: impl Into<Targets>) -> RequestContext<'_, T> {
        self.request(Method::POST, targets)
    }

    pub fn put(&self, targets: impl Into<Targets>) -> RequestContext<'_, T> {
        self.request(Method::PUT, targets)
    }

    pub fn patch(&self, targets: impl Into<Targets>) -> RequestContext<'_, T> {
        self.request(Method::PATCH, targets)
    }

    pub fn delete(&self, targets: impl Into<Targets>) -> RequestContext<'_, T> {
        self.request(Method::DELETE, targets)
    }
}

impl<T: Transport> Drop for RetryClient<T> {
    fn drop(&mut self) {
        #[cfg(feature = "tracing")]
        if self.owns_transport && !self.is_closed() {
            tracing::warn!("retry client was not closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RetryClient;
    use crate::{RetryError, RetryOptions};

    #[test]
    fn new_client_owns_its_session() {
        let client = RetryClient::new();
        assert!(client.owns_transport());
        assert!(!client.is_closed());
        client.close();
    }

    #[test]
    fn external_session_is_not_owned() {
        let client = RetryClient::with_session(reqwest::Client::new());
        assert!(!client.owns_transport());
    }

    #[test]
    fn close_is_idempotent_and_blocks_requests() {
        let client = RetryClient::new();
        client.close();
        client.close();
        assert!(client.is_closed());
        assert!(matches!(client.ensure_open(), Err(RetryError::Closed)));
    }

    #[test]
    fn debug_reports_options_and_hides_hook() {
        let client = RetryClient::new()
            .with_options(RetryOptions::default().with_attempts(7))
            .with_attempt_hook(|_| {});
        let debug = format!("{client:?}");
        assert!(debug.contains("attempts: 7"));
        assert!(debug.contains("<hook>"));
        client.close();
    }

    #[test]
    fn request_debug_hides_credentials() {
        let client = RetryClient::new();
        let ctx = client
            .get("http://localhost/with_auth")
            .basic_auth("user", Some("hunter2".to_owned()))
            .bearer_auth("s3cr3t-token");
        let debug = format!("{ctx:?}");
        assert!(debug.contains("\"user\""));
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("s3cr3t-token"));
        drop(ctx);
        client.close();
    }
}
