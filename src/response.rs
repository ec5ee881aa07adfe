use std::fmt;

use reqwest::{header::HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

use crate::{AttemptResponse, Result, RetryError};

/// Final response of a retried request, released when dropped.
///
/// [`ScopedResponse::release`] can be called any number of times; only the
/// first call has an effect. [`ScopedResponse::take`] hands the response to
/// the caller, who then owns its release.
pub struct ScopedResponse<R> {
    inner: Option<R>,
}

impl<R> ScopedResponse<R> {
    pub(crate) fn new(response: R) -> Self {
        Self {
            inner: Some(response),
        }
    }

    pub fn get(&self) -> Option<&R> {
        self.inner.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut R> {
        self.inner.as_mut()
    }

    /// Moves the response out of the scope.
    pub fn take(&mut self) -> Option<R> {
        self.inner.take()
    }

    /// Drops the held response, if any.
    pub fn release(&mut self) {
        drop(self.inner.take());
    }

    pub fn is_released(&self) -> bool {
        self.inner.is_none()
    }

    fn require(&self) -> Result<&R> {
        self.inner.as_ref().ok_or(RetryError::Released)
    }
}

impl<R: AttemptResponse> ScopedResponse<R> {
    pub fn status(&self) -> Result<StatusCode> {
        self.require().map(AttemptResponse::status)
    }

    pub fn headers(&self) -> Result<&HeaderMap> {
        self.require().map(AttemptResponse::headers)
    }
}

impl ScopedResponse<reqwest::Response> {
    /// Reads the body as text, releasing the response.
    pub async fn text(&mut self) -> Result<String> {
        let response = self.inner.take().ok_or(RetryError::Released)?;
        response.text().await.map_err(RetryError::Transport)
    }

    /// Reads the raw body, releasing the response.
    pub async fn bytes(&mut self) -> Result<Vec<u8>> {
        let response = self.inner.take().ok_or(RetryError::Released)?;
        let body = response.bytes().await.map_err(RetryError::Transport)?;
        Ok(body.to_vec())
    }

    /// Decodes the body as JSON, releasing the response.
    pub async fn json<T: DeserializeOwned>(&mut self) -> Result<T> {
        let response = self.inner.take().ok_or(RetryError::Released)?;
        response.json::<T>().await.map_err(RetryError::Transport)
    }
}

impl<R> Drop for ScopedResponse<R> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<R: AttemptResponse> fmt::Debug for ScopedResponse<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedResponse")
            .field("status", &self.inner.as_ref().map(AttemptResponse::status))
            .field("released", &self.is_released())
            .finish()
    }
}
