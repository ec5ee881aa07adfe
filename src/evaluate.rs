use reqwest::Method;

use crate::{AttemptResponse, RetryError, RetryOptions};

const MIN_SERVER_ERROR_STATUS: u16 = 500;

/// Outcome of evaluating one attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Decision {
    /// Issue another attempt after backing off.
    Continue,
    /// Surface this outcome to the caller.
    Stop,
}

/// Decides whether a response warrants another attempt.
///
/// `is_final` is true on the last permitted attempt, where the response is
/// always surfaced as-is.
pub fn evaluate_response(
    options: &RetryOptions,
    method: &Method,
    response: &dyn AttemptResponse,
    is_final: bool,
) -> Decision {
    if is_final || !options.methods.contains(method) {
        return Decision::Stop;
    }

    let status = response.status().as_u16();
    if options.statuses.contains(&status) {
        return Decision::Continue;
    }

    // A configured callback takes over from the blanket 5xx rule.
    let retry = match &options.evaluate_response_callback {
        Some(callback) => !callback(response),
        None => options.retry_all_server_errors && status >= MIN_SERVER_ERROR_STATUS,
    };
    if retry {
        Decision::Continue
    } else {
        Decision::Stop
    }
}

/// Decides whether an error warrants another attempt.
pub fn evaluate_error(options: &RetryOptions, error: &RetryError, is_final: bool) -> Decision {
    if !is_final && options.exceptions.contains(&error.kind()) {
        Decision::Continue
    } else {
        Decision::Stop
    }
}
