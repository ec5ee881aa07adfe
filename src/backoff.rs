//! Backoff policies: how long to wait before the next attempt.
//!
//! Every policy answers one question through [`BackoffStrategy::get_timeout`]:
//! given the 0-based index of the attempt that just failed and, when there is
//! one, the response it produced, how long should the loop sleep? `None` means
//! stop retrying and surface the current outcome.
//!
//! The five built-in variants are collected in [`Backoff`]; anything else can
//! be plugged in through [`Backoff::custom`].

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::AttemptResponse;

/// Computes the wait before the next attempt.
pub trait BackoffStrategy: Send + Sync + fmt::Debug {
    /// `attempt` is 0 for the decision taken after the first attempt failed.
    fn get_timeout(&self, attempt: usize, response: Option<&dyn AttemptResponse>)
        -> Option<Duration>;
}

/// Converts seconds into a `Duration`, clamping negatives and NaN to zero.
fn secs(value: f64) -> Duration {
    if value.is_nan() || value <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
}

/// `value.min(max)`, except that a NaN cap means zero.
fn cap(value: f64, max: f64) -> f64 {
    if max.is_nan() {
        return 0.0;
    }
    value.min(max)
}

fn lock_rng(rng: &Mutex<StdRng>) -> std::sync::MutexGuard<'_, StdRng> {
    rng.lock().unwrap_or_else(PoisonError::into_inner)
}

/// `start_timeout * factor^attempt`, capped at `max_timeout`.
#[derive(Clone, Debug, PartialEq)]
pub struct ExponentialBackoff {
    /// Base wait in seconds.
    pub start_timeout: f64,
    /// Upper bound in seconds.
    pub max_timeout: f64,
    pub factor: f64,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            start_timeout: 0.1,
            max_timeout: 30.0,
            factor: 2.0,
        }
    }
}

impl ExponentialBackoff {
    pub fn new(start_timeout: f64, max_timeout: f64, factor: f64) -> Self {
        Self {
            start_timeout,
            max_timeout,
            factor,
        }
    }

    /// Raw exponential value in seconds.
    pub fn timeout_secs(&self, attempt: usize) -> f64 {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let timeout = self.start_timeout * self.factor.powi(exp);
        // 0 * inf
        if timeout.is_nan() {
            return 0.0;
        }
        cap(timeout, self.max_timeout).max(0.0)
    }
}

impl BackoffStrategy for ExponentialBackoff {
    fn get_timeout(&self, attempt: usize, _: Option<&dyn AttemptResponse>) -> Option<Duration> {
        Some(secs(self.timeout_secs(attempt)))
    }
}

/// Uniform random wait in `[min_timeout, max_timeout]`.
#[derive(Clone, Debug)]
pub struct RandomBackoff {
    min_timeout: f64,
    max_timeout: f64,
    rng: Arc<Mutex<StdRng>>,
}

impl Default for RandomBackoff {
    fn default() -> Self {
        Self::new(0.1, 3.0)
    }
}

impl RandomBackoff {
    /// Bounds are in seconds; a reversed pair is swapped.
    pub fn new(min_timeout: f64, max_timeout: f64) -> Self {
        Self::with_rng(min_timeout, max_timeout, StdRng::from_entropy())
    }

    /// Same as [`RandomBackoff::new`] with a reproducible sequence.
    pub fn with_seed(min_timeout: f64, max_timeout: f64, seed: u64) -> Self {
        Self::with_rng(min_timeout, max_timeout, StdRng::seed_from_u64(seed))
    }

    fn with_rng(min_timeout: f64, max_timeout: f64, rng: StdRng) -> Self {
        let min_timeout = min_timeout.max(0.0);
        let max_timeout = max_timeout.max(0.0);
        Self {
            min_timeout: min_timeout.min(max_timeout),
            max_timeout: max_timeout.max(min_timeout),
            rng: Arc::new(Mutex::new(rng)),
        }
    }

    pub fn min_timeout(&self) -> f64 {
        self.min_timeout
    }

    pub fn max_timeout(&self) -> f64 {
        self.max_timeout
    }
}

impl BackoffStrategy for RandomBackoff {
    fn get_timeout(&self, _: usize, _: Option<&dyn AttemptResponse>) -> Option<Duration> {
        let sample: f64 = lock_rng(&self.rng).gen();
        Some(secs(
            self.min_timeout + sample * (self.max_timeout - self.min_timeout),
        ))
    }
}

/// Explicit per-attempt schedule; indices past the end reuse the last entry.
#[derive(Clone, Debug, PartialEq)]
pub struct ListBackoff {
    timeouts: Vec<f64>,
}

impl ListBackoff {
    pub fn new(timeouts: impl Into<Vec<f64>>) -> Self {
        Self {
            timeouts: timeouts.into(),
        }
    }

    pub fn timeouts(&self) -> &[f64] {
        &self.timeouts
    }
}

impl BackoffStrategy for ListBackoff {
    fn get_timeout(&self, attempt: usize, _: Option<&dyn AttemptResponse>) -> Option<Duration> {
        let timeout = self
            .timeouts
            .get(attempt)
            .or_else(|| self.timeouts.last())
            .copied()
            .unwrap_or(0.0);
        Some(secs(timeout))
    }
}

/// Fibonacci-growing wait, capped at `max_timeout`.
///
/// The running pair lives on the policy instance (and is shared by clones),
/// so a second retry sequence continues where the first one stopped.
#[derive(Clone, Debug)]
pub struct FibonacciBackoff {
    multiplier: f64,
    max_timeout: f64,
    steps: Arc<Mutex<(f64, f64)>>,
}

impl Default for FibonacciBackoff {
    fn default() -> Self {
        Self::new(1.0, 3.0)
    }
}

impl FibonacciBackoff {
    pub fn new(multiplier: f64, max_timeout: f64) -> Self {
        Self {
            multiplier,
            max_timeout,
            steps: Arc::new(Mutex::new((1.0, 1.0))),
        }
    }

    pub fn max_timeout(&self) -> f64 {
        self.max_timeout
    }

    /// Starts the sequence over from (1, 1).
    pub fn reset(&self) {
        *self.steps.lock().unwrap_or_else(PoisonError::into_inner) = (1.0, 1.0);
    }
}

impl BackoffStrategy for FibonacciBackoff {
    fn get_timeout(&self, _: usize, _: Option<&dyn AttemptResponse>) -> Option<Duration> {
        let mut steps = self.steps.lock().unwrap_or_else(PoisonError::into_inner);
        let (prev, current) = *steps;
        let next = prev + current;
        *steps = (current, next);
        Some(secs(cap(self.multiplier * next, self.max_timeout)))
    }
}

/// Exponential wait plus a uniform random component, capped at the
/// exponential `max_timeout`.
#[derive(Clone, Debug)]
pub struct JitterBackoff {
    base: ExponentialBackoff,
    random_interval_size: f64,
    rng: Arc<Mutex<StdRng>>,
}

impl Default for JitterBackoff {
    fn default() -> Self {
        Self::new(ExponentialBackoff::default(), 2.0)
    }
}

impl JitterBackoff {
    /// `random_interval_size` is the upper bound, in seconds, of the added
    /// random component.
    pub fn new(base: ExponentialBackoff, random_interval_size: f64) -> Self {
        Self::with_rng(base, random_interval_size, StdRng::from_entropy())
    }

    pub fn with_seed(base: ExponentialBackoff, random_interval_size: f64, seed: u64) -> Self {
        Self::with_rng(base, random_interval_size, StdRng::seed_from_u64(seed))
    }

    fn with_rng(base: ExponentialBackoff, random_interval_size: f64, rng: StdRng) -> Self {
        Self {
            base,
            random_interval_size: random_interval_size.max(0.0),
            rng: Arc::new(Mutex::new(rng)),
        }
    }

    pub fn base(&self) -> &ExponentialBackoff {
        &self.base
    }
}

impl BackoffStrategy for JitterBackoff {
    fn get_timeout(&self, attempt: usize, _: Option<&dyn AttemptResponse>) -> Option<Duration> {
        let sample: f64 = lock_rng(&self.rng).gen();
        let timeout = self.base.timeout_secs(attempt) + sample * self.random_interval_size;
        Some(secs(cap(timeout, self.base.max_timeout)))
    }
}

/// The backoff policy attached to [`RetryOptions`](crate::RetryOptions).
#[derive(Clone, Debug)]
pub enum Backoff {
    Exponential(ExponentialBackoff),
    Random(RandomBackoff),
    List(ListBackoff),
    Fibonacci(FibonacciBackoff),
    Jitter(JitterBackoff),
    Custom(Arc<dyn BackoffStrategy>),
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential(ExponentialBackoff::default())
    }
}

impl Backoff {
    pub fn custom(strategy: impl BackoffStrategy + 'static) -> Self {
        Self::Custom(Arc::new(strategy))
    }
}

impl BackoffStrategy for Backoff {
    fn get_timeout(
        &self,
        attempt: usize,
        response: Option<&dyn AttemptResponse>,
    ) -> Option<Duration> {
        match self {
            Self::Exponential(policy) => policy.get_timeout(attempt, response),
            Self::Random(policy) => policy.get_timeout(attempt, response),
            Self::List(policy) => policy.get_timeout(attempt, response),
            Self::Fibonacci(policy) => policy.get_timeout(attempt, response),
            Self::Jitter(policy) => policy.get_timeout(attempt, response),
            Self::Custom(policy) => policy.get_timeout(attempt, response),
        }
    }
}

impl From<ExponentialBackoff> for Backoff {
    fn from(policy: ExponentialBackoff) -> Self {
        Self::Exponential(policy)
    }
}

impl From<RandomBackoff> for Backoff {
    fn from(policy: RandomBackoff) -> Self {
        Self::Random(policy)
    }
}

impl From<ListBackoff> for Backoff {
    fn from(policy: ListBackoff) -> Self {
        Self::List(policy)
    }
}

impl From<FibonacciBackoff> for Backoff {
    fn from(policy: FibonacciBackoff) -> Self {
        Self::Fibonacci(policy)
    }
}

impl From<JitterBackoff> for Backoff {
    fn from(policy: JitterBackoff) -> Self {
        Self::Jitter(policy)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{
        secs, Backoff, BackoffStrategy, ExponentialBackoff, FibonacciBackoff, JitterBackoff,
        ListBackoff, RandomBackoff,
    };

    fn timeouts(policy: &dyn BackoffStrategy, count: usize) -> Vec<f64> {
        (0..count)
            .map(|attempt| {
                policy
                    .get_timeout(attempt, None)
                    .expect("built-in policies never stop")
                    .as_secs_f64()
            })
            .collect()
    }

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-6, "{actual:?} != {expected:?}");
        }
    }

    #[test]
    fn exponential_grows_then_caps() {
        let policy = ExponentialBackoff::default();
        assert_close(
            &timeouts(&policy, 10),
            &[0.1, 0.2, 0.4, 0.8, 1.6, 3.2, 6.4, 12.8, 25.6, 30.0],
        );
    }

    #[test]
    fn exponential_matches_closed_form() {
        let policy = ExponentialBackoff::new(0.5, 10.0, 3.0);
        for n in 0..12 {
            let expected = (0.5 * 3f64.powi(n as i32)).min(10.0);
            let actual = policy.get_timeout(n, None).map(|d| d.as_secs_f64());
            assert!((actual.unwrap_or(-1.0) - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn exponential_huge_attempt_stays_at_cap() {
        let policy = ExponentialBackoff::default();
        assert_eq!(policy.get_timeout(100_000, None), Some(Duration::from_secs(30)));
    }

    #[test]
    fn random_stays_in_bounds_and_ignores_attempt() {
        let policy = RandomBackoff::with_seed(0.1, 3.0, 7);
        for value in timeouts(&policy, 200) {
            assert!((0.1..=3.0).contains(&value), "{value} out of bounds");
        }

        let first = RandomBackoff::with_seed(0.5, 1.5, 42);
        let second = RandomBackoff::with_seed(0.5, 1.5, 42);
        let a = first.get_timeout(0, None);
        let b = second.get_timeout(9, None);
        assert_eq!(a, b);
    }

    #[test]
    fn random_swaps_reversed_bounds() {
        let policy = RandomBackoff::with_seed(3.0, 1.0, 1);
        assert_eq!(policy.min_timeout(), 1.0);
        assert_eq!(policy.max_timeout(), 3.0);
    }

    #[test]
    fn list_returns_entries_then_clamps_to_last() {
        let expected = [1.2, 2.1, 3.4, 4.3, 4.5];
        let policy = ListBackoff::new(expected.to_vec());
        assert_close(&timeouts(&policy, 5), &expected);
        assert_close(&timeouts(&policy, 8)[5..], &[4.5, 4.5, 4.5]);
    }

    #[test]
    fn empty_list_waits_zero() {
        let policy = ListBackoff::new(Vec::new());
        assert_eq!(policy.get_timeout(3, None), Some(Duration::ZERO));
    }

    #[test]
    fn fibonacci_advances_and_caps() {
        let policy = FibonacciBackoff::new(2.0, 60.0);
        assert_close(
            &timeouts(&policy, 10),
            &[4.0, 6.0, 10.0, 16.0, 26.0, 42.0, 60.0, 60.0, 60.0, 60.0],
        );
    }

    #[test]
    fn fibonacci_state_is_shared_between_clones_until_reset() {
        let policy = FibonacciBackoff::new(1.0, 100.0);
        let clone = policy.clone();
        assert_eq!(policy.get_timeout(0, None), Some(Duration::from_secs(2)));
        assert_eq!(clone.get_timeout(0, None), Some(Duration::from_secs(3)));

        policy.reset();
        assert_eq!(clone.get_timeout(0, None), Some(Duration::from_secs(2)));
    }

    #[test]
    fn jitter_adds_bounded_noise_on_top_of_exponential() {
        let base = ExponentialBackoff::default();
        let policy = JitterBackoff::with_seed(base.clone(), 2.0, 10);
        for (attempt, value) in timeouts(&policy, 10).into_iter().enumerate() {
            let floor = base.timeout_secs(attempt);
            assert!(value >= floor - 1e-9, "{value} below {floor}");
            assert!(value <= (floor + 2.0).min(30.0) + 1e-9);
        }
    }

    #[test]
    fn every_builtin_stays_within_zero_and_max() {
        let policies: Vec<(Backoff, f64)> = vec![
            (ExponentialBackoff::new(0.2, 5.0, 3.0).into(), 5.0),
            (RandomBackoff::with_seed(0.0, 4.0, 3).into(), 4.0),
            (ListBackoff::new(vec![0.5, 9.0, 1.0]).into(), 9.0),
            (FibonacciBackoff::new(1.5, 20.0).into(), 20.0),
            (JitterBackoff::with_seed(ExponentialBackoff::new(1.0, 8.0, 2.0), 5.0, 4).into(), 8.0),
        ];
        for (policy, max) in policies {
            for value in timeouts(&policy, 40) {
                assert!((0.0..=max + 1e-9).contains(&value), "{policy:?} gave {value}");
            }
        }
    }

    #[test]
    fn nan_cap_waits_zero() {
        let exponential = ExponentialBackoff::new(1.0, f64::NAN, 2.0);
        assert_eq!(exponential.timeout_secs(5), 0.0);
        let fibonacci = FibonacciBackoff::new(2.0, f64::NAN);
        assert_eq!(fibonacci.get_timeout(0, None), Some(Duration::ZERO));
        let jitter = JitterBackoff::with_seed(ExponentialBackoff::new(1.0, f64::NAN, 2.0), 2.0, 1);
        assert_eq!(jitter.get_timeout(3, None), Some(Duration::ZERO));
    }

    #[test]
    fn secs_clamps_invalid_values() {
        assert_eq!(secs(-1.0), Duration::ZERO);
        assert_eq!(secs(f64::NAN), Duration::ZERO);
        assert_eq!(secs(f64::INFINITY), Duration::MAX);
        assert_eq!(secs(1.5), Duration::from_millis(1500));
    }
}
