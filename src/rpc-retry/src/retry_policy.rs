// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Defines traits for retry policies and some common implementations.
//!
//! The retry loop automatically retries an RPC when it fails due to a
//! transient error. A retry policy classifies each failure, keeps track of the
//! retry budget (the number of failures, or the elapsed time), and decides
//! if another attempt is allowed.
//!
//! Retry policies hold mutable state. The invoker creates a fresh copy of the
//! configured policy, using [clone_policy][RetryPolicy::clone_policy], for
//! each logical call. Concurrent calls never observe each other's failures.
//!
//! # Example
//! ```
//! # use cloud_rpc_retry::options::ClientConfig;
//! use cloud_rpc_retry::retry_policy::{Aip194Strict, RetryPolicyExt};
//! use std::time::Duration;
//! let config = ClientConfig::default().set_retry_policy(
//!     Aip194Strict
//!         .with_time_limit(Duration::from_secs(60))
//!         .with_error_limit(10),
//! );
//! ```

use crate::attempt_context::AttemptContext;
use crate::error::Error;
use crate::error::rpc::Code;
use crate::retry_result::RetryResult;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Defines the trait implemented by all retry policies.
///
/// The retry loop calls [setup][RetryPolicy::setup] before each attempt, and
/// [on_error][RetryPolicy::on_error] after each failed attempt.
pub trait RetryPolicy: Send + Sync + std::fmt::Debug {
    /// Returns a copy of this policy with a fresh retry budget.
    fn clone_policy(&self) -> Box<dyn RetryPolicy>;

    /// Adjusts the context before each attempt.
    ///
    /// The default implementation shortens the attempt timeout so it does not
    /// exceed the [remaining time][RetryPolicy::remaining_time] in the policy.
    fn setup(&self, context: &mut AttemptContext) {
        if let Some(remaining) = self.remaining_time() {
            context.limit_attempt_timeout(remaining);
        }
    }

    /// Records a failure and returns `true` if another attempt is allowed.
    fn on_failure(&mut self, error: &Error) -> bool;

    /// Returns `true` if the retry budget is used up.
    fn is_exhausted(&self) -> bool;

    /// Returns `true` if `error` should not be retried, regardless of the
    /// budget.
    fn is_permanent_failure(&self, error: &Error) -> bool;

    /// The remaining time in the retry policy.
    ///
    /// For policies based on time, this returns the remaining time in the
    /// policy. The retry loop uses this value to limit the attempt timeout,
    /// and to avoid sleeping past the deadline. For policies that are not
    /// time based this returns `None`.
    fn remaining_time(&self) -> Option<Duration> {
        None
    }

    /// Query the retry policy after an error.
    fn on_error(&mut self, error: Error) -> RetryResult {
        if self.on_failure(&error) {
            return RetryResult::Continue(error);
        }
        if self.is_permanent_failure(&error) {
            return RetryResult::Permanent(error);
        }
        RetryResult::Exhausted(error)
    }
}

/// Extension trait to decorate retry policies.
pub trait RetryPolicyExt: RetryPolicy + Clone + Sized + 'static {
    /// Decorate this policy to limit the total elapsed time in the retry loop.
    ///
    /// # Example
    /// ```
    /// # use cloud_rpc_retry::retry_policy::*;
    /// use std::time::Duration;
    /// let policy = Aip194Strict.with_time_limit(Duration::from_secs(10));
    /// assert!(policy.remaining_time().is_some());
    /// ```
    fn with_time_limit(self, maximum_duration: Duration) -> LimitedElapsedTime<Self> {
        LimitedElapsedTime::custom(self, maximum_duration)
    }

    /// Decorate this policy to limit the number of failures.
    ///
    /// A policy decorated with `with_error_limit(n)` makes at most `n + 1`
    /// attempts.
    ///
    /// # Example
    /// ```
    /// # use cloud_rpc_retry::error::{Error, rpc::{Code, Status}};
    /// # use cloud_rpc_retry::retry_policy::*;
    /// let mut policy = Aip194Strict.with_error_limit(1);
    /// let unavailable = || Error::service(Status::default().set_code(Code::Unavailable));
    /// assert!(policy.on_error(unavailable()).is_continue());
    /// assert!(policy.on_error(unavailable()).is_exhausted());
    /// ```
    fn with_error_limit(self, maximum_failures: u32) -> LimitedErrorCount<Self> {
        LimitedErrorCount::custom(self, maximum_failures)
    }
}

impl<T: RetryPolicy + Clone + 'static> RetryPolicyExt for T {}

/// A retry policy that strictly follows [AIP-194].
///
/// This policy should be decorated to limit the number of retry attempts or the
/// duration of the retry loop.
///
/// The policy interprets AIP-194 **strictly**, the retry decision for
/// service errors is based only on the status code, and the only retryable
/// status code is `UNAVAILABLE`. Transport errors, where the attempt did not
/// produce a response, and authentication errors, where the request never
/// left the client, are also retryable.
///
/// [AIP-194]: https://google.aip.dev/194
#[derive(Clone, Debug)]
pub struct Aip194Strict;

impl RetryPolicy for Aip194Strict {
    fn clone_policy(&self) -> Box<dyn RetryPolicy> {
        Box::new(Self)
    }

    fn on_failure(&mut self, error: &Error) -> bool {
        !self.is_permanent_failure(error)
    }

    fn is_exhausted(&self) -> bool {
        false
    }

    fn is_permanent_failure(&self, error: &Error) -> bool {
        if error.is_transport() || error.is_authentication() {
            return false;
        }
        error.status().map(|s| s.code) != Some(Code::Unavailable) || error.is_exhausted()
    }
}

/// A retry policy that retries a configurable set of status codes.
///
/// Like [Aip194Strict], transport and authentication errors are retryable.
/// Attempt timeouts are retryable if the set includes
/// [DeadlineExceeded][Code::DeadlineExceeded].
///
/// This policy should be decorated to limit the number of retry attempts or the
/// duration of the retry loop.
///
/// # Example
/// ```
/// # use cloud_rpc_retry::error::rpc::Code;
/// # use cloud_rpc_retry::retry_policy::*;
/// let policy = TransientCodes::new([Code::Unavailable, Code::Aborted])
///     .with_error_limit(5);
/// ```
#[derive(Clone, Debug)]
pub struct TransientCodes {
    codes: BTreeSet<Code>,
}

impl TransientCodes {
    /// Creates a policy treating the status codes in `codes` as transient.
    pub fn new<I: IntoIterator<Item = Code>>(codes: I) -> Self {
        Self {
            codes: codes.into_iter().collect(),
        }
    }

    /// The status codes treated as transient.
    pub fn codes(&self) -> impl Iterator<Item = Code> + '_ {
        self.codes.iter().copied()
    }
}

impl RetryPolicy for TransientCodes {
    fn clone_policy(&self) -> Box<dyn RetryPolicy> {
        Box::new(self.clone())
    }

    fn on_failure(&mut self, error: &Error) -> bool {
        !self.is_permanent_failure(error)
    }

    fn is_exhausted(&self) -> bool {
        false
    }

    fn is_permanent_failure(&self, error: &Error) -> bool {
        if error.is_transport() || error.is_authentication() {
            return false;
        }
        if error.is_timeout() {
            return !self.codes.contains(&Code::DeadlineExceeded);
        }
        if error.is_exhausted() {
            return true;
        }
        error
            .status()
            .is_none_or(|s| !self.codes.contains(&s.code))
    }
}

/// A retry policy that never retries.
///
/// Use this policy for operations that are not safe to retry. Errors are
/// classified as in [Aip194Strict], transient errors are reported as an
/// exhausted policy, all other errors as permanent.
#[derive(Clone, Debug)]
pub struct NeverRetry;

impl RetryPolicy for NeverRetry {
    fn clone_policy(&self) -> Box<dyn RetryPolicy> {
        Box::new(Self)
    }

    fn on_failure(&mut self, _error: &Error) -> bool {
        false
    }

    fn is_exhausted(&self) -> bool {
        true
    }

    fn is_permanent_failure(&self, error: &Error) -> bool {
        Aip194Strict.is_permanent_failure(error)
    }
}

/// A retry policy decorator that limits the total time in the retry loop.
///
/// This policy decorates an inner policy and limits the duration of retry
/// loops. Once the loop exceeds its duration limit, this policy always returns
/// [Exhausted][RetryResult::Exhausted] for transient errors. Before this
/// deadline is reached, the policy follows the inner policy.
///
/// The clock starts when the policy is created, and restarts on each call to
/// [clone_policy][RetryPolicy::clone_policy].
///
/// # Parameters
/// * `P` - the inner retry policy, defaults to [Aip194Strict].
#[derive(Debug)]
pub struct LimitedElapsedTime<P = Aip194Strict>
where
    P: RetryPolicy,
{
    inner: P,
    maximum_duration: Duration,
    start: Instant,
}

impl LimitedElapsedTime {
    /// Creates a new instance, with the default inner policy.
    ///
    /// # Example
    /// ```
    /// # use cloud_rpc_retry::retry_policy::*;
    /// use std::time::Duration;
    /// let policy = LimitedElapsedTime::new(Duration::from_secs(10));
    /// assert!(policy.remaining_time().is_some_and(|r| r <= Duration::from_secs(10)));
    /// ```
    pub fn new(maximum_duration: Duration) -> Self {
        Self::custom(Aip194Strict, maximum_duration)
    }
}

impl<P> LimitedElapsedTime<P>
where
    P: RetryPolicy,
{
    /// Creates a new instance with a custom inner policy.
    pub fn custom(inner: P, maximum_duration: Duration) -> Self {
        Self {
            inner,
            maximum_duration,
            start: Instant::now(),
        }
    }

    /// The maximum time for the retry loop.
    pub fn maximum_duration(&self) -> Duration {
        self.maximum_duration
    }

    fn deadline(&self) -> Instant {
        self.start + self.maximum_duration
    }

    fn on_failure_now(&mut self, now: Instant, error: &Error) -> bool {
        let inner = self.inner.on_failure(error);
        inner && now < self.deadline()
    }

    fn is_exhausted_now(&self, now: Instant) -> bool {
        now >= self.deadline() || self.inner.is_exhausted()
    }

    fn remaining_time_now(&self, now: Instant) -> Option<Duration> {
        let remaining = self.deadline().saturating_duration_since(now);
        if let Some(inner) = self.inner.remaining_time() {
            return Some(std::cmp::min(remaining, inner));
        }
        Some(remaining)
    }
}

impl<P> Clone for LimitedElapsedTime<P>
where
    P: RetryPolicy + Clone,
{
    fn clone(&self) -> Self {
        Self::custom(self.inner.clone(), self.maximum_duration)
    }
}

impl<P> RetryPolicy for LimitedElapsedTime<P>
where
    P: RetryPolicy + Clone + 'static,
{
    fn clone_policy(&self) -> Box<dyn RetryPolicy> {
        Box::new(self.clone())
    }

    fn on_failure(&mut self, error: &Error) -> bool {
        self.on_failure_now(Instant::now(), error)
    }

    fn is_exhausted(&self) -> bool {
        self.is_exhausted_now(Instant::now())
    }

    fn is_permanent_failure(&self, error: &Error) -> bool {
        self.inner.is_permanent_failure(error)
    }

    fn remaining_time(&self) -> Option<Duration> {
        self.remaining_time_now(Instant::now())
    }
}

/// A retry policy decorator that limits the number of failures.
///
/// This policy decorates an inner policy and limits the total number of
/// failures. With `maximum_failures = N` the retry loop makes at most `N + 1`
/// attempts. With `maximum_failures = 0` the first failure ends the loop.
///
/// The failure count restarts on each call to
/// [clone_policy][RetryPolicy::clone_policy].
///
/// # Parameters
/// * `P` - the inner retry policy, defaults to [Aip194Strict].
#[derive(Debug)]
pub struct LimitedErrorCount<P = Aip194Strict>
where
    P: RetryPolicy,
{
    inner: P,
    maximum_failures: u32,
    failure_count: u32,
}

impl LimitedErrorCount {
    /// Creates a new instance, with the default inner policy.
    ///
    /// # Example
    /// ```
    /// # use cloud_rpc_retry::retry_policy::*;
    /// let policy = LimitedErrorCount::new(3);
    /// assert_eq!(policy.maximum_failures(), 3);
    /// ```
    pub fn new(maximum_failures: u32) -> Self {
        Self::custom(Aip194Strict, maximum_failures)
    }
}

impl<P> LimitedErrorCount<P>
where
    P: RetryPolicy,
{
    /// Creates a new instance with a custom inner policy.
    pub fn custom(inner: P, maximum_failures: u32) -> Self {
        Self {
            inner,
            maximum_failures,
            failure_count: 0,
        }
    }

    /// The maximum number of failures.
    pub fn maximum_failures(&self) -> u32 {
        self.maximum_failures
    }
}

impl<P> Clone for LimitedErrorCount<P>
where
    P: RetryPolicy + Clone,
{
    fn clone(&self) -> Self {
        Self::custom(self.inner.clone(), self.maximum_failures)
    }
}

impl<P> RetryPolicy for LimitedErrorCount<P>
where
    P: RetryPolicy + Clone + 'static,
{
    fn clone_policy(&self) -> Box<dyn RetryPolicy> {
        Box::new(self.clone())
    }

    fn on_failure(&mut self, error: &Error) -> bool {
        let inner = self.inner.on_failure(error);
        self.failure_count = self.failure_count.saturating_add(1);
        inner && self.failure_count <= self.maximum_failures
    }

    fn is_exhausted(&self) -> bool {
        self.failure_count > self.maximum_failures || self.inner.is_exhausted()
    }

    fn is_permanent_failure(&self, error: &Error) -> bool {
        self.inner.is_permanent_failure(error)
    }

    fn remaining_time(&self) -> Option<Duration> {
        self.inner.remaining_time()
    }
}

/// A helper type to use [RetryPolicy] in client and request options.
#[derive(Clone, Debug)]
pub struct RetryPolicyArg(pub(crate) Arc<dyn RetryPolicy>);

impl RetryPolicyArg {
    /// Returns a copy of the policy with a fresh retry budget.
    pub fn clone_policy(&self) -> Box<dyn RetryPolicy> {
        self.0.clone_policy()
    }
}

impl<T: RetryPolicy + 'static> std::convert::From<T> for RetryPolicyArg {
    fn from(value: T) -> Self {
        Self(Arc::new(value))
    }
}

impl std::convert::From<Arc<dyn RetryPolicy>> for RetryPolicyArg {
    fn from(value: Arc<dyn RetryPolicy>) -> Self {
        Self(value)
    }
}
