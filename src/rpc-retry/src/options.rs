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

//! Client configuration and per request options.
//!
//! While the library defaults are intended to work for most applications, it
//! is sometimes necessary to change the configuration. Applications set the
//! retry and backoff policies for all the calls made via a client with
//! [ClientConfig], and may override them for a specific call with
//! [RequestOptions].
//!
//! Options are resolved for each call: the request options take precedence
//! over the client configuration, which takes precedence over the
//! [library defaults][defaults].

use crate::backoff_policy::{BackoffPolicy, BackoffPolicyArg};
use crate::retry_policy::{RetryPolicy, RetryPolicyArg};
use http::HeaderMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Configure a client.
///
/// A client represents a connection to a Google Cloud Service. Each service
/// has one or more client types. The default configuration for each client
/// should work for most applications. But some applications may need to
/// override the retry policies, or set a timeout for each attempt.
///
/// # Example
/// ```
/// # use cloud_rpc_retry::options::ClientConfig;
/// # use cloud_rpc_retry::retry_policy::{Aip194Strict, RetryPolicyExt};
/// use std::time::Duration;
/// let config = ClientConfig::new()
///     .set_retry_policy(Aip194Strict.with_error_limit(5))
///     .set_attempt_timeout(Duration::from_secs(30));
/// assert_eq!(config.attempt_timeout(), Some(Duration::from_secs(30)));
/// ```
#[derive(Clone, Debug, Default)]
pub struct ClientConfig {
    pub(crate) retry_policy: Option<Arc<dyn RetryPolicy>>,
    pub(crate) backoff_policy: Option<Arc<dyn BackoffPolicy>>,
    pub(crate) attempt_timeout: Option<Duration>,
}

impl ClientConfig {
    /// Returns a default [ClientConfig].
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the retry policy.
    pub fn set_retry_policy<V: Into<RetryPolicyArg>>(mut self, v: V) -> Self {
        self.retry_policy = Some(v.into().0);
        self
    }

    /// Configure the retry backoff policy.
    pub fn set_backoff_policy<V: Into<BackoffPolicyArg>>(mut self, v: V) -> Self {
        self.backoff_policy = Some(v.into().0);
        self
    }

    /// Configure the timeout for each attempt.
    pub fn set_attempt_timeout<V: Into<Duration>>(mut self, v: V) -> Self {
        self.attempt_timeout = Some(v.into());
        self
    }

    /// Get the configured attempt timeout, if any.
    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout
    }
}

/// A set of options configuring a single request.
///
/// # Example
/// ```
/// # use cloud_rpc_retry::options::RequestOptions;
/// # use cloud_rpc_retry::retry_policy::NeverRetry;
/// use tokio_util::sync::CancellationToken;
/// let token = CancellationToken::new();
/// let mut options = RequestOptions::default();
/// options.set_retry_policy(NeverRetry);
/// options.set_cancellation_token(token.clone());
/// assert!(options.retry_policy().is_some());
/// ```
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
    attempt_timeout: Option<Duration>,
    retry_policy: Option<Arc<dyn RetryPolicy>>,
    backoff_policy: Option<Arc<dyn BackoffPolicy>>,
    cancellation: Option<CancellationToken>,
    metadata: HeaderMap,
}

impl RequestOptions {
    /// Sets the per-attempt timeout.
    ///
    /// When using a retry loop, this affects the timeout for each attempt. The
    /// overall timeout for a request is set by the retry policy.
    pub fn set_attempt_timeout<T: Into<Duration>>(&mut self, v: T) {
        self.attempt_timeout = Some(v.into());
    }

    /// Gets the current per-attempt timeout.
    pub fn attempt_timeout(&self) -> &Option<Duration> {
        &self.attempt_timeout
    }

    /// Get the current retry policy override, if any.
    pub fn retry_policy(&self) -> &Option<Arc<dyn RetryPolicy>> {
        &self.retry_policy
    }

    /// Sets the retry policy configuration.
    ///
    /// Operations that are not safe to retry should use
    /// [NeverRetry][crate::retry_policy::NeverRetry].
    pub fn set_retry_policy<V: Into<RetryPolicyArg>>(&mut self, v: V) {
        self.retry_policy = Some(v.into().0);
    }

    /// Get the current backoff policy override, if any.
    pub fn backoff_policy(&self) -> &Option<Arc<dyn BackoffPolicy>> {
        &self.backoff_policy
    }

    /// Sets the backoff policy configuration.
    pub fn set_backoff_policy<V: Into<BackoffPolicyArg>>(&mut self, v: V) {
        self.backoff_policy = Some(v.into().0);
    }

    /// Get the cancellation token, if any.
    pub fn cancellation_token(&self) -> &Option<CancellationToken> {
        &self.cancellation
    }

    /// Sets a token to cancel the call.
    ///
    /// Cancelling the token stops the retry loop, without waiting for the
    /// current attempt or backoff delay to complete.
    pub fn set_cancellation_token(&mut self, v: CancellationToken) {
        self.cancellation = Some(v);
    }

    /// Get the request metadata.
    pub fn metadata(&self) -> &HeaderMap {
        &self.metadata
    }

    /// Sets the metadata sent with each attempt.
    pub fn set_metadata(&mut self, v: HeaderMap) {
        self.metadata = v;
    }
}

/// The library defaults.
pub mod defaults {
    use crate::exponential_backoff::{ExponentialBackoff, ExponentialBackoffBuilder, Jitter};
    use crate::retry_policy::{Aip194Strict, LimitedElapsedTime, RetryPolicyExt};
    use std::time::Duration;

    /// The maximum time spent in the retry loop of a logical call.
    pub const MAXIMUM_ELAPSED_TIME: Duration = Duration::from_secs(10 * 60);

    /// The initial backoff delay.
    pub const INITIAL_DELAY: Duration = Duration::from_millis(10);

    /// The maximum backoff delay.
    pub const MAXIMUM_DELAY: Duration = Duration::from_secs(5 * 60);

    /// The backoff scaling factor.
    pub const SCALING: f64 = 2.0;

    /// Retries `UNAVAILABLE` and transport errors for up to 10 minutes.
    pub fn retry_policy() -> LimitedElapsedTime {
        Aip194Strict.with_time_limit(MAXIMUM_ELAPSED_TIME)
    }

    /// Exponential backoff from 10 milliseconds to 5 minutes, with full jitter.
    pub fn backoff_policy() -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_delay(INITIAL_DELAY)
            .with_maximum_delay(MAXIMUM_DELAY)
            .with_scaling(SCALING)
            .with_jitter(Jitter::Full)
            .clamp()
    }
}

/// The policies and settings for one logical call.
#[derive(Debug)]
pub(crate) struct ResolvedOptions {
    pub retry_policy: Box<dyn RetryPolicy>,
    pub backoff_policy: Box<dyn BackoffPolicy>,
    pub attempt_timeout: Option<Duration>,
    pub cancellation: CancellationToken,
    pub metadata: HeaderMap,
}

/// Resolves the options for a call, and creates fresh copies of the policies.
pub(crate) fn resolve(config: &ClientConfig, options: &RequestOptions) -> ResolvedOptions {
    let retry_policy = options
        .retry_policy
        .as_ref()
        .or(config.retry_policy.as_ref())
        .map(|p| p.clone_policy())
        .unwrap_or_else(|| Box::new(defaults::retry_policy()));
    let backoff_policy = options
        .backoff_policy
        .as_ref()
        .or(config.backoff_policy.as_ref())
        .map(|p| p.clone_policy())
        .unwrap_or_else(|| Box::new(defaults::backoff_policy()));
    ResolvedOptions {
        retry_policy,
        backoff_policy,
        attempt_timeout: options.attempt_timeout.or(config.attempt_timeout),
        cancellation: options.cancellation.clone().unwrap_or_default(),
        metadata: options.metadata.clone(),
    }
}
