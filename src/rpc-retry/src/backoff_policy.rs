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

//! Defines traits for backoff policies and a common implementation.
//!
//! The retry loop should avoid immediately retrying an RPC, as the service
//! may need time to recover. [Exponential backoff] is a well known algorithm
//! to find an acceptable delay between retries.
//!
//! Backoff policies hold mutable state, the delay grows with each failure.
//! The invoker creates a fresh copy of the configured policy, using
//! [clone_policy][BackoffPolicy::clone_policy], for each logical call.
//!
//! # Example
//! ```
//! # use cloud_rpc_retry::options::ClientConfig;
//! use cloud_rpc_retry::exponential_backoff::{Error, ExponentialBackoffBuilder};
//! use std::time::Duration;
//!
//! fn configure_backoff(config: ClientConfig) -> Result<ClientConfig, Error> {
//!     let policy = ExponentialBackoffBuilder::new()
//!         .with_initial_delay(Duration::from_millis(100))
//!         .with_maximum_delay(Duration::from_secs(5))
//!         .with_scaling(4.0)
//!         .build()?;
//!     Ok(config.set_backoff_policy(policy))
//! }
//! ```
//!
//! [Exponential backoff]: https://en.wikipedia.org/wiki/Exponential_backoff

use crate::attempt_context::AttemptContext;
use crate::error::Error;
use std::sync::Arc;
use std::time::Duration;

/// Defines the trait implemented by all backoff strategies.
pub trait BackoffPolicy: Send + Sync + std::fmt::Debug {
    /// Returns a copy of this policy with its initial state.
    fn clone_policy(&self) -> Box<dyn BackoffPolicy>;

    /// Adjusts the context before each attempt.
    ///
    /// The default implementation does nothing.
    fn setup(&self, _context: &mut AttemptContext) {}

    /// Returns the delay before the next attempt.
    ///
    /// The retry loop calls this function after each failed attempt that the
    /// retry policy allows to continue. Implementations update their state,
    /// typically growing the next delay.
    ///
    /// # Parameters
    /// * `error` - the error returned by the last attempt.
    fn on_completion(&mut self, error: &Error) -> Duration;
}

/// A helper type to use [BackoffPolicy] in client and request options.
#[derive(Clone, Debug)]
pub struct BackoffPolicyArg(pub(crate) Arc<dyn BackoffPolicy>);

impl BackoffPolicyArg {
    /// Returns a copy of the policy with its initial state.
    pub fn clone_policy(&self) -> Box<dyn BackoffPolicy> {
        self.0.clone_policy()
    }
}

impl<T: BackoffPolicy + 'static> std::convert::From<T> for BackoffPolicyArg {
    fn from(value: T) -> Self {
        Self(Arc::new(value))
    }
}

impl std::convert::From<Arc<dyn BackoffPolicy>> for BackoffPolicyArg {
    fn from(value: Arc<dyn BackoffPolicy>) -> Self {
        Self(value)
    }
}
