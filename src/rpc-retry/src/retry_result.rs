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

//! Retry loop control types.
//!
//! Applications only need to use these types when implementing their own
//! retry policies, and then only if they override
//! [on_error][crate::retry_policy::RetryPolicy::on_error].

use crate::error::Error;

/// The decision made by a retry policy after a failed attempt.
///
/// # Example
///
/// ```
/// # use cloud_rpc_retry::error::Error;
/// # use cloud_rpc_retry::retry_policy::RetryPolicy;
/// # use cloud_rpc_retry::retry_result::RetryResult;
/// #[derive(Clone, Debug, Default)]
/// struct MyRetryPolicy { failures: u32 }
/// impl RetryPolicy for MyRetryPolicy {
///     fn clone_policy(&self) -> Box<dyn RetryPolicy> { Box::new(Self::default()) }
///     fn on_failure(&mut self, _error: &Error) -> bool {
///         self.failures += 1;
///         !self.is_exhausted()
///     }
///     fn is_exhausted(&self) -> bool { self.failures > 42 }
///     fn is_permanent_failure(&self, _error: &Error) -> bool { false }
///     fn on_error(&mut self, error: Error) -> RetryResult {
///         if self.on_failure(&error) {
///             return RetryResult::Continue(error);
///         }
///         RetryResult::Exhausted(error)
///     }
/// }
/// ```
#[derive(Debug)]
pub enum RetryResult {
    /// The error is non-retryable, stop the loop.
    Permanent(Error),

    /// The error is retryable, but the policy is stopping the loop.
    ///
    /// Retry policies may stop the loop on retryable errors, for example,
    /// because the policy only allows a limited number of failures.
    Exhausted(Error),

    /// The error was retryable, continue the loop.
    Continue(Error),
}

impl RetryResult {
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted(_))
    }
    pub fn is_continue(&self) -> bool {
        matches!(self, Self::Continue(_))
    }

    /// Returns the error that triggered the decision.
    pub fn into_error(self) -> Error {
        match self {
            Self::Permanent(e) | Self::Exhausted(e) | Self::Continue(e) => e,
        }
    }
}
