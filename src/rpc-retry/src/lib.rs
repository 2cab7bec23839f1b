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

//! Retry, backoff, and pagination core for Cloud client libraries.
//!
//! This crate decides, for an arbitrary RPC, whether a failure is transient,
//! how long to wait before the next attempt, when to give up, and how to turn
//! a paginated list RPC into a single sequence of results. Client libraries
//! provide the attempt itself, as a closure that performs exactly one round
//! trip, and this crate wraps it with the configured policies.
//!
//! Every logical call clones the configured [retry][retry_policy::RetryPolicy]
//! and [backoff][backoff_policy::BackoffPolicy] policies, concurrent calls
//! never share mutable retry state.
//!
//! # Example
//! ```
//! # use cloud_rpc_retry::Result;
//! use cloud_rpc_retry::attempt_context::AttemptContext;
//! use cloud_rpc_retry::invoker::Invoker;
//! use cloud_rpc_retry::options::{ClientConfig, RequestOptions};
//! use cloud_rpc_retry::retry_policy::{Aip194Strict, RetryPolicyExt};
//!
//! async fn get_table(_: AttemptContext, name: String) -> Result<String> {
//!     Ok(format!("table {name}"))
//! }
//!
//! # tokio_test::block_on(async {
//! let config = ClientConfig::default()
//!     .set_retry_policy(Aip194Strict.with_error_limit(3));
//! let invoker = Invoker::new(config);
//! let table = invoker
//!     .call_with_retry(get_table, "t1".to_string(), "GetTable", RequestOptions::default())
//!     .await?;
//! assert_eq!(table, "table t1");
//! # Ok::<(), cloud_rpc_retry::error::Error>(()) });
//! ```

/// An alias of [std::result::Result] where the error is always [crate::error::Error].
///
/// This is the result type used by all functions wrapping RPCs.
pub type Result<T> = std::result::Result<T, crate::error::Error>;

/// The core error types used by the retry loop and the paginator.
pub mod error;

/// Per-attempt information handed to the attempt closure.
pub mod attempt_context;

pub mod backoff_policy;
pub mod exponential_backoff;
pub mod retry_policy;
pub mod retry_result;

/// The retry loop shared by unary calls and each page of a list call.
pub mod retry_loop;

/// Defines some types and traits to convert and use List RPCs as a Stream.
pub mod paginator;

pub mod options;

/// Runs RPCs with the configured policies.
pub mod invoker;

/// A blocking boundary over the [invoker].
pub mod blocking;

/// Shared transport state refreshed from the completion hook.
pub mod channel;

#[cfg(test)]
mod mock_rng;
