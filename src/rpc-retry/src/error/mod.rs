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

//! The error types returned by the retry core.
//!
//! The retry loop, the paginator, and the invoker report every terminal
//! failure as an [Error]. Service errors carry a [Status][rpc::Status] with
//! the canonical error code, a message, and any details returned by the
//! service.
//!
//! # Example
//! ```
//! use cloud_rpc_retry::error::Error;
//! use cloud_rpc_retry::error::rpc::{Code, Status};
//! fn handle_error(e: Error) {
//!     if let Some(status) = e.status() {
//!         if status.code == Code::NotFound {
//!             println!("cannot find the thing: {e}");
//!         }
//!     }
//! }
//! ```

mod core_error;
pub use core_error::*;

/// The [Status][rpc::Status] model and canonical error codes.
pub mod rpc;

pub mod report;
