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

//! Produces the terminal error for a logical call.
//!
//! The retry loop absorbs transient failures. Only the final error crosses
//! the boundary to the application, and that error carries the label of the
//! operation that failed, for example `ListTables`, together with the last
//! status code, message and details.

use super::Error;
use super::rpc::Status;

/// Labels a terminal error with the operation that failed.
///
/// The [Display][std::fmt::Display] implementation of the returned error
/// starts with the output of [describe].
///
/// # Example
/// ```
/// use cloud_rpc_retry::error::{Error, report::report};
/// use cloud_rpc_retry::error::rpc::{Code, Status};
/// let last = Status::default().set_code(Code::Unavailable).set_message("try-again");
/// let error = report("ListTables", Error::exhausted(Error::service(last)));
/// assert_eq!(error.operation(), Some("ListTables"));
/// let message = error.to_string();
/// assert!(message.starts_with("ListTables: code=UNAVAILABLE(14)"), "{message}");
/// ```
pub fn report<T: Into<String>>(label: T, error: Error) -> Error {
    error.set_operation(label)
}

/// Formats a status for diagnostics.
///
/// The output is deterministic: the label, the code name and number, the
/// message, and the details in the order they appear in the status.
///
/// # Example
/// ```
/// use cloud_rpc_retry::error::report::describe;
/// use cloud_rpc_retry::error::rpc::{Code, Status};
/// let status = Status::default().set_code(Code::NotFound).set_message("missing");
/// assert_eq!(
///     describe("GetTable", &status),
///     r#"GetTable: code=NOT_FOUND(5), message="missing", details=[]"#
/// );
/// ```
pub fn describe(label: &str, status: &Status) -> String {
    let details = status
        .details
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("; ");
    format!(
        "{label}: code={}({}), message=\"{}\", details=[{details}]",
        status.code,
        i32::from(status.code),
        status.message
    )
}
