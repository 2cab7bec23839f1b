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

use http::HeaderMap;
use std::time::Duration;
use tokio::time::Instant;

/// The information handed to each attempt of a logical call.
///
/// The retry loop creates a new instance for every attempt. The retry and
/// backoff policies may adjust it in their `setup()` functions before the
/// attempt starts, for example, to shorten the attempt timeout so it does not
/// exceed the time left in the retry budget.
///
/// This struct may gain new fields in future versions of the library.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct AttemptContext {
    /// The number of this attempt, starting at 1.
    pub attempt_count: u32,

    /// The start time for the retry loop.
    pub loop_start: Instant,

    /// The maximum time for this attempt, if any.
    pub attempt_timeout: Option<Duration>,

    /// The label of the operation, for example `ListTables`.
    pub operation: String,

    /// Metadata sent with the request.
    pub metadata: HeaderMap,
}

impl AttemptContext {
    /// Creates a context for the first attempt of `operation`.
    pub fn new<T: Into<String>>(operation: T) -> Self {
        Self::default().set_operation(operation)
    }

    /// Update the attempt count, useful in mocks.
    pub fn set_attempt_count<T: Into<u32>>(mut self, v: T) -> Self {
        self.attempt_count = v.into();
        self
    }

    /// Update the loop start time, useful in mocks.
    pub fn set_loop_start<T: Into<Instant>>(mut self, v: T) -> Self {
        self.loop_start = v.into();
        self
    }

    /// Sets the attempt timeout.
    pub fn set_attempt_timeout<T: Into<Duration>>(mut self, v: T) -> Self {
        self.attempt_timeout = Some(v.into());
        self
    }

    /// Sets the operation label.
    pub fn set_operation<T: Into<String>>(mut self, v: T) -> Self {
        self.operation = v.into();
        self
    }

    /// Sets the request metadata.
    pub fn set_metadata(mut self, v: HeaderMap) -> Self {
        self.metadata = v;
        self
    }

    /// Shortens the attempt timeout to at most `limit`.
    ///
    /// A context without an attempt timeout gets `limit` as its timeout.
    pub fn limit_attempt_timeout(&mut self, limit: Duration) {
        self.attempt_timeout = Some(
            self.attempt_timeout
                .map_or(limit, |current| current.min(limit)),
        );
    }
}

impl std::default::Default for AttemptContext {
    fn default() -> Self {
        Self {
            attempt_count: 1,
            loop_start: Instant::now(),
            attempt_timeout: None,
            operation: String::new(),
            metadata: HeaderMap::new(),
        }
    }
}
