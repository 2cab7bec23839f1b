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

use crate::Result;
use crate::attempt_context::AttemptContext;
use crate::channel::CompletionHook;
use crate::options::{ClientConfig, RequestOptions};
use crate::paginator::{PageableRequest, PageableResponse};
use std::sync::Arc;

/// Runs RPCs on the calling thread.
///
/// This is the same algorithm as [crate::invoker::Invoker], the calling thread
/// is suspended during the backoff delays. The invoker owns a single-threaded
/// runtime, its functions must not be called from an async context.
///
/// Attempts run on the calling thread. Attempt timeouts cannot interrupt a
/// blocking attempt, the attempt function is responsible for its own I/O
/// timeouts.
///
/// # Example
/// ```
/// # use cloud_rpc_retry::attempt_context::AttemptContext;
/// # use cloud_rpc_retry::blocking::Invoker;
/// # use cloud_rpc_retry::options::{ClientConfig, RequestOptions};
/// # fn main() -> anyhow::Result<()> {
/// let invoker = Invoker::new(ClientConfig::default())?;
/// let response = invoker.call_with_retry(
///     |context: AttemptContext, request: String| {
///         Ok(format!("{request} {}", context.attempt_count))
///     },
///     "attempt".to_string(),
///     "Echo",
///     RequestOptions::default(),
/// )?;
/// assert_eq!(response, "attempt 1");
/// # Ok(()) }
/// ```
#[derive(Debug)]
pub struct Invoker {
    inner: crate::invoker::Invoker,
    runtime: tokio::runtime::Runtime,
}

impl Invoker {
    /// Creates an invoker with the given client configuration.
    pub fn new(config: ClientConfig) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        Ok(Self {
            inner: crate::invoker::Invoker::new(config),
            runtime,
        })
    }

    /// Configures a hook called once per attempt with the attempt status.
    pub fn set_completion_hook<H: CompletionHook + 'static>(mut self, hook: Arc<H>) -> Self {
        self.inner = self.inner.set_completion_hook(hook);
        self
    }

    /// Runs `attempt` until it succeeds, fails permanently, or the retry
    /// policy is exhausted.
    pub fn call_with_retry<Req, Resp, A>(
        &self,
        attempt: A,
        request: Req,
        label: &str,
        options: RequestOptions,
    ) -> Result<Resp>
    where
        Req: Clone,
        A: Fn(AttemptContext, Req) -> Result<Resp>,
    {
        self.runtime.block_on(self.inner.call_with_retry(
            |context, request| std::future::ready(attempt(context, request)),
            request,
            label,
            options,
        ))
    }

    /// Collects the items of all the pages in a list operation.
    ///
    /// The list always starts at the first page, any page token in `request`
    /// is ignored.
    pub fn list_paged<Req, Resp, A>(
        &self,
        attempt: A,
        request: Req,
        label: &str,
        options: RequestOptions,
    ) -> Result<Vec<Resp::PageItem>>
    where
        Req: PageableRequest + Send + Sync + 'static,
        Resp: PageableResponse + Send + 'static,
        Resp::PageItem: Send + 'static,
        A: Fn(AttemptContext, Req) -> Result<Resp> + Send + Sync + 'static,
    {
        self.runtime.block_on(self.inner.list_paged(
            move |context, request| std::future::ready(attempt(context, request)),
            request,
            label,
            options,
        ))
    }
}
