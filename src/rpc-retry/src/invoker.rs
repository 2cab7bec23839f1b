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

//! The invoker wraps single-attempt RPC functions with the retry loop.
//!
//! Client libraries provide the attempt as a function taking the
//! [AttemptContext] and the request. The function performs exactly one round
//! trip and must not retry. The [Invoker] resolves the options for each
//! logical call, creates fresh copies of the retry and backoff policies, and
//! runs the retry loop. Terminal errors are labeled with the operation name,
//! see [report][crate::error::report::report].

use crate::Result;
use crate::attempt_context::AttemptContext;
use crate::channel::CompletionHook;
use crate::error::Error;
use crate::error::report::report;
use crate::options::{ClientConfig, RequestOptions, ResolvedOptions, resolve};
use crate::paginator::{ItemPaginator, PageableRequest, PageableResponse, Paginator};
use crate::retry_loop::{RetryLoopParams, retry_loop};
use futures::TryStreamExt;
use std::future::Future;
use std::sync::Arc;

/// Runs RPCs with the configured retry and backoff policies.
///
/// An invoker is cheap to clone. Concurrent calls through the same invoker,
/// or its clones, never share retry state.
///
/// # Example
/// ```
/// # use cloud_rpc_retry::Result;
/// # use cloud_rpc_retry::attempt_context::AttemptContext;
/// # use cloud_rpc_retry::error::{Error, rpc::{Code, Status}};
/// # use cloud_rpc_retry::invoker::Invoker;
/// # use cloud_rpc_retry::options::{ClientConfig, RequestOptions};
/// # use cloud_rpc_retry::retry_policy::{Aip194Strict, RetryPolicyExt};
/// # tokio_test::block_on(async {
/// let invoker = Invoker::new(
///     ClientConfig::new().set_retry_policy(Aip194Strict.with_error_limit(0)),
/// );
/// let response: Result<()> = invoker
///     .call_with_retry(
///         |_: AttemptContext, _: ()| async {
///             let status = Status::default()
///                 .set_code(Code::Unavailable)
///                 .set_message("try-again");
///             Err(Error::service(status))
///         },
///         (),
///         "DeleteTable",
///         RequestOptions::default(),
///     )
///     .await;
/// let error = response.unwrap_err();
/// assert_eq!(error.operation(), Some("DeleteTable"));
/// assert!(error.to_string().starts_with("DeleteTable: code=UNAVAILABLE(14)"));
/// # });
/// ```
#[derive(Clone, Debug, Default)]
pub struct Invoker {
    config: ClientConfig,
    hook: Option<Arc<dyn CompletionHook>>,
}

impl Invoker {
    /// Creates an invoker with the given client configuration.
    pub fn new(config: ClientConfig) -> Self {
        Self { config, hook: None }
    }

    /// Configures a hook called once per attempt with the attempt status.
    ///
    /// Use this to invalidate cached transport state, such as a
    /// [LazyChannel][crate::channel::LazyChannel], after failures.
    pub fn set_completion_hook<H: CompletionHook + 'static>(mut self, hook: Arc<H>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// The client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Runs `attempt` until it succeeds, fails permanently, or the retry
    /// policy is exhausted.
    ///
    /// Each attempt receives a copy of `request`. The operation is retried
    /// regardless of its idempotency. Operations that are not safe to retry
    /// should set [NeverRetry][crate::retry_policy::NeverRetry] in `options`.
    pub async fn call_with_retry<Req, Resp, A, F>(
        &self,
        attempt: A,
        request: Req,
        label: &str,
        options: RequestOptions,
    ) -> Result<Resp>
    where
        Req: Clone,
        A: Fn(AttemptContext, Req) -> F,
        F: Future<Output = Result<Resp>>,
    {
        let mut resolved = resolve(&self.config, &options);
        execute(&attempt, &request, label, self.hook.as_deref(), &mut resolved)
            .await
            .map_err(|e| failed(label, e))
    }

    /// Returns the pages of a list operation as a stream.
    ///
    /// The stream always starts at the first page, any page token in
    /// `request` is ignored. All the pages share the same copies of the retry
    /// and backoff policies, created when the first page is requested. A page
    /// that fails with a transient error is requested again, with the same
    /// page token. The stream ends after the first page with an empty next
    /// page token, or after the first terminal error.
    pub fn paginator<Req, Resp, A, F>(
        &self,
        attempt: A,
        mut request: Req,
        label: &str,
        options: RequestOptions,
    ) -> Paginator<Resp, Error>
    where
        Req: PageableRequest + Send + Sync + 'static,
        Resp: PageableResponse + Send + 'static,
        A: Fn(AttemptContext, Req) -> F + Send + Sync + 'static,
        F: Future<Output = Result<Resp>> + Send + 'static,
    {
        request.set_page_token(String::new());
        let state = ListState {
            attempt,
            request,
            label: label.to_string(),
            hook: self.hook.clone(),
            config: self.config.clone(),
            options,
            resolved: None,
        };
        Paginator::with_state(String::new(), state, fetch_page::<Req, Resp, A, F>)
    }

    /// Returns the items of all the pages in a list operation as a stream.
    pub fn items<Req, Resp, A, F>(
        &self,
        attempt: A,
        request: Req,
        label: &str,
        options: RequestOptions,
    ) -> ItemPaginator<Resp::PageItem, Error>
    where
        Req: PageableRequest + Send + Sync + 'static,
        Resp: PageableResponse + Send + 'static,
        Resp::PageItem: Send + 'static,
        A: Fn(AttemptContext, Req) -> F + Send + Sync + 'static,
        F: Future<Output = Result<Resp>> + Send + 'static,
    {
        self.paginator(attempt, request, label, options).items()
    }

    /// Collects the items of all the pages in a list operation.
    ///
    /// Items are returned in order, each item exactly once, even if some
    /// pages were requested more than once.
    pub async fn list_paged<Req, Resp, A, F>(
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
        A: Fn(AttemptContext, Req) -> F + Send + Sync + 'static,
        F: Future<Output = Result<Resp>> + Send + 'static,
    {
        self.items(attempt, request, label, options)
            .try_collect()
            .await
    }
}

struct ListState<A, Req> {
    attempt: A,
    request: Req,
    label: String,
    hook: Option<Arc<dyn CompletionHook>>,
    config: ClientConfig,
    options: RequestOptions,
    resolved: Option<ResolvedOptions>,
}

async fn fetch_page<Req, Resp, A, F>(
    mut state: ListState<A, Req>,
    token: String,
) -> (ListState<A, Req>, Result<Resp>)
where
    Req: PageableRequest,
    A: Fn(AttemptContext, Req) -> F,
    F: Future<Output = Result<Resp>>,
{
    let mut request = state.request.clone();
    request.set_page_token(token);
    let resolved = state
        .resolved
        .get_or_insert_with(|| resolve(&state.config, &state.options));
    let page = execute(
        &state.attempt,
        &request,
        &state.label,
        state.hook.as_deref(),
        resolved,
    )
    .await
    .map_err(|e| failed(&state.label, e));
    (state, page)
}

async fn execute<Req, Resp, A, F>(
    attempt: &A,
    request: &Req,
    label: &str,
    hook: Option<&dyn CompletionHook>,
    resolved: &mut ResolvedOptions,
) -> Result<Resp>
where
    Req: Clone,
    A: Fn(AttemptContext, Req) -> F,
    F: Future<Output = Result<Resp>>,
{
    let mut context = AttemptContext::new(label).set_metadata(resolved.metadata.clone());
    context.attempt_timeout = resolved.attempt_timeout;
    let params = RetryLoopParams::new(
        resolved.retry_policy.as_mut(),
        resolved.backoff_policy.as_mut(),
    )
    .set_context(context)
    .set_cancellation_token(resolved.cancellation.clone());
    let params = match hook {
        Some(h) => params.set_hook(h),
        None => params,
    };
    retry_loop(
        |context| attempt(context, request.clone()),
        tokio::time::sleep,
        params,
    )
    .await
}

fn failed(label: &str, error: Error) -> Error {
    let error = report(label, error);
    tracing::warn!(operation = label, %error, "call failed");
    error
}
