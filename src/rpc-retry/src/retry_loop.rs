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
use crate::backoff_policy::BackoffPolicy;
use crate::channel::CompletionHook;
use crate::error::Error;
use crate::error::rpc::Status;
use crate::retry_policy::RetryPolicy;
use crate::retry_result::RetryResult;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// The policies and collaborators used by one run of the retry loop.
///
/// The policies are borrowed mutably, the caller owns the fresh copies
/// created for the logical call. A paginator reuses the same copies for every
/// page in the list operation.
#[derive(Debug)]
#[non_exhaustive]
pub struct RetryLoopParams<'a> {
    /// The template for each attempt's context.
    ///
    /// The loop overwrites the attempt count and the loop start time.
    pub context: AttemptContext,
    pub retry_policy: &'a mut dyn RetryPolicy,
    pub backoff_policy: &'a mut dyn BackoffPolicy,
    /// Called once per attempt, with the status of the attempt.
    pub hook: Option<&'a dyn CompletionHook>,
    pub cancellation: CancellationToken,
}

impl<'a> RetryLoopParams<'a> {
    pub fn new(
        retry_policy: &'a mut dyn RetryPolicy,
        backoff_policy: &'a mut dyn BackoffPolicy,
    ) -> Self {
        Self {
            context: AttemptContext::default(),
            retry_policy,
            backoff_policy,
            hook: None,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn set_context(mut self, v: AttemptContext) -> Self {
        self.context = v;
        self
    }

    pub fn set_hook(mut self, v: &'a dyn CompletionHook) -> Self {
        self.hook = Some(v);
        self
    }

    pub fn set_cancellation_token(mut self, v: CancellationToken) -> Self {
        self.cancellation = v;
        self
    }
}

/// Runs the retry loop for a given function.
///
/// This functions calls an inner function as long as (1) the retry policy
/// allows more attempts, (2) the inner function has not returned a successful
/// response, and (3) the operation is not cancelled.
///
/// In between calls the function waits the amount of time prescribed by the
/// backoff policy, using `sleep` to implement any sleep. The loop never
/// sleeps past the deadline of a time-based retry policy, it returns an
/// [exhausted][Error::is_exhausted] error instead.
///
/// # Example
/// ```
/// # use cloud_rpc_retry::attempt_context::AttemptContext;
/// # use cloud_rpc_retry::retry_loop::{retry_loop, RetryLoopParams};
/// # use cloud_rpc_retry::exponential_backoff::ExponentialBackoff;
/// # use cloud_rpc_retry::retry_policy::LimitedErrorCount;
/// # tokio_test::block_on(async {
/// let mut retry = LimitedErrorCount::new(3);
/// let mut backoff = ExponentialBackoff::default();
/// let response = retry_loop(
///     |context: AttemptContext| async move { Ok(format!("attempt {}", context.attempt_count)) },
///     tokio::time::sleep,
///     RetryLoopParams::new(&mut retry, &mut backoff),
/// )
/// .await?;
/// assert_eq!(response, "attempt 1");
/// # Ok::<(), cloud_rpc_retry::error::Error>(()) });
/// ```
pub async fn retry_loop<F, Fut, S, SFut, Response>(
    mut inner: F,
    sleep: S,
    params: RetryLoopParams<'_>,
) -> Result<Response>
where
    F: FnMut(AttemptContext) -> Fut,
    Fut: Future<Output = Result<Response>>,
    S: Fn(Duration) -> SFut,
    SFut: Future<Output = ()>,
{
    let RetryLoopParams {
        context: template,
        retry_policy,
        backoff_policy,
        hook,
        cancellation,
    } = params;
    let loop_start = Instant::now();
    let mut attempt_count = 0_u32;
    loop {
        attempt_count = attempt_count.saturating_add(1);
        let mut context = template
            .clone()
            .set_attempt_count(attempt_count)
            .set_loop_start(loop_start);
        retry_policy.setup(&mut context);
        backoff_policy.setup(&mut context);
        if cancellation.is_cancelled() {
            return Err(cancelled(&template.operation, attempt_count));
        }
        let attempt_timeout = context.attempt_timeout;
        let attempt = with_timeout(attempt_timeout, inner(context));
        let result = tokio::select! {
            biased;
            _ = cancellation.cancelled() => {
                return Err(cancelled(&template.operation, attempt_count));
            }
            r = attempt => r,
        };
        if let Some(hook) = hook {
            match &result {
                Ok(_) => hook.on_completion(&Status::ok()),
                Err(e) => hook.on_completion(&Status::from(e)),
            }
        }
        let error = match result {
            Ok(response) => return Ok(response),
            Err(e) => e,
        };
        let error = match retry_policy.on_error(error) {
            RetryResult::Permanent(e) => return Err(e),
            RetryResult::Exhausted(e) => return Err(Error::exhausted(e)),
            RetryResult::Continue(e) => e,
        };
        let delay = backoff_policy.on_completion(&error);
        if retry_policy
            .remaining_time()
            .is_some_and(|remaining| remaining < delay)
        {
            return Err(Error::exhausted(error));
        }
        tracing::debug!(
            operation = %template.operation,
            attempt_count,
            ?delay,
            %error,
            "retrying after a transient error"
        );
        tokio::select! {
            biased;
            _ = cancellation.cancelled() => {
                return Err(cancelled(&template.operation, attempt_count));
            }
            _ = sleep(delay) => {},
        }
    }
}

async fn with_timeout<Fut, Response>(timeout: Option<Duration>, attempt: Fut) -> Result<Response>
where
    Fut: Future<Output = Result<Response>>,
{
    match timeout {
        None => attempt.await,
        Some(t) => match tokio::time::timeout(t, attempt).await {
            Ok(r) => r,
            Err(elapsed) => Err(Error::timeout(elapsed)),
        },
    }
}

fn cancelled(operation: &str, attempt_count: u32) -> Error {
    tracing::debug!(operation, attempt_count, "operation cancelled");
    Error::cancelled(format!(
        "cancelled by the caller after {} attempt(s)",
        attempt_count.saturating_sub(1)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff_policy::tests::MockBackoff;
    use crate::error::rpc::Code;
    use crate::retry_policy::tests::{MockPolicy, permission_denied, unavailable};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    struct RecordingHook(Mutex<Vec<Code>>);

    impl CompletionHook for RecordingHook {
        fn on_completion(&self, status: &Status) {
            self.0.lock().expect("poisoned").push(status.code);
        }
    }

    async fn no_sleep(_: Duration) {}

    async fn panic_sleep(_: Duration) {
        panic!("the loop should not sleep")
    }

    fn unexpected_attempt() -> Error {
        panic!("the attempt should not start")
    }

    #[tokio::test]
    async fn immediate_success() -> anyhow::Result<()> {
        let mut retry = MockPolicy::new();
        retry.expect_remaining_time().return_const(None);
        let mut backoff = MockBackoff::new();
        backoff.expect_on_completion().never();
        let hook = RecordingHook::default();

        let response = retry_loop(
            |context: AttemptContext| async move { Ok(context.attempt_count) },
            no_sleep,
            RetryLoopParams::new(&mut retry, &mut backoff).set_hook(&hook),
        )
        .await?;
        assert_eq!(response, 1);
        assert_eq!(*hook.0.lock().expect("poisoned"), vec![Code::Ok]);
        Ok(())
    }

    #[tokio::test]
    async fn immediate_failure() -> anyhow::Result<()> {
        let mut retry = MockPolicy::new();
        retry.expect_remaining_time().return_const(None);
        retry.expect_on_failure().once().return_const(false);
        retry.expect_is_permanent_failure().once().return_const(true);
        let mut backoff = MockBackoff::new();
        backoff.expect_on_completion().never();
        let hook = RecordingHook::default();

        let response = retry_loop(
            |_| async { Err::<(), _>(permission_denied()) },
            no_sleep,
            RetryLoopParams::new(&mut retry, &mut backoff).set_hook(&hook),
        )
        .await;
        let err = response.expect_err("should fail");
        assert!(!err.is_exhausted(), "{err:?}");
        assert_eq!(err.status().map(|s| s.code), Some(Code::PermissionDenied));
        assert_eq!(*hook.0.lock().expect("poisoned"), vec![Code::PermissionDenied]);
        Ok(())
    }

    #[tokio::test]
    async fn retry_success() -> anyhow::Result<()> {
        let mut retry = MockPolicy::new();
        retry.expect_remaining_time().return_const(None);
        retry.expect_on_failure().times(2).return_const(true);
        let mut backoff_seq = mockall::Sequence::new();
        let mut backoff = MockBackoff::new();
        for d in 1..=2 {
            backoff
                .expect_on_completion()
                .once()
                .in_sequence(&mut backoff_seq)
                .return_const(Duration::from_millis(d));
        }
        let delays = Arc::new(Mutex::new(Vec::new()));
        let sleep = {
            let delays = delays.clone();
            move |d: Duration| {
                delays.lock().expect("poisoned").push(d);
                async {}
            }
        };
        let hook = RecordingHook::default();

        let response = retry_loop(
            |context: AttemptContext| async move {
                if context.attempt_count < 3 {
                    return Err(unavailable());
                }
                Ok(context.attempt_count)
            },
            sleep,
            RetryLoopParams::new(&mut retry, &mut backoff).set_hook(&hook),
        )
        .await?;
        assert_eq!(response, 3);
        assert_eq!(
            *delays.lock().expect("poisoned"),
            vec![Duration::from_millis(1), Duration::from_millis(2)]
        );
        assert_eq!(
            *hook.0.lock().expect("poisoned"),
            vec![Code::Unavailable, Code::Unavailable, Code::Ok]
        );
        Ok(())
    }

    #[tokio::test]
    async fn exhausted_wraps_last_error() -> anyhow::Result<()> {
        let mut retry = MockPolicy::new();
        retry.expect_remaining_time().return_const(None);
        retry.expect_on_failure().once().return_const(false);
        retry.expect_is_permanent_failure().once().return_const(false);
        let mut backoff = MockBackoff::new();
        backoff.expect_on_completion().never();

        let response = retry_loop(
            |_| async { Err::<(), _>(unavailable()) },
            no_sleep,
            RetryLoopParams::new(&mut retry, &mut backoff),
        )
        .await;
        let err = response.expect_err("should fail");
        assert!(err.is_exhausted(), "{err:?}");
        assert_eq!(err.status().map(|s| s.code), Some(Code::Unavailable));
        Ok(())
    }

    #[tokio::test]
    async fn no_sleep_past_deadline() -> anyhow::Result<()> {
        let mut retry = MockPolicy::new();
        retry
            .expect_remaining_time()
            .return_const(Some(Duration::from_secs(1)));
        retry.expect_on_failure().once().return_const(true);
        let mut backoff = MockBackoff::new();
        backoff
            .expect_on_completion()
            .once()
            .return_const(Duration::from_secs(2));
        let response = retry_loop(
            |_| async { Err::<(), _>(unavailable()) },
            panic_sleep,
            RetryLoopParams::new(&mut retry, &mut backoff),
        )
        .await;
        let err = response.expect_err("should fail");
        assert!(err.is_exhausted(), "{err:?}");
        Ok(())
    }

    #[tokio::test]
    async fn setup_called_per_attempt() -> anyhow::Result<()> {
        let mut retry = MockPolicy::new();
        retry
            .expect_remaining_time()
            .return_const(Some(Duration::from_secs(30)));
        retry.expect_on_failure().return_const(true);
        let mut backoff = MockBackoff::new();
        backoff.expect_on_completion().return_const(Duration::ZERO);

        let context = AttemptContext::new("GetTable").set_attempt_timeout(Duration::from_secs(60));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        let response = retry_loop(
            |context: AttemptContext| {
                recorder.lock().expect("poisoned").push((
                    context.attempt_count,
                    context.attempt_timeout,
                    context.operation.clone(),
                ));
                async move {
                    if context.attempt_count < 2 {
                        return Err(unavailable());
                    }
                    Ok(())
                }
            },
            no_sleep,
            RetryLoopParams::new(&mut retry, &mut backoff).set_context(context),
        )
        .await;
        assert!(response.is_ok(), "{response:?}");
        let want = (1..=2)
            .map(|n| (n, Some(Duration::from_secs(30)), "GetTable".to_string()))
            .collect::<Vec<_>>();
        assert_eq!(*seen.lock().expect("poisoned"), want);
        Ok(())
    }

    #[tokio::test]
    async fn cancelled_before_start() -> anyhow::Result<()> {
        let mut retry = MockPolicy::new();
        retry.expect_remaining_time().return_const(None);
        let mut backoff = MockBackoff::new();
        let token = CancellationToken::new();
        token.cancel();

        let response = retry_loop(
            |_| async { Err::<(), _>(unexpected_attempt()) },
            no_sleep,
            RetryLoopParams::new(&mut retry, &mut backoff).set_cancellation_token(token),
        )
        .await;
        let err = response.expect_err("should fail");
        assert!(err.is_cancelled(), "{err:?}");
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_timeout() -> anyhow::Result<()> {
        let mut retry = MockPolicy::new();
        retry.expect_remaining_time().return_const(None);
        retry.expect_on_failure().once().return_const(false);
        retry.expect_is_permanent_failure().once().return_const(true);
        let mut backoff = MockBackoff::new();
        let hook = RecordingHook::default();

        let context = AttemptContext::default().set_attempt_timeout(Duration::from_secs(1));
        let response = retry_loop(
            |_| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            },
            tokio::time::sleep,
            RetryLoopParams::new(&mut retry, &mut backoff)
                .set_context(context)
                .set_hook(&hook),
        )
        .await;
        let err = response.expect_err("should fail");
        assert!(err.is_timeout(), "{err:?}");
        assert_eq!(*hook.0.lock().expect("poisoned"), vec![Code::DeadlineExceeded]);
        Ok(())
    }
}
