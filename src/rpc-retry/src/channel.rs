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

//! Shared transport state and the per-attempt completion hook.
//!
//! The retry core does not create channels or refresh credentials. It calls a
//! [CompletionHook] once per attempt, with the status of the attempt, so the
//! owner of the transport state can discard a broken channel. The next attempt
//! then creates a new one.
//!
//! [LazyChannel] is a ready-to-use implementation: it creates the channel on
//! first use, shares it across concurrent calls, and invalidates it when an
//! attempt fails with one of the configured codes.
//!
//! # Example
//! ```
//! # use cloud_rpc_retry::channel::{CompletionHook, LazyChannel};
//! # use cloud_rpc_retry::error::rpc::{Code, Status};
//! # fn main() -> cloud_rpc_retry::Result<()> {
//! #[derive(Debug)]
//! struct Channel { endpoint: String }
//!
//! let lazy = LazyChannel::new(|| Ok(Channel { endpoint: "https://example.com".into() }));
//! let channel = lazy.get()?;
//! assert_eq!(channel.endpoint, "https://example.com");
//! lazy.on_completion(&Status::default().set_code(Code::Unavailable));
//! assert!(!lazy.is_connected());
//! # Ok(()) }
//! ```

use crate::Result;
use crate::error::rpc::{Code, Status};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Receives the status of each attempt.
///
/// The retry loop calls this hook exactly once per completed attempt, with
/// [Status::ok()] on success. Attempts interrupted by cancellation are not
/// reported.
pub trait CompletionHook: Send + Sync + std::fmt::Debug {
    fn on_completion(&self, status: &Status);
}

type Factory<C> = dyn Fn() -> Result<C> + Send + Sync;

/// A channel created on first use and discarded after failures.
///
/// Concurrent callers share the same channel. Creating a channel does not hold
/// the lock, if two callers race to create the first channel, the first one to
/// store it wins and the other one discards its copy.
pub struct LazyChannel<C> {
    factory: Box<Factory<C>>,
    channel: Mutex<Option<Arc<C>>>,
    invalidate_on: BTreeSet<Code>,
}

impl<C> LazyChannel<C> {
    /// Creates a new instance using `factory` to create channels.
    ///
    /// By default, the channel is invalidated after attempts failing with
    /// `UNAVAILABLE` or `UNAUTHENTICATED`.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<C> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            channel: Mutex::new(None),
            invalidate_on: BTreeSet::from([Code::Unavailable, Code::Unauthenticated]),
        }
    }

    /// Changes the status codes that invalidate the channel.
    pub fn set_invalidate_on<I: IntoIterator<Item = Code>>(mut self, v: I) -> Self {
        self.invalidate_on = v.into_iter().collect();
        self
    }

    /// Returns the current channel, creating it if needed.
    pub fn get(&self) -> Result<Arc<C>> {
        if let Some(channel) = self.lock().as_ref() {
            return Ok(channel.clone());
        }
        let created = Arc::new((self.factory)()?);
        let mut guard = self.lock();
        if let Some(channel) = guard.as_ref() {
            return Ok(channel.clone());
        }
        tracing::debug!("created a new channel");
        *guard = Some(created.clone());
        Ok(created)
    }

    /// Discards the current channel, if any.
    pub fn invalidate(&self) {
        if self.lock().take().is_some() {
            tracing::debug!("channel invalidated");
        }
    }

    /// Returns true if there is a current channel.
    pub fn is_connected(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<C>>> {
        self.channel.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<C> CompletionHook for LazyChannel<C>
where
    C: Send + Sync,
{
    fn on_completion(&self, status: &Status) {
        if self.invalidate_on.contains(&status.code) {
            self.invalidate();
        }
    }
}

impl<C> std::fmt::Debug for LazyChannel<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyChannel")
            .field("connected", &self.is_connected())
            .field("invalidate_on", &self.invalidate_on)
            .finish()
    }
}
