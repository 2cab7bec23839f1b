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

//! Common implementation for exponential backoff.
//!
//! This module provides an implementation of truncated [exponential backoff].
//! It implements the [BackoffPolicy] trait.
//!
//! [BackoffPolicy]: crate::backoff_policy::BackoffPolicy
//! [exponential backoff]: https://en.wikipedia.org/wiki/Exponential_backoff

use crate::backoff_policy::BackoffPolicy;
use std::time::Duration;

/// The error type for exponential backoff creation.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("the scaling value ({0}) should be >= 1.0")]
    InvalidScalingFactor(f64),
    #[error("the initial delay ({0:?}) should be greater than zero")]
    InvalidInitialDelay(Duration),
    #[error(
        "the maximum delay ({maximum:?}) should be greater than or equal to the initial delay ({initial:?})"
    )]
    EmptyRange {
        maximum: Duration,
        initial: Duration,
    },
}

/// How the policy randomizes each delay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Jitter {
    /// Each delay is uniformly distributed between zero and the current
    /// bound.
    #[default]
    Full,
    /// Each delay is exactly the current bound.
    None,
}

/// A builder for [ExponentialBackoff].
///
/// The defaults are an initial delay of 10 milliseconds, a maximum delay of
/// 5 minutes, a scaling factor of 2.0, and [full jitter][Jitter::Full].
#[derive(Clone, Debug)]
pub struct ExponentialBackoffBuilder {
    initial_delay: Duration,
    maximum_delay: Duration,
    scaling: f64,
    jitter: Jitter,
}

impl ExponentialBackoffBuilder {
    /// Creates a builder with the default parameters.
    ///
    /// # Example
    /// ```
    /// # use cloud_rpc_retry::exponential_backoff::Error;
    /// # use cloud_rpc_retry::exponential_backoff::ExponentialBackoffBuilder;
    /// use std::time::Duration;
    ///
    /// let policy = ExponentialBackoffBuilder::new()
    ///         .with_initial_delay(Duration::from_millis(100))
    ///         .with_maximum_delay(Duration::from_secs(5))
    ///         .with_scaling(4.0)
    ///         .build()?;
    /// # Ok::<(), Error>(())
    /// ```
    pub fn new() -> Self {
        Self {
            initial_delay: Duration::from_millis(10),
            maximum_delay: Duration::from_secs(5 * 60),
            scaling: 2.0,
            jitter: Jitter::Full,
        }
    }

    /// Change the initial delay.
    pub fn with_initial_delay<V: Into<Duration>>(mut self, v: V) -> Self {
        self.initial_delay = v.into();
        self
    }

    /// Change the maximum delay.
    pub fn with_maximum_delay<V: Into<Duration>>(mut self, v: V) -> Self {
        self.maximum_delay = v.into();
        self
    }

    /// Change the scaling factor in this backoff policy.
    pub fn with_scaling<V: Into<f64>>(mut self, v: V) -> Self {
        self.scaling = v.into();
        self
    }

    /// Change the jitter in this backoff policy.
    ///
    /// # Example
    /// ```
    /// # use cloud_rpc_retry::backoff_policy::BackoffPolicy;
    /// # use cloud_rpc_retry::error::Error;
    /// # use cloud_rpc_retry::exponential_backoff::{ExponentialBackoffBuilder, Jitter};
    /// use std::time::Duration;
    /// let mut backoff = ExponentialBackoffBuilder::new()
    ///     .with_initial_delay(Duration::from_secs(1))
    ///     .with_jitter(Jitter::None)
    ///     .clamp();
    /// let error = Error::transport("connection reset");
    /// assert_eq!(backoff.on_completion(&error), Duration::from_secs(1));
    /// assert_eq!(backoff.on_completion(&error), Duration::from_secs(2));
    /// ```
    pub fn with_jitter(mut self, v: Jitter) -> Self {
        self.jitter = v;
        self
    }

    /// Creates a new exponential backoff policy.
    ///
    /// # Example
    /// ```
    /// # use cloud_rpc_retry::backoff_policy::BackoffPolicy;
    /// # use cloud_rpc_retry::error::Error;
    /// # use cloud_rpc_retry::exponential_backoff::ExponentialBackoffBuilder;
    /// use std::time::Duration;
    /// let mut backoff = ExponentialBackoffBuilder::new()
    ///     .with_initial_delay(Duration::from_secs(5))
    ///     .with_maximum_delay(Duration::from_secs(50))
    ///     .with_scaling(2.0)
    ///     .build()?;
    /// let error = Error::transport("connection reset");
    /// let p = backoff.on_completion(&error);
    /// assert!(p <= Duration::from_secs(5));
    /// let p = backoff.on_completion(&error);
    /// assert!(p <= Duration::from_secs(10));
    /// # Ok::<(), cloud_rpc_retry::exponential_backoff::Error>(())
    /// ```
    pub fn build(self) -> Result<ExponentialBackoff, Error> {
        if self.scaling.is_nan() || self.scaling < 1.0 {
            return Err(Error::InvalidScalingFactor(self.scaling));
        }
        if self.initial_delay.is_zero() {
            return Err(Error::InvalidInitialDelay(self.initial_delay));
        }
        if self.maximum_delay < self.initial_delay {
            return Err(Error::EmptyRange {
                maximum: self.maximum_delay,
                initial: self.initial_delay,
            });
        }
        Ok(ExponentialBackoff::from_parts(
            self.initial_delay,
            self.maximum_delay,
            self.scaling,
            self.jitter,
        ))
    }

    /// Creates a new exponential backoff policy clamping the ranges towards
    /// recommended values.
    ///
    /// The maximum delay is clamped first, to be between one second and one day
    /// (both inclusive). The upper value is hardly useful, typically the retry
    /// policy would expire earlier than such a long backoff.
    ///
    /// Then the initial delay is clamped to be between one millisecond and the
    /// maximum delay. One millisecond is rarely useful outside of tests, but it
    /// is unlikely to cause problems.
    ///
    /// Finally, the scaling factor is clamped to the `[1.0, 32.0]` range.
    /// Neither extreme is very useful, but neither are necessarily going to
    /// cause trouble.
    ///
    /// # Example
    /// ```
    /// # use cloud_rpc_retry::backoff_policy::BackoffPolicy;
    /// # use cloud_rpc_retry::error::Error;
    /// # use cloud_rpc_retry::exponential_backoff::{ExponentialBackoffBuilder, Jitter};
    /// use std::time::Duration;
    /// let mut backoff = ExponentialBackoffBuilder::new()
    ///     .with_jitter(Jitter::None)
    ///     .clamp();
    /// assert!(backoff.on_completion(&Error::transport("reset")) > Duration::ZERO);
    /// ```
    pub fn clamp(self) -> ExponentialBackoff {
        let scaling = if self.scaling.is_nan() {
            1.0
        } else {
            self.scaling.clamp(1.0, 32.0)
        };
        let maximum_delay = self
            .maximum_delay
            .clamp(Duration::from_secs(1), Duration::from_secs(24 * 60 * 60));
        let initial_delay = self
            .initial_delay
            .clamp(Duration::from_millis(1), maximum_delay);
        ExponentialBackoff::from_parts(initial_delay, maximum_delay, scaling, self.jitter)
    }
}

impl Default for ExponentialBackoffBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Implements truncated exponential backoff with jitter.
///
/// The policy keeps a current bound, starting at the initial delay. Each call
/// to [on_completion][BackoffPolicy::on_completion] returns a delay no larger
/// than the current bound, and then multiplies the bound by the scaling
/// factor, up to the maximum delay.
#[derive(Debug)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    maximum_delay: Duration,
    scaling: f64,
    jitter: Jitter,
    current_delay: Duration,
}

impl ExponentialBackoff {
    fn from_parts(
        initial_delay: Duration,
        maximum_delay: Duration,
        scaling: f64,
        jitter: Jitter,
    ) -> Self {
        Self {
            initial_delay,
            maximum_delay,
            scaling,
            jitter,
            current_delay: initial_delay,
        }
    }

    /// The bound for the next delay.
    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }

    fn next_bound(&self) -> Duration {
        if self.current_delay.is_zero() {
            return self.current_delay;
        }
        if self.scaling >= self.maximum_delay.div_duration_f64(self.current_delay) {
            self.maximum_delay
        } else {
            // .mul_f64() cannot panic because (1) scaling >= 1.0, and (2) we
            // just checked that current_delay * scaling < maximum_delay.
            self.current_delay.mul_f64(self.scaling)
        }
    }

    fn delay_with_jitter(&mut self, rng: &mut impl rand::Rng) -> Duration {
        let bound = self.current_delay;
        self.current_delay = self.next_bound();
        match self.jitter {
            Jitter::Full => rng.random_range(Duration::ZERO..=bound),
            Jitter::None => bound,
        }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        ExponentialBackoffBuilder::new().clamp()
    }
}

impl Clone for ExponentialBackoff {
    fn clone(&self) -> Self {
        Self::from_parts(
            self.initial_delay,
            self.maximum_delay,
            self.scaling,
            self.jitter,
        )
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn clone_policy(&self) -> Box<dyn BackoffPolicy> {
        Box::new(self.clone())
    }

    fn on_completion(&mut self, _error: &crate::error::Error) -> Duration {
        self.delay_with_jitter(&mut rand::rng())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_rng::MockRng;

    fn transient() -> crate::error::Error {
        crate::error::Error::transport("connection reset")
    }

    #[test]
    fn exponential_build_errors() {
        let b = ExponentialBackoffBuilder::new()
            .with_initial_delay(Duration::ZERO)
            .with_maximum_delay(Duration::from_secs(5))
            .build();
        assert!(matches!(b, Err(Error::InvalidInitialDelay(_))), "{b:?}");
        let b = ExponentialBackoffBuilder::new()
            .with_initial_delay(Duration::from_secs(10))
            .with_maximum_delay(Duration::from_secs(5))
            .build();
        assert!(matches!(b, Err(Error::EmptyRange { .. })), "{b:?}");

        let b = ExponentialBackoffBuilder::new()
            .with_initial_delay(Duration::from_secs(1))
            .with_maximum_delay(Duration::from_secs(60))
            .with_scaling(-1.0)
            .build();
        assert!(matches!(b, Err(Error::InvalidScalingFactor(_))), "{b:?}");

        let b = ExponentialBackoffBuilder::new()
            .with_scaling(f64::NAN)
            .build();
        assert!(matches!(b, Err(Error::InvalidScalingFactor(_))), "{b:?}");
    }

    #[test]
    fn exponential_build_limits() {
        let r = ExponentialBackoffBuilder::new()
            .with_initial_delay(Duration::from_secs(1))
            .with_maximum_delay(Duration::MAX)
            .build();
        assert!(r.is_ok(), "{r:?}");

        let r = ExponentialBackoffBuilder::new()
            .with_initial_delay(Duration::from_nanos(1))
            .with_maximum_delay(Duration::MAX)
            .with_scaling(1.0)
            .build();
        assert!(r.is_ok(), "{r:?}");
    }

    #[test]
    fn exponential_builder_defaults() {
        let b = ExponentialBackoffBuilder::default()
            .build()
            .expect("defaults are valid");
        assert_eq!(b.initial_delay, Duration::from_millis(10));
        assert_eq!(b.maximum_delay, Duration::from_secs(300));
        assert_eq!(b.scaling, 2.0);
        assert_eq!(b.jitter, Jitter::Full);
        assert_eq!(b.current_delay(), Duration::from_millis(10));
    }

    #[test_case::test_case(Duration::from_secs(1), Duration::MAX, 0.5; "scaling below range")]
    #[test_case::test_case(Duration::from_secs(1), Duration::MAX, 1e6; "scaling over range")]
    #[test_case::test_case(Duration::from_secs(1), Duration::MAX, f64::NAN; "scaling is nan")]
    #[test_case::test_case(Duration::from_secs(1), Duration::MAX, 8.0; "max over range")]
    #[test_case::test_case(Duration::from_secs(1), Duration::ZERO, 8.0; "max below range")]
    #[test_case::test_case(Duration::from_secs(10), Duration::ZERO, 8.0; "init over range")]
    #[test_case::test_case(Duration::ZERO, Duration::ZERO, 8.0; "init below range")]
    fn exponential_clamp(init: Duration, max: Duration, scaling: f64) {
        let b = ExponentialBackoffBuilder::new()
            .with_initial_delay(init)
            .with_maximum_delay(max)
            .with_scaling(scaling)
            .clamp();
        assert_eq!(b.scaling.clamp(1.0, 32.0), b.scaling);
        assert_eq!(
            b.initial_delay
                .clamp(Duration::from_millis(1), b.maximum_delay),
            b.initial_delay
        );
        assert_eq!(
            b.maximum_delay
                .clamp(b.initial_delay, Duration::from_secs(24 * 60 * 60)),
            b.maximum_delay
        );
    }

    #[test]
    fn exponential_full_jitter() {
        let mut b = ExponentialBackoffBuilder::new()
            .with_initial_delay(Duration::from_secs(10))
            .with_maximum_delay(Duration::from_secs(10))
            .build()
            .expect("should succeed with the hard-coded test values");

        let mut rng = MockRng::new(1);
        assert_eq!(b.delay_with_jitter(&mut rng), Duration::ZERO);

        let mut rng = MockRng::new(u64::MAX);
        assert_eq!(b.delay_with_jitter(&mut rng), Duration::from_secs(10));
    }

    #[test]
    fn exponential_scaling() {
        let mut b = ExponentialBackoffBuilder::new()
            .with_initial_delay(Duration::from_secs(1))
            .with_maximum_delay(Duration::from_secs(4))
            .with_scaling(2.0)
            .with_jitter(Jitter::None)
            .build()
            .expect("should succeed with the hard-coded test values");

        let mut rng = MockRng::new(1);
        assert_eq!(b.delay_with_jitter(&mut rng), Duration::from_secs(1));
        assert_eq!(b.delay_with_jitter(&mut rng), Duration::from_secs(2));
        assert_eq!(b.delay_with_jitter(&mut rng), Duration::from_secs(4));
        assert_eq!(b.delay_with_jitter(&mut rng), Duration::from_secs(4));
    }

    #[test]
    fn exponential_scaling_jitter() {
        let mut b = ExponentialBackoffBuilder::new()
            .with_initial_delay(Duration::from_secs(1))
            .with_maximum_delay(Duration::from_secs(4))
            .with_scaling(2.0)
            .build()
            .expect("should succeed with the hard-coded test values");

        let mut rng = MockRng::new(u64::MAX);
        assert_eq!(b.delay_with_jitter(&mut rng), Duration::from_secs(1));
        assert_eq!(b.delay_with_jitter(&mut rng), Duration::from_secs(2));
        assert_eq!(b.delay_with_jitter(&mut rng), Duration::from_secs(4));
        assert_eq!(b.delay_with_jitter(&mut rng), Duration::from_secs(4));
    }

    #[test]
    fn on_completion() {
        let mut b = ExponentialBackoffBuilder::new()
            .with_initial_delay(Duration::from_secs(1))
            .with_maximum_delay(Duration::from_secs(4))
            .with_scaling(2.0)
            .build()
            .expect("should succeed with the hard-coded test values");

        let d = b.on_completion(&transient());
        assert!(d <= Duration::from_secs(1), "{d:?}");
        let d = b.on_completion(&transient());
        assert!(d <= Duration::from_secs(2), "{d:?}");
        for _ in 0..10 {
            let d = b.on_completion(&transient());
            assert!(d <= Duration::from_secs(4), "{d:?}");
        }
        assert_eq!(b.current_delay(), Duration::from_secs(4));
    }

    #[test]
    fn clone_resets() {
        let mut b = ExponentialBackoffBuilder::new()
            .with_initial_delay(Duration::from_secs(1))
            .with_maximum_delay(Duration::from_secs(4))
            .with_jitter(Jitter::None)
            .build()
            .expect("should succeed with the hard-coded test values");
        assert_eq!(b.on_completion(&transient()), Duration::from_secs(1));
        assert_eq!(b.on_completion(&transient()), Duration::from_secs(2));

        let mut fresh = b.clone_policy();
        assert_eq!(fresh.on_completion(&transient()), Duration::from_secs(1));
        assert_eq!(b.on_completion(&transient()), Duration::from_secs(4));
    }

    #[test]
    fn default() {
        let mut b = ExponentialBackoff::default();
        let mut rng = MockRng::new(u64::MAX);
        let next = 2 * b.delay_with_jitter(&mut rng);
        assert_eq!(b.delay_with_jitter(&mut rng), next);
        let next = 2 * next;
        assert_eq!(b.delay_with_jitter(&mut rng), next);
    }

    #[test]
    fn large_scaling_never_overflows() {
        let mut b = ExponentialBackoffBuilder::new()
            .with_initial_delay(Duration::from_secs(1))
            .with_maximum_delay(Duration::MAX)
            .with_scaling(1_000_000.0)
            .with_jitter(Jitter::None)
            .build()
            .expect("should succeed with the hard-coded test values");
        for _ in 0..10 {
            let _ = b.on_completion(&transient());
        }
        assert_eq!(b.current_delay(), Duration::MAX);
    }
}
