// Copyright 2026 the cell-paint contributors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License is included in the LICENSE file at the root
// of this workspace.

//! Retry with exponential backoff.
//!
//! The executor and its device workers are plain synchronous threads (see
//! `DESIGN NOTES` on `Fork`: "no async runtime required"), so this is a
//! blocking retry helper rather than an async one — modeled on the same
//! `Retry::default().clamp_backoff(..).retry_async(..)` shape the compute
//! controller uses to reconnect to a lost replica, adapted to a thread that
//! just sleeps between attempts instead of awaiting a future.

use std::thread;
use std::time::Duration;

use tracing::info;

/// A description of the current position in a retry loop, handed to the
/// closure passed to [`Retry::retry`].
#[derive(Debug, Clone, Copy)]
pub struct RetryState {
    /// How many attempts have been made so far, including the current one.
    pub i: usize,
    /// The delay that will be used before the *next* attempt, if this one
    /// fails. `None` if this was the last permitted attempt.
    pub next_backoff: Option<Duration>,
}

/// A retry policy: an initial delay, a multiplicative backoff factor, and an
/// optional cap on both the delay and the number of attempts.
#[derive(Debug, Clone, Copy)]
pub struct Retry {
    initial_backoff: Duration,
    factor: f64,
    max_backoff: Duration,
    max_tries: Option<usize>,
}

impl Default for Retry {
    fn default() -> Retry {
        Retry {
            initial_backoff: Duration::from_millis(125),
            factor: 2.0,
            max_backoff: Duration::MAX,
            max_tries: None,
        }
    }
}

impl Retry {
    /// Sets the delay before the first retry.
    pub fn initial_backoff(mut self, initial_backoff: Duration) -> Retry {
        self.initial_backoff = initial_backoff;
        self
    }

    /// Sets the multiplicative factor applied to the delay after every
    /// failed attempt.
    pub fn factor(mut self, factor: f64) -> Retry {
        self.factor = factor;
        self
    }

    /// Caps the backoff delay at `max_backoff`. Does not cap the number of
    /// attempts: a device worker retrying a transient error never gives up,
    /// it just stops growing its delay.
    pub fn clamp_backoff(mut self, max_backoff: Duration) -> Retry {
        self.max_backoff = max_backoff;
        self
    }

    /// Caps the number of attempts.
    pub fn max_tries(mut self, max_tries: usize) -> Retry {
        self.max_tries = Some(max_tries);
        self
    }

    fn backoff_for(&self, attempt: usize) -> Duration {
        let scaled = self.initial_backoff.as_secs_f64() * self.factor.powi(attempt as i32 - 1);
        Duration::from_secs_f64(scaled).min(self.max_backoff)
    }

    /// Runs `f` until it returns `Ok`, sleeping with exponential backoff
    /// between attempts. With no [`Retry::max_tries`] cap this retries
    /// forever, which is what the wash/disp/incu workers want for the
    /// known-transient (6061) device error.
    pub fn retry<F, T, E>(self, mut f: F) -> Result<T, E>
    where
        F: FnMut(RetryState) -> Result<T, E>,
    {
        let mut i = 0;
        loop {
            i += 1;
            let next_backoff = if self.max_tries.map_or(true, |max| i < max) {
                Some(self.backoff_for(i))
            } else {
                None
            };
            let state = RetryState { i, next_backoff };
            match f(state) {
                Ok(t) => return Ok(t),
                Err(e) => match next_backoff {
                    Some(backoff) => {
                        info!(attempt = i, ?backoff, "retrying after failure");
                        thread::sleep(backoff);
                    }
                    None => return Err(e),
                },
            }
        }
    }
}
