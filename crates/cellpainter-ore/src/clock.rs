// Copyright 2026 the cell-paint contributors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License is included in the LICENSE file at the root
// of this workspace.

//! A clock abstraction supporting wall-clock and fast-forward time, grounded
//! on `Time.now`/`Time.sleep` in the original `robots.py`: in wall mode, time
//! passes for real and a negative sleep (we are "behind") is logged; in
//! fast-forward mode, `sleep` immediately returns and accumulates into a
//! running `skipped_time` counter instead of actually waiting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::warn;

/// Which mode the run is using for the passage of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeMode {
    /// Time passes for real; `sleep` actually sleeps.
    Wall,
    /// `sleep` returns immediately; elapsed time is tracked but never
    /// actually waited out. Used by every run config except `live`.
    FastForward,
}

/// A clock that can run in wall or fast-forward mode.
#[derive(Debug)]
pub struct Clock {
    mode: TimeMode,
    start: Instant,
    skipped_millis: AtomicU64,
}

impl Clock {
    /// Creates a new clock in the given mode, with its origin at "now".
    pub fn new(mode: TimeMode) -> Clock {
        Clock {
            mode,
            start: Instant::now(),
            skipped_millis: AtomicU64::new(0),
        }
    }

    /// Seconds elapsed since the clock was created, including any
    /// fast-forwarded (skipped) time.
    pub fn now_secs(&self) -> f64 {
        let wall = self.start.elapsed().as_secs_f64();
        let skipped = self.skipped_millis.load(Ordering::SeqCst) as f64 / 1000.0;
        wall + skipped
    }

    /// Sleeps for `secs` seconds according to the clock's mode. A negative
    /// duration means the caller is already behind schedule; we log it and
    /// return immediately rather than sleeping, matching the
    /// `"Behind time"` diagnostic in the original `Time.sleep`.
    pub fn sleep(&self, secs: f64) {
        if secs < 0.0 {
            warn!(behind_by = -secs, "behind time");
            return;
        }
        match self.mode {
            TimeMode::Wall => std::thread::sleep(Duration::from_secs_f64(secs)),
            TimeMode::FastForward => {
                self.skipped_millis
                    .fetch_add((secs * 1000.0) as u64, Ordering::SeqCst);
            }
        }
    }

    /// The mode this clock is running in.
    pub fn mode(&self) -> TimeMode {
        self.mode
    }

    /// Total time fast-forwarded so far, in seconds.
    pub fn skipped_secs(&self) -> f64 {
        self.skipped_millis.load(Ordering::SeqCst) as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_forward_does_not_block() {
        let clock = Clock::new(TimeMode::FastForward);
        let start = Instant::now();
        clock.sleep(120.0);
        assert!(start.elapsed() < Duration::from_millis(50));
        assert!(clock.now_secs() >= 120.0);
    }

    #[test]
    fn negative_sleep_does_not_panic() {
        let clock = Clock::new(TimeMode::Wall);
        clock.sleep(-5.0);
    }
}
