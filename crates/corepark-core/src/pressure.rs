//! Queue pressure: a decaying time-weighted average of pending work.
//!
//! The estimator has its own lock, independent of the controller lock,
//! so it can be sampled from a different context without contending with
//! configuration writes.
//!
//! # Sampling
//!
//! ```text
//! raw = pending * 100
//! dt  = now - last_ts
//! avg = (raw * dt + avg * total) / (total + dt)   if total > 0
//!     = raw                                        otherwise
//! total += dt; last_ts = now
//! return avg, then avg = 0
//! ```
//!
//! Every read consumes the average. A second read at the same instant
//! returns 0. Once time has moved past a consumed read, the accumulated
//! history restarts, so a tick only ever sees the pressure built up since
//! the previous tick.

use std::sync::Mutex;
use std::time::Instant;

#[derive(Debug, Default)]
struct PressureState {
    last_ms: Option<u64>,
    total_ms: u64,
    avg: u64,
}

/// Decaying average of the pool's pending-work count, scaled by 100.
#[derive(Debug)]
pub struct QueuePressure {
    state: Mutex<PressureState>,
    epoch: Instant,
}

impl Default for QueuePressure {
    fn default() -> Self {
        Self::new()
    }
}

impl QueuePressure {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PressureState::default()),
            epoch: Instant::now(),
        }
    }

    /// Sample using the wall clock.
    pub fn sample(&self, pending: u64) -> u32 {
        let now_ms = self.epoch.elapsed().as_millis() as u64;
        self.sample_at(pending, now_ms)
    }

    /// Sample at an explicit timestamp, in milliseconds since an arbitrary
    /// but fixed origin.
    pub fn sample_at(&self, pending: u64, now_ms: u64) -> u32 {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());

        let dt = match state.last_ms {
            // Nothing accumulated since the previous read consumed the average.
            Some(last) if now_ms <= last => return 0,
            Some(last) => now_ms - last,
            None => 0,
        };
        if state.avg == 0 && dt > 0 {
            state.total_ms = 0;
        }

        let raw = pending.saturating_mul(100);
        let avg = if state.total_ms > 0 {
            (raw.saturating_mul(dt) + state.avg.saturating_mul(state.total_ms))
                / (state.total_ms + dt)
        } else {
            raw
        };

        state.total_ms += dt;
        state.last_ms = Some(now_ms);
        state.avg = 0;

        avg.min(u32::MAX as u64) as u32
    }

    /// Forget all history. Called when the controller starts.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        *state = PressureState::default();
    }
}
