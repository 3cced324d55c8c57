//! Capped exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

/// Upper bound on the exponent; `2^32` seconds is far past any useful cap.
pub const EXPONENT_LIMIT: u32 = 32;

/// Retry schedule: `min(cap, 2^exponent + jitter)`, with the exponent
/// growing by one per failure up to `max_exponent` and reset on success.
#[derive(Debug, Clone)]
pub struct Backoff {
    exponent: u32,
    max_exponent: u32,
    cap: Duration,
}

impl Backoff {
    pub fn new(cap: Duration, max_exponent: u32) -> Self {
        Self {
            exponent: 0,
            max_exponent: max_exponent.min(EXPONENT_LIMIT),
            cap,
        }
    }

    pub fn exponent(&self) -> u32 {
        self.exponent
    }

    pub fn reset(&mut self) {
        self.exponent = 0;
    }

    /// Delay after a failure, with up to one second of random jitter.
    pub fn next_delay(&mut self) -> Duration {
        let jitter = rand::thread_rng().gen_range(0.0..1.0);
        self.next_delay_with_jitter(jitter)
    }

    /// Delay after a failure for a given jitter in seconds.
    pub fn next_delay_with_jitter(&mut self, jitter: f64) -> Duration {
        let secs = 2f64.powi(self.exponent as i32) + jitter.max(0.0);
        self.exponent = (self.exponent + 1).min(self.max_exponent);
        // Clamp before converting; the raw value can exceed what a Duration holds.
        let capped = secs.min(self.cap.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.cap)
    }
}
