//! Reconnection backoff: exponential, capped, randomised.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    factor: u32,
    jitter: f64,
    attempts: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, jitter: f64) -> Self {
        Self {
            base,
            max,
            factor: 2,
            jitter: jitter.clamp(0.0, 1.0),
            attempts: 0,
        }
    }

    /// Delay before the next attempt; advances the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let sample = rand::rng().random::<f64>();
        let delay = self.delay_for(self.attempts, sample);
        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// `base * factor^attempt`, shifted by up to `jitter` of itself in a
    /// direction picked from `sample` (in `[0, 1)`), then capped at `max`.
    fn delay_for(&self, attempt: u32, sample: f64) -> Duration {
        let exp = self.factor.saturating_pow(attempt.min(31));
        let mut ms = (self.base.as_millis() as f64) * f64::from(exp);
        if self.jitter > 0.0 {
            let deviation = (sample * self.jitter * ms).floor();
            if ((sample * 10.0).floor() as u64) & 1 == 0 {
                ms -= deviation;
            } else {
                ms += deviation;
            }
        }
        let capped = ms.min(self.max.as_millis() as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}
