use std::net::IpAddr;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Fixed-window attempt counter keyed by client IP.
pub struct RateLimiter {
    /// IP -> (window start, attempts in window)
    attempts: DashMap<IpAddr, (Instant, u32)>,
    max_attempts: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            attempts: DashMap::new(),
            max_attempts,
            window,
        }
    }

    /// Count one attempt from `ip`.
    /// Returns the time left in the window when the limit is exhausted.
    pub fn check(&self, ip: IpAddr) -> Result<(), Duration> {
        self.check_at(ip, Instant::now())
    }

    fn check_at(&self, ip: IpAddr, now: Instant) -> Result<(), Duration> {
        let mut entry = self.attempts.entry(ip).or_insert((now, 0));
        let (started, count) = entry.value_mut();

        if now.duration_since(*started) >= self.window {
            *started = now;
            *count = 1;
            return Ok(());
        }

        if *count >= self.max_attempts {
            return Err(self.window - now.duration_since(*started));
        }

        *count += 1;
        Ok(())
    }

    /// Drop entries whose window ended long ago.
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.attempts
            .retain(|_, (started, _)| now.duration_since(*started) < self.window * 2);
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.attempts.len()
    }
}

/// Limiter for login attempts (10 per minute per IP).
pub fn login_limiter() -> RateLimiter {
    RateLimiter::new(10, Duration::from_secs(60))
}
