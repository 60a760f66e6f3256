use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket shared by every caller of one gateway process.
///
/// One token is added per `refill_interval`, up to `burst`. The bucket
/// starts full. Refill and consume happen under a single lock so concurrent
/// callers can neither double-spend nor lose tokens.
pub struct RateLimiter {
    bucket: Mutex<Bucket>,
    refill_interval: Duration,
    burst: u32,
}

impl RateLimiter {
    pub fn new(refill_interval: Duration, burst: u32) -> Self {
        Self {
            bucket: Mutex::new(Bucket {
                tokens: burst as f64,
                last_refill: Instant::now(),
            }),
            refill_interval,
            burst,
        }
    }

    pub fn refill_interval(&self) -> Duration {
        self.refill_interval
    }

    pub fn burst(&self) -> u32 {
        self.burst
    }

    /// Takes one token if one is available.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    /// Like [`RateLimiter::try_acquire`] with an explicit clock reading.
    /// Readings older than the last refill add nothing.
    pub fn try_acquire_at(&self, now: Instant) -> bool {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut bucket, now);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Whole tokens available right now.
    pub fn available(&self) -> u32 {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut bucket, Instant::now());
        bucket.tokens.floor() as u32
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        let elapsed = now.saturating_duration_since(bucket.last_refill);
        if elapsed.is_zero() {
            return;
        }
        let capacity = self.burst as f64;
        let added = if self.refill_interval.is_zero() {
            capacity
        } else {
            elapsed.as_secs_f64() / self.refill_interval.as_secs_f64()
        };
        bucket.tokens = (bucket.tokens + added).min(capacity);
        bucket.last_refill = now;
    }
}
