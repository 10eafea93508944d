//! Rate-limited remote retrieval shared by the citation and figure reconcilers.

use log::{debug, info, warn};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, USER_AGENT};
use std::cell::Cell;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::FetchConfig;
use crate::error::{FetchError, Result, UmbError};

/// Source of time for the rate limiter.
pub trait Clock {
    /// Time elapsed since an arbitrary fixed origin.
    fn now(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// A clock that only moves when told to. Sleeping advances it instantly.
///
/// Clones share the same time, so a test can keep a handle after giving one
/// to a [`RateLimiter`].
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    elapsed: Rc<Cell<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, duration: Duration) {
        self.elapsed.set(self.elapsed.get() + duration);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.elapsed.get()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// Token bucket holding up to one second's worth of requests.
///
/// A request that would have to wait longer than `max_delay` for a token is
/// refused with [`UmbError::RateLimitExceeded`] instead of blocking.
pub struct RateLimiter {
    rate: f64,
    max_delay: Duration,
    tokens: f64,
    last_refill: Duration,
    clock: Box<dyn Clock>,
}

impl RateLimiter {
    pub fn new(requests_per_second: u32, max_delay: Duration) -> Self {
        Self::with_clock(requests_per_second, max_delay, SystemClock::new())
    }

    pub fn with_clock(requests_per_second: u32, max_delay: Duration, clock: impl Clock + 'static) -> Self {
        let rate = f64::from(requests_per_second.max(1));
        let last_refill = clock.now();
        Self {
            rate,
            max_delay,
            tokens: rate,
            last_refill,
            clock: Box::new(clock),
        }
    }

    fn refill(&mut self) {
        let now = self.clock.now();
        let elapsed = now.saturating_sub(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.rate);
        self.last_refill = now;
    }

    /// Take a token for the request identified by `key`, waiting up to
    /// `max_delay` for one to become available.
    pub fn try_acquire(&mut self, key: &str) -> Result<()> {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Ok(());
        }

        let wait = Duration::from_secs_f64((1.0 - self.tokens) / self.rate);
        if wait > self.max_delay {
            debug!("Refusing {}: would wait {:?} (limit {:?})", key, wait, self.max_delay);
            return Err(UmbError::RateLimitExceeded {
                key: key.to_string(),
            });
        }

        debug!("Waiting {:?} before requesting {}", wait, key);
        self.clock.sleep(wait);
        self.refill();
        self.tokens = (self.tokens - 1.0).max(0.0);
        Ok(())
    }
}

/// Blocking HTTP client gated by a [`RateLimiter`].
pub struct Fetcher {
    client: Client,
    limiter: RateLimiter,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let limiter = RateLimiter::new(config.requests_per_second, config.max_delay);
        Self::with_limiter(config, limiter)
    }

    pub fn with_limiter(config: FetchConfig, limiter: RateLimiter) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| UmbError::FetchFailure {
                target: "HTTP client".to_string(),
                source: FetchError::Transport(e),
            })?;
        Ok(Self {
            client,
            limiter,
            config,
        })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// GET `url` and return the response body. `key` names the request for
    /// rate limiting and error reporting.
    pub fn fetch(&mut self, key: &str, url: &str, accept: Option<&str>) -> Result<Vec<u8>> {
        self.limiter.try_acquire(key)?;

        let failure = |source: FetchError| UmbError::FetchFailure {
            target: key.to_string(),
            source,
        };

        info!("Fetching {}", url);
        let mut request = self.client.get(url).header(USER_AGENT, &self.config.user_agent);
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }
        let response = request.send().map_err(|e| failure(e.into()))?;

        if !response.status().is_success() {
            warn!("{} returned status {}", url, response.status());
            return Err(failure(FetchError::Status(response.status())));
        }

        let body = response.bytes().map_err(|e| failure(e.into()))?;
        Ok(body.to_vec())
    }
}
