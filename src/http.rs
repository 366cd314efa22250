//! HTTP client with rate limiting for stream hosts.
//!
//! This module wraps `reqwest::Client` and adds:
//! * Request rate limiting, so that rapid station switching does not hammer
//!   stream hosts with probes
//! * Consistent timeouts and a `User-Agent` header
//!
//! Audio downloads use the [`unlimited`](Client::unlimited) client directly:
//! a stream is one long-lived request and should never wait for a quota.

use std::{future::Future, num::NonZeroU32, time::Duration};

use futures_util::{FutureExt, TryFutureExt};
use governor::{DefaultDirectRateLimiter, Quota};
use reqwest::{self, Method, Url};

use crate::{
    config::Config,
    error::{Error, Result},
};

pub struct Client {
    /// Request client without rate limiting.
    pub unlimited: reqwest::Client,

    rate_limiter: DefaultDirectRateLimiter,
}

impl Client {
    /// Rolling window in which at most `RATE_LIMIT_CALLS_PER_INTERVAL` probes
    /// are sent.
    const RATE_LIMIT_INTERVAL: Duration = Duration::from_secs(5);

    const RATE_LIMIT_CALLS_PER_INTERVAL: u8 = 20;

    const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Radio servers that stop sending data for this long are considered
    /// dead. Live streams trickle data continuously, so this is short.
    const READ_TIMEOUT: Duration = Duration::from_secs(5);

    const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised or the
    /// `User-Agent` is not a valid header value.
    pub fn new(config: &Config) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .tcp_keepalive(Self::KEEPALIVE_TIMEOUT)
            .read_timeout(Self::READ_TIMEOUT)
            .connect_timeout(Self::CONNECT_TIMEOUT)
            .user_agent(&config.user_agent)
            .build()?;

        let replenish_interval =
            Self::RATE_LIMIT_INTERVAL / u32::from(Self::RATE_LIMIT_CALLS_PER_INTERVAL);
        let quota = Quota::with_period(replenish_interval)
            .ok_or_else(|| Error::internal("quota time interval is zero"))?
            .allow_burst(
                NonZeroU32::new(Self::RATE_LIMIT_CALLS_PER_INTERVAL.into())
                    .ok_or_else(|| Error::internal("calls per interval is zero"))?,
            );

        Ok(Self {
            unlimited: http_client,
            rate_limiter: governor::RateLimiter::direct(quota),
        })
    }

    #[must_use]
    pub fn request(&self, method: Method, url: Url) -> reqwest::Request {
        reqwest::Request::new(method, url)
    }

    #[must_use]
    pub fn get(&self, url: Url) -> reqwest::Request {
        self.request(Method::GET, url)
    }

    /// Executes a request once the rate limiter allows it.
    ///
    /// # Errors
    ///
    /// Returns an error on network failure.
    pub fn execute(
        &self,
        request: reqwest::Request,
    ) -> impl Future<Output = Result<reqwest::Response>> + '_ {
        let throttle = self.rate_limiter.until_ready();
        throttle.then(|()| self.unlimited.execute(request).map_err(Into::into))
    }
}
