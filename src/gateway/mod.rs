use log::debug;
use std::sync::Arc;

pub mod auth;
pub mod rate_limit;

pub use auth::{Authenticator, Identity};
pub use rate_limit::RateLimiter;

use crate::config::GatewayConfig;
use crate::error::AdmissionError;

/// Authentication followed by rate limiting, in front of the dispatcher.
///
/// A request that fails authentication never touches the token bucket.
#[derive(Clone)]
pub struct AdmissionGateway {
    authenticator: Arc<Authenticator>,
    rate_limiter: Arc<RateLimiter>,
}

impl AdmissionGateway {
    pub fn new(authenticator: Authenticator, rate_limiter: RateLimiter) -> Self {
        Self {
            authenticator: Arc::new(authenticator),
            rate_limiter: Arc::new(rate_limiter),
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(
            Authenticator::from_map(config.api_keys.clone()),
            RateLimiter::new(config.rate_limit_interval(), config.rate_limit_burst),
        )
    }

    pub fn admit(&self, credential: Option<&str>) -> Result<Identity, AdmissionError> {
        let identity = self.authenticator.authenticate(credential)?;
        if !self.rate_limiter.try_acquire() {
            debug!("Rate limited request from '{}'", identity);
            return Err(AdmissionError::RateLimited);
        }
        Ok(identity)
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }
}
