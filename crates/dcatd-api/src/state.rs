//! Application state shared across handlers.

use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{Quota, RateLimiter};

use dcatd_core::{CanonicalizationPipeline, ConcurrencyController, Error, HookRegistry, Result};
use dcatd_search::SearchEngine;

use crate::config::AppConfig;

/// Global rate limiter type (direct quota, no keyed bucketing).
pub type GlobalRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

#[derive(Clone)]
pub struct AppState {
    pub hooks: Arc<HookRegistry>,
    pub controller: ConcurrencyController,
    pub pipeline: CanonicalizationPipeline,
    pub search: SearchEngine,
    pub config: Arc<AppConfig>,
    /// None if rate limiting is disabled.
    pub rate_limiter: Option<Arc<GlobalRateLimiter>>,
}

impl AppState {
    pub fn new(hooks: Arc<HookRegistry>, config: AppConfig) -> Result<Self> {
        let rate_limiter = match &config.rate_limit {
            Some(limit) => {
                let quota = Quota::with_period(limit.period)
                    .ok_or_else(|| Error::Config("rate limit period must be non-zero".into()))?
                    .allow_burst(NonZeroU32::new(limit.requests).ok_or_else(|| {
                        Error::Config("rate limit requests must be non-zero".into())
                    })?);
                Some(Arc::new(RateLimiter::direct(quota)))
            }
            None => None,
        };

        Ok(Self {
            controller: ConcurrencyController::new(hooks.clone()),
            pipeline: CanonicalizationPipeline::new(
                hooks.clone(),
                config.base_url.clone(),
                config.default_language.clone(),
            ),
            search: SearchEngine::new(hooks.clone(), config.default_sort.clone()),
            hooks,
            config: Arc::new(config),
            rate_limiter,
        })
    }
}
