pub mod api;
pub mod config;
pub mod error;
pub mod extract;
pub mod limiter;
pub mod llm;
pub mod prompt;
pub mod validator;

use std::sync::Arc;
use config::Config;
use error::{AppError, Result};
use extract::{ExtractionPolicy, PageExtractor};
use limiter::RateLimiter;
use llm::LlmClient;
use validator::RequestValidator;

/// Application state that will be shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub limiter: Arc<RateLimiter>,
    pub validator: Arc<RequestValidator>,
    pub llm: Arc<LlmClient>,
    pub extractor: Arc<PageExtractor>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let limiter = RateLimiter::new(config.rate_limit.clone());
        let validator = RequestValidator::new(config.validation.clone());
        let llm = LlmClient::new(&config.provider)?;
        let extractor = PageExtractor::new(ExtractionPolicy::default())
            .map_err(|e| AppError::ConfigError(e.to_string()))?;

        Ok(Self {
            config: Arc::new(config),
            limiter: Arc::new(limiter),
            validator: Arc::new(validator),
            llm: Arc::new(llm),
            extractor: Arc::new(extractor),
        })
    }
}

/// Longest prefix of `s` holding at most `max_chars` characters.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
