//! Pipeline configuration
//!
//! Built with `const fn` setters or read from `TRUENO_TRAVERSE_*`
//! environment variables.

use crate::merge::PredictionContract;
use crate::{Error, Result};
use std::time::Duration;

/// Interval between existence checks while waiting for async predictions
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Upper bound on the wait for async predictions
pub const DEFAULT_INFERENCE_TIMEOUT: Duration = Duration::from_secs(600);

/// Root of every job namespace
pub const DEFAULT_KEY_PREFIX: &str = "jobs";

const ENV_POLL_INTERVAL_MS: &str = "TRUENO_TRAVERSE_POLL_INTERVAL_MS";
const ENV_INFERENCE_TIMEOUT_SECS: &str = "TRUENO_TRAVERSE_INFERENCE_TIMEOUT_SECS";
const ENV_PREDICTION_CONTRACT: &str = "TRUENO_TRAVERSE_PREDICTION_CONTRACT";
const ENV_KEY_PREFIX: &str = "TRUENO_TRAVERSE_KEY_PREFIX";

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    poll_interval: Duration,
    inference_timeout: Duration,
    contract: PredictionContract,
    key_prefix: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            inference_timeout: DEFAULT_INFERENCE_TIMEOUT,
            contract: PredictionContract::Positional,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

impl PipelineConfig {
    /// Defaults: 5 s poll interval, 600 s timeout, positional contract
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read overrides from the environment on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` if a variable is set but unparsable.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_POLL_INTERVAL_MS) {
            let ms = parse_positive(ENV_POLL_INTERVAL_MS, &raw)?;
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(raw) = lookup(ENV_INFERENCE_TIMEOUT_SECS) {
            let secs = parse_positive(ENV_INFERENCE_TIMEOUT_SECS, &raw)?;
            config.inference_timeout = Duration::from_secs(secs);
        }
        if let Some(raw) = lookup(ENV_PREDICTION_CONTRACT) {
            config.contract = raw.parse()?;
        }
        if let Some(raw) = lookup(ENV_KEY_PREFIX) {
            config.key_prefix = raw.trim().trim_end_matches('/').to_string();
        }
        Ok(config)
    }

    /// Set the poll interval
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the inference wait bound
    #[must_use]
    pub const fn with_inference_timeout(mut self, timeout: Duration) -> Self {
        self.inference_timeout = timeout;
        self
    }

    /// Set the prediction contract
    #[must_use]
    pub const fn with_contract(mut self, contract: PredictionContract) -> Self {
        self.contract = contract;
        self
    }

    /// Set the key prefix for job namespaces
    #[must_use]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Poll interval
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Inference wait bound
    #[must_use]
    pub const fn inference_timeout(&self) -> Duration {
        self.inference_timeout
    }

    /// Prediction contract
    #[must_use]
    pub const fn contract(&self) -> PredictionContract {
        self.contract
    }

    /// Key prefix
    #[must_use]
    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }
}

fn parse_positive(name: &str, raw: &str) -> Result<u64> {
    match raw.trim().parse::<u64>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(Error::Validation(format!(
            "{name} must be a positive integer, got {raw:?}"
        ))),
    }
}
