//! Exponential backoff for backend requests.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use super::ApiError;
use crate::config::RetryConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Retries after the first attempt
  pub max_retries: u32,
  pub base_delay: Duration,
  pub max_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self::from_config(&RetryConfig::default())
  }
}

impl RetryPolicy {
  pub fn from_config(config: &RetryConfig) -> Self {
    Self {
      max_retries: config.max_retries,
      base_delay: Duration::from_millis(config.base_delay_ms),
      max_delay: Duration::from_millis(config.max_delay_ms),
    }
  }

  /// Single attempt, no waiting.
  #[cfg(test)]
  pub fn none() -> Self {
    Self {
      max_retries: 0,
      base_delay: Duration::ZERO,
      max_delay: Duration::ZERO,
    }
  }

  /// Wait before retry number `attempt` (zero based): `base * 2^attempt`, capped.
  pub fn delay_for(&self, attempt: u32) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    self.base_delay.saturating_mul(factor).min(self.max_delay)
  }

  /// Run `operation` until it succeeds, fails terminally, or retries run out.
  pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, ApiError>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
  {
    let mut attempt = 0;
    loop {
      match operation().await {
        Ok(value) => return Ok(value),
        Err(e) if e.is_retryable() && attempt < self.max_retries => {
          let delay = self.delay_for(attempt);
          attempt += 1;
          warn!(
            "{} failed, retrying in {:?} (attempt {}/{}): {}",
            label, delay, attempt, self.max_retries, e
          );
          tokio::time::sleep(delay).await;
        }
        Err(e) => return Err(e),
      }
    }
  }
}
