use serde_derive::{Deserialize, Serialize};
use std::io::{Error, ErrorKind, Result};
use std::time::Duration;

/// Bounded retry with exponential backoff, used when acquiring a handle from a byte source
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 50,
            max_backoff_ms: 2000,
        }
    }
}

fn is_permanent(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::NotFound | ErrorKind::PermissionDenied | ErrorKind::InvalidInput
    )
}

impl RetryPolicy {
    /// A policy that gives up after the first failure
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Run `op` until it succeeds, the error is permanent, or the attempts are used up.
    /// The closure receives the 1-based attempt number.
    pub fn run<T, F>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Result<T>,
    {
        let attempts = self.max_attempts.max(1);
        let mut backoff = self.initial_backoff_ms;
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) if is_permanent(e.kind()) => return Err(e),
                Err(e) if attempt >= attempts => {
                    return Err(Error::new(
                        e.kind(),
                        format!("{}: giving up after {} attempts: {}", what, attempts, e),
                    ));
                }
                Err(e) => {
                    log::warn!(
                        "{} failed (attempt {}/{}): {}, retrying in {}ms",
                        what,
                        attempt,
                        attempts,
                        e,
                        backoff
                    );
                    std::thread::sleep(Duration::from_millis(backoff));
                    backoff = backoff.saturating_mul(2).min(self.max_backoff_ms);
                    attempt += 1;
                }
            }
        }
    }
}
