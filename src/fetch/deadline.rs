//! Per-request deadlines.
//!
//! Every suspension point of a request runs through [`RequestDeadline::run`].
//! When the deadline passes, the pending future is dropped, which cancels the
//! underlying fetch, and a [`GadgetError::Timeout`] is returned instead of
//! leaving the request hanging.

use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, timeout_at};

use crate::core::GadgetError;

/// Point in time after which a request's pending I/O is abandoned.
#[derive(Debug, Clone, Copy)]
pub struct RequestDeadline {
    at: Instant,
}

impl RequestDeadline {
    /// Deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now() + timeout,
        }
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// Whether the deadline has passed.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Drive `future` to completion unless the deadline passes first.
    ///
    /// # Errors
    ///
    /// Returns the future's own error, or [`GadgetError::Timeout`] naming
    /// `operation` when the deadline passes first.
    pub async fn run<T, F>(&self, operation: &str, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match timeout_at(self.at, future).await {
            Ok(result) => result,
            Err(_) => Err(GadgetError::Timeout {
                operation: operation.to_string(),
            }
            .into()),
        }
    }
}
