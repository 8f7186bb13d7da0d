//! Operation deadlines.
//!
//! Every query and ingestion operation accepts a [`Deadline`]. On expiry
//! the pending future is dropped, which aborts any in-flight relational
//! transaction (rollback); graph mirroring already committed relationally
//! is not rolled back and is repaired on the next ingestion.

use crate::error::{EngineError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Clone, Copy, Debug, Default)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// No deadline.
    pub const NONE: Deadline = Deadline(None);

    pub fn none() -> Self {
        Self(None)
    }

    pub fn within(timeout: Duration) -> Self {
        Self(Some(Instant::now() + timeout))
    }

    pub fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }

    /// Run `future` under this deadline, mapping expiry to `Cancelled`.
    pub async fn run<T, F>(&self, operation: &str, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.0 {
            None => future.await,
            Some(at) => match tokio::time::timeout_at(at, future).await {
                Ok(result) => result,
                Err(_) => Err(EngineError::Cancelled(format!(
                    "{operation}: deadline expired"
                ))),
            },
        }
    }
}
