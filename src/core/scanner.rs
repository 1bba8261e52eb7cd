use crate::domain::model::Query;
use crate::domain::ports::Session;
use crate::utils::error::{InspectError, ScanError};
use std::time::Duration;

/// Walks a query's result rows in declared order and returns the first open one.
#[derive(Debug, Clone, Copy)]
pub struct AvailabilityScanner {
    timeout: Duration,
}

impl AvailabilityScanner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// The session must already show the results for `query`.
    pub async fn scan<S>(&self, session: &mut S, query: &Query) -> Result<Option<usize>, ScanError>
    where
        S: Session + ?Sized,
    {
        for &index in &query.center_indices {
            let row = tokio::time::timeout(self.timeout, session.inspect_row(index))
                .await
                .unwrap_or(Err(InspectError::Timeout(self.timeout)))
                .map_err(|source| ScanError::Inspect { index, source })?;

            if row.is_available() {
                tracing::debug!("Row {} open for {}", index, query.label());
                return Ok(Some(index));
            }
        }
        Ok(None)
    }
}
