//! Per-call deadlines for store operations.

use std::future::Future;
use std::time::Duration;

use crate::error_handling::DatabaseError;

/// Runs a store call under `deadline`.
///
/// A call that overruns is dropped and reported as `DatabaseError::Timeout`,
/// so a stuck store cannot stall the scheduler or a request handler.
pub(crate) async fn with_deadline<T, F>(deadline: Duration, call: F) -> Result<T, DatabaseError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result.map_err(DatabaseError::from),
        Err(_) => Err(DatabaseError::Timeout(deadline)),
    }
}
