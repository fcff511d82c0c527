use std::future::Future;
use std::time::Duration;

use crate::error::DaemonError;

/// Run `fut` under a deadline. Expiry becomes [`DaemonError::Timeout`] for `op`.
pub(crate) async fn with_deadline<T, F>(
    op: &'static str,
    limit: Duration,
    fut: F,
) -> Result<T, DaemonError>
where
    F: Future<Output = Result<T, DaemonError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(DaemonError::Timeout { op, after: limit }),
    }
}
