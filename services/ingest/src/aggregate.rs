//! Join barrier for fanned-out rendition tasks.

use crate::error::IngestError;
use futures::future;
use tokio::task::JoinHandle;
use tracing::warn;

/// Wait for every task, then report.
///
/// Never returns before all `tasks` have completed, so no task outlives the
/// call unobserved. On failure the error of the earliest-assigned failing task
/// is returned; later failures are logged. Outputs of successful siblings are
/// left in place.
pub async fn aggregate<T>(
    tasks: Vec<(String, JoinHandle<Result<T, IngestError>>)>,
) -> Result<Vec<T>, IngestError> {
    let (names, handles): (Vec<String>, Vec<_>) = tasks.into_iter().unzip();
    let results = future::join_all(handles).await;

    let mut outputs = Vec::with_capacity(results.len());
    let mut first_error: Option<IngestError> = None;

    for (name, joined) in names.into_iter().zip(results) {
        let outcome = joined.unwrap_or_else(|join_error| {
            Err(IngestError::RenditionTaskFailed {
                rendition: name.clone(),
                reason: join_error.to_string(),
            })
        });

        match outcome {
            Ok(output) => outputs.push(output),
            Err(e) => {
                warn!(rendition = %name, error = %e, "Rendition task failed");
                metrics::counter!("ingest.renditions.failed").increment(1);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(outputs),
    }
}
