pub mod chunker;
pub mod combiner;
pub mod progress;
pub mod query;
pub mod reference;
pub mod summarizer;

use crate::client::error::ClientError;
use self::progress::CancelToken;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Structural failures of a summarize/query run.
///
/// Transient errors are retried inside the component that issued the call;
/// anything surfacing here terminates the run and discards partial state.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Too few caption segments to produce a useful summary
    #[error("not enough captions to summarize ({found} segments, need at least {required})")]
    NotEnoughCaptions { found: usize, required: usize },

    /// One chunk exhausted its retries; the whole run aborts
    #[error("chunk {index}/{total} failed: {source}")]
    ChunkFailed {
        index: usize,
        total: usize,
        #[source]
        source: ClientError,
    },

    /// A combine batch exhausted its retries; the whole combine tree aborts
    #[error("combine failed at level {level}: {source}")]
    CombineFailed {
        level: usize,
        #[source]
        source: ClientError,
    },

    /// The final answer merge failed
    #[error("answer combine failed: {source}")]
    AnswerCombineFailed {
        #[source]
        source: ClientError,
    },

    /// A superseding run cancelled this one
    #[error("run cancelled")]
    Cancelled,
}

/// Run one task per index in fixed-size concurrent batches, with a short
/// pause between batches.
///
/// Results come back in index order regardless of completion order inside a
/// batch, and batches never overlap. The first failed task aborts the whole
/// call.
pub(crate) async fn process_in_batches<F, Fut>(
    total: usize,
    max_concurrent: usize,
    inter_batch_delay: Duration,
    cancel: &CancelToken,
    make_task: F,
) -> Result<Vec<String>, PipelineError>
where
    F: Fn(usize) -> Fut,
    Fut: Future<Output = Result<String, PipelineError>>,
{
    let max_concurrent = max_concurrent.max(1);
    let mut results = Vec::with_capacity(total);
    let mut start = 0;

    while start < total {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let end = (start + max_concurrent).min(total);
        let batch = futures::future::try_join_all((start..end).map(&make_task)).await?;
        results.extend(batch);

        start = end;
        if start < total && !inter_batch_delay.is_zero() {
            tokio::time::sleep(inter_batch_delay).await;
        }
    }

    Ok(results)
}
