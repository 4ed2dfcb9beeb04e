use super::chunker::{chunk_segments, Chunk};
use super::progress::{CancelToken, ProgressTracker};
use super::reference::{reference_for_indices, reference_from_key_timestamps, KeyTimestamp};
use super::{process_in_batches, PipelineError};
use crate::captions::TimedTextStore;
use crate::client::retry::RetryPolicy;
use crate::client::{CallMeta, CallPhase, ModelClient};
use crate::config::Config;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Backoff caps for query chunk and combine retries
const QUERY_CHUNK_BACKOFF_CAP: Duration = Duration::from_millis(10_000);
const QUERY_COMBINE_BACKOFF_CAP: Duration = Duration::from_millis(12_000);

/// Answers a user question against the full caption text.
///
/// Same chunk → per-chunk call → combine shape as summarization, keyed on
/// the question instead of a fixed instruction: each chunk is answered only
/// from its own content, then the partial answers are merged into one
/// de-duplicated answer against the global timestamp reference.
pub struct QueryAnswerer {
    client: Arc<dyn ModelClient>,
    chunk_retry: RetryPolicy,
    combine_retry: RetryPolicy,
    max_chunk_chars: usize,
    max_concurrent: usize,
    inter_chunk_delay: Duration,
    reference_per_chunk: usize,
    reference_global: usize,
    progress: Arc<ProgressTracker>,
}

impl QueryAnswerer {
    pub fn new(client: Arc<dyn ModelClient>, config: &Config, progress: Arc<ProgressTracker>) -> Self {
        let chunk_retry = RetryPolicy {
            max_retries: config.retry.max_retries,
            base_delay: Duration::from_millis(config.retry.base_backoff_ms),
            max_delay: QUERY_CHUNK_BACKOFF_CAP,
            max_jitter: Duration::from_millis(config.retry.jitter_ms),
        };
        let combine_retry = chunk_retry
            .clone()
            .with_max_delay(QUERY_COMBINE_BACKOFF_CAP);

        Self {
            client,
            chunk_retry,
            combine_retry,
            max_chunk_chars: config.chunking.max_chunk_chars,
            max_concurrent: config.chunking.max_concurrent_chunks,
            inter_chunk_delay: Duration::from_millis(config.chunking.inter_chunk_delay_ms),
            reference_per_chunk: config.reference.max_per_chunk,
            reference_global: config.reference.max_global,
            progress,
        }
    }

    /// Answer `question` from the captions, returning one merged bullet-list
    /// answer
    pub async fn answer(
        &self,
        store: &TimedTextStore,
        question: &str,
        video_title: &str,
        key_timestamps: &[KeyTimestamp],
        run_id: &str,
        cancel: &CancelToken,
    ) -> Result<String, PipelineError> {
        if store.is_empty() {
            return Err(PipelineError::NotEnoughCaptions {
                found: 0,
                required: 1,
            });
        }

        let chunks = chunk_segments(store.segments(), self.max_chunk_chars);
        let total = chunks.len();
        self.progress.start(total);
        debug!("Answering question over {} chunks", total);

        let chunks = &chunks;
        let partial_answers = process_in_batches(
            total,
            self.max_concurrent,
            self.inter_chunk_delay,
            cancel,
            |index| async move {
                if cancel.is_cancelled() {
                    return Err(PipelineError::Cancelled);
                }

                let prompt = self.build_chunk_prompt(
                    store,
                    &chunks[index],
                    index,
                    total,
                    question,
                    video_title,
                );
                let meta =
                    CallMeta::new(run_id, CallPhase::QueryChunk).with_position(index + 1, total);

                let answer = self
                    .chunk_retry
                    .run_if(|e| !e.is_terminal(), |_| self.client.call(&prompt, &meta))
                    .await
                    .map_err(|source| PipelineError::ChunkFailed {
                        index: index + 1,
                        total,
                        source,
                    })?;

                self.progress.advance();
                Ok(answer)
            },
        )
        .await?;

        // A single chunk already is the whole answer
        if partial_answers.len() == 1 {
            return Ok(partial_answers.into_iter().next().unwrap_or_default());
        }

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let prompt =
            self.build_combine_prompt(&partial_answers, question, video_title, key_timestamps);
        let meta = CallMeta::new(run_id, CallPhase::QueryCombine);

        self.combine_retry
            .run_if(|e| !e.is_terminal(), |_| self.client.call(&prompt, &meta))
            .await
            .map_err(|source| PipelineError::AnswerCombineFailed { source })
    }

    fn build_chunk_prompt(
        &self,
        store: &TimedTextStore,
        chunk: &Chunk,
        index: usize,
        total: usize,
        question: &str,
        video_title: &str,
    ) -> String {
        let timestamp_reference =
            reference_for_indices(store, &chunk.segment_indices, self.reference_per_chunk);

        format!(
            r#"You are answering a question about the video titled "{title}".

Question: {question}

Here is CHUNK ({number}/{total}) of the video's captions:

{content}

Available timestamps from this chunk (use only these when referencing moments):
{reference}

Task: Provide a concise answer based ONLY on this chunk as a bullet list. For EVERY bullet point, you MUST:
- Include exactly one timestamp in [MM:SS] or [HH:MM:SS] format at the END, chosen from the list above. TIMESTAMP SELECTION STRATEGY:
  1. FIRST, try to find an exact match where the timestamp content directly relates to your bullet point
  2. If no exact match exists, find the CLOSEST TIMESTAMP IN TIME to when that content was discussed in this chunk
  3. Use temporal proximity - if content was discussed around a certain time, use timestamps near that time even if the exact words don't match perfectly
  4. The goal is to help users jump to the right general time period, so approximate timestamps based on time proximity are acceptable
- ALWAYS include a timestamp - find the best match based on content OR time proximity. NEVER use [N/A] or write messages about missing timestamps.
- Do not invent timestamps. Use only the timestamps listed above."#,
            title = video_title,
            question = question,
            number = index + 1,
            total = total,
            content = chunk.text,
            reference = timestamp_reference,
        )
    }

    fn build_combine_prompt(
        &self,
        partial_answers: &[String],
        question: &str,
        video_title: &str,
        key_timestamps: &[KeyTimestamp],
    ) -> String {
        let global_reference = reference_from_key_timestamps(key_timestamps, self.reference_global);
        let parts = partial_answers
            .iter()
            .enumerate()
            .map(|(idx, answer)| format!("Part {}:\n{}", idx + 1, answer))
            .collect::<Vec<_>>()
            .join("\n\n");

        format!(
            r#"You are given {count} partial answers to the question "{question}" about the video "{title}".

Combine them into one high-quality answer AS A BULLET LIST (you may group bullets under short headers if needed). Remove contradictions and duplicates, prefer precise statements with timestamps, and clearly state if some information is not available from the provided content. Use only the timestamps listed below when referencing moments.

Available timestamps from the video:
{reference}

Partial answers:

{parts}

Final formatting rules for your output:
- Output bullets only (you may include short headers, but make the content bullets).
- EVERY bullet point MUST include one timestamp in [MM:SS] or [HH:MM:SS] format at the END, pulled from the available timestamps above. TIMESTAMP SELECTION STRATEGY:
  1. FIRST, try to find an exact match where the timestamp content directly relates to your bullet point
  2. If no exact match exists, find the CLOSEST TIMESTAMP IN TIME to when that content was discussed
  3. Use temporal proximity - if content was discussed around a certain time, use timestamps near that time (within 30-60 seconds) even if the exact words don't match perfectly
  4. The goal is to help users jump to the right general time period, so approximate timestamps based on time proximity are acceptable and preferred
- ALWAYS include a timestamp - choose based on content match OR time proximity. NEVER use [N/A] or write messages about missing timestamps.
- Do not invent timestamps. Use only the timestamps listed above."#,
            count = partial_answers.len(),
            question = question,
            title = video_title,
            reference = global_reference,
            parts = parts,
        )
    }
}
