use super::chunker::Chunk;
use super::progress::{CancelToken, ProgressTracker};
use super::reference::reference_for_indices;
use super::{process_in_batches, PipelineError};
use crate::captions::TimedTextStore;
use crate::client::retry::RetryPolicy;
use crate::client::{CallMeta, CallPhase, ModelClient};
use crate::config::Config;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Backoff cap for per-chunk retries
const CHUNK_BACKOFF_CAP: Duration = Duration::from_millis(10_000);

/// Summarizes each chunk independently with bounded concurrency.
///
/// Chunk calls run in fixed-size batches; results are stored by chunk index
/// so the combiner always sees them in source order. Any chunk exhausting
/// its retries aborts the whole run; no partial summary is produced.
pub struct ChunkSummarizer {
    client: Arc<dyn ModelClient>,
    retry: RetryPolicy,
    max_concurrent: usize,
    inter_chunk_delay: Duration,
    estimated_response_tokens: u32,
    reference_max: usize,
    progress: Arc<ProgressTracker>,
}

impl ChunkSummarizer {
    pub fn new(client: Arc<dyn ModelClient>, config: &Config, progress: Arc<ProgressTracker>) -> Self {
        let retry = RetryPolicy {
            max_retries: config.retry.max_retries,
            base_delay: Duration::from_millis(config.retry.base_backoff_ms),
            max_delay: CHUNK_BACKOFF_CAP,
            max_jitter: Duration::from_millis(config.retry.jitter_ms),
        };

        Self {
            client,
            retry,
            max_concurrent: config.chunking.max_concurrent_chunks,
            inter_chunk_delay: Duration::from_millis(config.chunking.inter_chunk_delay_ms),
            estimated_response_tokens: config.chunking.estimated_response_tokens,
            reference_max: config.reference.max_per_chunk,
            progress,
        }
    }

    /// Summarize every chunk, returning one summary per chunk in source
    /// order. Progress advances as chunks complete.
    pub async fn summarize_chunks(
        &self,
        store: &TimedTextStore,
        chunks: &[Chunk],
        video_title: &str,
        total_duration: f64,
        run_id: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<String>, PipelineError> {
        let total = chunks.len();
        self.progress.start(total);
        debug!("Summarizing {} chunks for \"{}\"", total, video_title);

        process_in_batches(total, self.max_concurrent, self.inter_chunk_delay, cancel, |index| {
            async move {
                if cancel.is_cancelled() {
                    return Err(PipelineError::Cancelled);
                }

                let prompt =
                    self.build_chunk_prompt(store, chunks, index, video_title, total_duration);
                let meta =
                    CallMeta::new(run_id, CallPhase::Chunk).with_position(index + 1, total);

                let summary = self
                    .retry
                    .run_if(|e| !e.is_terminal(), |_| self.client.call(&prompt, &meta))
                    .await
                    .map_err(|source| PipelineError::ChunkFailed {
                        index: index + 1,
                        total,
                        source,
                    })?;

                self.progress.advance();
                Ok(summary)
            }
        })
        .await
    }

    fn build_chunk_prompt(
        &self,
        store: &TimedTextStore,
        chunks: &[Chunk],
        index: usize,
        video_title: &str,
        total_duration: f64,
    ) -> String {
        let total = chunks.len();
        let chunk = &chunks[index];
        let is_first = index == 0;
        let is_last = index == total - 1;
        let position = if is_first {
            "beginning"
        } else if is_last {
            "end"
        } else {
            "middle"
        };

        let chunk_duration = store.span_duration(&chunk.segment_indices);
        let proportion_pct = chunk_proportion_pct(chunk_duration, total_duration, total);
        let token_budget = calculate_token_budget(
            chunk_duration,
            total_duration,
            total,
            self.estimated_response_tokens,
        );
        let timestamp_reference =
            reference_for_indices(store, &chunk.segment_indices, self.reference_max);

        format!(
            r#"You will receive chunk {number} of {total} from the video titled "{title}". This chunk represents the {position} portion of the video (approximately {pct}% of the video).

TOKEN BUDGET ALLOCATION:
- This chunk represents {pct}% of the total video
- You have approximately {budget} tokens allocated for your response
- Use your token budget PROPORTIONALLY - do not exceed this allocation
- Keep your summary CONCISE and focused on the KEY information from this chunk
- Ensure EVEN coverage within this chunk - don't spend all tokens on the start

IMPORTANT: This is ONE PART of a longer video that will be combined with other chunks. Your summary will be merged with summaries from other parts of the video. Therefore:
- Keep your summary CONCISE and focused on the KEY information from this chunk
- Do NOT over-detail early content - save detail for important points throughout
- Ensure you cover the content in this chunk EVENLY - don't spend all your detail on the start of this chunk
- If this is the final chunk ({last_marker}), make sure to include ALL important content from the end of the video
- If this is the first chunk ({first_marker}), be concise so later chunks have room for detail
- RESPECT YOUR TOKEN BUDGET: This chunk is {pct}% of the video - use approximately {pct}% of your available detail/tokens

Chunk content:
{content}

Available timestamps from this chunk (use only these when referencing moments):
{reference}

CRITICAL FORMATTING REQUIREMENT:
- START YOUR RESPONSE DIRECTLY WITH THE FIRST SECTION HEADER (##)
- DO NOT include any introductory text, explanations, or meta-commentary before the summary
- DO NOT write phrases like "Here's a summary" or "Okay, here's..." or any similar introductory text
- Begin immediately with the markdown structure

Create a summary with:
- Logical section headers (##) that describe the content in this chunk - add relevant emojis to headers (e.g., 📝, 💡, 🎯, ⚠️, ✅, 🔑)
- Bullet points summarizing the key information in each section
- EVERY bullet point MUST include a timestamp in [MM:SS] or [HH:MM:SS] format
- Match each bullet point to the most relevant timestamp from the list above
- Include as many bullets per section as needed based on content density, but keep them concise
- Use **bold text** EXTENSIVELY - bold at least 2-4 key words or phrases in EVERY bullet point for better readability
- Bold important terms, concepts, numbers, statistics, names, features, and key information

CRITICAL:
- Every bullet point must have a timestamp. Use only timestamps listed above. Do not make up timestamps.
- Aim for 30-50% of each bullet point to be bolded for optimal readability.
- Keep summaries concise and evenly detailed - this chunk will be combined with others, so don't over-detail early content.
- Ensure you cover ALL important content from this chunk, especially if this is the final chunk."#,
            number = index + 1,
            total = total,
            title = video_title,
            position = position,
            pct = proportion_pct,
            budget = token_budget,
            last_marker = if is_last { "YES" } else { "NO" },
            first_marker = if is_first { "YES" } else { "NO" },
            content = chunk.text,
            reference = timestamp_reference,
        )
    }
}

/// Percentage of the video's runtime this chunk covers, one decimal place;
/// falls back to an equal split when durations are unknown
fn chunk_proportion_pct(chunk_duration: Option<f64>, total_duration: f64, total_chunks: usize) -> String {
    match chunk_duration {
        Some(duration) if total_duration > 0.0 => {
            format!("{:.1}", duration / total_duration * 100.0)
        }
        _ => format!("{:.1}", 100.0 / total_chunks.max(1) as f64),
    }
}

/// Response-token budget for a chunk, proportional to the runtime it covers
/// with an equal-split floor so no chunk is starved.
///
/// A heuristic estimate only, never verified against real token counts.
pub(crate) fn calculate_token_budget(
    chunk_duration: Option<f64>,
    total_duration: f64,
    total_chunks: usize,
    estimated_max_tokens: u32,
) -> u32 {
    let total_chunks = total_chunks.max(1) as u32;
    let equal_share = estimated_max_tokens / total_chunks;

    match chunk_duration {
        Some(duration) if total_duration > 0.0 => {
            let proportional = (estimated_max_tokens as f64 * duration / total_duration) as u32;
            proportional.max(equal_share)
        }
        _ => equal_share,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_budget_proportional() {
        // A chunk covering half the runtime gets half the pool
        assert_eq!(calculate_token_budget(Some(300.0), 600.0, 4, 4000), 2000);
    }

    #[test]
    fn test_token_budget_floor() {
        // A tiny chunk still gets the equal-split floor
        assert_eq!(calculate_token_budget(Some(6.0), 600.0, 4, 4000), 1000);
    }

    #[test]
    fn test_token_budget_fallback_without_durations() {
        assert_eq!(calculate_token_budget(None, 600.0, 5, 4000), 800);
        assert_eq!(calculate_token_budget(Some(10.0), 0.0, 5, 4000), 800);
    }

    #[test]
    fn test_chunk_proportion_formatting() {
        assert_eq!(chunk_proportion_pct(Some(150.0), 600.0, 4), "25.0");
        assert_eq!(chunk_proportion_pct(None, 600.0, 4), "25.0");
        assert_eq!(chunk_proportion_pct(Some(200.0), 600.0, 3), "33.3");
    }
}
