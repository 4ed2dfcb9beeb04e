use super::progress::CancelToken;
use super::reference::{reference_from_key_timestamps, KeyTimestamp};
use super::PipelineError;
use crate::client::retry::RetryPolicy;
use crate::client::{CallMeta, CallPhase, ModelClient};
use crate::config::Config;
use crate::timestamp::format_timestamp;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Backoff cap for combine-batch retries
const COMBINE_BACKOFF_CAP: Duration = Duration::from_millis(12_000);

/// Backoff cap and retry bound for the best-effort compression pass
const COMPRESSION_BACKOFF_CAP: Duration = Duration::from_millis(8_000);
const COMPRESSION_MAX_RETRIES: u32 = 2;

/// Merges partial summaries into one document via batched combine calls.
///
/// Partials are reduced level by level: each level is partitioned into
/// batches, one combine call per batch, and the outputs become the next
/// level's inputs until a single document remains. Levels never overlap.
/// Long sources then get a coverage-compression pass that rebalances detail
/// across the timeline; that pass is best-effort and falls back to the
/// uncompressed document on failure.
pub struct HierarchicalCombiner {
    client: Arc<dyn ModelClient>,
    retry: RetryPolicy,
    compression_retry: RetryPolicy,
    batch_size: usize,
    inter_combine_delay: Duration,
    compression_threshold_secs: f64,
    reference_max: usize,
}

impl HierarchicalCombiner {
    pub fn new(client: Arc<dyn ModelClient>, config: &Config) -> Self {
        let retry = RetryPolicy {
            max_retries: config.retry.max_retries,
            base_delay: Duration::from_millis(config.retry.base_backoff_ms),
            max_delay: COMBINE_BACKOFF_CAP,
            max_jitter: Duration::from_millis(config.retry.jitter_ms),
        };
        let compression_retry = RetryPolicy {
            max_retries: COMPRESSION_MAX_RETRIES,
            base_delay: Duration::from_millis(config.retry.base_backoff_ms),
            max_delay: COMPRESSION_BACKOFF_CAP,
            max_jitter: Duration::from_millis(config.retry.jitter_ms),
        };

        Self {
            client,
            retry,
            compression_retry,
            batch_size: config.combine.batch_size.max(2),
            inter_combine_delay: Duration::from_millis(config.combine.inter_combine_delay_ms),
            compression_threshold_secs: config.combine.compression_threshold_secs,
            reference_max: config.reference.max_global,
        }
    }

    /// Reduce `partials` to a single summary document
    pub async fn combine(
        &self,
        partials: Vec<String>,
        video_title: &str,
        key_timestamps: &[KeyTimestamp],
        total_duration: f64,
        run_id: &str,
        cancel: &CancelToken,
    ) -> Result<String, PipelineError> {
        let total_partials = partials.len();
        let mut current_level = partials;
        let mut level = 0;

        while current_level.len() > 1 {
            level += 1;
            debug!(
                "Combine level {}: {} partials in batches of {}",
                level,
                current_level.len(),
                self.batch_size
            );

            let mut next_level = Vec::new();
            let batch_count = current_level.len().div_ceil(self.batch_size);
            for (batch_index, batch) in current_level.chunks(self.batch_size).enumerate() {
                if cancel.is_cancelled() {
                    return Err(PipelineError::Cancelled);
                }

                let combined = self
                    .combine_one_batch(batch, video_title, key_timestamps, total_partials, level, run_id)
                    .await?;
                next_level.push(combined);

                if batch_index + 1 < batch_count && !self.inter_combine_delay.is_zero() {
                    tokio::time::sleep(self.inter_combine_delay).await;
                }
            }
            current_level = next_level;
        }

        let combined = current_level.into_iter().next().unwrap_or_default();

        // Short sources don't need redistribution; skip the extra call
        let final_summary = if total_duration > self.compression_threshold_secs {
            self.compress_for_even_coverage(
                combined,
                video_title,
                key_timestamps,
                total_duration,
                run_id,
                cancel,
            )
            .await
        } else {
            combined
        };

        Ok(strip_leading_text(&final_summary).to_string())
    }

    async fn combine_one_batch(
        &self,
        batch: &[String],
        video_title: &str,
        key_timestamps: &[KeyTimestamp],
        total_partials: usize,
        level: usize,
        run_id: &str,
    ) -> Result<String, PipelineError> {
        let prompt = self.build_combine_prompt(batch, video_title, key_timestamps, total_partials);
        let meta = CallMeta::new(run_id, CallPhase::Combine);

        let combined = self
            .retry
            .run_if(|e| !e.is_terminal(), |_| self.client.call(&prompt, &meta))
            .await
            .map_err(|source| PipelineError::CombineFailed { level, source })?;

        Ok(strip_leading_text(&combined).to_string())
    }

    async fn compress_for_even_coverage(
        &self,
        summary: String,
        video_title: &str,
        key_timestamps: &[KeyTimestamp],
        total_duration: f64,
        run_id: &str,
        cancel: &CancelToken,
    ) -> String {
        if cancel.is_cancelled() {
            return summary;
        }

        let prompt =
            self.build_compression_prompt(&summary, video_title, key_timestamps, total_duration);
        let meta = CallMeta::new(run_id, CallPhase::Compression);

        match self
            .compression_retry
            .run_if(|e| !e.is_terminal(), |_| self.client.call(&prompt, &meta))
            .await
        {
            Ok(compressed) => {
                debug!("Coverage-compression pass completed");
                strip_leading_text(&compressed).to_string()
            }
            Err(e) => {
                warn!("Coverage-compression pass failed, keeping combined summary: {}", e);
                summary
            }
        }
    }

    fn build_combine_prompt(
        &self,
        batch: &[String],
        video_title: &str,
        key_timestamps: &[KeyTimestamp],
        total_partials: usize,
    ) -> String {
        let global_reference = reference_from_key_timestamps(key_timestamps, self.reference_max);
        let batch_proportion = if total_partials > 0 {
            format!("{:.1}", batch.len() as f64 / total_partials as f64 * 100.0)
        } else {
            "unknown".to_string()
        };
        let parts = batch
            .iter()
            .enumerate()
            .map(|(idx, summary)| format!("Part {}:\n{}", idx + 1, summary))
            .collect::<Vec<_>>()
            .join("\n\n");

        format!(
            r###"You are given {count} partial summaries (representing {proportion}% of the video) for the video titled "{title}". These summaries represent different parts of the video from start to finish. Merge them into one cohesive summary that covers the ENTIRE video evenly.

TOKEN BUDGET AWARENESS:
- These {count} summaries represent {proportion}% of the total video
- Allocate your response tokens proportionally across all parts
- Do NOT over-allocate tokens to early summaries - ensure later summaries get adequate representation
- Maintain EVEN detail distribution across all parts

CRITICAL: This video has been split into multiple parts. You MUST ensure that:
- ALL parts of the video are represented in the final summary - from beginning to end
- Content from later parts of the video is NOT omitted or cut short
- The summary maintains EVEN coverage across the entire video timeline
- If you notice that later parts of the video have less detail, prioritize including content from those parts
- The summary should flow chronologically from start to finish, covering the entire video

Analyze all partial summaries to identify natural thematic or chronological sections. Create section headers that accurately describe each part of the video, then organize the content accordingly.

Structure:
- Start with an "## Overview" section (1-2 sentences)
- Create logical sections based on the video's content structure (e.g., "Introduction", "Main Concepts", "Examples", "Conclusion", or topic-specific headers)
- Order sections chronologically as they appear in the video - ensure you cover from start to finish
- Include as many bullet points per section as needed to adequately summarize the content
- End with a "## Key Takeaways" section

CRITICAL REQUIREMENTS:
- EVERY bullet point MUST include a timestamp in [MM:SS] or [HH:MM:SS] format
- Match each bullet point to the most relevant timestamp from the list below
- If a bullet covers content from multiple timestamps, use the timestamp that best represents the main point
- Avoid duplication - merge similar content from different partial summaries
- Maintain chronological order when possible
- ENSURE COMPLETE COVERAGE: Make sure content from ALL parts of the video (especially later parts) is included in the final summary
- Do NOT cut off early - the summary must cover the entire video from start to finish
- Use only the timestamps listed below when referencing specific moments - do not make up timestamps
- Use **bold text** EXTENSIVELY - bold at least 2-4 key words or phrases in EVERY bullet point for better readability
- Bold important terms, concepts, numbers, statistics, names, features, actions, and key takeaways
- Add relevant emojis to section headers to make them more visually engaging (e.g., 📝 Introduction, 💡 Key Concepts, 🎯 Main Points, ⚠️ Important Notes, ✅ Conclusion, 🔑 Key Takeaways)
- The number of sections and bullets should be determined by the actual content, not a fixed template
- Aim for 30-50% of each bullet point to be bolded for optimal readability
- Prioritize including content from later parts of the video if space is limited - ensure the entire video is covered

Available timestamps from the video:
{reference}

Partial summaries:

{parts}

CRITICAL FORMATTING REQUIREMENT:
- START YOUR RESPONSE DIRECTLY WITH "## Overview"
- DO NOT include any introductory text, explanations, or meta-commentary before the summary
- DO NOT write phrases like "Here's a merged summary" or "Okay, here's..." or any similar introductory text
- Begin immediately with the markdown structure: ## Overview"###,
            count = batch.len(),
            proportion = batch_proportion,
            title = video_title,
            reference = global_reference,
            parts = parts,
        )
    }

    fn build_compression_prompt(
        &self,
        summary: &str,
        video_title: &str,
        key_timestamps: &[KeyTimestamp],
        total_duration: f64,
    ) -> String {
        let global_reference = reference_from_key_timestamps(key_timestamps, self.reference_max);
        let duration_str = format_timestamp(total_duration);

        format!(
            r###"You are given a summary for the video titled "{title}". This summary was created by combining multiple parts of the video.

CRITICAL TASK: Redistribute detail to ensure EVEN coverage across the ENTIRE video timeline.

ANALYZE THE SUMMARY:
1. Check if the summary covers the entire video from start to finish
2. Identify if early sections have excessive detail while later sections are sparse or missing
3. Verify that timestamps span the full video duration (total duration: {duration})

REDISTRIBUTION RULES:
- If early sections are too detailed, COMPRESS them while preserving key information
- If later sections are sparse or missing, EXPAND them with more detail
- Ensure the summary maintains chronological flow from beginning to end
- Every section should have proportional detail based on its importance, not its position
- The summary MUST cover the entire video timeline - do not cut off early

STRUCTURE REQUIREMENTS:
- Start with an "## Overview" section (1-2 sentences)
- Create logical sections that cover the ENTIRE video chronologically
- End with a "## Key Takeaways" section
- EVERY bullet point MUST include a timestamp in [MM:SS] or [HH:MM:SS] format
- Use **bold text** EXTENSIVELY - bold at least 2-4 key words/phrases per bullet
- Add relevant emojis to section headers

AVAILABLE TIMESTAMPS FROM THE VIDEO:
{reference}

CURRENT SUMMARY (may need redistribution):
{summary}

CRITICAL FORMATTING REQUIREMENT:
- START YOUR RESPONSE DIRECTLY WITH "## Overview"
- DO NOT include any introductory text, explanations, or meta-commentary before the summary
- DO NOT write phrases like "Here's a revised summary" or "Okay, here's..." or any similar introductory text
- Begin immediately with the markdown structure: ## Overview

Please provide a redistributed summary that ensures complete, even coverage of the entire video from start to finish."###,
            title = video_title,
            duration = duration_str,
            reference = global_reference,
            summary = summary,
        )
    }
}

/// Discard conversational preamble: output starts at `## Overview` or the
/// first markdown header, whichever comes first.
pub fn strip_leading_text(summary: &str) -> &str {
    let overview_index = summary.find("## Overview");
    let header_index = Regex::new(r"(?m)^##\s")
        .ok()
        .and_then(|re| re.find(summary))
        .map(|m| m.start());

    let start = match (overview_index, header_index) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    };

    match start {
        Some(index) if index > 0 => summary[index..].trim_start_matches('\n'),
        _ => summary,
    }
}
