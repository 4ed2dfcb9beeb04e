pub mod source;
pub mod srt;

use serde::{Deserialize, Serialize};

/// One caption line with absolute start/end times in seconds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptionSegment {
    /// Caption text
    pub text: String,
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
}

impl CaptionSegment {
    /// Create a new caption segment
    pub fn new(text: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            text: text.into().trim().to_string(),
            start,
            end,
        }
    }

    /// Duration covered by this segment in seconds
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// The ordered, deduplicated caption sequence for a single video.
///
/// Built once per video and never mutated afterwards; navigating to a new
/// video replaces the whole store rather than clearing fields in place.
#[derive(Debug, Clone, Default)]
pub struct TimedTextStore {
    segments: Vec<CaptionSegment>,
}

impl TimedTextStore {
    /// Build a store from raw segments: drops malformed entries, sorts by
    /// start time, and removes duplicates (same lowercased text within 0.1s).
    pub fn from_segments(segments: Vec<CaptionSegment>) -> Self {
        let mut sorted: Vec<CaptionSegment> = segments
            .into_iter()
            .filter(|s| s.start >= 0.0 && s.end >= s.start)
            .collect();
        sorted.sort_by(|a, b| a.start.partial_cmp(&b.start).unwrap_or(std::cmp::Ordering::Equal));

        let original_count = sorted.len();
        let mut seen: Vec<(String, f64)> = Vec::new();
        let mut unique = Vec::with_capacity(sorted.len());

        for segment in sorted {
            let key = segment.text.trim().to_lowercase();
            // The same text at a clearly different time is valid repetition
            let is_duplicate = seen
                .iter()
                .any(|(text, start)| *text == key && (start - segment.start).abs() < 0.1);
            if !is_duplicate {
                seen.push((key, segment.start));
                unique.push(segment);
            }
        }

        let removed = original_count - unique.len();
        if removed > 0 {
            tracing::debug!("Removed {} duplicate caption segments", removed);
        }

        Self { segments: unique }
    }

    /// Number of segments
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// All segments in start-time order
    pub fn segments(&self) -> &[CaptionSegment] {
        &self.segments
    }

    /// Segment at `index`, if present
    pub fn get(&self, index: usize) -> Option<&CaptionSegment> {
        self.segments.get(index)
    }

    /// End time of the last segment, i.e. the span covered by the captions
    pub fn total_duration(&self) -> f64 {
        self.segments
            .iter()
            .map(|s| s.end)
            .fold(0.0, f64::max)
    }

    /// Wall-clock span covered by a run of segment indices, from the first
    /// segment's start to the last segment's end
    pub fn span_duration(&self, indices: &[usize]) -> Option<f64> {
        let first = self.segments.get(*indices.first()?)?;
        let last = self.segments.get(*indices.last()?)?;
        let end = if last.end > 0.0 { last.end } else { last.start };
        Some((end - first.start).max(0.0))
    }
}
