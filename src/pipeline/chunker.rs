use crate::captions::CaptionSegment;

/// A bounded-size concatenation of consecutive caption segments, sent to the
/// model in one request. Carries the segment indices it covers so timestamps
/// stay attributable after summarization.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Segment texts joined with spaces
    pub text: String,
    /// Contiguous, ascending indices into the owning store
    pub segment_indices: Vec<usize>,
}

/// Split segments into chunks aligned on caption boundaries.
///
/// Segments accumulate greedily until appending the next one would exceed
/// `max_chars`; a chunk always holds at least one segment, so an oversized
/// single segment is never split and a chunk may exceed the budget by at
/// most one segment's length.
pub fn chunk_segments(segments: &[CaptionSegment], max_chars: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut buffer = String::new();
    let mut indices: Vec<usize> = Vec::new();

    for (i, segment) in segments.iter().enumerate() {
        let addition_len = segment.text.len() + 1;
        if buffer.len() + addition_len > max_chars && !indices.is_empty() {
            chunks.push(Chunk {
                text: buffer.trim().to_string(),
                segment_indices: std::mem::take(&mut indices),
            });
            buffer.clear();
        }
        buffer.push_str(&segment.text);
        buffer.push(' ');
        indices.push(i);
    }

    if !indices.is_empty() {
        chunks.push(Chunk {
            text: buffer.trim().to_string(),
            segment_indices: indices,
        });
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segments(texts: &[&str]) -> Vec<CaptionSegment> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| CaptionSegment::new(*t, i as f64 * 10.0, i as f64 * 10.0 + 5.0))
            .collect()
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        assert!(chunk_segments(&[], 100).is_empty());
    }

    #[test]
    fn test_all_segments_fit_one_chunk() {
        let segs = segments(&["one", "two", "three"]);
        let chunks = chunk_segments(&segs, 1000);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "one two three");
        assert_eq!(chunks[0].segment_indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_budget_splits_on_segment_boundaries() {
        let segs = segments(&["aaaa", "bbbb", "cccc", "dddd"]);
        // Two segments (plus separators) fit per chunk
        let chunks = chunk_segments(&segs, 10);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "aaaa bbbb");
        assert_eq!(chunks[1].text, "cccc dddd");
        assert_eq!(chunks[0].segment_indices, vec![0, 1]);
        assert_eq!(chunks[1].segment_indices, vec![2, 3]);
    }

    #[test]
    fn test_oversized_segment_is_never_split() {
        let long = "x".repeat(500);
        let segs = segments(&["short", long.as_str(), "tail"]);
        let chunks = chunk_segments(&segs, 50);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, "short");
        assert_eq!(chunks[1].text, long);
        assert_eq!(chunks[2].text, "tail");
        // Every chunk has at least one segment
        assert!(chunks.iter().all(|c| !c.segment_indices.is_empty()));
    }

    #[test]
    fn test_coverage_and_ordering() {
        let texts: Vec<String> = (0..25).map(|i| format!("segment number {}", i)).collect();
        let refs: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();
        let segs = segments(&refs);
        let chunks = chunk_segments(&segs, 80);

        // Concatenated indices cover 0..N exactly once, in order
        let all_indices: Vec<usize> = chunks
            .iter()
            .flat_map(|c| c.segment_indices.iter().copied())
            .collect();
        assert_eq!(all_indices, (0..25).collect::<Vec<_>>());

        // Every segment's text appears in its chunk
        for chunk in &chunks {
            for &i in &chunk.segment_indices {
                assert!(chunk.text.contains(&segs[i].text));
            }
        }

        // Indices are contiguous runs
        for chunk in &chunks {
            for pair in chunk.segment_indices.windows(2) {
                assert_eq!(pair[1], pair[0] + 1);
            }
        }
    }
}
