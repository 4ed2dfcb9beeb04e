use crate::captions::TimedTextStore;
use crate::timestamp::format_timestamp;
use serde::Serialize;

/// A sampled caption moment the model is allowed to cite.
///
/// The set of key timestamps is the only legitimate source of timestamps in
/// combine and compression prompts; every prompt embedding a reference block
/// instructs the model not to cite anything outside it.
#[derive(Debug, Clone, Serialize)]
pub struct KeyTimestamp {
    /// Absolute time in seconds
    pub time: f64,
    /// Display form, `M:SS` or `H:MM:SS`
    pub formatted: String,
    /// The caption text at that moment
    pub content: String,
}

/// Sample up to `max` roughly-evenly-spaced key timestamps from the store,
/// always including the first and last segments.
pub fn extract_key_timestamps(store: &TimedTextStore, max: usize) -> Vec<KeyTimestamp> {
    let total = store.len();
    if total == 0 || max == 0 {
        return Vec::new();
    }

    let step = (total / max).max(1);
    let mut key_timestamps = Vec::new();

    for i in (0..total).step_by(step) {
        if key_timestamps.len() >= max {
            break;
        }
        if let Some(segment) = store.get(i) {
            key_timestamps.push(KeyTimestamp {
                time: segment.start,
                formatted: format_timestamp(segment.start),
                content: segment.text.clone(),
            });
        }
    }

    // The first and last moments anchor the full timeline
    if let Some(first) = store.get(0) {
        if !key_timestamps.iter().any(|ts| ts.time == first.start) {
            key_timestamps.insert(
                0,
                KeyTimestamp {
                    time: first.start,
                    formatted: format_timestamp(first.start),
                    content: first.text.clone(),
                },
            );
        }
    }
    if let Some(last) = store.get(total - 1) {
        if !key_timestamps.iter().any(|ts| ts.time == last.start) {
            key_timestamps.push(KeyTimestamp {
                time: last.start,
                formatted: format_timestamp(last.start),
                content: last.text.clone(),
            });
        }
    }

    key_timestamps
}

/// Render the "available timestamps" block for one chunk's segment indices.
/// Lines look like `• [1:23] - "caption text"`; segments with empty text are
/// skipped and at most `max_items` lines are produced.
pub fn reference_for_indices(store: &TimedTextStore, indices: &[usize], max_items: usize) -> String {
    let mut items = Vec::new();

    for &idx in indices {
        if items.len() >= max_items {
            break;
        }
        let Some(segment) = store.get(idx) else {
            continue;
        };
        let content = segment.text.trim();
        if content.is_empty() {
            continue;
        }
        items.push(format!(
            "• [{}] - \"{}\"",
            format_timestamp(segment.start),
            content
        ));
    }

    items.join("\n")
}

/// Render the global "available timestamps" block from key timestamps
pub fn reference_from_key_timestamps(key_timestamps: &[KeyTimestamp], max_items: usize) -> String {
    key_timestamps
        .iter()
        .take(max_items)
        .map(|ts| format!("• [{}] - \"{}\"", ts.formatted, ts.content.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::captions::CaptionSegment;

    fn store(count: usize) -> TimedTextStore {
        TimedTextStore::from_segments(
            (0..count)
                .map(|i| {
                    CaptionSegment::new(
                        format!("caption {}", i),
                        i as f64 * 30.0,
                        i as f64 * 30.0 + 5.0,
                    )
                })
                .collect(),
        )
    }

    #[test]
    fn test_key_timestamps_include_first_and_last() {
        let store = store(100);
        let key = extract_key_timestamps(&store, 20);

        assert!(key.len() <= 22);
        assert_eq!(key.first().unwrap().time, 0.0);
        assert_eq!(key.last().unwrap().time, 99.0 * 30.0);
    }

    #[test]
    fn test_key_timestamps_small_store_takes_all() {
        let store = store(3);
        let key = extract_key_timestamps(&store, 20);

        assert_eq!(key.len(), 3);
        assert_eq!(key[1].formatted, "0:30");
    }

    #[test]
    fn test_key_timestamps_empty_store() {
        assert!(extract_key_timestamps(&TimedTextStore::default(), 20).is_empty());
    }

    #[test]
    fn test_reference_for_indices_format() {
        let store = store(5);
        let reference = reference_for_indices(&store, &[0, 2], 20);

        let lines: Vec<&str> = reference.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "• [0:00] - \"caption 0\"");
        assert_eq!(lines[1], "• [1:00] - \"caption 2\"");
    }

    #[test]
    fn test_reference_for_indices_truncates() {
        let store = store(50);
        let indices: Vec<usize> = (0..50).collect();
        let reference = reference_for_indices(&store, &indices, 20);
        assert_eq!(reference.lines().count(), 20);
    }

    #[test]
    fn test_reference_skips_empty_text() {
        let store = TimedTextStore::from_segments(vec![
            CaptionSegment::new("  ", 0.0, 1.0),
            CaptionSegment::new("real text", 5.0, 6.0),
        ]);
        let reference = reference_for_indices(&store, &[0, 1], 20);
        assert_eq!(reference, "• [0:05] - \"real text\"");
    }

    #[test]
    fn test_reference_from_key_timestamps_truncates() {
        let store = store(10);
        let key = extract_key_timestamps(&store, 10);
        let reference = reference_from_key_timestamps(&key, 4);
        assert_eq!(reference.lines().count(), 4);
        assert!(reference.starts_with("• [0:00]"));
    }
}
