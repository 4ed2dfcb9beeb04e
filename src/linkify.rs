use crate::timestamp::{format_timestamp, parse_timestamp};
use regex::{Captures, Regex};

/// Converts bracketed timestamps in model output into actionable seek
/// elements.
///
/// Multi-timestamp groups (`[21:54, 24:34]`) are handled first: each value
/// is parsed, values beyond the media duration are discarded, survivors are
/// sorted ascending and wrapped so a consumer can cycle through them. Then
/// remaining single timestamps are converted with the same parse/clamp
/// rule. Model output is untrusted; the result must still pass through the
/// allow-list sanitizer before rendering.
pub struct TimestampLinker {
    duration: Option<f64>,
    multi_re: Regex,
    single_re: Regex,
    filler_res: Vec<Regex>,
}

impl TimestampLinker {
    /// Create a linker clamping to `duration` (seconds); `None` disables
    /// clamping
    pub fn new(duration: Option<f64>) -> Self {
        let multi_re =
            Regex::new(r"\[((?:\d{1,2}:)?\d{1,2}:\d{2}(?:\s*,\s*(?:\d{1,2}:)?\d{1,2}:\d{2})+)\]")
                .expect("valid multi-timestamp pattern");
        let single_re =
            Regex::new(r"\[((?:\d{1,2}:)?\d{1,2}:\d{2})\]").expect("valid timestamp pattern");

        // Placeholder phrases the model sometimes emits despite instructions
        let filler_patterns = [
            r"(?i)\[N/A\]\s*",
            r"(?i)\(\s*Not mentioned in the available timestamps\.?\s*\)",
            r"(?i)\(\s*no direct timestamp.*?\)",
            r"(?i)\(\s*no timestamp.*?\)",
            r"(?i)\(\s*timestamp.*?not available.*?\)",
            r"(?i)\(\s*timestamp.*?not found.*?\)",
            r"(?i)no direct timestamp.*?available",
            r"(?i)no timestamp.*?available",
            r"(?i)timestamp.*?not available",
            r"(?i)timestamp.*?not found",
        ];
        let filler_res = filler_patterns
            .iter()
            .map(|p| Regex::new(p).expect("valid filler pattern"))
            .collect();

        Self {
            duration,
            multi_re,
            single_re,
            filler_res,
        }
    }

    /// Convert timestamps to seek elements and scrub placeholder phrases
    pub fn linkify(&self, text: &str) -> String {
        let text = self.link_multi_timestamps(text);
        let text = self.link_single_timestamps(&text);
        self.remove_filler_phrases(&text)
    }

    fn within_duration(&self, seconds: u64) -> bool {
        match self.duration {
            Some(limit) => (seconds as f64) <= limit,
            None => true,
        }
    }

    fn link_multi_timestamps(&self, text: &str) -> String {
        self.multi_re
            .replace_all(text, |caps: &Captures| {
                let mut seconds: Vec<u64> = caps[1]
                    .split(',')
                    .filter_map(|part| parse_timestamp(part.trim()))
                    .filter(|&s| self.within_duration(s))
                    .collect();

                // All values hallucinated past the end: leave the text alone
                if seconds.is_empty() {
                    return caps[0].to_string();
                }

                seconds.sort_unstable();
                let group: Vec<String> = seconds.iter().map(|s| s.to_string()).collect();
                let elements: Vec<String> = seconds
                    .iter()
                    .map(|&s| {
                        format!(
                            r#"<span class="clickable-timestamp" data-time="{}">{}</span>"#,
                            s,
                            format_timestamp(s as f64)
                        )
                    })
                    .collect();

                format!(
                    r#"<span class="multiple-timestamps-wrapper" data-timestamps="{}">{}</span>"#,
                    group.join(","),
                    elements.join(", ")
                )
            })
            .to_string()
    }

    fn link_single_timestamps(&self, text: &str) -> String {
        self.single_re
            .replace_all(text, |caps: &Captures| {
                match parse_timestamp(&caps[1]) {
                    Some(seconds) if self.within_duration(seconds) => format!(
                        r#"<span class="clickable-timestamp" data-time="{}">{}</span>"#,
                        seconds,
                        format_timestamp(seconds as f64)
                    ),
                    _ => caps[0].to_string(),
                }
            })
            .to_string()
    }

    fn remove_filler_phrases(&self, text: &str) -> String {
        let mut cleaned = text.to_string();
        for re in &self.filler_res {
            cleaned = re.replace_all(&cleaned, "").to_string();
        }
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_timestamp_linked() {
        let linker = TimestampLinker::new(Some(600.0));
        let out = linker.linkify("- **Intro** begins [1:00]");
        assert_eq!(
            out,
            r#"- **Intro** begins <span class="clickable-timestamp" data-time="60">1:00</span>"#
        );
    }

    #[test]
    fn test_hours_timestamp_linked() {
        let linker = TimestampLinker::new(None);
        let out = linker.linkify("[1:01:01]");
        assert!(out.contains(r#"data-time="3661""#));
        assert!(out.contains(">1:01:01<"));
    }

    #[test]
    fn test_timestamp_beyond_duration_left_unlinked() {
        let linker = TimestampLinker::new(Some(100.0));
        let out = linker.linkify("early [1:00] late [5:00]");

        // 60s is within the 100s video, 300s is hallucinated
        assert!(out.contains(r#"data-time="60""#));
        assert!(out.contains("[5:00]"));
        assert!(!out.contains(r#"data-time="300""#));
    }

    #[test]
    fn test_multi_timestamp_group_sorted_and_wrapped() {
        let linker = TimestampLinker::new(Some(3600.0));
        let out = linker.linkify("See [24:34, 21:54]");

        assert!(out.contains(r#"data-timestamps="1314,1474""#));
        let first = out.find(r#"data-time="1314""#).unwrap();
        let second = out.find(r#"data-time="1474""#).unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_multi_group_drops_out_of_range_values() {
        let linker = TimestampLinker::new(Some(100.0));
        let out = linker.linkify("[0:30, 5:00]");

        assert!(out.contains(r#"data-timestamps="30""#));
        assert!(!out.contains("300"));
    }

    #[test]
    fn test_multi_group_all_out_of_range_passes_through() {
        let linker = TimestampLinker::new(Some(10.0));
        let out = linker.linkify("[5:00, 6:00]");
        assert_eq!(out, "[5:00, 6:00]");
    }

    #[test]
    fn test_filler_phrases_removed() {
        let linker = TimestampLinker::new(None);
        assert_eq!(linker.linkify("Point one. [N/A] More text."), "Point one. More text.");
        assert_eq!(
            linker.linkify("A fact (no timestamp available for this)."),
            "A fact ."
        );
        assert_eq!(
            linker.linkify("A claim (timestamp was not found)."),
            "A claim ."
        );
    }

    #[test]
    fn test_plain_text_untouched() {
        let linker = TimestampLinker::new(Some(600.0));
        let input = "No timestamps here, just [brackets] and 12:34 loose.";
        assert_eq!(linker.linkify(input), input);
    }
}
