use super::CaptionSegment;
use anyhow::{anyhow, Result};

/// Parse SRT subtitle content into caption segments.
///
/// Blocks are separated by blank lines: an index line, a timing line
/// (`HH:MM:SS,mmm --> HH:MM:SS,mmm`), then one or more text lines which are
/// joined with spaces. Malformed blocks are skipped rather than failing the
/// whole file.
pub fn parse_srt(content: &str) -> Result<Vec<CaptionSegment>> {
    let mut segments = Vec::new();

    for block in content.replace("\r\n", "\n").split("\n\n") {
        let lines: Vec<&str> = block.lines().filter(|l| !l.trim().is_empty()).collect();
        if lines.len() < 2 {
            continue;
        }

        // The index line is optional in practice; the timing line is the
        // first one containing the arrow
        let Some(timing_pos) = lines.iter().position(|l| l.contains("-->")) else {
            continue;
        };

        let (start, end) = match parse_timing_line(lines[timing_pos]) {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!("Skipping SRT block with bad timing line: {}", e);
                continue;
            }
        };

        let text = lines[timing_pos + 1..].join(" ");
        if text.trim().is_empty() {
            continue;
        }

        segments.push(CaptionSegment::new(text, start, end));
    }

    if segments.is_empty() {
        return Err(anyhow!("No caption segments found in SRT content"));
    }

    Ok(segments)
}

/// Parse a JSON array of `{text, start, end}` objects into caption segments
pub fn parse_json_segments(content: &str) -> Result<Vec<CaptionSegment>> {
    let segments: Vec<CaptionSegment> = serde_json::from_str(content)?;
    if segments.is_empty() {
        return Err(anyhow!("No caption segments found in JSON content"));
    }
    Ok(segments)
}

fn parse_timing_line(line: &str) -> Result<(f64, f64)> {
    let parts: Vec<&str> = line.split("-->").collect();
    if parts.len() != 2 {
        return Err(anyhow!("Invalid timing line: {}", line));
    }

    let start = parse_srt_timestamp(parts[0].trim())?;
    let end = parse_srt_timestamp(parts[1].trim())?;
    Ok((start, end))
}

/// Parse an SRT timestamp (`HH:MM:SS,mmm`, dot also accepted) into seconds
fn parse_srt_timestamp(timestamp: &str) -> Result<f64> {
    let normalized = timestamp.replace(',', ".");
    let hms: Vec<&str> = normalized.split(':').collect();
    if hms.len() != 3 {
        return Err(anyhow!("Invalid timestamp format: {}", timestamp));
    }

    let hours: f64 = hms[0].parse()?;
    let minutes: f64 = hms[1].parse()?;
    let seconds: f64 = hms[2].parse()?;

    Ok(hours * 3600.0 + minutes * 60.0 + seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_srt_basic() {
        let content = "1\n00:00:01,000 --> 00:00:04,000\nFirst caption\n\n2\n00:00:04,500 --> 00:00:08,000\nSecond caption\nwith two lines\n";
        let segments = parse_srt(content).unwrap();

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "First caption");
        assert_eq!(segments[0].start, 1.0);
        assert_eq!(segments[0].end, 4.0);
        assert_eq!(segments[1].text, "Second caption with two lines");
        assert_eq!(segments[1].start, 4.5);
    }

    #[test]
    fn test_parse_srt_dot_millis() {
        let content = "1\n00:01:00.250 --> 00:01:02.750\nDotted millis\n";
        let segments = parse_srt(content).unwrap();
        assert_eq!(segments[0].start, 60.25);
        assert_eq!(segments[0].end, 62.75);
    }

    #[test]
    fn test_parse_srt_skips_malformed_blocks() {
        let content = "1\nnot a timing line\ngarbage\n\n2\n00:00:10,000 --> 00:00:12,000\nGood one\n";
        let segments = parse_srt(content).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "Good one");
    }

    #[test]
    fn test_parse_srt_empty_fails() {
        assert!(parse_srt("").is_err());
        assert!(parse_srt("only garbage here").is_err());
    }

    #[test]
    fn test_parse_json_segments() {
        let content = r#"[{"text": "hello", "start": 0.0, "end": 2.5}]"#;
        let segments = parse_json_segments(content).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "hello");
        assert_eq!(segments[0].end, 2.5);
    }
}
