use super::{srt, CaptionSegment};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// A caption track offered by a source
#[derive(Debug, Clone)]
pub struct TrackInfo {
    /// Source-scoped identifier, passed back to `read_track`
    pub id: String,
    /// Human-readable label
    pub label: String,
}

/// Where caption segments come from.
///
/// The pipeline depends only on this interface; extracting captions from a
/// host page, a player API, or a file on disk is entirely the source's
/// concern.
#[async_trait]
pub trait CaptionSource: Send + Sync {
    /// List the caption tracks this source can provide
    async fn list_tracks(&self) -> Result<Vec<TrackInfo>>;

    /// Read one track's segments, ordered by start time
    async fn read_track(&self, id: &str) -> Result<Vec<CaptionSegment>>;
}

/// Caption source backed by a subtitle file on disk (`.srt` or `.json`)
pub struct CaptionFileSource {
    path: PathBuf,
}

impl CaptionFileSource {
    /// Create a source for the given subtitle file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn track_id(&self) -> String {
        self.path.to_string_lossy().to_string()
    }
}

#[async_trait]
impl CaptionSource for CaptionFileSource {
    async fn list_tracks(&self) -> Result<Vec<TrackInfo>> {
        if !self.path.exists() {
            return Err(anyhow!("Caption file not found: {}", self.path.display()));
        }

        let label = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "captions".to_string());

        Ok(vec![TrackInfo {
            id: self.track_id(),
            label,
        }])
    }

    async fn read_track(&self, id: &str) -> Result<Vec<CaptionSegment>> {
        if id != self.track_id() {
            return Err(anyhow!("Unknown caption track: {}", id));
        }

        let content = tokio::fs::read_to_string(&self.path).await?;
        match extension(&self.path).as_deref() {
            Some("json") => srt::parse_json_segments(&content),
            Some("srt") | None => srt::parse_srt(&content),
            Some(other) => Err(anyhow!("Unsupported caption format: .{}", other)),
        }
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_source_reads_srt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("video.srt");
        tokio::fs::write(&path, "1\n00:00:00,000 --> 00:00:02,000\nHello\n")
            .await
            .unwrap();

        let source = CaptionFileSource::new(&path);
        let tracks = source.list_tracks().await.unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].label, "video");

        let segments = source.read_track(&tracks[0].id).await.unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "Hello");
    }

    #[tokio::test]
    async fn test_file_source_rejects_unknown_track() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("video.srt");
        tokio::fs::write(&path, "1\n00:00:00,000 --> 00:00:02,000\nHello\n")
            .await
            .unwrap();

        let source = CaptionFileSource::new(&path);
        assert!(source.read_track("bogus").await.is_err());
    }

    #[tokio::test]
    async fn test_file_source_missing_file() {
        let source = CaptionFileSource::new("/nonexistent/captions.srt");
        assert!(source.list_tracks().await.is_err());
    }
}
