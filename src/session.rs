use crate::captions::source::CaptionSource;
use crate::captions::TimedTextStore;
use crate::client::ModelClient;
use crate::config::Config;
use crate::linkify::TimestampLinker;
use crate::pipeline::chunker::chunk_segments;
use crate::pipeline::combiner::HierarchicalCombiner;
use crate::pipeline::progress::{CancelToken, GenerationProgress, ProgressTracker};
use crate::pipeline::query::QueryAnswerer;
use crate::pipeline::reference::{extract_key_timestamps, KeyTimestamp};
use crate::pipeline::summarizer::ChunkSummarizer;
use crate::pipeline::PipelineError;
use crate::sanitize::sanitize;
use anyhow::{anyhow, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;

/// Consumes seek requests produced from clicked timestamps; implemented by
/// the host player integration
pub trait PlaybackSync: Send + Sync {
    /// Jump playback to an absolute position in seconds
    fn seek(&self, seconds: f64);

    /// Current playback position in seconds
    fn current_time(&self) -> f64;
}

/// All per-video state for one summarize/Q&A session.
///
/// A navigation to a new video constructs a fresh session; captions, key
/// timestamps, and the run correlation id are never reset field by field,
/// so stale cross-video timestamps cannot leak into a new run.
pub struct VideoSession {
    run_id: String,
    title: String,
    duration: f64,
    store: TimedTextStore,
    key_timestamps: Vec<KeyTimestamp>,
    config: Config,
    summarizer: ChunkSummarizer,
    combiner: HierarchicalCombiner,
    answerer: QueryAnswerer,
    progress: Arc<ProgressTracker>,
    cancel: CancelToken,
}

impl VideoSession {
    /// Create a session over an already-built caption store. When `duration`
    /// is unknown the captions' own span is used.
    pub fn new(
        store: TimedTextStore,
        title: impl Into<String>,
        duration: Option<f64>,
        client: Arc<dyn ModelClient>,
        config: Config,
    ) -> Self {
        let duration = duration.unwrap_or_else(|| store.total_duration());
        let key_timestamps = extract_key_timestamps(&store, config.reference.max_key_timestamps);
        let progress = Arc::new(ProgressTracker::new());

        let summarizer = ChunkSummarizer::new(client.clone(), &config, progress.clone());
        let combiner = HierarchicalCombiner::new(client.clone(), &config);
        let answerer = QueryAnswerer::new(client, &config, progress.clone());

        Self {
            run_id: Uuid::new_v4().to_string(),
            title: title.into(),
            duration,
            store,
            key_timestamps,
            config,
            summarizer,
            combiner,
            answerer,
            progress,
            cancel: CancelToken::new(),
        }
    }

    /// Create a session by reading the first track of a caption source
    pub async fn from_source(
        source: &dyn CaptionSource,
        title: impl Into<String>,
        duration: Option<f64>,
        client: Arc<dyn ModelClient>,
        config: Config,
    ) -> Result<Self> {
        let tracks = source.list_tracks().await?;
        let track = tracks
            .first()
            .ok_or_else(|| anyhow!("Caption source offered no tracks"))?;
        let segments = source.read_track(&track.id).await?;
        let store = TimedTextStore::from_segments(segments);

        info!(
            "🎬 Session ready: {} caption segments spanning {:.0}s",
            store.len(),
            store.total_duration()
        );

        Ok(Self::new(store, title, duration, client, config))
    }

    /// Produce the full timestamped summary for this video
    pub async fn summarize(&self) -> Result<String, PipelineError> {
        let result = self.run_summarize().await;
        // Progress is cleared on success and failure alike
        self.progress.clear();
        result
    }

    async fn run_summarize(&self) -> Result<String, PipelineError> {
        let required = self.config.chunking.min_segments_for_summary;
        if self.store.len() < required {
            return Err(PipelineError::NotEnoughCaptions {
                found: self.store.len(),
                required,
            });
        }

        let chunks = chunk_segments(self.store.segments(), self.config.chunking.max_chunk_chars);
        info!(
            "🧩 Summarizing \"{}\": {} segments in {} chunks",
            self.title,
            self.store.len(),
            chunks.len()
        );

        let partials = self
            .summarizer
            .summarize_chunks(
                &self.store,
                &chunks,
                &self.title,
                self.duration,
                &self.run_id,
                &self.cancel,
            )
            .await?;

        self.combiner
            .combine(
                partials,
                &self.title,
                &self.key_timestamps,
                self.duration,
                &self.run_id,
                &self.cancel,
            )
            .await
    }

    /// Answer a follow-up question grounded in this video's captions
    pub async fn ask(&self, question: &str) -> Result<String, PipelineError> {
        info!("❓ Answering question for \"{}\"", self.title);
        let result = self
            .answerer
            .answer(
                &self.store,
                question,
                &self.title,
                &self.key_timestamps,
                &self.run_id,
                &self.cancel,
            )
            .await;
        self.progress.clear();
        result
    }

    /// Convert timestamps in pipeline output to seek elements and sanitize
    /// the result for rendering
    pub fn render(&self, text: &str) -> String {
        let linker = TimestampLinker::new(Some(self.duration));
        sanitize(&linker.linkify(text))
    }

    /// Clamp and forward a seek request from a clicked timestamp
    pub fn jump_to(&self, playback: &dyn PlaybackSync, seconds: f64) {
        playback.seek(seconds.clamp(0.0, self.duration));
    }

    /// Observe chunk progress; `None` means no run in flight
    pub fn progress(&self) -> watch::Receiver<Option<GenerationProgress>> {
        self.progress.subscribe()
    }

    /// Token cancelling this session's in-flight work; cancel it before
    /// starting a session for a different video
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn store(&self) -> &TimedTextStore {
        &self.store
    }

    pub fn key_timestamps(&self) -> &[KeyTimestamp] {
        &self.key_timestamps
    }
}
