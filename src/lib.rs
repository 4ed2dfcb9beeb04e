/// tldw - Timestamp-Grounded Caption Summarization
///
/// Chunks long caption streams on caption boundaries, drives a remote
/// summarization service with bounded concurrency and retry, merges partial
/// results hierarchically while preserving timestamp fidelity, and maps
/// model-cited timestamps back onto playback-seek actions.

pub mod captions;
pub mod client;
pub mod config;
pub mod linkify;
pub mod pipeline;
pub mod sanitize;
pub mod session;
pub mod timestamp;

// Re-export main types for easy access
pub use crate::captions::source::{CaptionFileSource, CaptionSource, TrackInfo};
pub use crate::captions::{CaptionSegment, TimedTextStore};
pub use crate::client::error::ClientError;
pub use crate::client::retry::RetryPolicy;
pub use crate::client::{CallMeta, CallPhase, ModelClient, RemoteModelClient};
pub use crate::config::{Config, ConfigBuilder};
pub use crate::linkify::TimestampLinker;
pub use crate::pipeline::chunker::{chunk_segments, Chunk};
pub use crate::pipeline::combiner::HierarchicalCombiner;
pub use crate::pipeline::progress::{CancelToken, GenerationProgress, ProgressTracker};
pub use crate::pipeline::query::QueryAnswerer;
pub use crate::pipeline::reference::{extract_key_timestamps, KeyTimestamp};
pub use crate::pipeline::summarizer::ChunkSummarizer;
pub use crate::pipeline::PipelineError;
pub use crate::sanitize::sanitize;
pub use crate::session::{PlaybackSync, VideoSession};
