use anyhow::Result;
use clap::{Arg, Command};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

mod captions;
mod client;
mod config;
mod linkify;
mod pipeline;
mod sanitize;
mod session;
mod timestamp;

use crate::captions::source::CaptionFileSource;
use crate::client::retry::RetryPolicy;
use crate::client::RemoteModelClient;
use crate::config::Config;
use crate::session::VideoSession;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("tldw=info,warn")
        .init();

    let matches = Command::new("tldw")
        .version("0.1.0")
        .about("Timestamp-grounded caption summarization and Q&A")
        .arg(
            Arg::new("captions")
                .short('c')
                .long("captions")
                .value_name("FILE")
                .help("Caption file to summarize (.srt or .json)")
                .required(true),
        )
        .arg(
            Arg::new("title")
                .short('t')
                .long("title")
                .value_name("TITLE")
                .help("Video title used in prompts")
                .default_value("Untitled video"),
        )
        .arg(
            Arg::new("ask")
                .short('a')
                .long("ask")
                .value_name("QUESTION")
                .help("Answer this question instead of summarizing"),
        )
        .arg(
            Arg::new("duration")
                .short('d')
                .long("duration")
                .value_name("SECONDS")
                .help("Media duration in seconds (defaults to the caption span)"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Write rendered output to a file instead of stdout"),
        )
        .arg(
            Arg::new("endpoint")
                .long("endpoint")
                .value_name("URL")
                .help("Completion endpoint URL (overrides config)"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("Configuration file path"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let captions_path = PathBuf::from(matches.get_one::<String>("captions").unwrap());
    let title = matches.get_one::<String>("title").unwrap().clone();
    let question = matches.get_one::<String>("ask").cloned();
    let duration: Option<f64> = matches
        .get_one::<String>("duration")
        .and_then(|d| d.parse().ok());
    let output_path = matches.get_one::<String>("output").cloned();

    if matches.get_flag("verbose") {
        info!("Verbose logging enabled");
    }

    // Load configuration
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            let mut config: Config = toml::from_str(&content)?;
            config.apply_env();
            config
        }
        None => Config::load().unwrap_or_else(|e| {
            warn!("Failed to load config, using defaults: {}", e);
            Config::default()
        }),
    };
    if let Some(endpoint) = matches.get_one::<String>("endpoint") {
        config.client.endpoint = endpoint.clone();
    }
    config.validate()?;

    if !captions_path.exists() {
        error!("Caption file does not exist: {}", captions_path.display());
        return Err(anyhow::anyhow!("Caption file not found"));
    }

    info!("🚀 tldw starting...");
    info!("📄 Captions: {}", captions_path.display());
    info!("🔗 Endpoint: {}", config.client.endpoint);

    let retry = RetryPolicy {
        max_retries: config.retry.max_retries,
        base_delay: std::time::Duration::from_millis(config.retry.base_backoff_ms),
        max_delay: std::time::Duration::from_millis(30_000),
        max_jitter: std::time::Duration::from_millis(config.retry.jitter_ms),
    };
    let client = Arc::new(RemoteModelClient::new(config.client.clone(), retry)?);

    let source = CaptionFileSource::new(&captions_path);
    let session = VideoSession::from_source(&source, title, duration, client, config).await?;

    // Stream chunk progress to the log while the run is in flight
    let mut progress_rx = session.progress();
    let progress_task = tokio::spawn(async move {
        while progress_rx.changed().await.is_ok() {
            if let Some(progress) = *progress_rx.borrow() {
                info!("📊 Progress: {}/{}", progress.current, progress.total);
            }
        }
    });

    let start_time = std::time::Instant::now();
    let result = match &question {
        Some(q) => session.ask(q).await,
        None => session.summarize().await,
    };
    progress_task.abort();

    match result {
        Ok(text) => {
            let rendered = session.render(&text);
            info!("✅ Completed in {:.2}s", start_time.elapsed().as_secs_f64());

            match output_path {
                Some(path) => {
                    tokio::fs::write(&path, &rendered).await?;
                    info!("💾 Output written to: {}", path);
                }
                None => println!("{}", rendered),
            }
            Ok(())
        }
        Err(e) => {
            // Nothing partial is rendered on failure
            error!("❌ Run failed: {}", e);
            Err(e.into())
        }
    }
}
