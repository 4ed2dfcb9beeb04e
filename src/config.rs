use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Configuration for the summarization pipeline
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Remote model endpoint settings
    pub client: ClientConfig,

    /// Retry and backoff settings shared by every call site
    pub retry: RetryConfig,

    /// Chunking and per-chunk call settings
    pub chunking: ChunkingConfig,

    /// Hierarchical combine settings
    pub combine: CombineConfig,

    /// Timestamp reference sampling settings
    pub reference: ReferenceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Completion endpoint URL
    pub endpoint: String,

    /// Bearer token, if the endpoint requires one
    pub api_key: Option<String>,

    /// Model identifier sent with every request
    pub model: String,

    /// Maximum tokens to generate per response
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,

    /// Per-request timeout in seconds
    pub timeout_seconds: u64,

    /// Minimum spacing between outbound requests in milliseconds,
    /// independent of retry backoff
    pub min_request_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt at each call site
    pub max_retries: u32,

    /// Starting backoff in milliseconds, doubled per attempt
    pub base_backoff_ms: u64,

    /// Random jitter added to each backoff, in milliseconds
    pub jitter_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Character budget per chunk
    pub max_chunk_chars: usize,

    /// Chunks processed concurrently per batch
    pub max_concurrent_chunks: usize,

    /// Delay between chunk batches in milliseconds
    pub inter_chunk_delay_ms: u64,

    /// Minimum caption segments required before a summary run starts
    pub min_segments_for_summary: usize,

    /// Estimated response-token pool divided proportionally across chunks
    pub estimated_response_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CombineConfig {
    /// Partial summaries merged per combine call
    pub batch_size: usize,

    /// Delay between combine calls within a level, in milliseconds
    pub inter_combine_delay_ms: u64,

    /// Sources longer than this (seconds) get the coverage-compression pass
    pub compression_threshold_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceConfig {
    /// Sampled key timestamps per video (first and last always added)
    pub max_key_timestamps: usize,

    /// Reference lines injected into a per-chunk prompt
    pub max_per_chunk: usize,

    /// Reference lines injected into combine/compression prompts
    pub max_global: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:1234/v1/chat/completions".to_string(),
            api_key: None,
            model: "local-model".to_string(),
            max_tokens: 2000,
            temperature: 0.7,
            timeout_seconds: 60,
            min_request_interval_ms: 900,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 4,
            base_backoff_ms: 1000,
            jitter_ms: 250,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: 25_000,
            max_concurrent_chunks: 3,
            inter_chunk_delay_ms: 300,
            min_segments_for_summary: 5,
            estimated_response_tokens: 4000,
        }
    }
}

impl Default for CombineConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            inter_combine_delay_ms: 300,
            compression_threshold_secs: 600.0,
        }
    }
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            max_key_timestamps: 20,
            max_per_chunk: 20,
            max_global: 30,
        }
    }
}

impl Config {
    /// Load configuration from the first config file found, then apply
    /// environment overrides
    pub fn load() -> Result<Self> {
        let config_paths = ["tldw.toml", "config/tldw.toml", "~/.config/tldw/config.toml"];

        for path in &config_paths {
            if let Ok(config_str) = std::fs::read_to_string(path) {
                match toml::from_str::<Config>(&config_str) {
                    Ok(mut config) => {
                        tracing::info!("📄 Loaded configuration from: {}", path);
                        config.apply_env();
                        return Ok(config);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config file {}: {}", path, e);
                    }
                }
            }
        }

        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    /// Override settings from `TLDW_*` environment variables
    pub fn apply_env(&mut self) {
        if let Ok(endpoint) = std::env::var("TLDW_ENDPOINT") {
            self.client.endpoint = endpoint;
        }
        if let Ok(api_key) = std::env::var("TLDW_API_KEY") {
            self.client.api_key = Some(api_key);
        }
        if let Ok(model) = std::env::var("TLDW_MODEL") {
            self.client.model = model;
        }
        if let Ok(retries) = std::env::var("TLDW_MAX_RETRIES") {
            if let Ok(parsed) = retries.parse() {
                self.retry.max_retries = parsed;
            }
        }
        if let Ok(chars) = std::env::var("TLDW_CHUNK_CHARS") {
            if let Ok(parsed) = chars.parse() {
                self.chunking.max_chunk_chars = parsed;
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.client.endpoint.is_empty() {
            return Err(anyhow!("client.endpoint must not be empty"));
        }
        if self.chunking.max_chunk_chars == 0 {
            return Err(anyhow!("chunking.max_chunk_chars must be greater than 0"));
        }
        if self.chunking.max_concurrent_chunks == 0 {
            return Err(anyhow!("chunking.max_concurrent_chunks must be greater than 0"));
        }
        if self.combine.batch_size < 2 {
            return Err(anyhow!("combine.batch_size must be at least 2"));
        }
        if self.reference.max_key_timestamps == 0 {
            return Err(anyhow!("reference.max_key_timestamps must be greater than 0"));
        }
        Ok(())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> Result<()> {
        let config_str = toml::to_string_pretty(self)?;
        std::fs::write(path, config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path);
        Ok(())
    }
}

/// Builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.client.endpoint = endpoint.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config.client.api_key = Some(api_key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.config.client.model = model.into();
        self
    }

    pub fn with_chunk_chars(mut self, max_chunk_chars: usize) -> Self {
        self.config.chunking.max_chunk_chars = max_chunk_chars;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.config.retry.max_retries = max_retries;
        self
    }

    pub fn with_combine_batch_size(mut self, batch_size: usize) -> Self {
        self.config.combine.batch_size = batch_size;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.chunking.max_chunk_chars, 25_000);
        assert_eq!(config.chunking.max_concurrent_chunks, 3);
        assert_eq!(config.combine.batch_size, 5);
        assert_eq!(config.retry.max_retries, 4);
        assert_eq!(config.client.min_request_interval_ms, 900);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .with_endpoint("https://example.test/api/summarize")
            .with_model("test-model")
            .with_chunk_chars(10_000)
            .with_max_retries(2)
            .build();

        assert_eq!(config.client.endpoint, "https://example.test/api/summarize");
        assert_eq!(config.client.model, "test-model");
        assert_eq!(config.chunking.max_chunk_chars, 10_000);
        assert_eq!(config.retry.max_retries, 2);
    }

    #[test]
    fn test_config_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.combine.batch_size = 1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.chunking.max_chunk_chars = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [client]
            model = "custom-model"
            "#,
        )
        .unwrap();

        assert_eq!(config.client.model, "custom-model");
        assert_eq!(config.client.max_tokens, 2000);
        assert_eq!(config.combine.batch_size, 5);
    }
}
