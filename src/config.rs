use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenv::dotenv;

/// Limits and defaults the pipeline applies to every video.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub language: String,
    pub default_padding: f64,
    pub max_file_size: u64,
    pub allowed_extensions: Vec<String>,
    pub max_concurrent_transcriptions: usize,
    pub extraction_timeout: Duration,
    pub recognition_timeout: Duration,
    pub trim_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            language: "ja".to_string(),
            default_padding: 2.0,
            max_file_size: 500 * 1024 * 1024, // 500MB
            allowed_extensions: ["mp4", "mov", "avi", "mkv", "webm"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_concurrent_transcriptions: 1,
            extraction_timeout: Duration::from_secs(600),
            recognition_timeout: Duration::from_secs(3600),
            trim_timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub upload_dir: PathBuf,
    pub transcript_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub job_retention: Duration,
    pub max_file_age: Duration,
    pub sweep_interval: Duration,
    pub pipeline: PipelineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            transcript_dir: PathBuf::from("transcripts"),
            temp_dir: PathBuf::from("temp"),
            job_retention: Duration::from_secs(3600),
            max_file_age: Duration::from_secs(24 * 3600),
            sweep_interval: Duration::from_secs(600),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `.env` and the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        let defaults = Self::default();
        let pipeline = defaults.pipeline.clone();

        let allowed_extensions = match std::env::var("ALLOWED_EXTENSIONS") {
            Ok(raw) => parse_extensions(&raw),
            Err(_) => pipeline.allowed_extensions,
        };

        Ok(Self {
            upload_dir: env_or("UPLOAD_DIR", defaults.upload_dir)?,
            transcript_dir: env_or("TRANSCRIPT_DIR", defaults.transcript_dir)?,
            temp_dir: env_or("TEMP_DIR", defaults.temp_dir)?,
            job_retention: secs_or("JOB_RETENTION_SECS", defaults.job_retention)?,
            max_file_age: Duration::from_secs(
                env_or::<u64>("MAX_FILE_AGE_HOURS", defaults.max_file_age.as_secs() / 3600)? * 3600,
            ),
            sweep_interval: secs_or("SWEEP_INTERVAL_SECS", defaults.sweep_interval)?,
            pipeline: PipelineConfig {
                language: env_or("TRANSCRIPTION_LANGUAGE", pipeline.language)?,
                default_padding: env_or("CONTEXT_PADDING", pipeline.default_padding)?,
                max_file_size: env_or("MAX_FILE_SIZE", pipeline.max_file_size)?,
                allowed_extensions,
                max_concurrent_transcriptions: env_or(
                    "MAX_CONCURRENT_TRANSCRIPTIONS",
                    pipeline.max_concurrent_transcriptions,
                )?
                .max(1),
                extraction_timeout: secs_or("EXTRACTION_TIMEOUT_SECS", pipeline.extraction_timeout)?,
                recognition_timeout: secs_or(
                    "RECOGNITION_TIMEOUT_SECS",
                    pipeline.recognition_timeout,
                )?,
                trim_timeout: secs_or("TRIM_TIMEOUT_SECS", pipeline.trim_timeout)?,
            },
        })
    }
}

/// Accepts `.mp4, MOV,webm` style lists.
pub fn parse_extensions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

pub(crate) fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        Err(_) => Ok(default),
    }
}

fn secs_or(key: &str, default: Duration) -> Result<Duration> {
    env_or(key, default.as_secs()).map(Duration::from_secs)
}

/// Settings for the command line client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: String,
    pub poll_interval: Duration,
}

impl ClientConfig {
    pub fn new(server_url: String) -> Self {
        Self {
            server_url: server_url.trim_end_matches('/').to_string(),
            poll_interval: Duration::from_secs(2),
        }
    }

    pub fn api(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.server_url)
    }
}
