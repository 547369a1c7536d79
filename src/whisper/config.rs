use std::path::PathBuf;

use anyhow::{Result, anyhow};
use dotenv::dotenv;

use crate::config::env_or;

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct WhisperConfig {
    pub model_path: PathBuf,
    pub use_gpu: bool,
    pub audio_context: i32,
    pub no_speech_threshold: f32,
    pub num_threads: i32,
}

impl WhisperConfig {
    pub fn new(model_path: PathBuf) -> Self {
        Self {
            model_path,
            use_gpu: true,
            audio_context: 0,
            no_speech_threshold: 0.6,
            num_threads: 2,
        }
    }

    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        let model_path = std::env::var("WHISPER_MODEL_PATH")
            .map_err(|_| anyhow!("WHISPER_MODEL_PATH is not set"))?;
        let defaults = Self::new(PathBuf::from(model_path));

        Ok(Self {
            use_gpu: env_or("WHISPER_USE_GPU", defaults.use_gpu)?,
            audio_context: env_or("WHISPER_AUDIO_CONTEXT", defaults.audio_context)?,
            no_speech_threshold: env_or("WHISPER_NO_SPEECH_THRESHOLD", defaults.no_speech_threshold)?,
            num_threads: env_or("WHISPER_THREADS", defaults.num_threads)?,
            ..defaults
        })
    }
}
