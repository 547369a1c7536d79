pub mod audio;
pub mod cli;
pub mod client;
pub mod config;
pub mod download;
pub mod dto;
pub mod error;
pub mod jobs;
pub mod media;
pub mod pipeline;
pub mod search;
pub mod server;
pub mod storage;
pub mod transcript;
pub mod whisper;

pub use error::ClipError;
pub use pipeline::{ClipPipeline, Collaborators};
