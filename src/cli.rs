use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::search::SearchMode;

#[derive(Parser)]
#[command(
    name = "kotoba-cutter",
    about = "Kotoba Cutter - find spoken words in a video and cut them out",
    long_about = "Transcribes uploaded videos with word-level timestamps, searches the transcript for a word or phrase, and trims the matching moments out as clips.",
    after_help = "EXAMPLES:\n    # Start the server\n    kotoba-cutter serve\n\n    # Upload a video and transcribe it\n    kotoba-cutter upload talk.mp4\n    kotoba-cutter transcribe <id> --wait\n\n    # Find every time a word is said, with 1.5s of context\n    kotoba-cutter search <id> こんにちは --padding 1.5\n\n    # Cut a clip\n    kotoba-cutter trim <id> --start 13.2 --end 18.5 --output hello.mp4\n\n    # Fetch a whisper model\n    kotoba-cutter model download large-v3-turbo --dir models"
)]
pub struct Cli {
    #[arg(long, global = true, default_value = "http://localhost:8080")]
    pub server_url: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server
    #[command(name = "serve")]
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[arg(long, default_value = "8080")]
        port: u16,
    },
    /// Upload a video file
    #[command(name = "upload")]
    Upload { video_file: PathBuf },
    /// Start transcribing an uploaded video
    #[command(name = "transcribe")]
    Transcribe {
        video_id: String,

        /// Poll until the job finishes
        #[arg(long)]
        wait: bool,
    },
    /// Show the transcription state of a video
    #[command(name = "status")]
    Status { video_id: String },
    /// Search a transcribed video
    #[command(name = "search")]
    Search {
        video_id: String,

        query: String,

        #[arg(long, default_value = "word", value_parser = parse_mode)]
        mode: SearchMode,

        /// Seconds of context around each match
        #[arg(long, value_parser = parse_padding)]
        padding: Option<f64>,
    },
    /// Download a clip of a transcribed video
    #[command(name = "trim")]
    Trim {
        video_id: String,

        #[arg(long)]
        start: f64,

        #[arg(long)]
        end: f64,

        /// Where to write the clip (defaults to the server's file name)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
    /// Manage whisper models
    #[command(name = "model", subcommand)]
    Model(ModelCommands),
}

#[derive(Subcommand)]
pub enum ModelCommands {
    #[command(name = "list")]
    List,
    #[command(name = "download")]
    Download {
        model: String,

        #[arg(long, default_value = "models")]
        dir: PathBuf,
    },
}

pub fn parse_mode(s: &str) -> Result<SearchMode, String> {
    s.parse()
}

pub fn parse_padding(s: &str) -> Result<f64, String> {
    match s.parse::<f64>() {
        Ok(p) if p.is_finite() && p >= 0.0 => Ok(p),
        Ok(_) => Err("Padding must be a non-negative number of seconds".to_string()),
        Err(_) => Err("Invalid padding value".to_string()),
    }
}
