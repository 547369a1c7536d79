//! ffmpeg / ffprobe adapters for the media collaborators.

use std::path::Path;
use std::process::Output;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use log::{debug, info};
use tokio::process::Command;

use crate::pipeline::traits::{AudioExtractor, MediaProber, Trimmer};

/// Sample rate the recognizer wants.
pub const TARGET_SAMPLE_RATE: u32 = 16000;

fn path_arg(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| anyhow!("Path is not valid UTF-8: {}", path.display()))
}

async fn run(program: &str, args: &[&str]) -> Result<Output> {
    debug!("Running {program} {}", args.join(" "));
    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .with_context(|| format!("Failed to execute {program}"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
        let tail: Vec<&str> = tail.into_iter().rev().collect();
        return Err(anyhow!(
            "{program} exited with {}: {}",
            output.status,
            tail.join(" | ")
        ));
    }
    Ok(output)
}

#[derive(Debug, Clone)]
pub struct FfmpegExtractor {
    pub sample_rate: u32,
}

impl Default for FfmpegExtractor {
    fn default() -> Self {
        Self {
            sample_rate: TARGET_SAMPLE_RATE,
        }
    }
}

impl FfmpegExtractor {
    #[rustfmt::skip]
    fn args<'a>(&self, video: &'a str, audio_out: &'a str, rate: &'a str) -> Vec<&'a str> {
        vec![
            "-i", video,
            "-vn",
            "-acodec", "pcm_s16le",
            "-ar", rate,
            "-ac", "1",
            "-f", "wav",
            "-y",
            audio_out,
        ]
    }
}

#[async_trait]
impl AudioExtractor for FfmpegExtractor {
    async fn extract(&self, video: &Path, audio_out: &Path) -> Result<()> {
        info!("Extracting audio from {}", video.display());
        let rate = self.sample_rate.to_string();
        let args = self.args(path_arg(video)?, path_arg(audio_out)?, &rate);
        run("ffmpeg", &args).await?;
        Ok(())
    }
}

/// Stream-copy trimmer.
///
/// No re-encoding: fast and lossless, but the cut can only start on a
/// keyframe, so the clip may begin up to one GOP before `start`.
#[derive(Debug, Clone, Default)]
pub struct FfmpegTrimmer;

/// ffmpeg timestamp arguments for `[start, end]`, at microsecond precision.
/// Fails if the two collapse to the same timestamp once formatted.
fn timestamp_args(start: f64, end: f64) -> Result<(String, String)> {
    let start_arg = format!("{start:.6}");
    let end_arg = format!("{end:.6}");
    let rounded_start: f64 = start_arg.parse()?;
    let rounded_end: f64 = end_arg.parse()?;
    if rounded_start >= rounded_end {
        return Err(anyhow!(
            "range {start}..{end} is shorter than ffmpeg's timestamp precision"
        ));
    }
    Ok((start_arg, end_arg))
}

impl FfmpegTrimmer {
    #[rustfmt::skip]
    fn args<'a>(video: &'a str, start: &'a str, end: &'a str, output: &'a str) -> Vec<&'a str> {
        vec![
            "-i", video,
            "-ss", start,
            "-to", end,
            "-c", "copy",
            "-y",
            output,
        ]
    }
}

#[async_trait]
impl Trimmer for FfmpegTrimmer {
    async fn cut(&self, video: &Path, start: f64, end: f64, output: &Path) -> Result<()> {
        info!("Trimming {} from {start:.3}s to {end:.3}s", video.display());
        let (start, end) = timestamp_args(start, end)?;
        let args = Self::args(path_arg(video)?, &start, &end, path_arg(output)?);
        run("ffmpeg", &args).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct FfprobeProber;

/// Pulls `format.duration` out of `ffprobe -print_format json` output.
pub fn parse_probe_duration(json: &[u8]) -> Result<Option<f64>> {
    let value: serde_json::Value =
        serde_json::from_slice(json).context("ffprobe returned invalid JSON")?;
    let duration = value["format"]["duration"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .or_else(|| value["format"]["duration"].as_f64())
        .filter(|d| d.is_finite() && *d > 0.0);
    Ok(duration)
}

#[async_trait]
impl MediaProber for FfprobeProber {
    async fn duration(&self, video: &Path) -> Result<Option<f64>> {
        #[rustfmt::skip]
        let args = [
            "-v", "quiet",
            "-print_format", "json",
            "-show_format",
            path_arg(video)?,
        ];
        let output = run("ffprobe", &args).await?;
        parse_probe_duration(&output.stdout)
    }
}

/// MIME type for an uploaded container extension.
pub fn content_type_for(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_duration_is_read_from_format() {
        let json = br#"{"format": {"filename": "a.mp4", "duration": "120.500000"}}"#;
        assert_eq!(parse_probe_duration(json).unwrap(), Some(120.5));
    }

    #[test]
    fn missing_or_bogus_duration_is_none() {
        assert_eq!(parse_probe_duration(br#"{"format": {}}"#).unwrap(), None);
        assert_eq!(
            parse_probe_duration(br#"{"format": {"duration": "N/A"}}"#).unwrap(),
            None
        );
        assert!(parse_probe_duration(b"not json").is_err());
    }

    #[test]
    fn trim_uses_stream_copy() {
        let args = FfmpegTrimmer::args("in.mp4", "1.000", "2.500", "out.mp4");
        let joined = args.join(" ");
        assert!(joined.contains("-c copy"));
        assert!(joined.contains("-ss 1.000"));
        assert!(joined.contains("-to 2.500"));
        assert_eq!(args.last(), Some(&"out.mp4"));
    }

    #[test]
    fn timestamps_keep_sub_millisecond_ranges() {
        let (start, end) = timestamp_args(1.0004, 1.0006).unwrap();
        assert_eq!(start, "1.000400");
        assert_eq!(end, "1.000600");
        assert!(timestamp_args(1.0000001, 1.0000002).is_err());
        assert!(timestamp_args(2.0, 1.0).is_err());
    }

    #[test]
    fn extraction_asks_for_mono_16khz_pcm() {
        let extractor = FfmpegExtractor::default();
        let args = extractor.args("in.mp4", "out.wav", "16000").join(" ");
        assert!(args.contains("-ar 16000"));
        assert!(args.contains("-ac 1"));
        assert!(args.contains("-acodec pcm_s16le"));
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type_for("MP4"), "video/mp4");
        assert_eq!(content_type_for("webm"), "video/webm");
        assert_eq!(content_type_for("xyz"), "application/octet-stream");
    }
}
