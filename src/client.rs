use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use tokio::io::AsyncWriteExt;

use crate::config::ClientConfig;
use crate::dto::{SearchRequest, TrimRequest};
use crate::search::SearchMode;

pub struct ApiClient {
    http: reqwest::Client,
    config: ClientConfig,
}

/// Turns a non-2xx response into an error carrying the server's message.
async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|v| v["error"].as_str().map(str::to_string))
        .unwrap_or(text);
    Err(anyhow!("Server returned error {status}: {message}"))
}

/// File name from a `Content-Disposition: attachment; filename="..."` header.
fn attachment_name(header: &str) -> Option<String> {
    header
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))
        .map(|name| name.trim_matches('"').to_string())
        .filter(|name| !name.is_empty() && !name.contains(['/', '\\']))
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let response = self
            .http
            .get(self.config.api(path))
            .send()
            .await
            .map_err(|e| anyhow!("Failed to connect to server: {}", e))?;
        Ok(check(response).await?.json().await?)
    }

    pub async fn check_server_health(&self) -> Result<()> {
        println!("🔍 Checking server health at: {}", self.config.api("/health"));
        self.get_json("/health").await?;
        println!("✅ Server is healthy");
        Ok(())
    }

    pub async fn upload(&self, video_file: &Path) -> Result<Value> {
        let bytes = tokio::fs::read(video_file)
            .await
            .with_context(|| format!("Failed to read video file: {}", video_file.display()))?;
        let filename = video_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("Not a file: {}", video_file.display()))?;

        println!("📁 Uploading {filename} ({} bytes)", bytes.len());
        let form = reqwest::multipart::Form::new().part(
            "video",
            reqwest::multipart::Part::bytes(bytes).file_name(filename),
        );

        let response = self
            .http
            .post(self.config.api("/videos"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to send request: {}", e))?;
        Ok(check(response).await?.json().await?)
    }

    pub async fn transcribe(&self, video_id: &str) -> Result<Value> {
        let response = self
            .http
            .post(self.config.api(&format!("/videos/{video_id}/transcribe")))
            .send()
            .await
            .map_err(|e| anyhow!("Failed to send request: {}", e))?;
        Ok(check(response).await?.json().await?)
    }

    pub async fn status(&self, video_id: &str) -> Result<Value> {
        self.get_json(&format!("/videos/{video_id}/status")).await
    }

    /// Polls until the job is `ready` or `failed`.
    pub async fn wait_for(&self, video_id: &str) -> Result<Value> {
        let mut last_phase = String::new();
        loop {
            let state = self.status(video_id).await?;
            let phase = state["phase"].as_str().unwrap_or_default().to_string();
            if phase != last_phase {
                println!("   ⏳ {phase}");
                last_phase = phase.clone();
            }
            if phase == "ready" || phase == "failed" {
                return Ok(state);
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    pub async fn search(
        &self,
        video_id: &str,
        query: &str,
        mode: SearchMode,
        padding: Option<f64>,
    ) -> Result<Value> {
        let response = self
            .http
            .post(self.config.api(&format!("/videos/{video_id}/search")))
            .json(&SearchRequest {
                query: query.to_string(),
                mode,
                padding,
            })
            .send()
            .await
            .map_err(|e| anyhow!("Failed to send request: {}", e))?;
        Ok(check(response).await?.json().await?)
    }

    /// Streams the clip to disk chunk by chunk. Returns the written path.
    pub async fn trim(
        &self,
        video_id: &str,
        start: f64,
        end: f64,
        output: Option<PathBuf>,
    ) -> Result<PathBuf> {
        let response = self
            .http
            .post(self.config.api(&format!("/videos/{video_id}/trim")))
            .json(&TrimRequest { start, end })
            .send()
            .await
            .map_err(|e| anyhow!("Failed to send request: {}", e))?;
        let mut response = check(response).await?;

        let output = match output {
            Some(path) => path,
            None => response
                .headers()
                .get(reqwest::header::CONTENT_DISPOSITION)
                .and_then(|v| v.to_str().ok())
                .and_then(attachment_name)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(format!("{video_id}_{start:.2}-{end:.2}.mp4"))),
        };

        let mut file = tokio::fs::File::create(&output)
            .await
            .with_context(|| format!("Failed to create {}", output.display()))?;
        let mut written = 0usize;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len();
        }
        file.flush().await?;
        println!("💾 Wrote {written} bytes to {}", output.display());
        Ok(output)
    }
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_ranges(outcome: &Value) {
    let matches = outcome["matches"].as_array().map_or(0, |m| m.len());
    println!("🔎 {matches} matches");
    if let Some(ranges) = outcome["ranges"].as_array() {
        for range in ranges {
            println!(
                "   {:>9.2}s - {:>9.2}s",
                range["start"].as_f64().unwrap_or_default(),
                range["end"].as_f64().unwrap_or_default()
            );
        }
    }
}

pub enum ClientCommand {
    Upload(PathBuf),
    Transcribe { video_id: String, wait: bool },
    Status(String),
    Search { video_id: String, query: String, mode: SearchMode, padding: Option<f64> },
    Trim { video_id: String, start: f64, end: f64, output: Option<PathBuf> },
}

pub async fn run_client(config: ClientConfig, command: ClientCommand) -> Result<()> {
    let client = ApiClient::new(config);

    if let Err(e) = client.check_server_health().await {
        eprintln!("❌ {e}");
        eprintln!("💡 Make sure the server is running: kotoba-cutter serve");
        return Err(e);
    }

    match command {
        ClientCommand::Upload(path) => {
            let record = client.upload(&path).await?;
            println!("✅ Uploaded");
            print_json(&record)?;
        }
        ClientCommand::Transcribe { video_id, wait } => {
            let state = client.transcribe(&video_id).await?;
            println!("🚀 Transcription started");
            let state = if wait { client.wait_for(&video_id).await? } else { state };
            print_json(&state)?;
            if state["phase"] == "failed" {
                return Err(anyhow!(
                    "Transcription failed: {}",
                    state["error_detail"].as_str().unwrap_or("unknown error")
                ));
            }
        }
        ClientCommand::Status(video_id) => {
            print_json(&client.status(&video_id).await?)?;
        }
        ClientCommand::Search { video_id, query, mode, padding } => {
            let outcome = client.search(&video_id, &query, mode, padding).await?;
            print_ranges(&outcome);
            print_json(&outcome)?;
        }
        ClientCommand::Trim { video_id, start, end, output } => {
            client.trim(&video_id, start, end, output).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_name_is_extracted() {
        assert_eq!(
            attachment_name(r#"attachment; filename="talk_13.20-18.50.mp4""#).as_deref(),
            Some("talk_13.20-18.50.mp4")
        );
        assert_eq!(attachment_name("attachment"), None);
        assert_eq!(attachment_name(r#"attachment; filename="../x.mp4""#), None);
    }
}
