use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use log::{debug, info};
use tokio::io::AsyncWriteExt;

const AVAILABLE_MODELS: &[&str] = &[
    "tiny",
    "tiny-q5_1",
    "tiny-q8_0",
    "base",
    "base-q5_1",
    "base-q8_0",
    "small",
    "small-q5_1",
    "small-q8_0",
    "medium",
    "medium-q5_0",
    "medium-q8_0",
    "large-v1",
    "large-v2",
    "large-v2-q5_0",
    "large-v2-q8_0",
    "large-v3",
    "large-v3-q5_0",
    "large-v3-turbo",
    "large-v3-turbo-q5_0",
    "large-v3-turbo-q8_0",
];

const MODEL_REPO: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

pub fn list_available_models() -> String {
    let mut output = String::from("\nAvailable models:");

    let mut current_class = "";
    for model in AVAILABLE_MODELS {
        let model_class = model.split('-').next().unwrap_or("");
        if model_class != current_class {
            output.push_str(&format!("\n {model_class}"));
            current_class = model_class;
        }
        output.push_str(&format!(" {model}"));
    }

    output.push_str("\n\n");
    output.push_str("___________________________________________________________\n");
    output.push_str("-q5_[01] / -q8_0 = quantized. Multilingual models only;\n");
    output.push_str("the .en variants cannot transcribe Japanese.\n");
    output
}

pub fn validate_model(model: &str) -> Result<()> {
    if AVAILABLE_MODELS.contains(&model) {
        Ok(())
    } else {
        Err(anyhow!("Invalid model: {}\n{}", model, list_available_models()))
    }
}

fn model_url(model: &str) -> String {
    format!("{MODEL_REPO}/ggml-{model}.bin")
}

pub fn model_file(dir: &Path, model: &str) -> PathBuf {
    dir.join(format!("ggml-{model}.bin"))
}

/// Fetches `ggml-<model>.bin` into `dir`, skipping models already present.
/// The body is written to a `.part` file first and renamed when complete.
pub async fn download_model(model: &str, dir: &Path) -> Result<PathBuf> {
    validate_model(model)?;

    let file_path = model_file(dir, model);
    if tokio::fs::try_exists(&file_path).await.unwrap_or(false) {
        println!("Model '{model}' already exists. Skipping download.");
        return Ok(file_path);
    }

    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create directory {}", dir.display()))?;

    let url = model_url(model);
    println!("Downloading ggml model '{model}' from '{url}'...");
    let mut response = reqwest::get(&url)
        .await
        .map_err(|e| anyhow!("Failed to connect to {url}: {e}"))?;
    if !response.status().is_success() {
        return Err(anyhow!("Download failed with {}", response.status()));
    }
    let total = response.content_length();
    debug!("Model size: {total:?} bytes");

    let partial = file_path.with_extension("bin.part");
    let mut file = tokio::fs::File::create(&partial)
        .await
        .with_context(|| format!("Failed to create {}", partial.display()))?;

    let mut written: u64 = 0;
    let mut last_report = 0;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
        if let Some(total) = total.filter(|t| *t > 0) {
            let percent = written * 100 / total;
            if percent >= last_report + 10 {
                println!("   {percent}%");
                last_report = percent;
            }
        }
    }
    file.flush().await?;
    drop(file);

    tokio::fs::rename(&partial, &file_path).await?;
    info!("Saved model {model} to {}", file_path.display());

    println!("Done! Model '{}' saved in '{}'", model, file_path.display());
    println!("Point the server at it:");
    println!("  $ WHISPER_MODEL_PATH={} kotoba-cutter serve", file_path.display());
    Ok(file_path)
}
