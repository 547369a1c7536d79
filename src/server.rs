use std::sync::Arc;

use actix_cors::Cors;
use actix_multipart::{Field, Multipart};
use actix_web::http::header::ContentDisposition;
use actix_web::{
    App, HttpResponse, HttpServer, Responder, error::InternalError, get, middleware::Logger, post,
    web,
};
use anyhow::{Context, Result};
use futures_util::TryStreamExt;
use log::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::dto::{HealthDto, SearchRequest, TrimRequest};
use crate::error::ClipError;
use crate::media::{FfmpegExtractor, FfmpegTrimmer, FfprobeProber};
use crate::pipeline::{ClipPipeline, Collaborators, PendingUpload};
use crate::storage::FsStorage;
use crate::whisper::{WhisperConfig, WhisperRecognizer};

pub struct AppState {
    pub pipeline: Arc<ClipPipeline>,
}

#[get("/api/v1/health")]
pub async fn health_check() -> impl Responder {
    debug!("Health check endpoint called");
    HttpResponse::Ok().json(HealthDto {
        status: "ok".to_string(),
        message: "Clip service is running".to_string(),
    })
}

#[post("/api/v1/videos")]
pub async fn upload_video(
    data: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse, ClipError> {
    debug!("Upload request received");
    let mut record = None;

    while let Some(field) = payload
        .try_next()
        .await
        .map_err(|e| ClipError::Validation(format!("Malformed multipart body: {e}")))?
    {
        if field.name() != Some("video") || record.is_some() {
            continue;
        }
        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string)
            .ok_or_else(|| ClipError::Validation("Upload has no file name".to_string()))?;
        // Rejects the type before any byte is stored.
        let pending = data.pipeline.begin_upload(&filename).await?;
        let pending = write_field_data(field, pending).await?;
        record = Some(data.pipeline.finish_upload(pending).await?);
    }

    let Some(record) = record else {
        warn!("No video file provided in upload request");
        return Err(ClipError::Validation("No video file provided".to_string()));
    };
    Ok(HttpResponse::Created().json(record))
}

/// Streams one multipart field to disk, stopping as soon as it exceeds the
/// upload limit. On error the pending upload is dropped with its partial file.
async fn write_field_data(
    mut field: Field,
    mut pending: PendingUpload,
) -> Result<PendingUpload, ClipError> {
    while let Some(chunk) = field
        .try_next()
        .await
        .map_err(|e| ClipError::Validation(format!("Failed to read upload: {e}")))?
    {
        pending.write(&chunk).await?;
    }
    debug!("Wrote field data: {} bytes", pending.written());
    Ok(pending)
}

#[post("/api/v1/videos/{id}/transcribe")]
pub async fn start_transcription(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ClipError> {
    let video_id = path.into_inner();
    let handle = data.pipeline.start_transcription(&video_id).await?;
    let state = data.pipeline.poll_status(&handle.video_id).await?;
    Ok(HttpResponse::Accepted().json(state))
}

#[get("/api/v1/videos/{id}/status")]
pub async fn job_status(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ClipError> {
    let state = data.pipeline.poll_status(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(state))
}

#[post("/api/v1/videos/{id}/search")]
pub async fn search_video(
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<SearchRequest>,
) -> Result<HttpResponse, ClipError> {
    let video_id = path.into_inner();
    let req = body.into_inner();
    let outcome = data
        .pipeline
        .search(&video_id, &req.query, req.mode, req.padding)
        .await?;
    Ok(HttpResponse::Ok().json(outcome))
}

#[post("/api/v1/videos/{id}/trim")]
pub async fn trim_video(
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<TrimRequest>,
) -> Result<HttpResponse, ClipError> {
    let video_id = path.into_inner();
    let clip = data.pipeline.trim(&video_id, body.start, body.end).await?;
    info!("Streaming {} ({} bytes)", clip.download_name, clip.len);

    Ok(HttpResponse::Ok()
        .content_type(clip.content_type)
        .insert_header(ContentDisposition::attachment(clip.download_name.clone()))
        .streaming(clip.into_stream()))
}

fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(64 * 1024)
        .error_handler(|err, _req| {
            let body = serde_json::json!({ "error": err.to_string() });
            InternalError::from_response(err, HttpResponse::BadRequest().json(body)).into()
        })
}

/// Registers every route; shared by `run_server` and the tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .service(health_check)
        .service(upload_video)
        .service(start_transcription)
        .service(job_status)
        .service(search_video)
        .service(trim_video);
}

async fn build_pipeline(config: &ServerConfig) -> Result<Arc<ClipPipeline>> {
    let storage = FsStorage::from_config(config);
    storage.ensure_directories().await?;

    let whisper_config = WhisperConfig::from_env()?;
    info!(
        "Loading whisper model: model_path={:?}, use_gpu={}, num_threads={}",
        whisper_config.model_path, whisper_config.use_gpu, whisper_config.num_threads
    );
    let recognizer = WhisperRecognizer::new(whisper_config)?;
    info!("Whisper model loaded");

    let pipeline = ClipPipeline::new(
        config.pipeline.clone(),
        Collaborators {
            extractor: Arc::new(FfmpegExtractor::default()),
            recognizer: Arc::new(recognizer),
            trimmer: Arc::new(FfmpegTrimmer),
            prober: Arc::new(FfprobeProber),
            storage: Arc::new(storage),
        },
    )?;
    Ok(Arc::new(pipeline))
}

fn spawn_housekeeping(pipeline: Arc<ClipPipeline>, config: &ServerConfig) {
    let every = config.sweep_interval.max(std::time::Duration::from_secs(1));
    let retention = config.job_retention;
    let max_age = config.max_file_age;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            pipeline.housekeeping(retention, max_age).await;
        }
    });
}

pub async fn run_server(host: String, port: u16) -> Result<()> {
    info!("Starting clip service");
    let config = ServerConfig::from_env()?;
    info!(
        "Using configuration: uploads={:?}, transcripts={:?}, language={}, padding={}s",
        config.upload_dir,
        config.transcript_dir,
        config.pipeline.language,
        config.pipeline.default_padding
    );

    let pipeline = match build_pipeline(&config).await {
        Ok(p) => p,
        Err(e) => {
            error!("Failed to initialize pipeline: {e:#}");
            return Err(e);
        }
    };
    spawn_housekeeping(Arc::clone(&pipeline), &config);

    let app_state = web::Data::new(AppState { pipeline });

    info!("Starting HTTP server on {host}:{port}");

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .wrap(Logger::default())
            .configure(configure)
    })
    .bind((host.as_str(), port))
    .with_context(|| format!("Failed to bind {host}:{port}"))?
    .run()
    .await
    .context("HTTP server failed")
}
