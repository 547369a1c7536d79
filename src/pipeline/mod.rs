//! Upload → extract → transcribe → search → trim orchestration.

pub mod artifact;
pub mod traits;
pub mod upload;

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::ClipError;
use crate::jobs::{JobPhase, JobState, JobTracker};
use crate::media::content_type_for;
use crate::search::{self, SearchMode, TimeRange, WordIndex, WordMatch};
use crate::transcript::Transcript;

pub use artifact::{TempArtifact, TrimmedClip};
pub use upload::PendingUpload;
use traits::{AudioExtractor, MediaProber, RecognitionRequest, Recognizer, Storage, Trimmer};

#[derive(Debug, Clone, Serialize)]
pub struct VideoRecord {
    pub id: String,
    pub filename: String,
    #[serde(skip)]
    pub path: PathBuf,
    pub extension: String,
    pub duration: Option<f64>,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub query: String,
    pub mode: SearchMode,
    pub padding: f64,
    pub matches: Vec<WordMatch>,
    pub ranges: Vec<TimeRange>,
}

/// The external collaborators a pipeline drives.
pub struct Collaborators {
    pub extractor: Arc<dyn AudioExtractor>,
    pub recognizer: Arc<dyn Recognizer>,
    pub trimmer: Arc<dyn Trimmer>,
    pub prober: Arc<dyn MediaProber>,
    pub storage: Arc<dyn Storage>,
}

/// Handle to a background transcription job.
pub struct JobHandle {
    pub video_id: String,
    task: JoinHandle<Result<(), ClipError>>,
}

impl JobHandle {
    /// Waits for the job. Callers that only poll status can drop the handle.
    pub async fn wait(self) -> Result<(), ClipError> {
        self.task
            .await
            .map_err(|e| ClipError::Recognition(format!("transcription task aborted: {e}")))?
    }
}

pub struct ClipPipeline {
    config: PipelineConfig,
    extractor: Arc<dyn AudioExtractor>,
    recognizer: Arc<dyn Recognizer>,
    trimmer: Arc<dyn Trimmer>,
    prober: Arc<dyn MediaProber>,
    storage: Arc<dyn Storage>,
    jobs: JobTracker,
    videos: RwLock<HashMap<String, VideoRecord>>,
    indexes: RwLock<HashMap<String, Arc<WordIndex>>>,
    recognition_slots: Semaphore,
}

async fn with_timeout<T>(
    limit: Duration,
    what: &str,
    fut: impl Future<Output = anyhow::Result<T>>,
) -> anyhow::Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(anyhow!("{what} timed out after {}s", limit.as_secs_f64())),
    }
}

/// `0 <= start < end <= duration`, with the upper bound skipped when the
/// duration is unknown.
pub fn validate_range(start: f64, end: f64, duration: Option<f64>) -> Result<(), ClipError> {
    if !start.is_finite() || !end.is_finite() {
        return Err(ClipError::InvalidRange(format!(
            "start and end must be finite numbers (got {start}, {end})"
        )));
    }
    if start < 0.0 {
        return Err(ClipError::InvalidRange(format!("start {start} is negative")));
    }
    if start >= end {
        return Err(ClipError::InvalidRange(format!(
            "start {start} must be before end {end}"
        )));
    }
    if let Some(duration) = duration {
        if end > duration {
            return Err(ClipError::InvalidRange(format!(
                "end {end} is past the media duration {duration}"
            )));
        }
    }
    Ok(())
}

impl ClipPipeline {
    pub fn new(config: PipelineConfig, collaborators: Collaborators) -> Result<Self, ClipError> {
        if !collaborators.recognizer.supports_word_timestamps() {
            return Err(ClipError::Configuration(
                "the configured recognizer cannot produce word-level timestamps".to_string(),
            ));
        }
        let slots = config.max_concurrent_transcriptions.max(1);
        Ok(Self {
            config,
            extractor: collaborators.extractor,
            recognizer: collaborators.recognizer,
            trimmer: collaborators.trimmer,
            prober: collaborators.prober,
            storage: collaborators.storage,
            jobs: JobTracker::new(),
            videos: RwLock::new(HashMap::new()),
            indexes: RwLock::new(HashMap::new()),
            recognition_slots: Semaphore::new(slots),
        })
    }

    pub fn jobs(&self) -> &JobTracker {
        &self.jobs
    }

    pub fn cached_videos(&self) -> usize {
        self.videos.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn cached_indexes(&self) -> usize {
        self.indexes.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Lowercased extension of `filename` if uploads of that type are allowed.
    pub fn validate_filename(&self, filename: &str) -> Result<String, ClipError> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| ClipError::Validation(format!("File name has no extension: {filename:?}")))?;

        if !self.config.allowed_extensions.contains(&extension) {
            return Err(ClipError::Validation(format!(
                "Unsupported file type .{extension} (allowed: {})",
                self.config.allowed_extensions.join(", ")
            )));
        }
        Ok(extension)
    }

    /// Opens an upload on disk under a fresh id. Chunks are written with
    /// [`PendingUpload::write`], which enforces the size limit, and the
    /// upload becomes a video with [`ClipPipeline::finish_upload`].
    pub async fn begin_upload(&self, filename: &str) -> Result<PendingUpload, ClipError> {
        let extension = self.validate_filename(filename)?;
        let id = Uuid::new_v4().to_string();
        let destination = self
            .storage
            .video_path(&id, &extension)
            .await
            .map_err(ClipError::storage)?;
        PendingUpload::create(
            id,
            filename.to_string(),
            extension,
            destination,
            self.config.max_file_size,
        )
        .await
    }

    pub async fn finish_upload(&self, pending: PendingUpload) -> Result<VideoRecord, ClipError> {
        let stored = pending.commit().await?;
        let duration = self.probe(&stored.path).await;
        let record = VideoRecord {
            id: stored.id,
            filename: stored.filename,
            path: stored.path,
            extension: stored.extension,
            duration,
            uploaded_at: Utc::now(),
        };
        info!(
            "Uploaded {} as {} ({} bytes, duration {:?})",
            record.filename, record.id, stored.size, record.duration
        );

        self.videos
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(record.id.clone(), record.clone());
        self.jobs.register(&record.id);
        Ok(record)
    }

    /// Stores an upload already held in memory.
    pub async fn upload(&self, filename: &str, bytes: &[u8]) -> Result<VideoRecord, ClipError> {
        let mut pending = self.begin_upload(filename).await?;
        pending.write(bytes).await?;
        self.finish_upload(pending).await
    }

    async fn probe(&self, path: &Path) -> Option<f64> {
        match self.prober.duration(path).await {
            Ok(duration) => duration,
            Err(e) => {
                warn!("Could not probe duration of {}: {e:#}", path.display());
                None
            }
        }
    }

    /// Registered record, or one rebuilt from an upload found on disk.
    pub async fn resolve_video(&self, video_id: &str) -> Result<VideoRecord, ClipError> {
        let known = self
            .videos
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(video_id)
            .cloned();
        if let Some(record) = known {
            self.jobs.ensure_registered(video_id);
            return Ok(record);
        }

        let path = self
            .storage
            .find_video(video_id, &self.config.allowed_extensions)
            .await
            .map_err(|_| ClipError::NotFound(format!("video {video_id}")))?
            .ok_or_else(|| ClipError::NotFound(format!("video {video_id}")))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_string();
        let record = VideoRecord {
            id: video_id.to_string(),
            filename: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            duration: self.probe(&path).await,
            path,
            extension,
            uploaded_at: Utc::now(),
        };
        debug!("Rehydrated video {video_id} from {}", record.path.display());

        let mut videos = self.videos.write().unwrap_or_else(|e| e.into_inner());
        let record = videos
            .entry(video_id.to_string())
            .or_insert(record)
            .clone();
        drop(videos);

        self.jobs.ensure_registered(video_id);
        Ok(record)
    }

    /// Starts a background transcription. Rejected with `AlreadyInProgress`
    /// while another job for the same video is extracting or transcribing.
    pub async fn start_transcription(self: &Arc<Self>, video_id: &str) -> Result<JobHandle, ClipError> {
        let record = self.resolve_video(video_id).await?;
        self.jobs.begin(video_id)?;
        info!("Transcription job accepted for {video_id}");

        // The previous transcript is replaced, never served alongside a new job.
        if let Err(e) = self.storage.delete_transcript(video_id).await {
            let err = ClipError::storage(e);
            self.jobs.fail(video_id, err.to_string());
            return Err(err);
        }
        self.indexes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(video_id);

        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            let id = record.id.clone();
            let result = this.run_transcription(&record).await;
            if let Err(e) = &result {
                error!("Transcription for {id} failed: {e}");
                this.jobs.fail(&id, e.to_string());
            }
            result
        });

        Ok(JobHandle {
            video_id: video_id.to_string(),
            task,
        })
    }

    async fn run_transcription(&self, record: &VideoRecord) -> Result<(), ClipError> {
        let video_id = record.id.as_str();
        let audio = TempArtifact::new(
            self.storage
                .temp_path(&format!("{video_id}_{}", Uuid::new_v4()), "wav"),
        );

        with_timeout(
            self.config.extraction_timeout,
            "audio extraction",
            self.extractor.extract(&record.path, audio.path()),
        )
        .await
        .map_err(ClipError::extraction)?;

        self.jobs.advance(video_id, JobPhase::Transcribing);

        let raw = {
            let _slot = self
                .recognition_slots
                .acquire()
                .await
                .map_err(|e| ClipError::Recognition(e.to_string()))?;
            let request = RecognitionRequest {
                language: self.config.language.clone(),
                word_timestamps: true,
            };
            with_timeout(
                self.config.recognition_timeout,
                "recognition",
                self.recognizer.transcribe(audio.path(), &request),
            )
            .await
            .map_err(ClipError::recognition)?
        };
        drop(audio);

        let transcript = Transcript::from_recognition(video_id, raw)?;
        info!(
            "Transcribed {video_id}: {} segments, {} words, language {}",
            transcript.segments.len(),
            transcript.word_count(),
            transcript.language
        );

        self.storage
            .save_transcript(&transcript)
            .await
            .map_err(ClipError::storage)?;

        self.indexes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(video_id.to_string(), Arc::new(WordIndex::new(transcript)));

        self.jobs.advance(video_id, JobPhase::Ready);
        Ok(())
    }

    pub async fn poll_status(&self, video_id: &str) -> Result<JobState, ClipError> {
        if let Some(state) = self.jobs.get(video_id) {
            return Ok(state);
        }
        // Not tracked (evicted or from an earlier run): rebuild from disk.
        self.resolve_video(video_id).await?;
        if self.index_for(video_id).await.is_ok() {
            self.jobs.mark_ready(video_id);
        }
        self.jobs
            .get(video_id)
            .ok_or_else(|| ClipError::NotFound(format!("video {video_id}")))
    }

    /// Cached index for the video's current transcript, loaded on first use.
    async fn index_for(&self, video_id: &str) -> Result<Arc<WordIndex>, ClipError> {
        let cached = self
            .indexes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(video_id)
            .cloned();
        if let Some(index) = cached {
            return Ok(index);
        }

        let transcript = self
            .storage
            .load_transcript(video_id)
            .await
            .map_err(ClipError::storage)?
            .ok_or_else(|| ClipError::NotFound(format!("transcript for video {video_id}")))?;

        let index = Arc::new(WordIndex::new(transcript));
        debug!(
            "Indexed {video_id}: {} distinct words",
            index.distinct_words()
        );
        self.indexes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(video_id.to_string(), Arc::clone(&index));
        Ok(index)
    }

    pub async fn search(
        &self,
        video_id: &str,
        query: &str,
        mode: SearchMode,
        padding: Option<f64>,
    ) -> Result<SearchOutcome, ClipError> {
        let index = self.index_for(video_id).await?;
        let padding = padding.unwrap_or(self.config.default_padding);
        if !padding.is_finite() || padding < 0.0 {
            return Err(ClipError::Validation(format!(
                "padding must be a non-negative number (got {padding})"
            )));
        }

        let duration = match self.resolve_video(video_id).await {
            Ok(record) => record.duration,
            Err(_) => None,
        };

        let matches = search::search(&index, query, mode);
        let ranges = search::plan(&matches, padding, duration.unwrap_or(0.0));
        debug!(
            "Search {query:?} ({mode}) on {video_id}: {} matches, {} ranges, {:.1}s total",
            matches.len(),
            ranges.len(),
            ranges.iter().map(TimeRange::duration).sum::<f64>()
        );

        Ok(SearchOutcome {
            query: query.to_string(),
            mode,
            padding,
            matches,
            ranges,
        })
    }

    /// Cuts `[start, end]` out of a transcribed video.
    ///
    /// The returned clip owns its temp file; it is removed on every exit
    /// path, including a trimmer failure halfway through writing it.
    pub async fn trim(&self, video_id: &str, start: f64, end: f64) -> Result<TrimmedClip, ClipError> {
        let record = self.resolve_video(video_id).await?;
        self.index_for(video_id).await?;
        validate_range(start, end, record.duration)?;

        let artifact = TempArtifact::new(self.storage.temp_path(
            &format!("{video_id}_{}", Uuid::new_v4()),
            &record.extension,
        ));

        with_timeout(
            self.config.trim_timeout,
            "trim",
            self.trimmer.cut(&record.path, start, end, artifact.path()),
        )
        .await
        .map_err(ClipError::trim)?;

        let file = tokio::fs::File::open(artifact.path())
            .await
            .map_err(|e| ClipError::Trim(format!("trimmer produced no output: {e}")))?;
        let len = file.metadata().await?.len();

        let stem = Path::new(&record.filename)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| video_id.to_string());
        let download_name = format!("{stem}_{start:.2}-{end:.2}.{}", record.extension);
        info!("Trimmed {video_id} [{start:.2}, {end:.2}] -> {len} bytes");

        Ok(TrimmedClip::new(
            file,
            artifact,
            len,
            content_type_for(&record.extension),
            download_name,
        ))
    }

    /// Evicts old job entries, with the cached record and index of each
    /// evicted video, and sweeps stale temp files. Evicted videos are
    /// rebuilt from disk on their next use.
    pub async fn housekeeping(&self, job_retention: Duration, max_file_age: Duration) -> usize {
        let evicted_ids = self.jobs.evict_expired(job_retention);
        if !evicted_ids.is_empty() {
            let mut videos = self.videos.write().unwrap_or_else(|e| e.into_inner());
            let mut indexes = self.indexes.write().unwrap_or_else(|e| e.into_inner());
            for id in &evicted_ids {
                videos.remove(id);
                indexes.remove(id);
            }
        }
        let evicted = evicted_ids.len();
        let removed = match self.storage.remove_stale_temp_files(max_file_age).await {
            Ok(n) => n,
            Err(e) => {
                warn!("Temp sweep failed: {e:#}");
                0
            }
        };
        debug!(
            "Housekeeping: {} jobs, {} videos, {} indexes still held",
            self.jobs.len(),
            self.cached_videos(),
            self.cached_indexes()
        );
        if evicted + removed > 0 {
            info!("Housekeeping: evicted {evicted} jobs, removed {removed} temp files");
        }
        evicted + removed
    }
}
