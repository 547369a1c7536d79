use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;

use crate::error::ClipError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Uploaded,
    ExtractingAudio,
    Transcribing,
    Ready,
    Failed,
}

impl JobPhase {
    pub fn is_in_flight(self) -> bool {
        matches!(self, JobPhase::ExtractingAudio | JobPhase::Transcribing)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobPhase::Ready | JobPhase::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            JobPhase::Uploaded => 0,
            JobPhase::ExtractingAudio => 1,
            JobPhase::Transcribing => 2,
            JobPhase::Ready | JobPhase::Failed => 3,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobState {
    pub video_id: String,
    pub phase: JobPhase,
    pub error_detail: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl JobState {
    fn new(video_id: &str, phase: JobPhase) -> Self {
        Self {
            video_id: video_id.to_string(),
            phase,
            error_detail: None,
            updated_at: Utc::now(),
        }
    }
}

/// Per-video transcription state, read by status polling.
///
/// Writers hold the lock only long enough to swap a phase, so polling never
/// waits on extraction or recognition work.
#[derive(Debug, Default)]
pub struct JobTracker {
    jobs: RwLock<HashMap<String, JobState>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, video_id: &str) {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        jobs.insert(video_id.to_string(), JobState::new(video_id, JobPhase::Uploaded));
    }

    /// Like `register`, but leaves an existing entry alone.
    pub fn ensure_registered(&self, video_id: &str) {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        jobs.entry(video_id.to_string())
            .or_insert_with(|| JobState::new(video_id, JobPhase::Uploaded));
    }

    pub fn get(&self, video_id: &str) -> Option<JobState> {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        jobs.get(video_id).cloned()
    }

    /// Moves a video into `ExtractingAudio` unless a job is already running.
    ///
    /// Check and transition happen under one write lock, which is what keeps
    /// at most one transcription in flight per video.
    pub fn begin(&self, video_id: &str) -> Result<(), ClipError> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        let state = jobs
            .get_mut(video_id)
            .ok_or_else(|| ClipError::NotFound(format!("video {video_id}")))?;

        if state.phase.is_in_flight() {
            warn!("Rejected transcription for {video_id}: already {:?}", state.phase);
            return Err(ClipError::AlreadyInProgress(video_id.to_string()));
        }

        *state = JobState::new(video_id, JobPhase::ExtractingAudio);
        debug!("Job {video_id} -> ExtractingAudio");
        Ok(())
    }

    /// Forward-only transition. Returns false if the move would go backwards
    /// or the job already finished.
    pub fn advance(&self, video_id: &str, phase: JobPhase) -> bool {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        let Some(state) = jobs.get_mut(video_id) else {
            return false;
        };
        if state.phase.is_terminal() || phase.rank() <= state.phase.rank() {
            warn!(
                "Ignoring transition {:?} -> {phase:?} for {video_id}",
                state.phase
            );
            return false;
        }
        state.phase = phase;
        state.updated_at = Utc::now();
        debug!("Job {video_id} -> {phase:?}");
        true
    }

    pub fn fail(&self, video_id: &str, detail: String) -> bool {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        let Some(state) = jobs.get_mut(video_id) else {
            return false;
        };
        if state.phase.is_terminal() {
            return false;
        }
        state.phase = JobPhase::Failed;
        state.error_detail = Some(detail);
        state.updated_at = Utc::now();
        true
    }

    /// Records a transcript found on disk for a video this process has not
    /// transcribed itself.
    pub fn mark_ready(&self, video_id: &str) {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        let state = jobs
            .entry(video_id.to_string())
            .or_insert_with(|| JobState::new(video_id, JobPhase::Ready));
        if !state.phase.is_in_flight() {
            state.phase = JobPhase::Ready;
            state.error_detail = None;
        }
    }

    /// Drops terminal entries that have not changed for `retention` and
    /// returns the ids that went.
    pub fn evict_expired(&self, retention: Duration) -> Vec<String> {
        let Ok(retention) = chrono::Duration::from_std(retention) else {
            return Vec::new();
        };
        let cutoff = Utc::now() - retention;
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        let mut evicted = Vec::new();
        jobs.retain(|id, state| {
            let expired = state.phase.is_terminal() && state.updated_at <= cutoff;
            if expired {
                evicted.push(id.clone());
            }
            !expired
        });
        evicted
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_only_move_forward() {
        let tracker = JobTracker::new();
        tracker.register("v");
        tracker.begin("v").unwrap();

        assert!(tracker.advance("v", JobPhase::Transcribing));
        assert!(!tracker.advance("v", JobPhase::ExtractingAudio));
        assert!(tracker.advance("v", JobPhase::Ready));
        assert!(!tracker.fail("v", "late".into()));

        let state = tracker.get("v").unwrap();
        assert_eq!(state.phase, JobPhase::Ready);
        assert!(state.error_detail.is_none());
    }

    #[test]
    fn second_begin_is_rejected_while_in_flight() {
        let tracker = JobTracker::new();
        tracker.register("v");
        tracker.begin("v").unwrap();
        tracker.advance("v", JobPhase::Transcribing);

        let err = tracker.begin("v").unwrap_err();
        assert!(matches!(err, ClipError::AlreadyInProgress(_)));
        assert_eq!(tracker.get("v").unwrap().phase, JobPhase::Transcribing);
    }

    #[test]
    fn failed_job_keeps_detail_and_can_restart() {
        let tracker = JobTracker::new();
        tracker.register("v");
        tracker.begin("v").unwrap();
        assert!(tracker.fail("v", "ffmpeg exited with 1".into()));

        let state = tracker.get("v").unwrap();
        assert_eq!(state.phase, JobPhase::Failed);
        assert_eq!(state.error_detail.as_deref(), Some("ffmpeg exited with 1"));

        tracker.begin("v").unwrap();
        let state = tracker.get("v").unwrap();
        assert_eq!(state.phase, JobPhase::ExtractingAudio);
        assert!(state.error_detail.is_none());
    }

    #[test]
    fn unknown_video_is_not_found() {
        let tracker = JobTracker::new();
        assert!(matches!(tracker.begin("nope"), Err(ClipError::NotFound(_))));
        assert!(tracker.get("nope").is_none());
        assert!(!tracker.advance("nope", JobPhase::Ready));
    }

    #[test]
    fn eviction_only_touches_old_terminal_entries() {
        let tracker = JobTracker::new();
        tracker.register("uploaded");
        tracker.register("done");
        tracker.begin("done").unwrap();
        tracker.advance("done", JobPhase::Ready);

        assert!(tracker.evict_expired(Duration::from_secs(3600)).is_empty());
        assert_eq!(tracker.evict_expired(Duration::ZERO), ["done"]);
        assert!(tracker.get("done").is_none());
        assert!(tracker.get("uploaded").is_some());
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn ensure_registered_keeps_existing_state() {
        let tracker = JobTracker::new();
        tracker.ensure_registered("v");
        tracker.begin("v").unwrap();
        tracker.ensure_registered("v");
        assert_eq!(tracker.get("v").unwrap().phase, JobPhase::ExtractingAudio);
    }

    #[test]
    fn mark_ready_does_not_interrupt_a_running_job() {
        let tracker = JobTracker::new();
        tracker.mark_ready("disk");
        assert_eq!(tracker.get("disk").unwrap().phase, JobPhase::Ready);

        tracker.register("busy");
        tracker.begin("busy").unwrap();
        tracker.mark_ready("busy");
        assert_eq!(tracker.get("busy").unwrap().phase, JobPhase::ExtractingAudio);
    }
}
