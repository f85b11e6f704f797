//! Shared progress and outcome of one job.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::watch;

/// Lifecycle of a job. `Complete` and `Failed` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Idle,
    Running,
    Complete,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Complete | JobState::Failed)
    }
}

/// Progress, state and error message of a job, shared between the worker
/// running it and any number of observers.
///
/// Progress is a fraction in `[0.0, 1.0]` that never decreases and reaches
/// `1.0` whether the job succeeds or fails, so "finished" can be detected
/// from progress alone.
///
/// Cancellation is cooperative: [`cancel`](Self::cancel) only raises a flag
/// that the running work polls and answers by failing early.
#[derive(Debug)]
pub struct JobProgress {
    /// `f64` bit pattern of the current fraction
    progress: AtomicU64,
    cancelled: AtomicBool,
    error: Mutex<Option<String>>,
    state: watch::Sender<JobState>,
}

impl JobProgress {
    pub fn new() -> Self {
        let (state, _) = watch::channel(JobState::Idle);
        Self {
            progress: AtomicU64::new(0f64.to_bits()),
            cancelled: AtomicBool::new(false),
            error: Mutex::new(None),
            state,
        }
    }

    /// Current fraction done.
    pub fn progress(&self) -> f64 {
        f64::from_bits(self.progress.load(Ordering::Acquire))
    }

    /// Raise progress to `fraction`; lower values are ignored.
    pub fn set_progress(&self, fraction: f64) {
        if fraction.is_nan() {
            return;
        }
        let fraction = fraction.clamp(0.0, 1.0);

        let _ = self
            .progress
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                (fraction > f64::from_bits(bits)).then_some(fraction.to_bits())
            });
    }

    /// A view mapping `[0, 1]` onto `[start, end]` of this job's progress.
    pub fn range(&self, start: f64, end: f64) -> ProgressRange<'_> {
        ProgressRange {
            job: self,
            start,
            end,
        }
    }

    /// A view covering the whole job.
    pub fn full(&self) -> ProgressRange<'_> {
        self.range(0.0, 1.0)
    }

    pub fn state(&self) -> JobState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == JobState::Running
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Error message of a failed job.
    pub fn error(&self) -> Option<String> {
        self.error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// `Idle -> Running`. Returns `false` if the job had already left `Idle`.
    pub fn start(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == JobState::Idle {
                *state = JobState::Running;
                true
            } else {
                false
            }
        })
    }

    /// Finish successfully. No effect on a finished job.
    pub fn complete(&self) -> bool {
        self.finish(JobState::Complete)
    }

    /// Finish with an error message. No effect on a finished job.
    pub fn fail(&self, message: impl Into<String>) -> bool {
        if self.is_finished() {
            return false;
        }
        let mut error = self.error.lock().unwrap_or_else(PoisonError::into_inner);
        if error.is_none() {
            *error = Some(message.into());
        }
        drop(error);
        self.finish(JobState::Failed)
    }

    fn finish(&self, outcome: JobState) -> bool {
        self.set_progress(1.0);
        self.state.send_if_modified(|state| {
            if state.is_terminal() {
                false
            } else {
                *state = outcome;
                true
            }
        })
    }

    /// Ask the work behind this job to stop.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<JobState> {
        self.state.subscribe()
    }
}

impl Default for JobProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Reports a sub-task's own `[0, 1]` progress into a slice of a job.
#[derive(Debug, Clone, Copy)]
pub struct ProgressRange<'a> {
    job: &'a JobProgress,
    start: f64,
    end: f64,
}

impl ProgressRange<'_> {
    /// Report that the sub-task is `fraction` done.
    pub fn set(&self, fraction: f64) {
        let fraction = fraction.clamp(0.0, 1.0);
        self.job
            .set_progress(self.start + (self.end - self.start) * fraction);
    }

    /// Mark the sub-task done.
    pub fn finish(&self) {
        self.set(1.0);
    }

    /// Whether the job this range reports into was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.job.is_cancelled()
    }
}
