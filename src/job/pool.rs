//! Bounded pool running blocking jobs.
//!
//! Jobs are synchronous closures executed on Tokio's blocking thread pool,
//! at most `workers` at a time. Submitting returns a [`JobHandle`]; whatever
//! happens inside the job, including a panic, ends up as the handle's state
//! and error message rather than escaping the pool.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::progress::{JobProgress, JobState};

/// Default number of jobs run concurrently.
pub const DEFAULT_WORKERS: usize = 2;

/// How long cancelled jobs get to unwind during shutdown.
const CANCEL_GRACE: Duration = Duration::from_secs(2);

// =============================================================================
// Job Handle
// =============================================================================

/// Observer side of a submitted job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    name: Arc<str>,
    progress: Arc<JobProgress>,
}

impl JobHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fraction done, reaching `1.0` on success and failure alike.
    pub fn progress(&self) -> f64 {
        self.progress.progress()
    }

    /// Error message once the job has failed.
    pub fn error(&self) -> Option<String> {
        self.progress.error()
    }

    pub fn state(&self) -> JobState {
        self.progress.state()
    }

    pub fn is_running(&self) -> bool {
        self.progress.is_running()
    }

    pub fn is_finished(&self) -> bool {
        self.progress.is_finished()
    }

    /// Ask the job to stop. Running external tools are killed and the job
    /// fails; a queued job fails as soon as it is scheduled.
    pub fn cancel(&self) {
        self.progress.cancel();
    }

    /// Wait for the job to finish, for at most `timeout` if given.
    ///
    /// Returns `true` if the job finished. Timing out only stops waiting;
    /// the job keeps running.
    pub async fn wait(&self, timeout: Option<Duration>) -> bool {
        let mut state = self.progress.subscribe();
        let finished = async move { state.wait_for(|s| s.is_terminal()).await.is_ok() };

        match timeout {
            Some(timeout) => tokio::time::timeout(timeout, finished)
                .await
                .unwrap_or(false),
            None => finished.await,
        }
    }
}

// =============================================================================
// Worker Pool
// =============================================================================

/// Runs blocking jobs with bounded concurrency.
///
/// Must be used from within a Tokio runtime.
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    workers: usize,
    jobs: Mutex<Vec<PoolJob>>,
}

/// Wrapper task of a submitted job and the progress it reports into.
struct PoolJob {
    task: JoinHandle<()>,
    progress: Arc<JobProgress>,
}

impl WorkerPool {
    /// Create a pool running at most `workers` jobs at once (minimum one).
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            workers,
            jobs: Mutex::new(Vec::new()),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Queue a job.
    ///
    /// `work` receives the job's progress to report into and returns an
    /// error message on failure.
    pub fn submit<F>(&self, name: impl Into<String>, work: F) -> JobHandle
    where
        F: FnOnce(&JobProgress) -> Result<(), String> + Send + 'static,
    {
        let name: Arc<str> = Arc::from(name.into());
        let progress = Arc::new(JobProgress::new());
        let handle = JobHandle {
            name: Arc::clone(&name),
            progress: Arc::clone(&progress),
        };

        let permits = Arc::clone(&self.permits);
        let task_progress = Arc::clone(&progress);
        let task = tokio::spawn(async move {
            let progress = task_progress;
            let Ok(_permit) = permits.acquire_owned().await else {
                progress.fail("worker pool shut down before the job started");
                return;
            };
            if progress.is_cancelled() {
                progress.fail("job cancelled before it started");
                return;
            }

            let worker_progress = Arc::clone(&progress);
            let job_name = Arc::clone(&name);
            let joined = tokio::task::spawn_blocking(move || {
                worker_progress.start();
                debug!(job = %job_name, "job started");
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| work(&worker_progress)));
                match outcome {
                    Ok(Ok(())) => {
                        worker_progress.complete();
                    }
                    Ok(Err(message)) => {
                        warn!(job = %job_name, error = %message, "job failed");
                        worker_progress.fail(message);
                    }
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        warn!(job = %job_name, error = %message, "job panicked");
                        worker_progress.fail(format!("job panicked: {}", message));
                    }
                }
            })
            .await;

            if let Err(e) = joined {
                progress.fail(format!("job could not run: {}", e));
            }
        });

        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        jobs.retain(|job| !job.task.is_finished());
        jobs.push(PoolJob { task, progress });

        handle
    }

    /// Stop accepting work and cancel every job not yet finished.
    ///
    /// Queued jobs fail immediately; running jobs fail at their next
    /// cancellation check.
    pub fn cancel_all(&self) {
        self.permits.close();
        let jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        for job in jobs.iter().filter(|job| !job.task.is_finished()) {
            job.progress.cancel();
        }
    }

    /// Stop accepting work and wait up to `timeout` for running jobs.
    ///
    /// Queued jobs fail immediately. Jobs still running when the timeout
    /// expires are cancelled and get a short grace period to unwind; any
    /// that ignore cancellation are detached. Returns `true` if every job
    /// finished within `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.permits.close();

        let jobs: Vec<PoolJob> = {
            let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
            jobs.drain(..).collect()
        };

        let abort_handles: Vec<_> = jobs.iter().map(|job| job.task.abort_handle()).collect();
        let progresses: Vec<Arc<JobProgress>> =
            jobs.iter().map(|job| Arc::clone(&job.progress)).collect();
        let mut all = Box::pin(async move {
            for job in jobs {
                let _ = job.task.await;
            }
        });

        if tokio::time::timeout(timeout, &mut all).await.is_ok() {
            return true;
        }

        warn!("worker pool shutdown timed out, cancelling running jobs");
        for progress in progresses.iter().filter(|p| !p.is_finished()) {
            progress.cancel();
        }
        if tokio::time::timeout(CANCEL_GRACE, &mut all).await.is_err() {
            warn!("jobs ignored cancellation, detaching them");
            for handle in abort_handles {
                handle.abort();
            }
        }
        false
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
