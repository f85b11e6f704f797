//! Background tiling jobs.
//!
//! ```text
//! submit ──► WorkerPool ──► spawn_blocking ──► TilingJob::run
//!                │                                  │
//!                ▼                                  ▼
//!            JobHandle ◄──── JobProgress ◄──── convert / build
//! ```
//!
//! A job's progress moves monotonically from `0.0` to `1.0`; its state goes
//! `Idle → Running → Complete | Failed` and never leaves a terminal state.

mod pool;
mod progress;
mod tiling;

pub use pool::{JobHandle, WorkerPool, DEFAULT_WORKERS};
pub use progress::{JobProgress, JobState, ProgressRange};
pub use tiling::TilingJob;
