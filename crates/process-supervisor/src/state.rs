//! Observable state of a supervised process

use chrono::{DateTime, Utc};
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::Error;
use crate::process::ExitStatus;
use crate::status::Status;

/// Snapshot of a supervised process at one instant
#[derive(Debug, Clone, Default)]
pub struct ProcessState {
    /// Current lifecycle status
    pub status: Status,
    /// Pid of the current (or last) instance
    pub pid: Option<u32>,
    /// How the last instance exited
    pub exit: Option<ExitStatus>,
    /// Why the process stopped, when it was not a clean or requested stop
    pub error: Option<Arc<Error>>,
    /// When the current instance was launched
    pub started_at: Option<DateTime<Utc>>,
    /// When the process reached `Stopped`
    pub stopped_at: Option<DateTime<Utc>>,
    /// Command line of the current instance
    pub command: String,
    /// Number of launch attempts so far, including restarts
    pub launches: u64,
}

impl ProcessState {
    /// Exit code of the last instance, if it exited normally
    pub fn exit_code(&self) -> Option<i32> {
        self.exit.and_then(|exit| exit.code)
    }

    /// Time since launch, up to the stop time once stopped
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        let start = self.started_at?;
        let end = self.stopped_at.unwrap_or_else(Utc::now);
        Some(end - start)
    }
}

/// Create the single writer and a cloneable reader over one state
pub(crate) fn shared() -> (StateWriter, StateReader) {
    let state = Arc::new(RwLock::new(ProcessState::default()));
    (StateWriter(state.clone()), StateReader(state))
}

/// The only handle that may mutate a process state. Not `Clone`: it is owned
/// by the supervising task.
#[derive(Debug)]
pub(crate) struct StateWriter(Arc<RwLock<ProcessState>>);

impl StateWriter {
    pub(crate) fn update(&mut self, f: impl FnOnce(&mut ProcessState)) {
        let mut state = self.0.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut state);
    }

    pub(crate) fn read<T>(&self, f: impl FnOnce(&ProcessState) -> T) -> T {
        let state = self.0.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }
}

/// Read-only view handed out to callers
#[derive(Debug, Clone)]
pub(crate) struct StateReader(Arc<RwLock<ProcessState>>);

impl StateReader {
    pub(crate) fn snapshot(&self) -> ProcessState {
        self.read(Clone::clone)
    }

    pub(crate) fn read<T>(&self, f: impl FnOnce(&ProcessState) -> T) -> T {
        let state = self.0.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }
}
