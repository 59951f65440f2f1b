//! Export session state machine.
//!
//! `Idle -> Running -> {Completed, Failed} -> (timed reset) -> Idle`.
//! The state field is the only guard against concurrent exports.

use super::models::{ExportProgress, ExportSummary, ERROR_PREFIX};

/// Lifecycle state of the process-wide export session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum ExportState {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

impl ExportState {
    const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// The single export session, owned by the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct ExportSession {
    state: ExportState,
    progress: ExportProgress,
    /// Bumped on every start so stale reset timers can be told apart.
    generation: u64,
    /// Location of the most recent saved archive. Survives resets.
    last_archive: Option<String>,
}

impl ExportSession {
    #[must_use]
    pub const fn progress(&self) -> &ExportProgress {
        &self.progress
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn last_archive(&self) -> Option<&str> {
        self.last_archive.as_deref()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state == ExportState::Running
    }

    /// Enter `Running`. Returns `false` (and changes nothing) if an export
    /// is already running.
    pub fn begin(&mut self, status: impl Into<String>) -> bool {
        if self.is_running() {
            return false;
        }
        self.state = ExportState::Running;
        self.generation += 1;
        self.progress = ExportProgress::status(status);
        true
    }

    /// Replace the progress of the running export. Ignored otherwise.
    pub fn update(&mut self, progress: ExportProgress) -> bool {
        if !self.is_running() {
            return false;
        }
        self.progress = progress;
        true
    }

    /// Enter `Completed` with a summary status.
    pub fn complete(&mut self, summary: &ExportSummary) {
        self.state = ExportState::Completed;
        self.last_archive = Some(summary.saved_to.clone());
        self.progress = ExportProgress::new(summary.total, summary.total, summary.status_line());
    }

    /// Enter `Failed`, keeping counters and replacing the status.
    pub fn fail(&mut self, message: &str) {
        self.state = ExportState::Failed;
        self.progress.status = format!("{ERROR_PREFIX}: {message}");
    }

    /// Return to `Idle` with empty progress, unless a newer export started
    /// since `generation` finished.
    pub fn reset(&mut self, generation: u64) -> bool {
        if generation != self.generation || !self.state.is_terminal() {
            return false;
        }
        self.state = ExportState::Idle;
        self.progress = ExportProgress::default();
        true
    }
}
