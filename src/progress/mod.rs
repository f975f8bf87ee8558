//! Stage progress for terminal output.
//!
//! Renders one line per pipeline stage with colored indicators, redrawn in
//! place on stderr. Only enabled on interactive terminals; disabled
//! trackers still record state so tests can inspect it.

use std::io::{self, Write};
use std::sync::Mutex;

use colored::Colorize;

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Snapshot,
    Prompt,
    Complete,
    Validate,
    Branch,
    Apply,
    Publish,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Snapshot,
        Stage::Prompt,
        Stage::Complete,
        Stage::Validate,
        Stage::Branch,
        Stage::Apply,
        Stage::Publish,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Stage::Snapshot => "Capture repository snapshot",
            Stage::Prompt => "Compose prompt",
            Stage::Complete => "Request changes from model",
            Stage::Validate => "Validate proposed changes",
            Stage::Branch => "Create patch branch",
            Stage::Apply => "Commit file changes",
            Stage::Publish => "Open pull request",
        }
    }
}

/// Status of a single stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageStatus {
    Pending,
    InProgress,
    /// Finished, with an optional short detail (e.g. "12 files").
    Done(Option<String>),
    Failed(String),
    /// Not run because an earlier stage ended the pipeline.
    Skipped,
}

/// Tracks and renders stage progress.
///
/// One tracker per pipeline run.
pub struct ProgressTracker {
    inner: Mutex<ProgressState>,
    enabled: bool,
}

struct ProgressState {
    stages: Vec<(Stage, StageStatus)>,
    rendered_lines: usize,
    headline: String,
}

impl ProgressTracker {
    pub fn new(headline: impl Into<String>, enabled: bool) -> Self {
        Self {
            inner: Mutex::new(ProgressState {
                stages: Stage::ALL.iter().map(|s| (*s, StageStatus::Pending)).collect(),
                rendered_lines: 0,
                headline: headline.into(),
            }),
            enabled,
        }
    }

    /// A tracker that records but never prints.
    pub fn disabled() -> Self {
        Self::new("", false)
    }

    pub fn start(&self) {
        if !self.enabled {
            return;
        }
        let mut state = self.lock();
        Self::render(&mut state);
    }

    pub fn update(&self, stage: Stage, status: StageStatus) {
        let mut state = self.lock();
        if let Some(entry) = state.stages.iter_mut().find(|(s, _)| *s == stage) {
            entry.1 = status;
        }
        if self.enabled {
            Self::render(&mut state);
        }
    }

    /// Mark every stage still pending as skipped and stop redrawing.
    pub fn finish(&self) {
        let mut state = self.lock();
        for (_, status) in state.stages.iter_mut() {
            if *status == StageStatus::Pending {
                *status = StageStatus::Skipped;
            }
        }
        if self.enabled {
            Self::render(&mut state);
            state.rendered_lines = 0;
        }
    }

    pub fn status(&self, stage: Stage) -> StageStatus {
        self.lock()
            .stages
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, status)| status.clone())
            .unwrap_or(StageStatus::Pending)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProgressState> {
        // A panic while rendering leaves the state usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn render(state: &mut ProgressState) {
        Self::clear_lines(state.rendered_lines);

        let stderr = io::stderr();
        let mut handle = stderr.lock();
        let mut lines = 0;

        let _ = writeln!(handle, "  {} {}", "▸".cyan().bold(), state.headline);
        lines += 1;

        for (stage, status) in &state.stages {
            let (icon, detail) = match status {
                StageStatus::Pending => ("○".dimmed().to_string(), String::new()),
                StageStatus::InProgress => (
                    "◌".cyan().bold().to_string(),
                    "working…".cyan().to_string(),
                ),
                StageStatus::Done(detail) => (
                    "✔".green().bold().to_string(),
                    detail.as_deref().unwrap_or("done").green().to_string(),
                ),
                StageStatus::Failed(reason) => {
                    ("✖".red().bold().to_string(), reason.red().to_string())
                }
                StageStatus::Skipped => ("–".dimmed().to_string(), "skipped".dimmed().to_string()),
            };
            let _ = writeln!(handle, "    {icon} {} {detail}", stage.label().dimmed());
            lines += 1;
        }

        let _ = handle.flush();
        state.rendered_lines = lines;
    }

    fn clear_lines(n: usize) {
        if n == 0 {
            return;
        }
        let stderr = io::stderr();
        let mut handle = stderr.lock();
        for _ in 0..n {
            let _ = write!(handle, "\x1b[1A\x1b[2K");
        }
        let _ = handle.flush();
    }
}
