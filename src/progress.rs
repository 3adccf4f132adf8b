//! Terminal progress using indicatif.
//!
//! [`Progress`] renders an [`IndexObserver`] as a bar over the file
//! universe, and an [`ExecutionObserver`] as a spinner naming the file
//! being backed up and removed. With `quiet` nothing is drawn.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use bytesize::ByteSize;
use indicatif::{ProgressBar, ProgressStyle};

use crate::actions::{CandidateOutcome, CandidateResult, ExecutionObserver, ExecutionReport};
use crate::indexer::{IndexObserver, IndexProgress, IndexReport};

/// Progress reporter for the `index` and `execute` commands.
pub struct Progress {
    bar: Mutex<Option<ProgressBar>>,
    quiet: bool,
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress").field("quiet", &self.quiet).finish_non_exhaustive()
    }
}

impl Progress {
    /// Create a reporter; `quiet` disables all drawing.
    ///
    /// ```
    /// use safedupe::progress::Progress;
    ///
    /// let progress = Progress::new(true);
    /// ```
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            bar: Mutex::new(None),
            quiet,
        }
    }

    fn index_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█>-")
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        let guard = self.bar.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(bar) = guard.as_ref() {
            f(bar);
        }
    }

    fn replace(&self, bar: Option<ProgressBar>) -> Option<ProgressBar> {
        let mut guard = self.bar.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *guard, bar)
    }
}

impl IndexObserver for Progress {
    fn on_start(&self, total: usize, offset: usize) {
        if self.quiet {
            return;
        }
        let bar = ProgressBar::new(total as u64);
        bar.set_style(Self::index_style());
        bar.set_position(offset as u64);
        bar.set_message("Indexing");
        self.replace(Some(bar));
    }

    fn on_batch(&self, progress: &IndexProgress) {
        self.with_bar(|bar| {
            bar.set_position(progress.processed as u64);
            bar.set_message(batch_message(progress));
        });
    }

    fn on_finish(&self, report: &IndexReport) {
        if let Some(bar) = self.replace(None) {
            if report.cancelled {
                bar.abandon_with_message(format!("Cancelled at {}", report.next_offset));
            } else {
                bar.finish_with_message(format!("{} duplicates", report.duplicates));
            }
        }
    }
}

impl ExecutionObserver for Progress {
    fn on_candidate(&self, _group_id: &str, path: &Path) {
        if self.quiet {
            return;
        }
        let mut guard = self.bar.lock().unwrap_or_else(|e| e.into_inner());
        let bar = guard.get_or_insert_with(|| {
            let bar = ProgressBar::new_spinner();
            bar.set_style(Self::spinner_style());
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        });
        bar.set_message(truncate_path(&path.to_string_lossy(), 50));
    }

    fn on_result(&self, _group_id: &str, result: &CandidateResult) {
        if let CandidateOutcome::Failed(e) = &result.outcome {
            self.with_bar(|bar| bar.println(format!("Failed: {e}")));
        }
    }

    fn on_complete(&self, report: &ExecutionReport) {
        if let Some(bar) = self.replace(None) {
            bar.finish_and_clear();
        }
        log::debug!(
            "Execution finished: {} deleted, {} freed",
            report.deleted_count(),
            ByteSize::b(report.freed_bytes())
        );
    }
}

fn batch_message(progress: &IndexProgress) -> String {
    let eta = progress
        .eta_seconds
        .map_or_else(|| "ETA: --".to_string(), |s| format!("ETA: {}", format_eta(s)));
    format!(
        "{} duplicates, {:.0} files/s, {}",
        progress.duplicates, progress.files_per_second, eta
    )
}

/// `1h02m`, `3m05s` or `42s`.
fn format_eta(seconds: u64) -> String {
    let (h, m, s) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    if h > 0 {
        format!("{h}h{m:02}m")
    } else if m > 0 {
        format!("{m}m{s:02}s")
    } else {
        format!("{s}s")
    }
}

/// Shorten a path to its file name when it exceeds `max_len`.
fn truncate_path(path: &str, max_len: usize) -> String {
    if path.chars().count() <= max_len {
        return path.to_string();
    }
    let file_name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let count = file_name.chars().count();
    if count + 4 > max_len {
        let tail: String = file_name.chars().skip(count + 3 - max_len).collect();
        return format!("...{tail}");
    }
    format!(".../{file_name}")
}
