use std::sync::Mutex;

use convoy::MigrateProgress;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Mutable display state, consolidated under one lock so event handling
/// never interleaves partial updates.
#[derive(Default)]
struct DisplayState {
    /// Overall bar, one tick per terminal repository.
    overall: Option<ProgressBar>,
}

/// Interactive progress reporter using indicatif.
///
/// One overall bar tracks terminal repositories; step-level events scroll
/// through the bar's message. Failures and warnings print above the bar so
/// they survive redraws.
pub(crate) struct InteractiveReporter {
    multi: MultiProgress,
    state: Mutex<DisplayState>,
}

impl InteractiveReporter {
    /// Create a new interactive reporter.
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            state: Mutex::new(DisplayState::default()),
        }
    }

    /// Handle a progress event.
    pub fn handle(&self, event: MigrateProgress) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        match event {
            MigrateProgress::PlanReady { batches, repos } => {
                let bar = self.multi.add(ProgressBar::new(repos as u64));
                bar.set_style(Self::bar_style());
                bar.set_prefix(format!("{:12}", "Migrating"));
                bar.set_message(format!("{repos} repos in {batches} batches"));
                state.overall = Some(bar);
            }

            MigrateProgress::WarmingUp => {
                if let Some(ref bar) = state.overall {
                    bar.set_message("warming up provider connections...");
                }
            }

            MigrateProgress::WarmupFailed { error } => {
                drop(state);
                self.multi
                    .println(format!("⚠ warm-up failed: {error}"))
                    .ok();
            }

            MigrateProgress::BatchStarted { index, size } => {
                if let Some(ref bar) = state.overall {
                    bar.set_message(format!("batch {} started ({} repos)", index + 1, size));
                }
            }

            MigrateProgress::CloneStarted { key, size_kb } => {
                if let Some(ref bar) = state.overall {
                    let size = match size_kb {
                        Some(kb) => format!(" ({kb} KB)"),
                        None => String::new(),
                    };
                    bar.set_message(format!("cloning {}{size}", key.source));
                }
            }

            MigrateProgress::PushStarted { key, component } => {
                if let Some(ref bar) = state.overall {
                    bar.set_message(format!("{} -> {}", component, key.target));
                }
            }

            MigrateProgress::Verifying { key } => {
                if let Some(ref bar) = state.overall {
                    bar.set_message(format!("verifying {}", key.target));
                }
            }

            MigrateProgress::RepoCompleted { key } => {
                if let Some(ref bar) = state.overall {
                    bar.inc(1);
                    bar.set_message(format!("✓ {}", key.source));
                }
            }

            MigrateProgress::RepoFailed { key, error } => {
                if let Some(ref bar) = state.overall {
                    bar.inc(1);
                }
                drop(state);
                self.multi.println(format!("✗ {key}: {error}")).ok();
            }

            MigrateProgress::RetryBackoff {
                key,
                step,
                retry_after_ms,
                attempt,
            } => {
                if let Some(ref bar) = state.overall {
                    bar.set_message(format!(
                        "⏳ {} {step} retry {attempt} in {:.1}s",
                        key.source,
                        retry_after_ms as f64 / 1000.0
                    ));
                }
            }

            MigrateProgress::Warning { message } => {
                // Release lock before printing to avoid holding it during I/O
                drop(state);
                self.multi.println(format!("⚠ {message}")).ok();
            }

            MigrateProgress::JobComplete { completed, failed } => {
                if let Some(ref bar) = state.overall {
                    let msg = if failed > 0 {
                        format!("✓ {completed} migrated, {failed} failed")
                    } else {
                        format!("✓ {completed} migrated")
                    };
                    bar.finish_with_message(msg);
                }
            }

            _ => {}
        }
    }

    /// Finish the overall bar if the stream ended without a JobComplete.
    pub fn finish(&self) {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(ref bar) = state.overall
            && !bar.is_finished()
        {
            bar.finish();
        }
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {pos:>3}/{len:3} {msg}")
            .expect("Invalid template")
            .progress_chars("█▓░")
    }
}

impl Default for InteractiveReporter {
    fn default() -> Self {
        Self::new()
    }
}
