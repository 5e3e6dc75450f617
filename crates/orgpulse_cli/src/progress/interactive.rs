use std::sync::Mutex;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use orgpulse::DataSource;
use orgpulse::sync::{SyncPhase, SyncProgress};

/// Bars for the run in flight, under a single lock.
#[derive(Default)]
struct ProgressState {
    /// Spinner shown while the repository list is resolved.
    repos_spinner: Option<ProgressBar>,
    /// One tick per repository, synced or failed.
    repos_bar: Option<ProgressBar>,
    failed: usize,
}

/// Interactive progress reporter using indicatif.
pub struct InteractiveReporter {
    multi: MultiProgress,
    state: Mutex<ProgressState>,
}

impl InteractiveReporter {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            state: Mutex::new(ProgressState::default()),
        }
    }

    pub fn handle(&self, event: SyncProgress) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        match event {
            SyncProgress::PhaseChanged { org, phase } => match phase {
                SyncPhase::FetchingRepos => {
                    let pb = self.multi.add(ProgressBar::new_spinner());
                    pb.set_style(Self::spinner_style());
                    pb.set_prefix(format!("{:12}", org));
                    pb.set_message("Listing repositories...");
                    pb.enable_steady_tick(Duration::from_millis(100));
                    state.repos_spinner = Some(pb);
                }
                SyncPhase::Aggregating => {
                    if let Some(ref pb) = state.repos_bar {
                        pb.set_message("Aggregating statistics...");
                    }
                }
                _ => {}
            },

            SyncProgress::ReposResolved { total, source, .. } => {
                if let Some(pb) = state.repos_spinner.take() {
                    let origin = match source {
                        DataSource::Cache => " (cached)",
                        DataSource::Upstream => "",
                    };
                    pb.finish_with_message(format!("✓ {} repositories{}", total, origin));
                }

                let pb = self.multi.add(ProgressBar::new(total as u64));
                pb.set_style(Self::bar_style());
                pb.set_prefix(format!("{:12}", "Commits"));
                state.repos_bar = Some(pb);
                state.failed = 0;
            }

            SyncProgress::BatchStarted {
                batch, batches, ..
            } => {
                if let Some(ref pb) = state.repos_bar {
                    pb.set_message(format!("batch {}/{}", batch, batches));
                }
            }

            SyncProgress::RepositorySynced {
                repository,
                commits,
                ..
            } => {
                if let Some(ref pb) = state.repos_bar {
                    pb.inc(1);
                    pb.set_message(format!("{} ({} commits)", repository, commits));
                }
            }

            SyncProgress::RepositoryFailed { repository, error } => {
                state.failed += 1;
                if let Some(ref pb) = state.repos_bar {
                    pb.inc(1);
                }
                drop(state);
                self.multi
                    .println(format!("✗ {}: {}", repository, error))
                    .ok();
            }

            SyncProgress::Warning { message } => {
                drop(state);
                self.multi.println(format!("⚠ {}", message)).ok();
            }

            SyncProgress::SyncComplete {
                repositories,
                commits,
                ..
            } => {
                if let Some(ref pb) = state.repos_bar {
                    let msg = if state.failed > 0 {
                        format!(
                            "✓ {} commits from {} repos, {} failed",
                            commits, repositories, state.failed
                        )
                    } else {
                        format!("✓ {} commits from {} repos", commits, repositories)
                    };
                    pb.finish_with_message(msg);
                }
            }

            SyncProgress::SyncFailed { error, .. } => {
                if let Some(pb) = state.repos_spinner.take() {
                    pb.abandon_with_message(format!("✗ {}", error));
                }
                if let Some(ref pb) = state.repos_bar {
                    pb.abandon_with_message(format!("✗ {}", error));
                }
            }

            _ => {}
        }
    }

    pub fn finish(&self) {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(ref pb) = state.repos_spinner
            && !pb.is_finished()
        {
            pb.finish();
        }
        if let Some(ref pb) = state.repos_bar
            && !pb.is_finished()
        {
            pb.finish();
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.cyan} {spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {pos:>3}/{len:3} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░")
    }
}

impl Default for InteractiveReporter {
    fn default() -> Self {
        Self::new()
    }
}
