use orgpulse::sync::SyncProgress;

/// Logging reporter using tracing for structured output.
pub struct LoggingReporter;

impl LoggingReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, event: SyncProgress) {
        match event {
            SyncProgress::PhaseChanged { org, phase } => {
                tracing::debug!(org = %org, phase = %phase, "Phase changed");
            }

            SyncProgress::ReposResolved { org, total, source } => {
                tracing::info!(org = %org, total, source = ?source, "Repositories resolved");
            }

            SyncProgress::BatchStarted {
                batch,
                batches,
                size,
            } => {
                tracing::info!(batch, batches, size, "Starting batch");
            }

            SyncProgress::RepositorySynced {
                repository,
                branches,
                commits,
            } => {
                tracing::info!(repository = %repository, branches, commits, "Repository synced");
            }

            SyncProgress::RepositoryFailed { repository, error } => {
                tracing::warn!(repository = %repository, error = %error, "Repository failed");
            }

            SyncProgress::Warning { message } => {
                tracing::warn!("{}", message);
            }

            SyncProgress::SyncComplete {
                org,
                repositories,
                failed,
                commits,
            } => {
                tracing::info!(org = %org, repositories, failed, commits, "Sync complete");
            }

            SyncProgress::SyncFailed { org, error } => {
                tracing::error!(org = %org, error = %error, "Sync failed");
            }

            other => {
                tracing::debug!(event = ?other, "Progress");
            }
        }
    }
}

impl Default for LoggingReporter {
    fn default() -> Self {
        Self::new()
    }
}
