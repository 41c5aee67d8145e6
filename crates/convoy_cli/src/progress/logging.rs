use convoy::MigrateProgress;

/// Logging reporter using tracing for structured output.
pub(crate) struct LoggingReporter;

impl LoggingReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, event: MigrateProgress) {
        match event {
            MigrateProgress::WarmingUp => {
                tracing::info!("Warming up provider connections");
            }

            MigrateProgress::WarmupFailed { error } => {
                tracing::warn!(error = %error, "Warm-up failed; workers will connect lazily");
            }

            MigrateProgress::PlanReady { batches, repos } => {
                tracing::info!(batches, repos, "Batch plan ready");
            }

            MigrateProgress::BatchStarted { index, size } => {
                tracing::info!(batch = index + 1, size, "Batch started");
            }

            MigrateProgress::BatchComplete { index } => {
                tracing::debug!(batch = index + 1, "Batch complete");
            }

            MigrateProgress::RepoStarted { key } => {
                tracing::debug!(repo = %key, "Migration started");
            }

            MigrateProgress::CloneStarted { key, size_kb } => {
                tracing::info!(source = %key.source, size_kb = ?size_kb, "Cloning");
            }

            MigrateProgress::CloneComplete {
                key,
                branches,
                tags,
            } => {
                tracing::info!(source = %key.source, branches, tags, "Clone complete");
            }

            MigrateProgress::PushStarted { key, component } => {
                tracing::debug!(target = %key.target, component = %component, "Pushing");
            }

            MigrateProgress::PushComplete { key, component } => {
                tracing::debug!(target = %key.target, component = %component, "Push complete");
            }

            MigrateProgress::Verifying { key } => {
                tracing::debug!(target = %key.target, "Verifying target");
            }

            MigrateProgress::RepoCompleted { key } => {
                tracing::info!(repo = %key, "Migrated");
            }

            MigrateProgress::RepoFailed { key, error } => {
                tracing::warn!(repo = %key, error = %error, "Migration failed");
            }

            MigrateProgress::RetryBackoff {
                key,
                step,
                retry_after_ms,
                attempt,
            } => {
                tracing::warn!(
                    repo = %key,
                    step = %step,
                    retry_after_ms,
                    attempt,
                    "Transient failure, backing off"
                );
            }

            MigrateProgress::Warning { message } => {
                tracing::warn!(message = %message, "Warning");
            }

            MigrateProgress::JobComplete { completed, failed } => {
                tracing::info!(completed, failed, "Bulk migration complete");
            }

            _ => {}
        }
    }
}

impl Default for LoggingReporter {
    fn default() -> Self {
        Self::new()
    }
}
