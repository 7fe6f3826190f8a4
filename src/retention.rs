//! Retention sweeper for generated audio files.
//!
//! Periodically deletes files in the managed audio directory whose
//! modification time is older than the configured lifetime. A failure on one
//! file is logged and skipped, never aborting the rest of the pass.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::audio_store::is_partial;
use crate::config::RetentionConfig;

/// Minimum age before an abandoned `.part` file is swept.
const PARTIAL_GRACE: Duration = Duration::from_secs(300);

/// Results from a single sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Regular files looked at.
    pub scanned: usize,
    pub deleted: usize,
    pub failed: usize,
}

pub struct RetentionSweeper {
    dir: PathBuf,
    interval: Duration,
    max_age: Duration,
}

impl RetentionSweeper {
    pub fn new(dir: impl Into<PathBuf>, config: &RetentionConfig) -> Self {
        Self {
            dir: dir.into(),
            interval: config.interval(),
            max_age: config.max_age(),
        }
    }

    /// Delete every expired file as of `now`.
    pub fn sweep(&self, now: SystemTime) -> SweepReport {
        self.sweep_with(now, |path| std::fs::remove_file(path))
    }

    /// Sweep using `remove` for deletions.
    fn sweep_with<F>(&self, now: SystemTime, mut remove: F) -> SweepReport
    where
        F: FnMut(&Path) -> io::Result<()>,
    {
        let mut report = SweepReport::default();

        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                error!("Failed to read audio dir {}: {e}", self.dir.display());
                return report;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Failed to read audio dir entry: {e}");
                    continue;
                }
            };
            let path = entry.path();

            // Vanished between listing and stat: nothing to do
            let Ok(meta) = entry.metadata() else { continue };
            if !meta.is_file() {
                continue;
            }
            report.scanned += 1;

            let age = match meta.modified() {
                Ok(modified) => now.duration_since(modified).unwrap_or_default(),
                Err(e) => {
                    warn!("No modification time for {}: {e}", path.display());
                    continue;
                }
            };
            // A `.part` file may still be mid-write
            let limit = if is_partial(&path) {
                self.max_age.max(PARTIAL_GRACE)
            } else {
                self.max_age
            };
            if age <= limit {
                continue;
            }

            match remove(&path) {
                Ok(()) => {
                    report.deleted += 1;
                    info!("Deleted old audio file: {}", entry.file_name().to_string_lossy());
                }
                Err(e) => {
                    report.failed += 1;
                    error!(
                        "Error deleting file {}: {e}",
                        entry.file_name().to_string_lossy()
                    );
                }
            }
        }

        report
    }

    /// Run sweeps every `interval` until `shutdown` is cancelled.
    ///
    /// The first sweep happens one interval after the call.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        info!(
            "Starting retention sweeper for {} (every {}s, max age {}s)",
            self.dir.display(),
            self.interval.as_secs(),
            self.max_age.as_secs()
        );

        tokio::spawn(async move {
            let start = Instant::now();
            let first = start.checked_add(self.interval).unwrap_or(start);
            let mut ticker = tokio::time::interval_at(first, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let sweeper = std::sync::Arc::new(self);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Retention sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        info!("Running scheduled cleanup of old audio files...");
                        let worker = sweeper.clone();
                        match tokio::task::spawn_blocking(move || worker.sweep(SystemTime::now())).await {
                            Ok(report) => debug!(
                                "Sweep complete: scanned={} deleted={} failed={}",
                                report.scanned, report.deleted, report.failed
                            ),
                            Err(e) => error!("Sweep task failed: {e}"),
                        }
                    }
                }
            }
        })
    }
}
