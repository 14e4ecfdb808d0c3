//! Periodic removal of spooled attachments nobody collected.

use std::{path::PathBuf, time::Duration};

use catchment_common::{
    Signal,
    config::{AttachmentConfig, StorageMode},
    internal,
};
use tokio::sync::broadcast::{self, error::RecvError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Janitor {
    dir: PathBuf,
    max_age: Duration,
    interval: Duration,
}

impl Janitor {
    /// Only spooled storage leaves anything to clean up.
    #[must_use]
    pub fn from_config(config: &AttachmentConfig) -> Option<Self> {
        (config.mode == StorageMode::Spooled).then(|| Self {
            dir: config.spool_dir.clone(),
            max_age: config.cleanup_after(),
            interval: config.cleanup_after(),
        })
    }

    /// Run one sweep on the blocking pool. Returns how many files were removed.
    ///
    /// # Errors
    ///
    /// If the spool directory cannot be listed.
    pub async fn sweep(&self) -> std::io::Result<usize> {
        let dir = self.dir.clone();
        let max_age = self.max_age;

        tokio::task::spawn_blocking(move || catchment_mime::storage::sweep(&dir, max_age))
            .await
            .map_err(std::io::Error::other)?
    }

    /// Sweep every interval until [`Signal::Shutdown`].
    pub async fn run(self, mut shutdown: broadcast::Receiver<Signal>) {
        internal!(
            level = INFO,
            "Removing spooled attachments in {} after {}s",
            self.dir.display(),
            self.max_age.as_secs()
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => match self.sweep().await {
                    Ok(0) => {}
                    Ok(removed) => {
                        internal!(level = DEBUG, "Removed {removed} expired attachments");
                    }
                    Err(err) => internal!(
                        level = WARN,
                        "Unable to sweep {}: {err}",
                        self.dir.display()
                    ),
                },

                signal = shutdown.recv() => match signal {
                    Ok(Signal::Shutdown) | Err(RecvError::Closed) => break,
                    Ok(Signal::Finalised) | Err(RecvError::Lagged(_)) => {}
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use catchment_common::config::AttachmentConfig;
    use catchment_mime::storage::SPOOL_PREFIX;
    use pretty_assertions::assert_eq;

    use super::*;

    fn spooled(dir: &std::path::Path, cleanup_after_secs: u64) -> AttachmentConfig {
        AttachmentConfig {
            mode: StorageMode::Spooled,
            spool_dir: dir.to_path_buf(),
            cleanup_after_secs,
        }
    }

    #[test]
    fn memory_mode_needs_no_janitor() {
        assert_eq!(Janitor::from_config(&AttachmentConfig::default()), None);
    }

    #[tokio::test]
    async fn sweep_removes_only_spool_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(format!("{SPOOL_PREFIX}abc-report.pdf")), b"x").unwrap();
        std::fs::write(dir.path().join("keep.txt"), b"y").unwrap();

        let janitor = Janitor::from_config(&spooled(dir.path(), 3600)).unwrap();
        assert_eq!(janitor.sweep().await.unwrap(), 0);

        let janitor = Janitor {
            max_age: Duration::ZERO,
            ..janitor
        };
        assert_eq!(janitor.sweep().await.unwrap(), 1);
        assert!(dir.path().join("keep.txt").exists());
    }

    #[tokio::test]
    async fn run_sweeps_until_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(format!("{SPOOL_PREFIX}abc-old.bin"));
        std::fs::write(&file, b"x").unwrap();

        let janitor = Janitor {
            max_age: Duration::ZERO,
            interval: Duration::from_millis(20),
            ..Janitor::from_config(&spooled(dir.path(), 3600)).unwrap()
        };

        let (tx, rx) = broadcast::channel(1);
        let task = tokio::spawn(janitor.run(rx));

        for _ in 0..100 {
            if !file.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!file.exists());

        tx.send(Signal::Shutdown).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
