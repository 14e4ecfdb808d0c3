use std::path::{Path, PathBuf};

use async_trait::async_trait;
use catchment_common::internal;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::{dispatcher::Dispatcher, error::DispatchError, job::EncodedJob};

/// Queue backed by a directory tree, one JSON document per job.
///
/// Jobs land in `<path>/<queue>/<job id>.json`. Each document is written to a
/// `.tmp_` file first and renamed into place, so a worker polling the
/// directory never sees a partial job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryDispatcher {
    path: PathBuf,
}

impl DirectoryDispatcher {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the root directory if needed.
    ///
    /// # Errors
    ///
    /// If the directory cannot be created or the path is not a directory.
    pub async fn init(&self) -> Result<(), DispatchError> {
        fs::create_dir_all(&self.path).await?;

        if fs::metadata(&self.path).await?.is_dir() {
            Ok(())
        } else {
            Err(DispatchError::Io(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("{} is not a directory", self.path.display()),
            )))
        }
    }

    fn queue_dir(&self, queue: &str) -> PathBuf {
        let queue: String = queue
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.path.join(queue.trim_start_matches('.'))
    }
}

#[async_trait]
impl Dispatcher for DirectoryDispatcher {
    async fn push(&self, job: EncodedJob) -> Result<(), DispatchError> {
        let dir = self.queue_dir(&job.options().queue);
        fs::create_dir_all(&dir).await?;

        let document = serde_json::to_vec_pretty(&job)?;
        let filename = format!("{}.json", job.id());
        let temp = dir.join(format!(".tmp_{filename}"));
        let target = dir.join(&filename);

        fs::write(&temp, &document).await?;
        if let Err(err) = fs::rename(&temp, &target).await {
            let _ = fs::remove_file(&temp).await;
            return Err(err.into());
        }

        internal!(
            level = DEBUG,
            "Queued job {} in {}",
            job.id(),
            dir.display()
        );

        Ok(())
    }
}
