use std::{path::PathBuf, sync::Arc};

use serde::Deserialize;

use crate::{
    backends::{DirectoryDispatcher, MemoryDispatcher},
    dispatcher::Dispatcher,
    error::DispatchError,
};

/// Selects the dispatcher backend.
///
/// Directory queue in RON config:
/// ```ron
/// dispatcher: Some((
///     type: "Directory",
///     path: "/var/spool/catchment/jobs",
/// )),
/// ```
///
/// In-process queue, optionally bounded:
/// ```ron
/// dispatcher: Some((type: "Memory", capacity: Some(1000))),
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum DispatcherConfig {
    Directory { path: PathBuf },
    Memory {
        #[serde(default)]
        capacity: Option<usize>,
    },
}

impl DispatcherConfig {
    /// Build and initialise the configured dispatcher.
    ///
    /// # Errors
    ///
    /// If a directory queue cannot be created.
    pub async fn into_dispatcher(self) -> Result<Arc<dyn Dispatcher>, DispatchError> {
        Ok(match self {
            Self::Directory { path } => {
                let dispatcher = DirectoryDispatcher::new(path);
                dispatcher.init().await?;
                Arc::new(dispatcher)
            }
            Self::Memory { capacity: None } => Arc::new(MemoryDispatcher::new()),
            Self::Memory {
                capacity: Some(capacity),
            } => Arc::new(MemoryDispatcher::with_capacity(capacity)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_directory() {
        let config: DispatcherConfig =
            ron::from_str(r#"(type: "Directory", path: "/tmp/jobs")"#).unwrap();
        assert_eq!(
            config,
            DispatcherConfig::Directory {
                path: PathBuf::from("/tmp/jobs")
            }
        );
    }

    #[test]
    fn parse_memory() {
        let config: DispatcherConfig = ron::from_str(r#"(type: "Memory")"#).unwrap();
        assert_eq!(config, DispatcherConfig::Memory { capacity: None });
    }

    #[tokio::test]
    async fn directory_dispatcher_is_initialised() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs");

        DispatcherConfig::Directory { path: path.clone() }
            .into_dispatcher()
            .await
            .unwrap();

        assert!(path.is_dir());
    }
}
