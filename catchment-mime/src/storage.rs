use std::{
    fs, io,
    io::Write,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use base64::prelude::*;
use catchment_common::config::{AttachmentConfig, StorageMode};
use tracing::{debug, warn};

use crate::{error::ParseError, message::AttachmentPayload};

/// Every spooled attachment file name starts with this.
pub const SPOOL_PREFIX: &str = "smtp-att-";

/// Longest client file name kept in a spool name, in bytes. The prefix, id and
/// random part take at most 25 more, staying under the 255 byte `NAME_MAX`.
const MAX_FILENAME_BYTES: usize = 200;

/// Extensions longer than this are not preserved when a name is shortened.
const MAX_EXTENSION_BYTES: usize = 16;

/// Where decoded attachment content is kept. One setting for the whole server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AttachmentStorage {
    #[default]
    Memory,
    Spooled {
        dir: PathBuf,
    },
}

impl From<&AttachmentConfig> for AttachmentStorage {
    fn from(config: &AttachmentConfig) -> Self {
        match config.mode {
            StorageMode::Memory => Self::Memory,
            StorageMode::Spooled => Self::Spooled {
                dir: config.spool_dir.clone(),
            },
        }
    }
}

impl AttachmentStorage {
    pub(crate) fn store(
        &self,
        connection_id: &str,
        filename: &str,
        content: &[u8],
    ) -> Result<AttachmentPayload, ParseError> {
        match self {
            Self::Memory => Ok(AttachmentPayload::Inline(BASE64_STANDARD.encode(content))),
            Self::Spooled { dir } => spool(dir, connection_id, filename, content)
                .map(AttachmentPayload::Spooled)
                .map_err(|source| ParseError::Storage {
                    filename: filename.to_string(),
                    dir: dir.clone(),
                    source,
                }),
        }
    }
}

fn spool(dir: &Path, connection_id: &str, filename: &str, content: &[u8]) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;

    let short_id = connection_id.get(..8).unwrap_or(connection_id);
    let prefix = format!("{SPOOL_PREFIX}{short_id}-");
    let suffix = format!("-{}", sanitise(filename));

    let mut file = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(&suffix)
        .tempfile_in(dir)?;
    file.write_all(content)?;
    file.flush()?;

    let (_, path) = file.keep().map_err(|err| err.error)?;
    debug!(path = %path.display(), size = content.len(), "Spooled attachment");

    Ok(path)
}

/// Keep a client supplied file name inside the spool directory.
///
/// Long names are cut on a character boundary, keeping a short extension.
fn sanitise(filename: &str) -> String {
    let cleaned: String = filename
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if cleaned.len() <= MAX_FILENAME_BYTES {
        return cleaned;
    }

    let extension = cleaned
        .rfind('.')
        .map(|dot| &cleaned[dot..])
        .filter(|extension| extension.len() <= MAX_EXTENSION_BYTES)
        .unwrap_or_default();
    let stem = &cleaned[..cleaned.len() - extension.len()];

    let mut end = MAX_FILENAME_BYTES - extension.len();
    while !stem.is_char_boundary(end) {
        end -= 1;
    }

    format!("{}{extension}", &stem[..end])
}

/// Remove the spooled files of a message that was not queued.
///
/// Failures are logged and otherwise ignored; [`sweep`] picks up anything left.
pub fn discard<P: AsRef<Path>>(paths: &[P]) {
    for path in paths {
        let path = path.as_ref();
        match fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "Discarded spooled attachment"),
            Err(err) => warn!(
                path = %path.display(),
                error = %err,
                "Failed to discard spooled attachment"
            ),
        }
    }
}

/// Remove spooled attachments older than `max_age`. Returns how many were removed.
///
/// Files that do not carry [`SPOOL_PREFIX`] are never touched.
///
/// # Errors
///
/// Fails only if the directory itself cannot be listed. A missing directory
/// counts as empty.
pub fn sweep(dir: &Path, max_age: Duration) -> io::Result<usize> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err),
    };

    let now = SystemTime::now();
    let mut removed = 0;

    for entry in entries.flatten() {
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(SPOOL_PREFIX) {
            continue;
        }

        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }

        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();

        if age >= max_age {
            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(err) => warn!(
                    path = %entry.path().display(),
                    error = %err,
                    "Failed to remove spooled attachment"
                ),
            }
        }
    }

    Ok(removed)
}
