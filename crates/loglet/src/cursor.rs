use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use journal_export::Cursor;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CursorError {
    #[error("failed to read cursor file `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write cursor file `{path}`: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cursor commit task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Durable home of the single committed cursor.
pub trait CursorStore: Send + Sync + 'static {
    /// Returns the committed cursor, or `None` when nothing was ever committed.
    fn load(&self) -> Result<Option<Cursor>, CursorError>;

    /// Replaces the committed cursor.
    fn commit(&self, cursor: &Cursor) -> Result<(), CursorError>;
}

/// Cursor kept as the sole content of a plain-text file.
///
/// Commits write a temporary file next to the target and rename it into place, so a crash
/// mid-write leaves the previous cursor intact.
#[derive(Clone, Debug)]
pub struct CursorFile {
    path: PathBuf,
}

impl CursorFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_error(&self, source: io::Error) -> CursorError {
        CursorError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

impl CursorStore for CursorFile {
    fn load(&self) -> Result<Option<Cursor>, CursorError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => {
                let raw = raw.trim_end();
                Ok((!raw.is_empty()).then(|| Cursor::new(raw)))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(CursorError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn commit(&self, cursor: &Cursor) -> Result<(), CursorError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| self.write_error(e))?;
        tmp.write_all(cursor.as_str().as_bytes())
            .map_err(|e| self.write_error(e))?;
        tmp.as_file().sync_all().map_err(|e| self.write_error(e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o644))
                .map_err(|e| self.write_error(e))?;
        }

        tmp.persist(&self.path)
            .map_err(|e| self.write_error(e.error))?;
        debug!(path = ?self.path, cursor = %cursor, "committed cursor");
        Ok(())
    }
}
