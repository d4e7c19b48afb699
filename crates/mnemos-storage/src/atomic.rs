//! Crash-safe file replacement.
//!
//! Content is written to a temporary file in the destination directory,
//! flushed and synced, then renamed over the target. A reader therefore sees
//! either the previous file or the complete new one, never a partial write.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use mnemos_core::error::{MnemosError, Result};

/// Atomically replace `path` with whatever `fill` writes.
///
/// If `fill` fails the temporary file is removed and `path` is untouched.
pub fn write_atomic<F>(path: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    stage(path, fill)?.commit()
}

/// A fully written and synced temporary file waiting to replace its target.
///
/// Dropping it without calling [`StagedFile::commit`] discards the content
/// and leaves the target untouched.
#[derive(Debug)]
pub struct StagedFile {
    tmp: NamedTempFile,
    target: PathBuf,
}

/// Write `fill`'s output next to `path` without replacing it yet.
///
/// Staging every file of a multi-file save before committing any of them
/// keeps a failed write from touching the files already on disk.
pub fn stage<F>(path: &Path, fill: F) -> Result<StagedFile>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        fill(&mut writer)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;

    Ok(StagedFile {
        tmp,
        target: path.to_path_buf(),
    })
}

impl StagedFile {
    /// Rename the staged content over the target.
    pub fn commit(self) -> Result<()> {
        self.tmp
            .persist(&self.target)
            .map_err(|e| MnemosError::Io(e.error))?;
        debug!(path = %self.target.display(), "Atomically replaced file");
        Ok(())
    }
}

/// Fail with [`MnemosError::NotFound`] unless `path` is an existing file.
pub fn require_file(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(MnemosError::NotFound(path.to_path_buf()))
    }
}
