use cns_core::{Error, Result};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{error, warn};

/// A fully written and synced temp file waiting to be renamed over its
/// target. Dropping it without committing discards the temp file.
#[derive(Debug)]
pub struct StagedFile {
    target: PathBuf,
    tmp: NamedTempFile,
    previous: Option<Vec<u8>>,
}

/// Content a committed target had before, so it can be put back.
struct Restore {
    target: PathBuf,
    previous: Option<Vec<u8>>,
}

impl Restore {
    fn apply(self) -> Result<()> {
        match self.previous {
            Some(bytes) => write_atomic(&self.target, |w| {
                w.write_all(&bytes).map_err(|e| Error::storage(&self.target, e))
            }),
            None => match fs::remove_file(&self.target) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(Error::storage(&self.target, e)),
            },
        }
    }
}

/// Fills a temp file next to `path` without touching `path` itself. The
/// current content of `path` is kept for rollback.
pub fn stage<F>(path: &Path, write: F) -> Result<StagedFile>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| Error::storage(dir, e))?;

    let previous = match fs::read(path) {
        Ok(bytes) => Some(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(Error::storage(path, e)),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| Error::storage(path, e))?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        write(&mut writer)?;
        writer.flush().map_err(|e| Error::storage(path, e))?;
    }
    tmp.as_file().sync_all().map_err(|e| Error::storage(path, e))?;

    Ok(StagedFile { target: path.to_path_buf(), tmp, previous })
}

impl StagedFile {
    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn commit(self) -> Result<()> {
        self.commit_with_restore().map(|_| ())
    }

    fn commit_with_restore(self) -> Result<Restore> {
        let StagedFile { target, tmp, previous } = self;
        match tmp.persist(&target) {
            Ok(_) => Ok(Restore { target, previous }),
            Err(e) => Err(Error::storage(&target, e.error)),
        }
    }
}

/// Renames staged files over their targets in order. When a rename fails,
/// the targets already replaced get their previous content back and the
/// rest are discarded, so the set lands on disk whole or not at all.
pub fn commit_all(staged: Vec<StagedFile>) -> Result<()> {
    let mut committed: Vec<Restore> = Vec::with_capacity(staged.len());
    for file in staged {
        match file.commit_with_restore() {
            Ok(restore) => committed.push(restore),
            Err(error) => {
                for restore in committed.into_iter().rev() {
                    let target = restore.target.clone();
                    if let Err(e) = restore.apply() {
                        error!("❌ Could not restore {} after a failed write: {}", target.display(), e);
                    } else {
                        warn!("↩️ Restored {} after a failed write", target.display());
                    }
                }
                return Err(error);
            }
        }
    }
    Ok(())
}

/// Writes `path` by filling a temp file in the same directory and renaming
/// it over the target. Readers see either the old file or the new one.
/// When `write` fails the temp file is discarded and the target untouched.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    stage(path, write)?.commit()
}

/// Reads a file that may not exist yet.
pub fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::storage(path, e)),
    }
}
