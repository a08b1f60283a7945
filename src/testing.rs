//! Testing utilities for harnesses that check histories
//!
//! Failed checks are most useful when their counterexample is kept on disk.
//! These helpers pick non-colliding file names, write the visualization, and
//! remove earlier runs' files.

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::checker::ModelInfo;
use crate::model::Model;
use crate::visualize::{visualize, VisualizeError};

/// Highest numeric suffix tried by [`next_available_path`]
pub const MAX_SUFFIX: u32 = 999;

/// Find the first unused `<prefix>.<NNN>.<ext>` in `dir`
///
/// Suffixes run from `000` to `999`; the lowest one with no existing file wins.
pub fn next_available_path(dir: &Path, prefix: &str, ext: &str) -> io::Result<PathBuf> {
    for suffix in 0..=MAX_SUFFIX {
        let path = dir.join(format!("{}.{:03}.{}", prefix, suffix, ext));
        if !path.try_exists()? {
            return Ok(path);
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!(
            "all {} file names for prefix {:?} in {} are taken",
            MAX_SUFFIX + 1,
            prefix,
            dir.display()
        ),
    ))
}

/// Visualize an illegal check into a fresh HTML file and return its path
pub fn write_counterexample<M: Model>(
    model: &M,
    info: &ModelInfo<M>,
    dir: &Path,
    prefix: &str,
) -> Result<PathBuf, VisualizeError> {
    fs::create_dir_all(dir)?;
    let path = next_available_path(dir, prefix, "html")?;
    let file = File::create(&path)?;
    if let Err(e) = visualize(model, info, BufWriter::new(file)) {
        // Don't leave a truncated document behind
        let _ = fs::remove_file(&path);
        return Err(e);
    }
    info!(path = %path.display(), "wrote counterexample");
    Ok(path)
}

/// Remove regular files in `dir` whose name starts with `prefix`
///
/// Returns the number of files removed. A missing directory counts as empty.
pub fn cleanup(dir: &Path, prefix: &str) -> io::Result<usize> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if entry.file_name().to_string_lossy().starts_with(prefix) {
            fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    debug!(dir = %dir.display(), prefix, removed, "cleaned up files");
    Ok(removed)
}
