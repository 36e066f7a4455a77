use crate::paths::absolutize;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MoveOutcome {
    Moved,
    /// Source and destination resolve to the same path.
    NoOp,
    /// Something already occupies the destination; nothing was moved.
    Collision,
}

#[derive(Debug, Error)]
#[error("cannot move {} to {}: {source}", from.display(), to.display())]
pub struct MoveError {
    pub from: PathBuf,
    pub to: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Moves `source` to `destination`, both resolved against `working_dir`.
///
/// Never overwrites: an occupied destination is reported as a collision and left alone, so
/// repeating a move that already happened is harmless. Missing parent directories are created
/// first; if that fails the rename is still attempted and reports the real error.
pub fn move_path(
    source: &Path,
    destination: &Path,
    working_dir: &Path,
) -> Result<MoveOutcome, MoveError> {
    let from = absolutize(source, working_dir);
    let to = absolutize(destination, working_dir);

    if from == to {
        debug!("skipping {} == {}", from.display(), to.display());
        return Ok(MoveOutcome::NoOp);
    }

    if let Some(parent) = to.parent() {
        if let Err(err) = fs::create_dir_all(parent) {
            warn!("could not make containing path {}: {err}", parent.display());
        }
    }

    if destination_occupied(&to) {
        warn!("cannot rename {} -> {}: destination exists", from.display(), to.display());
        return Ok(MoveOutcome::Collision);
    }

    debug!("moving {} -> {}", from.display(), to.display());
    fs::rename(&from, &to).map_err(|source| MoveError { from, to, source })?;
    Ok(MoveOutcome::Moved)
}

/// Any entry counts, dangling symlinks included. If the lookup itself fails the path is left to
/// the rename, which then reports why it cannot be reached.
fn destination_occupied(path: &Path) -> bool {
    match fs::symlink_metadata(path) {
        Ok(_) => true,
        Err(err) => {
            if err.kind() != io::ErrorKind::NotFound {
                debug!("cannot inspect {}: {err}", path.display());
            }
            false
        }
    }
}
