use serde::Serialize;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

/// A translation that could not be moved to its destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementFailure {
    pub archive_path: String,
    pub local_path: PathBuf,
    pub message: String,
}

/// Moves `from` to `to`, creating parent directories.
///
/// A failed move is retried exactly once after deleting the destination.
/// The second error is returned to the caller, which treats it as a
/// per-file warning.
pub fn move_into_place(from: &Path, to: &Path) -> io::Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }

    let first = match move_file(from, to) {
        Ok(()) => return Ok(()),
        Err(err) => err,
    };
    log::debug!(
        "moving {} to {} failed ({first}), retrying after removing the destination",
        from.display(),
        to.display()
    );

    if let Err(err) = fs::remove_file(to) {
        if err.kind() != ErrorKind::NotFound {
            return Err(err);
        }
    }
    move_file(from, to)
}

/// Rename, falling back to copy-and-delete (e.g. across filesystems).
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            if !from.is_file() {
                return Err(rename_err);
            }
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn moves_and_creates_parents() {
        let dir = tempdir().unwrap();
        let from = dir.path().join("extracted.json");
        fs::write(&from, "fr").unwrap();
        let to = dir.path().join("project/translations/fr/strings.json");

        move_into_place(&from, &to).unwrap();

        assert!(!from.exists());
        assert_eq!(fs::read_to_string(&to).unwrap(), "fr");
    }

    #[test]
    fn replaces_existing_destination() {
        let dir = tempdir().unwrap();
        let from = dir.path().join("new.json");
        let to = dir.path().join("old.json");
        fs::write(&from, "new").unwrap();
        fs::write(&to, "old").unwrap();

        move_into_place(&from, &to).unwrap();
        assert_eq!(fs::read_to_string(&to).unwrap(), "new");
        assert!(!from.exists());
    }

    #[test]
    fn reports_destination_that_cannot_be_replaced() {
        let dir = tempdir().unwrap();
        let from = dir.path().join("new.json");
        fs::write(&from, "new").unwrap();
        let to = dir.path().join("occupied");
        fs::create_dir_all(to.join("child")).unwrap();

        assert!(move_into_place(&from, &to).is_err());
        assert!(from.exists());
    }
}
