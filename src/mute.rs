use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use rand_core::{OsRng, RngCore};

use crate::errors::PersistError;

const BACKUP_SUFFIX: &str = ".mmbak";
const TEMP_SUFFIX: &str = ".mmtemp";

/// Durable set of muted identifiers, one per line in a plain text file.
///
/// Reads only touch the in-memory set. Writers are serialized by `writer`;
/// a change is published to the set only after the new file contents are
/// durably in place, so readers never observe a flag the disk does not hold.
#[derive(Debug)]
pub struct MuteStore {
    file: PathBuf,
    backup: PathBuf,
    entries: RwLock<HashSet<String>>,
    writer: Mutex<()>,
}

impl MuteStore {
    /// Opens the store, creating an empty file when none exists yet.
    pub fn open(file: impl AsRef<Path>) -> Result<Self, PersistError> {
        let file = absolute(file.as_ref())?;
        let mut backup = file.clone().into_os_string();
        backup.push(BACKUP_SUFFIX);

        let store = Self {
            file,
            backup: PathBuf::from(backup),
            entries: RwLock::new(HashSet::new()),
            writer: Mutex::new(()),
        };
        store.reload()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.file
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup
    }

    pub fn is_muted(&self, ident: &str) -> bool {
        self.entries.read().contains(ident)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Sets the flag for `ident`, returning whether the state changed.
    ///
    /// On a persist failure the in-memory flag keeps its previous value.
    pub fn set_muted(&self, ident: &str, muted: bool) -> Result<bool, PersistError> {
        if ident.is_empty() || ident.contains(['\n', '\r']) {
            return Err(PersistError::InvalidIdent(ident.to_string()));
        }
        if self.is_muted(ident) == muted {
            return Ok(false);
        }

        let _guard = self.writer.lock();
        // another writer may have won the race
        let mut next = self.entries.read().clone();
        if next.contains(ident) == muted {
            return Ok(false);
        }
        if muted {
            next.insert(ident.to_string());
        } else {
            next.remove(ident);
        }

        if let Err(e) = self.persist(&next) {
            tracing::error!(ident, muted, error = %e, "failed to persist mute change");
            return Err(e);
        }

        let mut entries = self.entries.write();
        if muted {
            entries.insert(ident.to_string());
        } else {
            entries.remove(ident);
        }
        tracing::info!(ident, muted, "mute state changed");
        Ok(true)
    }

    /// Replaces the in-memory set with the file contents.
    pub fn reload(&self) -> Result<(), PersistError> {
        let _guard = self.writer.lock();
        let file = match File::open(&self.file) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!(path = %self.file.display(), "creating empty mute file");
                self.persist(&HashSet::new())?;
                File::open(&self.file).map_err(|source| self.read_error(source))?
            }
            Err(source) => return Err(self.read_error(source)),
        };

        let mut loaded = HashSet::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|source| self.read_error(source))?;
            if !line.is_empty() {
                loaded.insert(line);
            }
        }
        tracing::debug!(path = %self.file.display(), count = loaded.len(), "loaded mute file");
        *self.entries.write() = loaded;
        Ok(())
    }

    fn read_error(&self, source: io::Error) -> PersistError {
        PersistError::Read {
            path: self.file.clone(),
            source,
        }
    }

    /// backup copy, then temp file + fsync + rename over the target
    fn persist(&self, entries: &HashSet<String>) -> Result<(), PersistError> {
        let dir = self
            .file
            .parent()
            .ok_or_else(|| PersistError::NoParent(self.file.clone()))?;

        if self.file.exists() {
            copy_synced(&self.file, &self.backup).map_err(|source| PersistError::Backup {
                path: self.backup.clone(),
                source,
            })?;
        }

        let tmp = self.temp_path(dir);
        let written = write_synced(&tmp, entries).map_err(|source| PersistError::Write {
            path: tmp.clone(),
            source,
        });
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        if let Err(source) = fs::rename(&tmp, &self.file) {
            let _ = fs::remove_file(&tmp);
            return Err(PersistError::Replace {
                path: self.file.clone(),
                source,
            });
        }
        sync_dir(dir).map_err(|source| PersistError::Replace {
            path: self.file.clone(),
            source,
        })
    }

    fn temp_path(&self, dir: &Path) -> PathBuf {
        let name = self
            .file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        dir.join(format!("{name}.{:016x}{TEMP_SUFFIX}", OsRng.next_u64()))
    }
}

fn absolute(path: &Path) -> Result<PathBuf, PersistError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|source| PersistError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(cwd.join(path))
}

fn write_synced(path: &Path, entries: &HashSet<String>) -> io::Result<()> {
    let mut sorted: Vec<&String> = entries.iter().collect();
    sorted.sort();

    let mut writer = BufWriter::new(File::create(path)?);
    for entry in sorted {
        writer.write_all(entry.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()
}

fn copy_synced(src: &Path, dst: &Path) -> io::Result<()> {
    fs::copy(src, dst)?;
    File::open(dst)?.sync_all()
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_created_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mute.txt");

        let store = MuteStore::open(&path).unwrap();
        assert!(path.exists());
        assert!(store.is_empty());
        assert!(!store.is_muted("anything"));
    }

    #[test]
    fn existing_lines_are_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mute.txt");
        fs::write(&path, "a@example.com\n\nchat-1\nchat-1\n").unwrap();

        let store = MuteStore::open(&path).unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.is_muted("a@example.com"));
        assert!(store.is_muted("chat-1"));
    }

    #[test]
    fn repeated_set_reports_change_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = MuteStore::open(dir.path().join("mute.txt")).unwrap();

        assert!(store.set_muted("chat-1", true).unwrap());
        assert!(store.is_muted("chat-1"));
        assert!(!store.set_muted("chat-1", true).unwrap());
        assert!(store.is_muted("chat-1"));

        assert!(store.set_muted("chat-1", false).unwrap());
        assert!(!store.set_muted("chat-1", false).unwrap());
        assert!(!store.is_muted("chat-1"));
    }

    #[test]
    fn writes_keep_backup_and_leave_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mute.txt");
        let store = MuteStore::open(&path).unwrap();

        store.set_muted("first", true).unwrap();
        store.set_muted("second", true).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");
        assert_eq!(fs::read_to_string(store.backup_path()).unwrap(), "first\n");

        let leftovers = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(TEMP_SUFFIX))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn identifiers_that_cannot_be_lines_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mute.txt");
        let store = MuteStore::open(&path).unwrap();

        for bad in ["", "a\nb", "chat\r"] {
            assert!(matches!(
                store.set_muted(bad, true),
                Err(PersistError::InvalidIdent(_))
            ));
        }
        assert!(store.is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn failed_persist_keeps_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("state");
        fs::create_dir(&sub).unwrap();
        let store = MuteStore::open(sub.join("mute.txt")).unwrap();
        store.set_muted("kept", true).unwrap();

        fs::remove_dir_all(&sub).unwrap();

        assert!(store.set_muted("new", true).is_err());
        assert!(!store.is_muted("new"));
        assert!(store.set_muted("kept", false).is_err());
        assert!(store.is_muted("kept"));
    }

    #[test]
    fn reload_replaces_memory_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mute.txt");
        let store = MuteStore::open(&path).unwrap();
        store.set_muted("old", true).unwrap();

        fs::write(&path, "new\n").unwrap();
        store.reload().unwrap();

        assert!(!store.is_muted("old"));
        assert!(store.is_muted("new"));
    }

    #[test]
    fn relative_path_is_made_absolute() {
        let store = MuteStore {
            file: absolute(Path::new("relative/mute.txt")).unwrap(),
            backup: PathBuf::new(),
            entries: RwLock::new(HashSet::new()),
            writer: Mutex::new(()),
        };
        assert!(store.path().is_absolute());
        assert!(store.path().ends_with("relative/mute.txt"));
    }
}
