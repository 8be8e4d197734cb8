//! Lock-scoped reads and writes of application state files.
//!
//! Writers hold a sibling `.lock` file created with `create_new` for the
//! whole write and replace the target by rename. A busy lock is reported,
//! never waited on.

use crate::error::StoreError;
use crate::state::{
    APPLICATION_STATE_KIND, APPLICATION_STATE_SCHEMA, ApplicationState, digest_specs,
};
use chrono::Utc;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub fn lock_path(path: &Path) -> PathBuf {
    sibling(path, ".lock")
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut sibling: OsString = path.as_os_str().to_os_string();
    sibling.push(suffix);
    PathBuf::from(sibling)
}

/// Read and verify a state file. A missing file reads as `None`.
pub fn read_state(path: &Path) -> Result<Option<ApplicationState>, StoreError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(StoreError::io(path, err)),
    };
    let state: ApplicationState = serde_json::from_slice(&bytes).map_err(|err| StoreError::Json {
        path: path.display().to_string(),
        message: err.to_string(),
    })?;
    verify(path, &state)?;
    Ok(Some(state))
}

fn verify(path: &Path, state: &ApplicationState) -> Result<(), StoreError> {
    let unsupported = |reason: String| StoreError::Unsupported {
        path: path.display().to_string(),
        reason,
    };
    if state.state_kind != APPLICATION_STATE_KIND {
        return Err(unsupported(format!("state kind `{}`", state.state_kind)));
    }
    if state.schema != APPLICATION_STATE_SCHEMA {
        return Err(unsupported(format!("schema {}", state.schema)));
    }
    let actual = digest_specs(&state.apps);
    if actual != state.digest {
        return Err(StoreError::DigestMismatch {
            path: path.display().to_string(),
            expected: state.digest.clone(),
            actual,
        });
    }
    Ok(())
}

/// Write `state` to `path` under the lock, via a temp file and rename.
pub fn write_state(path: &Path, state: &ApplicationState) -> Result<(), StoreError> {
    let _guard = StateLockGuard::acquire(path)?;
    let rendered = serde_json::to_vec_pretty(state).map_err(|err| StoreError::Json {
        path: path.display().to_string(),
        message: err.to_string(),
    })?;
    let temp = sibling(path, &format!(".tmp-{}", std::process::id()));
    let written = File::create(&temp)
        .and_then(|mut file| {
            file.write_all(&rendered)?;
            file.write_all(b"\n")?;
            file.sync_all()
        })
        .and_then(|()| fs::rename(&temp, path));
    if let Err(err) = written {
        let _ = fs::remove_file(&temp);
        return Err(StoreError::io(path, err));
    }
    Ok(())
}

struct StateLockGuard {
    lock_path: PathBuf,
    _file: File,
}

impl StateLockGuard {
    fn acquire(path: &Path) -> Result<Self, StoreError> {
        let lock_path = lock_path(path);
        let lock_io = |message: String| StoreError::LockIo {
            lock_path: lock_path.display().to_string(),
            message,
        };
        if let Some(parent) = lock_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| lock_io(e.to_string()))?;
        }

        match OpenOptions::new().write(true).create_new(true).open(&lock_path) {
            Ok(mut file) => {
                let _ = writeln!(
                    file,
                    "pid={}\nutc={}",
                    std::process::id(),
                    Utc::now().to_rfc3339()
                );
                Ok(Self {
                    lock_path,
                    _file: file,
                })
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(StoreError::LockBusy {
                    lock_path: lock_path.display().to_string(),
                })
            }
            Err(err) => Err(lock_io(err.to_string())),
        }
    }
}

impl Drop for StateLockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::ApplicationSpec;

    #[test]
    fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let state = read_state(&dir.path().join("absent.json")).expect("read should succeed");
        assert!(state.is_none());
    }

    #[test]
    fn write_then_read_creates_parents_and_drops_lock() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("nested/.plinth/registry.json");
        let state = ApplicationState::new(vec![ApplicationSpec::new("calc", "calc.toml")]);
        write_state(&path, &state).expect("write should succeed");
        assert!(!lock_path(&path).exists());
        let read = read_state(&path).expect("read should succeed").expect("state should exist");
        assert_eq!(read.names(), vec!["calc"]);
    }

    #[test]
    fn busy_lock_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("registry.json");
        fs::write(lock_path(&path), "pid=0").expect("lock should be written");
        let err = write_state(&path, &ApplicationState::new(Vec::new())).expect_err("lock is held");
        assert!(matches!(err, StoreError::LockBusy { .. }));
    }

    #[test]
    fn tampered_specs_fail_the_digest() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("state.json");
        let mut state = ApplicationState::new(vec![ApplicationSpec::new("calc", "calc.toml")]);
        state.apps[0].path = "other.toml".to_string();
        let bytes = serde_json::to_vec(&state).expect("state should serialize");
        fs::write(&path, bytes).expect("write should succeed");
        let err = read_state(&path).expect_err("digest should mismatch");
        assert!(matches!(err, StoreError::DigestMismatch { .. }));
    }
}
