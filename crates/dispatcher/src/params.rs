//! ParamStore - file-backed key/value store for state that survives restarts
//!
//! One file per key under a root directory. Writes go to a temp file that
//! is renamed over the target, so readers see either the old or the new
//! value.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use metrics::counter;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument};

use crate::error::DispatcherError;

/// File-backed parameter store
#[derive(Debug, Clone)]
pub struct ParamStore {
    root: PathBuf,
}

impl ParamStore {
    /// Open (and create) a store rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, DispatcherError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_path(&self, key: &str) -> Result<PathBuf, DispatcherError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(DispatcherError::param(key, "invalid key"));
        }
        Ok(self.root.join(key))
    }

    /// Read a value; `None` if the key was never written
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DispatcherError> {
        let path = self.key_path(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DispatcherError::param(key, e.to_string())),
        }
    }

    /// Write a value atomically
    #[instrument(name = "param_store_put", skip(self, value), fields(bytes = value.len()))]
    pub fn put(&self, key: &str, value: &[u8]) -> Result<(), DispatcherError> {
        let path = self.key_path(key)?;
        let tmp_path = self.root.join(format!(".{key}.tmp"));

        let write = || -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(value)?;
            file.sync_all()?;
            fs::rename(&tmp_path, &path)
        };
        write().map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            DispatcherError::param(key, e.to_string())
        })?;

        debug!(key, path = %path.display(), "param written");
        Ok(())
    }

    /// Serialize `value` as JSON and write it
    pub fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), DispatcherError> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| DispatcherError::param(key, e.to_string()))?;
        self.put(key, &bytes)
    }

    /// Write on the blocking pool; failures are logged, never returned
    pub fn put_nonblocking(&self, key: impl Into<String>, value: Vec<u8>) -> JoinHandle<()> {
        let store = self.clone();
        let key = key.into();
        tokio::task::spawn_blocking(move || match store.put(&key, &value) {
            Ok(()) => counter!("lagd_param_writes_total", "result" => "ok").increment(1),
            Err(e) => {
                counter!("lagd_param_writes_total", "result" => "error").increment(1);
                error!(key = %key, error = %e, "param write failed");
            }
        })
    }

    /// Delete a value; removing a missing key is not an error
    pub fn remove(&self, key: &str) -> Result<(), DispatcherError> {
        let path = self.key_path(key)?;
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DispatcherError::param(key, e.to_string())),
        }
    }
}
