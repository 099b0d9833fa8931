use crate::constants;
use crate::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::debug;

/// Process-durable storage for the opaque dynamic configuration blob. At most
/// one value is kept; `save` overwrites it wholesale.
pub trait ConfigStore: Send + Sync {
    fn load(&self) -> Option<String>;
    fn save(&self, value: &str) -> Result<(), Error>;
}

/// File-backed store. Writes go to a sibling temp file first and are renamed
/// into place, so a crash mid-write never leaves a torn value observable.
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileConfigStore { path: path.into() }
    }

    /// Store under the default file name inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        FileConfigStore {
            path: dir.as_ref().join(constants::DYNAMIC_CONFIG_FILE),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .unwrap_or_default()
            .to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Option<String> {
        fs::read_to_string(&self.path).ok()
    }

    fn save(&self, value: &str) -> Result<(), Error> {
        let tmp = self.temp_path();
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "dynamic configuration saved");
        Ok(())
    }
}

/// In-memory store for tests and demos.
#[derive(Default)]
pub struct MemoryConfigStore {
    value: RwLock<Option<String>>,
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> Option<String> {
        self.value.read().expect("config lock poisoned").clone()
    }

    fn save(&self, value: &str) -> Result<(), Error> {
        *self.value.write().expect("config lock poisoned") = Some(value.to_owned());
        Ok(())
    }
}
