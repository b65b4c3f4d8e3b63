//! Persistent key-value storage for session keys.
//!
//! The session writes its credentials through a [`Storage`] before it
//! updates any in-memory state, so whatever survives a crash or restart is
//! never behind what the process believed.
//!
//! Two implementations are provided:
//! * [`MemoryStorage`] for tests and ephemeral sessions
//! * [`FileStorage`] which survives process restarts

use std::{
    collections::BTreeMap,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use crate::error::Result;

/// Key of the persisted bearer access token.
pub const ACCESS_TOKEN: &str = "access_token";

/// Key of the persisted refresh token.
pub const REFRESH_TOKEN: &str = "refresh_token";

/// Key of the last known user name.
pub const USERNAME: &str = "username";

/// Every key the session owns.
pub const SESSION_KEYS: [&str; 3] = [ACCESS_TOKEN, REFRESH_TOKEN, USERNAME];

/// String key-value store that survives reloads.
pub trait Storage: Send + Sync {
    /// Returns the value stored under `key`, if any.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the value could not be persisted.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removes `key`. Removing a key that does not exist is not an error.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the removal could not be persisted.
    fn remove(&self, key: &str) -> Result<()>;
}

impl<T: Storage + ?Sized> Storage for Arc<T> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().map_or(true, |entries| entries.is_empty())
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()?
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock()?.remove(key);
        Ok(())
    }
}

/// Storage backed by a JSON object in a file.
///
/// The whole map is kept in memory and rewritten on every change. Writes
/// go to a sibling temporary file first which is then renamed over the
/// original.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Session files only hold a few tokens.
    const MAX_FILE_SIZE: u64 = 64 * 1024;

    /// Opens the storage at `path`, loading existing entries.
    ///
    /// A missing file is an empty storage; it is created on first write.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the file exists but cannot be read, is too
    /// large or does not contain a JSON object of strings.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let entries = match fs::metadata(&path) {
            Ok(attributes) => {
                if attributes.len() > Self::MAX_FILE_SIZE {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("{} is too large", path.display()),
                    )
                    .into());
                }
                let contents = fs::read_to_string(&path)?;
                if contents.trim().is_empty() {
                    BTreeMap::new()
                } else {
                    serde_json::from_str(&contents)?
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("no session file at {}", path.display());
                BTreeMap::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let contents = serde_json::to_string_pretty(entries)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        // A leftover from an interrupted write may carry looser permissions.
        match fs::remove_file(&tmp) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }

        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            // Tokens grant access to the account: owner only.
            options.mode(0o600);
        }

        let mut file = options.open(&tmp)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock()?;
        let mut updated = entries.clone();
        updated.insert(key.to_owned(), value.to_owned());

        self.persist(&updated)?;
        *entries = updated;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock()?;
        if !entries.contains_key(key) {
            return Ok(());
        }

        let mut updated = entries.clone();
        updated.remove(key);

        self.persist(&updated)?;
        *entries = updated;
        Ok(())
    }
}
