use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use crate::error::ClientResult;

/// Fixed key the credential is stored under
pub const CREDENTIAL_KEY: &str = "openai_api_key";

/// Persistent string key-value surface
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> ClientResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> ClientResult<()>;
}

/// JSON object on disk, one entry per key. Values are stored in cleartext.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> ClientResult<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&content)?)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> ClientResult<Option<String>> {
        Ok(self.read_entries()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> ClientResult<()> {
        let mut entries = self.read_entries()?;
        entries.insert(key.to_string(), value.to_string());

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&entries)?)?;
        debug!("Wrote {} to {}", key, self.path.display());
        Ok(())
    }
}

/// In-process store, lost when dropped
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> ClientResult<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> ClientResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Reads and writes the optional API credential under [`CREDENTIAL_KEY`]
#[derive(Debug)]
pub struct CredentialStore<S> {
    store: S,
}

impl<S: KeyValueStore> CredentialStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Missing or blank entries load as `None`.
    pub fn load(&self) -> ClientResult<Option<String>> {
        let value = self.store.get(CREDENTIAL_KEY)?;
        Ok(value.filter(|v| !v.trim().is_empty()))
    }

    /// Persist `value`. Blank values are ignored and never replace a stored
    /// credential. Returns whether anything was written.
    pub fn save(&self, value: &str) -> ClientResult<bool> {
        let value = value.trim();
        if value.is_empty() {
            debug!("Ignoring blank credential");
            return Ok(false);
        }
        self.store.set(CREDENTIAL_KEY, value)?;
        Ok(true)
    }

    pub fn inner(&self) -> &S {
        &self.store
    }
}

/// Credential with everything but the last four characters hidden
pub fn mask(credential: &str) -> String {
    let chars: Vec<char> = credential.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), tail)
}
