use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::warn;

pub type AuthToken = String;

/// The single persisted slot of client state: the bearer token.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Option<AuthToken>;
    fn save(&self, token: &str);
    fn clear(&self);
}

#[derive(Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<AuthToken>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<AuthToken> {
        self.token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn save(&self, token: &str) {
        *self
            .token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(token.to_string());
    }

    fn clear(&self) {
        *self
            .token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }
}

/// Keeps the token in a file so it survives restarts.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Option<AuthToken> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => {
                let token = raw.trim();
                (!token.is_empty()).then(|| token.to_string())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to read token file");
                None
            }
        }
    }

    fn save(&self, token: &str) {
        if let Some(parent) = self.path.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                warn!(path = %parent.display(), error = %err, "failed to create token directory");
            }
        }

        if let Err(err) = fs::write(&self.path, token) {
            warn!(path = %self.path.display(), error = %err, "failed to write token file");
        }
    }

    fn clear(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to remove token file")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FileTokenStore, MemoryTokenStore, TokenStore};

    #[test]
    fn memory_store_round_trip_and_clear() {
        let store = MemoryTokenStore::new();
        assert!(store.load().is_none());

        store.save("abc");
        assert_eq!(store.load().as_deref(), Some("abc"));

        store.clear();
        assert!(store.load().is_none());
    }

    #[test]
    fn file_store_survives_a_new_instance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session").join("token");

        FileTokenStore::new(&path).save("persisted-token");
        assert_eq!(
            FileTokenStore::new(&path).load().as_deref(),
            Some("persisted-token")
        );

        FileTokenStore::new(&path).clear();
        assert!(FileTokenStore::new(&path).load().is_none());
        // clearing twice is harmless
        FileTokenStore::new(&path).clear();
    }
}
