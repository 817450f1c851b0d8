//! Process-wide session store
//!
//! The session is the client's record of who is logged in. It lives in memory
//! behind a lock and is mirrored to a durable [`SessionPersistence`] backend so
//! a later process can hydrate it on start.
//!
//! Lifecycle:
//! - [`SessionStore::hydrate`] on start
//! - [`SessionStore::set`] on login
//! - [`SessionStore::clear`] on logout or forced invalidation

use crate::error::CoreResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, warn};

/// Identity fields of the logged-in user, used for display only.
///
/// Unknown fields returned by the backend (including the password hash some
/// servers echo back) are dropped during deserialization and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

/// Durable mirror of the session.
#[cfg_attr(test, mockall::automock)]
pub trait SessionPersistence: Send + Sync {
    /// Load a previously saved profile, `None` when nothing was saved.
    fn load(&self) -> CoreResult<Option<UserProfile>>;

    /// Save the profile, replacing any previous one.
    fn save(&self, profile: &UserProfile) -> CoreResult<()>;

    /// Remove the saved profile. Removing a missing profile is not an error.
    fn remove(&self) -> CoreResult<()>;
}

/// Keeps the "durable" copy in memory. Used by tests and embedders that do
/// not want anything written to disk.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    saved: Mutex<Option<UserProfile>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionPersistence for MemoryPersistence {
    fn load(&self) -> CoreResult<Option<UserProfile>> {
        Ok(self
            .saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, profile: &UserProfile) -> CoreResult<()> {
        *self.saved.lock().unwrap_or_else(PoisonError::into_inner) = Some(profile.clone());
        Ok(())
    }

    fn remove(&self) -> CoreResult<()> {
        self.saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }
}

/// JSON file persistence, typically `<data dir>/session.json`.
#[derive(Debug, Clone)]
pub struct FilePersistence {
    path: PathBuf,
}

impl FilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionPersistence for FilePersistence {
    fn load(&self) -> CoreResult<Option<UserProfile>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn save(&self, profile: &UserProfile) -> CoreResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(profile)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }

    fn remove(&self) -> CoreResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Handle to the process-wide session. Cloning shares the same session.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    current: RwLock<Option<UserProfile>>,
    persistence: Box<dyn SessionPersistence>,
}

impl SessionStore {
    /// Create an empty store backed by `persistence`. Call [`hydrate`](Self::hydrate)
    /// to pick up a previously saved session.
    pub fn new(persistence: impl SessionPersistence + 'static) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                current: RwLock::new(None),
                persistence: Box::new(persistence),
            }),
        }
    }

    /// Create a store whose durable mirror is kept in memory
    pub fn in_memory() -> Self {
        Self::new(MemoryPersistence::new())
    }

    /// Load the persisted session into memory.
    ///
    /// An unreadable or corrupt mirror is logged and treated as "no session".
    pub fn hydrate(&self) -> Option<UserProfile> {
        let loaded = match self.inner.persistence.load() {
            Ok(profile) => profile,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable persisted session");
                None
            }
        };
        if let Some(profile) = &loaded {
            debug!(user_id = %profile.id, "Hydrated persisted session");
        }
        *self
            .inner
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = loaded.clone();
        loaded
    }

    /// Record a freshly logged-in user.
    ///
    /// The in-memory session is always updated; an error means only the durable
    /// mirror could not be written.
    pub fn set(&self, profile: UserProfile) -> CoreResult<()> {
        let mut current = self
            .inner
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let saved = self.inner.persistence.save(&profile);
        *current = Some(profile);
        saved
    }

    /// Drop the session from memory and from the durable mirror.
    ///
    /// Returns `true` if a session was present. Exactly one of several
    /// concurrent callers observes `true`.
    pub fn clear(&self) -> bool {
        let mut current = self
            .inner
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let was_present = current.take().is_some();
        if let Err(e) = self.inner.persistence.remove() {
            warn!(error = %e, "Failed to remove persisted session");
        }
        was_present
    }

    /// Whether a user is currently logged in
    pub fn is_present(&self) -> bool {
        self.inner
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Snapshot of the current user, for display
    pub fn current(&self) -> Option<UserProfile> {
        self.inner
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("present", &self.is_present())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CoreError;
    use tempfile::TempDir;

    fn alice() -> UserProfile {
        UserProfile {
            id: "65f0c0ffee".to_string(),
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            phone_number: Some("5550100".to_string()),
        }
    }

    #[test]
    fn test_profile_accepts_backend_shape_and_drops_password() {
        let json = r#"{
            "_id": "65f0c0ffee",
            "name": "Alice",
            "email": "alice@example.com",
            "phoneNumber": "5550100",
            "password": "$2b$10$hash"
        }"#;
        let profile: UserProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile, alice());

        let out = serde_json::to_string(&profile).unwrap();
        assert!(!out.contains("password"));
        assert!(out.contains("\"_id\""));
    }

    #[test]
    fn test_set_and_clear_lifecycle() {
        let store = SessionStore::in_memory();
        assert!(!store.is_present());

        store.set(alice()).unwrap();
        assert!(store.is_present());
        assert_eq!(store.current(), Some(alice()));

        assert!(store.clear());
        assert!(!store.is_present());
        // Second clear is a no-op
        assert!(!store.clear());
    }

    #[test]
    fn test_hydrate_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.json");

        let first = SessionStore::new(FilePersistence::new(&path));
        first.set(alice()).unwrap();
        assert!(path.exists());

        let second = SessionStore::new(FilePersistence::new(&path));
        assert!(!second.is_present());
        assert_eq!(second.hydrate(), Some(alice()));
        assert!(second.is_present());

        assert!(second.clear());
        assert!(!path.exists());
    }

    #[test]
    fn test_hydrate_ignores_corrupt_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = SessionStore::new(FilePersistence::new(&path));
        assert_eq!(store.hydrate(), None);
        assert!(!store.is_present());
    }

    #[test]
    fn test_file_remove_missing_is_ok() {
        let temp_dir = TempDir::new().unwrap();
        let persistence = FilePersistence::new(temp_dir.path().join("absent.json"));
        assert!(persistence.remove().is_ok());
        assert!(persistence.load().unwrap().is_none());
    }

    #[test]
    fn test_clear_removes_durable_mirror_once_per_call() {
        let mut persistence = MockSessionPersistence::new();
        persistence.expect_save().times(1).returning(|_| Ok(()));
        persistence.expect_remove().times(2).returning(|| Ok(()));

        let store = SessionStore::new(persistence);
        store.set(alice()).unwrap();
        assert!(store.clear());
        assert!(!store.clear());
    }

    #[test]
    fn test_set_keeps_memory_copy_when_mirror_fails() {
        let mut persistence = MockSessionPersistence::new();
        persistence
            .expect_save()
            .returning(|_| Err(CoreError::io_error("disk full")));

        let store = SessionStore::new(persistence);
        assert!(store.set(alice()).is_err());
        assert!(store.is_present());
    }

    #[test]
    fn test_clear_survives_mirror_failure() {
        let mut persistence = MockSessionPersistence::new();
        persistence.expect_save().returning(|_| Ok(()));
        persistence
            .expect_remove()
            .returning(|| Err(CoreError::io_error("read-only filesystem")));

        let store = SessionStore::new(persistence);
        store.set(alice()).unwrap();
        assert!(store.clear());
        assert!(!store.is_present());
    }

    #[test]
    fn test_concurrent_clear_reports_presence_once() {
        let store = SessionStore::in_memory();
        store.set(alice()).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || store.clear())
            })
            .collect();
        let cleared = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|was_present| *was_present)
            .count();
        assert_eq!(cleared, 1);
    }
}
