//! User profiles and the profile store
//!
//! A profile is the durable record of a TableHop account, keyed by the uid
//! the identity service assigns. The store interface is deliberately small:
//! existence check, lookup, save. The account reconciliation logic in
//! [`crate::auth`] is the only writer on the login paths.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;
use crate::Result;
use crate::error::Error;

fn default_language() -> String {
    "en".to_string()
}

/// A TableHop user profile
///
/// `uid` is the primary key and never changes once the profile is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub uid: String,

    pub email: String,

    pub nickname: String,

    /// UI language preference
    #[serde(default = "default_language")]
    pub language: String,

    /// Restaurants the user has marked as favorites
    #[serde(default)]
    pub favorite_restaurant_ids: Vec<String>,
}

impl UserProfile {
    /// Create a fresh profile with default language and no favorites
    pub fn new(uid: &str, email: &str, nickname: &str) -> Self {
        Self {
            uid: uid.to_string(),
            email: email.to_string(),
            nickname: nickname.to_string(),
            language: default_language(),
            favorite_restaurant_ids: Vec::new(),
        }
    }
}

/// Profile store interface
///
/// Backed by a remote document store in the full application; this crate
/// ships a file-backed and an in-memory implementation.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Check whether a profile exists for the given uid
    async fn exists(&self, uid: &str) -> Result<bool>;

    /// Fetch the profile for the given uid, if any
    async fn get(&self, uid: &str) -> Result<Option<UserProfile>>;

    /// Persist the profile, overwriting any previous version
    async fn save(&self, profile: &UserProfile) -> Result<()>;
}

/// File-based profile store, one JSON document per uid
pub struct FileProfileStore {
    dir: PathBuf,
}

impl FileProfileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn profile_path(&self, uid: &str) -> PathBuf {
        self.dir.join(format!("{}.json", uid))
    }
}

#[async_trait]
impl ProfileStore for FileProfileStore {
    async fn exists(&self, uid: &str) -> Result<bool> {
        Ok(self.profile_path(uid).exists())
    }

    async fn get(&self, uid: &str) -> Result<Option<UserProfile>> {
        let path = self.profile_path(uid);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::Profile(format!("Failed to read profile {:?}: {}", path, e)))?;
        let profile: UserProfile = serde_json::from_str(&content)
            .map_err(|e| Error::Profile(format!("Malformed profile {:?}: {}", path, e)))?;
        Ok(Some(profile))
    }

    async fn save(&self, profile: &UserProfile) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| Error::Profile(format!("Failed to create profile dir: {}", e)))?;

        let path = self.profile_path(&profile.uid);
        let content = serde_json::to_string_pretty(profile)
            .map_err(|e| Error::Profile(format!("Failed to encode profile: {}", e)))?;
        std::fs::write(&path, content)
            .map_err(|e| Error::Profile(format!("Failed to write profile {:?}: {}", path, e)))?;

        Ok(())
    }
}

/// In-memory profile store, used in tests and as an embedding default
#[derive(Default)]
pub struct MemoryProfileStore {
    records: Mutex<HashMap<String, UserProfile>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn exists(&self, uid: &str) -> Result<bool> {
        Ok(self.records.lock().await.contains_key(uid))
    }

    async fn get(&self, uid: &str) -> Result<Option<UserProfile>> {
        Ok(self.records.lock().await.get(uid).cloned())
    }

    async fn save(&self, profile: &UserProfile) -> Result<()> {
        self.records
            .lock()
            .await
            .insert(profile.uid.clone(), profile.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_profile_defaults() {
        let profile = UserProfile::new("u-1", "a@example.com", "Alice");
        assert_eq!(profile.language, "en");
        assert!(profile.favorite_restaurant_ids.is_empty());
    }

    #[test]
    fn test_profile_deserialization_defaults() {
        let profile: UserProfile = serde_json::from_str(
            r#"{"uid":"u-1","email":"a@example.com","nickname":"Alice"}"#,
        )
        .unwrap();
        assert_eq!(profile.language, "en");
        assert!(profile.favorite_restaurant_ids.is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryProfileStore::new();
        let profile = UserProfile::new("u-1", "a@example.com", "Alice");

        assert!(!store.exists("u-1").await.unwrap());
        store.save(&profile).await.unwrap();
        assert!(store.exists("u-1").await.unwrap());
        assert_eq!(store.get("u-1").await.unwrap(), Some(profile));
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProfileStore::new(dir.path());
        let profile = UserProfile::new("u-2", "b@example.com", "Bob");

        assert!(!store.exists("u-2").await.unwrap());
        assert_eq!(store.get("u-2").await.unwrap(), None);

        store.save(&profile).await.unwrap();
        assert!(store.exists("u-2").await.unwrap());
        assert_eq!(store.get("u-2").await.unwrap(), Some(profile));
    }

    #[tokio::test]
    async fn test_file_store_malformed_profile_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProfileStore::new(dir.path());

        std::fs::write(dir.path().join("u-3.json"), "not json").unwrap();
        let err = store.get("u-3").await.unwrap_err();
        assert!(matches!(err, Error::Profile(_)));
    }
}
