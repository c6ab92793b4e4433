use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StudioError};
use crate::models::ServiceProfile;
use crate::registry::bundled_proxy_profile;
use crate::secrets::{self, EncryptedKey};

const STORE_FILE_NAME: &str = "profile.json";
const STORE_SCHEMA_VERSION: u32 = 1;
const APP_DIR_NAME: &str = "nanostudio";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileStoreFile {
    schema_version: u32,
    profile: ServiceProfile,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    credentials: Option<EncryptedKey>,
    #[serde(default)]
    transformation_order: Vec<String>,
}

#[derive(Debug)]
struct ProfileStoreState {
    profile: ServiceProfile,
    transformation_order: Vec<String>,
}

/// Durable owner of the selected profile. Every mutation writes through to
/// disk as a full replacement; the API key is encrypted at rest.
#[derive(Debug)]
pub struct ProfileStore {
    path: PathBuf,
    data_dir: PathBuf,
    state: Mutex<ProfileStoreState>,
}

impl ProfileStore {
    pub fn open_default() -> Result<Self> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| StudioError::Path("no platform data directory".to_string()))?
            .join(APP_DIR_NAME);
        Self::open(data_dir)
    }

    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;
        let path = data_dir.join(STORE_FILE_NAME);

        let state = match fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => default_state(),
            Ok(contents) => match parse_store_contents(&contents, &data_dir) {
                Ok(state) => state,
                Err(err) => {
                    log::warn!("profile store unreadable, falling back to defaults: {err}");
                    default_state()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => default_state(),
            Err(err) => return Err(err.into()),
        };

        let store = Self {
            path,
            data_dir,
            state: Mutex::new(state),
        };

        // Drop stale keys up front so a crashed clearing write is retried
        // on the next read rather than leaving the key live.
        store.active_profile()?;
        Ok(store)
    }

    /// Current profile snapshot. Expiry is re-evaluated on every read; an
    /// expired key is cleared in memory first and the cleared profile is
    /// what gets persisted.
    pub fn active_profile(&self) -> Result<ServiceProfile> {
        let mut state = self.lock_state()?;
        if state.profile.key_expired() {
            log::info!("api key for profile '{}' expired, clearing", state.profile.id);
            state.profile = state.profile.cleared();
            if let Err(err) = self.save_locked(&state) {
                log::warn!("failed to persist cleared profile: {err}");
            }
        }
        Ok(state.profile.clone())
    }

    pub fn save_profile(&self, profile: &ServiceProfile) -> Result<()> {
        let mut state = self.lock_state()?;
        state.profile = profile.clone();
        self.save_locked(&state)
    }

    /// Persisted transformation ordering merged with the caller's catalog:
    /// unknown keys are dropped, keys missing from the saved order are
    /// appended in catalog order.
    pub fn transformation_order(&self, defaults: &[String]) -> Result<Vec<String>> {
        let state = self.lock_state()?;
        if state.transformation_order.is_empty() {
            return Ok(defaults.to_vec());
        }

        let mut merged: Vec<String> = state
            .transformation_order
            .iter()
            .filter(|key| defaults.contains(key))
            .cloned()
            .collect();
        for key in defaults {
            if !merged.contains(key) {
                merged.push(key.clone());
            }
        }
        Ok(merged)
    }

    pub fn save_transformation_order(&self, keys: &[String]) -> Result<()> {
        let mut state = self.lock_state()?;
        state.transformation_order = keys.to_vec();
        self.save_locked(&state)
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, ProfileStoreState>> {
        self.state
            .lock()
            .map_err(|_| StudioError::Store("profile store mutex poisoned".to_string()))
    }

    fn save_locked(&self, state: &ProfileStoreState) -> Result<()> {
        let mut stored = state.profile.clone();
        let credentials = if stored.has_key() {
            let master = secrets::get_or_create_master_key(&self.data_dir)?;
            let encrypted = secrets::encrypt_api_key(&master, &stored.id, &stored.api_key)?;
            stored.api_key = String::new();
            Some(encrypted)
        } else {
            None
        };

        let payload = ProfileStoreFile {
            schema_version: STORE_SCHEMA_VERSION,
            profile: stored,
            credentials,
            transformation_order: state.transformation_order.clone(),
        };
        let serialized = serde_json::to_string_pretty(&payload)?;
        fs::write(&self.path, serialized)?;
        Ok(())
    }
}

fn default_state() -> ProfileStoreState {
    ProfileStoreState {
        profile: bundled_proxy_profile(),
        transformation_order: Vec::new(),
    }
}

fn parse_store_contents(contents: &str, data_dir: &std::path::Path) -> Result<ProfileStoreState> {
    let store_file = serde_json::from_str::<ProfileStoreFile>(contents)?;
    if store_file.schema_version != STORE_SCHEMA_VERSION {
        return Err(StudioError::Store(format!(
            "unsupported profile store schema version: {}",
            store_file.schema_version
        )));
    }

    let mut profile = store_file.profile;
    if let Some(encrypted) = store_file.credentials {
        match secrets::get_or_create_master_key(data_dir)
            .and_then(|master| secrets::decrypt_api_key(&master, &profile.id, &encrypted))
        {
            Ok(api_key) => profile.api_key = api_key,
            Err(err) => {
                // Degrade to the same profile without a key rather than
                // surfacing a hard failure at startup.
                log::warn!("stored api key unreadable, discarding: {err}");
                profile = profile.cleared();
            }
        }
    }

    Ok(ProfileStoreState {
        profile,
        transformation_order: store_file.transformation_order,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProfileKind;
    use crate::utils::now_unix_ms;
    use uuid::Uuid;

    fn make_temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("nanostudio-profile-store-{}", Uuid::new_v4()));
        fs::create_dir_all(&dir).expect("temp dir should be created");
        dir
    }

    fn official_with_key(api_key: &str) -> ServiceProfile {
        ServiceProfile {
            id: "official".to_string(),
            name: "Google".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            api_key: api_key.to_string(),
            kind: ProfileKind::Official,
            description: "Official Gemini API".to_string(),
            expires_at: None,
            duration_hours: None,
        }
    }

    #[test]
    fn missing_file_yields_bundled_proxy() {
        let dir = make_temp_dir();
        let store = ProfileStore::open(&dir).expect("store should open");
        let profile = store.active_profile().expect("profile should load");
        assert_eq!(profile.kind, ProfileKind::Proxy);
        assert!(profile.has_key());
        fs::remove_dir_all(dir).expect("temp dir should be removed");
    }

    #[test]
    fn corrupt_file_yields_bundled_proxy() {
        let dir = make_temp_dir();
        fs::write(dir.join(STORE_FILE_NAME), "{not json").expect("file should be written");
        let store = ProfileStore::open(&dir).expect("store should open");
        let profile = store.active_profile().expect("profile should load");
        assert_eq!(profile.kind, ProfileKind::Proxy);
        fs::remove_dir_all(dir).expect("temp dir should be removed");
    }

    #[test]
    fn profile_round_trips_with_encrypted_key() {
        let dir = make_temp_dir();
        let mut original = official_with_key("AIzaRoundTrip");
        original.expires_at = Some(now_unix_ms() + 3_600_000);
        original.duration_hours = Some(1);

        let store = ProfileStore::open(&dir).expect("store should open");
        store.save_profile(&original).expect("profile should save");

        let on_disk = fs::read_to_string(dir.join(STORE_FILE_NAME)).expect("file should exist");
        assert!(!on_disk.contains("AIzaRoundTrip"));

        drop(store);
        let reloaded = ProfileStore::open(&dir).expect("store should reopen");
        let profile = reloaded.active_profile().expect("profile should load");
        assert_eq!(profile, original);
        fs::remove_dir_all(dir).expect("temp dir should be removed");
    }

    #[test]
    fn undecryptable_key_degrades_to_same_profile_without_key() {
        let dir = make_temp_dir();
        let original = official_with_key("AIzaLost");

        {
            let store = ProfileStore::open(&dir).expect("store should open");
            store.save_profile(&original).expect("profile should save");
        }

        // A replaced master key makes the stored blob undecryptable.
        fs::remove_file(dir.join("master.key")).expect("master key should be removed");

        let reloaded = ProfileStore::open(&dir).expect("store should still open");
        let profile = reloaded.active_profile().expect("profile should load");
        assert_eq!(profile.id, original.id);
        assert_eq!(profile.base_url, original.base_url);
        assert_eq!(profile.kind, ProfileKind::Official);
        assert!(profile.api_key.is_empty());
        fs::remove_dir_all(dir).expect("temp dir should be removed");
    }

    #[test]
    fn expired_key_is_cleared_and_persisted() {
        let dir = make_temp_dir();
        let mut expired = official_with_key("AIzaStale");
        expired.expires_at = Some(now_unix_ms() - 1_000);
        expired.duration_hours = Some(1);

        {
            let store = ProfileStore::open(&dir).expect("store should open");
            // save_profile does not re-check expiry; the next read does.
            store.save_profile(&expired).expect("profile should save");
            let profile = store.active_profile().expect("profile should load");
            assert!(profile.api_key.is_empty());
            assert_eq!(profile.expires_at, None);
            assert_eq!(profile.duration_hours, None);
        }

        let reloaded = ProfileStore::open(&dir).expect("store should reopen");
        let profile = reloaded.active_profile().expect("profile should load");
        assert!(profile.api_key.is_empty());
        assert_eq!(profile.expires_at, None);

        let on_disk = fs::read_to_string(dir.join(STORE_FILE_NAME)).expect("file should exist");
        assert!(!on_disk.contains("credentials"));
        fs::remove_dir_all(dir).expect("temp dir should be removed");
    }

    #[test]
    fn transformation_order_merges_with_catalog() {
        let dir = make_temp_dir();
        let store = ProfileStore::open(&dir).expect("store should open");
        let defaults = vec!["figurine".to_string(), "plushie".to_string(), "anime".to_string()];

        store
            .save_transformation_order(&[
                "anime".to_string(),
                "figurine".to_string(),
                "removed".to_string(),
            ])
            .expect("order should save");

        let merged = store
            .transformation_order(&defaults)
            .expect("order should load");
        assert_eq!(merged, vec!["anime", "figurine", "plushie"]);
        fs::remove_dir_all(dir).expect("temp dir should be removed");
    }

    #[test]
    fn transformation_order_falls_back_to_defaults() {
        let dir = make_temp_dir();
        fs::write(dir.join(STORE_FILE_NAME), "[1, 2, 3]").expect("file should be written");
        let store = ProfileStore::open(&dir).expect("store should open");
        let defaults = vec!["figurine".to_string(), "plushie".to_string()];
        let order = store
            .transformation_order(&defaults)
            .expect("order should load");
        assert_eq!(order, defaults);
        fs::remove_dir_all(dir).expect("temp dir should be removed");
    }
}
