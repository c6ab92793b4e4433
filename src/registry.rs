use crate::error::{Result, StudioError};
use crate::models::{normalize_string, ProfileKind, ServiceProfile};
use crate::profile_store::ProfileStore;
use crate::utils::now_unix_ms;

pub const OFFICIAL_PROFILE_ID: &str = "official";
pub const PROXY_PROFILE_ID: &str = "proxy";
pub const CUSTOM_PROFILE_ID: &str = "custom";

const OFFICIAL_BASE_URL: &str = "https://generativelanguage.googleapis.com";

// Bundled proxy defaults, overridable at build time.
const PROXY_BASE_URL: &str = match option_env!("NANOSTUDIO_PROXY_BASE_URL") {
    Some(value) => value,
    None => "https://yqdkzwnuarth.eu-central-1.clawcloudrun.com",
};
const PROXY_API_KEY: &str = match option_env!("NANOSTUDIO_PROXY_API_KEY") {
    Some(value) => value,
    None => "sk-chocokitty",
};

pub fn official_profile() -> ServiceProfile {
    ServiceProfile {
        id: OFFICIAL_PROFILE_ID.to_string(),
        name: "Google Official".to_string(),
        base_url: OFFICIAL_BASE_URL.to_string(),
        api_key: String::new(),
        kind: ProfileKind::Official,
        description: "Official Google Gemini API".to_string(),
        expires_at: None,
        duration_hours: None,
    }
}

pub fn bundled_proxy_profile() -> ServiceProfile {
    ServiceProfile {
        id: PROXY_PROFILE_ID.to_string(),
        name: "Bundled Proxy".to_string(),
        base_url: PROXY_BASE_URL.to_string(),
        api_key: PROXY_API_KEY.to_string(),
        kind: ProfileKind::Proxy,
        description: "Preconfigured relay, works out of the box".to_string(),
        expires_at: None,
        duration_hours: None,
    }
}

pub fn custom_profile_template() -> ServiceProfile {
    ServiceProfile {
        id: CUSTOM_PROFILE_ID.to_string(),
        name: "Custom".to_string(),
        base_url: String::new(),
        api_key: String::new(),
        kind: ProfileKind::Custom,
        description: "Any compatible Gemini endpoint".to_string(),
        expires_at: None,
        duration_hours: None,
    }
}

/// Outcome of a profile selection. Official with no stored key cannot be
/// activated directly; the caller must collect a key and call
/// [`ProfileRegistry::submit_credential`].
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Activated(ServiceProfile),
    NeedsCredential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomField {
    Name,
    BaseUrl,
    ApiKey,
}

/// Fixed set of built-in profiles plus the currently active one. All
/// activations write through to the [`ProfileStore`].
#[derive(Debug)]
pub struct ProfileRegistry {
    store: ProfileStore,
    custom: ServiceProfile,
}

impl ProfileRegistry {
    pub fn new(store: ProfileStore) -> Result<Self> {
        let active = store.active_profile()?;
        let custom = if active.kind == ProfileKind::Custom {
            active
        } else {
            custom_profile_template()
        };
        Ok(Self { store, custom })
    }

    /// Built-in profiles, with the custom slot reflecting the current draft.
    pub fn profiles(&self) -> Vec<ServiceProfile> {
        vec![
            official_profile(),
            bundled_proxy_profile(),
            self.custom.clone(),
        ]
    }

    pub fn active(&self) -> Result<ServiceProfile> {
        self.store.active_profile()
    }

    pub fn store(&self) -> &ProfileStore {
        &self.store
    }

    pub fn select(&mut self, id: &str) -> Result<Selection> {
        let id = id.trim();
        if id == CUSTOM_PROFILE_ID {
            let profile = self.custom.clone();
            return Ok(Selection::Activated(self.activate(profile)?));
        }

        let active = self.store.active_profile()?;
        let candidate = if active.id == id {
            active
        } else {
            match id {
                OFFICIAL_PROFILE_ID => official_profile(),
                PROXY_PROFILE_ID => bundled_proxy_profile(),
                _ => {
                    return Err(StudioError::Validation(format!(
                        "profile '{id}' is not registered"
                    )))
                }
            }
        };

        if candidate.kind == ProfileKind::Official && !candidate.has_key() {
            return Ok(Selection::NeedsCredential);
        }
        Ok(Selection::Activated(self.activate(candidate)?))
    }

    /// Activate the official profile with a freshly supplied key.
    /// `duration_hours == 0` means the key never expires.
    pub fn submit_credential(&mut self, api_key: &str, duration_hours: u32) -> Result<ServiceProfile> {
        let api_key = normalize_string(api_key)
            .ok_or_else(|| StudioError::Validation("apiKey is required".to_string()))?;

        let mut profile = official_profile();
        profile.api_key = api_key;
        if duration_hours > 0 {
            profile.expires_at = Some(now_unix_ms() + i64::from(duration_hours) * 3_600_000);
            profile.duration_hours = Some(duration_hours);
        }
        self.activate(profile)
    }

    /// Edit the custom draft in place. If custom is the active profile the
    /// change takes effect (and persists) immediately.
    pub fn update_custom(&mut self, field: CustomField, value: &str) -> Result<ServiceProfile> {
        match field {
            CustomField::Name => self.custom.name = value.trim().to_string(),
            CustomField::BaseUrl => self.custom.base_url = value.trim().to_string(),
            CustomField::ApiKey => self.custom.api_key = value.trim().to_string(),
        }

        if self.store.active_profile()?.id == CUSTOM_PROFILE_ID {
            return self.activate(self.custom.clone());
        }
        Ok(self.custom.clone())
    }

    fn activate(&mut self, profile: ServiceProfile) -> Result<ServiceProfile> {
        self.store.save_profile(&profile)?;
        Ok(profile)
    }
}
