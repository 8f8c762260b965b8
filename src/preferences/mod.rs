//! UI preferences — theme and sidebar state in local storage.
//!
//! Values are stored as JSON strings. Unreadable values fall back to the
//! defaults (`Theme::Light`, expanded sidebar).

pub mod routes;

pub use routes::{PreferencesState, preferences_routes};

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::StoreError;
use crate::store::LocalStorage;

pub const THEME_KEY: &str = "theme-preference";
pub const SIDEBAR_KEY: &str = "cauldron-sidebar-collapsed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
    Cyberpunk,
}

impl Theme {
    /// light → dark → cyberpunk → light
    pub fn next(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Cyberpunk,
            Theme::Cyberpunk => Theme::Light,
        }
    }
}

pub struct PreferencesStore {
    storage: Arc<dyn LocalStorage>,
}

impl PreferencesStore {
    pub fn new(storage: Arc<dyn LocalStorage>) -> Self {
        Self { storage }
    }

    async fn read<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T, StoreError> {
        let Some(raw) = self.storage.get_item(key).await? else {
            return Ok(T::default());
        };
        Ok(serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(key, error = %e, "Ignoring unreadable preference");
            T::default()
        }))
    }

    async fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value).map_err(|e| StoreError::Serialize {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.storage.set_item(key, &raw).await?;
        Ok(())
    }

    pub async fn theme(&self) -> Result<Theme, StoreError> {
        self.read(THEME_KEY).await
    }

    pub async fn set_theme(&self, theme: Theme) -> Result<(), StoreError> {
        self.write(THEME_KEY, &theme).await
    }

    /// Advance to the next theme and return it.
    pub async fn toggle_theme(&self) -> Result<Theme, StoreError> {
        let next = self.theme().await?.next();
        self.set_theme(next).await?;
        Ok(next)
    }

    pub async fn sidebar_collapsed(&self) -> Result<bool, StoreError> {
        self.read(SIDEBAR_KEY).await
    }

    pub async fn set_sidebar_collapsed(&self, collapsed: bool) -> Result<(), StoreError> {
        self.write(SIDEBAR_KEY, &collapsed).await
    }

    pub async fn toggle_sidebar(&self) -> Result<bool, StoreError> {
        let collapsed = !self.sidebar_collapsed().await?;
        self.set_sidebar_collapsed(collapsed).await?;
        Ok(collapsed)
    }
}
