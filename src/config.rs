//! Merchant credentials and engine settings.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use thiserror::Error;

use crate::model::ShopDomain;

const DEFAULT_MAX_PROVIDER_ATTEMPTS: u32 = 5;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Load(#[from] ConfigError),

    #[error("merchant {0} is configured more than once")]
    DuplicateMerchant(ShopDomain),
}

/// Provider credentials of one merchant.
#[derive(Clone, Deserialize)]
pub struct MerchantConfig {
    pub shop: ShopDomain,
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
}

impl MerchantConfig {
    pub fn new(
        shop: impl Into<ShopDomain>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            shop: shop.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    /// Absolute provider URL for `path` (which starts with `/`).
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }
}

impl fmt::Debug for MerchantConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MerchantConfig")
            .field("shop", &self.shop)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// Read-only lookup of merchant credentials by shop.
#[derive(Debug, Clone, Default)]
pub struct MerchantDirectory {
    merchants: HashMap<ShopDomain, MerchantConfig>,
}

impl MerchantDirectory {
    pub fn new(merchants: impl IntoIterator<Item = MerchantConfig>) -> Result<Self, SettingsError> {
        let mut directory = HashMap::new();
        for merchant in merchants {
            if directory.contains_key(&merchant.shop) {
                return Err(SettingsError::DuplicateMerchant(merchant.shop));
            }
            directory.insert(merchant.shop.clone(), merchant);
        }
        Ok(Self {
            merchants: directory,
        })
    }

    pub fn get(&self, shop: &str) -> Option<&MerchantConfig> {
        self.merchants.get(shop)
    }

    pub fn len(&self) -> usize {
        self.merchants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.merchants.is_empty()
    }
}

/// Tunables of the reconciliation engine.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Provider failures tolerated per transaction before deliveries are ignored.
    pub max_provider_attempts: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_provider_attempts: DEFAULT_MAX_PROVIDER_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineSettings,
    pub merchants: Vec<MerchantConfig>,
}

impl Settings {
    /// Load from an optional file, overridden by `GUPER__*` environment variables.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix("GUPER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    pub fn directory(&self) -> Result<MerchantDirectory, SettingsError> {
        MerchantDirectory::new(self.merchants.iter().cloned())
    }
}
