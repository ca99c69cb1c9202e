//! # Configuration
//!
//! `flakes.toml` holds the defaults every command starts from. Command-line
//! flags override file values.
//!
//! ```toml
//! default_provider = "Binary"
//!
//! [compression]
//! compressor = "zlib"   # deflate | zlib | lz4
//! level = "normal"      # none | fastest | fast | normal | optimal
//!
//! [write]
//! post_load = true
//!
//! [ownership]
//! policy = "outer_or_live_scope"   # or "strict_outer"
//! ```

use flakes_core::primitives::DEFAULT_PROVIDER;
use flakes_core::{
    CompressionOptions, Flakes, FlakesError, OwnershipPolicy, ProviderRegistry, ReadOptions,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File picked up from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "flakes.toml";

/// Maximum config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteSection {
    pub post_load: bool,
}

impl Default for WriteSection {
    fn default() -> Self {
        Self { post_load: true }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OwnershipSection {
    pub policy: OwnershipPolicy,
}

/// Effective configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlakesConfig {
    pub default_provider: String,
    pub compression: CompressionOptions,
    pub write: WriteSection,
    pub ownership: OwnershipSection,
    /// Where the values came from; `None` for built-in defaults.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Default for FlakesConfig {
    fn default() -> Self {
        Self {
            default_provider: DEFAULT_PROVIDER.to_string(),
            compression: CompressionOptions::default(),
            write: WriteSection::default(),
            ownership: OwnershipSection::default(),
            source: None,
        }
    }
}

impl FlakesConfig {
    /// Parse TOML text.
    pub fn from_toml(text: &str) -> Result<Self, FlakesError> {
        toml::from_str(text).map_err(|e| FlakesError::SerializationError(format!("Config: {}", e)))
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self, FlakesError> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            FlakesError::IoError(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(FlakesError::SerializationError(format!(
                "Config file size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            FlakesError::IoError(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        let mut config = Self::from_toml(&content)?;
        config.source = Some(path.to_path_buf());
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Load the explicit file if given, else `flakes.toml` in the working
    /// directory if present, else built-in defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, FlakesError> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let local = Path::new(DEFAULT_CONFIG_FILE);
                if local.is_file() {
                    Self::load(local)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Apply a `--provider` override.
    #[must_use]
    pub fn with_provider(mut self, provider: Option<&str>) -> Self {
        if let Some(provider) = provider {
            self.default_provider = provider.to_string();
        }
        self
    }

    /// Check the configured provider against a registry.
    pub fn validate(&self, registry: &ProviderRegistry) -> Result<(), FlakesError> {
        if !registry.contains(&self.default_provider) {
            return Err(FlakesError::UnknownProvider(format!(
                "{} (available: {})",
                self.default_provider,
                registry.names().join(", ")
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn read_options(&self) -> ReadOptions {
        ReadOptions {
            compression: self.compression,
            policy: self.ownership.policy,
        }
    }

    /// Build the engine facade these settings describe.
    #[must_use]
    pub fn flakes(&self, registry: ProviderRegistry) -> Flakes {
        Flakes::new(registry)
            .with_provider(&self.default_provider)
            .with_read_options(self.read_options())
            .with_post_load(self.write.post_load)
    }
}

// =============================================================================
// TESTS
// =============================================================================
