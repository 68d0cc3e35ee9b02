//! Configuration loading.
//!
//! Configuration is loaded from TOML with the following resolution order:
//! 1. `--config <path>` (CLI flag; must exist)
//! 2. `~/.kiln/config.toml` (user)
//! 3. `/etc/kiln/config.toml` (system)
//! 4. built-in defaults
//!
//! Every section and field is optional.
//!
//! ```toml
//! [cache]
//! enabled = true
//! ttl_secs = 900
//! max_entries = 100
//!
//! [retry]
//! max_attempts = 3
//! max_repair_attempts = 2
//! initial_delay_ms = 500
//! max_delay_ms = 30000
//! jitter = true
//!
//! [generation]
//! candidates = 3
//! min_cacheable_confidence = 0.5
//! deadline_secs = 120
//!
//! [scoring]
//! default_profile = "balanced"
//!
//! [scoring.profiles.ci]
//! build_time = 3.0
//! security = 1.0
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::cache::CacheConfig;
use crate::executor::RetryConfig;
use crate::scoring::{BALANCED, ProfileSet, WeightProfile};
use crate::types::Criterion;
use crate::{KilnError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub generation: GenerationSection,
    #[serde(default)]
    pub scoring: ScoringSection,
}

/// `[retry]` section. Delays are milliseconds on disk.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub max_repair_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetrySection {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_attempts: defaults.max_attempts,
            max_repair_attempts: defaults.max_repair_attempts,
            initial_delay_ms: defaults.initial_delay.as_millis() as u64,
            max_delay_ms: defaults.max_delay.as_millis() as u64,
            jitter: defaults.jitter,
        }
    }
}

impl From<&RetrySection> for RetryConfig {
    fn from(section: &RetrySection) -> Self {
        RetryConfig::new()
            .max_attempts(section.max_attempts)
            .max_repair_attempts(section.max_repair_attempts)
            .initial_delay(Duration::from_millis(section.initial_delay_ms))
            .max_delay(Duration::from_millis(section.max_delay_ms))
            .jitter(section.jitter)
    }
}

/// `[generation]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationSection {
    /// Candidates per ranked generation (default: 3).
    pub candidates: usize,
    /// Winners below this confidence are not cached (default: 0.5).
    pub min_cacheable_confidence: f64,
    /// Overall deadline per call, if any.
    pub deadline_secs: Option<u64>,
}

impl Default for GenerationSection {
    fn default() -> Self {
        Self {
            candidates: 3,
            min_cacheable_confidence: 0.5,
            deadline_secs: None,
        }
    }
}

impl GenerationSection {
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}

/// `[scoring]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringSection {
    pub default_profile: String,
    /// Custom profiles, merged over the built-in set.
    pub profiles: BTreeMap<String, BTreeMap<Criterion, f64>>,
}

impl Default for ScoringSection {
    fn default() -> Self {
        Self {
            default_profile: BALANCED.to_string(),
            profiles: BTreeMap::new(),
        }
    }
}

impl ScoringSection {
    /// Built-in profiles plus the configured ones, with the configured
    /// default selected.
    pub fn profile_set(&self) -> Result<ProfileSet> {
        let mut set = ProfileSet::builtin();
        for (name, weights) in &self.profiles {
            set.insert(WeightProfile::from_weights(name, weights.clone()))?;
        }
        set.set_default(&self.default_profile)?;
        Ok(set)
    }
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Falls back to defaults when no file exists, except that an explicit
    /// path must exist.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from(&path),
            None => {
                debug!("no config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load and validate one file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            KilnError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        let config = Self::parse(&content)
            .map_err(|e| KilnError::Configuration(format!("{path:?}: {e}")))?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Parse and validate TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| KilnError::Configuration(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let confidence = self.generation.min_cacheable_confidence;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(KilnError::Configuration(format!(
                "generation.min_cacheable_confidence must be within 0..=1, got {confidence}"
            )));
        }
        if self.generation.candidates == 0 {
            return Err(KilnError::Configuration(
                "generation.candidates must be at least 1".to_string(),
            ));
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err(KilnError::Configuration(
                "retry.initial_delay_ms exceeds retry.max_delay_ms".to_string(),
            ));
        }
        self.scoring.profile_set().map_err(|e| KilnError::Configuration(e.to_string()))?;
        Ok(())
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::from(&self.retry)
    }

    pub fn profile_set(&self) -> Result<ProfileSet> {
        self.scoring.profile_set()
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(KilnError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".kiln").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        let system_config = PathBuf::from("/etc/kiln/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }
}
