//! Weight profiles.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::Criterion;
use crate::{KilnError, Result};

/// Name of the profile every [`ProfileSet`] starts with as its default.
pub const BALANCED: &str = "balanced";

/// Named mapping from criterion to non-negative weight.
///
/// A criterion that is absent, or weighted zero, does not affect the
/// aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightProfile {
    name: String,
    weights: BTreeMap<Criterion, f64>,
}

impl WeightProfile {
    /// Create an empty profile. Add weights with [`weight`](Self::weight).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            weights: BTreeMap::new(),
        }
    }

    pub fn from_weights(name: impl Into<String>, weights: BTreeMap<Criterion, f64>) -> Self {
        Self {
            name: name.into(),
            weights,
        }
    }

    /// Set the weight for one criterion.
    pub fn weight(mut self, criterion: Criterion, weight: f64) -> Self {
        self.weights.insert(criterion, weight);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn weights(&self) -> &BTreeMap<Criterion, f64> {
        &self.weights
    }

    /// Weight of `criterion`, zero when absent.
    pub fn get(&self, criterion: Criterion) -> f64 {
        self.weights.get(&criterion).copied().unwrap_or(0.0)
    }

    /// Sum of all weights.
    pub fn total(&self) -> f64 {
        Criterion::ALL.iter().map(|c| self.get(*c)).sum()
    }

    /// Weights must be finite and non-negative, with at least one positive.
    pub fn validate(&self) -> Result<()> {
        for (criterion, weight) in &self.weights {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(KilnError::InvalidProfile(format!(
                    "profile '{}': weight for {criterion} must be a non-negative number, got {weight}",
                    self.name
                )));
            }
        }
        if self.total() <= 0.0 {
            return Err(KilnError::InvalidProfile(format!(
                "profile '{}' has no positive weight",
                self.name
            )));
        }
        Ok(())
    }

    /// Every criterion weighted equally.
    pub fn balanced() -> Self {
        Criterion::ALL
            .into_iter()
            .fold(Self::new(BALANCED), |p, c| p.weight(c, 1.0))
    }

    /// Upweights security and runtime performance.
    pub fn production() -> Self {
        Self::new("production")
            .weight(Criterion::BuildTime, 0.5)
            .weight(Criterion::ImageSize, 1.0)
            .weight(Criterion::Security, 2.0)
            .weight(Criterion::BestPractices, 1.0)
            .weight(Criterion::Maintainability, 0.5)
            .weight(Criterion::Performance, 2.0)
    }

    /// Upweights build time and maintainability.
    pub fn development() -> Self {
        Self::new("development")
            .weight(Criterion::BuildTime, 2.0)
            .weight(Criterion::ImageSize, 0.5)
            .weight(Criterion::Security, 0.5)
            .weight(Criterion::BestPractices, 1.0)
            .weight(Criterion::Maintainability, 2.0)
            .weight(Criterion::Performance, 0.5)
    }

    /// Security first, then structural best practices.
    pub fn security() -> Self {
        Self::new("security")
            .weight(Criterion::BuildTime, 0.25)
            .weight(Criterion::ImageSize, 0.5)
            .weight(Criterion::Security, 3.0)
            .weight(Criterion::BestPractices, 1.5)
            .weight(Criterion::Maintainability, 0.5)
            .weight(Criterion::Performance, 0.5)
    }
}

/// Named profiles with a default that always exists.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileSet {
    profiles: BTreeMap<String, WeightProfile>,
    default: WeightProfile,
}

impl Default for ProfileSet {
    fn default() -> Self {
        let mut profiles = BTreeMap::new();
        for p in [
            WeightProfile::balanced(),
            WeightProfile::production(),
            WeightProfile::development(),
            WeightProfile::security(),
        ] {
            profiles.insert(p.name().to_string(), p);
        }
        Self {
            profiles,
            default: WeightProfile::balanced(),
        }
    }
}

impl ProfileSet {
    /// The built-in profiles, defaulting to `balanced`.
    pub fn builtin() -> Self {
        Self::default()
    }

    /// Add or replace a profile after validating it.
    pub fn insert(&mut self, profile: WeightProfile) -> Result<()> {
        profile.validate()?;
        if profile.name() == self.default.name() {
            self.default = profile.clone();
        }
        self.profiles.insert(profile.name().to_string(), profile);
        Ok(())
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with_profile(mut self, profile: WeightProfile) -> Result<Self> {
        self.insert(profile)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Result<&WeightProfile> {
        self.profiles
            .get(name)
            .ok_or_else(|| KilnError::UnknownProfile(name.to_string()))
    }

    /// Profile named `name`, or the default when `None`.
    pub fn resolve(&self, name: Option<&str>) -> Result<&WeightProfile> {
        match name {
            Some(name) => self.get(name),
            None => Ok(&self.default),
        }
    }

    pub fn default_profile(&self) -> &WeightProfile {
        &self.default
    }

    /// Make an existing profile the default.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        self.default = self.get(name)?.clone();
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &WeightProfile> {
        self.profiles.values()
    }
}
