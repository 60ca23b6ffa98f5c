//! Run configuration
//!
//! A single value enumerates everything a run depends on. It is usually
//! loaded from YAML or JSON; omitted fields take the documented defaults
//! (parametric, 99% confidence, 1-day horizon, 365-day lookback).

use crate::analytics::var::{validate_confidence, VarMethod};
use crate::error::{Result, VarError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// How historical simulation treats a date on which some factor has no return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingDataPolicy {
    /// Drop the whole day (strict alignment)
    #[default]
    DropDay,

    /// Keep the day; the missing leg contributes zero P&L
    ZeroFill,
}

/// VaR run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarConfig {
    /// Estimator to run for every scope
    #[serde(default = "default_method")]
    pub method: VarMethod,

    /// Confidence level, strictly between 0 and 1
    #[serde(default = "default_confidence_level")]
    pub confidence_level: f64,

    /// Horizon in days (parametric only)
    #[serde(default = "default_horizon_days")]
    pub horizon_days: u32,

    /// Lookback window in calendar days
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,

    /// Historical simulation treatment of partially covered days
    #[serde(default)]
    pub missing_data: MissingDataPolicy,

    /// Currency results are expressed in
    #[serde(default = "default_base_currency")]
    pub base_currency: String,

    /// Units of base currency per unit of each other currency
    #[serde(default)]
    pub fx_rates: BTreeMap<String, f64>,
}

impl VarConfig {
    /// Parse a YAML document
    ///
    /// # Example
    ///
    /// ```
    /// use metals_var::{VarConfig, VarMethod};
    ///
    /// let yaml = r#"
    /// method: historical
    /// confidence_level: 0.95
    /// "#;
    ///
    /// let config = VarConfig::from_yaml(yaml).unwrap();
    /// assert_eq!(config.method, VarMethod::Historical);
    /// assert_eq!(config.lookback_days, 365);
    /// ```
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: VarConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: VarConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file; `.json` files are parsed as JSON, anything else as YAML
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::from_json(&contents),
            _ => Self::from_yaml(&contents),
        }
    }

    /// Check every parameter, reporting the first offending one
    pub fn validate(&self) -> Result<()> {
        validate_confidence(self.confidence_level)?;

        if self.horizon_days == 0 {
            return Err(VarError::InvalidTimeHorizon(self.horizon_days));
        }

        if self.lookback_days == 0 {
            return Err(VarError::InvalidLookback(self.lookback_days));
        }

        if self.base_currency.trim().is_empty() {
            return Err(VarError::InvalidParameter(
                "base_currency must not be empty".to_string(),
            ));
        }

        for (currency, rate) in &self.fx_rates {
            if !rate.is_finite() || *rate <= 0.0 {
                return Err(VarError::InvalidParameter(format!(
                    "fx rate for {} must be positive, got {}",
                    currency, rate
                )));
            }
        }

        Ok(())
    }
}

impl Default for VarConfig {
    fn default() -> Self {
        Self {
            method: default_method(),
            confidence_level: default_confidence_level(),
            horizon_days: default_horizon_days(),
            lookback_days: default_lookback_days(),
            missing_data: MissingDataPolicy::default(),
            base_currency: default_base_currency(),
            fx_rates: BTreeMap::new(),
        }
    }
}

// Default value functions
fn default_method() -> VarMethod {
    VarMethod::Parametric
}

fn default_confidence_level() -> f64 {
    0.99
}

fn default_horizon_days() -> u32 {
    1
}

fn default_lookback_days() -> u32 {
    365
}

fn default_base_currency() -> String {
    "USD".to_string()
}
