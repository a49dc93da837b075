//! Quote configuration: threshold, rates, tiers, markup, data locations.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::pricing::{Rates, DEFAULT_MARKUP_PERCENT, DEFAULT_QUANTITIES};
use crate::resolution::DEFAULT_THRESHOLD;

pub const ENV_DATA_DIR: &str = "SHOPQUOTE_DATA_DIR";
pub const ENV_RULES_PATH: &str = "SHOPQUOTE_RULES";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {0}: {1}")]
    Io(String, std::io::Error),

    #[error("Invalid config {0}: {1}")]
    Parse(String, serde_json::Error),

    #[error("Confidence threshold must be within [0, 1], got {0}")]
    Threshold(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuoteConfig {
    pub threshold: f64,
    pub rates: Rates,
    pub quantities: Vec<u32>,
    pub markup_percent: f64,
    /// Directory holding the catalog CSVs.
    pub data_dir: PathBuf,
    /// Rule tables override; the embedded tables otherwise.
    pub rules_path: Option<PathBuf>,
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            rates: Rates::default(),
            quantities: DEFAULT_QUANTITIES.to_vec(),
            markup_percent: DEFAULT_MARKUP_PERCENT,
            data_dir: PathBuf::from("data"),
            rules_path: None,
        }
    }
}

impl QuoteConfig {
    pub fn from_json_str(s: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: QuoteConfig =
            serde_json::from_str(s).map_err(|e| ConfigError::Parse(origin.to_string(), e))?;
        config.check()?;
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let origin = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(origin.clone(), e))?;
        let config = Self::from_json_str(&content, &origin)?;
        tracing::info!(path = %origin, "loaded quote config");
        Ok(config)
    }

    /// Config file when given, defaults otherwise; environment wins over both.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(p) => Self::load_from_path(p)?,
            None => Self::default(),
        };
        Ok(config.with_overrides(|key| std::env::var(key).ok()))
    }

    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup(ENV_DATA_DIR).filter(|v| !v.is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(rules) = lookup(ENV_RULES_PATH).filter(|v| !v.is_empty()) {
            self.rules_path = Some(PathBuf::from(rules));
        }
        self
    }

    fn check(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ConfigError::Threshold(self.threshold));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = QuoteConfig::from_json_str(r#"{"markup_percent": 10, "quantities": [5]}"#, "inline").unwrap();
        assert_eq!(config.markup_percent, 10.0);
        assert_eq!(config.quantities, vec![5]);
        assert_eq!(config.threshold, 0.5);
        assert_eq!(config.rates, Rates::default());
    }

    #[test]
    fn test_threshold_out_of_range() {
        let err = QuoteConfig::from_json_str(r#"{"threshold": 1.5}"#, "inline").unwrap_err();
        assert!(matches!(err, ConfigError::Threshold(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"rates": {{"setup": 1.0, "labor": 0.5, "machine": 0.25}}}}"#).unwrap();
        let config = QuoteConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.rates.machine, 0.25);
    }

    #[test]
    fn test_partial_rates_fall_back() {
        let config = QuoteConfig::from_json_str(r#"{"rates": {"setup": 1.0}}"#, "inline").unwrap();
        assert_eq!(config.rates, Rates { setup: 1.0, labor: 1.0, machine: 1.5 });
    }

    #[test]
    fn test_overrides() {
        let config = QuoteConfig::default().with_overrides(|k| match k {
            ENV_DATA_DIR => Some("/srv/catalogs".to_string()),
            _ => None,
        });
        assert_eq!(config.data_dir, PathBuf::from("/srv/catalogs"));
        assert_eq!(config.rules_path, None);
    }
}
