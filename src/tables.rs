//! Rule Tables - Static Manufacturing Data
//!
//! Loaded once, immutable afterwards, shared by reference.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

use crate::ENGINE_VERSION;

/// Tables compiled into the binary.
const BUILTIN_TABLES: &str = include_str!("../config/rule_tables.json");

/// Two thicknesses closer than this are the same gauge.
pub const THICKNESS_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("Failed to read rule tables: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid rule tables: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rule tables require engine >= {0}, current is {1}")]
    EngineVersionMismatch(String, String),

    #[error("Invalid version string: {0}")]
    Version(String),

    #[error("Material {0} has no valid thicknesses")]
    EmptyThicknessSet(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialRule {
    pub code: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub density_lb_in3: Option<f64>,
    /// Declared order matters: nearest-thickness ties go to the earlier entry.
    pub valid_thicknesses: Vec<f64>,
    #[serde(default)]
    pub preferred_operations: Vec<String>,
    #[serde(default)]
    pub restricted_operations: Vec<String>,
    #[serde(default)]
    pub cost_multipliers: BTreeMap<String, f64>,
}

impl MaterialRule {
    pub fn matches(&self, material: &str) -> bool {
        let wanted = material.trim();
        self.code.eq_ignore_ascii_case(wanted)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(wanted))
    }

    pub fn accepts_thickness(&self, thickness: f64) -> bool {
        self.valid_thicknesses
            .iter()
            .any(|t| (t - thickness).abs() <= THICKNESS_TOLERANCE)
    }

    /// Nearest valid thickness, first in declared order on ties.
    pub fn nearest_thickness(&self, thickness: f64) -> Option<f64> {
        let mut best: Option<(f64, f64)> = None;
        for &candidate in &self.valid_thicknesses {
            let diff = (candidate - thickness).abs();
            match best {
                Some((_, best_diff)) if diff >= best_diff => {}
                _ => best = Some((candidate, diff)),
            }
        }
        best.map(|(t, _)| t)
    }

    pub fn is_restricted(&self, operation: &str) -> bool {
        self.restricted_operations.iter().any(|r| r == operation)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationDependency {
    pub operation: String,
    pub requires: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThicknessBounds {
    pub min: f64,
    pub max: f64,
    pub warning_threshold: f64,
}

impl Default for ThicknessBounds {
    fn default() -> Self {
        Self {
            min: 0.032,
            max: 0.375,
            warning_threshold: 0.250,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SequenceTemplate {
    Standard,
    Simple,
    Complex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleTables {
    pub tables_version: String,
    pub engine_min_version: String,
    pub materials: Vec<MaterialRule>,
    #[serde(default)]
    pub dependencies: Vec<OperationDependency>,
    #[serde(default)]
    pub thickness_bounds: ThicknessBounds,
    #[serde(default)]
    pub sequences: BTreeMap<SequenceTemplate, Vec<String>>,
}

impl RuleTables {
    pub fn from_json_str(content: &str) -> Result<Self, TableError> {
        let tables: RuleTables = serde_json::from_str(content)?;
        tables.check()?;
        Ok(tables)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, TableError> {
        let content = fs::read_to_string(path)?;
        let tables = Self::from_json_str(&content)?;
        tracing::info!(
            path = %path.display(),
            version = %tables.tables_version,
            materials = tables.materials.len(),
            "loaded rule tables"
        );
        Ok(tables)
    }

    /// Process-wide tables compiled into the binary, parsed on first use.
    ///
    /// # Panics
    /// Panics if the embedded JSON is invalid (a build defect, covered by tests).
    pub fn builtin() -> &'static RuleTables {
        static TABLES: OnceLock<RuleTables> = OnceLock::new();
        TABLES.get_or_init(|| {
            RuleTables::from_json_str(BUILTIN_TABLES)
                .expect("embedded rule_tables.json must be valid")
        })
    }

    fn check(&self) -> Result<(), TableError> {
        let engine = semver::Version::parse(ENGINE_VERSION)
            .map_err(|e| TableError::Version(e.to_string()))?;
        let min = semver::Version::parse(&self.engine_min_version)
            .map_err(|e| TableError::Version(format!("{}: {}", self.engine_min_version, e)))?;
        if engine < min {
            return Err(TableError::EngineVersionMismatch(
                self.engine_min_version.clone(),
                ENGINE_VERSION.to_string(),
            ));
        }

        if let Some(m) = self.materials.iter().find(|m| m.valid_thicknesses.is_empty()) {
            return Err(TableError::EmptyThicknessSet(m.code.clone()));
        }
        Ok(())
    }

    pub fn material(&self, material: &str) -> Option<&MaterialRule> {
        self.materials.iter().find(|m| m.matches(material))
    }

    pub fn material_codes(&self) -> Vec<&str> {
        self.materials.iter().map(|m| m.code.as_str()).collect()
    }

    /// Multiplier for an operation on a material; 1.0 when the table has none.
    pub fn cost_multiplier(&self, material: &str, operation: &str) -> f64 {
        self.material(material)
            .and_then(|m| m.cost_multipliers.get(operation).copied())
            .unwrap_or(1.0)
    }

    pub fn sequence(&self, template: SequenceTemplate) -> &[String] {
        self.sequences
            .get(&template)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn density(&self, material: &str) -> Option<f64> {
        self.material(material).and_then(|m| m.density_lb_in3)
    }
}

impl Default for RuleTables {
    fn default() -> Self {
        Self::builtin().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_tables_parse() {
        let tables = RuleTables::builtin();
        assert_eq!(
            tables.material_codes(),
            vec!["CRS", "HRS", "SS", "ALUMINUM", "COPPER", "BRASS"]
        );
        assert_eq!(tables.dependencies.len(), 6);
        assert_eq!(tables.sequence(SequenceTemplate::Simple).len(), 5);
    }

    #[test]
    fn test_material_lookup_uses_aliases() {
        let tables = RuleTables::builtin();
        assert_eq!(tables.material("al").map(|m| m.code.as_str()), Some("ALUMINUM"));
        assert_eq!(tables.material(" stainless ").map(|m| m.code.as_str()), Some("SS"));
        assert!(tables.material("TITANIUM").is_none());
    }

    #[test]
    fn test_nearest_thickness_tie_prefers_declared_order() {
        let rule = MaterialRule {
            code: "X".into(),
            aliases: vec![],
            density_lb_in3: None,
            valid_thicknesses: vec![0.050, 0.030],
            preferred_operations: vec![],
            restricted_operations: vec![],
            cost_multipliers: BTreeMap::new(),
        };
        assert_eq!(rule.nearest_thickness(0.040), Some(0.050));
    }

    #[test]
    fn test_cost_multiplier_defaults_to_one() {
        let tables = RuleTables::builtin();
        assert_eq!(tables.cost_multiplier("SS", "Passivate"), 2.0);
        assert_eq!(tables.cost_multiplier("SS", "Weld"), 1.0);
        assert_eq!(tables.cost_multiplier("UNOBTAINIUM", "Laser"), 1.0);
    }

    #[test]
    fn test_engine_version_gate() {
        let json = BUILTIN_TABLES.replace(
            "\"engineMinVersion\": \"1.0.0\"",
            "\"engineMinVersion\": \"99.0.0\"",
        );
        let err = RuleTables::from_json_str(&json).unwrap_err();
        assert!(matches!(err, TableError::EngineVersionMismatch(..)));
    }
}
