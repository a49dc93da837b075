//! Estimator helpers: weight, bend allowance, unit conversion.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::record::{FlatSize, QuoteRecord};
use crate::tables::RuleTables;

pub const MM_PER_INCH: f64 = 25.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
    In,
    Mm,
}

pub fn mm_to_in(mm: f64) -> f64 {
    mm / MM_PER_INCH
}

/// Parses a user-entered length into inches. Blank or junk gives `None`.
pub fn parse_length(s: &str, unit: LengthUnit) -> Option<f64> {
    let v: f64 = s.trim().parse().ok()?;
    if !v.is_finite() {
        return None;
    }
    Some(match unit {
        LengthUnit::In => v,
        LengthUnit::Mm => mm_to_in(v),
    })
}

/// Arc length of the neutral axis through a bend.
pub fn bend_allowance(angle_deg: f64, inside_radius: f64, k_factor: f64, thickness: f64) -> f64 {
    angle_deg.to_radians() * (inside_radius + k_factor * thickness)
}

/// Twice the outside setback minus the bend allowance.
pub fn bend_deduction(angle_deg: f64, inside_radius: f64, thickness: f64, allowance: f64) -> f64 {
    let setback = (inside_radius + thickness) * (angle_deg / 2.0 * PI / 180.0).tan();
    2.0 * setback - allowance
}

/// Blank weight in pounds; `None` when any input is missing or the material
/// has no density.
pub fn compute_weight_lb(
    tables: &RuleTables,
    material: &str,
    thickness_in: Option<f64>,
    flat: Option<FlatSize>,
) -> Option<f64> {
    let density = tables.density(material)?;
    let t = thickness_in?;
    let flat = flat?;
    let weight = density * t * flat.width * flat.height;
    weight.is_finite().then(|| (weight * 10_000.0).round() / 10_000.0)
}

pub fn record_weight_lb(tables: &RuleTables, record: &QuoteRecord) -> Option<f64> {
    compute_weight_lb(tables, record.material.as_deref()?, record.thickness_in, record.flat_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_length_units() {
        assert_eq!(parse_length("25.4", LengthUnit::Mm), Some(1.0));
        assert_eq!(parse_length(" 2 ", LengthUnit::In), Some(2.0));
        assert_eq!(parse_length("", LengthUnit::In), None);
    }

    #[test]
    fn test_ninety_degree_bend() {
        let ba = bend_allowance(90.0, 0.0625, 0.44, 0.0598);
        assert!((ba - 0.1395).abs() < 1e-4);
        let bd = bend_deduction(90.0, 0.0625, 0.0598, ba);
        assert!((bd - (2.0 * 0.1223 - ba)).abs() < 1e-4);
    }

    #[test]
    fn test_weight() {
        let tables = RuleTables::builtin();
        let flat = Some(FlatSize { width: 10.0, height: 5.0 });
        assert_eq!(compute_weight_lb(tables, "CRS", Some(0.0598), flat), Some(0.8492));
        assert_eq!(compute_weight_lb(tables, "ALUMINUM", None, flat), None);
        assert_eq!(compute_weight_lb(tables, "UNOBTAINIUM", Some(0.125), flat), None);
    }
}
