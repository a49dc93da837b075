//! Field Resolution Engine
//!
//! Merges per-field candidates from several extraction sources into one
//! `QuoteRecord`. Sources are trusted categorically through the authority
//! table: for each field the first eligible source (in priority order) whose
//! candidate clears the confidence gate wins. Confidences are never blended.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::authority::{eligible_sources, FieldName, ResolutionFlow, Source};
use crate::record::{FlatSize, HardwareItem, OutsideProcessItem, QuoteRecord};

pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// A candidate value as reported by an extraction source.
///
/// Untagged on the wire; the variant is checked against the target field
/// before the candidate can be accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CandidateValue {
    Integer(i64),
    Number(f64),
    Text(String),
    Dimensions { width: f64, height: f64 },
    Hardware(Vec<HardwareItem>),
    OutsideProcesses(Vec<OutsideProcessItem>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateField {
    pub field: FieldName,
    pub value: CandidateValue,
    pub confidence: f64,
    pub source: Source,
}

impl CandidateField {
    pub fn new(field: FieldName, value: CandidateValue, confidence: f64, source: Source) -> Self {
        Self {
            field,
            value,
            confidence,
            source,
        }
    }
}

/// Reported confidence per source; 0 for a source that reported nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfidenceScoreMap(BTreeMap<Source, f64>);

impl ConfidenceScoreMap {
    fn from_candidates(candidates: &[CandidateField]) -> Self {
        let mut scores: BTreeMap<Source, f64> = Source::ALL.iter().map(|s| (*s, 0.0)).collect();
        for c in candidates.iter().filter(|c| valid_confidence(c.confidence)) {
            let entry = scores.entry(c.source).or_insert(0.0);
            if c.confidence > *entry {
                *entry = c.confidence;
            }
        }
        Self(scores)
    }

    pub fn get(&self, source: Source) -> f64 {
        self.0.get(&source).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Source, &f64)> {
        self.0.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityLevel {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQuality {
    pub high_confidence_sources: usize,
    pub medium_confidence_sources: usize,
    pub low_confidence_sources: usize,
    pub overall: QualityLevel,
}

impl DataQuality {
    fn assess(candidates: &[CandidateField], scores: &ConfidenceScoreMap) -> Self {
        let reporting: Vec<f64> = Source::ALL
            .iter()
            .filter(|s| candidates.iter().any(|c| c.source == **s))
            .map(|s| scores.get(*s))
            .collect();

        let high = reporting.iter().filter(|v| **v >= 0.8).count();
        let medium = reporting.iter().filter(|v| (0.5..0.8).contains(*v)).count();
        let low = reporting.len() - high - medium;
        let overall = if reporting.is_empty() {
            QualityLevel::Low
        } else {
            let mean = reporting.iter().sum::<f64>() / reporting.len() as f64;
            if mean >= 0.8 {
                QualityLevel::High
            } else if mean >= 0.5 {
                QualityLevel::Medium
            } else {
                QualityLevel::Low
            }
        };

        Self {
            high_confidence_sources: high,
            medium_confidence_sources: medium,
            low_confidence_sources: low,
            overall,
        }
    }
}

/// Which source supplied a field, at what confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldResolution {
    pub field: FieldName,
    pub source: Source,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionReport {
    pub record: QuoteRecord,
    pub confidence: ConfidenceScoreMap,
    pub flow: ResolutionFlow,
    pub threshold: f64,
    pub accepted: Vec<FieldResolution>,
    pub quality: DataQuality,
    pub diagnostics: Vec<String>,
}

/// Resolves candidates into a fresh record. Pure and idempotent.
pub fn resolve(candidates: &[CandidateField], threshold: f64) -> (QuoteRecord, ConfidenceScoreMap) {
    let report = resolve_detailed(candidates, threshold);
    (report.record, report.confidence)
}

pub fn resolve_detailed(candidates: &[CandidateField], threshold: f64) -> ResolutionReport {
    let mut diagnostics = vec![];
    let threshold = if threshold.is_finite() {
        threshold
    } else {
        diagnostics.push(format!(
            "Invalid confidence threshold {threshold}; using {DEFAULT_THRESHOLD}"
        ));
        DEFAULT_THRESHOLD
    };

    let flow = if candidates.iter().any(|c| c.source == Source::Document) {
        ResolutionFlow::Standard
    } else {
        ResolutionFlow::GeometryOnly
    };

    let mut record = QuoteRecord::default();
    let mut accepted = vec![];

    for field in FieldName::ALL {
        if let Some(hit) = resolve_field(field, flow, candidates, threshold, &mut diagnostics) {
            let (value, resolution) = hit;
            assign(&mut record, value);
            record.field_sources.insert(field, resolution.source);
            accepted.push(resolution);
        }
    }

    let confidence = ConfidenceScoreMap::from_candidates(candidates);
    let quality = DataQuality::assess(candidates, &confidence);

    tracing::debug!(
        candidates = candidates.len(),
        accepted = accepted.len(),
        ?flow,
        "resolved quote fields"
    );

    ResolutionReport {
        record,
        confidence,
        flow,
        threshold,
        accepted,
        quality,
        diagnostics,
    }
}

fn resolve_field(
    field: FieldName,
    flow: ResolutionFlow,
    candidates: &[CandidateField],
    threshold: f64,
    diagnostics: &mut Vec<String>,
) -> Option<(Resolved, FieldResolution)> {
    for &source in eligible_sources(field, flow) {
        for candidate in candidates.iter().filter(|c| c.field == field && c.source == source) {
            if !valid_confidence(candidate.confidence) {
                diagnostics.push(format!(
                    "{field} from {source}: confidence {} outside [0, 1]",
                    candidate.confidence
                ));
                continue;
            }
            if candidate.confidence < threshold {
                tracing::debug!(%field, %source, confidence = candidate.confidence, "below threshold");
                continue;
            }
            match coerce(field, &candidate.value) {
                Ok(value) => {
                    return Some((
                        value,
                        FieldResolution {
                            field,
                            source,
                            confidence: candidate.confidence,
                        },
                    ));
                }
                Err(reason) => {
                    diagnostics.push(format!("{field} from {source}: {reason}"));
                }
            }
        }
    }
    None
}

fn valid_confidence(c: f64) -> bool {
    c.is_finite() && (0.0..=1.0).contains(&c)
}

/// A candidate value that passed the field's type check.
enum Resolved {
    Text(FieldName, String),
    Thickness(f64),
    FlatSize(FlatSize),
    BendCount(u32),
    Hardware(Vec<HardwareItem>),
    OutsideProcesses(Vec<OutsideProcessItem>),
}

fn coerce(field: FieldName, value: &CandidateValue) -> Result<Resolved, String> {
    match field {
        FieldName::Customer | FieldName::PartNumber | FieldName::Description | FieldName::Material => {
            match value {
                CandidateValue::Text(s) if !s.trim().is_empty() => {
                    Ok(Resolved::Text(field, s.trim().to_string()))
                }
                CandidateValue::Text(_) => Err("blank text".to_string()),
                other => Err(format!("expected text, got {}", kind_of(other))),
            }
        }
        FieldName::ThicknessIn => {
            let t = number_of(value)?;
            if t > 0.0 {
                Ok(Resolved::Thickness(t))
            } else {
                Err(format!("thickness must be positive, got {t}"))
            }
        }
        FieldName::FlatSize => {
            let (width, height) = match value {
                CandidateValue::Dimensions { width, height } => (*width, *height),
                CandidateValue::Text(s) => parse_dimensions(s)
                    .ok_or_else(|| format!("cannot read dimensions from {s:?}"))?,
                other => return Err(format!("expected dimensions, got {}", kind_of(other))),
            };
            if width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0 {
                Ok(Resolved::FlatSize(FlatSize { width, height }))
            } else {
                Err(format!("flat size must be positive, got {width} x {height}"))
            }
        }
        FieldName::BendCount => {
            let n = number_of(value)?;
            if n < 0.0 || n.fract() != 0.0 || n > u32::MAX as f64 {
                Err(format!("bend count must be a whole number >= 0, got {n}"))
            } else {
                Ok(Resolved::BendCount(n as u32))
            }
        }
        FieldName::Hardware => match value {
            CandidateValue::Hardware(items) => Ok(Resolved::Hardware(
                items.iter().filter(|h| !h.kind.trim().is_empty()).cloned().collect(),
            )),
            other => Err(format!("expected hardware list, got {}", kind_of(other))),
        },
        FieldName::OutsideProcesses => match value {
            CandidateValue::OutsideProcesses(items) => Ok(Resolved::OutsideProcesses(
                items.iter().filter(|p| !p.label.trim().is_empty()).cloned().collect(),
            )),
            // An empty JSON list deserializes as the first list variant.
            CandidateValue::Hardware(items) if items.is_empty() => {
                Ok(Resolved::OutsideProcesses(vec![]))
            }
            other => Err(format!("expected outside-process list, got {}", kind_of(other))),
        },
    }
}

fn assign(record: &mut QuoteRecord, value: Resolved) {
    match value {
        Resolved::Text(FieldName::Customer, s) => record.customer = Some(s),
        Resolved::Text(FieldName::PartNumber, s) => record.part_number = Some(s),
        Resolved::Text(FieldName::Description, s) => record.description = Some(s),
        Resolved::Text(_, s) => record.material = Some(s),
        Resolved::Thickness(t) => record.thickness_in = Some(t),
        Resolved::FlatSize(fs) => record.flat_size = Some(fs),
        Resolved::BendCount(n) => record.bend_count = Some(n),
        Resolved::Hardware(items) => record.hardware = Some(items),
        Resolved::OutsideProcesses(items) => record.outside_processes = Some(items),
    }
}

fn kind_of(value: &CandidateValue) -> &'static str {
    match value {
        CandidateValue::Integer(_) => "integer",
        CandidateValue::Number(_) => "number",
        CandidateValue::Text(_) => "text",
        CandidateValue::Dimensions { .. } => "dimensions",
        CandidateValue::Hardware(_) => "hardware list",
        CandidateValue::OutsideProcesses(_) => "outside-process list",
    }
}

fn number_of(value: &CandidateValue) -> Result<f64, String> {
    let n = match value {
        CandidateValue::Integer(i) => *i as f64,
        CandidateValue::Number(f) => *f,
        CandidateValue::Text(s) => {
            leading_number(s).ok_or_else(|| format!("no number in {s:?}"))?
        }
        other => return Err(format!("expected number, got {}", kind_of(other))),
    };
    if n.is_finite() {
        Ok(n)
    } else {
        Err("non-finite number".to_string())
    }
}

/// First decimal number in `s`, e.g. `0.063` from `"THK .063 IN"`.
pub(crate) fn leading_number(s: &str) -> Option<f64> {
    let bytes = s.as_bytes();
    let start = (0..bytes.len()).find(|&i| {
        bytes[i].is_ascii_digit()
            || (bytes[i] == b'.' && bytes.get(i + 1).map_or(false, u8::is_ascii_digit))
    })?;
    let mut end = start;
    let mut seen_dot = false;
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => end += 1,
            b'.' if !seen_dot && bytes.get(end + 1).map_or(false, u8::is_ascii_digit) => {
                seen_dot = true;
                end += 1;
            }
            _ => break,
        }
    }
    s[start..end].parse().ok()
}

/// `"10.5 x 4.25"` style text.
fn parse_dimensions(s: &str) -> Option<(f64, f64)> {
    let lower = s.to_lowercase().replace('×', "x");
    let (w, h) = lower.split_once('x')?;
    Some((leading_number(w)?, leading_number(h)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(field: FieldName, value: CandidateValue, confidence: f64) -> CandidateField {
        CandidateField::new(field, value, confidence, Source::Document)
    }

    #[test]
    fn test_leading_number() {
        assert_eq!(leading_number("THK .063 IN"), Some(0.063));
        assert_eq!(leading_number("0.125\""), Some(0.125));
        assert_eq!(leading_number("12GA 0.105"), Some(12.0));
        assert_eq!(leading_number("n/a"), None);
    }

    #[test]
    fn test_text_thickness_is_parsed() {
        let candidates = vec![doc(FieldName::ThicknessIn, CandidateValue::Text("0.063 in".into()), 0.9)];
        let (record, _) = resolve(&candidates, DEFAULT_THRESHOLD);
        assert_eq!(record.thickness_in, Some(0.063));
    }

    #[test]
    fn test_malformed_candidate_falls_through() {
        let candidates = vec![
            doc(FieldName::ThicknessIn, CandidateValue::Text("see drawing".into()), 0.95),
            doc(FieldName::ThicknessIn, CandidateValue::Number(0.080), 0.6),
        ];
        let report = resolve_detailed(&candidates, DEFAULT_THRESHOLD);
        assert_eq!(report.record.thickness_in, Some(0.080));
        assert_eq!(report.diagnostics.len(), 1);
        assert!(report.diagnostics[0].starts_with("thickness_in from document"));
    }

    #[test]
    fn test_dimensions_from_text() {
        let candidates = vec![CandidateField::new(
            FieldName::FlatSize,
            CandidateValue::Text("10.5 x 4.25".into()),
            0.9,
            Source::SecondaryCad,
        )];
        let (record, _) = resolve(&candidates, DEFAULT_THRESHOLD);
        assert_eq!(record.flat_size, Some(FlatSize { width: 10.5, height: 4.25 }));
    }

    #[test]
    fn test_fractional_bend_count_rejected() {
        let candidates = vec![CandidateField::new(
            FieldName::BendCount,
            CandidateValue::Number(2.5),
            0.9,
            Source::PrimaryCad,
        )];
        let (record, _) = resolve(&candidates, DEFAULT_THRESHOLD);
        assert_eq!(record.bend_count, None);
    }

    #[test]
    fn test_out_of_range_confidence_is_rejected() {
        let candidates = vec![doc(FieldName::Customer, CandidateValue::Text("ACME".into()), 1.5)];
        let report = resolve_detailed(&candidates, DEFAULT_THRESHOLD);
        assert_eq!(report.record.customer, None);
        assert_eq!(report.confidence.get(Source::Document), 0.0);
        assert_eq!(report.diagnostics.len(), 1);
    }

    #[test]
    fn test_confidence_map_keeps_highest_per_source() {
        let candidates = vec![
            doc(FieldName::Customer, CandidateValue::Text("ACME".into()), 0.7),
            doc(FieldName::Material, CandidateValue::Text("SS".into()), 0.9),
        ];
        let (_, scores) = resolve(&candidates, DEFAULT_THRESHOLD);
        assert_eq!(scores.get(Source::Document), 0.9);
        assert_eq!(scores.get(Source::PrimaryCad), 0.0);
        assert_eq!(scores.iter().count(), 3);
    }

    #[test]
    fn test_data_quality() {
        let candidates = vec![
            doc(FieldName::Customer, CandidateValue::Text("ACME".into()), 0.9),
            CandidateField::new(FieldName::BendCount, CandidateValue::Integer(2), 0.4, Source::SecondaryCad),
        ];
        let report = resolve_detailed(&candidates, DEFAULT_THRESHOLD);
        assert_eq!(report.quality.high_confidence_sources, 1);
        assert_eq!(report.quality.low_confidence_sources, 1);
        assert_eq!(report.quality.overall, QualityLevel::Medium);
    }

    #[test]
    fn test_secondary_cad_hardware_alongside_document() {
        let candidates = vec![
            doc(FieldName::Material, CandidateValue::Text("CRS".into()), 0.9),
            CandidateField::new(
                FieldName::Hardware,
                CandidateValue::Hardware(vec![HardwareItem::new("PEM-632", 4, 0.12)]),
                0.95,
                Source::SecondaryCad,
            ),
        ];
        let report = resolve_detailed(&candidates, DEFAULT_THRESHOLD);
        assert_eq!(report.flow, ResolutionFlow::Standard);
        assert_eq!(report.record.hardware, Some(vec![HardwareItem::new("PEM-632", 4, 0.12)]));
        assert_eq!(
            report.record.field_sources.get(&FieldName::Hardware),
            Some(&Source::SecondaryCad)
        );
    }

    #[test]
    fn test_document_hardware_outranks_secondary_cad() {
        let candidates = vec![
            CandidateField::new(
                FieldName::Hardware,
                CandidateValue::Hardware(vec![HardwareItem::new("CLS-440", 2, 0.09)]),
                0.99,
                Source::SecondaryCad,
            ),
            doc(
                FieldName::Hardware,
                CandidateValue::Hardware(vec![HardwareItem::new("PEM-632", 4, 0.12)]),
                0.7,
            ),
        ];
        let (record, _) = resolve(&candidates, DEFAULT_THRESHOLD);
        assert_eq!(record.hardware_items()[0].kind, "PEM-632");
    }

    #[test]
    fn test_primary_cad_outranks_secondary_cad() {
        let flat = |w: f64, c: f64, source: Source| {
            CandidateField::new(
                FieldName::FlatSize,
                CandidateValue::Dimensions { width: w, height: 2.0 },
                c,
                source,
            )
        };
        let both = vec![flat(9.0, 0.99, Source::SecondaryCad), flat(8.0, 0.6, Source::PrimaryCad)];
        let (record, _) = resolve(&both, DEFAULT_THRESHOLD);
        assert_eq!(record.flat_size.map(|f| f.width), Some(8.0));
        assert_eq!(record.field_sources.get(&FieldName::FlatSize), Some(&Source::PrimaryCad));

        let weak_primary = vec![flat(8.0, 0.4, Source::PrimaryCad), flat(9.0, 0.7, Source::SecondaryCad)];
        let (record, _) = resolve(&weak_primary, DEFAULT_THRESHOLD);
        assert_eq!(record.flat_size.map(|f| f.width), Some(9.0));
        assert_eq!(record.field_sources.get(&FieldName::FlatSize), Some(&Source::SecondaryCad));
    }

    #[test]
    fn test_confidence_equal_to_threshold_is_accepted() {
        let candidates = vec![doc(FieldName::Customer, CandidateValue::Text("ACME".into()), 0.5)];
        let (record, _) = resolve(&candidates, 0.5);
        assert_eq!(record.customer.as_deref(), Some("ACME"));
    }

    #[test]
    fn test_candidate_json_shapes() {
        let json = r#"[
            {"field": "bend_count", "value": 3, "confidence": 0.95, "source": "primary_cad"},
            {"field": "flat_size", "value": {"width": 5.0, "height": 2.0}, "confidence": 0.95, "source": "primary_cad"},
            {"field": "outside_processes", "value": [{"label": "Zinc Plate", "unit_cost": 1.25}], "confidence": 0.8, "source": "document"}
        ]"#;
        let candidates: Vec<CandidateField> = serde_json::from_str(json).unwrap();
        assert_eq!(candidates[0].value, CandidateValue::Integer(3));
        let (record, _) = resolve(&candidates, DEFAULT_THRESHOLD);
        assert_eq!(record.bend_count, Some(3));
        assert_eq!(record.outside_process_items().len(), 1);
    }
}
