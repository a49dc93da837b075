//! Authority Policy - Which Source May Supply Which Field
//!
//! A fixed table instead of per-field if/else sprawl.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Extraction channel a candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Text/drawing channel (PDF, OCR)
    Document,
    /// Preferred CAD geometry channel (STEP)
    PrimaryCad,
    /// Fallback CAD geometry channel (DXF)
    SecondaryCad,
}

impl Source {
    pub const ALL: [Source; 3] = [Source::Document, Source::PrimaryCad, Source::SecondaryCad];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Document => "document",
            Source::PrimaryCad => "primary_cad",
            Source::SecondaryCad => "secondary_cad",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldName {
    Customer,
    PartNumber,
    Description,
    Material,
    ThicknessIn,
    FlatSize,
    BendCount,
    Hardware,
    OutsideProcesses,
}

impl FieldName {
    pub const ALL: [FieldName; 9] = [
        FieldName::Customer,
        FieldName::PartNumber,
        FieldName::Description,
        FieldName::Material,
        FieldName::ThicknessIn,
        FieldName::FlatSize,
        FieldName::BendCount,
        FieldName::Hardware,
        FieldName::OutsideProcesses,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldName::Customer => "customer",
            FieldName::PartNumber => "part_number",
            FieldName::Description => "description",
            FieldName::Material => "material",
            FieldName::ThicknessIn => "thickness_in",
            FieldName::FlatSize => "flat_size",
            FieldName::BendCount => "bend_count",
            FieldName::Hardware => "hardware",
            FieldName::OutsideProcesses => "outside_processes",
        }
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which extraction flow produced the candidate set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionFlow {
    /// At least one document candidate is present.
    Standard,
    /// Only CAD channels reported.
    GeometryOnly,
}

/// Eligible sources for a field, highest priority first.
pub fn eligible_sources(field: FieldName, flow: ResolutionFlow) -> &'static [Source] {
    match (field, flow) {
        (FieldName::FlatSize | FieldName::BendCount, _) => {
            &[Source::PrimaryCad, Source::SecondaryCad]
        }
        (FieldName::Hardware, ResolutionFlow::Standard) => &[Source::Document, Source::SecondaryCad],
        (FieldName::Hardware, ResolutionFlow::GeometryOnly) => &[Source::SecondaryCad],
        _ => &[Source::Document],
    }
}
