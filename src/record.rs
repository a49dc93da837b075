//! Quote Record - Canonical Quote Aggregate

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::authority::{FieldName, Source};
use crate::operations::OperationList;

fn default_qty() -> u32 { 1 }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareItem {
    #[serde(rename = "type", alias = "part")]
    pub kind: String,
    #[serde(default = "default_qty", alias = "qty")]
    pub qty_per_part: u32,
    #[serde(default, alias = "cost_per_part", alias = "price", alias = "unit_price")]
    pub unit_cost: f64,
}

impl HardwareItem {
    pub fn new(kind: impl Into<String>, qty_per_part: u32, unit_cost: f64) -> Self {
        Self {
            kind: kind.into(),
            qty_per_part,
            unit_cost,
        }
    }
}

impl fmt::Display for HardwareItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x{}", self.kind, self.qty_per_part)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutsideProcessItem {
    #[serde(alias = "name", alias = "process")]
    pub label: String,
    #[serde(
        default,
        alias = "unit_cost_per_part",
        alias = "cost_per_part",
        alias = "price",
        alias = "unit_price"
    )]
    pub unit_cost: f64,
}

impl OutsideProcessItem {
    pub fn new(label: impl Into<String>, unit_cost: f64) -> Self {
        Self {
            label: label.into(),
            unit_cost,
        }
    }
}

impl fmt::Display for OutsideProcessItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// Flat pattern size in inches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlatSize {
    pub width: f64,
    pub height: f64,
}

/// Canonical quote record.
///
/// `None` means no source cleared the authority policy for that field. It is
/// never silently replaced by zero or empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuoteRecord {
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub part_number: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub material: Option<String>,
    #[serde(default)]
    pub thickness_in: Option<f64>,
    #[serde(default)]
    pub flat_size: Option<FlatSize>,
    #[serde(default)]
    pub bend_count: Option<u32>,
    #[serde(default)]
    pub operations: OperationList,
    #[serde(default)]
    pub hardware: Option<Vec<HardwareItem>>,
    #[serde(default)]
    pub outside_processes: Option<Vec<OutsideProcessItem>>,
    /// Source that supplied each populated field.
    #[serde(default)]
    pub field_sources: BTreeMap<FieldName, Source>,
}

impl QuoteRecord {
    pub fn hardware_items(&self) -> &[HardwareItem] {
        self.hardware.as_deref().unwrap_or(&[])
    }

    pub fn outside_process_items(&self) -> &[OutsideProcessItem] {
        self.outside_processes.as_deref().unwrap_or(&[])
    }

    pub fn is_populated(&self, field: FieldName) -> bool {
        match field {
            FieldName::Customer => self.customer.is_some(),
            FieldName::PartNumber => self.part_number.is_some(),
            FieldName::Description => self.description.is_some(),
            FieldName::Material => self.material.is_some(),
            FieldName::ThicknessIn => self.thickness_in.is_some(),
            FieldName::FlatSize => self.flat_size.is_some(),
            FieldName::BendCount => self.bend_count.is_some(),
            FieldName::Hardware => self.hardware.is_some(),
            FieldName::OutsideProcesses => self.outside_processes.is_some(),
        }
    }

    pub fn populated_count(&self) -> usize {
        FieldName::ALL.iter().filter(|f| self.is_populated(**f)).count()
    }
}

pub const QUOTE_NUMBER_PREFIX: &str = "SQ-";

/// `SQ-YYYYMMDD-NNN`
pub fn format_quote_number(date: NaiveDate, serial: u32) -> String {
    format!("{}{}-{:03}", QUOTE_NUMBER_PREFIX, date.format("%Y%m%d"), serial)
}

/// Next free number for `date`, given the numbers already issued.
pub fn next_quote_number<S: AsRef<str>>(date: NaiveDate, issued: &[S]) -> String {
    let day_prefix = format!("{}{}-", QUOTE_NUMBER_PREFIX, date.format("%Y%m%d"));
    let highest = issued
        .iter()
        .map(|q| q.as_ref().trim())
        .filter(|q| is_valid_quote_number(q))
        .filter_map(|q| q.strip_prefix(&day_prefix))
        .filter_map(|serial| serial.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    format_quote_number(date, highest + 1)
}

pub fn is_valid_quote_number(qnum: &str) -> bool {
    let Some(rest) = qnum.trim().strip_prefix(QUOTE_NUMBER_PREFIX) else {
        return false;
    };
    let Some((date, serial)) = rest.split_once('-') else {
        return false;
    };
    date.len() == 8
        && date.bytes().all(|b| b.is_ascii_digit())
        && serial.len() >= 3
        && serial.bytes().all(|b| b.is_ascii_digit())
}
