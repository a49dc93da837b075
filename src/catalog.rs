//! Lookup Catalogs - Operation Vocabulary, Hardware, Outside Processes, Rates
//!
//! Row-oriented CSV files with flexible headers. A missing file falls back to
//! built-in defaults; the engines only ever see the loaded values.

use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::operations::{FormDefaults, OperationVocabulary, FORM};
use crate::pricing::Rates;
use crate::record::{HardwareItem, OutsideProcessItem};

pub const OPERATIONS_FILE: &str = "Operations.csv";
pub const HARDWARE_FILE: &str = "Hardware.csv";
pub const OUTSIDE_PROCESS_FILE: &str = "OutsideProcess.csv";
pub const RATES_FILE: &str = "Rates.csv";

const OPERATION_NAME_COLUMNS: &[&str] = &["operation", "opname", "name", "operation_name", "op_name", "label"];
const SETUP_COLUMNS: &[&str] = &["setup_min", "setup", "setup_time_min", "setup_minutes"];
const SEC_PER_OP_COLUMNS: &[&str] = &["sec_per_op", "time_sec_per_op", "runtime_per_op_sec", "sec_per_bend"];
const TIME_SEC_COLUMNS: &[&str] = &["time_sec", "runtime_sec", "time_seconds"];
const HARDWARE_COLUMNS: &[&str] = &["part", "part_number", "hardware", "type", "name", "description", "label"];
const OUTSIDE_PROCESS_COLUMNS: &[&str] = &["label", "name", "process", "operation", "op", "outside_process"];
const COST_COLUMNS: &[&str] = &["unit_cost", "cost_per_part", "price", "unit_price"];
const SETUP_RATE_COLUMNS: &[&str] = &["setupratepermin", "setup_rate_per_min", "setup_rate"];
const LABOR_RATE_COLUMNS: &[&str] = &["laborratepermin", "labor_rate_per_min", "labor_rate"];
const MACHINE_RATE_COLUMNS: &[&str] = &["machineratepermin", "machine_rate_per_min", "machine_rate"];
const RATE_KEY_COLUMNS: &[&str] = &["type", "name", "rate_type"];
const RATE_VALUE_COLUMNS: &[&str] = &["value", "rate", "amount"];

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Catalog file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to open catalog {0}: {1}")]
    Io(String, std::io::Error),

    #[error("Invalid CSV in {0}: {1}")]
    Csv(String, csv::Error),

    #[error("{file}: none of the columns {expected:?} present")]
    MissingColumn { file: String, expected: Vec<String> },
}

/// One CSV row keyed by lower-cased, trimmed header.
type RawRow = HashMap<String, String>;

/// A parsed catalog file. Short rows simply lack the trailing columns.
struct CsvTable {
    path: PathBuf,
    headers: Vec<String>,
    rows: Vec<RawRow>,
}

impl CsvTable {
    fn read(path: &Path) -> Result<Self, CatalogError> {
        let display = path.display().to_string();
        if !path.exists() {
            return Err(CatalogError::FileNotFound(display));
        }
        let file = File::open(path).map_err(|e| CatalogError::Io(display.clone(), e))?;
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(file);

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| CatalogError::Csv(display.clone(), e))?
            .iter()
            .map(|h| h.trim().trim_start_matches('\u{feff}').to_lowercase())
            .collect();

        let mut rows = vec![];
        for record in reader.records() {
            let record = record.map_err(|e| CatalogError::Csv(display.clone(), e))?;
            let row: RawRow = record
                .iter()
                .enumerate()
                .filter_map(|(i, v)| headers.get(i).map(|h| (h.clone(), v.trim().to_string())))
                .collect();
            if row.values().all(|v| v.is_empty()) {
                continue;
            }
            rows.push(row);
        }
        Ok(Self {
            path: path.to_path_buf(),
            headers,
            rows,
        })
    }

    /// First synonym present in the header record.
    fn column<'a>(&self, synonyms: &[&'a str]) -> Option<&'a str> {
        synonyms
            .iter()
            .copied()
            .find(|c| self.headers.iter().any(|h| h == c))
    }

    /// Like `column`, but a header without any synonym is an error. A file
    /// with neither header nor rows yields `None`.
    fn require<'a>(&self, synonyms: &[&'a str]) -> Result<Option<&'a str>, CatalogError> {
        if self.headers.iter().all(|h| h.is_empty()) && self.rows.is_empty() {
            return Ok(None);
        }
        self.column(synonyms).map(Some).ok_or_else(|| CatalogError::MissingColumn {
            file: self.path.display().to_string(),
            expected: synonyms.iter().map(|s| s.to_string()).collect(),
        })
    }
}

fn cell<'r>(row: &'r RawRow, column: Option<&str>) -> Option<&'r str> {
    column
        .and_then(|c| row.get(c))
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}

fn cell_f64(row: &RawRow, column: Option<&str>) -> Option<f64> {
    cell(row, column)?.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn load_operation_vocabulary(path: &Path) -> Result<OperationVocabulary, CatalogError> {
    let table = CsvTable::read(path)?;
    let col = table.require(OPERATION_NAME_COLUMNS)?;
    let names: Vec<String> = table
        .rows
        .iter()
        .filter_map(|r| cell(r, col))
        .map(str::to_string)
        .collect();
    Ok(OperationVocabulary::new(names))
}

/// Setup minutes and seconds per bend from the Form row, over the defaults.
pub fn load_form_defaults(path: &Path) -> Result<FormDefaults, CatalogError> {
    let table = CsvTable::read(path)?;
    let mut defaults = FormDefaults::default();
    let name_col = table.require(OPERATION_NAME_COLUMNS)?;
    let setup_col = table.column(SETUP_COLUMNS);
    let sec_col = table.column(SEC_PER_OP_COLUMNS);
    let time_col = table.column(TIME_SEC_COLUMNS);

    let Some(form) = table
        .rows
        .iter()
        .find(|r| cell(r, name_col).map_or(false, |n| n.eq_ignore_ascii_case(FORM)))
    else {
        return Ok(defaults);
    };

    if let Some(v) = cell_f64(form, setup_col) {
        defaults.setup_min = v;
    }
    if let Some(v) = sec_per_op(form, sec_col, time_col) {
        defaults.sec_per_bend = v;
    }
    Ok(defaults)
}

/// Seconds per op from the per-op column, else a positive run-time column.
fn sec_per_op(row: &RawRow, sec_col: Option<&str>, time_col: Option<&str>) -> Option<f64> {
    if sec_col.is_some() {
        cell_f64(row, sec_col)
    } else {
        cell_f64(row, time_col).filter(|v| *v > 0.0)
    }
}

/// Default setup and run time for one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationTiming {
    pub operation: String,
    pub setup_min: f64,
    pub sec_per_op: f64,
}

/// Per-operation timings, one entry per name. Blank or junk cells read as 0.
pub fn load_operation_timings(path: &Path) -> Result<Vec<OperationTiming>, CatalogError> {
    let table = CsvTable::read(path)?;
    let name_col = table.require(OPERATION_NAME_COLUMNS)?;
    let setup_col = table.column(SETUP_COLUMNS);
    let sec_col = table.column(SEC_PER_OP_COLUMNS);
    let time_col = table.column(TIME_SEC_COLUMNS);

    let mut timings: Vec<OperationTiming> = vec![];
    for row in &table.rows {
        let Some(name) = cell(row, name_col) else { continue };
        if timings.iter().any(|t| t.operation.eq_ignore_ascii_case(name)) {
            continue;
        }
        timings.push(OperationTiming {
            operation: name.to_string(),
            setup_min: cell_f64(row, setup_col).filter(|v| *v >= 0.0).unwrap_or(0.0),
            sec_per_op: sec_per_op(row, sec_col, time_col).filter(|v| *v >= 0.0).unwrap_or(0.0),
        });
    }
    Ok(timings)
}

/// Hardware catalog sorted by part, one entry per part.
pub fn load_hardware_catalog(path: &Path) -> Result<Vec<HardwareItem>, CatalogError> {
    let table = CsvTable::read(path)?;
    let col = table.require(HARDWARE_COLUMNS)?;
    let cost_col = table.column(COST_COLUMNS);
    let mut items: Vec<HardwareItem> = vec![];
    for row in &table.rows {
        let Some(kind) = cell(row, col) else { continue };
        if items.iter().any(|h| h.kind == kind) {
            continue;
        }
        items.push(HardwareItem::new(kind, 1, cell_f64(row, cost_col).unwrap_or(0.0)));
    }
    items.sort_by(|a, b| a.kind.cmp(&b.kind));
    Ok(items)
}

pub fn load_outside_process_catalog(path: &Path) -> Result<Vec<OutsideProcessItem>, CatalogError> {
    let table = CsvTable::read(path)?;
    let col = table.require(OUTSIDE_PROCESS_COLUMNS)?;
    let cost_col = table.column(COST_COLUMNS);
    let mut items: Vec<OutsideProcessItem> = vec![];
    for row in &table.rows {
        let Some(label) = cell(row, col) else { continue };
        if items.iter().any(|p| p.label == label) {
            continue;
        }
        items.push(OutsideProcessItem::new(label, cell_f64(row, cost_col).unwrap_or(0.0)));
    }
    items.sort_by(|a, b| a.label.cmp(&b.label));
    Ok(items)
}

/// Rates from wide columns, else from `type,value` rows; gaps keep `defaults`.
pub fn load_rates(path: &Path, defaults: Rates) -> Result<Rates, CatalogError> {
    let table = CsvTable::read(path)?;
    let first_in = |synonyms: &[&str]| {
        let col = table.column(synonyms);
        table.rows.iter().find_map(|r| cell_f64(r, col))
    };
    let mut setup = first_in(SETUP_RATE_COLUMNS);
    let mut labor = first_in(LABOR_RATE_COLUMNS);
    let mut machine = first_in(MACHINE_RATE_COLUMNS);

    if setup.is_none() || labor.is_none() || machine.is_none() {
        let key_col = table.column(RATE_KEY_COLUMNS);
        let value_col = table.column(RATE_VALUE_COLUMNS);
        for row in &table.rows {
            let (Some(key), Some(value)) = (cell(row, key_col), cell_f64(row, value_col)) else {
                continue;
            };
            let key = key.to_lowercase();
            if key.contains("setup") && setup.is_none() {
                setup = Some(value);
            } else if key.contains("labor") && labor.is_none() {
                labor = Some(value);
            } else if key.contains("machine") && machine.is_none() {
                machine = Some(value);
            }
        }
    }

    Ok(Rates {
        setup: setup.unwrap_or(defaults.setup),
        labor: labor.unwrap_or(defaults.labor),
        machine: machine.unwrap_or(defaults.machine),
    })
}

/// Everything the quoting flow looks up, with defaults filled in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub operations: OperationVocabulary,
    pub form_defaults: FormDefaults,
    #[serde(default)]
    pub timings: Vec<OperationTiming>,
    pub hardware: Vec<HardwareItem>,
    pub outside_processes: Vec<OutsideProcessItem>,
    pub rates: Rates,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            operations: OperationVocabulary::default(),
            form_defaults: FormDefaults::default(),
            timings: vec![],
            hardware: vec![],
            outside_processes: vec![],
            rates: Rates::default(),
        }
    }
}

impl Catalog {
    /// Catalog timing for an operation name, ignoring case.
    pub fn timing(&self, operation: &str) -> Option<&OperationTiming> {
        self.timings
            .iter()
            .find(|t| t.operation.eq_ignore_ascii_case(operation.trim()))
    }

    /// Loads every catalog under `dir`. Missing or unreadable files keep their
    /// defaults; failures are logged, never returned.
    pub fn load(dir: &Path, default_rates: Rates) -> Self {
        let path = |name: &str| -> PathBuf { dir.join(name) };
        let mut catalog = Catalog {
            rates: default_rates,
            ..Default::default()
        };

        match load_operation_vocabulary(&path(OPERATIONS_FILE)) {
            Ok(v) => catalog.operations = v,
            Err(e) => log_fallback(&e),
        }
        match load_form_defaults(&path(OPERATIONS_FILE)) {
            Ok(f) => catalog.form_defaults = f,
            Err(e) => log_fallback(&e),
        }
        match load_operation_timings(&path(OPERATIONS_FILE)) {
            Ok(t) => catalog.timings = t,
            Err(e) => log_fallback(&e),
        }
        match load_hardware_catalog(&path(HARDWARE_FILE)) {
            Ok(h) => catalog.hardware = h,
            Err(e) => log_fallback(&e),
        }
        match load_outside_process_catalog(&path(OUTSIDE_PROCESS_FILE)) {
            Ok(p) => catalog.outside_processes = p,
            Err(e) => log_fallback(&e),
        }
        match load_rates(&path(RATES_FILE), default_rates) {
            Ok(r) => catalog.rates = r,
            Err(e) => log_fallback(&e),
        }

        tracing::info!(
            dir = %dir.display(),
            operations = catalog.operations.names().len(),
            hardware = catalog.hardware.len(),
            outside_processes = catalog.outside_processes.len(),
            "loaded catalogs"
        );
        catalog
    }
}

fn log_fallback(err: &CatalogError) {
    match err {
        CatalogError::FileNotFound(_) => tracing::debug!("{err}; using defaults"),
        _ => tracing::warn!("{err}; using defaults"),
    }
}
