//! Operation List - Routing Rows, Editing, Generation
//!
//! Every structural change renumbers `seq` to 1..=n. Edits that would break
//! structural integrity return `StructuralError` and leave the list untouched.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

use crate::record::HardwareItem;
use crate::tables::{RuleTables, SequenceTemplate};

pub const PLAN: &str = "Plan";
pub const FINAL_INSPECTION: &str = "Final Insp.";
pub const PACKAGE: &str = "Package";
pub const FORM: &str = "Form";
pub const LASER: &str = "Laser";
pub const HARDWARE_INSTALL: &str = "Hardware Install";

/// Always present; Final Insp. and Package close every routing.
pub const MANDATORY_OPERATIONS: [&str; 3] = [PLAN, FINAL_INSPECTION, PACKAGE];

pub const DEFAULT_OPERATION_NAMES: [&str; 12] = [
    "Plan",
    "Laser",
    "Form",
    "Deburr",
    "Weld",
    "Tapping",
    "Hardware Install",
    "Mill",
    "Lathe",
    "Outside Process",
    "Final Insp.",
    "Package",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    #[error("Cannot delete mandatory operation: {0}")]
    MandatoryOperation(String),

    #[error("Duplicate operation: {0}")]
    DuplicateOperation(String),

    #[error("Invalid operation: {0}")]
    UnknownOperation(String),

    #[error("No operation with sequence number {0}")]
    SequenceNotFound(u32),

    #[error("Missing mandatory operation: {0}")]
    MissingMandatory(String),

    #[error("Routing must end with Final Insp. then Package: {0}")]
    TerminalOrder(String),

    #[error("At least one operation is required")]
    Empty,
}

fn default_ops() -> u32 { 1 }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRow {
    #[serde(default)]
    pub seq: u32,
    pub operation: String,
    #[serde(default)]
    pub setup_min: f64,
    #[serde(default = "default_ops")]
    pub ops: u32,
    #[serde(default)]
    pub time_sec: f64,
    #[serde(default)]
    pub cost_per_part: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op_detail: Option<String>,
}

impl OperationRow {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            seq: 0,
            operation: operation.into(),
            setup_min: 0.0,
            ops: 1,
            time_sec: 0.0,
            cost_per_part: 0.0,
            op_detail: None,
        }
    }

    pub fn blank() -> Self {
        Self::new("")
    }

    pub fn with_times(mut self, setup_min: f64, time_sec: f64) -> Self {
        self.setup_min = setup_min;
        self.time_sec = time_sec;
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.op_detail = Some(detail.into());
        self
    }

    pub fn name(&self) -> &str {
        self.operation.trim()
    }

    pub fn is_install(&self) -> bool {
        is_install(&self.operation)
    }

    pub fn is_outside_process(&self) -> bool {
        is_outside_process(&self.operation)
    }

    pub fn is_mandatory(&self) -> bool {
        is_mandatory(&self.operation)
    }

    /// Row-level problems a user must fix before the row can be priced.
    pub fn issues(&self) -> Vec<String> {
        let mut issues = vec![];
        if self.name().is_empty() {
            issues.push("Operation name is required.".to_string());
        }
        if !self.setup_min.is_finite() || self.setup_min < 0.0 {
            issues.push("Setup [min] must be a non-negative number.".to_string());
        }
        if self.ops == 0 {
            issues.push("# of Ops must be at least 1.".to_string());
        }
        if !self.time_sec.is_finite() || self.time_sec < 0.0 {
            issues.push("Time [sec] must be a non-negative number.".to_string());
        }
        let missing_detail = self.op_detail.as_deref().map_or(true, |d| d.trim().is_empty());
        if self.is_install() && missing_detail {
            issues.push("Select a Hardware Item for Install operation.".to_string());
        }
        if self.is_outside_process() && missing_detail {
            issues.push("Select an Outside Process for this operation.".to_string());
        }
        issues
    }
}

pub fn is_install(name: &str) -> bool {
    name.to_lowercase().contains("install")
}

pub fn is_outside_process(name: &str) -> bool {
    let n = name.to_lowercase();
    n.contains("outside") && n.contains("process")
}

pub fn is_mandatory(name: &str) -> bool {
    MANDATORY_OPERATIONS
        .iter()
        .any(|m| m.eq_ignore_ascii_case(name.trim()))
}

/// Whether a routing row counts as the rule-table operation `rule_op`.
///
/// Exact names match case-insensitively; longer names match on a whole word,
/// so "Hardware Install" satisfies rules about "Install".
pub fn operation_matches(row_name: &str, rule_op: &str) -> bool {
    let row_name = row_name.trim();
    row_name.eq_ignore_ascii_case(rule_op)
        || row_name
            .split(|c: char| c.is_whitespace() || c == '-' || c == '/')
            .any(|word| word.eq_ignore_ascii_case(rule_op))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    End,
    /// Just above Final Insp. (or at the end when there is none)
    BeforeFinal,
    Above(u32),
    Below(u32),
}

/// Field changes for `OperationList::update`. `None` leaves a field alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationUpdate {
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub setup_min: Option<f64>,
    #[serde(default)]
    pub ops: Option<u32>,
    #[serde(default)]
    pub time_sec: Option<f64>,
    #[serde(default)]
    pub cost_per_part: Option<f64>,
    #[serde(default)]
    pub op_detail: Option<String>,
}

/// Known operation names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationVocabulary {
    names: Vec<String>,
}

impl OperationVocabulary {
    /// Deduplicates preserving order; an empty list falls back to the defaults.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let names: Vec<String> = names
            .into_iter()
            .map(Into::into)
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .filter(|n| seen.insert(n.clone()))
            .collect();
        if names.is_empty() {
            Self::default()
        } else {
            Self { names }
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Canonical spelling for `name`: exact, then case-insensitive, then the
    /// first entry containing it.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        let wanted = name.trim();
        if wanted.is_empty() {
            return None;
        }
        let lower = wanted.to_lowercase();
        self.names
            .iter()
            .find(|n| n.as_str() == wanted)
            .or_else(|| self.names.iter().find(|n| n.eq_ignore_ascii_case(wanted)))
            .or_else(|| self.names.iter().find(|n| n.to_lowercase().contains(&lower)))
            .map(String::as_str)
    }
}

impl Default for OperationVocabulary {
    fn default() -> Self {
        Self {
            names: DEFAULT_OPERATION_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Setup and per-bend time for a generated Form row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FormDefaults {
    pub setup_min: f64,
    pub sec_per_bend: f64,
}

impl Default for FormDefaults {
    fn default() -> Self {
        Self {
            setup_min: 2.0,
            sec_per_bend: 10.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationList {
    rows: Vec<OperationRow>,
}

impl OperationList {
    pub fn new(rows: Vec<OperationRow>) -> Self {
        let mut list = Self { rows };
        list.renumber();
        list
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(names.into_iter().map(OperationRow::new).collect())
    }

    pub fn from_template(tables: &RuleTables, template: SequenceTemplate) -> Self {
        Self::from_names(tables.sequence(template).iter().cloned())
    }

    pub fn rows(&self) -> &[OperationRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.rows.iter().map(OperationRow::name).collect()
    }

    pub fn get(&self, seq: u32) -> Option<&OperationRow> {
        self.index_of(seq).map(|i| &self.rows[i])
    }

    /// Index of the first row satisfying the rule-table operation `op`.
    pub fn position_of(&self, op: &str) -> Option<usize> {
        self.rows.iter().position(|r| operation_matches(&r.operation, op))
    }

    pub fn contains(&self, op: &str) -> bool {
        self.position_of(op).is_some()
    }

    fn index_of(&self, seq: u32) -> Option<usize> {
        self.rows.iter().position(|r| r.seq == seq)
    }

    fn renumber(&mut self) {
        for (i, row) in self.rows.iter_mut().enumerate() {
            row.seq = i as u32 + 1;
        }
    }

    fn has_name(&self, name: &str, skip: Option<usize>) -> bool {
        self.rows
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != skip)
            .any(|(_, r)| !name.is_empty() && r.name().eq_ignore_ascii_case(name))
    }

    /// Whether the routing closes with Final Insp. then Package.
    pub fn has_terminal_pair(&self) -> bool {
        let n = self.rows.len();
        n >= 2
            && self.rows[n - 2].name().eq_ignore_ascii_case(FINAL_INSPECTION)
            && self.rows[n - 1].name().eq_ignore_ascii_case(PACKAGE)
    }

    /// Applies `edit` to a copy and commits only if the terminal pair survives.
    fn commit<F>(&mut self, edit: F) -> Result<(), StructuralError>
    where
        F: FnOnce(&mut Vec<OperationRow>) -> Result<(), StructuralError>,
    {
        let had_terminal = self.has_terminal_pair();
        let mut next = OperationList { rows: self.rows.clone() };
        edit(&mut next.rows)?;
        next.renumber();
        if had_terminal && !next.has_terminal_pair() {
            let tail = next
                .rows
                .last()
                .map(|r| r.name().to_string())
                .unwrap_or_default();
            return Err(StructuralError::TerminalOrder(format!("routing would end with {tail}")));
        }
        *self = next;
        Ok(())
    }

    /// Inserts `row` and returns its sequence number.
    ///
    /// The name resolves through `vocabulary`; a blank row is allowed and
    /// named later through `update`.
    pub fn insert(
        &mut self,
        position: InsertPosition,
        mut row: OperationRow,
        vocabulary: &OperationVocabulary,
    ) -> Result<u32, StructuralError> {
        if !row.name().is_empty() {
            let canonical = vocabulary
                .resolve(row.name())
                .ok_or_else(|| StructuralError::UnknownOperation(row.name().to_string()))?;
            row.operation = canonical.to_string();
        }
        self.insert_row(position, row)
    }

    fn insert_row(&mut self, position: InsertPosition, row: OperationRow) -> Result<u32, StructuralError> {
        if self.has_name(row.name(), None) {
            return Err(StructuralError::DuplicateOperation(row.name().to_string()));
        }
        let at = match position {
            InsertPosition::End => self.rows.len(),
            InsertPosition::BeforeFinal => self
                .rows
                .iter()
                .position(|r| r.name().eq_ignore_ascii_case(FINAL_INSPECTION))
                .unwrap_or(self.rows.len()),
            InsertPosition::Above(seq) => {
                self.index_of(seq).ok_or(StructuralError::SequenceNotFound(seq))?
            }
            InsertPosition::Below(seq) => {
                self.index_of(seq).ok_or(StructuralError::SequenceNotFound(seq))? + 1
            }
        };
        self.commit(|rows| {
            rows.insert(at, row);
            Ok(())
        })?;
        Ok(at as u32 + 1)
    }

    /// Removes the row at `seq`. Mandatory rows cannot be deleted.
    pub fn delete(&mut self, seq: u32) -> Result<OperationRow, StructuralError> {
        let idx = self.index_of(seq).ok_or(StructuralError::SequenceNotFound(seq))?;
        if self.rows[idx].is_mandatory() {
            return Err(StructuralError::MandatoryOperation(self.rows[idx].operation.clone()));
        }
        let removed = self.rows.remove(idx);
        self.renumber();
        tracing::debug!(seq, operation = %removed.operation, "deleted operation");
        Ok(removed)
    }

    /// Applies field changes to the row at `seq`.
    ///
    /// Names resolve through `vocabulary`. Numeric fields clamp to their
    /// valid range; non-finite values become zero.
    pub fn update(
        &mut self,
        seq: u32,
        update: OperationUpdate,
        vocabulary: &OperationVocabulary,
    ) -> Result<(), StructuralError> {
        let idx = self.index_of(seq).ok_or(StructuralError::SequenceNotFound(seq))?;

        let new_name = match update.operation.as_deref().map(str::trim) {
            None => None,
            Some("") => Some(String::new()),
            Some(name) => {
                let canonical = vocabulary
                    .resolve(name)
                    .ok_or_else(|| StructuralError::UnknownOperation(name.to_string()))?;
                Some(canonical.to_string())
            }
        };

        if let Some(name) = &new_name {
            let current = &self.rows[idx];
            if current.is_mandatory() && !current.name().eq_ignore_ascii_case(name) {
                return Err(StructuralError::MandatoryOperation(current.operation.clone()));
            }
            if self.has_name(name, Some(idx)) {
                return Err(StructuralError::DuplicateOperation(name.clone()));
            }
        }

        let row = &mut self.rows[idx];
        if let Some(name) = new_name {
            row.operation = name;
        }
        if let Some(v) = update.setup_min {
            row.setup_min = non_negative(v);
        }
        if let Some(v) = update.ops {
            row.ops = v.max(1);
        }
        if let Some(v) = update.time_sec {
            row.time_sec = non_negative(v);
        }
        if let Some(v) = update.cost_per_part {
            row.cost_per_part = non_negative(v);
        }
        if let Some(detail) = update.op_detail {
            let detail = detail.trim();
            row.op_detail = (!detail.is_empty()).then(|| detail.to_string());
        }
        Ok(())
    }

    /// Swaps the row at `seq` with its neighbour `delta` places away.
    /// Moving past either end is a no-op.
    pub fn move_row(&mut self, seq: u32, delta: i32) -> Result<(), StructuralError> {
        let idx = self.index_of(seq).ok_or(StructuralError::SequenceNotFound(seq))?;
        let target = idx as i64 + delta as i64;
        if target < 0 || target >= self.rows.len() as i64 {
            return Ok(());
        }
        let target = target as usize;
        self.commit(|rows| {
            rows.swap(idx, target);
            Ok(())
        })
    }

    /// Moves the row at `from_seq` to just before the row at `to_seq`.
    pub fn reorder(&mut self, from_seq: u32, to_seq: u32) -> Result<(), StructuralError> {
        if from_seq == to_seq {
            return Ok(());
        }
        let from = self.index_of(from_seq).ok_or(StructuralError::SequenceNotFound(from_seq))?;
        let to = self.index_of(to_seq).ok_or(StructuralError::SequenceNotFound(to_seq))?;
        self.commit(|rows| {
            let row = rows.remove(from);
            let at = if to < from { to } else { to - 1 };
            rows.insert(at, row);
            Ok(())
        })
    }

    /// Every structural and numeric problem, as display messages.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = vec![];
        if self.rows.is_empty() {
            errors.push(StructuralError::Empty.to_string());
            return errors;
        }

        for mandatory in MANDATORY_OPERATIONS {
            if !self.rows.iter().any(|r| r.name().eq_ignore_ascii_case(mandatory)) {
                errors.push(StructuralError::MissingMandatory(mandatory.to_string()).to_string());
            }
        }

        if self.rows.len() >= 2 {
            let n = self.rows.len();
            if !self.rows[n - 2].name().eq_ignore_ascii_case(FINAL_INSPECTION) {
                errors.push("Final Insp. must be second-to-last operation".to_string());
            }
            if !self.rows[n - 1].name().eq_ignore_ascii_case(PACKAGE) {
                errors.push("Package must be the last operation".to_string());
            }
        }

        let mut seen = HashSet::new();
        for row in &self.rows {
            let key = row.name().to_lowercase();
            if !key.is_empty() && !seen.insert(key) {
                errors.push(StructuralError::DuplicateOperation(row.name().to_string()).to_string());
            }
        }

        for row in &self.rows {
            if row.setup_min < 0.0 {
                errors.push(format!("Operation {}: Setup time cannot be negative", row.seq));
            }
            if row.ops == 0 {
                errors.push(format!("Operation {}: Number of ops must be positive", row.seq));
            }
            if row.time_sec < 0.0 {
                errors.push(format!("Operation {}: Time cannot be negative", row.seq));
            }
        }
        errors
    }

    /// First structural failure, if any. Used when an edit session closes.
    pub fn check_integrity(&self) -> Result<(), StructuralError> {
        if self.rows.is_empty() {
            return Err(StructuralError::Empty);
        }
        for mandatory in MANDATORY_OPERATIONS {
            if !self.rows.iter().any(|r| r.name().eq_ignore_ascii_case(mandatory)) {
                return Err(StructuralError::MissingMandatory(mandatory.to_string()));
            }
        }
        if !self.has_terminal_pair() {
            let tail = self.names().into_iter().rev().take(2).collect::<Vec<_>>();
            return Err(StructuralError::TerminalOrder(format!("found {tail:?} at the end")));
        }
        let mut seen = HashSet::new();
        for row in &self.rows {
            let key = row.name().to_lowercase();
            if !key.is_empty() && !seen.insert(key) {
                return Err(StructuralError::DuplicateOperation(row.name().to_string()));
            }
        }
        Ok(())
    }

    /// Row-level issues keyed by sequence number; rows without issues omitted.
    pub fn row_issues(&self) -> BTreeMap<u32, Vec<String>> {
        self.rows
            .iter()
            .filter_map(|r| {
                let issues = r.issues();
                (!issues.is_empty()).then_some((r.seq, issues))
            })
            .collect()
    }

    /// Makes sure a Form row exists with one op per bend.
    ///
    /// A new Form row goes after Laser, else after Plan, else before the
    /// terminal pair. Zero bends leaves the list alone.
    pub fn ensure_form_with_bends(&mut self, bends: u32, defaults: FormDefaults) {
        if bends == 0 {
            return;
        }
        let time_sec = (defaults.sec_per_bend * bends as f64).round().max(0.0);

        if let Some(idx) = self.rows.iter().position(|r| r.name().eq_ignore_ascii_case(FORM)) {
            let row = &mut self.rows[idx];
            row.ops = bends;
            row.time_sec = time_sec;
            return;
        }

        let at = self
            .rows
            .iter()
            .position(|r| r.name().eq_ignore_ascii_case(LASER))
            .or_else(|| self.rows.iter().position(|r| r.name().eq_ignore_ascii_case(PLAN)))
            .map(|i| i + 1)
            .unwrap_or_else(|| {
                if self.has_terminal_pair() {
                    self.rows.len() - 2
                } else {
                    self.rows.len()
                }
            });

        let mut row = OperationRow::new(FORM).with_times(defaults.setup_min, time_sec);
        row.ops = bends;
        self.rows.insert(at, row);
        self.renumber();
        tracing::debug!(bends, seq = at + 1, "inserted Form operation");
    }

    /// Adds a single Hardware Install row covering every priced hardware item.
    ///
    /// Returns the sequence number of the install row, if one was added or
    /// updated.
    pub fn ensure_hardware_install(&mut self, hardware: &[HardwareItem]) -> Result<Option<u32>, StructuralError> {
        let mut kinds: Vec<&str> = vec![];
        for hw in hardware {
            let kind = hw.kind.trim();
            if !kind.is_empty() && !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        if kinds.is_empty() {
            return Ok(None);
        }
        let detail = kinds.join(", ");
        let total_qty: u32 = hardware.iter().map(|h| h.qty_per_part.max(1)).sum();

        if let Some(idx) = self.rows.iter().position(|r| r.is_install()) {
            let row = &mut self.rows[idx];
            row.op_detail = Some(detail);
            row.ops = total_qty;
            return Ok(Some(row.seq));
        }

        let mut row = OperationRow::new(HARDWARE_INSTALL).with_detail(detail);
        row.ops = total_qty;
        self.insert_row(InsertPosition::BeforeFinal, row).map(Some)
    }

    /// Times untimed rows (zero setup and zero run time) from `lookup`, which
    /// maps a name to `(setup_min, sec_per_op)`. Returns the rows changed.
    pub fn fill_missing_times<F>(&mut self, lookup: F) -> usize
    where
        F: Fn(&str) -> Option<(f64, f64)>,
    {
        let mut changed = 0;
        for row in self.rows.iter_mut() {
            if fill_times(row, &lookup) {
                changed += 1;
            }
        }
        changed
    }

    /// Same as `fill_missing_times` for the one row at `seq`.
    pub fn fill_row_times<F>(&mut self, seq: u32, lookup: F) -> bool
    where
        F: Fn(&str) -> Option<(f64, f64)>,
    {
        match self.index_of(seq) {
            Some(idx) => fill_times(&mut self.rows[idx], &lookup),
            None => false,
        }
    }
}

fn fill_times<F>(row: &mut OperationRow, lookup: &F) -> bool
where
    F: Fn(&str) -> Option<(f64, f64)>,
{
    if row.setup_min != 0.0 || row.time_sec != 0.0 || row.name().is_empty() {
        return false;
    }
    let Some((setup_min, sec_per_op)) = lookup(row.name()) else {
        return false;
    };
    row.setup_min = non_negative(setup_min);
    row.time_sec = (non_negative(sec_per_op) * row.ops.max(1) as f64).round();
    row.setup_min != 0.0 || row.time_sec != 0.0
}

fn non_negative(v: f64) -> f64 {
    if v.is_finite() { v.max(0.0) } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standard() -> OperationList {
        OperationList::from_template(RuleTables::builtin(), SequenceTemplate::Standard)
    }

    #[test]
    fn test_rows_are_numbered_from_one() {
        let list = OperationList::from_names(["Plan", "Laser", "Final Insp.", "Package"]);
        let seqs: Vec<u32> = list.rows().iter().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_insert_before_final_keeps_terminal_pair() {
        let mut list = standard();
        let seq = list
            .insert(InsertPosition::BeforeFinal, OperationRow::new("Tapping"), &OperationVocabulary::default())
            .unwrap();
        assert_eq!(seq, 6);
        assert!(list.has_terminal_pair());
        assert_eq!(list.get(6).unwrap().operation, "Tapping");
    }

    #[test]
    fn test_insert_after_package_is_rejected() {
        let mut list = standard();
        let before = list.clone();
        let err = list
            .insert(InsertPosition::End, OperationRow::new("Tapping"), &OperationVocabulary::default())
            .unwrap_err();
        assert!(matches!(err, StructuralError::TerminalOrder(_)));
        assert_eq!(list, before);
    }

    #[test]
    fn test_insert_duplicate_is_rejected() {
        let mut list = standard();
        let err = list
            .insert(InsertPosition::Above(2), OperationRow::new("laser"), &OperationVocabulary::default())
            .unwrap_err();
        assert_eq!(err, StructuralError::DuplicateOperation("Laser".into()));
    }

    #[test]
    fn test_templates_use_vocabulary_names() {
        let vocab = OperationVocabulary::default();
        for template in [SequenceTemplate::Standard, SequenceTemplate::Simple, SequenceTemplate::Complex] {
            for name in RuleTables::builtin().sequence(template) {
                assert_eq!(vocab.resolve(name), Some(name.as_str()), "{template:?}");
            }
        }
    }

    #[test]
    fn test_insert_unknown_name_is_rejected() {
        let mut list = OperationList::from_names(["Plan", "Laser", "Final Insp.", "Package"]);
        let before = list.clone();
        let err = list
            .insert(InsertPosition::BeforeFinal, OperationRow::new("Teleport"), &OperationVocabulary::default())
            .unwrap_err();
        assert_eq!(err, StructuralError::UnknownOperation("Teleport".into()));
        assert_eq!(list, before);

        let seq = list
            .insert(InsertPosition::BeforeFinal, OperationRow::new("deburr"), &OperationVocabulary::default())
            .unwrap();
        assert_eq!(list.get(seq).unwrap().operation, "Deburr");
    }

    #[test]
    fn test_update_resolves_partial_name() {
        let mut list = OperationList::from_names(["Plan", "", "Final Insp.", "Package"]);
        let update = OperationUpdate {
            operation: Some("tap".into()),
            setup_min: Some(-3.0),
            ops: Some(0),
            time_sec: Some(f64::NAN),
            ..Default::default()
        };
        list.update(2, update, &OperationVocabulary::default()).unwrap();
        let row = list.get(2).unwrap();
        assert_eq!(row.operation, "Tapping");
        assert_eq!(row.setup_min, 0.0);
        assert_eq!(row.ops, 1);
        assert_eq!(row.time_sec, 0.0);
    }

    #[test]
    fn test_blank_row_then_named() {
        let mut list = standard();
        let seq = list
            .insert(InsertPosition::BeforeFinal, OperationRow::blank(), &OperationVocabulary::default())
            .unwrap();
        assert_eq!(list.row_issues()[&seq], vec!["Operation name is required.".to_string()]);
        let update = OperationUpdate {
            operation: Some("weld".into()),
            ..Default::default()
        };
        list.update(seq, update, &OperationVocabulary::default()).unwrap();
        assert_eq!(list.get(seq).unwrap().operation, "Weld");
    }

    #[test]
    fn test_update_unknown_name_is_rejected() {
        let mut list = standard();
        let update = OperationUpdate {
            operation: Some("Teleport".into()),
            ..Default::default()
        };
        let err = list.update(2, update, &OperationVocabulary::default()).unwrap_err();
        assert_eq!(err, StructuralError::UnknownOperation("Teleport".into()));
    }

    #[test]
    fn test_update_cannot_rename_mandatory() {
        let mut list = standard();
        let update = OperationUpdate {
            operation: Some("Laser".into()),
            ..Default::default()
        };
        let err = list.update(1, update, &OperationVocabulary::default()).unwrap_err();
        assert_eq!(err, StructuralError::MandatoryOperation("Plan".into()));
    }

    #[test]
    fn test_move_row_past_end_is_noop() {
        let mut list = standard();
        let before = list.clone();
        list.move_row(1, -1).unwrap();
        assert_eq!(list, before);
        list.move_row(2, 1).unwrap();
        assert_eq!(list.names()[1..3], ["Form", "Laser"]);
    }

    #[test]
    fn test_reorder_moves_before_target() {
        let mut list = standard();
        // Deburr (4) before Laser (2)
        list.reorder(4, 2).unwrap();
        assert_eq!(
            list.names(),
            vec!["Plan", "Deburr", "Laser", "Form", "Hardware Install", "Final Insp.", "Package"]
        );
        let err = list.reorder(7, 1).unwrap_err();
        assert!(matches!(err, StructuralError::TerminalOrder(_)));
    }

    #[test]
    fn test_validate_reports_structure() {
        let list = OperationList::from_names(["Laser", "Laser", "Package", "Final Insp."]);
        let errors = list.validate();
        assert!(errors.contains(&"Missing mandatory operation: Plan".to_string()));
        assert!(errors.contains(&"Final Insp. must be second-to-last operation".to_string()));
        assert!(errors.contains(&"Package must be the last operation".to_string()));
        assert!(errors.contains(&"Duplicate operation: Laser".to_string()));
        assert_eq!(
            list.check_integrity(),
            Err(StructuralError::MissingMandatory("Plan".into()))
        );
        assert!(standard().check_integrity().is_ok());
    }

    #[test]
    fn test_row_issues_require_detail() {
        let list = OperationList::new(vec![
            OperationRow::new("Plan"),
            OperationRow::new("Hardware Install"),
            OperationRow::new("Outside Process").with_detail("Zinc Plate"),
        ]);
        let issues = list.row_issues();
        assert_eq!(issues.len(), 1);
        assert_eq!(
            issues[&2],
            vec!["Select a Hardware Item for Install operation.".to_string()]
        );
    }

    #[test]
    fn test_ensure_form_inserts_after_laser() {
        let mut list = OperationList::from_names(["Plan", "Laser", "Final Insp.", "Package"]);
        list.ensure_form_with_bends(4, FormDefaults::default());
        let form = list.get(3).unwrap();
        assert_eq!(form.operation, "Form");
        assert_eq!(form.ops, 4);
        assert_eq!(form.time_sec, 40.0);
        assert_eq!(form.setup_min, 2.0);

        list.ensure_form_with_bends(2, FormDefaults::default());
        assert_eq!(list.len(), 5);
        assert_eq!(list.get(3).unwrap().ops, 2);
    }

    #[test]
    fn test_ensure_hardware_install_adds_one_row() {
        let mut list = OperationList::from_names(["Plan", "Laser", "Final Insp.", "Package"]);
        let hw = vec![
            HardwareItem::new("PEM-632", 4, 0.12),
            HardwareItem::new("CLS-440", 2, 0.09),
        ];
        let seq = list.ensure_hardware_install(&hw).unwrap();
        assert_eq!(seq, Some(3));
        let row = list.get(3).unwrap();
        assert_eq!(row.op_detail.as_deref(), Some("PEM-632, CLS-440"));
        assert_eq!(row.ops, 6);
        assert!(row.issues().is_empty());
    }

    #[test]
    fn test_fill_missing_times_skips_timed_rows() {
        let mut list = OperationList::new(vec![
            OperationRow::new("Plan"),
            OperationRow::new("Laser").with_times(9.0, 99.0),
            OperationRow::new("Deburr"),
            OperationRow::new("Final Insp."),
            OperationRow::new("Package"),
        ]);
        let lookup = |name: &str| match name {
            "Laser" => Some((5.0, 45.0)),
            "Deburr" => Some((1.0, 20.0)),
            "Package" => Some((1.0, 15.0)),
            _ => None,
        };
        assert_eq!(list.fill_missing_times(lookup), 2);
        assert_eq!(list.get(2).unwrap().time_sec, 99.0);
        assert_eq!(list.get(3).unwrap().setup_min, 1.0);
        assert_eq!(list.get(3).unwrap().time_sec, 20.0);
        assert_eq!(list.get(4).unwrap().time_sec, 0.0);
    }

    #[test]
    fn test_fill_row_times_scales_by_ops() {
        let mut list = OperationList::from_names(["Plan", "Final Insp.", "Package"]);
        let seq = list
            .ensure_hardware_install(&[HardwareItem::new("PEM-632", 4, 0.12)])
            .unwrap()
            .unwrap();
        assert!(list.fill_row_times(seq, |_| Some((3.0, 8.0))));
        let row = list.get(seq).unwrap();
        assert_eq!((row.setup_min, row.time_sec), (3.0, 32.0));
        assert!(!list.fill_row_times(seq, |_| Some((3.0, 8.0))));
    }

    #[test]
    fn test_operation_matches_whole_words() {
        assert!(operation_matches("Hardware Install", "Install"));
        assert!(operation_matches("laser", "Laser"));
        assert!(!operation_matches("Lasering", "Laser"));
    }

    #[test]
    fn test_vocabulary_dedupes_and_falls_back() {
        let vocab = OperationVocabulary::new(["Plan", "Plan", " Laser "]);
        assert_eq!(vocab.names(), &["Plan".to_string(), "Laser".to_string()]);
        let empty = OperationVocabulary::new(Vec::<String>::new());
        assert_eq!(empty.names().len(), DEFAULT_OPERATION_NAMES.len());
    }
}
