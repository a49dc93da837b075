//! Pricing Engine - Tiered Cost Breakdown
//!
//! Row order is fixed: Setup, Runtime, hardware rows, outside-process rows,
//! Subtotal, Markup, Total. Per-part intermediates round to 4 places,
//! monetary outputs to 2.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::operations::OperationList;
use crate::record::QuoteRecord;

pub const DEFAULT_QUANTITIES: [u32; 4] = [1, 10, 25, 50];
pub const DEFAULT_MARKUP_PERCENT: f64 = 15.0;

/// Shop rates in currency per minute. Missing rates take the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rates {
    pub setup: f64,
    pub labor: f64,
    pub machine: f64,
}

impl Default for Rates {
    fn default() -> Self {
        Self {
            setup: 60.0,
            labor: 1.0,
            machine: 1.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowKind {
    Setup,
    Runtime,
    Hardware,
    OutsideProcess,
    Subtotal,
    Markup,
    Total,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingRow {
    pub label: String,
    pub kind: RowKind,
    pub amounts: BTreeMap<u32, f64>,
}

impl PricingRow {
    pub fn amount(&self, qty: u32) -> Option<f64> {
        self.amounts.get(&qty).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingTable {
    pub quantities: Vec<u32>,
    pub rows: Vec<PricingRow>,
}

impl PricingTable {
    pub fn get(&self, label: &str) -> Option<&PricingRow> {
        self.rows.iter().find(|r| r.label == label)
    }

    pub fn amount(&self, label: &str, qty: u32) -> Option<f64> {
        self.get(label).and_then(|r| r.amount(qty))
    }

    /// First row of the given kind (Setup, Subtotal, Markup, ...).
    pub fn row(&self, kind: RowKind) -> Option<&PricingRow> {
        self.rows.iter().find(|r| r.kind == kind)
    }

    pub fn labels(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.label.as_str()).collect()
    }
}

/// Per-part adder totals, independent of quantity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AddersBreakdown {
    pub hardware: f64,
    pub outside_process: f64,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingSummary {
    pub quantities: Vec<u32>,
    pub per_qty_subtotal: BTreeMap<u32, f64>,
    pub markup_percent: f64,
    pub per_qty_markup: BTreeMap<u32, f64>,
    pub per_qty_grand: BTreeMap<u32, f64>,
    pub adders: AddersBreakdown,
    pub diagnostics: Vec<String>,
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn money(value: f64) -> f64 {
    round_to(value, 2)
}

fn per_part(value: f64) -> f64 {
    round_to(value, 4)
}

/// `15.0` -> `"15"`, `12.5` -> `"12.5"`.
pub fn format_percent(percent: f64) -> String {
    if percent.fract() == 0.0 {
        format!("{percent:.0}")
    } else {
        let s = format!("{percent:.4}");
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// Clamps tiers to >= 1, drops repeats, and falls back to the default tiers.
pub fn normalize_quantities(quantities: &[u32]) -> Vec<u32> {
    let mut out: Vec<u32> = vec![];
    for q in quantities.iter().map(|q| (*q).max(1)) {
        if !out.contains(&q) {
            out.push(q);
        }
    }
    if out.is_empty() {
        DEFAULT_QUANTITIES.to_vec()
    } else {
        out
    }
}

fn sanitize(value: f64, what: &str, diagnostics: &mut Vec<String>) -> f64 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        diagnostics.push(format!("Invalid {what} {value}; treated as 0"));
        0.0
    }
}

struct Accumulator {
    quantities: Vec<u32>,
    rows: Vec<PricingRow>,
}

impl Accumulator {
    fn push(&mut self, label: String, kind: RowKind, amount_at: impl Fn(u32) -> f64) {
        let amounts: BTreeMap<u32, f64> =
            self.quantities.iter().map(|q| (*q, money(amount_at(*q)))).collect();
        if let Some(existing) = self.rows.iter_mut().find(|r| r.label == label) {
            for (q, v) in amounts {
                let slot = existing.amounts.entry(q).or_insert(0.0);
                *slot = money(*slot + v);
            }
            return;
        }
        self.rows.push(PricingRow { label, kind, amounts });
    }
}

/// Builds the priced breakdown for every quantity tier.
///
/// Setup is charged in full at every tier; it is not amortized.
pub fn compute_pricing_table(
    operations: &OperationList,
    quote: &QuoteRecord,
    rates: &Rates,
    quantities: &[u32],
    markup_percent: f64,
) -> (PricingTable, PricingSummary) {
    let mut diagnostics = vec![];
    let quantities = normalize_quantities(quantities);

    let setup_rate = sanitize(rates.setup, "setup rate", &mut diagnostics);
    let labor_rate = sanitize(rates.labor, "labor rate", &mut diagnostics);
    let machine_rate = sanitize(rates.machine, "machine rate", &mut diagnostics);
    let markup_percent = sanitize(markup_percent, "markup percent", &mut diagnostics);

    let mut total_setup_min = 0.0;
    let mut total_run_min = 0.0;
    for row in operations.rows() {
        total_setup_min += sanitize(row.setup_min, &format!("setup_min on op {}", row.seq), &mut diagnostics);
        total_run_min += sanitize(row.time_sec, &format!("time_sec on op {}", row.seq), &mut diagnostics) / 60.0;
    }

    let setup_ext = total_setup_min * setup_rate;
    let runtime_per_part = per_part(total_run_min * (labor_rate + machine_rate));

    let mut acc = Accumulator {
        quantities: quantities.clone(),
        rows: vec![],
    };
    acc.push("Setup".to_string(), RowKind::Setup, |_| setup_ext);
    acc.push("Runtime".to_string(), RowKind::Runtime, |q| runtime_per_part * q as f64);

    let mut adders = AddersBreakdown::default();

    for hw in quote.hardware_items() {
        if !(hw.unit_cost.is_finite() && hw.unit_cost > 0.0) {
            tracing::debug!(hardware = %hw.kind, "hardware not priced, row skipped");
            continue;
        }
        let kind = match hw.kind.trim() {
            "" => "HW",
            k => k,
        };
        let qty_per_part = hw.qty_per_part.max(1);
        let unit_per_part = per_part(qty_per_part as f64 * hw.unit_cost);
        adders.hardware += unit_per_part;
        acc.push(
            format!("HW-[{kind}({qty_per_part})]"),
            RowKind::Hardware,
            |q| unit_per_part * q as f64,
        );
    }

    for op in quote.outside_process_items() {
        if !(op.unit_cost.is_finite() && op.unit_cost > 0.0) {
            tracing::debug!(process = %op.label, "outside process not priced, row skipped");
            continue;
        }
        let label = match op.label.trim() {
            "" => "Outside Process",
            l => l,
        };
        let unit = per_part(op.unit_cost);
        adders.outside_process += unit;
        acc.push(format!("OP-[{label}]"), RowKind::OutsideProcess, |q| unit * q as f64);
    }

    adders.hardware = per_part(adders.hardware);
    adders.outside_process = per_part(adders.outside_process);
    adders.total = per_part(adders.hardware + adders.outside_process);

    let subtotal: BTreeMap<u32, f64> = quantities
        .iter()
        .map(|q| {
            let sum: f64 = acc.rows.iter().filter_map(|r| r.amount(*q)).sum();
            (*q, money(sum))
        })
        .collect();
    let markup: BTreeMap<u32, f64> = subtotal
        .iter()
        .map(|(q, s)| (*q, money(s * markup_percent / 100.0)))
        .collect();
    let grand: BTreeMap<u32, f64> = subtotal
        .iter()
        .map(|(q, s)| (*q, money(s + markup[q])))
        .collect();

    acc.push("Subtotal".to_string(), RowKind::Subtotal, |q| subtotal[&q]);
    acc.push(
        format!("Markup ({}%)", format_percent(markup_percent)),
        RowKind::Markup,
        |q| markup[&q],
    );
    acc.push("Total".to_string(), RowKind::Total, |q| grand[&q]);

    for d in &diagnostics {
        tracing::warn!("{d}");
    }

    let table = PricingTable {
        quantities: quantities.clone(),
        rows: acc.rows,
    };
    let summary = PricingSummary {
        quantities,
        per_qty_subtotal: subtotal,
        markup_percent: money(markup_percent),
        per_qty_markup: markup,
        per_qty_grand: grand,
        adders,
        diagnostics,
    };
    (table, summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::OperationRow;
    use crate::record::{HardwareItem, OutsideProcessItem};

    fn one_op() -> OperationList {
        OperationList::new(vec![OperationRow::new("Laser").with_times(2.0, 30.0)])
    }

    fn unit_rates() -> Rates {
        Rates {
            setup: 1.0,
            labor: 0.5,
            machine: 0.5,
        }
    }

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(15.0), "15");
        assert_eq!(format_percent(12.5), "12.5");
    }

    #[test]
    fn test_normalize_quantities() {
        assert_eq!(normalize_quantities(&[0, 1, 10, 10]), vec![1, 10]);
        assert_eq!(normalize_quantities(&[]), vec![1, 10, 25, 50]);
    }

    #[test]
    fn test_adders_rows_scale_with_tier() {
        let quote = QuoteRecord {
            hardware: Some(vec![
                HardwareItem::new("PEM-632", 4, 0.12),
                HardwareItem::new("Unpriced", 2, 0.0),
            ]),
            outside_processes: Some(vec![OutsideProcessItem::new("Zinc Plate", 1.25)]),
            ..Default::default()
        };
        let (table, summary) = compute_pricing_table(&one_op(), &quote, &unit_rates(), &[1, 10], 0.0);
        assert_eq!(
            table.labels(),
            vec!["Setup", "Runtime", "HW-[PEM-632(4)]", "OP-[Zinc Plate]", "Subtotal", "Markup (0%)", "Total"]
        );
        assert_eq!(table.amount("HW-[PEM-632(4)]", 10), Some(4.8));
        assert_eq!(table.amount("OP-[Zinc Plate]", 10), Some(12.5));
        assert_eq!(summary.adders.hardware, 0.48);
        assert_eq!(summary.adders.outside_process, 1.25);
        assert_eq!(summary.adders.total, 1.73);
        assert_eq!(summary.per_qty_grand[&1], 4.23);
    }

    #[test]
    fn test_duplicate_hardware_merges() {
        let quote = QuoteRecord {
            hardware: Some(vec![
                HardwareItem::new("PEM-632", 2, 0.10),
                HardwareItem::new("PEM-632", 2, 0.10),
            ]),
            ..Default::default()
        };
        let (table, _) = compute_pricing_table(&OperationList::default(), &quote, &unit_rates(), &[1], 0.0);
        assert_eq!(table.rows.iter().filter(|r| r.kind == RowKind::Hardware).count(), 1);
        assert_eq!(table.amount("HW-[PEM-632(2)]", 1), Some(0.4));
    }

    #[test]
    fn test_negative_rate_is_zero_with_diagnostic() {
        let rates = Rates {
            setup: -5.0,
            labor: f64::NAN,
            machine: 1.0,
        };
        let (table, summary) =
            compute_pricing_table(&one_op(), &QuoteRecord::default(), &rates, &[1], 15.0);
        assert_eq!(table.amount("Setup", 1), Some(0.0));
        assert_eq!(table.amount("Runtime", 1), Some(0.5));
        assert_eq!(summary.diagnostics.len(), 2);
    }

    #[test]
    fn test_empty_operations_price_to_zero() {
        let (table, summary) = compute_pricing_table(
            &OperationList::default(),
            &QuoteRecord::default(),
            &Rates::default(),
            &[],
            DEFAULT_MARKUP_PERCENT,
        );
        assert_eq!(table.quantities, vec![1, 10, 25, 50]);
        assert_eq!(table.row(RowKind::Markup).map(|r| r.label.as_str()), Some("Markup (15%)"));
        assert!(summary.per_qty_grand.values().all(|v| *v == 0.0));
    }
}
