//! Quote Pipeline - Single Entry Point
//!
//! Resolution, then rules, then pricing. `quote` always evaluates the rules
//! before pricing; there is no path that prices an unevaluated record.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::config::QuoteConfig;
use crate::estimator::record_weight_lb;
use crate::hashing::{compute_input_hash, compute_quote_hash};
use crate::operations::{OperationList, StructuralError, MANDATORY_OPERATIONS};
use crate::pricing::{compute_pricing_table, PricingSummary, PricingTable};
use crate::record::{next_quote_number, QuoteRecord};
use crate::resolution::{resolve_detailed, CandidateField, ResolutionReport};
use crate::rules::{RuleEvaluation, RulesEngine};
use crate::tables::{RuleTables, SequenceTemplate, TableError};
use crate::ENGINE_VERSION;

#[cfg(feature = "test-hooks")]
use std::sync::atomic::{AtomicU32, Ordering};

#[cfg(feature = "test-hooks")]
static EVALUATION_CALL_COUNT: AtomicU32 = AtomicU32::new(0);

#[cfg(feature = "test-hooks")]
pub(crate) fn record_evaluation() {
    EVALUATION_CALL_COUNT.fetch_add(1, Ordering::SeqCst);
}

#[cfg(feature = "test-hooks")]
pub fn get_evaluation_call_count() -> u32 {
    EVALUATION_CALL_COUNT.load(Ordering::SeqCst)
}

#[cfg(feature = "test-hooks")]
pub fn reset_evaluation_call_count() {
    EVALUATION_CALL_COUNT.store(0, Ordering::SeqCst);
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Rule tables: {0}")]
    Tables(#[from] TableError),

    #[error("Operation list rejected: {0}")]
    Structural(#[from] StructuralError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub candidates: Vec<CandidateField>,
    /// Operator-edited routing. Takes precedence over `template`.
    #[serde(default)]
    pub operations: Option<OperationList>,
    #[serde(default)]
    pub template: Option<SequenceTemplate>,
    /// Quote numbers already issued, for serial allocation.
    #[serde(default)]
    pub issued_quote_numbers: Vec<String>,
    #[serde(default)]
    pub quote_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricedQuote {
    pub id: String,
    pub quote_number: String,
    pub engine_version: String,
    pub tables_version: String,
    pub created_at: DateTime<Utc>,
    /// Resolved record with the final routing attached.
    pub record: QuoteRecord,
    pub resolution: ResolutionReport,
    pub evaluation: RuleEvaluation,
    pub pricing: PricingTable,
    pub summary: PricingSummary,
    pub weight_lb: Option<f64>,
    pub input_hash: String,
    pub quote_hash: String,
}

pub struct QuotePipeline {
    tables: Arc<RuleTables>,
    catalog: Catalog,
    config: QuoteConfig,
}

impl QuotePipeline {
    pub fn new(tables: Arc<RuleTables>, catalog: Catalog, config: QuoteConfig) -> Self {
        Self {
            tables,
            catalog,
            config,
        }
    }

    /// Loads tables (override file or embedded) and catalogs named by `config`.
    pub fn from_config(config: QuoteConfig) -> Result<Self, PipelineError> {
        let tables = match &config.rules_path {
            Some(path) => RuleTables::load_from_path(path)?,
            None => RuleTables::builtin().clone(),
        };
        let catalog = Catalog::load(&config.data_dir, config.rates);
        Ok(Self::new(Arc::new(tables), catalog, config))
    }

    pub fn tables(&self) -> &RuleTables {
        &self.tables
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &QuoteConfig {
        &self.config
    }

    pub fn resolve(&self, candidates: &[CandidateField]) -> ResolutionReport {
        resolve_detailed(candidates, self.config.threshold)
    }

    pub fn evaluate(&self, record: &QuoteRecord, operations: &OperationList) -> RuleEvaluation {
        RulesEngine::new(&self.tables).evaluate(record, operations)
    }

    pub fn price(&self, operations: &OperationList, record: &QuoteRecord) -> (PricingTable, PricingSummary) {
        compute_pricing_table(
            operations,
            record,
            &self.catalog.rates,
            &self.config.quantities,
            self.config.markup_percent,
        )
    }

    /// Starting routing plus the generated Form and Hardware Install rows.
    ///
    /// Generated rows take their times from the catalog. An operator-edited
    /// routing keeps its times as given.
    pub fn prepare_operations(
        &self,
        record: &QuoteRecord,
        request: &QuoteRequest,
    ) -> Result<OperationList, PipelineError> {
        let timing = |name: &str| self.catalog.timing(name).map(|t| (t.setup_min, t.sec_per_op));
        let mut operations = match (&request.operations, request.template) {
            (Some(ops), _) if !ops.is_empty() => ops.clone(),
            (_, Some(template)) => {
                let mut ops = OperationList::from_template(&self.tables, template);
                ops.fill_missing_times(timing);
                ops
            }
            _ => {
                let mut ops = OperationList::from_names(MANDATORY_OPERATIONS);
                ops.fill_missing_times(timing);
                ops
            }
        };
        operations.check_integrity()?;

        if let Some(bends) = record.bend_count {
            operations.ensure_form_with_bends(bends, self.catalog.form_defaults);
        }
        if let Some(seq) = operations.ensure_hardware_install(record.hardware_items())? {
            operations.fill_row_times(seq, timing);
        }
        Ok(operations)
    }

    /// Fills zero unit costs from the catalogs, matching by name.
    fn apply_catalog_costs(&self, record: &mut QuoteRecord) {
        if let Some(items) = record.hardware.as_mut() {
            for item in items.iter_mut().filter(|h| h.unit_cost == 0.0) {
                if let Some(entry) = self
                    .catalog
                    .hardware
                    .iter()
                    .find(|c| c.kind.eq_ignore_ascii_case(&item.kind) && c.unit_cost > 0.0)
                {
                    item.unit_cost = entry.unit_cost;
                }
            }
        }
        if let Some(items) = record.outside_processes.as_mut() {
            for item in items.iter_mut().filter(|p| p.unit_cost == 0.0) {
                if let Some(entry) = self
                    .catalog
                    .outside_processes
                    .iter()
                    .find(|c| c.label.eq_ignore_ascii_case(&item.label) && c.unit_cost > 0.0)
                {
                    item.unit_cost = entry.unit_cost;
                }
            }
        }
    }

    /// Produces a priced quote.
    ///
    /// Always runs the rules engine. Rule violations are reported on the
    /// quote, not raised; only a broken routing fails the call.
    pub fn quote(&self, request: &QuoteRequest) -> Result<PricedQuote, PipelineError> {
        let input_hash = compute_input_hash(
            request,
            &self.config,
            &self.tables.tables_version,
            ENGINE_VERSION,
        )?;

        let resolution = self.resolve(&request.candidates);
        tracing::info!(
            fields = resolution.accepted.len(),
            flow = ?resolution.flow,
            "resolved candidates"
        );

        let mut record = resolution.record.clone();
        self.apply_catalog_costs(&mut record);
        let operations = self.prepare_operations(&record, request)?;
        record.operations = operations.clone();

        let evaluation = self.evaluate(&record, &operations);
        tracing::info!(
            status = evaluation.status.as_str(),
            violations = evaluation.violations.len(),
            "evaluated rules"
        );

        let (pricing, summary) = self.price(&operations, &record);
        tracing::info!(tiers = summary.quantities.len(), "priced quote");

        let date = request.quote_date.unwrap_or_else(|| Utc::now().date_naive());
        let weight_lb = record_weight_lb(&self.tables, &record);

        let mut quote = PricedQuote {
            id: Uuid::new_v4().to_string(),
            quote_number: next_quote_number(date, request.issued_quote_numbers.as_slice()),
            engine_version: ENGINE_VERSION.to_string(),
            tables_version: self.tables.tables_version.clone(),
            created_at: Utc::now(),
            record,
            resolution,
            evaluation,
            pricing,
            summary,
            weight_lb,
            input_hash,
            quote_hash: String::new(),
        };
        quote.quote_hash = compute_quote_hash(&quote)?;

        Ok(quote)
    }
}

impl Default for QuotePipeline {
    fn default() -> Self {
        Self::new(
            Arc::new(RuleTables::default()),
            Catalog::default(),
            QuoteConfig::default(),
        )
    }
}
