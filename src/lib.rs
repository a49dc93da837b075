//! ShopQuote Core - Sheet-Metal Quoting Engine
//!
//! # Guarantees
//! 1. Each field has one authoritative source per resolution flow
//! 2. Low-confidence candidates never populate a field
//! 3. Plan, Final Insp. and Package are always present, in order
//! 4. Rules are evaluated before every priced quote
//! 5. Identical inputs price identically

pub mod tables;
pub mod authority;
pub mod record;
pub mod operations;
pub mod resolution;
pub mod rules;
pub mod pricing;
pub mod estimator;
pub mod catalog;
pub mod config;
pub mod hashing;
pub mod logging;
pub mod pipeline;

pub use tables::{MaterialRule, RuleTables, SequenceTemplate, TableError};
pub use authority::{eligible_sources, FieldName, ResolutionFlow, Source};
pub use record::{HardwareItem, OutsideProcessItem, QuoteRecord};
pub use operations::{InsertPosition, OperationList, OperationRow, StructuralError};
pub use resolution::{resolve, CandidateField, CandidateValue, ConfidenceScoreMap};
pub use rules::{RuleEvaluation, RuleStatus, RulesEngine};
pub use pricing::{compute_pricing_table, PricingSummary, PricingTable, Rates};
pub use catalog::Catalog;
pub use config::QuoteConfig;
pub use hashing::{canonical_json, compute_input_hash, compute_quote_hash};
pub use pipeline::{PipelineError, PricedQuote, QuotePipeline, QuoteRequest};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
