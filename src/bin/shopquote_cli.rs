//! ShopQuote CLI - JSON bridge to the quoting engines
//!
//! Commands: tables, resolve, evaluate, price, quote
//! Outputs JSON to stdout, logs to stderr
//! Returns 2 on a rejected payload or routing

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::ExitCode;

use shopquote_core::{
    logging, CandidateField, OperationList, QuoteConfig, QuotePipeline, QuoteRecord, QuoteRequest,
    RuleStatus,
};

#[derive(Parser)]
#[command(name = "shopquote-cli")]
#[command(about = "ShopQuote CLI - sheet-metal quote resolution, rules and pricing")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a QuoteConfig JSON file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the loaded rule tables and catalogs
    Tables,

    /// Resolve extracted candidates into a quote record
    Resolve {
        /// JSON array of CandidateField
        #[arg(short, long)]
        payload: String,
    },

    /// Run the manufacturing rules over a record and routing
    Evaluate {
        /// JSON object {"record": ..., "operations": [...]}
        #[arg(short, long)]
        payload: String,
    },

    /// Price a routing for the configured quantity tiers
    Price {
        /// JSON object {"record": ..., "operations": [...]}
        #[arg(short, long)]
        payload: String,
    },

    /// Resolve, evaluate and price in one pass
    Quote {
        /// JSON QuoteRequest
        #[arg(short, long)]
        payload: String,
    },
}

#[derive(Deserialize)]
struct RoutingPayload {
    #[serde(default)]
    record: QuoteRecord,
    #[serde(default)]
    operations: Option<OperationList>,
}

impl RoutingPayload {
    fn operations(&self) -> &OperationList {
        self.operations.as_ref().unwrap_or(&self.record.operations)
    }
}

fn emit<T: Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(s) => {
            println!("{s}");
            ExitCode::SUCCESS
        }
        Err(e) => fail("Serialization error", &e),
    }
}

fn fail(context: &str, err: &dyn std::fmt::Display) -> ExitCode {
    let output = serde_json::json!({
        "success": false,
        "error": format!("{context}: {err}"),
    });
    println!("{output}");
    ExitCode::from(2)
}

fn parse<T: for<'de> Deserialize<'de>>(payload: &str) -> Result<T, ExitCode> {
    serde_json::from_str(payload).map_err(|e| fail("Invalid payload", &e))
}

fn main() -> ExitCode {
    logging::init();
    let cli = Cli::parse();

    let config = match QuoteConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!(r#"{{"error": "Failed to load config: {}"}}"#, e);
            return ExitCode::FAILURE;
        }
    };

    let pipeline = match QuotePipeline::from_config(config) {
        Ok(p) => p,
        Err(e) => {
            eprintln!(r#"{{"error": "Failed to load rule tables: {}"}}"#, e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Tables => {
            let tables = pipeline.tables();
            let catalog = pipeline.catalog();
            emit(&serde_json::json!({
                "tables_version": tables.tables_version,
                "engine_min_version": tables.engine_min_version,
                "materials": tables.material_codes(),
                "dependencies": tables.dependencies,
                "sequences": tables.sequences,
                "operations": catalog.operations.names(),
                "hardware": catalog.hardware,
                "outside_processes": catalog.outside_processes,
                "rates": catalog.rates,
            }))
        }

        Commands::Resolve { payload } => {
            let candidates: Vec<CandidateField> = match parse(&payload) {
                Ok(c) => c,
                Err(code) => return code,
            };
            emit(&pipeline.resolve(&candidates))
        }

        Commands::Evaluate { payload } => {
            let routing: RoutingPayload = match parse(&payload) {
                Ok(r) => r,
                Err(code) => return code,
            };
            let evaluation = pipeline.evaluate(&routing.record, routing.operations());
            let code = emit(&evaluation);
            if evaluation.status == RuleStatus::Error {
                ExitCode::from(2)
            } else {
                code
            }
        }

        Commands::Price { payload } => {
            let routing: RoutingPayload = match parse(&payload) {
                Ok(r) => r,
                Err(code) => return code,
            };
            let (table, summary) = pipeline.price(routing.operations(), &routing.record);
            emit(&serde_json::json!({
                "table": table,
                "summary": summary,
            }))
        }

        Commands::Quote { payload } => {
            let request: QuoteRequest = match parse(&payload) {
                Ok(r) => r,
                Err(code) => return code,
            };
            match pipeline.quote(&request) {
                Ok(quote) => emit(&serde_json::json!({
                    "success": true,
                    "quote": quote,
                })),
                Err(e) => fail("Quote rejected", &e),
            }
        }
    }
}
