//! At-exit report for compiled Tabor programs
//!
//! Dumps KPIs when the engine finishes, controlled by `TABOR_REPORT`:
//! - Unset → no report, zero cost
//! - `1` → human-readable to stderr
//! - `json` → JSON to stderr
//! - `json:/path` → JSON to file
//!
//! ## Feature Flag
//!
//! This module requires the `diagnostics` feature (enabled by default).

#![cfg(feature = "diagnostics")]

use crate::engine::{PEAK_QUERIES, TOTAL_QUERIES, TOTAL_QUERIES_COMPLETED, engine_elapsed};
use crate::scheduler::{
    ANSWERS_STORED, CONSUMERS_RESUMED, CONSUMERS_SUSPENDED, DUPLICATES_SUPPRESSED,
};
use crate::table::{SUBGOALS_CREATED, TABLE_HITS, TABLE_LOOKUPS, TRIE_NODES_CREATED};
use std::io::Write;
use std::sync::OnceLock;
use std::sync::atomic::Ordering;

// =============================================================================
// Report Configuration (parsed from TABOR_REPORT env var)
// =============================================================================

/// Output format
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportFormat {
    Human,
    Json,
}

/// Output destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportDestination {
    Stderr,
    File(String),
}

/// Parsed report configuration
#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub format: ReportFormat,
    pub destination: ReportDestination,
}

impl ReportConfig {
    /// Parse from the TABOR_REPORT environment variable
    pub fn from_env() -> Option<Self> {
        Self::parse(std::env::var("TABOR_REPORT").ok()?)
    }

    fn parse(val: String) -> Option<Self> {
        if val.is_empty() {
            return None;
        }
        match val.as_str() {
            "0" => None,
            "1" => Some(ReportConfig {
                format: ReportFormat::Human,
                destination: ReportDestination::Stderr,
            }),
            "json" => Some(ReportConfig {
                format: ReportFormat::Json,
                destination: ReportDestination::Stderr,
            }),
            s if s.starts_with("json:") => Some(ReportConfig {
                format: ReportFormat::Json,
                destination: ReportDestination::File(s[5..].to_string()),
            }),
            _ => {
                eprintln!("Warning: TABOR_REPORT='{}' not recognized, ignoring", val);
                None
            }
        }
    }
}

static REPORT_CONFIG: OnceLock<Option<ReportConfig>> = OnceLock::new();

fn get_report_config() -> &'static Option<ReportConfig> {
    REPORT_CONFIG.get_or_init(ReportConfig::from_env)
}

// =============================================================================
// Report Data
// =============================================================================

/// Collected metrics for the report
#[derive(Debug)]
pub struct ReportData {
    pub wall_clock_ms: u64,
    pub queries_spawned: u64,
    pub queries_completed: u64,
    pub peak_queries: usize,
    pub subgoals_created: u64,
    pub table_lookups: u64,
    pub table_hits: u64,
    pub trie_nodes: u64,
    pub answers_stored: u64,
    pub duplicates_suppressed: u64,
    pub consumers_suspended: u64,
    pub consumers_resumed: u64,
}

/// Collect all metrics
fn collect_report_data() -> ReportData {
    let wall_clock_ms = engine_elapsed().map(|d| d.as_millis() as u64).unwrap_or(0);

    ReportData {
        wall_clock_ms,
        queries_spawned: TOTAL_QUERIES.load(Ordering::Relaxed),
        queries_completed: TOTAL_QUERIES_COMPLETED.load(Ordering::Relaxed),
        peak_queries: PEAK_QUERIES.load(Ordering::Relaxed),
        subgoals_created: SUBGOALS_CREATED.load(Ordering::Relaxed),
        table_lookups: TABLE_LOOKUPS.load(Ordering::Relaxed),
        table_hits: TABLE_HITS.load(Ordering::Relaxed),
        trie_nodes: TRIE_NODES_CREATED.load(Ordering::Relaxed),
        answers_stored: ANSWERS_STORED.load(Ordering::Relaxed),
        duplicates_suppressed: DUPLICATES_SUPPRESSED.load(Ordering::Relaxed),
        consumers_suspended: CONSUMERS_SUSPENDED.load(Ordering::Relaxed),
        consumers_resumed: CONSUMERS_RESUMED.load(Ordering::Relaxed),
    }
}

// =============================================================================
// Formatting
// =============================================================================

fn format_human(data: &ReportData) -> String {
    let mut out = String::new();
    out.push_str("=== TABOR REPORT ===\n");
    out.push_str(&format!("Wall clock:       {} ms\n", data.wall_clock_ms));
    out.push_str(&format!("Queries spawned:  {}\n", data.queries_spawned));
    out.push_str(&format!("Queries done:     {}\n", data.queries_completed));
    out.push_str(&format!("Peak queries:     {}\n", data.peak_queries));
    out.push_str(&format!("Subgoals:         {}\n", data.subgoals_created));
    out.push_str(&format!(
        "Table lookups:    {} ({} hits)\n",
        data.table_lookups, data.table_hits
    ));
    out.push_str(&format!("Trie nodes:       {}\n", data.trie_nodes));
    out.push_str(&format!("Answers stored:   {}\n", data.answers_stored));
    out.push_str(&format!(
        "Dups suppressed:  {}\n",
        data.duplicates_suppressed
    ));
    out.push_str(&format!(
        "Consumers:        {} suspended, {} resumptions\n",
        data.consumers_suspended, data.consumers_resumed
    ));
    out.push_str("====================\n");
    out
}

#[cfg(feature = "report-json")]
fn format_json(data: &ReportData) -> String {
    let mut map = serde_json::Map::new();
    map.insert("wall_clock_ms".into(), data.wall_clock_ms.into());
    map.insert("queries_spawned".into(), data.queries_spawned.into());
    map.insert("queries_completed".into(), data.queries_completed.into());
    map.insert("peak_queries".into(), (data.peak_queries as u64).into());
    map.insert("subgoals_created".into(), data.subgoals_created.into());
    map.insert("table_lookups".into(), data.table_lookups.into());
    map.insert("table_hits".into(), data.table_hits.into());
    map.insert("trie_nodes".into(), data.trie_nodes.into());
    map.insert("answers_stored".into(), data.answers_stored.into());
    map.insert(
        "duplicates_suppressed".into(),
        data.duplicates_suppressed.into(),
    );
    map.insert(
        "consumers_suspended".into(),
        data.consumers_suspended.into(),
    );
    map.insert("consumers_resumed".into(), data.consumers_resumed.into());
    serde_json::Value::Object(map).to_string()
}

#[cfg(not(feature = "report-json"))]
fn format_json(data: &ReportData) -> String {
    // JSON output requested without the report-json feature: fall back to
    // the human format rather than silently dropping the report.
    format_human(data)
}

// =============================================================================
// Emission
// =============================================================================

/// Emit the report if TABOR_REPORT is configured. Called by engine_run
/// after the last query completes; safe to call directly.
pub fn emit_report() {
    let Some(config) = get_report_config() else {
        return;
    };

    let data = collect_report_data();
    let rendered = match config.format {
        ReportFormat::Human => format_human(&data),
        ReportFormat::Json => format_json(&data),
    };

    match &config.destination {
        ReportDestination::Stderr => {
            let _ = std::io::stderr().lock().write_all(rendered.as_bytes());
        }
        ReportDestination::File(path) => match std::fs::File::create(path) {
            Ok(mut f) => {
                let _ = f.write_all(rendered.as_bytes());
            }
            Err(e) => {
                eprintln!("Warning: cannot write TABOR_REPORT file '{}': {}", path, e);
            }
        },
    }
}
