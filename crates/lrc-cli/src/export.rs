//! Pass exports: `report.json` and `new_entries.csv` under
//! `<root>/reconcile/<pass_id>/`.
//!
//! `export.day_adjustments` (`{"<key>": <days>}`) shifts the `display_date`
//! column only. Reconciliation never sees it.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use lrc_runtime::SourceReport;
use lrc_schemas::LedgerEntry;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

pub const DEFAULT_EXPORT_ROOT: &str = "exports";

/// `/export` section of the config.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportSection {
    #[serde(default)]
    pub dir: Option<String>,
    #[serde(default)]
    pub day_adjustments: BTreeMap<String, i64>,
}

impl ExportSection {
    pub fn from_config_json(config_json: &Value) -> Result<Self> {
        match config_json.pointer("/export") {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(v) => serde_json::from_value(v.clone()).context("invalid /export section"),
        }
    }
}

#[derive(Debug, Serialize)]
struct ReportFile<'a> {
    config_hash: &'a str,
    overall_ok: bool,
    sources: &'a [SourceReport],
}

#[derive(Debug, Serialize)]
struct EntryRow<'a> {
    pass_id: String,
    source: &'a str,
    account: &'a str,
    category: &'a str,
    key: String,
    timestamp_utc: String,
    display_date: NaiveDate,
    amount: Decimal,
    fee: Decimal,
    net_change: Decimal,
    asset: &'a str,
    counterparty_from: &'a str,
    counterparty_to: &'a str,
    parse_flags: String,
}

/// An adjustment that leaves chrono's date range keeps the unadjusted date.
fn display_date(e: &LedgerEntry, adjustments: &BTreeMap<String, i64>) -> NaiveDate {
    let days = adjustments.get(&e.key.to_string()).copied().unwrap_or(0);
    match Duration::try_days(days).and_then(|d| e.timestamp.checked_add_signed(d)) {
        Some(shifted) => shifted.date_naive(),
        None => {
            warn!(key = %e.key, days, "day adjustment out of range; display date left unadjusted");
            e.timestamp.date_naive()
        }
    }
}

fn entry_row<'a>(
    pass_id: String,
    e: &'a LedgerEntry,
    adjustments: &BTreeMap<String, i64>,
) -> EntryRow<'a> {
    EntryRow {
        pass_id,
        source: &e.source,
        account: &e.account,
        category: e.category.as_str(),
        key: e.key.to_string(),
        timestamp_utc: e.timestamp.to_rfc3339(),
        display_date: display_date(e, adjustments),
        amount: e.amount,
        fee: e.fee,
        net_change: e.net_change(),
        asset: &e.asset,
        counterparty_from: e.counterparty_from.as_deref().unwrap_or(""),
        counterparty_to: e.counterparty_to.as_deref().unwrap_or(""),
        parse_flags: e
            .raw
            .parse_flags()
            .iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join("|"),
    }
}

/// Write both export files for a run and return the directory.
///
/// The directory is named after the first pass id; every source's entries
/// go into the same CSV.
pub fn write_exports(
    root: &Path,
    config_hash: &str,
    reports: &[SourceReport],
    section: &ExportSection,
) -> Result<PathBuf> {
    let dir_name = reports
        .first()
        .map(|r| r.pass_id.to_string())
        .unwrap_or_else(|| "empty".to_string());
    let dir = root.join("reconcile").join(dir_name);
    fs::create_dir_all(&dir)
        .with_context(|| format!("create exports dir failed: {}", dir.display()))?;

    let report = ReportFile {
        config_hash,
        overall_ok: reports.iter().all(|r| r.overall_ok),
        sources: reports,
    };
    let json = serde_json::to_string_pretty(&report).context("serialize report failed")?;
    let report_path = dir.join("report.json");
    fs::write(&report_path, format!("{json}\n"))
        .with_context(|| format!("write report failed: {}", report_path.display()))?;

    let csv_path = dir.join("new_entries.csv");
    let mut w = csv::Writer::from_path(&csv_path)
        .with_context(|| format!("create csv failed: {}", csv_path.display()))?;
    for r in reports {
        for e in r.new_entries() {
            w.serialize(entry_row(r.pass_id.to_string(), e, &section.day_adjustments))
                .context("write csv row failed")?;
        }
    }
    w.flush().context("flush csv failed")?;

    Ok(dir)
}
