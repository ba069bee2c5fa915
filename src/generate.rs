//! The `generate` command: load both logs, reconcile, write the report tables.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use encoding_rs::UTF_8;
use log::{debug, info};

use crate::{
    cli::GenerateArgs,
    columns::{DetectionRules, detect_columns},
    config::{self, ColumnMap, RunConfig},
    data::Table,
    error::FollowupError,
    io_utils,
    matching::{MatchResult, run_matching},
    report::{self, FOLLOW_UP_TABLE, NamedTable, ReportOptions},
};

/// A reconciled run plus the tables to persist.
#[derive(Debug, Clone)]
pub struct Report {
    pub result: MatchResult,
    pub tables: Vec<NamedTable>,
    pub carried_flags: usize,
}

/// Detects columns on both logs, reconciles them, and lays out the output tables.
pub fn build_report(
    quotes: &Table,
    orders: &Table,
    cfg: &RunConfig,
    template: Option<&Table>,
    options: &ReportOptions,
) -> Result<Report, FollowupError> {
    cfg.validate()?;
    let quote_detection = detect_columns(
        "quotes",
        &quotes.headers,
        &DetectionRules::quotes(),
        &cfg.column_map.quotes,
    )?;
    let order_detection = detect_columns(
        "orders",
        &orders.headers,
        &DetectionRules::orders(),
        &cfg.column_map.orders,
    )?;
    for note in quote_detection.notes.iter().chain(&order_detection.notes) {
        debug!("Column detection: {note}");
    }
    info!("Quote columns: {}", quote_detection.mapping.describe());
    info!("Order columns: {}", order_detection.mapping.describe());

    let mut result = run_matching(
        quotes,
        orders,
        &quote_detection.mapping,
        &order_detection.mapping,
        cfg,
    );
    let carried_flags = template
        .map(|t| result.followups.carry_forward_flags(t))
        .unwrap_or_default();
    let tables = report::build_tables(&result, options);
    Ok(Report {
        result,
        tables,
        carried_flags,
    })
}

pub fn execute(args: &GenerateArgs) -> Result<()> {
    let column_map = args
        .column_map
        .as_deref()
        .map(ColumnMap::load)
        .transpose()?
        .unwrap_or_default();
    let cfg = RunConfig {
        floor: args.floor,
        tolerance: args.tolerance,
        relative_tolerance: args.relative_tolerance,
        allowed_reps: config::load_reps(&args.reps, args.reps_config.as_deref())?,
        debug: args.debug,
        column_map,
    };
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;

    let quotes = load_input(&args.quotes, args.delimiter, encoding)?;
    let orders = load_input(&args.orders, args.delimiter, encoding)?;

    let template = match resolve_template(args.template.as_deref(), &args.out) {
        Some(path) => {
            info!("Keeping follow-up flags from {path:?}");
            Some(
                io_utils::load_table(&path, io_utils::DEFAULT_CSV_DELIMITER, UTF_8)
                    .with_context(|| format!("Loading template {path:?}"))?,
            )
        }
        None => None,
    };

    let options = ReportOptions {
        variants: args.variants,
        extra_metadata: vec![
            ("quotes_file".into(), args.quotes.display().to_string()),
            ("quotes_sha256".into(), io_utils::fingerprint(&args.quotes)?),
            ("orders_file".into(), args.orders.display().to_string()),
            ("orders_sha256".into(), io_utils::fingerprint(&args.orders)?),
        ],
    };
    let report = build_report(&quotes, &orders, &cfg, template.as_ref(), &options)?;

    io_utils::ensure_dir(&args.out)?;
    let mut written = Vec::with_capacity(report.tables.len());
    for table in &report.tables {
        let path = io_utils::write_table(&args.out, table)?;
        debug!("Wrote {} row(s) to {path:?}", table.rows.len());
        written.push(path);
    }
    let keep = written
        .iter()
        .map(PathBuf::as_path)
        .chain([args.quotes.as_path(), args.orders.as_path()])
        .chain(args.template.as_deref())
        .collect::<Vec<_>>();
    io_utils::remove_stale_tables(&args.out, &keep)?;
    info!(
        "{} follow-up quote(s) written to {:?} across {} table(s){}",
        report.result.followups.len(),
        args.out,
        report.tables.len(),
        if report.carried_flags > 0 {
            format!(" ({} flag(s) kept)", report.carried_flags)
        } else {
            String::new()
        }
    );
    println!("Wrote output: {}", args.out.display());
    Ok(())
}

fn load_input(
    path: &Path,
    delimiter: Option<u8>,
    encoding: &'static encoding_rs::Encoding,
) -> Result<Table> {
    let delimiter = io_utils::resolve_input_delimiter(path, delimiter);
    info!(
        "Loading '{}' with delimiter '{}'",
        path.display(),
        crate::printable_delimiter(delimiter)
    );
    io_utils::load_table(path, delimiter, encoding)
}

/// An explicit template wins; otherwise a Follow-Up table left by an earlier run.
fn resolve_template(explicit: Option<&Path>, out_dir: &Path) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let previous = out_dir.join(format!("{FOLLOW_UP_TABLE}.csv"));
    previous.is_file().then_some(previous)
}
