use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;

use crate::{
    columns::TableKind,
    config::{DEFAULT_FLOOR, DEFAULT_RELATIVE_TOLERANCE, DEFAULT_TOLERANCE},
};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Find quotes that never turned into orders and list them per sales rep",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Reconcile a quote log against an order log and write the follow-up report
    Generate(GenerateArgs),
    /// Show how the columns of a quote or order log map onto known fields
    Detect(DetectArgs),
}

#[derive(Debug, Args)]
pub struct GenerateArgs {
    /// Quote summary export (CSV/TSV)
    #[arg(long)]
    pub quotes: PathBuf,
    /// Order log export (CSV/TSV)
    #[arg(long)]
    pub orders: PathBuf,
    /// Directory that receives one CSV file per report table
    #[arg(short = 'o', long = "out")]
    pub out: PathBuf,
    /// Quotes at or below this amount are ignored
    #[arg(long, default_value_t = DEFAULT_FLOOR)]
    pub floor: Decimal,
    /// Absolute amount slack when comparing a quote to an order total
    #[arg(long, default_value_t = DEFAULT_TOLERANCE)]
    pub tolerance: Decimal,
    /// Proportional slack (fraction of the quote amount)
    #[arg(long = "relative-tolerance", default_value_t = DEFAULT_RELATIVE_TOLERANCE)]
    pub relative_tolerance: Decimal,
    /// Sales reps to include, one argument per name (defaults to the roster file or the built-in roster)
    #[arg(long, num_args = 1..)]
    pub reps: Vec<String>,
    /// JSON or YAML file holding an array of rep names
    #[arg(long = "reps-config")]
    pub reps_config: Option<PathBuf>,
    /// JSON or YAML file with `quotes`/`orders` field-to-column overrides
    #[arg(long = "column-map")]
    pub column_map: Option<PathBuf>,
    /// Previously generated Follow-Up CSV whose "Won by Follow Up?" flags are kept
    #[arg(long)]
    pub template: Option<PathBuf>,
    /// Also write the revision-exact and open-order follow-up tables
    #[arg(long)]
    pub variants: bool,
    /// Write a per-quote table of match verdicts
    #[arg(long)]
    pub debug: bool,
    /// CSV delimiter for both inputs (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of both inputs (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct DetectArgs {
    /// Quote or order log to inspect
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Which rule set to apply
    #[arg(long, value_enum)]
    pub kind: TableKind,
    /// JSON or YAML file with `quotes`/`orders` field-to-column overrides
    #[arg(long = "column-map")]
    pub column_map: Option<PathBuf>,
    /// CSV delimiter character
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
