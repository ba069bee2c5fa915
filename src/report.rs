//! Result assembly: dedup, ordering, run metadata, and the named output tables.

use std::{
    collections::{BTreeMap, HashSet},
    fmt,
    sync::LazyLock,
};

use itertools::Itertools;
use log::debug;
use regex::Regex;
use rust_decimal::Decimal;

use crate::{
    data::{Table, Value},
    matching::{MatchResult, QuoteStatus},
    normalize::{customer_key, parse_truthy},
    quotes::NormalizedQuote,
};

pub const COL_QUOTE: &str = "Quote";
pub const COL_CUSTOMER: &str = "Customer";
pub const COL_QUOTE_AMOUNT: &str = "Quote Amount";
pub const COL_DATE_QUOTED: &str = "Date Quoted";
pub const COL_ENTRY_PERSON: &str = "Entry Person Name";
pub const COL_REV: &str = "Rev";
pub const COL_WON: &str = "Won by Follow Up?";

pub const FOLLOW_UP_TABLE: &str = "Follow-Up";
pub const REVISION_TABLE: &str = "Follow-Up Rev Match";
pub const OPEN_TABLE: &str = "Follow-Up Open Orders";
pub const META_TABLE: &str = "_Meta";
pub const DEBUG_TABLE: &str = "_Debug";
pub const UNASSIGNED_REP: &str = "Unassigned";

/// Fixed tables a rep table must never shadow, whether or not this run writes them.
const RESERVED_TABLES: &[&str] = &[
    FOLLOW_UP_TABLE,
    REVISION_TABLE,
    OPEN_TABLE,
    META_TABLE,
    DEBUG_TABLE,
];

const FOLLOW_UP_HEADERS: &[&str] = &[
    COL_QUOTE,
    COL_CUSTOMER,
    COL_QUOTE_AMOUNT,
    COL_DATE_QUOTED,
    COL_ENTRY_PERSON,
    COL_WON,
];
const VARIANT_HEADERS: &[&str] = &[
    COL_QUOTE,
    COL_CUSTOMER,
    COL_QUOTE_AMOUNT,
    COL_DATE_QUOTED,
    COL_ENTRY_PERSON,
];
const META_HEADERS: &[&str] = &["Metric", "Value"];
const DEBUG_HEADERS: &[&str] = &[
    COL_QUOTE,
    COL_CUSTOMER,
    COL_QUOTE_AMOUNT,
    COL_DATE_QUOTED,
    COL_ENTRY_PERSON,
    COL_REV,
    "Matched",
    "Matched Rev",
    "Matched Open",
];

const MAX_TABLE_NAME: usize = 31;

static INVALID_TABLE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[:\\/?*\[\]]").expect("valid table name pattern"));

#[derive(Debug, Clone, PartialEq)]
pub struct FollowUpRow {
    pub quote: Value,
    pub customer: Value,
    pub customer_key: String,
    pub amount: Decimal,
    pub date_quoted: Value,
    pub rep_name: String,
    pub revision: Option<String>,
    /// Operator-maintained; generated rows start out false.
    pub won_by_follow_up: bool,
}

impl From<&NormalizedQuote> for FollowUpRow {
    fn from(quote: &NormalizedQuote) -> Self {
        Self {
            quote: quote.id.clone(),
            customer: quote.customer.clone(),
            customer_key: quote.customer_key.clone(),
            amount: quote.amount,
            date_quoted: quote.date_quoted.clone(),
            rep_name: quote.rep_name.clone(),
            revision: quote.revision.clone(),
            won_by_follow_up: false,
        }
    }
}

type Identity = (String, String, Decimal, String, String, Option<String>);

impl FollowUpRow {
    fn identity(&self, revision_aware: bool) -> Identity {
        (
            self.quote.as_display(),
            self.customer.as_display(),
            self.amount.normalize(),
            self.date_quoted.as_display(),
            self.rep_name.clone(),
            if revision_aware {
                self.revision.clone()
            } else {
                None
            },
        )
    }

    fn carry_key(&self) -> (String, String) {
        (self.quote.as_display().trim().to_string(), self.customer_key.clone())
    }
}

/// Deduplicated follow-ups ordered by rep, customer, then largest amount first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    rows: Vec<FollowUpRow>,
    revision_aware: bool,
}

impl ResultSet {
    pub fn rows(&self) -> &[FollowUpRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn revision_aware(&self) -> bool {
        self.revision_aware
    }

    /// Copies truthy "Won by Follow Up?" flags from a previously generated
    /// follow-up table onto rows with the same quote and customer. Quote ids
    /// written with a formula guard (`'=...`) are matched without it.
    pub fn carry_forward_flags(&mut self, template: &Table) -> usize {
        let won = template
            .rows
            .iter()
            .filter(|row| parse_truthy(row.get(COL_WON)))
            .map(|row| {
                (
                    row.get(COL_QUOTE)
                        .as_display()
                        .trim()
                        .trim_start_matches('\'')
                        .to_string(),
                    customer_key(row.get(COL_CUSTOMER)),
                )
            })
            .collect::<HashSet<_>>();
        let mut carried = 0;
        for row in &mut self.rows {
            if won.contains(&row.carry_key()) {
                row.won_by_follow_up = true;
                carried += 1;
            }
        }
        debug!("Carried {carried} follow-up flag(s) forward from template");
        carried
    }
}

pub fn assemble<'a, I>(quotes: I, revision_aware: bool) -> ResultSet
where
    I: IntoIterator<Item = &'a NormalizedQuote>,
{
    let mut rows = quotes
        .into_iter()
        .map(FollowUpRow::from)
        .unique_by(|row| row.identity(revision_aware))
        .collect::<Vec<_>>();
    rows.sort_by(|a, b| {
        a.rep_name
            .cmp(&b.rep_name)
            .then_with(|| a.customer_key.cmp(&b.customer_key))
            .then_with(|| b.amount.cmp(&a.amount))
    });
    ResultSet {
        rows,
        revision_aware,
    }
}

/// Ordered `Metric -> Value` pairs describing one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunMetadata {
    entries: Vec<(String, String)>,
}

impl RunMetadata {
    pub fn builder() -> RunMetadataBuilder {
        RunMetadataBuilder::default()
    }

    pub fn get(&self, metric: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == metric)
            .map(|(_, value)| value.as_str())
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }
}

#[derive(Debug, Default)]
pub struct RunMetadataBuilder {
    entries: Vec<(String, String)>,
}

impl RunMetadataBuilder {
    pub fn entry(mut self, metric: impl Into<String>, value: impl fmt::Display) -> Self {
        self.entries.push((metric.into(), value.to_string()));
        self
    }

    pub fn build(self) -> RunMetadata {
        RunMetadata {
            entries: self.entries,
        }
    }
}

pub fn join_notes(notes: &[String]) -> String {
    if notes.is_empty() {
        "none".to_string()
    } else {
        notes.join(" | ")
    }
}

/// Per-quote verdicts, emitted in debug mode.
#[derive(Debug, Clone, PartialEq)]
pub struct DebugRow {
    pub quote: Value,
    pub customer: Value,
    pub amount: Decimal,
    pub date_quoted: Value,
    pub rep_name: String,
    pub revision: Option<String>,
    pub matched: bool,
    pub matched_revision: bool,
    pub matched_open: Option<bool>,
}

impl From<&QuoteStatus> for DebugRow {
    fn from(status: &QuoteStatus) -> Self {
        let quote = &status.quote;
        Self {
            quote: quote.id.clone(),
            customer: quote.customer.clone(),
            amount: quote.amount,
            date_quoted: quote.date_quoted.clone(),
            rep_name: quote.rep_name.clone(),
            revision: quote.revision.clone(),
            matched: status.matched,
            matched_revision: status.matched_revision,
            matched_open: status.matched_open,
        }
    }
}

/// One output table, ready for persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedTable {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl NamedTable {
    fn new(name: impl Into<String>, headers: &[&str], rows: Vec<Vec<Value>>) -> Self {
        Self {
            name: name.into(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReportOptions {
    /// Also emit the revision-exact and open-order tables.
    pub variants: bool,
    /// Extra `_Meta` rows appended after the run metadata (input fingerprints etc.).
    pub extra_metadata: Vec<(String, String)>,
}

fn flag(value: bool) -> Value {
    Value::Text(if value { "TRUE" } else { "FALSE" }.to_string())
}

fn optional_flag(value: Option<bool>) -> Value {
    value.map(flag).unwrap_or_default()
}

fn followup_table(name: &str, rows: &[FollowUpRow]) -> NamedTable {
    NamedTable::new(
        name,
        FOLLOW_UP_HEADERS,
        rows.iter()
            .map(|row| {
                vec![
                    row.quote.clone(),
                    row.customer.clone(),
                    Value::Number(row.amount),
                    row.date_quoted.clone(),
                    Value::from_raw(&row.rep_name),
                    flag(row.won_by_follow_up),
                ]
            })
            .collect(),
    )
}

fn variant_table(name: &str, set: &ResultSet) -> NamedTable {
    let mut headers = VARIANT_HEADERS.to_vec();
    if set.revision_aware() {
        headers.push(COL_REV);
    }
    let rows = set
        .rows()
        .iter()
        .map(|row| {
            let mut cells = vec![
                row.quote.clone(),
                row.customer.clone(),
                Value::Number(row.amount),
                row.date_quoted.clone(),
                Value::from_raw(&row.rep_name),
            ];
            if set.revision_aware() {
                cells.push(row.revision.as_deref().map(Value::from_raw).unwrap_or_default());
            }
            cells
        })
        .collect();
    NamedTable::new(name, &headers, rows)
}

fn debug_table(rows: &[DebugRow]) -> NamedTable {
    NamedTable::new(
        DEBUG_TABLE,
        DEBUG_HEADERS,
        rows.iter()
            .map(|row| {
                vec![
                    row.quote.clone(),
                    row.customer.clone(),
                    Value::Number(row.amount),
                    row.date_quoted.clone(),
                    Value::from_raw(&row.rep_name),
                    row.revision.as_deref().map(Value::from_raw).unwrap_or_default(),
                    flag(row.matched),
                    flag(row.matched_revision),
                    optional_flag(row.matched_open),
                ]
            })
            .collect(),
    )
}

/// Table name for a rep's follow-up list; blank reps land in `Unassigned`.
pub fn table_name_for_rep(rep: &str) -> String {
    let cleaned = INVALID_TABLE_CHARS.replace_all(rep, "-");
    let trimmed = cleaned.trim();
    let name = if trimmed.is_empty() {
        UNASSIGNED_REP
    } else {
        trimmed
    };
    name.chars().take(MAX_TABLE_NAME).collect()
}

/// Whether a header row has the layout of a table this crate writes.
pub fn is_report_layout(headers: &[String]) -> bool {
    let revision_variant = VARIANT_HEADERS
        .iter()
        .chain([&COL_REV])
        .copied()
        .collect::<Vec<_>>();
    [
        FOLLOW_UP_HEADERS,
        VARIANT_HEADERS,
        revision_variant.as_slice(),
        META_HEADERS,
        DEBUG_HEADERS,
    ]
    .iter()
    .any(|layout| layout.iter().copied().eq(headers.iter().map(String::as_str)))
}

/// First free variant of `base`, suffixed ` (2)`, ` (3)`, ... and kept within
/// the table name limit. Names compare case-insensitively.
fn unique_table_name(base: &str, taken: &mut HashSet<String>) -> String {
    let mut candidate = base.to_string();
    let mut n = 2;
    while !taken.insert(candidate.to_lowercase()) {
        let suffix = format!(" ({n})");
        let room = MAX_TABLE_NAME - suffix.chars().count();
        let stem = base.chars().take(room).collect::<String>();
        candidate = format!("{}{suffix}", stem.trim_end());
        n += 1;
    }
    candidate
}

/// Lays out every output table of a run in write order.
pub fn build_tables(result: &MatchResult, options: &ReportOptions) -> Vec<NamedTable> {
    let mut tables = vec![followup_table(FOLLOW_UP_TABLE, result.followups.rows())];
    if options.variants {
        tables.push(variant_table(REVISION_TABLE, &result.revision_followups));
        tables.push(variant_table(OPEN_TABLE, &result.open_followups));
    }

    let meta_rows = result
        .metadata
        .entries()
        .iter()
        .chain(options.extra_metadata.iter())
        .map(|(metric, value)| vec![Value::Text(metric.clone()), Value::from_raw(value)])
        .collect();
    tables.push(NamedTable::new(META_TABLE, META_HEADERS, meta_rows));

    let mut by_rep: BTreeMap<&str, Vec<FollowUpRow>> = BTreeMap::new();
    for row in result.followups.rows() {
        by_rep.entry(row.rep_name.trim()).or_default().push(row.clone());
    }
    let mut taken = RESERVED_TABLES
        .iter()
        .map(|name| name.to_lowercase())
        .collect::<HashSet<_>>();
    for (rep, rows) in by_rep {
        let name = unique_table_name(&table_name_for_rep(rep), &mut taken);
        tables.push(followup_table(&name, &rows));
    }

    if let Some(rows) = &result.debug {
        tables.push(debug_table(rows));
    }
    tables
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Row;

    fn quote(id: &str, customer: &str, amount: i64, rep: &str, rev: Option<&str>) -> NormalizedQuote {
        let customer = Value::from_raw(customer);
        NormalizedQuote {
            id: Value::from_raw(id),
            customer_key: customer_key(&customer),
            customer,
            amount: Decimal::from(amount),
            date_quoted: Value::from_raw("2024-01-01"),
            rep_name: rep.to_string(),
            revision: rev.map(str::to_string),
        }
    }

    #[test]
    fn identical_rows_collapse_to_the_first() {
        let quotes = vec![
            quote("Q1", "Acme", 2000, "Reid Kincaid", None),
            quote("Q1", "Acme", 2000, "Reid Kincaid", None),
            quote("Q1", "Acme", 2500, "Reid Kincaid", None),
        ];
        let set = assemble(&quotes, false);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn revision_is_part_of_identity_only_when_revision_aware() {
        let quotes = vec![
            quote("Q1", "Acme", 2000, "Reid Kincaid", Some("A")),
            quote("Q1", "Acme", 2000, "Reid Kincaid", Some("B")),
        ];
        assert_eq!(assemble(&quotes, false).len(), 1);
        assert_eq!(assemble(&quotes, true).len(), 2);
    }

    #[test]
    fn rows_sort_by_rep_customer_then_amount_descending() {
        let quotes = vec![
            quote("Q1", "beta", 2000, "Tami Knoell", None),
            quote("Q2", "Acme", 1800, "Eric Simpson", None),
            quote("Q3", "Acme", 9000, "Eric Simpson", None),
            quote("Q4", "Zeta", 5000, "Eric Simpson", None),
        ];
        let set = assemble(&quotes, false);
        let order = set.rows().iter().map(|r| r.quote.as_display()).collect::<Vec<_>>();
        assert_eq!(order, vec!["Q3", "Q2", "Q4", "Q1"]);
        assert!(set.rows().iter().all(|r| !r.won_by_follow_up));
    }

    #[test]
    fn rep_table_names_are_sanitized() {
        assert_eq!(table_name_for_rep("Reid Kincaid"), "Reid Kincaid");
        assert_eq!(table_name_for_rep("A/B: [C]"), "A-B- -C-");
        assert_eq!(table_name_for_rep("   "), UNASSIGNED_REP);
        assert_eq!(table_name_for_rep(&"x".repeat(40)).len(), 31);
    }

    fn result_for(reps: &[&str]) -> MatchResult {
        let quotes = reps
            .iter()
            .enumerate()
            .map(|(idx, rep)| quote(&format!("Q{idx}"), "Acme", 2000, rep, None))
            .collect::<Vec<_>>();
        MatchResult {
            followups: assemble(&quotes, false),
            revision_followups: ResultSet::default(),
            open_followups: ResultSet::default(),
            metadata: RunMetadata::builder().entry("floor", 1500).build(),
            debug: None,
        }
    }

    #[test]
    fn rep_tables_never_shadow_fixed_tables() {
        let result = result_for(&["_Meta", "follow-up", "Reid Kincaid"]);
        let tables = build_tables(&result, &ReportOptions::default());
        let names = tables.iter().map(|t| t.name.as_str()).collect::<Vec<_>>();
        assert_eq!(
            names,
            vec!["Follow-Up", "_Meta", "Reid Kincaid", "_Meta (2)", "follow-up (2)"]
        );
        let meta = tables.iter().find(|t| t.name == META_TABLE).unwrap();
        assert_eq!(meta.headers, vec!["Metric", "Value"]);
    }

    #[test]
    fn reps_with_the_same_cleaned_name_get_separate_tables() {
        let result = result_for(&["A/B", "A-B", "", "Unassigned"]);
        let tables = build_tables(&result, &ReportOptions::default());
        let names = tables.iter().skip(2).map(|t| t.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["Unassigned", "A-B", "A-B (2)", "Unassigned (2)"]);
        assert!(tables.iter().skip(2).all(|t| t.rows.len() == 1));
    }

    #[test]
    fn report_layouts_are_recognized() {
        let options = ReportOptions {
            variants: true,
            ..ReportOptions::default()
        };
        let tables = build_tables(&result_for(&["Reid Kincaid"]), &options);
        assert!(tables.iter().all(|t| is_report_layout(&t.headers)));
        let mut with_rev = VARIANT_HEADERS.iter().map(|h| h.to_string()).collect::<Vec<_>>();
        with_rev.push(COL_REV.into());
        assert!(is_report_layout(&with_rev));
        assert!(!is_report_layout(&["Quote #".to_string(), "Customer".to_string()]));
        assert!(!is_report_layout(&[]));
    }

    #[test]
    fn suffixed_names_stay_within_the_limit() {
        let mut taken = HashSet::new();
        let long = "x".repeat(31);
        assert_eq!(unique_table_name(&long, &mut taken), long);
        let second = unique_table_name(&long, &mut taken);
        assert_eq!(second.chars().count(), 31);
        assert!(second.ends_with(" (2)"));
    }

    #[test]
    fn operator_flags_survive_regeneration() {
        let quotes = vec![
            quote("Q1", "Acme, Inc.", 2000, "Reid Kincaid", None),
            quote("Q2", "Beta", 3000, "Reid Kincaid", None),
        ];
        let mut set = assemble(&quotes, false);
        let template = Table::new(
            vec![COL_QUOTE.into(), COL_CUSTOMER.into(), COL_WON.into()],
            vec![
                Row::new()
                    .with(COL_QUOTE, "Q1")
                    .with(COL_CUSTOMER, "ACME INC")
                    .with(COL_WON, "TRUE"),
                Row::new()
                    .with(COL_QUOTE, "Q2")
                    .with(COL_CUSTOMER, "Beta")
                    .with(COL_WON, "FALSE"),
            ],
        );
        assert_eq!(set.carry_forward_flags(&template), 1);
        let flags = set
            .rows()
            .iter()
            .map(|r| (r.quote.as_display(), r.won_by_follow_up))
            .collect::<Vec<_>>();
        assert_eq!(flags, vec![("Q1".to_string(), true), ("Q2".to_string(), false)]);
    }

    #[test]
    fn metadata_keeps_insertion_order() {
        let meta = RunMetadata::builder()
            .entry("floor", Decimal::from(1500))
            .entry("notes", join_notes(&[]))
            .build();
        assert_eq!(meta.entries()[0].0, "floor");
        assert_eq!(meta.get("floor"), Some("1500"));
        assert_eq!(meta.get("notes"), Some("none"));
        assert_eq!(meta.get("missing"), None);
    }
}
