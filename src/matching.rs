//! Quote-to-order reconciliation.
//!
//! Every eligible quote is checked against aggregated order totals under
//! three variants:
//!
//! - **revision-agnostic** (option B, the primary follow-up list): any order
//!   total for the same customer within tolerance counts as a conversion;
//! - **revision-exact** (option A): the order must also carry the quote's
//!   revision. Falls back to option B when either log lacks a revision column;
//! - **open-order** (option C): only totals of orders still flagged open count.
//!   Produces nothing when the order log has no open flag.

use std::collections::HashMap;

use log::{info, warn};
use rust_decimal::Decimal;

use crate::{
    columns::{ColumnMapping, field},
    config::RunConfig,
    data::Table,
    orders::{OrderBook, OrderCandidate, aggregate_orders},
    quotes::{NormalizedQuote, filter_quotes},
    report::{self, DebugRow, ResultSet, RunMetadata},
};

/// Differences at or below half a cent are rounding noise.
pub const ROUNDING_EPSILON: Decimal = Decimal::from_parts(5, 0, 0, false, 3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    RevisionExact,
    RevisionAgnostic,
    OpenOnly,
}

impl Variant {
    pub fn label(self) -> &'static str {
        match self {
            Variant::RevisionExact => "option_a",
            Variant::RevisionAgnostic => "option_b",
            Variant::OpenOnly => "option_c",
        }
    }

    fn admits(self, candidate: &OrderCandidate) -> bool {
        match self {
            Variant::OpenOnly => candidate.is_open,
            Variant::RevisionExact | Variant::RevisionAgnostic => true,
        }
    }

    fn key(self, customer_key: &str, revision: Option<&str>) -> IndexKey {
        let revision = match self {
            Variant::RevisionExact => revision.map(str::to_string),
            Variant::RevisionAgnostic | Variant::OpenOnly => None,
        };
        (customer_key.to_string(), revision)
    }
}

/// Absolute or relative slack, whichever is wider, plus the rounding epsilon.
/// A difference too large to represent never matches; a relative limit too
/// large to represent admits every difference.
pub fn amounts_match(order_total: Decimal, quote_amount: Decimal, cfg: &RunConfig) -> bool {
    let Some(diff) = order_total.checked_sub(quote_amount).map(|d| d.abs()) else {
        return false;
    };
    if diff <= ROUNDING_EPSILON {
        return true;
    }
    let relative_limit = quote_amount
        .abs()
        .checked_mul(cfg.relative_tolerance)
        .unwrap_or(Decimal::MAX);
    diff <= cfg.tolerance.max(relative_limit)
}

type IndexKey = (String, Option<String>);

/// Candidate totals by lookup key for one variant.
#[derive(Debug, Clone)]
pub struct MatchIndex {
    variant: Variant,
    totals: HashMap<IndexKey, Vec<Decimal>>,
}

impl MatchIndex {
    pub fn build(candidates: &[OrderCandidate], variant: Variant) -> Self {
        let mut totals: HashMap<IndexKey, Vec<Decimal>> = HashMap::new();
        for candidate in candidates.iter().filter(|c| variant.admits(c)) {
            totals
                .entry(variant.key(&candidate.customer_key, candidate.revision.as_deref()))
                .or_default()
                .push(candidate.total);
        }
        Self { variant, totals }
    }

    pub fn totals_for(&self, quote: &NormalizedQuote) -> &[Decimal] {
        self.totals
            .get(&self.variant.key(&quote.customer_key, quote.revision.as_deref()))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_matched(&self, quote: &NormalizedQuote, cfg: &RunConfig) -> bool {
        self.totals_for(quote)
            .iter()
            .any(|total| amounts_match(*total, quote.amount, cfg))
    }
}

/// Per-quote verdicts for every variant.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteStatus {
    pub quote: NormalizedQuote,
    pub matched: bool,
    pub matched_revision: bool,
    /// `None` when the order log has no open flag.
    pub matched_open: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    pub statuses: Vec<QuoteStatus>,
    pub revision_available: bool,
    pub open_available: bool,
    pub notes: Vec<String>,
}

pub fn reconcile(
    quotes: Vec<NormalizedQuote>,
    book: &OrderBook,
    quote_mapping: &ColumnMapping,
    order_mapping: &ColumnMapping,
    cfg: &RunConfig,
) -> Reconciliation {
    let mut notes = Vec::new();
    let revision_available =
        quote_mapping.contains(field::REV) && order_mapping.contains(field::REV);
    let open_available = order_mapping.contains(field::OPEN);

    let agnostic = MatchIndex::build(&book.candidates, Variant::RevisionAgnostic);
    let exact = if revision_available {
        if !book.revisions_tracked {
            notes.push(
                "Option A: order revisions are only tracked per order id; without an order id \
                 column only quotes without a revision can match."
                    .to_string(),
            );
        }
        let unrevised = quotes.iter().filter(|q| q.revision.is_none()).count();
        if unrevised > 0 {
            notes.push(format!(
                "Option A: {unrevised} quote(s) without a revision were compared against orders without a revision."
            ));
        }
        Some(MatchIndex::build(&book.candidates, Variant::RevisionExact))
    } else {
        notes.push(
            "Option A fell back to Option B: revision column not found on both quotes and orders."
                .to_string(),
        );
        None
    };
    let open = if open_available {
        if !book.open_tracked {
            notes.push(
                "Option C: open flags are only tracked per order id; without an order id column \
                 no order counts as open."
                    .to_string(),
            );
        }
        Some(MatchIndex::build(&book.candidates, Variant::OpenOnly))
    } else {
        notes.push("Option C skipped: no open-order column found on orders.".to_string());
        None
    };
    for note in &notes {
        warn!("{note}");
    }

    let statuses = quotes
        .into_iter()
        .map(|quote| {
            let matched = agnostic.is_matched(&quote, cfg);
            let matched_revision = match &exact {
                Some(index) => index.is_matched(&quote, cfg),
                None => matched,
            };
            let matched_open = open.as_ref().map(|index| index.is_matched(&quote, cfg));
            QuoteStatus {
                quote,
                matched,
                matched_revision,
                matched_open,
            }
        })
        .collect();

    Reconciliation {
        statuses,
        revision_available,
        open_available,
        notes,
    }
}

/// Everything one run produces.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Option B follow-ups, the primary report.
    pub followups: ResultSet,
    pub revision_followups: ResultSet,
    pub open_followups: ResultSet,
    pub metadata: RunMetadata,
    pub debug: Option<Vec<DebugRow>>,
}

pub fn run_matching(
    quotes: &Table,
    orders: &Table,
    quote_mapping: &ColumnMapping,
    order_mapping: &ColumnMapping,
    cfg: &RunConfig,
) -> MatchResult {
    let (eligible, quote_stats) = filter_quotes(&quotes.rows, quote_mapping, cfg);
    let book = aggregate_orders(&orders.rows, order_mapping);
    info!(
        "{} eligible quote(s) of {}; {} order candidate(s) from {} line(s)",
        eligible.len(),
        quote_stats.read,
        book.candidates.len(),
        book.rows_read
    );
    let eligible_count = eligible.len();
    let reconciliation = reconcile(eligible, &book, quote_mapping, order_mapping, cfg);

    let followups = report::assemble(
        reconciliation
            .statuses
            .iter()
            .filter(|s| !s.matched)
            .map(|s| &s.quote),
        false,
    );
    let revision_followups = report::assemble(
        reconciliation
            .statuses
            .iter()
            .filter(|s| !s.matched_revision)
            .map(|s| &s.quote),
        reconciliation.revision_available,
    );
    let open_followups = report::assemble(
        reconciliation
            .statuses
            .iter()
            .filter(|s| s.matched_open == Some(false))
            .map(|s| &s.quote),
        false,
    );

    let metadata = RunMetadata::builder()
        .entry("quotes_read", quote_stats.read)
        .entry("quotes_total_filtered", eligible_count)
        .entry("orders_read", book.rows_read)
        .entry("order_lines_without_net", book.rows_without_net)
        .entry("order_lines_overflowed", book.rows_overflowed)
        .entry("order_candidates", book.candidates.len())
        .entry("followups", followups.len())
        .entry(
            format!("followups_{}", Variant::RevisionExact.label()),
            revision_followups.len(),
        )
        .entry(
            format!("followups_{}", Variant::OpenOnly.label()),
            open_followups.len(),
        )
        .entry("floor", cfg.floor)
        .entry("tolerance", cfg.tolerance)
        .entry("relative_tolerance", cfg.relative_tolerance)
        .entry("reps_count", cfg.allowed_reps.len())
        .entry("revision_available", reconciliation.revision_available)
        .entry("open_available", reconciliation.open_available)
        .entry("quotes_mapping", quote_mapping.describe())
        .entry("orders_mapping", order_mapping.describe())
        .entry("notes", report::join_notes(&reconciliation.notes))
        .build();

    let debug = cfg
        .debug
        .then(|| reconciliation.statuses.iter().map(DebugRow::from).collect());

    MatchResult {
        followups,
        revision_followups,
        open_followups,
        metadata,
        debug,
    }
}
