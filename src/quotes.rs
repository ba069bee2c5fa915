use log::debug;
use rust_decimal::Decimal;

use crate::{
    columns::{ColumnMapping, field},
    config::RunConfig,
    data::{Row, Value},
    normalize::{customer_key, normalize_date, normalize_revision, parse_money},
};

/// A quote that passed the eligibility rules.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedQuote {
    pub id: Value,
    pub customer: Value,
    pub customer_key: String,
    pub amount: Decimal,
    pub date_quoted: Value,
    pub rep_name: String,
    pub revision: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub read: usize,
    pub missing_amount: usize,
    pub at_or_below_floor: usize,
    pub rep_not_allowed: usize,
}

pub(crate) fn mapped_cell<'a>(row: &'a Row, mapping: &ColumnMapping, name: &str) -> &'a Value {
    static BLANK: Value = Value::Blank;
    mapping.get(name).map_or(&BLANK, |header| row.get(header))
}

/// Normalizes quote rows and keeps the ones above the floor from rostered reps.
pub fn filter_quotes(
    rows: &[Row],
    mapping: &ColumnMapping,
    cfg: &RunConfig,
) -> (Vec<NormalizedQuote>, FilterStats) {
    let mut stats = FilterStats {
        read: rows.len(),
        ..FilterStats::default()
    };
    let quotes = rows
        .iter()
        .filter_map(|row| {
            let Some(amount) = parse_money(mapped_cell(row, mapping, field::QUOTE_AMOUNT)) else {
                stats.missing_amount += 1;
                return None;
            };
            if amount <= cfg.floor {
                stats.at_or_below_floor += 1;
                return None;
            }
            let rep_name = mapped_cell(row, mapping, field::ENTRY_PERSON_NAME).as_display();
            if !cfg.allowed_reps.contains(&rep_name) {
                stats.rep_not_allowed += 1;
                return None;
            }
            let customer = mapped_cell(row, mapping, field::CUSTOMER).clone();
            Some(NormalizedQuote {
                id: mapped_cell(row, mapping, field::QUOTE_NUMBER).clone(),
                customer_key: customer_key(&customer),
                customer,
                amount,
                date_quoted: normalize_date(mapped_cell(row, mapping, field::DATE_QUOTED)),
                rep_name,
                revision: normalize_revision(mapped_cell(row, mapping, field::REV)),
            })
        })
        .collect::<Vec<_>>();
    debug!(
        "Quote filter kept {} of {} row(s): {} without amount, {} at or below floor {}, {} from other reps",
        quotes.len(),
        stats.read,
        stats.missing_amount,
        stats.at_or_below_floor,
        cfg.floor,
        stats.rep_not_allowed
    );
    (quotes, stats)
}
