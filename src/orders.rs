//! Order log aggregation.
//!
//! Order lines are folded into per-customer totals, or per (order, customer)
//! totals when an order id column exists. Grouped totals fan out to one
//! candidate per revision the order carries.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, warn};
use rust_decimal::Decimal;

use crate::{
    columns::{ColumnMapping, field},
    data::Row,
    normalize::{customer_key, normalize_order_id, normalize_revision, parse_money, parse_truthy},
    quotes::mapped_cell,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderCandidate {
    pub customer_key: String,
    pub order_id: Option<String>,
    pub total: Decimal,
    pub is_open: bool,
    pub revision: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderBook {
    pub candidates: Vec<OrderCandidate>,
    /// Revisions were collected per order group.
    pub revisions_tracked: bool,
    /// Open flags were collected per order group.
    pub open_tracked: bool,
    pub rows_read: usize,
    pub rows_without_net: usize,
    /// Lines dropped because adding them would overflow their group total.
    pub rows_overflowed: usize,
}

#[derive(Default)]
struct OrderGroup {
    total: Decimal,
    is_open: bool,
    revisions: BTreeSet<String>,
}

pub fn aggregate_orders(rows: &[Row], mapping: &ColumnMapping) -> OrderBook {
    let priced = rows
        .iter()
        .filter_map(|row| parse_money(mapped_cell(row, mapping, field::NET)).map(|net| (row, net)))
        .collect::<Vec<_>>();
    let rows_without_net = rows.len() - priced.len();

    let mut book = if mapping.contains(field::ORDER_ID) {
        aggregate_by_order(&priced, mapping)
    } else {
        aggregate_by_customer(&priced, mapping)
    };
    book.rows_read = rows.len();
    book.rows_without_net = rows_without_net;
    if book.rows_overflowed > 0 {
        warn!(
            "Dropped {} order line(s) whose net amount overflows the order total",
            book.rows_overflowed
        );
    }
    debug!(
        "Aggregated {} order line(s) into {} candidate(s) ({} without net amount)",
        priced.len(),
        book.candidates.len(),
        rows_without_net
    );
    book
}

fn aggregate_by_customer(priced: &[(&Row, Decimal)], mapping: &ColumnMapping) -> OrderBook {
    let mut totals: BTreeMap<String, Decimal> = BTreeMap::new();
    let mut rows_overflowed = 0;
    for (row, net) in priced {
        let key = customer_key(mapped_cell(row, mapping, field::CUSTOMER));
        let total = totals.entry(key).or_default();
        match total.checked_add(*net) {
            Some(sum) => *total = sum,
            None => rows_overflowed += 1,
        }
    }
    OrderBook {
        candidates: totals
            .into_iter()
            .map(|(customer_key, total)| OrderCandidate {
                customer_key,
                order_id: None,
                total,
                is_open: false,
                revision: None,
            })
            .collect(),
        rows_overflowed,
        ..OrderBook::default()
    }
}

fn aggregate_by_order(priced: &[(&Row, Decimal)], mapping: &ColumnMapping) -> OrderBook {
    let track_open = mapping.contains(field::OPEN);
    let track_revisions = mapping.contains(field::REV);

    let mut groups: BTreeMap<(Option<String>, String), OrderGroup> = BTreeMap::new();
    let mut rows_overflowed = 0;
    for (row, net) in priced {
        let key = (
            normalize_order_id(mapped_cell(row, mapping, field::ORDER_ID)),
            customer_key(mapped_cell(row, mapping, field::CUSTOMER)),
        );
        let group = groups.entry(key).or_default();
        let Some(total) = group.total.checked_add(*net) else {
            rows_overflowed += 1;
            continue;
        };
        group.total = total;
        if track_open {
            group.is_open |= parse_truthy(mapped_cell(row, mapping, field::OPEN));
        }
        if track_revisions {
            if let Some(rev) = normalize_revision(mapped_cell(row, mapping, field::REV)) {
                group.revisions.insert(rev);
            }
        }
    }

    let candidates = groups
        .into_iter()
        .flat_map(|((order_id, customer_key), group)| {
            let revisions: Vec<Option<String>> = if group.revisions.is_empty() {
                vec![None]
            } else {
                group.revisions.into_iter().map(Some).collect()
            };
            revisions.into_iter().map(move |revision| OrderCandidate {
                customer_key: customer_key.clone(),
                order_id: order_id.clone(),
                total: group.total,
                is_open: group.is_open,
                revision,
            })
        })
        .collect();

    OrderBook {
        candidates,
        revisions_tracked: track_revisions,
        open_tracked: track_open,
        rows_overflowed,
        ..OrderBook::default()
    }
}
