//! Column role detection.
//!
//! Maps the headers a person typed into a quote or order log onto the
//! canonical fields the matcher works with. Resolution per field runs in a
//! fixed order: explicit override, synonym match, then substring rule. A field
//! settled by an earlier step is never revisited.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, warn};

use crate::{
    error::{FollowupError, MissingField},
    normalize::normalize_header,
};

pub mod field {
    pub const QUOTE_NUMBER: &str = "quote_number";
    pub const SALES_ORDER: &str = "sales_order";
    pub const CUSTOMER: &str = "customer";
    pub const QUOTE_AMOUNT: &str = "quote_amount";
    pub const DATE_QUOTED: &str = "date_quoted";
    pub const ENTRY_PERSON_NAME: &str = "entry_person_name";
    pub const REV: &str = "rev";
    pub const NET: &str = "net";
    pub const OPEN: &str = "open";
    pub const VOID: &str = "void";
    pub const ORDER_ID: &str = "order_id";
}

const CUSTOMER_SYNONYMS: &[&str] = &[
    "Customer",
    "Customer Name",
    "Cust. Name",
    "Account",
    "Bill To Name",
];

const SUGGESTION_LIMIT: usize = 3;
const SUGGESTION_CUTOFF: f32 = 0.6;

/// Which log a rule set describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TableKind {
    Quotes,
    Orders,
}

impl TableKind {
    pub fn label(self) -> &'static str {
        match self {
            TableKind::Quotes => "quotes",
            TableKind::Orders => "orders",
        }
    }

    pub fn rules(self) -> DetectionRules {
        match self {
            TableKind::Quotes => DetectionRules::quotes(),
            TableKind::Orders => DetectionRules::orders(),
        }
    }
}

/// Data-driven detection rules for one table.
#[derive(Debug, Clone, Default)]
pub struct DetectionRules {
    /// Fields in evaluation order, each with its accepted spellings in preference order.
    pub synonyms: Vec<(String, Vec<String>)>,
    pub required: BTreeSet<String>,
    /// Field -> token a normalized header must contain when no synonym matched.
    pub contains: BTreeMap<String, String>,
}

impl DetectionRules {
    pub fn new<F, S>(synonyms: F) -> Self
    where
        F: IntoIterator<Item = (&'static str, S)>,
        S: IntoIterator<Item = &'static str>,
    {
        Self {
            synonyms: synonyms
                .into_iter()
                .map(|(name, spellings)| {
                    (
                        name.to_string(),
                        spellings.into_iter().map(str::to_string).collect(),
                    )
                })
                .collect(),
            ..Self::default()
        }
    }

    pub fn require(mut self, fields: &[&str]) -> Self {
        self.required.extend(fields.iter().map(|f| f.to_string()));
        self
    }

    pub fn contains_rule(mut self, field: &str, token: &str) -> Self {
        self.contains.insert(field.to_string(), token.to_string());
        self
    }

    pub fn quotes() -> Self {
        Self::new([
            (
                field::QUOTE_NUMBER,
                vec!["Quote", "Quote #", "Quote Number", "Quote No", "QuoteNum"],
            ),
            (
                field::SALES_ORDER,
                vec![
                    "Sales Order",
                    "Sales Order #",
                    "Sales Order Number",
                    "Order Number",
                    "SO",
                    "SO #",
                ],
            ),
            (field::CUSTOMER, CUSTOMER_SYNONYMS.to_vec()),
            (
                field::QUOTE_AMOUNT,
                vec!["Quote Amount", "Amount", "Total", "Quoted Total"],
            ),
            (
                field::DATE_QUOTED,
                vec!["Date Quoted", "Quote Date", "Entry Date", "Quoted Date"],
            ),
            (
                field::ENTRY_PERSON_NAME,
                vec![
                    "Entry Person Name",
                    "Primary Sales Rep",
                    "Sales Rep Name",
                    "Entry Person",
                    "Created By",
                ],
            ),
            (
                field::REV,
                vec!["Rev", "Revision", "Quote Rev", "Quote Revision"],
            ),
        ])
        .require(&[
            field::QUOTE_NUMBER,
            field::CUSTOMER,
            field::QUOTE_AMOUNT,
            field::DATE_QUOTED,
            field::ENTRY_PERSON_NAME,
        ])
    }

    pub fn orders() -> Self {
        Self::new([
            (field::CUSTOMER, CUSTOMER_SYNONYMS.to_vec()),
            (
                field::NET,
                vec![
                    "Net",
                    "Net Price",
                    "Net Amount",
                    "Net USD",
                    "NetValue",
                    "Ext Net",
                ],
            ),
            (field::REV, vec!["Rev", "Revision", "Order Rev"]),
            (field::OPEN, vec!["Open", "Is Open", "Open?"]),
            (field::VOID, vec!["Void", "Voided"]),
            (
                field::ORDER_ID,
                vec![
                    "Order",
                    "Order Number",
                    "SO",
                    "Sales Order",
                    "Document",
                    "Document Number",
                    "Order No",
                ],
            ),
        ])
        .require(&[field::CUSTOMER, field::NET])
        .contains_rule(field::OPEN, "open")
        .contains_rule(field::VOID, "void")
    }

    fn synonyms_for(&self, name: &str) -> &[String] {
        self.synonyms
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, spellings)| spellings.as_slice())
            .unwrap_or_default()
    }
}

/// Resolved field -> header mapping for one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMapping {
    fields: BTreeMap<String, String>,
}

impl ColumnMapping {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Compact `{field: header, ...}` rendering used in run metadata.
    pub fn describe(&self) -> String {
        let pairs = self
            .fields
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect::<Vec<_>>();
        format!("{{{}}}", pairs.join(", "))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ColumnMapping {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Detection {
    pub mapping: ColumnMapping,
    pub notes: Vec<String>,
}

pub fn detect_columns(
    table: &str,
    headers: &[String],
    rules: &DetectionRules,
    overrides: &BTreeMap<String, String>,
) -> Result<Detection, FollowupError> {
    let mut mapping = BTreeMap::new();
    let mut notes = Vec::new();

    for (name, header) in overrides {
        if headers.iter().any(|h| h == header) {
            mapping.insert(name.clone(), header.clone());
            notes.push(format!("override: {name} -> {header}"));
        } else {
            warn!("Ignoring {table} override {name} -> '{header}': no such column");
            notes.push(format!("override ignored: {name} -> {header} (column not found)"));
        }
    }

    let normalized = headers
        .iter()
        .map(|h| (normalize_header(h), h))
        .collect::<Vec<_>>();

    for (name, spellings) in &rules.synonyms {
        if mapping.contains_key(name) {
            continue;
        }
        let by_synonym = spellings.iter().find_map(|candidate| {
            let wanted = normalize_header(candidate);
            normalized
                .iter()
                .find(|(n, _)| *n == wanted)
                .map(|(_, original)| (*original).clone())
        });
        let found = by_synonym.or_else(|| {
            let token = rules.contains.get(name)?;
            normalized
                .iter()
                .find(|(n, _)| n.contains(token.as_str()))
                .map(|(_, original)| (*original).clone())
        });
        if let Some(header) = found {
            debug!("{table}: {name} -> '{header}'");
            mapping.insert(name.clone(), header);
        }
    }

    let missing = rules
        .required
        .iter()
        .filter(|name| !mapping.contains_key(*name))
        .map(|name| {
            let synonyms = rules.synonyms_for(name).to_vec();
            MissingField {
                field: name.clone(),
                suggestions: suggest_headers(&synonyms, &normalized),
                synonyms,
            }
        })
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(FollowupError::ColumnDetection {
            table: table.to_string(),
            missing,
            headers: headers.to_vec(),
        });
    }

    Ok(Detection {
        mapping: ColumnMapping { fields: mapping },
        notes,
    })
}

fn suggest_headers(synonyms: &[String], normalized: &[(String, &String)]) -> Vec<String> {
    let candidates = normalized.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>();
    let mut suggestions = Vec::new();
    for synonym in synonyms {
        let wanted = normalize_header(synonym);
        for close in similar::get_close_matches(
            wanted.as_str(),
            &candidates,
            SUGGESTION_LIMIT,
            SUGGESTION_CUTOFF,
        ) {
            if let Some((_, original)) = normalized.iter().find(|(n, _)| n == close) {
                if !suggestions.contains(*original) {
                    suggestions.push((*original).clone());
                }
            }
        }
    }
    suggestions.truncate(SUGGESTION_LIMIT);
    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn synonyms_resolve_case_and_whitespace_insensitively() {
        let detection = detect_columns(
            "quotes",
            &headers(&["quote  #", "CUSTOMER NAME", "Amount", "Quote Date", "Created By"]),
            &DetectionRules::quotes(),
            &BTreeMap::new(),
        )
        .unwrap();
        let mapping = &detection.mapping;
        assert_eq!(mapping.get(field::QUOTE_NUMBER), Some("quote  #"));
        assert_eq!(mapping.get(field::CUSTOMER), Some("CUSTOMER NAME"));
        assert_eq!(mapping.get(field::QUOTE_AMOUNT), Some("Amount"));
        assert_eq!(mapping.get(field::ENTRY_PERSON_NAME), Some("Created By"));
        assert!(!mapping.contains(field::REV));
    }

    #[test]
    fn synonym_list_order_wins_over_header_order() {
        let detection = detect_columns(
            "quotes",
            &headers(&["Total", "Quote Amount", "Quote", "Customer", "Date Quoted", "Entry Person"]),
            &DetectionRules::quotes(),
            &BTreeMap::new(),
        )
        .unwrap();
        assert_eq!(detection.mapping.get(field::QUOTE_AMOUNT), Some("Quote Amount"));
    }

    #[test]
    fn override_beats_synonym_and_missing_override_is_noted() {
        let overrides = BTreeMap::from([
            ("net".to_string(), "Ext Amount".to_string()),
            ("customer".to_string(), "Nope".to_string()),
        ]);
        let detection = detect_columns(
            "orders",
            &headers(&["Customer", "Net", "Ext Amount"]),
            &DetectionRules::orders(),
            &overrides,
        )
        .unwrap();
        assert_eq!(detection.mapping.get(field::NET), Some("Ext Amount"));
        assert_eq!(detection.mapping.get(field::CUSTOMER), Some("Customer"));
        assert!(detection.notes.iter().any(|n| n.starts_with("override: net")));
        assert!(detection.notes.iter().any(|n| n.contains("override ignored: customer")));
    }

    #[test]
    fn substring_rule_applies_only_after_synonyms_fail() {
        let detection = detect_columns(
            "orders",
            &headers(&["Customer", "Net", "Order Open Flag", "Is Voided Line"]),
            &DetectionRules::orders(),
            &BTreeMap::new(),
        )
        .unwrap();
        assert_eq!(detection.mapping.get(field::OPEN), Some("Order Open Flag"));
        assert_eq!(detection.mapping.get(field::VOID), Some("Is Voided Line"));
        assert!(!detection.mapping.contains(field::ORDER_ID));
    }

    #[test]
    fn missing_fields_are_all_reported() {
        let err = detect_columns(
            "quotes",
            &headers(&["Quote #", "Custmer", "Notes"]),
            &DetectionRules::quotes(),
            &BTreeMap::new(),
        )
        .unwrap_err();
        match err {
            FollowupError::ColumnDetection {
                table,
                missing,
                headers,
            } => {
                assert_eq!(table, "quotes");
                let names = missing.iter().map(|m| m.field.as_str()).collect::<Vec<_>>();
                assert_eq!(
                    names,
                    vec!["customer", "date_quoted", "entry_person_name", "quote_amount"]
                );
                assert_eq!(headers.len(), 3);
                let customer = &missing[0];
                assert_eq!(customer.synonyms[0], "Customer");
                assert_eq!(customer.suggestions, vec!["Custmer".to_string()]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn detection_is_deterministic() {
        let hdrs = headers(&["Order", "Document", "Customer", "Net Amount", "Net", "Open?"]);
        let first = detect_columns("orders", &hdrs, &DetectionRules::orders(), &BTreeMap::new());
        let second = detect_columns("orders", &hdrs, &DetectionRules::orders(), &BTreeMap::new());
        assert_eq!(first.unwrap(), second.unwrap());
    }

    #[test]
    fn describe_renders_sorted_pairs() {
        let mapping = [("net", "Net"), ("customer", "Cust")]
            .into_iter()
            .collect::<ColumnMapping>();
        assert_eq!(mapping.describe(), "{customer: Cust, net: Net}");
    }
}
