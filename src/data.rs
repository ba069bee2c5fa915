use std::{collections::HashMap, fmt};

use chrono::NaiveDate;
use rust_decimal::Decimal;

/// A raw cell as it came out of a quote or order log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Value {
    #[default]
    Blank,
    Text(String),
    Number(Decimal),
    Date(NaiveDate),
}

static BLANK: Value = Value::Blank;

impl Value {
    /// Interprets a raw text cell; empty or whitespace-only text is blank.
    pub fn from_raw(raw: &str) -> Self {
        if raw.trim().is_empty() {
            Value::Blank
        } else {
            Value::Text(raw.to_string())
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            Value::Blank => true,
            Value::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_display(&self) -> String {
        match self {
            Value::Blank => String::new(),
            Value::Text(s) => s.clone(),
            Value::Number(d) => d.normalize().to_string(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::from_raw(value)
    }
}

impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Value::Number(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(Decimal::from(value))
    }
}


/// One record keyed by column name. Lookups of absent columns yield blank.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: HashMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.cells.insert(column.into(), value.into());
        self
    }

    pub fn get(&self, column: &str) -> &Value {
        self.cells.get(column).unwrap_or(&BLANK)
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Row {
            cells: iter.into_iter().collect(),
        }
    }
}

/// Headers in source order plus the materialized rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Row>) -> Self {
        Self { headers, rows }
    }

    /// Builds a table from positional records; short records are padded with blanks.
    pub fn from_records<I, R>(headers: Vec<String>, records: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = Value>,
    {
        let rows = records
            .into_iter()
            .map(|record| {
                let mut values = record.into_iter();
                headers
                    .iter()
                    .map(|header| (header.clone(), values.next().unwrap_or_default()))
                    .collect::<Row>()
            })
            .collect();
        Self { headers, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_treats_whitespace_as_blank() {
        assert_eq!(Value::from_raw(""), Value::Blank);
        assert_eq!(Value::from_raw("   "), Value::Blank);
        assert_eq!(Value::from_raw(" Q1 "), Value::Text(" Q1 ".into()));
    }

    #[test]
    fn numbers_display_without_trailing_zeros() {
        let value = Value::Number(Decimal::new(200000, 2));
        assert_eq!(value.as_display(), "2000");
        assert_eq!(Value::Number(Decimal::new(12345, 2)).to_string(), "123.45");
    }

    #[test]
    fn row_lookup_of_missing_column_is_blank() {
        let row = Row::new().with("Customer", "Acme");
        assert_eq!(row.get("Customer"), &Value::Text("Acme".into()));
        assert!(row.get("Net").is_blank());
    }

    #[test]
    fn from_records_pads_short_records() {
        let table = Table::from_records(
            vec!["a".into(), "b".into()],
            vec![vec![Value::from("1")], vec![Value::from("2"), Value::from("3")]],
        );
        assert_eq!(table.len(), 2);
        assert!(table.rows[0].get("b").is_blank());
        assert_eq!(table.rows[1].get("b").as_display(), "3");
    }
}
