//! Run settings, rep roster loading, and column-map override files.
//!
//! Override and roster files are JSON unless the extension is `.yaml`/`.yml`.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::Path,
};

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::FollowupError;

pub const DEFAULT_ALLOWED_REPS: &[&str] = &[
    "Reid Kincaid",
    "LuWanna Morris",
    "Brent Schrader",
    "Eric Simpson",
    "Tami Knoell",
    "Alisha Teslow",
    "Darryl Overstreet",
];

pub const DEFAULT_FLOOR: Decimal = Decimal::from_parts(1500, 0, 0, false, 0);
pub const DEFAULT_TOLERANCE: Decimal = Decimal::ONE;
pub const DEFAULT_RELATIVE_TOLERANCE: Decimal = Decimal::from_parts(5, 0, 0, false, 2);

/// Per-table `field -> exact header` overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMap {
    #[serde(default)]
    pub quotes: BTreeMap<String, String>,
    #[serde(default)]
    pub orders: BTreeMap<String, String>,
}

impl ColumnMap {
    pub fn load(path: &Path) -> Result<Self> {
        read_structured(path).with_context(|| format!("Loading column map from {path:?}"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub floor: Decimal,
    pub tolerance: Decimal,
    pub relative_tolerance: Decimal,
    pub allowed_reps: BTreeSet<String>,
    pub debug: bool,
    pub column_map: ColumnMap,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            floor: DEFAULT_FLOOR,
            tolerance: DEFAULT_TOLERANCE,
            relative_tolerance: DEFAULT_RELATIVE_TOLERANCE,
            allowed_reps: default_reps(),
            debug: false,
            column_map: ColumnMap::default(),
        }
    }
}

impl RunConfig {
    pub fn with_reps<I, S>(mut self, reps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_reps = reps.into_iter().map(Into::into).collect();
        self
    }

    pub fn validate(&self) -> Result<(), FollowupError> {
        for (name, value) in [
            ("floor", self.floor),
            ("tolerance", self.tolerance),
            ("relative tolerance", self.relative_tolerance),
        ] {
            if value.is_sign_negative() && !value.is_zero() {
                return Err(FollowupError::InvalidConfig(format!(
                    "{name} must not be negative (got {value})"
                )));
            }
        }
        Ok(())
    }
}

pub fn default_reps() -> BTreeSet<String> {
    DEFAULT_ALLOWED_REPS.iter().map(|s| s.to_string()).collect()
}

/// Roster precedence: explicit names, then a roster file, then the built-in list.
pub fn load_reps(reps: &[String], reps_config: Option<&Path>) -> Result<BTreeSet<String>> {
    if !reps.is_empty() {
        return Ok(reps.iter().cloned().collect());
    }
    let Some(path) = reps_config else {
        return Ok(default_reps());
    };
    let parsed = read_structured::<Vec<String>>(path)
        .map_err(|err| {
            FollowupError::RepRoster(format!(
                "{} must be an array of names ({err:#})",
                path.display()
            ))
        })?;
    if parsed.is_empty() {
        return Err(FollowupError::RepRoster(format!(
            "{} does not list any reps",
            path.display()
        ))
        .into());
    }
    Ok(parsed.into_iter().collect())
}

fn read_structured<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path).with_context(|| format!("Reading {path:?}"))?;
    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
    if is_yaml {
        serde_yaml::from_str(&contents).with_context(|| format!("Parsing YAML in {path:?}"))
    } else {
        serde_json::from_str(&contents).with_context(|| format!("Parsing JSON in {path:?}"))
    }
}
