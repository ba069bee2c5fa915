//! Domain errors an operator can act on.
//!
//! Anything that is not a [`FollowupError`] travels as a plain
//! [`anyhow::Error`] and is reported as an unexpected failure by the binary.

use std::fmt::Write as _;

use thiserror::Error;

/// A required field that no header could be resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingField {
    pub field: String,
    pub synonyms: Vec<String>,
    /// Existing headers that look close to one of the synonyms.
    pub suggestions: Vec<String>,
}

#[derive(Debug, Error)]
pub enum FollowupError {
    /// One or more required fields could not be mapped to a header.
    #[error("{}", render_detection_failure(.table, .missing, .headers))]
    ColumnDetection {
        table: String,
        missing: Vec<MissingField>,
        headers: Vec<String>,
    },

    /// The rep roster file or list is unusable.
    #[error("invalid rep roster: {0}")]
    RepRoster(String),

    /// A numeric run setting is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

fn render_detection_failure(table: &str, missing: &[MissingField], headers: &[String]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Required column detection failed for the {table} table.");
    let _ = writeln!(out, "Missing fields:");
    for entry in missing {
        let _ = writeln!(out, "- {}", entry.field);
    }
    let _ = writeln!(out, "Existing columns:");
    for header in headers {
        let _ = writeln!(out, "- {header}");
    }
    let _ = writeln!(out, "Synonyms tried:");
    for entry in missing {
        let _ = write!(out, "- {}: [{}]", entry.field, entry.synonyms.join(", "));
        if !entry.suggestions.is_empty() {
            let _ = write!(out, " (closest columns: {})", entry.suggestions.join(", "));
        }
        out.push('\n');
    }
    let _ = write!(
        out,
        "Use --column-map mapping.json with {{\"quotes\": {{...}}, \"orders\": {{...}}}} to override, \
         e.g. {{\"{table}\": {{\"{}\": \"<column name>\"}}}}.",
        missing.first().map(|m| m.field.as_str()).unwrap_or("field")
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_message_lists_every_missing_field() {
        let err = FollowupError::ColumnDetection {
            table: "quotes".into(),
            missing: vec![
                MissingField {
                    field: "customer".into(),
                    synonyms: vec!["Customer".into(), "Account".into()],
                    suggestions: vec!["Customr".into()],
                },
                MissingField {
                    field: "quote_amount".into(),
                    synonyms: vec!["Amount".into()],
                    suggestions: Vec::new(),
                },
            ],
            headers: vec!["Customr".into(), "Quote #".into()],
        };
        let message = err.to_string();
        assert!(message.contains("- customer\n- quote_amount"));
        assert!(message.contains("- Customr\n- Quote #"));
        assert!(message.contains("customer: [Customer, Account] (closest columns: Customr)"));
        assert!(message.contains("--column-map"));
        assert!(message.contains("\"quotes\": {\"customer\": \"<column name>\"}"));
    }

    #[test]
    fn roster_error_is_prefixed() {
        let err = FollowupError::RepRoster("reps.json must be a JSON array of names".into());
        assert_eq!(
            err.to_string(),
            "invalid rep roster: reps.json must be a JSON array of names"
        );
    }
}
