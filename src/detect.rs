use anyhow::Result;
use log::info;

use crate::{
    cli::DetectArgs,
    columns::{Detection, TableKind, detect_columns},
    config::ColumnMap,
    io_utils, table,
};

pub fn execute(args: &DetectArgs) -> Result<()> {
    let column_map = args
        .column_map
        .as_deref()
        .map(ColumnMap::load)
        .transpose()?
        .unwrap_or_default();
    let overrides = match args.kind {
        TableKind::Quotes => &column_map.quotes,
        TableKind::Orders => &column_map.orders,
    };
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
    info!(
        "Inspecting '{}' as {} with delimiter '{}'",
        args.input.display(),
        args.kind.label(),
        crate::printable_delimiter(delimiter)
    );
    let input = io_utils::load_table(&args.input, delimiter, encoding)?;
    let detection = detect_columns(
        args.kind.label(),
        &input.headers,
        &args.kind.rules(),
        overrides,
    )?;
    print!("{}", render_detection(&detection, args.kind));
    Ok(())
}

/// Field/column listing; optional fields that were not found show as `-`.
pub fn render_detection(detection: &Detection, kind: TableKind) -> String {
    let rules = kind.rules();
    let rows = rules
        .synonyms
        .iter()
        .map(|(field, _)| {
            let required = if rules.required.contains(field) {
                "yes"
            } else {
                "no"
            };
            vec![
                field.clone(),
                detection.mapping.get(field).unwrap_or("-").to_string(),
                required.to_string(),
            ]
        })
        .collect::<Vec<_>>();
    let headers = ["field", "column", "required"].map(String::from);
    let mut output = table::render_table(&headers, &rows);
    for note in &detection.notes {
        output.push_str(&format!("note: {note}\n"));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn listing_marks_missing_optional_fields() {
        let headers = ["Customer Name", "Net Amount", "Is Open"].map(String::from);
        let detection = detect_columns(
            "orders",
            &headers,
            &TableKind::Orders.rules(),
            &BTreeMap::new(),
        )
        .unwrap();
        let rendered = render_detection(&detection, TableKind::Orders);
        let lines = rendered.lines().collect::<Vec<_>>();
        assert!(lines[0].starts_with("field"));
        assert!(lines.contains(&"customer  Customer Name  yes"));
        assert!(lines.contains(&"net       Net Amount     yes"));
        assert!(lines.contains(&"open      Is Open        no"));
        assert!(lines.contains(&"rev       -              no"));
    }

    #[test]
    fn override_notes_follow_the_listing() {
        let headers = ["Client", "Net"].map(String::from);
        let overrides = BTreeMap::from([("customer".to_string(), "Client".to_string())]);
        let detection =
            detect_columns("orders", &headers, &TableKind::Orders.rules(), &overrides).unwrap();
        let rendered = render_detection(&detection, TableKind::Orders);
        assert!(rendered.ends_with("note: override: customer -> Client\n"));
    }
}
