use std::fmt::Write as _;

/// Renders rows as left-aligned text columns separated by two spaces.
pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths = headers
        .iter()
        .map(|h| h.chars().count().max(3))
        .collect::<Vec<_>>();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(flatten(cell).chars().count());
        }
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_line(headers, &widths));
    let rule = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_line(&rule, &widths));
    for row in rows {
        let _ = writeln!(output, "{}", format_line(row, &widths));
    }
    output
}

fn format_line(cells: &[String], widths: &[usize]) -> String {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{:<width$}", flatten(cell), width = *width))
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}

fn flatten(cell: &str) -> String {
    cell.replace(['\n', '\r', '\t'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn columns_are_aligned() {
        let rendered = render_table(
            &strings(&["field", "column"]),
            &[strings(&["net", "Net Amount"]), strings(&["customer", "Customer"])],
        );
        let lines = rendered.lines().collect::<Vec<_>>();
        assert_eq!(
            lines,
            vec![
                "field     column",
                "--------  ----------",
                "net       Net Amount",
                "customer  Customer",
            ]
        );
    }

    #[test]
    fn control_characters_become_spaces() {
        let rendered = render_table(&strings(&["note"]), &[strings(&["a\nb\tc"])]);
        assert_eq!(rendered.lines().nth(2), Some("a b c"));
    }
}
