//! GFM table rendering for the Office converters.

/// Render `rows` as a GitHub-flavoured Markdown table. The first row is the
/// header. Short rows are padded to the widest row; cell text has pipes
/// escaped and line breaks flattened to `<br>`.
///
/// Returns an empty string for an empty (or all-empty) table.
pub(crate) fn render_table(rows: &[Vec<String>]) -> String {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    if width == 0 {
        return String::new();
    }

    let mut out = String::new();
    for (i, row) in rows.iter().enumerate() {
        out.push('|');
        for col in 0..width {
            let cell = row.get(col).map(String::as_str).unwrap_or("");
            out.push(' ');
            out.push_str(&escape_cell(cell));
            out.push_str(" |");
        }
        out.push('\n');

        if i == 0 {
            out.push('|');
            for _ in 0..width {
                out.push_str(" --- |");
            }
            out.push('\n');
        }
    }
    out
}

fn escape_cell(cell: &str) -> String {
    cell.trim()
        .replace('|', "\\|")
        .replace("\r\n", "<br>")
        .replace('\n', "<br>")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn header_separator_and_body() {
        let md = render_table(&[row(&["Name", "Qty"]), row(&["apple", "3"])]);
        assert_eq!(md, "| Name | Qty |\n| --- | --- |\n| apple | 3 |\n");
    }

    #[test]
    fn ragged_rows_are_padded() {
        let md = render_table(&[row(&["a"]), row(&["1", "2"])]);
        assert_eq!(md, "| a |  |\n| --- | --- |\n| 1 | 2 |\n");
    }

    #[test]
    fn pipes_and_newlines_are_escaped() {
        let md = render_table(&[row(&["a|b"]), row(&["line1\nline2"])]);
        assert!(md.contains("a\\|b"));
        assert!(md.contains("line1<br>line2"));
    }

    #[test]
    fn empty_table() {
        assert_eq!(render_table(&[]), "");
        assert_eq!(render_table(&[vec![]]), "");
    }
}
