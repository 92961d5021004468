//! Post-processing: deterministic cleanup of converter-generated Markdown.
//!
//! Converters build Markdown from very different sources (HTML serialisers,
//! Office XML walkers, PDF text runs) and each leaves its own artefacts:
//! `\r\n` from Windows-authored text, trailing spaces from XML whitespace,
//! runs of blank lines where empty paragraphs were, zero-width characters
//! copied out of web pages. Fixing them once here keeps every converter
//! simple and makes output byte-stable across converters.
//!
//! ## Rule Order
//!
//! Line endings are normalised before anything works line-by-line, blank-line
//! collapsing runs after heading spacing so the spacing rule cannot reintroduce
//! long runs, and the final-newline pass is last. Fenced code blocks are left
//! alone by the structural rules.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all normalisation rules to a converter's Markdown.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF / CR → LF)
/// 2. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, joiners)
/// 3. Trim trailing whitespace per line
/// 4. Ensure ATX heading lines have a blank line before and after them
/// 5. Insert a missing GFM separator row after a table header
/// 6. Collapse runs of blank lines down to one
/// 7. Ensure the text ends with exactly one newline
///
/// Empty (or whitespace-only) input stays empty.
pub fn normalize_markdown(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = normalise_heading_spacing(&s);
    let s = fix_broken_tables(&s);
    let s = collapse_blank_lines(&s);
    ensure_final_newline(&s)
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Heading spacing ─────────────────────────────────────────────────

static RE_ATX_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,6}(?:\s|$)").unwrap());

fn is_fence(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with("```") || t.starts_with("~~~")
}

fn normalise_heading_spacing(input: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut in_fence = false;
    let mut after_heading = false;

    for line in input.lines() {
        if is_fence(line) {
            in_fence = !in_fence;
        }
        let heading = !in_fence && RE_ATX_HEADING.is_match(line);

        if after_heading && !line.is_empty() {
            out.push("");
        }
        if heading && out.last().is_some_and(|prev| !prev.is_empty()) {
            out.push("");
        }
        out.push(line);
        after_heading = heading;
    }

    out.join("\n")
}

// ── Rule 5: Fix broken GFM tables ───────────────────────────────────────────

/// A table block whose first row is not followed by a separator row gets one.
fn fix_broken_tables(input: &str) -> String {
    let lines: Vec<&str> = input.lines().collect();
    let mut result = Vec::with_capacity(lines.len() + 4);
    let mut in_fence = false;
    let mut prev_is_table = false;

    for (i, line) in lines.iter().enumerate() {
        if is_fence(line) {
            in_fence = !in_fence;
        }
        result.push(line.to_string());

        let table_row = !in_fence && is_table_row(line);
        let starts_table = table_row && !prev_is_table && !is_separator_row(line);
        if starts_table {
            let next = lines.get(i + 1).copied().unwrap_or("");
            if is_table_row(next) && !is_separator_row(next) {
                let col_count = line.trim().matches('|').count().saturating_sub(1).max(1);
                let sep: String = std::iter::once("|")
                    .chain(std::iter::repeat_n(" --- |", col_count))
                    .collect();
                result.push(sep);
            }
        }
        prev_is_table = table_row;
    }

    result.join("\n")
}

fn is_table_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|') && trimmed.ends_with('|') && trimmed.len() > 2
}

fn is_separator_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|')
        && trimmed.contains('-')
        && trimmed
            .chars()
            .all(|c| c == '|' || c == '-' || c == ':' || c == ' ')
}

// ── Rule 6: Collapse blank-line runs ─────────────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

// ── Rule 7: Exactly one final newline ───────────────────────────────────────

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_matches('\n').trim_end();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}\n", trimmed)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_trim_trailing_whitespace() {
        assert_eq!(
            trim_trailing_whitespace("  hello   \nworld\t "),
            "  hello\nworld"
        );
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n\n\nb"), "a\n\nb");
        assert_eq!(collapse_blank_lines("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_ensure_final_newline() {
        assert_eq!(ensure_final_newline("hello"), "hello\n");
        assert_eq!(ensure_final_newline("hello\n\n\n"), "hello\n");
        assert_eq!(ensure_final_newline("\n\nhello"), "hello\n");
        assert_eq!(ensure_final_newline(""), "");
    }

    #[test]
    fn test_heading_spacing() {
        let result = normalise_heading_spacing("some text\n# Heading\nmore text");
        assert_eq!(result, "some text\n\n# Heading\n\nmore text");
    }

    #[test]
    fn test_heading_spacing_ignores_hashtags_and_fences() {
        let input = "#hashtag\ntext\n```\n# comment\n```";
        assert_eq!(normalise_heading_spacing(input), input);
    }

    #[test]
    fn test_fix_broken_table() {
        let result = fix_broken_tables("| A | B |\n| 1 | 2 |");
        let lines: Vec<&str> = result.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "| --- | --- |");
    }

    #[test]
    fn test_table_with_separator_unchanged() {
        let input = "| A | B |\n| --- | --- |\n| 1 | 2 |\n| 3 | 4 |";
        assert_eq!(fix_broken_tables(input), input);
    }

    #[test]
    fn test_remove_invisible() {
        let input = "hello\u{200B}world\u{FEFF}foo\u{00AD}bar";
        assert_eq!(remove_invisible_chars(input), "helloworldfoobar");
    }

    #[test]
    fn test_normalize_markdown_full_pipeline() {
        let input = "# Title\r\nSome text   \n\n\n\n\n\n## Section\n| A | B |\n| 1 | 2 |\n\n\n";
        let result = normalize_markdown(input);
        assert_eq!(
            result,
            "# Title\n\nSome text\n\n## Section\n\n| A | B |\n| --- | --- |\n| 1 | 2 |\n"
        );
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let input = "Intro\n# H1\ntext\u{200B}\n\n\n| a |\n| b |\n";
        let once = normalize_markdown(input);
        assert_eq!(normalize_markdown(&once), once);
    }

    #[test]
    fn test_whitespace_only_is_empty() {
        assert_eq!(normalize_markdown("  \n\t\n"), "");
    }
}
