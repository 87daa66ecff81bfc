//! Markdown → card-element compilation.
//!
//! Feishu's markdown card element renders most inline syntax natively, but
//! pipe tables come out as raw text and headings below level 2 render in
//! undersized type. This pass splits source markdown into typed blocks:
//! pipe tables become structured table elements, everything else stays
//! markdown text with deep headings raised to level 2.

use std::borrow::Cow;

use serde_json::Value;

use crate::card::{CardElement, TableColumn};

/// Rows beyond this count paginate on the rendered card.
const MAX_PAGE_SIZE: usize = 10;

/// Compile markdown into an ordered sequence of card elements.
///
/// Single left-to-right scan. A table starts at a `|`-prefixed line whose
/// next line is a separator row, and runs through the following contiguous
/// `|`-prefixed lines; everything else accumulates into text blocks.
pub fn compile(markdown: &str) -> Vec<CardElement> {
    let lines: Vec<&str> = markdown.lines().collect();
    let mut elements: Vec<CardElement> = Vec::new();
    let mut pending: Vec<&str> = Vec::new();

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        let table_starts = is_table_line(line)
            && lines.get(i + 1).is_some_and(|next| is_separator_line(next));

        if table_starts {
            let header = parse_cells(line);
            if header.is_empty() {
                // No usable column names; the run reads as plain text.
                pending.push(line);
                i += 1;
                continue;
            }

            flush_text(&mut elements, &mut pending);

            let mut block: Vec<&str> = Vec::new();
            while i < lines.len() && is_table_line(lines[i]) {
                block.push(lines[i]);
                i += 1;
            }
            elements.push(parse_table(&header, &block));
        } else {
            pending.push(line);
            i += 1;
        }
    }

    flush_text(&mut elements, &mut pending);
    elements
}

fn flush_text(elements: &mut Vec<CardElement>, pending: &mut Vec<&str>) {
    if pending.is_empty() {
        return;
    }
    let joined = pending
        .iter()
        .map(|line| downgrade_heading(line))
        .collect::<Vec<_>>()
        .join("\n");
    pending.clear();

    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        elements.push(CardElement::TextBlock {
            content: trimmed.to_string(),
        });
    }
}

fn is_table_line(line: &str) -> bool {
    line.trim_start().starts_with('|')
}

/// Separator rows are drawn only from `|`, `-`, `:` and whitespace.
fn is_separator_line(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty()
        && trimmed
            .chars()
            .all(|c| matches!(c, '|' | '-' | ':') || c.is_whitespace())
}

/// Split a row on `|`, trim each cell, drop the empty ones.
fn parse_cells(line: &str) -> Vec<String> {
    line.split('|')
        .map(str::trim)
        .filter(|cell| !cell.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

/// `block[0]` is the header (already parsed), `block[1]` the separator;
/// everything after is a data row. Cells map positionally onto `col_N`
/// keys: extras past the header width are dropped, short rows leave later
/// columns absent.
fn parse_table(header: &[String], block: &[&str]) -> CardElement {
    let columns: Vec<TableColumn> = header
        .iter()
        .enumerate()
        .map(|(i, name)| TableColumn {
            key: format!("col_{i}"),
            display_name: name.clone(),
        })
        .collect();

    let rows: Vec<serde_json::Map<String, Value>> = block
        .iter()
        .skip(2)
        .map(|line| {
            let mut row = serde_json::Map::new();
            for (i, cell) in parse_cells(line).into_iter().take(header.len()).enumerate() {
                row.insert(format!("col_{i}"), Value::String(cell));
            }
            row
        })
        .collect();

    let page_size = rows.len().min(MAX_PAGE_SIZE) as u8;
    CardElement::Table {
        columns,
        rows,
        page_size,
    }
}

/// Downgrade `###`-or-deeper headings to exactly `##`. Levels 1–2 pass
/// through untouched.
fn downgrade_heading(line: &str) -> Cow<'_, str> {
    let hashes = line.bytes().take_while(|&b| b == b'#').count();
    if hashes >= 3 {
        let rest = &line[hashes..];
        if rest.starts_with(' ') || rest.starts_with('\t') {
            return Cow::Owned(format!("## {}", rest.trim_start()));
        }
    }
    Cow::Borrowed(line)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn text(content: &str) -> CardElement {
        CardElement::TextBlock {
            content: content.to_string(),
        }
    }

    fn row(cells: &[(&str, &str)]) -> serde_json::Map<String, Value> {
        cells
            .iter()
            .map(|(k, v)| ((*k).to_string(), Value::String((*v).to_string())))
            .collect()
    }

    #[test]
    fn plain_text_compiles_to_single_block() {
        let elements = compile("hello\nworld");
        assert_eq!(elements, vec![text("hello\nworld")]);
    }

    #[test]
    fn empty_input_yields_no_elements() {
        assert!(compile("").is_empty());
        assert!(compile("\n  \n").is_empty());
    }

    #[test]
    fn well_formed_table_becomes_table_element() {
        let md = "| Name | Status |\n|------|--------|\n| core | ok |\n| web | fail |";
        let elements = compile(md);

        assert_eq!(elements.len(), 1, "expected a single table element");
        let CardElement::Table {
            columns,
            rows,
            page_size,
        } = &elements[0]
        else {
            panic!("expected table, got {:?}", elements[0]);
        };
        assert_eq!(
            columns
                .iter()
                .map(|c| (c.key.as_str(), c.display_name.as_str()))
                .collect::<Vec<_>>(),
            vec![("col_0", "Name"), ("col_1", "Status")]
        );
        assert_eq!(
            *rows,
            vec![
                row(&[("col_0", "core"), ("col_1", "ok")]),
                row(&[("col_0", "web"), ("col_1", "fail")]),
            ]
        );
        assert_eq!(*page_size, 2);
    }

    #[test]
    fn text_before_and_after_table_keeps_order() {
        let md = "intro\n| A |\n|---|\n| 1 |\nafter";
        let elements = compile(md);

        assert_eq!(elements.len(), 3);
        assert_eq!(elements[0], text("intro"));
        assert!(matches!(elements[1], CardElement::Table { .. }));
        assert_eq!(elements[2], text("after"));
    }

    #[test]
    fn pipe_lines_without_separator_stay_text() {
        let md = "| not | a table |\n| just | pipes |";
        let elements = compile(md);
        assert_eq!(elements, vec![text(md)]);
    }

    #[test]
    fn header_with_no_names_folds_back_to_text() {
        let md = "| | |\n| - | - |\n| x | y |";
        let elements = compile(md);
        assert_eq!(elements, vec![text(md)]);
    }

    #[test]
    fn extra_cells_beyond_header_are_dropped() {
        let md = "| A | B |\n|---|---|\n| 1 | 2 | 3 |";
        let elements = compile(md);

        let CardElement::Table { rows, .. } = &elements[0] else {
            panic!("expected table");
        };
        assert_eq!(rows[0], row(&[("col_0", "1"), ("col_1", "2")]));
    }

    #[test]
    fn short_rows_leave_trailing_columns_absent() {
        let md = "| A | B |\n|---|---|\n| only |";
        let elements = compile(md);

        let CardElement::Table { rows, .. } = &elements[0] else {
            panic!("expected table");
        };
        assert_eq!(rows[0], row(&[("col_0", "only")]));
        assert!(rows[0].get("col_1").is_none());
    }

    #[test]
    fn empty_interior_cells_are_discarded() {
        let md = "| A || B |\n|---|---|\n| 1 || 2 |";
        let elements = compile(md);

        let CardElement::Table { columns, rows, .. } = &elements[0] else {
            panic!("expected table");
        };
        assert_eq!(columns.len(), 2);
        assert_eq!(rows[0], row(&[("col_0", "1"), ("col_1", "2")]));
    }

    #[test]
    fn page_size_caps_at_ten() {
        let mut md = String::from("| N |\n|---|\n");
        for i in 0..12 {
            md.push_str(&format!("| {i} |\n"));
        }
        let elements = compile(&md);

        let CardElement::Table {
            rows, page_size, ..
        } = &elements[0]
        else {
            panic!("expected table");
        };
        assert_eq!(rows.len(), 12);
        assert_eq!(*page_size, 10);
    }

    #[test]
    fn header_and_separator_alone_yield_empty_table() {
        let md = "| A |\n|---|";
        let elements = compile(md);

        let CardElement::Table {
            rows, page_size, ..
        } = &elements[0]
        else {
            panic!("expected table");
        };
        assert!(rows.is_empty());
        assert_eq!(*page_size, 0);
    }

    #[test]
    fn two_tables_compile_separately() {
        let md = "| A |\n|---|\n| 1 |\n\n| B |\n|---|\n| 2 |";
        let elements = compile(md);

        let tables = elements
            .iter()
            .filter(|e| matches!(e, CardElement::Table { .. }))
            .count();
        assert_eq!(tables, 2);
    }

    #[rstest]
    #[case("|---|---|", true)]
    #[case("| :--- | ---: |", true)]
    #[case("---", true)]
    #[case("|- -|", true)]
    #[case("| a |", false)]
    #[case("", false)]
    #[case("   ", false)]
    fn separator_line_detection(#[case] line: &str, #[case] expected: bool) {
        assert_eq!(is_separator_line(line), expected);
    }

    #[rstest]
    #[case("### Deep", "## Deep")]
    #[case("#### Deeper", "## Deeper")]
    #[case("###### Deepest", "## Deepest")]
    #[case("###\tTabbed", "## Tabbed")]
    #[case("## Level two", "## Level two")]
    #[case("# Level one", "# Level one")]
    #[case("###no-space", "###no-space")]
    #[case("body text", "body text")]
    fn heading_downgrade(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(downgrade_heading(input), expected);
    }

    #[test]
    fn heading_downgrade_is_idempotent() {
        let once = downgrade_heading("##### X").into_owned();
        let twice = downgrade_heading(&once).into_owned();
        assert_eq!(once, "## X");
        assert_eq!(twice, "## X");
    }

    #[test]
    fn headings_inside_table_cells_are_untouched() {
        let md = "| A |\n|---|\n| ### not a heading |";
        let elements = compile(md);

        let CardElement::Table { rows, .. } = &elements[0] else {
            panic!("expected table");
        };
        assert_eq!(rows[0]["col_0"], Value::String("### not a heading".into()));
    }

    #[test]
    fn surrounding_blank_lines_are_trimmed_from_text() {
        let elements = compile("\n\nhello\n\n");
        assert_eq!(elements, vec![text("hello")]);
    }
}
