/// Convert a subset of Markdown to Telegram-compatible HTML.
///
/// Telegram supports: `<b>`, `<i>`, `<code>`, `<pre>`, `<a href="">`,
/// `<s>` (strikethrough), `<u>` (underline).
///
/// Handles inline formatting (bold, italic, code, links, strikethrough)
/// and block-level markdown tables (rendered as aligned `<pre>` blocks
/// since Telegram does not support `<table>` HTML).
pub fn markdown_to_telegram_html(md: &str) -> String {
    let segments = split_table_segments(md);
    // Fast path: single text segment (no tables).
    if segments.len() == 1
        && let Segment::Text(text) = &segments[0]
    {
        return render_inline_markdown(text);
    }
    let mut out = String::with_capacity(md.len());
    for (i, seg) in segments.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        match seg {
            Segment::Text(text) => out.push_str(&render_inline_markdown(text)),
            Segment::Table(lines) => out.push_str(&render_table_pre(lines)),
        }
    }
    out
}

// ── Table detection & rendering ──────────────────────────────────────────

enum Segment {
    Text(String),
    Table(Vec<String>),
}

/// Split markdown into alternating text and table segments.
fn split_table_segments(md: &str) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::new();
    let mut text_lines: Vec<&str> = Vec::new();
    let mut table_lines: Vec<&str> = Vec::new();

    for line in md.split('\n') {
        if is_table_line(line.trim()) {
            table_lines.push(line);
        } else {
            if !table_lines.is_empty() {
                flush_table_block(&mut segments, &mut text_lines, &mut table_lines);
            }
            text_lines.push(line);
        }
    }

    if !table_lines.is_empty() {
        flush_table_block(&mut segments, &mut text_lines, &mut table_lines);
    }
    if !text_lines.is_empty() {
        segments.push(Segment::Text(text_lines.join("\n")));
    }

    if segments.is_empty() {
        segments.push(Segment::Text(String::new()));
    }

    segments
}

fn flush_table_block<'a>(
    segments: &mut Vec<Segment>,
    text_lines: &mut Vec<&'a str>,
    table_lines: &mut Vec<&'a str>,
) {
    if table_lines.len() >= 2 && is_separator_row(table_lines[1]) {
        if !text_lines.is_empty() {
            segments.push(Segment::Text(text_lines.join("\n")));
            text_lines.clear();
        }
        segments.push(Segment::Table(
            table_lines.iter().map(|s| (*s).to_owned()).collect(),
        ));
    } else {
        text_lines.extend(table_lines.iter());
    }
    table_lines.clear();
}

fn is_table_line(trimmed: &str) -> bool {
    if trimmed.len() <= 1 {
        return false;
    }
    // Standard markdown table line: starts with |
    if trimmed.starts_with('|') {
        return true;
    }
    // Non-standard table line: at least 2 pipe-separated columns.
    // Require >= 2 pipes to avoid false positives like "use the | operator".
    if trimmed.chars().filter(|&c| c == '|').count() >= 2 {
        return true;
    }
    // Separator row with + intersections: ---+---+---
    is_plus_separator_row(trimmed)
}

/// Detect separator rows using `+` as intersection character (e.g. `---+---+---`).
fn is_plus_separator_row(trimmed: &str) -> bool {
    trimmed.contains('+')
        && trimmed.split('+').all(|cell| {
            let c = cell.trim();
            !c.is_empty() && c.chars().all(|ch| ch == '-' || ch == ':')
        })
}

fn is_separator_row(line: &str) -> bool {
    let trimmed = line.trim();
    // Standard: |---|---|
    let inner = trimmed.strip_prefix('|').unwrap_or(trimmed);
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    let is_pipe_sep = !inner.is_empty()
        && inner.split('|').all(|cell| {
            let c = cell.trim();
            !c.is_empty() && c.chars().all(|ch| ch == '-' || ch == ':')
        });
    if is_pipe_sep {
        return true;
    }
    // Plus-separator: ---+---+---
    is_plus_separator_row(trimmed)
}

fn parse_table_cells(line: &str) -> Vec<String> {
    let trimmed = line.trim();
    let inner = trimmed.strip_prefix('|').unwrap_or(trimmed);
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    inner
        .split('|')
        .map(|cell| cell.trim().to_owned())
        .collect()
}

/// Maximum rendered table width (in characters) before switching from a
/// horizontal `<pre>` layout to a vertical card layout.  Telegram mobile
/// typically shows ~36 monospace characters per line inside `<pre>` blocks.
const MAX_TABLE_PRE_WIDTH: usize = 42;

fn render_table_pre(lines: &[String]) -> String {
    // Parse rows, skipping the separator (index 1).
    let rows: Vec<Vec<String>> = lines
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != 1)
        .map(|(_, line)| parse_table_cells(line))
        .collect();

    if rows.is_empty() {
        return String::new();
    }

    let col_count = rows.iter().map(|r| r.len()).max().unwrap_or(0);
    let mut widths = vec![0usize; col_count];
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    // Total width including " | " separators between columns.
    let total_width: usize = widths.iter().sum::<usize>() + col_count.saturating_sub(1) * 3;

    if total_width > MAX_TABLE_PRE_WIDTH {
        return render_table_vertical(&rows);
    }

    // Build plain-text table, then HTML-escape the whole block.
    let mut plain = String::new();
    for (row_idx, row) in rows.iter().enumerate() {
        if row_idx > 0 {
            plain.push('\n');
        }
        for (col_idx, cell) in row.iter().enumerate() {
            if col_idx > 0 {
                plain.push_str(" | ");
            }
            plain.push_str(cell);
            let w = widths.get(col_idx).copied().unwrap_or(0);
            for _ in 0..w.saturating_sub(cell.chars().count()) {
                plain.push(' ');
            }
        }
        // Separator after header row.
        if row_idx == 0 && rows.len() > 1 {
            plain.push('\n');
            for (col_idx, &w) in widths.iter().enumerate() {
                if col_idx > 0 {
                    plain.push_str("-+-");
                }
                for _ in 0..w {
                    plain.push('-');
                }
            }
        }
    }

    format!("<pre>{}</pre>", escape_html(&plain))
}

/// Render a wide table in vertical card format for mobile-friendly display.
///
/// Each data row becomes a card: the first column value is the bold title,
/// remaining columns are listed as `Header: value` pairs.
fn render_table_vertical(rows: &[Vec<String>]) -> String {
    if rows.len() < 2 {
        return String::new();
    }
    let headers = &rows[0];
    let mut out = String::new();
    for (row_idx, row) in rows.iter().skip(1).enumerate() {
        if row_idx > 0 {
            out.push('\n');
        }
        // First column as bold title.
        let title = row.first().map(String::as_str).unwrap_or("");
        out.push_str(&format!("<b>{}</b>\n", escape_html(title)));
        // Remaining columns as header: value pairs.
        for (col_idx, cell) in row.iter().enumerate().skip(1) {
            let header = headers.get(col_idx).map(String::as_str).unwrap_or("?");
            out.push_str(&format!("{}: {}\n", escape_html(header), escape_html(cell)));
        }
    }
    // Trim trailing newline.
    if out.ends_with('\n') {
        out.pop();
    }
    out
}

// ── Inline markdown rendering ────────────────────────────────────────────

/// Render inline markdown constructs (bold, italic, code, links, etc.)
/// to Telegram-compatible HTML. HTML special chars are escaped first.
fn render_inline_markdown(md: &str) -> String {
    let escaped = escape_html(md);
    let mut chars = escaped.chars().peekable();
    let mut out = String::with_capacity(md.len());
    let mut in_code = false;

    while let Some(&ch) = chars.peek() {
        // Fenced code blocks: ```
        if !in_code && ch == '`' && peek_n(&mut chars, 3) == "```" {
            // Consume the ```
            chars.next();
            chars.next();
            chars.next();
            // Optional language tag (until newline)
            let mut lang = String::new();
            while let Some(&c) = chars.peek() {
                if c == '\n' {
                    chars.next();
                    break;
                }
                lang.push(c);
                chars.next();
            }
            // Collect until closing ```
            let mut block = String::new();
            loop {
                if chars.peek().is_none() {
                    break;
                }
                if peek_n(&mut chars, 3) == "```" {
                    chars.next();
                    chars.next();
                    chars.next();
                    break;
                }
                let Some(c) = chars.next() else {
                    break;
                };
                block.push(c);
            }
            if lang.is_empty() {
                out.push_str("<pre>");
            } else {
                out.push_str(&format!("<pre><code class=\"language-{lang}\">"));
            }
            out.push_str(&block);
            if lang.is_empty() {
                out.push_str("</pre>");
            } else {
                out.push_str("</code></pre>");
            }
            continue;
        }

        // Inline code: `
        if ch == '`' {
            chars.next();
            if in_code {
                out.push_str("</code>");
                in_code = false;
            } else {
                out.push_str("<code>");
                in_code = true;
            }
            continue;
        }

        // Inside inline code, don't process markdown
        if in_code {
            if let Some(c) = chars.next() {
                out.push(c);
            }
            continue;
        }

        // Strikethrough: ~~
        if ch == '~' && peek_n(&mut chars, 2) == "~~" {
            chars.next();
            chars.next();
            let mut content = String::new();
            loop {
                if chars.peek().is_none() {
                    break;
                }
                if peek_n(&mut chars, 2) == "~~" {
                    chars.next();
                    chars.next();
                    break;
                }
                let Some(c) = chars.next() else {
                    break;
                };
                content.push(c);
            }
            out.push_str("<s>");
            out.push_str(&content);
            out.push_str("</s>");
            continue;
        }

        // Bold: **
        if ch == '*' && peek_n(&mut chars, 2) == "**" {
            chars.next();
            chars.next();
            let mut content = String::new();
            loop {
                if chars.peek().is_none() {
                    break;
                }
                if peek_n(&mut chars, 2) == "**" {
                    chars.next();
                    chars.next();
                    break;
                }
                let Some(c) = chars.next() else {
                    break;
                };
                content.push(c);
            }
            out.push_str("<b>");
            out.push_str(&content);
            out.push_str("</b>");
            continue;
        }

        // Italic: * (single)
        if ch == '*' {
            chars.next();
            let mut content = String::new();
            loop {
                if chars.peek().is_none() {
                    break;
                }
                if chars.peek() == Some(&'*') {
                    chars.next();
                    break;
                }
                let Some(c) = chars.next() else {
                    break;
                };
                content.push(c);
            }
            out.push_str("<i>");
            out.push_str(&content);
            out.push_str("</i>");
            continue;
        }

        // Link: [text](url)
        if ch == '[' {
            chars.next();
            let mut text = String::new();
            let mut found_close = false;
            loop {
                match chars.peek() {
                    None => break,
                    Some(&']') => {
                        chars.next();
                        found_close = true;
                        break;
                    },
                    _ => {
                        let Some(c) = chars.next() else {
                            break;
                        };
                        text.push(c);
                    },
                }
            }
            if found_close && chars.peek() == Some(&'(') {
                chars.next();
                let mut url = String::new();
                loop {
                    match chars.peek() {
                        None => break,
                        Some(&')') => {
                            chars.next();
                            break;
                        },
                        _ => {
                            let Some(c) = chars.next() else {
                                break;
                            };
                            url.push(c);
                        },
                    }
                }
                out.push_str(&format!("<a href=\"{url}\">{text}</a>"));
            } else {
                out.push('[');
                out.push_str(&text);
                if found_close {
                    out.push(']');
                }
            }
            continue;
        }

        if let Some(c) = chars.next() {
            out.push(c);
        }
    }

    // Ensure we never leave an unterminated inline code tag when input ends
    // without a closing backtick (common when splitting long content).
    if in_code {
        out.push_str("</code>");
    }

    out
}

/// Peek at the next `n` characters without consuming them.
fn peek_n(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, n: usize) -> String {
    let collected: Vec<char> = chars.clone().take(n).collect();
    collected.into_iter().collect()
}

/// Escape HTML special characters.
fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Telegram message size limit.
pub const TELEGRAM_MAX_MESSAGE_LEN: usize = 4096;

/// Telegram caption size limit for media messages (voice, photo, document).
pub const TELEGRAM_CAPTION_LIMIT: usize = 1024;

#[must_use]
pub fn truncate_at_char_boundary(text: &str, max_len: usize) -> &str {
    &text[..text.floor_char_boundary(max_len)]
}

/// Split text into chunks that fit within Telegram's message limit.
/// Tries to split at newlines or spaces to avoid breaking words.
pub fn chunk_message(text: &str, max_len: usize) -> Vec<String> {
    if max_len == 0 {
        return Vec::new();
    }

    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut split_window_end = remaining.floor_char_boundary(max_len);
        if split_window_end == 0 {
            split_window_end = remaining
                .chars()
                .next()
                .map(char::len_utf8)
                .unwrap_or(remaining.len());
        }

        // Try to split at a newline
        let slice = &remaining[..split_window_end];
        let split_at = slice
            .rfind('\n')
            .or_else(|| slice.rfind(' '))
            .unwrap_or(split_window_end);

        let split_at = if split_at == 0 {
            split_window_end
        } else {
            split_at
        };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start_matches('\n');
        if remaining.starts_with(' ') {
            remaining = &remaining[1..];
        }
    }

    chunks
}

/// Split markdown into Telegram-safe HTML chunks that each fit `max_len`.
///
/// Unlike splitting rendered HTML directly, this chunks the markdown source and
/// renders each chunk independently so we don't cut through HTML tags.
pub fn chunk_markdown_html(markdown: &str, max_len: usize) -> Vec<String> {
    if max_len == 0 || markdown.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut remaining = markdown;
    while !remaining.is_empty() {
        let whole_html = markdown_to_telegram_html(remaining);
        if whole_html.len() <= max_len {
            chunks.push(whole_html);
            break;
        }

        let split_at = best_markdown_split(remaining, max_len);
        let head = &remaining[..split_at];
        chunks.push(markdown_to_telegram_html(head));

        remaining = &remaining[split_at..];
        remaining = remaining.trim_start_matches('\n');
        if remaining.starts_with(' ') {
            remaining = &remaining[1..];
        }
    }

    chunks
}

fn best_markdown_split(markdown: &str, max_len: usize) -> usize {
    let mut boundaries: Vec<usize> = markdown.char_indices().map(|(i, _)| i).collect();
    boundaries.push(markdown.len());

    let mut lo = 1usize;
    let mut hi = boundaries.len().saturating_sub(1);
    let mut best = 0usize;

    while lo <= hi {
        let mid = (lo + hi) / 2;
        let split = boundaries[mid];
        let html_len = markdown_to_telegram_html(&markdown[..split]).len();
        if html_len <= max_len {
            best = split;
            lo = mid + 1;
        } else if mid == 0 {
            break;
        } else {
            hi = mid - 1;
        }
    }

    if best == 0 {
        return boundaries.get(1).copied().unwrap_or(markdown.len());
    }

    let preferred_split = markdown[..best]
        .rfind('\n')
        .or_else(|| markdown[..best].rfind(' '))
        .filter(|pos| *pos > 0)
        .unwrap_or(best);

    if preferred_split == best {
        return best;
    }

    if markdown_to_telegram_html(&markdown[..preferred_split]).len() <= max_len {
        preferred_split
    } else {
        best
    }
}
