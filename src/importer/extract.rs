//! Line-oriented extraction of identifier entries from message text.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

/// Indian ISIN: `INE` followed by nine upper-case alphanumerics.
static CODE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bINE[A-Z0-9]{9}\b").unwrap());

/// Column headings that mark a line as a table header.
static HEADER_WORDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(Company|ISIN|Instrument)\b").unwrap());

/// One identifier found in a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierEntry {
    pub code: String,
    /// Tokens before the code. May be empty.
    pub issuer: String,
    /// Tokens after the code. May be empty.
    pub instrument: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Skip lines that look like a table header.
    pub skip_header_lines: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            skip_header_lines: true,
        }
    }
}

/// Parse a single line. `None` when the line has no code or is a header.
pub fn parse_line(line: &str, options: ExtractOptions) -> Option<IdentifierEntry> {
    let code = CODE_PATTERN.find(line)?.as_str();
    if options.skip_header_lines && HEADER_WORDS.is_match(line) {
        return None;
    }

    let cleaned: String = line
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() || matches!(c, '-' | '&' | '.' | '/') {
                c
            } else {
                ' '
            }
        })
        .collect();
    let tokens: Vec<&str> = cleaned.split_whitespace().collect();
    let at = tokens.iter().position(|t| t.contains(code))?;

    let issuer_tokens: Vec<&str> = tokens[..at]
        .iter()
        .copied()
        .skip_while(|t| is_serial_number(t))
        .collect();

    Some(IdentifierEntry {
        code: code.to_string(),
        issuer: issuer_tokens.join(" "),
        instrument: tokens[at + 1..].join(" "),
    })
}

/// Every entry in `body`, first occurrence of each code only.
pub fn extract_entries(body: &str, options: ExtractOptions) -> Vec<IdentifierEntry> {
    let mut seen = HashSet::new();
    body.lines()
        .filter_map(|line| parse_line(line, options))
        .filter(|entry| seen.insert(entry.code.clone()))
        .collect()
}

/// Leading `1`, `2.` or `10.` row numbers in tabular mail.
fn is_serial_number(token: &str) -> bool {
    token.chars().all(|c| c.is_ascii_digit() || c == '.')
}
