//! Best-effort text scanning helpers.
//!
//! Nothing here parses SQL. Unterminated quotes or unbalanced parentheses
//! simply leave the text as it is.

use regex::Regex;
use std::sync::LazyLock;

static STRING_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'(?:[^']|'')*'").expect("valid regex"));

static QUOTED_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""[^"]*"|`[^`]*`"#).expect("valid regex"));

static LIKE_BEFORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bi?like\s*$").expect("valid regex"));

/// `%`/`_` wildcards around at most one placeholder.
static LIKE_PLACEHOLDER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[%_]*(\?|\$\d+|:[A-Za-z_]\w*)?[%_]*$").expect("valid regex")
});

const TABLE_NAME: &str = r#"(?:"[^"]*"|`[^`]*`|[A-Za-z_][\w$]*)(?:\s*\.\s*(?:"[^"]*"|`[^`]*`|[A-Za-z_][\w$]*))*"#;

static TABLE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b(?:from|join)\s+({TABLE_NAME})")).expect("valid regex")
});

/// `[[AS] alias] , table` right after a table reference.
static TABLE_LIST_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r#"(?i)^\s*(?:(?:as\s+)?(?:"[^"]*"|`[^`]*`|[A-Za-z_]\w*))?\s*,\s*({TABLE_NAME})"#
    ))
    .expect("valid regex")
});

static LIMIT_CLAUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\blimit\s+(-?\d+|\S+)").expect("valid regex"));

static WHERE_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bwhere\b").expect("valid regex"));

static WHERE_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(group\s+by|order\s+by|having|limit|offset)\b").expect("valid regex")
});

static MULTI_DIGIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^\w$.])(\d{2,})\b").expect("valid regex"));

/// Replace quoted identifiers and string literals with empty ones so
/// keyword and number scans don't look inside them.
pub(crate) fn mask(sql: &str) -> String {
    let without_identifiers = QUOTED_IDENTIFIER.replace_all(sql, "\"\"");
    STRING_LITERAL
        .replace_all(&without_identifiers, "''")
        .into_owned()
}

/// The first string literal that is not an approved LIKE/ILIKE pattern.
pub(crate) fn disallowed_string_literal(sql: &str) -> Option<&str> {
    let identifiers_masked = QUOTED_IDENTIFIER.replace_all(sql, |caps: &regex::Captures<'_>| {
        "_".repeat(caps[0].len())
    });
    // Offsets line up because masking keeps lengths
    STRING_LITERAL
        .find_iter(&identifiers_masked)
        .map(|m| (m.start(), m.end()))
        .find(|&(start, end)| {
            let content = &sql[start + 1..end - 1];
            let approved = LIKE_BEFORE.is_match(&sql[..start])
                && !content.is_empty()
                && LIKE_PLACEHOLDER_PATTERN.is_match(content);
            !approved
        })
        .map(|(start, end)| &sql[start..end])
}

/// The first multi-digit number literal in the WHERE clause of masked SQL.
pub(crate) fn where_numeric_literal(masked: &str) -> Option<&str> {
    let start = WHERE_KEYWORD.find(masked)?.end();
    let rest = &masked[start..];
    let end = WHERE_END.find(rest).map_or(rest.len(), |m| m.start());
    MULTI_DIGIT
        .captures(&rest[..end])
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Table names referenced by FROM and JOIN, including every entry of a
/// comma-separated FROM list. Quotes and whitespace are removed.
pub(crate) fn referenced_tables(sql: &str) -> Vec<String> {
    let mut tables = Vec::new();
    for caps in TABLE_REFERENCE.captures_iter(sql) {
        let Some(first) = caps.get(1) else { continue };
        tables.push(table_name(first.as_str()));

        let mut end = first.end();
        while let Some(item) = TABLE_LIST_ITEM.captures(&sql[end..]) {
            let Some(table) = item.get(1) else { break };
            tables.push(table_name(table.as_str()));
            end += table.end();
        }
    }
    tables
}

fn table_name(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '"' | '`') && !c.is_whitespace())
        .collect()
}

/// The statement's LIMIT clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LimitClause {
    Absent,
    /// A literal count. Values that overflow `i64` saturate.
    Value(i64),
    /// Bound through a placeholder.
    Bound,
}

/// The last LIMIT in the statement, which is the outer one for the
/// statements the compiler emits.
pub(crate) fn limit_clause(masked: &str) -> LimitClause {
    let Some(caps) = LIMIT_CLAUSE.captures_iter(masked).last() else {
        return LimitClause::Absent;
    };
    let raw = caps.get(1).map_or("", |m| m.as_str());
    if raw.eq_ignore_ascii_case("all") {
        return LimitClause::Absent;
    }
    if raw.starts_with(|c: char| c.is_ascii_digit() || c == '-') {
        let saturated = if raw.starts_with('-') { i64::MIN } else { i64::MAX };
        return LimitClause::Value(raw.parse().unwrap_or(saturated));
    }
    LimitClause::Bound
}
