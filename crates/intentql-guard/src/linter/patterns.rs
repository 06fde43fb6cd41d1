//! Rule tables for the lexical checks.
//!
//! Every pattern is matched case-insensitively against the raw SQL text.

use intentql_core::PatternRule;
use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;

/// A named, compiled pattern.
#[derive(Debug, Clone)]
pub(crate) struct Rule {
    pub name: &'static str,
    pub regex: Regex,
}

pub(crate) fn compile(rule: &PatternRule) -> Result<Rule, regex::Error> {
    let regex = RegexBuilder::new(rule.pattern)
        .case_insensitive(true)
        .build()?;
    Ok(Rule {
        name: rule.name,
        regex,
    })
}

fn compile_table(rules: &[PatternRule]) -> Vec<Rule> {
    rules
        .iter()
        .map(|rule| compile(rule).expect("built-in guard pattern must compile"))
        .collect()
}

/// First rule in `rules` that matches `sql`.
pub(crate) fn first_match<'r>(rules: &'r [Rule], sql: &str) -> Option<&'r Rule> {
    rules.iter().find(|rule| rule.regex.is_match(sql))
}

// =============================================================================
// Statement type
// =============================================================================

pub(crate) static SELECT_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*select\b").expect("valid regex"));

pub(crate) static FORBIDDEN_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(drop|alter|create|insert|update|delete|truncate|grant|revoke|exec|execute|call)\b",
    )
    .expect("valid regex")
});

// =============================================================================
// Dangerous patterns
// =============================================================================

const INJECTION: &[PatternRule] = &[
    PatternRule::new("line_comment", r"--"),
    PatternRule::new("block_comment", r"/\*|\*/"),
    PatternRule::new("hash_comment", r"#"),
    PatternRule::new(
        "tautology",
        r"\bor\s+(\d+|'[^']*')\s*=\s*(\d+|'[^']*')",
    ),
    PatternRule::new("tautology_boolean", r"\bor\s+(not\s+false|true)\b"),
    PatternRule::new("union_injection", r"\bunion\s+(all\s+|distinct\s+)?select\b"),
    PatternRule::new("hex_literal", r"\b0x[0-9a-f]+|\bx'[0-9a-f]*'"),
    PatternRule::new("quote_breakout", r"'\s*\)?\s*(or|and)\s+['\d(]"),
    PatternRule::new("escaped_quote", r"\\'"),
    PatternRule::new("string_concatenation", r"\|\||\bconcat(_ws)?\s*\("),
    PatternRule::new("information_schema", r"\binformation_schema\b"),
    PatternRule::new("file_output", r"\binto\s+(out|dump)file\b|\bload\s+data\b"),
];

const ENCODING_BYPASS: &[PatternRule] = &[
    PatternRule::new("url_encoding", r"%[0-9a-f]{2}"),
    PatternRule::new("html_entity", r"&#x?[0-9a-f]+;?|&(lt|gt|quot|apos|amp);"),
    PatternRule::new("hex_escape", r"\\x[0-9a-f]{2}"),
    PatternRule::new("unicode_escape", r"\\u[0-9a-f]{4}"),
    PatternRule::new("octal_escape", r"\\[0-7]{3}"),
    PatternRule::new("char_function", r"\b(n?char|chr)\s*\(\s*\d"),
];

const POLYGLOT: &[PatternRule] = &[
    PatternRule::new("mysql_error_based", r"\b(extractvalue|updatexml)\s*\("),
    PatternRule::new("mssql_convert_error", r"\bconvert\s*\(\s*int\b"),
    PatternRule::new(
        "mssql_extended_procedure",
        r"\bxp_(cmdshell|regread|regwrite|dirtree|fileexist|servicecontrol)\b",
    ),
    PatternRule::new("oracle_network", r"\b(utl_inaddr|utl_http|dbms_pipe)\b"),
    PatternRule::new("oracle_dual", r"\bfrom\s+dual\b"),
    PatternRule::new("conditional_select", r"\bif\s*\([^)]*\bselect\b"),
];

const TIME_DELAY: &[PatternRule] = &[
    PatternRule::new("sleep", r"\bsleep\s*\("),
    PatternRule::new("pg_sleep", r"\bpg_sleep(_for|_until)?\s*\("),
    PatternRule::new("benchmark", r"\bbenchmark\s*\("),
    PatternRule::new("waitfor", r"\bwaitfor\s+(delay|time)\b"),
    PatternRule::new("randomblob", r"\brandomblob\s*\("),
    PatternRule::new("dbms_lock_sleep", r"\bdbms_lock\s*\.\s*sleep\b"),
];

/// Generic dangerous patterns, in check order.
pub(crate) static DANGEROUS: LazyLock<Vec<Rule>> = LazyLock::new(|| compile_table(INJECTION));

/// Encoding bypass, polyglot and time-delay signatures.
pub(crate) static EVASION: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    let mut rules = compile_table(ENCODING_BYPASS);
    rules.extend(compile_table(POLYGLOT));
    rules.extend(compile_table(TIME_DELAY));
    rules
});

// =============================================================================
// Functions
// =============================================================================

const FUNCTIONS: &[PatternRule] = &[
    PatternRule::new(
        "file_access",
        r"\b(load_file|pg_read_file|pg_read_binary_file|pg_ls_dir|pg_stat_file|lo_import|lo_export|utl_file\w*)\s*\(",
    ),
    PatternRule::new(
        "system_command",
        r"\b(sys_exec|sys_eval|xp_cmdshell|sp_oacreate|sp_executesql|load_extension|dbms_java\w*)\s*\(",
    ),
    PatternRule::new(
        "introspection",
        r"\b(version|database|schema|sqlite_version|inet_server_addr|inet_client_addr|pg_backend_pid)\s*\(",
    ),
    PatternRule::new(
        "session",
        r"\b(user|current_user|session_user|system_user|current_setting|set_config|pg_terminate_backend|pg_cancel_backend)\s*\(",
    ),
];

pub(crate) static BLACKLISTED_FUNCTIONS: LazyLock<Vec<Rule>> =
    LazyLock::new(|| compile_table(FUNCTIONS));

// =============================================================================
// Shapes
// =============================================================================

pub(crate) static COUNT_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bcount\s*\(").expect("valid regex"));

pub(crate) static AGGREGATE_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(sum|avg|min|max)\s*\(").expect("valid regex"));

pub(crate) static EXISTS_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bexists\s*\(").expect("valid regex"));

pub(crate) static SELECT_DISTINCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bselect\s+distinct\b").expect("valid regex"));

pub(crate) static SUBQUERY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\(\s*select\b").expect("valid regex"));

pub(crate) static JOIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bjoin\b").expect("valid regex"));

pub(crate) static ON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bon\b").expect("valid regex"));

pub(crate) static DISTINCT_ON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bdistinct\s+on\b").expect("valid regex"));
