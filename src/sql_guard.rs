//! SQL step gatekeeper.
//!
//! Raw statements from `runSql` steps pass through five ordered gates before
//! they may reach the database:
//!
//! 1. **Statement type** - only `INSERT`, `UPDATE` and `REPLACE INTO`.
//! 2. **Comment hiding** - no dangerous keyword inside `--`, `#`, `/* */`
//!    or version-gated `/*! */` comments.
//! 3. **Injection signatures** - UNION SELECT, tautologies, stacked
//!    statements, time delays, file primitives, DDL, metadata access,
//!    character obfuscation, system tables. Inline comments count as
//!    whitespace here, the way the server reads them.
//! 4. **Protected tables** - the users and usermeta tables are never touched.
//! 5. **Privilege escalation** - statements on the options table may not
//!    mention roles or capabilities.
//!
//! The first gate decides whether the rest run at all. Every gate reports its
//! own error so operators can tell which one fired. Checks are pure string
//! inspection: the same statement always gets the same verdict.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::error::{BlueprintError, Result};

/// Statement prefixes allowed through gate 1.
pub const ALLOWED_STATEMENTS: &[&str] = &["INSERT", "UPDATE", "REPLACE INTO"];

/// Keywords that may not appear inside a comment.
pub const COMMENT_KEYWORDS: &[&str] = &[
    "DELETE",
    "DROP",
    "ALTER",
    "CREATE",
    "TRUNCATE",
    "GRANT",
    "REVOKE",
    "EXEC",
    "EXECUTE",
    "CALL",
    "INTO OUTFILE",
    "INTO DUMPFILE",
    "LOAD_FILE",
    "LOAD DATA",
    "BENCHMARK",
    "SLEEP",
    "INFORMATION_SCHEMA",
    "USER(",
    "DATABASE(",
    "SCHEMA(",
];

/// Substrings that mark role/capability rows in the options table.
pub const ESCALATION_MARKERS: &[&str] = &[
    "user_roles",
    "capabilities",
    "wp_user_",
    "role_",
    "administrator",
];

/// Why a statement was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SqlRejection {
    #[error("SQL statement is empty")]
    Empty,

    #[error("Only INSERT, UPDATE and REPLACE INTO statements are allowed, found '{found}'")]
    UnsupportedStatement { found: String },

    #[error("SQL comment contains forbidden keyword '{keyword}'")]
    HiddenInComment { keyword: &'static str },

    #[error("SQL matches a known injection pattern: {signature}")]
    InjectionPattern { signature: &'static str },

    #[error("Modifying the protected table '{table}' is not allowed")]
    ProtectedTable { table: String },

    #[error("Options table change references privilege-related value '{marker}'")]
    PrivilegeEscalation { marker: String },
}

impl SqlRejection {
    /// Gate number (1-5) that produced this rejection.
    pub fn gate(&self) -> u8 {
        match self {
            Self::Empty | Self::UnsupportedStatement { .. } => 1,
            Self::HiddenInComment { .. } => 2,
            Self::InjectionPattern { .. } => 3,
            Self::ProtectedTable { .. } => 4,
            Self::PrivilegeEscalation { .. } => 5,
        }
    }
}

fn statement_type_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(INSERT|UPDATE|REPLACE\s+INTO)\b").expect("static regex")
    })
}

fn comment_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"--[^\n]*",
            r"#[^\n]*",
            // Block and version-gated comments, terminated or not.
            r"(?s)/\*.*?(\*/|$)",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static regex"))
        .collect()
    })
}

fn injection_patterns() -> &'static [(&'static str, Regex)] {
    static PATTERNS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            ("UNION SELECT", r"(?i)\bUNION\s+(ALL\s+)?SELECT\b"),
            ("numeric tautology", r"(?i)\b(OR|AND)\s+\d+\s*=\s*\d+\b"),
            ("statement termination followed by comment", r";\s*(--|#|/\*)"),
            ("time-based delay SLEEP()", r"(?i)\bSLEEP\s*\("),
            ("time-based delay BENCHMARK()", r"(?i)\bBENCHMARK\s*\("),
            ("file read LOAD_FILE()", r"(?i)\bLOAD_FILE\s*\("),
            ("file write INTO OUTFILE/DUMPFILE", r"(?i)\bINTO\s+(OUTFILE|DUMPFILE)\b"),
            (
                "DDL statement",
                r"(?i)\b(DROP|ALTER|CREATE|TRUNCATE|RENAME)\s+(TEMPORARY\s+)?(TABLE|DATABASE|SCHEMA|INDEX|VIEW|USER|PROCEDURE|FUNCTION|TRIGGER|EVENT)\b",
            ),
            ("privilege statement", r"(?i)\b(GRANT|REVOKE)\s+(ALL|SELECT|INSERT|UPDATE|DELETE|EXECUTE)\b"),
            ("metadata access INFORMATION_SCHEMA", r"(?i)\bINFORMATION_SCHEMA\b"),
            ("metadata access SCHEMA_NAME", r"(?i)\bSCHEMA_NAME\b"),
            ("metadata access DATABASE()", r"(?i)\bDATABASE\s*\(\s*\)"),
            ("character obfuscation CHR()", r"(?i)\bCHR\s*\("),
            ("character obfuscation CHAR()", r"(?i)\bCHAR\s*\("),
            ("system table access", r"(?i)\bFROM\s+`?(mysql|information_schema)`?\."),
        ]
        .into_iter()
        .map(|(name, p)| (name, Regex::new(p).expect("static regex")))
        .collect()
    })
}

fn quoted_tautology_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)\b(?:OR|AND)\s+(['"])(\w*)['"]\s*=\s*(['"])(\w*)['"]"#)
            .expect("static regex")
    })
}

/// Index just past the string literal or quoted identifier opening at `start`.
///
/// Backslash escapes only exist inside `'` and `"` literals. Every quote kind
/// treats a doubled quote character as an escaped one.
fn literal_end(chars: &[char], start: usize) -> usize {
    let quote = chars[start];
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        if c == '\\' && quote != '`' {
            i += 2;
        } else if c == quote {
            if chars.get(i + 1) == Some(&quote) {
                i += 2;
            } else {
                return i + 1;
            }
        } else {
            i += 1;
        }
    }
    chars.len()
}

fn line_end(chars: &[char], start: usize) -> usize {
    chars[start..]
        .iter()
        .position(|&c| c == '\n')
        .map_or(chars.len(), |offset| start + offset)
}

/// Statement text as the server parses it: comments outside literals become
/// a single space, version-gated `/*! */` comments keep their body.
fn strip_comments(sql: &str) -> String {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut in_versioned = false;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            '\'' | '"' | '`' => {
                let end = literal_end(&chars, i);
                out.extend(&chars[i..end]);
                i = end;
            }
            '/' if next == Some('*') && chars.get(i + 2) == Some(&'!') => {
                in_versioned = true;
                i += 3;
                while chars.get(i).is_some_and(char::is_ascii_digit) {
                    i += 1;
                }
                out.push(' ');
            }
            '/' if next == Some('*') => {
                i = chars[i + 2..]
                    .windows(2)
                    .position(|w| w == ['*', '/'])
                    .map_or(chars.len(), |offset| i + 2 + offset + 2);
                out.push(' ');
            }
            '*' if in_versioned && next == Some('/') => {
                in_versioned = false;
                i += 2;
                out.push(' ');
            }
            '#' => {
                i = line_end(&chars, i);
                out.push(' ');
            }
            '-' if next == Some('-')
                && chars.get(i + 2).is_none_or(|c| c.is_whitespace()) =>
            {
                i = line_end(&chars, i);
                out.push(' ');
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

/// True when a `;` outside literals is followed by more SQL. Expects text
/// that has been through `strip_comments`.
fn has_stacked_statement(stripped: &str) -> bool {
    let chars: Vec<char> = stripped.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\'' | '"' | '`' => i = literal_end(&chars, i),
            ';' if chars[i + 1..].iter().any(|c| !c.is_whitespace()) => return true,
            _ => i += 1,
        }
    }
    false
}

/// Validates raw statements for the `runSql` step.
#[derive(Debug, Clone)]
pub struct SqlGuard {
    protected_tables: Vec<(String, Regex)>,
    options_table: String,
    escalation_markers: Vec<String>,
}

impl Default for SqlGuard {
    fn default() -> Self {
        Self::new("wp_").expect("default table prefix is valid")
    }
}

impl SqlGuard {
    /// Guard for tables named `<prefix>users`, `<prefix>usermeta` and `<prefix>options`.
    pub fn new(table_prefix: &str) -> Result<Self> {
        let mut protected_tables = Vec::new();
        for table in ["users", "usermeta"] {
            let name = format!("{}{}", table_prefix, table);
            let pattern = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(&name)))
                .map_err(|e| BlueprintError::config(format!("Invalid table prefix: {}", e)))?;
            protected_tables.push((name, pattern));
        }

        let mut escalation_markers: Vec<String> =
            ESCALATION_MARKERS.iter().map(|m| m.to_string()).collect();
        let prefixed_user = format!("{}user_", table_prefix.to_lowercase());
        if !escalation_markers.contains(&prefixed_user) {
            escalation_markers.push(prefixed_user);
        }

        Ok(Self {
            protected_tables,
            options_table: format!("{}options", table_prefix).to_lowercase(),
            escalation_markers,
        })
    }

    /// Run every gate in order; the first violation wins.
    pub fn check(&self, sql: &str) -> std::result::Result<(), SqlRejection> {
        let normalized = sql.trim().to_uppercase();

        // Gate 1 decides whether the pattern gates run at all.
        if normalized.is_empty() {
            return Err(SqlRejection::Empty);
        }
        if !statement_type_pattern().is_match(&normalized) {
            let found = normalized
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_string();
            return Err(SqlRejection::UnsupportedStatement { found });
        }

        self.check_comments(&normalized)?;
        self.check_injection(sql)?;
        self.check_protected_tables(sql)?;
        self.check_options_escalation(sql)
    }

    /// Convenience wrapper returning `true` when the statement may run.
    pub fn is_allowed(&self, sql: &str) -> bool {
        self.check(sql).is_ok()
    }

    fn check_comments(&self, normalized: &str) -> std::result::Result<(), SqlRejection> {
        for pattern in comment_patterns() {
            for comment in pattern.find_iter(normalized) {
                if let Some(keyword) = COMMENT_KEYWORDS
                    .iter()
                    .copied()
                    .find(|k| comment.as_str().contains(k))
                {
                    return Err(SqlRejection::HiddenInComment { keyword });
                }
            }
        }
        Ok(())
    }

    fn check_injection(&self, sql: &str) -> std::result::Result<(), SqlRejection> {
        // Inline comments act as whitespace, so signatures are matched on the
        // raw text and on the text the server will actually parse.
        let stripped = strip_comments(sql);
        let views = [sql, stripped.as_str()];

        if let Some(signature) = injection_patterns()
            .iter()
            .find(|(_, re)| views.iter().any(|text| re.is_match(text)))
            .map(|(name, _)| *name)
        {
            return Err(SqlRejection::InjectionPattern { signature });
        }

        let tautology = views.iter().any(|text| {
            quoted_tautology_pattern()
                .captures_iter(text)
                .any(|caps| caps.get(2).map(|m| m.as_str()) == caps.get(4).map(|m| m.as_str()))
        });
        if tautology {
            return Err(SqlRejection::InjectionPattern {
                signature: "quoted tautology",
            });
        }

        if has_stacked_statement(&stripped) {
            return Err(SqlRejection::InjectionPattern {
                signature: "stacked statements",
            });
        }
        Ok(())
    }

    fn check_protected_tables(&self, sql: &str) -> std::result::Result<(), SqlRejection> {
        match self.protected_tables.iter().find(|(_, re)| re.is_match(sql)) {
            Some((table, _)) => Err(SqlRejection::ProtectedTable {
                table: table.clone(),
            }),
            None => Ok(()),
        }
    }

    fn check_options_escalation(&self, sql: &str) -> std::result::Result<(), SqlRejection> {
        let lowered = sql.to_lowercase();
        if !lowered.contains(&self.options_table) {
            return Ok(());
        }
        match self
            .escalation_markers
            .iter()
            .find(|m| lowered.contains(m.as_str()))
        {
            Some(marker) => Err(SqlRejection::PrivilegeEscalation {
                marker: marker.clone(),
            }),
            None => Ok(()),
        }
    }
}
