//! Property-Based Tests for Blueprint
//!
//! These tests verify:
//! - The SQL guard is a pure function of the statement text
//! - Every documented rejection survives whitespace and case changes
//! - Rejections survive inline comments used as separators and quoted identifiers
//! - Only the three allowed statement types ever pass
//! - Result merging and landing page rules hold for arbitrary input

use proptest::prelude::*;

use blueprint::result::{MessageLevel, StepResult};
use blueprint::sql_guard::{SqlGuard, SqlRejection};
use blueprint::step::{StepDefinition, validate_landing_page};

// =============================================================================
// SQL Guard Property Tests
// =============================================================================

/// Statements that must be rejected, with the gate that fires.
const REJECTED: &[(&str, u8)] = &[
    ("SELECT * FROM wp_users", 1),
    ("DELETE FROM wp_posts WHERE ID = 1", 1),
    ("DROP TABLE wp_posts", 1),
    (
        "INSERT INTO wp_postmeta (meta_key, meta_value) VALUES ('a','b') -- DROP TABLE wp_users",
        2,
    ),
    ("INSERT INTO wp_posts (post_title) VALUES ('a') /*!50000 SLEEP(5) */", 2),
    ("UPDATE wp_posts SET post_title = 'x' WHERE ID = 1 OR 1=1", 3),
    ("INSERT INTO wp_posts (post_title) SELECT 1 UNION SELECT user_pass", 3),
    ("UPDATE wp_posts SET post_title = CHAR(65)", 3),
    ("UPDATE wp_users SET user_pass = 'x'", 4),
    ("INSERT INTO wp_usermeta (meta_key) VALUES ('nickname')", 4),
    (
        "UPDATE wp_options SET option_value='x' WHERE option_name='user_roles'",
        5,
    ),
    (
        "INSERT INTO wp_options (option_name, option_value) VALUES ('default_role', 'administrator')",
        5,
    ),
];

const ALLOWED: &[&str] = &[
    "INSERT INTO wp_options (option_name, option_value) VALUES ('blogname', 'Shop')",
    "UPDATE wp_posts SET post_status = 'draft' WHERE post_type = 'product'",
    "REPLACE INTO wp_termmeta (term_id, meta_key, meta_value) VALUES (3, 'color', 'red')",
];

fn rejected_strategy() -> impl Strategy<Value = (&'static str, u8)> {
    prop::sample::select(REJECTED)
}

fn allowed_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(ALLOWED)
}

/// Leading/trailing whitespace without a statement terminator.
fn padding_strategy() -> impl Strategy<Value = String> {
    "[ \t\n]{0,4}"
}

/// Token separators the server reads as whitespace.
const SEPARATORS: &[&str] = &[" ", "\n", "\t ", "/**/", "/* note */", "-- note\n"];

fn separator_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(SEPARATORS)
}

/// Rewrite a statement with every space replaced by `separator`, optionally
/// quoting table names as backtick identifiers.
fn disguise(sql: &str, separator: &str, quote_tables: bool) -> String {
    sql.split(' ')
        .map(|word| {
            if quote_tables && word.starts_with("wp_") {
                format!("`{}`", word)
            } else {
                word.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(separator)
}

proptest! {
    /// Same text, same verdict, across guard instances
    #[test]
    fn guard_is_deterministic(sql in ".{0,80}") {
        let first = SqlGuard::default().check(&sql);
        let second = SqlGuard::default().check(&sql);
        prop_assert_eq!(first, second);
    }

    /// Rejections fire at the same gate whatever the padding
    #[test]
    fn rejections_survive_padding(
        (sql, gate) in rejected_strategy(),
        lead in padding_strategy(),
        trail in padding_strategy(),
    ) {
        let padded = format!("{}{}{}", lead, sql, trail);
        let err = SqlGuard::default().check(&padded);
        prop_assert_eq!(err.map_err(|e| e.gate()), Err(gate));
    }

    /// Rejections ignore keyword case
    #[test]
    fn rejections_survive_lowercase((sql, _gate) in rejected_strategy()) {
        prop_assert!(!SqlGuard::default().is_allowed(&sql.to_lowercase()));
    }

    /// Comment separators and quoted identifiers do not get a statement through
    #[test]
    fn rejections_survive_disguise(
        (sql, _gate) in rejected_strategy(),
        separator in separator_strategy(),
        quote_tables in any::<bool>(),
    ) {
        let disguised = disguise(sql, separator, quote_tables);
        prop_assert!(
            !SqlGuard::default().is_allowed(&disguised),
            "allowed: {}",
            disguised
        );
    }

    /// A trailing backslash never lets a backtick identifier swallow a stacked statement
    #[test]
    fn stacked_after_backtick_identifier(
        alias in "[a-z]{1,6}",
        separator in separator_strategy(),
    ) {
        let sql = format!(
            "UPDATE wp_posts AS `{alias}\\` SET `{alias}\\`.post_title = 'x';{separator}DELETE FROM wp_comments"
        );
        let err = SqlGuard::default().check(&sql);
        prop_assert_eq!(err.map_err(|e| e.gate()), Err(3));
    }

    /// Allowed fixups stay allowed under padding
    #[test]
    fn allowed_survive_padding(
        sql in allowed_strategy(),
        lead in padding_strategy(),
        trail in padding_strategy(),
    ) {
        let padded = format!("{}{}{}", lead, sql, trail);
        prop_assert!(SqlGuard::default().is_allowed(&padded));
    }

    /// Anything not starting with an allowed verb is stopped at gate 1
    #[test]
    fn unknown_verbs_stop_at_gate_one(verb in "(SELECT|DELETE|CREATE|ALTER|SET|SHOW|CALL)", rest in "[a-z_ ]{0,30}") {
        let sql = format!("{} {}", verb, rest);
        let rejected_at_gate_one = matches!(
            SqlGuard::default().check(&sql),
            Err(SqlRejection::UnsupportedStatement { .. })
        );
        prop_assert!(rejected_at_gate_one);
    }

    /// Statements touching the users table never pass, whatever the verb
    #[test]
    fn users_table_never_passes(verb in "(INSERT INTO|UPDATE|REPLACE INTO)", column in "[a-z_]{1,12}") {
        let sql = format!("{} wp_users SET {} = 1", verb, column);
        prop_assert!(!SqlGuard::default().is_allowed(&sql));
    }
}

// =============================================================================
// Result Property Tests
// =============================================================================

fn level_strategy() -> impl Strategy<Value = MessageLevel> {
    prop_oneof![
        Just(MessageLevel::Debug),
        Just(MessageLevel::Info),
        Just(MessageLevel::Warn),
        Just(MessageLevel::Error),
    ]
}

fn result_strategy() -> impl Strategy<Value = StepResult> {
    prop::collection::vec((level_strategy(), "[a-z ]{1,12}"), 0..6).prop_map(|messages| {
        let mut result = StepResult::success("setSiteOptions");
        for (level, text) in messages {
            match level {
                MessageLevel::Debug => result.add_debug(text),
                MessageLevel::Info => result.add_info(text),
                MessageLevel::Warn => result.add_warn(text),
                MessageLevel::Error => result.add_error(text),
            }
        }
        result
    })
}

proptest! {
    /// merge: success is the conjunction, messages are concatenated
    #[test]
    fn merge_is_conjunction(a in result_strategy(), b in result_strategy()) {
        let mut merged = a.clone();
        merged.merge(b.clone());
        prop_assert_eq!(merged.is_success(), a.is_success() && b.is_success());
        prop_assert_eq!(merged.messages(None).len(), a.messages(None).len() + b.messages(None).len());
    }

    /// A result fails exactly when it holds an error message
    #[test]
    fn success_iff_no_errors(result in result_strategy()) {
        prop_assert_eq!(result.is_success(), result.messages(Some(MessageLevel::Error)).is_empty());
    }

    /// Absolute and protocol-relative URLs are never landing pages
    #[test]
    fn urls_are_not_landing_pages(host in "[a-z]{1,10}\\.[a-z]{2,3}", path in "[a-z/]{0,10}") {
        let absolute = format!("https://{}/{}", host, path);
        let protocol_relative = format!("//{}/{}", host, path);
        let relative = format!("/{}{}", host, path);
        prop_assert!(validate_landing_page(&absolute).is_err());
        prop_assert!(validate_landing_page(&protocol_relative).is_err());
        prop_assert!(validate_landing_page(&relative).is_ok());
    }

    /// The wire document always carries the step type
    #[test]
    fn document_carries_step_type(step_type in "[a-z]{1,8}(/[a-z]{1,8})?") {
        let doc = StepDefinition::from_value(step_type.clone(), serde_json::json!({"k": 1})).to_document();
        prop_assert_eq!(doc["step"].as_str(), Some(step_type.as_str()));
    }
}
