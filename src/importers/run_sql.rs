//! `runSql`: guarded raw statement execution.
//!
//! ```json
//! { "step": "runSql", "sql": { "name": "fix-tax.sql", "contents": "UPDATE wp_options SET ..." } }
//! ```
//!
//! The statement must clear every `SqlGuard` gate before it reaches the
//! database. It then runs in its own transaction: any driver error rolls the
//! transaction back and is reported verbatim.

use serde_json::{Value, json};
use tracing::{info, warn};

use super::{StepProcessor, step_property, step_types};
use crate::host::capabilities::{EDIT_POSTS, EDIT_USERS, MANAGE_OPTIONS};
use crate::host::{Authorizer, Host};
use crate::result::StepResult;
use crate::sql_guard::SqlGuard;
use crate::step::StepDefinition;

/// Capabilities an actor must hold at once to run raw SQL.
pub const RUN_SQL_CAPABILITIES: &[&str] = &[MANAGE_OPTIONS, EDIT_POSTS, EDIT_USERS];

#[derive(Debug, Clone)]
pub struct RunSql {
    guard: SqlGuard,
}

impl RunSql {
    pub fn new(guard: SqlGuard) -> Self {
        Self { guard }
    }

    fn rollback(host: &Host, result: &mut StepResult) {
        if let Err(e) = host.database.rollback() {
            warn!("Rollback failed: {}", e);
            result.add_warn(format!("Rollback failed: {}", e));
        }
    }
}

impl StepProcessor for RunSql {
    fn step_type(&self) -> &str {
        step_types::RUN_SQL
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "step": step_property(step_types::RUN_SQL),
                "sql": {
                    "type": "object",
                    "properties": {
                        "resource": { "type": "string", "enum": ["literal"] },
                        "name": { "type": "string", "minLength": 1 },
                        "contents": { "type": "string", "minLength": 1 }
                    },
                    "required": ["name", "contents"]
                }
            },
            "required": ["step", "sql"]
        })
    }

    fn check_capabilities(&self, _definition: &StepDefinition, actor: &dyn Authorizer) -> bool {
        actor.can_all(RUN_SQL_CAPABILITIES)
    }

    fn process(&self, definition: &StepDefinition, host: &Host) -> StepResult {
        let mut result = StepResult::success(step_types::RUN_SQL);
        let sql = definition.get("sql");
        let field = |key: &str| sql.and_then(|s| s.get(key)).and_then(Value::as_str);
        let (Some(name), Some(contents)) = (field("name"), field("contents")) else {
            result.add_error("sql.name and sql.contents are required");
            return result;
        };

        if let Err(rejection) = self.guard.check(contents) {
            warn!("Rejected SQL step {} at gate {}: {}", name, rejection.gate(), rejection);
            result.add_error(format!("{}: {}", name, rejection));
            return result;
        }

        if let Err(e) = host.database.begin() {
            result.add_error(format!("Unable to start a transaction for {}: {}", name, e));
            return result;
        }

        match host.database.execute(contents) {
            Ok(rows) => match host.database.commit() {
                Ok(()) => {
                    info!("SQL step {} affected {} rows", name, rows);
                    result.add_debug(format!("Executed {}: {} rows affected", name, rows));
                }
                Err(e) => {
                    Self::rollback(host, &mut result);
                    result.add_error(format!("Unable to commit {}: {}", name, e));
                }
            },
            Err(e) => {
                Self::rollback(host, &mut result);
                result.add_error(format!("Error executing {}: {}", name, e));
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Capabilities, MemoryDatabase, MemoryOptions, MemoryPackages};
    use crate::result::MessageLevel;
    use crate::storage::StorageRegistry;
    use std::sync::Arc;

    fn host(database: Arc<MemoryDatabase>) -> Host {
        Host::new(
            Arc::new(Capabilities::all()),
            Arc::new(MemoryOptions::new()),
            Arc::new(MemoryPackages::new()),
            database,
            Arc::new(StorageRegistry::new()),
        )
    }

    fn step(contents: &str) -> StepDefinition {
        StepDefinition::from_value(
            "runSql",
            json!({"sql": {"name": "fixup.sql", "contents": contents}}),
        )
    }

    #[test]
    fn test_executes_in_transaction() {
        let db = Arc::new(MemoryDatabase::new().affected_rows(3));
        let result = RunSql::new(SqlGuard::default()).process(
            &step("UPDATE wp_posts SET post_status = 'draft' WHERE post_type = 'product'"),
            &host(db.clone()),
        );

        assert!(result.is_success());
        assert_eq!(
            result.joined(MessageLevel::Debug),
            "Executed fixup.sql: 3 rows affected"
        );
        assert_eq!(db.transactions(), 1);
        assert_eq!(db.committed().len(), 1);
    }

    #[test]
    fn test_rejected_statement_never_reaches_database() {
        let db = Arc::new(MemoryDatabase::new());
        let result = RunSql::new(SqlGuard::default())
            .process(&step("DELETE FROM wp_posts"), &host(db.clone()));

        assert!(!result.is_success());
        assert!(result.joined(MessageLevel::Error).starts_with("fixup.sql: Only INSERT"));
        assert_eq!(db.transactions(), 0);
    }

    #[test]
    fn test_driver_error_rolls_back() {
        let db = Arc::new(MemoryDatabase::new().fail_with("Table 'wp_x' doesn't exist"));
        let result = RunSql::new(SqlGuard::default())
            .process(&step("UPDATE wp_x SET a = 1"), &host(db.clone()));

        assert!(!result.is_success());
        assert_eq!(
            result.joined(MessageLevel::Error),
            "Error executing fixup.sql: Table 'wp_x' doesn't exist"
        );
        assert_eq!(db.rollbacks(), 1);
        assert!(db.committed().is_empty());
    }

    #[test]
    fn test_requires_compound_capability() {
        let processor = RunSql::new(SqlGuard::default());
        let def = step("UPDATE a SET b = 1");
        assert!(processor.check_capabilities(&def, &Capabilities::from_names(RUN_SQL_CAPABILITIES.iter().copied())));
        for missing in RUN_SQL_CAPABILITIES {
            assert!(!processor.check_capabilities(&def, &Capabilities::all().without(missing)));
        }
    }
}
