//! Migration steps and plans.
//!
//! A step pairs a predicate ("is this change already in the schema?") with the
//! statements that make the change. Steps are applied in plan order, and a
//! plan is safe to re-run because every step checks its predicate first.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use socialconnect_common::{Error, Result};

use crate::backend::SchemaBackend;

/// MySQL's limit on table, column and constraint name length.
const MAX_IDENTIFIER_LEN: usize = 64;

/// `ON DELETE` behaviour of a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReferentialAction {
    Cascade,
    SetNull,
    Restrict,
    NoAction,
}

impl ReferentialAction {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::Restrict => "RESTRICT",
            Self::NoAction => "NO ACTION",
        }
    }
}

/// The kinds of schema change a step can make.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StepKind {
    /// `ddl` must be a complete `CREATE TABLE` statement for `table`.
    CreateTable { table: String, ddl: String },
    AddColumn {
        table: String,
        column: String,
        definition: String,
    },
    AddForeignKey {
        table: String,
        column: String,
        constraint: String,
        references_table: String,
        references_column: String,
        on_delete: ReferentialAction,
    },
    /// Set `column = value` on rows where it is NULL.
    Backfill {
        table: String,
        column: String,
        value: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStep {
    pub name: String,
    pub kind: StepKind,
}

impl MigrationStep {
    pub fn create_table(table: impl Into<String>, ddl: impl Into<String>) -> Self {
        let table = table.into();
        Self {
            name: format!("create_table_{table}"),
            kind: StepKind::CreateTable {
                table,
                ddl: ddl.into(),
            },
        }
    }

    pub fn add_column(
        table: impl Into<String>,
        column: impl Into<String>,
        definition: impl Into<String>,
    ) -> Self {
        let (table, column) = (table.into(), column.into());
        Self {
            name: format!("add_column_{table}_{column}"),
            kind: StepKind::AddColumn {
                table,
                column,
                definition: definition.into(),
            },
        }
    }

    /// Foreign key from `table.column` to `references_table.references_column`.
    /// The constraint name defaults to `fk_<table>_<column>`.
    pub fn add_foreign_key(
        table: impl Into<String>,
        column: impl Into<String>,
        references_table: impl Into<String>,
        references_column: impl Into<String>,
    ) -> Self {
        let (table, column) = (table.into(), column.into());
        let constraint = format!("fk_{table}_{column}");
        Self {
            name: format!("add_foreign_key_{constraint}"),
            kind: StepKind::AddForeignKey {
                table,
                column,
                constraint,
                references_table: references_table.into(),
                references_column: references_column.into(),
                on_delete: ReferentialAction::Cascade,
            },
        }
    }

    pub fn backfill(
        table: impl Into<String>,
        column: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        let (table, column) = (table.into(), column.into());
        Self {
            name: format!("backfill_{table}_{column}"),
            kind: StepKind::Backfill {
                table,
                column,
                value: value.into(),
            },
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Override the constraint name of an `AddForeignKey` step. A step name
    /// still derived from the old constraint follows the new one. No-op for
    /// other kinds.
    pub fn with_constraint(mut self, name: impl Into<String>) -> Self {
        if let StepKind::AddForeignKey { constraint, .. } = &mut self.kind {
            let name = name.into();
            if self.name == format!("add_foreign_key_{constraint}") {
                self.name = format!("add_foreign_key_{name}");
            }
            *constraint = name;
        }
        self
    }

    /// Override the `ON DELETE` action of an `AddForeignKey` step. No-op for
    /// other kinds.
    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        if let StepKind::AddForeignKey { on_delete, .. } = &mut self.kind {
            *on_delete = action;
        }
        self
    }

    /// The table this step touches.
    pub fn table(&self) -> &str {
        match &self.kind {
            StepKind::CreateTable { table, .. }
            | StepKind::AddColumn { table, .. }
            | StepKind::AddForeignKey { table, .. }
            | StepKind::Backfill { table, .. } => table,
        }
    }

    /// Evaluate the step's predicate against the live schema.
    pub async fn is_applied<B>(&self, backend: &mut B) -> Result<bool>
    where
        B: SchemaBackend + ?Sized,
    {
        match &self.kind {
            StepKind::CreateTable { table, .. } => backend.table_exists(table).await,
            StepKind::AddColumn { table, column, .. } => {
                backend.column_exists(table, column).await
            }
            StepKind::AddForeignKey {
                table, constraint, ..
            } => backend.constraint_exists(table, constraint).await,
            StepKind::Backfill { table, column, .. } => {
                Ok(backend.null_count(table, column).await? == 0)
            }
        }
    }

    /// The statements that perform the change, in execution order.
    pub fn statements(&self) -> Vec<String> {
        match &self.kind {
            StepKind::CreateTable { ddl, .. } => vec![ddl.trim().to_string()],
            StepKind::AddColumn {
                table,
                column,
                definition,
            } => vec![format!(
                "ALTER TABLE `{table}` ADD COLUMN `{column}` {}",
                definition.trim()
            )],
            StepKind::AddForeignKey {
                table,
                column,
                constraint,
                references_table,
                references_column,
                on_delete,
            } => vec![format!(
                "ALTER TABLE `{table}` ADD CONSTRAINT `{constraint}` FOREIGN KEY (`{column}`) \
                 REFERENCES `{references_table}`(`{references_column}`) ON DELETE {}",
                on_delete.as_sql()
            )],
            StepKind::Backfill {
                table,
                column,
                value,
            } => vec![format!(
                "UPDATE `{table}` SET `{column}` = {} WHERE `{column}` IS NULL",
                quote_literal(value)
            )],
        }
    }

    fn identifiers(&self) -> Vec<&str> {
        match &self.kind {
            StepKind::CreateTable { table, .. } => vec![table.as_str()],
            StepKind::AddColumn { table, column, .. }
            | StepKind::Backfill { table, column, .. } => vec![table.as_str(), column.as_str()],
            StepKind::AddForeignKey {
                table,
                column,
                constraint,
                references_table,
                references_column,
                ..
            } => vec![
                table.as_str(),
                column.as_str(),
                constraint.as_str(),
                references_table.as_str(),
                references_column.as_str(),
            ],
        }
    }
}

impl fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// An ordered list of steps. Later steps may depend on earlier ones.
#[derive(Debug, Clone, Default)]
pub struct MigrationPlan {
    steps: Vec<MigrationStep>,
}

impl MigrationPlan {
    /// Build a plan, rejecting duplicate step names and identifiers that
    /// are not safe to splice into DDL.
    pub fn new(steps: Vec<MigrationStep>) -> Result<Self> {
        let mut seen = HashSet::new();
        for step in &steps {
            if step.name.trim().is_empty() {
                return Err(Error::Plan("step name cannot be empty".into()));
            }
            if !seen.insert(step.name.as_str()) {
                return Err(Error::Plan(format!("duplicate step name '{}'", step.name)));
            }
            for ident in step.identifiers() {
                validate_identifier(ident)
                    .map_err(|e| Error::Plan(format!("step '{}': {e}", step.name)))?;
            }
            if let StepKind::CreateTable { ddl, .. } = &step.kind
                && ddl.trim().is_empty()
            {
                return Err(Error::Plan(format!(
                    "step '{}': CREATE TABLE statement is empty",
                    step.name
                )));
            }
        }
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[MigrationStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Check that `ident` is a plain SQL identifier (`[A-Za-z0-9_]`, 1..=64 chars).
pub fn validate_identifier(ident: &str) -> std::result::Result<(), String> {
    if ident.is_empty() {
        return Err("identifier cannot be empty".into());
    }
    if ident.len() > MAX_IDENTIFIER_LEN {
        return Err(format!(
            "identifier '{ident}' is longer than {MAX_IDENTIFIER_LEN} characters"
        ));
    }
    if !ident.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(format!("identifier '{ident}' contains invalid characters"));
    }
    Ok(())
}

fn quote_literal(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "''");
    format!("'{escaped}'")
}

/// Outcome of a single step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum StepOutcome {
    AlreadyApplied,
    Applied,
    Failed(String),
}

impl StepOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::AlreadyApplied => "already applied",
            Self::Applied => "applied",
            Self::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    pub step: String,
    pub outcome: StepOutcome,
}

/// Why a run stopped before reaching the end of the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum HaltReason {
    /// A step failed and the failure policy is `Halt`.
    StepFailed { step: String },
    /// The connection became unusable; always stops the run.
    ConnectionLost { step: String, message: String },
}

/// Ordered per-step results of one run. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlanReport {
    pub results: Vec<ExecutionResult>,
    pub halted: Option<HaltReason>,
}

impl PlanReport {
    pub fn outcomes(&self) -> Vec<&StepOutcome> {
        self.results.iter().map(|r| &r.outcome).collect()
    }

    pub fn applied(&self) -> usize {
        self.count(|o| matches!(o, StepOutcome::Applied))
    }

    pub fn already_applied(&self) -> usize {
        self.count(|o| matches!(o, StepOutcome::AlreadyApplied))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, StepOutcome::Failed(_)))
    }

    /// True when every step ran and none failed.
    pub fn is_success(&self) -> bool {
        self.halted.is_none() && self.failed() == 0
    }

    fn count(&self, pred: impl Fn(&StepOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.outcome)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_column_renders_alter_table() {
        let step = MigrationStep::add_column("tweet", "group_name", "VARCHAR(50) NULL");
        assert_eq!(step.name, "add_column_tweet_group_name");
        assert_eq!(
            step.statements(),
            vec!["ALTER TABLE `tweet` ADD COLUMN `group_name` VARCHAR(50) NULL".to_string()]
        );
    }

    #[test]
    fn add_foreign_key_renders_constraint_with_cascade() {
        let step = MigrationStep::add_foreign_key("tweet", "group_name", "group_", "grpname")
            .with_constraint("fk_tweet_group");
        assert_eq!(step.name, "add_foreign_key_fk_tweet_group");
        let sql = &step.statements()[0];
        assert!(sql.starts_with("ALTER TABLE `tweet` ADD CONSTRAINT `fk_tweet_group`"));
        assert!(sql.contains("FOREIGN KEY (`group_name`)"));
        assert!(sql.contains("REFERENCES `group_`(`grpname`)"));
        assert!(sql.ends_with("ON DELETE CASCADE"));
    }

    #[test]
    fn on_delete_override_only_touches_foreign_keys() {
        let fk = MigrationStep::add_foreign_key("a", "b", "c", "d")
            .on_delete(ReferentialAction::SetNull);
        assert!(fk.statements()[0].ends_with("ON DELETE SET NULL"));

        let col =
            MigrationStep::add_column("a", "b", "INT").on_delete(ReferentialAction::SetNull);
        assert_eq!(col, MigrationStep::add_column("a", "b", "INT"));
    }

    #[test]
    fn backfill_quotes_value() {
        let step = MigrationStep::backfill("follow_requests", "status", "it's");
        assert_eq!(
            step.statements(),
            vec![
                "UPDATE `follow_requests` SET `status` = 'it''s' WHERE `status` IS NULL"
                    .to_string()
            ]
        );
    }

    #[test]
    fn plan_rejects_duplicate_names() {
        let err = MigrationPlan::new(vec![
            MigrationStep::add_column("t", "c", "INT"),
            MigrationStep::add_column("t", "c", "INT"),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::Plan(_)));
        assert!(err.to_string().contains("duplicate step name"));
    }

    #[test]
    fn plan_rejects_unsafe_identifiers() {
        let err = MigrationPlan::new(vec![MigrationStep::add_column(
            "users`; DROP TABLE users; --",
            "c",
            "INT",
        )])
        .unwrap_err();
        assert!(err.to_string().contains("invalid characters"));

        let long = "x".repeat(65);
        let step = MigrationStep::create_table(long, "CREATE TABLE x (id INT)");
        assert!(MigrationPlan::new(vec![step]).is_err());
    }

    #[test]
    fn plan_rejects_empty_name_and_empty_ddl() {
        let unnamed = MigrationStep::add_column("t", "c", "INT").named("  ");
        assert!(MigrationPlan::new(vec![unnamed]).is_err());

        let empty = MigrationStep::create_table("t", "   ");
        assert!(MigrationPlan::new(vec![empty]).is_err());
    }

    #[test]
    fn plan_preserves_order() {
        let plan = MigrationPlan::new(vec![
            MigrationStep::create_table(
                "users",
                "CREATE TABLE IF NOT EXISTS users (username VARCHAR(50) PRIMARY KEY)",
            ),
            MigrationStep::add_column("users", "bio", "TEXT"),
        ])
        .unwrap();
        let names: Vec<_> = plan.steps().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["create_table_users", "add_column_users_bio"]);
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn report_counts_and_success() {
        let report = PlanReport {
            results: vec![
                ExecutionResult {
                    step: "a".into(),
                    outcome: StepOutcome::Applied,
                },
                ExecutionResult {
                    step: "b".into(),
                    outcome: StepOutcome::AlreadyApplied,
                },
            ],
            halted: None,
        };
        assert_eq!(report.applied(), 1);
        assert_eq!(report.already_applied(), 1);
        assert_eq!(report.failed(), 0);
        assert!(report.is_success());
    }

    #[test]
    fn step_outcome_serializes_with_reason() {
        let json = serde_json::to_string(&StepOutcome::Failed("boom".into())).unwrap();
        assert_eq!(json, r#"{"status":"failed","reason":"boom"}"#);
        let json = serde_json::to_string(&StepOutcome::AlreadyApplied).unwrap();
        assert_eq!(json, r#"{"status":"already_applied"}"#);
    }
}
