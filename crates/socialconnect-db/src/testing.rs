//! In-memory `SchemaBackend` for runner and plan tests.
//!
//! Interprets the handful of statement shapes the migration steps emit
//! (`CREATE TABLE`, `ALTER TABLE ... ADD COLUMN/CONSTRAINT`, `UPDATE ... SET`)
//! and keeps just enough schema state to answer the predicates.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use socialconnect_common::{Error, Result};

use crate::backend::SchemaBackend;

const COLUMN_LIST_KEYWORDS: &[&str] = &[
    "PRIMARY",
    "FOREIGN",
    "UNIQUE",
    "KEY",
    "INDEX",
    "CONSTRAINT",
    "CHECK",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaSnapshot {
    pub tables: BTreeSet<String>,
    pub columns: BTreeSet<(String, String)>,
    pub constraints: BTreeSet<(String, String)>,
    pub nulls: BTreeMap<(String, String), u64>,
}

#[derive(Default)]
pub struct ScriptedBackend {
    schema: SchemaSnapshot,
    failures: Vec<(String, Error)>,
    rollback_failure: Option<Error>,
    executed: Vec<String>,
    committed: usize,
    rolled_back: usize,
    closed: Arc<AtomicBool>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, table: &str) {
        self.schema.tables.insert(table.to_string());
    }

    pub fn add_column(&mut self, table: &str, column: &str) {
        self.schema
            .columns
            .insert((table.to_string(), column.to_string()));
    }

    pub fn set_nulls(&mut self, table: &str, column: &str, count: u64) {
        self.schema
            .nulls
            .insert((table.to_string(), column.to_string()), count);
    }

    /// Make the next statement containing `pattern` fail with `error`.
    /// Each registered failure fires once.
    pub fn fail_on(&mut self, pattern: &str, error: Error) {
        self.failures.push((pattern.to_string(), error));
    }

    /// Make the next `rollback` fail with `error`.
    pub fn fail_rollback(&mut self, error: Error) {
        self.rollback_failure = Some(error);
    }

    pub fn has_column(&self, table: &str, column: &str) -> bool {
        self.schema
            .columns
            .contains(&(table.to_string(), column.to_string()))
    }

    pub fn snapshot(&self) -> SchemaSnapshot {
        self.schema.clone()
    }

    /// Every statement passed to `execute`, including ones that failed.
    pub fn executed(&self) -> &[String] {
        &self.executed
    }

    pub fn committed(&self) -> usize {
        self.committed
    }

    pub fn rolled_back(&self) -> usize {
        self.rolled_back
    }

    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Connectivity("connection is closed".into()));
        }
        Ok(())
    }

    fn interpret(&mut self, sql: &str) -> Result<()> {
        let tokens: Vec<String> = sql
            .split_whitespace()
            .map(|t| t.trim_matches(|c| c == '`' || c == '(').to_string())
            .collect();
        let upper: Vec<String> = tokens.iter().map(|t| t.to_ascii_uppercase()).collect();
        let word = |i: usize| upper.get(i).map(String::as_str).unwrap_or("");

        match (word(0), word(1)) {
            ("CREATE", "TABLE") => {
                let if_not_exists = word(2) == "IF";
                let name = if if_not_exists { &tokens[5] } else { &tokens[2] };
                if self.schema.tables.contains(name) {
                    if if_not_exists {
                        return Ok(());
                    }
                    return Err(Error::AlreadyApplied(format!(
                        "Table '{name}' already exists"
                    )));
                }
                self.schema.tables.insert(name.clone());
                for column in columns_of(sql) {
                    self.schema.columns.insert((name.clone(), column));
                }
                Ok(())
            }
            ("ALTER", "TABLE") => {
                let table = tokens[2].clone();
                if !self.schema.tables.contains(&table) {
                    return Err(Error::Statement(format!("Table '{table}' doesn't exist")));
                }
                let key = (table, tokens[5].clone());
                match word(4) {
                    "COLUMN" => {
                        if !self.schema.columns.insert(key.clone()) {
                            return Err(Error::AlreadyApplied(format!(
                                "Duplicate column name '{}'",
                                key.1
                            )));
                        }
                    }
                    "CONSTRAINT" => {
                        if !self.schema.constraints.insert(key.clone()) {
                            return Err(Error::AlreadyApplied(format!(
                                "Duplicate foreign key constraint name '{}'",
                                key.1
                            )));
                        }
                    }
                    other => {
                        return Err(Error::Statement(format!("unsupported ALTER: {other}")));
                    }
                }
                Ok(())
            }
            ("UPDATE", _) => {
                let key = (tokens[1].clone(), tokens[3].clone());
                self.schema.nulls.insert(key, 0);
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Column names declared in a `CREATE TABLE` statement written one
/// definition per line.
fn columns_of(ddl: &str) -> Vec<String> {
    let (Some(open), Some(close)) = (ddl.find('('), ddl.rfind(')')) else {
        return Vec::new();
    };
    ddl[open + 1..close]
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(|w| w.trim_matches('`'))
        .filter(|w| !COLUMN_LIST_KEYWORDS.contains(&w.to_ascii_uppercase().as_str()))
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl SchemaBackend for ScriptedBackend {
    async fn table_exists(&mut self, table: &str) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.schema.tables.contains(table))
    }

    async fn column_exists(&mut self, table: &str, column: &str) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.has_column(table, column))
    }

    async fn constraint_exists(&mut self, table: &str, constraint: &str) -> Result<bool> {
        self.ensure_open()?;
        Ok(self
            .schema
            .constraints
            .contains(&(table.to_string(), constraint.to_string())))
    }

    async fn null_count(&mut self, table: &str, column: &str) -> Result<u64> {
        self.ensure_open()?;
        if !self.has_column(table, column) {
            return Err(Error::Statement(format!(
                "Unknown column '{column}' in table '{table}'"
            )));
        }
        Ok(self
            .schema
            .nulls
            .get(&(table.to_string(), column.to_string()))
            .copied()
            .unwrap_or(0))
    }

    async fn begin(&mut self) -> Result<()> {
        self.ensure_open()
    }

    async fn execute(&mut self, sql: &str) -> Result<()> {
        self.ensure_open()?;
        self.executed.push(sql.to_string());
        if let Some(pos) = self.failures.iter().position(|(p, _)| sql.contains(p.as_str())) {
            let (_, error) = self.failures.remove(pos);
            return Err(error);
        }
        self.interpret(sql)
    }

    async fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.committed += 1;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        if let Some(error) = self.rollback_failure.take() {
            return Err(error);
        }
        self.rolled_back += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
