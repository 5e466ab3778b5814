pub mod backend;
pub mod classify;
pub mod migrations;
pub mod mysql;
pub mod runner;
pub mod schema;

#[cfg(test)]
mod testing;

pub use backend::SchemaBackend;
pub use migrations::{
    ExecutionResult, HaltReason, MigrationPlan, MigrationStep, PlanReport, ReferentialAction,
    StepKind, StepOutcome,
};
pub use mysql::MySqlBackend;
pub use runner::MigrationRunner;
pub use schema::socialconnect_plan;
