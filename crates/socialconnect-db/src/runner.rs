use socialconnect_common::{Error, Result};
use socialconnect_config::FailurePolicy;
use tracing::{debug, error, info, warn};

use crate::backend::SchemaBackend;
use crate::migrations::{
    ExecutionResult, HaltReason, MigrationPlan, MigrationStep, PlanReport, StepOutcome,
};

/// Applies a `MigrationPlan` one step at a time against a single connection.
pub struct MigrationRunner {
    plan: MigrationPlan,
    policy: FailurePolicy,
}

impl MigrationRunner {
    pub fn new(plan: MigrationPlan) -> Self {
        Self {
            plan,
            policy: FailurePolicy::Halt,
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn plan(&self) -> &MigrationPlan {
        &self.plan
    }

    /// Run the plan and close the backend afterwards, whatever the outcome.
    pub async fn execute<B>(&self, mut backend: B) -> PlanReport
    where
        B: SchemaBackend,
    {
        let report = self.run(&mut backend).await;
        if let Err(e) = backend.close().await {
            warn!("failed to close database connection: {e}");
        } else {
            debug!("database connection closed");
        }
        report
    }

    /// Run the plan on a borrowed backend. The caller owns closing it.
    pub async fn run<B>(&self, backend: &mut B) -> PlanReport
    where
        B: SchemaBackend + ?Sized,
    {
        let mut report = PlanReport::default();
        info!("running migration plan with {} steps", self.plan.len());

        for step in self.plan.steps() {
            let outcome = match self.run_step(backend, step).await {
                Ok(outcome) => outcome,
                Err(e) if e.is_fatal() => {
                    error!(step = %step.name, "connection lost: {e}");
                    report.results.push(ExecutionResult {
                        step: step.name.clone(),
                        outcome: StepOutcome::Failed(e.to_string()),
                    });
                    report.halted = Some(HaltReason::ConnectionLost {
                        step: step.name.clone(),
                        message: e.to_string(),
                    });
                    break;
                }
                Err(e) => {
                    error!(step = %step.name, "step failed: {e}");
                    StepOutcome::Failed(e.to_string())
                }
            };

            let failed = matches!(outcome, StepOutcome::Failed(_));
            report.results.push(ExecutionResult {
                step: step.name.clone(),
                outcome,
            });

            if failed && self.policy == FailurePolicy::Halt {
                warn!(step = %step.name, "halting plan after failed step");
                report.halted = Some(HaltReason::StepFailed {
                    step: step.name.clone(),
                });
                break;
            }
        }

        info!(
            applied = report.applied(),
            already_applied = report.already_applied(),
            failed = report.failed(),
            "migration plan finished"
        );
        report
    }

    async fn run_step<B>(&self, backend: &mut B, step: &MigrationStep) -> Result<StepOutcome>
    where
        B: SchemaBackend + ?Sized,
    {
        if step.is_applied(backend).await? {
            debug!(step = %step.name, "already applied, skipping");
            return Ok(StepOutcome::AlreadyApplied);
        }

        match apply_in_transaction(backend, step).await {
            Ok(()) => {
                info!(step = %step.name, table = step.table(), "applied");
                Ok(StepOutcome::Applied)
            }
            // Another process created the object between our check and our change.
            Err(Error::AlreadyApplied(msg)) => {
                info!(step = %step.name, "object already exists: {msg}");
                Ok(StepOutcome::AlreadyApplied)
            }
            Err(e) => Err(e),
        }
    }
}

async fn apply_in_transaction<B>(backend: &mut B, step: &MigrationStep) -> Result<()>
where
    B: SchemaBackend + ?Sized,
{
    backend.begin().await?;

    for sql in step.statements() {
        debug!(step = %step.name, "executing: {sql}");
        if let Err(e) = backend.execute(&sql).await {
            // DDL commits implicitly on MySQL, so a rollback only undoes data
            // changes. Its own failure matters only if the connection is gone.
            if let Err(rollback_err) = backend.rollback().await {
                warn!(step = %step.name, "rollback failed: {rollback_err}");
                if rollback_err.is_fatal() && !e.is_fatal() {
                    return Err(rollback_err);
                }
            }
            return Err(e);
        }
    }

    backend.commit().await
}
