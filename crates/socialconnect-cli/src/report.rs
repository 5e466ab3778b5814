use socialconnect_db::{HaltReason, PlanReport, StepOutcome};

/// Print one status line per step followed by a summary.
pub fn print_report(report: &PlanReport) {
    for line in render(report) {
        println!("{line}");
    }
}

fn render(report: &PlanReport) -> Vec<String> {
    let width = report
        .results
        .iter()
        .map(|r| r.step.len())
        .max()
        .unwrap_or(0);

    let mut lines: Vec<String> = report
        .results
        .iter()
        .map(|r| {
            let tag = format!("[{}]", r.outcome.label());
            match &r.outcome {
                StepOutcome::Failed(reason) => {
                    format!("{tag:<17} {:<width$}  {reason}", r.step)
                }
                _ => format!("{tag:<17} {}", r.step),
            }
        })
        .collect();

    match &report.halted {
        Some(HaltReason::StepFailed { step }) => {
            lines.push(format!("Stopped after '{step}' failed; later steps were not run."));
        }
        Some(HaltReason::ConnectionLost { step, message }) => {
            lines.push(format!("Connection lost during '{step}': {message}"));
        }
        None => {}
    }

    lines.push(format!(
        "{} applied, {} already applied, {} failed.",
        report.applied(),
        report.already_applied(),
        report.failed()
    ));
    lines
}
