//! Terminal output

use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use tradegraph_workflow::{BatchResult, Outcome, RunReport, SubjectDecision};

/// First line of a decision, trimmed for the table
fn headline(decision: &str) -> &str {
    decision.lines().find(|l| !l.trim().is_empty()).unwrap_or("-")
}

fn status(decision: &SubjectDecision) -> String {
    if decision.degraded {
        let stages: Vec<&str> = decision.degraded_stages.iter().map(|k| k.as_str()).collect();
        format!("partial ({})", stages.join(", "))
    } else {
        "ok".to_string()
    }
}

fn decision_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Ticker", "Action", "Status", "Decision"]);
    table
}

fn add_decisions(table: &mut Table, report: &RunReport) {
    for decision in report.decisions() {
        table.add_row(vec![
            decision.subject.clone(),
            decision.action.to_string(),
            status(&decision),
            headline(&decision.decision).to_string(),
        ]);
    }
}

fn outcome_line(report: &RunReport) -> String {
    match &report.outcome {
        Outcome::Completed => format!("Run {} completed in {} steps", report.run_id, report.steps),
        Outcome::RecursionLimitExceeded { limit } => format!(
            "Run {} stopped at the step limit of {limit} (next: {})",
            report.run_id,
            report.next_stage.map_or("-", |s| s.name())
        ),
        Outcome::DeadlineExceeded { deadline } => format!(
            "Run {} stopped after its {deadline:?} deadline at step {}",
            report.run_id, report.steps
        ),
    }
}

/// Print the decision table and the final synthesis of one run
pub fn print_report(report: &RunReport) {
    let mut table = decision_table();
    add_decisions(&mut table, report);
    println!("{table}");
    println!("{}", outcome_line(report));

    let synthesis = report.state.final_report.trim();
    if !synthesis.is_empty() {
        println!();
        println!("{synthesis}");
    }
}

/// Print one table row per batch worker
pub fn print_batch(results: &[BatchResult]) {
    let mut table = decision_table();
    for entry in results {
        match &entry.result {
            Ok(report) => add_decisions(&mut table, report),
            Err(e) => {
                table.add_row(vec![
                    entry.subject.clone(),
                    "-".to_string(),
                    "failed".to_string(),
                    e.to_string(),
                ]);
            }
        }
    }
    println!("{table}");
}
