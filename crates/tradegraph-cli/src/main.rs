//! Command-line interface for tradegraph

mod render;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tradegraph_core::WorkflowState;
use tradegraph_workflow::{
    AuditRecorder, MemoryRecorder, Orchestrator, RiskRotation, RoutingConfig, RunReport,
    WorkflowSnapshot, run_batch, template_registry,
};

#[derive(Parser, Debug)]
#[command(name = "tradegraph")]
#[command(about = "Dry-run the multi-stage trading workflow with template handlers", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the workflow over one or more tickers
    Run(RunArgs),
    /// Continue a run from a checkpoint file
    ///
    /// The run keeps the routing configuration stored in the snapshot.
    Resume {
        /// Snapshot written by `run --checkpoint`
        #[arg(long, value_name = "FILE")]
        checkpoint: PathBuf,

        /// Override the step ceiling for the resumed run
        #[arg(long)]
        recursion_limit: Option<i64>,

        /// Print every transition as JSON when the run ends
        #[arg(long)]
        audit_json: bool,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Comma-separated ticker list, processed in order
    #[arg(long, value_delimiter = ',', required = true)]
    tickers: Vec<String>,

    /// Rounds of the bull/bear debate
    #[arg(long)]
    max_debate_rounds: Option<i64>,

    /// Rounds of the risk debate
    #[arg(long)]
    max_risk_rounds: Option<i64>,

    /// Hard ceiling on orchestrator steps
    #[arg(long)]
    recursion_limit: Option<i64>,

    /// Add the neutral analyst to the risk debate
    #[arg(long)]
    with_neutral: bool,

    /// Run each ticker as an independent workflow in parallel
    #[arg(long)]
    batch: bool,

    /// Save a snapshot after every step; batch workers write FILE-<i>-<ticker>
    #[arg(long, value_name = "FILE")]
    checkpoint: Option<PathBuf>,

    /// Print every transition as JSON when the run ends
    #[arg(long)]
    audit_json: bool,

    /// Analysis date handed to the stage handlers
    #[arg(long)]
    date: Option<String>,
}

impl RunArgs {
    fn config(&self) -> anyhow::Result<RoutingConfig> {
        let mut builder = RoutingConfig::builder().with_env()?;
        if let Some(rounds) = self.max_debate_rounds {
            builder = builder.max_investment_rounds(rounds);
        }
        if let Some(rounds) = self.max_risk_rounds {
            builder = builder.max_risk_rounds(rounds);
        }
        if let Some(limit) = self.recursion_limit {
            builder = builder.cycle_guard_limit(limit);
        }
        if self.with_neutral {
            builder = builder.risk_rotation(RiskRotation::WithNeutral);
        }
        Ok(builder.build()?)
    }
}

fn orchestrator(
    config: RoutingConfig,
    checkpoint: Option<&PathBuf>,
    recorder: Option<&Arc<MemoryRecorder>>,
) -> anyhow::Result<Orchestrator> {
    let mut builder = Orchestrator::builder()
        .config(config)
        .handlers(template_registry());
    if let Some(path) = checkpoint {
        builder = builder.checkpoint_to(path);
    }
    if let Some(recorder) = recorder {
        builder = builder.recorder(Arc::clone(recorder) as Arc<dyn AuditRecorder>);
    }
    Ok(builder.build()?)
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let config = args.config()?;
    let recorder = args.audit_json.then(|| Arc::new(MemoryRecorder::new()));
    let orchestrator = orchestrator(config, args.checkpoint.as_ref(), recorder.as_ref())?;

    if args.batch {
        info!("Running {} ticker(s) as a batch", args.tickers.len());
        let results = run_batch(&orchestrator, args.tickers, args.date.as_deref()).await;
        render::print_batch(&results);
        print_audit(recorder.as_deref())?;

        let failed = results.iter().filter(|r| r.result.is_err()).count();
        if failed > 0 {
            anyhow::bail!("{failed} of {} batch run(s) failed", results.len());
        }
        return Ok(());
    }

    let mut state = WorkflowState::new(args.tickers)?;
    if let Some(date) = args.date {
        state = state.with_trade_date(date);
    }

    let report = orchestrator.run(state).await?;
    finish(report, args.checkpoint.as_ref(), recorder.as_deref())
}

async fn resume(
    checkpoint: PathBuf,
    recursion_limit: Option<i64>,
    audit_json: bool,
) -> anyhow::Result<()> {
    let snapshot = WorkflowSnapshot::load(&checkpoint)
        .await
        .with_context(|| format!("Failed to load {}", checkpoint.display()))?;

    let config = resume_config(&snapshot, recursion_limit)?;
    let recorder = audit_json.then(|| Arc::new(MemoryRecorder::new()));
    let orchestrator = orchestrator(config, Some(&checkpoint), recorder.as_ref())?;

    let report = orchestrator.resume(snapshot).await?;
    finish(report, Some(&checkpoint), recorder.as_deref())
}

/// Stored configuration with the step ceiling as the only override
fn resume_config(
    snapshot: &WorkflowSnapshot,
    recursion_limit: Option<i64>,
) -> anyhow::Result<RoutingConfig> {
    let config = snapshot.config.clone();
    Ok(match recursion_limit {
        Some(limit) => config.with_cycle_guard_limit(limit)?,
        None => config,
    })
}

fn finish(
    report: RunReport,
    checkpoint: Option<&PathBuf>,
    recorder: Option<&MemoryRecorder>,
) -> anyhow::Result<()> {
    render::print_report(&report);
    print_audit(recorder)?;

    if !report.outcome.is_completed() {
        match checkpoint {
            Some(path) => eprintln!(
                "Run stopped early; continue with `tradegraph resume --checkpoint {}`",
                path.display()
            ),
            None => warn!("Run stopped early and no checkpoint was requested"),
        }
    }

    report.into_result()?;
    Ok(())
}

fn print_audit(recorder: Option<&MemoryRecorder>) -> anyhow::Result<()> {
    if let Some(recorder) = recorder {
        println!("{}", serde_json::to_string_pretty(&recorder.records())?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.json_logs {
        tradegraph_utils::init_tracing_json();
    } else {
        tradegraph_utils::init_tracing();
    }

    info!("Starting tradegraph");

    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Resume {
            checkpoint,
            recursion_limit,
            audit_json,
        } => resume(checkpoint, recursion_limit, audit_json).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_tickers_split_on_commas() {
        let cli = Cli::try_parse_from(["tradegraph", "run", "--tickers", "AAPL,MSFT"]).unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.tickers, vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn test_batch_accepts_checkpoint() {
        let cli = Cli::try_parse_from([
            "tradegraph",
            "run",
            "--tickers",
            "AAPL,MSFT",
            "--batch",
            "--checkpoint",
            "run.json",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert!(args.batch);
        assert_eq!(args.checkpoint, Some(PathBuf::from("run.json")));
    }

    #[test]
    fn test_resume_keeps_snapshot_config() {
        let stored = RoutingConfig::builder()
            .max_investment_rounds(2)
            .risk_rotation(RiskRotation::WithNeutral)
            .build()
            .unwrap();
        let snapshot = WorkflowSnapshot::new(
            "run-1",
            WorkflowState::new(["AAPL"]).unwrap(),
            stored.clone(),
            Some(tradegraph_core::Stage::Bull),
            5,
        );

        assert_eq!(resume_config(&snapshot, None).unwrap(), stored);

        let raised = resume_config(&snapshot, Some(40)).unwrap();
        assert_eq!(raised.cycle_guard_limit.get(), 40);
        assert_eq!(raised.max_investment_rounds.get(), 2);
        assert_eq!(raised.risk_rotation, RiskRotation::WithNeutral);

        assert!(resume_config(&snapshot, Some(0)).is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "tradegraph",
            "run",
            "--tickers",
            "AAPL",
            "--max-debate-rounds",
            "3",
            "--with-neutral",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        let config = args.config().unwrap();
        assert_eq!(config.max_investment_rounds.get(), 3);
        assert_eq!(config.risk_rotation, RiskRotation::WithNeutral);
    }

    #[test]
    fn test_zero_rounds_rejected() {
        let cli = Cli::try_parse_from([
            "tradegraph",
            "run",
            "--tickers",
            "AAPL",
            "--max-risk-rounds",
            "0",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert!(args.config().is_err());
    }
}
