//! Checkpoint snapshots
//!
//! A snapshot is the persisted shape of a run: the full state, the routing
//! configuration it ran under, the node to continue from and the steps
//! already consumed.
//!
//! Version 1 snapshots carried no configuration; they load with the default
//! one.

use crate::config::RoutingConfig;
use crate::outcome::RunReport;
use crate::{Result, WorkflowError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};
use tradegraph_core::{Stage, WorkflowState};

/// Snapshot format written by this version
pub const SNAPSHOT_VERSION: u32 = 2;

/// Resumable image of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub version: u32,
    pub run_id: String,
    pub state: WorkflowState,
    /// Routing parameters the run was started with
    #[serde(default)]
    pub config: RoutingConfig,
    /// Stage to invoke on resume; `None` to ask the routing policy, or a
    /// completed run
    pub current_stage: Option<Stage>,
    pub steps: u64,
    pub saved_at: DateTime<Utc>,
}

impl WorkflowSnapshot {
    pub fn new(
        run_id: impl Into<String>,
        state: WorkflowState,
        config: RoutingConfig,
        current_stage: Option<Stage>,
        steps: u64,
    ) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            run_id: run_id.into(),
            state,
            config,
            current_stage,
            steps,
            saved_at: Utc::now(),
        }
    }

    /// Snapshot of where a run under `config` stopped
    pub fn from_report(report: &RunReport, config: &RoutingConfig) -> Self {
        Self::new(
            report.run_id.clone(),
            report.state.clone(),
            config.clone(),
            report.next_stage,
            report.steps,
        )
    }

    /// Write the snapshot as pretty JSON
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json).await?;
        debug!("Saved checkpoint at step {} to {}", self.steps, path.display());
        Ok(())
    }

    /// Read a snapshot written by [`save`](Self::save)
    ///
    /// # Errors
    ///
    /// Fails on I/O or parse errors, on snapshots from a newer format, on
    /// completed runs and on snapshots whose state or configuration is
    /// inconsistent.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await?;
        let snapshot = Self::from_json(&raw)?;
        info!(
            "Loaded checkpoint {} (run {}, step {})",
            path.display(),
            snapshot.run_id,
            snapshot.steps
        );
        Ok(snapshot)
    }

    /// Parse and check a snapshot
    pub fn from_json(raw: &str) -> Result<Self> {
        let snapshot: Self = serde_json::from_str(raw)?;
        if snapshot.version > SNAPSHOT_VERSION {
            return Err(WorkflowError::Checkpoint(format!(
                "snapshot version {} is newer than supported version {SNAPSHOT_VERSION}",
                snapshot.version
            )));
        }
        if snapshot.state.workflow_complete() {
            return Err(WorkflowError::Checkpoint(format!(
                "run {} already completed",
                snapshot.run_id
            )));
        }
        snapshot.state.validate().map_err(|e| {
            WorkflowError::Checkpoint(format!("run {}: {e}", snapshot.run_id))
        })?;
        snapshot.config.validate()?;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradegraph_core::ReportKind;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!(
            "tradegraph-{}-{}.json",
            name,
            uuid::Uuid::new_v4()
        ))
    }

    fn sample() -> WorkflowSnapshot {
        let mut state = WorkflowState::new(["AAPL", "MSFT"]).unwrap();
        state
            .subject_mut("AAPL")
            .unwrap()
            .reports
            .set(ReportKind::Market, "golden cross");
        let config = RoutingConfig::builder()
            .max_investment_rounds(2)
            .build()
            .unwrap();
        WorkflowSnapshot::new("run-42", state, config, Some(Stage::Fundamentals), 1)
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let path = temp_path("save");
        let snapshot = sample();
        snapshot.save(&path).await.unwrap();

        let loaded = WorkflowSnapshot::load(&path).await.unwrap();
        assert_eq!(loaded, snapshot);
        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[test]
    fn test_rejects_newer_version() {
        let mut snapshot = sample();
        snapshot.version = SNAPSHOT_VERSION + 1;
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(matches!(
            WorkflowSnapshot::from_json(&json),
            Err(WorkflowError::Checkpoint(_))
        ));
    }

    #[test]
    fn test_rejects_completed_run() {
        let mut snapshot = sample();
        snapshot.state.mark_workflow_complete().unwrap();
        let json = serde_json::to_string(&snapshot).unwrap();
        tokio_test::assert_err!(WorkflowSnapshot::from_json(&json));
    }

    #[test]
    fn test_rejects_cursor_past_subjects() {
        let mut json = serde_json::to_value(sample()).unwrap();
        json["state"]["current_subject_index"] = serde_json::json!(usize::MAX);
        let err = tokio_test::assert_err!(WorkflowSnapshot::from_json(&json.to_string()));
        assert!(matches!(err, WorkflowError::Checkpoint(_)));
    }

    #[test]
    fn test_version_one_loads_default_config() {
        let mut json = serde_json::to_value(sample()).unwrap();
        json["version"] = serde_json::json!(1);
        json.as_object_mut().unwrap().remove("config");
        let snapshot = tokio_test::assert_ok!(WorkflowSnapshot::from_json(&json.to_string()));
        assert_eq!(snapshot.config, RoutingConfig::default());
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = WorkflowSnapshot::load(temp_path("missing")).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Io(_)));
    }

    #[test]
    fn test_persisted_shape() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["version"], 2);
        assert_eq!(json["config"]["max_investment_rounds"], 2);
        assert_eq!(json["current_stage"], "fundamentals");
        assert_eq!(json["state"]["subjects"][1], "MSFT");
        assert_eq!(
            json["state"]["per_subject"]["AAPL"]["reports"]["market"],
            "golden cross"
        );
    }
}
