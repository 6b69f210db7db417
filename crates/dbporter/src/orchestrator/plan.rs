//! Run planning: which tables to truncate and load this run.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::config::PlanConfig;

/// How the work list was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Every plan table is truncated and reloaded.
    Fresh,
    /// Only tables missing from the checkpoint are retried.
    Resume,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Fresh => write!(f, "fresh"),
            RunMode::Resume => write!(f, "resume"),
        }
    }
}

/// Tables to load and truncate for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunPlan {
    pub mode: RunMode,

    /// Tables to extract and load, in plan order.
    pub work_list: Vec<String>,

    /// Tables to truncate before any load: the work list, then always-truncate
    /// tables not already in it.
    pub truncation_targets: Vec<String>,

    /// Tables skipped because the checkpoint already has them.
    pub skipped: Vec<String>,
}

impl RunPlan {
    /// Compute the plan for a run.
    ///
    /// `refresh` or a missing checkpoint gives a fresh run over every table.
    /// Otherwise the work list is the plan minus the checkpoint, in plan
    /// order. An empty checkpoint is a resume that retries everything.
    pub fn compute(
        plan: &PlanConfig,
        checkpoint: Option<&BTreeSet<String>>,
        refresh: bool,
    ) -> Self {
        let (mode, work_list, skipped) = match checkpoint {
            Some(done) if !refresh => {
                let (skipped, work): (Vec<String>, Vec<String>) =
                    plan.tables.iter().cloned().partition(|t| done.contains(t));
                (RunMode::Resume, work, skipped)
            }
            _ => (RunMode::Fresh, plan.tables.clone(), Vec::new()),
        };

        let mut truncation_targets = work_list.clone();
        for table in &plan.always_truncate {
            if !truncation_targets.contains(table) {
                truncation_targets.push(table.clone());
            }
        }

        Self {
            mode,
            work_list,
            truncation_targets,
            skipped,
        }
    }

    /// Render as pretty JSON.
    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
