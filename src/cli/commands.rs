//! CLI command definitions

use crate::core::{config::load_overrides, StepConfigOverride};
use anyhow::{bail, Result};
use clap::Args;
use std::collections::BTreeMap;
use std::path::PathBuf;
use uuid::Uuid;

/// Options shared by commands that create a run
#[derive(Debug, Args, Clone)]
pub struct RunOptions {
    /// Audio file to process
    pub audio: PathBuf,

    /// Disable a step (repeatable)
    #[arg(long)]
    pub disable: Vec<String>,

    /// YAML file mapping step names to config overrides
    #[arg(long)]
    pub overrides: Option<PathBuf>,

    /// Step parameter override (step.param=value, repeatable)
    #[arg(long, value_parser = parse_key_value)]
    pub param: Vec<(String, String)>,
}

impl RunOptions {
    /// Combine the overrides file, `--param` and `--disable` flags
    pub fn step_overrides(&self) -> Result<BTreeMap<String, StepConfigOverride>> {
        let mut overrides = match &self.overrides {
            Some(path) => load_overrides(path)?,
            None => BTreeMap::new(),
        };

        for (key, value) in &self.param {
            let Some((step, param)) = key.split_once('.') else {
                bail!("Parameter override '{}' must look like step.param=value", key);
            };
            let value = serde_yaml::from_str::<serde_json::Value>(value)
                .unwrap_or_else(|_| serde_json::Value::String(value.clone()));
            let entry = overrides.entry(step.to_string()).or_default();
            *entry = std::mem::take(entry).with_param(param, value);
        }

        for step in &self.disable {
            overrides.entry(step.clone()).or_default().enabled = Some(false);
        }

        Ok(overrides)
    }
}

/// Run a pipeline to completion
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    #[command(flatten)]
    pub run: RunOptions,

    /// Don't save the result to history
    #[arg(long)]
    pub no_history: bool,
}

/// Create a resumable run
#[derive(Debug, Args, Clone)]
pub struct StartCommand {
    #[command(flatten)]
    pub run: RunOptions,
}

/// Execute the next step of a run
#[derive(Debug, Args, Clone)]
pub struct AdvanceCommand {
    /// Run ID printed by `start`
    #[arg(value_parser = parse_run_id)]
    pub run_id: Uuid,

    /// Keep advancing until the run finishes
    #[arg(long)]
    pub all: bool,

    /// Don't save the result to history when the run finishes
    #[arg(long)]
    pub no_history: bool,
}

/// Show a run's state
#[derive(Debug, Args, Clone)]
pub struct StatusCommand {
    #[arg(value_parser = parse_run_id)]
    pub run_id: Uuid,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Cancel a run
#[derive(Debug, Args, Clone)]
pub struct CancelCommand {
    #[arg(value_parser = parse_run_id)]
    pub run_id: Uuid,

    /// Reason recorded on the run
    #[arg(long, default_value = "cancelled by user")]
    pub reason: String,
}

/// Validate a pipeline configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline YAML file (defaults to the built-in pipeline)
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show saved run results
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Pipeline name to filter by
    #[arg(long)]
    pub name: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show one run, including its context
    #[arg(long, value_parser = parse_run_id)]
    pub run_id: Option<Uuid>,

    /// Show full context values
    #[arg(long)]
    pub full: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("Invalid key=value pair: {}", s)),
    }
}

fn parse_run_id(s: &str) -> Result<Uuid, String> {
    Uuid::parse_str(s).map_err(|e| format!("Invalid run ID '{}': {}", s, e))
}
