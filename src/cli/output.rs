//! CLI output formatting

use crate::{
    core::{ContextValue, ExecutionStatus, RunState, SkipReason, StepRecord, StepStatus},
    execution::ExecutionEvent,
    persistence::StoredRun,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Create a progress bar
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    progress.set_style(style);
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

fn short_id(id: &uuid::Uuid) -> String {
    id.to_string()[..8].to_string()
}

/// Format a step record for display
pub fn format_step_record(record: &StepRecord) -> String {
    match (record.status, record.skip) {
        (StepStatus::Pending, _) => style("PENDING").dim().to_string(),
        (StepStatus::Running, _) => {
            style(format!("RUNNING (attempt {})", record.attempts)).yellow().to_string()
        }
        (_, Some(SkipReason::Disabled)) => style("SKIPPED (disabled)").dim().to_string(),
        (_, Some(SkipReason::OptionalFailure)) => {
            style("SKIPPED (optional step failed)").yellow().to_string()
        }
        (StepStatus::Completed, None) => style("COMPLETED").green().to_string(),
        (StepStatus::Failed, None) => style("FAILED").red().to_string(),
    }
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Completed => style("COMPLETED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
    }
}

/// Multi-line view of a run: status, per-step records and context keys
pub fn format_run_state(state: &RunState) -> String {
    let mut lines = vec![
        format!("{} Run {}", INFO, style(state.run_id).cyan()),
        format!("  Pipeline: {}", style(&state.pipeline_name).bold()),
        format!("  Status: {}", format_status(state.status)),
        format!("  Next step: {}/{}", state.cursor + 1, state.steps.len()),
    ];

    if let Some(failure) = &state.failure {
        lines.push(format!(
            "  Failure: {} ({:?}{})",
            style(&failure.message).red(),
            failure.cause,
            failure
                .step
                .as_ref()
                .map(|s| format!(" at {}", s))
                .unwrap_or_default()
        ));
    }

    lines.push(String::new());
    for record in &state.steps {
        let duration = record
            .duration()
            .and_then(|d| d.to_std().ok())
            .map(|d| format!(" {}", style(format_duration(d)).dim()))
            .unwrap_or_default();
        lines.push(format!(
            "  {:<16} {}{}",
            record.name,
            format_step_record(record),
            duration
        ));
        if let Some(error) = &record.last_error {
            lines.push(format!("      {}", style(error).red()));
        }
        for warning in &record.warnings {
            lines.push(format!("      {}{}", WARN, style(warning).dim()));
        }
    }

    lines.push(String::new());
    lines.push(format!(
        "  Context: {}",
        state.context.keys().collect::<Vec<_>>().join(", ")
    ));
    lines.join("\n")
}

/// One-line summary of a saved run
pub fn format_stored_run(run: &StoredRun) -> String {
    let status_icon = match run.metadata.status {
        ExecutionStatus::Completed => CHECK,
        ExecutionStatus::Failed => CROSS,
        ExecutionStatus::Running => SPINNER,
        ExecutionStatus::Pending => INFO,
    };

    format!(
        "{} {} - {} - {} ({}/{} steps, {} skipped) - {}",
        status_icon,
        style(short_id(&run.run_id)).dim(),
        style(&run.metadata.pipeline_name).bold(),
        format_status(run.metadata.status),
        run.metadata.completed_steps,
        run.metadata.total_steps,
        run.metadata.skipped_steps,
        style(run.metadata.started_at.format("%Y-%m-%d %H:%M")).dim()
    )
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::RunStarted {
            run_id,
            pipeline_name,
            total_steps,
        } => format!(
            "{} Starting pipeline {} ({}, {} steps)",
            ROCKET,
            style(pipeline_name).bold(),
            style(short_id(run_id)).dim(),
            total_steps
        ),
        ExecutionEvent::StepStarted { step, .. } => {
            format!("{} {}", SPINNER, style(step).cyan())
        }
        ExecutionEvent::StepRetrying {
            step,
            attempt,
            max_attempts,
            error,
            ..
        } => format!(
            "{} {} (attempt {}/{}): {}",
            WARN,
            style(step).yellow(),
            attempt,
            max_attempts,
            style(error).dim()
        ),
        ExecutionEvent::StepCompleted {
            step,
            duration_ms,
            warnings,
            ..
        } => {
            let mut line = format!("{} {}", CHECK, style(step).green());
            if let Some(ms) = duration_ms {
                let elapsed = Duration::from_millis((*ms).max(0) as u64);
                line.push_str(&format!(" {}", style(format_duration(elapsed)).dim()));
            }
            for warning in warnings {
                line.push_str(&format!("\n   {}{}", WARN, style(warning).dim()));
            }
            line
        }
        ExecutionEvent::StepSkipped { step, reason, .. } => {
            let why = match reason {
                SkipReason::Disabled => "disabled",
                SkipReason::OptionalFailure => "optional step failed",
            };
            format!("{} {} ({})", SKIP, style(step).dim(), why)
        }
        ExecutionEvent::StepFailed {
            step, error, fatal, ..
        } => {
            if *fatal {
                format!("{} {}: {}", CROSS, style(step).red(), style(error).dim())
            } else {
                format!("{} {}: {}", WARN, style(step).yellow(), style(error).dim())
            }
        }
        ExecutionEvent::RunFinished { run_id, status } => {
            let status_str = match status {
                ExecutionStatus::Completed => {
                    format!("{} completed", style("successfully").green())
                }
                ExecutionStatus::Failed => style("failed").red().to_string(),
                other => format!("{:?}", other),
            };
            format!(
                "{} Pipeline ({}) {}",
                INFO,
                style(short_id(run_id)).dim(),
                status_str
            )
        }
    }
}

/// Render a context value, truncated to `max_lines`
pub fn format_context_value(value: &ContextValue, max_lines: usize) -> String {
    format_output(&value.render(), max_lines)
}

/// Format output with truncation
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.to_string()
    } else {
        let truncated = lines[..max_lines].join("\n");
        format!(
            "{}\n{}... ({} more lines)",
            truncated,
            style("[truncated]").dim(),
            lines.len() - max_lines
        )
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{:.1}s", duration.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
