use anyhow::{Context, Result};
use podcast_pipeline::{
    cli::{
        commands::{
            AdvanceCommand, CancelCommand, HistoryCommand, RunCommand, StartCommand,
            StatusCommand, ValidateCommand,
        },
        output::*,
        Cli, Command,
    },
    collaborators::Collaborators,
    core::{
        config::PipelineConfig, ExecutionStatus, PipelineContext, PipelineDefinition,
        PipelineRun, RunState,
    },
    execution::{ExecutionEvent, PipelineOrchestrator, ResumableRunner},
    persistence::{
        save_run, FileResumeStore, PersistenceBackend, ResumeStore, StoredRun,
    },
};
use indicatif::ProgressBar;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    match &cli.command {
        Command::Run(cmd) => run_pipeline(&cli, cmd).await?,
        Command::Start(cmd) => start_run(&cli, cmd).await?,
        Command::Advance(cmd) => advance_run(&cli, cmd).await?,
        Command::Status(cmd) => show_status(&cli, cmd).await?,
        Command::Cancel(cmd) => cancel_run(&cli, cmd).await?,
        Command::Validate(cmd) => validate_pipeline(cmd)?,
        Command::History(cmd) => show_history(cmd).await?,
    }

    Ok(())
}

/// Pipeline file from `--pipeline`, or the built-in podcast pipeline
fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    match &cli.pipeline {
        Some(path) => PipelineConfig::from_file(path).context("Failed to load pipeline config"),
        None => PipelineConfig::builtin(),
    }
}

/// Orchestrator wired to the configured backends, printing events through
/// `progress` when one is given
fn build_orchestrator(
    config: &PipelineConfig,
    progress: Option<ProgressBar>,
) -> PipelineOrchestrator {
    let backends = &config.backends;
    let collaborators = Collaborators::from_backends(
        &backends.completion,
        &backends.transcription,
        backends.knowledge_dir.as_deref(),
        backends
            .publish_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("published")),
    );

    let mut orchestrator = PipelineOrchestrator::new(collaborators);
    orchestrator.add_event_handler(move |event| {
        let Some(progress) = &progress else {
            println!("{}", format_execution_event(event));
            return;
        };
        progress.println(format_execution_event(event));
        match event {
            ExecutionEvent::StepStarted { step, .. } => progress.set_message(step.clone()),
            ExecutionEvent::StepCompleted { .. } | ExecutionEvent::StepSkipped { .. } => {
                progress.inc(1)
            }
            ExecutionEvent::RunFinished { .. } => progress.finish_and_clear(),
            _ => {}
        }
    });
    orchestrator
}

fn resumable_runner(
    cli: &Cli,
    config: &PipelineConfig,
    definition: Arc<PipelineDefinition>,
    progress: Option<ProgressBar>,
) -> ResumableRunner<FileResumeStore> {
    let store = match &cli.state_dir {
        Some(dir) => FileResumeStore::new(dir),
        None => FileResumeStore::with_default_path(),
    };
    let orchestrator = build_orchestrator(config, progress);
    ResumableRunner::new(definition, Arc::new(orchestrator), store)
}

fn initial_context(audio: PathBuf) -> PipelineContext {
    PipelineContext::new().with("audio_file", audio)
}

#[cfg(feature = "sqlite")]
async fn history_store() -> Result<Arc<dyn PersistenceBackend>> {
    Ok(Arc::new(
        podcast_pipeline::persistence::SqliteRunStore::with_default_path().await?,
    ))
}

#[cfg(not(feature = "sqlite"))]
async fn history_store() -> Result<Arc<dyn PersistenceBackend>> {
    anyhow::bail!("Run history requires the `sqlite` feature")
}

/// Save a finished run to history without failing the command
async fn record_history(run: &mut PipelineRun) {
    let store = match history_store().await {
        Ok(store) => store,
        Err(e) => {
            warn!("History unavailable: {:#}", e);
            return;
        }
    };
    match save_run(store.as_ref(), run).await {
        Ok(()) => println!(
            "{} Run saved to history (ID: {})",
            INFO,
            style(&run.id().to_string()[..8]).dim()
        ),
        Err(e) => warn!("Failed to save run {} to history: {:#}", run.id(), e),
    }
}

/// Record history for a finished run unless the caller opted out
///
/// An opted-out run keeps no persistence outcome at all.
async fn finish_history(run: &mut PipelineRun, no_history: bool) {
    if !no_history {
        record_history(run).await;
    }
}

fn print_final_status(state: &RunState) {
    match state.status {
        ExecutionStatus::Completed => println!(
            "\n{} {} completed {}",
            CHECK,
            style(&state.pipeline_name).bold(),
            style("successfully").green()
        ),
        ExecutionStatus::Failed => {
            println!(
                "\n{} {} {}",
                CROSS,
                style(&state.pipeline_name).bold(),
                style("failed").red()
            );
            if let Some(failure) = &state.failure {
                error!("{}", failure.message);
            }
        }
        status => println!(
            "\n{} {} is {} (next step {}/{})",
            INFO,
            style(&state.pipeline_name).bold(),
            format_status(status),
            state.cursor + 1,
            state.steps.len()
        ),
    }
}

fn print_outputs(context: &PipelineContext) {
    for (key, value) in context.iter() {
        println!("\n{}", style(key).bold().cyan());
        println!("{}", format_context_value(value, 10));
    }
}

async fn run_pipeline(cli: &Cli, cmd: &RunCommand) -> Result<()> {
    let config = load_config(cli)?;
    let definition = Arc::new(config.to_definition()?);
    println!("{} Loaded pipeline: {}", INFO, style(&config.name).bold());

    let overrides = cmd.run.step_overrides()?;
    let progress = create_progress_bar(definition.len());
    let orchestrator = build_orchestrator(&config, Some(progress));
    let mut run = PipelineRun::new(
        Arc::clone(&definition),
        initial_context(cmd.run.audio.clone()),
        &overrides,
    )?;

    let status = orchestrator.run_to_completion(&mut run).await;

    finish_history(&mut run, cmd.no_history).await;

    if status == ExecutionStatus::Completed {
        print_outputs(run.context());
    }
    print_final_status(run.state());
    if status != ExecutionStatus::Completed {
        std::process::exit(1);
    }

    Ok(())
}

async fn start_run(cli: &Cli, cmd: &StartCommand) -> Result<()> {
    let config = load_config(cli)?;
    let definition = Arc::new(config.to_definition()?);
    let runner = resumable_runner(cli, &config, definition, None);

    let overrides = cmd.run.step_overrides()?;
    let state = runner
        .start(initial_context(cmd.run.audio.clone()), &overrides)
        .await?;

    println!(
        "{} Created run {} for {} ({} steps)",
        ROCKET,
        style(state.run_id).cyan(),
        style(&state.pipeline_name).bold(),
        state.steps.len()
    );
    println!(
        "  Advance it with: podcast-pipeline advance {}",
        state.run_id
    );
    Ok(())
}

async fn advance_run(cli: &Cli, cmd: &AdvanceCommand) -> Result<()> {
    let config = load_config(cli)?;
    let definition = Arc::new(config.to_definition()?);
    let progress = create_progress_bar(definition.len());
    let runner = resumable_runner(
        cli,
        &config,
        Arc::clone(&definition),
        Some(progress.clone()),
    );

    let mut state = runner.status(cmd.run_id).await?;
    progress.set_position(state.cursor as u64);
    state = runner.tick(cmd.run_id).await?;
    while cmd.all && !state.status.is_terminal() {
        state = runner.tick(cmd.run_id).await?;
    }
    progress.finish_and_clear();

    if state.status.is_terminal() && state.persistence.is_none() && !cmd.no_history {
        let mut run = PipelineRun::restore(definition, state)?;
        record_history(&mut run).await;
        runner.store().save(run.state()).await?;
        state = run.into_state();
    }

    if state.status == ExecutionStatus::Completed {
        print_outputs(&state.context);
    }
    print_final_status(&state);
    if state.status == ExecutionStatus::Failed {
        std::process::exit(1);
    }
    Ok(())
}

async fn show_status(cli: &Cli, cmd: &StatusCommand) -> Result<()> {
    let config = load_config(cli)?;
    let definition = Arc::new(config.to_definition()?);
    let runner = resumable_runner(cli, &config, definition, None);

    let state = runner.status(cmd.run_id).await?;
    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else {
        println!("{}", format_run_state(&state));
    }
    Ok(())
}

async fn cancel_run(cli: &Cli, cmd: &CancelCommand) -> Result<()> {
    let config = load_config(cli)?;
    let definition = Arc::new(config.to_definition()?);
    let runner = resumable_runner(cli, &config, definition, None);

    let state = runner.cancel(cmd.run_id, &cmd.reason).await?;
    match state.failure.as_ref() {
        Some(failure) if failure.message == cmd.reason => {
            println!("{} Cancelled run {}", CROSS, style(state.run_id).cyan())
        }
        _ => println!(
            "{} Run {} already finished ({})",
            WARN,
            style(state.run_id).cyan(),
            format_status(state.status)
        ),
    }
    Ok(())
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating pipeline...", INFO);

    let result = match &cmd.file {
        Some(path) => PipelineConfig::from_file(path),
        None => PipelineConfig::builtin(),
    };

    match result {
        Ok(config) => {
            println!("{} Pipeline configuration is valid!", CHECK);
            println!("  Name: {}", style(&config.name).bold());
            println!("  Inputs: {}", style(config.inputs.join(", ")).cyan());
            println!("  Steps: {}", style(config.steps.len()).cyan());
            for step in &config.steps {
                let optional = if step.optional { " (optional)" } else { "" };
                println!(
                    "    {} {}{} -> {}",
                    style(&step.name).bold(),
                    style(format!("{:?}", step.kind).to_lowercase()).dim(),
                    optional,
                    step.produces.join(", ")
                );
            }

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

async fn show_history(cmd: &HistoryCommand) -> Result<()> {
    let store = history_store().await?;

    if let Some(run_id) = cmd.run_id {
        match store.load_run_result(run_id).await? {
            Some(run) => print_run_details(&run, cmd.full)?,
            None => println!("{} Run not found", WARN),
        }
        return Ok(());
    }

    let mut runs = match &cmd.name {
        Some(name) => store.list_runs(name).await?,
        None => {
            let mut all = Vec::new();
            for name in store.list_pipelines().await? {
                all.extend(store.list_runs(&name).await?);
            }
            all
        }
    };
    runs.sort_by(|a, b| b.metadata.started_at.cmp(&a.metadata.started_at));
    runs.truncate(cmd.limit);

    if runs.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(());
    }

    if cmd.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        println!("{} Run history (showing latest {}):", INFO, cmd.limit);
        for run in &runs {
            println!("  {}", format_stored_run(run));
        }
    }

    Ok(())
}

fn print_run_details(run: &StoredRun, full: bool) -> Result<()> {
    let metadata = &run.metadata;
    println!("{} Run Details", INFO);
    println!("  ID: {}", style(run.run_id).cyan());
    println!("  Pipeline: {}", style(&metadata.pipeline_name).bold());
    println!("  Status: {}", format_status(metadata.status));
    println!("  Started: {}", style(metadata.started_at.to_rfc3339()).dim());
    if let Some(completed) = metadata.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
        if let Ok(duration) = completed
            .signed_duration_since(metadata.started_at)
            .to_std()
        {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }
    println!(
        "  Steps: {} completed, {} skipped, {} total",
        metadata.completed_steps, metadata.skipped_steps, metadata.total_steps
    );
    if let Some(error) = &metadata.error {
        println!("  Error: {}", style(error).red());
    }

    let max_lines = if full { usize::MAX } else { 5 };
    for (key, value) in run.context.iter() {
        println!("\n  {}", style(key).bold());
        for line in format_context_value(value, max_lines).lines() {
            println!("    {}", line);
        }
    }

    Ok(())
}
