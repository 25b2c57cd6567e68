mod error;
mod models;
mod run;

use clap::{Parser, Subcommand};
use error::{CliError, CliResult};
use hy_results::{ResultTable, RunManifest, RunStore, RunType};
use hy_sim::SolveProgress;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hy-cli")]
#[command(about = "Hybrid ODE solver - events, fast processes and delays", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the built-in models and their parameters
    Models,
    /// Validate a run configuration file
    Validate {
        /// Path to the YAML or JSON config
        config_path: PathBuf,
    },
    /// Run a simulation
    Run {
        /// Path to the YAML or JSON config
        config_path: PathBuf,
        /// Write the result table as CSV
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Run store directory (defaults to .hybrid/runs next to the config)
        #[arg(long)]
        store: Option<PathBuf>,
        /// Re-initialize the state from a stored run at every reporting point
        #[arg(long)]
        schedule_run: Option<String>,
        /// Skip cache and force re-run
        #[arg(long)]
        no_cache: bool,
    },
    /// List stored runs of a model kind
    Runs {
        /// Run store directory
        store: PathBuf,
        /// Model kind to list runs for
        model_kind: String,
    },
    /// Show details of a stored run
    ShowRun {
        /// Run store directory
        store: PathBuf,
        /// Run ID to display
        run_id: String,
        /// Write the result table as CSV
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Models => cmd_models(),
        Commands::Validate { config_path } => cmd_validate(&config_path),
        Commands::Run {
            config_path,
            output,
            store,
            schedule_run,
            no_cache,
        } => cmd_run(
            &config_path,
            output.as_deref(),
            store,
            schedule_run.as_deref(),
            !no_cache,
        ),
        Commands::Runs { store, model_kind } => cmd_runs(store, &model_kind),
        Commands::ShowRun {
            store,
            run_id,
            output,
        } => cmd_show_run(store, &run_id, output.as_deref()),
    }
}

fn cmd_models() -> CliResult<()> {
    println!("Built-in models:");
    for info in models::MODELS {
        println!("  {} - {}", info.kind, info.description);
        let params: Vec<String> = info
            .parameters
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        println!("      parameters: {}", params.join(", "));
    }
    Ok(())
}

fn cmd_validate(config_path: &Path) -> CliResult<()> {
    println!("Validating config: {}", config_path.display());
    let config = hy_project::load_config(config_path)?;
    let built = models::build(&config.model)?;
    run::solver_config(&config.solver).validate()?;
    println!("✓ Config is valid");
    println!(
        "  model: {} ({} states)",
        config.model.kind,
        built.model.dimension()
    );
    Ok(())
}

fn cmd_run(
    config_path: &Path,
    output: Option<&Path>,
    store: Option<PathBuf>,
    schedule_run: Option<&str>,
    use_cache: bool,
) -> CliResult<()> {
    let config = hy_project::load_config(config_path)?;
    let store = match store {
        Some(dir) => RunStore::new(dir)?,
        None => RunStore::for_config(config_path)?,
    };
    println!("Running '{}' ({})", config.name, config.model.kind);

    let times = config.time.to_points();
    let t_start = times.first().copied().unwrap_or(0.0);
    let t_end = times.last().copied().unwrap_or(0.0);
    let mut last_emit = Instant::now();
    let progress = move |p: &SolveProgress<'_>| {
        let done = p.time >= t_end;
        if done || last_emit.elapsed().as_millis() >= 100 {
            render_progress(p, t_start, t_end);
            last_emit = Instant::now();
        }
    };

    let request = run::RunRequest {
        config: &config,
        store: &store,
        use_cache,
        schedule_run,
    };
    let response = run::ensure_run(&request, Some(progress))?;
    clear_progress_line();

    if response.loaded_from_cache {
        println!("✓ Loaded from cache: {}", response.run_id);
    } else {
        println!("✓ Simulation completed: {}", response.run_id);
        println!("  Solve: {:.3}s", response.solve_time_s);
    }
    if let Some(stats) = &response.stats {
        println!("  RHS evaluations:  {}", stats.rhs_evaluations);
        println!(
            "  Stages:           {} accepted, {} rejected",
            stats.accepted_stages, stats.rejected_stages
        );
        println!("  Bisections:       {}", stats.bisections);
        println!("  Events executed:  {}", stats.events_executed);
        if stats.fast_relaxations > 0 {
            println!("  Fast relaxations: {}", stats.fast_relaxations);
        }
    }
    print_manifest(&response.manifest, &response.table);

    if let Some(path) = output {
        write_csv(&response.table, path)?;
    }
    Ok(())
}

fn cmd_runs(store: PathBuf, model_kind: &str) -> CliResult<()> {
    let store = RunStore::new(store)?;
    let runs = store.list_runs(model_kind)?;

    if runs.is_empty() {
        println!("No stored runs found for model: {}", model_kind);
    } else {
        println!("Stored runs for model '{}':", model_kind);
        for manifest in runs {
            println!(
                "  {} {} ({})",
                manifest.run_id, manifest.name, manifest.timestamp
            );
        }
    }
    Ok(())
}

fn cmd_show_run(store: PathBuf, run_id: &str, output: Option<&Path>) -> CliResult<()> {
    println!("Loading run: {}", run_id);
    let store = RunStore::new(store)?;
    let manifest = store.load_manifest(run_id)?;
    let table = store.load_table(run_id)?;

    print_manifest(&manifest, &table);
    match output {
        Some(path) => write_csv(&table, path)?,
        None => {
            let stdout = io::stdout();
            table.write_csv(stdout.lock())?;
        }
    }
    Ok(())
}

fn print_manifest(manifest: &RunManifest, table: &ResultTable) {
    println!("\nRun Summary:");
    println!("  Name:    {}", manifest.name);
    println!("  Model:   {}", manifest.model_kind);
    println!("  Method:  {}", manifest.method);
    match &manifest.run_type {
        RunType::Grid {
            t_start,
            t_end,
            points,
        } => println!("  Grid:    {points} points over {t_start} - {t_end}"),
        RunType::Schedule { points } => println!("  Schedule: {points} points"),
    }
    println!("  Rows:    {}", table.len());
    println!("  Columns: {}", manifest.columns.join(", "));
    if !manifest.intermediate_columns.is_empty() {
        println!(
            "  Intermediates: {}",
            manifest.intermediate_columns.join(", ")
        );
    }
    if manifest.unstable {
        println!("  ⚠ solver reported NaN values during this run");
    }
    if let Some(row) = table.last_row() {
        println!("\nFinal state at t = {}:", row.time);
        for (name, value) in manifest.columns.iter().zip(&row.values) {
            println!("  {name} = {value:.6e}");
        }
    }
}

fn write_csv(table: &ResultTable, path: &Path) -> CliResult<()> {
    let file = File::create(path).map_err(|source| CliError::OutputWrite {
        path: path.to_path_buf(),
        source,
    })?;
    let mut out = BufWriter::new(file);
    table.write_csv(&mut out)?;
    out.flush()?;
    println!("✓ Exported {} rows to {}", table.len(), path.display());
    Ok(())
}

fn clear_progress_line() {
    print!("\r{}\r", " ".repeat(80));
    let _ = io::stdout().flush();
}

fn render_progress(p: &SolveProgress<'_>, t_start: f64, t_end: f64) {
    let span = (t_end - t_start).max(1e-300);
    let fraction = ((p.time - t_start) / span).clamp(0.0, 1.0);
    let width = 28usize;
    let filled = ((fraction * width as f64).round() as usize).min(width);
    print!(
        "\r[{}{}] {:>6.2}%  t={:.3}/{:.3}  row={}",
        "#".repeat(filled),
        "-".repeat(width - filled),
        fraction * 100.0,
        p.time,
        t_end,
        p.row_index
    );
    let _ = io::stdout().flush();
}
