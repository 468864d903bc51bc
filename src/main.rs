use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod artifact;
mod cli;
mod config;
mod environment;
mod error;
mod handler;
mod job;
mod orchestrator;
mod paginate;
mod runner;
mod template;
mod util;

use cli::{CheckArgs, CollectArgs, Command, InitArgs, ListArgs, RootArgs};
use config::HarnessConfig;
use environment::ProcessEnv;
use orchestrator::{Orchestrator, Selection};
use runner::SystemRunner;

/// Exit status for configuration, selection, and credential errors.
const EXIT_CONFIG_ERROR: u8 = 2;
/// Variable read for the log filter before `RUST_LOG`.
const LOG_FILTER_ENV: &str = "EVIDENCE_LOG";

fn main() -> ExitCode {
    let args = RootArgs::parse();
    init_tracing(args.command.verbose());

    let result = match args.command {
        Command::Collect(args) => run_collect(args),
        Command::Check(args) => run_check(args),
        Command::List(args) => run_list(args),
        Command::Init(args) => run_init(args),
    };
    match result {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(EXIT_CONFIG_ERROR)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load(explicit: Option<&Path>) -> Result<HarnessConfig> {
    let path = config::resolve_config_path(explicit, &ProcessEnv)?;
    tracing::debug!(path = %path.display(), "loading config");
    config::load_config(&path)
}

fn parse_date(value: Option<&str>) -> Result<NaiveDate> {
    match value {
        Some(text) => NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .with_context(|| format!("invalid --date {text:?} (expected YYYY-MM-DD)")),
        None => Ok(chrono::Local::now().date_naive()),
    }
}

fn run_collect(args: CollectArgs) -> Result<u8> {
    let config = load(args.config.as_deref())?;
    let date = parse_date(args.date.as_deref())?;
    let output_root = args
        .output_root
        .clone()
        .unwrap_or_else(|| config.output_root.clone());
    let selection = Selection {
        environments: args.env,
        jobs: if args.all { Vec::new() } else { args.job },
    };
    let plan = orchestrator::plan(&config, &selection)?;

    let runner = SystemRunner::new(Duration::from_secs(config.timeout_secs));
    let orchestrator = Orchestrator::new(&config, runner, output_root.clone(), date);
    let activations = orchestrator
        .preflight(&plan, &ProcessEnv)
        .map_err(|err| anyhow!("credential preflight failed: {err}"))?;

    tracing::info!(
        date = %date,
        output_root = %output_root.display(),
        environments = plan.steps.len(),
        jobs = plan.job_count(),
        "starting evidence run"
    );
    let summary = orchestrator.run(&plan, &activations);
    print!("{}", summary.render_text(&output_root));

    if let Some(path) = &args.summary {
        let write = serde_json::to_vec_pretty(&summary)
            .context("serialize run summary")
            .and_then(|bytes| {
                artifact::write_atomic(path, &bytes)
                    .with_context(|| format!("write summary {}", path.display()))
            });
        if let Err(err) = write {
            eprintln!("error: {err:#}");
            return Ok(1);
        }
    }
    Ok(summary.exit_code())
}

fn run_check(args: CheckArgs) -> Result<u8> {
    let config = load(args.config.as_deref())?;
    for name in &args.env {
        if config.environment(name).is_none() {
            return Err(anyhow!("unknown environment {name:?}"));
        }
    }
    for profile in config
        .environments
        .iter()
        .filter(|env| args.env.is_empty() || args.env.contains(&env.name))
    {
        environment::activate(profile, &ProcessEnv)
            .with_context(|| format!("environment {:?}", profile.name))?;
        println!("ok  {}", profile.name);
    }
    println!(
        "config valid: {} environments, {} jobs",
        config.environments.len(),
        config.jobs.len()
    );
    Ok(0)
}

fn run_list(args: ListArgs) -> Result<u8> {
    let config = load(args.config.as_deref())?;
    println!("Environments:");
    for env in &config.environments {
        println!("  {:<16} {:<4} {}", env.name, env.provider, env.region);
    }
    println!("Jobs:");
    for job in &config.jobs {
        let scope = job
            .environments
            .as_ref()
            .map_or_else(|| "all".to_string(), |names| names.join(","));
        println!(
            "  {:<32} {:<5} [{}] ({scope}) {}",
            job.id,
            job.command.kind(),
            job.controls.join(","),
            job.description.as_deref().unwrap_or(""),
        );
    }
    Ok(0)
}

fn run_init(args: InitArgs) -> Result<u8> {
    let path = config::resolve_config_path(args.config.as_deref(), &ProcessEnv)?;
    config::write_starter_config(&path, args.force)?;
    println!("wrote {}", path.display());
    Ok(0)
}
