use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use narrator::cli::{Cli, Commands, ConfigAction, RunTask};
use narrator::config::Config;
use narrator::diagnostics::check_dependencies;
use narrator::pipeline::{Action, Services, TriggerEvent, WorkQueue, run_event};
use narrator::server;
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_filter());

    match cli.command {
        Commands::Serve {
            bind,
            workers,
            chain_merge,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(workers) = workers {
                config.queue.workers = workers;
            }
            config.queue.chain_merge |= chain_merge;
            run_server(config).await?;
        }
        Commands::Run { task } => {
            let config = load_config(cli.config.as_deref())?;
            let event = match task {
                RunTask::Generate { record_id } => {
                    TriggerEvent::new(Action::GenerateAudioVideo, record_id)
                }
                RunTask::Merge { record_id } => TriggerEvent::new(Action::MergeAudioVideo, record_id),
            };
            if !run_once(config, event).await? {
                std::process::exit(1);
            }
        }
        Commands::Check => {
            let config = load_config(cli.config.as_deref())?;
            if !check_dependencies(&config) {
                std::process::exit(1);
            }
        }
        Commands::Config { action } => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "narrator",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Log to stderr; `RUST_LOG` wins over the `-q`/`-v` default.
fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config), which must exist
/// 2. Default config path (~/.config/narrator/config.toml)
/// 3. Built-in defaults
///
/// Environment overrides are applied last in every case.
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = match custom_path {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(&Config::default_path())?,
    };
    Ok(config.with_env_overrides())
}

async fn run_server(config: Config) -> Result<()> {
    config.validate()?;
    let services = Arc::new(Services::from_config(&config)?);
    let queue = WorkQueue::start(services, tokio::runtime::Handle::current(), &config.queue)?;

    let reports = queue.reports();
    let logger = std::thread::Builder::new()
        .name("narrator-reports".to_string())
        .spawn(move || {
            for report in reports.iter() {
                match serde_json::to_string(&report) {
                    Ok(line) => tracing::debug!(target: "narrator::reports", "{line}"),
                    Err(e) => tracing::warn!(error = %e, "unserializable task report"),
                }
            }
        })
        .context("failed to spawn report logger")?;

    let app = server::router(queue.handle(), queue.worker_count());
    let served = server::serve(&config.server.bind, app).await;

    tracing::info!("draining worker pool");
    let stopped = tokio::task::spawn_blocking(move || queue.shutdown()).await?;
    if let Err(e) = stopped {
        tracing::warn!(error = %e, "worker pool did not stop cleanly");
    }
    if logger.join().is_err() {
        tracing::warn!("report logger panicked");
    }
    served?;
    Ok(())
}

/// Run one task inline and print its report. Returns whether it succeeded.
async fn run_once(config: Config, event: TriggerEvent) -> Result<bool> {
    config.validate()?;
    let services = Services::from_config(&config)?;
    let report = run_event(&services, &event).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.succeeded() {
        eprintln!("{} {} {}", "✓".green(), event.action, event.record_id);
    } else {
        eprintln!(
            "{} {} {}: {}",
            "✗".red(),
            event.action,
            event.record_id,
            report.error.as_deref().unwrap_or("failed")
        );
    }
    Ok(report.succeeded())
}

/// Handle configuration commands.
fn handle_config_command(action: ConfigAction, custom_path: Option<&Path>) -> Result<()> {
    let config_path = custom_path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);

    match action {
        ConfigAction::Show => {
            let config = load_config(custom_path)?;
            print!("{}", config.redacted().to_toml()?);
        }
        ConfigAction::Path => {
            println!("{}", config_path.display());
        }
        ConfigAction::Init { force } => {
            if config_path.exists() && !force {
                eprintln!(
                    "{} {} already exists (use --force to overwrite)",
                    "✗".red(),
                    config_path.display()
                );
                std::process::exit(1);
            }
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            std::fs::write(&config_path, Config::default().to_toml()?)
                .with_context(|| format!("failed to write {}", config_path.display()))?;
            println!("{} Wrote {}", "✓".green(), config_path.display());
        }
    }
    Ok(())
}
