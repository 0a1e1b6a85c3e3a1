use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use hostrun_core::config::{load_app_config, load_project_catalog, AppConfig, ConfigError};
use hostrun_core::validation::{render_errors, Validate, ValidationIssue, ValidationLevel};
use hostrun_exec::{Coordinator, MemoryExecutionStore, ShellTransport};
use hostrun_web::{run_web_server, WebError, WebState};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_CONFIG: &str = "config/hostrun.toml";

#[derive(Debug, Parser)]
#[command(name = "hostrun-server", about = "Serve project execution streams")]
struct Cli {
    /// Config file; defaults apply when the default path does not exist.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides `[server] bind`.
    #[arg(long)]
    bind: Option<String>,
    /// Overrides `[server] projects_path`.
    #[arg(long)]
    projects: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
enum MainError {
    #[error("{0}")]
    Args(String),
    #[error("failed to load config: {0}")]
    LoadConfig(#[from] ConfigError),
    #[error("config validation failed ({0})")]
    InvalidConfig(String),
    #[error("no token configured: environment variable {env} is empty or unset")]
    MissingToken { env: String },
    #[error(transparent)]
    Web(#[from] WebError),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hostrun=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(err) = run(Cli::parse()).await {
        eprintln!("hostrun-server failed: {err}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), MainError> {
    let config = resolve_config(cli.config.as_deref())?;
    check_issues("config", &config.validate())?;
    let bind = resolve_bind(cli.bind, &config.server.bind)?;

    let projects_path = cli
        .projects
        .unwrap_or_else(|| config.server.projects_path.clone());
    let catalog = load_project_catalog(&projects_path)?;
    for graph in &catalog.projects {
        let issues = graph.validate();
        // Invalid graphs stay listed; the coordinator refuses to run them.
        if let Some(rendered) = render_errors(&issues) {
            warn!(project_id = %graph.project_id, "project cannot run: {rendered}");
        }
        log_warnings(&issues);
    }
    info!(projects = catalog.projects.len(), path = %projects_path.display(), "loaded projects");

    let token = std::env::var(&config.auth.token_env)
        .ok()
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| MainError::MissingToken {
            env: config.auth.token_env.clone(),
        })?;

    let transport = ShellTransport::new(
        config.transport.clone(),
        Duration::from_secs(config.execution.script_timeout_secs),
    );
    let coordinator = Coordinator::new(
        Arc::new(transport),
        Arc::new(MemoryExecutionStore::default()),
        config.execution.max_parallel_hosts,
    );

    run_web_server(&bind, WebState::new(catalog, coordinator, token)).await?;
    Ok(())
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig, MainError> {
    match path {
        Some(path) => Ok(load_app_config(path)?),
        None if Path::new(DEFAULT_CONFIG).exists() => Ok(load_app_config(DEFAULT_CONFIG)?),
        None => Ok(AppConfig::default()),
    }
}

fn resolve_bind(bind_override: Option<String>, config_bind: &str) -> Result<String, MainError> {
    let candidate = bind_override.unwrap_or_else(|| config_bind.to_string());
    let trimmed = candidate.trim();
    if trimmed.is_empty() {
        return Err(MainError::Args("bind address must not be empty".to_string()));
    }
    Ok(trimmed.to_string())
}

fn check_issues(what: &str, issues: &[ValidationIssue]) -> Result<(), MainError> {
    log_warnings(issues);
    match render_errors(issues) {
        Some(rendered) => Err(MainError::InvalidConfig(format!("{what}: {rendered}"))),
        None => Ok(()),
    }
}

fn log_warnings(issues: &[ValidationIssue]) {
    for issue in issues
        .iter()
        .filter(|issue| issue.level == ValidationLevel::Warning)
    {
        warn!(code = issue.code, "{}", issue.message);
    }
}
