use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use hostrun_client::{
    changed_entries, render_event, render_summary, EnvTokenProvider, HttpEventSource,
    HttpFailureReporter, Reconciler, TerminalOutcome,
};
use hostrun_core::config::{load_app_config, AppConfig, ConfigError};
use hostrun_core::types::ProjectId;
use hostrun_core::validation::{render_errors, Validate, ValidationLevel};
use hostrun_notify::{NotificationDispatcher, NotificationPolicy, NotificationSinkKind};
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_CONFIG: &str = "config/hostrun.toml";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Parser)]
#[command(name = "hostrun-watch", about = "Run a project and follow its execution stream")]
struct Cli {
    /// Project to execute.
    project_id: String,
    /// Config file; defaults apply when the default path does not exist.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides `[client] base_url`.
    #[arg(long)]
    base_url: Option<String>,
    /// Overrides `[client] token_env`.
    #[arg(long)]
    token_env: Option<String>,
    /// Report the outcome through the log only.
    #[arg(long)]
    quiet: bool,
}

#[derive(Debug, thiserror::Error)]
enum MainError {
    #[error("failed to load config: {0}")]
    LoadConfig(#[from] ConfigError),
    #[error("config validation failed ({0})")]
    InvalidConfig(String),
    #[error("failed to build http client: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("run did not complete")]
    RunFailed,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hostrun=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(err) = run(Cli::parse()).await {
        eprintln!("hostrun-watch failed: {err}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), MainError> {
    let mut config = resolve_config(cli.config.as_deref())?;
    if let Some(base_url) = cli.base_url {
        config.client.base_url = base_url;
    }
    if let Some(token_env) = cli.token_env {
        config.client.token_env = token_env;
    }
    check_config(&config)?;

    let project_id = ProjectId::new(cli.project_id);
    let http = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(MainError::HttpClient)?;
    let source = HttpEventSource::new(
        http.clone(),
        config.client.base_url.clone(),
        project_id.clone(),
        Arc::new(EnvTokenProvider::new(config.client.token_env.clone())),
        config.client.max_frame_bytes,
    );
    let reporter = HttpFailureReporter::new(http, config.client.base_url.clone());
    let policy = NotificationPolicy {
        enabled_sinks: vec![if cli.quiet {
            NotificationSinkKind::Tracing
        } else {
            NotificationSinkKind::Stdout
        }],
    };

    let reconciler = Reconciler::new(project_id, Box::new(source), Arc::new(reporter))
        .with_notifier(Arc::new(NotificationDispatcher::from_policy(&policy)));
    let cancel = reconciler.cancel_handle();
    let pending_reports = reconciler.pending_reports();
    let mut snapshots = reconciler.subscribe();

    let printer = tokio::spawn(async move {
        let mut shown = Vec::new();
        while snapshots.changed().await.is_ok() {
            let log = snapshots.borrow_and_update().log.clone();
            for event in changed_entries(&shown, &log) {
                println!("{}", render_event(event));
            }
            shown = log;
        }
    });
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let state = reconciler.run().await;
    pending_reports.settle().await;
    if printer.await.is_err() {
        warn!("log printer stopped early");
    }
    println!("{}", render_summary(&state));

    match state.terminal() {
        Some(TerminalOutcome::Completed) => Ok(()),
        _ => Err(MainError::RunFailed),
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig, MainError> {
    match path {
        Some(path) => Ok(load_app_config(path)?),
        None if Path::new(DEFAULT_CONFIG).exists() => Ok(load_app_config(DEFAULT_CONFIG)?),
        None => Ok(AppConfig::default()),
    }
}

fn check_config(config: &AppConfig) -> Result<(), MainError> {
    let issues = config.validate();
    for issue in issues
        .iter()
        .filter(|issue| issue.level == ValidationLevel::Warning)
    {
        warn!(code = issue.code, "{}", issue.message);
    }
    match render_errors(&issues) {
        Some(rendered) => Err(MainError::InvalidConfig(rendered)),
        None => Ok(()),
    }
}
