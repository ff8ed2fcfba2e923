//! architect: runs the autonomous build-cycle factory.
//!
//!   architect run              — Cycle forever until Ctrl-C or a failure
//!   architect once             — Run one cycle and print the outcome
//!   architect list [--limit N] — Show projects in the record store
//!   architect pending          — Show records buffered locally
//!
//! With --events, every factory event is also written to stdout as one JSON
//! object per line.
//!
//! Requires OPENAI_API_KEY, CF_ACCOUNT_ID, CF_API_TOKEN and CF_DATABASE_ID
//! (or the matching flags).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use architect_factory::config::{self, Credentials, FileConfig, Settings};
use architect_factory::driver::CycleDriver;
use architect_factory::events::{self, ChannelSink, EventSink, Tee, TracingSink};
use architect_factory::factory::{Factory, FactoryConfig};
use architect_factory::fallback::LocalStore;
use architect_factory::llm::OpenAiClient;
use architect_factory::shutdown::Shutdown;
use architect_factory::store::{D1Client, QueryLimit, RecordStore};

#[derive(Parser)]
#[command(name = "architect", about = "Autonomous build-cycle factory")]
struct Args {
    /// Settings file (default: ~/.config/architect/factory.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    openai_key: Option<String>,

    /// Cloudflare account ID
    #[arg(long, env = "CF_ACCOUNT_ID", global = true)]
    cf_account_id: Option<String>,

    /// Cloudflare API token
    #[arg(long, env = "CF_API_TOKEN", hide_env_values = true, global = true)]
    cf_api_token: Option<String>,

    /// Cloudflare D1 database ID
    #[arg(long, env = "CF_DATABASE_ID", global = true)]
    cf_database_id: Option<String>,

    /// Chat model (overrides the settings file)
    #[arg(long, global = true)]
    model: Option<String>,

    /// Local fallback database (overrides the settings file)
    #[arg(long, global = true)]
    fallback_db: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Stream factory events to stdout as JSON lines
    #[arg(long, global = true)]
    events: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run cycles back to back until Ctrl-C or the first failure
    Run {
        /// Seconds to wait between cycles
        #[arg(long)]
        delay: Option<u64>,
    },
    /// Run exactly one cycle and print the outcome as JSON
    Once,
    /// List projects in the record store, newest first
    List {
        /// Number of rows (1-100, default 10)
        #[arg(long)]
        limit: Option<String>,
    },
    /// List records buffered in the local fallback store
    Pending,
}

impl Args {
    fn credentials(&self) -> Credentials {
        Credentials {
            openai_key: self.openai_key.clone(),
            cf_account_id: self.cf_account_id.clone(),
            cf_api_token: self.cf_api_token.clone(),
            cf_database_id: self.cf_database_id.clone(),
        }
    }

    fn settings(&self) -> Result<Settings> {
        let path = self.config.clone().unwrap_or_else(config::default_config_path);
        let file = FileConfig::load(&path)?;
        let delay = match &self.command {
            Command::Run { delay } => *delay,
            _ => None,
        };
        let overrides = FileConfig {
            model: self.model.clone(),
            fallback_db: self.fallback_db.clone(),
            cycle_delay_secs: delay,
            ..Default::default()
        };
        Ok(Settings::resolve(file.overlay(overrides))?)
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "architect_factory=info,architect=info".into());
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn record_store(settings: &Settings, creds: &Credentials) -> Result<D1Client> {
    let c = creds.store()?;
    let client = D1Client::new(c.account_id, c.api_token, c.database_id)?;
    Ok(match &settings.store_url {
        Some(url) => client.with_base_url(url),
        None => client,
    })
}

fn open_fallback(path: &std::path::Path) -> Result<LocalStore> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Ok(LocalStore::open(path)?)
}

/// Events always go to tracing; with `stream` they are also teed into a
/// channel drained to stdout as JSON lines.
fn event_sink(stream: bool) -> Arc<dyn EventSink> {
    if !stream {
        return Arc::new(TracingSink);
    }
    let (channel, rx) = ChannelSink::new();
    tokio::spawn(async move {
        if let Err(e) = events::write_json_lines(rx, std::io::stdout()).await {
            tracing::warn!(error = %e, "Event stream closed");
        }
    });
    Arc::new(Tee::new(TracingSink, channel))
}

fn build_factory(
    settings: &Settings,
    creds: &Credentials,
    sink: Arc<dyn EventSink>,
) -> Result<Factory> {
    let llm = OpenAiClient::new(creds.completion_key()?)?
        .with_model(&settings.model)
        .with_url(&settings.completion_url)
        .with_max_tokens(settings.max_tokens)
        .with_timeout(settings.completion_timeout);
    let store = record_store(settings, creds)?;
    let fallback = open_fallback(&settings.fallback_db)?;

    tracing::info!(
        model = %settings.model,
        fallback_db = %settings.fallback_db.display(),
        "Factory configured"
    );

    Ok(Factory::new(
        Arc::new(llm),
        Arc::new(store),
        Arc::new(fallback),
        sink,
        FactoryConfig {
            cycle_timeout: settings.cycle_timeout,
        },
    ))
}

/// Cancel `shutdown` on Ctrl-C.
fn cancel_on_ctrl_c(shutdown: &Shutdown) {
    let shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, stopping");
            shutdown.cancel();
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json);

    let settings = args.settings()?;
    let creds = args.credentials();

    match &args.command {
        Command::Run { .. } => {
            let factory = build_factory(&settings, &creds, event_sink(args.events))?;
            let shutdown = Shutdown::new();
            cancel_on_ctrl_c(&shutdown);

            let driver = CycleDriver::new(factory).with_delay(settings.cycle_delay);
            let report = driver.run(&shutdown).await.context("Factory stopped")?;
            tracing::info!(cycles = report.cycles_completed, "Factory shut down");
        }
        Command::Once => {
            let factory = build_factory(&settings, &creds, event_sink(args.events))?;
            let shutdown = Shutdown::new();
            cancel_on_ctrl_c(&shutdown);

            let outcome = factory.run_cycle(&shutdown).await.context("Cycle failed")?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::List { limit } => {
            let store = record_store(&settings, &creds)?;
            let projects = store
                .list_projects(QueryLimit::parse(limit.as_deref()))
                .await
                .context("Failed to list projects")?;
            for p in &projects {
                let when = chrono::DateTime::from_timestamp_millis(p.timestamp)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| p.timestamp.to_string());
                println!("{when}  {}  [{}]", p.name, p.stack);
            }
            if projects.is_empty() {
                println!("No projects stored yet.");
            }
        }
        Command::Pending => {
            let fallback = open_fallback(&settings.fallback_db)?;
            let entries = fallback.entries()?;
            for e in &entries {
                let name = serde_json::from_str::<serde_json::Value>(&e.value)
                    .ok()
                    .and_then(|v| v["name"].as_str().map(str::to_string))
                    .unwrap_or_else(|| "?".to_string());
                println!("{}  {}  {name}", e.created_at, e.key);
            }
            if entries.is_empty() {
                println!("No locally buffered records.");
            }
        }
    }

    Ok(())
}
