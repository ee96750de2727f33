//! Harbor CLI - drive an offline worker from the command line.
//!
//! Every command builds the worker from the config and data directory,
//! delivers one event through the host, and saves the lifecycle state so
//! the next invocation continues where this one stopped.

mod wire;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use url::Url;

use harbor_cache::{create_default_registry, CacheStore, Purpose};
use harbor_common::{Method, Request, RequestMode};
use harbor_net::HttpFetcher;
use harbor_sync::{FileQueue, PendingOperation, SyncScheduler};
use harbor_worker::config::CONFIG_FILENAME;
use harbor_worker::{
    ControlEnvelope, ControlMessage, Event, Registration, StoreConfig, Worker, WorkerConfig,
    WorkerHost,
};

use crate::wire::{describe, WireEvent};

const REGISTRATION_FILENAME: &str = "registration.json";
const QUEUE_DIRNAME: &str = "pending";
const CACHE_DIRNAME: &str = "cache";

#[derive(Parser)]
#[command(name = "harbor")]
#[command(about = "Harbor - Offline caching and background sync worker")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Worker config file (default: <data-dir>/harbor.json if present).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory for caches, the pending queue and lifecycle state.
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Override the registration scope.
    #[arg(short, long, global = true)]
    scope: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a request through the worker.
    Fetch {
        /// Absolute URL, or a path relative to the scope.
        url: String,

        /// HTTP method.
        #[arg(short, long, default_value = "GET")]
        method: String,

        /// Mark the request as a page navigation.
        #[arg(short, long)]
        navigate: bool,

        /// Request header as "name: value" (repeatable).
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Request body.
        #[arg(short, long)]
        body: Option<String>,
    },

    /// Send a control message (SKIP_WAITING, CLEAR_CACHE, CACHE_URLS).
    Message {
        /// Message type.
        kind: String,

        /// URLs for CACHE_URLS.
        urls: Vec<String>,
    },

    /// Queue a mutation for background sync.
    Enqueue {
        /// Absolute URL of the endpoint.
        url: String,

        /// HTTP method (not GET, HEAD or OPTIONS).
        #[arg(short, long, default_value = "POST")]
        method: String,

        /// JSON body.
        #[arg(short, long)]
        body: Option<String>,

        /// Request header as "name: value" (repeatable).
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
    },

    /// List queued mutations.
    Pending,

    /// Replay queued mutations now.
    Sync {
        /// Sync tag (default: the configured tag).
        #[arg(short, long)]
        tag: Option<String>,
    },

    /// Install the configured worker version.
    Install,

    /// Activate the waiting worker version.
    Activate {
        /// Clients still controlled by the previous version.
        #[arg(long, default_value_t = 0)]
        clients: usize,
    },

    /// Show cache partitions.
    Partitions,

    /// Read newline-delimited JSON events from stdin and dispatch them.
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let env = Env::load(&cli).await?;

    match cli.command {
        Commands::Fetch {
            url,
            method,
            navigate,
            headers,
            body,
        } => cmd_fetch(&env, &url, &method, navigate, &headers, body).await,

        Commands::Message { kind, urls } => cmd_message(&env, kind, urls).await,

        Commands::Enqueue {
            url,
            method,
            body,
            headers,
        } => cmd_enqueue(&env, &url, &method, body.as_deref(), &headers).await,

        Commands::Pending => cmd_pending(&env).await,

        Commands::Sync { tag } => cmd_sync(&env, tag).await,

        Commands::Install => cmd_install(&env).await,

        Commands::Activate { clients } => cmd_activate(&env, clients).await,

        Commands::Partitions => cmd_partitions(&env).await,

        Commands::Run => cmd_run(&env).await,
    }
}

/// Everything a command needs, built from the CLI flags.
struct Env {
    data_dir: PathBuf,
    store: Arc<dyn CacheStore>,
    host: WorkerHost,
}

impl Env {
    async fn load(cli: &Cli) -> Result<Self> {
        let data_dir = match &cli.data_dir {
            Some(dir) => dir.clone(),
            None => dirs::data_dir()
                .map(|dir| dir.join("harbor"))
                .context("No data directory available; pass --data-dir")?,
        };
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("Failed to create {}", data_dir.display()))?;

        let mut config = load_config(cli.config.as_deref(), &data_dir)?;
        if let Some(scope) = &cli.scope {
            config.scope = scope.clone();
        }
        config.validate().context("Invalid worker configuration")?;

        let store = open_store(&config.store, &data_dir)?;

        let queue_path = config
            .queue_path
            .clone()
            .unwrap_or_else(|| data_dir.join(QUEUE_DIRNAME));
        let queue = FileQueue::open(&queue_path)
            .await
            .context("Failed to open pending queue")?;

        let fetcher = HttpFetcher::new(&config.user_agent).context("Failed to build HTTP client")?;

        let mut worker = Worker::new(config, store.clone(), Arc::new(queue), Arc::new(fetcher))
            .context("Failed to create worker")?;
        if let Some(registration) = load_registration(&data_dir.join(REGISTRATION_FILENAME))? {
            worker = worker.with_registration(registration);
        }

        Ok(Self {
            data_dir,
            store,
            host: WorkerHost::new(Arc::new(worker)),
        })
    }

    fn worker(&self) -> &Worker {
        self.host.worker()
    }

    /// Persist the lifecycle state for the next invocation.
    async fn save(&self) -> Result<()> {
        let path = self.data_dir.join(REGISTRATION_FILENAME);
        let json = serde_json::to_string_pretty(&self.worker().registration())?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        debug!("Saved registration to {}", path.display());
        Ok(())
    }

    fn resolve(&self, url: &str) -> Result<Url> {
        match Url::parse(url) {
            Ok(url) => Ok(url),
            Err(_) => self
                .worker()
                .config()
                .resolve(url)
                .with_context(|| format!("Invalid URL: {}", url)),
        }
    }
}

fn load_config(path: Option<&Path>, data_dir: &Path) -> Result<WorkerConfig> {
    if let Some(path) = path {
        return WorkerConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()));
    }

    let default_path = data_dir.join(CONFIG_FILENAME);
    if default_path.exists() {
        return WorkerConfig::load(&default_path)
            .with_context(|| format!("Failed to load config {}", default_path.display()));
    }

    // Without a config file the caches live in the data directory.
    Ok(WorkerConfig {
        store: StoreConfig {
            kind: "local".to_string(),
            config: serde_json::Value::Null,
        },
        ..WorkerConfig::default()
    })
}

fn open_store(store: &StoreConfig, data_dir: &Path) -> Result<Arc<dyn CacheStore>> {
    let mut options = store.config.clone();
    if store.kind == "local" && options.get("root").is_none() {
        options = serde_json::json!({ "root": data_dir.join(CACHE_DIRNAME) });
    }

    create_default_registry()
        .resolve(&store.kind, &options)
        .with_context(|| format!("Failed to open '{}' cache store", store.kind))
}

fn load_registration(path: &Path) -> Result<Option<Registration>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let registration =
        serde_json::from_str(&raw).with_context(|| format!("Corrupt {}", path.display()))?;
    Ok(Some(registration))
}

/// Parse "name: value" header arguments.
fn parse_headers(raw: &[String]) -> Result<Vec<(String, String)>> {
    raw.iter()
        .map(|header| {
            let (name, value) = header
                .split_once(':')
                .with_context(|| format!("Header must be 'name: value': {}", header))?;
            Ok((name.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Send a request through the worker.
async fn cmd_fetch(
    env: &Env,
    url: &str,
    method: &str,
    navigate: bool,
    headers: &[String],
    body: Option<String>,
) -> Result<()> {
    let method: Method = method.parse().context("Invalid method")?;
    let mut request = Request::new(method, env.resolve(url)?);
    if navigate {
        request = request.with_mode(RequestMode::Navigate);
    }
    for (name, value) in parse_headers(headers)? {
        request = request.with_header(&name, value);
    }
    if let Some(body) = body {
        request = request.with_body(body);
    }

    info!("{} {}", request.method, request.url);
    let response = env.host.respond(request).await.context("Request failed")?;
    env.host.drain().await;

    println!("{} {} ({:?})", response.status, response.status_text, response.source);
    for (name, value) in &response.headers {
        println!("{}: {}", name, value);
    }
    println!();
    println!("{}", response.text());

    Ok(())
}

/// Send a control message.
async fn cmd_message(env: &Env, kind: String, urls: Vec<String>) -> Result<()> {
    let envelope = if kind == ControlMessage::CACHE_URLS {
        ControlMessage::CacheUrls(urls).to_envelope()
    } else {
        ControlEnvelope::new(kind)
    };

    let outcome = env
        .host
        .dispatch(Event::Message(envelope))
        .await
        .context("Control message failed")?;
    env.save().await?;

    println!("{}", describe(&outcome));
    Ok(())
}

/// Queue a mutation for background sync.
async fn cmd_enqueue(
    env: &Env,
    url: &str,
    method: &str,
    body: Option<&str>,
    headers: &[String],
) -> Result<()> {
    let method: Method = method.parse().context("Invalid method")?;
    let body = body
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()
        .context("Body must be valid JSON")?;

    let mut op = PendingOperation::new(method, env.resolve(url)?, body)
        .context("Cannot queue this request")?;
    for (name, value) in parse_headers(headers)? {
        op = op.with_header(&name, value);
    }

    let id = op.id.clone();
    env.worker()
        .queue()
        .enqueue(op)
        .await
        .context("Failed to queue operation")?;

    println!("Queued {}", id);
    Ok(())
}

/// List queued mutations.
async fn cmd_pending(env: &Env) -> Result<()> {
    let pending = env
        .worker()
        .queue()
        .list()
        .await
        .context("Failed to read pending queue")?;

    if pending.is_empty() {
        println!("No pending operations.");
        return Ok(());
    }

    println!("Pending operations:");
    for op in pending {
        println!(
            "  {}  {} {}  (attempts: {}, queued: {})",
            op.id, op.method, op.url, op.attempts, op.created_at
        );
    }
    Ok(())
}

/// Replay queued mutations now.
async fn cmd_sync(env: &Env, tag: Option<String>) -> Result<()> {
    let tag = tag.unwrap_or_else(|| env.worker().config().sync_tag.clone());
    let outcome = env
        .host
        .dispatch(Event::Sync { tag })
        .await
        .context("Sync failed")?;

    println!("{}", describe(&outcome));
    Ok(())
}

/// Install the configured worker version.
async fn cmd_install(env: &Env) -> Result<()> {
    let outcome = env
        .host
        .dispatch(Event::Install)
        .await
        .context("Install failed")?;
    env.save().await?;

    println!("{}", describe(&outcome));
    Ok(())
}

/// Activate the waiting worker version.
async fn cmd_activate(env: &Env, clients: usize) -> Result<()> {
    let report = env
        .worker()
        .activate_if_idle(clients)
        .await
        .context("Activation failed")?;
    env.save().await?;

    match report {
        Some(report) => {
            println!("Activated {}", env.worker().version());
            for name in &report.deleted {
                println!("  deleted {}", name);
            }
            for (name, reason) in &report.failed {
                println!("  failed to delete {}: {}", name, reason);
            }
        }
        None => println!(
            "{} is waiting for {} client(s) to close",
            env.worker().version(),
            clients
        ),
    }
    Ok(())
}

/// Show cache partitions.
async fn cmd_partitions(env: &Env) -> Result<()> {
    let namespace = env.worker().namespace();
    let names = env.store.keys().await.context("Failed to list partitions")?;

    let registration = env.worker().registration();
    println!("Worker {} (store: {})", namespace.version(), env.store.name());
    println!(
        "  active: {}  waiting: {}",
        registration.active_version().unwrap_or("-"),
        registration.waiting_version().unwrap_or("-")
    );

    if names.is_empty() {
        println!("No cache partitions.");
        return Ok(());
    }

    for name in names {
        let entries = env
            .store
            .entry_keys(&name)
            .await
            .with_context(|| format!("Failed to read partition {}", name))?;
        let purpose = Purpose::ALL
            .into_iter()
            .find(|purpose| namespace.partition_name(*purpose) == name);
        let label = match purpose {
            Some(purpose) => purpose.to_string(),
            None => "stale".to_string(),
        };
        println!("  {:<32} {:>5} entries  [{}]", name, entries.len(), label);
    }
    Ok(())
}

/// Dispatch newline-delimited JSON events from stdin.
async fn cmd_run(env: &Env) -> Result<()> {
    let config = env.worker().config().clone();

    let (scheduler, handle) = SyncScheduler::new(config.reschedule.clone());
    scheduler.register(config.sync_tag.clone()).await;

    let sync_host = env.host.clone();
    let scheduler_task = tokio::spawn(handle.run(move |tag| {
        let host = sync_host.clone();
        async move { host.dispatch(Event::Sync { tag }).await }
    }));

    info!("Reading events from stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut reports = JoinSet::new();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let event = match serde_json::from_str::<WireEvent>(&line) {
            Ok(event) => event,
            Err(e) => {
                warn!("Skipping line {}: {}", line_no, e);
                continue;
            }
        };

        match event {
            WireEvent::Online { tag } => {
                let tag = tag.unwrap_or_else(|| config.sync_tag.clone());
                scheduler
                    .trigger(&tag)
                    .await
                    .context("Sync scheduler stopped")?;
            }
            other => {
                let event = other.into_event(&config.sync_tag).context("Invalid event")?;
                let kind = event.kind();
                let task = env.host.submit(event);
                reports.spawn(async move {
                    match task.await {
                        Ok(Ok(outcome)) => println!("[{}] {} {}", line_no, kind, describe(&outcome)),
                        Ok(Err(e)) => println!("[{}] {} failed: {}", line_no, kind, e),
                        Err(e) => println!("[{}] {} aborted: {}", line_no, kind, e),
                    }
                });
            }
        }
    }

    while reports.join_next().await.is_some() {}
    env.host.drain().await;

    scheduler.shutdown().await;
    scheduler_task.await.context("Sync scheduler panicked")?;
    env.host.drain().await;
    env.save().await?;

    info!("All events handled");
    Ok(())
}
