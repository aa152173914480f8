/// Version injected at compile time via PCCPROV_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("PCCPROV_VERSION") {
    Some(v) => v,
    None => "dev",
};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pcc_provider::api::apispec::resolve_api_spec;
use pcc_provider::api::client::ConsoleClient;
use pcc_provider::api::collections::{get_collection_by_name, list_collections};
use pcc_provider::config::ProviderConfig;
use pcc_provider::error::{describe_error, ProviderError};
use pcc_provider::resource::{get_all_resource_keys, get_resource, ResourceController, ResourceDef};
use pcc_provider::schema::{apply_defaults, drift, Record};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// Manage cloud-security console configuration as code
#[derive(Parser, Debug)]
#[command(name = "pccprov", version = VERSION, about, long_about = None)]
struct Args {
    /// Config file (defaults to the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Console host or URL
    #[arg(long, global = true)]
    console_url: Option<String>,

    /// Login user
    #[arg(short, long, global = true)]
    username: Option<String>,

    /// Path prepended to API paths, e.g. a SaaS tenant
    #[arg(long, global = true)]
    endpoint_prefix: Option<String>,

    /// Accept any TLS certificate
    #[arg(long, global = true)]
    skip_cert_verification: bool,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the resource types this provider manages
    Resources,
    /// Show the field tree of a resource type
    Schema { resource: String },
    /// Create a resource from a declared file
    Create {
        resource: String,
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Read a resource as the console holds it
    Read { resource: String, id: String },
    /// Replace a resource with a declared file
    Update {
        resource: String,
        id: String,
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Delete a resource (singletons are reset)
    Delete { resource: String, id: String },
    /// Adopt an existing resource
    Import { resource: String, id: String },
    /// Show fields where the console differs from a declared file
    Diff {
        resource: String,
        id: String,
        #[arg(short, long)]
        file: PathBuf,
    },
    /// List collections, or look one up by name
    Collections { name: Option<String> },
    /// Resolve an OpenAPI document into endpoints
    Apispec {
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(tracing_level.as_str().to_ascii_lowercase()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("pccprov {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("pccprov").join("pccprov.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".pccprov").join("pccprov.log");
    }
    PathBuf::from("pccprov.log")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level)?;

    match &args.command {
        Command::Resources => list_resources(),
        Command::Schema { resource } => show_schema(resource),
        command => {
            let config = load_config(&args)?;
            let client = ConsoleClient::new(&config).map_err(friendly)?;
            run(&client, command).await
        }
    }
}

/// Settings from file and environment, then CLI flags on top
fn load_config(args: &Args) -> Result<ProviderConfig> {
    let mut config = ProviderConfig::load(args.config.as_deref())?;

    if let Some(url) = &args.console_url {
        config.console_url = url.clone();
    }
    if let Some(username) = &args.username {
        config.username = Some(username.clone());
    }
    if let Some(prefix) = &args.endpoint_prefix {
        config.endpoint_prefix = prefix.clone();
    }
    if args.skip_cert_verification {
        config.skip_cert_verification = true;
    }

    config.validate()?;
    Ok(config)
}

async fn run(client: &ConsoleClient, command: &Command) -> Result<()> {
    match command {
        Command::Create { resource, file } => {
            let controller = ResourceController::new(client, resource).map_err(friendly)?;
            let desired = read_declared(file, controller.def())?;
            print_json(&controller.create(&desired).await.map_err(friendly)?)
        }
        Command::Read { resource, id } => {
            let controller = ResourceController::new(client, resource).map_err(friendly)?;
            match controller.read(id).await.map_err(friendly)? {
                Some(state) => print_json(&state),
                None => {
                    eprintln!("{} {:?} does not exist", resource, id);
                    Ok(())
                }
            }
        }
        Command::Update { resource, id, file } => {
            let controller = ResourceController::new(client, resource).map_err(friendly)?;
            let desired = read_declared(file, controller.def())?;
            print_json(&controller.update(id, &desired).await.map_err(friendly)?)
        }
        Command::Delete { resource, id } => {
            let controller = ResourceController::new(client, resource).map_err(friendly)?;
            controller.delete(id).await.map_err(friendly)?;
            eprintln!("Deleted {} {:?}", resource, id);
            Ok(())
        }
        Command::Import { resource, id } => {
            let controller = ResourceController::new(client, resource).map_err(friendly)?;
            print_json(&controller.import(id).await.map_err(friendly)?)
        }
        Command::Diff { resource, id, file } => {
            let controller = ResourceController::new(client, resource).map_err(friendly)?;
            let desired = read_declared(file, controller.def())?;
            let Some(actual) = controller.read(id).await.map_err(friendly)? else {
                bail!("{} {:?} does not exist; it would be created", resource, id);
            };
            let changed = drift(&desired, &actual.record, &controller.def().fields);
            if changed.is_empty() {
                println!("No changes.");
            }
            for path in changed {
                println!("~ {}", path);
            }
            Ok(())
        }
        Command::Collections { name: Some(name) } => {
            print_json(&get_collection_by_name(client, name).await.map_err(friendly)?)
        }
        Command::Collections { name: None } => print_json(&list_collections(client).await.map_err(friendly)?),
        Command::Apispec { file } => {
            let document = read_document(file)?;
            print_json(&resolve_api_spec(client, &document).await.map_err(friendly)?)
        }
        Command::Resources | Command::Schema { .. } => Ok(()),
    }
}

fn list_resources() -> Result<()> {
    for key in get_all_resource_keys() {
        if let Some(def) = get_resource(key) {
            println!("{:<30} {}", key, def.display_name);
        }
    }
    Ok(())
}

fn show_schema(resource: &str) -> Result<()> {
    let def = get_resource(resource).ok_or_else(|| anyhow!("Unknown resource type: {}", resource))?;
    println!("{}", serde_json::to_string_pretty(&def.fields)?);
    Ok(())
}

/// Parse a YAML or JSON file
fn read_document(path: &Path) -> Result<serde_json::Value> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_yaml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Build a declared record the way the host would, defaults included
fn read_declared(path: &Path, def: &ResourceDef) -> Result<Record> {
    let document = read_document(path)?;
    let mut record = Record::from_json(&document).map_err(|e| anyhow!("{}: {}", path.display(), e))?;
    apply_defaults(&mut record, &def.fields).map_err(|e| anyhow!("{}: {}", path.display(), e))?;
    Ok(record)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn friendly(error: ProviderError) -> anyhow::Error {
    tracing::error!("{}", error);
    anyhow!("{} ({})", describe_error(&error), error)
}
