use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use cloudschema::cache::{write_atomic, ResourceCache};
use cloudschema::config::Config;
use cloudschema::editor::{install_vscode, nvim_snippet};
use cloudschema::maintenance::{CacheMaintenance, Freshness};
use cloudschema::provider::{ProviderRegistry, ResourceClient};
use cloudschema::schema::{validate_config, GenerateOptions, SchemaGenerator};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Generate deployment-config JSON Schemas from live cloud provider catalogs
#[derive(Parser, Debug)]
#[command(name = "cloudschema", version = cloudschema::VERSION, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Cache directory override
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Log level (RUST_LOG takes precedence when set)
    #[arg(long, value_enum, default_value = "warn", global = true)]
    log_level: LogLevel,

    /// Append logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate the merged schema
    Generate {
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Provider to include (repeatable; all registered when omitted)
        #[arg(short, long = "provider")]
        providers: Vec<String>,

        /// Neither read nor write the cache
        #[arg(long, conflicts_with = "refresh")]
        no_cache: bool,

        /// Fetch live data and overwrite the cache
        #[arg(long)]
        refresh: bool,

        /// Structural base schema (JSON or YAML) to merge into
        #[arg(long)]
        base_schema: Option<PathBuf>,
    },

    /// Show cache entries and their freshness
    Status {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Clear the cache for one or all providers
    Refresh {
        provider: Option<String>,
    },

    /// Remove cache files older than the given age
    Cleanup {
        /// Defaults to `prune_max_age_days` from the config
        #[arg(long)]
        max_age_days: Option<u64>,
    },

    /// List registered providers and their credential status
    Providers,

    /// Validate a deployment config (JSON or YAML) against a schema
    Validate {
        file: PathBuf,

        /// Schema file; a schema is generated from cached data when omitted
        #[arg(long)]
        schema: Option<PathBuf>,
    },

    /// Point an editor's YAML language server at a generated schema
    Install {
        #[arg(short, long, value_enum, default_value = "vscode")]
        editor: Editor,

        /// Workspace root holding `.vscode/settings.json`
        #[arg(short, long, default_value = ".")]
        workspace: PathBuf,

        /// Schema file written by `generate -o`
        #[arg(short, long)]
        schema: PathBuf,

        /// Glob of config files the schema applies to
        #[arg(long, default_value = "deploy.yaml")]
        pattern: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Editor {
    Vscode,
    Nvim,
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
    fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

fn setup_logging(
    level: LogLevel,
    log_file: Option<&Path>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter()));
    if matches!(level, LogLevel::Off) && std::env::var_os("RUST_LOG").is_none() {
        return Ok(None);
    }

    let (writer, guard) = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_appender::non_blocking(file)
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(log_file.is_none())
        .with_target(true)
        .with_thread_ids(false)
        .init();

    tracing::debug!("cloudschema {} started with log level: {:?}", cloudschema::VERSION, level);

    Ok(Some(guard))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level, args.log_file.as_deref())?;

    let mut config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    if let Some(dir) = &args.cache_dir {
        config.cache_dir = Some(dir.clone());
    }

    let cache = Arc::new(ResourceCache::new(config.effective_cache_dir()));
    let registry = ProviderRegistry::from_config(&config);
    let mut generator = SchemaGenerator::new(cache, registry);
    if let Command::Generate {
        base_schema: Some(path),
        ..
    } = &args.command
    {
        generator = generator.with_base_schema(read_document(path)?);
    }

    let result = run(args.command, &config, &generator).await;
    generator.close();
    result
}

async fn run(command: Command, config: &Config, generator: &SchemaGenerator) -> Result<()> {
    match command {
        Command::Generate {
            output,
            providers,
            no_cache,
            refresh,
            ..
        } => {
            let options = GenerateOptions {
                use_cache: !no_cache,
                force_refresh: refresh,
            };
            let schema = generate(generator, &providers, options).await?;
            let mut rendered = serde_json::to_string_pretty(&schema)?;
            rendered.push('\n');

            match output {
                Some(path) => {
                    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                        tokio::fs::create_dir_all(parent)
                            .await
                            .with_context(|| format!("Failed to create {}", parent.display()))?;
                    }
                    write_atomic(&path, rendered.as_bytes())
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    eprintln!("Schema written to {}", path.display());
                }
                None => print!("{}", rendered),
            }
        }

        Command::Status { json } => {
            if json {
                let status = generator.cache().status().await?;
                println!("{}", serde_json::to_string_pretty(&status)?);
                return Ok(());
            }

            let maintenance =
                CacheMaintenance::new(generator.cache(), |name| config.settings_for(name).cache_ttl());
            let rows = maintenance.report().await?;
            println!("Cache directory: {}", generator.cache().dir().display());
            if rows.is_empty() {
                println!("No cached providers");
            }
            for row in rows {
                match (&row.freshness, &row.info) {
                    (Freshness::Corrupted, _) | (_, None) => {
                        println!("  {:<16} corrupted", row.provider);
                    }
                    (freshness, Some(info)) => println!(
                        "  {:<16} {:<9} age {:>6.1}h  {} regions  {} instance types  {} bytes",
                        row.provider,
                        freshness.to_string(),
                        info.age_hours,
                        info.regions_count,
                        info.instance_types_count,
                        info.file_size,
                    ),
                }
            }
        }

        Command::Refresh { provider } => {
            if let Some(name) = provider.as_deref() {
                if generator.registry().get(name).is_none() {
                    bail!("Unknown provider: {}", name);
                }
            }
            let maintenance =
                CacheMaintenance::new(generator.cache(), |name| config.settings_for(name).cache_ttl());
            let cleared = maintenance.invalidate(provider.as_deref()).await?;
            match provider {
                Some(name) if cleared > 0 => println!("Cache cleared for {}", name),
                Some(name) => println!("No cache found for {}", name),
                None => println!("Cleared cache for {} providers", cleared),
            }
        }

        Command::Cleanup { max_age_days } => {
            let days = max_age_days.unwrap_or(config.prune_max_age_days);
            let maintenance =
                CacheMaintenance::new(generator.cache(), |name| config.settings_for(name).cache_ttl());
            let removed = maintenance.cleanup(days).await?;
            println!("Removed {} cache files older than {} days", removed, days);
        }

        Command::Providers => {
            for client in generator.registry().iter() {
                let status = if client.has_credentials() {
                    "configured".to_string()
                } else {
                    format!("no credentials ({})", credential_vars(client.as_ref()))
                };
                println!("  {:<16} {}", client.provider_name(), status);
            }
        }

        Command::Validate { file, schema } => {
            let instance = read_document(&file)?;
            let schema = match schema {
                Some(path) => read_document(&path)?,
                None => generate(generator, &[], GenerateOptions::default()).await?,
            };

            let errors = validate_config(&schema, &instance)?;
            if !errors.is_empty() {
                for error in &errors {
                    eprintln!("  - {}", error);
                }
                bail!("{} is invalid ({} errors)", file.display(), errors.len());
            }
            println!("{} is valid", file.display());
        }

        Command::Install {
            editor,
            workspace,
            schema,
            pattern,
        } => match editor {
            Editor::Vscode => {
                let settings = install_vscode(&workspace, &schema, &pattern).await?;
                println!("Schema mapped to {} in {}", pattern, settings.display());
            }
            Editor::Nvim => {
                println!("Add to your Neovim config:\n");
                println!("{}", nvim_snippet(&schema, &pattern).await?);
            }
        },
    }

    Ok(())
}

async fn generate(
    generator: &SchemaGenerator,
    providers: &[String],
    options: GenerateOptions,
) -> Result<Value> {
    let requested = (!providers.is_empty()).then_some(providers);
    Ok(generator.generate(requested, options).await?)
}

fn credential_vars(client: &dyn ResourceClient) -> String {
    client
        .auth_config()
        .iter()
        .map(|spec| spec.env_var)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse a JSON or YAML document; `.json` files are parsed strictly as JSON
fn read_document(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    if is_json {
        serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
    } else {
        serde_yaml::from_str(&content).with_context(|| format!("Invalid YAML in {}", path.display()))
    }
}
