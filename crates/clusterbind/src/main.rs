//! cbind - cluster binding inspector
//!
//! Lists binding requests, links each one to the binding record it produced
//! and exports the credential documents behind them.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use clusterbind_core::config::{Config, LogFormat};
use clusterbind_core::decoder;
use clusterbind_core::error::format_error_with_remediation;
use clusterbind_core::logging::{LogLevel, init_logging};
use clusterbind_core::model::{Artifact, NewBindingRequest, ObjectKey};
use clusterbind_core::notify::{CollectingNotifier, NoticeLevel};
use clusterbind_core::session::{BindingSession, RowSummary};
use clusterbind_core::source::{SnapshotSource, load_document};

mod output;

use output::OutputFormat;

/// cbind - cluster binding inspector
#[derive(Parser, Debug)]
#[command(name = "cbind")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to clusterbind.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Snapshot document to serve requests, records and artifacts from
    #[arg(long, global = true, env = "CLUSTERBIND_SNAPSHOT")]
    snapshot: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Log format (pretty, json)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Plain)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decode an artifact document from a file
    Decode {
        /// Artifact file (YAML or JSON)
        #[arg(long)]
        file: PathBuf,

        /// Data key to decode
        #[arg(long)]
        key: Option<String>,
    },

    #[command(flatten)]
    Session(SessionCommand),
}

/// Commands served from a snapshot through a [`BindingSession`].
#[derive(Subcommand, Debug)]
enum SessionCommand {
    /// Show every request with its resolved namespace and linked record
    #[command(alias = "ls")]
    List {
        /// Only requests in this namespace
        #[arg(long)]
        namespace: Option<String>,
    },

    /// List binding requests
    Requests,

    /// List binding records
    Records,

    /// List namespaces
    Namespaces,

    /// Export the credential document of a request
    Artifact {
        /// Request as <namespace>/<name>
        request: ObjectKey,
    },

    /// Create a binding request
    Create {
        /// Request name
        name: String,

        /// Namespace to create the request in
        #[arg(short, long)]
        namespace: String,

        /// Cluster identity token
        #[arg(long)]
        identity: String,

        #[arg(long)]
        author: Option<String>,

        /// Requested lifetime in seconds
        #[arg(long)]
        ttl: Option<u64>,
    },

    /// Delete a binding request
    DeleteRequest {
        /// Request as <namespace>/<name>
        request: ObjectKey,
    },

    /// Delete a binding record
    DeleteRecord {
        /// Record as <namespace>/<name>
        record: ObjectKey,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            match err.downcast_ref::<clusterbind_core::Error>() {
                Some(core) => eprintln!("{}", format_error_with_remediation(core)),
                None => eprintln!("Error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref()).map_err(clusterbind_core::Error::from)?;
    if let Some(level) = cli.log_level {
        config.logging.level = level.to_string();
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    if let Some(snapshot) = &cli.snapshot {
        config.source.snapshot = Some(snapshot.clone());
    }
    Ok(config)
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(&cli)?;
    init_logging(&config.logging).context("failed to initialize logging")?;

    match cli.command {
        // Decoding a file needs no source.
        Commands::Decode { file, key } => {
            let mut out = std::io::stdout().lock();
            decode_file(&mut out, cli.format, &file, key.as_deref(), &config)?;
            out.flush()?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Session(command) => run_session(command, cli.format, &config).await,
    }
}

async fn run_session(
    command: SessionCommand,
    format: OutputFormat,
    config: &Config,
) -> Result<ExitCode> {
    let Some(snapshot) = config.source.snapshot.as_deref() else {
        bail!("no snapshot configured; pass --snapshot or set [source].snapshot in clusterbind.toml");
    };
    let source = SnapshotSource::open(snapshot).map_err(clusterbind_core::Error::from)?;
    let mut session =
        BindingSession::new(source, CollectingNotifier::new(), config.resolver.clone());
    session.refresh().await;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    let ok = match command {
        SessionCommand::List { namespace } => {
            let rows = session.rows(namespace.as_deref());
            match format {
                OutputFormat::Plain => output::rows(&mut out, &rows, &RowSummary::of(&rows))?,
                OutputFormat::Json => output::json(&mut out, &rows)?,
            }
            true
        }
        SessionCommand::Requests => {
            match format {
                OutputFormat::Plain => output::requests(&mut out, session.requests())?,
                OutputFormat::Json => output::json(&mut out, session.requests())?,
            }
            true
        }
        SessionCommand::Records => {
            match format {
                OutputFormat::Plain => output::records(&mut out, session.records())?,
                OutputFormat::Json => output::json(&mut out, session.records())?,
            }
            true
        }
        SessionCommand::Namespaces => {
            let namespaces = session.load_namespaces().await;
            match format {
                OutputFormat::Plain => output::namespaces(&mut out, namespaces)?,
                OutputFormat::Json => output::json(&mut out, namespaces)?,
            }
            true
        }
        SessionCommand::Artifact { request } => match session.artifact_for(&request).await {
            Some(decoded) => {
                match format {
                    OutputFormat::Plain => output::document(&mut out, &decoded)?,
                    OutputFormat::Json => output::json(&mut out, &decoded)?,
                }
                true
            }
            None => false,
        },
        SessionCommand::Create {
            name,
            namespace,
            identity,
            author,
            ttl,
        } => {
            let request = NewBindingRequest {
                name,
                namespace,
                cluster_identity: identity,
                author,
                ttl_seconds: ttl,
            };
            let key = request.key();
            let created = session.create_request(request).await;
            mutation_result(&mut out, format, "created", &key, created)?;
            created
        }
        SessionCommand::DeleteRequest { request } => {
            let deleted = session.delete_request(&request).await;
            mutation_result(&mut out, format, "deleted", &request, deleted)?;
            deleted
        }
        SessionCommand::DeleteRecord { record } => {
            let deleted = session.delete_record(&record).await;
            mutation_result(&mut out, format, "deleted", &record, deleted)?;
            deleted
        }
    };

    out.flush()?;
    let notices = session.notifier().drain();
    let had_error = notices.iter().any(|n| n.level == NoticeLevel::Error);
    for notice in notices {
        eprintln!("{notice}");
    }

    Ok(if ok && !had_error {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn mutation_result(
    out: &mut impl Write,
    format: OutputFormat,
    action: &str,
    key: &ObjectKey,
    done: bool,
) -> std::io::Result<()> {
    match format {
        OutputFormat::Plain => Ok(()),
        OutputFormat::Json => {
            let mut body = serde_json::Map::new();
            body.insert("key".to_string(), key.to_string().into());
            body.insert(action.to_string(), done.into());
            output::json(out, &body)
        }
    }
}

fn decode_file(
    out: &mut impl Write,
    format: OutputFormat,
    file: &Path,
    key: Option<&str>,
    config: &Config,
) -> Result<()> {
    let artifact: Artifact = load_document(file).map_err(clusterbind_core::Error::from)?;
    let requested_key = key.unwrap_or(&config.resolver.default_artifact_key);
    let decoded =
        decoder::decode(&artifact, requested_key).map_err(clusterbind_core::Error::from)?;
    match format {
        OutputFormat::Plain => output::decoded(out, &decoded)?,
        OutputFormat::Json => output::json(out, &decoded)?,
    }
    Ok(())
}
