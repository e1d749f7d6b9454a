mod commands;
mod provider_builder;
mod responder;

use clap::{Parser, Subcommand};
use replica_core::{config, shellexpand};
use replica_store::{AuditLogger, ChatWatcher, Store};
use responder::Responder;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(
    name = "replica",
    version,
    about = "Replica: a persona that answers chat messages like a person would"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the store and answer new messages.
    Start,
    /// Append a user message to a conversation.
    Send {
        /// Conversation id.
        chat_id: String,
        /// The message to send.
        #[arg(trailing_var_arg = true)]
        message: Vec<String>,
    },
    /// Print the recent messages and status of a conversation.
    History {
        /// Conversation id.
        chat_id: String,
        /// Number of messages to show.
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Check configuration, store and provider availability.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load(&cli.config)?;
    let _log_guard = init_logging(&cfg.replica)?;

    match cli.command {
        Commands::Start => {
            let provider = provider_builder::build_provider(&cfg)?;
            if !provider.is_available().await {
                tracing::warn!(
                    "provider '{}' is not reachable; replies will fail until it is",
                    provider.name()
                );
            }

            let store = Store::new(&cfg.store).await?;
            let audit = AuditLogger::new(store.pool().clone());
            let watcher = ChatWatcher::new(
                store.clone(),
                Duration::from_millis(cfg.store.poll_interval_ms),
            );

            println!("Replica: starting {}...", cfg.persona.identity);
            let responder = Arc::new(
                Responder::new(
                    provider,
                    Arc::new(store),
                    cfg.persona.clone(),
                    cfg.responder.clone(),
                    cfg.humanize.clone(),
                )
                .with_audit(audit),
            );
            responder.run(Arc::new(watcher)).await?;
        }
        Commands::Send { chat_id, message } => {
            let store = Store::new(&cfg.store).await?;
            let sent = commands::send(&store, &chat_id, &message.join(" ")).await?;
            println!("{}/{}", replica_core::path::chats_collection(&chat_id), sent.id);
        }
        Commands::History { chat_id, limit } => {
            let store = Store::new(&cfg.store).await?;
            println!("{}", commands::history(&store, &chat_id, limit).await?);
        }
        Commands::Status => {
            let store = Store::new(&cfg.store).await?;
            let provider = provider_builder::build_provider(&cfg)?;
            println!(
                "{}",
                commands::status(&cfg, &cli.config, &store, provider.as_ref()).await
            );
        }
    }

    Ok(())
}

/// Console logging, plus a plain-text log file when `replica.log_file` is set.
///
/// `RUST_LOG` takes precedence over `replica.log_level`. The returned guard
/// flushes the file writer on drop and must outlive the program.
fn init_logging(cfg: &config::ReplicaConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log_level))
    };
    let console = fmt::layer().with_filter(filter());

    let Some(log_file) = cfg.log_file.as_deref() else {
        tracing_subscriber::registry().with(console).init();
        return Ok(None);
    };

    let path = shellexpand(log_file);
    let path = Path::new(&path);
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir)?;
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("replica.log_file has no file name: {log_file}"))?;

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
    let file = fmt::layer()
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(filter());

    tracing_subscriber::registry().with(console).with(file).init();
    Ok(Some(guard))
}
