use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tower_lsp::{LspService, Server};
use tracing::info;

use salt_language_server::logging::{LogFile, init_logger};
use salt_language_server::lsp::backend::SaltBackend;
use salt_language_server::lsp::config::ServerConfig;

#[derive(Debug, Parser)]
#[command(name = "salt-language-server")]
#[command(version, about = "Language server for Salt state files")]
struct Cli {
    /// Use a TCP server instead of stdio
    #[arg(long)]
    tcp: bool,

    /// Bind to this address
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Bind to this port
    #[arg(long, default_value_t = 2087)]
    port: u16,

    /// Initialize the server, but don't launch it
    #[arg(long)]
    stop_after_init: bool,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Logging verbosity: critical, fatal, error, warning, warn, info, debug or trace
    #[arg(long)]
    log_level: Option<String>,

    /// Disable ANSI colors in stderr output
    #[arg(long)]
    no_color: bool,

    /// States schema to use instead of the bundled one (also SALT_LSP_STATES_FILE)
    #[arg(long)]
    states_file: Option<PathBuf>,

    /// Maximum number of included files kept parsed
    #[arg(long)]
    cache_capacity: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let log_file = match args.log_file {
        Some(path) => LogFile::Path(path),
        None => LogFile::Session,
    };
    let _guard = init_logger(args.no_color, args.log_level.as_deref(), log_file).context("Failed to initialize logging")?;

    let config = ServerConfig::from_env_or_default(args.states_file, args.cache_capacity);
    info!("Starting {} {} with {:?}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"), config);

    let (service, socket) = LspService::new(|client| SaltBackend::new(client, &config));

    if args.stop_after_init {
        info!("Initialized; not serving (--stop-after-init)");
        return Ok(());
    }

    if args.tcp {
        let listener = TcpListener::bind((args.host.as_str(), args.port))
            .await
            .with_context(|| format!("Failed to bind {}:{}", args.host, args.port))?;
        info!("Listening on {}", listener.local_addr()?);
        let (stream, peer) = listener.accept().await.context("Failed to accept client")?;
        info!("Client connected from {}", peer);
        let (read, write) = tokio::io::split(stream);
        Server::new(read, write, socket).serve(service).await;
    } else {
        let stdin = tokio::io::stdin();
        let stdout = tokio::io::stdout();
        Server::new(stdin, stdout, socket).serve(service).await;
    }

    info!("Server stopped");
    Ok(())
}
