//! Entry point: CLI parsing, config loading, logging setup, and wiring
//! the TCP acceptor and HTTP side-channel together. The Rust counterpart
//! of `main.py`'s `Application` class and `run_server.py`.

mod acceptor;
mod config;
mod dispatch;
mod error;
mod http;
mod logging;
mod registry;
mod session;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use clap::{Args, Parser, Subcommand, ValueEnum};
use rand::Rng;
use relay_proto::DeviceAddress;
use tracing::{error, info};

use config::{Config, LogLevel};
use registry::{Registry, SlotAllocator};
use session::SessionTable;

/// Shared, read-mostly server state handed to every session thread.
pub struct ServerState {
    pub registry: Registry,
    pub slots: SlotAllocator,
    pub sessions: SessionTable,
    pub server_device_id: String,
    pub server_address: DeviceAddress,
    pub config: Config,
}

#[derive(Parser, Debug)]
#[command(name = "relay-server", version, about = "Device registry/relay server for the tagged-object wire protocol")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Starts the registry/relay server and its HTTP side-channel.
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Path to a JSON config file. Missing or malformed files fall back
    /// to defaults with a logged warning rather than aborting startup.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides the configured connection cap.
    #[arg(long)]
    max_connections: Option<usize>,

    /// Overrides the configured log level for this run.
    #[arg(long, value_enum)]
    log_level: Option<CliLogLevel>,

    /// Enables debug logging and allows a DEBUG config-file level to take
    /// effect (the config layer otherwise downgrades DEBUG to INFO unless
    /// this is set).
    #[arg(short, long)]
    debug: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CliLogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl CliLogLevel {
    fn as_tracing_filter(self) -> &'static str {
        match self {
            CliLogLevel::Debug => "debug",
            CliLogLevel::Info => "info",
            CliLogLevel::Warn => "warn",
            CliLogLevel::Error => "error",
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run(args),
    }
}

fn run(args: RunArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path),
        None => Config::default(),
    };

    if let Some(max_connections) = args.max_connections {
        config.max_connections = max_connections;
    }
    if args.debug {
        config.debug = true;
        config.log_level = LogLevel::Debug;
    }

    if !config.validate() {
        eprintln!("invalid configuration, exiting");
        std::process::exit(1);
    }

    let cli_filter = args.log_level.map(CliLogLevel::as_tracing_filter);
    let _log_guard = logging::init(&config, cli_filter);

    info!(
        max_connections = config.max_connections,
        http_port = config.http_port,
        tcp_port = config::TCP_PORT,
        "starting registry server"
    );

    let server_address = DeviceAddress {
        host: config::TCP_HOST.to_string(),
        port: config::TCP_PORT,
    };

    let state = Arc::new(ServerState {
        registry: Registry::new(),
        slots: SlotAllocator::new(),
        sessions: SessionTable::default(),
        server_device_id: random_device_id(),
        server_address,
        config: config.clone(),
    });

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            info!("received shutdown signal");
            shutdown.store(true, Ordering::SeqCst);
        })?;
    }

    let http_shutdown = Arc::clone(&shutdown);
    let http_port = config.http_port;
    let http_handle = thread::Builder::new().name("http".to_string()).spawn(move || {
        if let Err(e) = http::run(http_port, http_shutdown) {
            error!(error = %e, "http side-channel failed");
        }
    })?;

    let acceptor_result = acceptor::run(Arc::clone(&state), Arc::clone(&shutdown));

    shutdown.store(true, Ordering::SeqCst);
    let _ = http_handle.join();

    match acceptor_result {
        Ok(()) => {
            info!("shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "acceptor failed");
            std::process::exit(1);
        }
    }
}

/// A random opaque id for the server's own device identity, used in
/// registration replies, list entries, and ping responses. There is no
/// requirement that this survive a restart. 69 characters to match the
/// original's own server-id generator.
fn random_device_id() -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    const LEN: usize = 69;
    let mut rng = rand::thread_rng();
    (0..LEN).map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char).collect()
}
