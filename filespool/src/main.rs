//! filespool: entry point.
//!
//! ```text
//! filespool receiver --target <dir> --allow <name>...   Accept files
//! filespool sender --connect <addr> --source <dir>      Push files
//! filespool --config <path> <mode>                      Load a custom config TOML
//! filespool --gen-config                                Write default config to stdout
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use filespool::config::SpoolConfig;
use filespool::daemon;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "filespool", version, about = "Relay spooled files between hosts over mutual TLS")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "filespool.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Accept files from allow-listed senders.
    Receiver(ReceiverArgs),
    /// Push files from a spool directory to a receiver.
    Sender(SenderArgs),
}

#[derive(Args, Debug)]
struct ReceiverArgs {
    /// Listen to this address (`:port` binds all IPv4 interfaces).
    #[arg(long)]
    listen: Option<String>,

    /// Target path to write to.
    #[arg(long)]
    target: Option<String>,

    /// Allowed client certificate name; repeat to build a list.
    #[arg(long = "allow")]
    allow: Vec<String>,

    #[command(flatten)]
    tls: TlsArgs,
}

#[derive(Args, Debug)]
struct SenderArgs {
    /// Send to this TCP address.
    #[arg(long)]
    connect: Option<String>,

    /// Source path to read from.
    #[arg(long)]
    source: Option<String>,

    #[command(flatten)]
    tls: TlsArgs,
}

#[derive(Args, Debug)]
struct TlsArgs {
    /// TLS x509 certificate.
    #[arg(long)]
    cert: Option<String>,

    /// TLS private key for the certificate.
    #[arg(long)]
    key: Option<String>,

    /// CA root certificates file.
    #[arg(long)]
    capath: Option<String>,
}

// ── Overrides ────────────────────────────────────────────────────

impl TlsArgs {
    fn apply(self, config: &mut SpoolConfig) {
        if let Some(cert) = self.cert {
            config.tls.cert = cert;
        }
        if let Some(key) = self.key {
            config.tls.key = key;
        }
        if let Some(ca) = self.capath {
            config.tls.ca = ca;
        }
    }
}

impl ReceiverArgs {
    fn apply(self, config: &mut SpoolConfig) {
        if let Some(listen) = self.listen {
            config.receiver.listen = listen;
        }
        if let Some(target) = self.target {
            config.receiver.target = target;
        }
        if !self.allow.is_empty() {
            config.receiver.allow = self.allow;
        }
        self.tls.apply(config);
    }
}

impl SenderArgs {
    fn apply(self, config: &mut SpoolConfig) {
        if let Some(connect) = self.connect {
            config.sender.connect = connect;
        }
        if let Some(source) = self.source {
            config.sender.source = source;
        }
        self.tls.apply(config);
    }
}

// ── Signals ──────────────────────────────────────────────────────

/// Resolves on SIGINT or SIGTERM, returning the signal's name.
async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => tokio::select! {
                _ = tokio::signal::ctrl_c() => "SIGINT",
                _ = term.recv() => "SIGTERM",
            },
            Err(e) => {
                warn!("could not install SIGTERM handler: {e}");
                tokio::signal::ctrl_c().await.ok();
                "SIGINT"
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
        "Ctrl-C"
    }
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&SpoolConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let Some(mode) = cli.mode else {
        return Err("please specify a mode: receiver or sender".into());
    };

    let mut config = SpoolConfig::load(&cli.config);

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("filespool v{}", env!("CARGO_PKG_VERSION"));

    let stop = CancellationToken::new();
    let on_signal = stop.clone();
    tokio::spawn(async move {
        let name = shutdown_signal().await;
        info!("got signal {name} from OS, shutting down");
        on_signal.cancel();
    });

    match mode {
        Mode::Receiver(args) => {
            args.apply(&mut config);
            daemon::run_receiver(&config, stop).await?;
            info!("exiting daemon");
        }
        Mode::Sender(args) => {
            args.apply(&mut config);
            daemon::run_sender(&config, stop).await?;
            info!("exiting sender");
        }
    }

    Ok(())
}
