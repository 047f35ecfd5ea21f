use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use m2iconfig::Config;
use m2iconfig::encryption::encrypt_password;
use m2icontrol::{Bridge, BridgeConfigExt, ShutdownHandle, VERSION};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Announces MPD tracks on an IRC channel and lets the channel drive MPD.
#[derive(Parser, Debug)]
#[command(name = "mpd2irc", version, about)]
struct Cli {
    /// Configuration file (default: MPD2IRC_CONFIG, ./mpd2irc.yaml, then the usual locations)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Overrides logger.min_level (RUST_LOG wins over both)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Prints the encrypted form of a password for the configuration file, then exits
    #[arg(long, value_name = "PASSWORD")]
    encrypt_password: Option<String>,
}

fn init_tracing(config: &Config, level: Option<&str>) {
    let level = level
        .map(str::to_string)
        .unwrap_or_else(|| config.get_log_min_level())
        .to_lowercase();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::registry().with(filter);

    if config.get_log_enable_console() {
        subscriber
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(true),
            )
            .init();
    } else {
        subscriber.init();
    }
}

/// SIGINT, SIGTERM and SIGQUIT stop the bridge; SIGHUP and SIGUSR1/2 are ignored.
async fn watch_signals(handle: ShutdownHandle) -> Result<()> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;
    let mut hangup = signal(SignalKind::hangup())?;
    let mut user1 = signal(SignalKind::user_defined1())?;
    let mut user2 = signal(SignalKind::user_defined2())?;

    loop {
        let kind = tokio::select! {
            _ = interrupt.recv() => SignalKind::interrupt(),
            _ = terminate.recv() => SignalKind::terminate(),
            _ = quit.recv() => SignalKind::quit(),
            _ = hangup.recv() => {
                info!("Ignoring SIGHUP");
                continue;
            }
            _ = user1.recv() => {
                info!("Ignoring SIGUSR1");
                continue;
            }
            _ = user2.recv() => {
                info!("Ignoring SIGUSR2");
                continue;
            }
        };
        handle.shutdown(format!("Caught signal: {}, exiting.", kind.as_raw_value()));
    }
}

async fn run(config: Config) -> Result<()> {
    let prefs = config
        .bridge_preferences()
        .context("Invalid configuration")?;
    prefs.log_warnings();

    let bridge = Bridge::new(prefs);
    let handle = bridge.shutdown_handle();
    tokio::spawn(async move {
        if let Err(e) = watch_signals(handle).await {
            warn!("⚠️ Cannot install signal handlers: {}", e);
        }
    });

    bridge.run().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(password) = cli.encrypt_password {
        return match encrypt_password(&password) {
            Ok(encrypted) => {
                println!("{}", encrypted);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("❌ Cannot encrypt password: {:#}", e);
                ExitCode::FAILURE
            }
        };
    }

    let config = match Config::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Cannot load configuration: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config, cli.log_level.as_deref());
    info!(version = VERSION, config = ?config.path(), "🎵 mpd2irc starting");

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}
