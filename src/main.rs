//! rosterd - Roster IRC Daemon
//!
//! A single-node IRC server for a moderated community: RFC 2812 subset
//! over plain TCP and TLS, password-reserved nicknames, roster-gated
//! channels with per-member voice, and in-process service bots (ChanServ,
//! NickServ, LogBot, VoteBot).

mod auth;
mod config;
mod handlers;
mod network;
mod pidfile;
mod server;
mod services;
mod state;

use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::network::Gateway;
use crate::pidfile::Pidfile;
use crate::server::{Server, PRODUCT_NAME, VERSION_ID};

struct CliOptions {
    verbose: bool,
    version: bool,
    daemon: bool,
    config_dir: Option<PathBuf>,
}

/// `rosterd [--verbose] [--version] [--daemon] <configuration directory>`
fn parse_args() -> CliOptions {
    let mut options = CliOptions {
        verbose: false,
        version: false,
        daemon: false,
        config_dir: None,
    };

    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--verbose" => options.verbose = true,
            "--version" => options.version = true,
            "--daemon" => options.daemon = true,
            _ if arg.starts_with('-') => print_usage_and_exit(),
            _ => {
                if options.config_dir.replace(PathBuf::from(&arg)).is_some() {
                    print_usage_and_exit();
                }
            }
        }
    }

    if !options.version && options.config_dir.is_none() {
        print_usage_and_exit();
    }

    // Verbosity makes no sense when detached from a terminal.
    if options.daemon {
        options.verbose = false;
    }

    options
}

fn print_usage_and_exit() -> ! {
    eprintln!("{PRODUCT_NAME}");
    eprintln!("Usage: rosterd [--verbose] [--version] [--daemon] <configuration directory>");
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let options = parse_args();

    if options.version {
        println!("{PRODUCT_NAME}");
        println!("This is {VERSION_ID}");
        return Ok(());
    }

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(if options.verbose { "debug" } else { "info" })
    });
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config_dir = options
        .config_dir
        .expect("argument parsing guarantees a configuration directory");
    let config = Config::load(&config_dir)?;

    let _pidfile = Pidfile::create(&config.server.pidfile)?;

    let server = Server::new(&config)?;

    // SIGINT and SIGTERM trigger a graceful shutdown. SIGHUP is accepted
    // but does nothing, so a stray `service rosterd reload` cannot kill the
    // process.
    {
        let shutdown = server.shutdown.clone();
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigint =
                signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
            let mut sighup =
                signal(SignalKind::hangup()).expect("failed to install SIGHUP handler");

            loop {
                tokio::select! {
                    _ = sigint.recv() => {
                        info!("Received SIGINT - shutting down");
                        let _ = shutdown.send(());
                        break;
                    }
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM - shutting down");
                        let _ = shutdown.send(());
                        break;
                    }
                    _ = sighup.recv() => {
                        info!("Received SIGHUP - configuration reloading is not supported");
                    }
                }
            }
        });
    }

    let gateway = Gateway::bind(&config, Arc::clone(&server)).await?;
    info!(server = %config.server.name, version = VERSION_ID, "rosterd is online");

    gateway.run().await?;

    info!("Shutting down...");
    // Give the session tasks a moment to flush their farewells.
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;

    Ok(())
}
