use clap::Parser;
use client::access::{AccessLevel, AccessList};
use client::classifier::EventClassifier;
use client::config::Config;
use client::listener::LogListener;
use client::router::{CommandRouter, RouterError};
use client::session::Session;
use client::tracker::PlayerTracker;
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML config file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Game server host (overrides the config file)
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Game server port (overrides the config file)
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Rcon password (overrides the config file)
    #[arg(long)]
    password: Option<String>,

    /// Address to receive the log stream on (overrides the config file)
    #[arg(long)]
    log_bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(password) = args.password {
        config.server.password = password;
    }
    if let Some(log_bind) = args.log_bind {
        config.log.bind = log_bind;
    }

    info!(
        "Connecting to {}:{}...",
        config.server.host, config.server.port
    );
    let session = Session::connect(
        &config.server.host,
        config.server.port,
        &config.server.password,
    )
    .await?;

    let classifier = EventClassifier::new()?;
    let listener = LogListener::bind(&config.log.bind, classifier).await?;

    let tracker = PlayerTracker::new(session.clone());
    if let Err(e) = tracker.bootstrap().await {
        warn!("Roster bootstrap failed: {}", e);
    }

    let access = Arc::new(AccessList::from_entries(&config.access));
    let mut router = CommandRouter::new(config.router.clone());

    // Admin-gated roster dump, issued from chat as "!players".
    {
        let tracker = tracker.clone();
        let access = Arc::clone(&access);
        router.register(
            "players",
            Box::new(move |ctx| {
                let Some(caller) = ctx.caller.as_deref() else {
                    return Ok(());
                };
                if !access.check(caller, AccessLevel::Admin) {
                    info!("Denied 'players' for {}", caller);
                    return Err(RouterError::Interrupt);
                }
                let tracker = tracker.clone();
                tokio::spawn(async move {
                    for player in tracker.players().await {
                        info!(
                            "  {} [{}] {} {}",
                            player.name, player.team, player.unique_id, player.ip
                        );
                    }
                });
                Ok(())
            }),
        );
    }

    // Audit trail of every chat-issued command.
    router.register_catch_all(Box::new(|ctx| {
        debug!(
            "command {:?} params {:?} from {:?} (silent: {})",
            ctx.command, ctx.params, ctx.caller, ctx.silent
        );
        Ok(())
    }));

    let tracker_task = {
        let tracker = tracker.clone();
        let events = listener.subscribe();
        tokio::spawn(async move { tracker.run(events).await })
    };
    let router_task = tokio::spawn(router.run(listener.subscribe()));

    info!("Running; press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    session.close();
    tracker_task.abort();
    router_task.abort();

    Ok(())
}
