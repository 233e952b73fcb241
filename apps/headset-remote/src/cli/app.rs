use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{Cli, Command, RestrictionArgs, RunArgs, ServerArgs};
use crate::client::{SessionHandle, SessionRunner};
use crate::config::{Config, load_restrictions};
use crate::controller::SessionController;
use crate::device::{ClientInfoSource, DeviceProbe};
use crate::media::{LogNoticeSink, SimulatedPlayer};
use crate::restriction::{RestrictionEngine, RestrictionTable};
use crate::session::ConnectionState;
use crate::telemetry::logging;
use crate::transport::{Connector, WebSocketConnector};

pub async fn run(cli: Cli) -> Result<()> {
    let log_config = cli.logging.to_config();
    logging::init(&log_config).context("logging initialization failed")?;
    debug!(
        log_level = log_config.level.as_str(),
        log_file = ?log_config.file,
        "logging configured"
    );

    let config = Config::from_env().context("invalid environment configuration")?;
    match cli.command {
        Some(Command::Run(args)) => run_session(config, args).await,
        Some(Command::Probe(args)) => probe(config, args).await,
        Some(Command::Restrictions(args)) => restrictions(config, args),
        None => run_session(config, RunArgs::default()).await,
    }
}

fn load_table(config: &Config) -> Result<RestrictionTable> {
    match config.restrictions_path.as_deref() {
        Some(path) => {
            let table = load_restrictions(path)?;
            info!(
                target = "headset_remote::config",
                path = %path.display(),
                windows = table.len(),
                "restrictions loaded"
            );
            Ok(table)
        }
        None => Ok(RestrictionTable::default()),
    }
}

async fn run_session(config: Config, args: RunArgs) -> Result<()> {
    let config = args.apply(config);
    let table = Arc::new(load_table(&config)?);
    let controller = SessionController::new(
        Box::new(SimulatedPlayer::new()),
        Box::new(LogNoticeSink),
        RestrictionEngine::new(table),
        config.timing.controller.clone(),
    );
    let connector = WebSocketConnector::new(config.timing.connect_timeout);
    let device = DeviceProbe::new(config.device_name.clone());
    let (runner, handle) = SessionRunner::new(connector, &config, controller, Box::new(device));

    let watcher = spawn_status_log(&handle);
    let retry_trigger = spawn_retry_trigger(&handle);
    let session = runner.spawn();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("shutdown requested");
    handle.shutdown();
    session.await.context("session task failed")?;

    watcher.abort();
    if let Some(trigger) = retry_trigger {
        trigger.abort();
    }
    Ok(())
}

/// Mirrors status, playback and restriction changes into the log.
fn spawn_status_log(handle: &SessionHandle) -> JoinHandle<()> {
    let mut status = handle.status();
    let mut playback = handle.playback();
    let mut restriction = handle.restriction();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = status.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let session = status.borrow_and_update().clone();
                    match session.state {
                        ConnectionState::Exhausted => error!(
                            target = "headset_remote::status",
                            attempts = session.reconnect_attempts,
                            last_error = ?session.last_error,
                            "server unreachable; send SIGUSR1 to retry"
                        ),
                        state => info!(
                            target = "headset_remote::status",
                            ?state,
                            attempts = session.reconnect_attempts,
                            "connection status"
                        ),
                    }
                }
                changed = playback.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = playback.borrow_and_update().clone();
                    debug!(
                        target = "headset_remote::status",
                        video = ?state.current_video,
                        position = state.position_seconds,
                        playing = state.is_playing,
                        "playback"
                    );
                }
                changed = restriction.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let signal = restriction.borrow_and_update().clone();
                    if signal.is_restricted {
                        info!(
                            target = "headset_remote::status",
                            max_angle = signal.max_angle_degrees,
                            window = %signal.description,
                            "rotation restricted"
                        );
                    } else {
                        info!(target = "headset_remote::status", "rotation unrestricted");
                    }
                }
            }
        }
    })
}

/// SIGUSR1 is the headless "test connection" action.
#[cfg(unix)]
fn spawn_retry_trigger(handle: &SessionHandle) -> Option<JoinHandle<()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut signals = match signal(SignalKind::user_defined1()) {
        Ok(signals) => signals,
        Err(err) => {
            warn!(error = %err, "manual retry signal unavailable");
            return None;
        }
    };
    let handle = handle.clone();
    Some(tokio::spawn(async move {
        while signals.recv().await.is_some() {
            match handle.retry().await {
                Ok(outcome) => info!(?outcome, "manual retry"),
                Err(_) => break,
            }
        }
    }))
}

#[cfg(not(unix))]
fn spawn_retry_trigger(_handle: &SessionHandle) -> Option<JoinHandle<()>> {
    None
}

async fn probe(config: Config, args: ServerArgs) -> Result<()> {
    let config = args.apply(config);
    let connector = WebSocketConnector::new(config.timing.connect_timeout);
    let mut connection = connector
        .connect(&config.server)
        .await
        .with_context(|| format!("cannot reach {}", config.server))?;

    let info = DeviceProbe::new(config.device_name.clone()).client_info();
    let frame = remote_proto::OutboundFrame::ClientInfo(info);
    let sent = connection.link.send(&frame.to_string());
    connection.link.close(config.timing.close_grace).await;
    sent.context("connected but failed to announce")?;

    println!("✅ {} reachable, announced as {}", config.server, config.device_name);
    Ok(())
}

fn restrictions(config: Config, args: RestrictionArgs) -> Result<()> {
    let mut config = config;
    if let Some(path) = args.restrictions {
        config.restrictions_path = Some(path);
    }
    let mut engine = RestrictionEngine::new(Arc::new(load_table(&config)?));

    if let (Some(video), Some(at)) = (args.video.as_deref(), args.at) {
        if !at.is_finite() || at < 0.0 {
            bail!("position must be a non-negative number of seconds");
        }
        let signal = engine.update(video, at);
        if args.json {
            println!("{}", serde_json::to_string_pretty(&signal)?);
        } else if signal.is_restricted {
            println!("restricted: {}", signal.description);
        } else {
            println!("unrestricted: {video} at {at:.1}s");
        }
        return Ok(());
    }

    let table = engine.table();
    let windows: Vec<_> = table
        .videos()
        .into_iter()
        .flat_map(|video| table.windows_for(video))
        .collect();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&windows)?);
    } else if windows.is_empty() {
        println!("no restriction windows configured");
    } else {
        for window in windows {
            println!("{}", window.describe());
        }
    }
    Ok(())
}
