// src/main.rs

//! The main entry point for the LaunchSite server manager.

use launchsite::config::{Config, DEFAULT_LOG_LEVEL};
use launchsite::core::ExitCode;
use launchsite::core::process::backend::OsProcessBackend;
use launchsite::core::process::launch::LaunchSpec;
use launchsite::core::process::ProcessController;
use launchsite::core::rcon::{RandomIds, RconClient, RconSettings, WebSocketTransport};
use launchsite::core::scheduler::Coordinator;
use launchsite::core::supervisor::{Supervisor, SupervisorSettings};
use launchsite::core::updater::Updater;
use std::env;
use std::sync::Arc;
use tokio::task::JoinError;
use tracing::{error, info, warn};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload};

const VERSION: &str = env!("LAUNCHSITE_VERSION");
const BUILD_TARGET: &str = env!("LAUNCHSITE_BUILD_TARGET");

#[tokio::main]
async fn main() {
    let code = run_app().await;
    std::process::exit(code.code());
}

async fn run_app() -> ExitCode {
    let args: Vec<String> = env::args().collect();

    if args.iter().any(|arg| arg == "--version") {
        println!("LaunchSite version {VERSION} ({BUILD_TARGET})");
        return ExitCode::Success;
    }

    let Some(config_path) = args.get(1) else {
        eprintln!("Usage: launchsite /path/to/launchsite.toml");
        return ExitCode::InvalidArgument;
    };

    // Config loading logs, so the subscriber comes first.
    let env_level = env::var("RUST_LOG").ok();
    let (filter, filter_handle) = reload::Layer::new(EnvFilter::new(
        env_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL),
    ));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_ansi(true))
        .init();

    let config = match Config::from_file(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration from \"{config_path}\": {e:#}");
            return ExitCode::UnhandledError;
        }
    };

    if env_level.is_none()
        && let Err(e) = filter_handle.reload(EnvFilter::new(&config.log_level))
    {
        warn!("Failed to apply log level '{}': {}", config.log_level, e);
    }

    info!("LaunchSite {} starting", VERSION);

    if let Err(e) = config.validate_install() {
        error!("{:#}", e);
        return ExitCode::UnhandledError;
    }

    let coordinator = Arc::new(Coordinator::new());

    let rcon = Arc::new(RconClient::connect(
        RconSettings {
            host: config.rcon.ip.clone(),
            port: config.rcon.port,
            password: config.rcon.password.clone(),
            log_messages: config.rcon.log,
            chat_identifier: config.rcon.chat_identifier,
        },
        Arc::new(WebSocketTransport::new()),
        Arc::new(RandomIds::new()),
    ));

    let launch = LaunchSpec::from_config(&config);
    let controller = ProcessController::new(
        Arc::new(OsProcessBackend),
        rcon,
        launch,
        config.process.shutdown_delay,
    );

    let updater = match Updater::new(&config) {
        Ok(updater) => Arc::new(updater),
        Err(e) => {
            error!("Failed to initialise updater: {}", e);
            return ExitCode::UnhandledError;
        }
    };

    if let Err(e) = install_stop_handlers(coordinator.clone()) {
        error!("Failed to install stop signal handlers: {}", e);
        return ExitCode::HandlerInstall;
    }

    let supervisor = Supervisor::new(
        coordinator,
        controller,
        updater,
        SupervisorSettings::from_config(&config),
    );

    match tokio::spawn(supervisor.run()).await {
        Ok(code) => code,
        Err(e) => supervisor_crashed(e),
    }
}

fn supervisor_crashed(e: JoinError) -> ExitCode {
    error!("Supervisor task failed: {}", e);
    ExitCode::UnhandledError
}

/// Routes Ctrl+C (and SIGTERM on unix) to a coordinator stop request.
fn install_stop_handlers(coordinator: Arc<Coordinator>) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate = signal(SignalKind::terminate())?;
        let coord = coordinator.clone();
        tokio::spawn(async move {
            while terminate.recv().await.is_some() {
                info!("Received SIGTERM; requesting stop");
                coord.request_stop();
            }
        });
    }

    tokio::spawn(async move {
        loop {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl+C; requesting stop");
                    coordinator.request_stop();
                }
                Err(e) => {
                    error!("Ctrl+C listener failed: {}", e);
                    break;
                }
            }
        }
    });

    Ok(())
}
