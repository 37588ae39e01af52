// src/core/supervisor/mod.rs

//! The supervisor: the main control loop of the launcher.
//!
//! It wakes on coordinator signals and handles them in a fixed priority
//! order: stop, then update check, then health check. Maintenance that takes
//! the server down pauses the scheduler for its duration.

pub mod maintenance;

use crate::config::{Config, FrameworkKind};
use crate::core::ExitCode;
use crate::core::process::ProcessController;
use crate::core::reason::read_shutdown_reason;
use crate::core::scheduler::{Coordinator, HEALTH_CHECK_INTERVAL, Scheduler, Signals, TimerPhase};
use crate::core::updater::UpdateGateway;
use maintenance::{RetryPolicy, UpdatePlan, UpdatePolicy};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const STOP_REASON: &str = "Server manager stopped";
const TEARDOWN_REASON: &str = "Server manager shutting down";

/// What the supervisor decided to do after a wake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorAction {
    None,
    RestartCrashed,
    InstallUpdatesThenRestart { server: bool, framework: bool },
    Shutdown(String),
}

/// Supervisor behaviour, resolved from configuration.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub auto_restart: bool,
    pub health_interval: Duration,
    /// Zero disables interval update checks.
    pub update_interval: Duration,
    pub on_startup: UpdatePolicy,
    pub on_interval: UpdatePolicy,
    pub on_relaunch: UpdatePolicy,
    pub framework_on_server_update: bool,
    pub framework_name: String,
    pub server_retry: RetryPolicy,
    pub framework_retry: RetryPolicy,
    pub reason_path: Option<PathBuf>,
}

impl SupervisorSettings {
    pub fn from_config(config: &Config) -> Self {
        let update = &config.update;
        Self {
            auto_restart: config.process.auto_restart,
            health_interval: HEALTH_CHECK_INTERVAL,
            update_interval: update.interval,
            on_startup: UpdatePolicy {
                server: update.server.on_startup,
                framework: update.framework.on_startup,
            },
            on_interval: UpdatePolicy {
                server: update.server.on_interval,
                framework: update.framework.on_interval,
            },
            on_relaunch: UpdatePolicy {
                server: update.server.on_relaunch,
                framework: update.framework.on_relaunch,
            },
            framework_on_server_update: update.framework.kind != FrameworkKind::None
                && update.framework.on_server_update,
            framework_name: update.framework.kind.name().to_string(),
            server_retry: RetryPolicy {
                delay: update.server.retry_delay,
                max_attempts: update.max_install_attempts,
            },
            framework_retry: RetryPolicy {
                delay: update.framework.retry_delay,
                max_attempts: update.max_install_attempts,
            },
            reason_path: config.process.reason_path.clone(),
        }
    }
}

pub struct Supervisor {
    coordinator: Arc<Coordinator>,
    controller: ProcessController,
    gateway: Arc<dyn UpdateGateway>,
    settings: SupervisorSettings,
    last_protocol: Option<String>,
}

impl Supervisor {
    pub fn new(
        coordinator: Arc<Coordinator>,
        controller: ProcessController,
        gateway: Arc<dyn UpdateGateway>,
        settings: SupervisorSettings,
    ) -> Self {
        Self {
            coordinator,
            controller,
            gateway,
            settings,
            last_protocol: None,
        }
    }

    /// Runs the supervision session to completion.
    pub async fn run(mut self) -> ExitCode {
        let plan = self.check_for_updates(self.settings.on_startup).await;
        if plan.any() {
            self.install_updates(plan).await;
        }

        info!("Starting server");
        if !self.controller.start().await {
            error!("Server failed to start");
            return ExitCode::StartFailure;
        }

        info!("Starting scheduler");
        let scheduler = Scheduler::new(
            self.coordinator.clone(),
            self.settings.health_interval,
            self.settings.update_interval,
        )
        .spawn();

        info!("Starting main event loop");
        let mut exit_code = self.event_loop().await;

        info!("Exited main loop; beginning shutdown process");
        self.coordinator.set_phase(TimerPhase::Stop);
        if let Err(e) = scheduler.await {
            error!("Scheduler task failed: {}", e);
            if exit_code == ExitCode::Success {
                exit_code = ExitCode::ThreadFailure;
            }
        }

        // Consumed even when the server is already down.
        let reason = read_shutdown_reason(self.settings.reason_path.as_deref(), TEARDOWN_REASON);
        if self.controller.is_running() {
            info!("Stopping server");
            self.controller.stop(&reason).await;
        }

        info!("Supervisor exiting with {:?}", exit_code);
        exit_code
    }

    async fn event_loop(&mut self) -> ExitCode {
        loop {
            let signals = self.coordinator.wait_for_signals().await;
            if let Err(exit_code) = self.handle_wake(signals).await {
                return exit_code;
            }
        }
    }

    /// Handles one wake. `Err` carries the exit code that ends the loop.
    async fn handle_wake(&mut self, signals: Signals) -> Result<(), ExitCode> {
        if signals.stop {
            let reason = read_shutdown_reason(self.settings.reason_path.as_deref(), STOP_REASON);
            return self.perform(SupervisorAction::Shutdown(reason)).await;
        }

        if signals.update_check {
            let plan = self.check_for_updates(self.settings.on_interval).await;
            if plan.any() {
                self.perform(SupervisorAction::InstallUpdatesThenRestart {
                    server: plan.server,
                    framework: plan.framework,
                })
                .await?;
            }
        }

        if signals.health_check {
            let action = self.check_health().await;
            self.perform(action).await?;
        }

        Ok(())
    }

    async fn check_health(&mut self) -> SupervisorAction {
        if !self.controller.is_running() {
            return SupervisorAction::RestartCrashed;
        }

        let snapshot = self.controller.query().await;
        if snapshot.valid {
            info!(
                "Got server info via RCON: players={}, protocol={}",
                snapshot.players, snapshot.protocol
            );
            if let Some(previous) = &self.last_protocol
                && *previous != snapshot.protocol
            {
                warn!(
                    "Server protocol changed from {} to {}",
                    previous, snapshot.protocol
                );
            }
            self.last_protocol = Some(snapshot.protocol);
        }
        SupervisorAction::None
    }

    async fn perform(&mut self, action: SupervisorAction) -> Result<(), ExitCode> {
        match action {
            SupervisorAction::None => Ok(()),
            SupervisorAction::Shutdown(reason) => {
                info!("Server manager stop requested; stopping server");
                self.coordinator.set_phase(TimerPhase::Stop);
                self.controller.stop(&reason).await;
                Err(ExitCode::Success)
            }
            SupervisorAction::InstallUpdatesThenRestart { server, framework } => {
                self.coordinator.set_phase(TimerPhase::Pause);
                let plan = UpdatePlan { server, framework };
                let description = plan.describe(&self.settings.framework_name);
                info!("Update(s) required: {}; stopping server", description);
                self.controller
                    .stop(&format!("Installing update(s): {description}"))
                    .await;
                self.install_updates(plan).await;

                info!("Update(s) complete; starting server");
                if !self.controller.start().await {
                    error!("Server failed to start after updating");
                    return Err(ExitCode::UpdateRestartFailure);
                }
                self.coordinator.set_phase(TimerPhase::Run);
                Ok(())
            }
            SupervisorAction::RestartCrashed => {
                if !self.settings.auto_restart {
                    self.coordinator.set_phase(TimerPhase::Stop);
                    error!("Server stopped unexpectedly");
                    return Err(ExitCode::UnexpectedStopRestartFailure);
                }

                self.coordinator.set_phase(TimerPhase::Pause);
                warn!("Server stopped unexpectedly");
                // Releases the dead handle and reports its exit code.
                self.controller.stop("Server stopped unexpectedly").await;

                let plan = self.check_for_updates(self.settings.on_relaunch).await;
                if plan.any() {
                    self.install_updates(plan).await;
                }

                info!("Relaunching server");
                if !self.controller.start().await {
                    error!("Server failed to relaunch");
                    return Err(ExitCode::UnexpectedStopRestartFailure);
                }
                self.coordinator.set_phase(TimerPhase::Run);
                Ok(())
            }
        }
    }

    async fn check_for_updates(&self, policy: UpdatePolicy) -> UpdatePlan {
        maintenance::check_for_updates(
            self.gateway.as_ref(),
            policy,
            self.settings.framework_on_server_update,
        )
        .await
    }

    async fn install_updates(&self, plan: UpdatePlan) {
        maintenance::install_updates(
            self.gateway.as_ref(),
            plan,
            self.settings.server_retry,
            self.settings.framework_retry,
        )
        .await;
    }
}
