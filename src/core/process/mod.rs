// src/core/process/mod.rs

//! Lifecycle control for the supervised game server process.
//!
//! `ProcessController` owns the single process handle. It is only ever driven
//! from the supervisor task, so it takes `&mut self` and needs no locking.

pub mod backend;
pub mod launch;

pub use backend::{ManagedProcess, OsProcessBackend, ProcessBackend};
pub use launch::LaunchSpec;

use crate::core::rcon::RconClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant};
use tracing::{error, info, warn};

/// The console command that returns a JSON server status object.
pub const QUERY_COMMAND: &str = "serverinfo";
pub const QUIT_COMMAND: &str = "quit";

const QUERY_TIMEOUT: Duration = Duration::from_secs(10);
const QUIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll bounds for process state transitions.
#[derive(Debug, Clone, Copy)]
pub struct PollSchedule {
    pub interval: Duration,
    pub attempts: u32,
}

const START_POLL: PollSchedule = PollSchedule {
    interval: Duration::from_secs(2),
    attempts: 10,
};
const STOP_POLL: PollSchedule = PollSchedule {
    interval: Duration::from_secs(1),
    attempts: 10,
};

/// A point-in-time read of the server's status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthSnapshot {
    pub valid: bool,
    pub players: u64,
    pub protocol: String,
}

impl HealthSnapshot {
    pub fn invalid() -> Self {
        Self::default()
    }

    /// Parses a `serverinfo` reply. Any missing or mistyped field yields an
    /// invalid snapshot.
    pub fn parse(response: &str) -> Self {
        let value: serde_json::Value = match serde_json::from_str(response) {
            Ok(value) => value,
            Err(_) => return Self::invalid(),
        };
        let players = value.get("Players").and_then(|v| v.as_u64());
        let protocol = value.get("Protocol").and_then(|v| v.as_str());
        match (players, protocol) {
            (Some(players), Some(protocol)) => Self {
                valid: true,
                players,
                protocol: protocol.to_string(),
            },
            _ => Self::invalid(),
        }
    }
}

/// How often to announce a pending shutdown, given the time remaining.
pub fn announcement_interval(remaining: Duration) -> Duration {
    let secs = remaining.as_secs_f64();
    if secs > 300.0 {
        Duration::from_secs(300)
    } else if secs > 60.0 {
        Duration::from_secs(60)
    } else if secs > 10.0 {
        Duration::from_secs(10)
    } else {
        Duration::from_secs(1)
    }
}

/// Time until `remaining` next reaches a multiple of its announcement interval.
fn until_next_mark(remaining: Duration) -> Duration {
    let interval = announcement_interval(remaining).as_millis();
    let remaining_ms = remaining.as_millis();
    let offset = match remaining_ms % interval {
        0 => interval,
        rem => rem,
    };
    Duration::from_millis(offset.min(remaining_ms) as u64)
}

fn ceil_secs(duration: Duration) -> u64 {
    duration.as_millis().div_ceil(1000) as u64
}

pub struct ProcessController {
    backend: Arc<dyn ProcessBackend>,
    rcon: Arc<RconClient>,
    launch: LaunchSpec,
    shutdown_delay: Duration,
    start_poll: PollSchedule,
    stop_poll: PollSchedule,
    process: Option<Box<dyn ManagedProcess>>,
}

impl ProcessController {
    pub fn new(
        backend: Arc<dyn ProcessBackend>,
        rcon: Arc<RconClient>,
        launch: LaunchSpec,
        shutdown_delay: Duration,
    ) -> Self {
        Self {
            backend,
            rcon,
            launch,
            shutdown_delay,
            start_poll: START_POLL,
            stop_poll: STOP_POLL,
            process: None,
        }
    }

    /// Overrides the start and stop poll bounds.
    pub fn with_poll_schedules(mut self, start: PollSchedule, stop: PollSchedule) -> Self {
        self.start_poll = start;
        self.stop_poll = stop;
        self
    }

    pub fn rcon(&self) -> &Arc<RconClient> {
        &self.rcon
    }

    pub fn is_running(&mut self) -> bool {
        self.process.as_mut().is_some_and(|p| p.is_running())
    }

    /// Launches the server if it is not already running.
    pub async fn start(&mut self) -> bool {
        if self.is_running() {
            return true;
        }

        info!(
            "Starting server: {} {}",
            self.launch.program.display(),
            self.launch.args.join(" ")
        );
        let mut process = match self.backend.spawn(&self.launch) {
            Ok(process) => process,
            Err(e) => {
                error!("Failed to start server: {}", e);
                return false;
            }
        };

        for attempt in 1..=self.start_poll.attempts {
            if process.is_running() {
                info!("Server started with pid {}", process.id());
                self.process = Some(process);
                return true;
            }
            if attempt < self.start_poll.attempts {
                time::sleep(self.start_poll.interval).await;
            }
        }

        error!(
            "Server did not reach the running state after {} attempts",
            self.start_poll.attempts
        );
        if let Err(e) = process.terminate() {
            warn!("Failed to clean up server process: {}", e);
        }
        false
    }

    /// Shuts the server down, escalating from a polite quit to a forced kill.
    /// The handle is released on return whatever the outcome.
    pub async fn stop(&mut self, reason: &str) {
        if !self.is_running() {
            self.process = None;
            return;
        }

        info!("Stopping server for reason: {}", reason);
        self.delay_shutdown(reason).await;

        if self.is_running() {
            if self.rcon.is_connected() {
                info!("Sending RCON quit command");
                self.rcon.send(QUIT_COMMAND, QUIT_TIMEOUT).await;
                if self.wait_for_exit().await {
                    info!("Server exited after RCON quit");
                }
            } else {
                warn!("RCON is not connected; skipping quit command");
            }
        }

        if let Some(process) = self.process.as_mut()
            && process.is_running()
            && process.supports_interrupt()
        {
            warn!("Server still running; sending interrupt signal");
            match process.interrupt() {
                Ok(()) => {
                    if self.wait_for_exit().await {
                        info!("Server exited after interrupt signal");
                    }
                }
                Err(e) => warn!("Failed to interrupt server: {}", e),
            }
        }

        if let Some(mut process) = self.process.take() {
            if process.is_running() {
                warn!("Server still running; forcing termination");
                if let Err(e) = process.terminate() {
                    error!("Failed to terminate server process {}: {}", process.id(), e);
                }
            }
            match process.exit_code() {
                Some(0) | None => info!("Server stopped"),
                Some(code) => warn!("Server exited with non-zero exit code {}", code),
            }
        }
    }

    /// Queries server status over RCON.
    pub async fn query(&mut self) -> HealthSnapshot {
        if !self.is_running() {
            return HealthSnapshot::invalid();
        }
        let response = self.rcon.send(QUERY_COMMAND, QUERY_TIMEOUT).await;
        if response.is_empty() {
            return HealthSnapshot::invalid();
        }
        HealthSnapshot::parse(&response)
    }

    /// Sends an arbitrary console command, returning its reply.
    pub async fn send_command(&self, command: &str, timeout: Duration) -> String {
        self.rcon.send(command, timeout).await
    }

    /// Holds the shutdown for the grace period while players remain,
    /// announcing the remaining time on a tightening schedule.
    async fn delay_shutdown(&mut self, reason: &str) {
        if self.shutdown_delay.is_zero() {
            return;
        }
        if !self.rcon.is_connected() {
            warn!("RCON is not connected; skipping shutdown delay");
            return;
        }

        info!("Delaying shutdown by up to {:?}", self.shutdown_delay);
        let deadline = Instant::now() + self.shutdown_delay;

        while Instant::now() < deadline && self.is_running() {
            let snapshot = self.query().await;
            if !snapshot.valid {
                warn!("No usable server info over RCON; ending shutdown delay early");
                return;
            }
            if snapshot.players == 0 {
                info!("No players connected; ending shutdown delay early");
                return;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            let announcement = format!(
                "say *** Shutdown in {} second(s) for reason: {}",
                ceil_secs(remaining),
                reason
            );
            self.rcon.send(&announcement, Duration::ZERO).await;

            time::sleep(until_next_mark(remaining)).await;
        }
    }

    async fn wait_for_exit(&mut self) -> bool {
        for _ in 0..self.stop_poll.attempts {
            if !self.is_running() {
                return true;
            }
            time::sleep(self.stop_poll.interval).await;
        }
        !self.is_running()
    }
}
