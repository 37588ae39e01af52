// src/core/mod.rs

//! The supervision engine: RCON, process lifecycle, scheduling, and updates.

pub mod errors;
pub mod process;
pub mod rcon;
pub mod reason;
pub mod scheduler;
pub mod supervisor;
pub mod updater;

pub use errors::LaunchSiteError;
pub use process::{HealthSnapshot, ProcessController};
pub use rcon::RconClient;
pub use scheduler::{Coordinator, Scheduler, TimerPhase};
pub use supervisor::{Supervisor, SupervisorAction};
pub use updater::UpdateGateway;

/// The process exit status reported by the launcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    InvalidArgument = 1,
    HandlerInstall = 2,
    StartFailure = 3,
    UpdateRestartFailure = 4,
    UnexpectedStopRestartFailure = 5,
    UnhandledError = 6,
    ThreadFailure = 7,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}
