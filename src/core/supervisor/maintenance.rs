// src/core/supervisor/maintenance.rs

//! Update checks and the install-until-confirmed retry loops.

use crate::core::updater::UpdateGateway;
use std::time::Duration;
use tokio::time;
use tracing::{error, info, warn};

/// Which artifacts to check at a given trigger (startup, interval, relaunch).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdatePolicy {
    pub server: bool,
    pub framework: bool,
}

/// The outcome of an update check: which artifacts need installing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdatePlan {
    pub server: bool,
    pub framework: bool,
}

impl UpdatePlan {
    pub fn any(&self) -> bool {
        self.server || self.framework
    }

    /// A human-readable list of what is being updated, e.g. `Facepunch + Carbon`.
    pub fn describe(&self, framework_name: &str) -> String {
        let mut parts = Vec::new();
        if self.server {
            parts.push("Facepunch");
        }
        if self.framework {
            parts.push(framework_name);
        }
        parts.join(" + ")
    }
}

/// Pacing for an install loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,
    /// Zero means retry until the update is confirmed.
    pub max_attempts: u32,
}

/// Asks the gateway which artifacts need updating.
///
/// The framework is checked even when `policy.framework` is off if the server
/// needs an update and `framework_on_server_update` is set.
pub async fn check_for_updates(
    gateway: &dyn UpdateGateway,
    policy: UpdatePolicy,
    framework_on_server_update: bool,
) -> UpdatePlan {
    let mut plan = UpdatePlan::default();
    if policy.server {
        info!("Performing server update check");
        plan.server = gateway.check_server().await;
    }
    if policy.framework || (framework_on_server_update && plan.server) {
        info!("Performing plugin framework update check");
        plan.framework = gateway.check_framework().await;
    }
    plan
}

pub async fn install_server(gateway: &dyn UpdateGateway, retry: RetryPolicy) -> bool {
    info!("Entering server update loop");
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        gateway.update_server().await;
        if !gateway.check_server().await {
            info!("Completed server update loop after {} attempt(s)", attempt);
            return true;
        }
        if retry.max_attempts != 0 && attempt >= retry.max_attempts {
            error!(
                "Server still out of date after {} install attempt(s); giving up",
                attempt
            );
            return false;
        }
        warn!(
            "Detected server version mismatch after update attempt {}; retrying in {:?}",
            attempt, retry.delay
        );
        time::sleep(retry.delay).await;
    }
}

pub async fn install_framework(
    gateway: &dyn UpdateGateway,
    retry: RetryPolicy,
    suppress_warning: bool,
) -> bool {
    info!("Entering plugin framework update loop");
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        gateway.update_framework(suppress_warning).await;
        if !gateway.check_framework().await {
            info!(
                "Completed plugin framework update loop after {} attempt(s)",
                attempt
            );
            return true;
        }
        if retry.max_attempts != 0 && attempt >= retry.max_attempts {
            error!(
                "Plugin framework still out of date after {} install attempt(s); giving up",
                attempt
            );
            return false;
        }
        warn!(
            "Detected plugin framework version mismatch after update attempt {}; retrying in {:?}",
            attempt, retry.delay
        );
        time::sleep(retry.delay).await;
    }
}

/// Installs everything in `plan`, server first.
pub async fn install_updates(
    gateway: &dyn UpdateGateway,
    plan: UpdatePlan,
    server_retry: RetryPolicy,
    framework_retry: RetryPolicy,
) {
    if plan.server {
        install_server(gateway, server_retry).await;
    }
    if plan.framework {
        // A server update removes the framework, so a missing install is expected.
        install_framework(gateway, framework_retry, plan.server).await;
    }
}
