// src/core/process/launch.rs

//! Assembles the game server's command line from configuration.

use crate::config::{Config, FrameworkKind, LaunchParams, LaunchValue, SeedStrategy};
use rand::Rng;
use std::path::PathBuf;
use tracing::warn;

/// Everything needed to spawn the supervised process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

/// The default launch script or binary for the current platform.
pub fn default_launch_binary(framework: FrameworkKind) -> &'static str {
    if cfg!(windows) {
        "RustDedicated.exe"
    } else if framework == FrameworkKind::Carbon {
        "carbon.sh"
    } else {
        "runds.sh"
    }
}

impl LaunchSpec {
    /// Builds the launch specification.
    ///
    /// Configured parameters come first (`-` then `+`, each in key order),
    /// followed by the arguments the launcher controls itself. Configured
    /// duplicates of those are dropped with a warning.
    pub fn from_config(config: &Config) -> Self {
        let binary = config
            .process
            .launch_binary
            .clone()
            .unwrap_or_else(|| default_launch_binary(config.update.framework.kind).to_string());

        let mut args = Vec::new();
        push_params(&mut args, &config.launch_minus, |_| false);

        let passthrough = config.rcon.passthrough;
        push_params(&mut args, &config.launch_plus, |name| {
            let managed = match name {
                "+rcon.password" | "+rcon.web" | "+server.identity" | "+server.seed" => true,
                "+rcon.ip" => passthrough.ip,
                "+rcon.port" => passthrough.port,
                _ => false,
            };
            if managed {
                warn!(
                    "Ignoring configured launch parameter `{}` because its value is determined automatically",
                    name
                );
            }
            managed
        });

        args.push("+rcon.password".to_string());
        args.push(config.rcon.password.clone());
        if passthrough.ip {
            args.push("+rcon.ip".to_string());
            args.push(config.rcon.ip.clone());
        }
        if passthrough.port {
            args.push("+rcon.port".to_string());
            args.push(config.rcon.port.to_string());
        }
        args.push("+rcon.web".to_string());
        args.push("1".to_string());
        args.push("+server.identity".to_string());
        args.push(config.identity.clone());
        args.push("+server.seed".to_string());
        args.push(select_seed(&config.seed).to_string());

        Self {
            program: config.install_path.join(binary),
            args,
            working_dir: config.install_path.clone(),
        }
    }
}

fn push_params<F>(args: &mut Vec<String>, params: &LaunchParams, mut skip: F)
where
    F: FnMut(&str) -> bool,
{
    for (name, value) in params {
        if matches!(value, LaunchValue::Flag(false)) {
            continue;
        }
        if skip(name) {
            continue;
        }
        args.push(name.clone());
        if let LaunchValue::Text(text) = value {
            args.push(text.clone());
        }
    }
}

/// Picks the world seed for this launch.
pub fn select_seed(strategy: &SeedStrategy) -> i32 {
    match strategy {
        SeedStrategy::Fixed(seed) => *seed,
        SeedStrategy::List(list) => list.first().copied().unwrap_or(1),
        SeedStrategy::Random => rand::thread_rng().gen_range(1..=i32::MAX),
    }
}
