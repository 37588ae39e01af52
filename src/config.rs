// src/config.rs

//! Manages launcher configuration: loading, resolving dynamic values, and validation.

use crate::core::errors::LaunchSiteError;
use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// The supported plugin frameworks.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FrameworkKind {
    #[default]
    None,
    Carbon,
    Oxide,
}

impl FrameworkKind {
    pub fn name(&self) -> &'static str {
        match self {
            FrameworkKind::None => "none",
            FrameworkKind::Carbon => "Carbon",
            FrameworkKind::Oxide => "Oxide",
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
enum SeedStrategyKind {
    Fixed,
    List,
    #[default]
    Random,
}

/// How the `+server.seed` launch argument is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedStrategy {
    Fixed(i32),
    /// Uses the first entry; the list is never empty.
    List(Vec<i32>),
    Random,
}

/// A single launch parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum LaunchValue {
    /// `true` emits only the flag, `false` omits the parameter.
    Flag(bool),
    Text(String),
}

/// Launch parameters keyed by their prefixed name (e.g. `+server.port`).
pub type LaunchParams = BTreeMap<String, LaunchValue>;

// --- Raw file layout ---

#[derive(Deserialize, Debug, Default)]
struct RawInstall {
    #[serde(default)]
    path: PathBuf,
    #[serde(default)]
    identity: String,
}

#[derive(Deserialize, Debug)]
struct RawPaths {
    #[serde(default = "default_download_path")]
    download: PathBuf,
}

impl Default for RawPaths {
    fn default() -> Self {
        Self {
            download: default_download_path(),
        }
    }
}

fn default_download_path() -> PathBuf {
    std::env::temp_dir().join("launchsite")
}

/// Settings for the supervised process itself.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct ProcessConfig {
    #[serde(default)]
    pub auto_restart: bool,
    /// Grace period during which shutdown is delayed while players are connected.
    #[serde(default, with = "humantime_serde")]
    pub shutdown_delay: Duration,
    /// A file whose contents, if present, become the next shutdown reason.
    #[serde(default)]
    pub reason_path: Option<PathBuf>,
    #[serde(default)]
    pub launch_binary: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassthroughConfig {
    #[serde(default)]
    pub ip: bool,
    #[serde(default)]
    pub port: bool,
}

/// WebRCON connection settings.
#[derive(Deserialize, Debug, Clone)]
pub struct RconConfig {
    #[serde(default = "default_rcon_ip")]
    pub ip: String,
    #[serde(default = "default_rcon_port")]
    pub port: u16,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub log: bool,
    #[serde(default = "default_chat_identifier")]
    pub chat_identifier: i32,
    #[serde(default)]
    pub passthrough: PassthroughConfig,
}

impl Default for RconConfig {
    fn default() -> Self {
        Self {
            ip: default_rcon_ip(),
            port: default_rcon_port(),
            password: String::new(),
            log: false,
            chat_identifier: default_chat_identifier(),
            passthrough: PassthroughConfig::default(),
        }
    }
}

fn default_rcon_ip() -> String {
    "127.0.0.1".to_string()
}
fn default_rcon_port() -> u16 {
    28016
}
fn default_chat_identifier() -> i32 {
    -1
}

#[derive(Deserialize, Debug, Default)]
struct RawSeed {
    #[serde(default)]
    strategy: SeedStrategyKind,
    #[serde(default)]
    fixed: Option<i32>,
    #[serde(default)]
    list: Vec<i32>,
}

#[derive(Deserialize, Debug, Default)]
struct RawSteamCmd {
    #[serde(default)]
    path: Option<PathBuf>,
}

/// Update policy for the server binary.
#[derive(Deserialize, Debug, Clone)]
pub struct ServerUpdateConfig {
    #[serde(default)]
    pub on_startup: bool,
    #[serde(default)]
    pub on_interval: bool,
    #[serde(default)]
    pub on_relaunch: bool,
    #[serde(default = "default_retry_delay", with = "humantime_serde")]
    pub retry_delay: Duration,
}

impl Default for ServerUpdateConfig {
    fn default() -> Self {
        Self {
            on_startup: false,
            on_interval: false,
            on_relaunch: false,
            retry_delay: default_retry_delay(),
        }
    }
}

/// Update policy for the plugin framework.
#[derive(Deserialize, Debug, Clone)]
pub struct FrameworkUpdateConfig {
    #[serde(default, rename = "type")]
    pub kind: FrameworkKind,
    #[serde(default)]
    pub on_startup: bool,
    #[serde(default)]
    pub on_interval: bool,
    #[serde(default)]
    pub on_relaunch: bool,
    /// Check the framework whenever the server was found to need an update.
    #[serde(default)]
    pub on_server_update: bool,
    #[serde(default = "default_retry_delay", with = "humantime_serde")]
    pub retry_delay: Duration,
}

impl Default for FrameworkUpdateConfig {
    fn default() -> Self {
        Self {
            kind: FrameworkKind::None,
            on_startup: false,
            on_interval: false,
            on_relaunch: false,
            on_server_update: false,
            retry_delay: default_retry_delay(),
        }
    }
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(10)
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct UpdateConfig {
    /// Period of interval update checks. Zero disables them.
    #[serde(default, with = "humantime_serde")]
    pub interval: Duration,
    /// Upper bound on install attempts per artifact. Zero means unbounded.
    #[serde(default)]
    pub max_install_attempts: u32,
    #[serde(default)]
    pub server: ServerUpdateConfig,
    #[serde(default)]
    pub framework: FrameworkUpdateConfig,
}

#[derive(Deserialize, Debug, Default)]
struct RawLaunch {
    #[serde(default)]
    minus: toml::Table,
    #[serde(default)]
    plus: toml::Table,
}

/// A raw representation of the config file before validation and resolution.
#[derive(Deserialize, Debug)]
struct RawConfig {
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default)]
    install: RawInstall,
    #[serde(default)]
    paths: RawPaths,
    #[serde(default)]
    process: ProcessConfig,
    #[serde(default)]
    rcon: RconConfig,
    #[serde(default)]
    seed: RawSeed,
    #[serde(default)]
    steamcmd: RawSteamCmd,
    #[serde(default)]
    update: UpdateConfig,
    #[serde(default)]
    launch: RawLaunch,
}

/// The log filter used until a config file says otherwise.
pub const DEFAULT_LOG_LEVEL: &str = "info";

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

/// Represents the final, validated, and resolved launcher configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub install_path: PathBuf,
    pub identity: String,
    pub download_path: PathBuf,
    pub process: ProcessConfig,
    pub rcon: RconConfig,
    pub seed: SeedStrategy,
    /// Resolved SteamCMD location, if one could be found.
    pub steamcmd_path: Option<PathBuf>,
    pub update: UpdateConfig,
    pub launch_minus: LaunchParams,
    pub launch_plus: LaunchParams,
}

impl Config {
    /// Creates a new `Config` instance by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        Self::from_toml_str(&contents).with_context(|| format!("Invalid config file '{path}'"))
    }

    /// Parses, resolves, and validates configuration from TOML text.
    ///
    /// Filesystem checks on the install directory are left to
    /// [`Config::validate_install`].
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let raw_config: RawConfig =
            toml::from_str(contents).context("Failed to parse TOML configuration")?;

        let seed = resolve_seed(raw_config.seed)?;
        let steamcmd_path = resolve_steamcmd(raw_config.steamcmd.path);

        let mut launch_minus = LaunchParams::new();
        flatten_launch_params(&mut launch_minus, &raw_config.launch.minus, "-");
        let mut launch_plus = LaunchParams::new();
        flatten_launch_params(&mut launch_plus, &raw_config.launch.plus, "+");

        let mut config = Config {
            log_level: raw_config.log_level,
            install_path: raw_config.install.path,
            identity: raw_config.install.identity,
            download_path: raw_config.paths.download,
            process: raw_config.process,
            rcon: raw_config.rcon,
            seed,
            steamcmd_path,
            update: raw_config.update,
            launch_minus,
            launch_plus,
        };

        config.normalize_update_policy();
        config.validate()?;
        Ok(config)
    }

    /// Validates the resolved configuration to ensure logical consistency.
    fn validate(&self) -> Result<(), LaunchSiteError> {
        if self.install_path.as_os_str().is_empty() {
            return Err(invalid("install.path cannot be empty"));
        }
        if self.identity.trim().is_empty() {
            return Err(invalid("install.identity cannot be empty"));
        }
        if self.rcon.password.is_empty() {
            return Err(invalid("rcon.password cannot be empty"));
        }
        if self.rcon.ip.trim().is_empty() {
            return Err(invalid("rcon.ip cannot be empty"));
        }
        if self.rcon.port == 0 {
            return Err(invalid("rcon.port cannot be 0"));
        }
        if self.rcon.chat_identifier == 0 {
            return Err(invalid(
                "rcon.chat_identifier cannot be 0; that identifier is reserved for broadcasts",
            ));
        }
        Ok(())
    }

    /// Checks that the install directory and server identity directory exist.
    pub fn validate_install(&self) -> Result<()> {
        if !self.install_path.is_dir() {
            return Err(anyhow!(
                "Server install path does not exist: {}",
                self.install_path.display()
            ));
        }
        let identity_path = self.install_path.join("server").join(&self.identity);
        if !identity_path.is_dir() {
            return Err(anyhow!(
                "Server identity path does not exist: {}",
                identity_path.display()
            ));
        }
        Ok(())
    }

    /// Enforces consistency between the update interval and the per-artifact flags.
    fn normalize_update_policy(&mut self) {
        let update = &mut self.update;

        if update.framework.kind == FrameworkKind::None {
            update.framework.on_startup = false;
            update.framework.on_interval = false;
            update.framework.on_relaunch = false;
            update.framework.on_server_update = false;
        }

        if !update.interval.is_zero()
            && !update.server.on_interval
            && !update.framework.on_interval
        {
            warn!(
                "Ignoring update.interval = {:?} because update.server and update.framework on_interval are both false",
                update.interval
            );
            update.interval = Duration::ZERO;
        }

        if update.interval.is_zero() {
            if update.server.on_interval {
                warn!("Ignoring update.server.on_interval = true because update.interval is 0");
                update.server.on_interval = false;
            }
            if update.framework.on_interval {
                warn!("Ignoring update.framework.on_interval = true because update.interval is 0");
                update.framework.on_interval = false;
            }
        }
    }
}

fn invalid(message: &str) -> LaunchSiteError {
    LaunchSiteError::InvalidConfig(message.to_string())
}

fn resolve_seed(raw: RawSeed) -> Result<SeedStrategy> {
    match raw.strategy {
        SeedStrategyKind::Fixed => raw
            .fixed
            .map(SeedStrategy::Fixed)
            .ok_or_else(|| anyhow!("seed.fixed is required when seed.strategy = \"fixed\"")),
        SeedStrategyKind::List => {
            if raw.list.is_empty() {
                return Err(anyhow!(
                    "seed.list must be non-empty when seed.strategy = \"list\""
                ));
            }
            Ok(SeedStrategy::List(raw.list))
        }
        SeedStrategyKind::Random => Ok(SeedStrategy::Random),
    }
}

/// Prefers the configured SteamCMD path, falling back to a `PATH` search.
fn resolve_steamcmd(configured: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = configured {
        if path.exists() {
            info!("Using steamcmd at path: {}", path.display());
            return Some(path);
        }
        warn!(
            "steamcmd not found at configured path {}; searching PATH",
            path.display()
        );
    }

    let found = search_path(if cfg!(windows) { "steamcmd.exe" } else { "steamcmd" });
    match &found {
        Some(path) => info!("Using steamcmd at path: {}", path.display()),
        None => warn!("steamcmd not found; server updates will not work"),
    }
    found
}

fn search_path(binary: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.is_file())
}

/// Flattens a TOML table of launch parameters into `prefix`-named entries.
/// Nested tables are joined with `.`.
fn flatten_launch_params(out: &mut LaunchParams, table: &toml::Table, prefix: &str) {
    for (key, value) in table {
        let name = format!("{prefix}{key}");
        match value {
            toml::Value::Boolean(b) => {
                out.insert(name, LaunchValue::Flag(*b));
            }
            toml::Value::Integer(i) => {
                out.insert(name, LaunchValue::Text(i.to_string()));
            }
            toml::Value::Float(f) => {
                out.insert(name, LaunchValue::Text(f.to_string()));
            }
            toml::Value::String(s) => {
                out.insert(name, LaunchValue::Text(s.clone()));
            }
            toml::Value::Table(nested) => {
                flatten_launch_params(out, nested, &format!("{name}."));
            }
            other => {
                warn!(
                    "Ignoring launch parameter '{}' with unsupported type {}",
                    name,
                    other.type_str()
                );
            }
        }
    }
}
