// src/core/updater/steam.rs

//! Server build discovery and installation through SteamCMD.

use super::manifest::{self, KeyValues};
use crate::core::errors::LaunchSiteError;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{info, warn};

/// The Steam app id of the Rust dedicated server.
pub const APP_ID: &str = "258550";

pub fn manifest_path(install_path: &Path) -> PathBuf {
    install_path
        .join("steamapps")
        .join(format!("appmanifest_{APP_ID}.acf"))
}

/// The installed build id, read from the app manifest.
pub fn installed_build(install_path: &Path) -> Option<String> {
    let path = manifest_path(install_path);
    match manifest::read_value(&path, "AppState.buildid") {
        Ok(Some(build)) => Some(build),
        Ok(None) => {
            warn!("No AppState.buildid in app manifest {}", path.display());
            None
        }
        Err(e) => {
            warn!("Failed to read app manifest {}: {}", path.display(), e);
            None
        }
    }
}

/// The installed beta branch, if any. The public branch has none.
pub fn installed_branch(install_path: &Path) -> Option<String> {
    manifest::read_value(&manifest_path(install_path), "AppState.UserConfig.BetaKey")
        .ok()
        .flatten()
        .filter(|branch| !branch.is_empty())
}

/// Cuts the app info tree for [`APP_ID`] out of SteamCMD's console output.
///
/// The tree starts at a line beginning with `"258550"` and ends at the first
/// line starting with `}`.
pub fn extract_app_info(output: &str) -> Option<String> {
    let quoted_id = format!("\"{APP_ID}\"");
    let mut lines = output.lines().filter(|line| !line.is_empty());
    let start = lines.find(|line| line.starts_with(&quoted_id))?;

    let mut info = String::from(start);
    info.push('\n');
    for line in lines {
        info.push_str(line);
        info.push('\n');
        if line.starts_with('}') {
            return Some(info);
        }
    }
    None
}

/// Finds the latest build id for `branch` (the public branch if `None`).
pub fn latest_build_from_app_info(
    app_info: &str,
    branch: Option<&str>,
) -> Result<Option<String>, LaunchSiteError> {
    let tree = KeyValues::parse(app_info)?;
    let key = format!(
        "{APP_ID}.depots.branches.{}.buildid",
        branch.unwrap_or("public")
    );
    Ok(tree.get_path(&key).map(str::to_string))
}

/// Builds the SteamCMD argument list for installing or validating the server.
pub fn install_args(install_path: &Path, branch: Option<&str>) -> Vec<String> {
    let mut args = vec![
        "+force_install_dir".to_string(),
        install_path.display().to_string(),
        "+login".to_string(),
        "anonymous".to_string(),
        "+app_update".to_string(),
        APP_ID.to_string(),
    ];
    if let Some(branch) = branch {
        args.push("-beta".to_string());
        args.push(branch.to_string());
    }
    args.push("validate".to_string());
    args.push("+quit".to_string());
    args
}

pub struct SteamCmd {
    executable: Option<PathBuf>,
    install_path: PathBuf,
    script_dir: PathBuf,
}

impl SteamCmd {
    pub fn new(executable: Option<PathBuf>, install_path: PathBuf, script_dir: PathBuf) -> Self {
        Self {
            executable,
            install_path,
            script_dir,
        }
    }

    fn executable(&self) -> Result<&Path, LaunchSiteError> {
        self.executable
            .as_deref()
            .ok_or_else(|| LaunchSiteError::Update("steamcmd was not found".to_string()))
    }

    /// Asks Steam for the latest build id on `branch`.
    ///
    /// SteamCMD misbehaves when app info commands are passed on its command
    /// line, so they go through a `+runscript` file instead.
    pub async fn latest_build(&self, branch: Option<&str>) -> Result<Option<String>, LaunchSiteError> {
        let executable = self.executable()?;

        tokio::fs::create_dir_all(&self.script_dir).await?;
        let script_path = self.script_dir.join("steamcmd.scr");
        let script = format!(
            "force_install_dir \"{}\"\nlogin anonymous\napp_info_update 1\napp_info_print {APP_ID}\nquit\n",
            self.install_path.display()
        );
        tokio::fs::write(&script_path, script).await?;

        let output = Command::new(executable)
            .arg("+runscript")
            .arg(&script_path)
            .output()
            .await?;
        if !output.status.success() {
            warn!("SteamCMD returned non-zero exit status: {}", output.status);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let app_info = extract_app_info(&stdout).ok_or_else(|| {
            LaunchSiteError::Update("SteamCMD output did not include a valid app info tree".to_string())
        })?;
        latest_build_from_app_info(&app_info, branch)
    }

    /// Installs or updates the server in place.
    pub async fn install(&self, branch: Option<&str>) -> Result<(), LaunchSiteError> {
        let executable = self.executable()?;
        let args = install_args(&self.install_path, branch);
        info!("Running SteamCMD: {} {}", executable.display(), args.join(" "));

        let status = Command::new(executable).args(&args).status().await?;
        if !status.success() {
            return Err(LaunchSiteError::Update(format!(
                "SteamCMD returned non-zero exit status: {status}"
            )));
        }
        Ok(())
    }
}
