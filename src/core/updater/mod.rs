// src/core/updater/mod.rs

//! Update discovery and installation for the server and its plugin framework.
//!
//! The supervisor only sees the `UpdateGateway` contract. Each method logs
//! its own failures and degrades to "no update" or a no-op; retrying is the
//! caller's job.

pub mod download;
pub mod framework;
pub mod manifest;
pub mod steam;

use crate::config::{Config, FrameworkKind};
use crate::core::errors::LaunchSiteError;
use async_trait::async_trait;
use download::Downloader;
use framework::Release;
use std::path::PathBuf;
use steam::SteamCmd;
use tracing::{error, info, warn};

/// The update contract consumed by the supervisor.
#[async_trait]
pub trait UpdateGateway: Send + Sync {
    /// Whether a newer server build is available.
    async fn check_server(&self) -> bool;

    /// Whether a newer framework release is available.
    async fn check_framework(&self) -> bool;

    async fn update_server(&self);

    /// Installs the latest framework release. `suppress_warning` silences the
    /// warning about a missing previous install, which is expected right
    /// after a server update wiped it.
    async fn update_framework(&self, suppress_warning: bool);
}

/// The production gateway: SteamCMD for the server, GitHub releases for the framework.
pub struct Updater {
    install_path: PathBuf,
    download_path: PathBuf,
    framework: FrameworkKind,
    steamcmd: SteamCmd,
    downloader: Downloader,
}

impl Updater {
    pub fn new(config: &Config) -> Result<Self, LaunchSiteError> {
        let steamcmd = SteamCmd::new(
            config.steamcmd_path.clone(),
            config.install_path.clone(),
            config.download_path.clone(),
        );
        if !steam::manifest_path(&config.install_path).exists() {
            warn!(
                "Steam app manifest {} does not exist; server update checks will fail",
                steam::manifest_path(&config.install_path).display()
            );
        }
        Ok(Self {
            install_path: config.install_path.clone(),
            download_path: config.download_path.clone(),
            framework: config.update.framework.kind,
            steamcmd,
            downloader: Downloader::new()?,
        })
    }

    async fn latest_release(&self) -> Result<Release, LaunchSiteError> {
        let url = framework::release_url(self.framework)
            .ok_or_else(|| LaunchSiteError::Update("no framework configured".to_string()))?;
        let body = self.downloader.get_text(url).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn install_framework(&self, release: &Release) -> Result<(), LaunchSiteError> {
        let title = self.framework.name();
        let url = release.asset_url(self.framework).ok_or_else(|| {
            LaunchSiteError::Update(format!("no {title} download found in release '{}'", release.name))
        })?;
        let asset = framework::release_asset_name(self.framework).unwrap_or("framework-archive");
        let archive = self.download_path.join(asset);

        self.downloader.download_to_file(url, &archive).await?;
        framework::extract_archive(&archive, &self.install_path).await?;

        if let Err(e) = tokio::fs::remove_file(&archive).await {
            warn!("Failed to remove {}: {}", archive.display(), e);
        }
        Ok(())
    }
}

#[async_trait]
impl UpdateGateway for Updater {
    async fn check_server(&self) -> bool {
        let installed = steam::installed_build(&self.install_path);
        info!("Installed server build: {:?}", installed);

        let branch = steam::installed_branch(&self.install_path);
        let latest = match self.steamcmd.latest_build(branch.as_deref()).await {
            Ok(latest) => latest,
            Err(e) => {
                error!("Failed to query latest server build: {}", e);
                None
            }
        };
        info!(
            "Latest server build on branch '{}': {:?}",
            branch.as_deref().unwrap_or("public"),
            latest
        );

        matches!((installed, latest), (Some(installed), Some(latest)) if installed != latest)
    }

    async fn check_framework(&self) -> bool {
        let Some(assembly) = framework::assembly_path(&self.install_path, self.framework) else {
            return false;
        };
        let title = self.framework.name();

        let installed = match framework::installed_version(&assembly).await {
            Ok(installed) => installed,
            Err(e) => {
                error!("Failed to read installed {} version: {}", title, e);
                None
            }
        };
        info!("Installed {} version: {:?}", title, installed);

        let latest = match self.latest_release().await {
            Ok(release) => release.version(self.framework),
            Err(e) => {
                error!("Failed to fetch latest {} release: {}", title, e);
                None
            }
        };
        info!("Latest {} version: {:?}", title, latest);

        matches!((installed, latest), (Some(installed), Some(latest)) if installed != latest)
    }

    async fn update_server(&self) {
        let branch = steam::installed_branch(&self.install_path);
        if let Err(e) = self.steamcmd.install(branch.as_deref()).await {
            error!("Server update failed: {}", e);
        }
    }

    async fn update_framework(&self, suppress_warning: bool) {
        let Some(assembly) = framework::assembly_path(&self.install_path, self.framework) else {
            return;
        };
        let title = self.framework.name();

        if !assembly.exists() {
            if !suppress_warning {
                warn!(
                    "Cannot update {} because a previous installation was not detected",
                    title
                );
            }
            return;
        }

        let result = match self.latest_release().await {
            Ok(release) => self.install_framework(&release).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => info!("{} update installed", title),
            Err(e) => error!("{} update failed: {}", title, e),
        }
    }
}
