// src/core/updater/framework.rs

//! Carbon and Oxide release discovery, version probing, and extraction.

use crate::config::FrameworkKind;
use crate::core::errors::LaunchSiteError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, warn};

/// Carbon release names look like `Production Build — v1.2024.1033.4309`.
const CARBON_RELEASE_PREFIX: &str = "Production Build — v";

#[derive(Deserialize, Debug, Clone)]
pub struct Release {
    pub name: String,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
}

/// The GitHub API endpoint describing the release to track.
pub fn release_url(kind: FrameworkKind) -> Option<&'static str> {
    match kind {
        FrameworkKind::None => None,
        FrameworkKind::Carbon => Some(
            "https://api.github.com/repos/CarbonCommunity/Carbon/releases/tags/production_build",
        ),
        FrameworkKind::Oxide => Some("https://api.github.com/repos/OxideMod/Oxide.Rust/releases/latest"),
    }
}

/// The release asset for the current platform.
pub fn release_asset_name(kind: FrameworkKind) -> Option<&'static str> {
    match kind {
        FrameworkKind::None => None,
        FrameworkKind::Carbon if cfg!(windows) => Some("Carbon.Windows.Release.zip"),
        FrameworkKind::Carbon => Some("Carbon.Linux.Release.tar.gz"),
        FrameworkKind::Oxide if cfg!(windows) => Some("Oxide.Rust.zip"),
        FrameworkKind::Oxide => Some("Oxide.Rust-linux.zip"),
    }
}

/// The framework assembly whose presence marks an existing install.
pub fn assembly_path(install_path: &Path, kind: FrameworkKind) -> Option<PathBuf> {
    match kind {
        FrameworkKind::None => None,
        FrameworkKind::Carbon => Some(install_path.join("carbon/managed/Carbon.dll")),
        FrameworkKind::Oxide => Some(install_path.join("RustDedicated_Data/Managed/Oxide.Rust.dll")),
    }
}

impl Release {
    /// The version this release installs, comparable with [`installed_version`].
    pub fn version(&self, kind: FrameworkKind) -> Option<String> {
        match kind {
            FrameworkKind::None => None,
            FrameworkKind::Carbon => match self.name.strip_prefix(CARBON_RELEASE_PREFIX) {
                Some(version) => Some(version.to_string()),
                None => {
                    warn!("Carbon release prefix not found in release name: {}", self.name);
                    None
                }
            },
            FrameworkKind::Oxide => Some(self.name.clone()),
        }
    }

    pub fn asset_url(&self, kind: FrameworkKind) -> Option<&str> {
        let wanted = release_asset_name(kind)?;
        self.assets
            .iter()
            .find(|asset| asset.name == wanted)
            .map(|asset| asset.browser_download_url.as_str())
    }
}

/// Extracts the assembly version from `monodis --assembly` output,
/// truncated to three components.
pub fn parse_monodis_version(output: &str) -> Option<String> {
    let version = output
        .lines()
        .find_map(|line| line.strip_prefix("Version:"))?
        .trim();
    if version.is_empty() {
        return None;
    }
    Some(truncate_components(version, 3).to_string())
}

/// Extracts `VersionInfo.ProductVersion` from PowerShell output, dropping
/// any `+` or `-` suffix.
pub fn parse_product_version(output: &str) -> Option<String> {
    let line = output.lines().next()?.trim();
    let version = line.split(['+', '-']).next().unwrap_or(line);
    (!version.is_empty()).then(|| version.to_string())
}

fn truncate_components(version: &str, count: usize) -> &str {
    match version.match_indices('.').nth(count - 1) {
        Some((index, _)) => &version[..index],
        None => version,
    }
}

/// Reads the installed framework version from its assembly.
pub async fn installed_version(assembly: &Path) -> Result<Option<String>, LaunchSiteError> {
    if !assembly.exists() {
        return Ok(None);
    }

    let probe = if cfg!(windows) {
        Command::new("powershell.exe")
            .arg("-Command")
            .arg(format!(
                "(Get-Item '{}').VersionInfo.ProductVersion",
                assembly.display()
            ))
            .output()
            .await
    } else {
        Command::new("monodis")
            .arg("--assembly")
            .arg(assembly)
            .output()
            .await
    };
    let output =
        probe.map_err(|e| LaunchSiteError::Update(format!("failed to run version probe: {e}")))?;

    if !output.status.success() {
        return Err(LaunchSiteError::Update(format!(
            "version probe returned non-zero exit status: {}",
            output.status
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(if cfg!(windows) {
        parse_product_version(&stdout)
    } else {
        parse_monodis_version(&stdout)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    Zip,
}

/// Identifies an archive by its magic bytes.
pub fn detect_archive_format(header: &[u8]) -> Option<ArchiveFormat> {
    match header {
        [0x1F, 0x8B, ..] => Some(ArchiveFormat::TarGz),
        [b'P', b'K', ..] => Some(ArchiveFormat::Zip),
        _ => None,
    }
}

/// Extracts `archive` over `destination` using the system `tar` or `unzip`.
pub async fn extract_archive(archive: &Path, destination: &Path) -> Result<(), LaunchSiteError> {
    let mut header = [0u8; 2];
    {
        use tokio::io::AsyncReadExt;
        let mut file = tokio::fs::File::open(archive).await?;
        file.read_exact(&mut header).await?;
    }

    let format = detect_archive_format(&header).ok_or_else(|| {
        LaunchSiteError::Update(format!(
            "unrecognized archive format: {}",
            archive.display()
        ))
    })?;

    let mut command = match format {
        ArchiveFormat::TarGz => {
            let mut command = Command::new("tar");
            command.arg("-xzf").arg(archive).arg("-C").arg(destination);
            command
        }
        // bsdtar on Windows reads zips; elsewhere prefer unzip.
        ArchiveFormat::Zip if cfg!(windows) => {
            let mut command = Command::new("tar");
            command.arg("-xf").arg(archive).arg("-C").arg(destination);
            command
        }
        ArchiveFormat::Zip => {
            let mut command = Command::new("unzip");
            command.arg("-o").arg("-q").arg(archive).arg("-d").arg(destination);
            command
        }
    };

    debug!("Extracting {} into {}", archive.display(), destination.display());
    let status = command.status().await?;
    if !status.success() {
        return Err(LaunchSiteError::Update(format!(
            "extracting {} returned non-zero exit status: {status}",
            archive.display()
        )));
    }
    Ok(())
}
