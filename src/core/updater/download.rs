// src/core/updater/download.rs

//! A thin HTTP client for release metadata and archives.

use crate::core::errors::LaunchSiteError;
use std::path::Path;
use std::time::Duration;
use tracing::info;

const USER_AGENT: &str = concat!("launchsite/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

pub struct Downloader {
    client: reqwest::Client,
}

impl Downloader {
    pub fn new() -> Result<Self, LaunchSiteError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }

    pub async fn get_text(&self, url: &str) -> Result<String, LaunchSiteError> {
        let res = self.client.get(url).send().await?;
        if res.status() != reqwest::StatusCode::OK {
            return Err(LaunchSiteError::Update(format!(
                "{url} responded with status {}",
                res.status()
            )));
        }
        Ok(res.text().await?)
    }

    /// Downloads `url` to `destination`, creating parent directories.
    pub async fn download_to_file(
        &self,
        url: &str,
        destination: &Path,
    ) -> Result<u64, LaunchSiteError> {
        let res = self.client.get(url).send().await?;
        if res.status() != reqwest::StatusCode::OK {
            return Err(LaunchSiteError::Update(format!(
                "{url} responded with status {}",
                res.status()
            )));
        }
        let body = res.bytes().await?;

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(destination, &body).await?;
        info!(
            "Downloaded {} bytes from {} to {}",
            body.len(),
            url,
            destination.display()
        );
        Ok(body.len() as u64)
    }
}
