//! Local checkpoint cache backed by a model hub.

use super::CheckpointError;
use crate::config::CheckpointConfig;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Something that can place a named checkpoint file at a local path.
pub trait CheckpointFetcher {
    /// Fetch `filename` from repository `repo_id` and write it to `destination`.
    fn fetch(&self, repo_id: &str, filename: &str, destination: &Path)
    -> Result<(), CheckpointError>;
}

/// Downloads files from a Hugging Face style hub over HTTP.
pub struct HubFetcher {
    endpoint: String,
    client: reqwest::blocking::Client,
}

impl HubFetcher {
    /// Create a fetcher for `endpoint`, e.g. `https://huggingface.co`.
    pub fn new(endpoint: &str) -> Result<Self, CheckpointError> {
        // Checkpoints run to gigabytes; the blocking client's default
        // 30 second budget would cut them off.
        let client = reqwest::blocking::Client::builder()
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| CheckpointError::Download {
                url: endpoint.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self::with_client(endpoint, client))
    }

    /// Create a fetcher for `endpoint` that sends its requests through `client`.
    pub fn with_client(endpoint: &str, client: reqwest::blocking::Client) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// URL of `filename` on the main revision of `repo_id`.
    pub fn file_url(&self, repo_id: &str, filename: &str) -> String {
        format!("{}/{}/resolve/main/{}", self.endpoint, repo_id, filename)
    }
}

impl CheckpointFetcher for HubFetcher {
    #[tracing::instrument(skip(self, destination))]
    fn fetch(
        &self,
        repo_id: &str,
        filename: &str,
        destination: &Path,
    ) -> Result<(), CheckpointError> {
        let url = self.file_url(repo_id, filename);
        let download_error = |reason: String| CheckpointError::Download {
            url: url.clone(),
            reason,
        };

        let mut response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| download_error(e.to_string()))?;
        if !response.status().is_success() {
            return Err(download_error(format!("HTTP status {}", response.status())));
        }

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        let partial = partial_path(destination);
        let mut file = File::create(&partial)?;
        let bytes = response
            .copy_to(&mut file)
            .map_err(|e| download_error(e.to_string()))?;
        file.sync_all()?;
        drop(file);
        fs::rename(&partial, destination)?;

        info!("Downloaded {} ({} bytes)", url, bytes);
        Ok(())
    }
}

/// `<name>.part` next to `destination`, so a torn download never looks cached.
fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

/// A checkpoint that lives at a fixed local path and is fetched once.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    local_path: PathBuf,
    repo_id: String,
    filename: String,
}

impl CheckpointStore {
    pub fn new(config: &CheckpointConfig) -> Self {
        Self {
            local_path: config.local_path(),
            repo_id: config.repo_id.clone(),
            filename: config.filename.clone(),
        }
    }

    /// Return the local checkpoint path, fetching the file first if it is absent.
    pub fn ensure_local(
        &self,
        fetcher: &dyn CheckpointFetcher,
    ) -> Result<PathBuf, CheckpointError> {
        if self.local_path.exists() {
            debug!("Using cached checkpoint {}", self.local_path.display());
            return Ok(self.local_path.clone());
        }

        info!("Downloading pre-trained mesh generator model {}...", self.filename);
        fetcher.fetch(&self.repo_id, &self.filename, &self.local_path)?;
        Ok(self.local_path.clone())
    }
}
