//! Shuttle Index Fetching
//!
//! Fills the manifest and layout directories from the shuttle index server:
//! `<index>/<shuttle>.json` is the manifest, `<index>/index.json` lists each
//! shuttle's `project_gds_url_template`. Layouts already on disk are reused.

use flate2::read::GzDecoder;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::artifacts::partial_path;
use crate::config::RenderConfig;
use crate::manifest::{validate_shuttle_id, Shuttle};
use crate::pipeline::PipelineError;
use crate::DRIVER_VERSION;

#[derive(Debug, Deserialize)]
struct IndexFile {
    #[serde(default)]
    shuttles: Vec<IndexShuttle>,
}

#[derive(Debug, Deserialize)]
struct IndexShuttle {
    id: String,
    project_gds_url_template: String,
}

/// What a layout fetch did, per project.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FetchSummary {
    pub downloaded: Vec<String>,
    pub cached: Vec<String>,
    /// (project, reason); these projects later fail with a missing layout
    pub failed: Vec<(String, String)>,
}

/// Client for the shuttle index server
pub struct IndexClient {
    client: Client,
    base_url: String,
}

impl IndexClient {
    pub fn new(base_url: &str) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .user_agent(format!("shuttle-renders/{}", DRIVER_VERSION))
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| PipelineError::Fetch(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// `Ok(None)` on 404, so callers can map absence to their own error.
    fn get(&self, url: &str) -> Result<Option<Vec<u8>>, PipelineError> {
        log::debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| PipelineError::Fetch(format!("{}: {}", url, e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(PipelineError::Fetch(format!("{}: HTTP {}", url, response.status())));
        }

        response
            .bytes()
            .map(|b| Some(b.to_vec()))
            .map_err(|e| PipelineError::Fetch(format!("{}: {}", url, e)))
    }

    /// Download `<shuttle>.json` into the manifest directory, replacing any old copy.
    pub fn fetch_manifest(
        &self,
        config: &RenderConfig,
        shuttle_id: &str,
    ) -> Result<PathBuf, PipelineError> {
        validate_shuttle_id(shuttle_id)?;

        let url = format!("{}/{}.json", self.base_url, shuttle_id);
        let data = self
            .get(&url)?
            .ok_or_else(|| PipelineError::ManifestNotFound(shuttle_id.to_string()))?;

        let path = config.manifest_path(shuttle_id);
        write_atomic(&path, &data)?;
        log::info!("Fetched manifest for {} to {}", shuttle_id, path.display());
        Ok(path)
    }

    fn gds_url_template(&self, shuttle_id: &str) -> Result<String, PipelineError> {
        let url = format!("{}/index.json", self.base_url);
        let data = self
            .get(&url)?
            .ok_or_else(|| PipelineError::Fetch(format!("{}: HTTP 404", url)))?;
        let index: IndexFile = serde_json::from_slice(&data)
            .map_err(|e| PipelineError::Fetch(format!("{}: {}", url, e)))?;

        index
            .shuttles
            .into_iter()
            .find(|s| s.id == shuttle_id)
            .map(|s| s.project_gds_url_template)
            .ok_or_else(|| PipelineError::ManifestNotFound(shuttle_id.to_string()))
    }

    /// Download every missing layout of `shuttle`.
    ///
    /// The index is only consulted when at least one layout is missing.
    /// A single project's download failure is recorded, not returned.
    pub fn fetch_layouts(&self, shuttle: &Shuttle) -> Result<FetchSummary, PipelineError> {
        let mut summary = FetchSummary::default();
        let mut template: Option<String> = None;

        for project in shuttle.projects() {
            if project.layout_source_path.is_file() {
                log::info!(
                    "Found existing layout at {}, skipping download",
                    project.layout_source_path.display()
                );
                summary.cached.push(project.name.clone());
                continue;
            }

            if template.is_none() {
                template = Some(self.gds_url_template(&shuttle.id)?);
            }
            let url = template
                .as_deref()
                .unwrap_or_default()
                .replace("{macro}", &project.name);

            log::info!("Downloading layout for {} from {}", project.name, url);
            match self.download_layout(&url, &project.layout_source_path) {
                Ok(()) => summary.downloaded.push(project.name.clone()),
                Err(e) => {
                    log::warn!("Could not fetch layout for {}: {}", project.name, e);
                    summary.failed.push((project.name.clone(), e.to_string()));
                }
            }
        }

        Ok(summary)
    }

    fn download_layout(&self, url: &str, target: &Path) -> Result<(), PipelineError> {
        let data = self
            .get(url)?
            .ok_or_else(|| PipelineError::Fetch(format!("{}: HTTP 404", url)))?;

        let data = if url.ends_with(".gz") { gunzip(&data)? } else { data };
        write_atomic(target, &data)
    }
}

fn gunzip(data: &[u8]) -> Result<Vec<u8>, PipelineError> {
    let mut out = Vec::new();
    GzDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| PipelineError::Fetch(format!("corrupt gzip stream: {}", e)))?;
    Ok(out)
}

/// Write through a staging file so an interrupted download never looks cached.
fn write_atomic(path: &Path, data: &[u8]) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let staging = partial_path(path);
    fs::write(&staging, data)?;
    fs::rename(&staging, path)?;
    Ok(())
}
