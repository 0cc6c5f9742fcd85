//! Render Pipeline - Per-Project Driver
//!
//! The driver walks a shuttle in manifest order and renders each project
//! exactly once. Argument, manifest and dependency errors abort before
//! anything is written; everything that goes wrong inside one project is
//! recorded in the report and the run moves on.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

use crate::artifacts::{partial_path, ArtifactKind, Scale};
use crate::hashing::{compute_job_hash, sha256_hex};
use crate::manifest::{ProjectDescriptor, Shuttle};
use crate::technology::Technology;
use crate::tools::{Substitutions, ToolSpec};
use crate::validation::{ArtifactInput, Validator};
use crate::DRIVER_VERSION;

/// Process exit code when at least one project failed.
pub const EXIT_PROJECT_FAILED: u8 = 2;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Manifest not found for shuttle: {0}")]
    ManifestNotFound(String),

    #[error("Malformed manifest {}: {message}", .path.display())]
    ManifestParse { path: PathBuf, message: String },

    #[error("Dependency missing: {0}")]
    DependencyMissing(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Layout source for {project} not found at {}", .path.display())]
    LayoutMissing { project: String, path: PathBuf },

    #[error("Render failed for {project} ({}): {detail}", exit_label(.exit_code))]
    RenderFailed {
        project: String,
        exit_code: Option<i32>,
        detail: String,
    },

    #[error("Output for {project} rejected: {reason}")]
    OutputInvalid { project: String, reason: String },

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "no exit code".to_string(),
    }
}

impl PipelineError {
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            PipelineError::RenderFailed { exit_code, .. } => *exit_code,
            _ => None,
        }
    }
}

/// Everything a backend needs to render one project.
#[derive(Debug, Clone)]
pub struct RenderJob<'a> {
    pub shuttle: &'a str,
    pub project: &'a ProjectDescriptor,
    pub kind: ArtifactKind,
    pub scale: Scale,
    pub technology: &'a Technology,
}

impl RenderJob<'_> {
    /// Placeholder values for a tool writing to `target`.
    ///
    /// File paths are made absolute: the tool may run in its own working directory.
    pub fn substitutions(&self, target: &Path) -> io::Result<Substitutions> {
        let input = std::path::absolute(&self.project.layout_source_path)?;
        let output = std::path::absolute(target)?;
        Ok(Substitutions::new()
            .with("input", input.display().to_string())
            .with("output", output.display().to_string())
            .with("scale", self.scale.to_string())
            .with("pdk", self.technology.pdk.clone())
            .with("boundary", self.technology.boundary_layer.clone())
            .with("hide_layers", self.technology.hide_layers_arg())
            .with("layer_props", self.technology.layer_props())
            .with("project", self.project.name.clone())
            .with("shuttle", self.shuttle))
    }
}

/// One way of turning a layout into an artifact file.
pub trait RenderBackend {
    /// Checked once, before the first project.
    fn ensure_available(&self) -> Result<(), PipelineError>;

    /// Write the artifact for `job` to `target`, or fail.
    fn render(&self, job: &RenderJob<'_>, target: &Path) -> Result<(), PipelineError>;

    /// Identity of the backend's configuration, folded into job hashes.
    fn fingerprint(&self) -> serde_json::Value;
}

/// Backend that shells out to a configured external program.
pub struct ExternalRenderer {
    tool: ToolSpec,
}

impl ExternalRenderer {
    pub fn new(tool: ToolSpec) -> Self {
        Self { tool }
    }
}

impl RenderBackend for ExternalRenderer {
    fn ensure_available(&self) -> Result<(), PipelineError> {
        self.tool.ensure_available()
    }

    fn render(&self, job: &RenderJob<'_>, target: &Path) -> Result<(), PipelineError> {
        let run = job
            .substitutions(target)
            .and_then(|subs| self.tool.run(&subs))
            .map_err(|e| PipelineError::RenderFailed {
                project: job.project.name.clone(),
                exit_code: None,
                detail: format!("could not start {}: {}", self.tool.program, e),
            })?;

        if run.status.success() {
            Ok(())
        } else {
            Err(PipelineError::RenderFailed {
                project: job.project.name.clone(),
                exit_code: run.status.code(),
                detail: run.stderr_tail,
            })
        }
    }

    fn fingerprint(&self) -> serde_json::Value {
        serde_json::to_value(&self.tool).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Succeeded {
        output: PathBuf,
        sha256: String,
        bytes: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        dimensions: Option<[u32; 2]>,
    },
    Failed {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectOutcome {
    pub project: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_hash: Option<String>,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

impl ProjectOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self.status, OutcomeStatus::Succeeded { .. })
    }

    pub fn output(&self) -> Option<&Path> {
        match &self.status {
            OutcomeStatus::Succeeded { output, .. } => Some(output),
            OutcomeStatus::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub shuttle: String,
    pub kind: ArtifactKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    pub pdk: String,
    pub driver_version: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub succeeded: usize,
    pub failed: usize,
    pub outcomes: Vec<ProjectOutcome>,
}

impl RunReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    /// 0 when every project rendered, otherwise [`EXIT_PROJECT_FAILED`].
    pub fn exit_code(&self) -> u8 {
        if self.all_succeeded() {
            0
        } else {
            EXIT_PROJECT_FAILED
        }
    }

    pub fn failed_projects(&self) -> impl Iterator<Item = &ProjectOutcome> + '_ {
        self.outcomes.iter().filter(|o| !o.succeeded())
    }
}

struct RenderedArtifact {
    output: PathBuf,
    sha256: String,
    bytes: u64,
    dimensions: Option<[u32; 2]>,
}

/// Sequential driver over one backend.
pub struct ShuttleDriver<B: RenderBackend> {
    backend: B,
    kind: ArtifactKind,
    scale: Scale,
    technology: Technology,
    validator: Validator,
}

impl<B: RenderBackend> ShuttleDriver<B> {
    pub fn new(backend: B, kind: ArtifactKind) -> Self {
        Self {
            backend,
            kind,
            scale: Scale::default(),
            technology: Technology::default(),
            validator: Validator::new(),
        }
    }

    pub fn with_scale(mut self, scale: Scale) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_technology(mut self, technology: Technology) -> Self {
        self.technology = technology;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Render every project of `shuttle`, in order, once each.
    ///
    /// Only a missing dependency aborts; project failures land in the report.
    pub fn run(&self, shuttle: &Shuttle) -> Result<RunReport, PipelineError> {
        self.backend.ensure_available()?;

        let started_at = Utc::now();
        log::info!("Found {} projects in shuttle {}", shuttle.len(), shuttle.id);

        let mut outcomes = Vec::with_capacity(shuttle.len());
        for project in shuttle.projects() {
            log::info!("Rendering {} ({})", project.name, self.kind);
            outcomes.push(self.render_project(shuttle, project));
        }

        let succeeded = outcomes.iter().filter(|o| o.succeeded()).count();
        let failed = outcomes.len() - succeeded;

        for outcome in outcomes.iter().filter(|o| !o.succeeded()) {
            if let OutcomeStatus::Failed { error, .. } = &outcome.status {
                log::warn!("FAILED {}: {}", outcome.project, error);
            }
        }
        log::info!(
            "Shuttle {}: {} succeeded, {} failed",
            shuttle.id,
            succeeded,
            failed
        );

        Ok(RunReport {
            run_id: Uuid::new_v4().to_string(),
            shuttle: shuttle.id.clone(),
            kind: self.kind,
            scale: self.kind.is_scaled().then(|| self.scale.value()),
            pdk: self.technology.pdk.clone(),
            driver_version: DRIVER_VERSION.to_string(),
            started_at,
            finished_at: Utc::now(),
            succeeded,
            failed,
            outcomes,
        })
    }

    fn render_project(&self, shuttle: &Shuttle, project: &ProjectDescriptor) -> ProjectOutcome {
        let job_hash = compute_job_hash(
            &shuttle.id,
            &project.name,
            self.kind,
            self.scale,
            &self.backend.fingerprint(),
            DRIVER_VERSION,
        )
        .ok();

        let status = match self.render_artifact(shuttle, project) {
            Ok(artifact) => {
                log::info!("Wrote {}", artifact.output.display());
                OutcomeStatus::Succeeded {
                    output: artifact.output,
                    sha256: artifact.sha256,
                    bytes: artifact.bytes,
                    dimensions: artifact.dimensions,
                }
            }
            Err(e) => {
                log::error!("{}", e);
                OutcomeStatus::Failed {
                    exit_code: e.exit_code(),
                    error: e.to_string(),
                }
            }
        };

        ProjectOutcome {
            project: project.name.clone(),
            job_hash,
            status,
        }
    }

    fn render_artifact(
        &self,
        shuttle: &Shuttle,
        project: &ProjectDescriptor,
    ) -> Result<RenderedArtifact, PipelineError> {
        if !project.layout_source_path.is_file() {
            return Err(PipelineError::LayoutMissing {
                project: project.name.clone(),
                path: project.layout_source_path.clone(),
            });
        }

        let created = missing_dirs(&project.output_dir);
        fs::create_dir_all(&project.output_dir)?;

        let result = self.produce_artifact(shuttle, project);
        if result.is_err() {
            // Only directories this attempt created, deepest first; stops at the first non-empty one.
            for dir in &created {
                if fs::remove_dir(dir).is_err() {
                    break;
                }
            }
        }
        result
    }

    fn produce_artifact(
        &self,
        shuttle: &Shuttle,
        project: &ProjectDescriptor,
    ) -> Result<RenderedArtifact, PipelineError> {
        let output = project.output_path(self.kind, self.scale);
        let partial = partial_path(&output);
        remove_if_exists(&partial)?;

        let job = RenderJob {
            shuttle: &shuttle.id,
            project,
            kind: self.kind,
            scale: self.scale,
            technology: &self.technology,
        };

        if let Err(e) = self.backend.render(&job, &partial) {
            discard_partial(&partial);
            return Err(e);
        }

        let data = match fs::read(&partial) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(PipelineError::OutputInvalid {
                    project: project.name.clone(),
                    reason: "tool reported success but wrote no file".to_string(),
                });
            }
            Err(e) => {
                discard_partial(&partial);
                return Err(e.into());
            }
        };

        let validation = self.validator.validate(&ArtifactInput {
            kind: self.kind,
            data: &data,
        });
        if !validation.valid {
            discard_partial(&partial);
            return Err(PipelineError::OutputInvalid {
                project: project.name.clone(),
                reason: validation.summary(),
            });
        }

        fs::rename(&partial, &output)?;

        Ok(RenderedArtifact {
            output,
            sha256: sha256_hex(&data),
            bytes: data.len() as u64,
            dimensions: validation.dimensions,
        })
    }
}

/// `dir` and its ancestors that do not exist yet, deepest first.
fn missing_dirs(dir: &Path) -> Vec<PathBuf> {
    dir.ancestors()
        .take_while(|d| !d.as_os_str().is_empty() && !d.exists())
        .map(Path::to_path_buf)
        .collect()
}

/// Best-effort removal on a failure path; the failure being reported wins.
fn discard_partial(path: &Path) {
    if let Err(e) = remove_if_exists(path) {
        log::warn!("Could not remove {}: {}", path.display(), e);
    }
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_failed_message() {
        let err = PipelineError::RenderFailed {
            project: "tt_um_a".to_string(),
            exit_code: Some(3),
            detail: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "Render failed for tt_um_a (exit code 3): boom");
        assert!(err.is_project_failure());
        assert_eq!(err.exit_code(), Some(3));
    }

    #[test]
    fn test_exit_code_only_for_render_failures() {
        assert_eq!(PipelineError::ManifestNotFound("tt04".into()).exit_code(), None);
        assert_eq!(PipelineError::DependencyMissing("x".into()).exit_code(), None);
    }

    #[test]
    fn test_substitutions_use_absolute_paths() {
        let project = ProjectDescriptor {
            name: "a".to_string(),
            layout_source_path: PathBuf::from("gds/tt05/a.gds"),
            output_dir: PathBuf::from("shuttles/tt05/a"),
        };
        let technology = Technology::default();
        let job = RenderJob {
            shuttle: "tt05",
            project: &project,
            kind: ArtifactKind::Raster,
            scale: Scale::ONE,
            technology: &technology,
        };
        let subs = job.substitutions(Path::new("shuttles/tt05/a/.partial-a_1x.png")).unwrap();
        let cwd = std::env::current_dir().unwrap();

        assert_eq!(
            subs.expand("{input}"),
            cwd.join("gds/tt05/a.gds").display().to_string()
        );
        assert_eq!(
            subs.expand("{output}"),
            cwd.join("shuttles/tt05/a/.partial-a_1x.png").display().to_string()
        );
        assert_eq!(subs.expand("{pdk}"), "sky130A");
    }

    #[test]
    fn test_missing_dirs_deepest_first() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("tt04/a");
        assert_eq!(missing_dirs(&target), [target.clone(), dir.path().join("tt04")]);
        assert!(missing_dirs(dir.path()).is_empty());
    }

    /// Backend that fails after leaving a partial file behind.
    struct LeakyBackend;

    impl RenderBackend for LeakyBackend {
        fn ensure_available(&self) -> Result<(), PipelineError> {
            Ok(())
        }

        fn render(&self, job: &RenderJob<'_>, target: &Path) -> Result<(), PipelineError> {
            // a directory where the partial file should be makes removal fail
            fs::create_dir_all(target.join("busy"))?;
            Err(PipelineError::RenderFailed {
                project: job.project.name.clone(),
                exit_code: Some(7),
                detail: "viewer crashed".to_string(),
            })
        }

        fn fingerprint(&self) -> serde_json::Value {
            serde_json::Value::Null
        }
    }

    #[test]
    fn test_cleanup_failure_keeps_render_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = crate::config::RenderConfig {
            manifest_dir: dir.path().join("manifests"),
            layout_dir: dir.path().join("gds"),
            output_dir: dir.path().join("out"),
            ..Default::default()
        };
        fs::create_dir_all(&config.manifest_dir).unwrap();
        fs::create_dir_all(config.layout_dir.join("tt04")).unwrap();
        fs::write(config.manifest_dir.join("tt04.json"), r#"{"projects": [{"macro": "a"}]}"#).unwrap();
        fs::write(config.layout_dir.join("tt04/a.gds"), b"GDS").unwrap();
        let shuttle = Shuttle::load(&config, "tt04").unwrap();

        let report = ShuttleDriver::new(LeakyBackend, ArtifactKind::Raster)
            .run(&shuttle)
            .unwrap();

        assert_eq!(report.failed, 1);
        match &report.outcomes[0].status {
            OutcomeStatus::Failed { error, exit_code } => {
                assert_eq!(*exit_code, Some(7));
                assert!(error.contains("viewer crashed"), "{}", error);
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }
}
