//! Shuttle Manifests
//!
//! A manifest lists the projects on one shuttle, in the same shape as the
//! shuttle index document: `{"projects": [{"macro": "tt_um_x", ...}]}`.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use crate::artifacts::{artifact_file_name, artifact_path, project_dir, ArtifactKind, Scale};
use crate::config::RenderConfig;
use crate::pipeline::PipelineError;

/// One project entry as it appears in the manifest file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    #[serde(rename = "macro")]
    pub macro_name: String,
    /// Layout file relative to the shuttle's layout directory
    #[serde(default)]
    pub gds: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestFile {
    projects: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectDescriptor {
    pub name: String,
    pub layout_source_path: PathBuf,
    /// `<output_root>/<shuttle>/<name>`
    pub output_dir: PathBuf,
}

impl ProjectDescriptor {
    pub fn output_path(&self, kind: ArtifactKind, scale: Scale) -> PathBuf {
        self.output_dir
            .join(artifact_file_name(&self.name, kind, scale))
    }
}

#[derive(Debug, Clone)]
pub struct Shuttle {
    pub id: String,
    output_root: PathBuf,
    projects: Vec<ProjectDescriptor>,
}

impl Shuttle {
    /// Parse `<manifest_dir>/<shuttle_id>.json`. Reads only; writes nothing.
    pub fn load(config: &RenderConfig, shuttle_id: &str) -> Result<Self, PipelineError> {
        validate_shuttle_id(shuttle_id)?;

        let path = config.manifest_path(shuttle_id);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(PipelineError::ManifestNotFound(shuttle_id.to_string()));
            }
            Err(e) => return Err(PipelineError::Io(e)),
        };

        Self::parse(config, shuttle_id, &path, &content)
    }

    fn parse(
        config: &RenderConfig,
        shuttle_id: &str,
        path: &Path,
        content: &str,
    ) -> Result<Self, PipelineError> {
        let parse_error = |message: String| PipelineError::ManifestParse {
            path: path.to_path_buf(),
            message,
        };

        let manifest: ManifestFile =
            serde_json::from_str(content).map_err(|e| parse_error(e.to_string()))?;

        let layout_root = config.layout_dir.join(shuttle_id);
        let mut seen = HashSet::new();
        let mut projects = Vec::with_capacity(manifest.projects.len());

        for entry in manifest.projects {
            let name = entry.macro_name;
            if !is_plain_name(&name) {
                return Err(parse_error(format!("invalid project name '{}'", name)));
            }
            if !seen.insert(name.clone()) {
                return Err(parse_error(format!("duplicate project '{}'", name)));
            }

            let layout_source_path = match entry.gds {
                Some(gds) if !is_relative_below(&gds) => {
                    return Err(parse_error(format!(
                        "layout path '{}' for '{}' must stay inside the shuttle's layout directory",
                        gds.display(),
                        name
                    )));
                }
                Some(gds) => layout_root.join(gds),
                None => layout_root.join(format!("{}.gds", name)),
            };

            projects.push(ProjectDescriptor {
                output_dir: project_dir(&config.output_dir, shuttle_id, &name),
                layout_source_path,
                name,
            });
        }

        Ok(Self {
            id: shuttle_id.to_string(),
            output_root: config.output_dir.clone(),
            projects,
        })
    }

    /// Descriptors in manifest order. Each call starts from the beginning.
    pub fn projects(&self) -> impl Iterator<Item = &ProjectDescriptor> + '_ {
        self.projects.iter()
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    pub fn artifact_path(&self, project: &str, kind: ArtifactKind, scale: Scale) -> PathBuf {
        artifact_path(&self.output_root, &self.id, project, kind, scale)
    }
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
}

/// Relative, and made only of plain components (no `..`, no root).
fn is_relative_below(path: &Path) -> bool {
    path.components().next().is_some()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

pub fn validate_shuttle_id(shuttle_id: &str) -> Result<(), PipelineError> {
    if is_plain_name(shuttle_id) {
        Ok(())
    } else {
        Err(PipelineError::InvalidArgument(format!(
            "invalid shuttle identifier '{}'",
            shuttle_id
        )))
    }
}
