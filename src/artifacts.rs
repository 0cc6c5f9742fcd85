//! Artifact Naming - Deterministic Output Paths
//!
//! Every artifact location is derived from (shuttle, project, kind, scale)
//! and nothing else, so re-runs overwrite rather than accumulate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::pipeline::PipelineError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// PNG raster from the layout viewer
    Raster,
    /// glTF scene from the mesh converter
    Scene,
    /// OASIS conversion of the layout
    Oasis,
}

impl ArtifactKind {
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::Raster => "png",
            ArtifactKind::Scene => "gds.gltf",
            ArtifactKind::Oasis => "oas",
        }
    }

    /// Only rasters depend on the scale factor.
    pub fn is_scaled(&self) -> bool {
        matches!(self, ArtifactKind::Raster)
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArtifactKind::Raster => "raster",
            ArtifactKind::Scene => "scene",
            ArtifactKind::Oasis => "oasis",
        };
        f.write_str(name)
    }
}

/// Positive, finite render scale factor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Scale(f64);

impl Scale {
    pub const ONE: Scale = Scale(1.0);
    pub const MIN: f64 = 0.001;
    pub const MAX: f64 = 1000.0;

    pub fn new(value: f64) -> Result<Self, PipelineError> {
        if !value.is_finite() || value <= 0.0 {
            return Err(PipelineError::InvalidArgument(format!(
                "scale must be a positive number, got {}",
                value
            )));
        }
        if !(Self::MIN..=Self::MAX).contains(&value) {
            return Err(PipelineError::InvalidArgument(format!(
                "scale must be between {} and {}, got {}",
                Self::MIN,
                Self::MAX,
                value
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Scale a layout dimension to pixels, truncating like the viewer does.
    pub fn apply(&self, dimension: f64) -> u32 {
        (dimension * self.0) as u32
    }
}

impl Default for Scale {
    fn default() -> Self {
        Self::ONE
    }
}

impl FromStr for Scale {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: f64 = s.trim().parse().map_err(|_| {
            PipelineError::InvalidArgument(format!("scale must be a positive number, got '{}'", s))
        })?;
        Self::new(value)
    }
}

impl TryFrom<f64> for Scale {
    type Error = PipelineError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Scale> for f64 {
    fn from(scale: Scale) -> f64 {
        scale.0
    }
}

/// Shortest decimal form: `2`, `1.5`, `0.25`.
impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// File name of an artifact inside its project directory.
pub fn artifact_file_name(project: &str, kind: ArtifactKind, scale: Scale) -> String {
    if kind.is_scaled() {
        format!("{}_{}x.{}", project, scale, kind.extension())
    } else {
        format!("{}.{}", project, kind.extension())
    }
}

/// Directory holding every artifact of one project.
pub fn project_dir(output_root: &Path, shuttle: &str, project: &str) -> PathBuf {
    output_root.join(shuttle).join(project)
}

/// `<root>/<shuttle>/<project>/<file>` where the file name depends on kind and scale.
pub fn artifact_path(
    output_root: &Path,
    shuttle: &str,
    project: &str,
    kind: ArtifactKind,
    scale: Scale,
) -> PathBuf {
    project_dir(output_root, shuttle, project).join(artifact_file_name(project, kind, scale))
}

/// Sibling path the external tool writes to before the artifact is committed.
///
/// The extension is kept: the viewer picks its output format from it.
pub fn partial_path(final_path: &Path) -> PathBuf {
    let mut name = std::ffi::OsString::from(".partial-");
    if let Some(file_name) = final_path.file_name() {
        name.push(file_name);
    }
    final_path.with_file_name(name)
}
