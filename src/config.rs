//! Render Configuration
//!
//! Where manifests and layouts are read from, where artifacts go, and how
//! each external tool is launched. Every field has a default so an empty
//! `{}` file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::artifacts::ArtifactKind;
use crate::pipeline::PipelineError;
use crate::technology::Technology;
use crate::tools::ToolSpec;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RenderConfig {
    /// Holds `<shuttle>.json` manifests
    #[serde(default = "default_manifest_dir")]
    pub manifest_dir: PathBuf,
    /// Holds `<shuttle>/<project>.gds` layouts
    #[serde(default = "default_layout_dir")]
    pub layout_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Shuttle index server used by `--fetch`
    #[serde(default = "default_index_url")]
    pub index_url: String,
    #[serde(default = "ToolSpec::default_raster")]
    pub raster_tool: ToolSpec,
    #[serde(default = "ToolSpec::default_scene")]
    pub scene_tool: ToolSpec,
    #[serde(default = "ToolSpec::default_oasis")]
    pub oasis_tool: ToolSpec,
    /// Overrides the per-shuttle PDK choice
    #[serde(default)]
    pub technology: Option<Technology>,
}

fn default_manifest_dir() -> PathBuf { PathBuf::from("manifests") }
fn default_layout_dir() -> PathBuf { PathBuf::from("gds") }
fn default_output_dir() -> PathBuf { PathBuf::from("shuttles") }
fn default_index_url() -> String { "https://index.tinytapeout.com".to_string() }

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            manifest_dir: default_manifest_dir(),
            layout_dir: default_layout_dir(),
            output_dir: default_output_dir(),
            index_url: default_index_url(),
            raster_tool: ToolSpec::default_raster(),
            scene_tool: ToolSpec::default_scene(),
            oasis_tool: ToolSpec::default_oasis(),
            technology: None,
        }
    }
}

impl RenderConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, PipelineError> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::InvalidArgument(format!(
                "cannot read config {}: {}",
                path.display(),
                e
            ))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            PipelineError::InvalidArgument(format!("invalid config {}: {}", path.display(), e))
        })
    }

    /// Defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self, PipelineError> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn tool_for(&self, kind: ArtifactKind) -> &ToolSpec {
        match kind {
            ArtifactKind::Raster => &self.raster_tool,
            ArtifactKind::Scene => &self.scene_tool,
            ArtifactKind::Oasis => &self.oasis_tool,
        }
    }

    pub fn technology_for(&self, shuttle_id: &str) -> Technology {
        self.technology
            .clone()
            .unwrap_or_else(|| Technology::for_shuttle(shuttle_id))
    }

    pub fn manifest_path(&self, shuttle_id: &str) -> PathBuf {
        self.manifest_dir.join(format!("{}.json", shuttle_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_is_default() {
        let config: RenderConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, RenderConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config: RenderConfig = serde_json::from_str(
            r#"{"outputDir": "renders", "sceneTool": {"program": "gds2gltf", "args": ["{input}"]}}"#,
        )
        .unwrap();
        assert_eq!(config.output_dir, PathBuf::from("renders"));
        assert_eq!(config.index_url, "https://index.tinytapeout.com");
        assert_eq!(config.tool_for(ArtifactKind::Scene).program, "gds2gltf");
        assert!(config.tool_for(ArtifactKind::Scene).requires.is_empty());
        assert_eq!(config.tool_for(ArtifactKind::Raster).program, "klayout");
    }

    #[test]
    fn test_technology_override() {
        let mut config = RenderConfig::default();
        assert_eq!(config.technology_for("ttihp0p2").pdk, "sg13g2");
        config.technology = Some(Technology::sky130a());
        assert_eq!(config.technology_for("ttihp0p2").pdk, "sky130A");
    }

    #[test]
    fn test_missing_config_file() {
        let err = RenderConfig::load(Some(Path::new("/nonexistent/render.json"))).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidArgument(_)));
    }
}
