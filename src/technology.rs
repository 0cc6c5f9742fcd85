//! Technology Table
//!
//! Each shuttle targets one PDK. The PDK decides which layer outlines the
//! die and which layers the renderer hides.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Technology {
    pub pdk: String,
    /// Layer whose bounding box frames the render
    pub boundary_layer: String,
    #[serde(default)]
    pub hide_layers: Vec<String>,
}

impl Technology {
    pub fn sky130a() -> Self {
        Self {
            pdk: "sky130A".to_string(),
            boundary_layer: "prBoundary.boundary".to_string(),
            hide_layers: vec![
                "areaid.standardc".to_string(),
                "areaid.lowTapDensity".to_string(),
            ],
        }
    }

    pub fn sg13g2() -> Self {
        Self {
            pdk: "sg13g2".to_string(),
            boundary_layer: "235/4".to_string(),
            hide_layers: vec!["235/4".to_string()],
        }
    }

    /// IHP shuttles are tagged `ttihp*`; everything else is SkyWater.
    pub fn for_shuttle(shuttle_id: &str) -> Self {
        if shuttle_id.starts_with("ttihp") {
            Self::sg13g2()
        } else {
            Self::sky130a()
        }
    }

    /// Layer properties file the viewer loads, relative to the tool's working directory.
    pub fn layer_props(&self) -> String {
        format!("lyp/{}.lyp", self.pdk)
    }

    /// Comma-joined for passing through a single tool argument.
    pub fn hide_layers_arg(&self) -> String {
        self.hide_layers.join(",")
    }
}

impl Default for Technology {
    fn default() -> Self {
        Self::sky130a()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ihp_shuttles_use_sg13g2() {
        assert_eq!(Technology::for_shuttle("ttihp0p2").pdk, "sg13g2");
        assert_eq!(Technology::for_shuttle("tt04").pdk, "sky130A");
    }

    #[test]
    fn test_layer_args() {
        let tech = Technology::sky130a();
        assert_eq!(tech.layer_props(), "lyp/sky130A.lyp");
        assert_eq!(tech.hide_layers_arg(), "areaid.standardc,areaid.lowTapDensity");
    }
}
