//! Artifact Validation - Rule/Policy Separation
//!
//! Rules inspect a produced file and emit structured violations.
//! Any error-severity violation rejects the artifact.

use serde::{Deserialize, Serialize};

use crate::artifacts::ArtifactKind;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const OASIS_MAGIC: &[u8] = b"%SEMI-OASIS\r\n";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactViolation {
    pub rule: String,
    pub severity: ViolationSeverity,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub violations: Vec<ArtifactViolation>,
    /// Pixel size, for rasters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<[u32; 2]>,
}

impl ValidationResult {
    /// `rule: message; rule: message` for error reporting.
    pub fn summary(&self) -> String {
        self.violations
            .iter()
            .map(|v| format!("{}: {}", v.rule, v.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// A produced file as seen by the rules.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactInput<'a> {
    pub kind: ArtifactKind,
    pub data: &'a [u8],
}

pub trait ArtifactRule {
    fn name(&self) -> &'static str;
    fn applies_to(&self, kind: ArtifactKind) -> bool;
    fn validate(&self, input: &ArtifactInput<'_>) -> Vec<ArtifactViolation>;
}

fn error(rule: &dyn ArtifactRule, message: impl Into<String>) -> Vec<ArtifactViolation> {
    vec![ArtifactViolation {
        rule: rule.name().to_string(),
        severity: ViolationSeverity::Error,
        message: message.into(),
    }]
}

/// Width and height from the IHDR chunk, if the data is a PNG.
pub fn png_dimensions(data: &[u8]) -> Option<[u32; 2]> {
    if data.len() < 24 || data[..8] != PNG_SIGNATURE || &data[12..16] != b"IHDR" {
        return None;
    }
    let width = u32::from_be_bytes([data[16], data[17], data[18], data[19]]);
    let height = u32::from_be_bytes([data[20], data[21], data[22], data[23]]);
    Some([width, height])
}

// --- Concrete Rules ---

pub struct NonEmptyRule;

impl ArtifactRule for NonEmptyRule {
    fn name(&self) -> &'static str { "non_empty" }

    fn applies_to(&self, _kind: ArtifactKind) -> bool { true }

    fn validate(&self, input: &ArtifactInput<'_>) -> Vec<ArtifactViolation> {
        if input.data.is_empty() {
            error(self, "Tool produced an empty file")
        } else {
            vec![]
        }
    }
}

pub struct PngHeaderRule;

impl ArtifactRule for PngHeaderRule {
    fn name(&self) -> &'static str { "png_header" }

    fn applies_to(&self, kind: ArtifactKind) -> bool {
        kind == ArtifactKind::Raster
    }

    fn validate(&self, input: &ArtifactInput<'_>) -> Vec<ArtifactViolation> {
        match png_dimensions(input.data) {
            None => error(self, "Missing PNG signature or IHDR chunk"),
            Some([w, h]) if w == 0 || h == 0 => {
                error(self, format!("Degenerate image size {}x{}", w, h))
            }
            Some(_) => vec![],
        }
    }
}

pub struct GltfAssetRule;

impl ArtifactRule for GltfAssetRule {
    fn name(&self) -> &'static str { "gltf_asset" }

    fn applies_to(&self, kind: ArtifactKind) -> bool {
        kind == ArtifactKind::Scene
    }

    fn validate(&self, input: &ArtifactInput<'_>) -> Vec<ArtifactViolation> {
        let doc: serde_json::Value = match serde_json::from_slice(input.data) {
            Ok(doc) => doc,
            Err(e) => return error(self, format!("Not a JSON glTF document: {}", e)),
        };
        match doc.pointer("/asset/version") {
            Some(serde_json::Value::String(_)) => vec![],
            _ => error(self, "glTF document has no asset.version"),
        }
    }
}

pub struct OasisMagicRule;

impl ArtifactRule for OasisMagicRule {
    fn name(&self) -> &'static str { "oasis_magic" }

    fn applies_to(&self, kind: ArtifactKind) -> bool {
        kind == ArtifactKind::Oasis
    }

    fn validate(&self, input: &ArtifactInput<'_>) -> Vec<ArtifactViolation> {
        if input.data.starts_with(OASIS_MAGIC) {
            vec![]
        } else {
            error(self, "Missing %SEMI-OASIS magic")
        }
    }
}

/// Validator orchestrates the rules for an artifact's kind
pub struct Validator {
    rules: Vec<Box<dyn ArtifactRule>>,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(NonEmptyRule),
                Box::new(PngHeaderRule),
                Box::new(GltfAssetRule),
                Box::new(OasisMagicRule),
            ],
        }
    }

    pub fn validate(&self, input: &ArtifactInput<'_>) -> ValidationResult {
        let mut violations = vec![];

        for rule in self.rules.iter().filter(|r| r.applies_to(input.kind)) {
            violations.extend(rule.validate(input));
        }

        let valid = !violations.iter().any(|v| v.severity == ViolationSeverity::Error);
        let dimensions = match input.kind {
            ArtifactKind::Raster => png_dimensions(input.data),
            _ => None,
        };

        ValidationResult { valid, violations, dimensions }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_header(width: u32, height: u32) -> Vec<u8> {
        let mut data = PNG_SIGNATURE.to_vec();
        data.extend_from_slice(&13u32.to_be_bytes());
        data.extend_from_slice(b"IHDR");
        data.extend_from_slice(&width.to_be_bytes());
        data.extend_from_slice(&height.to_be_bytes());
        data.extend_from_slice(&[8, 6, 0, 0, 0]);
        data
    }

    #[test]
    fn test_png_dimensions_extracted() {
        let data = png_header(640, 480);
        let result = Validator::new().validate(&ArtifactInput {
            kind: ArtifactKind::Raster,
            data: &data,
        });
        assert!(result.valid);
        assert_eq!(result.dimensions, Some([640, 480]));
    }

    #[test]
    fn test_truncated_png_rejected() {
        let result = Validator::new().validate(&ArtifactInput {
            kind: ArtifactKind::Raster,
            data: &PNG_SIGNATURE,
        });
        assert!(!result.valid);
        assert!(result.summary().contains("png_header"));
    }

    #[test]
    fn test_empty_file_rejected_for_every_kind() {
        for kind in [ArtifactKind::Raster, ArtifactKind::Scene, ArtifactKind::Oasis] {
            let result = Validator::new().validate(&ArtifactInput { kind, data: &[] });
            assert!(!result.valid);
            assert!(result.violations.iter().any(|v| v.rule == "non_empty"));
        }
    }

    #[test]
    fn test_gltf_requires_asset_version() {
        let validator = Validator::new();
        let good = br#"{"asset": {"version": "2.0"}, "scenes": []}"#;
        let bad = br#"{"scenes": []}"#;
        assert!(validator.validate(&ArtifactInput { kind: ArtifactKind::Scene, data: good }).valid);
        assert!(!validator.validate(&ArtifactInput { kind: ArtifactKind::Scene, data: bad }).valid);
    }

    #[test]
    fn test_oasis_magic() {
        let validator = Validator::new();
        let good = b"%SEMI-OASIS\r\n\x01\x031.0";
        assert!(validator.validate(&ArtifactInput { kind: ArtifactKind::Oasis, data: good }).valid);
        assert!(!validator.validate(&ArtifactInput { kind: ArtifactKind::Oasis, data: b"GDS" }).valid);
    }
}
