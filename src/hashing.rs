//! Hashing - SHA-256 for Jobs and Artifacts
//!
//! Job hashes identify a render request independent of when it ran;
//! artifact hashes let re-runs be compared byte for byte.

use sha2::{Sha256, Digest};
use serde::Serialize;
use serde_json::{Value, to_string};

use crate::artifacts::{ArtifactKind, Scale};

/// Compute SHA-256 hash of bytes, return hex string
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Convert to canonical JSON (sorted keys, no whitespace)
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let v: Value = serde_json::to_value(value)?;
    to_string(&sort_value(&v))
}

fn sort_value(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut sorted: Vec<_> = map.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                sorted
                    .into_iter()
                    .map(|(k, v)| (k.clone(), sort_value(v)))
                    .collect(),
            )
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_value).collect()),
        _ => v.clone(),
    }
}

#[derive(Serialize)]
struct JobKey<'a, T: Serialize> {
    shuttle: &'a str,
    project: &'a str,
    kind: ArtifactKind,
    scale: Option<f64>,
    tool: &'a T,
    driver_version: &'a str,
}

/// job_hash = sha256(canonical {shuttle, project, kind, scale, tool, driver_version})
///
/// Scale is left out for kinds whose output does not depend on it.
pub fn compute_job_hash<T: Serialize>(
    shuttle: &str,
    project: &str,
    kind: ArtifactKind,
    scale: Scale,
    tool: &T,
    driver_version: &str,
) -> Result<String, serde_json::Error> {
    let key = JobKey {
        shuttle,
        project,
        kind,
        scale: kind.is_scaled().then(|| scale.value()),
        tool,
        driver_version,
    };
    Ok(sha256_hex(canonical_json(&key)?.as_bytes()))
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{:02x}", b)).collect()
    }
}
