//! Shuttle Renders - layout render driver
//!
//! Maps a shuttle's project manifest to render artifacts produced by
//! external tools (layout viewer, mesh converter).
//!
//! # Guarantees
//! 1. Output paths are a pure function of (shuttle, project, kind, scale)
//! 2. Projects run sequentially, in manifest order, exactly once
//! 3. One project's failure never blocks the others
//! 4. Artifacts are written whole or not at all

pub mod artifacts;
pub mod cli;
pub mod config;
pub mod fetch;
pub mod hashing;
pub mod manifest;
pub mod pipeline;
pub mod technology;
pub mod tools;
pub mod validation;

pub use artifacts::{artifact_path, ArtifactKind, Scale};
pub use config::RenderConfig;
pub use fetch::{FetchSummary, IndexClient};
pub use hashing::{canonical_json, compute_job_hash, sha256_hex};
pub use manifest::{ProjectDescriptor, Shuttle};
pub use pipeline::{
    ExternalRenderer, PipelineError, ProjectOutcome, RenderBackend, RenderJob, RunReport,
    ShuttleDriver,
};
pub use technology::Technology;
pub use tools::ToolSpec;

pub const DRIVER_VERSION: &str = env!("CARGO_PKG_VERSION");
