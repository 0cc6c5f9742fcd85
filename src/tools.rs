//! External Tools
//!
//! The layout viewer and mesh converter are opaque programs. A `ToolSpec`
//! describes how to launch one: program, argument templates, and what must
//! be present before the first project is attempted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use crate::pipeline::PipelineError;

/// Bytes of stderr kept for the log line of a failed run.
const STDERR_TAIL_BYTES: usize = 2048;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpec {
    pub program: String,
    /// Argument templates; `{name}` is replaced from the job's substitutions
    #[serde(default)]
    pub args: Vec<String>,
    /// Files or directories that must exist (e.g. a pinned submodule checkout)
    #[serde(default)]
    pub requires: Vec<PathBuf>,
    /// Arguments for a no-op invocation (e.g. `--version`) that proves the program runs
    #[serde(default)]
    pub version_args: Option<Vec<String>>,
    /// Lowest accepted version reported by `version_args`
    #[serde(default)]
    pub min_version: Option<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

/// Placeholder values for one invocation.
#[derive(Debug, Clone, Default)]
pub struct Substitutions {
    values: BTreeMap<&'static str, String>,
}

impl Substitutions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.values.insert(key, value.into());
        self
    }

    /// Replace every known `{key}`; unknown placeholders pass through untouched.
    pub fn expand(&self, template: &str) -> String {
        let mut out = template.to_string();
        for (key, value) in &self.values {
            out = out.replace(&format!("{{{}}}", key), value);
        }
        out
    }
}

/// Result of one completed tool process.
#[derive(Debug)]
pub struct ToolRun {
    pub status: ExitStatus,
    pub stderr_tail: String,
}

impl ToolSpec {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            requires: vec![],
            version_args: None,
            min_version: None,
            working_dir: None,
        }
    }

    /// Default layout viewer invocation (KLayout in batch mode).
    pub fn default_raster() -> Self {
        let mut spec = Self::new(
            "klayout",
            &[
                "-zz",
                "-r", "scripts/render_gds.py",
                "-rd", "gds={input}",
                "-rd", "png={output}",
                "-rd", "scale={scale}",
                "-rd", "pdk={pdk}",
                "-rd", "boundary={boundary}",
                "-rd", "hide_layers={hide_layers}",
                "-rd", "lyp={layer_props}",
            ],
        );
        spec.requires = vec![PathBuf::from("scripts/render_gds.py")];
        spec
    }

    /// Default mesh converter: a wrapper around the pinned GDS2glTF checkout.
    pub fn default_scene() -> Self {
        let mut spec = Self::new(
            "python3",
            &["scripts/gds2gltf.py", "{input}", "{output}", "{pdk}"],
        );
        spec.requires = vec![
            PathBuf::from("scripts/gds2gltf.py"),
            PathBuf::from("GDS2glTF/gds2gltf.py"),
        ];
        spec
    }

    pub fn default_oasis() -> Self {
        let mut spec = Self::new(
            "klayout",
            &["-zz", "-r", "scripts/gds_to_oas.py", "-rd", "gds={input}", "-rd", "oas={output}"],
        );
        spec.requires = vec![PathBuf::from("scripts/gds_to_oas.py")];
        spec
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.working_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null());
        cmd
    }

    /// Fail fast before any project is processed.
    pub fn ensure_available(&self) -> Result<(), PipelineError> {
        for required in &self.requires {
            let path = self.resolve(required);
            if !path.exists() {
                return Err(PipelineError::DependencyMissing(format!(
                    "{} requires {}, which does not exist",
                    self.program,
                    path.display()
                )));
            }
        }

        let Some(version_args) = &self.version_args else {
            return Ok(());
        };

        let output = self.command().args(version_args).output().map_err(|e| {
            PipelineError::DependencyMissing(format!("{} could not be started: {}", self.program, e))
        })?;
        if !output.status.success() {
            return Err(PipelineError::DependencyMissing(format!(
                "{} version check exited with {}",
                self.program, output.status
            )));
        }

        if let Some(min) = &self.min_version {
            let min_ver = semver::Version::parse(min).map_err(|_| {
                PipelineError::InvalidArgument(format!("invalid minimum version '{}'", min))
            })?;
            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            text.push(' ');
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            let found = find_version(&text).ok_or_else(|| {
                PipelineError::DependencyMissing(format!(
                    "{} did not report a version",
                    self.program
                ))
            })?;
            if found < min_ver {
                return Err(PipelineError::DependencyMissing(format!(
                    "{} {} is older than required {}",
                    self.program, found, min_ver
                )));
            }
        }

        Ok(())
    }

    /// Spawn once and wait. Spawn errors are returned as io errors.
    pub fn run(&self, substitutions: &Substitutions) -> std::io::Result<ToolRun> {
        let args: Vec<String> = self.args.iter().map(|a| substitutions.expand(a)).collect();
        log::debug!("Running {} {}", self.program, args.join(" "));

        let output = self.command().args(&args).output()?;
        Ok(ToolRun {
            status: output.status,
            stderr_tail: tail(&output.stderr, STDERR_TAIL_BYTES),
        })
    }
}

/// First whitespace-separated token that parses as semver (`v` prefix allowed).
fn find_version(text: &str) -> Option<semver::Version> {
    text.split_whitespace()
        .map(|token| token.trim_start_matches('v').trim_end_matches(|c: char| !c.is_ascii_alphanumeric()))
        .find_map(|token| semver::Version::parse(token).ok())
}

fn tail(bytes: &[u8], limit: usize) -> String {
    let start = bytes.len().saturating_sub(limit);
    String::from_utf8_lossy(&bytes[start..]).trim().to_string()
}
