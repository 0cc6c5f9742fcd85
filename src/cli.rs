//! Shared entry point for the `render`, `render_gltf` and `convert_oas` binaries.
//!
//! Outputs the run report as JSON on stdout; logs go to stderr.
//! Exit codes: 0 all projects rendered, 1 aborted, 2 some project failed.

use clap::Args;
use std::path::PathBuf;
use std::process::ExitCode;

use crate::artifacts::{ArtifactKind, Scale};
use crate::config::RenderConfig;
use crate::fetch::IndexClient;
use crate::manifest::Shuttle;
use crate::pipeline::{ExternalRenderer, PipelineError, RunReport, ShuttleDriver};

#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Shuttle identifier (e.g. tt04)
    pub shuttle: String,

    /// JSON render configuration
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory holding <shuttle>.json manifests
    #[arg(long)]
    pub manifest_dir: Option<PathBuf>,

    /// Directory holding <shuttle>/<project>.gds layouts
    #[arg(long)]
    pub layout_dir: Option<PathBuf>,

    /// Root directory for generated artifacts
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Download the manifest and any missing layouts from the shuttle index first
    #[arg(long)]
    pub fetch: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl CommonArgs {
    /// Config file (or defaults) with command-line directories applied on top.
    pub fn resolve_config(&self) -> Result<RenderConfig, PipelineError> {
        let mut config = RenderConfig::load(self.config.as_deref())?;
        if let Some(dir) = &self.manifest_dir {
            config.manifest_dir = dir.clone();
        }
        if let Some(dir) = &self.layout_dir {
            config.layout_dir = dir.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        Ok(config)
    }
}

pub fn init_logging(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };
    // A second init (e.g. from tests) is harmless.
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .try_init();
}

/// Load, render, report. `scale` is the raw `--scale` text, if any.
pub fn run(args: &CommonArgs, kind: ArtifactKind, scale: Option<&str>) -> Result<RunReport, PipelineError> {
    let scale = match scale {
        Some(text) => text.parse::<Scale>()?,
        None => Scale::default(),
    };

    let config = args.resolve_config()?;

    let client = if args.fetch {
        let client = IndexClient::new(&config.index_url)?;
        client.fetch_manifest(&config, &args.shuttle)?;
        Some(client)
    } else {
        None
    };

    let shuttle = Shuttle::load(&config, &args.shuttle)?;
    if let Some(client) = &client {
        let summary = client.fetch_layouts(&shuttle)?;
        log::info!(
            "Layouts: {} downloaded, {} cached, {} failed",
            summary.downloaded.len(),
            summary.cached.len(),
            summary.failed.len()
        );
    }

    let backend = ExternalRenderer::new(config.tool_for(kind).clone());
    ShuttleDriver::new(backend, kind)
        .with_scale(scale)
        .with_technology(config.technology_for(&shuttle.id))
        .run(&shuttle)
}

pub fn execute(args: &CommonArgs, kind: ArtifactKind, scale: Option<&str>) -> ExitCode {
    init_logging(args.verbose);

    match run(args, kind, scale) {
        Ok(report) => {
            match serde_json::to_string_pretty(&report) {
                Ok(json) => println!("{}", json),
                Err(e) => log::error!("Failed to serialize report: {}", e),
            }
            ExitCode::from(report.exit_code())
        }
        Err(e) => {
            log::error!("{}", e);
            let output = serde_json::json!({
                "success": false,
                "error": e.to_string(),
            });
            println!("{}", output);
            ExitCode::FAILURE
        }
    }
}
