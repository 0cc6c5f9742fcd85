//! Convert every project on a shuttle to a glTF scene.

use clap::Parser;
use std::process::ExitCode;

use shuttle_renders::cli::{self, CommonArgs};
use shuttle_renders::ArtifactKind;

#[derive(Parser)]
#[command(name = "render_gltf")]
#[command(about = "Convert shuttle project layouts to glTF scenes")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    cli::execute(&cli.common, ArtifactKind::Scene, None)
}
