//! Render every project on a shuttle to a PNG.
//!
//! `render <shuttle> [--scale N]` writes `<output>/<shuttle>/<p>/<p>_<N>x.png`.

use clap::Parser;
use std::process::ExitCode;

use shuttle_renders::cli::{self, CommonArgs};
use shuttle_renders::ArtifactKind;

#[derive(Parser)]
#[command(name = "render")]
#[command(about = "Render shuttle project layouts to PNG")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    /// Scale factor for the output image (positive number)
    #[arg(short, long, allow_negative_numbers = true)]
    scale: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    cli::execute(&cli.common, ArtifactKind::Raster, cli.scale.as_deref())
}
