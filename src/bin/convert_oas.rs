use clap::Parser;
use std::process::ExitCode;

use shuttle_renders::cli::{self, CommonArgs};
use shuttle_renders::ArtifactKind;

#[derive(Parser)]
#[command(name = "convert_oas")]
#[command(about = "Convert shuttle project layouts from GDS to OASIS")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    cli::execute(&cli.common, ArtifactKind::Oasis, None)
}
