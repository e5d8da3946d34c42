use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "soundgrade",
    version,
    about = "Grade a degraded audio file against a reference with the ViSQOL perceptual-quality model",
    subcommand_negates_reqs = true
)]
pub struct Cli {
    /// Clean reference audio file used as ground truth.
    #[arg(value_name = "REFERENCE_FILE", required = true)]
    pub reference_file: Option<PathBuf>,

    /// Degraded audio file being evaluated against the reference.
    #[arg(value_name = "DEGRADED_FILE", required = true)]
    pub degraded_file: Option<PathBuf>,

    /// ViSQOL binary to run: a name looked up on PATH, or a path.
    #[arg(long, global = true, value_name = "PATH")]
    pub tool: Option<String>,

    /// Similarity-to-quality model file passed to the tool.
    ///
    /// Defaults to `libsvm_nu_svr_model.txt` next to the tool binary.
    #[arg(long, global = true, value_name = "PATH")]
    pub model: Option<PathBuf>,

    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Print the command line that would run, without spawning the tool.
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the resolved tool, model, and config paths.
    Doctor,
}
