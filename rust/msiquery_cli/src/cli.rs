use clap::{
    Parser,
    Subcommand,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// More logging, repeat for trace level. `RUST_LOG` takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Args {
    pub fn default_log_level(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (true, _) => "warn",
            (false, 0) => "info",
            (false, 1) => "debug",
            (false, _) => "trace",
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process a dataset and write its mean spectrum, ion images and metadata.
    Process(ProcessArgs),
    /// Print a summary of a dataset.
    Inspect(InspectArgs),
    /// Write a template processing configuration.
    WriteTemplate(WriteTemplateArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct ProcessArgs {
    /// The path to the JSON dataset.
    #[arg(short, long)]
    pub input: PathBuf,

    /// The path to the JSON file with the processing configuration.
    #[arg(short, long)]
    pub config: PathBuf,

    /// The directory the outputs are written to.
    #[arg(short, long)]
    pub output_path: PathBuf,

    /// Give up on the mean spectrum after this many seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Do not draw a progress bar.
    #[arg(long)]
    pub no_progress: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct InspectArgs {
    /// The path to the JSON dataset.
    #[arg(short, long)]
    pub input: PathBuf,
}

#[derive(Parser, Debug)]
pub struct WriteTemplateArgs {
    /// The directory the template is written to.
    #[arg(short, long)]
    pub output_path: PathBuf,
}
