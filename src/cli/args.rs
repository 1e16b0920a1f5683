use std::path::PathBuf;
use clap::Parser;
use crate::config::params::RunParameters;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "mga-pipelines", version, about = "JGI-style metagenome assembly pipeline runner")]
pub struct Arguments {

    #[arg(short = 'v', long = "verbose", action)]
    pub verbose: bool,

    #[arg(short = 'r', long = "reads", help = "Reads reference: a stored object (<workspace>/<name>/<version>) or a FASTQ path")]
    pub reads_reference: Option<String>,

    #[arg(short = 'n', long = "output-assembly-name")]
    pub output_assembly_name: Option<String>,

    #[arg(short = 'w', long = "workspace-name")]
    pub workspace_name: Option<String>,

    #[arg(long, default_value_t = false, help = "Run the filtering step with contaminant removal turned off")]
    pub skip_filtering: bool,

    #[arg(long, default_value_t = false, help = "Drop the memory sizing flag passed to bfc")]
    pub debug: bool,

    #[arg(short = 'p', long = "params", help = "JSON file of run parameters; command-line values take precedence")]
    pub params: Option<PathBuf>,

    #[arg(short = 's', long = "scratch-dir", default_value = "scratch")]
    pub scratch_dir: PathBuf,

    #[arg(long = "workspace-root", default_value = "workspace", help = "Directory backing the local object store")]
    pub workspace_root: PathBuf,

    #[arg(long = "tool-dir", help = "Look up every external tool by name in this directory instead of the default install paths")]
    pub tool_dir: Option<PathBuf>,
}

impl Arguments {
    /// Run parameters given on the command line alone.
    pub fn run_parameters(&self) -> RunParameters {
        RunParameters {
            reads_reference: self.reads_reference.clone(),
            output_assembly_name: self.output_assembly_name.clone(),
            workspace_name: self.workspace_name.clone(),
            skip_filtering: self.skip_filtering,
            debug: self.debug,
        }
    }
}
