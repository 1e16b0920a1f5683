use std::env;
use std::io::Write;
use std::time::Instant;

use anyhow::Result;
use log::{LevelFilter, debug, error, info};
use env_logger::Builder;

use mga_pipelines::cli::{self, Arguments};
use mga_pipelines::config::defs::{PipelineError, RunContext, ToolPaths};
use mga_pipelines::config::params::RunParameters;
use mga_pipelines::gateway::{LocalReportBuilder, LocalWorkspace};
use mga_pipelines::pipelines::metagenome_assembly::{AssemblyPipeline, PipelineResult};
use mga_pipelines::utils::system::report_resources;


#[tokio::main]
async fn main() -> Result<()> {
    let run_start = Instant::now();

    let args = cli::parse();

    let log_level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::new()
        .filter_level(log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();

    eprintln!("\n-------------\n MGA Pipelines\n-------------\n");

    let dir = env::current_dir()?;
    info!("The current directory is {:?}", dir);
    report_resources();

    match run(&args).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            info!("Run complete: {} milliseconds.", run_start.elapsed().as_millis());
            Ok(())
        }
        Err(e) => {
            error!("Pipeline failed: {} at {} milliseconds.", e, run_start.elapsed().as_millis());
            if let PipelineError::Validation(messages) = &e {
                for message in messages {
                    error!("  {}", message);
                }
            }
            if let Some(stderr) = e.stderr() {
                error!("Last tool output:\n{}", stderr);
            }
            std::process::exit(1);
        }
    }
}


async fn run(args: &Arguments) -> Result<PipelineResult, PipelineError> {
    let params = match &args.params {
        Some(path) => RunParameters::from_json_file(path)?.merge(args.run_parameters()),
        None => args.run_parameters(),
    };

    let tools = match &args.tool_dir {
        Some(tool_dir) => ToolPaths::from_dir(tool_dir),
        None => ToolPaths::default(),
    };
    debug!("Tool paths: {:?}", tools);

    let ctx = RunContext::new(&args.scratch_dir, tools)?;
    info!("Run directory is {}", ctx.out_dir.display());

    let store = LocalWorkspace::new(&args.workspace_root);
    let reporter = LocalReportBuilder::new(store.clone());
    let pipeline = AssemblyPipeline::new(ctx, store, reporter);
    pipeline.run(&params).await
}
