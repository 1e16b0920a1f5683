use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use log::info;
use serde::Serialize;
use crate::config::defs::{
    PipelineError, RunContext, StepOptions, AGP_CONTIGS, AGP_FILE, AGP_LEGEND, AGP_SCAFFOLDS,
    AGP_TAG, ASSEMBLY_DESCRIPTION, ASSEMBLY_STEP, BBMAP_COVSTATS, BBMAP_SAM, BBMAP_STATS,
    BBMAP_TAG, BBSTATS_TAG, BBSTATS_TSV_FORMAT, BFC_LOG, BFC_OUTPUT, BFC_TAG, CORRECTED_READS,
    CORRECTION_STEP, FILTERED_READS, FILTERING_STEP, MAPPING_STEP, PIGZ_TAG, READLENGTH_SUFFIX,
    RQCFILTER_LOG, RQCFILTER_TAG, SCAFFOLDING_STEP, SEQTK_TAG, SPADES_CONTIGS, SPADES_LOG,
    SPADES_PARAMS, SPADES_SCAFFOLDS, SPADES_SUBDIR, SPADES_TAG, SPADES_WARNINGS, STATS_STDERR,
    STATS_STEP, STATS_TSV, STATS_TXT,
};
use crate::config::params::RunParameters;
use crate::gateway::{LinkedObject, ReportBuilder, WorkspaceGateway};
use crate::utils::command::bbmap::BbmapConfig;
use crate::utils::command::bbstats::StatsConfig;
use crate::utils::command::bfc::BfcConfig;
use crate::utils::command::fungalrelease::AgpConfig;
use crate::utils::command::pigz::PigzConfig;
use crate::utils::command::rqcfilter::RqcFilterConfig;
use crate::utils::command::seqtk::{SeqtkConfig, SeqtkSubcommand};
use crate::utils::command::spades::SpadesConfig;
use crate::utils::command::{check_tools, ArgGenerator};
use crate::utils::file::{
    create_dir_idempotent, existing_file, file_path_manipulator, require_inputs, require_outputs,
};
use crate::utils::readlength::{measure, ReadLengthSummary, ReadsInfo};
use crate::utils::streams::{pipe_tools, run_tool, ToolCommand};


#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterOutput {
    pub filtered_reads: PathBuf,
    pub run_log: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrectionOutput {
    pub unzipped: PathBuf,
    pub zipped: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpadesOutput {
    pub output_dir: PathBuf,
    pub scaffolds: PathBuf,
    pub contigs: Option<PathBuf>,
    pub log: Option<PathBuf>,
    pub warnings: Option<PathBuf>,
    pub params: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgpOutput {
    pub scaffolds: PathBuf,
    pub contigs: PathBuf,
    pub agp: PathBuf,
    pub legend: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsOutput {
    pub stats_tsv: PathBuf,
    pub stats_txt: PathBuf,
    pub stderr_log: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappingOutput {
    pub map_file: PathBuf,
    pub coverage: PathBuf,
    pub stats: PathBuf,
}

/// Everything a completed run produced, flattened for reporting and upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssemblyOutputs {
    pub scaffolds: PathBuf,
    pub contigs: PathBuf,
    pub agp: PathBuf,
    pub legend: PathBuf,
    pub mapping: PathBuf,
    pub bbmap_coverage: PathBuf,
    pub bbmap_stats: PathBuf,
    pub assembly_stats: PathBuf,
    pub assembly_tsv: PathBuf,
    pub rqcfilter_log: PathBuf,
    pub spades_log: Option<PathBuf>,
    pub spades_warnings: Option<PathBuf>,
    pub spades_params: Option<PathBuf>,
    pub reads_info: ReadsInfo,
}

impl AssemblyOutputs {
    /// Files attached to the report, keyed by their report labels.
    pub fn stats_files(&self) -> BTreeMap<String, PathBuf> {
        BTreeMap::from([
            ("bbmap_stats".to_string(), self.bbmap_stats.clone()),
            ("covstats".to_string(), self.bbmap_coverage.clone()),
            ("assembly_stats".to_string(), self.assembly_stats.clone()),
            ("assembly_tsv".to_string(), self.assembly_tsv.clone()),
            ("rqcfilter_log".to_string(), self.rqcfilter_log.clone()),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineResult {
    pub report_name: String,
    pub report_reference: String,
    pub assembly_reference: String,
}


fn prepare_step_dir(ctx: &RunContext, step: &str) -> Result<PathBuf, PipelineError> {
    let dir = ctx.step_dir(step);
    create_dir_idempotent(&dir)?;
    Ok(dir)
}


/// Measures reads at a named checkpoint, writing `<checkpoint>_readlen.txt`
/// into the run directory.
async fn readlength_checkpoint(
    ctx: &RunContext,
    checkpoint: &str,
    fastq: &Path,
) -> Result<ReadLengthSummary, PipelineError> {
    let report = file_path_manipulator(
        Path::new(checkpoint),
        Some(&ctx.out_dir),
        None,
        Some(READLENGTH_SUFFIX),
        "_",
    );
    measure(ctx, fastq, &report).await
}


/// Quality filtering and contaminant removal with RQCFilter. With
/// `skip_filtering` the tool still runs, but with its heavy passes turned off.
///
/// # Arguments
///
/// * `ctx` - RunContext of this run.
/// * `reads` - Input reads.
/// * `options` - Step toggles.
///
/// # Returns
/// FilterOutput with the filtered reads and the tool's log
pub async fn rqc_filter(
    ctx: &RunContext,
    reads: &Path,
    options: &StepOptions,
) -> Result<FilterOutput, PipelineError> {
    let dir = prepare_step_dir(ctx, FILTERING_STEP)?;
    require_inputs(FILTERING_STEP, &[reads])?;

    let filtered_reads = dir.join(FILTERED_READS);
    let run_log = dir.join(RQCFILTER_LOG);
    let args = RqcFilterConfig {
        input: reads,
        output_dir: &dir,
        filtered_reads: &filtered_reads,
        skip_filtering: options.skip_filtering,
    }
    .generate_args();

    if options.skip_filtering {
        info!("Filtering with contaminant removal disabled");
    }
    let cmd = ToolCommand::new(RQCFILTER_TAG, &ctx.tools.rqcfilter, args).stderr_to(&run_log);
    run_tool(FILTERING_STEP, &cmd, &dir).await?;
    require_outputs(FILTERING_STEP, RQCFILTER_TAG, &[&filtered_reads])?;

    Ok(FilterOutput { filtered_reads, run_log })
}


/// k-mer error correction with bfc, then `seqtk dropse | pigz` to drop orphaned
/// mates and compress.
pub async fn bfc_seqtk(
    ctx: &RunContext,
    filtered: &FilterOutput,
    options: &StepOptions,
) -> Result<CorrectionOutput, PipelineError> {
    let dir = prepare_step_dir(ctx, CORRECTION_STEP)?;
    require_inputs(CORRECTION_STEP, &[&filtered.filtered_reads])?;

    let unzipped = dir.join(BFC_OUTPUT);
    let zipped = dir.join(CORRECTED_READS);

    let bfc_args = BfcConfig {
        input: &filtered.filtered_reads,
        debug: options.debug,
    }
    .generate_args();
    let bfc_cmd = ToolCommand::new(BFC_TAG, &ctx.tools.bfc, bfc_args)
        .stdout_to(&unzipped)
        .stderr_to(dir.join(BFC_LOG));
    run_tool(CORRECTION_STEP, &bfc_cmd, &dir).await?;
    require_outputs(CORRECTION_STEP, BFC_TAG, &[&unzipped])?;

    let seqtk_args = SeqtkConfig {
        subcommand: SeqtkSubcommand::Dropse,
        input: &unzipped,
    }
    .generate_args();
    let seqtk_cmd = ToolCommand::new(SEQTK_TAG, &ctx.tools.seqtk, seqtk_args);
    let pigz_cmd = ToolCommand::new(PIGZ_TAG, &ctx.tools.pigz, PigzConfig.generate_args())
        .stdout_to(&zipped);
    pipe_tools(CORRECTION_STEP, &seqtk_cmd, &pigz_cmd, &dir).await?;
    require_outputs(CORRECTION_STEP, PIGZ_TAG, &[&zipped])?;

    Ok(CorrectionOutput { unzipped, zipped })
}


/// metaSPAdes assembly of the corrected, interleaved reads.
pub async fn spades_assemble(
    ctx: &RunContext,
    corrected: &CorrectionOutput,
) -> Result<SpadesOutput, PipelineError> {
    let dir = prepare_step_dir(ctx, ASSEMBLY_STEP)?;
    require_inputs(ASSEMBLY_STEP, &[&corrected.zipped])?;

    let output_dir = dir.join(SPADES_SUBDIR);
    let args = SpadesConfig {
        reads: &corrected.zipped,
        output_dir: &output_dir,
    }
    .generate_args();
    let cmd = ToolCommand::new(SPADES_TAG, &ctx.tools.spades, args);
    run_tool(ASSEMBLY_STEP, &cmd, &dir).await?;

    // An empty assembly exits 0 with no scaffolds
    let scaffolds = output_dir.join(SPADES_SCAFFOLDS);
    require_outputs(ASSEMBLY_STEP, SPADES_TAG, &[&scaffolds])?;

    Ok(SpadesOutput {
        contigs: existing_file(output_dir.join(SPADES_CONTIGS)),
        log: existing_file(output_dir.join(SPADES_LOG)),
        warnings: existing_file(output_dir.join(SPADES_WARNINGS)),
        params: existing_file(output_dir.join(SPADES_PARAMS)),
        scaffolds,
        output_dir,
    })
}


/// Sorts and renames scaffolds, splits them into contigs and writes the AGP
/// file with fungalrelease.
pub async fn create_agp_file(ctx: &RunContext, spades: &SpadesOutput) -> Result<AgpOutput, PipelineError> {
    let dir = prepare_step_dir(ctx, SCAFFOLDING_STEP)?;
    require_inputs(SCAFFOLDING_STEP, &[&spades.scaffolds])?;

    let output = AgpOutput {
        scaffolds: dir.join(AGP_SCAFFOLDS),
        contigs: dir.join(AGP_CONTIGS),
        agp: dir.join(AGP_FILE),
        legend: dir.join(AGP_LEGEND),
    };
    let args = AgpConfig {
        scaffolds_in: &spades.scaffolds,
        scaffolds_out: &output.scaffolds,
        contigs_out: &output.contigs,
        agp_out: &output.agp,
        legend_out: &output.legend,
    }
    .generate_args();
    let cmd = ToolCommand::new(AGP_TAG, &ctx.tools.agp, args);
    run_tool(SCAFFOLDING_STEP, &cmd, &dir).await?;
    require_outputs(
        SCAFFOLDING_STEP,
        AGP_TAG,
        &[&output.scaffolds, &output.contigs, &output.agp, &output.legend],
    )?;

    Ok(output)
}


/// Assembly statistics with bbtools stats.sh: once as TSV, once human-readable.
pub async fn assembly_stats(ctx: &RunContext, scaffolds: &Path) -> Result<StatsOutput, PipelineError> {
    let dir = prepare_step_dir(ctx, STATS_STEP)?;
    require_inputs(STATS_STEP, &[scaffolds])?;

    let output = StatsOutput {
        stats_tsv: dir.join(STATS_TSV),
        stats_txt: dir.join(STATS_TXT),
        stderr_log: dir.join(STATS_STDERR),
    };

    let tsv_args = StatsConfig {
        input: scaffolds,
        format: Some(BBSTATS_TSV_FORMAT),
    }
    .generate_args();
    let tsv_cmd = ToolCommand::new(BBSTATS_TAG, &ctx.tools.bbstats, tsv_args)
        .stdout_to(&output.stats_tsv)
        .stderr_to(&output.stderr_log);
    run_tool(STATS_STEP, &tsv_cmd, &dir).await?;

    let txt_args = StatsConfig { input: scaffolds, format: None }.generate_args();
    let txt_cmd = ToolCommand::new(BBSTATS_TAG, &ctx.tools.bbstats, txt_args)
        .stdout_to(&output.stats_txt)
        .stderr_append(&output.stderr_log);
    run_tool(STATS_STEP, &txt_cmd, &dir).await?;

    require_outputs(STATS_STEP, BBSTATS_TAG, &[&output.stats_tsv, &output.stats_txt])?;
    Ok(output)
}


/// Maps the corrected reads back onto the contigs with bbmap for coverage.
pub async fn bbmap_coverage(
    ctx: &RunContext,
    corrected_reads: &Path,
    contigs: &Path,
) -> Result<MappingOutput, PipelineError> {
    let dir = prepare_step_dir(ctx, MAPPING_STEP)?;
    require_inputs(MAPPING_STEP, &[corrected_reads, contigs])?;

    let output = MappingOutput {
        map_file: dir.join(BBMAP_SAM),
        coverage: dir.join(BBMAP_COVSTATS),
        stats: dir.join(BBMAP_STATS),
    };
    let args = BbmapConfig {
        reads: corrected_reads,
        reference: contigs,
        sam_out: &output.map_file,
        covstats_out: &output.coverage,
    }
    .generate_args();
    let cmd = ToolCommand::new(BBMAP_TAG, &ctx.tools.bbmap, args).stderr_to(&output.stats);
    run_tool(MAPPING_STEP, &cmd, &dir).await?;
    require_outputs(MAPPING_STEP, BBMAP_TAG, &[&output.map_file, &output.coverage])?;

    Ok(output)
}


/// Runs every step in order on one local reads file.
///
/// # Arguments
///
/// * `ctx` - RunContext of this run.
/// * `reads` - Local path of the input reads.
/// * `options` - Step toggles.
///
/// # Returns
/// AssemblyOutputs aggregating every step's files
pub async fn run_assembly_pipeline(
    ctx: &RunContext,
    reads: &Path,
    options: &StepOptions,
) -> Result<AssemblyOutputs, PipelineError> {
    let pre_filter = readlength_checkpoint(ctx, "pre_filter", reads).await?;

    let filtered = rqc_filter(ctx, reads, options).await?;
    let filtered_info = readlength_checkpoint(ctx, "filtered", &filtered.filtered_reads).await?;

    let corrected = bfc_seqtk(ctx, &filtered, options).await?;
    let corrected_info = readlength_checkpoint(ctx, "corrected", &corrected.unzipped).await?;

    let spades = spades_assemble(ctx, &corrected).await?;
    let agp = create_agp_file(ctx, &spades).await?;
    let stats = assembly_stats(ctx, &agp.scaffolds).await?;
    let mapping = bbmap_coverage(ctx, &corrected.zipped, &agp.contigs).await?;

    Ok(AssemblyOutputs {
        scaffolds: agp.scaffolds,
        contigs: agp.contigs,
        agp: agp.agp,
        legend: agp.legend,
        mapping: mapping.map_file,
        bbmap_coverage: mapping.coverage,
        bbmap_stats: mapping.stats,
        assembly_stats: stats.stats_txt,
        assembly_tsv: stats.stats_tsv,
        rqcfilter_log: filtered.run_log,
        spades_log: spades.log,
        spades_warnings: spades.warnings,
        spades_params: spades.params,
        reads_info: ReadsInfo {
            pre_filter,
            filtered: filtered_info,
            corrected: corrected_info,
        },
    })
}


/// Validates parameters, runs the pipeline, and stores the assembly and its
/// report. Nothing is stored unless every step succeeded.
pub struct AssemblyPipeline<G, R> {
    ctx: RunContext,
    gateway: G,
    reporter: R,
}

impl<G: WorkspaceGateway, R: ReportBuilder> AssemblyPipeline<G, R> {
    pub fn new(ctx: RunContext, gateway: G, reporter: R) -> Self {
        AssemblyPipeline { ctx, gateway, reporter }
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub async fn run(&self, params: &RunParameters) -> Result<PipelineResult, PipelineError> {
        let params = params.validate()?;
        check_tools(&self.ctx.tools)?;

        let references = vec![params.reads_reference.clone()];
        let files = self.gateway.fetch_reads(&references).await?;
        let reads = files.get(&params.reads_reference).ok_or_else(|| {
            PipelineError::Gateway(format!("No reads file returned for {}", params.reads_reference))
        })?;

        let output = run_assembly_pipeline(&self.ctx, reads, &params.options).await?;
        info!("Assembly pipeline finished; contigs at {}", output.contigs.display());

        let assembly_reference = self
            .gateway
            .upload_assembly(&output.contigs, &params.workspace_name, &params.output_assembly_name)
            .await?;

        let linked = vec![LinkedObject {
            reference: assembly_reference.clone(),
            description: ASSEMBLY_DESCRIPTION.to_string(),
        }];
        let report = self
            .reporter
            .make_report(&output.stats_files(), &output.reads_info, &params.workspace_name, &linked)
            .await?;

        Ok(PipelineResult {
            report_name: report.report_name,
            report_reference: report.report_reference,
            assembly_reference,
        })
    }
}
