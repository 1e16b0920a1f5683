use std::collections::HashMap;
use std::path::{Path, PathBuf};
use lazy_static::lazy_static;
use log::debug;
use thiserror::Error;
use crate::utils::file::create_dir_idempotent;

// External software
pub const READLENGTH_TAG: &str = "readlength.sh";
pub const RQCFILTER_TAG: &str = "rqcfilter2.sh";
pub const BFC_TAG: &str = "bfc";
pub const SEQTK_TAG: &str = "seqtk";
pub const PIGZ_TAG: &str = "pigz";
pub const SPADES_TAG: &str = "spades.py";
pub const AGP_TAG: &str = "fungalrelease.sh";
pub const BBSTATS_TAG: &str = "stats.sh";
pub const BBMAP_TAG: &str = "bbmap.sh";

pub const ALL_TOOL_TAGS: &[&str] = &[
    READLENGTH_TAG,
    RQCFILTER_TAG,
    BFC_TAG,
    SEQTK_TAG,
    PIGZ_TAG,
    SPADES_TAG,
    AGP_TAG,
    BBSTATS_TAG,
    BBMAP_TAG,
];

lazy_static! {
    pub static ref DEFAULT_TOOL_PATHS: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert(READLENGTH_TAG, "/kb/module/bbmap/readlength.sh");
        m.insert(RQCFILTER_TAG, "/kb/module/bbmap/rqcfilter2.sh");
        m.insert(BFC_TAG, "/kb/module/bin/bfc");
        m.insert(SEQTK_TAG, "/kb/module/bin/seqtk");
        m.insert(PIGZ_TAG, "pigz");
        m.insert(SPADES_TAG, "/kb/module/bin/spades.py");
        m.insert(AGP_TAG, "/kb/module/bbmap/fungalrelease.sh");
        m.insert(BBSTATS_TAG, "/kb/module/bbmap/stats.sh");
        m.insert(BBMAP_TAG, "/kb/module/bbmap/bbmap.sh");
        m
    };
}

// Step names, also the per-step subdirectory names
pub const FILTERING_STEP: &str = "filtering";
pub const CORRECTION_STEP: &str = "correction";
pub const ASSEMBLY_STEP: &str = "assembly";
pub const SCAFFOLDING_STEP: &str = "scaffolding";
pub const STATS_STEP: &str = "stats";
pub const MAPPING_STEP: &str = "mapping";
pub const READLENGTH_STEP: &str = "readlength";
pub const PREFLIGHT_STEP: &str = "preflight";

pub const RUN_DIR_PREFIX: &str = "jgi_mga_output";

// Static Filenames
pub const FILTERED_READS: &str = "filtered.fastq.gz";
pub const RQCFILTER_LOG: &str = "rqcfilter.log";
pub const BFC_OUTPUT: &str = "bfc_output.fastq";
pub const BFC_LOG: &str = "bfc.log";
pub const CORRECTED_READS: &str = "input.corr.fastq.gz";
pub const SPADES_SUBDIR: &str = "spades";
pub const SPADES_SCAFFOLDS: &str = "scaffolds.fasta";
pub const SPADES_CONTIGS: &str = "contigs.fasta";
pub const SPADES_LOG: &str = "spades.log";
pub const SPADES_WARNINGS: &str = "warnings.log";
pub const SPADES_PARAMS: &str = "params.txt";
pub const AGP_SCAFFOLDS: &str = "assembly.scaffolds.fasta";
pub const AGP_CONTIGS: &str = "assembly.contigs.fasta";
pub const AGP_FILE: &str = "assembly.agp";
pub const AGP_LEGEND: &str = "assembly.scaffolds.legend";
pub const STATS_TSV: &str = "assembly.scaffolds.fasta.stats.tsv";
pub const STATS_TXT: &str = "assembly.scaffolds.fasta.stats.txt";
pub const STATS_STDERR: &str = "stderr.out";
pub const BBMAP_SAM: &str = "pairedMapped.sam.gz";
pub const BBMAP_COVSTATS: &str = "covstats.txt";
pub const BBMAP_STATS: &str = "bbmap_stats.txt";
pub const READLENGTH_SUFFIX: &str = "readlen.txt";

// Static Parameters
pub const RQCFILTER_MEMORY: &str = "-Xmx60g";
pub const RQCFILTER_DATA: &str = "/data/RQCFilterData";
pub const RQCFILTER_FLAGS: &[&str] = &[
    "rna=f",
    "trimfragadapter=t",
    "qtrim=r",
    "trimq=0",
    "maxns=3",
    "maq=3",
    "minlen=51",
    "mlf=0.33",
    "kapa=t",
    "trimpolyg=5",
    "barcodefilter=f",
    "usejni=f",
];
// Contaminant removal and analysis passes turned off by skip_filtering
pub const RQCFILTER_HEAVY_FLAGS: &[&str] = &[
    "phix",
    "removehuman",
    "removedog",
    "removecat",
    "removemouse",
    "removemicrobes",
    "khist",
    "sketch",
    "clumpify",
];

pub const BFC_KMER: usize = 21;
pub const BFC_THREADS: usize = 10;
pub const BFC_MEMORY: &str = "10g";

pub const PIGZ_THREADS: usize = 4;
pub const PIGZ_LEVEL: &str = "-2";

pub const SPADES_MEMORY_GB: usize = 2000;
pub const SPADES_KMERS: &str = "33,55,77,99,127";
pub const SPADES_THREADS: usize = 32;

pub const AGP_MEMORY: &str = "-Xmx40g";
pub const AGP_MIN_CONTIG: usize = 200;
pub const AGP_MIN_SCAFFOLD: usize = 200;

pub const BBSTATS_TSV_FORMAT: u8 = 6;

pub const BBMAP_MEMORY: &str = "-Xmx24g";

// Largest fixed -Xmx ceiling among the tools
pub const MAX_TOOL_MEMORY_GB: u64 = 60;

pub const ASSEMBLY_DESCRIPTION: &str = "Assembled with the JGI metagenome pipeline.";


#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Errors found in run parameters: {}", .0.join(" "))]
    Validation(Vec<String>),

    #[error("{step} step failed running {tool}: {reason}")]
    ToolExecution {
        step: String,
        tool: String,
        reason: String,
        stderr: String,
    },

    #[error("{step} step is missing required input {}", .path.display())]
    MissingInput {
        step: String,
        path: PathBuf,
    },

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Workspace gateway error: {0}")]
    Gateway(String),

    #[error("Report error: {0}")]
    Report(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io { path: path.into(), source }
    }

    /// Captured stderr tail for tool failures, if any was collected.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            PipelineError::ToolExecution { stderr, .. } if !stderr.is_empty() => Some(stderr),
            _ => None,
        }
    }
}


/// Executable locations for every external tool the pipeline calls.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolPaths {
    pub readlength: PathBuf,
    pub rqcfilter: PathBuf,
    pub bfc: PathBuf,
    pub seqtk: PathBuf,
    pub pigz: PathBuf,
    pub spades: PathBuf,
    pub agp: PathBuf,
    pub bbstats: PathBuf,
    pub bbmap: PathBuf,
}

fn default_tool_path(tag: &str) -> PathBuf {
    DEFAULT_TOOL_PATHS
        .get(tag)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(tag))
}

impl Default for ToolPaths {
    fn default() -> Self {
        ToolPaths {
            readlength: default_tool_path(READLENGTH_TAG),
            rqcfilter: default_tool_path(RQCFILTER_TAG),
            bfc: default_tool_path(BFC_TAG),
            seqtk: default_tool_path(SEQTK_TAG),
            pigz: default_tool_path(PIGZ_TAG),
            spades: default_tool_path(SPADES_TAG),
            agp: default_tool_path(AGP_TAG),
            bbstats: default_tool_path(BBSTATS_TAG),
            bbmap: default_tool_path(BBMAP_TAG),
        }
    }
}

impl ToolPaths {
    /// All tools resolved by their default file names inside `dir`. A relative
    /// `dir` is taken against the current directory.
    pub fn from_dir(dir: &Path) -> Self {
        let dir = std::path::absolute(dir).unwrap_or_else(|_| dir.to_path_buf());
        let in_dir = |tag: &str| {
            let default = default_tool_path(tag);
            match default.file_name() {
                Some(name) => dir.join(name),
                None => dir.join(tag),
            }
        };
        ToolPaths {
            readlength: in_dir(READLENGTH_TAG),
            rqcfilter: in_dir(RQCFILTER_TAG),
            bfc: in_dir(BFC_TAG),
            seqtk: in_dir(SEQTK_TAG),
            pigz: in_dir(PIGZ_TAG),
            spades: in_dir(SPADES_TAG),
            agp: in_dir(AGP_TAG),
            bbstats: in_dir(BBSTATS_TAG),
            bbmap: in_dir(BBMAP_TAG),
        }
    }

    pub fn get(&self, tag: &str) -> Option<&Path> {
        let path = match tag {
            READLENGTH_TAG => &self.readlength,
            RQCFILTER_TAG => &self.rqcfilter,
            BFC_TAG => &self.bfc,
            SEQTK_TAG => &self.seqtk,
            PIGZ_TAG => &self.pigz,
            SPADES_TAG => &self.spades,
            AGP_TAG => &self.agp,
            BBSTATS_TAG => &self.bbstats,
            BBMAP_TAG => &self.bbmap,
            _ => return None,
        };
        Some(path.as_path())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Path)> {
        ALL_TOOL_TAGS
            .iter()
            .filter_map(move |tag| self.get(tag).map(|path| (*tag, path)))
    }
}


/// Per-run toggles that reach into individual steps.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepOptions {
    pub skip_filtering: bool,
    pub debug: bool,
}


/// Everything a run needs that is fixed at start: its timestamp-keyed output
/// directory and where the tools live. Created once, passed to every step.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub timestamp_ms: i64,
    pub scratch_dir: PathBuf,
    pub out_dir: PathBuf,
    pub tools: ToolPaths,
}

impl RunContext {
    pub fn new(scratch_dir: impl Into<PathBuf>, tools: ToolPaths) -> Result<Self, PipelineError> {
        Self::with_timestamp(scratch_dir, tools, chrono::Utc::now().timestamp_millis())
    }

    pub fn with_timestamp(
        scratch_dir: impl Into<PathBuf>,
        tools: ToolPaths,
        timestamp_ms: i64,
    ) -> Result<Self, PipelineError> {
        // Tools run with their step dir as cwd, so every path handed to them is absolute
        let scratch_dir = scratch_dir.into();
        let scratch_dir = std::path::absolute(&scratch_dir).map_err(|e| PipelineError::io(&scratch_dir, e))?;
        let out_dir = scratch_dir.join(format!("{}_{}", RUN_DIR_PREFIX, timestamp_ms));
        create_dir_idempotent(&out_dir)?;
        debug!("Run directory is {}", out_dir.display());
        Ok(RunContext {
            timestamp_ms,
            scratch_dir,
            out_dir,
            tools,
        })
    }

    pub fn step_dir(&self, step: &str) -> PathBuf {
        self.out_dir.join(step)
    }
}
