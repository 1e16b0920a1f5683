/// Functions and structs for building the fixed command lines of each external tool

use std::path::Path;
use log::debug;
use crate::config::defs::{PipelineError, ToolPaths, PREFLIGHT_STEP};


/// Produces the argument vector (program excluded) for one tool invocation.
pub trait ArgGenerator {
    fn generate_args(&self) -> Vec<String>;
}

fn kv(key: &str, value: impl AsRef<Path>) -> String {
    format!("{}={}", key, value.as_ref().display())
}


pub mod readlength {
    use std::path::Path;
    use super::{kv, ArgGenerator};

    pub struct ReadLengthConfig<'a> {
        pub input: &'a Path,
        pub report: &'a Path,
    }

    impl ArgGenerator for ReadLengthConfig<'_> {
        fn generate_args(&self) -> Vec<String> {
            vec![
                kv("in", self.input),
                kv("out", self.report),
                "overwrite=t".to_string(),
            ]
        }
    }
}

pub mod rqcfilter {
    use std::path::Path;
    use super::{kv, ArgGenerator};
    use crate::config::defs::{RQCFILTER_DATA, RQCFILTER_FLAGS, RQCFILTER_HEAVY_FLAGS, RQCFILTER_MEMORY};

    pub struct RqcFilterConfig<'a> {
        pub input: &'a Path,
        pub output_dir: &'a Path,
        pub filtered_reads: &'a Path,
        /// Turns the contaminant removal and analysis passes off; the tool still runs.
        pub skip_filtering: bool,
    }

    impl ArgGenerator for RqcFilterConfig<'_> {
        fn generate_args(&self) -> Vec<String> {
            let mut args_vec: Vec<String> = Vec::new();
            args_vec.push(RQCFILTER_MEMORY.to_string());
            args_vec.push(kv("in", self.input));
            args_vec.push(kv("path", self.output_dir));
            args_vec.push(kv("out", self.filtered_reads));
            args_vec.push(kv("rqcfilterdata", RQCFILTER_DATA));
            args_vec.extend(RQCFILTER_FLAGS.iter().map(|flag| flag.to_string()));

            let heavy = if self.skip_filtering { "f" } else { "t" };
            args_vec.extend(
                RQCFILTER_HEAVY_FLAGS
                    .iter()
                    .map(|flag| format!("{}={}", flag, heavy)),
            );
            args_vec
        }
    }
}

pub mod bfc {
    use std::path::Path;
    use super::ArgGenerator;
    use crate::config::defs::{BFC_KMER, BFC_MEMORY, BFC_THREADS};

    pub struct BfcConfig<'a> {
        pub input: &'a Path,
        /// Drops the `-s` memory sizing flag.
        pub debug: bool,
    }

    impl ArgGenerator for BfcConfig<'_> {
        fn generate_args(&self) -> Vec<String> {
            let mut args_vec: Vec<String> = Vec::new();
            args_vec.push("-1".to_string());
            args_vec.push("-k".to_string());
            args_vec.push(BFC_KMER.to_string());
            args_vec.push("-t".to_string());
            args_vec.push(BFC_THREADS.to_string());
            if !self.debug {
                args_vec.push("-s".to_string());
                args_vec.push(BFC_MEMORY.to_string());
            }
            args_vec.push(self.input.display().to_string());
            args_vec
        }
    }
}

pub mod seqtk {
    use std::path::Path;
    use super::ArgGenerator;

    #[derive(Debug, Clone, Copy, PartialEq)]
    pub enum SeqtkSubcommand {
        /// Drop unpaired reads from interleaved input.
        Dropse,
    }

    pub struct SeqtkConfig<'a> {
        pub subcommand: SeqtkSubcommand,
        pub input: &'a Path,
    }

    impl ArgGenerator for SeqtkConfig<'_> {
        fn generate_args(&self) -> Vec<String> {
            let subcommand = match self.subcommand {
                SeqtkSubcommand::Dropse => "dropse",
            };
            vec![subcommand.to_string(), self.input.display().to_string()]
        }
    }
}

pub mod pigz {
    use super::ArgGenerator;
    use crate::config::defs::{PIGZ_LEVEL, PIGZ_THREADS};

    /// Compresses stdin to stdout.
    pub struct PigzConfig;

    impl ArgGenerator for PigzConfig {
        fn generate_args(&self) -> Vec<String> {
            let mut args_vec: Vec<String> = Vec::new();
            args_vec.push("-c".to_string());
            args_vec.push("-".to_string());
            args_vec.push("-p".to_string());
            args_vec.push(PIGZ_THREADS.to_string());
            args_vec.push(PIGZ_LEVEL.to_string());
            args_vec
        }
    }
}

pub mod spades {
    use std::path::Path;
    use super::ArgGenerator;
    use crate::config::defs::{SPADES_KMERS, SPADES_MEMORY_GB, SPADES_THREADS};

    pub struct SpadesConfig<'a> {
        /// Interleaved paired reads.
        pub reads: &'a Path,
        pub output_dir: &'a Path,
    }

    impl ArgGenerator for SpadesConfig<'_> {
        fn generate_args(&self) -> Vec<String> {
            vec![
                "-m".to_string(),
                SPADES_MEMORY_GB.to_string(),
                "--only-assembler".to_string(),
                "-k".to_string(),
                SPADES_KMERS.to_string(),
                "--meta".to_string(),
                "-t".to_string(),
                SPADES_THREADS.to_string(),
                "--12".to_string(),
                self.reads.display().to_string(),
                "-o".to_string(),
                self.output_dir.display().to_string(),
            ]
        }
    }
}

pub mod fungalrelease {
    use std::path::Path;
    use super::{kv, ArgGenerator};
    use crate::config::defs::{AGP_MEMORY, AGP_MIN_CONTIG, AGP_MIN_SCAFFOLD};

    pub struct AgpConfig<'a> {
        pub scaffolds_in: &'a Path,
        pub scaffolds_out: &'a Path,
        pub contigs_out: &'a Path,
        pub agp_out: &'a Path,
        pub legend_out: &'a Path,
    }

    impl ArgGenerator for AgpConfig<'_> {
        fn generate_args(&self) -> Vec<String> {
            vec![
                AGP_MEMORY.to_string(),
                kv("in", self.scaffolds_in),
                kv("out", self.scaffolds_out),
                kv("outc", self.contigs_out),
                kv("agp", self.agp_out),
                kv("legend", self.legend_out),
                format!("mincontig={}", AGP_MIN_CONTIG),
                format!("minscaf={}", AGP_MIN_SCAFFOLD),
                "sortscaffolds=t".to_string(),
                "sortcontigs=t".to_string(),
                "overwrite=t".to_string(),
            ]
        }
    }
}

pub mod bbstats {
    use std::path::Path;
    use super::{kv, ArgGenerator};

    pub struct StatsConfig<'a> {
        pub input: &'a Path,
        /// bbtools `format=` code; `None` keeps the human-readable default.
        pub format: Option<u8>,
    }

    impl ArgGenerator for StatsConfig<'_> {
        fn generate_args(&self) -> Vec<String> {
            let mut args_vec: Vec<String> = Vec::new();
            if let Some(format) = self.format {
                args_vec.push(format!("format={}", format));
            }
            args_vec.push(kv("in", self.input));
            args_vec
        }
    }
}

pub mod bbmap {
    use std::path::Path;
    use super::{kv, ArgGenerator};
    use crate::config::defs::BBMAP_MEMORY;

    pub struct BbmapConfig<'a> {
        pub reads: &'a Path,
        pub reference: &'a Path,
        pub sam_out: &'a Path,
        pub covstats_out: &'a Path,
    }

    impl ArgGenerator for BbmapConfig<'_> {
        fn generate_args(&self) -> Vec<String> {
            vec![
                BBMAP_MEMORY.to_string(),
                "nodisk=true".to_string(),
                "interleaved=true".to_string(),
                "ambiguous=random".to_string(),
                kv("in", self.reads),
                kv("ref", self.reference),
                kv("out", self.sam_out),
                kv("covstats", self.covstats_out),
            ]
        }
    }
}


/// Checks that a program can be launched: a path must point at a file, a bare
/// name must be on PATH.
pub fn tool_resolves(program: &Path) -> bool {
    if program.components().count() > 1 {
        program.is_file()
    } else {
        which::which(program).is_ok()
    }
}

/// Verifies every configured executable before any step runs.
pub fn check_tools(tools: &ToolPaths) -> Result<(), PipelineError> {
    for (tag, program) in tools.iter() {
        if !tool_resolves(program) {
            return Err(PipelineError::ToolExecution {
                step: PREFLIGHT_STEP.to_string(),
                tool: tag.to_string(),
                reason: format!("executable not found at {}", program.display()),
                stderr: String::new(),
            });
        }
        debug!("Found {} at {}", tag, program.display());
    }
    Ok(())
}
