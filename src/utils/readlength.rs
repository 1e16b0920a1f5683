/// Read-length measurement: runs bbtools readlength.sh on a FASTQ and parses its summary header.
use std::fs;
use std::path::{Path, PathBuf};
use log::info;
use serde::Serialize;
use crate::config::defs::{PipelineError, RunContext, READLENGTH_STEP, READLENGTH_TAG};
use crate::utils::command::ArgGenerator;
use crate::utils::command::readlength::ReadLengthConfig;
use crate::utils::file::{require_inputs, require_outputs};
use crate::utils::streams::{run_tool, ToolCommand};


#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReadLengthSummary {
    pub reads: u64,
    pub bases: u64,
    pub min: u64,
    pub max: u64,
    pub avg: f64,
    pub median: u64,
    pub mode: u64,
    pub std_dev: f64,
    pub report_file: PathBuf,
}

/// Read-length summaries at the three checkpoints of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReadsInfo {
    pub pre_filter: ReadLengthSummary,
    pub filtered: ReadLengthSummary,
    pub corrected: ReadLengthSummary,
}

impl ReadsInfo {
    pub fn checkpoints(&self) -> [(&'static str, &ReadLengthSummary); 3] {
        [
            ("pre_filter", &self.pre_filter),
            ("filtered", &self.filtered),
            ("corrected", &self.corrected),
        ]
    }
}

/// Parses the `#Key:<tab>value` lines at the top of a readlength.sh report.
/// Keys that are missing or unparseable stay at zero; the histogram rows are ignored.
pub fn parse_readlength_report(text: &str, report_file: &Path) -> ReadLengthSummary {
    let mut summary = ReadLengthSummary {
        report_file: report_file.to_path_buf(),
        ..ReadLengthSummary::default()
    };

    for line in text.lines() {
        let Some(body) = line.strip_prefix('#') else {
            continue;
        };
        let Some((key, value)) = body.split_once(':') else {
            continue;
        };
        let value = value.trim();
        let as_u64 = || value.parse::<u64>().ok().unwrap_or_default();
        let as_f64 = || value.parse::<f64>().ok().unwrap_or_default();
        match key.trim() {
            "Reads" => summary.reads = as_u64(),
            "Bases" => summary.bases = as_u64(),
            "Max" => summary.max = as_u64(),
            "Min" => summary.min = as_u64(),
            "Avg" => summary.avg = as_f64(),
            "Median" => summary.median = as_u64(),
            "Mode" => summary.mode = as_u64(),
            "Std_Dev" => summary.std_dev = as_f64(),
            _ => {}
        }
    }
    summary
}


/// Measures `fastq` into `report`, returning the parsed summary.
///
/// # Arguments
///
/// * `ctx` - Run context, for the tool path and working directory.
/// * `fastq` - Reads to measure.
/// * `report` - Destination of the readlength.sh report.
///
/// # Returns
/// ReadLengthSummary of the reads
pub async fn measure(ctx: &RunContext, fastq: &Path, report: &Path) -> Result<ReadLengthSummary, PipelineError> {
    require_inputs(READLENGTH_STEP, &[fastq])?;

    let args = ReadLengthConfig { input: fastq, report }.generate_args();
    let cmd = ToolCommand::new(READLENGTH_TAG, &ctx.tools.readlength, args);
    run_tool(READLENGTH_STEP, &cmd, &ctx.out_dir).await?;
    require_outputs(READLENGTH_STEP, READLENGTH_TAG, &[report])?;

    let text = fs::read_to_string(report).map_err(|e| PipelineError::io(report, e))?;
    let summary = parse_readlength_report(&text, report);
    info!(
        "{}: {} reads, {} bases, mean length {:.1}",
        fastq.display(),
        summary.reads,
        summary.bases,
        summary.avg
    );
    Ok(summary)
}


#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "#Reads:\t1000\n#Bases:\t148500\n#Max:\t150\n#Min:\t51\n#Avg:\t148.5\n\
#Median:\t150\n#Mode:\t150\n#Std_Dev:\t6.2\n#Read Length Histogram:\n\
#Length\treads\tpct_reads\tcum_reads\tcum_pct_reads\tbases\tpct_bases\tcum_bases\tcum_pct_bases\n\
50\t12\t1.200%\t1000\t100.000%\t612\t0.412%\t148500\t100.000%\n";

    #[test]
    fn test_parse_readlength_report() {
        let summary = parse_readlength_report(REPORT, Path::new("/r/pre_filter_readlen.txt"));
        assert_eq!(summary.reads, 1000);
        assert_eq!(summary.bases, 148500);
        assert_eq!(summary.min, 51);
        assert_eq!(summary.max, 150);
        assert!((summary.avg - 148.5).abs() < 1e-9);
        assert_eq!(summary.median, 150);
        assert_eq!(summary.mode, 150);
        assert!((summary.std_dev - 6.2).abs() < 1e-9);
        assert_eq!(summary.report_file, PathBuf::from("/r/pre_filter_readlen.txt"));
    }

    #[test]
    fn test_parse_tolerates_missing_and_junk() {
        let summary = parse_readlength_report("@r1\nACGT\n+\nIIII\n#Reads:\tmany\n#Bases:\t40\n", Path::new("x"));
        assert_eq!(summary.reads, 0);
        assert_eq!(summary.bases, 40);
        assert_eq!(summary.max, 0);
    }
}
