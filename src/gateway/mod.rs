//! Collaborators outside the pipeline proper: where reads come from, where the
//! assembly goes, and who writes the report.
pub mod local;
pub mod report;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::config::defs::PipelineError;
use crate::utils::readlength::ReadsInfo;

pub use local::LocalWorkspace;
pub use report::LocalReportBuilder;


/// An already stored object the report should point at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedObject {
    pub reference: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportInfo {
    pub report_name: String,
    pub report_reference: String,
}


#[allow(async_fn_in_trait)]
pub trait WorkspaceGateway {
    /// Resolves each reads reference to a local file.
    async fn fetch_reads(&self, references: &[String]) -> Result<HashMap<String, PathBuf>, PipelineError>;

    /// Stores `contig_file` as a new assembly object named `name`.
    async fn upload_assembly(
        &self,
        contig_file: &Path,
        workspace: &str,
        name: &str,
    ) -> Result<String, PipelineError>;
}


#[allow(async_fn_in_trait)]
pub trait ReportBuilder {
    async fn make_report(
        &self,
        stats_files: &BTreeMap<String, PathBuf>,
        reads_info: &ReadsInfo,
        workspace: &str,
        linked_objects: &[LinkedObject],
    ) -> Result<ReportInfo, PipelineError>;
}
