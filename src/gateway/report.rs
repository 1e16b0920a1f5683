use std::collections::BTreeMap;
use std::path::PathBuf;
use anyhow::{Context, Result};
use log::info;
use serde::Serialize;
use tokio::fs;
use crate::config::defs::PipelineError;
use crate::gateway::local::{LocalWorkspace, ObjectMeta};
use crate::gateway::{LinkedObject, ReportBuilder, ReportInfo};
use crate::utils::readlength::ReadsInfo;

pub const REPORT_TYPE: &str = "Report";
pub const REPORT_PREFIX: &str = "mga_report";
pub const REPORT_JSON: &str = "report.json";
pub const REPORT_SUMMARY: &str = "summary.txt";
// Stats file whose text is inlined into the summary
const INLINE_STATS_KEY: &str = "assembly_stats";


#[derive(Debug, Serialize)]
struct ReportDocument<'a> {
    workspace: &'a str,
    reads_info: &'a ReadsInfo,
    files: BTreeMap<&'a str, String>,
    objects_created: &'a [LinkedObject],
}


/// Writes reports into the same store as `LocalWorkspace`, one object per report.
#[derive(Debug, Clone)]
pub struct LocalReportBuilder {
    store: LocalWorkspace,
}

impl LocalReportBuilder {
    pub fn new(store: LocalWorkspace) -> Self {
        LocalReportBuilder { store }
    }

    async fn build(
        &self,
        stats_files: &BTreeMap<String, PathBuf>,
        reads_info: &ReadsInfo,
        workspace: &str,
        linked_objects: &[LinkedObject],
    ) -> Result<ReportInfo> {
        let report_name = format!("{}_{}", REPORT_PREFIX, chrono::Utc::now().format("%Y%m%d%H%M%S%3f"));
        let slot = self.store.allocate(workspace, &report_name).await?;

        let mut files = BTreeMap::new();
        let mut stored = Vec::new();
        for (key, source) in stats_files {
            let file_name = format!(
                "{}_{}",
                key,
                source.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
            );
            fs::copy(source, slot.dir.join(&file_name))
                .await
                .with_context(|| format!("copying {} for report", source.display()))?;
            files.insert(key.as_str(), file_name.clone());
            stored.push(file_name);
        }

        let inline_stats = match stats_files.get(INLINE_STATS_KEY) {
            Some(path) => Some(fs::read_to_string(path).await.with_context(|| format!("reading {}", path.display()))?),
            None => None,
        };
        let summary = render_summary(workspace, reads_info, linked_objects, inline_stats.as_deref());
        fs::write(slot.dir.join(REPORT_SUMMARY), summary).await?;

        let document = ReportDocument {
            workspace,
            reads_info,
            files,
            objects_created: linked_objects,
        };
        fs::write(slot.dir.join(REPORT_JSON), serde_json::to_string_pretty(&document)?).await?;
        stored.push(REPORT_SUMMARY.to_string());
        stored.push(REPORT_JSON.to_string());

        let meta = ObjectMeta {
            object_type: REPORT_TYPE.to_string(),
            workspace: workspace.to_string(),
            name: report_name.clone(),
            version: slot.version,
            files: stored,
            created: chrono::Utc::now().to_rfc3339(),
            description: None,
        };
        self.store.write_meta(&slot, &meta).await?;

        Ok(ReportInfo {
            report_name,
            report_reference: slot.reference,
        })
    }
}


/// Human-readable report body.
pub fn render_summary(
    workspace: &str,
    reads_info: &ReadsInfo,
    linked_objects: &[LinkedObject],
    assembly_stats: Option<&str>,
) -> String {
    let mut out = format!("JGI metagenome assembly report\nWorkspace: {}\n\n", workspace);

    out.push_str("Objects created:\n");
    for object in linked_objects {
        out.push_str(&format!("  {}\t{}\n", object.reference, object.description));
    }
    out.push('\n');

    out.push_str(&format!(
        "{:<12}{:>14}{:>16}{:>8}{:>8}{:>10}\n",
        "Reads", "count", "bases", "min", "max", "avg"
    ));
    for (label, summary) in reads_info.checkpoints() {
        out.push_str(&format!(
            "{:<12}{:>14}{:>16}{:>8}{:>8}{:>10.1}\n",
            label, summary.reads, summary.bases, summary.min, summary.max, summary.avg
        ));
    }

    if let Some(stats) = assembly_stats {
        out.push_str("\nAssembly statistics:\n");
        out.push_str(stats);
        if !stats.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}


impl ReportBuilder for LocalReportBuilder {
    async fn make_report(
        &self,
        stats_files: &BTreeMap<String, PathBuf>,
        reads_info: &ReadsInfo,
        workspace: &str,
        linked_objects: &[LinkedObject],
    ) -> Result<ReportInfo, PipelineError> {
        let report = self
            .build(stats_files, reads_info, workspace, linked_objects)
            .await
            .map_err(|e| PipelineError::Report(format!("{:#}", e)))?;
        info!("Report {} stored as {}", report.report_name, report.report_reference);
        Ok(report)
    }
}
