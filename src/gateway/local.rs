use std::collections::HashMap;
use std::path::{Path, PathBuf};
use anyhow::{anyhow, Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use tokio::fs;
use crate::config::defs::PipelineError;
use crate::gateway::WorkspaceGateway;

pub const META_FILE: &str = "meta.json";
pub const ASSEMBLY_TYPE: &str = "Assembly";


/// Metadata written next to every stored object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub object_type: String,
    pub workspace: String,
    pub name: String,
    pub version: u32,
    pub files: Vec<String>,
    pub created: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A freshly allocated `<root>/<workspace>/<name>/<version>` directory.
#[derive(Debug, Clone)]
pub struct ObjectSlot {
    pub reference: String,
    pub dir: PathBuf,
    pub version: u32,
}


/// Filesystem-backed object store. Objects live under
/// `<root>/<workspace>/<name>/<version>/` and are referenced as
/// `<workspace>/<name>/<version>`.
#[derive(Debug, Clone)]
pub struct LocalWorkspace {
    root: PathBuf,
}

impl LocalWorkspace {
    /// A relative `root` is taken against the current directory, so stored
    /// files resolve the same from any tool's working directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = std::path::absolute(&root).unwrap_or(root);
        LocalWorkspace { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn next_version(&self, workspace: &str, name: &str) -> Result<u32> {
        let object_root = self.root.join(workspace).join(name);
        if !object_root.is_dir() {
            return Ok(1);
        }
        let mut latest = 0;
        let mut entries = fs::read_dir(&object_root)
            .await
            .with_context(|| format!("reading {}", object_root.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(version) = entry.file_name().to_str().and_then(|v| v.parse::<u32>().ok()) {
                latest = latest.max(version);
            }
        }
        Ok(latest + 1)
    }

    /// Reserves the next version directory for `workspace/name`.
    pub async fn allocate(&self, workspace: &str, name: &str) -> Result<ObjectSlot> {
        check_name(workspace)?;
        check_name(name)?;
        let object_root = self.root.join(workspace).join(name);
        fs::create_dir_all(&object_root)
            .await
            .with_context(|| format!("creating {}", object_root.display()))?;

        // A version directory taken by a concurrent writer is skipped
        let mut version = self.next_version(workspace, name).await?;
        let dir = loop {
            let dir = object_root.join(version.to_string());
            match fs::create_dir(&dir).await {
                Ok(()) => break dir,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => version += 1,
                Err(e) => return Err(e).with_context(|| format!("creating {}", dir.display())),
            }
        };
        Ok(ObjectSlot {
            reference: format!("{}/{}/{}", workspace, name, version),
            dir,
            version,
        })
    }

    pub async fn write_meta(&self, slot: &ObjectSlot, meta: &ObjectMeta) -> Result<()> {
        let path = slot.dir.join(META_FILE);
        let json = serde_json::to_string_pretty(meta)?;
        fs::write(&path, json)
            .await
            .with_context(|| format!("writing {}", path.display()))
    }

    pub async fn read_meta(&self, reference: &str) -> Result<(PathBuf, ObjectMeta)> {
        let parts: Vec<&str> = reference.split('/').collect();
        let [workspace, name, version] = parts.as_slice() else {
            return Err(anyhow!("'{}' is not a <workspace>/<name>/<version> reference", reference));
        };
        version
            .parse::<u32>()
            .map_err(|_| anyhow!("'{}' has a non-numeric version", reference))?;
        let dir = self.root.join(workspace).join(name).join(version);
        let text = fs::read_to_string(dir.join(META_FILE))
            .await
            .with_context(|| format!("no stored object at {}", reference))?;
        let meta: ObjectMeta = serde_json::from_str(&text)
            .with_context(|| format!("bad metadata for {}", reference))?;
        Ok((dir, meta))
    }

    /// A reference resolves either to an existing file on disk or to the first
    /// data file of a stored object.
    async fn resolve_reads(&self, reference: &str) -> Result<PathBuf> {
        let direct = Path::new(reference);
        if direct.is_file() {
            return Ok(fs::canonicalize(direct).await?);
        }
        let (dir, meta) = self.read_meta(reference).await?;
        let file = meta
            .files
            .first()
            .ok_or_else(|| anyhow!("object {} holds no files", reference))?;
        Ok(dir.join(file))
    }

    async fn store_assembly(&self, contig_file: &Path, workspace: &str, name: &str) -> Result<String> {
        let file_name = contig_file
            .file_name()
            .ok_or_else(|| anyhow!("{} has no file name", contig_file.display()))?
            .to_string_lossy()
            .into_owned();
        let slot = self.allocate(workspace, name).await?;
        fs::copy(contig_file, slot.dir.join(&file_name))
            .await
            .with_context(|| format!("copying {}", contig_file.display()))?;
        let meta = ObjectMeta {
            object_type: ASSEMBLY_TYPE.to_string(),
            workspace: workspace.to_string(),
            name: name.to_string(),
            version: slot.version,
            files: vec![file_name],
            created: chrono::Utc::now().to_rfc3339(),
            description: None,
        };
        self.write_meta(&slot, &meta).await?;
        Ok(slot.reference)
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') || name == "." || name == ".." {
        return Err(anyhow!("'{}' is not a valid workspace or object name", name));
    }
    Ok(())
}


impl WorkspaceGateway for LocalWorkspace {
    async fn fetch_reads(&self, references: &[String]) -> Result<HashMap<String, PathBuf>, PipelineError> {
        let mut files = HashMap::new();
        for reference in references {
            let path = self
                .resolve_reads(reference)
                .await
                .map_err(|e| PipelineError::Gateway(format!("Could not fetch reads {}: {:#}", reference, e)))?;
            info!("Reads {} resolved to {}", reference, path.display());
            files.insert(reference.clone(), path);
        }
        Ok(files)
    }

    async fn upload_assembly(
        &self,
        contig_file: &Path,
        workspace: &str,
        name: &str,
    ) -> Result<String, PipelineError> {
        let reference = self
            .store_assembly(contig_file, workspace, name)
            .await
            .map_err(|e| PipelineError::Gateway(format!("Could not upload assembly {}: {:#}", name, e)))?;
        info!("Stored assembly {} as {}", name, reference);
        Ok(reference)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_upload_versions_and_fetch_back() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let contigs = tmp.path().join("assembly.contigs.fasta");
        std::fs::write(&contigs, ">c1\nACGT\n")?;
        let store = LocalWorkspace::new(tmp.path().join("ws_root"));

        let first = store.upload_assembly(&contigs, "my_ws", "asm").await?;
        let second = store.upload_assembly(&contigs, "my_ws", "asm").await?;
        assert_eq!(first, "my_ws/asm/1");
        assert_eq!(second, "my_ws/asm/2");

        let (_, meta) = store.read_meta(&second).await?;
        assert_eq!(meta.object_type, ASSEMBLY_TYPE);
        assert_eq!(meta.files, vec!["assembly.contigs.fasta".to_string()]);

        let fetched = store.fetch_reads(&[first.clone()]).await?;
        assert_eq!(std::fs::read_to_string(&fetched[&first])?, ">c1\nACGT\n");
        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_direct_path_and_unknown_reference() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let reads = tmp.path().join("reads.fastq");
        std::fs::write(&reads, "@r\nA\n+\nI\n")?;
        let store = LocalWorkspace::new(tmp.path());

        let key = reads.display().to_string();
        let fetched = store.fetch_reads(&[key.clone()]).await?;
        assert_eq!(fetched[&key], std::fs::canonicalize(&reads)?);

        let missing = store.fetch_reads(&["ws/none/1".to_string()]).await;
        assert!(matches!(missing, Err(PipelineError::Gateway(_))));
        Ok(())
    }

    #[test]
    fn test_relative_root_is_made_absolute() {
        let store = LocalWorkspace::new("workspace");
        assert!(store.root().is_absolute());
        assert!(store.root().ends_with("workspace"));
    }

    #[tokio::test]
    async fn test_bad_names_are_rejected() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let contigs = tmp.path().join("c.fasta");
        std::fs::write(&contigs, ">c\nA\n")?;
        let store = LocalWorkspace::new(tmp.path());
        assert!(store.upload_assembly(&contigs, "ws", "../escape").await.is_err());
        assert!(store.upload_assembly(&contigs, "", "asm").await.is_err());
        Ok(())
    }
}
