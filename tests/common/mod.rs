// Stub external tools for pipeline tests. Each stub records its arguments and
// an `.invoked` sentinel under `calls/`, then behaves as configured.
#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use anyhow::{anyhow, Result};
use tempfile::TempDir;
use mga_pipelines::config::defs::{
    ToolPaths, AGP_TAG, BBMAP_TAG, BBSTATS_TAG, BFC_TAG, PIGZ_TAG, READLENGTH_TAG, RQCFILTER_TAG,
    SEQTK_TAG, SPADES_TAG,
};

pub const READS: &str = "@pair1/1\nACGTACGTAC\n+\nIIIIIIIIII\n@pair1/2\nTTGCATTGCA\n+\nIIIIIIIIII\n\
@pair2/1\nGGGCCCAAAT\n+\nIIIIIIIIII\n@pair2/2\nATTTGGGCCC\n+\nIIIIIIIIII\n";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StubBehavior {
    /// Copies the declared input to every declared output.
    CopyThrough,
    /// Writes to stderr and exits with the code.
    Fail(i32),
    /// Exits zero without writing anything.
    Silent,
    /// Copies through until the `call`-th invocation, then fails with `code`.
    FailFrom { call: usize, code: i32 },
}

pub struct StubTools {
    pub dir: TempDir,
    pub calls: PathBuf,
    pub tools: ToolPaths,
}

const KEY_VALUE_COPY: &str = r#"src=""
for arg in "$@"; do
  case "$arg" in
    in=*) src="${arg#in=}" ;;
  esac
done
for arg in "$@"; do
  case "$arg" in
    out=*|outc=*|agp=*|legend=*|covstats=*) cp "$src" "${arg#*=}" || exit 1 ;;
  esac
done
echo "stub done" >&2
"#;

const READLENGTH_BODY: &str = r#"src=""
out=""
for arg in "$@"; do
  case "$arg" in
    in=*) src="${arg#in=}" ;;
    out=*) out="${arg#out=}" ;;
  esac
done
lines=$(wc -l < "$src")
reads=$((lines / 4))
bases=$(awk 'NR % 4 == 2 { b += length($0) } END { print b + 0 }' "$src")
printf '#Reads:\t%s\n#Bases:\t%s\n#Max:\t10\n#Min:\t10\n#Avg:\t10.0\n' "$reads" "$bases" > "$out"
"#;

const STATS_BODY: &str = r#"src=""
for arg in "$@"; do
  case "$arg" in
    in=*) src="${arg#in=}" ;;
  esac
done
echo "stats for $src" >&2
cat "$src"
"#;

const BFC_BODY: &str = r#"for last; do :; done
echo "bfc correcting $last" >&2
cat "$last"
"#;

const SEQTK_BODY: &str = "cat \"$2\"\n";

const PIGZ_BODY: &str = "cat\n";

const SPADES_BODY: &str = r#"out=""
reads=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift ;;
    --12) reads="$2"; shift ;;
  esac
  shift
done
mkdir -p "$out"
cp "$reads" "$out/scaffolds.fasta"
cp "$reads" "$out/contigs.fasta"
echo "stub assembly" > "$out/spades.log"
echo "-k 33,55,77,99,127" > "$out/params.txt"
"#;

fn file_stem(tag: &str) -> String {
    tag.replace('.', "_")
}

fn copy_through_body(tag: &str) -> &'static str {
    match tag {
        READLENGTH_TAG => READLENGTH_BODY,
        BBSTATS_TAG => STATS_BODY,
        BFC_TAG => BFC_BODY,
        SEQTK_TAG => SEQTK_BODY,
        PIGZ_TAG => PIGZ_BODY,
        SPADES_TAG => SPADES_BODY,
        _ => KEY_VALUE_COPY,
    }
}

/// Every stub, in the order the pipeline first invokes them.
pub const ALL_STUBS: &[&str] = &[
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

impl StubTools {
    /// Every tool copies its input through.
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let bin = dir.path().join("bin");
        let calls = dir.path().join("calls");
        fs::create_dir_all(&bin)?;
        fs::create_dir_all(&calls)?;
        let stubs = StubTools {
            tools: ToolPaths::from_dir(&bin),
            dir,
            calls,
        };
        for tag in ALL_STUBS {
            stubs.set(tag, StubBehavior::CopyThrough)?;
        }
        Ok(stubs)
    }

    pub fn set(&self, tag: &str, behavior: StubBehavior) -> Result<()> {
        let path = self
            .tools
            .get(tag)
            .ok_or_else(|| anyhow!("no stub slot for {}", tag))?
            .to_path_buf();
        let stem = file_stem(tag);
        let body = match behavior {
            StubBehavior::CopyThrough => copy_through_body(tag).to_string(),
            StubBehavior::Fail(code) => format!("echo \"stub {} failing\" >&2\nexit {}\n", tag, code),
            StubBehavior::Silent => "exit 0\n".to_string(),
            StubBehavior::FailFrom { call, code } => format!(
                "n=$(wc -l < '{calls}/{stem}.args')\nif [ \"$n\" -ge {call} ]; then echo \"stub {tag} failing\" >&2; exit {code}; fi\n{copy}",
                calls = self.calls.display(),
                stem = stem,
                call = call,
                tag = tag,
                code = code,
                copy = copy_through_body(tag),
            ),
        };
        let script = format!(
            "#!/bin/sh\necho \"$*\" >> '{calls}/{stem}.args'\ntouch '{calls}/{stem}.invoked'\n{body}",
            calls = self.calls.display(),
            stem = stem,
            body = body,
        );
        write_executable(&path, &script)
    }

    pub fn invoked(&self, tag: &str) -> bool {
        self.calls.join(format!("{}.invoked", file_stem(tag))).exists()
    }

    /// Argument lines recorded for `tag`, one per invocation.
    pub fn args(&self, tag: &str) -> Result<Vec<String>> {
        let text = fs::read_to_string(self.calls.join(format!("{}.args", file_stem(tag))))?;
        Ok(text.lines().map(String::from).collect())
    }

    pub fn scratch(&self) -> PathBuf {
        self.dir.path().join("scratch")
    }

    pub fn store_root(&self) -> PathBuf {
        self.dir.path().join("store")
    }

    pub fn write_reads(&self) -> Result<PathBuf> {
        let reads = self.dir.path().join("reads.fastq");
        fs::write(&reads, READS)?;
        Ok(reads)
    }
}

fn write_executable(path: &Path, script: &str) -> Result<()> {
    {
        let file = fs::File::create(path)?;
        use std::io::Write;
        let mut writer = std::io::BufWriter::new(&file);
        writer.write_all(script.as_bytes())?;
        writer.flush()?;
        drop(writer);
        file.sync_all()?;
    }
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    Ok(())
}
