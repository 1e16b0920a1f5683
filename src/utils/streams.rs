// src/utils/streams.rs
use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use anyhow::anyhow;
use log::{debug, info};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::SplitStream;
use crate::config::defs::PipelineError;

/// Lines of stderr kept for error reports.
pub const STDERR_TAIL_LINES: usize = 20;

const SIGPIPE: i32 = 13;


/// Where a child's output stream goes.
#[derive(Debug, Clone, PartialEq)]
pub enum Redirect {
    /// Passed through to this process's own stream.
    Inherit,
    /// Truncate and write.
    File(PathBuf),
    /// Append, creating if needed.
    Append(PathBuf),
}

/// One fully resolved external tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCommand {
    pub tag: &'static str,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub stdout: Redirect,
    pub stderr: Redirect,
}

impl ToolCommand {
    pub fn new(tag: &'static str, program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        ToolCommand {
            tag,
            program: program.into(),
            args,
            stdout: Redirect::Inherit,
            stderr: Redirect::Inherit,
        }
    }

    pub fn stdout_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout = Redirect::File(path.into());
        self
    }

    pub fn stderr_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.stderr = Redirect::File(path.into());
        self
    }

    pub fn stderr_append(mut self, path: impl Into<PathBuf>) -> Self {
        self.stderr = Redirect::Append(path.into());
        self
    }

    /// Shell-like rendering for logs only; never executed through a shell.
    pub fn command_line(&self) -> String {
        let mut line = std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");
        match &self.stdout {
            Redirect::File(p) => line.push_str(&format!(" > {}", p.display())),
            Redirect::Append(p) => line.push_str(&format!(" >> {}", p.display())),
            Redirect::Inherit => {}
        }
        match &self.stderr {
            Redirect::File(p) => line.push_str(&format!(" 2> {}", p.display())),
            Redirect::Append(p) => line.push_str(&format!(" 2>> {}", p.display())),
            Redirect::Inherit => {}
        }
        line
    }

    fn tool_error(&self, step: &str, reason: String, stderr: String) -> PipelineError {
        PipelineError::ToolExecution {
            step: step.to_string(),
            tool: self.tag.to_string(),
            reason,
            stderr,
        }
    }
}


fn open_redirect(path: &Path, append: bool) -> Result<std::fs::File, PipelineError> {
    let mut options = OpenOptions::new();
    options.create(true);
    if append {
        options.append(true);
    } else {
        options.write(true).truncate(true);
    }
    options.open(path).map_err(|e| PipelineError::io(path, e))
}

fn stderr_sink(redirect: &Redirect) -> Result<Option<tokio::fs::File>, PipelineError> {
    Ok(match redirect {
        Redirect::Inherit => None,
        Redirect::File(path) => Some(tokio::fs::File::from_std(open_redirect(path, false)?)),
        Redirect::Append(path) => Some(tokio::fs::File::from_std(open_redirect(path, true)?)),
    })
}

fn stdout_stdio(redirect: &Redirect) -> Result<Stdio, PipelineError> {
    Ok(match redirect {
        Redirect::Inherit => Stdio::inherit(),
        Redirect::File(path) => Stdio::from(open_redirect(path, false)?),
        Redirect::Append(path) => Stdio::from(open_redirect(path, true)?),
    })
}

pub fn describe_status(status: &ExitStatus) -> String {
    match (status.code(), status.signal()) {
        (Some(code), _) => format!("exit status {}", code),
        (None, Some(signal)) => format!("termination by signal {}", signal),
        (None, None) => "unknown exit status".to_string(),
    }
}

// Upstream stage of a pipe killed because its reader went away
fn broken_pipe(status: &ExitStatus) -> bool {
    status.signal() == Some(SIGPIPE) || status.code() == Some(128 + SIGPIPE)
}


fn spawn_tool(
    step: &str,
    cmd: &ToolCommand,
    cwd: &Path,
    stdin: Stdio,
    stdout: Stdio,
) -> Result<Child, PipelineError> {
    info!("[{}] Running {}: {}", step, cmd.tag, cmd.command_line());
    Command::new(&cmd.program)
        .args(&cmd.args)
        .current_dir(cwd)
        .stdin(stdin)
        .stdout(stdout)
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            cmd.tool_error(
                step,
                format!("failed to spawn {}: {}", cmd.program.display(), e),
                String::new(),
            )
        })
}


/// Forwards the child's stderr to its destination line by line and hands back
/// the last `STDERR_TAIL_LINES` lines once the stream closes.
fn drain_stderr(
    stderr: ChildStderr,
    mut sink: Option<tokio::fs::File>,
) -> JoinHandle<anyhow::Result<Vec<String>>> {
    tokio::spawn(async move {
        let mut lines = SplitStream::new(BufReader::new(stderr).split(b'\n'));
        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
        while let Some(line) = lines.next().await {
            let line = line?;
            let text = String::from_utf8_lossy(&line).into_owned();
            match sink.as_mut() {
                Some(file) => {
                    file.write_all(&line).await?;
                    file.write_all(b"\n").await?;
                }
                None => eprintln!("{}", text),
            }
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(text);
        }
        if let Some(mut file) = sink {
            file.flush().await?;
        }
        Ok(tail.into_iter().collect())
    })
}

async fn collect_stderr(
    step: &str,
    cmd: &ToolCommand,
    task: JoinHandle<anyhow::Result<Vec<String>>>,
) -> Result<String, PipelineError> {
    let tail = task
        .await
        .map_err(|e| PipelineError::Other(anyhow!("stderr task for {} failed: {}", cmd.tag, e)))?
        .map_err(|e| cmd.tool_error(step, format!("failed to forward stderr: {}", e), String::new()))?;
    Ok(tail.join("\n"))
}

fn check_status(
    step: &str,
    cmd: &ToolCommand,
    status: &ExitStatus,
    stderr_tail: String,
) -> Result<(), PipelineError> {
    if status.success() {
        debug!("[{}] {} finished", step, cmd.tag);
        Ok(())
    } else {
        Err(cmd.tool_error(
            step,
            format!("exited with {}", describe_status(status)),
            stderr_tail,
        ))
    }
}

fn take_stderr(step: &str, cmd: &ToolCommand, child: &mut Child) -> Result<ChildStderr, PipelineError> {
    child
        .stderr
        .take()
        .ok_or_else(|| cmd.tool_error(step, "stderr was not captured".to_string(), String::new()))
}


/// Runs one tool to completion in `cwd`.
///
/// # Arguments
///
/// * `step` - Pipeline step name, used in logs and errors.
/// * `cmd` - The resolved invocation.
/// * `cwd` - Working directory for the child.
///
/// # Returns
/// Ok on zero exit; `ToolExecution` with the stderr tail otherwise.
pub async fn run_tool(step: &str, cmd: &ToolCommand, cwd: &Path) -> Result<(), PipelineError> {
    let stdout = stdout_stdio(&cmd.stdout)?;
    let sink = stderr_sink(&cmd.stderr)?;
    let mut child = spawn_tool(step, cmd, cwd, Stdio::null(), stdout)?;
    let stderr_task = drain_stderr(take_stderr(step, cmd, &mut child)?, sink);

    let status = child
        .wait()
        .await
        .map_err(|e| cmd.tool_error(step, format!("failed to wait: {}", e), String::new()))?;
    let stderr_tail = collect_stderr(step, cmd, stderr_task).await?;
    check_status(step, cmd, &status, stderr_tail)
}


/// Runs `upstream | downstream`: upstream's stdout is copied into
/// downstream's stdin and both children are awaited. As with `pipefail`, the
/// rightmost failing stage is reported, so an upstream stage that only died of
/// SIGPIPE never hides the downstream failure. `upstream.stdout` is ignored.
pub async fn pipe_tools(
    step: &str,
    upstream: &ToolCommand,
    downstream: &ToolCommand,
    cwd: &Path,
) -> Result<(), PipelineError> {
    // Every redirect is opened before anything is spawned
    let up_sink = stderr_sink(&upstream.stderr)?;
    let down_sink = stderr_sink(&downstream.stderr)?;
    let downstream_stdout = stdout_stdio(&downstream.stdout)?;

    let mut up_child = spawn_tool(step, upstream, cwd, Stdio::null(), Stdio::piped())?;
    let up_stderr_task = drain_stderr(take_stderr(step, upstream, &mut up_child)?, up_sink);
    let mut up_stdout = up_child
        .stdout
        .take()
        .ok_or_else(|| upstream.tool_error(step, "stdout was not captured".to_string(), String::new()))?;

    let mut down_child = spawn_tool(step, downstream, cwd, Stdio::piped(), downstream_stdout)?;
    let down_stderr_task = drain_stderr(take_stderr(step, downstream, &mut down_child)?, down_sink);
    let mut down_stdin = down_child
        .stdin
        .take()
        .ok_or_else(|| downstream.tool_error(step, "stdin was not captured".to_string(), String::new()))?;

    let copy_task: JoinHandle<std::io::Result<u64>> = tokio::spawn(async move {
        let copied = tokio::io::copy(&mut up_stdout, &mut down_stdin).await?;
        down_stdin.shutdown().await?;
        Ok(copied)
    });

    let (up_status, down_status) = futures::future::join(up_child.wait(), down_child.wait()).await;
    let up_status = up_status
        .map_err(|e| upstream.tool_error(step, format!("failed to wait: {}", e), String::new()))?;
    let down_status = down_status
        .map_err(|e| downstream.tool_error(step, format!("failed to wait: {}", e), String::new()))?;

    let copied = copy_task
        .await
        .map_err(|e| PipelineError::Other(anyhow!("pipe task failed: {}", e)))?;
    let up_tail = collect_stderr(step, upstream, up_stderr_task).await?;
    let down_tail = collect_stderr(step, downstream, down_stderr_task).await?;

    if !down_status.success() && broken_pipe(&up_status) {
        debug!("[{}] {} stopped by a closed pipe", step, upstream.tag);
    }
    check_status(step, downstream, &down_status, down_tail)?;
    check_status(step, upstream, &up_status, up_tail)?;
    match copied {
        Ok(bytes) => {
            debug!("[{}] piped {} bytes from {} to {}", step, bytes, upstream.tag, downstream.tag);
            Ok(())
        }
        Err(e) => Err(downstream.tool_error(
            step,
            format!("pipe from {} broke: {}", upstream.tag, e),
            String::new(),
        )),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sh(tag: &'static str, script: &str) -> ToolCommand {
        ToolCommand::new(tag, "sh", vec!["-c".to_string(), script.to_string()])
    }

    #[tokio::test]
    async fn test_run_tool_writes_redirects() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let out = tmp.path().join("out.txt");
        let err = tmp.path().join("err.txt");
        let cmd = sh("echo", "echo hello; echo warn >&2").stdout_to(&out).stderr_to(&err);
        run_tool("test", &cmd, tmp.path()).await?;
        assert_eq!(std::fs::read_to_string(&out)?, "hello\n");
        assert_eq!(std::fs::read_to_string(&err)?, "warn\n");

        let again = sh("echo", "echo more >&2").stderr_append(&err);
        run_tool("test", &again, tmp.path()).await?;
        assert_eq!(std::fs::read_to_string(&err)?, "warn\nmore\n");
        Ok(())
    }

    #[tokio::test]
    async fn test_run_tool_nonzero_exit_keeps_stderr_tail() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let cmd = sh("failing", "for i in $(seq 1 30); do echo line$i >&2; done; exit 3");
        match run_tool("assembly", &cmd, tmp.path()).await {
            Err(PipelineError::ToolExecution { step, tool, reason, stderr }) => {
                assert_eq!(step, "assembly");
                assert_eq!(tool, "failing");
                assert!(reason.contains("exit status 3"), "{}", reason);
                let lines: Vec<&str> = stderr.lines().collect();
                assert_eq!(lines.len(), STDERR_TAIL_LINES);
                assert_eq!(lines.last(), Some(&"line30"));
            }
            other => panic!("unexpected {:?}", other),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_run_tool_missing_program() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let cmd = ToolCommand::new("ghost", tmp.path().join("no_such_tool"), vec![]);
        let err = run_tool("stats", &cmd, tmp.path()).await.unwrap_err();
        assert!(err.to_string().contains("failed to spawn"), "{}", err);
        Ok(())
    }

    #[tokio::test]
    async fn test_pipe_tools() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let out = tmp.path().join("piped.txt");
        let up = sh("up", "printf 'a\\nb\\nc\\n'");
        let down = sh("down", "tr a-z A-Z").stdout_to(&out);
        pipe_tools("correction", &up, &down, tmp.path()).await?;
        assert_eq!(std::fs::read_to_string(&out)?, "A\nB\nC\n");
        Ok(())
    }

    #[tokio::test]
    async fn test_pipe_tools_reports_failing_stage() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let out = tmp.path().join("piped.txt");
        let up = sh("up", "echo partial; exit 4");
        let down = sh("down", "cat").stdout_to(&out);
        match pipe_tools("correction", &up, &down, tmp.path()).await {
            Err(PipelineError::ToolExecution { tool, reason, .. }) => {
                assert_eq!(tool, "up");
                assert!(reason.contains("exit status 4"));
            }
            other => panic!("unexpected {:?}", other),
        }

        let up = sh("up", "echo fine");
        let down = sh("down", "cat > /dev/null; exit 5").stdout_to(&out);
        match pipe_tools("correction", &up, &down, tmp.path()).await {
            Err(PipelineError::ToolExecution { tool, .. }) => assert_eq!(tool, "down"),
            other => panic!("unexpected {:?}", other),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_pipe_blames_downstream_when_upstream_gets_sigpipe() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let up = sh("seqtk", "yes");
        let down = sh("pigz", "exit 5").stdout_to(tmp.path().join("never.gz"));
        match pipe_tools("correction", &up, &down, tmp.path()).await {
            Err(PipelineError::ToolExecution { step, tool, reason, .. }) => {
                assert_eq!(step, "correction");
                assert_eq!(tool, "pigz");
                assert!(reason.contains("exit status 5"), "{}", reason);
            }
            other => panic!("unexpected {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_broken_pipe_status() {
        assert!(broken_pipe(&ExitStatus::from_raw(SIGPIPE)));
        assert!(broken_pipe(&ExitStatus::from_raw(141 << 8)));
        assert!(!broken_pipe(&ExitStatus::from_raw(5 << 8)));
    }

    #[tokio::test]
    async fn test_unopenable_redirect_spawns_nothing() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let marker = tmp.path().join("ran");
        let bad_log = tmp.path().join("no_such_dir").join("tool.log");

        let cmd = sh("touch", "touch ran").stderr_to(&bad_log);
        assert!(matches!(run_tool("stats", &cmd, tmp.path()).await, Err(PipelineError::Io { .. })));
        assert!(!marker.exists());

        let up = sh("up", "touch ran; echo x");
        let down = sh("down", "cat").stderr_to(&bad_log);
        assert!(matches!(
            pipe_tools("correction", &up, &down, tmp.path()).await,
            Err(PipelineError::Io { .. })
        ));
        assert!(!marker.exists());
        Ok(())
    }

    #[test]
    fn test_command_line_rendering() {
        let cmd = ToolCommand::new("stats.sh", "/kb/module/bbmap/stats.sh", vec!["in=x".to_string()])
            .stdout_to("/o/stats.txt")
            .stderr_append("/o/stderr.out");
        assert_eq!(
            cmd.command_line(),
            "/kb/module/bbmap/stats.sh in=x > /o/stats.txt 2>> /o/stderr.out"
        );
    }
}
