use std::fs;
use std::path::{Path, PathBuf};
use crate::config::defs::PipelineError;

/// Creates `dir` and any missing parents. An existing directory is not an error.
pub fn create_dir_idempotent(dir: &Path) -> Result<(), PipelineError> {
    match fs::create_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(_) if dir.is_dir() => Ok(()),
        Err(e) => Err(PipelineError::io(dir, e)),
    }
}


/// Fails with `MissingInput` on the first path that is not an existing file.
pub fn require_inputs<P: AsRef<Path>>(step: &str, inputs: &[P]) -> Result<(), PipelineError> {
    for input in inputs {
        let input = input.as_ref();
        if !input.is_file() {
            return Err(PipelineError::MissingInput {
                step: step.to_string(),
                path: input.to_path_buf(),
            });
        }
    }
    Ok(())
}


/// Guards against tools that exit zero without writing what they promised.
pub fn require_outputs<P: AsRef<Path>>(step: &str, tool: &str, outputs: &[P]) -> Result<(), PipelineError> {
    for output in outputs {
        let output = output.as_ref();
        if !output.is_file() {
            return Err(PipelineError::ToolExecution {
                step: step.to_string(),
                tool: tool.to_string(),
                reason: format!(
                    "exited successfully but did not produce {}",
                    output.display()
                ),
                stderr: String::new(),
            });
        }
    }
    Ok(())
}


/// Returns `path` only if it exists as a file. Used for optional tool outputs.
pub fn existing_file(path: PathBuf) -> Option<PathBuf> {
    path.is_file().then_some(path)
}


/// Builds `<dir>/<prefix><delim><base><delim><suffix>`, skipping absent parts.
///
/// # Arguments
///
/// * `base` - Base file name; only its final component is used.
/// * `dir` - Optional directory to place the file in.
/// * `prefix` - Optional leading tag.
/// * `suffix` - Optional trailing tag, typically carrying the extension.
/// * `delimiter` - Joiner between the parts.
///
/// # Returns
/// The assembled path.
pub fn file_path_manipulator(
    base: &Path,
    dir: Option<&Path>,
    prefix: Option<&str>,
    suffix: Option<&str>,
    delimiter: &str,
) -> PathBuf {
    let base_name = base
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let name = [prefix, Some(base_name.as_str()), suffix]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(delimiter);

    match dir {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}
