use std::fs;
use std::path::Path;
use serde::{Deserialize, Serialize};
use crate::config::defs::{PipelineError, StepOptions};

pub const MISSING_READS: &str = "Missing a Reads object!";
pub const MISSING_ASSEMBLY_NAME: &str = "Missing the output assembly name!";
pub const MISSING_WORKSPACE: &str = "Missing workspace name for the output data!";


/// Run parameters as handed in by the caller. Nothing is checked until
/// `validate` is called.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunParameters {
    #[serde(default, alias = "reads_upa")]
    pub reads_reference: Option<String>,
    #[serde(default)]
    pub output_assembly_name: Option<String>,
    #[serde(default)]
    pub workspace_name: Option<String>,
    #[serde(default, alias = "skip_rqcfilter")]
    pub skip_filtering: bool,
    #[serde(default)]
    pub debug: bool,
}

/// Parameters after presence checks; required fields are no longer optional.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedParameters {
    pub reads_reference: String,
    pub output_assembly_name: String,
    pub workspace_name: String,
    pub options: StepOptions,
}

impl RunParameters {
    pub fn from_json_file(path: &Path) -> Result<Self, PipelineError> {
        let text = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        serde_json::from_str(&text).map_err(|e| {
            PipelineError::Validation(vec![format!(
                "Could not parse parameter file {}: {}",
                path.display(),
                e
            )])
        })
    }

    /// Fields set on `other` replace ours; boolean toggles are OR'ed.
    pub fn merge(self, other: RunParameters) -> RunParameters {
        RunParameters {
            reads_reference: other.reads_reference.or(self.reads_reference),
            output_assembly_name: other.output_assembly_name.or(self.output_assembly_name),
            workspace_name: other.workspace_name.or(self.workspace_name),
            skip_filtering: self.skip_filtering || other.skip_filtering,
            debug: self.debug || other.debug,
        }
    }

    /// Checks every required field and reports all that are missing at once.
    pub fn validate(&self) -> Result<ValidatedParameters, PipelineError> {
        let mut errors = Vec::new();
        let reads_reference = present(&self.reads_reference);
        let output_assembly_name = present(&self.output_assembly_name);
        let workspace_name = present(&self.workspace_name);

        if reads_reference.is_none() {
            errors.push(MISSING_READS.to_string());
        }
        if output_assembly_name.is_none() {
            errors.push(MISSING_ASSEMBLY_NAME.to_string());
        }
        if workspace_name.is_none() {
            errors.push(MISSING_WORKSPACE.to_string());
        }

        match (reads_reference, output_assembly_name, workspace_name) {
            (Some(reads_reference), Some(output_assembly_name), Some(workspace_name)) => {
                Ok(ValidatedParameters {
                    reads_reference,
                    output_assembly_name,
                    workspace_name,
                    options: StepOptions {
                        skip_filtering: self.skip_filtering,
                        debug: self.debug,
                    },
                })
            }
            _ => Err(PipelineError::Validation(errors)),
        }
    }
}

// Blank strings count as missing
fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}


#[cfg(test)]
mod tests {
    use super::*;

    fn full() -> RunParameters {
        RunParameters {
            reads_reference: Some("1/2/3".to_string()),
            output_assembly_name: Some("asm".to_string()),
            workspace_name: Some("ws".to_string()),
            skip_filtering: false,
            debug: true,
        }
    }

    #[test]
    fn test_validate_complete_parameters() {
        let validated = full().validate().unwrap();
        assert_eq!(validated.reads_reference, "1/2/3");
        assert!(validated.options.debug);
        assert!(!validated.options.skip_filtering);
    }

    #[test]
    fn test_validate_lists_every_missing_field() {
        let params = RunParameters {
            reads_reference: None,
            workspace_name: None,
            ..full()
        };
        match params.validate() {
            Err(PipelineError::Validation(errors)) => {
                assert_eq!(errors, vec![MISSING_READS.to_string(), MISSING_WORKSPACE.to_string()]);
            }
            other => panic!("expected validation error, got {:?}", other),
        }

        match RunParameters::default().validate() {
            Err(PipelineError::Validation(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_blank_field_is_missing() {
        let params = RunParameters {
            output_assembly_name: Some("   ".to_string()),
            ..full()
        };
        match params.validate() {
            Err(PipelineError::Validation(errors)) => {
                assert_eq!(errors, vec![MISSING_ASSEMBLY_NAME.to_string()]);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_json_aliases_and_merge() {
        let json = r#"{"reads_upa": "7/8/9", "workspace_name": "ws", "skip_rqcfilter": true}"#;
        let from_file: RunParameters = serde_json::from_str(json).unwrap();
        assert_eq!(from_file.reads_reference.as_deref(), Some("7/8/9"));
        assert!(from_file.skip_filtering);
        assert!(from_file.output_assembly_name.is_none());

        let cli = RunParameters {
            output_assembly_name: Some("asm".to_string()),
            workspace_name: Some("other_ws".to_string()),
            ..RunParameters::default()
        };
        let merged = from_file.merge(cli);
        assert_eq!(merged.workspace_name.as_deref(), Some("other_ws"));
        assert_eq!(merged.reads_reference.as_deref(), Some("7/8/9"));
        assert!(merged.skip_filtering);
        assert!(merged.validate().is_ok());
    }
}
