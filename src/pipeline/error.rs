//! Errors that abort a pipeline run.

use std::path::PathBuf;

use thiserror::Error;

/// Fatal conditions of a driver run. None of them is retried.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no FASTA files found")]
    NoInput,

    #[error("FASTA file {path:?} is invalid: {reason}")]
    InvalidInput { path: PathBuf, reason: String },

    #[error("sample name '{name}' is shared by {first:?} and {second:?}")]
    DuplicateSample {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("workflow asset not found: {0:?}")]
    MissingWorkflowAsset(PathBuf),

    #[error("another driver is running in this working directory (remove {0:?} if it is stale)")]
    WorkdirBusy(PathBuf),

    #[error("failed to launch workflow engine '{program}': {source}")]
    EngineLaunch {
        program: String,
        source: std::io::Error,
    },

    #[error("workflow engine failed ({}):\n{stderr}", describe_exit(.code))]
    PipelineExecution { code: Option<i32>, stderr: String },

    #[error("workflow engine finished but {} target(s) are missing: {:?}", .0.len(), .0)]
    MissingTargets(Vec<PathBuf>),

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid workflow profile: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to serialize run configuration: {0}")]
    Json(#[from] serde_json::Error),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit status {code}"),
        None => "terminated by signal".to_string(),
    }
}
