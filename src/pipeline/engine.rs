//! The external workflow engine, seen by the driver as a blocking capability
//! that takes an argument list and reports exit status and captured output.

use std::fmt;
use std::path::PathBuf;
use std::process::Command;

use super::error::PipelineError;

/// A fully built engine command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Working directory of the engine process
    pub cwd: PathBuf,
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// What the engine left behind once it exited
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOutput {
    /// `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl EngineOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs an invocation to completion
pub trait WorkflowEngine {
    fn invoke(&self, invocation: &Invocation) -> Result<EngineOutput, PipelineError>;
}

/// Engine backed by a real subprocess (normally `snakemake`)
#[derive(Debug, Default, Clone, Copy)]
pub struct SnakemakeEngine;

impl WorkflowEngine for SnakemakeEngine {
    fn invoke(&self, invocation: &Invocation) -> Result<EngineOutput, PipelineError> {
        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.cwd)
            .output()
            .map_err(|source| PipelineError::EngineLaunch {
                program: invocation.program.clone(),
                source,
            })?;

        Ok(EngineOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
