//! End-to-end pipeline run.
//!
//! Each step is a hard gate: the first failure aborts the run and nothing is
//! retried. The engine is only invoked once every input has validated.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{debug, error, info, warn};

use super::config::{
    annotation_target, DriverConfig, InvalidInputPolicy, RunConfig, Sample, WorkflowDefaults,
};
use super::engine::{Invocation, WorkflowEngine};
use super::error::PipelineError;
use super::inputs::{derive_samples, resolve_inputs};
use super::lock::WorkdirLock;
use crate::fasta::FastaValidator;

/// Seconds the engine waits for files on shared cluster storage
const SLURM_LATENCY_WAIT: u32 = 60;

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Root of the engine's output tree
    pub results_dir: PathBuf,
    pub samples: Vec<Sample>,
    /// Declared targets, relative to the workflow directory
    pub targets: Vec<PathBuf>,
    pub archived_config: PathBuf,
}

/// Drives one run: inputs -> run config -> engine -> archived config
pub struct PipelineDriver<V, E> {
    config: DriverConfig,
    validator: V,
    engine: E,
}

impl<V: FastaValidator, E: WorkflowEngine> PipelineDriver<V, E> {
    pub fn new(config: DriverConfig, validator: V, engine: E) -> Self {
        PipelineDriver {
            config,
            validator,
            engine,
        }
    }

    /// Resolve, validate and name the inputs
    pub fn prepare(&self, inputs: &[PathBuf]) -> Result<Vec<Sample>, PipelineError> {
        let files = resolve_inputs(inputs)?;
        if files.is_empty() {
            return Err(PipelineError::NoInput);
        }
        let names: Vec<String> = files
            .iter()
            .filter_map(|f| f.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect();
        info!("Step 1: Found {} FASTA file(s): {names:?}", files.len());

        let mut valid = Vec::with_capacity(files.len());
        for file in files {
            match self.validate(&file) {
                Ok(key) => {
                    debug!("Validated: {file:?} (first record: {})", key.as_deref().unwrap_or("-"));
                    valid.push(file);
                }
                Err(err) if self.config.invalid_input_policy == InvalidInputPolicy::SkipInvalid => {
                    warn!("Skipping input: {err}");
                }
                Err(err) => return Err(err),
            }
        }
        if valid.is_empty() {
            return Err(PipelineError::NoInput);
        }
        info!("Step 2: {} FASTA file(s) validated successfully", valid.len());

        let samples = derive_samples(&valid)?;
        let sample_names: Vec<&str> = samples.iter().map(|s| s.name.as_str()).collect();
        info!("Step 3: Sample names derived from FASTA files: {sample_names:?}");
        Ok(samples)
    }

    /// Returns the first record id of a valid file
    fn validate(&self, file: &Path) -> Result<Option<String>, PipelineError> {
        let invalid = |reason: String| PipelineError::InvalidInput {
            path: file.to_path_buf(),
            reason,
        };
        if !file.is_file() {
            return Err(invalid("file not found".to_string()));
        }
        let check = self
            .validator
            .check(file)
            .map_err(|e| invalid(format!("{e:#}")))?;
        if check.valid {
            Ok(check.key)
        } else {
            Err(invalid(
                check.reason.unwrap_or_else(|| "failed validation".to_string()),
            ))
        }
    }

    /// Check the workflow definition and profile config exist, and load the
    /// profile defaults
    fn load_workflow(&self) -> Result<WorkflowDefaults, PipelineError> {
        let snakefile = self.config.snakefile_path();
        if !snakefile.is_file() {
            return Err(PipelineError::MissingWorkflowAsset(snakefile));
        }
        let profile_config = self.config.profile_config_path();
        if !profile_config.is_file() {
            return Err(PipelineError::MissingWorkflowAsset(profile_config));
        }
        let defaults = WorkflowDefaults::load(&profile_config)?;
        info!("Step 4: Using workflow {snakefile:?} with defaults from {profile_config:?}");
        Ok(defaults)
    }

    fn output_dir(&self, defaults: &WorkflowDefaults) -> PathBuf {
        self.config
            .output_dir
            .clone()
            .unwrap_or_else(|| defaults.output_dir.clone())
    }

    /// Directory the engine writes results into
    pub fn results_dir(&self) -> Result<PathBuf, PipelineError> {
        let defaults = self.load_workflow()?;
        Ok(self.config.workflow_dir.join(self.output_dir(&defaults)))
    }

    fn build_invocation(&self, config_file: &Path, targets: &[PathBuf]) -> Invocation {
        let mut args = vec![
            "--snakefile".to_string(),
            self.config.snakefile_path().display().to_string(),
            "--configfile".to_string(),
            config_file.display().to_string(),
            "--workflow-profile".to_string(),
            self.config.profile.clone(),
        ];
        args.extend(targets.iter().map(|t| t.display().to_string()));

        if let Some(slurm) = &self.config.slurm {
            args.extend([
                "--executor".to_string(),
                "slurm".to_string(),
                "--jobs".to_string(),
                slurm.jobs.to_string(),
                "--latency-wait".to_string(),
                SLURM_LATENCY_WAIT.to_string(),
                "--default-resources".to_string(),
                format!("slurm_account={}", slurm.account),
                format!("slurm_partition={}", slurm.partition),
            ]);
        }

        Invocation {
            program: self.config.engine.clone(),
            args,
            cwd: self.config.workflow_dir.clone(),
        }
    }

    /// Run the whole pipeline and return where the results are
    pub fn run(&self, inputs: &[PathBuf]) -> Result<RunReport, PipelineError> {
        let samples = self.prepare(inputs)?;
        let defaults = self.load_workflow()?;

        let output_dir = self.output_dir(&defaults);
        let targets: Vec<PathBuf> = samples
            .iter()
            .map(|s| annotation_target(&output_dir, &s.name))
            .collect();
        info!("Step 5: {} target file(s) to be generated: {targets:?}", targets.len());

        let _lock = WorkdirLock::acquire(&self.config.lock_path())?;

        let config_file = self.config.transient_config_path();
        RunConfig::from_samples(&samples, self.config.output_dir.clone()).write_to(&config_file)?;
        info!("Step 6: Wrote temporary config file to {config_file:?}");

        let invocation = self.build_invocation(&config_file, &targets);
        info!("Step 7: Command generated:\n{invocation}");

        let output = self.engine.invoke(&invocation)?;
        if !output.stdout.is_empty() {
            info!("Engine stdout:\n{}", output.stdout);
        }
        if !output.success() {
            error!("Engine stderr:\n{}", output.stderr);
            return Err(PipelineError::PipelineExecution {
                code: output.exit_code,
                stderr: output.stderr,
            });
        }
        if !output.stderr.is_empty() {
            warn!("Engine stderr:\n{}", output.stderr);
        }

        let missing: Vec<PathBuf> = targets
            .iter()
            .filter(|t| !self.config.workflow_dir.join(t).exists())
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::MissingTargets(missing));
        }
        info!("Step 8: Workflow engine finished");

        let archived_config = archive_config(&config_file, &self.config.logs_dir(), Local::now())?;
        info!("Step 9: Archived temporary config file to {archived_config:?}");

        let results_dir = self.config.workflow_dir.join(&output_dir);
        info!("Step 10: Pipeline completed, results in {results_dir:?}");
        Ok(RunReport {
            results_dir,
            samples,
            targets,
            archived_config,
        })
    }
}

/// Move the transient config into `logs_dir` as `config_<timestamp>.json`.
/// A numeric suffix is appended when that name is already taken, so an
/// earlier archive is never overwritten.
pub fn archive_config(
    config_file: &Path,
    logs_dir: &Path,
    now: DateTime<Local>,
) -> Result<PathBuf, PipelineError> {
    fs::create_dir_all(logs_dir).map_err(|source| PipelineError::Io {
        path: logs_dir.to_path_buf(),
        source,
    })?;

    let stamp = now.format("%Y%m%d_%H%M%S").to_string();
    let mut archived = logs_dir.join(format!("config_{stamp}.json"));
    let mut attempt = 0u32;
    while archived.exists() {
        attempt += 1;
        archived = logs_dir.join(format!("config_{stamp}_{attempt}.json"));
    }

    fs::rename(config_file, &archived).map_err(|source| PipelineError::Io {
        path: config_file.to_path_buf(),
        source,
    })?;
    Ok(archived)
}
