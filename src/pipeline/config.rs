//! Driver configuration, workflow defaults and the per-run configuration
//! handed to the workflow engine.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::PipelineError;

/// Output directory used when the workflow profile does not name one
pub const DEFAULT_OUTPUT_DIR: &str = "output";

/// Directory under the working directory holding driver state and logs
const STATE_DIR: &str = ".margie";

/// One input genome, named after its file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub name: String,
    pub source_file: PathBuf,
}

/// What to do when a resolved input fails validation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InvalidInputPolicy {
    /// Abort the run on the first invalid file
    #[default]
    FailFast,
    /// Drop invalid files and continue with the rest
    SkipInvalid,
}

/// Cluster submission settings passed through to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlurmOptions {
    pub jobs: u32,
    pub account: String,
    pub partition: String,
}

/// Explicit configuration for [`super::PipelineDriver`]
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Directory holding the workflow definition and its profiles.
    /// The engine runs with this as its working directory.
    pub workflow_dir: PathBuf,
    /// Directory receiving the transient config and the archived logs
    pub work_dir: PathBuf,
    /// Workflow definition file name inside `workflow_dir`
    pub snakefile: String,
    /// Workflow profile directory relative to `workflow_dir`
    pub profile: String,
    /// Engine executable
    pub engine: String,
    /// Overrides the profile's `output_dir`
    pub output_dir: Option<PathBuf>,
    pub slurm: Option<SlurmOptions>,
    pub invalid_input_policy: InvalidInputPolicy,
}

impl DriverConfig {
    pub fn new(workflow_dir: PathBuf, work_dir: PathBuf) -> Self {
        DriverConfig {
            workflow_dir,
            work_dir,
            snakefile: "Snakefile".to_string(),
            profile: "profiles/default".to_string(),
            engine: "snakemake".to_string(),
            output_dir: None,
            slurm: None,
            invalid_input_policy: InvalidInputPolicy::default(),
        }
    }

    pub fn snakefile_path(&self) -> PathBuf {
        self.workflow_dir.join(&self.snakefile)
    }

    /// Default workflow configuration shipped with the profile
    pub fn profile_config_path(&self) -> PathBuf {
        self.workflow_dir.join(&self.profile).join("config.yaml")
    }

    pub fn transient_config_path(&self) -> PathBuf {
        self.work_dir.join("temp_snakemake_config.json")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.work_dir.join(STATE_DIR).join("logs")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.work_dir.join(STATE_DIR).join("driver.lock")
    }
}

/// Recognized keys of the profile's top-level `config` mapping
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorkflowDefaults {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_DIR)
}

impl Default for WorkflowDefaults {
    fn default() -> Self {
        WorkflowDefaults {
            output_dir: default_output_dir(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WorkflowProfile {
    #[serde(default)]
    config: Option<WorkflowDefaults>,
}

impl WorkflowDefaults {
    /// Parse a profile YAML document. Unknown keys are ignored.
    pub fn from_yaml(contents: &str) -> Result<Self, PipelineError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let profile: WorkflowProfile = serde_yaml::from_str(contents)?;
        Ok(profile.config.unwrap_or_default())
    }

    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let contents = fs::read_to_string(path).map_err(|source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&contents)
    }
}

/// Aggregated annotation file the engine produces for one sample
pub fn annotation_target(output_dir: &Path, sample: &str) -> PathBuf {
    output_dir
        .join("annotations")
        .join("agg")
        .join(format!("{sample}.gff"))
}

/// Configuration consumed by the workflow engine for a single run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    pub sample_to_file: BTreeMap<String, PathBuf>,
    pub samples: Vec<String>,
    /// Present only when the output directory was overridden for this run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

impl RunConfig {
    pub fn from_samples(samples: &[Sample], output_dir: Option<PathBuf>) -> Self {
        RunConfig {
            sample_to_file: samples
                .iter()
                .map(|s| (s.name.clone(), s.source_file.clone()))
                .collect(),
            samples: samples.iter().map(|s| s.name.clone()).collect(),
            output_dir,
        }
    }

    /// Serialize as pretty JSON to `path`, replacing any previous file
    pub fn write_to(&self, path: &Path) -> Result<(), PipelineError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_yaml() {
        let yaml = "config:\n  output_dir: results\n  threads: 8\nuse-conda: true\n";
        let defaults = WorkflowDefaults::from_yaml(yaml).unwrap();
        assert_eq!(defaults.output_dir, PathBuf::from("results"));
    }

    #[test]
    fn test_defaults_fall_back_to_output() {
        for yaml in ["", "cores: 4\n", "config:\n", "config:\n  threads: 2\n"] {
            let defaults = WorkflowDefaults::from_yaml(yaml).unwrap();
            assert_eq!(defaults.output_dir, PathBuf::from(DEFAULT_OUTPUT_DIR), "{yaml:?}");
        }
    }

    #[test]
    fn test_malformed_yaml_is_an_error() {
        assert!(matches!(
            WorkflowDefaults::from_yaml("config: [unclosed"),
            Err(PipelineError::Yaml(_))
        ));
    }

    #[test]
    fn test_annotation_target_layout() {
        assert_eq!(
            annotation_target(Path::new("output"), "genome1"),
            PathBuf::from("output/annotations/agg/genome1.gff")
        );
    }

    #[test]
    fn test_run_config_json_shape() {
        let samples = vec![
            Sample {
                name: "b".to_string(),
                source_file: PathBuf::from("/data/b.fasta"),
            },
            Sample {
                name: "a".to_string(),
                source_file: PathBuf::from("/data/a.fasta.gz"),
            },
        ];
        let config = RunConfig::from_samples(&samples, None);
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "sample_to_file": {"a": "/data/a.fasta.gz", "b": "/data/b.fasta"},
                "samples": ["b", "a"],
            })
        );

        let config = RunConfig::from_samples(&samples, Some(PathBuf::from("elsewhere")));
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["output_dir"], "elsewhere");
    }

    #[test]
    fn test_driver_paths() {
        let config = DriverConfig::new(PathBuf::from("/wf"), PathBuf::from("/work"));
        assert_eq!(config.snakefile_path(), PathBuf::from("/wf/Snakefile"));
        assert_eq!(
            config.profile_config_path(),
            PathBuf::from("/wf/profiles/default/config.yaml")
        );
        assert_eq!(config.logs_dir(), PathBuf::from("/work/.margie/logs"));
        assert_eq!(
            config.transient_config_path(),
            PathBuf::from("/work/temp_snakemake_config.json")
        );
    }
}
