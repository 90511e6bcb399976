//! Command-line interface argument parsing for margie.
//!
//! - `margie -i genomes/ --run-all`
//! - `margie -i a.fasta b.fasta.gz --use-slurm --slurm-jobs 50`
//! - `margie --query contig_12 -o output`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use crate::pipeline::{absolutize, DriverConfig, InvalidInputPolicy, SlurmOptions};

/// Environment variable naming the workflow directory
const WORKFLOW_DIR_ENV: &str = "MARGIE_WORKFLOW_DIR";

/// Process FASTA files through the genome annotation pipeline.
#[derive(Parser, Debug)]
#[command(name = "margie")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Input FASTA file(s) or directories containing FASTA files
    #[arg(short, long, num_args = 1.., required_unless_present = "query")]
    pub input: Vec<PathBuf>,

    /// Output directory (defaults to the workflow profile's `output_dir`)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Overwrite an existing annotation database
    #[arg(short, long)]
    pub force: bool,

    /// Rows per transaction when loading the database
    #[arg(short, long, default_value = "1000")]
    pub batch_size: usize,

    /// Load pipeline results into the annotation database
    #[arg(long)]
    pub make_db: bool,

    /// Run protein annotation through the workflow engine
    #[arg(long)]
    pub run_annotation: bool,

    /// Run all pipeline steps
    #[arg(long)]
    pub run_all: bool,

    /// Submit workflow rules as SLURM jobs
    #[arg(long)]
    pub use_slurm: bool,

    /// Max concurrent SLURM jobs
    #[arg(long, default_value = "10")]
    pub slurm_jobs: u32,

    /// SLURM account used for job submission
    #[arg(long, default_value = "lindems")]
    pub slurm_account: String,

    /// SLURM partition used for job submission
    #[arg(long, default_value = "cpu")]
    pub slurm_partition: String,

    /// Directory holding the Snakefile and workflow profiles.
    /// Defaults to $MARGIE_WORKFLOW_DIR, then the user data directory.
    #[arg(long)]
    pub workflow_dir: Option<PathBuf>,

    /// Directory for the temporary run config and `.margie/logs`
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// Workflow engine executable
    #[arg(long, default_value = "snakemake")]
    pub engine: String,

    /// Drop invalid FASTA files instead of aborting the run
    #[arg(long)]
    pub skip_invalid: bool,

    /// Print the stored annotations of a sequence header
    #[arg(long, value_name = "HEADER")]
    pub query: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

/// Which parts of the tool to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Modes {
    pub run_annotation: bool,
    pub make_db: bool,
}

/// Settings for loading results into the database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOptions {
    pub force: bool,
    pub batch_size: usize,
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub inputs: Vec<PathBuf>,
    pub driver: DriverConfig,
    pub modes: Modes,
    pub ingest: IngestOptions,
    pub query: Option<String>,
}

fn default_workflow_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(WORKFLOW_DIR_ENV) {
        return PathBuf::from(dir);
    }
    dirs::data_local_dir()
        .map(|d| d.join("margie").join("workflow"))
        .unwrap_or_else(|| PathBuf::from("workflow"))
}

impl AppConfig {
    /// Create AppConfig from parsed arguments
    pub fn from_cli(cli: Cli) -> Result<Self> {
        let workflow_dir = cli.workflow_dir.unwrap_or_else(default_workflow_dir);
        let workflow_dir = absolutize(&workflow_dir)
            .with_context(|| format!("Failed to resolve workflow directory {workflow_dir:?}"))?;
        let work_dir = absolutize(&cli.work_dir.unwrap_or_else(|| PathBuf::from(".")))
            .context("Failed to resolve working directory")?;

        let mut driver = DriverConfig::new(workflow_dir, work_dir);
        driver.engine = cli.engine;
        driver.output_dir = cli.output;
        if cli.use_slurm {
            driver.slurm = Some(SlurmOptions {
                jobs: cli.slurm_jobs,
                account: cli.slurm_account,
                partition: cli.slurm_partition,
            });
        }
        if cli.skip_invalid {
            driver.invalid_input_policy = InvalidInputPolicy::SkipInvalid;
        }

        // With no explicit step the annotation workflow runs, unless only a
        // query was asked for
        let any_step = cli.run_annotation || cli.make_db || cli.run_all;
        let modes = Modes {
            run_annotation: cli.run_annotation
                || cli.run_all
                || (!any_step && cli.query.is_none()),
            make_db: cli.make_db || cli.run_all,
        };

        Ok(AppConfig {
            inputs: cli.input,
            driver,
            modes,
            ingest: IngestOptions {
                force: cli.force,
                batch_size: cli.batch_size.max(1),
            },
            query: cli.query,
        })
    }
}
