//! Top-level application flow: annotation run, database load, and queries.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::cli::{AppConfig, IngestOptions};
use crate::data::{ingest_samples, AnnotationDatabase, Summary};
use crate::fasta::FastaFile;
use crate::pipeline::{PipelineDriver, Sample, SnakemakeEngine};

/// File name of the annotation store inside the results directory
const DATABASE_FILE: &str = "margie.db";

fn database_path(results_dir: &Path) -> PathBuf {
    results_dir.join(DATABASE_FILE)
}

/// Create a fresh store under `results_dir` and load every sample into it
fn build_database(
    results_dir: &Path,
    samples: &[Sample],
    options: IngestOptions,
) -> Result<Summary> {
    let path = database_path(results_dir);
    if path.exists() {
        if !options.force {
            anyhow::bail!("Database {path:?} already exists (use --force to overwrite)");
        }
        fs::remove_file(&path).with_context(|| format!("Failed to remove {path:?}"))?;
        info!("Removed existing database {path:?}");
    }
    fs::create_dir_all(results_dir)
        .with_context(|| format!("Failed to create results directory {results_dir:?}"))?;

    let mut db = AnnotationDatabase::open(&path)
        .with_context(|| format!("Failed to open database {path:?}"))?;
    let stats = ingest_samples(&mut db, samples, results_dir, options.batch_size)?;
    info!(
        "Stored {} sequence(s) and {} annotation(s) in {:?} \
         ({} orphan, {} malformed row(s) skipped)",
        stats.sequences,
        stats.annotations,
        db.path(),
        stats.orphans,
        stats.malformed
    );
    let summary = db.summarize()?;
    db.close()?;
    Ok(summary)
}

/// Render one header's annotations, ordered by start position
fn format_annotations(db: &AnnotationDatabase, header: &str) -> Result<String> {
    let Some(sequence) = db.get_sequence(header)? else {
        return Ok(format!("Sequence '{header}' not found in {:?}", db.path()));
    };
    let annotations = db.get_sequence_annotations(header)?;

    let mut out = format!(
        "{} ({} residues, {:.1}% GC): {} annotation(s)",
        sequence.header,
        sequence.length,
        sequence.gc_content,
        annotations.len()
    );
    for ann in &annotations {
        out.push_str(&format!(
            "\n  - {} [{}] {}-{}: {}",
            ann.annotation_type, ann.tool, ann.start_pos, ann.end_pos, ann.description
        ));
    }
    Ok(out)
}

fn query_database(results_dir: &Path, header: &str) -> Result<String> {
    let path = database_path(results_dir);
    if !path.exists() {
        anyhow::bail!("No annotation database at {path:?} (run with --make-db first)");
    }
    let mut db = AnnotationDatabase::open(&path)
        .with_context(|| format!("Failed to open database {path:?}"))?;
    let report = format_annotations(&db, header)?;
    db.close()?;
    Ok(report)
}

/// Run the selected modes in order: annotation, database, query
pub fn run(config: AppConfig) -> Result<()> {
    let driver = PipelineDriver::new(config.driver, FastaFile, SnakemakeEngine);
    let mut results_dir: Option<PathBuf> = None;
    let mut samples: Option<Vec<Sample>> = None;

    if config.modes.run_annotation {
        let report = driver
            .run(&config.inputs)
            .context("Annotation pipeline failed")?;
        info!(
            "Margie pipeline completed successfully: {} target(s) for {} sample(s), \
             config archived to {:?}",
            report.targets.len(),
            report.samples.len(),
            report.archived_config
        );
        results_dir = Some(report.results_dir);
        samples = Some(report.samples);
    }

    if config.modes.make_db {
        let samples = match samples.take() {
            Some(samples) => samples,
            None => driver.prepare(&config.inputs)?,
        };
        let dir = match results_dir.take() {
            Some(dir) => dir,
            None => driver.results_dir()?,
        };
        let summary = build_database(&dir, &samples, config.ingest)?;
        println!("{summary}");
        results_dir = Some(dir);
    }

    if let Some(header) = &config.query {
        let dir = match results_dir {
            Some(dir) => dir,
            None => driver.results_dir()?,
        };
        println!("{}", query_database(&dir, header)?);
    }

    Ok(())
}
