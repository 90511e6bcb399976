//! Loading pipeline results into the annotation store.
//!
//! Each sample contributes its FASTA records as sequences and the rows of its
//! aggregated GFF file as annotations.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use super::models::{NewAnnotation, NewSequence};
use super::storage::AnnotationDatabase;
use crate::fasta;
use crate::pipeline::{annotation_target, Sample};

/// Counters reported after an ingestion pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub sequences: usize,
    pub annotations: usize,
    /// Rows referencing a sequence outside their own sample
    pub orphans: usize,
    /// Rows that could not be parsed
    pub malformed: usize,
}

/// One feature row of a GFF3 file
#[derive(Debug, Clone, PartialEq, Eq)]
struct GffFeature {
    seqid: String,
    source: String,
    feature_type: String,
    start: i64,
    end: i64,
    attributes: Vec<(String, String)>,
}

impl GffFeature {
    fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }

    fn annotation_type(&self) -> String {
        self.attribute("annotation_type")
            .or_else(|| self.attribute("db"))
            .unwrap_or(self.source.as_str())
            .to_lowercase()
    }

    fn description(&self) -> String {
        ["description", "product", "Name", "ID"]
            .iter()
            .find_map(|key| self.attribute(key))
            .unwrap_or_default()
            .to_string()
    }
}

/// Parse one GFF line. Comments and blank lines yield `Ok(None)`.
fn parse_gff_line(line: &str) -> Result<Option<GffFeature>, String> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let columns: Vec<&str> = line.split('\t').collect();
    if columns.len() != 9 {
        return Err(format!("expected 9 columns, found {}", columns.len()));
    }
    let start = columns[3]
        .parse::<i64>()
        .map_err(|_| format!("invalid start '{}'", columns[3]))?;
    let end = columns[4]
        .parse::<i64>()
        .map_err(|_| format!("invalid end '{}'", columns[4]))?;
    if start < 1 || start > end {
        return Err(format!("invalid coordinates {start}..{end}"));
    }

    let attributes = columns[8]
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    Ok(Some(GffFeature {
        seqid: columns[0].to_string(),
        source: columns[1].to_string(),
        feature_type: columns[2].to_string(),
        start,
        end,
        attributes,
    }))
}

/// Ingest every sample's sequences and aggregated annotations.
///
/// Sequences must be stored before their annotations. A GFF row may only
/// reference sequences from its own sample's FASTA; any other row is counted
/// as an orphan and skipped.
pub fn ingest_samples(
    db: &mut AnnotationDatabase,
    samples: &[Sample],
    results_dir: &Path,
    batch_size: usize,
) -> Result<IngestStats> {
    let batch_size = batch_size.max(1);
    let mut stats = IngestStats::default();
    // Header -> owning sample, across every sample loaded so far
    let mut owners: HashMap<String, String> = HashMap::new();

    for sample in samples {
        let mut sequence_ids: HashMap<String, i64> = HashMap::new();
        let records = fasta::read_records(&sample.source_file)?;
        let rows: Vec<NewSequence> = records
            .into_iter()
            .map(|r| NewSequence::from_residues(r.id, r.sequence))
            .collect();

        for chunk in rows.chunks(batch_size) {
            let ids = db
                .insert_sequences(chunk)
                .with_context(|| format!("Failed to store sequences of sample '{}'", sample.name))?;
            for (row, id) in chunk.iter().zip(ids) {
                sequence_ids.insert(row.header.clone(), id);
                owners.insert(row.header.clone(), sample.name.clone());
            }
            stats.sequences += chunk.len();
        }

        let gff_path = annotation_target(results_dir, &sample.name);
        if !gff_path.exists() {
            warn!("No annotations for sample '{}': {gff_path:?} not found", sample.name);
            continue;
        }
        let contents = std::fs::read_to_string(&gff_path)
            .with_context(|| format!("Failed to read annotations: {gff_path:?}"))?;

        let mut annotations = Vec::new();
        for (line_no, line) in contents.lines().enumerate() {
            let feature = match parse_gff_line(line) {
                Ok(Some(feature)) => feature,
                Ok(None) => continue,
                Err(reason) => {
                    warn!("{gff_path:?}:{}: skipping malformed row: {reason}", line_no + 1);
                    stats.malformed += 1;
                    continue;
                }
            };
            let Some(&sequence_id) = sequence_ids.get(&feature.seqid) else {
                match owners.get(&feature.seqid) {
                    Some(owner) => warn!(
                        "{gff_path:?}:{}: sequence '{}' belongs to sample '{owner}', not '{}'",
                        line_no + 1,
                        feature.seqid,
                        sample.name
                    ),
                    None => debug!(
                        "{gff_path:?}:{}: unknown sequence '{}'",
                        line_no + 1,
                        feature.seqid
                    ),
                }
                stats.orphans += 1;
                continue;
            };
            debug!(
                "{}: {} {}..{}",
                feature.seqid, feature.feature_type, feature.start, feature.end
            );
            annotations.push(NewAnnotation {
                sequence_id,
                annotation_type: feature.annotation_type(),
                tool: feature.source.clone(),
                start_pos: feature.start,
                end_pos: feature.end,
                description: feature.description(),
            });
        }

        for chunk in annotations.chunks(batch_size) {
            stats.annotations += db.insert_annotations(chunk).with_context(|| {
                format!("Failed to store annotations of sample '{}'", sample.name)
            })?;
        }
        info!(
            "Ingested sample '{}': {} annotation(s) from {gff_path:?}",
            sample.name,
            annotations.len()
        );
    }

    if stats.orphans > 0 {
        warn!(
            "{} annotation row(s) referenced sequences missing from the inputs",
            stats.orphans
        );
    }

    Ok(stats)
}
