//! Data models for sequences, annotations and store summaries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A persisted sequence row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    pub id: i64,
    pub header: String,
    pub sequence: String,
    pub length: i64,
    /// G+C percentage in [0, 100]
    pub gc_content: f64,
}

/// A persisted annotation row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: i64,
    pub sequence_id: i64,
    /// Annotation source database (e.g. "pfam", "tigrfam")
    pub annotation_type: String,
    pub tool: String,
    /// 1-based inclusive start
    pub start_pos: i64,
    /// 1-based inclusive end
    pub end_pos: i64,
    pub description: String,
}

/// A sequence waiting to be inserted
#[derive(Debug, Clone, PartialEq)]
pub struct NewSequence {
    pub header: String,
    pub sequence: String,
    pub length: i64,
    pub gc_content: f64,
}

impl NewSequence {
    /// Build a row from raw residues, deriving length and GC content
    pub fn from_residues(header: impl Into<String>, sequence: impl Into<String>) -> Self {
        let sequence = sequence.into();
        NewSequence {
            header: header.into(),
            length: sequence.len() as i64,
            gc_content: crate::fasta::gc_content(&sequence),
            sequence,
        }
    }
}

/// An annotation waiting to be inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAnnotation {
    pub sequence_id: i64,
    pub annotation_type: String,
    pub tool: String,
    pub start_pos: i64,
    pub end_pos: i64,
    pub description: String,
}

/// Aggregate counts used for run reporting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub sequence_count: usize,
    /// Annotation count per annotation type, ordered by type
    pub annotation_counts: BTreeMap<String, usize>,
}

impl Summary {
    pub fn total_annotations(&self) -> usize {
        self.annotation_counts.values().sum()
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Sequences in database: {}", self.sequence_count)?;
        if self.annotation_counts.is_empty() {
            write!(f, "Annotations: none")
        } else {
            write!(f, "Annotations: {}", self.total_annotations())?;
            for (annotation_type, count) in &self.annotation_counts {
                write!(f, "\n  {annotation_type}: {count}")?;
            }
            Ok(())
        }
    }
}
