//! SQLite storage layer for sequences and their annotations.
//!
//! Schema:
//! - `sequences` table: id, header (unique), sequence, length, gc_content
//! - `annotations` table: id, sequence_id -> sequences(id), annotation_type,
//!   tool, start_pos, end_pos, description
//!
//! One store file has a single writer: the driver serializes runs per
//! working directory and nothing else writes to the database while a run
//! ingests into it. Concurrent writers from several processes are not
//! supported.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{ffi, params, Connection, OptionalExtension, Row};
use thiserror::Error;

use super::models::{Annotation, NewAnnotation, NewSequence, Sequence, Summary};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sequences (
    id INTEGER PRIMARY KEY,
    header TEXT UNIQUE NOT NULL,
    sequence TEXT NOT NULL,
    length INTEGER NOT NULL,
    gc_content REAL NOT NULL
);
CREATE TABLE IF NOT EXISTS annotations (
    id INTEGER PRIMARY KEY,
    sequence_id INTEGER NOT NULL REFERENCES sequences(id),
    annotation_type TEXT NOT NULL,
    tool TEXT NOT NULL,
    start_pos INTEGER NOT NULL,
    end_pos INTEGER NOT NULL,
    description TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_annotations_sequence ON annotations(sequence_id);
";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors raised by the annotation store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sequence header already stored: {0}")]
    DuplicateHeader(String),
    #[error("no sequence with id {0}")]
    ForeignKey(i64),
    #[error("annotation store is closed")]
    Closed,
    #[error("invalid annotation coordinates {start}..{end} (1-based, start <= end)")]
    InvalidCoordinates { start: i64, end: i64 },
    #[error("gc content {0} is outside [0, 100]")]
    InvalidGcContent(f64),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Extended SQLite result code of a failed statement, if any
fn extended_code(err: &rusqlite::Error) -> Option<i32> {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => Some(e.extended_code),
        _ => None,
    }
}

fn annotation_from_row(row: &Row) -> rusqlite::Result<Annotation> {
    Ok(Annotation {
        id: row.get(0)?,
        sequence_id: row.get(1)?,
        annotation_type: row.get(2)?,
        tool: row.get(3)?,
        start_pos: row.get(4)?,
        end_pos: row.get(5)?,
        description: row.get(6)?,
    })
}

fn insert_sequence_row(conn: &Connection, seq: &NewSequence) -> Result<i64, StoreError> {
    if !(0.0..=100.0).contains(&seq.gc_content) {
        return Err(StoreError::InvalidGcContent(seq.gc_content));
    }
    conn.execute(
        "INSERT INTO sequences (header, sequence, length, gc_content) VALUES (?1, ?2, ?3, ?4)",
        params![seq.header, seq.sequence, seq.length, seq.gc_content],
    )
    .map_err(|e| match extended_code(&e) {
        Some(ffi::SQLITE_CONSTRAINT_UNIQUE) => StoreError::DuplicateHeader(seq.header.clone()),
        _ => StoreError::Sqlite(e),
    })?;
    Ok(conn.last_insert_rowid())
}

fn insert_annotation_row(conn: &Connection, ann: &NewAnnotation) -> Result<i64, StoreError> {
    if ann.start_pos < 1 || ann.start_pos > ann.end_pos {
        return Err(StoreError::InvalidCoordinates {
            start: ann.start_pos,
            end: ann.end_pos,
        });
    }
    conn.execute(
        "INSERT INTO annotations
            (sequence_id, annotation_type, tool, start_pos, end_pos, description)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            ann.sequence_id,
            ann.annotation_type,
            ann.tool,
            ann.start_pos,
            ann.end_pos,
            ann.description
        ],
    )
    .map_err(|e| match extended_code(&e) {
        Some(ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => StoreError::ForeignKey(ann.sequence_id),
        _ => StoreError::Sqlite(e),
    })?;
    Ok(conn.last_insert_rowid())
}

/// Persistent store of sequences and annotations backed by one connection
pub struct AnnotationDatabase {
    path: PathBuf,
    conn: Option<Connection>,
}

impl AnnotationDatabase {
    /// Open (or create) a store, creating the schema when absent
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        tracing::debug!(path = %path.display(), "opened annotation store");
        Ok(AnnotationDatabase {
            path,
            conn: Some(conn),
        })
    }

    /// Location of the store file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> Result<&Connection, StoreError> {
        self.conn.as_ref().ok_or(StoreError::Closed)
    }

    fn conn_mut(&mut self) -> Result<&mut Connection, StoreError> {
        self.conn.as_mut().ok_or(StoreError::Closed)
    }

    /// Insert a sequence and return its id
    #[allow(dead_code)] // Used in tests
    pub fn insert_sequence(
        &self,
        header: &str,
        sequence: &str,
        length: i64,
        gc_content: f64,
    ) -> Result<i64, StoreError> {
        let row = NewSequence {
            header: header.to_string(),
            sequence: sequence.to_string(),
            length,
            gc_content,
        };
        insert_sequence_row(self.conn()?, &row)
    }

    /// Insert an annotation for an existing sequence and return its id
    #[allow(dead_code)] // Used in tests
    pub fn insert_annotation(
        &self,
        sequence_id: i64,
        annotation_type: &str,
        tool: &str,
        start_pos: i64,
        end_pos: i64,
        description: &str,
    ) -> Result<i64, StoreError> {
        let row = NewAnnotation {
            sequence_id,
            annotation_type: annotation_type.to_string(),
            tool: tool.to_string(),
            start_pos,
            end_pos,
            description: description.to_string(),
        };
        insert_annotation_row(self.conn()?, &row)
    }

    /// Insert a batch of sequences in one transaction.
    /// Either every row is stored or none is.
    pub fn insert_sequences(&mut self, rows: &[NewSequence]) -> Result<Vec<i64>, StoreError> {
        let tx = self.conn_mut()?.transaction()?;
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            ids.push(insert_sequence_row(&tx, row)?);
        }
        tx.commit()?;
        Ok(ids)
    }

    /// Insert a batch of annotations in one transaction.
    /// Either every row is stored or none is.
    pub fn insert_annotations(&mut self, rows: &[NewAnnotation]) -> Result<usize, StoreError> {
        let tx = self.conn_mut()?.transaction()?;
        for row in rows {
            insert_annotation_row(&tx, row)?;
        }
        tx.commit()?;
        Ok(rows.len())
    }

    /// Look up a sequence by header
    pub fn get_sequence(&self, header: &str) -> Result<Option<Sequence>, StoreError> {
        let sequence = self
            .conn()?
            .query_row(
                "SELECT id, header, sequence, length, gc_content FROM sequences WHERE header = ?1",
                [header],
                |row| {
                    Ok(Sequence {
                        id: row.get(0)?,
                        header: row.get(1)?,
                        sequence: row.get(2)?,
                        length: row.get(3)?,
                        gc_content: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(sequence)
    }

    /// All annotations of a sequence ordered by start position.
    /// An unknown header yields an empty list.
    pub fn get_sequence_annotations(&self, header: &str) -> Result<Vec<Annotation>, StoreError> {
        let mut stmt = self.conn()?.prepare(
            "SELECT a.id, a.sequence_id, a.annotation_type, a.tool,
                    a.start_pos, a.end_pos, a.description
             FROM annotations a
             JOIN sequences s ON s.id = a.sequence_id
             WHERE s.header = ?1
             ORDER BY a.start_pos, a.id",
        )?;
        let annotations = stmt
            .query_map([header], annotation_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(annotations)
    }

    /// Sequence count and annotation counts per type
    pub fn summarize(&self) -> Result<Summary, StoreError> {
        let conn = self.conn()?;
        let sequence_count: usize =
            conn.query_row("SELECT COUNT(*) FROM sequences", [], |row| row.get(0))?;

        let mut stmt = conn.prepare(
            "SELECT annotation_type, COUNT(*) FROM annotations GROUP BY annotation_type",
        )?;
        let annotation_counts: BTreeMap<String, usize> = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, usize>(1)?)))?
            .collect::<rusqlite::Result<_>>()?;

        Ok(Summary {
            sequence_count,
            annotation_counts,
        })
    }

    /// Release the connection. Every later call fails with [`StoreError::Closed`].
    pub fn close(&mut self) -> Result<(), StoreError> {
        let conn = self.conn.take().ok_or(StoreError::Closed)?;
        conn.close().map_err(|(_, e)| StoreError::Sqlite(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, AnnotationDatabase) {
        let dir = TempDir::new().unwrap();
        let db = AnnotationDatabase::open(dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    #[test]
    fn test_summarize_two_sequences() {
        let (_dir, db) = open_temp();
        let seq1 = db.insert_sequence("seq1", "ATGCGATCG", 9, 55.6).unwrap();
        let seq2 = db.insert_sequence("seq2", "GCTAGCTAG", 9, 55.6).unwrap();
        db.insert_annotation(seq1, "pfam", "hmmscan", 1, 100, "Test domain")
            .unwrap();
        db.insert_annotation(seq2, "tigrfam", "hmmscan", 50, 150, "Another domain")
            .unwrap();

        let summary = db.summarize().unwrap();
        assert_eq!(summary.sequence_count, 2);
        assert_eq!(summary.annotation_counts.len(), 2);
        assert_eq!(summary.annotation_counts["pfam"], 1);
        assert_eq!(summary.annotation_counts["tigrfam"], 1);
    }

    #[test]
    fn test_sequence_without_annotations_returns_empty() {
        let (_dir, db) = open_temp();
        db.insert_sequence("lonely", "ACGT", 4, 50.0).unwrap();
        assert!(db.get_sequence_annotations("lonely").unwrap().is_empty());
        assert!(db.get_sequence_annotations("unknown").unwrap().is_empty());
    }

    #[test]
    fn test_annotations_ordered_by_start() {
        let (_dir, db) = open_temp();
        let id = db.insert_sequence("seq1", "ACGT", 4, 50.0).unwrap();
        db.insert_annotation(id, "pfam", "hmmscan", 300, 400, "third").unwrap();
        db.insert_annotation(id, "pfam", "hmmscan", 1, 100, "first").unwrap();
        db.insert_annotation(id, "tigrfam", "hmmscan", 150, 200, "second")
            .unwrap();

        let annotations = db.get_sequence_annotations("seq1").unwrap();
        let starts: Vec<i64> = annotations.iter().map(|a| a.start_pos).collect();
        assert_eq!(starts, vec![1, 150, 300]);
        assert_eq!(annotations[0].description, "first");
        assert_eq!(annotations[0].end_pos, 100);
        assert!(annotations.iter().all(|a| a.sequence_id == id));
    }

    #[test]
    fn test_foreign_key_violation_persists_nothing() {
        let (_dir, db) = open_temp();
        let err = db
            .insert_annotation(42, "pfam", "hmmscan", 1, 100, "orphan")
            .unwrap_err();
        assert!(matches!(err, StoreError::ForeignKey(42)));

        let summary = db.summarize().unwrap();
        assert_eq!(summary.total_annotations(), 0);
    }

    #[test]
    fn test_duplicate_header_rejected() {
        let (_dir, db) = open_temp();
        db.insert_sequence("seq1", "ACGT", 4, 50.0).unwrap();
        let err = db.insert_sequence("seq1", "GGGG", 4, 100.0).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateHeader(h) if h == "seq1"));
        assert_eq!(db.summarize().unwrap().sequence_count, 1);
    }

    #[test]
    fn test_boundary_validation() {
        let (_dir, db) = open_temp();
        assert!(matches!(
            db.insert_sequence("bad", "ACGT", 4, 120.0),
            Err(StoreError::InvalidGcContent(_))
        ));
        let id = db.insert_sequence("seq1", "ACGT", 4, 50.0).unwrap();
        assert!(matches!(
            db.insert_annotation(id, "pfam", "hmmscan", 10, 5, ""),
            Err(StoreError::InvalidCoordinates { start: 10, end: 5 })
        ));
        assert!(matches!(
            db.insert_annotation(id, "pfam", "hmmscan", 0, 5, ""),
            Err(StoreError::InvalidCoordinates { .. })
        ));
        // Single-residue features are allowed
        db.insert_annotation(id, "pfam", "hmmscan", 7, 7, "").unwrap();
    }

    #[test]
    fn test_reopen_keeps_existing_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.db");

        let mut db = AnnotationDatabase::open(&path).unwrap();
        let id = db.insert_sequence("seq1", "ACGT", 4, 50.0).unwrap();
        db.insert_annotation(id, "pfam", "hmmscan", 1, 4, "kept").unwrap();
        db.close().unwrap();

        let db = AnnotationDatabase::open(&path).unwrap();
        assert_eq!(db.summarize().unwrap().sequence_count, 1);
        assert_eq!(db.get_sequence_annotations("seq1").unwrap().len(), 1);
        assert_eq!(db.path(), path.as_path());
    }

    #[test]
    fn test_operations_after_close_fail() {
        let (_dir, mut db) = open_temp();
        db.close().unwrap();

        assert!(matches!(db.summarize(), Err(StoreError::Closed)));
        assert!(matches!(
            db.insert_sequence("seq1", "ACGT", 4, 50.0),
            Err(StoreError::Closed)
        ));
        assert!(matches!(
            db.get_sequence_annotations("seq1"),
            Err(StoreError::Closed)
        ));
        assert!(matches!(db.insert_sequences(&[]), Err(StoreError::Closed)));
        assert!(matches!(db.close(), Err(StoreError::Closed)));
    }

    #[test]
    fn test_batch_insert_is_all_or_nothing() {
        let (_dir, mut db) = open_temp();
        let ids = db
            .insert_sequences(&[
                NewSequence::from_residues("a", "ACGT"),
                NewSequence::from_residues("b", "GGCC"),
            ])
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(db.get_sequence("b").unwrap().unwrap().gc_content, 100.0);

        let err = db
            .insert_sequences(&[
                NewSequence::from_residues("c", "ACGT"),
                NewSequence::from_residues("a", "ACGT"),
            ])
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateHeader(_)));
        assert!(db.get_sequence("c").unwrap().is_none());

        let annotation = |sequence_id| NewAnnotation {
            sequence_id,
            annotation_type: "pfam".to_string(),
            tool: "hmmscan".to_string(),
            start_pos: 1,
            end_pos: 4,
            description: String::new(),
        };
        let err = db
            .insert_annotations(&[annotation(ids[0]), annotation(999)])
            .unwrap_err();
        assert!(matches!(err, StoreError::ForeignKey(999)));
        assert_eq!(db.summarize().unwrap().total_annotations(), 0);

        assert_eq!(db.insert_annotations(&[annotation(ids[1])]).unwrap(), 1);
    }
}
