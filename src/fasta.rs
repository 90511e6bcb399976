//! FASTA reading and validation.
//!
//! Input files may be plain text or gzip-compressed (`.gz`). Validation is
//! exposed through [`FastaValidator`] so the pipeline driver can be exercised
//! with a stub in tests.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use bio::io::fasta;
use flate2::read::GzDecoder;

/// A single FASTA record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastaRecord {
    /// First whitespace-delimited token of the header line
    pub id: String,
    /// Remainder of the header line after the id
    #[allow(dead_code)] // Used in tests
    pub description: String,
    pub sequence: String,
}

/// Outcome of checking one FASTA file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FastaCheck {
    pub valid: bool,
    /// Id of the first record, when one could be read
    pub key: Option<String>,
    /// Why the file was rejected
    pub reason: Option<String>,
}

impl FastaCheck {
    fn invalid(key: Option<String>, reason: impl Into<String>) -> Self {
        FastaCheck {
            valid: false,
            key,
            reason: Some(reason.into()),
        }
    }
}

/// Validity check applied to every resolved input file
pub trait FastaValidator {
    fn check(&self, path: &Path) -> Result<FastaCheck>;
}

/// Validator backed by the on-disk file contents
#[derive(Debug, Default, Clone, Copy)]
pub struct FastaFile;

impl FastaValidator for FastaFile {
    fn check(&self, path: &Path) -> Result<FastaCheck> {
        let reader = open_reader(path)?;
        check_reader(reader)
    }
}

/// Open a file for line reading, transparently decompressing `.gz`
fn open_reader(path: &Path) -> Result<Box<dyn BufRead>> {
    let file =
        File::open(path).with_context(|| format!("Failed to open FASTA file: {path:?}"))?;
    let is_gzip = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("gz"))
        .unwrap_or(false);
    let inner: Box<dyn Read> = if is_gzip {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(Box::new(BufReader::new(inner)))
}

fn is_residue(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '*' || c == '-'
}

fn split_header(line: &str) -> (String, String) {
    let header = line.trim_start_matches('>').trim();
    match header.split_once(char::is_whitespace) {
        Some((id, rest)) => (id.to_string(), rest.trim().to_string()),
        None => (header.to_string(), String::new()),
    }
}

fn check_reader(reader: impl BufRead) -> Result<FastaCheck> {
    let mut key: Option<String> = None;
    let mut current: Option<String> = None;
    let mut residues = 0usize;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read FASTA contents")?;
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }

        if line.starts_with('>') {
            if let Some(id) = current.take() {
                if residues == 0 {
                    return Ok(FastaCheck::invalid(key, format!("record '{id}' has no sequence")));
                }
            }
            let (id, _) = split_header(line);
            if id.is_empty() {
                return Ok(FastaCheck::invalid(
                    key,
                    format!("empty header on line {}", line_no + 1),
                ));
            }
            key.get_or_insert_with(|| id.clone());
            current = Some(id);
            residues = 0;
            continue;
        }

        if current.is_none() {
            return Ok(FastaCheck::invalid(
                key,
                "sequence data found before the first '>' header",
            ));
        }
        if let Some(bad) = line.chars().find(|c| !is_residue(*c)) {
            return Ok(FastaCheck::invalid(
                key,
                format!("unexpected character '{bad}' on line {}", line_no + 1),
            ));
        }
        residues += line.len();
    }

    match current {
        None => Ok(FastaCheck::invalid(key, "no FASTA records found")),
        Some(id) if residues == 0 => {
            Ok(FastaCheck::invalid(key, format!("record '{id}' has no sequence")))
        }
        Some(_) => Ok(FastaCheck {
            valid: true,
            key,
            reason: None,
        }),
    }
}

/// Read every record of a FASTA file
pub fn read_records(path: &Path) -> Result<Vec<FastaRecord>> {
    fasta::Reader::new(open_reader(path)?)
        .records()
        .map(|record| -> Result<FastaRecord> {
            let record =
                record.with_context(|| format!("Failed to parse FASTA file: {path:?}"))?;
            Ok(FastaRecord {
                id: record.id().to_string(),
                description: record.desc().unwrap_or_default().to_string(),
                sequence: String::from_utf8_lossy(record.seq()).into_owned(),
            })
        })
        .collect()
}

/// Percentage of G and C residues, in [0, 100]
pub fn gc_content(sequence: &str) -> f64 {
    if sequence.is_empty() {
        return 0.0;
    }
    let gc = sequence
        .bytes()
        .filter(|b| matches!(b.to_ascii_uppercase(), b'G' | b'C'))
        .count();
    gc as f64 * 100.0 / sequence.len() as f64
}
