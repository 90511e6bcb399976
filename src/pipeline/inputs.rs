//! Input resolution: expanding paths into FASTA files and naming samples.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;

use super::config::Sample;
use super::error::PipelineError;

/// File name endings picked up when scanning a directory
pub const FASTA_SUFFIXES: &[&str] = &[
    ".fasta", ".fasta.gz", ".fa", ".fa.gz", ".fna", ".fna.gz", ".faa", ".faa.gz",
];

/// Make a path absolute against the current directory without touching the filesystem
pub fn absolutize(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

fn has_fasta_suffix(name: &str) -> bool {
    FASTA_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

fn scan_directory(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let io_err = |source| PipelineError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(has_fasta_suffix)
            .unwrap_or(false);
        if matches && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Expand files and directories into an ordered, deduplicated list of
/// absolute FASTA paths. Paths that do not exist are skipped with a warning.
pub fn resolve_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, PipelineError> {
    let mut seen = HashSet::new();
    let mut resolved = Vec::new();

    for input in inputs {
        let candidates = if input.is_dir() {
            scan_directory(input)?
        } else if input.is_file() {
            vec![input.clone()]
        } else {
            warn!("Path {input:?} does not exist");
            continue;
        };

        for candidate in candidates {
            let absolute = absolutize(&candidate).map_err(|source| PipelineError::Io {
                path: candidate.clone(),
                source,
            })?;
            if seen.insert(absolute.clone()) {
                resolved.push(absolute);
            }
        }
    }

    Ok(resolved)
}

/// Sample name for a FASTA path: the file stem (`genome.fasta` -> `genome`,
/// `genome.fasta.gz` -> `genome.fasta`).
pub fn sample_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// One sample per file, in input order. Two files mapping to the same name
/// are rejected.
pub fn derive_samples(files: &[PathBuf]) -> Result<Vec<Sample>, PipelineError> {
    let mut owners: HashMap<String, &PathBuf> = HashMap::new();
    let mut samples = Vec::with_capacity(files.len());

    for file in files {
        let name = sample_name(file);
        match owners.entry(name.clone()) {
            Entry::Occupied(existing) => {
                return Err(PipelineError::DuplicateSample {
                    name,
                    first: existing.get().to_path_buf(),
                    second: file.clone(),
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(file);
            }
        }
        samples.push(Sample {
            name,
            source_file: file.clone(),
        });
    }

    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, ">s\nACGT\n").unwrap();
        path
    }

    #[test]
    fn test_directory_resolves_plain_and_gzip() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "genome2.fasta.gz");
        touch(dir.path(), "genome1.fasta");
        touch(dir.path(), "notes.txt");

        let files = resolve_inputs(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("genome1.fasta"));
        assert!(files[1].ends_with("genome2.fasta.gz"));
        assert!(files.iter().all(|f| f.is_absolute()));
    }

    #[test]
    fn test_directory_without_fasta_resolves_nothing() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "readme.md");
        assert!(resolve_inputs(&[dir.path().to_path_buf()]).unwrap().is_empty());
    }

    #[test]
    fn test_missing_paths_skipped_and_duplicates_removed() {
        let dir = TempDir::new().unwrap();
        let file = touch(dir.path(), "a.fa");

        let files = resolve_inputs(&[
            dir.path().join("missing.fasta"),
            file.clone(),
            dir.path().to_path_buf(),
            file.clone(),
        ])
        .unwrap();
        assert_eq!(files, vec![file]);
    }

    #[test]
    fn test_explicit_file_taken_regardless_of_suffix() {
        let dir = TempDir::new().unwrap();
        let file = touch(dir.path(), "genome.seq");
        assert_eq!(resolve_inputs(&[file.clone()]).unwrap(), vec![file]);
    }

    #[test]
    fn test_sample_name() {
        assert_eq!(sample_name(Path::new("/x/genome.fasta")), "genome");
        assert_eq!(sample_name(Path::new("/x/genome.fasta.gz")), "genome.fasta");
        assert_eq!(sample_name(Path::new("/x/E.coli_K12.fa")), "E.coli_K12");
        assert_eq!(sample_name(Path::new("/x/reads")), "reads");
    }

    #[test]
    fn test_plain_and_gzip_of_same_genome_are_distinct_samples() {
        let files = vec![
            PathBuf::from("/x/genome.fasta"),
            PathBuf::from("/x/genome.fasta.gz"),
        ];
        let samples = derive_samples(&files).unwrap();
        let names: Vec<&str> = samples.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["genome", "genome.fasta"]);
    }

    #[test]
    fn test_derive_samples_rejects_collisions() {
        let files = vec![
            PathBuf::from("/a/genome.fasta"),
            PathBuf::from("/b/other.fasta"),
            PathBuf::from("/b/genome.fasta"),
        ];
        match derive_samples(&files) {
            Err(PipelineError::DuplicateSample {
                name,
                first,
                second,
            }) => {
                assert_eq!(name, "genome");
                assert_eq!(first, files[0]);
                assert_eq!(second, files[2]);
            }
            other => panic!("expected DuplicateSample, got {other:?}"),
        }

        let samples = derive_samples(&files[..2]).unwrap();
        let names: Vec<&str> = samples.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["genome", "other"]);
    }
}
