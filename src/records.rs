//! Example record files: one JSON-serialized example per line.
//!
//! Both pipeline stages exchange data through these files. Raw files hold
//! [`RawExample`]s as produced by ingestion; transformed files hold
//! [`TransformedExample`]s as produced by the fitted transform.

use crate::schema::{RawExample, TransformedExample};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Could not read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("Malformed record at {path}:{line}: {source}")]
    Malformed {
        path: String,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("No record files matched '{0}'")]
    NoFiles(String),
}

fn io_err(path: &Path, source: io::Error) -> Error {
    Error::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Resolve input path arguments to concrete record files.
///
/// Each argument is either a file, taken as-is, or a directory, which expands
/// to its contained files in sorted order. An argument that matches nothing
/// is an error rather than a silently empty dataset.
pub fn resolve_paths(patterns: &[String]) -> Result<Vec<PathBuf>, Error> {
    let mut files = Vec::new();

    for pattern in patterns {
        let path = PathBuf::from(pattern);

        if path.is_file() {
            files.push(path);
        } else if path.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(&path)
                .map_err(|e| io_err(&path, e))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file())
                .collect();
            entries.sort();

            if entries.is_empty() {
                return Err(Error::NoFiles(pattern.clone()));
            }
            files.extend(entries);
        } else {
            return Err(Error::NoFiles(pattern.clone()));
        }
    }

    Ok(files)
}

fn write_records<T: Serialize>(path: &Path, records: &[T]) -> Result<(), Error> {
    let file = File::create(path).map_err(|e| io_err(path, e))?;
    let mut writer = BufWriter::new(file);

    for record in records {
        let json = serde_json::to_string(record).map_err(|e| Error::Malformed {
            path: path.display().to_string(),
            line: 0,
            source: e,
        })?;
        writeln!(writer, "{}", json).map_err(|e| io_err(path, e))?;
    }

    writer.flush().map_err(|e| io_err(path, e))
}

fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, Error> {
    let file = File::open(path).map_err(|e| io_err(path, e))?;
    let reader = BufReader::new(file);

    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| io_err(path, e))?;
        if line.trim().is_empty() {
            continue;
        }

        let record = serde_json::from_str(&line).map_err(|e| Error::Malformed {
            path: path.display().to_string(),
            line: idx + 1,
            source: e,
        })?;
        records.push(record);
    }

    Ok(records)
}

pub fn write_raw(path: &Path, examples: &[RawExample]) -> Result<(), Error> {
    write_records(path, examples)
}

pub fn read_raw(path: &Path) -> Result<Vec<RawExample>, Error> {
    read_records(path)
}

/// Read raw examples from every file the patterns resolve to.
pub fn read_raw_many(patterns: &[String]) -> Result<Vec<RawExample>, Error> {
    let mut examples = Vec::new();
    for path in resolve_paths(patterns)? {
        examples.extend(read_raw(&path)?);
    }
    Ok(examples)
}

pub fn write_transformed(path: &Path, examples: &[TransformedExample]) -> Result<(), Error> {
    write_records(path, examples)
}

pub fn read_transformed(path: &Path) -> Result<Vec<TransformedExample>, Error> {
    read_records(path)
}

/// Read transformed examples from every file the patterns resolve to.
pub fn read_transformed_many(patterns: &[String]) -> Result<Vec<TransformedExample>, Error> {
    let mut examples = Vec::new();
    for path in resolve_paths(patterns)? {
        examples.extend(read_transformed(&path)?);
    }
    Ok(examples)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_temp_dir() -> PathBuf {
        use std::time::{SystemTime, UNIX_EPOCH};
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = PathBuf::from(format!(
            "/tmp/diapred_records_test_{}_{}",
            std::process::id(),
            timestamp
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn example(age: f32, gender: &str, label: f32) -> RawExample {
        let mut e = RawExample::new();
        e.insert_float("age", age);
        e.insert_text("gender", gender);
        e.insert_float("diabetes", label);
        e
    }

    #[test]
    fn it_round_trips_raw_record_files() {
        let dir = create_temp_dir();
        let path = dir.join("train.jsonl");

        let examples = vec![example(41.0, "Male", 0.0), example(67.0, "Female", 1.0)];
        write_raw(&path, &examples).unwrap();
        let read = read_raw(&path).unwrap();

        assert_eq!(read, examples);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn it_resolves_directories_to_sorted_files() {
        let dir = create_temp_dir();
        write_raw(&dir.join("b.jsonl"), &[example(2.0, "Male", 0.0)]).unwrap();
        write_raw(&dir.join("a.jsonl"), &[example(1.0, "Female", 1.0)]).unwrap();

        let files = resolve_paths(&[dir.display().to_string()]).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a.jsonl"));
        assert!(files[1].ends_with("b.jsonl"));

        let all = read_raw_many(&[dir.display().to_string()]).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].float("age").unwrap(), 1.0);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn it_rejects_missing_paths() {
        let result = resolve_paths(&["/tmp/diapred_does_not_exist.jsonl".to_string()]);
        assert!(matches!(result, Err(Error::NoFiles(_))));
    }

    #[test]
    fn it_reports_the_line_of_a_malformed_record() {
        let dir = create_temp_dir();
        let path = dir.join("broken.jsonl");
        std::fs::write(&path, "{\"age\": 1.0}\nnot json\n").unwrap();

        match read_raw(&path) {
            Err(Error::Malformed { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected malformed error, got {:?}", other),
        }
        std::fs::remove_dir_all(&dir).ok();
    }
}
