//! On-disk format of the bundled opening book.
//!
//! The bundle is produced by an offline batch tool and consumed read-only
//! here: a JSON document, optionally gzip-compressed, holding one entry per
//! stored orientation of a position.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BookLoadError {
    #[error("Failed to open opening book bundle: {0}")]
    Io(#[from] std::io::Error),
    #[error("Opening book bundle is not readable: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
pub struct RawBundle {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub stats: RawStats,
    pub entries: Vec<RawEntry>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawStats {
    #[serde(default)]
    pub total_entries: u64,
    #[serde(default)]
    pub by_board_size: HashMap<String, u64>,
    #[serde(default)]
    pub min_visits: u32,
}

/// One stored orientation: position hash, board size, komi, the move
/// sequence in record form, the candidates, and the effort invested.
#[derive(Debug, Deserialize)]
pub struct RawEntry {
    pub h: String,
    pub s: usize,
    pub k: f32,
    pub m: String,
    pub t: Vec<RawCandidate>,
    pub v: u32,
}

#[derive(Debug, Deserialize)]
pub struct RawCandidate {
    #[serde(rename = "move")]
    pub vertex: String,
    pub winrate: f32,
    #[serde(rename = "scoreLead")]
    pub score_lead: f32,
    pub visits: u32,
}

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Reads a bundle from disk, transparently handling gzip compression.
pub fn read_bundle(path: &Path) -> Result<RawBundle, BookLoadError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let is_gzip = reader
        .fill_buf()
        .map(|buf| buf.len() >= 2 && buf[..2] == GZIP_MAGIC)?;

    let reader: Box<dyn Read> = if is_gzip {
        Box::new(flate2::read::GzDecoder::new(reader))
    } else {
        Box::new(reader)
    };

    Ok(serde_json::from_reader(reader)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "version": 2,
        "stats": {"total_entries": 1, "by_board_size": {"9": 1}, "min_visits": 50},
        "entries": [
            {"h": "00000000deadbeef", "s": 9, "k": 7.5, "m": "B[E5]",
             "t": [{"move": "C3", "winrate": 0.48, "scoreLead": -0.2, "visits": 100}],
             "v": 500}
        ]
    }"#;

    #[test]
    fn test_read_plain_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.json");
        std::fs::write(&path, SAMPLE).unwrap();

        let bundle = read_bundle(&path).unwrap();

        assert_eq!(bundle.version, 2);
        assert_eq!(bundle.entries.len(), 1);
        assert_eq!(bundle.entries[0].v, 500);
        assert_eq!(bundle.entries[0].t[0].vertex, "C3");
    }

    #[test]
    fn test_read_gzip_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.json.gz");

        let file = File::create(&path).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(SAMPLE.as_bytes()).unwrap();
        encoder.finish().unwrap();

        let bundle = read_bundle(&path).unwrap();
        assert_eq!(bundle.entries.len(), 1);
    }

    #[test]
    fn test_read_missing_file() {
        let result = read_bundle(Path::new("/nonexistent/book.json"));
        assert!(matches!(result, Err(BookLoadError::Io(_))));
    }

    #[test]
    fn test_read_unparseable_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.json");
        std::fs::write(&path, "not json at all").unwrap();

        let result = read_bundle(&path);
        assert!(matches!(result, Err(BookLoadError::Malformed(_))));
    }
}
