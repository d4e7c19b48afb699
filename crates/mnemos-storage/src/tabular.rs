//! Tabular encoding: a comma-separated vector table plus a JSON metadata
//! document. Row `i` of the table belongs to element `i` of the `records`
//! list. The document also stamps the table's row count and blake3 digest,
//! so a table paired with metadata from another save is refused.
//!
//! Values are written as decimal text. With no fixed precision the shortest
//! representation that parses back to the same `f32` is used, so the round
//! trip is exact; with `precision = Some(p)` each component may move by up to
//! one unit in the `p`-th decimal place.

use std::fmt::Write as _;
use std::fs;
use std::io::{BufReader, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use mnemos_core::error::{MnemosError, Result};
use mnemos_core::types::Record;

use crate::atomic::{require_file, stage};
use crate::store::MemoryStore;

const DELIMITER: char = ',';

/// Text formatting options for the vector table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TabularOptions {
    /// Fixed number of decimal places, or `None` for exact shortest form.
    pub precision: Option<usize>,
    /// Whether the table starts with a `0,1,...,D-1` header row.
    pub header: bool,
}

impl Default for TabularOptions {
    fn default() -> Self {
        Self {
            precision: None,
            header: true,
        }
    }
}

impl TabularOptions {
    /// Largest absolute per-component error a save/load round trip can add.
    ///
    /// With `p` decimal places the written text is within half a unit in the
    /// `p`-th place of the stored value, and parsing picks the nearest `f32`
    /// to that text, which is no farther away again. The bound is one unit
    /// in the `p`-th place, independent of magnitude.
    pub fn tolerance(&self) -> f32 {
        match self.precision {
            None => 0.0,
            Some(p) => 10f32.powi(-(p.min(38) as i32)),
        }
    }
}

/// Identifies the vector table a metadata document was written with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct TableStamp {
    rows: usize,
    blake3: String,
}

impl TableStamp {
    fn of(table: &[u8], rows: usize) -> Self {
        Self {
            rows,
            blake3: blake3::hash(table).to_hex().to_string(),
        }
    }
}

#[derive(Serialize)]
struct MetadataOut<'a> {
    table: TableStamp,
    records: &'a [Record],
}

#[derive(Deserialize)]
struct MetadataIn {
    table: TableStamp,
    records: Vec<Record>,
}

pub(crate) fn save(
    store: &MemoryStore,
    vectors_path: &Path,
    metadata_path: &Path,
    options: TabularOptions,
) -> Result<()> {
    let table = render_table(store, options);
    let document = MetadataOut {
        table: TableStamp::of(table.as_bytes(), store.len()),
        records: store.records(),
    };

    // Both files are complete on disk before either replaces its target.
    let staged_vectors = stage(vectors_path, |w| {
        w.write_all(table.as_bytes())?;
        Ok(())
    })?;
    let staged_metadata = stage(metadata_path, |w| {
        serde_json::to_writer_pretty(&mut *w, &document)?;
        w.write_all(b"\n")?;
        Ok(())
    })?;
    staged_vectors.commit()?;
    staged_metadata.commit()?;

    info!(
        vectors = %vectors_path.display(),
        metadata = %metadata_path.display(),
        count = store.len(),
        "Saved memory store as tabular files"
    );
    Ok(())
}

pub(crate) fn load(
    vectors_path: &Path,
    metadata_path: &Path,
    options: TabularOptions,
) -> Result<MemoryStore> {
    require_file(vectors_path)?;
    require_file(metadata_path)?;

    let bytes = fs::read(vectors_path)?;
    let table = std::str::from_utf8(&bytes)
        .map_err(|e| MnemosError::corrupt(format!("{}: {}", vectors_path.display(), e)))?;
    let (header_width, vectors) = parse_table(table, options.header)?;

    let file = fs::File::open(metadata_path)?;
    let document: MetadataIn = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
        MnemosError::corrupt(format!("metadata {}: {}", metadata_path.display(), e))
    })?;

    // A crash between the two renames leaves a new table beside old metadata.
    if document.table != TableStamp::of(&bytes, vectors.len()) {
        return Err(MnemosError::corrupt(format!(
            "{} does not match the table recorded in {}",
            vectors_path.display(),
            metadata_path.display()
        )));
    }
    let records = document.records;
    if records.len() != vectors.len() {
        return Err(MnemosError::corrupt(format!(
            "{} vector rows but {} metadata entries",
            vectors.len(),
            records.len()
        )));
    }

    let store = match header_width {
        Some(width) if vectors.is_empty() => MemoryStore::with_dimension(width),
        _ => crate::backend::assemble(records, vectors)?,
    };

    info!(
        vectors = %vectors_path.display(),
        count = store.len(),
        "Loaded memory store from tabular files"
    );
    Ok(store)
}

fn render_table(store: &MemoryStore, options: TabularOptions) -> String {
    let mut out = String::new();

    if options.header {
        if let Some(dimension) = store.dimension().filter(|d| *d > 0) {
            let header: Vec<String> = (0..dimension).map(|i| i.to_string()).collect();
            out.push_str(&header.join(","));
            out.push('\n');
        }
    }

    for vector in store.vectors() {
        for (i, value) in vector.iter().enumerate() {
            if i > 0 {
                out.push(DELIMITER);
            }
            // Writing into a String cannot fail.
            let _ = match options.precision {
                Some(p) => write!(out, "{:.*}", p, value),
                None => write!(out, "{}", value),
            };
        }
        out.push('\n');
    }
    out
}

/// Parse the vector table, returning the header width (if any) and the rows.
fn parse_table(table: &str, has_header: bool) -> Result<(Option<usize>, Vec<Vec<f32>>)> {
    let mut lines = table
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty());

    let header_width = if has_header {
        lines
            .next()
            .map(|(_, line)| line.split(DELIMITER).count())
    } else {
        None
    };

    let mut rows: Vec<Vec<f32>> = Vec::new();
    for (line_no, line) in lines {
        let row = line
            .split(DELIMITER)
            .map(|cell| {
                cell.trim().parse::<f32>().map_err(|_| {
                    MnemosError::corrupt(format!(
                        "line {}: cannot parse {:?} as a number",
                        line_no + 1,
                        cell.trim()
                    ))
                })
            })
            .collect::<Result<Vec<f32>>>()?;

        let expected = header_width.or_else(|| rows.first().map(Vec::len));
        if let Some(expected) = expected {
            if row.len() != expected {
                return Err(MnemosError::DimensionMismatch {
                    expected,
                    actual: row.len(),
                });
            }
        }
        rows.push(row);
    }

    Ok((header_width, rows))
}
