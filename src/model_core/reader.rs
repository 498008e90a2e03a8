//! Raw batch loaders
//!
//! A batch is one self-describing table of raw records: a CSV file written
//! by the CSV sink (or any external process), or the SQLite raw table.
//! Loaders keep every column as an optional string; typing happens later.

use super::reconciler::ReconcileError;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub struct RawBatch {
    /// File name or table name, for logging
    pub source: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
    /// Records that could not be decoded and were left out of `rows`
    pub dropped: usize,
}

impl RawBatch {
    pub fn new(source: impl Into<String>, columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self {
            source: source.into(),
            columns,
            rows,
            dropped: 0,
        }
    }
}

fn cell(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Load one CSV file. Ragged rows are tolerated; missing cells are null.
///
/// A record that is not valid UTF-8 (or that the CSV parser rejects) is
/// logged and counted in `dropped`; the rest of the file still loads.
pub fn read_csv_batch(path: impl AsRef<Path>) -> Result<RawBatch, ReconcileError> {
    let path = path.as_ref();
    let source = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_path(path)?;

    let columns: Vec<String> = reader
        .byte_headers()?
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let name = String::from_utf8_lossy(name);
            let name = if i == 0 { name.trim_start_matches('\u{feff}') } else { &name[..] };
            name.trim().to_string()
        })
        .collect();

    let mut rows = Vec::new();
    let mut dropped = 0;
    for (line, record) in reader.byte_records().enumerate() {
        let record = match record.map(csv::StringRecord::from_byte_record) {
            Ok(Ok(record)) => record,
            Ok(Err(e)) => {
                log::warn!("⚠️  {} record {}: {}", source, line + 1, e.utf8_error());
                dropped += 1;
                continue;
            }
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                log::warn!("⚠️  {} record {}: {}", source, line + 1, e);
                dropped += 1;
                continue;
            }
        };
        rows.push((0..columns.len()).map(|i| record.get(i).and_then(cell)).collect());
    }

    let mut batch = RawBatch::new(source, columns, rows);
    batch.dropped = dropped;
    Ok(batch)
}

/// Every `*.csv` file in `dir`, in file-name order.
///
/// A file that cannot be read is skipped with a warning; a missing directory
/// yields no batches.
pub fn read_csv_dir(dir: impl AsRef<Path>) -> Result<Vec<RawBatch>, ReconcileError> {
    let dir = dir.as_ref();
    if !dir.exists() {
        log::warn!("⚠️  Raw directory {} does not exist", dir.display());
        return Ok(Vec::new());
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("csv"))
                    .unwrap_or(false)
        })
        .collect();
    paths.sort();

    let mut batches = Vec::with_capacity(paths.len());
    for path in paths {
        match read_csv_batch(&path) {
            Ok(batch) => {
                log::debug!(
                    "📥 Loaded {} ({} rows, {} undecodable)",
                    batch.source,
                    batch.rows.len(),
                    batch.dropped
                );
                batches.push(batch);
            }
            Err(e) => log::warn!("⚠️  Skipping unreadable batch {}: {}", path.display(), e),
        }
    }
    Ok(batches)
}

/// Load a SQLite raw table as one batch. `None` when the database or table is absent.
pub fn read_sqlite_batch(db_path: impl AsRef<Path>, table: &str) -> Result<Option<RawBatch>, ReconcileError> {
    let db_path = db_path.as_ref();
    if !db_path.exists() {
        return Ok(None);
    }

    let conn = Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;

    let mut info = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let columns: Vec<String> = info
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<_, _>>()?;
    if columns.is_empty() {
        return Ok(None);
    }

    let mut stmt = conn.prepare(&format!("SELECT * FROM {} ORDER BY rowid", table))?;
    let width = columns.len();
    let rows = stmt
        .query_map([], |row| {
            (0..width)
                .map(|i| {
                    Ok(match row.get_ref(i)? {
                        ValueRef::Null => None,
                        ValueRef::Integer(v) => Some(v.to_string()),
                        ValueRef::Real(v) => Some(v.to_string()),
                        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => cell(&String::from_utf8_lossy(bytes)),
                    })
                })
                .collect::<Result<Vec<_>, rusqlite::Error>>()
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(RawBatch::new(
        format!("{}:{}", db_path.display(), table),
        columns,
        rows,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_bom_and_ragged_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("menu_pp_20240101.csv");
        fs::write(&path, "\u{feff}chain_key,store_key,price\nPP,PP_1,12.99\nPP,PP_2\n").unwrap();

        let batch = read_csv_batch(&path).unwrap();
        assert_eq!(batch.columns, vec!["chain_key", "store_key", "price"]);
        assert_eq!(batch.rows.len(), 2);
        assert_eq!(batch.rows[1][2], None);
        assert_eq!(batch.source, "menu_pp_20240101.csv");
    }

    #[test]
    fn test_undecodable_record_does_not_lose_batch() {
        let dir = tempdir().unwrap();
        let mut bytes = b"chain_key,store_key,price\nPP,PP_1,12.99\n".to_vec();
        bytes.extend_from_slice(b"PP,PP_\xff,13.49\n");
        bytes.extend_from_slice(b"PP,PP_3,14.99\n");
        fs::write(dir.path().join("menu_pp_20240101.csv"), bytes).unwrap();

        let batches = read_csv_dir(dir.path()).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].rows.len(), 2);
        assert_eq!(batches[0].dropped, 1);
        assert_eq!(batches[0].rows[1][1].as_deref(), Some("PP_3"));
    }

    #[test]
    fn test_dir_order_and_filter() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.csv"), "chain_key\nDP\n").unwrap();
        fs::write(dir.path().join("a.csv"), "chain_key\nPH\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();

        let batches = read_csv_dir(dir.path()).unwrap();
        let names: Vec<&str> = batches.iter().map(|b| b.source.as_str()).collect();
        assert_eq!(names, vec!["a.csv", "b.csv"]);

        assert!(read_csv_dir(dir.path().join("missing")).unwrap().is_empty());
    }

    #[test]
    fn test_sqlite_batch() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("raw.db");
        let conn = Connection::open(&db).unwrap();
        conn.execute_batch(
            "CREATE TABLE raw_menu_price (chain_key TEXT, price REAL, month INTEGER, ingested_at TEXT);
             INSERT INTO raw_menu_price VALUES ('DP', 11.5, 3, NULL);",
        )
        .unwrap();
        drop(conn);

        let batch = read_sqlite_batch(&db, "raw_menu_price").unwrap().unwrap();
        assert_eq!(batch.columns, vec!["chain_key", "price", "month", "ingested_at"]);
        assert_eq!(
            batch.rows[0],
            vec![Some("DP".to_string()), Some("11.5".to_string()), Some("3".to_string()), None]
        );

        assert!(read_sqlite_batch(&db, "other_table").unwrap().is_none());
        assert!(read_sqlite_batch(dir.path().join("none.db"), "raw_menu_price").unwrap().is_none());
    }
}
