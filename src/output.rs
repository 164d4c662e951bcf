//! CSV persistence helpers shared by every pipeline stage.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

/// Save rows to a CSV file, creating parent directories as needed.
///
/// Nothing is written when `data` is empty; returns whether a file was
/// written.
pub fn save_csv<T: Serialize>(path: &Path, data: &[T]) -> Result<bool> {
    if data.is_empty() {
        warn!(path = %path.display(), "No data to save");
        return Ok(false);
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut wtr = csv::WriterBuilder::new()
        .has_headers(true)
        .from_path(path)?;

    for item in data {
        wtr.serialize(item)?;
    }

    wtr.flush()?;
    info!(path = %path.display(), rows = data.len(), "Saved CSV");
    Ok(true)
}

/// Load every row of a headed CSV file.
pub fn load_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_path(path)?;

    let mut rows = Vec::new();
    for record in rdr.deserialize() {
        rows.push(record?);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Row {
        #[serde(rename = "Name")]
        name: String,
        #[serde(rename = "Value")]
        value: f64,
    }

    #[test]
    fn test_save_and_load() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nested").join("rows.csv");
        let rows = vec![
            Row { name: "a".to_string(), value: 1.5 },
            Row { name: "b, c".to_string(), value: 0.0 },
        ];

        assert!(save_csv(&path, &rows)?);
        let loaded: Vec<Row> = load_csv(&path)?;
        assert_eq!(loaded, rows);
        Ok(())
    }

    #[test]
    fn test_save_empty_writes_nothing() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("empty.csv");
        let rows: Vec<Row> = Vec::new();
        assert!(!save_csv(&path, &rows)?);
        assert!(!path.exists());
        Ok(())
    }
}
