//! Distance matrix files.
//!
//! Two formats are read:
//! - `.json`: an object holding the grid under `"Distancias"` (or `"distances"`)
//! - anything else: one whitespace-separated row per line, with blank lines
//!   and `#` comments skipped
//!
//! Written files are always JSON.

use crate::{Result, StorageError};
use salesman_core::DistanceMatrix;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::info;

#[derive(Serialize, Deserialize)]
struct MatrixFile {
    #[serde(rename = "Distancias", alias = "distances")]
    distances: DistanceMatrix,
}

/// Load a matrix, picking the format from the file extension.
pub async fn load_matrix(path: impl AsRef<Path>) -> Result<DistanceMatrix> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).await?;

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let matrix = if is_json {
        parse_json(&contents)?
    } else {
        parse_text(&contents)?
    };

    info!("Loaded {0}x{0} matrix from {1}", matrix.size(), path.display());
    Ok(matrix)
}

/// Write `matrix` as JSON.
pub async fn save_matrix(path: impl AsRef<Path>, matrix: &DistanceMatrix) -> Result<()> {
    let file = MatrixFile {
        distances: matrix.clone(),
    };
    let json = serde_json::to_string_pretty(&file)?;
    fs::write(path.as_ref(), json.as_bytes()).await?;
    Ok(())
}

/// Parse the JSON format.
pub fn parse_json(contents: &str) -> Result<DistanceMatrix> {
    let file: MatrixFile = serde_json::from_str(contents)?;
    Ok(file.distances)
}

/// Parse the whitespace-separated text format.
pub fn parse_text(contents: &str) -> Result<DistanceMatrix> {
    let mut rows = Vec::new();
    for (number, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let row = line
            .split_whitespace()
            .map(|token| {
                token.parse::<f64>().map_err(|_| StorageError::Parse {
                    line: number + 1,
                    token: token.to_string(),
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        rows.push(row);
    }
    Ok(DistanceMatrix::from_rows(rows)?)
}
