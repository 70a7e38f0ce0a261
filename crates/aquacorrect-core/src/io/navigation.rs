use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::{CorrectError, Result};

/// Column holding the image path relative to the dive folder.
pub const RELATIVE_PATH_COLUMN: &str = "relative_path";
/// Column holding the vehicle altitude above the seafloor.
pub const ALTITUDE_COLUMN: &str = "altitude [m]";

/// The two navigation columns the corrector consumes; others are ignored.
#[derive(Clone, Debug, Deserialize)]
pub struct NavigationRecord {
    #[serde(rename = "relative_path")]
    pub relative_path: String,
    #[serde(rename = "altitude [m]")]
    pub altitude_m: f64,
}

impl NavigationRecord {
    /// File name component of `relative_path`.
    pub fn image_name(&self) -> &str {
        file_name(&self.relative_path)
    }
}

fn file_name(relative_path: &str) -> &str {
    Path::new(relative_path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(relative_path)
}

/// Read all navigation rows in file order.
pub fn read_navigation(path: &Path) -> Result<Vec<NavigationRecord>> {
    if !path.exists() {
        return Err(CorrectError::MissingFile(path.to_path_buf()));
    }
    let mut reader = csv::Reader::from_path(path)?;
    let records = reader
        .deserialize()
        .collect::<std::result::Result<Vec<NavigationRecord>, _>>()?;
    Ok(records)
}

/// Altitudes in row order; row i belongs to image i of the working list.
pub fn read_altitudes(path: &Path) -> Result<Vec<f64>> {
    Ok(read_navigation(path)?
        .into_iter()
        .map(|r| r.altitude_m)
        .collect())
}

/// Read a user-provided image subset: one file name per line.
pub fn read_image_name_list(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Err(CorrectError::MissingFile(path.to_path_buf()));
    }
    let contents = fs::read_to_string(path)?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// Write a copy of `navigation_csv` keeping only rows whose image file name
/// appears in `image_names`. All columns are preserved.
///
/// Returns the number of rows kept.
pub fn trim_navigation_csv(
    image_names: &[String],
    navigation_csv: &Path,
    trimmed_csv: &Path,
) -> Result<usize> {
    if !navigation_csv.exists() {
        return Err(CorrectError::MissingFile(navigation_csv.to_path_buf()));
    }
    let wanted: HashSet<&str> = image_names.iter().map(String::as_str).collect();

    let mut reader = csv::Reader::from_path(navigation_csv)?;
    let headers = reader.headers()?.clone();
    let path_col = headers
        .iter()
        .position(|h| h == RELATIVE_PATH_COLUMN)
        .ok_or_else(|| {
            CorrectError::Config(format!(
                "{} has no '{RELATIVE_PATH_COLUMN}' column",
                navigation_csv.display()
            ))
        })?;

    let mut writer = csv::Writer::from_path(trimmed_csv)?;
    writer.write_record(&headers)?;
    let mut kept = 0;
    for record in reader.records() {
        let record = record?;
        let keep = record
            .get(path_col)
            .is_some_and(|p| wanted.contains(file_name(p)));
        if keep {
            writer.write_record(&record)?;
            kept += 1;
        }
    }
    writer.flush()?;

    info!(
        kept,
        requested = image_names.len(),
        path = %trimmed_csv.display(),
        "Trimmed navigation CSV to user image list"
    );
    Ok(kept)
}
