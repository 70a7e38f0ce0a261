use std::path::Path;

use crate::error::Result;

/// Manifest file name written next to the corrected images.
pub const MANIFEST_FILE_NAME: &str = "filelist.csv";

/// Write the list of processed image file names as an indexed CSV
/// (`,0` header, one `index,name` row per image).
pub fn write_manifest(path: &Path, file_names: &[String]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["", "0"])?;
    for (i, name) in file_names.iter().enumerate() {
        writer.write_record([i.to_string().as_str(), name.as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

/// Read back the file names of a manifest written by [`write_manifest`].
pub fn read_manifest(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut names = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(name) = record.get(1) {
            names.push(name.to_string());
        }
    }
    Ok(names)
}
