use std::path::Path;

use anyhow::Context;
use tracing::info;

use crate::ingest::{self, IngestReport, RawDataset};
use crate::models::Dataset;

/// Reads a JSON export of the document database.
pub fn load(path: &Path) -> anyhow::Result<(Dataset, IngestReport)> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read snapshot {}", path.display()))?;
    let (dataset, report) = parse(&contents)
        .with_context(|| format!("snapshot {} is not a valid export", path.display()))?;

    info!(
        path = %path.display(),
        students = dataset.students.len(),
        grades = dataset.grades.len(),
        attendance = dataset.attendance.len(),
        rejected = report.rejected,
        "loaded snapshot"
    );
    Ok((dataset, report))
}

pub fn parse(contents: &str) -> anyhow::Result<(Dataset, IngestReport)> {
    let raw: RawDataset = serde_json::from_str(contents)?;
    Ok(ingest::dataset(&raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = include_str!("../demos/snapshot.json");

    #[test]
    fn bundled_demo_snapshot_loads_cleanly() {
        let (dataset, report) = parse(SAMPLE).unwrap();

        assert_eq!(report.rejected, 0);
        assert_eq!(dataset.students.len(), 2);
        assert_eq!(dataset.careers.len(), 1);
        assert!(!dataset.grades.is_empty());
        assert!(!dataset.attendance.is_empty());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(parse("{ \"students\": 3 }").is_err());
    }

    #[test]
    fn missing_file_reports_path() {
        let error = load(Path::new("/nonexistent/export.json")).unwrap_err();
        assert!(error.to_string().contains("/nonexistent/export.json"));
    }
}
