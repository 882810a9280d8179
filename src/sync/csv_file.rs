use crate::error::Result;
use crate::models::{GarminMetrics, HEADERS};
use std::fs::{self, OpenOptions};
use std::path::Path;
use tracing::{info, instrument};

/// Append `records` to the CSV file at `path`, writing the header first if
/// the file is new or empty.
///
/// Rows are only ever appended: syncing an overlapping range again writes
/// those dates a second time.
#[instrument(name = "Writing CSV", skip_all, fields(path = %path.display()))]
pub fn write_csv(path: &Path, records: &[GarminMetrics]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let needs_header = file.metadata()?.len() == 0;

    let mut writer = csv::Writer::from_writer(file);
    if needs_header {
        writer.write_record(HEADERS)?;
    }
    for record in records {
        writer.write_record(record.to_row().iter().map(|cell| cell.to_string()))?;
    }
    writer.flush()?;

    info!(rows = records.len(), "Wrote metrics to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::metrics::test_helpers::mock_metrics;

    fn read_rows(path: &Path) -> Vec<Vec<String>> {
        csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)
            .unwrap()
            .records()
            .map(|r| r.unwrap().iter().map(String::from).collect())
            .collect()
    }

    #[test]
    fn test_new_file_gets_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output").join("garmingo_USER1.csv");
        let records = vec![mock_metrics(2024, 1, 1), mock_metrics(2024, 1, 2)];

        write_csv(&path, &records).unwrap();

        let rows = read_rows(&path);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], HEADERS.map(String::from).to_vec());
        assert_eq!(rows[1][0], "2024-01-01");
        assert_eq!(rows[1][1], "82");
        assert_eq!(rows[2][0], "2024-01-02");
    }

    #[test]
    fn test_rerun_appends_without_header_and_duplicates_dates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");

        write_csv(&path, &[mock_metrics(2024, 1, 1)]).unwrap();
        write_csv(&path, &[mock_metrics(2024, 1, 1), mock_metrics(2024, 1, 2)]).unwrap();

        let rows = read_rows(&path);
        let headers = rows.iter().filter(|r| r[0] == "Day/Date").count();
        let jan_first = rows.iter().filter(|r| r[0] == "2024-01-01").count();
        assert_eq!(rows.len(), 4);
        assert_eq!(headers, 1);
        assert_eq!(jan_first, 2);
    }

    #[test]
    fn test_null_fields_are_empty_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        let record = GarminMetrics {
            weight: Some(72.456),
            ..GarminMetrics::new(mock_metrics(2024, 1, 1).date)
        };

        write_csv(&path, &[record]).unwrap();

        let row = &read_rows(&path)[1];
        let weight = HEADERS.iter().position(|h| *h == "Weight (kg)").unwrap();
        assert_eq!(row[weight], "72.46");
        assert_eq!(row[1], "");
        assert_eq!(row.len(), HEADERS.len());
    }
}
