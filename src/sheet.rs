use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use crate::config::CampusDirectory;
use crate::models::{CampusId, CampusReport};
use crate::store::{matches_filter, RowStore, SheetRow, StoreError};

/// Attendance sheet kept as a CSV file with the shared sheet columns.
pub struct CsvSheet {
    path: PathBuf,
    directory: CampusDirectory,
}

impl CsvSheet {
    pub fn new(path: impl Into<PathBuf>, directory: CampusDirectory) -> Self {
        Self {
            path: path.into(),
            directory,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the sheet with its header row if it does not exist yet.
    pub fn init(&self) -> Result<(), StoreError> {
        if self.path.exists() {
            return Ok(());
        }
        let mut writer = csv::Writer::from_path(&self.path).map_err(StoreError::write)?;
        writer
            .write_record(SHEET_HEADERS)
            .map_err(StoreError::write)?;
        writer.flush().map_err(StoreError::write)?;
        Ok(())
    }
}

const SHEET_HEADERS: [&str; 10] = [
    "Timestamp",
    "Date",
    "Campus",
    "Total Attendance",
    "New People",
    "New Christians",
    "Youth Attendance",
    "Kids Total",
    "Connect Groups",
    "Raw_Text",
];

/// Reads every row of a sheet export, failing on the first malformed row.
pub fn read_rows(
    path: &Path,
    directory: &CampusDirectory,
) -> Result<Vec<CampusReport>, StoreError> {
    let mut reader = csv::Reader::from_path(path).map_err(StoreError::read)?;
    let mut reports = Vec::new();
    for (i, result) in reader.deserialize::<SheetRow>().enumerate() {
        let row = result.map_err(StoreError::read)?;
        reports.push(row.into_report(i + 1, directory)?);
    }
    Ok(reports)
}

/// Reads the live sheet, skipping rows that cannot be used instead of
/// failing. Only I/O errors are returned.
fn read_rows_lossy(
    path: &Path,
    directory: &CampusDirectory,
) -> Result<Vec<CampusReport>, StoreError> {
    let mut reader = csv::Reader::from_path(path).map_err(StoreError::read)?;
    let mut reports = Vec::new();
    for (i, result) in reader.deserialize::<SheetRow>().enumerate() {
        let row = match result {
            Ok(row) => row,
            Err(err) if err.is_io_error() => return Err(StoreError::read(err)),
            Err(err) => {
                tracing::warn!(row = i + 1, error = %err, "skipping unreadable sheet row");
                continue;
            }
        };
        reports.extend(row.into_report_lossy(i + 1, directory));
    }
    Ok(reports)
}

/// Appends every row of a sheet export to `store`.
pub async fn import_csv<S: RowStore>(
    store: &S,
    path: &Path,
    directory: &CampusDirectory,
) -> anyhow::Result<usize> {
    let reports = read_rows(path, directory)?;
    let mut inserted = 0usize;
    for report in &reports {
        store.append(report).await?;
        inserted += 1;
    }
    tracing::info!(inserted, path = %path.display(), "sheet import complete");
    Ok(inserted)
}

impl RowStore for CsvSheet {
    async fn append(&self, report: &CampusReport) -> Result<(), StoreError> {
        let needs_header = std::fs::metadata(&self.path)
            .map(|meta| meta.len() == 0)
            .unwrap_or(true);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(StoreError::write)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);
        writer
            .serialize(SheetRow::from_report(report, &self.directory))
            .map_err(StoreError::write)?;
        writer.flush().map_err(StoreError::write)?;
        tracing::debug!(campus = %report.campus, path = %self.path.display(), "row appended");
        Ok(())
    }

    async fn fetch(
        &self,
        campuses: Option<&[CampusId]>,
        year: Option<i32>,
    ) -> Result<Vec<CampusReport>, StoreError> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "sheet not created yet");
            return Ok(Vec::new());
        }
        let reports = read_rows_lossy(&self.path, &self.directory)?
            .into_iter()
            .filter(|report| matches_filter(report, campuses, year))
            .collect();
        Ok(reports)
    }
}
