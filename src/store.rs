use anyhow::Context;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::CampusDirectory;
use crate::db::PgStore;
use crate::models::{CampusId, CampusReport, Stat, StatMap, UNKNOWN_CAMPUS};
use crate::sheet::CsvSheet;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failures at the row-store boundary. Callers decide whether to retry.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("row store read failed")]
    Read(#[source] BoxError),
    #[error("row store write failed")]
    Write(#[source] BoxError),
    #[error("malformed row {row}: {reason}")]
    Malformed { row: usize, reason: String },
}

impl StoreError {
    pub fn read(err: impl Into<BoxError>) -> Self {
        StoreError::Read(err.into())
    }

    pub fn write(err: impl Into<BoxError>) -> Self {
        StoreError::Write(err.into())
    }
}

/// External tabular storage holding one row per submitted report.
pub trait RowStore {
    async fn append(&self, report: &CampusReport) -> Result<(), StoreError>;

    /// Rows for the given campuses (all when `None`) and calendar year.
    async fn fetch(
        &self,
        campuses: Option<&[CampusId]>,
        year: Option<i32>,
    ) -> Result<Vec<CampusReport>, StoreError>;
}

pub enum Backend {
    Sheet(CsvSheet),
    Postgres(PgStore),
}

impl RowStore for Backend {
    async fn append(&self, report: &CampusReport) -> Result<(), StoreError> {
        match self {
            Backend::Sheet(sheet) => sheet.append(report).await,
            Backend::Postgres(pg) => pg.append(report).await,
        }
    }

    async fn fetch(
        &self,
        campuses: Option<&[CampusId]>,
        year: Option<i32>,
    ) -> Result<Vec<CampusReport>, StoreError> {
        match self {
            Backend::Sheet(sheet) => sheet.fetch(campuses, year).await,
            Backend::Postgres(pg) => pg.fetch(campuses, year).await,
        }
    }
}

pub fn matches_filter(
    report: &CampusReport,
    campuses: Option<&[CampusId]>,
    year: Option<i32>,
) -> bool {
    campuses.map_or(true, |ids| ids.contains(&report.campus))
        && year.map_or(true, |y| report.report_date.year() == y)
}

/// First and one-past-last day of a calendar year.
pub fn year_bounds(year: i32) -> Result<(NaiveDate, NaiveDate), StoreError> {
    let start = NaiveDate::from_ymd_opt(year, 1, 1);
    let end = NaiveDate::from_ymd_opt(year + 1, 1, 1);
    start
        .zip(end)
        .ok_or_else(|| StoreError::read(format!("year {year} is out of range")))
}

/// Campus id for a stored campus name; names outside the directory map to
/// `unknown`.
pub fn campus_from_name(directory: &CampusDirectory, name: &str) -> CampusId {
    match directory.lookup(name) {
        Some(campus) => campus.id.clone(),
        None => {
            if !name.trim().eq_ignore_ascii_case(UNKNOWN_CAMPUS) {
                tracing::warn!(campus = name, "stored row names an unconfigured campus");
            }
            UNKNOWN_CAMPUS.to_string()
        }
    }
}

/// One row of the attendance sheet. Column names are a fixed external
/// contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetRow {
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "Date", default)]
    pub date: String,
    #[serde(rename = "Campus")]
    pub campus: String,
    #[serde(rename = "Total Attendance", default)]
    pub total_attendance: String,
    #[serde(rename = "New People", default)]
    pub new_people: String,
    #[serde(rename = "New Christians", default)]
    pub new_christians: String,
    #[serde(rename = "Youth Attendance", default)]
    pub youth_attendance: String,
    #[serde(rename = "Kids Total", default)]
    pub kids_total: String,
    #[serde(rename = "Connect Groups", default)]
    pub connect_groups: String,
    #[serde(rename = "Raw_Text", default)]
    pub raw_text: String,
}

impl SheetRow {
    pub fn from_report(report: &CampusReport, directory: &CampusDirectory) -> SheetRow {
        let cell = |stat: Stat| {
            report
                .stats
                .get(&stat)
                .map(|value| value.to_string())
                .unwrap_or_default()
        };
        let campus = if report.campus == UNKNOWN_CAMPUS {
            UNKNOWN_CAMPUS.to_string()
        } else {
            directory.display_name(&report.campus)
        };
        SheetRow {
            timestamp: report.submitted_at.to_rfc3339(),
            date: report.report_date.format("%Y-%m-%d").to_string(),
            campus,
            total_attendance: cell(Stat::TotalAttendance),
            new_people: cell(Stat::NewVisitors),
            new_christians: cell(Stat::Decisions),
            youth_attendance: cell(Stat::YouthAttendance),
            kids_total: cell(Stat::KidsAttendance),
            connect_groups: cell(Stat::ConnectGroups),
            raw_text: report.raw_text.clone(),
        }
    }

    /// Strict conversion used by `import`: any bad cell rejects the row.
    /// `row` is the 1-based data row number, used in error messages.
    pub fn into_report(
        self,
        row: usize,
        directory: &CampusDirectory,
    ) -> Result<CampusReport, StoreError> {
        let malformed = |reason: String| StoreError::Malformed { row, reason };

        let (report_date, submitted_at) = self.dates().map_err(malformed)?;
        let mut stats = StatMap::new();
        for (stat, cell) in self.cells() {
            if let Some(value) = parse_count(cell)
                .map_err(|_| malformed(format!("{} is not a count: {cell:?}", stat.column())))?
            {
                stats.insert(stat, value);
            }
        }

        Ok(self.finish(report_date, submitted_at, stats, directory))
    }

    /// Lenient conversion used when reading the live sheet. Cells that are
    /// not counts are treated as absent; rows without a usable date are
    /// skipped.
    pub fn into_report_lossy(
        self,
        row: usize,
        directory: &CampusDirectory,
    ) -> Option<CampusReport> {
        let (report_date, submitted_at) = match self.dates() {
            Ok(dates) => dates,
            Err(reason) => {
                tracing::warn!(row, %reason, "skipping sheet row");
                return None;
            }
        };

        let mut stats = StatMap::new();
        for (stat, cell) in self.cells() {
            match parse_count(cell) {
                Ok(Some(value)) => {
                    stats.insert(stat, value);
                }
                Ok(None) => {}
                Err(_) => {
                    tracing::warn!(
                        row,
                        column = stat.column(),
                        cell = %cell,
                        "ignoring cell that is not a count"
                    );
                }
            }
        }

        Some(self.finish(report_date, submitted_at, stats, directory))
    }

    fn cells(&self) -> [(Stat, &str); 6] {
        [
            (Stat::TotalAttendance, self.total_attendance.as_str()),
            (Stat::NewVisitors, self.new_people.as_str()),
            (Stat::Decisions, self.new_christians.as_str()),
            (Stat::YouthAttendance, self.youth_attendance.as_str()),
            (Stat::KidsAttendance, self.kids_total.as_str()),
            (Stat::ConnectGroups, self.connect_groups.as_str()),
        ]
    }

    /// Report date from the Date cell, falling back to the timestamp.
    fn dates(&self) -> Result<(NaiveDate, DateTime<Utc>), String> {
        let submitted_at = parse_timestamp(&self.timestamp);
        let report_date = match self.date.trim() {
            "" => submitted_at
                .map(|ts| ts.date_naive())
                .ok_or_else(|| "row has neither a date nor a timestamp".to_string())?,
            date => NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .map_err(|_| format!("invalid date {date:?}"))?,
        };
        let submitted_at = submitted_at
            .unwrap_or_else(|| Utc.from_utc_datetime(&report_date.and_time(NaiveTime::default())));
        Ok((report_date, submitted_at))
    }

    fn finish(
        self,
        report_date: NaiveDate,
        submitted_at: DateTime<Utc>,
        stats: StatMap,
        directory: &CampusDirectory,
    ) -> CampusReport {
        CampusReport {
            id: Uuid::new_v4(),
            campus: campus_from_name(directory, &self.campus),
            report_date,
            stats,
            raw_text: self.raw_text,
            submitted_at,
        }
    }
}

/// Empty cells are absent; thousands separators are tolerated.
fn parse_count(cell: &str) -> Result<Option<u32>, std::num::ParseIntError> {
    let trimmed = cell.trim().replace(',', "");
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed.parse::<u32>().map(Some)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"]
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
                .map(|naive| Utc.from_utc_datetime(&naive))
        })
}

/// A few weeks of realistic history across three campuses.
pub fn seed_reports(today: NaiveDate) -> anyhow::Result<Vec<CampusReport>> {
    let weeks_back = i64::from(today.weekday().num_days_from_sunday());
    let last_sunday = today - Duration::days(weeks_back);
    let history: [(&str, [u32; 6], &str); 9] = [
        (
            "south",
            [430, 18, 6, 104, 76, 12],
            "south had 430 people, 18 new visitors, 6 salvations, 104 youth, 76 kids, 12 connect groups",
        ),
        (
            "south",
            [452, 22, 9, 118, 80, 12],
            "south 452 people 22 np 9 nc 118 youth 80 kids 12 connects",
        ),
        (
            "south",
            [470, 25, 8, 142, 81, 13],
            "South campus: 470 people, 25 new visitors, 8 decisions, 142 youth, 81 kids, 13 connect groups",
        ),
        (
            "mount_barker",
            [210, 9, 3, 41, 52, 6],
            "mt barker had 210 people, 9 new people, 3 salvations, 41 youth, 52 kids, 6 connect groups",
        ),
        (
            "mount_barker",
            [205, 7, 2, 38, 49, 6],
            "mount barker 205 people 7 np 2 nc 38 youth 49 kids 6 connects",
        ),
        (
            "mount_barker",
            [221, 12, 4, 45, 55, 7],
            "barker had 221 people, 12 new visitors, 4 salvations, 45 youth, 55 kids, 7 connect groups",
        ),
        (
            "paradise",
            [380, 15, 5, 90, 70, 10],
            "paradise had 380 people, 15 new visitors, 5 salvations, 90 youth, 70 kids, 10 connect groups",
        ),
        (
            "paradise",
            [365, 11, 4, 86, 66, 10],
            "paradise 365 people 11 np 4 nc 86 youth 66 kids 10 connects",
        ),
        (
            "paradise",
            [298, 10, 3, 80, 60, 9],
            "paradise had 298 people, 10 new visitors, 3 salvations, 80 youth, 60 kids, 9 connect groups",
        ),
    ];

    history
        .iter()
        .enumerate()
        .map(|(i, (campus, values, raw_text))| -> anyhow::Result<CampusReport> {
            let weeks_ago = 2 - (i % 3) as i64;
            let report_date = last_sunday - Duration::weeks(weeks_ago);
            let submitted_at = report_date
                .and_hms_opt(12, 30, 0)
                .map(|naive| Utc.from_utc_datetime(&naive))
                .context("invalid seed timestamp")?;
            Ok(CampusReport {
                id: Uuid::new_v4(),
                campus: campus.to_string(),
                report_date,
                stats: Stat::ALL.into_iter().zip(values.iter().copied()).collect(),
                raw_text: raw_text.to_string(),
                submitted_at,
            })
        })
        .collect()
}

#[cfg(test)]
pub mod memory {
    use std::sync::Mutex;

    use super::*;

    /// In-process store for orchestrator tests.
    #[derive(Default)]
    pub struct MemoryStore {
        pub rows: Mutex<Vec<CampusReport>>,
        pub fail_writes: bool,
        pub fail_reads: bool,
    }

    impl MemoryStore {
        pub fn with_rows(rows: Vec<CampusReport>) -> Self {
            Self {
                rows: Mutex::new(rows),
                ..Self::default()
            }
        }
    }

    impl RowStore for MemoryStore {
        async fn append(&self, report: &CampusReport) -> Result<(), StoreError> {
            if self.fail_writes {
                return Err(StoreError::write("sheet quota exceeded"));
            }
            self.rows.lock().unwrap().push(report.clone());
            Ok(())
        }

        async fn fetch(
            &self,
            campuses: Option<&[CampusId]>,
            year: Option<i32>,
        ) -> Result<Vec<CampusReport>, StoreError> {
            if self.fail_reads {
                return Err(StoreError::read("sheet unavailable"));
            }
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|report| matches_filter(report, campuses, year))
                .cloned()
                .collect())
        }
    }
}
