use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::config::CampusDirectory;
use crate::models::{CampusId, CampusReport, Stat, StatMap, UNKNOWN_CAMPUS};
use crate::store::{campus_from_name, year_bounds, RowStore, StoreError};

/// Column holding each stat in `campus_pulse.reports`.
fn column(stat: Stat) -> &'static str {
    match stat {
        Stat::TotalAttendance => "total_attendance",
        Stat::NewVisitors => "new_people",
        Stat::Decisions => "new_christians",
        Stat::YouthAttendance => "youth_attendance",
        Stat::KidsAttendance => "kids_total",
        Stat::ConnectGroups => "connect_groups",
    }
}

pub struct PgStore {
    pool: PgPool,
    directory: CampusDirectory,
}

impl PgStore {
    pub async fn connect(database_url: &str, directory: CampusDirectory) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { pool, directory })
    }

    pub async fn init_db(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

impl RowStore for PgStore {
    async fn append(&self, report: &CampusReport) -> Result<(), StoreError> {
        let mut values = Vec::with_capacity(Stat::ALL.len());
        for stat in Stat::ALL {
            let value = report
                .stats
                .get(&stat)
                .map(|v| i32::try_from(*v))
                .transpose()
                .map_err(StoreError::write)?;
            values.push(value);
        }
        let campus = if report.campus == UNKNOWN_CAMPUS {
            UNKNOWN_CAMPUS.to_string()
        } else {
            self.directory.display_name(&report.campus)
        };

        sqlx::query(
            r#"
            INSERT INTO campus_pulse.reports
            (id, campus, report_date, submitted_at, total_attendance, new_people,
             new_christians, youth_attendance, kids_total, connect_groups, raw_text)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(report.id)
        .bind(campus)
        .bind(report.report_date)
        .bind(report.submitted_at)
        .bind(values[0])
        .bind(values[1])
        .bind(values[2])
        .bind(values[3])
        .bind(values[4])
        .bind(values[5])
        .bind(&report.raw_text)
        .execute(&self.pool)
        .await
        .map_err(StoreError::write)?;

        Ok(())
    }

    async fn fetch(
        &self,
        campuses: Option<&[CampusId]>,
        year: Option<i32>,
    ) -> Result<Vec<CampusReport>, StoreError> {
        let stat_columns: Vec<&str> = Stat::ALL.iter().map(|stat| column(*stat)).collect();
        let mut query = format!(
            "SELECT id, campus, report_date, submitted_at, {}, raw_text \
             FROM campus_pulse.reports \
             WHERE TRUE",
            stat_columns.join(", ")
        );

        let names: Option<Vec<String>> = campuses.map(|ids| {
            ids.iter()
                .map(|id| self.directory.display_name(id).to_lowercase())
                .collect()
        });
        let bounds = year.map(year_bounds).transpose()?;

        let mut param = 0;
        if names.is_some() {
            param += 1;
            query.push_str(&format!(" AND lower(campus) = ANY(${param})"));
        }
        if bounds.is_some() {
            query.push_str(&format!(
                " AND report_date >= ${} AND report_date < ${}",
                param + 1,
                param + 2
            ));
        }
        query.push_str(" ORDER BY report_date, submitted_at");

        let mut rows = sqlx::query(&query);
        if let Some(names) = names {
            rows = rows.bind(names);
        }
        if let Some((start, end)) = bounds {
            rows = rows.bind(start).bind(end);
        }

        let records = rows.fetch_all(&self.pool).await.map_err(StoreError::read)?;
        let mut reports = Vec::with_capacity(records.len());

        for (i, row) in records.iter().enumerate() {
            let malformed = |reason: String| StoreError::Malformed { row: i + 1, reason };
            let mut stats = StatMap::new();
            for stat in Stat::ALL {
                let value: Option<i32> = row.try_get(column(stat)).map_err(StoreError::read)?;
                if let Some(value) = value {
                    let value = u32::try_from(value)
                        .map_err(|_| malformed(format!("negative {}: {value}", stat.key())))?;
                    stats.insert(stat, value);
                }
            }
            let campus: String = row.try_get("campus").map_err(StoreError::read)?;
            let report_date: NaiveDate = row.try_get("report_date").map_err(StoreError::read)?;
            let submitted_at: DateTime<Utc> =
                row.try_get("submitted_at").map_err(StoreError::read)?;
            let id: Uuid = row.try_get("id").map_err(StoreError::read)?;

            reports.push(CampusReport {
                id,
                campus: campus_from_name(&self.directory, &campus),
                report_date,
                stats,
                raw_text: row.try_get("raw_text").map_err(StoreError::read)?,
                submitted_at,
            });
        }

        Ok(reports)
    }
}
