use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Campus id carried by reports whose location could not be determined.
pub const UNKNOWN_CAMPUS: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stat {
    TotalAttendance,
    NewVisitors,
    Decisions,
    YouthAttendance,
    KidsAttendance,
    ConnectGroups,
}

impl Stat {
    pub const ALL: [Stat; 6] = [
        Stat::TotalAttendance,
        Stat::NewVisitors,
        Stat::Decisions,
        Stat::YouthAttendance,
        Stat::KidsAttendance,
        Stat::ConnectGroups,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Stat::TotalAttendance => "total_attendance",
            Stat::NewVisitors => "new_visitors",
            Stat::Decisions => "decisions",
            Stat::YouthAttendance => "youth_attendance",
            Stat::KidsAttendance => "kids_attendance",
            Stat::ConnectGroups => "connect_groups",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Stat::TotalAttendance => "attendance",
            Stat::NewVisitors => "new visitors",
            Stat::Decisions => "decisions",
            Stat::YouthAttendance => "youth attendance",
            Stat::KidsAttendance => "kids attendance",
            Stat::ConnectGroups => "connect groups",
        }
    }

    /// Column header used by the sheet and by the Postgres table mapping.
    pub fn column(self) -> &'static str {
        match self {
            Stat::TotalAttendance => "Total Attendance",
            Stat::NewVisitors => "New People",
            Stat::Decisions => "New Christians",
            Stat::YouthAttendance => "Youth Attendance",
            Stat::KidsAttendance => "Kids Total",
            Stat::ConnectGroups => "Connect Groups",
        }
    }

    pub fn from_key(key: &str) -> Option<Stat> {
        Stat::ALL.into_iter().find(|stat| stat.key() == key)
    }
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub type StatMap = BTreeMap<Stat, u32>;

pub type CampusId = String;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Campus {
    pub id: CampusId,
    pub name: String,
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampusReport {
    pub id: Uuid,
    pub campus: CampusId,
    pub report_date: NaiveDate,
    pub stats: StatMap,
    pub raw_text: String,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparisonQuery {
    pub cross_location: bool,
    pub campuses: Vec<CampusId>,
    pub year: Option<i32>,
    /// Every distinct year named, in mention order.
    pub years: Vec<i32>,
    pub stat: Option<Stat>,
    pub church_wide: bool,
    pub has_connector: bool,
}

/// Mean of a stat over the reports that carried it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Average {
    NoData,
    Mean(f64),
}

impl Average {
    pub fn of(sum: u64, count: usize) -> Average {
        if count == 0 {
            Average::NoData
        } else {
            Average::Mean(sum as f64 / count as f64)
        }
    }

    pub fn value(self) -> Option<f64> {
        match self {
            Average::NoData => None,
            Average::Mean(value) => Some(value),
        }
    }
}

impl fmt::Display for Average {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Average::NoData => f.write_str("no data"),
            Average::Mean(value) => write!(f, "{value:.1}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatAggregate {
    pub stat: Stat,
    pub count: usize,
    pub sum: u64,
    pub average: Average,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampusSummary {
    pub campus: CampusId,
    pub name: String,
    pub report_count: usize,
    pub stats: Vec<StatAggregate>,
}

impl CampusSummary {
    pub fn aggregate(&self, stat: Stat) -> Option<&StatAggregate> {
        self.stats.iter().find(|aggregate| aggregate.stat == stat)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsResult {
    pub year: Option<i32>,
    pub campuses: Vec<CampusSummary>,
    pub insights: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyTrend {
    pub week_start: NaiveDate,
    pub report_count: usize,
    pub attendance_total: u64,
    pub attendance_average: Average,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stat_keys_round_trip() {
        for stat in Stat::ALL {
            assert_eq!(Stat::from_key(stat.key()), Some(stat));
        }
        assert_eq!(Stat::from_key("tithe"), None);
    }

    #[test]
    fn average_without_reports_is_no_data() {
        assert_eq!(Average::of(0, 0), Average::NoData);
        assert_eq!(Average::of(0, 0).to_string(), "no data");
        assert_eq!(Average::of(360, 3), Average::Mean(120.0));
    }
}
