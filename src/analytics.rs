use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};

use crate::config::CampusDirectory;
use crate::models::{
    AnalyticsResult, Average, CampusId, CampusReport, CampusSummary, Stat, StatAggregate,
    WeeklyTrend,
};

pub const MAX_INSIGHTS: usize = 2;
pub const MAX_INSIGHT_WORDS: usize = 12;

pub struct AnalyticsEngine<'a> {
    directory: &'a CampusDirectory,
    threshold: f64,
}

impl<'a> AnalyticsEngine<'a> {
    /// `threshold` is the fractional deviation from a campus's own average
    /// that makes a latest value worth an insight (0.2 = 20%).
    pub fn new(directory: &'a CampusDirectory, threshold: f64) -> Self {
        Self {
            directory,
            threshold,
        }
    }

    pub fn analyze(
        &self,
        reports: &[CampusReport],
        campuses: &[CampusId],
        year: Option<i32>,
        stat: Option<Stat>,
    ) -> AnalyticsResult {
        let stats: Vec<Stat> = match stat {
            Some(stat) => vec![stat],
            None => Stat::ALL.to_vec(),
        };

        let mut histories = Vec::new();
        let mut summaries = Vec::new();

        for campus in campuses {
            let mut rows: Vec<&CampusReport> = reports
                .iter()
                .filter(|report| &report.campus == campus)
                .filter(|report| year.map_or(true, |y| report.report_date.year() == y))
                .collect();
            rows.sort_by_key(|report| (report.report_date, report.submitted_at));

            summaries.push(CampusSummary {
                campus: campus.clone(),
                name: self.directory.display_name(campus),
                report_count: rows.len(),
                stats: stats.iter().map(|stat| aggregate(&rows, *stat)).collect(),
            });
            histories.push(rows);
        }

        let mut insights = Vec::new();
        if let [first, second] = summaries.as_slice() {
            insights.extend(delta_insight(first, second, &stats));
        }
        insights.extend(self.trend_insight(&summaries, &histories, &stats));
        insights.retain(|insight| insight.split_whitespace().count() <= MAX_INSIGHT_WORDS);
        insights.truncate(MAX_INSIGHTS);

        tracing::debug!(
            campuses = summaries.len(),
            insights = insights.len(),
            "analysis complete"
        );

        AnalyticsResult {
            year,
            campuses: summaries,
            insights,
        }
    }

    /// Largest deviation of a campus's latest value from the mean of its
    /// earlier reports, if it clears the threshold.
    fn trend_insight(
        &self,
        summaries: &[CampusSummary],
        histories: &[Vec<&CampusReport>],
        stats: &[Stat],
    ) -> Option<String> {
        let mut best: Option<(f64, &CampusSummary, Stat, u32)> = None;

        for (summary, rows) in summaries.iter().zip(histories) {
            for stat in stats {
                let values: Vec<u32> = rows
                    .iter()
                    .filter_map(|report| report.stats.get(stat).copied())
                    .collect();
                let Some((latest, earlier)) = values.split_last() else {
                    continue;
                };
                if earlier.is_empty() {
                    continue;
                }
                let mean =
                    earlier.iter().map(|v| f64::from(*v)).sum::<f64>() / earlier.len() as f64;
                if mean <= 0.0 {
                    continue;
                }
                let deviation = f64::from(*latest) / mean - 1.0;
                if deviation.abs() <= self.threshold {
                    continue;
                }
                if best.map_or(true, |(current, ..)| deviation.abs() > current.abs()) {
                    best = Some((deviation, summary, *stat, *latest));
                }
            }
        }

        best.map(|(deviation, summary, stat, latest)| {
            let percent = (deviation.abs() * 100.0).round();
            if deviation > 0.0 {
                format!(
                    "{} {} hit {}, {:.0}% above average",
                    summary.name,
                    stat.label(),
                    latest,
                    percent
                )
            } else {
                format!(
                    "{} {} fell to {}, {:.0}% below average",
                    summary.name,
                    stat.label(),
                    latest,
                    percent
                )
            }
        })
    }
}

fn aggregate(rows: &[&CampusReport], stat: Stat) -> StatAggregate {
    let values: Vec<u64> = rows
        .iter()
        .filter_map(|report| report.stats.get(&stat).map(|v| u64::from(*v)))
        .collect();
    let sum = values.iter().sum();
    StatAggregate {
        stat,
        count: values.len(),
        sum,
        average: Average::of(sum, values.len()),
    }
}

/// Per-service gap between two campuses on the stat where they differ most,
/// relative to the larger average.
fn delta_insight(
    first: &CampusSummary,
    second: &CampusSummary,
    stats: &[Stat],
) -> Option<String> {
    let mut best: Option<(f64, Stat, f64)> = None;

    for stat in stats {
        let (Some(a), Some(b)) = (
            first.aggregate(*stat).and_then(|agg| agg.average.value()),
            second.aggregate(*stat).and_then(|agg| agg.average.value()),
        ) else {
            continue;
        };
        let delta = a - b;
        if delta.abs().round() < 1.0 {
            continue;
        }
        let relative = delta.abs() / a.max(b);
        if best.map_or(true, |(current, ..)| relative > current) {
            best = Some((relative, *stat, delta));
        }
    }

    best.map(|(_, stat, delta)| {
        let (leader, trailer) = if delta > 0.0 {
            (&first.name, &second.name)
        } else {
            (&second.name, &first.name)
        };
        format!(
            "{leader} outpaced {trailer} by {:.0} {} per service",
            delta.abs(),
            stat.label()
        )
    })
}

/// Change in a campus's per-service average between the first and last
/// period, each period being one single-campus analysis.
pub fn year_over_year(periods: &[AnalyticsResult], stat: Stat) -> Option<String> {
    let mean_of = |result: &AnalyticsResult| -> Option<(i32, String, f64)> {
        let summary = result.campuses.first()?;
        let average = summary.aggregate(stat)?.average.value()?;
        Some((result.year?, summary.name.clone(), average))
    };
    let (from, name, before) = mean_of(periods.first()?)?;
    let (to, _, after) = mean_of(periods.last()?)?;
    if from == to || before <= 0.0 {
        return None;
    }

    let change = ((after / before - 1.0) * 100.0).round();
    let insight = if change > 0.0 {
        format!("{name} {} rose {change:.0}% from {from} to {to}", stat.label())
    } else if change < 0.0 {
        format!(
            "{name} {} fell {:.0}% from {from} to {to}",
            stat.label(),
            change.abs()
        )
    } else {
        format!("{name} {} held steady from {from} to {to}", stat.label())
    };
    (insight.split_whitespace().count() <= MAX_INSIGHT_WORDS).then_some(insight)
}

/// Reports bucketed by the Monday that starts their week, oldest first.
pub fn weekly_trends(reports: &[CampusReport]) -> Vec<WeeklyTrend> {
    let mut weeks: BTreeMap<NaiveDate, (usize, u64, usize)> = BTreeMap::new();

    for report in reports {
        let offset = i64::from(report.report_date.weekday().num_days_from_monday());
        let week_start = report.report_date - Duration::days(offset);
        let entry = weeks.entry(week_start).or_insert((0, 0, 0));
        entry.0 += 1;
        if let Some(attendance) = report.stats.get(&Stat::TotalAttendance) {
            entry.1 += u64::from(*attendance);
            entry.2 += 1;
        }
    }

    weeks
        .into_iter()
        .map(|(week_start, (report_count, total, with_attendance))| WeeklyTrend {
            week_start,
            report_count,
            attendance_total: total,
            attendance_average: Average::of(total, with_attendance),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::models::StatMap;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn report(campus: &str, date: (i32, u32, u32), stats: &[(Stat, u32)]) -> CampusReport {
        let report_date = NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap();
        CampusReport {
            id: Uuid::new_v4(),
            campus: campus.to_string(),
            report_date,
            stats: stats.iter().copied().collect::<StatMap>(),
            raw_text: String::new(),
            submitted_at: Utc
                .from_utc_datetime(&report_date.and_hms_opt(12, 0, 0).unwrap()),
        }
    }

    fn ids(campuses: &[&str]) -> Vec<CampusId> {
        campuses.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn averages_youth_attendance() {
        let directory = Settings::default().directory();
        let engine = AnalyticsEngine::new(&directory, 0.2);
        let reports = vec![
            report("south", (2026, 1, 4), &[(Stat::YouthAttendance, 100)]),
            report("south", (2026, 1, 11), &[(Stat::YouthAttendance, 120)]),
            report("south", (2026, 1, 18), &[(Stat::YouthAttendance, 140)]),
            report("paradise", (2026, 1, 18), &[(Stat::YouthAttendance, 999)]),
        ];

        let result = engine.analyze(&reports, &ids(&["south"]), None, Some(Stat::YouthAttendance));
        let south = &result.campuses[0];
        assert_eq!(south.name, "South");
        assert_eq!(south.report_count, 3);
        let youth = south.aggregate(Stat::YouthAttendance).unwrap();
        assert_eq!(youth.count, 3);
        assert_eq!(youth.sum, 360);
        assert_eq!(youth.average, Average::Mean(120.0));
        assert_eq!(south.stats.len(), 1);
    }

    #[test]
    fn no_reports_means_no_data() {
        let directory = Settings::default().directory();
        let engine = AnalyticsEngine::new(&directory, 0.2);
        let result = engine.analyze(&[], &ids(&["south"]), Some(2026), None);
        let south = &result.campuses[0];
        assert_eq!(south.report_count, 0);
        assert_eq!(south.stats.len(), Stat::ALL.len());
        for aggregate in &south.stats {
            assert_eq!(aggregate.count, 0);
            assert_eq!(aggregate.average, Average::NoData);
        }
        assert!(result.insights.is_empty());
    }

    #[test]
    fn absent_stats_are_not_zeroes() {
        let directory = Settings::default().directory();
        let engine = AnalyticsEngine::new(&directory, 0.2);
        let reports = vec![
            report(
                "south",
                (2026, 2, 1),
                &[(Stat::KidsAttendance, 60), (Stat::TotalAttendance, 300)],
            ),
            report("south", (2026, 2, 8), &[(Stat::TotalAttendance, 310)]),
            report("south", (2026, 2, 15), &[(Stat::KidsAttendance, 80)]),
        ];
        let result = engine.analyze(&reports, &ids(&["south"]), None, Some(Stat::KidsAttendance));
        let kids = result.campuses[0].aggregate(Stat::KidsAttendance).unwrap();
        assert_eq!(kids.count, 2);
        assert_eq!(kids.average, Average::Mean(70.0));
    }

    #[test]
    fn filters_by_year() {
        let directory = Settings::default().directory();
        let engine = AnalyticsEngine::new(&directory, 0.2);
        let reports = vec![
            report("south", (2025, 12, 28), &[(Stat::TotalAttendance, 500)]),
            report("south", (2026, 1, 4), &[(Stat::TotalAttendance, 300)]),
        ];
        let result = engine.analyze(
            &reports,
            &ids(&["south"]),
            Some(2026),
            Some(Stat::TotalAttendance),
        );
        let attendance = result.campuses[0].aggregate(Stat::TotalAttendance).unwrap();
        assert_eq!(attendance.sum, 300);
        assert_eq!(result.year, Some(2026));
    }

    #[test]
    fn compares_two_campuses() {
        let directory = Settings::default().directory();
        let engine = AnalyticsEngine::new(&directory, 0.2);
        let reports = vec![
            report("south", (2026, 3, 1), &[(Stat::NewVisitors, 30), (Stat::TotalAttendance, 400)]),
            report(
                "mount_barker",
                (2026, 3, 1),
                &[(Stat::NewVisitors, 20), (Stat::TotalAttendance, 390)],
            ),
        ];
        let result = engine.analyze(&reports, &ids(&["south", "mount_barker"]), None, None);
        assert_eq!(
            result.insights,
            vec!["South outpaced Mount Barker by 10 new visitors per service"]
        );

        let flipped = engine.analyze(&reports, &ids(&["mount_barker", "south"]), None, None);
        assert_eq!(flipped.insights, result.insights);
    }

    #[test]
    fn flags_latest_value_against_history() {
        let directory = Settings::default().directory();
        let engine = AnalyticsEngine::new(&directory, 0.2);
        let reports = vec![
            report(
                "south",
                (2026, 1, 4),
                &[(Stat::YouthAttendance, 100), (Stat::KidsAttendance, 80)],
            ),
            report(
                "south",
                (2026, 1, 11),
                &[(Stat::YouthAttendance, 100), (Stat::KidsAttendance, 80)],
            ),
            report(
                "south",
                (2026, 1, 18),
                &[(Stat::YouthAttendance, 150), (Stat::KidsAttendance, 84)],
            ),
        ];
        let result = engine.analyze(&reports, &ids(&["south"]), None, None);
        assert_eq!(
            result.insights,
            vec!["South youth attendance hit 150, 50% above average"]
        );

        let dropped = vec![
            report("paradise", (2026, 1, 4), &[(Stat::TotalAttendance, 200)]),
            report("paradise", (2026, 1, 11), &[(Stat::TotalAttendance, 100)]),
        ];
        let result = engine.analyze(&dropped, &ids(&["paradise"]), None, None);
        assert_eq!(
            result.insights,
            vec!["Paradise attendance fell to 100, 50% below average"]
        );
    }

    #[test]
    fn steady_numbers_produce_no_insights() {
        let directory = Settings::default().directory();
        let engine = AnalyticsEngine::new(&directory, 0.2);
        let reports = vec![
            report("south", (2026, 1, 4), &[(Stat::TotalAttendance, 300)]),
            report("south", (2026, 1, 11), &[(Stat::TotalAttendance, 310)]),
        ];
        let result = engine.analyze(&reports, &ids(&["south"]), None, None);
        assert!(result.insights.is_empty());
    }

    #[test]
    fn insights_are_capped_and_deterministic() {
        let directory = Settings::default().directory();
        let engine = AnalyticsEngine::new(&directory, 0.2);
        let reports = vec![
            report("victor_harbour", (2026, 1, 4), &[(Stat::KidsAttendance, 10)]),
            report("victor_harbour", (2026, 1, 11), &[(Stat::KidsAttendance, 40)]),
            report("adelaide_city", (2026, 1, 4), &[(Stat::KidsAttendance, 90)]),
            report("adelaide_city", (2026, 1, 11), &[(Stat::KidsAttendance, 20)]),
        ];
        let campuses = ids(&["victor_harbour", "adelaide_city"]);
        let first = engine.analyze(&reports, &campuses, None, None);
        let second = engine.analyze(&reports, &campuses, None, None);
        assert_eq!(first.insights, second.insights);
        assert_eq!(first.insights.len(), MAX_INSIGHTS);
        for insight in &first.insights {
            assert!(insight.split_whitespace().count() <= MAX_INSIGHT_WORDS, "{insight}");
        }
        assert_eq!(
            first.insights[1],
            "Victor Harbour kids attendance hit 40, 300% above average"
        );
    }

    #[test]
    fn year_over_year_change_between_first_and_last_period() {
        let directory = Settings::default().directory();
        let engine = AnalyticsEngine::new(&directory, 0.2);
        let reports = vec![
            report("south", (2024, 3, 3), &[(Stat::TotalAttendance, 400)]),
            report("south", (2024, 3, 10), &[(Stat::TotalAttendance, 420)]),
            report("south", (2025, 3, 2), &[(Stat::TotalAttendance, 450)]),
            report("south", (2025, 3, 9), &[(Stat::TotalAttendance, 470)]),
        ];
        let south = ids(&["south"]);
        let periods: Vec<AnalyticsResult> = [2024, 2025]
            .into_iter()
            .map(|year| engine.analyze(&reports, &south, Some(year), Some(Stat::TotalAttendance)))
            .collect();

        assert_eq!(
            year_over_year(&periods, Stat::TotalAttendance).as_deref(),
            Some("South attendance rose 12% from 2024 to 2025")
        );

        let reversed: Vec<AnalyticsResult> = periods.iter().rev().cloned().collect();
        assert_eq!(
            year_over_year(&reversed, Stat::TotalAttendance).as_deref(),
            Some("South attendance fell 11% from 2025 to 2024")
        );
        assert_eq!(year_over_year(&periods, Stat::YouthAttendance), None);
    }

    #[test]
    fn buckets_reports_by_week() {
        let reports = vec![
            report("south", (2026, 3, 1), &[(Stat::TotalAttendance, 300)]),
            report("paradise", (2026, 2, 28), &[(Stat::TotalAttendance, 100)]),
            report("south", (2026, 3, 8), &[(Stat::NewVisitors, 5)]),
        ];
        let trends = weekly_trends(&reports);
        assert_eq!(trends.len(), 2);
        assert_eq!(trends[0].week_start, NaiveDate::from_ymd_opt(2026, 2, 23).unwrap());
        assert_eq!(trends[0].report_count, 2);
        assert_eq!(trends[0].attendance_total, 400);
        assert_eq!(trends[0].attendance_average, Average::Mean(200.0));
        assert_eq!(trends[1].attendance_average, Average::NoData);
    }
}
