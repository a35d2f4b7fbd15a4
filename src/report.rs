use std::fmt::Write;

use crate::analytics;
use crate::models::{AnalyticsResult, CampusReport};

pub fn build_report(
    scope: Option<&str>,
    year: Option<i32>,
    reports: &[CampusReport],
    analysis: &AnalyticsResult,
) -> String {
    let mut output = String::new();
    let scope_label = scope.unwrap_or("all campuses");
    let period_label = match year {
        Some(year) => year.to_string(),
        None => "all history".to_string(),
    };

    let _ = writeln!(output, "# Campus Review");
    let _ = writeln!(output, "Generated for {} ({})", scope_label, period_label);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Campus Stats");

    if reports.is_empty() {
        let _ = writeln!(output, "No reports recorded for this period.");
    } else {
        for summary in analysis.campuses.iter().filter(|s| s.report_count > 0) {
            let _ = writeln!(output);
            let _ = writeln!(output, "### {} ({} reports)", summary.name, summary.report_count);
            let _ = writeln!(output, "| Stat | Total | Average | Reports |");
            let _ = writeln!(output, "| --- | ---: | ---: | ---: |");
            for aggregate in &summary.stats {
                let _ = writeln!(
                    output,
                    "| {} | {} | {} | {} |",
                    aggregate.stat.label(),
                    aggregate.sum,
                    aggregate.average,
                    aggregate.count
                );
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Insights");

    if analysis.insights.is_empty() {
        let _ = writeln!(output, "Nothing unusual this period.");
    } else {
        for insight in &analysis.insights {
            let _ = writeln!(output, "- {}", insight);
        }
    }

    let trends = analytics::weekly_trends(reports);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Weekly Attendance");

    if trends.is_empty() {
        let _ = writeln!(output, "No reports recorded for this period.");
    } else {
        for trend in trends.iter().rev().take(8) {
            let _ = writeln!(
                output,
                "- Week of {}: {} reports, {} attendance (avg {})",
                trend.week_start,
                trend.report_count,
                trend.attendance_total,
                trend.attendance_average
            );
        }
    }

    let mut recent = reports.to_vec();
    recent.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Submissions");

    if recent.is_empty() {
        let _ = writeln!(output, "No reports recorded for this period.");
    } else {
        for report in recent.iter().take(5) {
            let campus = analysis
                .campuses
                .iter()
                .find(|summary| summary.campus == report.campus)
                .map(|summary| summary.name.as_str())
                .unwrap_or(report.campus.as_str());
            let _ = writeln!(
                output,
                "- {} ({}): {}",
                campus, report.report_date, report.raw_text
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::analytics::AnalyticsEngine;
    use crate::config::Settings;
    use crate::store::seed_reports;

    #[test]
    fn renders_sections_for_seeded_history() {
        let directory = Settings::default().directory();
        let reports = seed_reports(NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()).unwrap();
        let campuses = vec!["south".to_string(), "paradise".to_string()];
        let selected: Vec<CampusReport> = reports
            .into_iter()
            .filter(|report| campuses.contains(&report.campus))
            .collect();
        let analysis =
            AnalyticsEngine::new(&directory, 0.2).analyze(&selected, &campuses, None, None);

        let report = build_report(Some("South, Paradise"), None, &selected, &analysis);
        assert!(report.starts_with("# Campus Review\nGenerated for South, Paradise (all history)"));
        assert!(report.contains("### South (3 reports)"));
        assert!(report.contains("| attendance | 1352 | 450.7 | 3 |"));
        assert!(report.contains("- South outpaced Paradise by"));
        assert!(report.contains("- Week of 2026-10-05: 2 reports, 768 attendance (avg 384.0)"));
        assert!(report.matches("\n- ").count() >= 5);
    }

    #[test]
    fn empty_history_says_so() {
        let directory = Settings::default().directory();
        let campuses = vec!["south".to_string()];
        let analysis =
            AnalyticsEngine::new(&directory, 0.2).analyze(&[], &campuses, Some(2026), None);
        let report = build_report(None, Some(2026), &[], &analysis);
        assert!(report.contains("Generated for all campuses (2026)"));
        assert!(report.contains("No reports recorded for this period."));
        assert!(report.contains("Nothing unusual this period."));
    }
}
