//! Request-level flows: recording a submitted report and answering a
//! question over the stored history.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::analytics::{self, AnalyticsEngine};
use crate::compare::ComparisonDetector;
use crate::config::{CampusDirectory, Settings};
use crate::extract::{self, StatExtractor};
use crate::models::{
    AnalyticsResult, Average, CampusId, CampusReport, CampusSummary, Stat, StatMap,
    UNKNOWN_CAMPUS,
};
use crate::resolver::CampusResolver;
use crate::store::{RowStore, StoreError};
use crate::text;

#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub campus: CampusId,
    pub campus_name: String,
    pub report_date: NaiveDate,
    pub stats: StatMap,
    pub raw_text: String,
    /// False when nothing countable was found and no row was written.
    pub recorded: bool,
    pub follow_ups: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub campuses: Vec<CampusId>,
    pub cross_location: bool,
    pub text: String,
    pub analysis: Option<AnalyticsResult>,
    /// One single-campus analysis per year when a campus is compared
    /// across years.
    pub periods: Vec<AnalyticsResult>,
    pub insights: Vec<String>,
}

pub struct Pulse<S> {
    store: S,
    directory: CampusDirectory,
    extractor: StatExtractor,
    resolver: CampusResolver,
    insight_threshold: f64,
}

impl<S: RowStore> Pulse<S> {
    pub fn new(store: S, settings: &Settings) -> Self {
        let directory = settings.directory();
        let resolver = CampusResolver::new(&directory);
        Self {
            store,
            extractor: StatExtractor::new(&settings.triggers(), settings.extraction_window),
            resolver,
            directory,
            insight_threshold: settings.insight_threshold,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn directory(&self) -> &CampusDirectory {
        &self.directory
    }

    /// An explicit campus override is authoritative; the text is only
    /// searched for a campus when no override is given.
    pub async fn submit(
        &self,
        text: &str,
        campus_override: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Submission, StoreError> {
        let tokens = text::tokenize(text);
        let override_name = campus_override.map(str::trim).filter(|name| {
            !name.is_empty() && !matches!(name.to_lowercase().as_str(), "none" | "null")
        });

        let campus = match override_name {
            Some(name) => match self.directory.lookup(name) {
                Some(campus) => campus.id.clone(),
                None => {
                    tracing::warn!(campus = name, "campus override is not configured");
                    UNKNOWN_CAMPUS.to_string()
                }
            },
            None => self.resolver.resolve_tokens(&tokens).unwrap_or_else(|| {
                tracing::info!("no campus found in submission");
                UNKNOWN_CAMPUS.to_string()
            }),
        };

        let stats = self.extractor.extract(text);
        let report = CampusReport {
            id: Uuid::new_v4(),
            campus,
            report_date: extract::explicit_date(&tokens).unwrap_or_else(|| now.date_naive()),
            stats,
            raw_text: text.to_string(),
            submitted_at: now,
        };

        let recorded = if report.stats.is_empty() {
            tracing::warn!(campus = %report.campus, "submission has no stats; nothing stored");
            false
        } else {
            self.store.append(&report).await?;
            tracing::info!(
                campus = %report.campus,
                date = %report.report_date,
                stats = report.stats.len(),
                "report recorded"
            );
            true
        };

        Ok(Submission {
            campus_name: self.directory.display_name(&report.campus),
            follow_ups: extract::missing_prompts(&report.stats)
                .into_iter()
                .map(str::to_string)
                .collect(),
            campus: report.campus,
            report_date: report.report_date,
            stats: report.stats,
            raw_text: report.raw_text,
            recorded,
        })
    }

    pub async fn ask(&self, question: &str, today: NaiveDate) -> Result<Answer, StoreError> {
        let detector = ComparisonDetector::new(&self.resolver, &self.extractor);
        let query = detector.detect(question, today);

        let campuses = if !query.campuses.is_empty() {
            query.campuses.clone()
        } else if let Some(campus) = self.resolver.resolve(question) {
            vec![campus]
        } else if query.church_wide {
            self.directory.ids()
        } else {
            tracing::info!(question, "question names no campus");
            return Ok(Answer {
                campuses: Vec::new(),
                cross_location: false,
                text: self.unresolved_text(),
                analysis: None,
                periods: Vec::new(),
                insights: Vec::new(),
            });
        };

        if campuses.len() == 1 && query.years.len() >= 2 {
            return self.compare_years(campuses, &query.years, query.stat).await;
        }

        let reports = self.store.fetch(Some(&campuses), query.year).await?;
        let engine = AnalyticsEngine::new(&self.directory, self.insight_threshold);
        let analysis = engine.analyze(&reports, &campuses, query.year, query.stat);
        let church_wide = query.campuses.is_empty() && query.church_wide;

        let text = if church_wide {
            church_wide_text(&analysis, query.stat)
        } else if query.cross_location {
            comparison_text(&analysis, query.stat)
        } else {
            single_campus_text(&analysis, query.stat)
        };

        Ok(Answer {
            cross_location: query.cross_location,
            campuses,
            text,
            insights: analysis.insights.clone(),
            analysis: Some(analysis),
            periods: Vec::new(),
        })
    }

    /// One campus across several years, oldest first.
    async fn compare_years(
        &self,
        campuses: Vec<CampusId>,
        years: &[i32],
        stat: Option<Stat>,
    ) -> Result<Answer, StoreError> {
        let mut years = years.to_vec();
        years.sort_unstable();

        let reports = self.store.fetch(Some(&campuses), None).await?;
        let engine = AnalyticsEngine::new(&self.directory, self.insight_threshold);
        let periods: Vec<AnalyticsResult> = years
            .iter()
            .map(|year| engine.analyze(&reports, &campuses, Some(*year), stat))
            .collect();
        let insights = analytics::year_over_year(&periods, stat.unwrap_or(Stat::TotalAttendance))
            .into_iter()
            .collect();
        tracing::debug!(?years, campus = %campuses[0], "comparing a campus across years");

        Ok(Answer {
            campuses,
            cross_location: false,
            text: period_comparison_text(&periods, stat),
            analysis: None,
            periods,
            insights,
        })
    }

    /// Stored reports plus their analysis for a review document.
    pub async fn review(
        &self,
        campuses: &[CampusId],
        year: Option<i32>,
    ) -> Result<(Vec<CampusReport>, AnalyticsResult), StoreError> {
        let reports = self.store.fetch(Some(campuses), year).await?;
        let engine = AnalyticsEngine::new(&self.directory, self.insight_threshold);
        let analysis = engine.analyze(&reports, campuses, year, None);
        Ok((reports, analysis))
    }

    fn unresolved_text(&self) -> String {
        let examples: Vec<&str> = self
            .directory
            .campuses()
            .iter()
            .take(2)
            .map(|campus| campus.name.as_str())
            .collect();
        format!(
            "I couldn't tell which campus you meant. Try naming one, like {}.",
            examples.join(" or ")
        )
    }
}

fn period(year: Option<i32>) -> String {
    match year {
        Some(year) => format!("in {year}"),
        None => "across all history".to_string(),
    }
}

fn describe(average: Average) -> String {
    match average {
        Average::Mean(value) => format!("avg {value:.1}"),
        Average::NoData => "no data".to_string(),
    }
}

fn stat_list(summary: &CampusSummary) -> String {
    summary
        .stats
        .iter()
        .map(|aggregate| format!("{} {}", aggregate.stat.label(), describe(aggregate.average)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn single_campus_text(analysis: &AnalyticsResult, stat: Option<Stat>) -> String {
    let when = period(analysis.year);
    let Some(summary) = analysis.campuses.first() else {
        return format!("No reports found {when}.");
    };
    if summary.report_count == 0 {
        return format!("No reports found for {} {when}.", summary.name);
    }

    match stat.and_then(|stat| summary.aggregate(stat)) {
        Some(aggregate) => match aggregate.average {
            Average::Mean(value) => format!(
                "{} averaged {value:.1} {} per service {when} ({} total over {} reports).",
                summary.name,
                aggregate.stat.label(),
                aggregate.sum,
                aggregate.count
            ),
            Average::NoData => format!(
                "No {} data found for {} {when}.",
                aggregate.stat.label(),
                summary.name
            ),
        },
        None => format!(
            "{} {when} ({} reports): {}.",
            summary.name,
            summary.report_count,
            stat_list(summary)
        ),
    }
}

fn comparison_text(analysis: &AnalyticsResult, stat: Option<Stat>) -> String {
    let when = period(analysis.year);
    match stat {
        Some(stat) => {
            let parts: Vec<String> = analysis
                .campuses
                .iter()
                .map(|summary| {
                    let average = summary
                        .aggregate(stat)
                        .map(|aggregate| aggregate.average)
                        .unwrap_or(Average::NoData);
                    format!("{} {}", summary.name, describe(average))
                })
                .collect();
            format!("{} {when}: {}.", capitalize(stat.label()), parts.join(", "))
        }
        None => {
            let parts: Vec<String> = analysis
                .campuses
                .iter()
                .map(|summary| {
                    if summary.report_count == 0 {
                        format!("{}: no reports", summary.name)
                    } else {
                        format!(
                            "{} ({} reports): {}",
                            summary.name,
                            summary.report_count,
                            stat_list(summary)
                        )
                    }
                })
                .collect();
            format!("Comparison {when}. {}.", parts.join("; "))
        }
    }
}

fn period_comparison_text(periods: &[AnalyticsResult], stat: Option<Stat>) -> String {
    let Some(name) = periods
        .first()
        .and_then(|result| result.campuses.first())
        .map(|summary| summary.name.as_str())
    else {
        return "No reports found.".to_string();
    };

    let mut parts = Vec::new();
    for result in periods {
        let (Some(year), Some(summary)) = (result.year, result.campuses.first()) else {
            continue;
        };
        let part = match stat {
            Some(stat) => {
                let average = summary
                    .aggregate(stat)
                    .map(|aggregate| aggregate.average)
                    .unwrap_or(Average::NoData);
                format!("{year} {}", describe(average))
            }
            None if summary.report_count == 0 => format!("{year}: no reports"),
            None => format!(
                "{year} ({} reports): {}",
                summary.report_count,
                stat_list(summary)
            ),
        };
        parts.push(part);
    }

    match stat {
        Some(stat) => format!("{name} {} by year: {}.", stat.label(), parts.join(", ")),
        None => format!("{name} by year. {}.", parts.join("; ")),
    }
}

fn church_wide_text(analysis: &AnalyticsResult, stat: Option<Stat>) -> String {
    let when = period(analysis.year);
    let stat = stat.unwrap_or(Stat::TotalAttendance);
    let (sum, count) = analysis
        .campuses
        .iter()
        .filter_map(|summary| summary.aggregate(stat))
        .fold((0u64, 0usize), |(sum, count), aggregate| {
            (sum + aggregate.sum, count + aggregate.count)
        });

    match Average::of(sum, count) {
        Average::Mean(value) => format!(
            "Across all campuses {when}, {} totalled {sum} over {count} reports, avg {value:.1} per service.",
            stat.label()
        ),
        Average::NoData => format!("No {} data found across all campuses {when}.", stat.label()),
    }
}

fn capitalize(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
