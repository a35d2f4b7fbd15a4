use chrono::{Datelike, NaiveDate};

use crate::extract::StatExtractor;
use crate::models::ComparisonQuery;
use crate::resolver::CampusResolver;
use crate::text::{self, Token};

const CONNECTORS: &[&str] = &[
    "vs",
    "versus",
    "compare",
    "compared to",
    "compared with",
    "against",
    "between",
    "and",
];

const CURRENT_YEAR_PHRASES: &[&str] = &["this year", "ytd", "year to date"];
const PREVIOUS_YEAR_PHRASES: &[&str] = &["last year"];

/// Classifies questions as single-campus or cross-location and pulls out
/// the campuses, year and stat they ask about.
pub struct ComparisonDetector<'a> {
    resolver: &'a CampusResolver,
    extractor: &'a StatExtractor,
}

impl<'a> ComparisonDetector<'a> {
    pub fn new(resolver: &'a CampusResolver, extractor: &'a StatExtractor) -> Self {
        Self {
            resolver,
            extractor,
        }
    }

    pub fn detect(&self, question: &str, today: NaiveDate) -> ComparisonQuery {
        let tokens = text::tokenize(question);
        let campuses = self.resolver.resolve_all(&tokens);
        let has_connector = contains_any(&tokens, CONNECTORS);
        let cross_location = campuses.len() >= 2;

        if has_connector && !cross_location && !campuses.is_empty() {
            tracing::debug!(?campuses, "comparison wording with a single campus");
        }

        let mentioned = self.extractor.mentioned_stats(&tokens);
        let stat = match mentioned.as_slice() {
            [only] => Some(*only),
            _ => None,
        };

        ComparisonQuery {
            cross_location,
            campuses,
            year: year_filter(&tokens, today),
            years: mentioned_years(&tokens, today),
            stat,
            church_wide: self.resolver.is_church_wide(question),
            has_connector,
        }
    }
}

/// An explicit four digit year wins; "this year" and "ytd" mean the year of
/// `today`; "last year" the one before. No year means all history.
pub fn year_filter(tokens: &[Token], today: NaiveDate) -> Option<i32> {
    if let Some((_, year)) = explicit_years(tokens).into_iter().next() {
        return Some(year);
    }
    if contains_any(tokens, CURRENT_YEAR_PHRASES) {
        return Some(today.year());
    }
    if contains_any(tokens, PREVIOUS_YEAR_PHRASES) {
        return Some(today.year() - 1);
    }
    None
}

/// Distinct years named explicitly or by relative phrase, in the order they
/// appear.
pub fn mentioned_years(tokens: &[Token], today: NaiveDate) -> Vec<i32> {
    let mut found = explicit_years(tokens);
    for (phrases, year) in [
        (CURRENT_YEAR_PHRASES, today.year()),
        (PREVIOUS_YEAR_PHRASES, today.year() - 1),
    ] {
        for phrase in phrases {
            for (start, _) in text::find_phrase(tokens, &text::phrase_words(phrase)) {
                found.push((start, year));
            }
        }
    }
    found.sort_by_key(|(position, _)| *position);

    let mut years = Vec::new();
    for (_, year) in found {
        if !years.contains(&year) {
            years.push(year);
        }
    }
    years
}

fn explicit_years(tokens: &[Token]) -> Vec<(usize, i32)> {
    tokens
        .iter()
        .filter(|token| token.end - token.start == 4)
        .filter_map(|token| token.number().map(|value| (token.index, value)))
        .filter(|(_, value)| (1900..=2100).contains(value))
        .filter_map(|(index, value)| i32::try_from(value).ok().map(|year| (index, year)))
        .collect()
}

fn contains_any(tokens: &[Token], phrases: &[&str]) -> bool {
    phrases
        .iter()
        .any(|phrase| !text::find_phrase(tokens, &text::phrase_words(phrase)).is_empty())
}
