use chrono::NaiveDate;

use crate::config::StatTriggers;
use crate::models::{Stat, StatMap};
use crate::text::{self, PhraseMatch, Token, TokenKind};

/// Rule-based extraction of stat counts from free text.
#[derive(Debug, Clone)]
pub struct StatExtractor {
    triggers: Vec<(Stat, Vec<String>, usize)>,
    window: usize,
}

impl StatExtractor {
    pub fn new(triggers: &StatTriggers, window: usize) -> Self {
        let triggers = triggers
            .entries()
            .iter()
            .flat_map(|(stat, phrases)| {
                phrases.iter().filter_map(move |phrase| {
                    let words = text::phrase_words(phrase);
                    let len = words.join(" ").chars().count();
                    (!words.is_empty()).then_some((*stat, words, len))
                })
            })
            .collect();
        Self {
            triggers,
            window: window.max(1),
        }
    }

    pub fn extract(&self, text: &str) -> StatMap {
        self.extract_tokens(&text::tokenize(text))
    }

    fn extract_tokens(&self, tokens: &[Token]) -> StatMap {
        let mut stats = StatMap::new();
        let mut consumed = vec![false; tokens.len()];

        for trigger in self.trigger_matches(tokens) {
            if stats.contains_key(&trigger.value) {
                continue;
            }
            match self.nearest_number(tokens, &trigger, &consumed) {
                Some(index) => {
                    consumed[index] = true;
                    if let Some(value) = tokens[index].number() {
                        stats.insert(trigger.value, value);
                    }
                }
                None => {
                    tracing::debug!(stat = trigger.value.key(), "trigger without a nearby number");
                }
            }
        }

        stats
    }

    /// Distinct stats mentioned in the tokens, in first-mention order.
    pub fn mentioned_stats(&self, tokens: &[Token]) -> Vec<Stat> {
        let mut stats = Vec::new();
        for trigger in self.trigger_matches(tokens) {
            if !stats.contains(&trigger.value) {
                stats.push(trigger.value);
            }
        }
        stats
    }

    fn trigger_matches(&self, tokens: &[Token]) -> Vec<PhraseMatch<Stat>> {
        let mut matches = Vec::new();
        for (stat, words, len) in &self.triggers {
            for (start, end) in text::find_phrase(tokens, words) {
                matches.push(PhraseMatch {
                    start,
                    end,
                    len: *len,
                    value: *stat,
                });
            }
        }
        text::suppress_overlaps(matches)
    }

    fn nearest_number(
        &self,
        tokens: &[Token],
        trigger: &PhraseMatch<Stat>,
        consumed: &[bool],
    ) -> Option<usize> {
        let usable = |token: &Token| token.number().is_some() && !consumed[token.index];

        let before = tokens[..trigger.start]
            .iter()
            .rev()
            .take(self.window)
            .take_while(|token| !token.is_barrier())
            .find(|token| usable(token))
            .map(|token| (trigger.start - token.index, token.index));

        let after = tokens[trigger.end..]
            .iter()
            .take(self.window)
            .take_while(|token| !token.is_barrier())
            .find(|token| usable(token))
            .map(|token| (token.index + 1 - trigger.end, token.index));

        match (before, after) {
            (Some((db, ib)), Some((da, ia))) => Some(if db <= da { ib } else { ia }),
            (Some((_, index)), None) | (None, Some((_, index))) => Some(index),
            (None, None) => None,
        }
    }
}

/// First explicit calendar date written in the text, if any.
pub fn explicit_date(tokens: &[Token]) -> Option<NaiveDate> {
    tokens.iter().find_map(|token| match token.kind {
        TokenKind::Date(date) => Some(date),
        _ => None,
    })
}

/// Follow-up questions for the core stats a submission left out.
pub fn missing_prompts(stats: &StatMap) -> Vec<&'static str> {
    [
        (Stat::TotalAttendance, "How many people attended today?"),
        (Stat::NewVisitors, "Were there any new visitors today?"),
        (Stat::KidsAttendance, "How many kids were in children's ministry?"),
        (Stat::YouthAttendance, "How many youth attended?"),
    ]
    .into_iter()
    .filter(|(stat, _)| !stats.contains_key(stat))
    .map(|(_, prompt)| prompt)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    fn extractor() -> StatExtractor {
        let settings = Settings::default();
        StatExtractor::new(&settings.triggers(), settings.extraction_window)
    }

    fn stats(pairs: &[(Stat, u32)]) -> StatMap {
        pairs.iter().copied().collect()
    }

    #[test]
    fn people_alone_is_total_attendance() {
        for n in [0, 7, 132, 450, 1200] {
            let text = format!("we had {n} people");
            assert_eq!(extractor().extract(&text), stats(&[(Stat::TotalAttendance, n)]));
        }
    }

    #[test]
    fn extracts_full_service_report() {
        let extracted = extractor()
            .extract("south had 450 people, 25 new visitors, 8 salvations, 120 youth, 80 kids");
        assert_eq!(
            extracted,
            stats(&[
                (Stat::TotalAttendance, 450),
                (Stat::NewVisitors, 25),
                (Stat::Decisions, 8),
                (Stat::YouthAttendance, 120),
                (Stat::KidsAttendance, 80),
            ])
        );
    }

    #[test]
    fn longer_trigger_beats_embedded_shorter_one() {
        let extracted = extractor().extract("450 people and 30 new people");
        assert_eq!(
            extracted,
            stats(&[(Stat::TotalAttendance, 450), (Stat::NewVisitors, 30)])
        );
    }

    #[test]
    fn accepts_abbreviations_and_typos() {
        let extracted = extractor().extract("300 people 12 np 4 nc 55 yout 9 connects");
        assert_eq!(
            extracted,
            stats(&[
                (Stat::TotalAttendance, 300),
                (Stat::NewVisitors, 12),
                (Stat::Decisions, 4),
                (Stat::YouthAttendance, 55),
                (Stat::ConnectGroups, 9),
            ])
        );
    }

    #[test]
    fn trailing_numbers_attach_to_preceding_trigger() {
        let extracted = extractor().extract("youth 120, kids 80");
        assert_eq!(
            extracted,
            stats(&[(Stat::YouthAttendance, 120), (Stat::KidsAttendance, 80)])
        );
    }

    #[test]
    fn each_number_is_used_once() {
        let extracted = extractor().extract("attendance was 132 people");
        assert_eq!(extracted, stats(&[(Stat::TotalAttendance, 132)]));

        let extracted = extractor().extract("youth and kids 40");
        assert_eq!(extracted.len(), 1);
    }

    #[test]
    fn consumed_numbers_never_exceed_triggers() {
        let samples = [
            "450 people, 25 new visitors",
            "120 youth 80 kids 5 decisions",
            "kids 30 youth",
            "2 nc 3 np 4",
            "we saw 10 10 10 people",
        ];
        let extractor = extractor();
        for sample in samples {
            let tokens = text::tokenize(sample);
            let extracted = extractor.extract_tokens(&tokens);
            let triggers = extractor.trigger_matches(&tokens).len();
            assert!(extracted.len() <= triggers, "{sample}");
        }
    }

    #[test]
    fn trigger_without_number_is_omitted() {
        assert!(extractor().extract("great youth night, lots of kids").is_empty());
        assert!(extractor().extract("").is_empty());
        assert!(extractor().extract("hello there").is_empty());
    }

    #[test]
    fn sentence_boundaries_stop_the_search() {
        assert!(extractor().extract("we counted 300. people loved it").is_empty());
    }

    #[test]
    fn numbers_outside_the_window_are_ignored() {
        assert!(extractor().extract("450 and then some more people").is_empty());
    }

    #[test]
    fn money_and_dates_are_not_counts() {
        let tokens = text::tokenize("2025-03-09 $300 offering and 40 kids");
        assert_eq!(
            extractor().extract_tokens(&tokens),
            stats(&[(Stat::KidsAttendance, 40)])
        );
        assert_eq!(explicit_date(&tokens), NaiveDate::from_ymd_opt(2025, 3, 9));
    }

    #[test]
    fn custom_triggers_replace_defaults() {
        let mut settings = Settings::default();
        settings
            .triggers
            .insert("youth_attendance".into(), vec!["yth".into()]);
        let extractor = StatExtractor::new(&settings.triggers(), 3);
        assert_eq!(
            extractor.extract("40 yth 20 youth"),
            stats(&[(Stat::YouthAttendance, 40)])
        );
    }

    #[test]
    fn prompts_for_missing_core_stats() {
        let prompts = missing_prompts(&stats(&[(Stat::TotalAttendance, 100)]));
        assert_eq!(prompts.len(), 3);
        assert!(!prompts.contains(&"How many people attended today?"));
    }
}
