use crate::config::CampusDirectory;
use crate::models::CampusId;
use crate::text::{self, PhraseMatch, Token};

const CHURCH_WIDE_PHRASES: &[&str] = &[
    "all campuses",
    "all campus",
    "every campus",
    "across all",
    "all sites",
    "every site",
    "all locations",
    "church wide",
    "churchwide",
    "whole church",
    "entire church",
    "church total",
    "total church",
];

/// Aliases shorter than this never take part in fuzzy matching.
const FUZZY_MIN_LEN: usize = 7;

#[derive(Debug, Clone)]
struct AliasEntry {
    campus: CampusId,
    words: Vec<String>,
    phrase: String,
    len: usize,
}

/// Maps free-text location mentions to canonical campus ids.
#[derive(Debug, Clone)]
pub struct CampusResolver {
    aliases: Vec<AliasEntry>,
    church_wide: Vec<Vec<String>>,
}

impl CampusResolver {
    pub fn new(directory: &CampusDirectory) -> Self {
        let aliases = directory
            .campuses()
            .iter()
            .flat_map(|campus| {
                campus.aliases.iter().filter_map(move |alias| {
                    let words = text::phrase_words(alias);
                    let phrase = words.join(" ");
                    (!words.is_empty()).then(|| AliasEntry {
                        campus: campus.id.clone(),
                        len: phrase.chars().count(),
                        words,
                        phrase,
                    })
                })
            })
            .collect();
        let church_wide = CHURCH_WIDE_PHRASES
            .iter()
            .map(|phrase| text::phrase_words(phrase))
            .collect();
        Self {
            aliases,
            church_wide,
        }
    }

    pub fn resolve(&self, text: &str) -> Option<CampusId> {
        self.resolve_tokens(&text::tokenize(text))
    }

    /// Longest exact alias wins; otherwise a bounded edit-distance fallback.
    /// Ties between different campuses resolve to nothing.
    pub fn resolve_tokens(&self, tokens: &[Token]) -> Option<CampusId> {
        let matches = self.exact_matches(tokens);
        if matches.is_empty() {
            return self.fuzzy_match(tokens);
        }

        let longest = matches.iter().map(|m| m.len).max().unwrap_or(0);
        let mut winners: Vec<&CampusId> = matches
            .iter()
            .filter(|m| m.len == longest)
            .map(|m| &m.value)
            .collect();
        winners.dedup();
        match winners.as_slice() {
            [only] => Some((*only).clone()),
            _ => {
                tracing::debug!(?winners, "ambiguous campus mention");
                None
            }
        }
    }

    /// Every exactly mentioned campus, deduplicated, in first-mention order.
    pub fn resolve_all(&self, tokens: &[Token]) -> Vec<CampusId> {
        let mut campuses: Vec<CampusId> = Vec::new();
        for m in self.exact_matches(tokens) {
            if !campuses.contains(&m.value) {
                campuses.push(m.value);
            }
        }
        campuses
    }

    /// Phrases such as "all campuses" or "church-wide".
    pub fn is_church_wide(&self, text: &str) -> bool {
        let tokens = text::tokenize(&text.replace('-', " "));
        self.church_wide
            .iter()
            .any(|phrase| !text::find_phrase(&tokens, phrase).is_empty())
    }

    fn exact_matches(&self, tokens: &[Token]) -> Vec<PhraseMatch<CampusId>> {
        let mut matches = Vec::new();
        for alias in &self.aliases {
            for (start, end) in text::find_phrase(tokens, &alias.words) {
                matches.push(PhraseMatch {
                    start,
                    end,
                    len: alias.len,
                    value: alias.campus.clone(),
                });
            }
        }
        text::suppress_overlaps(matches)
    }

    fn fuzzy_match(&self, tokens: &[Token]) -> Option<CampusId> {
        let words: Vec<Vec<&str>> = word_runs(tokens);
        let mut best: Option<(usize, Vec<&CampusId>)> = None;

        for alias in self.aliases.iter().filter(|alias| alias.len >= FUZZY_MIN_LEN) {
            let limit = if alias.len >= 9 { 2 } else { 1 };
            let width = alias.words.len();
            for run in &words {
                for window in run.windows(width) {
                    let candidate = window.join(" ");
                    if candidate.chars().next() != alias.phrase.chars().next() {
                        continue;
                    }
                    let distance = text::levenshtein(&candidate, &alias.phrase);
                    if distance > limit {
                        continue;
                    }
                    let closer = match &best {
                        Some((current, _)) => distance < *current,
                        None => true,
                    };
                    if closer {
                        best = Some((distance, vec![&alias.campus]));
                    } else if let Some((current, campuses)) = &mut best {
                        if distance == *current && !campuses.contains(&&alias.campus) {
                            campuses.push(&alias.campus);
                        }
                    }
                }
            }
        }

        match best {
            Some((distance, campuses)) if campuses.len() == 1 => {
                tracing::debug!(campus = %campuses[0], distance, "fuzzy campus match");
                Some(campuses[0].clone())
            }
            Some((_, campuses)) => {
                tracing::debug!(?campuses, "ambiguous fuzzy campus match");
                None
            }
            None => None,
        }
    }
}

/// Maximal runs of consecutive word tokens.
fn word_runs(tokens: &[Token]) -> Vec<Vec<&str>> {
    let mut runs = Vec::new();
    let mut current = Vec::new();
    for token in tokens {
        match token.word() {
            Some(word) => current.push(word),
            None if !current.is_empty() => runs.push(std::mem::take(&mut current)),
            None => {}
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}
