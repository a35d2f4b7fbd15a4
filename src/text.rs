//! Tokenizer and phrase matching shared by the extractor, the campus
//! resolver and the comparison detector.
//!
//! Text is lexed once into a flat token sequence. Matching always happens on
//! whole word tokens, so an alias such as "art" can never hit inside "heart".

use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Lowercased run of letters (digits and inner apostrophes allowed).
    Word(String),
    /// Plain non-negative integer, with optional thousands separators.
    Number(u32),
    Date(NaiveDate),
    Punct(char),
    /// Decimals, ordinals, money amounts and anything else numeric-ish that
    /// must never be read as a count.
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub index: usize,
    pub start: usize,
    pub end: usize,
    pub kind: TokenKind,
}

impl Token {
    pub fn word(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Word(word) => Some(word),
            _ => None,
        }
    }

    pub fn number(&self) -> Option<u32> {
        match self.kind {
            TokenKind::Number(value) => Some(value),
            _ => None,
        }
    }

    /// Sentence punctuation stops the nearest-number search.
    pub fn is_barrier(&self) -> bool {
        matches!(self.kind, TokenKind::Punct('.' | '!' | '?' | ';'))
    }
}

pub fn tokenize(text: &str) -> Vec<Token> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let offset = |at: usize| chars.get(at).map(|(pos, _)| *pos).unwrap_or(text.len());
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (start, c) = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let mut j = i + 1;
        let kind = if c.is_alphabetic() {
            while j < chars.len()
                && (chars[j].1.is_alphanumeric()
                    || (chars[j].1 == '\'' && next_is(&chars, j, char::is_alphabetic)))
            {
                j += 1;
            }
            TokenKind::Word(text[start..offset(j)].to_lowercase())
        } else if c.is_ascii_digit() {
            while j < chars.len()
                && (chars[j].1.is_ascii_digit()
                    || (matches!(chars[j].1, ',' | '.' | '/' | '-')
                        && next_is(&chars, j, |n| n.is_ascii_digit())))
            {
                j += 1;
            }
            let suffixed = j < chars.len() && chars[j].1.is_alphabetic();
            while j < chars.len() && chars[j].1.is_alphanumeric() {
                j += 1;
            }
            let money = i > 0 && chars[i - 1].1 == '$';
            if suffixed || money {
                TokenKind::Other
            } else {
                classify_numeric(&text[start..offset(j)])
            }
        } else {
            TokenKind::Punct(c)
        };

        tokens.push(Token {
            index: tokens.len(),
            start,
            end: offset(j),
            kind,
        });
        i = j;
    }

    tokens
}

fn next_is(chars: &[(usize, char)], at: usize, pred: impl Fn(char) -> bool) -> bool {
    chars.get(at + 1).map(|(_, c)| pred(*c)).unwrap_or(false)
}

fn classify_numeric(lexeme: &str) -> TokenKind {
    if lexeme.contains('-') || lexeme.contains('/') {
        return ["%Y-%m-%d", "%d/%m/%Y"]
            .iter()
            .find_map(|format| NaiveDate::parse_from_str(lexeme, format).ok())
            .map(TokenKind::Date)
            .unwrap_or(TokenKind::Other);
    }
    if lexeme.contains('.') {
        return TokenKind::Other;
    }
    if lexeme.contains(',') {
        let mut groups = lexeme.split(',');
        let head_ok = groups.next().map(|g| (1..=3).contains(&g.len())).unwrap_or(false);
        if !head_ok || !groups.all(|g| g.len() == 3) {
            return TokenKind::Other;
        }
    }
    lexeme
        .replace(',', "")
        .parse::<u32>()
        .map(TokenKind::Number)
        .unwrap_or(TokenKind::Other)
}

/// Lowercases and collapses whitespace.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Word sequence used to match a phrase against tokens.
pub fn phrase_words(phrase: &str) -> Vec<String> {
    tokenize(phrase)
        .into_iter()
        .filter_map(|token| match token.kind {
            TokenKind::Word(word) => Some(word),
            _ => None,
        })
        .collect()
}

/// Token ranges `[start, end)` where `phrase` occurs as consecutive words.
pub fn find_phrase(tokens: &[Token], phrase: &[String]) -> Vec<(usize, usize)> {
    if phrase.is_empty() || phrase.len() > tokens.len() {
        return Vec::new();
    }
    (0..=tokens.len() - phrase.len())
        .filter(|&start| {
            phrase
                .iter()
                .zip(&tokens[start..])
                .all(|(expected, token)| token.word() == Some(expected.as_str()))
        })
        .map(|start| (start, start + phrase.len()))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhraseMatch<T> {
    pub start: usize,
    pub end: usize,
    /// Character length of the matched phrase; longer phrases win overlaps.
    pub len: usize,
    pub value: T,
}

impl<T> PhraseMatch<T> {
    fn overlaps(&self, other: &PhraseMatch<T>) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Drops every match overlapped by a longer one and returns the survivors in
/// text order. Equal-length overlaps keep the earlier entry of `matches`.
pub fn suppress_overlaps<T>(mut matches: Vec<PhraseMatch<T>>) -> Vec<PhraseMatch<T>> {
    matches.sort_by(|a, b| b.len.cmp(&a.len).then(a.start.cmp(&b.start)));
    let mut kept: Vec<PhraseMatch<T>> = Vec::new();
    for candidate in matches {
        if kept.iter().all(|existing| !existing.overlaps(&candidate)) {
            kept.push(candidate);
        }
    }
    kept.sort_by_key(|m| m.start);
    kept
}

pub fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != *cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<TokenKind> {
        tokenize(text).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_words_numbers_and_punctuation() {
        assert_eq!(
            kinds("South had 1,200 people."),
            vec![
                TokenKind::Word("south".into()),
                TokenKind::Word("had".into()),
                TokenKind::Number(1200),
                TokenKind::Word("people".into()),
                TokenKind::Punct('.'),
            ]
        );
    }

    #[test]
    fn decimals_ordinals_and_money_are_not_counts() {
        assert_eq!(
            kinds("4.5 3rd $300"),
            vec![
                TokenKind::Other,
                TokenKind::Other,
                TokenKind::Punct('$'),
                TokenKind::Other,
            ]
        );
    }

    #[test]
    fn lexes_iso_and_day_first_dates() {
        let expected = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        assert_eq!(kinds("2025-03-09"), vec![TokenKind::Date(expected)]);
        assert_eq!(kinds("9/3/2025"), vec![TokenKind::Date(expected)]);
    }

    #[test]
    fn trailing_comma_is_punctuation() {
        assert_eq!(
            kinds("450, 25"),
            vec![
                TokenKind::Number(450),
                TokenKind::Punct(','),
                TokenKind::Number(25)
            ]
        );
    }

    #[test]
    fn keeps_contractions_in_one_word() {
        assert_eq!(kinds("what's"), vec![TokenKind::Word("what's".into())]);
    }

    #[test]
    fn phrase_matching_respects_word_boundaries() {
        let tokens = tokenize("a heart for art");
        assert_eq!(find_phrase(&tokens, &phrase_words("art")), vec![(3, 4)]);
        let tokens = tokenize("Mount  Barker campus");
        assert_eq!(find_phrase(&tokens, &phrase_words("mount barker")), vec![(0, 2)]);
    }

    #[test]
    fn longer_matches_suppress_overlapping_shorter_ones() {
        let matches = vec![
            PhraseMatch {
                start: 1,
                end: 2,
                len: 6,
                value: "people",
            },
            PhraseMatch {
                start: 0,
                end: 2,
                len: 10,
                value: "new people",
            },
            PhraseMatch {
                start: 3,
                end: 4,
                len: 5,
                value: "youth",
            },
        ];
        let kept: Vec<_> = suppress_overlaps(matches).into_iter().map(|m| m.value).collect();
        assert_eq!(kept, vec!["new people", "youth"]);
    }

    #[test]
    fn levenshtein_counts_edits() {
        assert_eq!(levenshtein("paradise", "paradise"), 0);
        assert_eq!(levenshtein("salisbry", "salisbury"), 1);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
    }

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(normalize("  Mount \t BARKER  "), "mount barker");
    }
}
