use std::collections::{BTreeSet, HashSet};

use once_cell::sync::Lazy;

use crate::Result;

/// Text → set of normalized entity strings.
///
/// Output is order-independent and deduplicated; implementations may fail,
/// in which case graph construction treats the text as entity-free.
pub trait EntityExtractor: Send + Sync {
    fn extract(&self, text: &str) -> Result<BTreeSet<String>>;
}

impl<T: EntityExtractor + ?Sized> EntityExtractor for &T {
    fn extract(&self, text: &str) -> Result<BTreeSet<String>> {
        (**self).extract(text)
    }
}

/// Trim and collapse internal whitespace. Entity identity is exact string
/// match on this form.
pub fn normalize_entity(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "and", "or", "but", "the", "of", "in", "on", "for", "to", "with", "by", "at",
        "from", "as", "is", "are", "was", "were", "be", "been", "it", "its", "he", "she", "they",
        "we", "you", "i", "his", "her", "their", "our", "this", "that", "these", "those", "there",
        "here", "every", "each", "all", "any", "some", "no", "not", "if", "when", "while", "what",
        "which", "who", "whom", "how", "why", "where", "then", "thus", "so", "yet", "such", "one",
        "my", "me", "us", "them", "do", "does", "did", "has", "have", "had", "can", "may",
    ]
    .into_iter()
    .collect()
});

/// Words allowed inside a capitalised run ("Annihilation of Caste").
const CONNECTORS: &[&str] = &["of", "de", "von"];

/// Dependency-free extractor: capitalised runs, handles, hashtags and
/// alphanumeric codes.
#[derive(Debug, Clone)]
pub struct HeuristicExtractor {
    min_chars: usize,
}

impl Default for HeuristicExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct Token<'a> {
    word: &'a str,
    ends_clause: bool,
}

impl HeuristicExtractor {
    pub fn new() -> Self {
        Self { min_chars: 3 }
    }

    fn tokenize(text: &str) -> Vec<Token<'_>> {
        text.split_whitespace()
            .filter_map(|raw| {
                let word = raw.trim_matches(|c: char| !c.is_alphanumeric() && c != '@' && c != '#');
                if word.is_empty() {
                    return None;
                }
                let ends_clause = raw
                    .trim_end_matches(|c: char| c.is_alphanumeric())
                    .ends_with(|c: char| {
                        matches!(c, ',' | '.' | ';' | ':' | '!' | '?' | ')' | '"' | '”')
                    });
                Some(Token { word, ends_clause })
            })
            .collect()
    }

    fn is_capitalised(word: &str) -> bool {
        word.chars().next().is_some_and(|c| c.is_uppercase())
    }

    fn is_stopword(word: &str) -> bool {
        STOPWORDS.contains(word.to_lowercase().as_str())
    }

    fn is_tag(word: &str) -> bool {
        (word.starts_with('@') || word.starts_with('#')) && word.chars().count() > 1
    }

    fn is_code(word: &str) -> bool {
        word.chars().any(|c| c.is_numeric()) && word.chars().any(|c| c.is_alphabetic())
    }

    fn accept(&self, candidate: &str, out: &mut BTreeSet<String>) {
        let normalized = normalize_entity(candidate);
        if normalized.chars().count() >= self.min_chars {
            out.insert(normalized);
        }
    }

    /// Extend a capitalised run starting at `start`; returns the inclusive end.
    fn run_end(tokens: &[Token<'_>], start: usize) -> usize {
        let mut end = start;
        while !tokens[end].ends_clause && end + 1 < tokens.len() {
            let next = &tokens[end + 1];
            if Self::is_capitalised(next.word) && !Self::is_tag(next.word) {
                end += 1;
                continue;
            }
            let joins = CONNECTORS.contains(&next.word)
                && !next.ends_clause
                && tokens
                    .get(end + 2)
                    .is_some_and(|t| Self::is_capitalised(t.word) && !Self::is_tag(t.word));
            if joins {
                end += 2;
                continue;
            }
            break;
        }
        end
    }
}

impl EntityExtractor for HeuristicExtractor {
    fn extract(&self, text: &str) -> Result<BTreeSet<String>> {
        let tokens = Self::tokenize(text);
        let mut entities = BTreeSet::new();
        let mut i = 0;

        while i < tokens.len() {
            let word = tokens[i].word;

            if Self::is_tag(word) {
                self.accept(word, &mut entities);
                i += 1;
                continue;
            }

            if !Self::is_capitalised(word) {
                if Self::is_code(word) {
                    self.accept(word, &mut entities);
                }
                i += 1;
                continue;
            }

            let end = Self::run_end(&tokens, i);
            let words: Vec<&str> = tokens[i..=end].iter().map(|t| t.word).collect();

            // Sentence-initial "The", "Every", ... are not part of the name.
            let first = words.iter().position(|w| !Self::is_stopword(w));
            let last = words.iter().rposition(|w| !Self::is_stopword(w));
            if let (Some(first), Some(last)) = (first, last) {
                self.accept(&words[first..=last].join(" "), &mut entities);
            }

            i = end + 1;
        }

        Ok(entities)
    }
}
