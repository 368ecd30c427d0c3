//! Text cleanup and sentence segmentation for corpus ingestion.

use once_cell::sync::Lazy;
use regex::Regex;

static SOURCE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"source: \d+").expect("valid source marker regex"));
static PAGE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n\d+\n").expect("valid page number regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Raw sentence with its position in the cleaned text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentence {
    pub index: usize,
    pub text: String,
}

impl Sentence {
    /// Whitespace-delimited token count.
    pub fn token_count(&self) -> usize {
        token_count(&self.text)
    }
}

pub fn token_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Strip extraction artifacts (citation markers, bare page numbers) and
/// collapse whitespace.
pub fn clean_text(text: &str) -> String {
    let text = SOURCE_MARKER.replace_all(text, "");
    let text = PAGE_NUMBER.replace_all(&text, " ");
    let text = WHITESPACE.replace_all(&text, " ");
    text.trim().to_string()
}

/// Split cleaned text into sentences, dropping fragments of
/// `min_chars` characters or fewer.
pub fn split_sentences(text: &str, min_chars: usize) -> Vec<Sentence> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }

        // Keep closing quotes and brackets with the sentence they end.
        while let Some(&next) = chars.peek() {
            if matches!(next, '"' | '\'' | ')' | ']' | '”' | '’') {
                current.push(next);
                chars.next();
            } else {
                break;
            }
        }

        let at_boundary = chars.peek().map_or(true, |next| next.is_whitespace());
        if at_boundary {
            push_sentence(&mut sentences, &mut current, min_chars);
        }
    }
    push_sentence(&mut sentences, &mut current, min_chars);

    sentences
}

fn push_sentence(sentences: &mut Vec<Sentence>, buffer: &mut String, min_chars: usize) {
    let trimmed = buffer.trim();
    if trimmed.chars().count() > min_chars {
        sentences.push(Sentence {
            index: sentences.len(),
            text: trimmed.to_string(),
        });
    }
    buffer.clear();
}
