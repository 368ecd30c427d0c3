//! Prompt templates for community summaries and cited answers.
//!
//! Built-in templates can be overridden by Markdown files in the `prompts/`
//! directory at the project root.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{Error, Result};

const COMMUNITY_SUMMARY_TEMPLATE: &str = "\
You are an expert researcher. Read the following text segments taken from one thematic cluster of the corpus.
Identify the central theme and write a concise summary (2-3 sentences) explaining what this group of text discusses.

TEXT:
{text}

SUMMARY:
";

const ANSWER_TEMPLATE: &str = "\
You are a research assistant. Answer questions based strictly on the provided context.

--- CONTEXT ---
{context}
---------------

USER QUESTION:
{query}

INSTRUCTIONS:
1. Answer the question directly using the information in the context.
2. If the context contains the answer, even partially, give the answer without disclaimers.
3. Only say \"I cannot find information about this\" if the context is unrelated or empty.
4. Cite your sources using the bracketed numbers like [1], [2] at the end of sentences.

ANSWER (Direct and cited):
";

/// Available prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    /// Theme summary of one community. Placeholder: `{text}`.
    CommunitySummary,
    /// Cited answer over fused evidence. Placeholders: `{context}`, `{query}`.
    Answer,
}

impl Prompt {
    /// Prompt file name (Markdown).
    pub fn filename(&self) -> &'static str {
        match self {
            Prompt::CommunitySummary => "community_summary.md",
            Prompt::Answer => "answer.md",
        }
    }

    pub fn builtin(&self) -> &'static str {
        match self {
            Prompt::CommunitySummary => COMMUNITY_SUMMARY_TEMPLATE,
            Prompt::Answer => ANSWER_TEMPLATE,
        }
    }

    /// Load the prompt from `prompts/`, falling back to the built-in text.
    pub fn load(&self) -> String {
        self.load_from(&prompts_dir())
    }

    pub fn load_from(&self, dir: &Path) -> String {
        match load_prompt_in(dir, self.filename()) {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => self.builtin().to_string(),
            Err(err) => {
                debug!("Using built-in {:?} prompt: {}", self, err);
                self.builtin().to_string()
            }
        }
    }
}

fn load_prompt_in(dir: &Path, filename: &str) -> Result<String> {
    let path = dir.join(filename);
    std::fs::read_to_string(&path).map_err(|e| {
        Error::InvalidArgument(format!("Failed to load prompt {}: {}", filename, e))
    })
}

/// Prompt directory path.
pub fn prompts_dir() -> PathBuf {
    // Look for prompts/ relative to the current directory or its parents
    let candidates = [
        PathBuf::from("prompts"),
        PathBuf::from("../prompts"),
        PathBuf::from("../../prompts"),
    ];

    for path in candidates {
        if path.exists() {
            return path;
        }
    }

    PathBuf::from("prompts")
}

/// Substitute `{name}` placeholders in one pass. Unknown placeholders and
/// braces inside substituted values are left as they are.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let matched = vars.iter().find(|(name, _)| {
            tail.len() > name.len() + 1
                && tail[1..].starts_with(name)
                && tail[1 + name.len()..].starts_with('}')
        });
        match matched {
            Some((name, value)) => {
                out.push_str(value);
                rest = &tail[name.len() + 2..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Loaded prompt templates, resolved once at start-up.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptSet {
    pub community_summary: String,
    pub answer: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PromptSet {
    pub fn builtin() -> Self {
        Self {
            community_summary: COMMUNITY_SUMMARY_TEMPLATE.to_string(),
            answer: ANSWER_TEMPLATE.to_string(),
        }
    }

    pub fn load() -> Self {
        Self::load_from(&prompts_dir())
    }

    pub fn load_from(dir: &Path) -> Self {
        Self {
            community_summary: Prompt::CommunitySummary.load_from(dir),
            answer: Prompt::Answer.load_from(dir),
        }
    }

    pub fn summary_prompt(&self, text: &str) -> String {
        render(&self.community_summary, &[("text", text)])
    }

    pub fn answer_prompt(&self, context: &str, query: &str) -> String {
        render(&self.answer, &[("context", context), ("query", query)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_prompt_filenames() {
        assert_eq!(Prompt::CommunitySummary.filename(), "community_summary.md");
        assert_eq!(Prompt::Answer.filename(), "answer.md");
    }

    #[test]
    fn test_builtin_templates_have_placeholders() {
        assert!(Prompt::CommunitySummary.builtin().contains("{text}"));
        assert!(Prompt::Answer.builtin().contains("{context}"));
        assert!(Prompt::Answer.builtin().contains("{query}"));
    }

    #[test]
    fn test_render_substitutes_known_placeholders() {
        let rendered = render("Q: {query} / C: {context} / {other}", &[
            ("context", "ctx"),
            ("query", "why?"),
        ]);
        assert_eq!(rendered, "Q: why? / C: ctx / {other}");
    }

    #[test]
    fn test_render_does_not_rescan_values() {
        let rendered = render("{context}|{query}", &[("context", "{query}"), ("query", "q")]);
        assert_eq!(rendered, "{query}|q");
    }

    #[test]
    fn test_render_handles_trailing_brace() {
        assert_eq!(render("open {", &[("text", "x")]), "open {");
        assert_eq!(render("{text", &[("text", "x")]), "{text");
    }

    #[test]
    fn test_answer_prompt_layout() {
        let prompt = PromptSet::builtin().answer_prompt("[1] evidence", "What is caste?");
        assert!(prompt.contains("--- CONTEXT ---\n[1] evidence\n---------------"));
        assert!(prompt.contains("USER QUESTION:\nWhat is caste?"));
        assert!(prompt.trim_end().ends_with("ANSWER (Direct and cited):"));
    }

    #[test]
    fn test_summary_prompt_layout() {
        let prompt = PromptSet::builtin().summary_prompt("one\ntwo");
        assert!(prompt.contains("TEXT:\none\ntwo\n\nSUMMARY:"));
    }

    #[test]
    fn test_override_from_directory() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("answer.md"), "Context={context} Query={query}").unwrap();

        let prompts = PromptSet::load_from(dir.path());

        assert_eq!(prompts.answer_prompt("c", "q"), "Context=c Query=q");
        assert_eq!(prompts.community_summary, COMMUNITY_SUMMARY_TEMPLATE);
    }

    #[test]
    fn test_blank_override_falls_back_to_builtin() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("community_summary.md"), "  \n").unwrap();

        assert_eq!(
            Prompt::CommunitySummary.load_from(dir.path()),
            COMMUNITY_SUMMARY_TEMPLATE
        );
    }

    #[test]
    fn test_missing_override_falls_back_to_builtin() {
        let dir = tempdir().unwrap();
        assert!(load_prompt_in(dir.path(), "answer.md").is_err());
        assert_eq!(Prompt::Answer.load_from(dir.path()), ANSWER_TEMPLATE);
    }
}
