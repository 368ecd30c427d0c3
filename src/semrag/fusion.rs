//! Assembly of the numbered evidence context handed to the generator.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::result::SearchResult;
use crate::config::RetrievalConfig;

pub const LOCAL_HEADER: &str = "--- SPECIFIC EVIDENCE ---";
pub const GLOBAL_HEADER: &str = "--- BROAD THEMES ---";

/// Maps an evidence number to where the evidence came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub number: usize,
    pub provenance: String,
}

impl fmt::Display for Citation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] Source: {}", self.number, self.provenance)
    }
}

/// Numbered evidence text plus its citation table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceContext {
    pub text: String,
    pub citations: Vec<Citation>,
}

impl EvidenceContext {
    pub fn is_empty(&self) -> bool {
        self.citations.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ResultFusion {
    local_limit: usize,
    global_limit: usize,
}

impl Default for ResultFusion {
    fn default() -> Self {
        Self::new(3, 2)
    }
}

impl ResultFusion {
    pub fn new(local_limit: usize, global_limit: usize) -> Self {
        Self {
            local_limit,
            global_limit,
        }
    }

    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self::new(config.context_local, config.context_global)
    }

    /// Number local results first, then global, starting from 1.
    pub fn fuse(&self, local: &[SearchResult], global: &[SearchResult]) -> EvidenceContext {
        let mut text = String::new();
        let mut citations = Vec::new();

        text.push_str(LOCAL_HEADER);
        text.push('\n');
        for result in local.iter().take(self.local_limit) {
            push_item(&mut text, &mut citations, result);
        }

        text.push('\n');
        text.push_str(GLOBAL_HEADER);
        text.push('\n');
        for result in global.iter().take(self.global_limit) {
            push_item(&mut text, &mut citations, result);
        }

        EvidenceContext { text, citations }
    }
}

fn push_item(text: &mut String, citations: &mut Vec<Citation>, result: &SearchResult) {
    let number = citations.len() + 1;
    let snippet = result.text.replace('\n', " ");
    text.push_str(&format!("[{}] {}\n", number, snippet));
    citations.push(Citation {
        number,
        provenance: result.provenance.clone(),
    });
}
