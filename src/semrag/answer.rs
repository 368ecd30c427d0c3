//! Cited answer generation over fused evidence.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::fusion::{Citation, EvidenceContext};
use crate::metrics::{self, Collaborator};
use crate::prompts::PromptSet;
use crate::Result;

/// Substituted for the generator's output when it fails.
pub const FALLBACK_RESPONSE: &str = "Sorry, I encountered an error generating the response.";

/// Prompt → completion.
pub trait Generator: Send + Sync {
    fn generate(&self, prompt: &str) -> impl Future<Output = Result<String>> + Send;
}

impl<T: Generator + ?Sized> Generator for Arc<T> {
    fn generate(&self, prompt: &str) -> impl Future<Output = Result<String>> + Send {
        (**self).generate(prompt)
    }
}

impl<T: Generator + ?Sized> Generator for &T {
    fn generate(&self, prompt: &str) -> impl Future<Output = Result<String>> + Send {
        (**self).generate(prompt)
    }
}

/// Call `generator`, replacing a failure with [`FALLBACK_RESPONSE`].
pub async fn generate_or_fallback<G: Generator + ?Sized>(generator: &G, prompt: &str) -> String {
    match generator.generate(prompt).await {
        Ok(text) => text,
        Err(err) => {
            warn!("Generator failed, using fallback text: {}", err);
            metrics::record_degraded(Collaborator::Generator);
            FALLBACK_RESPONSE.to_string()
        }
    }
}

/// Generated answer with the citations it may refer to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<Citation>,
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n\n--- Sources ---\n", self.text)?;
        let lines: Vec<String> = self.sources.iter().map(|c| c.to_string()).collect();
        write!(f, "{}", lines.join("\n"))
    }
}

pub struct AnswerGenerator<G> {
    generator: G,
    prompts: PromptSet,
}

impl<G: Generator> AnswerGenerator<G> {
    pub fn new(generator: G, prompts: PromptSet) -> Self {
        Self { generator, prompts }
    }

    pub async fn generate(&self, query: &str, context: &EvidenceContext) -> Answer {
        let prompt = self.prompts.answer_prompt(&context.text, query);
        debug!("Answer prompt is {} chars", prompt.len());

        let text = generate_or_fallback(&self.generator, &prompt).await;
        Answer {
            text: text.trim().to_string(),
            sources: context.citations.clone(),
        }
    }
}
