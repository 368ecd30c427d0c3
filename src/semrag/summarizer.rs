//! One theme summary per community.

use std::collections::BTreeMap;

use tracing::{debug, info};

use super::answer::{generate_or_fallback, Generator};
use super::chunker::parse_chunk_key;
use super::community::CommunityPartition;
use super::graph::KnowledgeGraph;
use crate::prompts::PromptSet;

pub struct CommunitySummarizer<G> {
    generator: G,
    prompts: PromptSet,
    max_chunks: usize,
}

impl<G: Generator> CommunitySummarizer<G> {
    pub fn new(generator: G, prompts: PromptSet, max_chunks: usize) -> Self {
        Self {
            generator,
            prompts,
            max_chunks,
        }
    }

    /// Text handed to the generator for one community: its first
    /// `max_chunks` chunk texts in chunk-id order, newline separated.
    /// `None` when the community has no chunk nodes.
    pub fn community_text(&self, graph: &KnowledgeGraph, members: &[String]) -> Option<String> {
        let mut chunks: Vec<(usize, &str)> = members
            .iter()
            .filter_map(|id| {
                let node = graph.node(id)?;
                let chunk_id = parse_chunk_key(&node.id)?;
                let text = node.text.as_deref()?;
                node.is_chunk().then_some((chunk_id, text))
            })
            .collect();

        if chunks.is_empty() {
            return None;
        }

        chunks.sort_by_key(|(id, _)| *id);
        let texts: Vec<&str> = chunks
            .into_iter()
            .take(self.max_chunks)
            .map(|(_, text)| text)
            .collect();
        Some(texts.join("\n"))
    }

    /// Summaries keyed by community id. Communities made only of entities
    /// are skipped; a generator failure stores the fallback text.
    pub async fn summarize(
        &self,
        graph: &KnowledgeGraph,
        communities: &CommunityPartition,
    ) -> BTreeMap<usize, String> {
        let mut summaries = BTreeMap::new();

        for (&community, members) in communities {
            let Some(text) = self.community_text(graph, members) else {
                debug!(community, "Skipping community without chunks");
                continue;
            };

            let prompt = self.prompts.summary_prompt(&text);
            let summary = generate_or_fallback(&self.generator, &prompt).await;
            summaries.insert(community, summary.trim().to_string());
        }

        info!(
            summaries = summaries.len(),
            communities = communities.len(),
            "Community summaries generated"
        );
        summaries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semrag::answer::FALLBACK_RESPONSE;
    use crate::semrag::graph::Node;
    use crate::{Error, Result};
    use std::sync::Mutex;

    struct RecordingGenerator {
        fail: bool,
        prompts: Mutex<Vec<String>>,
    }

    impl RecordingGenerator {
        fn new(fail: bool) -> Self {
            Self {
                fail,
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    impl Generator for RecordingGenerator {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if self.fail {
                Err(Error::Generation("timeout".into()))
            } else {
                Ok("  A theme about caste.\n".to_string())
            }
        }
    }

    fn graph() -> KnowledgeGraph {
        let mut graph = KnowledgeGraph::new();
        for (id, text) in [
            ("CHUNK_10", "tenth"),
            ("CHUNK_2", "second"),
            ("CHUNK_0", "zeroth"),
            ("CHUNK_7", "seventh"),
        ] {
            graph.add_node(Node::chunk(id, text));
        }
        graph.add_node(Node::entity("Caste"));
        graph.add_node(Node::entity("Society"));
        graph
    }

    fn members(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn takes_first_chunks_in_chunk_id_order() {
        let summarizer = CommunitySummarizer::new(RecordingGenerator::new(false), PromptSet::builtin(), 3);
        let text = summarizer
            .community_text(
                &graph(),
                &members(&["Caste", "CHUNK_10", "CHUNK_2", "CHUNK_7", "CHUNK_0"]),
            )
            .unwrap();

        assert_eq!(text, "zeroth\nsecond\nseventh");
    }

    #[test]
    fn entity_only_community_has_no_text() {
        let summarizer = CommunitySummarizer::new(RecordingGenerator::new(false), PromptSet::builtin(), 3);
        assert!(summarizer
            .community_text(&graph(), &members(&["Caste", "Society"]))
            .is_none());
    }

    #[tokio::test]
    async fn summarizes_each_community_with_chunks() {
        let communities = CommunityPartition::from([
            (0, members(&["CHUNK_0", "Caste"])),
            (1, members(&["Society"])),
            (2, members(&["CHUNK_2", "CHUNK_7"])),
        ]);
        let generator = RecordingGenerator::new(false);
        let summarizer = CommunitySummarizer::new(&generator, PromptSet::builtin(), 3);

        let summaries = summarizer.summarize(&graph(), &communities).await;

        assert_eq!(summaries.keys().copied().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(summaries[&0], "A theme about caste.");

        let prompts = generator.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains("second\nseventh"));
    }

    #[tokio::test]
    async fn generator_failure_stores_fallback() {
        let communities = CommunityPartition::from([(0, members(&["CHUNK_0"]))]);
        let summarizer = CommunitySummarizer::new(RecordingGenerator::new(true), PromptSet::builtin(), 3);

        let summaries = summarizer.summarize(&graph(), &communities).await;

        assert_eq!(summaries[&0], FALLBACK_RESPONSE);
    }

    #[tokio::test]
    async fn empty_partition_yields_no_summaries() {
        let generator = RecordingGenerator::new(false);
        let summarizer = CommunitySummarizer::new(&generator, PromptSet::builtin(), 3);

        let summaries = summarizer
            .summarize(&KnowledgeGraph::new(), &CommunityPartition::new())
            .await;

        assert!(summaries.is_empty());
        assert!(generator.prompts.lock().unwrap().is_empty());
    }
}
