//! Context passed alongside a unit to the reasoning service.

use crate::units::PodcastInfo;
use std::sync::Arc;

/// Maximum characters kept from each preceding unit.
const PRECEDING_CHARS: usize = 500;

/// Maximum entity names carried over from earlier episodes.
const KNOWN_ENTITY_LIMIT: usize = 25;

/// Podcast-level context shared by every unit of the podcast's episodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PodcastContext {
    pub name: String,
    pub hosts: Vec<String>,
    pub description: Option<String>,
    /// Entity names seen in earlier episodes, most frequent first.
    pub known_entities: Vec<String>,
}

impl PodcastContext {
    pub fn from_info(info: &PodcastInfo) -> Self {
        Self {
            name: info.name.clone(),
            hosts: info.hosts.clone(),
            description: info.description.clone(),
            known_entities: Vec::new(),
        }
    }

    /// Copy of this context with additional known entities merged in.
    pub fn with_entities<I, S>(&self, entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut merged = self.clone();
        for entity in entities {
            let entity = entity.into();
            if merged.known_entities.len() >= KNOWN_ENTITY_LIMIT {
                break;
            }
            if !merged
                .known_entities
                .iter()
                .any(|e| e.eq_ignore_ascii_case(&entity))
            {
                merged.known_entities.push(entity);
            }
        }
        merged
    }
}

/// Everything besides the unit itself that goes into an extraction prompt.
#[derive(Debug, Clone, Default)]
pub struct ExtractionContext {
    pub episode_title: String,
    pub podcast: Option<Arc<PodcastContext>>,
    /// Text of the units immediately before this one, oldest first.
    pub preceding: Vec<String>,
}

impl ExtractionContext {
    pub fn new(episode_title: impl Into<String>, podcast: Option<Arc<PodcastContext>>) -> Self {
        Self {
            episode_title: episode_title.into(),
            podcast,
            preceding: Vec::new(),
        }
    }

    /// Same episode context with different preceding units.
    pub fn with_preceding(&self, preceding: Vec<String>) -> Self {
        Self {
            episode_title: self.episode_title.clone(),
            podcast: self.podcast.clone(),
            preceding,
        }
    }

    pub fn podcast_name(&self) -> &str {
        self.podcast
            .as_ref()
            .map(|p| p.name.as_str())
            .filter(|n| !n.is_empty())
            .unwrap_or("Unknown podcast")
    }

    /// The `{{context}}` block of the extraction prompt. Empty when there is
    /// nothing to add.
    pub fn render(&self) -> String {
        let mut block = String::new();

        if let Some(podcast) = &self.podcast {
            if !podcast.hosts.is_empty() {
                block.push_str(&format!("Hosts: {}\n", podcast.hosts.join(", ")));
            }
            if let Some(description) = &podcast.description {
                block.push_str(&format!("About the podcast: {}\n", description));
            }
            if !podcast.known_entities.is_empty() {
                block.push_str(&format!(
                    "Entities from earlier episodes: {}\n",
                    podcast.known_entities.join(", ")
                ));
            }
        }

        for text in &self.preceding {
            block.push_str("Previous segment:\n");
            block.push_str(tail(text, PRECEDING_CHARS));
            block.push('\n');
        }

        if !block.is_empty() {
            block.push('\n');
        }
        block
    }
}

/// The last `max_chars` characters of `text`.
fn tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let skip = count - max_chars;
    match text.char_indices().nth(skip) {
        Some((offset, _)) => &text[offset..],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_context_renders_nothing() {
        assert_eq!(ExtractionContext::default().render(), "");
    }

    #[test]
    fn test_render_podcast_and_preceding() {
        let podcast = PodcastContext {
            name: "Systems Talk".into(),
            hosts: vec!["Ana".into(), "Bo".into()],
            description: None,
            known_entities: vec!["Tokio".into()],
        };
        let context = ExtractionContext::new("Episode 1", Some(Arc::new(podcast)))
            .with_preceding(vec!["We were talking about runtimes.".into()]);

        let rendered = context.render();
        assert!(rendered.contains("Hosts: Ana, Bo"));
        assert!(rendered.contains("Entities from earlier episodes: Tokio"));
        assert!(rendered.contains("Previous segment:\nWe were talking about runtimes."));
        assert!(rendered.ends_with("\n\n"));
        assert_eq!(context.podcast_name(), "Systems Talk");
    }

    #[test]
    fn test_tail_respects_char_boundaries() {
        let text = "æøå".repeat(300);
        let tail = tail(&text, 500);
        assert_eq!(tail.chars().count(), 500);
    }

    #[test]
    fn test_with_entities_deduplicates() {
        let podcast = PodcastContext::default().with_entities(["Rust", "rust", "Tokio"]);
        assert_eq!(podcast.known_entities, vec!["Rust", "Tokio"]);
    }
}
