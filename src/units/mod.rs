//! Meaningful units and episode input.
//!
//! Units are produced by segmentation upstream and consumed read-only here.

use crate::error::{InnsiktError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// A contiguous span of conversation treated as the atomic unit of extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeaningfulUnit {
    /// Position of this unit within the episode.
    pub index: usize,
    /// Text content of the unit.
    pub text: String,
    /// Primary speaker label, if identified.
    #[serde(default)]
    pub speaker: Option<String>,
    /// Start time in seconds.
    pub start_seconds: f64,
    /// End time in seconds.
    pub end_seconds: f64,
}

impl MeaningfulUnit {
    /// Create a new meaningful unit.
    pub fn new(
        index: usize,
        text: impl Into<String>,
        speaker: Option<String>,
        start_seconds: f64,
        end_seconds: f64,
    ) -> Self {
        Self {
            index,
            text: text.into(),
            speaker,
            start_seconds,
            end_seconds,
        }
    }

    /// Speaker label, or "Unknown" when none was identified.
    pub fn speaker_label(&self) -> &str {
        self.speaker
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or("Unknown")
    }
}

/// Podcast-level metadata shared by all episodes of a show.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PodcastInfo {
    /// Stable podcast identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Host names.
    #[serde(default)]
    pub hosts: Vec<String>,
    /// Short description of the show.
    #[serde(default)]
    pub description: Option<String>,
}

/// One episode's worth of units, as handed over by segmentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeInput {
    /// Episode identifier; also the checkpoint key.
    pub episode_id: String,
    /// Episode title.
    #[serde(default)]
    pub title: Option<String>,
    /// Podcast the episode belongs to.
    #[serde(default)]
    pub podcast: Option<PodcastInfo>,
    /// Ordered meaningful units.
    pub units: Vec<MeaningfulUnit>,
}

impl EpisodeInput {
    /// Create an episode input from units.
    pub fn new(episode_id: impl Into<String>, units: Vec<MeaningfulUnit>) -> Self {
        Self {
            episode_id: episode_id.into(),
            title: None,
            podcast: None,
            units,
        }
    }

    /// Load an episode from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let episode: EpisodeInput = serde_json::from_str(&content)?;
        episode.validate()?;
        Ok(episode)
    }

    /// Check that the episode can be orchestrated.
    ///
    /// Unit indices must be unique: the orchestrator keys outcomes and
    /// checkpoints by index.
    pub fn validate(&self) -> Result<()> {
        if self.episode_id.trim().is_empty() {
            return Err(InnsiktError::InvalidInput("episode_id is empty".to_string()));
        }

        let mut seen = HashSet::with_capacity(self.units.len());
        for unit in &self.units {
            if !seen.insert(unit.index) {
                return Err(InnsiktError::InvalidInput(format!(
                    "Duplicate unit index {} in episode {}",
                    unit.index, self.episode_id
                )));
            }
        }
        Ok(())
    }

    /// Display title for the episode.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.episode_id)
    }
}

/// Format seconds as MM:SS or HH:MM:SS.
pub fn format_timestamp(seconds: f64) -> String {
    let total_seconds = seconds.max(0.0) as u32;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "00:00");
        assert_eq!(format_timestamp(65.0), "01:05");
        assert_eq!(format_timestamp(3665.0), "01:01:05");
    }

    #[test]
    fn test_parse_episode_json() {
        let json = r#"{
            "episode_id": "ep-42",
            "title": "On Rust",
            "podcast": {"id": "pod-1", "name": "Systems Talk", "hosts": ["Ana"]},
            "units": [
                {"index": 0, "text": "Welcome back.", "speaker": "Ana", "start_seconds": 0.0, "end_seconds": 12.5},
                {"index": 1, "text": "Thanks for having me.", "start_seconds": 12.5, "end_seconds": 20.0}
            ]
        }"#;

        let episode: EpisodeInput = serde_json::from_str(json).unwrap();
        assert!(episode.validate().is_ok());
        assert_eq!(episode.units.len(), 2);
        assert_eq!(episode.units[0].speaker_label(), "Ana");
        assert_eq!(episode.units[1].speaker_label(), "Unknown");
        assert_eq!(episode.podcast.unwrap().hosts, vec!["Ana".to_string()]);
    }

    #[test]
    fn test_duplicate_indices_rejected() {
        let episode = EpisodeInput::new(
            "ep",
            vec![
                MeaningfulUnit::new(3, "a", None, 0.0, 1.0),
                MeaningfulUnit::new(3, "b", None, 1.0, 2.0),
            ],
        );
        assert!(matches!(episode.validate(), Err(InnsiktError::InvalidInput(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("episode.json");
        let episode = EpisodeInput::new("ep-1", vec![MeaningfulUnit::new(0, "hi", None, 0.0, 1.0)]);
        std::fs::write(&path, serde_json::to_string(&episode).unwrap()).unwrap();

        let loaded = EpisodeInput::load(&path).unwrap();
        assert_eq!(loaded.episode_id, "ep-1");
        assert_eq!(loaded.display_title(), "ep-1");
    }
}
