//! Prompt templates for Innsikt.
//!
//! Prompts can be customized by placing TOML files in the custom prompts directory.

use super::{PromptSettings, Settings};
use crate::error::{InnsiktError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Collection of all prompt templates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Prompts {
    /// Prompts for the combined extraction call.
    pub extraction: ExtractionPrompts,
    /// Prompts for the degraded fallback call.
    pub fallback: FallbackPrompts,
    /// Custom variables from config, available in all prompts.
    #[serde(skip)]
    pub variables: HashMap<String, String>,
}

/// Prompts for combined knowledge extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionPrompts {
    pub system: String,
    pub user: String,
}

impl Default for ExtractionPrompts {
    fn default() -> Self {
        Self {
            system: r#"You are a knowledge extraction system for podcast transcripts. You read one segment of conversation at a time and extract structured knowledge from it.

Return a single JSON object with exactly these keys:
- "entities": array of {"text": string, "type": string} (people, organizations, products, concepts, places)
- "quotes": array of {"text": string, "speaker": string} (notable verbatim statements)
- "insights": array of strings (key takeaways, one sentence each)
- "relationships": array of {"source": string, "relation": string, "target": string} between extracted entities
- "sentiment": object {"score": number between -1 and 1, "label": string}

Use empty arrays when a facet has nothing to report. Do not invent content that is not in the segment."#
                .to_string(),

            user: r#"Podcast: {{podcast}}
Episode: {{episode_title}}
Speaker: {{speaker}}
Time: {{start}} - {{end}}

{{context}}Segment:
{{text}}"#
                .to_string(),
        }
    }
}

/// Prompts for the lighter fallback extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackPrompts {
    pub system: String,
    pub user: String,
}

impl Default for FallbackPrompts {
    fn default() -> Self {
        Self {
            system: r#"You extract the main entities and insights from a short podcast segment.

Return a JSON object: {"entities": [{"text": "...", "type": "..."}], "insights": ["..."]}"#
                .to_string(),

            user: r#"Speaker: {{speaker}}

{{text}}"#
                .to_string(),
        }
    }
}

impl Prompts {
    /// Build prompts from settings: defaults, overridden per file by
    /// `extraction.toml` / `fallback.toml` in the custom directory.
    pub fn load(settings: &PromptSettings) -> Result<Self> {
        let mut prompts = Prompts {
            variables: settings.variables.clone(),
            ..Prompts::default()
        };

        if let Some(dir) = settings.custom_dir.as_deref() {
            let dir = Settings::expand_path(dir);
            if let Some(extraction) = read_override(&dir, "extraction.toml")? {
                prompts.extraction = extraction;
            }
            if let Some(fallback) = read_override(&dir, "fallback.toml")? {
                prompts.fallback = fallback;
            }
        }

        Ok(prompts)
    }

    /// Substitute `{{name}}` placeholders in one pass. Unknown placeholders
    /// are kept, and substituted values are never expanded again.
    pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(open) = rest.find("{{") {
            out.push_str(&rest[..open]);
            let after = &rest[open + 2..];
            match after.find("}}") {
                Some(close) => {
                    let name = &after[..close];
                    match vars.get(name.trim()) {
                        Some(value) => out.push_str(value),
                        None => {
                            out.push_str("{{");
                            out.push_str(name);
                            out.push_str("}}");
                        }
                    }
                    rest = &after[close + 2..];
                }
                None => {
                    out.push_str(&rest[open..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }

    /// Render with the configured variables underneath `vars`.
    pub fn render_with_custom(&self, template: &str, vars: &HashMap<String, String>) -> String {
        let mut merged = self.variables.clone();
        merged.extend(vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self::render(template, &merged)
    }
}

fn read_override<T: DeserializeOwned>(dir: &Path, file: &str) -> Result<Option<T>> {
    let path = dir.join(file);
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path)?;
    let parsed = toml::from_str(&content).map_err(|e| {
        InnsiktError::Config(format!("Invalid prompt file {}: {}", path.display(), e))
    })?;
    debug!("Loaded prompt override {}", path.display());
    Ok(Some(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prompts() {
        let prompts = Prompts::default();
        assert!(prompts.extraction.system.contains("\"relationships\""));
        assert!(prompts.extraction.user.contains("{{text}}"));
        assert!(!prompts.fallback.system.is_empty());
    }

    #[test]
    fn test_render_single_pass() {
        let mut vars = HashMap::new();
        vars.insert("speaker".to_string(), "Ana".to_string());
        vars.insert("text".to_string(), "I said {{speaker}} twice".to_string());

        let rendered = Prompts::render("{{ speaker }}: {{text}} {{missing}} {{open", &vars);
        assert_eq!(rendered, "Ana: I said {{speaker}} twice {{missing}} {{open");
    }

    #[test]
    fn test_provided_vars_override_custom() {
        let mut prompts = Prompts::default();
        prompts.variables.insert("podcast".to_string(), "From config".to_string());
        prompts.variables.insert("host".to_string(), "Sam".to_string());

        let mut vars = HashMap::new();
        vars.insert("podcast".to_string(), "From episode".to_string());

        let rendered = prompts.render_with_custom("{{podcast}} with {{host}}", &vars);
        assert_eq!(rendered, "From episode with Sam");
    }

    #[test]
    fn test_load_custom_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("fallback.toml"),
            "system = \"custom system\"\nuser = \"{{text}}\"\n",
        )
        .unwrap();

        let settings = PromptSettings {
            custom_dir: dir.path().to_str().map(String::from),
            variables: HashMap::from([("show".to_string(), "Systems Talk".to_string())]),
        };
        let prompts = Prompts::load(&settings).unwrap();
        assert_eq!(prompts.fallback.system, "custom system");
        assert_eq!(prompts.extraction.system, ExtractionPrompts::default().system);
        assert_eq!(prompts.variables["show"], "Systems Talk");
    }

    #[test]
    fn test_invalid_override_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("extraction.toml"), "system = [").unwrap();
        let settings = PromptSettings {
            custom_dir: dir.path().to_str().map(String::from),
            ..Default::default()
        };
        assert!(matches!(Prompts::load(&settings), Err(InnsiktError::Config(_))));
    }
}
