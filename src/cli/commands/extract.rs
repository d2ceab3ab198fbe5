//! Extract command implementation.

use crate::cache::TtlCache;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::{EpisodeExtraction, EpisodeStatus, Orchestrator, PodcastCache};
use crate::reasoning::OpenAiReasoner;
use crate::units::EpisodeInput;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;

/// Flags of the extract command.
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    pub inputs: Vec<String>,
    pub output: Option<String>,
    pub fresh: bool,
    pub concurrency: Option<usize>,
    pub unit_timeout: Option<u64>,
    pub threshold: Option<f64>,
}

impl ExtractOptions {
    /// Apply command-line overrides on top of the loaded settings.
    fn apply(&self, settings: &mut Settings) -> Result<()> {
        if let Some(concurrency) = self.concurrency {
            settings.extraction.max_concurrent_units = concurrency;
        }
        if let Some(timeout) = self.unit_timeout {
            settings.extraction.unit_timeout_seconds = timeout;
        }
        if let Some(threshold) = self.threshold {
            settings.extraction.failure_threshold = threshold;
        }
        settings.validate()?;
        Ok(())
    }
}

/// Run the extract command.
pub async fn run_extract(options: ExtractOptions, mut settings: Settings) -> Result<()> {
    options.apply(&mut settings)?;
    preflight::check(Operation::Extract, &settings, &options.inputs)?;

    let episodes = options
        .inputs
        .iter()
        .map(|path| {
            EpisodeInput::load(Path::new(path))
                .with_context(|| format!("Failed to load episode from {}", path))
        })
        .collect::<Result<Vec<_>>>()?;

    let reasoner = OpenAiReasoner::new(Duration::from_secs(
        settings.extraction.request_timeout_seconds,
    ))?
    .with_structured_output(settings.extraction.structured_output);

    let cache: PodcastCache = Arc::new(Mutex::new(TtlCache::new(
        Duration::from_secs(settings.cache.podcast_ttl_seconds),
        settings.cache.capacity,
    )));
    let orchestrator =
        Orchestrator::from_settings(&settings, Arc::new(reasoner))?.with_podcast_cache(cache);

    let mut extractions: Vec<EpisodeExtraction> = Vec::with_capacity(episodes.len());
    let mut failed = 0;

    for episode in &episodes {
        Output::info(&format!(
            "Extracting '{}' ({} units)",
            episode.display_title(),
            episode.units.len()
        ));

        match orchestrator.run(episode, !options.fresh).await {
            Ok(extraction) => {
                Output::episode_summary(&extraction);
                if extraction.status == EpisodeStatus::Failed {
                    failed += 1;
                }
                extractions.push(extraction);
            }
            Err(e) => {
                Output::error(&format!("Episode {} aborted: {}", episode.episode_id, e));
                failed += 1;
            }
        }
    }

    write_results(&extractions, options.output.as_deref())?;

    if failed > 0 {
        bail!("{} of {} episodes failed", failed, episodes.len());
    }
    Output::success(&format!("Extracted {} episodes", extractions.len()));
    Ok(())
}

/// Write results as pretty JSON. A single episode is written as an object,
/// several as an array.
fn write_results(extractions: &[EpisodeExtraction], output: Option<&str>) -> Result<()> {
    let json = match extractions {
        [single] => serde_json::to_string_pretty(single)?,
        many => serde_json::to_string_pretty(many)?,
    };

    match output {
        Some(path) => {
            let path = Settings::expand_path(path);
            write_file(&path, &json)?;
            info!("Wrote results to {}", path.display());
            Output::success(&format!("Results written to {}", path.display()));
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn write_file(path: &PathBuf, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_applied_and_validated() {
        let mut settings = Settings::default();
        let options = ExtractOptions {
            concurrency: Some(2),
            unit_timeout: Some(30),
            threshold: Some(0.1),
            ..Default::default()
        };
        options.apply(&mut settings).unwrap();
        assert_eq!(settings.extraction.max_concurrent_units, 2);
        assert_eq!(settings.extraction.unit_timeout_seconds, 30);
        assert_eq!(settings.extraction.failure_threshold, 0.1);

        let invalid = ExtractOptions {
            concurrency: Some(0),
            ..Default::default()
        };
        assert!(invalid.apply(&mut Settings::default()).is_err());

        let invalid = ExtractOptions {
            threshold: Some(1.5),
            ..Default::default()
        };
        assert!(invalid.apply(&mut Settings::default()).is_err());
    }

    #[test]
    fn test_write_results_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("results.json");
        write_results(&[], Some(path.to_str().unwrap())).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[]");
    }
}
