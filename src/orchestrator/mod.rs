//! Per-episode extraction orchestrator.
//!
//! Runs every unit of an episode through the [`UnitProcessor`] on a bounded
//! pool of tasks, collects outcomes as they finish, keeps the checkpoint
//! current and decides the episode's status from the failure ratio.

mod report;
mod timeout;

pub use report::{EpisodeStatus, ExtractionReport};
pub use timeout::TimeoutController;

use crate::cache::TtlCache;
use crate::checkpoint::{self, CheckpointManager, CheckpointStatus, MemoryCheckpointStore};
use crate::config::{ExtractionSettings, Prompts, Settings};
use crate::error::{InnsiktError, Result};
use crate::extraction::{
    ExtractionClient, ExtractionContext, ExtractionError, ExtractionResult, FallbackExtractor,
    PodcastContext, UnitOutcome, UnitProcessor,
};
use crate::reasoning::ReasoningService;
use crate::sentiment::SentimentNormalizer;
use crate::units::{EpisodeInput, MeaningfulUnit};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Entity names remembered per podcast for later episodes.
const KNOWN_ENTITIES_PER_EPISODE: usize = 10;

/// Podcast contexts shared across the episodes of a run.
pub type PodcastCache = Arc<Mutex<TtlCache<String, PodcastContext>>>;

/// Where an episode is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodeState {
    Idle,
    Dispatching,
    Collecting,
    Finalizing,
    Done(EpisodeStatus),
}

impl EpisodeState {
    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: EpisodeState) -> bool {
        matches!(
            (self, next),
            (EpisodeState::Idle, EpisodeState::Dispatching)
                | (EpisodeState::Dispatching, EpisodeState::Collecting)
                | (EpisodeState::Collecting, EpisodeState::Finalizing)
                | (EpisodeState::Finalizing, EpisodeState::Done(_))
        )
    }
}

/// Settings read once at the start of a run.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_concurrent_units: usize,
    pub unit_timeout: Duration,
    pub batch_timeout: Option<Duration>,
    pub failure_threshold: f64,
    pub context_units: usize,
    pub show_progress: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from(&ExtractionSettings::default())
    }
}

impl From<&ExtractionSettings> for OrchestratorConfig {
    fn from(settings: &ExtractionSettings) -> Self {
        Self {
            max_concurrent_units: settings.max_concurrent_units,
            unit_timeout: Duration::from_secs(settings.unit_timeout_seconds),
            batch_timeout: settings.batch_timeout_seconds.map(Duration::from_secs),
            failure_threshold: settings.failure_threshold,
            context_units: settings.context_units,
            show_progress: settings.show_progress,
        }
    }
}

/// Live progress of the episode being processed.
#[derive(Debug, Default)]
pub struct Progress {
    completed: AtomicUsize,
    total: AtomicUsize,
}

impl Progress {
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    fn reset(&self, completed: usize, total: usize) {
        self.completed.store(completed, Ordering::SeqCst);
        self.total.store(total, Ordering::SeqCst);
    }

    fn advance(&self) -> usize {
        self.completed.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Result of one unit as handed to downstream storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitResult {
    pub unit_index: usize,
    pub fallback_used: bool,
    #[serde(flatten)]
    pub result: ExtractionResult,
}

/// Everything produced for one episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeExtraction {
    pub episode_id: String,
    pub title: Option<String>,
    pub status: EpisodeStatus,
    /// Successful units, ordered by unit index.
    pub results: Vec<UnitResult>,
    pub report: ExtractionReport,
}

/// The per-episode extraction orchestrator.
pub struct Orchestrator {
    processor: Arc<UnitProcessor>,
    checkpoints: Arc<CheckpointManager>,
    config: OrchestratorConfig,
    timeouts: TimeoutController,
    podcast_cache: Option<PodcastCache>,
    progress: Arc<Progress>,
}

impl Orchestrator {
    /// Create an orchestrator from its parts.
    pub fn new(
        processor: UnitProcessor,
        checkpoints: Arc<CheckpointManager>,
        config: OrchestratorConfig,
    ) -> Result<Self> {
        if config.max_concurrent_units == 0 {
            return Err(InnsiktError::WorkerPool(
                "max_concurrent_units must be at least 1".to_string(),
            ));
        }
        if config.unit_timeout.is_zero() {
            return Err(InnsiktError::WorkerPool(
                "unit timeout must be greater than zero".to_string(),
            ));
        }

        let timeouts = TimeoutController::new(config.unit_timeout).with_batch_cap(config.batch_timeout);

        Ok(Self {
            processor: Arc::new(processor),
            checkpoints,
            config,
            timeouts,
            podcast_cache: None,
            progress: Arc::new(Progress::default()),
        })
    }

    /// Build the full pipeline from settings around a reasoning service.
    pub fn from_settings(settings: &Settings, service: Arc<dyn ReasoningService>) -> Result<Self> {
        let prompts = Prompts::load(&settings.prompts)?;
        let extraction = &settings.extraction;

        let client = ExtractionClient::new(service.clone(), extraction.model.clone())
            .with_prompts(prompts.clone())
            .with_temperature(extraction.temperature)
            .with_structured_output(extraction.structured_output);
        info!(
            "Extraction model {} ({:?} responses)",
            extraction.model,
            client.mode()
        );

        let mut processor =
            UnitProcessor::new(client, SentimentNormalizer::new(settings.sentiment.scale));
        if extraction.fallback_enabled {
            processor = processor.with_fallback(
                FallbackExtractor::new(service, extraction.fallback_model())
                    .with_structured_output(extraction.structured_output)
                    .with_prompts(prompts),
            );
        }

        let store = if settings.checkpoint.enabled {
            checkpoint::open_store(settings)?
        } else {
            Arc::new(MemoryCheckpointStore::new())
        };
        let checkpoints = CheckpointManager::new(store)
            .with_save_interval(settings.checkpoint.save_interval)
            .with_delete_on_success(settings.checkpoint.delete_on_success);

        Self::new(
            processor,
            Arc::new(checkpoints),
            OrchestratorConfig::from(extraction),
        )
    }

    /// Share podcast context between episodes through `cache`.
    pub fn with_podcast_cache(mut self, cache: PodcastCache) -> Self {
        self.podcast_cache = Some(cache);
        self
    }

    /// Progress of the episode currently running.
    pub fn progress(&self) -> Arc<Progress> {
        self.progress.clone()
    }

    /// Extract knowledge from every unit of an episode.
    ///
    /// With `resume`, units completed in a stored checkpoint are restored
    /// instead of processed. Only checkpoint failures abort the run; unit
    /// failures end up in the report.
    #[instrument(skip_all, fields(episode = %episode.episode_id))]
    pub async fn run(&self, episode: &EpisodeInput, resume: bool) -> Result<EpisodeExtraction> {
        episode.validate()?;

        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let episode_id = episode.episode_id.as_str();
        let total = episode.units.len();
        let mut state = EpisodeState::Idle;

        info!(
            "Extracting {} units from '{}' (run {})",
            total,
            episode.display_title(),
            run_id
        );

        let checkpoint = self.checkpoints.begin(episode_id, total, resume).await?;
        let present: BTreeSet<usize> = episode.units.iter().map(|u| u.index).collect();

        let mut outcomes: BTreeMap<usize, UnitOutcome> = BTreeMap::new();
        for outcome in checkpoint.restored_outcomes() {
            if present.contains(&outcome.unit_index) {
                outcomes.insert(outcome.unit_index, outcome);
            }
        }
        // Failures settled by an earlier completed run are final.
        for outcome in checkpoint.restored_failures() {
            if present.contains(&outcome.unit_index) {
                outcomes.entry(outcome.unit_index).or_insert(outcome);
            }
        }
        if !outcomes.is_empty() {
            info!("Restored {} of {} units from checkpoint", outcomes.len(), total);
        }

        let pending: Vec<(usize, &MeaningfulUnit)> = episode
            .units
            .iter()
            .enumerate()
            .filter(|(_, u)| !outcomes.contains_key(&u.index))
            .collect();

        self.progress.reset(outcomes.len(), total);
        let pb = self.progress_bar(total as u64, outcomes.len() as u64);

        let base_context = ExtractionContext::new(
            episode.display_title(),
            self.podcast_context(episode).map(Arc::new),
        );

        self.transition(&mut state, EpisodeState::Dispatching);
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_units));
        let mut tasks = JoinSet::new();
        let mut outstanding: BTreeSet<usize> = BTreeSet::new();

        for (position, unit) in &pending {
            let context = base_context.with_preceding(self.preceding_texts(episode, *position));
            let unit = (*unit).clone();
            let processor = self.processor.clone();
            let semaphore = semaphore.clone();
            let timeouts = self.timeouts;
            outstanding.insert(unit.index);

            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        return UnitOutcome::failure(
                            unit.index,
                            ExtractionError::Internal(format!("Worker pool closed: {}", e)),
                            Duration::ZERO,
                        )
                    }
                };
                timeouts
                    .run_unit(unit.index, processor.process(&unit, &context))
                    .await
            });
        }
        debug!("Dispatched {} units", pending.len());

        self.transition(&mut state, EpisodeState::Collecting);
        let collected = self
            .collect(episode_id, started, &mut tasks, &mut outstanding, &mut outcomes, &pb)
            .await;

        if let Err(e) = collected {
            tasks.abort_all();
            pb.finish_and_clear();
            if let Err(finalize_err) = self
                .checkpoints
                .finalize(episode_id, CheckpointStatus::Abandoned)
                .await
            {
                warn!("Could not mark checkpoint abandoned: {}", finalize_err);
            }
            return Err(e);
        }
        pb.finish_and_clear();

        self.transition(&mut state, EpisodeState::Finalizing);
        self.checkpoints.flush(episode_id).await?;

        let wall_time = started.elapsed();
        let report = ExtractionReport::build(
            run_id,
            &outcomes,
            total,
            wall_time,
            self.config.failure_threshold,
        );

        let checkpoint_status = if report.status.is_usable() {
            CheckpointStatus::Completed
        } else {
            CheckpointStatus::Failed
        };
        self.checkpoints.finalize(episode_id, checkpoint_status).await?;
        self.transition(&mut state, EpisodeState::Done(report.status));

        info!(
            "Episode {} {}: {}/{} succeeded, {} failed ({} timed out), {} fallback, {:.1}x parallel in {:?}",
            episode_id,
            report.status,
            report.succeeded,
            report.total_units,
            report.failed,
            report.timed_out,
            report.fallback_used,
            report.parallelization_factor,
            wall_time
        );

        let results: Vec<UnitResult> = outcomes
            .into_values()
            .filter_map(|o| {
                let fallback_used = o.fallback_used;
                o.result.ok().map(|result| UnitResult {
                    unit_index: o.unit_index,
                    fallback_used,
                    result,
                })
            })
            .collect();

        if report.status.is_usable() {
            self.remember_entities(episode, &results);
        }

        Ok(EpisodeExtraction {
            episode_id: episode.episode_id.clone(),
            title: episode.title.clone(),
            status: report.status,
            results,
            report,
        })
    }

    /// Consume outcomes as they finish until every unit has one or the batch
    /// deadline passes. Errors only on checkpoint failure.
    async fn collect(
        &self,
        episode_id: &str,
        started: Instant,
        tasks: &mut JoinSet<UnitOutcome>,
        outstanding: &mut BTreeSet<usize>,
        outcomes: &mut BTreeMap<usize, UnitOutcome>,
        pb: &ProgressBar,
    ) -> Result<()> {
        let total = self.progress.total();

        while !outstanding.is_empty() {
            let deadline = self.timeouts.batch_deadline(started, outstanding.len());

            let joined = match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(joined)) => joined,
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "Batch deadline reached with {} units outstanding",
                        outstanding.len()
                    );
                    tasks.abort_all();
                    let elapsed = started.elapsed();
                    for index in std::mem::take(outstanding) {
                        let outcome =
                            UnitOutcome::failure(index, ExtractionError::BatchDeadline, elapsed);
                        self.accept(episode_id, outcome, outcomes, pb, total).await?;
                    }
                    break;
                }
            };

            match joined {
                Ok(outcome) => {
                    if !outstanding.remove(&outcome.unit_index) {
                        warn!("Ignoring duplicate outcome for unit {}", outcome.unit_index);
                        continue;
                    }
                    self.accept(episode_id, outcome, outcomes, pb, total).await?;
                }
                Err(e) => warn!("Worker task ended abnormally: {}", e),
            }
        }

        // Tasks that died without reporting.
        for index in std::mem::take(outstanding) {
            let outcome = UnitOutcome::failure(
                index,
                ExtractionError::Internal("Worker task ended without an outcome".to_string()),
                Duration::ZERO,
            );
            self.accept(episode_id, outcome, outcomes, pb, total).await?;
        }

        Ok(())
    }

    async fn accept(
        &self,
        episode_id: &str,
        outcome: UnitOutcome,
        outcomes: &mut BTreeMap<usize, UnitOutcome>,
        pb: &ProgressBar,
        total: usize,
    ) -> Result<()> {
        self.checkpoints.record(episode_id, &outcome).await?;

        let done = self.progress.advance();
        pb.inc(1);
        info!("Completed {} of {} units", done, total);

        outcomes.insert(outcome.unit_index, outcome);
        Ok(())
    }

    fn transition(&self, state: &mut EpisodeState, next: EpisodeState) {
        debug_assert!(
            state.can_transition_to(next),
            "invalid transition {:?} -> {:?}",
            state,
            next
        );
        debug!("{:?} -> {:?}", state, next);
        *state = next;
    }

    /// Text of the units right before `position`, oldest first.
    fn preceding_texts(&self, episode: &EpisodeInput, position: usize) -> Vec<String> {
        let start = position.saturating_sub(self.config.context_units);
        episode.units[start..position]
            .iter()
            .map(|u| u.text.clone())
            .filter(|t| !t.trim().is_empty())
            .collect()
    }

    fn podcast_context(&self, episode: &EpisodeInput) -> Option<PodcastContext> {
        let info = episode.podcast.as_ref()?;

        if let Some(cache) = &self.podcast_cache {
            if let Ok(mut cache) = cache.lock() {
                if let Some(cached) = cache.get(&info.id) {
                    debug!("Podcast context for {} from cache", info.id);
                    return Some(cached.clone());
                }
                let context = PodcastContext::from_info(info);
                cache.insert(info.id.clone(), context.clone());
                return Some(context);
            }
        }

        Some(PodcastContext::from_info(info))
    }

    /// Carry the episode's most mentioned entities over to later episodes of
    /// the same podcast.
    fn remember_entities(&self, episode: &EpisodeInput, results: &[UnitResult]) {
        let (Some(cache), Some(info)) = (&self.podcast_cache, &episode.podcast) else {
            return;
        };

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for unit in results {
            for entity in &unit.result.entities {
                *counts.entry(entity.text.as_str()).or_insert(0) += 1;
            }
        }
        let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        if let Ok(mut cache) = cache.lock() {
            let base = cache
                .get(&info.id)
                .cloned()
                .unwrap_or_else(|| PodcastContext::from_info(info));
            let updated = base.with_entities(
                ranked
                    .into_iter()
                    .take(KNOWN_ENTITIES_PER_EPISODE)
                    .map(|(name, _)| name.to_string()),
            );
            cache.insert(info.id.clone(), updated);
        }
    }

    fn progress_bar(&self, total: u64, done: u64) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("  {spinner:.green} Extracting [{bar:30.cyan/blue}] {pos}/{len} units")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓░"),
        );
        pb.set_position(done);
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }
}
