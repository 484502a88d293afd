//! Publish cycle - fetch, resolve, filter, dedup, select, format, publish, record

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    model::{
        Candidate, Fingerprint, Post, ResolvedPost, SourceGroup, SourceSampling,
        TenantThemeConfig, WorkingSet,
    },
    ports::{
        pick, Chooser, Clock, DestinationWriter, ImageFetcher, PublishError, SourceError,
        SourceReader, StateError, TenantConfigError, TenantConfigSource, WorkingSetStore,
    },
    usecases::{
        dedup::{DedupGuard, OverlapIndex},
        filter::FilterChain,
        render::Formatter,
        resolve::SourceResolver,
        select::select_best,
    },
};

/// Configuration for the cycle runner
#[derive(Debug, Clone)]
pub struct CycleConfig {
    /// Render the winner but neither publish nor record it
    pub dry_run: bool,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self { dry_run: true }
    }
}

/// Stages of one cycle, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStage {
    Idle,
    Fetching,
    Resolving,
    Filtering,
    Ranking,
    Formatting,
    Publishing,
    Recording,
    Aborted,
}

impl CycleStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleStage::Idle => "idle",
            CycleStage::Fetching => "fetching",
            CycleStage::Resolving => "resolving",
            CycleStage::Filtering => "filtering",
            CycleStage::Ranking => "ranking",
            CycleStage::Formatting => "formatting",
            CycleStage::Publishing => "publishing",
            CycleStage::Recording => "recording",
            CycleStage::Aborted => "aborted",
        }
    }
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that abort a cycle
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CycleError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Transient fetch error: {0}")]
    TransientFetch(String),
    #[error("Credential error: {0}")]
    Credential(String),
    #[error("Publish error: {0}")]
    Publish(String),
    #[error("State error: {0}")]
    State(String),
}

impl From<SourceError> for CycleError {
    fn from(error: SourceError) -> Self {
        match error {
            SourceError::Auth(_) => CycleError::Credential(error.to_string()),
            _ => CycleError::TransientFetch(error.to_string()),
        }
    }
}

impl From<PublishError> for CycleError {
    fn from(error: PublishError) -> Self {
        match error {
            PublishError::Auth(_) => CycleError::Credential(error.to_string()),
            PublishError::Network(_) | PublishError::RateLimited => {
                CycleError::TransientFetch(error.to_string())
            }
            PublishError::Api(_) | PublishError::ContentTooLong { .. } => {
                CycleError::Publish(error.to_string())
            }
        }
    }
}

impl From<StateError> for CycleError {
    fn from(error: StateError) -> Self {
        CycleError::State(error.to_string())
    }
}

impl From<TenantConfigError> for CycleError {
    fn from(error: TenantConfigError) -> Self {
        CycleError::Config(error.to_string())
    }
}

/// Outcome of one cycle; errors never escape `run_cycle`
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The winner was published and recorded
    Published {
        post_key: String,
        text: String,
        destination_post_id: String,
        destination_url: Option<String>,
        fingerprint: Fingerprint,
    },
    /// Dry run: the winner was rendered only
    DryRun {
        post_key: String,
        text: String,
        fingerprint: Fingerprint,
    },
    /// Every candidate was filtered out or already shown
    NoEligibleCandidate { fetched: usize, rejected: usize },
    /// The cycle aborted at `stage`
    Failed { stage: CycleStage, error: CycleError },
}

impl CycleOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            CycleOutcome::Published { .. } => "published",
            CycleOutcome::DryRun { .. } => "dry_run",
            CycleOutcome::NoEligibleCandidate { .. } => "no_eligible_candidate",
            CycleOutcome::Failed { .. } => "failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, CycleOutcome::Failed { .. })
    }
}

struct Abort {
    stage: CycleStage,
    error: CycleError,
}

impl Abort {
    fn new(stage: CycleStage, error: impl Into<CycleError>) -> Self {
        Self {
            stage,
            error: error.into(),
        }
    }
}

/// Runs publish cycles for (tenant, theme) pairs
#[derive(Clone)]
pub struct CycleRunner<S, W, St, I, Cf, Cl, Ch>
where
    S: SourceReader + ?Sized,
    W: DestinationWriter + ?Sized,
    St: WorkingSetStore + ?Sized,
    I: ImageFetcher + ?Sized,
    Cf: TenantConfigSource + ?Sized,
    Cl: Clock + ?Sized,
    Ch: Chooser + ?Sized,
{
    source: Arc<S>,
    writer: Arc<W>,
    store: Arc<St>,
    images: Arc<I>,
    configs: Arc<Cf>,
    clock: Arc<Cl>,
    chooser: Arc<Ch>,
    config: CycleConfig,
}

impl<S, W, St, I, Cf, Cl, Ch> CycleRunner<S, W, St, I, Cf, Cl, Ch>
where
    S: SourceReader + ?Sized,
    W: DestinationWriter + ?Sized,
    St: WorkingSetStore + ?Sized,
    I: ImageFetcher + ?Sized,
    Cf: TenantConfigSource + ?Sized,
    Cl: Clock + ?Sized,
    Ch: Chooser + ?Sized,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Arc<S>,
        writer: Arc<W>,
        store: Arc<St>,
        images: Arc<I>,
        configs: Arc<Cf>,
        clock: Arc<Cl>,
        chooser: Arc<Ch>,
        config: CycleConfig,
    ) -> Self {
        Self {
            source,
            writer,
            store,
            images,
            configs,
            clock,
            chooser,
            config,
        }
    }

    /// Run one cycle for a (tenant, theme) pair
    pub async fn run_cycle(&self, tenant: &str, theme: &str) -> CycleOutcome {
        let cycle_id = Uuid::new_v4();
        let span = tracing::info_span!("cycle", %cycle_id, tenant = %tenant, theme = %theme);

        async {
            match self.execute(tenant, theme).await {
                Ok(outcome) => {
                    tracing::info!(status = outcome.status(), "Cycle finished");
                    outcome
                }
                Err(Abort { stage, error }) => {
                    tracing::error!(
                        stage = %stage,
                        next = %CycleStage::Aborted,
                        error = %error,
                        "Cycle aborted"
                    );
                    CycleOutcome::Failed { stage, error }
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, tenant: &str, theme: &str) -> Result<CycleOutcome, Abort> {
        enter(CycleStage::Idle);
        let config = self
            .configs
            .load(tenant, theme)
            .await
            .map_err(|e| Abort::new(CycleStage::Idle, e))?;

        enter(CycleStage::Fetching);
        let account = self.read_account(&config);
        let raw_posts = self.fetch_candidates(&config, &account).await?;
        let recent = self.fetch_recent_destination(&config, &account).await?;
        let fetched = raw_posts.len();

        enter(CycleStage::Resolving);
        let resolver = SourceResolver::new(self.source.as_ref(), &account);
        let mut resolved = Vec::with_capacity(raw_posts.len());
        for raw in raw_posts {
            resolved.push(resolver.resolve(raw).await);
        }

        enter(CycleStage::Filtering);
        let working_set = self
            .store
            .load(&config.tenant, &config.theme, config.history_limit)
            .await
            .map_err(|e| Abort::new(CycleStage::Filtering, e))?;
        let (candidates, rejected) = self
            .filter_and_dedup(&config, &working_set, resolved, recent)
            .await;

        enter(CycleStage::Ranking);
        let Some(winner) = select_best(candidates) else {
            tracing::info!(fetched, rejected, "No eligible candidate");
            return Ok(CycleOutcome::NoEligibleCandidate { fetched, rejected });
        };
        tracing::info!(
            post_key = %winner.post.key(),
            popularity = winner.popularity(),
            fingerprint = %winner.fingerprint,
            "Selected candidate"
        );

        enter(CycleStage::Formatting);
        let rendered = Formatter::new(&config, self.chooser.as_ref()).format(&winner.post);

        if self.config.dry_run || !self.writer.is_enabled() {
            tracing::info!(
                post_key = %rendered.source_post_key,
                rendered_text = %rendered.text,
                "[DRY RUN] Would publish"
            );
            return Ok(CycleOutcome::DryRun {
                post_key: rendered.source_post_key,
                text: rendered.text,
                fingerprint: winner.fingerprint,
            });
        }

        enter(CycleStage::Publishing);
        let receipt = self
            .writer
            .publish(&config.write_account, config.destination, &rendered)
            .await
            .map_err(|e| Abort::new(CycleStage::Publishing, e))?;
        tracing::info!(
            platform = self.writer.platform(),
            destination_post_id = %receipt.id,
            url = ?receipt.url,
            "Published"
        );

        enter(CycleStage::Recording);
        let now = self.clock.now();
        if let Err(error) = self.record(working_set, &winner, now).await {
            tracing::error!(
                destination_post_id = %receipt.id,
                fingerprint = %winner.fingerprint,
                error = %error,
                "Published but failed to record; the post may be repeated"
            );
            return Err(Abort::new(CycleStage::Recording, error));
        }

        enter(CycleStage::Idle);
        Ok(CycleOutcome::Published {
            post_key: rendered.source_post_key,
            text: rendered.text,
            destination_post_id: receipt.id,
            destination_url: receipt.url,
            fingerprint: winner.fingerprint,
        })
    }

    fn read_account(&self, config: &TenantThemeConfig) -> String {
        pick(self.chooser.as_ref(), &config.read_accounts)
            .cloned()
            .unwrap_or_else(|| config.write_account.clone())
    }

    fn sampled_groups<'c>(&self, config: &'c TenantThemeConfig) -> Vec<&'c SourceGroup> {
        match config.sampling {
            SourceSampling::All => config.sources.iter().collect(),
            SourceSampling::RandomOne => pick(self.chooser.as_ref(), &config.sources)
                .into_iter()
                .collect(),
        }
    }

    async fn fetch_candidates(
        &self,
        config: &TenantThemeConfig,
        account: &str,
    ) -> Result<Vec<Post>, Abort> {
        let groups = self.sampled_groups(config);
        if groups.is_empty() {
            return Err(Abort::new(
                CycleStage::Fetching,
                CycleError::Config("no source groups configured".to_string()),
            ));
        }

        let mut posts = Vec::new();
        for group in groups {
            let page = self
                .source
                .fetch_posts(account, group.id, 0, config.fetch_count)
                .await
                .map_err(|e| Abort::new(CycleStage::Fetching, e))?;
            tracing::debug!(group_id = group.id, count = page.len(), "Fetched group");
            posts.extend(page);
        }

        tracing::info!(account = %account, count = posts.len(), "Fetched candidates");
        Ok(posts)
    }

    async fn fetch_recent_destination(
        &self,
        config: &TenantThemeConfig,
        account: &str,
    ) -> Result<Vec<Post>, Abort> {
        if config.recent_window == 0 {
            return Ok(vec![]);
        }
        let recent = self
            .source
            .fetch_posts(account, config.destination, 0, config.recent_window)
            .await
            .map_err(|e| Abort::new(CycleStage::Fetching, e))?;
        tracing::debug!(count = recent.len(), "Fetched recent destination posts");
        Ok(recent)
    }

    async fn filter_and_dedup(
        &self,
        config: &TenantThemeConfig,
        working_set: &WorkingSet,
        resolved: Vec<ResolvedPost>,
        recent: Vec<Post>,
    ) -> (Vec<Candidate>, usize) {
        let now = self.clock.now();
        let chain = FilterChain::new(config);
        let overlap =
            OverlapIndex::from_texts(recent.into_iter().map(|p| ResolvedPost::inline(p).post.text));
        let mut guard = DedupGuard::new(
            working_set,
            overlap,
            self.images.as_ref(),
            config.fingerprint_mode,
        );

        let mut candidates = Vec::new();
        let mut rejected = 0;
        for item in resolved {
            if let Err(rejection) = chain.check(&item, now) {
                tracing::debug!(
                    post_key = %item.post.key(),
                    reason = rejection.code(),
                    detail = %rejection,
                    "Rejected candidate"
                );
                rejected += 1;
                continue;
            }
            match guard.admit(&item.post).await {
                Ok(candidate) => candidates.push(candidate),
                Err(duplicate) => {
                    tracing::debug!(
                        post_key = %item.post.key(),
                        reason = duplicate.code(),
                        detail = %duplicate,
                        "Rejected duplicate"
                    );
                    rejected += 1;
                }
            }
        }

        tracing::info!(
            eligible = candidates.len(),
            rejected,
            "Filtered candidates"
        );
        (candidates, rejected)
    }

    /// Append the winner to the working set and save it; a version conflict
    /// is retried once against a freshly loaded set
    async fn record(
        &self,
        mut working_set: WorkingSet,
        winner: &Candidate,
        now: OffsetDateTime,
    ) -> Result<u64, StateError> {
        working_set.record(winner.fingerprint.clone(), winner.image_hash.clone());
        working_set.updated_at = Some(now);

        match self.store.save(&working_set).await {
            Err(StateError::VersionConflict { expected, found }) => {
                tracing::warn!(expected, found, "Working set changed concurrently, retrying");
                let mut fresh = self
                    .store
                    .load(&working_set.tenant, &working_set.theme, working_set.history_limit)
                    .await?;
                fresh.record(winner.fingerprint.clone(), winner.image_hash.clone());
                fresh.updated_at = Some(now);
                self.store.save(&fresh).await
            }
            other => other,
        }
    }
}

fn enter(stage: CycleStage) {
    tracing::debug!(stage = %stage, "Entering stage");
}
