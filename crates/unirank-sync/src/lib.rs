mod backfill;
mod config;
mod enrich;
mod identity;
mod merge;
mod normalize;
mod persist;
mod reports;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Datelike, Utc};
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, info_span, warn, Instrument};
use unirank_adapters::{
    adapter_for_source, fetch_university_details, AdapterContext, SourceAdapter, SourceKind, QS_SOURCE_ID,
    SYNTHETIC_RANKINGS_SOURCE_ID,
};
use unirank_core::{
    canonical_country, FetchCriteria, PipelineReport, RankingType, RawRecord, UniversityRecord,
    UnknownRankingType,
};
use unirank_storage::{
    DelayPolicy, HttpClientConfig, HttpFetcher, InMemoryUniversityStore, PgUniversityStore,
    UniversityCacheFile, UniversityStore,
};
use uuid::Uuid;

pub use backfill::{dedup_countries, placeholder_name, CompletenessBackfill, DEFAULT_MIN_PER_COUNTRY};
pub use config::{split_countries, PipelineConfig, SourceConfig, SourceRegistry};
pub use enrich::{apply_details, DetailEnricher};
pub use identity::{ExactNameResolver, IdentityResolver, SimilarityConfig, SimilarityResolver};
pub use merge::{avatar_url, MergeEngine, DEFAULT_FACILITIES, DEFAULT_MAJORS};
pub use normalize::{normalize, normalize_all, parse_rank, parse_score, resolve_country};
pub use persist::{PersistOutcome, PersistenceGateway, UpsertAction, DEFAULT_BATCH_SIZE};
pub use unirank_adapters::UniversityDetails;
pub use reports::{
    encode_snapshot, export_parquet_snapshot, render_run_summary, report_markdown, write_run_reports,
    ParquetManifest, ParquetManifestFile, MANIFEST_FILE, REPORT_FILE, SNAPSHOT_DIR, SNAPSHOT_FILE, SUMMARY_FILE,
};

pub const CRATE_NAME: &str = "unirank-sync";

/// Rows kept from each listing fetch unless the request says otherwise.
pub const DEFAULT_LISTING_LIMIT: usize = 100;

/// Invalid run parameters; the only error a run surfaces to its caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("rankingType=subject requires a subject")]
    MissingSubject,
    #[error("rankingType=region requires a region")]
    MissingRegion,
    #[error("at least one country is required")]
    NoCountries,
    #[error("batch size must be at least 1")]
    InvalidBatchSize,
    #[error("limit must be at least 1")]
    InvalidLimit,
    #[error(transparent)]
    UnknownRankingType(#[from] UnknownRankingType),
    #[error("no adapter registered for source `{0}`")]
    UnknownSource(String),
    #[error("source registry: {0}")]
    Registry(String),
}

fn current_year() -> i32 {
    Utc::now().year()
}

fn default_min_per_country() -> usize {
    DEFAULT_MIN_PER_COUNTRY
}

fn default_listing_limit() -> usize {
    DEFAULT_LISTING_LIMIT
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRequest {
    pub countries: Vec<String>,
    #[serde(default = "current_year")]
    pub year: i32,
    #[serde(default)]
    pub ranking_type: RankingType,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default = "default_min_per_country")]
    pub min_per_country: usize,
    #[serde(default)]
    pub use_mock_data: bool,
    /// Maximum rows taken from each listing fetch.
    #[serde(default = "default_listing_limit")]
    pub limit: usize,
    /// Follow topuniversities.com profile links to fill missing fields.
    #[serde(default)]
    pub enrich_details: bool,
    /// Overrides the configured batch size for this run.
    #[serde(default)]
    pub batch_size: Option<usize>,
}

impl PipelineRequest {
    pub fn new(countries: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            countries: countries.into_iter().map(Into::into).collect(),
            year: current_year(),
            ranking_type: RankingType::World,
            subject: None,
            region: None,
            min_per_country: DEFAULT_MIN_PER_COUNTRY,
            use_mock_data: false,
            limit: DEFAULT_LISTING_LIMIT,
            enrich_details: false,
            batch_size: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if dedup_countries(&self.countries).is_empty() {
            return Err(ConfigError::NoCountries);
        }
        match self.ranking_type {
            RankingType::Subject if non_blank(&self.subject).is_none() => Err(ConfigError::MissingSubject),
            RankingType::Region if non_blank(&self.region).is_none() => Err(ConfigError::MissingRegion),
            _ if self.batch_size == Some(0) => Err(ConfigError::InvalidBatchSize),
            _ if self.limit == 0 => Err(ConfigError::InvalidLimit),
            _ => Ok(()),
        }
    }

    /// Countries to fetch and backfill: de-duplicated, aliases folded to canonical names.
    pub fn canonical_countries(&self) -> Vec<String> {
        let folded: Vec<String> = self
            .countries
            .iter()
            .map(|c| canonical_country(c).map(str::to_string).unwrap_or_else(|| c.trim().to_string()))
            .collect();
        dedup_countries(&folded)
    }

    fn criteria_for(&self, country: &str) -> FetchCriteria {
        FetchCriteria {
            country: country.to_string(),
            year: self.year,
            ranking_type: self.ranking_type,
            subject: non_blank(&self.subject),
            region: non_blank(&self.region),
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    CollectingSources,
    Normalizing,
    Enriching,
    Grouping,
    Merging,
    Backfilling,
    Persisting,
    Done,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::CollectingSources => "collecting_sources",
            PipelineStage::Normalizing => "normalizing",
            PipelineStage::Enriching => "enriching",
            PipelineStage::Grouping => "grouping",
            PipelineStage::Merging => "merging",
            PipelineStage::Backfilling => "backfilling",
            PipelineStage::Persisting => "persisting",
            PipelineStage::Done => "done",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn enter_stage(run_id: Uuid, stage: PipelineStage) {
    info!(%run_id, stage = stage.as_str(), "pipeline stage");
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub report: PipelineReport,
    pub records: Vec<UniversityRecord>,
    /// `reports/<run_id>` when report writing succeeded.
    pub reports_dir: Option<PathBuf>,
}

struct PlannedSource {
    config: SourceConfig,
    adapter: Arc<dyn SourceAdapter>,
}

pub struct AggregationPipeline {
    config: PipelineConfig,
    store: Arc<dyn UniversityStore>,
    http: HttpFetcher,
    resolver: Box<dyn IdentityResolver>,
    registry: Option<SourceRegistry>,
    adapters: HashMap<String, Arc<dyn SourceAdapter>>,
    delay_override: Option<DelayPolicy>,
    seed: Option<u64>,
    write_reports: bool,
}

impl AggregationPipeline {
    pub fn new(config: PipelineConfig, store: Arc<dyn UniversityStore>) -> Result<Self> {
        let mut http_config = HttpClientConfig {
            timeout: Duration::from_secs(config.http_timeout_secs),
            ..Default::default()
        };
        if let Some(user_agent) = &config.user_agent {
            http_config.user_agent = Some(user_agent.clone());
        }
        let http = HttpFetcher::new(http_config).context("building http client")?;
        Ok(Self {
            config,
            store,
            http,
            resolver: Box::<ExactNameResolver>::default(),
            registry: None,
            adapters: HashMap::new(),
            delay_override: None,
            seed: None,
            write_reports: true,
        })
    }

    /// PostgreSQL when `DATABASE_URL` is set (migrations applied), otherwise in-memory.
    pub async fn from_env() -> Result<Self> {
        let config = PipelineConfig::from_env();
        let store: Arc<dyn UniversityStore> = match &config.database_url {
            Some(url) => {
                let store = PgUniversityStore::connect(url).await.context("connecting to postgres")?;
                store.migrate().await.context("applying migrations")?;
                Arc::new(store)
            }
            None => {
                info!("DATABASE_URL not set; using in-memory university store");
                Arc::new(InMemoryUniversityStore::new())
            }
        };
        Self::new(config, store)
    }

    pub fn with_resolver(mut self, resolver: Box<dyn IdentityResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Skip `sources.yaml` and use this registry.
    pub fn with_registry(mut self, registry: SourceRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Use this adapter whenever the registry names its source id, ahead of the built-in table.
    pub fn with_adapter(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.adapters.insert(adapter.source_id().to_string(), adapter);
        self
    }

    /// Replace every politeness delay, including per-source overrides.
    pub fn with_delay_override(mut self, delay: DelayPolicy) -> Self {
        self.delay_override = Some(delay);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn without_reports(mut self) -> Self {
        self.write_reports = false;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn UniversityStore> {
        &self.store
    }

    pub fn cache_file(&self) -> UniversityCacheFile {
        UniversityCacheFile::new(self.config.cache_path.clone())
    }

    pub async fn run(&self, request: PipelineRequest) -> Result<PipelineOutcome, ConfigError> {
        request.validate()?;
        let batch_size = request.batch_size.unwrap_or(self.config.batch_size);
        if batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }
        let mock_only = request.use_mock_data || self.config.use_mock_data;
        let plan = self.plan_sources(mock_only).await?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let countries = request.canonical_countries();
        let span = info_span!("pipeline_run", %run_id, ranking_type = %request.ranking_type, year = request.year);

        async move {
            info!(countries = ?countries, sources = plan.len(), "pipeline run started");

            enter_stage(run_id, PipelineStage::CollectingSources);
            let ctx = AdapterContext::new(run_id, self.config.cache_path.clone());
            let collected = join_all(
                plan.iter()
                    .map(|source| self.collect_source(source, &ctx, &request, &countries)),
            )
            .await;

            enter_stage(run_id, PipelineStage::Normalizing);
            let mut source_counts = BTreeMap::new();
            let mut dropped_records = 0;
            let mut candidates = Vec::new();
            for (source, raws) in plan.iter().zip(&collected) {
                let scale = source.config.score_scale.unwrap_or_else(|| source.adapter.score_scale());
                *source_counts.entry(source.config.source_id.clone()).or_insert(0) += raws.len();
                let (normalized, dropped) = normalize_all(raws, &source.config.source_id, scale);
                dropped_records += dropped;
                candidates.extend(normalized);
            }

            if request.enrich_details && !mock_only {
                enter_stage(run_id, PipelineStage::Enriching);
                let enriched = DetailEnricher::new(&self.http, &ctx, self.detail_delay(&plan))
                    .enrich(&mut candidates)
                    .await;
                info!(enriched, "detail pages applied");
            }

            enter_stage(run_id, PipelineStage::Grouping);
            let groups = self.resolver.group(candidates);

            let (records, synthesized_records) = {
                let mut rng = match self.seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_rng(&mut rand::rng()),
                };
                enter_stage(run_id, PipelineStage::Merging);
                let merged = MergeEngine.merge_all(&groups, &mut rng);
                enter_stage(run_id, PipelineStage::Backfilling);
                CompletenessBackfill.backfill(merged, &countries, request.min_per_country, &mut rng)
            };

            enter_stage(run_id, PipelineStage::Persisting);
            let persisted = PersistenceGateway::new(self.store.clone(), batch_size)
                .persist(records)
                .await;
            if let Err(err) = self.cache_file().write(&persisted.records).await {
                warn!(error = %err, path = %self.config.cache_path.display(), "failed to write university cache file");
            }

            let per_country_counts = count_per_country(&persisted.records, &countries);
            let report = PipelineReport {
                run_id,
                started_at,
                finished_at: Utc::now(),
                total_records: persisted.records.len(),
                per_country_counts,
                created_count: persisted.created_count,
                updated_count: persisted.updated_count,
                failures: persisted.failures,
                source_counts,
                dropped_records,
                synthesized_records,
            };

            let reports_dir = if self.write_reports {
                self.write_run_artifacts(&report, &persisted.records).await
            } else {
                None
            };

            enter_stage(run_id, PipelineStage::Done);
            info!(
                total = report.total_records,
                created = report.created_count,
                updated = report.updated_count,
                failed = report.failures.len(),
                synthesized = report.synthesized_records,
                "pipeline run finished"
            );
            Ok(PipelineOutcome {
                report,
                records: persisted.records,
                reports_dir,
            })
        }
        .instrument(span)
        .await
    }

    async fn plan_sources(&self, mock_only: bool) -> Result<Vec<PlannedSource>, ConfigError> {
        let registry = match &self.registry {
            Some(registry) => registry.clone(),
            None => SourceRegistry::load(&self.config.sources_path())
                .await
                .map_err(|err| ConfigError::Registry(format!("{err:#}")))?,
        };

        let selected: Vec<SourceConfig> = if mock_only {
            let synthetic = registry
                .sources
                .iter()
                .find(|s| s.source_id == SYNTHETIC_RANKINGS_SOURCE_ID)
                .cloned()
                .unwrap_or_else(|| SourceConfig {
                    source_id: SYNTHETIC_RANKINGS_SOURCE_ID.to_string(),
                    display_name: "Synthetic rankings".to_string(),
                    enabled: true,
                    kind: SourceKind::Synthetic,
                    score_scale: None,
                    delay_min_ms: None,
                    delay_max_ms: None,
                    notes: None,
                });
            vec![synthetic]
        } else {
            registry.enabled().cloned().collect()
        };

        selected
            .into_iter()
            .map(|config| -> Result<PlannedSource, ConfigError> {
                let adapter = match self.adapters.get(&config.source_id) {
                    Some(adapter) => Arc::clone(adapter),
                    None => adapter_for_source(&config.source_id)
                        .map(Arc::<dyn SourceAdapter>::from)
                        .ok_or_else(|| ConfigError::UnknownSource(config.source_id.clone()))?,
                };
                Ok(PlannedSource { config, adapter })
            })
            .collect()
    }

    fn delay_for(&self, source: &PlannedSource) -> DelayPolicy {
        if let Some(delay) = self.delay_override {
            return delay;
        }
        match source.adapter.kind() {
            SourceKind::LiveHtml => source.config.delay_policy(self.config.delay_policy()),
            SourceKind::Synthetic | SourceKind::Cache => DelayPolicy::none(),
        }
    }

    /// Profile pages live on the QS site, so they share its politeness delay.
    fn detail_delay(&self, plan: &[PlannedSource]) -> DelayPolicy {
        if let Some(delay) = self.delay_override {
            return delay;
        }
        plan.iter()
            .find(|source| source.config.source_id == QS_SOURCE_ID)
            .map(|source| source.config.delay_policy(self.config.delay_policy()))
            .unwrap_or_else(|| self.config.delay_policy())
    }

    /// Profile page behind a detail link. Links outside topuniversities.com, mock mode and
    /// fetch failures all answer with the reference profile.
    pub async fn university_details(&self, url: &str, use_mock_data: bool) -> UniversityDetails {
        if use_mock_data || self.config.use_mock_data {
            return UniversityDetails::reference();
        }
        let ctx = AdapterContext::new(Uuid::new_v4(), self.config.cache_path.clone());
        match fetch_university_details(&self.http, &ctx, url).await {
            Ok(Some(details)) => details,
            Ok(None) => UniversityDetails::reference(),
            Err(err) => {
                warn!(url, error = %err, "detail page fetch failed; serving reference profile");
                UniversityDetails::reference()
            }
        }
    }

    /// One adapter, countries in order, pausing between consecutive calls.
    async fn collect_source(
        &self,
        source: &PlannedSource,
        ctx: &AdapterContext,
        request: &PipelineRequest,
        countries: &[String],
    ) -> Vec<RawRecord> {
        let delay = self.delay_for(source);
        let mut out = Vec::new();
        for (index, country) in countries.iter().enumerate() {
            if index > 0 && !delay.is_zero() {
                delay.pause().await;
            }
            let criteria = request.criteria_for(country);
            let mut records = source
                .adapter
                .fetch(&self.http, ctx, &criteria)
                .instrument(info_span!("adapter_fetch", source_id = source.adapter.source_id(), country = %country))
                .await;
            if source.adapter.kind() != SourceKind::Cache {
                records.truncate(request.limit);
            }
            out.extend(records);
        }
        out
    }

    async fn write_run_artifacts(&self, report: &PipelineReport, records: &[UniversityRecord]) -> Option<PathBuf> {
        let run_dir = match write_run_reports(&self.config.reports_dir, report, records).await {
            Ok(dir) => dir,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "failed to write run reports");
                return None;
            }
        };
        if let Err(err) = export_parquet_snapshot(&run_dir, records).await {
            warn!(error = %format!("{err:#}"), "failed to export parquet snapshot");
        }
        Some(run_dir)
    }

    /// Cron job re-running the configured countries; `None` when disabled.
    pub async fn maybe_build_scheduler(self: &Arc<Self>) -> Result<Option<JobScheduler>> {
        if !self.config.scheduler_enabled {
            return Ok(None);
        }
        if self.config.scheduled_countries.is_empty() {
            warn!("scheduler enabled but UNIRANK_SCHEDULED_COUNTRIES is empty; not scheduling");
            return Ok(None);
        }

        let sched = JobScheduler::new().await.context("creating scheduler")?;
        let cron = self.config.sync_cron.clone();
        let pipeline = Arc::clone(self);
        let job = Job::new_async(cron.as_str(), move |_uuid, _l| {
            let pipeline = Arc::clone(&pipeline);
            Box::pin(async move {
                let request = PipelineRequest::new(pipeline.config.scheduled_countries.clone());
                match pipeline.run(request).await {
                    Ok(outcome) => info!(run_id = %outcome.report.run_id, "scheduled pipeline run complete"),
                    Err(err) => warn!(error = %err, "scheduled pipeline run rejected"),
                }
            })
        })
        .with_context(|| format!("creating scheduler job for cron {cron}"))?;
        sched.add(job).await.context("adding scheduler job")?;
        Ok(Some(sched))
    }
}

/// Each record counts once, under the first requested country it belongs to (case-insensitively,
/// keyed by the requested spelling); records outside every requested country keep their own.
fn count_per_country(records: &[UniversityRecord], countries: &[String]) -> BTreeMap<String, usize> {
    let mut counts: BTreeMap<String, usize> = countries.iter().map(|c| (c.clone(), 0)).collect();
    for record in records {
        let key = countries
            .iter()
            .find(|country| record.in_country(country))
            .cloned()
            .unwrap_or_else(|| record.country.clone());
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
}

pub async fn run_from_env(request: PipelineRequest) -> Result<PipelineOutcome> {
    let pipeline = AggregationPipeline::from_env().await?;
    Ok(pipeline.run(request).await?)
}

/// Starts the cron scheduler (if enabled) and blocks until ctrl-c.
pub async fn run_scheduler_until_shutdown(pipeline: Arc<AggregationPipeline>) -> Result<()> {
    let Some(mut sched) = pipeline.maybe_build_scheduler().await? else {
        info!("scheduler disabled");
        return Ok(());
    };
    sched.start().await.context("starting scheduler")?;
    info!(cron = %pipeline.config.sync_cron, "scheduler started");
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    sched.shutdown().await.context("stopping scheduler")?;
    Ok(())
}
