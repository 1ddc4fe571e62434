//! Axum trigger endpoints for the aggregation pipeline.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};
use unirank_core::RankingType;
use unirank_sync::{split_countries, AggregationPipeline, ConfigError, PipelineOutcome, PipelineRequest};

pub const CRATE_NAME: &str = "unirank-web";

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AggregationPipeline>,
}

impl AppState {
    pub fn new(pipeline: Arc<AggregationPipeline>) -> Self {
        Self { pipeline }
    }
}

#[derive(Debug, Error)]
pub enum WebError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebError::Config(_) => StatusCode::BAD_REQUEST,
            WebError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(error = %format!("{:#}", self), "request failed");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
struct RankingsQuery {
    countries: Option<String>,
    #[serde(rename = "type", alias = "rankingType")]
    ranking_type: Option<String>,
    year: Option<i32>,
    subject: Option<String>,
    region: Option<String>,
    #[serde(alias = "minPerCountry")]
    min_per_country: Option<usize>,
    #[serde(alias = "useMockData")]
    mock: Option<bool>,
    limit: Option<usize>,
    #[serde(alias = "enrichDetails")]
    enrich_details: Option<bool>,
    /// When present the handler answers with that profile page instead of running the pipeline.
    #[serde(rename = "universityUrl")]
    university_url: Option<String>,
}

impl RankingsQuery {
    fn into_request(self) -> Result<PipelineRequest, ConfigError> {
        let mut request = PipelineRequest::new(split_countries(self.countries.as_deref().unwrap_or_default()));
        if let Some(kind) = self.ranking_type.as_deref().filter(|k| !k.trim().is_empty()) {
            request.ranking_type = RankingType::from_str(kind)?;
        }
        if let Some(year) = self.year {
            request.year = year;
        }
        if let Some(min) = self.min_per_country {
            request.min_per_country = min;
        }
        request.subject = self.subject;
        request.region = self.region;
        request.use_mock_data = self.mock.unwrap_or(false);
        if let Some(limit) = self.limit {
            request.limit = limit;
        }
        request.enrich_details = self.enrich_details.unwrap_or(false);
        Ok(request)
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/api/universities/rankings", get(rankings_handler))
        .route("/api/universities/cache", get(cache_handler))
        .route("/api/pipeline/run", post(run_handler))
        .with_state(Arc::new(state))
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    let pipeline = Arc::new(AggregationPipeline::from_env().await?);
    let port = pipeline.config().web_port;

    let scheduler = pipeline.maybe_build_scheduler().await?;
    if let Some(sched) = &scheduler {
        sched.start().await?;
        info!(cron = %pipeline.config().sync_cron, "scheduler started");
    }

    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "listening");
    axum::serve(listener, app(AppState::new(pipeline)))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    if let Some(mut sched) = scheduler {
        sched.shutdown().await?;
    }
    Ok(())
}

async fn healthz_handler() -> &'static str {
    "ok"
}

fn outcome_json(outcome: PipelineOutcome) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "report": outcome.report,
        "universities": outcome.records,
    }))
}

async fn rankings_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RankingsQuery>,
) -> Result<Json<serde_json::Value>, WebError> {
    if let Some(url) = query.university_url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        let details = state.pipeline.university_details(url, query.mock.unwrap_or(false)).await;
        return Ok(Json(serde_json::json!({ "university": details })));
    }
    let request = query.into_request()?;
    let outcome = state.pipeline.run(request).await?;
    Ok(outcome_json(outcome))
}

async fn run_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PipelineRequest>,
) -> Result<Json<serde_json::Value>, WebError> {
    let outcome = state.pipeline.run(request).await?;
    Ok(outcome_json(outcome))
}

async fn cache_handler(State(state): State<Arc<AppState>>) -> Result<Json<Vec<serde_json::Value>>, WebError> {
    let cache = state.pipeline.cache_file();
    if !cache.exists().await {
        return Ok(Json(Vec::new()));
    }
    Ok(Json(cache.read_raw().await?))
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use unirank_storage::{DelayPolicy, InMemoryUniversityStore};
    use unirank_sync::PipelineConfig;

    fn test_app(dir: &Path) -> Router {
        let config = PipelineConfig {
            cache_path: dir.join("universities.json"),
            reports_dir: dir.join("reports"),
            workspace_root: dir.to_path_buf(),
            ..PipelineConfig::default()
        };
        let pipeline = AggregationPipeline::new(config, Arc::new(InMemoryUniversityStore::new()))
            .unwrap()
            .with_delay_override(DelayPolicy::none())
            .with_seed(11);
        app(AppState::new(Arc::new(pipeline)))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let resp = app
            .oneshot(axum::http::Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn healthz_says_ok() {
        let dir = tempfile::tempdir().unwrap();
        let resp = test_app(dir.path())
            .oneshot(axum::http::Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn mock_rankings_return_report_and_universities() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = get_json(
            test_app(dir.path()),
            "/api/universities/rankings?countries=Japan&mock=true&min_per_country=3",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["report"]["perCountryCounts"]["Japan"], 3);
        assert_eq!(body["universities"].as_array().unwrap().len(), 3);
        assert!(body["universities"][0]["rating"].is_number());
    }

    #[tokio::test]
    async fn limit_caps_each_listing() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = get_json(
            test_app(dir.path()),
            "/api/universities/rankings?countries=United%20States&mock=true&min_per_country=0&limit=2",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["universities"].as_array().unwrap().len(), 2);
        assert_eq!(body["report"]["sourceCounts"]["synthetic-rankings"], 2);

        let (status, _) = get_json(
            test_app(dir.path()),
            "/api/universities/rankings?countries=Japan&mock=true&limit=0",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn university_url_returns_a_profile_instead_of_a_run() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = get_json(
            test_app(dir.path()),
            "/api/universities/rankings?universityUrl=https%3A%2F%2Fwww.usnews.com%2Fbest-colleges%2Fmit-2178",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.get("report").is_none());
        assert_eq!(body["university"]["name"], "Massachusetts Institute of Technology");
        assert!(body["university"]["facilities"].as_array().unwrap().len() > 1);
        assert!(!dir.path().join("universities.json").exists());
    }

    #[tokio::test]
    async fn subject_ranking_without_subject_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = get_json(
            test_app(dir.path()),
            "/api/universities/rankings?countries=Japan&type=subject&mock=true",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("subject"));
    }

    #[tokio::test]
    async fn unknown_ranking_type_and_missing_countries_are_bad_requests() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path());
        let (status, _) = get_json(app.clone(), "/api/universities/rankings?countries=Japan&type=galaxy").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = get_json(app, "/api/universities/rankings?mock=true").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn post_run_then_read_cache() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path());

        let (status, body) = get_json(app.clone(), "/api/universities/cache").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!([]));

        let resp = app
            .clone()
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/api/pipeline/run")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"countries":["Canada"],"minPerCountry":4,"useMockData":true}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let (status, body) = get_json(app, "/api/universities/cache").await;
        assert_eq!(status, StatusCode::OK);
        let cached = body.as_array().unwrap();
        assert_eq!(cached.len(), 4);
        assert!(cached.iter().all(|entry| entry["country"] == "Canada"));
    }
}
