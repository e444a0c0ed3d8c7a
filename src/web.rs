//! Read-only JSON API over one loaded collection.
//!
//! Every handler is stateless: queries and route tokens arrive as request
//! parameters and are answered through the same resolvers a session uses.

use crate::{
    Breadcrumb, Collection, Entry, EntryId, EntryIndex, FacetCatalogue, FacetKind, LetterPartition,
    LoadError, LoadOptions, Query, RouteIntent, parse, reconcile, resolve,
};
use axum::{
    Json, Router,
    extract::{Query as QueryParams, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::info;

type SharedState = Arc<AppState>;
const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

pub struct AppState {
    collection: Arc<Collection>,
    index: EntryIndex,
}

impl AppState {
    pub fn new(collection: Arc<Collection>) -> Self {
        let index = EntryIndex::build(&collection);
        Self { collection, index }
    }
}

#[derive(Debug, Clone)]
pub struct WebConfig {
    pub addr: SocketAddr,
    pub dataset: PathBuf,
    pub load: LoadOptions,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            dataset: PathBuf::from("data/fjalor.json"),
            load: LoadOptions::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WebError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Load(#[from] LoadError),
}

pub async fn serve(config: WebConfig) -> Result<(), WebError> {
    let (collection, report) = Collection::open(&config.dataset, &config.load)?;
    let router = build_router(Arc::new(AppState::new(Arc::new(collection))));
    info!(
        %config.addr,
        dataset = %config.dataset.display(),
        entries = report.loaded,
        "Binding HTTP listener"
    );
    let listener = TcpListener::bind(config.addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("HTTP server exited");
    Ok(())
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = json!({ "error": self.message });
        (self.status, Json(payload)).into_response()
    }
}

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/api/entries", get(api_entries))
        .route("/api/entry", get(api_entry))
        .route("/api/facets", get(api_facets))
        .route("/api/letters", get(api_letters))
        .route("/api/route", get(api_route))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            let _ = stream.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({ "status": "ok", "entries": state.collection.len() }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntriesParams {
    q: Option<String>,
    morph_class: Option<String>,
    formation: Option<String>,
    neologism: Option<String>,
    limit: Option<usize>,
}

impl EntriesParams {
    fn query(&self) -> Query {
        let mut query = Query::text(self.q.clone().unwrap_or_default());
        let selected = [
            (FacetKind::MorphClass, &self.morph_class),
            (FacetKind::Formation, &self.formation),
            (FacetKind::Neologism, &self.neologism),
        ];
        for (kind, value) in selected {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                query.facets.insert(kind, value.to_string());
            }
        }
        query
    }
}

#[derive(Debug, Serialize)]
struct EntriesPayload {
    query: Query,
    total: usize,
    limit: usize,
    results: Vec<Entry>,
}

async fn api_entries(
    State(state): State<SharedState>,
    QueryParams(params): QueryParams<EntriesParams>,
) -> Result<Json<EntriesPayload>, ApiError> {
    let limit = parse_limit(params.limit)?;
    let query = params.query();
    let subset = resolve(&state.collection, &query);
    let results = subset
        .entries(&state.collection)
        .take(limit)
        .cloned()
        .collect();
    Ok(Json(EntriesPayload {
        total: subset.len(),
        query,
        limit,
        results,
    }))
}

#[derive(Debug, Deserialize)]
struct EntryParams {
    id: Option<String>,
}

async fn api_entry(
    State(state): State<SharedState>,
    QueryParams(params): QueryParams<EntryParams>,
) -> Result<Json<Entry>, ApiError> {
    let raw = params
        .id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Query parameter `id` is required"))?;
    let id = EntryId::new(&raw);
    state
        .index
        .lookup(&state.collection, &id)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("No entry found for {raw:?}")))
}

async fn api_facets(State(state): State<SharedState>) -> Json<FacetCatalogue> {
    Json(state.index.catalogue.clone())
}

#[derive(Debug, Deserialize)]
struct LettersParams {
    q: Option<String>,
}

#[derive(Debug, Serialize)]
struct LetterPayload {
    letter: char,
    count: usize,
    first: EntryId,
}

async fn api_letters(
    State(state): State<SharedState>,
    QueryParams(params): QueryParams<LettersParams>,
) -> Json<Vec<LetterPayload>> {
    let subset = resolve(&state.collection, &Query::text(params.q.unwrap_or_default()));
    let partition = LetterPartition::build(&state.collection, &subset);
    let letters = partition
        .iter()
        .filter_map(|(letter, bucket)| {
            let first = state.collection.get(*bucket.first()?)?;
            Some(LetterPayload {
                letter,
                count: bucket.len(),
                first: first.id().clone(),
            })
        })
        .collect();
    Json(letters)
}

#[derive(Debug, Deserialize)]
struct RouteParams {
    token: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct RoutePayload {
    intent: RouteIntent,
    canonical: String,
    breadcrumb: Option<Breadcrumb>,
    expand: Option<EntryId>,
    total: usize,
    results: Vec<EntryId>,
}

async fn api_route(
    State(state): State<SharedState>,
    QueryParams(params): QueryParams<RouteParams>,
) -> Result<Json<RoutePayload>, ApiError> {
    let limit = parse_limit(params.limit)?;
    let intent = parse(params.token.as_deref().unwrap_or_default());
    let outcome = reconcile(&intent, &state.collection, &state.index);
    let expand = outcome
        .expand
        .and_then(|pos| state.collection.get(pos))
        .map(|entry| entry.id().clone());
    let results = outcome
        .subset
        .entries(&state.collection)
        .take(limit)
        .map(|entry| entry.id().clone())
        .collect();
    Ok(Json(RoutePayload {
        canonical: intent.token(),
        intent,
        breadcrumb: outcome.breadcrumb,
        expand,
        total: outcome.subset.len(),
        results,
    }))
}

fn parse_limit(limit: Option<usize>) -> Result<usize, ApiError> {
    match limit {
        None => Ok(DEFAULT_LIMIT),
        Some(0) => Err(ApiError::bad_request("`limit` must be at least 1")),
        Some(limit) => Ok(limit.min(MAX_LIMIT)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body, body::Body, http::Request};
    use serde_json::Value;
    use tower::ServiceExt;

    fn test_router() -> Router {
        let collection = Collection::new(vec![
            Entry::new("abetare")
                .with_definition("Libër për të mësuar shkronjat.", None)
                .with_facet(FacetKind::MorphClass, "emër"),
            Entry::new("abonoj").with_facet(FacetKind::MorphClass, "folje"),
            Entry::new("çelës").with_facet(FacetKind::MorphClass, "emër"),
            Entry::new("dal").with_facet(FacetKind::MorphClass, "folje"),
        ]);
        build_router(Arc::new(AppState::new(Arc::new(collection))))
    }

    async fn get_json(uri: &str) -> (StatusCode, Value) {
        let response = test_router()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn headwords(results: &Value) -> Vec<&str> {
        results
            .as_array()
            .unwrap()
            .iter()
            .map(|entry| entry["headword"].as_str().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn healthz_reports_size() {
        let (status, payload) = get_json("/healthz").await;
        assert!(status.is_success());
        assert_eq!(payload["entries"], 4);
    }

    #[tokio::test]
    async fn entries_filter_by_prefix_and_facet() {
        let (status, payload) = get_json("/api/entries?q=AB&morphClass=folje").await;
        assert!(status.is_success());
        assert_eq!(payload["total"], 1);
        assert_eq!(headwords(&payload["results"]), vec!["abonoj"]);
    }

    #[tokio::test]
    async fn entries_respect_limit() {
        let (_, payload) = get_json("/api/entries?limit=2").await;
        assert_eq!(payload["total"], 4);
        assert_eq!(headwords(&payload["results"]), vec!["abetare", "abonoj"]);
        let (status, payload) = get_json("/api/entries?limit=0").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(payload["error"].is_string());
    }

    #[tokio::test]
    async fn entry_lookup_normalizes_the_id() {
        let (status, payload) = get_json("/api/entry?id=%C3%87EL%C3%8BS").await;
        assert!(status.is_success());
        assert_eq!(payload["headword"], "çelës");
        assert_eq!(payload["id"], "celes");
    }

    #[tokio::test]
    async fn entry_errors() {
        let (status, _) = get_json("/api/entry").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, payload) = get_json("/api/entry?id=mungon").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(payload["error"].as_str().unwrap().contains("mungon"));
    }

    #[tokio::test]
    async fn facets_list_catalogue() {
        let (_, payload) = get_json("/api/facets").await;
        assert_eq!(payload["values"]["morphClass"], json!(["emër", "folje"]));
    }

    #[tokio::test]
    async fn letters_follow_query() {
        let (_, payload) = get_json("/api/letters").await;
        let letters: Vec<&str> = payload
            .as_array()
            .unwrap()
            .iter()
            .map(|row| row["letter"].as_str().unwrap())
            .collect();
        assert_eq!(letters, vec!["a", "c", "d"]);
        let (_, payload) = get_json("/api/letters?q=d").await;
        assert_eq!(payload, json!([{ "letter": "d", "count": 1, "first": "dal" }]));
    }

    #[tokio::test]
    async fn route_resolves_facet_links() {
        let (status, payload) = get_json("/api/route?token=facet%2FmorphClass%2Ffolje").await;
        assert!(status.is_success());
        assert_eq!(payload["intent"]["kind"], "showFacet");
        assert_eq!(payload["breadcrumb"]["label"], "Klasa morf.: folje");
        assert_eq!(payload["results"], json!(["abonoj", "dal"]));
    }

    #[tokio::test]
    async fn route_degrades_unknown_tokens() {
        let (status, payload) = get_json("/api/route?token=entry%2Fmungon").await;
        assert!(status.is_success());
        assert_eq!(payload["expand"], Value::Null);
        assert_eq!(payload["breadcrumb"], Value::Null);
        assert_eq!(payload["total"], 4);

        let (_, payload) = get_json("/api/route").await;
        assert_eq!(payload["intent"]["kind"], "none");
        assert_eq!(payload["canonical"], "");
    }
}
