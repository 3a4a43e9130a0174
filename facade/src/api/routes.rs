use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use common::channel::{ChannelType, normalize_identifier};
use common::storage::SnapshotStore;
use common::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::warn;
use uuid::Uuid;

use super::models::{ApiResponse, ChannelView, HealthStatus, PaginatedResponse, Pagination, SearchParams};
use crate::gateway::SearchQuery;
use crate::services::{AppError, ResolutionEngine, ResolutionOutcome, SearchOutcome};

const DEFAULT_PAGE_SIZE: u32 = 10;
const MAX_PAGE_SIZE: u32 = 100;

static ISSN_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{3}[\dxX]$").expect("Invalid ISSN regex"));

static YEAR_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}$").expect("Invalid year regex"));

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ResolutionEngine>,
    pub cache: Arc<dyn SnapshotStore>,
    pub request_timeout: Duration,
    /// Cancelled on shutdown; every request works on a child of it.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Runs `work` under the request deadline. Timeouts surface as [`Error::Cancelled`].
    async fn within_deadline<T>(
        &self,
        cancel: &CancellationToken,
        work: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.request_timeout, work).await {
            Ok(result) => result,
            Err(_) => {
                cancel.cancel();
                warn!(timeout_ms = self.request_timeout.as_millis() as u64, "Request deadline exceeded");
                Err(Error::Cancelled)
            }
        }
    }
}

fn parse_channel_type(raw: &str) -> std::result::Result<ChannelType, AppError> {
    ChannelType::from_external_segment(raw)
        .ok_or_else(|| AppError::bad_request(format!("Unknown channel type: {}", raw)))
}

/// Accepts any UUID spelling and returns the hyphenated form the cache is keyed by.
fn parse_identifier(raw: &str) -> std::result::Result<String, AppError> {
    Uuid::parse_str(raw.trim())
        .map(|uuid| normalize_identifier(&uuid.hyphenated().to_string()))
        .map_err(|_| AppError::bad_request(format!("Identifier is not a UUID: {}", raw)))
}

fn parse_year(raw: &str) -> std::result::Result<i32, AppError> {
    if !YEAR_REGEX.is_match(raw) {
        return Err(AppError::bad_request(format!("Invalid year: {}", raw)));
    }
    raw.parse::<i32>()
        .map_err(|_| AppError::bad_request(format!("Invalid year: {}", raw)))
}

fn parse_count(field: &str, raw: Option<&str>, default: u32) -> std::result::Result<u32, AppError> {
    match raw.map(str::trim).filter(|raw| !raw.is_empty()) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<u32>()
            .map_err(|_| AppError::bad_request(format!("Invalid {}: {}", field, raw))),
    }
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(ApiResponse::<()>::error(message))).into_response()
}

pub async fn health(State(state): State<AppState>) -> Json<ApiResponse<HealthStatus>> {
    let cache = match state.cache.check_available().await {
        Ok(()) => "available",
        Err(e) => {
            warn!(error = %e, "Snapshot cache unavailable");
            "unavailable"
        }
    };

    Json(ApiResponse::success(HealthStatus {
        status: "ok",
        cache,
    }))
}

pub async fn fetch_channel(
    State(state): State<AppState>,
    Path((channel_type, identifier)): Path<(String, String)>,
) -> std::result::Result<Response, AppError> {
    resolve_channel(&state, &channel_type, &identifier, None).await
}

pub async fn fetch_channel_for_year(
    State(state): State<AppState>,
    Path((channel_type, identifier, year)): Path<(String, String, String)>,
) -> std::result::Result<Response, AppError> {
    let year = parse_year(&year)?;
    resolve_channel(&state, &channel_type, &identifier, Some(year)).await
}

async fn resolve_channel(
    state: &AppState,
    channel_type: &str,
    identifier: &str,
    year: Option<i32>,
) -> std::result::Result<Response, AppError> {
    let channel_type = parse_channel_type(channel_type)?;
    let identifier = parse_identifier(identifier)?;

    let cancel = state.shutdown.child_token();
    let outcome = state
        .within_deadline(
            &cancel,
            state.engine.resolve(channel_type, &identifier, year, &cancel),
        )
        .await?;

    Ok(match outcome {
        ResolutionOutcome::Found(snapshot) => Json(ApiResponse::success(ChannelView::new(
            snapshot,
            year,
            state.engine.uris(),
        )))
        .into_response(),
        ResolutionOutcome::NotFound => error_response(
            StatusCode::NOT_FOUND,
            format!("No {} with identifier {}", channel_type, identifier),
        ),
        ResolutionOutcome::MovedTo { location, .. } => (
            StatusCode::MOVED_PERMANENTLY,
            [(header::LOCATION, location.to_string())],
        )
            .into_response(),
        ResolutionOutcome::Rejected { status, body } => error_response(
            StatusCode::BAD_REQUEST,
            format!("Registry rejected the request ({}): {}", status, body),
        ),
        ResolutionOutcome::UpstreamUnavailable(failure) => {
            error_response(StatusCode::BAD_GATEWAY, failure.to_string())
        }
    })
}

pub async fn search_channels(
    State(state): State<AppState>,
    Path(channel_type): Path<String>,
    Query(params): Query<SearchParams>,
) -> std::result::Result<Response, AppError> {
    let channel_type = parse_channel_type(&channel_type)?;

    if let Some(issn) = &params.issn {
        if !ISSN_REGEX.is_match(issn) {
            return Err(AppError::bad_request(format!("Invalid ISSN: {}", issn)));
        }
    }
    let year = params.year.as_deref().map(parse_year).transpose()?;
    let offset = parse_count("offset", params.offset.as_deref(), 0)?;
    let size = parse_count("size", params.size.as_deref(), DEFAULT_PAGE_SIZE)?;

    let query = SearchQuery {
        name: params.name.filter(|name| !name.trim().is_empty()),
        issn: params.issn,
        year,
        offset,
        size: size.clamp(1, MAX_PAGE_SIZE),
    };

    let cancel = state.shutdown.child_token();
    let outcome = state
        .within_deadline(&cancel, state.engine.search(channel_type, &query, &cancel))
        .await?;

    Ok(match outcome {
        SearchOutcome::Page(page) => {
            let has_more = u64::from(page.offset) + (page.hits.len() as u64) < page.total;
            let views: Vec<ChannelView> = page
                .hits
                .into_iter()
                .map(|snapshot| ChannelView::new(snapshot, year, state.engine.uris()))
                .collect();

            Json(ApiResponse::success(PaginatedResponse {
                data: views,
                pagination: Pagination {
                    offset: page.offset,
                    limit: page.size,
                    total: page.total,
                    has_more,
                },
            }))
            .into_response()
        }
        SearchOutcome::Rejected { status, body } => error_response(
            StatusCode::BAD_REQUEST,
            format!("Registry rejected the request ({}): {}", status, body),
        ),
        SearchOutcome::UpstreamUnavailable(failure) => {
            error_response(StatusCode::BAD_GATEWAY, failure.to_string())
        }
    })
}

pub async fn unknown_route() -> Response {
    error_response(StatusCode::NOT_FOUND, "Unknown route".to_string())
}

// Define all API routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/{channel_type}", get(search_channels))
        .route("/{channel_type}/{identifier}", get(fetch_channel))
        .route("/{channel_type}/{identifier}/{year}", get(fetch_channel_for_year))
        .fallback(unknown_route)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testing::{ScriptedGateway, raw_channel};
    use crate::gateway::{GatewayResponse, RawSearchPage};
    use crate::services::UriRewriter;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use common::channel::ChannelSnapshot;
    use common::config::ResolutionMode;
    use common::storage::ObjectSnapshotStore;
    use object_store::memory::InMemory;
    use serde_json::Value;
    use tower::ServiceExt;
    use url::Url;

    const ID: &str = "0f1e2d3c-4b5a-4978-8695-a4b3c2d1e0f9";

    fn app_with(
        gateway: ScriptedGateway,
        cache: Arc<dyn SnapshotStore>,
        mode: ResolutionMode,
        request_timeout: Duration,
    ) -> Router {
        let uris = UriRewriter::new(Url::parse("https://api.example.org/channels").unwrap())
            .unwrap();
        let engine = ResolutionEngine::new(Arc::new(gateway), cache.clone(), mode, uris);
        routes(AppState {
            engine: Arc::new(engine),
            cache,
            request_timeout,
            shutdown: CancellationToken::new(),
        })
    }

    fn app(gateway: ScriptedGateway) -> Router {
        app_with(
            gateway,
            Arc::new(ObjectSnapshotStore::new(Arc::new(InMemory::new()), "channels")),
            ResolutionMode::LiveWithFallback,
            Duration::from_secs(5),
        )
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    #[tokio::test]
    async fn test_found_channel_renders_view() {
        let app = app(ScriptedGateway::fetching(GatewayResponse::Found(raw_channel(
            ID, "Acta",
        ))));

        let (status, body) = get_json(app, &format!("/journal/{}/2024", ID)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        let data = &body["data"];
        assert_eq!(
            data["id"],
            format!("https://api.example.org/channels/journal/{}/2024", ID.to_uppercase())
        );
        assert_eq!(data["type"], "journal");
        assert_eq!(data["year"], 2024);
        assert_eq!(data["scientificValue"], "LevelTwo");
        assert_eq!(data["printIssn"], "1234-5678");
        assert_eq!(data["sameAs"], "https://channel.example.org/");
    }

    #[tokio::test]
    async fn test_year_without_record_is_unassigned() {
        let app = app(ScriptedGateway::fetching(GatewayResponse::Found(raw_channel(
            ID, "Acta",
        ))));

        let (status, body) = get_json(app, &format!("/series/{}/2019", ID)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["scientificValue"], "Unassigned");
    }

    #[tokio::test]
    async fn test_invalid_path_parts_are_bad_requests() {
        let gateway = || ScriptedGateway::fetching(GatewayResponse::NotFound);

        let (status, body) = get_json(app(gateway()), "/journal/not-a-uuid/2024").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (status, _) = get_json(app(gateway()), &format!("/journal/{}/24", ID)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = get_json(app(gateway()), &format!("/magazine/{}", ID)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_not_found() {
        let (status, body) = get_json(
            app(ScriptedGateway::fetching(GatewayResponse::NotFound)),
            &format!("/publisher/{}", ID),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_moved_channel_redirects_into_facade() {
        let app = app(ScriptedGateway::fetching(GatewayResponse::Moved(
            "https://upstream/findjournal/NEW-ID/2024".to_string(),
        )));

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/journal/{}/2024", ID))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(
            response.headers()[header::LOCATION],
            "https://api.example.org/channels/journal/NEW-ID/2024"
        );
    }

    #[tokio::test]
    async fn test_upstream_failure_without_cache_is_bad_gateway() {
        let (status, body) = get_json(
            app(ScriptedGateway::fetching(GatewayResponse::ServerError {
                status: 500,
                body: "boom".to_string(),
            })),
            &format!("/journal/{}/2024", ID),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().contains("500"));
    }

    #[tokio::test]
    async fn test_upstream_failure_with_cache_serves_snapshot() {
        let cache = Arc::new(ObjectSnapshotStore::new(Arc::new(InMemory::new()), "channels"));
        cache
            .put_all(
                ChannelType::Journal,
                &[ChannelSnapshot::new(ChannelType::Journal, ID, "Cached")],
            )
            .await
            .unwrap();
        let app = app_with(
            ScriptedGateway::fetching(GatewayResponse::TransportFailure("reset".to_string())),
            cache,
            ResolutionMode::LiveWithFallback,
            Duration::from_secs(5),
        );

        let (status, body) = get_json(app, &format!("/journal/{}", ID)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["name"], "Cached");
        assert_eq!(body["data"]["year"], Value::Null);
    }

    #[tokio::test]
    async fn test_slow_registry_times_out() {
        let app = app_with(
            ScriptedGateway::fetching(GatewayResponse::NotFound).delayed(Duration::from_secs(30)),
            Arc::new(ObjectSnapshotStore::new(Arc::new(InMemory::new()), "channels")),
            ResolutionMode::LiveWithFallback,
            Duration::from_millis(50),
        );

        let (status, body) = get_json(app, &format!("/journal/{}/2024", ID)).await;

        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_search_caps_page_size() {
        let app = app(ScriptedGateway::searching(GatewayResponse::Found(RawSearchPage {
            total: 250,
            hits: vec![raw_channel(ID, "Acta")],
        })));

        let (status, body) = get_json(app, "/journal?name=acta&size=500&offset=100").await;

        assert_eq!(status, StatusCode::OK);
        let page = &body["data"];
        assert_eq!(page["pagination"]["limit"], 100);
        assert_eq!(page["pagination"]["offset"], 100);
        assert_eq!(page["pagination"]["total"], 250);
        assert_eq!(page["pagination"]["has_more"], true);
        assert_eq!(page["data"][0]["name"], "Acta");
    }

    #[tokio::test]
    async fn test_search_rejects_malformed_issn() {
        let (status, _) = get_json(
            app(ScriptedGateway::searching(GatewayResponse::NotFound)),
            "/journal?issn=12345678",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = get_json(
            app(ScriptedGateway::searching(GatewayResponse::NotFound)),
            "/journal?issn=1234-567X",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["pagination"]["total"], 0);
    }

    #[tokio::test]
    async fn test_unhyphenated_identifier_hits_cached_snapshot() {
        let cache = Arc::new(ObjectSnapshotStore::new(Arc::new(InMemory::new()), "channels"));
        cache
            .put_all(
                ChannelType::Journal,
                &[ChannelSnapshot::new(ChannelType::Journal, ID, "Cached")],
            )
            .await
            .unwrap();
        let app = app_with(
            ScriptedGateway::fetching(GatewayResponse::ServerError {
                status: 503,
                body: "down".to_string(),
            }),
            cache,
            ResolutionMode::LiveWithFallback,
            Duration::from_secs(5),
        );

        let (status, body) = get_json(app, &format!("/journal/{}/2024", ID.replace('-', ""))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["name"], "Cached");
        assert_eq!(body["data"]["identifier"], ID.to_uppercase());
        assert_eq!(
            body["data"]["id"],
            format!("https://api.example.org/channels/journal/{}/2024", ID.to_uppercase())
        );
    }

    #[test]
    fn test_identifier_spellings_are_canonicalized() {
        let canonical = ID.to_uppercase();
        for raw in [
            ID.to_string(),
            ID.replace('-', ""),
            format!("urn:uuid:{}", ID),
            format!("{{{}}}", ID),
        ] {
            assert_eq!(parse_identifier(&raw).ok(), Some(canonical.clone()));
        }
    }

    #[tokio::test]
    async fn test_search_rejects_non_numeric_paging_with_envelope() {
        for uri in ["/journal?offset=ten", "/journal?size=-1"] {
            let (status, body) = get_json(
                app(ScriptedGateway::searching(GatewayResponse::NotFound)),
                uri,
            )
            .await;

            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["success"], false);
            assert!(body["error"].is_string());
        }
    }

    #[tokio::test]
    async fn test_unknown_route_uses_envelope() {
        let (status, body) = get_json(
            app(ScriptedGateway::fetching(GatewayResponse::NotFound)),
            &format!("/journal/{}/2024/extra", ID),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Unknown route");
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get_json(
            app(ScriptedGateway::fetching(GatewayResponse::NotFound)),
            "/health",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "ok");
        assert_eq!(body["data"]["cache"], "available");
    }
}
