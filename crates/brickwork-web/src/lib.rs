//! Axum JSON API over the browse surfaces and report drafts.
//!
//! Each browse handler fetches its collection, runs the shared geo-filter
//! engine client-side, applies an explicit sort, and pages the result. Read
//! failures clear the list; write failures surface a retryable message with
//! timeouts called out separately.

use std::sync::Arc;

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use brickwork_client::{ApiError, Catalog, DraftStore, ListParams, NewBid, SessionProvider};
use brickwork_core::FILTER_ALL;
use brickwork_search::{apply, sort_desc_by, GeoPoint, ListFilter, Matched};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::warn;
use uuid::Uuid;

pub const CRATE_NAME: &str = "brickwork-web";

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<dyn Catalog>,
    pub drafts: Arc<dyn DraftStore>,
    pub session: Arc<dyn SessionProvider>,
}

#[derive(Debug, Deserialize, Default)]
struct BrowseQuery {
    q: Option<String>,
    kind: Option<String>,
    specialization: Option<String>,
    currency: Option<String>,
    service_type: Option<String>,
    status: Option<String>,
    lat: Option<f64>,
    lng: Option<f64>,
    radius_km: Option<f64>,
    page: Option<usize>,
    per_page: Option<usize>,
}

impl BrowseQuery {
    fn filter(&self, categoricals: &[(&str, &Option<String>)]) -> ListFilter {
        let mut filter = ListFilter::new().with_text(self.q.clone().unwrap_or_default());
        for (field, value) in categoricals {
            if let Some(value) = value {
                if value != FILTER_ALL {
                    filter = filter.with_categorical(*field, value.clone());
                }
            }
        }
        if let (Some(lat), Some(lng)) = (self.lat, self.lng) {
            filter = filter.with_center(GeoPoint { lat, lng }, self.radius_km.unwrap_or(50.0));
        }
        filter
    }
}

#[derive(Debug, Serialize)]
struct BrowseRow<T: Serialize> {
    #[serde(flatten)]
    entity: T,
    distance_km: Option<f64>,
}

#[derive(Debug, Serialize)]
struct PageResponse<T: Serialize> {
    rows: Vec<BrowseRow<T>>,
    page: usize,
    total_pages: usize,
}

#[derive(Debug, Deserialize)]
struct BidBody {
    amount: i64,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReportQuery {
    inspector_id: Uuid,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/professionals", get(professionals_handler))
        .route("/properties", get(properties_handler))
        .route("/jobs", get(jobs_handler))
        .route("/jobs/{id}/bids", post(place_bid_handler))
        .route("/jobs/{id}/report", get(report_draft_handler))
        .with_state(Arc::new(state))
}

pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    axum::serve(listener, app(state)).await?;
    Ok(())
}

fn paginate<T: Clone + Serialize>(
    matches: Vec<Matched<'_, T>>,
    query: &BrowseQuery,
) -> PageResponse<T> {
    let per_page = query.per_page.unwrap_or(20).max(1);
    let total_pages = matches.len().max(1).div_ceil(per_page);
    let page = query.page.unwrap_or(1).clamp(1, total_pages);
    let start = (page - 1) * per_page;
    let rows = matches
        .into_iter()
        .skip(start)
        .take(per_page)
        .map(|m| BrowseRow {
            entity: m.entity.clone(),
            distance_km: m.distance_km,
        })
        .collect();
    PageResponse {
        rows,
        page,
        total_pages,
    }
}

/// Read failures clear the list rather than erroring the page; there is no
/// automatic retry.
fn read_failure(err: ApiError) -> Response {
    warn!(error = %err, "collection read failed; returning cleared list");
    (
        StatusCode::BAD_GATEWAY,
        Json(json!({ "rows": [], "error": "backend_unavailable" })),
    )
        .into_response()
}

fn write_failure(err: ApiError) -> Response {
    let (code, message) = match err {
        ApiError::Timeout => (
            StatusCode::GATEWAY_TIMEOUT,
            "the backend timed out; please try again",
        ),
        _ => (StatusCode::BAD_GATEWAY, "saving failed; please try again"),
    };
    warn!(error = %err, "write to backend failed");
    (code, Json(json!({ "error": message }))).into_response()
}

async fn professionals_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BrowseQuery>,
) -> Response {
    let params = ListParams::new().order_desc("created_at");
    match state.catalog.list_professionals(&params).await {
        Ok(rows) => {
            let filter = query.filter(&[
                ("kind", &query.kind),
                ("specialization", &query.specialization),
            ]);
            let mut matches = apply(&rows, &filter);
            // Explicit sort, separate from the filter.
            sort_desc_by(&mut matches, |p| p.rating.unwrap_or(0.0));
            Json(paginate(matches, &query)).into_response()
        }
        Err(err) => read_failure(err),
    }
}

async fn properties_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BrowseQuery>,
) -> Response {
    let params = ListParams::new().order_desc("created_at");
    match state.catalog.list_properties(&params).await {
        Ok(rows) => {
            let filter = query.filter(&[("currency", &query.currency)]);
            let matches = apply(&rows, &filter);
            Json(paginate(matches, &query)).into_response()
        }
        Err(err) => read_failure(err),
    }
}

async fn jobs_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BrowseQuery>,
) -> Response {
    let params = ListParams::new().order_desc("created_at");
    match state.catalog.list_jobs(&params).await {
        Ok(rows) => {
            let filter = query.filter(&[
                ("service_type", &query.service_type),
                ("status", &query.status),
            ]);
            let matches = apply(&rows, &filter);
            Json(paginate(matches, &query)).into_response()
        }
        Err(err) => read_failure(err),
    }
}

async fn place_bid_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(job_id): AxumPath<Uuid>,
    Json(body): Json<BidBody>,
) -> Response {
    // Validation errors never reach the backend.
    if body.amount <= 0 {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": "bid amount must be positive" })),
        )
            .into_response();
    }
    let bid = NewBid {
        job_id,
        inspector_id: state.session.user_id(),
        amount: body.amount,
        message: body.message.unwrap_or_default(),
    };
    match state.catalog.place_bid(&bid).await {
        Ok(created) => (StatusCode::CREATED, Json(created)).into_response(),
        Err(err) => write_failure(err),
    }
}

async fn report_draft_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(job_id): AxumPath<Uuid>,
    Query(query): Query<ReportQuery>,
) -> Response {
    match state.drafts.fetch_draft(job_id, query.inspector_id).await {
        Ok(Some(draft)) => Json(draft).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "no report draft for this job and inspector" })),
        )
            .into_response(),
        Err(err) => read_failure(err),
    }
}
