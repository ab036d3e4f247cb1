//! Typed access to the hosted backend's REST surface, plus an in-memory
//! backend used by tests and the demo CLI.
//!
//! All reads and writes go through one [`BackendClient`]; the timeout policy
//! lives in [`ClientPolicy`] and nothing in this crate retries automatically.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use brickwork_core::{
    Bid, InspectionJob, JobStatus, Professional, Property, ReportDraft,
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "brickwork-client";

/// Source of the bearer token and acting user for every backend call.
/// Swappable so nothing parses string-keyed session storage.
pub trait SessionProvider: Send + Sync {
    fn access_token(&self) -> String;
    fn user_id(&self) -> Uuid;
}

#[derive(Debug, Clone)]
pub struct StaticSession {
    pub token: String,
    pub user: Uuid,
}

impl SessionProvider for StaticSession {
    fn access_token(&self) -> String {
        self.token.clone()
    }

    fn user_id(&self) -> Uuid {
        self.user
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("backend request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("backend returned {code}: {body}")]
    Status { code: u16, body: String },
    #[error("failed to decode backend response: {0}")]
    Decode(String),
    #[error("report is already submitted")]
    DraftSubmitted,
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

/// Centralized request policy. Retries default to zero: recovery is a
/// manual user-initiated repeat, and the report-write path never retries.
#[derive(Debug, Clone, Copy)]
pub struct ClientPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
}

impl Default for ClientPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            max_retries: 0,
        }
    }
}

/// Backend-side list parameters: equality filters, substring search, and
/// ordering/paging by a timestamp field, encoded as query-string pairs.
#[derive(Debug, Clone, Default)]
pub struct ListParams {
    pub equals: Vec<(String, String)>,
    pub search: Option<String>,
    pub order_desc_by: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ListParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_equals(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.equals.push((field.into(), value.into()));
        self
    }

    pub fn with_search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    pub fn order_desc(mut self, field: impl Into<String>) -> Self {
        self.order_desc_by = Some(field.into());
        self
    }

    pub fn paged(mut self, limit: u32, offset: u32) -> Self {
        self.limit = Some(limit);
        self.offset = Some(offset);
        self
    }

    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self.equals.clone();
        if let Some(search) = &self.search {
            pairs.push(("q".to_string(), search.clone()));
        }
        if let Some(field) = &self.order_desc_by {
            pairs.push(("order".to_string(), format!("{field}.desc")));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(offset) = self.offset {
            pairs.push(("offset".to_string(), offset.to_string()));
        }
        pairs
    }
}

/// New bid payload; the backend assigns id and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBid {
    pub job_id: Uuid,
    pub inspector_id: Uuid,
    pub amount: i64,
    pub message: String,
}

/// Read access to the three browsable collections, plus bid placement.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn list_professionals(&self, params: &ListParams) -> Result<Vec<Professional>, ApiError>;
    async fn list_properties(&self, params: &ListParams) -> Result<Vec<Property>, ApiError>;
    async fn list_jobs(&self, params: &ListParams) -> Result<Vec<InspectionJob>, ApiError>;
    async fn place_bid(&self, bid: &NewBid) -> Result<Bid, ApiError>;
}

/// Single-row upsert-by-key interface for report drafts: insert when no
/// prior key exists, update against the known id afterwards.
#[async_trait]
pub trait DraftStore: Send + Sync {
    async fn insert_draft(&self, draft: &ReportDraft) -> Result<Uuid, ApiError>;
    async fn update_draft(&self, id: Uuid, draft: &ReportDraft) -> Result<(), ApiError>;
    async fn fetch_draft(
        &self,
        job_id: Uuid,
        inspector_id: Uuid,
    ) -> Result<Option<ReportDraft>, ApiError>;
}

/// Side effects of report submission on the owning job. Both are invoked
/// after the report write and fail independently of it.
#[async_trait]
pub trait JobSignals: Send + Sync {
    async fn transition_job_status(&self, job_id: Uuid, status: JobStatus) -> Result<(), ApiError>;

    /// Fire-and-forget notification to the job's requester; failure is
    /// logged, never surfaced to the submitting user.
    fn notify_requester(&self, job_id: Uuid, requester_id: Uuid, message: String);
}

#[derive(Debug, Clone, Serialize)]
struct NotificationPayload {
    job_id: Uuid,
    recipient_id: Uuid,
    message: String,
}

#[derive(Debug, Deserialize)]
struct InsertedRow {
    id: Uuid,
}

/// The hosted backend answers 409 on writes against a submitted draft.
/// Only the draft-update path reads that as [`ApiError::DraftSubmitted`];
/// a 409 elsewhere stays a plain status error.
fn draft_conflict(err: ApiError) -> ApiError {
    match err {
        ApiError::Status { code: 409, .. } => ApiError::DraftSubmitted,
        other => other,
    }
}

/// The one HTTP path to the hosted backend. JSON over HTTPS with a bearer
/// token from the [`SessionProvider`]; resource-per-collection routes with
/// query-string filters.
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    session: std::sync::Arc<dyn SessionProvider>,
}

impl BackendClient {
    pub fn new(
        base_url: impl Into<String>,
        policy: ClientPolicy,
        session: std::sync::Arc<dyn SessionProvider>,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(policy.timeout)
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
        })
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/rest/{collection}", self.base_url)
    }

    fn row_url(&self, collection: &str, id: Uuid) -> String {
        format!("{}/rest/{collection}/{id}", self.base_url)
    }

    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(ApiError::Status {
            code: status.as_u16(),
            body,
        })
    }

    async fn get_list<T: DeserializeOwned>(
        &self,
        collection: &str,
        params: &ListParams,
    ) -> Result<Vec<T>, ApiError> {
        let resp = self
            .http
            .get(self.collection_url(collection))
            .query(&params.query_pairs())
            .bearer_auth(self.session.access_token())
            .send()
            .await?;
        let resp = Self::check_status(resp).await?;
        let rows = resp.json::<Vec<T>>().await?;
        info!(collection, rows = rows.len(), "fetched collection page");
        Ok(rows)
    }
}

#[async_trait]
impl Catalog for BackendClient {
    async fn list_professionals(&self, params: &ListParams) -> Result<Vec<Professional>, ApiError> {
        self.get_list("professionals", params).await
    }

    async fn list_properties(&self, params: &ListParams) -> Result<Vec<Property>, ApiError> {
        self.get_list("properties", params).await
    }

    async fn list_jobs(&self, params: &ListParams) -> Result<Vec<InspectionJob>, ApiError> {
        self.get_list("inspection_jobs", params).await
    }

    async fn place_bid(&self, bid: &NewBid) -> Result<Bid, ApiError> {
        let resp = self
            .http
            .post(self.collection_url("bids"))
            .bearer_auth(self.session.access_token())
            .json(bid)
            .send()
            .await?;
        let resp = Self::check_status(resp).await?;
        let created = resp.json::<Bid>().await?;
        info!(job_id = %bid.job_id, bid_id = %created.id, "bid placed");
        Ok(created)
    }
}

#[async_trait]
impl DraftStore for BackendClient {
    async fn insert_draft(&self, draft: &ReportDraft) -> Result<Uuid, ApiError> {
        let resp = self
            .http
            .post(self.collection_url("report_drafts"))
            .bearer_auth(self.session.access_token())
            .json(draft)
            .send()
            .await?;
        let resp = Self::check_status(resp).await?;
        let row = resp.json::<InsertedRow>().await?;
        info!(job_id = %draft.job_id, draft_id = %row.id, "report draft created");
        Ok(row.id)
    }

    async fn update_draft(&self, id: Uuid, draft: &ReportDraft) -> Result<(), ApiError> {
        let resp = self
            .http
            .patch(self.row_url("report_drafts", id))
            .bearer_auth(self.session.access_token())
            .json(draft)
            .send()
            .await?;
        Self::check_status(resp).await.map_err(draft_conflict)?;
        Ok(())
    }

    async fn fetch_draft(
        &self,
        job_id: Uuid,
        inspector_id: Uuid,
    ) -> Result<Option<ReportDraft>, ApiError> {
        let params = ListParams::new()
            .with_equals("job_id", job_id.to_string())
            .with_equals("inspector_id", inspector_id.to_string());
        let rows: Vec<ReportDraft> = self.get_list("report_drafts", &params).await?;
        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl JobSignals for BackendClient {
    async fn transition_job_status(&self, job_id: Uuid, status: JobStatus) -> Result<(), ApiError> {
        let resp = self
            .http
            .patch(self.row_url("inspection_jobs", job_id))
            .bearer_auth(self.session.access_token())
            .json(&serde_json::json!({ "status": status }))
            .send()
            .await?;
        Self::check_status(resp).await?;
        info!(%job_id, status = status.as_str(), "job status advanced");
        Ok(())
    }

    fn notify_requester(&self, job_id: Uuid, requester_id: Uuid, message: String) {
        let http = self.http.clone();
        let url = self.collection_url("notifications");
        let token = self.session.access_token();
        let payload = NotificationPayload {
            job_id,
            recipient_id: requester_id,
            message,
        };
        tokio::spawn(async move {
            let result = http
                .post(url)
                .bearer_auth(token)
                .json(&payload)
                .send()
                .await;
            match result {
                Ok(resp) if resp.status().is_success() => {}
                Ok(resp) => warn!(
                    %job_id,
                    code = resp.status().as_u16(),
                    "requester notification rejected"
                ),
                Err(err) => warn!(%job_id, error = %err, "requester notification failed"),
            }
        });
    }
}

/// In-process backend with the same contracts, used by tests and the demo
/// CLI. Enforces the submitted-draft guard and the one-open-draft-per-pair
/// rule the hosted backend applies.
#[derive(Default)]
pub struct MemoryBackend {
    professionals: Mutex<Vec<Professional>>,
    properties: Mutex<Vec<Property>>,
    jobs: Mutex<Vec<InspectionJob>>,
    bids: Mutex<Vec<Bid>>,
    drafts: Mutex<HashMap<Uuid, ReportDraft>>,
    insert_count: AtomicUsize,
    notifications: Mutex<Vec<(Uuid, Uuid, String)>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_professionals(&self, rows: Vec<Professional>) {
        self.professionals
            .lock()
            .expect("professionals lock poisoned")
            .extend(rows);
    }

    pub fn seed_properties(&self, rows: Vec<Property>) {
        self.properties
            .lock()
            .expect("properties lock poisoned")
            .extend(rows);
    }

    pub fn seed_jobs(&self, rows: Vec<InspectionJob>) {
        self.jobs.lock().expect("jobs lock poisoned").extend(rows);
    }

    /// Number of draft inserts ever performed. A session that works
    /// correctly produces exactly one per `(job, inspector)` pair.
    pub fn draft_insert_count(&self) -> usize {
        self.insert_count.load(Ordering::SeqCst)
    }

    pub fn notifications(&self) -> Vec<(Uuid, Uuid, String)> {
        self.notifications
            .lock()
            .expect("notifications lock poisoned")
            .clone()
    }

    pub fn job(&self, id: Uuid) -> Option<InspectionJob> {
        self.jobs
            .lock()
            .expect("jobs lock poisoned")
            .iter()
            .find(|j| j.id == id)
            .cloned()
    }

    fn page<T: Clone>(rows: &[T], params: &ListParams) -> Vec<T> {
        let offset = params.offset.unwrap_or(0) as usize;
        let limit = params.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        rows.iter().skip(offset).take(limit).cloned().collect()
    }

    /// Mirrors the hosted backend's query semantics: every `equals` pair
    /// must match the serialized field, and `search` is a case-insensitive
    /// substring over the row's top-level string fields.
    fn matches_params<T: Serialize>(row: &T, params: &ListParams) -> bool {
        if params.equals.is_empty() && params.search.is_none() {
            return true;
        }
        let value = serde_json::to_value(row).unwrap_or(serde_json::Value::Null);
        for (field, wanted) in &params.equals {
            let hit = match value.get(field) {
                Some(serde_json::Value::String(s)) => s == wanted,
                Some(other) => other.to_string() == *wanted,
                None => false,
            };
            if !hit {
                return false;
            }
        }
        if let Some(needle) = &params.search {
            let needle = needle.to_lowercase();
            let found = value.as_object().is_some_and(|map| {
                map.values()
                    .any(|v| v.as_str().is_some_and(|s| s.to_lowercase().contains(&needle)))
            });
            if !found {
                return false;
            }
        }
        true
    }
}

#[async_trait]
impl Catalog for MemoryBackend {
    async fn list_professionals(&self, params: &ListParams) -> Result<Vec<Professional>, ApiError> {
        let mut rows = self
            .professionals
            .lock()
            .expect("professionals lock poisoned")
            .clone();
        rows.retain(|r| Self::matches_params(r, params));
        if params.order_desc_by.as_deref() == Some("created_at") {
            rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        }
        Ok(Self::page(&rows, params))
    }

    async fn list_properties(&self, params: &ListParams) -> Result<Vec<Property>, ApiError> {
        let mut rows = self
            .properties
            .lock()
            .expect("properties lock poisoned")
            .clone();
        rows.retain(|r| Self::matches_params(r, params));
        if params.order_desc_by.as_deref() == Some("created_at") {
            rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        }
        Ok(Self::page(&rows, params))
    }

    async fn list_jobs(&self, params: &ListParams) -> Result<Vec<InspectionJob>, ApiError> {
        let mut rows = self.jobs.lock().expect("jobs lock poisoned").clone();
        rows.retain(|r| Self::matches_params(r, params));
        if params.order_desc_by.as_deref() == Some("created_at") {
            rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        }
        Ok(Self::page(&rows, params))
    }

    async fn place_bid(&self, bid: &NewBid) -> Result<Bid, ApiError> {
        let created = Bid {
            id: Uuid::new_v4(),
            job_id: bid.job_id,
            inspector_id: bid.inspector_id,
            amount: bid.amount,
            message: bid.message.clone(),
            created_at: Utc::now(),
        };
        self.bids
            .lock()
            .expect("bids lock poisoned")
            .push(created.clone());
        Ok(created)
    }
}

#[async_trait]
impl DraftStore for MemoryBackend {
    async fn insert_draft(&self, draft: &ReportDraft) -> Result<Uuid, ApiError> {
        let mut drafts = self.drafts.lock().expect("drafts lock poisoned");
        let duplicate = drafts.values().any(|d| {
            d.job_id == draft.job_id && d.inspector_id == draft.inspector_id && !d.is_submitted()
        });
        if duplicate {
            return Err(ApiError::Status {
                code: 409,
                body: "open draft already exists for this job and inspector".to_string(),
            });
        }
        let id = Uuid::new_v4();
        let mut stored = draft.clone();
        stored.id = Some(id);
        stored.last_saved_at = Some(Utc::now());
        drafts.insert(id, stored);
        self.insert_count.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn update_draft(&self, id: Uuid, draft: &ReportDraft) -> Result<(), ApiError> {
        let mut drafts = self.drafts.lock().expect("drafts lock poisoned");
        let existing = drafts.get_mut(&id).ok_or(ApiError::Status {
            code: 404,
            body: "draft not found".to_string(),
        })?;
        if existing.is_submitted() {
            return Err(ApiError::DraftSubmitted);
        }
        let mut stored = draft.clone();
        stored.id = Some(id);
        stored.last_saved_at = Some(Utc::now());
        *existing = stored;
        Ok(())
    }

    async fn fetch_draft(
        &self,
        job_id: Uuid,
        inspector_id: Uuid,
    ) -> Result<Option<ReportDraft>, ApiError> {
        let drafts = self.drafts.lock().expect("drafts lock poisoned");
        Ok(drafts
            .values()
            .find(|d| d.job_id == job_id && d.inspector_id == inspector_id)
            .cloned())
    }
}

#[async_trait]
impl JobSignals for MemoryBackend {
    async fn transition_job_status(&self, job_id: Uuid, status: JobStatus) -> Result<(), ApiError> {
        let mut jobs = self.jobs.lock().expect("jobs lock poisoned");
        let job = jobs.iter_mut().find(|j| j.id == job_id).ok_or(ApiError::Status {
            code: 404,
            body: "job not found".to_string(),
        })?;
        if !job.status.can_advance_to(status) {
            return Err(ApiError::Status {
                code: 422,
                body: format!(
                    "cannot move job from {} to {}",
                    job.status.as_str(),
                    status.as_str()
                ),
            });
        }
        job.status = status;
        Ok(())
    }

    fn notify_requester(&self, job_id: Uuid, requester_id: Uuid, message: String) {
        self.notifications
            .lock()
            .expect("notifications lock poisoned")
            .push((job_id, requester_id, message));
    }
}
