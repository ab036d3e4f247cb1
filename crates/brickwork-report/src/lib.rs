//! Report draft lifecycle: a single mutable draft per `(job, inspector)`
//! created lazily on first persist, autosaved on a fixed cadence, and
//! transitioned to submitted exactly once under explicit confirmation.
//!
//! States run `NotCreated -> Draft -> Submitted` with no reverse edges.
//! Persists never overlap: an autosave tick that fires while another write
//! is outstanding is dropped, not queued.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use brickwork_client::{ApiError, DraftStore, JobSignals};
use brickwork_core::{
    inspector_payout, BriefMatch, ClientBrief, MarketplaceConfig, MatchStatus, Recommendation,
    ReportDraft, SectionEntry, SectionId,
};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "brickwork-report";

/// Minimum trimmed summary length accepted at submission.
pub const MIN_SUMMARY_CHARS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    ScoreMissing,
    RecommendationMissing,
    SummaryTooShort,
    DisclaimerNotAcknowledged,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::ScoreMissing => "set an overall score before submitting",
            Self::RecommendationMissing => "choose a recommendation before submitting",
            Self::SummaryTooShort => "the summary needs at least 10 characters",
            Self::DisclaimerNotAcknowledged => "acknowledge the professional disclaimer",
        };
        f.write_str(msg)
    }
}

/// The submission precondition. All four must hold; violations are surfaced
/// before any network call is attempted.
pub fn submission_blockers(form: &ReportDraft, disclaimer_acked: bool) -> Vec<BlockReason> {
    let mut reasons = Vec::new();
    if form.score.is_none() {
        reasons.push(BlockReason::ScoreMissing);
    }
    if form.recommendation.is_none() {
        reasons.push(BlockReason::RecommendationMissing);
    }
    if form.summary.trim().chars().count() < MIN_SUMMARY_CHARS {
        reasons.push(BlockReason::SummaryTooShort);
    }
    if !disclaimer_acked {
        reasons.push(BlockReason::DisclaimerNotAcknowledged);
    }
    reasons
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report has already been submitted")]
    AlreadySubmitted,
    #[error("submission requires explicit confirmation")]
    NotConfirmed,
    #[error("submission blocked: {}", format_reasons(.0))]
    Blocked(Vec<BlockReason>),
    #[error("score must be a finite number")]
    InvalidScore,
    #[error(transparent)]
    Api(#[from] ApiError),
}

fn format_reasons(reasons: &[BlockReason]) -> String {
    reasons
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DraftState {
    NotCreated,
    Draft { id: Uuid },
    Submitted { id: Uuid, at: DateTime<Utc> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Saved,
    /// Another persist was outstanding; this one was dropped, not queued.
    SkippedInFlight,
}

struct SessionState {
    form: ReportDraft,
    draft: DraftState,
    /// Re-confirmed every session; deliberately never persisted.
    disclaimer_acked: bool,
}

struct SessionInner {
    store: Arc<dyn DraftStore>,
    signals: Arc<dyn JobSignals>,
    job_id: Uuid,
    requester_id: Uuid,
    started: Instant,
    in_flight: AtomicBool,
    state: Mutex<SessionState>,
    autosave: Mutex<Option<JoinHandle<()>>>,
}

/// One inspector's live editing session for one job's report.
pub struct ReportSession {
    inner: Arc<SessionInner>,
}

impl ReportSession {
    pub fn new(
        store: Arc<dyn DraftStore>,
        signals: Arc<dyn JobSignals>,
        job_id: Uuid,
        requester_id: Uuid,
        inspector_id: Uuid,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                store,
                signals,
                job_id,
                requester_id,
                started: Instant::now(),
                in_flight: AtomicBool::new(false),
                state: Mutex::new(SessionState {
                    form: ReportDraft::new(job_id, inspector_id),
                    draft: DraftState::NotCreated,
                    disclaimer_acked: false,
                }),
                autosave: Mutex::new(None),
            }),
        }
    }

    /// Resume an existing open draft fetched from the backend.
    pub fn resume(
        store: Arc<dyn DraftStore>,
        signals: Arc<dyn JobSignals>,
        requester_id: Uuid,
        draft: ReportDraft,
    ) -> Result<Self, ReportError> {
        if draft.is_submitted() {
            return Err(ReportError::AlreadySubmitted);
        }
        let state = match draft.id {
            Some(id) => DraftState::Draft { id },
            None => DraftState::NotCreated,
        };
        let job_id = draft.job_id;
        Ok(Self {
            inner: Arc::new(SessionInner {
                store,
                signals,
                job_id,
                requester_id,
                started: Instant::now(),
                in_flight: AtomicBool::new(false),
                state: Mutex::new(SessionState {
                    form: draft,
                    draft: state,
                    disclaimer_acked: false,
                }),
                autosave: Mutex::new(None),
            }),
        })
    }

    fn with_open_form<R>(
        &self,
        mutate: impl FnOnce(&mut ReportDraft) -> R,
    ) -> Result<R, ReportError> {
        let mut state = self.inner.state.lock().expect("session state poisoned");
        if matches!(state.draft, DraftState::Submitted { .. }) {
            return Err(ReportError::AlreadySubmitted);
        }
        Ok(mutate(&mut state.form))
    }

    pub fn set_section(&self, id: SectionId, entry: SectionEntry) -> Result<(), ReportError> {
        self.with_open_form(|form| {
            *form.sections.entry_mut(id) = Some(entry);
        })
    }

    pub fn set_score(&self, score: f64) -> Result<(), ReportError> {
        if !score.is_finite() {
            return Err(ReportError::InvalidScore);
        }
        self.with_open_form(|form| form.score = Some(score))
    }

    pub fn set_recommendation(&self, rec: Recommendation) -> Result<(), ReportError> {
        self.with_open_form(|form| form.recommendation = Some(rec))
    }

    pub fn set_summary(&self, summary: impl Into<String>) -> Result<(), ReportError> {
        self.with_open_form(|form| form.summary = summary.into())
    }

    /// Seed the requirement checklist from the linked brief. Seeding happens
    /// at most once; rows already present are left untouched.
    pub fn seed_brief_matches(&self, brief: &ClientBrief) -> Result<(), ReportError> {
        self.with_open_form(|form| {
            if form.brief_matches.is_empty() {
                form.brief_matches = brief
                    .requirements
                    .iter()
                    .map(BriefMatch::from_requirement)
                    .collect();
            }
        })
    }

    pub fn set_brief_match(
        &self,
        index: usize,
        status: MatchStatus,
        notes: impl Into<String>,
    ) -> Result<(), ReportError> {
        self.with_open_form(|form| {
            if let Some(row) = form.brief_matches.get_mut(index) {
                row.status = status;
                row.notes = notes.into();
            }
        })
    }

    /// Must be re-confirmed in every editing session.
    pub fn acknowledge_disclaimer(&self) -> Result<(), ReportError> {
        let mut state = self.inner.state.lock().expect("session state poisoned");
        if matches!(state.draft, DraftState::Submitted { .. }) {
            return Err(ReportError::AlreadySubmitted);
        }
        state.disclaimer_acked = true;
        Ok(())
    }

    pub fn draft_state(&self) -> DraftState {
        self.inner.state.lock().expect("session state poisoned").draft
    }

    pub fn form_snapshot(&self) -> ReportDraft {
        self.inner
            .state
            .lock()
            .expect("session state poisoned")
            .form
            .clone()
    }

    /// Whole minutes since the editing session was opened, rounded down.
    pub fn elapsed_minutes(&self) -> u64 {
        self.inner.started.elapsed().as_secs() / 60
    }

    pub fn payout_preview(&self, agreed_price: i64, config: &MarketplaceConfig) -> i64 {
        inspector_payout(agreed_price, config)
    }

    /// Manual "Save Draft". Partial data is always valid to persist; there
    /// is no validation gate before submission.
    pub async fn save_now(&self) -> Result<PersistOutcome, ReportError> {
        persist(&self.inner).await
    }

    /// Arm the periodic autosave. Re-arming replaces the previous timer.
    pub fn start_autosave(&self, every: Duration) {
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // interval yields immediately once; the first real save is one
            // period after mount
            ticker.tick().await;
            loop {
                ticker.tick().await;
                // Detached so cancelling the timer never aborts a write
                // already on the wire; the in-flight guard keeps writes
                // from overlapping.
                let inner = Arc::clone(&inner);
                tokio::spawn(async move {
                    match persist(&inner).await {
                        Ok(PersistOutcome::Saved) => {}
                        Ok(PersistOutcome::SkippedInFlight) => {
                            debug!("autosave tick dropped; persist already in flight");
                        }
                        Err(ReportError::AlreadySubmitted) => {}
                        Err(err) => warn!(error = %err, "autosave failed"),
                    }
                });
            }
        });
        let mut slot = self.inner.autosave.lock().expect("autosave slot poisoned");
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    pub fn stop_autosave(&self) {
        let mut slot = self.inner.autosave.lock().expect("autosave slot poisoned");
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }

    /// Submit the report. `confirmed` is the second step of the two-step
    /// flow; without it no work happens. On success the session is terminal
    /// and the owning job's status advance plus the requester notification
    /// run as independent follow-ups whose failures are logged, never
    /// rolled back into the report write.
    pub async fn submit(&self, confirmed: bool) -> Result<Uuid, ReportError> {
        if !confirmed {
            return Err(ReportError::NotConfirmed);
        }
        {
            let state = self.inner.state.lock().expect("session state poisoned");
            if matches!(state.draft, DraftState::Submitted { .. }) {
                return Err(ReportError::AlreadySubmitted);
            }
            let reasons = submission_blockers(&state.form, state.disclaimer_acked);
            if !reasons.is_empty() {
                return Err(ReportError::Blocked(reasons));
            }
        }

        // Let any outstanding autosave settle rather than racing it.
        while self
            .inner
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        let result = submit_guarded(&self.inner).await;
        self.inner.in_flight.store(false, Ordering::SeqCst);

        // A failed submit leaves the session in Draft with autosave still
        // armed; the timer stops only once the report is actually submitted.
        let id = result?;
        self.stop_autosave();
        if let Err(err) = self
            .inner
            .signals
            .transition_job_status(self.inner.job_id, brickwork_core::JobStatus::ReportSubmitted)
            .await
        {
            error!(job_id = %self.inner.job_id, error = %err,
                "job status transition failed after report submit; report stands");
        }
        self.inner.signals.notify_requester(
            self.inner.job_id,
            self.inner.requester_id,
            "The inspection report for your job has been submitted.".to_string(),
        );
        Ok(id)
    }
}

impl Drop for ReportSession {
    fn drop(&mut self) {
        self.stop_autosave();
    }
}

async fn persist(inner: &Arc<SessionInner>) -> Result<PersistOutcome, ReportError> {
    if inner
        .in_flight
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Ok(PersistOutcome::SkippedInFlight);
    }
    let result = persist_guarded(inner).await;
    inner.in_flight.store(false, Ordering::SeqCst);
    result
}

async fn persist_guarded(inner: &Arc<SessionInner>) -> Result<PersistOutcome, ReportError> {
    let (payload, draft_state) = {
        let state = inner.state.lock().expect("session state poisoned");
        if matches!(state.draft, DraftState::Submitted { .. }) {
            return Err(ReportError::AlreadySubmitted);
        }
        (state.form.clone(), state.draft)
    };

    match draft_state {
        DraftState::NotCreated => {
            let id = inner.store.insert_draft(&payload).await?;
            let mut state = inner.state.lock().expect("session state poisoned");
            // Capture the assigned id: every later write targets it.
            state.draft = DraftState::Draft { id };
            state.form.id = Some(id);
            state.form.last_saved_at = Some(Utc::now());
        }
        DraftState::Draft { id } => {
            inner.store.update_draft(id, &payload).await?;
            let mut state = inner.state.lock().expect("session state poisoned");
            state.form.last_saved_at = Some(Utc::now());
        }
        DraftState::Submitted { .. } => unreachable!("checked above"),
    }
    Ok(PersistOutcome::Saved)
}

async fn submit_guarded(inner: &Arc<SessionInner>) -> Result<Uuid, ReportError> {
    let submitted_at = Utc::now();
    let minutes = inner.started.elapsed().as_secs() / 60;

    let (mut payload, draft_state) = {
        let state = inner.state.lock().expect("session state poisoned");
        if matches!(state.draft, DraftState::Submitted { .. }) {
            return Err(ReportError::AlreadySubmitted);
        }
        (state.form.clone(), state.draft)
    };
    payload.submitted_at = Some(submitted_at);
    payload.time_spent_minutes = Some(minutes);

    let id = match draft_state {
        DraftState::NotCreated => inner.store.insert_draft(&payload).await?,
        DraftState::Draft { id } => {
            inner.store.update_draft(id, &payload).await?;
            id
        }
        DraftState::Submitted { .. } => unreachable!("checked above"),
    };

    let mut state = inner.state.lock().expect("session state poisoned");
    payload.id = Some(id);
    payload.last_saved_at = Some(submitted_at);
    state.form = payload;
    state.draft = DraftState::Submitted {
        id,
        at: submitted_at,
    };
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use brickwork_client::MemoryBackend;
    use brickwork_core::{
        BriefPriority, BriefRequirement, InspectionJob, JobStatus, SectionCondition, ServiceType,
    };
    use tokio::sync::Notify;

    fn valid_form(form: &mut ReportDraft) {
        form.score = Some(8.0);
        form.recommendation = Some(Recommendation::HighlyRecommend);
        form.summary = "Great house overall".to_string();
    }

    fn brief() -> ClientBrief {
        ClientBrief {
            id: Uuid::new_v4(),
            buyer_id: Uuid::new_v4(),
            suburb_focus: "Marrickville".into(),
            budget: 1_200_000,
            requirements: vec![
                BriefRequirement {
                    text: "North-facing backyard".into(),
                    priority: BriefPriority::MustHave,
                },
                BriefRequirement {
                    text: "Second bathroom".into(),
                    priority: BriefPriority::NiceToHave,
                },
            ],
            created_at: Utc::now(),
        }
    }

    struct Harness {
        backend: Arc<MemoryBackend>,
        session: ReportSession,
        job_id: Uuid,
    }

    fn harness() -> Harness {
        let backend = Arc::new(MemoryBackend::new());
        let job_id = Uuid::new_v4();
        let requester_id = Uuid::new_v4();
        backend.seed_jobs(vec![InspectionJob {
            id: job_id,
            requester_id,
            property_address: "5 Wattle Ln".into(),
            suburb: "Newtown".into(),
            latitude: None,
            longitude: None,
            service_type: ServiceType::Combined,
            status: JobStatus::Assigned,
            agreed_price: Some(700),
            created_at: Utc::now(),
        }]);
        let session = ReportSession::new(
            backend.clone(),
            backend.clone(),
            job_id,
            requester_id,
            Uuid::new_v4(),
        );
        Harness {
            backend,
            session,
            job_id,
        }
    }

    #[test]
    fn gate_requires_all_four_conditions() {
        let mut form = ReportDraft::new(Uuid::new_v4(), Uuid::new_v4());
        valid_form(&mut form);
        assert!(submission_blockers(&form, true).is_empty());

        let mut no_score = form.clone();
        no_score.score = None;
        assert_eq!(submission_blockers(&no_score, true), vec![BlockReason::ScoreMissing]);

        let mut no_rec = form.clone();
        no_rec.recommendation = None;
        assert_eq!(
            submission_blockers(&no_rec, true),
            vec![BlockReason::RecommendationMissing]
        );

        let mut short = form.clone();
        short.summary = "  too short ".into(); // 9 chars trimmed
        assert_eq!(
            submission_blockers(&short, true),
            vec![BlockReason::SummaryTooShort]
        );

        assert_eq!(
            submission_blockers(&form, false),
            vec![BlockReason::DisclaimerNotAcknowledged]
        );
    }

    #[test]
    fn gate_trims_the_summary() {
        let mut form = ReportDraft::new(Uuid::new_v4(), Uuid::new_v4());
        valid_form(&mut form);
        form.summary = "   123456789   ".into();
        assert_eq!(submission_blockers(&form, true), vec![BlockReason::SummaryTooShort]);
        form.summary = "1234567890".into();
        assert!(submission_blockers(&form, true).is_empty());
    }

    #[tokio::test]
    async fn first_save_captures_id_and_later_saves_reuse_it() {
        let h = harness();
        h.session.set_summary("work in progress").unwrap();

        assert_eq!(h.session.draft_state(), DraftState::NotCreated);
        assert_eq!(h.session.save_now().await.unwrap(), PersistOutcome::Saved);

        let DraftState::Draft { id } = h.session.draft_state() else {
            panic!("expected draft state");
        };

        h.session
            .set_section(
                SectionId::Kitchen,
                SectionEntry {
                    condition: Some(SectionCondition::Fair),
                    notes: "dated benchtops".into(),
                },
            )
            .unwrap();
        h.session.save_now().await.unwrap();
        h.session.save_now().await.unwrap();

        assert_eq!(h.backend.draft_insert_count(), 1);
        assert_eq!(h.session.draft_state(), DraftState::Draft { id });
        assert!(h.session.form_snapshot().last_saved_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn autosave_creates_the_draft_lazily() {
        let h = harness();
        h.session.set_summary("autosaved".to_string()).unwrap();
        h.session.start_autosave(Duration::from_secs(30));
        // Let the timer task start before moving the clock.
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        tokio::time::advance(Duration::from_secs(29)).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(h.backend.draft_insert_count(), 0);

        tokio::time::advance(Duration::from_secs(1)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(h.backend.draft_insert_count(), 1);
        assert!(matches!(h.session.draft_state(), DraftState::Draft { .. }));

        h.session.stop_autosave();
    }

    struct BlockingStore {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl DraftStore for BlockingStore {
        async fn insert_draft(&self, _draft: &ReportDraft) -> Result<Uuid, ApiError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(Uuid::new_v4())
        }

        async fn update_draft(&self, _id: Uuid, _draft: &ReportDraft) -> Result<(), ApiError> {
            Ok(())
        }

        async fn fetch_draft(
            &self,
            _job_id: Uuid,
            _inspector_id: Uuid,
        ) -> Result<Option<ReportDraft>, ApiError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn concurrent_persist_is_skipped_not_queued() {
        let store = Arc::new(BlockingStore {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let signals = Arc::new(MemoryBackend::new());
        let session = Arc::new(ReportSession::new(
            store.clone(),
            signals,
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
        ));

        let background = session.clone();
        let first = tokio::spawn(async move { background.save_now().await });
        store.entered.notified().await;

        // A second save while the first is on the wire is a no-op.
        assert_eq!(
            session.save_now().await.unwrap(),
            PersistOutcome::SkippedInFlight
        );

        store.release.notify_one();
        assert_eq!(first.await.unwrap().unwrap(), PersistOutcome::Saved);
    }

    #[tokio::test]
    async fn blocked_submission_makes_no_network_call() {
        let h = harness();
        h.session.set_score(8.0).unwrap();
        h.session
            .set_recommendation(Recommendation::HighlyRecommend)
            .unwrap();
        h.session.set_summary("Great house overall").unwrap();
        // Disclaimer deliberately not acknowledged.

        let err = h.session.submit(true).await.unwrap_err();
        assert!(matches!(
            err,
            ReportError::Blocked(ref reasons)
                if reasons == &[BlockReason::DisclaimerNotAcknowledged]
        ));
        assert_eq!(h.backend.draft_insert_count(), 0);
    }

    #[tokio::test]
    async fn unconfirmed_submission_is_refused() {
        let h = harness();
        h.session.set_score(7.5).unwrap();
        h.session
            .set_recommendation(Recommendation::WorthConsidering)
            .unwrap();
        h.session.set_summary("Solid but needs roof work").unwrap();
        h.session.acknowledge_disclaimer().unwrap();

        let err = h.session.submit(false).await.unwrap_err();
        assert!(matches!(err, ReportError::NotConfirmed));
        assert_eq!(h.backend.draft_insert_count(), 0);
    }

    #[tokio::test]
    async fn confirmed_submission_advances_job_and_notifies() {
        let h = harness();
        h.session.set_score(8.0).unwrap();
        h.session
            .set_recommendation(Recommendation::HighlyRecommend)
            .unwrap();
        h.session.set_summary("Great house overall").unwrap();
        h.session.acknowledge_disclaimer().unwrap();

        let id = h.session.submit(true).await.unwrap();
        assert!(matches!(
            h.session.draft_state(),
            DraftState::Submitted { id: sid, .. } if sid == id
        ));

        let snapshot = h.session.form_snapshot();
        assert!(snapshot.submitted_at.is_some());
        assert_eq!(snapshot.time_spent_minutes, Some(0));

        let job = h.backend.job(h.job_id).unwrap();
        assert_eq!(job.status, JobStatus::ReportSubmitted);
        assert_eq!(h.backend.notifications().len(), 1);
    }

    #[tokio::test]
    async fn submitted_session_is_terminal() {
        let h = harness();
        h.session.set_score(9.0).unwrap();
        h.session
            .set_recommendation(Recommendation::HighlyRecommend)
            .unwrap();
        h.session.set_summary("Outstanding condition throughout").unwrap();
        h.session.acknowledge_disclaimer().unwrap();
        h.session.submit(true).await.unwrap();

        assert!(matches!(
            h.session.set_summary("edit after submit").unwrap_err(),
            ReportError::AlreadySubmitted
        ));
        assert!(matches!(
            h.session.save_now().await.unwrap_err(),
            ReportError::AlreadySubmitted
        ));
        assert!(matches!(
            h.session.submit(true).await.unwrap_err(),
            ReportError::AlreadySubmitted
        ));
    }

    struct SubmitFailingStore {
        updates: AtomicUsize,
    }

    #[async_trait]
    impl DraftStore for SubmitFailingStore {
        async fn insert_draft(&self, _draft: &ReportDraft) -> Result<Uuid, ApiError> {
            Ok(Uuid::new_v4())
        }

        async fn update_draft(&self, _id: Uuid, draft: &ReportDraft) -> Result<(), ApiError> {
            if draft.is_submitted() {
                return Err(ApiError::Status {
                    code: 500,
                    body: "backend hiccup".into(),
                });
            }
            self.updates.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn fetch_draft(
            &self,
            _job_id: Uuid,
            _inspector_id: Uuid,
        ) -> Result<Option<ReportDraft>, ApiError> {
            Ok(None)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_submit_leaves_autosave_armed() {
        let store = Arc::new(SubmitFailingStore {
            updates: AtomicUsize::new(0),
        });
        let session = ReportSession::new(
            store.clone(),
            Arc::new(MemoryBackend::new()),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
        );
        session.set_score(7.0).unwrap();
        session
            .set_recommendation(Recommendation::WorthConsidering)
            .unwrap();
        session.set_summary("Weatherboard needs repainting").unwrap();
        session.acknowledge_disclaimer().unwrap();
        session.save_now().await.unwrap();

        session.start_autosave(Duration::from_secs(30));
        // Let the timer task start before moving the clock.
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        let err = session.submit(true).await.unwrap_err();
        assert!(matches!(err, ReportError::Api(_)));
        assert!(matches!(session.draft_state(), DraftState::Draft { .. }));

        let before = store.updates.load(Ordering::SeqCst);
        tokio::time::advance(Duration::from_secs(31)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(
            store.updates.load(Ordering::SeqCst) > before,
            "autosave must keep firing after a failed submit"
        );

        session.stop_autosave();
    }

    struct FailingSignals;

    #[async_trait]
    impl JobSignals for FailingSignals {
        async fn transition_job_status(
            &self,
            _job_id: Uuid,
            _status: JobStatus,
        ) -> Result<(), ApiError> {
            Err(ApiError::Status {
                code: 500,
                body: "backend hiccup".into(),
            })
        }

        fn notify_requester(&self, _job_id: Uuid, _requester_id: Uuid, _message: String) {}
    }

    #[tokio::test]
    async fn job_transition_failure_does_not_undo_the_report() {
        let backend = Arc::new(MemoryBackend::new());
        let session = ReportSession::new(
            backend.clone(),
            Arc::new(FailingSignals),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
        );
        session.set_score(6.0).unwrap();
        session
            .set_recommendation(Recommendation::NotRecommended)
            .unwrap();
        session.set_summary("Structural issues in the subfloor").unwrap();
        session.acknowledge_disclaimer().unwrap();

        let id = session.submit(true).await.unwrap();
        assert!(matches!(
            session.draft_state(),
            DraftState::Submitted { id: sid, .. } if sid == id
        ));
    }

    #[tokio::test]
    async fn brief_matches_seed_once_and_mutate_in_place() {
        let h = harness();
        let b = brief();
        h.session.seed_brief_matches(&b).unwrap();
        h.session
            .set_brief_match(0, MatchStatus::Meets, "confirmed on site")
            .unwrap();

        // Re-seeding is a no-op; edited rows survive.
        h.session.seed_brief_matches(&b).unwrap();
        let form = h.session.form_snapshot();
        assert_eq!(form.brief_matches.len(), 2);
        assert_eq!(form.brief_matches[0].status, MatchStatus::Meets);
        assert_eq!(form.brief_matches[0].notes, "confirmed on site");
        assert_eq!(form.brief_matches[1].status, MatchStatus::Unset);
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_time_rounds_down_to_whole_minutes() {
        let h = harness();
        tokio::time::advance(Duration::from_secs(150)).await;
        assert_eq!(h.session.elapsed_minutes(), 2);
    }

    #[tokio::test]
    async fn resume_refuses_submitted_drafts() {
        let backend = Arc::new(MemoryBackend::new());
        let mut draft = ReportDraft::new(Uuid::new_v4(), Uuid::new_v4());
        draft.id = Some(Uuid::new_v4());
        draft.submitted_at = Some(Utc::now());

        let Err(err) = ReportSession::resume(backend.clone(), backend, Uuid::new_v4(), draft)
        else {
            panic!("submitted draft must not resume");
        };
        assert!(matches!(err, ReportError::AlreadySubmitted));
    }

    #[tokio::test]
    async fn payout_preview_reads_the_configured_split() {
        let h = harness();
        let config = MarketplaceConfig::default();
        assert_eq!(h.session.payout_preview(700, &config), 630);
    }
}
