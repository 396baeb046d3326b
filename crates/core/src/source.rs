//! Loading a request's records from a backend and resolving them in one pass.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::approvals::{
    capability_for, ActingCapability, ActingGate, EditTarget, Submission, SubmissionDraft,
};
use crate::discussion::{Discussion, DiscussionView};
use crate::domain::action::ActionIndex;
use crate::domain::record::{
    BcrId, FinalDecisionPayload, RecommendationItem, RecommendationPayload, RecommendationRecord,
    ReviewRecord,
};
use crate::errors::{ApplicationError, DomainError};
use crate::flows::engine::FlowResolver;
use crate::flows::states::ApprovalFlow;

#[async_trait]
pub trait BcrSource: Send + Sync {
    async fn fetch_recommendations(
        &self,
        bcr_id: BcrId,
    ) -> Result<Vec<RecommendationRecord>, ApplicationError>;

    async fn fetch_reviews(&self, bcr_id: BcrId) -> Result<Vec<ReviewRecord>, ApplicationError>;

    async fn can_create_recommendation(&self, bcr_id: BcrId) -> Result<bool, ApplicationError>;

    async fn can_review_recommendation(&self, bcr_id: BcrId) -> Result<bool, ApplicationError>;

    async fn submit_recommendation(
        &self,
        bcr_id: BcrId,
        payload: &RecommendationPayload,
    ) -> Result<(), ApplicationError>;

    async fn submit_review(
        &self,
        bcr_id: BcrId,
        payload: &FinalDecisionPayload,
    ) -> Result<(), ApplicationError>;

    async fn edit_recommendation(
        &self,
        bcr_id: BcrId,
        recommendation_id: u64,
        payload: &RecommendationPayload,
    ) -> Result<(), ApplicationError>;
}

/// A rewrite of a filed recommendation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RecommendationEdit {
    pub bcr_id: BcrId,
    pub recommendation_id: u64,
    pub payload: RecommendationPayload,
}

#[derive(Clone, Debug, Default)]
struct StoredRequest {
    recommendations: Vec<RecommendationRecord>,
    reviews: Vec<ReviewRecord>,
    can_create: bool,
    can_review: bool,
    submissions: Vec<Submission>,
    edits: Vec<RecommendationEdit>,
}

/// Backend stand-in keyed by request id. Unknown ids load as empty lists.
#[derive(Debug, Default)]
pub struct InMemoryBcrSource {
    requests: Mutex<HashMap<BcrId, StoredRequest>>,
}

impl InMemoryBcrSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(
        self,
        bcr_id: BcrId,
        recommendations: Vec<RecommendationRecord>,
        reviews: Vec<ReviewRecord>,
    ) -> Self {
        {
            let mut requests = self.lock();
            let entry = requests.entry(bcr_id).or_default();
            entry.recommendations = recommendations;
            entry.reviews = reviews;
        }
        self
    }

    pub fn with_permissions(self, bcr_id: BcrId, can_create: bool, can_review: bool) -> Self {
        {
            let mut requests = self.lock();
            let entry = requests.entry(bcr_id).or_default();
            entry.can_create = can_create;
            entry.can_review = can_review;
        }
        self
    }

    pub fn submissions(&self, bcr_id: BcrId) -> Vec<Submission> {
        self.read(bcr_id, |request| request.submissions.clone())
    }

    pub fn edits(&self, bcr_id: BcrId) -> Vec<RecommendationEdit> {
        self.read(bcr_id, |request| request.edits.clone())
    }

    /// A panicked holder cannot wedge the store; later calls see its last writes.
    fn lock(&self) -> MutexGuard<'_, HashMap<BcrId, StoredRequest>> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read<T>(&self, bcr_id: BcrId, map: impl FnOnce(&StoredRequest) -> T) -> T {
        match self.lock().get(&bcr_id) {
            Some(request) => map(request),
            None => map(&StoredRequest::default()),
        }
    }

    fn record(&self, bcr_id: BcrId, submission: Submission) {
        self.lock().entry(bcr_id).or_default().submissions.push(submission);
    }
}

fn apply_edit(record: &mut RecommendationRecord, payload: &RecommendationPayload) {
    record.recommendation_type = Some(payload.recommendation_type.clone());
    record.remark = payload.remark.clone();
    record.reason = payload.reason.clone();
    for edited in &payload.recommended_items {
        let existing = record
            .recommendation_items
            .iter_mut()
            .find(|item| item.budget_change_item_id == edited.budget_change_item_id);
        match existing {
            Some(item) => item.recommended_qty = Some(edited.recommended_qty),
            None => record.recommendation_items.push(RecommendationItem {
                budget_change_item_id: edited.budget_change_item_id,
                recommended_qty: Some(edited.recommended_qty),
                budget_change_item: None,
            }),
        }
    }
}

#[async_trait]
impl BcrSource for InMemoryBcrSource {
    async fn fetch_recommendations(
        &self,
        bcr_id: BcrId,
    ) -> Result<Vec<RecommendationRecord>, ApplicationError> {
        Ok(self.read(bcr_id, |request| request.recommendations.clone()))
    }

    async fn fetch_reviews(&self, bcr_id: BcrId) -> Result<Vec<ReviewRecord>, ApplicationError> {
        Ok(self.read(bcr_id, |request| request.reviews.clone()))
    }

    async fn can_create_recommendation(&self, bcr_id: BcrId) -> Result<bool, ApplicationError> {
        Ok(self.read(bcr_id, |request| request.can_create))
    }

    async fn can_review_recommendation(&self, bcr_id: BcrId) -> Result<bool, ApplicationError> {
        Ok(self.read(bcr_id, |request| request.can_review))
    }

    async fn submit_recommendation(
        &self,
        bcr_id: BcrId,
        payload: &RecommendationPayload,
    ) -> Result<(), ApplicationError> {
        self.record(bcr_id, Submission::Recommendation(payload.clone()));
        Ok(())
    }

    async fn submit_review(
        &self,
        bcr_id: BcrId,
        payload: &FinalDecisionPayload,
    ) -> Result<(), ApplicationError> {
        self.record(bcr_id, Submission::Review(payload.clone()));
        Ok(())
    }

    async fn edit_recommendation(
        &self,
        bcr_id: BcrId,
        recommendation_id: u64,
        payload: &RecommendationPayload,
    ) -> Result<(), ApplicationError> {
        let mut requests = self.lock();
        let request = requests.entry(bcr_id).or_default();
        let record = request
            .recommendations
            .iter_mut()
            .find(|record| record.id == recommendation_id)
            .ok_or_else(|| {
                ApplicationError::Integration(format!(
                    "recommendation {recommendation_id} does not exist on BCR {bcr_id}"
                ))
            })?;

        apply_edit(record, payload);
        request.edits.push(RecommendationEdit { bcr_id, recommendation_id, payload: payload.clone() });
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct FetchTicket(pub u64);

/// Hands out increasing tickets; only the newest ticket may apply its result.
#[derive(Clone, Debug, Default)]
pub struct FetchSequencer {
    latest: Arc<AtomicU64>,
}

impl FetchSequencer {
    pub fn begin(&self) -> FetchTicket {
        FetchTicket(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn latest(&self) -> FetchTicket {
        FetchTicket(self.latest.load(Ordering::SeqCst))
    }

    pub fn is_current(&self, ticket: FetchTicket) -> bool {
        self.latest() == ticket
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct LoadedFlow {
    pub bcr_id: BcrId,
    pub ticket: FetchTicket,
    pub correlation_id: String,
    pub flow: ApprovalFlow,
    pub discussion: Discussion,
}

impl LoadedFlow {
    pub fn view(&self) -> DiscussionView {
        DiscussionView::new(self.flow.clone(), self.discussion.clone())
    }
}

pub struct FlowLoader<S> {
    source: S,
    resolver: FlowResolver,
    sequencer: FetchSequencer,
}

impl<S: BcrSource> FlowLoader<S> {
    pub fn new(source: S, resolver: FlowResolver) -> Self {
        Self { source, resolver, sequencer: FetchSequencer::default() }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn sequencer(&self) -> &FetchSequencer {
        &self.sequencer
    }

    /// Fetches recommendations then reviews and resolves them.
    ///
    /// A load that finishes after a newer one has started returns
    /// [`ApplicationError::Superseded`] instead of its now stale flow.
    pub async fn load(&self, bcr_id: BcrId) -> Result<LoadedFlow, ApplicationError> {
        let ticket = self.sequencer.begin();
        let correlation_id = Uuid::new_v4().to_string();

        let recommendations = self.source.fetch_recommendations(bcr_id).await?;
        let reviews = self.source.fetch_reviews(bcr_id).await?;

        let latest = self.sequencer.latest();
        if latest != ticket {
            debug!(
                event_name = "bcr.flow.load_superseded",
                correlation_id = %correlation_id,
                bcr_id = %bcr_id,
                ticket = ticket.0,
                latest = latest.0,
                "discarding stale flow load"
            );
            return Err(ApplicationError::Superseded { bcr_id, ticket: ticket.0, latest: latest.0 });
        }

        let index = ActionIndex::build(&recommendations, &reviews);
        let steps = self.resolver.resolve_index(&index);
        let discussion = Discussion::from_index(&index);
        let flow = ApprovalFlow { steps, unmatched: index.into_unmatched() };

        info!(
            event_name = "bcr.flow.loaded",
            correlation_id = %correlation_id,
            bcr_id = %bcr_id,
            ticket = ticket.0,
            recommendations = recommendations.len(),
            reviews = reviews.len(),
            outcome = ?flow.outcome(),
            "approval flow loaded"
        );

        Ok(LoadedFlow { bcr_id, ticket, correlation_id, flow, discussion })
    }

    /// Local role capability, confirmed by the backend's permission check.
    pub async fn acting_capability(
        &self,
        bcr_id: BcrId,
        user_role: Option<&str>,
    ) -> Result<ActingCapability, ApplicationError> {
        let confirmed = match capability_for(user_role) {
            ActingCapability::CreateRecommendation => {
                self.source.can_create_recommendation(bcr_id).await?
            }
            ActingCapability::SubmitReview => self.source.can_review_recommendation(bcr_id).await?,
            ActingCapability::None => return Ok(ActingCapability::None),
        };

        if confirmed {
            Ok(capability_for(user_role))
        } else {
            Ok(ActingCapability::None)
        }
    }

    /// Files a draft for the user's role once that role holds the pending step.
    pub async fn submit(
        &self,
        bcr_id: BcrId,
        user_role: Option<&str>,
        draft: SubmissionDraft,
    ) -> Result<Submission, ApplicationError> {
        let loaded = self.load(bcr_id).await?;
        let role = ActingGate::check(user_role, &loaded.flow)
            .map_err(|denial| DomainError::ActingDenied(denial.reason()))?;

        if self.acting_capability(bcr_id, user_role).await? == ActingCapability::None {
            return Err(DomainError::ActingDenied(format!(
                "the budget service does not allow {role} to act on BCR {bcr_id}"
            ))
            .into());
        }

        let submission = draft
            .validate(role)
            .map_err(|failure| DomainError::InvalidSubmission(failure.reason()))?;

        match &submission {
            Submission::Recommendation(payload) => {
                self.source.submit_recommendation(bcr_id, payload).await?
            }
            Submission::Review(payload) => self.source.submit_review(bcr_id, payload).await?,
        }

        info!(
            event_name = "bcr.flow.submitted",
            correlation_id = %loaded.correlation_id,
            bcr_id = %bcr_id,
            role = %role,
            "submission filed"
        );

        Ok(submission)
    }

    /// Rewrites the recommendation the user's role filed earlier.
    pub async fn edit(
        &self,
        bcr_id: BcrId,
        user_role: Option<&str>,
        draft: SubmissionDraft,
    ) -> Result<RecommendationEdit, ApplicationError> {
        let loaded = self.load(bcr_id).await?;
        let EditTarget { role, recommendation_id } =
            ActingGate::check_edit(user_role, &loaded.discussion)
                .map_err(|denial| DomainError::ActingDenied(denial.reason()))?;

        let payload = draft
            .validate_edit(role)
            .map_err(|failure| DomainError::InvalidSubmission(failure.reason()))?;
        self.source.edit_recommendation(bcr_id, recommendation_id, &payload).await?;

        info!(
            event_name = "bcr.flow.recommendation_edited",
            correlation_id = %loaded.correlation_id,
            bcr_id = %bcr_id,
            role = %role,
            recommendation_id,
            "recommendation edited"
        );

        Ok(RecommendationEdit { bcr_id, recommendation_id, payload })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use tokio::sync::Notify;

    use super::{BcrSource, FetchSequencer, FetchTicket, FlowLoader, InMemoryBcrSource};
    use crate::approvals::options::{ReasonOption, RecommendationOption};
    use crate::approvals::{ActingCapability, ItemQuantity, Submission, SubmissionDraft};
    use crate::domain::record::{
        BcrId, FinalDecisionPayload, RecommendationPayload, RecommendationRecord, ReviewRecord,
    };
    use crate::domain::role::Role;
    use crate::errors::{ApplicationError, DomainError};
    use crate::flows::engine::FlowResolver;
    use crate::flows::states::{FlowOutcome, RejectionPolicy};

    fn rec(department: &str, kind: &str) -> RecommendationRecord {
        RecommendationRecord {
            id: 1,
            department: Some(department.to_string()),
            recommendation_type: Some(kind.to_string()),
            ..RecommendationRecord::default()
        }
    }

    fn rev(level: &str, kind: &str) -> ReviewRecord {
        ReviewRecord {
            id: 2,
            approval_level: Some(level.to_string()),
            review_type: Some(kind.to_string()),
            ..ReviewRecord::default()
        }
    }

    #[test]
    fn sequencer_tickets_increase_and_only_latest_is_current() {
        let sequencer = FetchSequencer::default();
        let first = sequencer.begin();
        let second = sequencer.begin();

        assert_eq!(first, FetchTicket(1));
        assert!(second > first);
        assert!(!sequencer.is_current(first));
        assert!(sequencer.is_current(second));
    }

    #[tokio::test]
    async fn load_resolves_flow_and_discussion_together() {
        let source = InMemoryBcrSource::new().with_records(
            BcrId(5),
            vec![rec("QS", "Keep_Original")],
            vec![rev("CM", "Reject")],
        );
        let loader = FlowLoader::new(source, FlowResolver::new(RejectionPolicy::Halt));

        let loaded = loader.load(BcrId(5)).await.expect("flow loads");
        assert_eq!(loaded.flow.outcome(), FlowOutcome::Rejected { by: Role::Cm });
        assert_eq!(loaded.discussion.items.len(), 5);
        assert!(!loaded.correlation_id.is_empty());
        assert_eq!(loaded.view().entries()[1].badge.label, "Reject");
    }

    #[tokio::test]
    async fn unknown_request_loads_as_empty_flow() {
        let loader = FlowLoader::new(InMemoryBcrSource::new(), FlowResolver::default());
        let loaded = loader.load(BcrId(99)).await.expect("flow loads");

        assert_eq!(loaded.flow.outcome(), FlowOutcome::InProgress { pending: Role::Qs });
    }

    struct GatedSource {
        inner: InMemoryBcrSource,
        gate_first: AtomicBool,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl BcrSource for GatedSource {
        async fn fetch_recommendations(
            &self,
            bcr_id: BcrId,
        ) -> Result<Vec<RecommendationRecord>, ApplicationError> {
            self.inner.fetch_recommendations(bcr_id).await
        }

        async fn fetch_reviews(&self, bcr_id: BcrId) -> Result<Vec<ReviewRecord>, ApplicationError> {
            if self.gate_first.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            self.inner.fetch_reviews(bcr_id).await
        }

        async fn can_create_recommendation(&self, bcr_id: BcrId) -> Result<bool, ApplicationError> {
            self.inner.can_create_recommendation(bcr_id).await
        }

        async fn can_review_recommendation(&self, bcr_id: BcrId) -> Result<bool, ApplicationError> {
            self.inner.can_review_recommendation(bcr_id).await
        }

        async fn submit_recommendation(
            &self,
            bcr_id: BcrId,
            payload: &RecommendationPayload,
        ) -> Result<(), ApplicationError> {
            self.inner.submit_recommendation(bcr_id, payload).await
        }

        async fn submit_review(
            &self,
            bcr_id: BcrId,
            payload: &FinalDecisionPayload,
        ) -> Result<(), ApplicationError> {
            self.inner.submit_review(bcr_id, payload).await
        }

        async fn edit_recommendation(
            &self,
            bcr_id: BcrId,
            recommendation_id: u64,
            payload: &RecommendationPayload,
        ) -> Result<(), ApplicationError> {
            self.inner.edit_recommendation(bcr_id, recommendation_id, payload).await
        }
    }

    #[tokio::test]
    async fn stale_load_is_superseded_by_newer_load() {
        let loader = Arc::new(FlowLoader::new(
            GatedSource {
                inner: InMemoryBcrSource::new(),
                gate_first: AtomicBool::new(true),
                entered: Notify::new(),
                release: Notify::new(),
            },
            FlowResolver::default(),
        ));

        let stale = tokio::spawn({
            let loader = Arc::clone(&loader);
            async move { loader.load(BcrId(3)).await }
        });
        loader.source().entered.notified().await;

        let fresh = loader.load(BcrId(3)).await.expect("newer load applies");
        assert_eq!(fresh.ticket, FetchTicket(2));

        loader.source().release.notify_one();
        let error = stale.await.expect("task joins").expect_err("stale load is rejected");
        assert_eq!(error, ApplicationError::Superseded { bcr_id: BcrId(3), ticket: 1, latest: 2 });
    }

    #[tokio::test]
    async fn capability_needs_local_role_and_server_confirmation() {
        let source = InMemoryBcrSource::new().with_permissions(BcrId(1), true, false);
        let loader = FlowLoader::new(source, FlowResolver::default());

        assert_eq!(
            loader.acting_capability(BcrId(1), Some("QS")).await,
            Ok(ActingCapability::CreateRecommendation)
        );
        assert_eq!(
            loader.acting_capability(BcrId(1), Some("PD")).await,
            Ok(ActingCapability::None)
        );
        assert_eq!(loader.acting_capability(BcrId(1), None).await, Ok(ActingCapability::None));
    }

    #[tokio::test]
    async fn submit_files_payload_for_pending_role() {
        let source = InMemoryBcrSource::new()
            .with_records(BcrId(8), vec![rec("QS", "Keep_Original")], Vec::new())
            .with_permissions(BcrId(8), false, true);
        let loader = FlowLoader::new(source, FlowResolver::default());

        let submission = loader
            .submit(
                BcrId(8),
                Some("CM"),
                SubmissionDraft {
                    option: RecommendationOption::Approve,
                    reason: None,
                    remark: Some("agree with QS".to_string()),
                    items: Vec::new(),
                },
            )
            .await
            .expect("CM submits");

        assert!(matches!(submission, Submission::Review(_)));
        assert_eq!(loader.source().submissions(BcrId(8)), vec![submission]);
    }

    #[tokio::test]
    async fn submit_refuses_roles_that_are_not_pending() {
        let source = InMemoryBcrSource::new().with_permissions(BcrId(8), true, true);
        let loader = FlowLoader::new(source, FlowResolver::default());

        let error = loader
            .submit(
                BcrId(8),
                Some("SITE"),
                SubmissionDraft {
                    option: RecommendationOption::SpecificQuantity,
                    reason: Some(ReasonOption::InaccurateBudget),
                    remark: None,
                    items: vec![ItemQuantity {
                        budget_change_item_id: 1,
                        quantity: Decimal::from(4),
                    }],
                },
            )
            .await
            .expect_err("SITE waits for QS and CM");

        assert!(matches!(error, ApplicationError::Domain(DomainError::ActingDenied(_))));
        assert!(loader.source().submissions(BcrId(8)).is_empty());
    }

    #[tokio::test]
    async fn edit_rewrites_the_callers_filed_recommendation() {
        let mut filed = rec("QS", "Keep_Original");
        filed.id = 41;
        let source = InMemoryBcrSource::new().with_records(BcrId(6), vec![filed], Vec::new());
        let loader = FlowLoader::new(source, FlowResolver::default());

        let edit = loader
            .edit(
                BcrId(6),
                Some("QS"),
                SubmissionDraft {
                    option: RecommendationOption::SpecificQuantity,
                    reason: Some(ReasonOption::BudgetAdjustment),
                    remark: Some("recounted the rebar".to_string()),
                    items: vec![ItemQuantity { budget_change_item_id: 3, quantity: Decimal::from(9) }],
                },
            )
            .await
            .expect("QS edits its own recommendation");

        assert_eq!(edit.recommendation_id, 41);
        assert_eq!(loader.source().edits(BcrId(6)), vec![edit]);

        let reloaded = loader.load(BcrId(6)).await.expect("flow reloads");
        let qs = reloaded.discussion.item(Role::Qs).expect("qs item");
        assert_eq!(qs.action_type, "Specific_Quantity");
        assert_eq!(qs.remark.as_deref(), Some("recounted the rebar"));
        assert_eq!(qs.items[0].recommended_qty, Some(Decimal::from(9)));
    }

    #[tokio::test]
    async fn edit_is_refused_without_a_filed_recommendation() {
        let source =
            InMemoryBcrSource::new().with_records(BcrId(6), vec![rec("QS", "Keep_Original")], Vec::new());
        let loader = FlowLoader::new(source, FlowResolver::default());

        let error = loader
            .edit(
                BcrId(6),
                Some("SITE"),
                SubmissionDraft {
                    option: RecommendationOption::KeepOriginal,
                    reason: Some(ReasonOption::InaccurateBudget),
                    remark: Some("nothing filed yet".to_string()),
                    items: Vec::new(),
                },
            )
            .await
            .expect_err("SITE has nothing to edit");

        assert!(matches!(error, ApplicationError::Domain(DomainError::ActingDenied(_))));
        assert!(loader.source().edits(BcrId(6)).is_empty());
    }

    #[tokio::test]
    async fn seeding_survives_a_poisoned_store_lock() {
        let source = InMemoryBcrSource::new();
        let _ = std::thread::scope(|scope| {
            scope
                .spawn(|| {
                    let _guard = source.requests.lock();
                    panic!("writer panicked while holding the store");
                })
                .join()
        });
        assert!(source.requests.is_poisoned());

        let source = source.with_records(BcrId(2), vec![rec("QS", "Keep_Original")], Vec::new());
        assert_eq!(source.fetch_recommendations(BcrId(2)).await.expect("fetch").len(), 1);
    }
}
