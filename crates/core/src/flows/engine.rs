use tracing::debug;

use crate::domain::action::ActionIndex;
use crate::domain::record::{RecommendationRecord, ReviewRecord};
use crate::domain::role::{Role, ROLE_ORDER};
use crate::flows::states::{ApprovalFlow, FlowStatus, FlowStep, RejectionPolicy};

/// Resolves recommendations and reviews into one status per role.
///
/// Pure: the same inputs always give the same flow, and missing data is a
/// `pending`/`waiting` step rather than an error.
#[derive(Clone, Copy, Debug, Default)]
pub struct FlowResolver {
    policy: RejectionPolicy,
}

impl FlowResolver {
    pub fn new(policy: RejectionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RejectionPolicy {
        self.policy
    }

    pub fn resolve(
        &self,
        recommendations: &[RecommendationRecord],
        reviews: &[ReviewRecord],
    ) -> ApprovalFlow {
        let index = ActionIndex::build(recommendations, reviews);
        let steps = self.resolve_index(&index);

        debug!(
            event_name = "bcr.flow.resolved",
            policy = ?self.policy,
            recommendations = recommendations.len(),
            reviews = reviews.len(),
            pending = ?steps.iter().find(|step| step.status == FlowStatus::Pending).map(|step| step.role),
            "approval flow resolved"
        );

        ApprovalFlow { steps, unmatched: index.into_unmatched() }
    }

    pub fn resolve_index(&self, index: &ActionIndex<'_>) -> Vec<FlowStep> {
        let halt_at = match self.policy {
            RejectionPolicy::Continue => None,
            RejectionPolicy::Halt => ROLE_ORDER
                .into_iter()
                .find(|role| index.get(*role).map(|action| action.is_rejection()).unwrap_or(false)),
        };

        let first_incomplete = ROLE_ORDER
            .into_iter()
            .take_while(|role| halt_at.map(|halt| *role < halt).unwrap_or(true))
            .find(|role| !index.is_completed(*role));

        ROLE_ORDER
            .into_iter()
            .map(|role| FlowStep { role, status: step_status(index, role, first_incomplete) })
            .collect()
    }
}

fn step_status(index: &ActionIndex<'_>, role: Role, first_incomplete: Option<Role>) -> FlowStatus {
    match index.get(role) {
        Some(action) if action.is_completed() => {
            if action.is_rejection() {
                FlowStatus::Rejected
            } else {
                FlowStatus::Approved
            }
        }
        _ if first_incomplete == Some(role) => FlowStatus::Pending,
        _ => FlowStatus::Waiting,
    }
}

/// Resolves with the default policy and returns only the steps.
pub fn resolve(recommendations: &[RecommendationRecord], reviews: &[ReviewRecord]) -> Vec<FlowStep> {
    FlowResolver::default().resolve(recommendations, reviews).steps
}
