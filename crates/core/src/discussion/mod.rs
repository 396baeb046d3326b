//! Per-role discussion thread shown beside the approval flow.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::action::{Action, ActionIndex, RecordSource};
use crate::domain::record::{
    parse_timestamp, AttachmentRef, BudgetChangeItemDetails, RecommendationRecord, ReviewRecord,
};
use crate::domain::role::{Role, FINAL_STEP_ROLES, PRE_STEP_ROLES, ROLE_ORDER};
use crate::flows::states::{ApprovalFlow, FlowStatus, FlowStep};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiscussionRowItem {
    pub budget_change_item_id: u64,
    pub item_code: String,
    pub description: String,
    pub uom: String,
    pub ordered_qty: Option<Decimal>,
    pub recommended_qty: Option<Decimal>,
    pub new_order: Option<Decimal>,
}

impl DiscussionRowItem {
    fn new(
        budget_change_item_id: u64,
        recommended_qty: Option<Decimal>,
        details: Option<&BudgetChangeItemDetails>,
    ) -> Self {
        Self {
            budget_change_item_id,
            item_code: details
                .and_then(|details| details.item_code.clone())
                .unwrap_or_else(|| "-".to_string()),
            description: details.and_then(|details| details.description.clone()).unwrap_or_default(),
            uom: details.and_then(|details| details.uom.clone()).unwrap_or_default(),
            ordered_qty: details.and_then(|details| details.ordered_qty),
            recommended_qty,
            new_order: details.and_then(|details| details.new_order),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiscussionItem {
    pub id: Option<u64>,
    pub role: Role,
    pub source: Option<RecordSource>,
    pub name: String,
    pub datetime: String,
    pub action_type: String,
    pub reason: Option<String>,
    pub remark: Option<String>,
    pub items: Vec<DiscussionRowItem>,
    pub documents: Vec<AttachmentRef>,
}

impl DiscussionItem {
    pub fn empty(role: Role) -> Self {
        Self {
            id: None,
            role,
            source: None,
            name: String::new(),
            datetime: String::new(),
            action_type: String::new(),
            reason: None,
            remark: None,
            items: Vec::new(),
            documents: Vec::new(),
        }
    }

    fn from_recommendation(role: Role, record: &RecommendationRecord) -> Self {
        Self {
            id: Some(record.id),
            role,
            source: Some(RecordSource::Recommendation),
            name: record.reviewer_name.clone().unwrap_or_default(),
            datetime: record.created_at.clone().unwrap_or_default(),
            action_type: record.recommendation_type.clone().unwrap_or_default(),
            reason: record.reason.clone(),
            remark: record.remark.clone(),
            items: record
                .recommendation_items
                .iter()
                .map(|item| {
                    DiscussionRowItem::new(
                        item.budget_change_item_id,
                        item.recommended_qty,
                        item.budget_change_item.as_ref(),
                    )
                })
                .collect(),
            documents: record.attachments(),
        }
    }

    /// Review rows show the budget item's new order as the recommended quantity.
    fn from_review(role: Role, record: &ReviewRecord) -> Self {
        Self {
            id: Some(record.id),
            role,
            source: Some(RecordSource::Review),
            name: record.reviewer_name.clone().unwrap_or_default(),
            datetime: record.created_at.clone().unwrap_or_default(),
            action_type: record.review_type.clone().unwrap_or_default(),
            reason: None,
            remark: record.remark.clone(),
            items: record
                .review_items
                .iter()
                .map(|item| {
                    let details = item.budget_change_item.as_ref();
                    DiscussionRowItem::new(
                        item.budget_change_item_id,
                        details.and_then(|details| details.new_order),
                        details,
                    )
                })
                .collect(),
            documents: Vec::new(),
        }
    }

    pub fn has_action(&self) -> bool {
        !self.action_type.is_empty()
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.datetime)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Discussion {
    pub items: Vec<DiscussionItem>,
}

impl Discussion {
    pub fn assemble(recommendations: &[RecommendationRecord], reviews: &[ReviewRecord]) -> Self {
        Self::from_index(&ActionIndex::build(recommendations, reviews))
    }

    pub fn from_index(index: &ActionIndex<'_>) -> Self {
        let items = ROLE_ORDER
            .into_iter()
            .map(|role| match index.get(role) {
                Some(Action::Recommendation(record)) => {
                    DiscussionItem::from_recommendation(role, record)
                }
                Some(Action::Review(record)) => DiscussionItem::from_review(role, record),
                None => DiscussionItem::empty(role),
            })
            .collect();

        Self { items }
    }

    pub fn item(&self, role: Role) -> Option<&DiscussionItem> {
        self.items.iter().find(|item| item.role == role)
    }

    /// QS, CM and SITE each have a record on file.
    pub fn pre_steps_completed(&self) -> bool {
        PRE_STEP_ROLES
            .into_iter()
            .all(|role| self.item(role).map(|item| item.id.is_some()).unwrap_or(false))
    }

    /// PD or MGM has filed a decision.
    pub fn final_step_completed(&self) -> bool {
        FINAL_STEP_ROLES
            .into_iter()
            .any(|role| self.item(role).map(DiscussionItem::has_action).unwrap_or(false))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeSeverity {
    Success,
    Danger,
    Warn,
    Secondary,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepIcon {
    CheckCircle,
    Clock,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepBadge {
    pub label: String,
    pub severity: BadgeSeverity,
    pub icon: StepIcon,
}

impl StepBadge {
    pub fn from_step(step: &FlowStep, item: &DiscussionItem) -> Self {
        let (label, severity) = match step.status {
            FlowStatus::Approved => (acted_label(item, "Approved"), BadgeSeverity::Success),
            FlowStatus::Rejected => (acted_label(item, "Rejected"), BadgeSeverity::Danger),
            FlowStatus::Pending => ("Pending".to_string(), BadgeSeverity::Warn),
            FlowStatus::Waiting => ("Waiting".to_string(), BadgeSeverity::Secondary),
        };
        let icon = if item.id.is_some() { StepIcon::CheckCircle } else { StepIcon::Clock };

        Self { label, severity, icon }
    }
}

fn acted_label(item: &DiscussionItem, fallback: &str) -> String {
    if item.has_action() {
        item.action_type.clone()
    } else {
        fallback.to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub step: FlowStep,
    pub badge: StepBadge,
    pub item: DiscussionItem,
}

/// Discussion items paired with the resolver's steps, so badges and gating
/// read from one source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiscussionView {
    pub flow: ApprovalFlow,
    pub discussion: Discussion,
}

impl DiscussionView {
    pub fn new(flow: ApprovalFlow, discussion: Discussion) -> Self {
        Self { flow, discussion }
    }

    pub fn entries(&self) -> Vec<TimelineEntry> {
        self.flow
            .steps
            .iter()
            .map(|step| {
                let item = self
                    .discussion
                    .item(step.role)
                    .cloned()
                    .unwrap_or_else(|| DiscussionItem::empty(step.role));
                TimelineEntry { step: *step, badge: StepBadge::from_step(step, &item), item }
            })
            .collect()
    }
}
