pub mod options;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::discussion::{Discussion, DiscussionItem};
use crate::domain::action::RecordSource;
use crate::domain::record::{
    FinalDecisionPayload, RecommendationPayload, RecommendedItem, ReviewedItem,
};
use crate::domain::role::Role;
use crate::flows::states::{ApprovalFlow, FlowStatus};

use self::options::{role_config, ReasonOption, RecommendationOption};

/// What the signed-in user is offered for a request, before server checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActingCapability {
    CreateRecommendation,
    SubmitReview,
    None,
}

/// Maps a project role code to its capability. Codes match exactly.
pub fn capability_for(user_role: Option<&str>) -> ActingCapability {
    match user_role.and_then(Role::from_approval_level) {
        Some(role) if role.is_creator() => ActingCapability::CreateRecommendation,
        Some(_) => ActingCapability::SubmitReview,
        None => ActingCapability::None,
    }
}

pub struct ActingGate;

impl ActingGate {
    /// True when `role` holds the pending step.
    pub fn may_act(role: Role, flow: &ApprovalFlow) -> bool {
        flow.status_of(role) == Some(FlowStatus::Pending)
    }

    pub fn check(user_role: Option<&str>, flow: &ApprovalFlow) -> Result<Role, ActingDenial> {
        let Some(raw) = user_role.filter(|raw| !raw.is_empty()) else {
            return Err(ActingDenial::MissingRole);
        };
        let Some(role) = Role::from_approval_level(raw) else {
            return Err(ActingDenial::UnknownRole { user_role: raw.to_string() });
        };

        match flow.status_of(role) {
            Some(FlowStatus::Pending) => Ok(role),
            Some(status) => Err(ActingDenial::StepNotPending { role, status }),
            None => Err(ActingDenial::UnknownRole { user_role: raw.to_string() }),
        }
    }

    /// Finds the recommendation `user_role` filed and may still edit.
    pub fn check_edit(
        user_role: Option<&str>,
        discussion: &Discussion,
    ) -> Result<EditTarget, ActingDenial> {
        let Some(raw) = user_role.filter(|raw| !raw.is_empty()) else {
            return Err(ActingDenial::MissingRole);
        };
        let Some(role) = Role::from_approval_level(raw) else {
            return Err(ActingDenial::UnknownRole { user_role: raw.to_string() });
        };

        discussion
            .item(role)
            .filter(|item| can_edit_item(true, Some(raw), item))
            .filter(|item| item.source == Some(RecordSource::Recommendation))
            .and_then(|item| item.id)
            .map(|recommendation_id| EditTarget { role, recommendation_id })
            .ok_or(ActingDenial::NothingToEdit { role })
    }
}

/// A filed recommendation and the role allowed to rewrite it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct EditTarget {
    pub role: Role,
    pub recommendation_id: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActingDenial {
    MissingRole,
    UnknownRole { user_role: String },
    StepNotPending { role: Role, status: FlowStatus },
    NothingToEdit { role: Role },
}

impl ActingDenial {
    pub fn reason(&self) -> String {
        match self {
            Self::MissingRole => "no project role is assigned".to_string(),
            Self::UnknownRole { user_role } => {
                format!("role `{user_role}` takes no part in budget change approval")
            }
            Self::StepNotPending { role, status } => {
                format!("step `{role}` is {status}, not pending")
            }
            Self::NothingToEdit { role } => {
                format!("{role} has no filed recommendation it may edit")
            }
        }
    }
}

/// Creators may edit their own filed comment while edit mode is on.
pub fn can_edit_item(edit_mode: bool, user_role: Option<&str>, item: &DiscussionItem) -> bool {
    if !edit_mode || item.id.is_none() {
        return false;
    }

    match user_role.and_then(Role::from_approval_level) {
        Some(role) => role.is_creator() && role == item.role,
        None => false,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemQuantity {
    pub budget_change_item_id: u64,
    pub quantity: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionDraft {
    pub option: RecommendationOption,
    #[serde(default)]
    pub reason: Option<ReasonOption>,
    #[serde(default)]
    pub remark: Option<String>,
    #[serde(default)]
    pub items: Vec<ItemQuantity>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubmissionFailure {
    OptionNotOffered { role: Role, option: RecommendationOption },
    ReasonNotOffered { role: Role, reason: ReasonOption },
    ReasonRequired { role: Role },
    DetailRequired,
    QuantitiesRequired,
    NegativeQuantity { budget_change_item_id: u64, quantity: Decimal },
    DuplicateItem { budget_change_item_id: u64 },
    RemarkRequired,
    NotARecommendation { role: Role },
}

impl SubmissionFailure {
    pub fn reason(&self) -> String {
        match self {
            Self::OptionNotOffered { role, option } => {
                format!("`{}` is not an option for {role}", option.wire_value())
            }
            Self::ReasonNotOffered { role, reason } => {
                format!("reason `{}` is not offered to {role}", reason.label())
            }
            Self::ReasonRequired { role } => format!("{role} must pick a reason"),
            Self::DetailRequired => "an `Others` reason needs a remark".to_string(),
            Self::QuantitiesRequired => "a specific quantity needs at least one item".to_string(),
            Self::NegativeQuantity { budget_change_item_id, quantity } => {
                format!("item {budget_change_item_id} has negative quantity {quantity}")
            }
            Self::DuplicateItem { budget_change_item_id } => {
                format!("item {budget_change_item_id} is listed more than once")
            }
            Self::RemarkRequired => "an edit needs a remark".to_string(),
            Self::NotARecommendation { role } => {
                format!("{role} files reviews, which cannot be edited")
            }
        }
    }
}

/// A validated request body, routed to the endpoint the role files through.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Submission {
    Recommendation(RecommendationPayload),
    Review(FinalDecisionPayload),
}

impl SubmissionDraft {
    pub fn validate(self, role: Role) -> Result<Submission, SubmissionFailure> {
        let config = role_config(role);

        if !config.allows(self.option) {
            return Err(SubmissionFailure::OptionNotOffered { role, option: self.option });
        }

        let remark = self.remark.map(|remark| remark.trim().to_string()).filter(|r| !r.is_empty());

        match self.reason {
            Some(reason) if !config.allows_reason(reason) => {
                return Err(SubmissionFailure::ReasonNotOffered { role, reason });
            }
            Some(reason) if reason.requires_detail() && remark.is_none() => {
                return Err(SubmissionFailure::DetailRequired);
            }
            None if role.is_creator() => return Err(SubmissionFailure::ReasonRequired { role }),
            _ => {}
        }

        if self.option.requires_quantities() {
            if self.items.is_empty() {
                return Err(SubmissionFailure::QuantitiesRequired);
            }
            let mut seen = Vec::with_capacity(self.items.len());
            for item in &self.items {
                if item.quantity.is_sign_negative() && !item.quantity.is_zero() {
                    return Err(SubmissionFailure::NegativeQuantity {
                        budget_change_item_id: item.budget_change_item_id,
                        quantity: item.quantity,
                    });
                }
                if seen.contains(&item.budget_change_item_id) {
                    return Err(SubmissionFailure::DuplicateItem {
                        budget_change_item_id: item.budget_change_item_id,
                    });
                }
                seen.push(item.budget_change_item_id);
            }
        }

        if role.is_creator() {
            let items = self
                .items
                .iter()
                .map(|item| RecommendedItem {
                    budget_change_item_id: item.budget_change_item_id,
                    recommended_qty: item.quantity,
                })
                .collect();
            let mut payload = RecommendationPayload::new(self.option, remark, items);
            if let Some(reason) = self.reason {
                payload = payload.with_reason(reason.label());
            }
            return Ok(Submission::Recommendation(payload));
        }

        let items = self
            .items
            .iter()
            .map(|item| ReviewedItem {
                budget_change_item_id: item.budget_change_item_id,
                approved_qty: item.quantity,
            })
            .collect();
        Ok(Submission::Review(FinalDecisionPayload::new(self.option, remark, items)))
    }

    /// Edits follow the submission rules and always carry a remark.
    pub fn validate_edit(self, role: Role) -> Result<RecommendationPayload, SubmissionFailure> {
        if self.remark.as_deref().map(str::trim).unwrap_or_default().is_empty() {
            return Err(SubmissionFailure::RemarkRequired);
        }

        match self.validate(role)? {
            Submission::Recommendation(payload) => Ok(payload),
            Submission::Review(_) => Err(SubmissionFailure::NotARecommendation { role }),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::options::{ReasonOption, RecommendationOption};
    use super::{
        can_edit_item, capability_for, ActingCapability, ActingDenial, ActingGate, EditTarget,
        ItemQuantity, Submission, SubmissionDraft, SubmissionFailure,
    };
    use crate::discussion::{Discussion, DiscussionItem};
    use crate::domain::record::{RecommendationRecord, ReviewRecord};
    use crate::domain::role::Role;
    use crate::flows::engine::FlowResolver;
    use crate::flows::states::FlowStatus;

    fn draft(option: RecommendationOption) -> SubmissionDraft {
        SubmissionDraft { option, reason: None, remark: None, items: Vec::new() }
    }

    fn qty(id: u64, value: i64) -> ItemQuantity {
        ItemQuantity { budget_change_item_id: id, quantity: Decimal::from(value) }
    }

    #[test]
    fn capability_depends_on_exact_role_code() {
        assert_eq!(capability_for(Some("QS")), ActingCapability::CreateRecommendation);
        assert_eq!(capability_for(Some("SITE")), ActingCapability::CreateRecommendation);
        assert_eq!(capability_for(Some("PD")), ActingCapability::SubmitReview);
        assert_eq!(capability_for(Some("qs")), ActingCapability::None);
        assert_eq!(capability_for(Some("PURC")), ActingCapability::None);
        assert_eq!(capability_for(None), ActingCapability::None);
    }

    #[test]
    fn only_the_pending_role_may_act() {
        let recs = vec![RecommendationRecord {
            id: 1,
            department: Some("QS".to_string()),
            recommendation_type: Some("Keep_Original".to_string()),
            ..RecommendationRecord::default()
        }];
        let flow = FlowResolver::default().resolve(&recs, &[]);

        assert!(ActingGate::may_act(Role::Cm, &flow));
        assert!(!ActingGate::may_act(Role::Qs, &flow));
        assert!(!ActingGate::may_act(Role::Pd, &flow));

        assert_eq!(ActingGate::check(Some("CM"), &flow), Ok(Role::Cm));
        assert_eq!(
            ActingGate::check(Some("QS"), &flow),
            Err(ActingDenial::StepNotPending { role: Role::Qs, status: FlowStatus::Approved })
        );
        assert_eq!(ActingGate::check(None, &flow), Err(ActingDenial::MissingRole));
        let denial = ActingGate::check(Some("PURC"), &flow).expect_err("unknown role is denied");
        assert!(denial.reason().contains("PURC"));
    }

    #[test]
    fn creators_edit_only_their_own_filed_item() {
        let mut item = DiscussionItem::empty(Role::Site);
        assert!(!can_edit_item(true, Some("SITE"), &item));

        item.id = Some(4);
        assert!(can_edit_item(true, Some("SITE"), &item));
        assert!(!can_edit_item(false, Some("SITE"), &item));
        assert!(!can_edit_item(true, Some("QS"), &item));
        assert!(!can_edit_item(true, None, &item));

        let mut review = DiscussionItem::empty(Role::Pd);
        review.id = Some(9);
        assert!(!can_edit_item(true, Some("PD"), &review));
    }

    #[test]
    fn creator_submission_becomes_recommendation_with_reason() {
        let submission = SubmissionDraft {
            reason: Some(ReasonOption::InaccurateBudget),
            items: vec![qty(3, 12)],
            ..draft(RecommendationOption::SpecificQuantity)
        }
        .validate(Role::Site)
        .expect("site draft is valid");

        let Submission::Recommendation(payload) = submission else {
            panic!("expected a recommendation payload");
        };
        assert_eq!(payload.reason.as_deref(), Some("Inaccurate budget"));
        assert_eq!(payload.recommended_items.len(), 1);
    }

    #[test]
    fn reviewer_submission_becomes_final_decision() {
        let submission = SubmissionDraft {
            remark: Some("  follow QS  ".to_string()),
            items: vec![qty(3, 12)],
            ..draft(RecommendationOption::ApproveQs)
        }
        .validate(Role::Pd)
        .expect("pd draft is valid");

        let Submission::Review(payload) = submission else {
            panic!("expected a final decision payload");
        };
        assert_eq!(payload.review_type, "Approve_QS");
        assert_eq!(payload.remark.as_deref(), Some("follow QS"));
        assert!(payload.reviewed_items.is_none());
    }

    #[test]
    fn rejects_options_and_reasons_outside_the_role_form() {
        assert_eq!(
            draft(RecommendationOption::Approve).validate(Role::Pd),
            Err(SubmissionFailure::OptionNotOffered {
                role: Role::Pd,
                option: RecommendationOption::Approve,
            })
        );
        assert_eq!(
            SubmissionDraft {
                reason: Some(ReasonOption::TheftOrDamage),
                ..draft(RecommendationOption::KeepOriginal)
            }
            .validate(Role::Qs),
            Err(SubmissionFailure::ReasonNotOffered {
                role: Role::Qs,
                reason: ReasonOption::TheftOrDamage,
            })
        );
        assert_eq!(
            draft(RecommendationOption::KeepOriginal).validate(Role::Qs),
            Err(SubmissionFailure::ReasonRequired { role: Role::Qs })
        );
    }

    #[test]
    fn others_reason_needs_a_remark() {
        let failure = SubmissionDraft {
            reason: Some(ReasonOption::Others),
            remark: Some("   ".to_string()),
            ..draft(RecommendationOption::KeepOriginal)
        }
        .validate(Role::Qs);
        assert_eq!(failure, Err(SubmissionFailure::DetailRequired));
    }

    #[test]
    fn specific_quantity_needs_clean_item_list() {
        assert_eq!(
            draft(RecommendationOption::SpecificQuantity).validate(Role::Mgm),
            Err(SubmissionFailure::QuantitiesRequired)
        );
        assert_eq!(
            SubmissionDraft {
                items: vec![qty(1, 5), qty(1, 6)],
                ..draft(RecommendationOption::SpecificQuantity)
            }
            .validate(Role::Mgm),
            Err(SubmissionFailure::DuplicateItem { budget_change_item_id: 1 })
        );
        assert_eq!(
            SubmissionDraft {
                items: vec![qty(2, -1)],
                ..draft(RecommendationOption::SpecificQuantity)
            }
            .validate(Role::Mgm),
            Err(SubmissionFailure::NegativeQuantity {
                budget_change_item_id: 2,
                quantity: Decimal::from(-1),
            })
        );
    }

    #[test]
    fn site_owns_its_item_even_when_filed_as_a_review() {
        let revs = vec![ReviewRecord {
            id: 7,
            approval_level: Some("SITE".to_string()),
            review_type: Some("Approve".to_string()),
            ..ReviewRecord::default()
        }];
        let discussion = crate::discussion::Discussion::assemble(&[], &revs);
        let site = discussion.item(Role::Site).expect("site item");

        assert!(can_edit_item(true, Some("SITE"), site));
    }

    #[test]
    fn edit_targets_the_callers_own_recommendation() {
        let recs = vec![RecommendationRecord {
            id: 41,
            department: Some("qs".to_string()),
            recommendation_type: Some("Keep_Original".to_string()),
            ..RecommendationRecord::default()
        }];
        let revs = vec![ReviewRecord {
            id: 42,
            approval_level: Some("SITE".to_string()),
            review_type: Some("Approve".to_string()),
            ..ReviewRecord::default()
        }];
        let discussion = crate::discussion::Discussion::assemble(&recs, &revs);

        assert_eq!(
            ActingGate::check_edit(Some("QS"), &discussion),
            Ok(EditTarget { role: Role::Qs, recommendation_id: 41 })
        );
        assert_eq!(
            ActingGate::check_edit(Some("SITE"), &discussion),
            Err(ActingDenial::NothingToEdit { role: Role::Site })
        );
        assert_eq!(
            ActingGate::check_edit(Some("CM"), &discussion),
            Err(ActingDenial::NothingToEdit { role: Role::Cm })
        );
        assert_eq!(ActingGate::check_edit(Some(""), &discussion), Err(ActingDenial::MissingRole));
    }

    #[test]
    fn edits_need_a_remark_and_a_creator_role() {
        let valid = SubmissionDraft {
            reason: Some(ReasonOption::BudgetAdjustment),
            ..draft(RecommendationOption::KeepOriginal)
        };

        assert_eq!(valid.clone().validate_edit(Role::Qs), Err(SubmissionFailure::RemarkRequired));

        let with_remark = SubmissionDraft { remark: Some("recounted".to_string()), ..valid };
        let payload = with_remark.validate_edit(Role::Qs).expect("edit is valid");
        assert_eq!(payload.recommendation_type, "Keep_Original");
        assert_eq!(payload.remark.as_deref(), Some("recounted"));

        let review = SubmissionDraft {
            remark: Some("fine".to_string()),
            ..draft(RecommendationOption::Approve)
        };
        assert_eq!(
            review.validate_edit(Role::Cm),
            Err(SubmissionFailure::NotARecommendation { role: Role::Cm })
        );
    }
}
