use serde::{Deserialize, Serialize};

use crate::domain::role::Role;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReasonOption {
    #[serde(rename = "VO: AI/EI or Site Instruction (SI) to be attached")]
    VariationOrderInstruction,
    #[serde(rename = "Theft case / material damages (police report or photo to be attached)")]
    TheftOrDamage,
    #[serde(
        rename = "Mock up budget: request of material budget revision based on completed mock up unit"
    )]
    MockupRevisionRequest,
    #[serde(rename = "Inaccurate budget")]
    InaccurateBudget,
    #[serde(rename = "Overall remeasurement (please attached revised budgetory sheet)")]
    OverallRemeasurement,
    #[serde(
        rename = "Mock up budget: revise of material budget revision based on completed mock up unit"
    )]
    MockupRevision,
    #[serde(rename = "Budget adjustment/refinement; ie. BQ quantity insufficient etc.")]
    BudgetAdjustment,
    #[serde(rename = "VO and changes (could be own initiation etc)")]
    VariationOrderChanges,
    #[serde(rename = "Others (please specify)")]
    Others,
}

impl ReasonOption {
    /// The backend stores the label itself as the reason value.
    pub fn label(self) -> &'static str {
        match self {
            Self::VariationOrderInstruction => "VO: AI/EI or Site Instruction (SI) to be attached",
            Self::TheftOrDamage => {
                "Theft case / material damages (police report or photo to be attached)"
            }
            Self::MockupRevisionRequest => {
                "Mock up budget: request of material budget revision based on completed mock up unit"
            }
            Self::InaccurateBudget => "Inaccurate budget",
            Self::OverallRemeasurement => {
                "Overall remeasurement (please attached revised budgetory sheet)"
            }
            Self::MockupRevision => {
                "Mock up budget: revise of material budget revision based on completed mock up unit"
            }
            Self::BudgetAdjustment => {
                "Budget adjustment/refinement; ie. BQ quantity insufficient etc."
            }
            Self::VariationOrderChanges => "VO and changes (could be own initiation etc)",
            Self::Others => "Others (please specify)",
        }
    }

    pub fn requires_detail(self) -> bool {
        self == Self::Others
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecommendationOption {
    #[serde(rename = "Keep_Original")]
    KeepOriginal,
    #[serde(rename = "Specific_Quantity")]
    SpecificQuantity,
    #[serde(rename = "Approve")]
    Approve,
    #[serde(rename = "Reject")]
    Reject,
    #[serde(rename = "Approve_QS")]
    ApproveQs,
    #[serde(rename = "Approve_Site")]
    ApproveSite,
    #[serde(rename = "Approve_As_Requested")]
    ApproveAsRequested,
    #[serde(rename = "Approve_PD")]
    ApprovePd,
}

impl RecommendationOption {
    pub fn wire_value(self) -> &'static str {
        match self {
            Self::KeepOriginal => "Keep_Original",
            Self::SpecificQuantity => "Specific_Quantity",
            Self::Approve => "Approve",
            Self::Reject => "Reject",
            Self::ApproveQs => "Approve_QS",
            Self::ApproveSite => "Approve_Site",
            Self::ApproveAsRequested => "Approve_As_Requested",
            Self::ApprovePd => "Approve_PD",
        }
    }

    /// Only a specific-quantity instruction carries per-item quantities.
    pub fn requires_quantities(self) -> bool {
        self == Self::SpecificQuantity
    }
}

/// Options a role may pick when filing its recommendation or review.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoleFormConfig {
    pub reasons: &'static [ReasonOption],
    pub recommendations: &'static [(RecommendationOption, &'static str)],
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FormOption {
    pub value: &'static str,
    pub label: &'static str,
}

impl RoleFormConfig {
    pub fn reason_options(&self) -> Vec<FormOption> {
        self.reasons
            .iter()
            .map(|reason| FormOption { value: reason.label(), label: reason.label() })
            .collect()
    }

    pub fn recommendation_options(&self) -> Vec<FormOption> {
        self.recommendations
            .iter()
            .map(|(option, label)| FormOption { value: option.wire_value(), label: *label })
            .collect()
    }

    pub fn allows_reason(&self, reason: ReasonOption) -> bool {
        self.reasons.contains(&reason)
    }

    pub fn allows(&self, option: RecommendationOption) -> bool {
        self.recommendations.iter().any(|(allowed, _)| *allowed == option)
    }

    pub fn is_empty(&self) -> bool {
        self.reasons.is_empty() && self.recommendations.is_empty()
    }
}

const QS_REASONS: &[ReasonOption] = &[
    ReasonOption::OverallRemeasurement,
    ReasonOption::MockupRevision,
    ReasonOption::BudgetAdjustment,
    ReasonOption::VariationOrderChanges,
    ReasonOption::Others,
];

const SITE_REASONS: &[ReasonOption] = &[
    ReasonOption::VariationOrderInstruction,
    ReasonOption::TheftOrDamage,
    ReasonOption::MockupRevisionRequest,
    ReasonOption::InaccurateBudget,
    ReasonOption::Others,
];

const CREATOR_RECOMMENDATIONS: &[(RecommendationOption, &str)] = &[
    (RecommendationOption::SpecificQuantity, "Please change Budget Quantity"),
    (RecommendationOption::KeepOriginal, "Remain original budget"),
];

static QS_CONFIG: RoleFormConfig =
    RoleFormConfig { reasons: QS_REASONS, recommendations: CREATOR_RECOMMENDATIONS };

static CM_CONFIG: RoleFormConfig = RoleFormConfig {
    reasons: &[],
    recommendations: &[
        (RecommendationOption::Approve, "Accept Budget Qty according to QS recommendation"),
        (RecommendationOption::Reject, "Reject Budget Qty according to QS recommendation"),
    ],
};

static SITE_CONFIG: RoleFormConfig =
    RoleFormConfig { reasons: SITE_REASONS, recommendations: CREATOR_RECOMMENDATIONS };

static PD_CONFIG: RoleFormConfig = RoleFormConfig {
    reasons: &[],
    recommendations: &[
        (RecommendationOption::ApproveQs, "Please change Budget Qty according to QS recommendation"),
        (
            RecommendationOption::ApproveSite,
            "Please change Budget Qty according to Site recommendation",
        ),
        (RecommendationOption::SpecificQuantity, "Please change Budget Qty to"),
    ],
};

static MGM_CONFIG: RoleFormConfig = RoleFormConfig {
    reasons: &[],
    recommendations: &[
        (RecommendationOption::ApproveQs, "Please change Budget Qty according to QS recommendation"),
        (
            RecommendationOption::ApproveSite,
            "Please change Budget Qty according to Site recommendation",
        ),
        (
            RecommendationOption::ApprovePd,
            "Please change Budget Qty according to Project Head recommendation",
        ),
        (RecommendationOption::SpecificQuantity, "Please change Budget Qty to"),
    ],
};

static EMPTY_CONFIG: RoleFormConfig = RoleFormConfig { reasons: &[], recommendations: &[] };

pub fn role_config(role: Role) -> &'static RoleFormConfig {
    match role {
        Role::Qs => &QS_CONFIG,
        Role::Cm => &CM_CONFIG,
        Role::Site => &SITE_CONFIG,
        Role::Pd => &PD_CONFIG,
        Role::Mgm => &MGM_CONFIG,
    }
}

/// Looks up a user's project role code; unknown codes get no options.
pub fn role_config_for(role_code: &str) -> &'static RoleFormConfig {
    Role::from_approval_level(role_code).map(role_config).unwrap_or(&EMPTY_CONFIG)
}

#[cfg(test)]
mod tests {
    use super::{role_config, role_config_for, ReasonOption, RecommendationOption};
    use crate::domain::role::{Role, ROLE_ORDER};

    #[test]
    fn every_role_has_recommendation_options() {
        for role in ROLE_ORDER {
            assert!(!role_config(role).recommendations.is_empty(), "{role} has no options");
        }
    }

    #[test]
    fn only_creator_roles_choose_reasons() {
        for role in ROLE_ORDER {
            assert_eq!(!role_config(role).reasons.is_empty(), role.is_creator(), "{role}");
        }
    }

    #[test]
    fn cm_chooses_between_accept_and_reject() {
        let options: Vec<&str> =
            role_config(Role::Cm).recommendation_options().iter().map(|option| option.value).collect();
        assert_eq!(options, vec!["Approve", "Reject"]);
    }

    #[test]
    fn management_can_follow_project_head() {
        assert!(role_config(Role::Mgm).allows(RecommendationOption::ApprovePd));
        assert!(!role_config(Role::Pd).allows(RecommendationOption::ApprovePd));
    }

    #[test]
    fn site_uses_site_reasons_and_qs_uses_qs_reasons() {
        assert!(role_config(Role::Site).allows_reason(ReasonOption::TheftOrDamage));
        assert!(!role_config(Role::Qs).allows_reason(ReasonOption::TheftOrDamage));
        assert!(role_config(Role::Qs).allows_reason(ReasonOption::OverallRemeasurement));
    }

    #[test]
    fn unknown_role_codes_get_empty_config() {
        assert!(role_config_for("PURC").is_empty());
        assert!(role_config_for("qs").is_empty());
        assert!(!role_config_for("QS").is_empty());
    }

    #[test]
    fn wire_values_round_trip_through_serde() {
        let encoded = serde_json::to_string(&RecommendationOption::ApproveAsRequested)
            .expect("option serializes");
        assert_eq!(encoded, "\"Approve_As_Requested\"");

        let reason: ReasonOption =
            serde_json::from_str("\"Inaccurate budget\"").expect("reason deserializes");
        assert_eq!(reason, ReasonOption::InaccurateBudget);
        assert!(ReasonOption::Others.requires_detail());
    }
}
