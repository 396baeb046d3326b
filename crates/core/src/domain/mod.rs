pub mod action;
pub mod record;
pub mod role;

pub use action::{Action, ActionIndex, RecordSource, UnmatchedRecord};
pub use record::{
    ApiEnvelope, AttachmentRef, BcrId, BudgetChangeItemDetails, FinalDecisionPayload,
    RecommendationItem, RecommendationPayload, RecommendationRecord, RecommendedItem, ReviewItem,
    ReviewRecord, ReviewedItem,
};
pub use role::{Role, CREATOR_ROLES, FINAL_STEP_ROLES, PRE_STEP_ROLES, ROLE_ORDER};
