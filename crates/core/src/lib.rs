pub mod approvals;
pub mod config;
pub mod discussion;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod source;

pub use approvals::options::{role_config, role_config_for, RoleFormConfig};
pub use approvals::{
    can_edit_item, capability_for, ActingCapability, ActingDenial, ActingGate, Submission,
    SubmissionDraft, SubmissionFailure,
};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions};
pub use discussion::{Discussion, DiscussionItem, DiscussionView, StepBadge, TimelineEntry};
pub use domain::record::BcrId;
pub use domain::role::Role;
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{resolve, ApprovalFlow, FlowOutcome, FlowResolver, FlowStatus, FlowStep, RejectionPolicy};
pub use source::{BcrSource, FetchSequencer, FetchTicket, FlowLoader, InMemoryBcrSource, LoadedFlow};
