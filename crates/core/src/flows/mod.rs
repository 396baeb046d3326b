pub mod engine;
pub mod states;

pub use engine::{resolve, FlowResolver};
pub use states::{ApprovalFlow, FlowOutcome, FlowStatus, FlowStep, RejectionPolicy};
