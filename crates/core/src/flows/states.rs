use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::action::UnmatchedRecord;
use crate::domain::role::Role;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowStatus {
    Approved,
    Pending,
    Waiting,
    Rejected,
}

impl FlowStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Pending => "pending",
            Self::Waiting => "waiting",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStep {
    pub role: Role,
    pub status: FlowStatus,
}

/// What a rejection does to the roles after it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionPolicy {
    /// Every role is resolved independently; a rejection does not stop later roles.
    #[default]
    Continue,
    /// A rejection closes the flow: later roles without their own action wait,
    /// and the pending pointer never moves past the rejecting role.
    Halt,
}

impl FromStr for RejectionPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "continue" => Ok(Self::Continue),
            "halt" => Ok(Self::Halt),
            other => Err(format!("unsupported rejection policy `{other}` (expected continue|halt)")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FlowOutcome {
    InProgress { pending: Role },
    Approved,
    Rejected { by: Role },
}

/// Resolved per-role view of one budget change request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalFlow {
    pub steps: Vec<FlowStep>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unmatched: Vec<UnmatchedRecord>,
}

impl ApprovalFlow {
    pub fn status_of(&self, role: Role) -> Option<FlowStatus> {
        self.steps.iter().find(|step| step.role == role).map(|step| step.status)
    }

    pub fn pending_role(&self) -> Option<Role> {
        self.steps.iter().find(|step| step.status == FlowStatus::Pending).map(|step| step.role)
    }

    pub fn rejected_role(&self) -> Option<Role> {
        self.steps.iter().find(|step| step.status == FlowStatus::Rejected).map(|step| step.role)
    }

    pub fn is_resolved(&self) -> bool {
        self.pending_role().is_none()
    }

    pub fn outcome(&self) -> FlowOutcome {
        if let Some(pending) = self.pending_role() {
            return FlowOutcome::InProgress { pending };
        }

        match self.rejected_role() {
            Some(by) => FlowOutcome::Rejected { by },
            None => FlowOutcome::Approved,
        }
    }
}
