use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// A sign-off role in the budget change request chain.
///
/// Variant order is the workflow order, so `Ord` doubles as approval precedence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "QS")]
    Qs,
    #[serde(rename = "CM")]
    Cm,
    #[serde(rename = "SITE")]
    Site,
    #[serde(rename = "PD")]
    Pd,
    #[serde(rename = "MGM")]
    Mgm,
}

pub const ROLE_ORDER: [Role; 5] = [Role::Qs, Role::Cm, Role::Site, Role::Pd, Role::Mgm];

/// Roles that file recommendations rather than reviews.
pub const CREATOR_ROLES: [Role; 2] = [Role::Qs, Role::Site];

/// Roles whose records must all exist before the final decision opens.
pub const PRE_STEP_ROLES: [Role; 3] = [Role::Qs, Role::Cm, Role::Site];

/// Either of these acting closes the final decision step.
pub const FINAL_STEP_ROLES: [Role; 2] = [Role::Pd, Role::Mgm];

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Qs => "QS",
            Self::Cm => "CM",
            Self::Site => "SITE",
            Self::Pd => "PD",
            Self::Mgm => "MGM",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_creator(self) -> bool {
        CREATOR_ROLES.contains(&self)
    }

    /// Recommendation matching: ASCII case-insensitive, untrimmed.
    pub fn from_department(department: &str) -> Option<Role> {
        ROLE_ORDER.into_iter().find(|role| role.as_str().eq_ignore_ascii_case(department))
    }

    /// Review matching: exact, case-sensitive equality.
    pub fn from_approval_level(approval_level: &str) -> Option<Role> {
        ROLE_ORDER.into_iter().find(|role| role.as_str() == approval_level)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Role::from_department(value.trim())
            .ok_or_else(|| DomainError::UnknownRole { role: value.trim().to_string() })
    }
}
