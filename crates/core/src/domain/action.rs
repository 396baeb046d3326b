use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::record::{RecommendationRecord, ReviewRecord};
use crate::domain::role::Role;

/// What a role did, whichever list it arrived in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Action<'a> {
    Recommendation(&'a RecommendationRecord),
    Review(&'a ReviewRecord),
}

impl<'a> Action<'a> {
    /// The action text, `None` when missing or empty.
    pub fn action_type(&self) -> Option<&'a str> {
        let raw = match self {
            Self::Recommendation(record) => record.recommendation_type.as_deref(),
            Self::Review(record) => record.review_type.as_deref(),
        };
        raw.filter(|text| !text.is_empty())
    }

    pub fn is_completed(&self) -> bool {
        self.action_type().is_some()
    }

    pub fn is_rejection(&self) -> bool {
        self.action_type().map(is_rejection_text).unwrap_or(false)
    }

    pub fn record_id(&self) -> u64 {
        match self {
            Self::Recommendation(record) => record.id,
            Self::Review(record) => record.id,
        }
    }

    pub fn source(&self) -> RecordSource {
        match self {
            Self::Recommendation(_) => RecordSource::Recommendation,
            Self::Review(_) => RecordSource::Review,
        }
    }
}

pub fn is_rejection_text(text: &str) -> bool {
    text.to_lowercase().contains("reject")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    Recommendation,
    Review,
}

/// A record whose department or approval level names no known role.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmatchedRecord {
    pub source: RecordSource,
    pub record_id: u64,
    pub raw_role: String,
}

/// One action per role: first recommendation by department, else first review by approval level.
#[derive(Clone, Debug, Default)]
pub struct ActionIndex<'a> {
    actions: BTreeMap<Role, Action<'a>>,
    unmatched: Vec<UnmatchedRecord>,
}

impl<'a> ActionIndex<'a> {
    pub fn build(recommendations: &'a [RecommendationRecord], reviews: &'a [ReviewRecord]) -> Self {
        let mut by_department: BTreeMap<Role, &'a RecommendationRecord> = BTreeMap::new();
        let mut by_level: BTreeMap<Role, &'a ReviewRecord> = BTreeMap::new();
        let mut unmatched = Vec::new();

        for record in recommendations {
            let raw = record.department.as_deref().unwrap_or_default();
            match Role::from_department(raw) {
                Some(role) => {
                    by_department.entry(role).or_insert(record);
                }
                None => unmatched.push(UnmatchedRecord {
                    source: RecordSource::Recommendation,
                    record_id: record.id,
                    raw_role: raw.to_string(),
                }),
            }
        }

        for record in reviews {
            let raw = record.approval_level.as_deref().unwrap_or_default();
            match Role::from_approval_level(raw) {
                Some(role) => {
                    by_level.entry(role).or_insert(record);
                }
                None => unmatched.push(UnmatchedRecord {
                    source: RecordSource::Review,
                    record_id: record.id,
                    raw_role: raw.to_string(),
                }),
            }
        }

        for record in &unmatched {
            warn!(
                event_name = "bcr.flow.unmatched_record",
                source = ?record.source,
                record_id = record.record_id,
                raw_role = %record.raw_role,
                "record does not name a known approval role and is ignored"
            );
        }

        let mut actions = BTreeMap::new();
        for (role, record) in by_level {
            actions.insert(role, Action::Review(record));
        }
        for (role, record) in by_department {
            actions.insert(role, Action::Recommendation(record));
        }

        Self { actions, unmatched }
    }

    pub fn get(&self, role: Role) -> Option<Action<'a>> {
        self.actions.get(&role).copied()
    }

    pub fn is_completed(&self, role: Role) -> bool {
        self.get(role).map(|action| action.is_completed()).unwrap_or(false)
    }

    pub fn into_unmatched(self) -> Vec<UnmatchedRecord> {
        self.unmatched
    }
}
