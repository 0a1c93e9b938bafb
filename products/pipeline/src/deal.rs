use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::stage::Stage;

/// A sales opportunity tracked through the pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deal {
    pub id: Uuid,
    pub title: String,
    pub current_stage: Stage,
    /// Present only while the deal sits in Closed Lost or Declined to Bid.
    pub sub_reason: Option<String>,
    /// Bumped by every committed save; used for optimistic locking.
    pub version: i64,
    pub stage_changed_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deal {
    /// A fresh deal at the start of the pipeline.
    pub fn open(title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            current_stage: Stage::NewRequest,
            sub_reason: None,
            version: 1,
            stage_changed_at: now,
            closed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.current_stage.is_terminal()
    }

    pub fn is_won(&self) -> bool {
        self.current_stage.is_won()
    }

    pub fn probability(&self) -> u8 {
        self.current_stage.default_probability()
    }

    pub fn days_in_stage(&self, now: DateTime<Utc>) -> i64 {
        (now - self.stage_changed_at).num_days()
    }

    /// Checks the sub-reason rule: non-empty iff the stage is a loss outcome.
    pub fn sub_reason_consistent(&self) -> bool {
        let has_reason = self
            .sub_reason
            .as_deref()
            .is_some_and(|reason| !reason.trim().is_empty());
        has_reason == self.current_stage.requires_sub_reason()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    BdStaff,
    Estimator,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::BdStaff => "BD_STAFF",
            Role::Estimator => "ESTIMATOR",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Role::Admin),
            "BD_STAFF" => Ok(Role::BdStaff),
            "ESTIMATOR" => Ok(Role::Estimator),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// The staff member performing an operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }

    pub fn staff(id: Uuid) -> Self {
        Self::new(id, Role::BdStaff)
    }

    pub fn admin(id: Uuid) -> Self {
        Self::new(id, Role::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// One committed stage move. Never mutated after it is written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTransition {
    pub id: Uuid,
    pub deal_id: Uuid,
    /// Deal version this transition committed; orders a deal's history.
    pub sequence: i64,
    pub from_stage: Stage,
    pub to_stage: Stage,
    pub actor: Actor,
    pub reason: Option<String>,
    pub overridden: bool,
    pub timestamp: DateTime<Utc>,
}
