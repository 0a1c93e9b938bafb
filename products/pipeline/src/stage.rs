use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pipeline stages in board order.
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    #[default]
    NewRequest,
    Engaged,
    EstimateInProgress,
    EstimateSent,
    FollowUp,
    Negotiation,
    ClosedWon,
    ClosedLost,
    DeclinedToBid,
}

/// A suggested sub-reason for a loss outcome. Free text is accepted too;
/// these are the codes clients offer as choices.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub struct SubReasonOption {
    pub code: &'static str,
    pub label: &'static str,
}

const fn option(code: &'static str, label: &'static str) -> SubReasonOption {
    SubReasonOption { code, label }
}

static CLOSED_LOST_REASONS: [SubReasonOption; 5] = [
    option("PRICE", "Price Too High"),
    option("TIMELINE", "Timeline Issues"),
    option("COMPETITOR", "Lost to Competitor"),
    option("UNRESPONSIVE", "Client Unresponsive"),
    option("OTHER", "Other"),
];

static DECLINED_REASONS: [SubReasonOption; 5] = [
    option("TOO_SMALL", "Project Too Small"),
    option("NOT_OUR_SCOPE", "Not Our Scope of Work"),
    option("TIMING", "Timing Not Right"),
    option("CAPACITY", "No Capacity"),
    option("OTHER", "Other"),
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown stage key: {0}")]
pub struct UnknownStage(pub String);

impl Stage {
    pub const ALL: [Stage; 9] = [
        Stage::NewRequest,
        Stage::Engaged,
        Stage::EstimateInProgress,
        Stage::EstimateSent,
        Stage::FollowUp,
        Stage::Negotiation,
        Stage::ClosedWon,
        Stage::ClosedLost,
        Stage::DeclinedToBid,
    ];

    /// Stages that still count toward the open pipeline.
    pub const ACTIVE: [Stage; 6] = [
        Stage::NewRequest,
        Stage::Engaged,
        Stage::EstimateInProgress,
        Stage::EstimateSent,
        Stage::FollowUp,
        Stage::Negotiation,
    ];

    pub const CLOSED: [Stage; 3] = [Stage::ClosedWon, Stage::ClosedLost, Stage::DeclinedToBid];

    /// Storage and wire key. Stable across releases.
    pub fn key(self) -> &'static str {
        match self {
            Stage::NewRequest => "NEW_REQUEST",
            Stage::Engaged => "ENGAGED",
            Stage::EstimateInProgress => "ESTIMATE_IN_PROGRESS",
            Stage::EstimateSent => "ESTIMATE_SENT",
            Stage::FollowUp => "FOLLOW_UP",
            Stage::Negotiation => "NEGOTIATION",
            Stage::ClosedWon => "CLOSED_WON",
            Stage::ClosedLost => "CLOSED_LOST",
            Stage::DeclinedToBid => "DECLINED_TO_BID",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Stage::NewRequest => "New Request",
            Stage::Engaged => "Engaged",
            Stage::EstimateInProgress => "Estimate in Progress",
            Stage::EstimateSent => "Estimate Sent",
            Stage::FollowUp => "Follow-up",
            Stage::Negotiation => "Negotiation",
            Stage::ClosedWon => "Closed Won",
            Stage::ClosedLost => "Closed Lost",
            Stage::DeclinedToBid => "Declined to Bid",
        }
    }

    /// Default win probability, in percent.
    pub fn default_probability(self) -> u8 {
        match self {
            Stage::NewRequest => 10,
            Stage::Engaged => 20,
            Stage::EstimateInProgress => 30,
            Stage::EstimateSent => 50,
            Stage::FollowUp => 60,
            Stage::Negotiation => 75,
            Stage::ClosedWon => 100,
            Stage::ClosedLost | Stage::DeclinedToBid => 0,
        }
    }

    /// 1-based position on the board.
    pub fn position(self) -> u8 {
        match self {
            Stage::NewRequest => 1,
            Stage::Engaged => 2,
            Stage::EstimateInProgress => 3,
            Stage::EstimateSent => 4,
            Stage::FollowUp => 5,
            Stage::Negotiation => 6,
            Stage::ClosedWon => 7,
            Stage::ClosedLost => 8,
            Stage::DeclinedToBid => 9,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Stage::ClosedWon | Stage::ClosedLost | Stage::DeclinedToBid
        )
    }

    /// Unsuccessful outcomes must carry a sub-reason.
    pub fn requires_sub_reason(self) -> bool {
        matches!(self, Stage::ClosedLost | Stage::DeclinedToBid)
    }

    pub fn is_won(self) -> bool {
        self == Stage::ClosedWon
    }

    /// Coded reasons for this stage; empty unless a sub-reason is required.
    pub fn sub_reason_options(self) -> &'static [SubReasonOption] {
        match self {
            Stage::ClosedLost => &CLOSED_LOST_REASONS,
            Stage::DeclinedToBid => &DECLINED_REASONS,
            _ => &[],
        }
    }

    /// Label for a catalogued `reason` code, `None` for free text.
    pub fn sub_reason_label(self, reason: &str) -> Option<&'static str> {
        self.sub_reason_options()
            .iter()
            .find(|option| option.code.eq_ignore_ascii_case(reason.trim()))
            .map(|option| option.label)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Stage {
    type Err = UnknownStage;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.key() == value)
            .ok_or_else(|| UnknownStage(value.to_string()))
    }
}
