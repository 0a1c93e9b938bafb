use thiserror::Error;

use crate::{deal::StageTransition, stage::Stage};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HistoryError {
    #[error("transition {sequence} starts at {found} but the deal was at {expected}")]
    Discontinuous {
        sequence: i64,
        expected: Stage,
        found: Stage,
    },
    #[error("transition {sequence} is out of order")]
    OutOfOrder { sequence: i64 },
}

/// Folds a deal's history from New Request and returns the stage and
/// sub-reason it reconstructs.
pub fn replay<'a, I>(history: I) -> Result<(Stage, Option<String>), HistoryError>
where
    I: IntoIterator<Item = &'a StageTransition>,
{
    let mut stage = Stage::NewRequest;
    let mut sub_reason = None;
    let mut last_sequence = None;

    for transition in history {
        if last_sequence.is_some_and(|prev| transition.sequence <= prev) {
            return Err(HistoryError::OutOfOrder {
                sequence: transition.sequence,
            });
        }
        if transition.from_stage != stage {
            return Err(HistoryError::Discontinuous {
                sequence: transition.sequence,
                expected: stage,
                found: transition.from_stage,
            });
        }
        stage = transition.to_stage;
        sub_reason = if stage.requires_sub_reason() {
            transition.reason.clone()
        } else {
            None
        };
        last_sequence = Some(transition.sequence);
    }

    Ok((stage, sub_reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deal::Actor;
    use chrono::Utc;
    use uuid::Uuid;

    fn row(sequence: i64, from: Stage, to: Stage, reason: Option<&str>) -> StageTransition {
        StageTransition {
            id: Uuid::new_v4(),
            deal_id: Uuid::nil(),
            sequence,
            from_stage: from,
            to_stage: to,
            actor: Actor::staff(Uuid::nil()),
            reason: reason.map(str::to_string),
            overridden: false,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn empty_history_is_new_request() {
        let history: Vec<StageTransition> = Vec::new();
        assert_eq!(replay(&history), Ok((Stage::NewRequest, None)));
    }

    #[test]
    fn reason_is_kept_only_for_loss_outcomes() {
        let history = vec![
            row(2, Stage::NewRequest, Stage::FollowUp, Some("client asked for time")),
            row(3, Stage::FollowUp, Stage::DeclinedToBid, Some("no capacity")),
        ];
        assert_eq!(
            replay(&history),
            Ok((Stage::DeclinedToBid, Some("no capacity".to_string())))
        );
        assert_eq!(replay(&history[..1]), Ok((Stage::FollowUp, None)));
    }

    #[test]
    fn gaps_in_the_chain_are_reported() {
        let history = vec![
            row(2, Stage::NewRequest, Stage::Engaged, None),
            row(3, Stage::Negotiation, Stage::ClosedWon, None),
        ];
        assert_eq!(
            replay(&history),
            Err(HistoryError::Discontinuous {
                sequence: 3,
                expected: Stage::Engaged,
                found: Stage::Negotiation,
            })
        );
    }

    #[test]
    fn sequences_must_increase() {
        let history = vec![
            row(3, Stage::NewRequest, Stage::Engaged, None),
            row(3, Stage::Engaged, Stage::FollowUp, None),
        ];
        assert_eq!(replay(&history), Err(HistoryError::OutOfOrder { sequence: 3 }));
    }
}
