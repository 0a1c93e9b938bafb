use async_graphql::{Enum, ID, SimpleObject};
use chrono::Utc;
use products_pipeline::{Deal, Stage, StageTransition, SubReasonOption, TransitionEvent};

#[derive(Enum, Copy, Clone, Debug, Eq, PartialEq)]
#[graphql(name = "Stage")]
pub enum StageValue {
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

impl From<Stage> for StageValue {
    fn from(value: Stage) -> Self {
        match value {
            Stage::NewRequest => StageValue::NewRequest,
            Stage::Engaged => StageValue::Engaged,
            Stage::EstimateInProgress => StageValue::EstimateInProgress,
            Stage::EstimateSent => StageValue::EstimateSent,
            Stage::FollowUp => StageValue::FollowUp,
            Stage::Negotiation => StageValue::Negotiation,
            Stage::ClosedWon => StageValue::ClosedWon,
            Stage::ClosedLost => StageValue::ClosedLost,
            Stage::DeclinedToBid => StageValue::DeclinedToBid,
        }
    }
}

impl From<StageValue> for Stage {
    fn from(value: StageValue) -> Self {
        match value {
            StageValue::NewRequest => Stage::NewRequest,
            StageValue::Engaged => Stage::Engaged,
            StageValue::EstimateInProgress => Stage::EstimateInProgress,
            StageValue::EstimateSent => Stage::EstimateSent,
            StageValue::FollowUp => Stage::FollowUp,
            StageValue::Negotiation => Stage::Negotiation,
            StageValue::ClosedWon => Stage::ClosedWon,
            StageValue::ClosedLost => Stage::ClosedLost,
            StageValue::DeclinedToBid => Stage::DeclinedToBid,
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
pub struct SubReasonNode {
    pub code: String,
    pub label: String,
}

impl From<&SubReasonOption> for SubReasonNode {
    fn from(option: &SubReasonOption) -> Self {
        Self {
            code: option.code.to_string(),
            label: option.label.to_string(),
        }
    }
}

/// Board column metadata.
#[derive(Clone, Debug, SimpleObject)]
pub struct PipelineStageNode {
    pub key: StageValue,
    pub name: String,
    pub position: i32,
    pub probability: i32,
    pub terminal: bool,
    pub requires_sub_reason: bool,
    pub sub_reasons: Vec<SubReasonNode>,
}

impl From<Stage> for PipelineStageNode {
    fn from(stage: Stage) -> Self {
        Self {
            key: stage.into(),
            name: stage.display_name().to_string(),
            position: i32::from(stage.position()),
            probability: i32::from(stage.default_probability()),
            terminal: stage.is_terminal(),
            requires_sub_reason: stage.requires_sub_reason(),
            sub_reasons: stage
                .sub_reason_options()
                .iter()
                .map(SubReasonNode::from)
                .collect(),
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
pub struct DealNode {
    pub id: ID,
    pub title: String,
    pub stage: StageValue,
    pub stage_name: String,
    pub sub_reason: Option<String>,
    pub sub_reason_label: Option<String>,
    pub version: i64,
    pub probability: i32,
    pub is_closed: bool,
    pub is_won: bool,
    pub days_in_stage: i64,
    pub stage_changed_at: String,
    pub closed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Deal> for DealNode {
    fn from(deal: Deal) -> Self {
        Self {
            id: ID(deal.id.to_string()),
            stage: deal.current_stage.into(),
            stage_name: deal.current_stage.display_name().to_string(),
            version: deal.version,
            probability: i32::from(deal.probability()),
            is_closed: deal.is_closed(),
            is_won: deal.is_won(),
            days_in_stage: deal.days_in_stage(Utc::now()),
            stage_changed_at: deal.stage_changed_at.to_rfc3339(),
            closed_at: deal.closed_at.map(|at| at.to_rfc3339()),
            created_at: deal.created_at.to_rfc3339(),
            updated_at: deal.updated_at.to_rfc3339(),
            sub_reason_label: deal
                .sub_reason
                .as_deref()
                .and_then(|reason| deal.current_stage.sub_reason_label(reason))
                .map(str::to_string),
            sub_reason: deal.sub_reason,
            title: deal.title,
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
pub struct TransitionNode {
    pub id: ID,
    pub sequence: i64,
    pub from_stage: StageValue,
    pub to_stage: StageValue,
    pub actor_id: ID,
    pub actor_role: String,
    pub reason: Option<String>,
    pub overridden: bool,
    pub occurred_at: String,
    pub summary: String,
}

impl From<StageTransition> for TransitionNode {
    fn from(t: StageTransition) -> Self {
        Self {
            id: ID(t.id.to_string()),
            sequence: t.sequence,
            from_stage: t.from_stage.into(),
            to_stage: t.to_stage.into(),
            actor_id: ID(t.actor.id.to_string()),
            actor_role: t.actor.role.as_str().to_string(),
            overridden: t.overridden,
            occurred_at: t.timestamp.to_rfc3339(),
            summary: TransitionEvent::line(t.from_stage, t.to_stage),
            reason: t.reason,
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
pub struct ActivityNode {
    pub deal_id: ID,
    pub deal_title: String,
    pub version: i64,
    pub summary: String,
    pub actor_id: ID,
    pub overridden: bool,
    pub occurred_at: String,
}

impl From<TransitionEvent> for ActivityNode {
    fn from(event: TransitionEvent) -> Self {
        Self {
            deal_id: ID(event.deal_id.to_string()),
            summary: event.summary(),
            version: event.version,
            actor_id: ID(event.transition.actor.id.to_string()),
            overridden: event.transition.overridden,
            occurred_at: event.transition.timestamp.to_rfc3339(),
            deal_title: event.deal_title,
        }
    }
}
