use chrono::Utc;
use entity::{ActorRole, DealStage, deals, stage_transitions};
use products_pipeline::{Actor, Deal, Role, Stage, StageTransition};
use sea_orm::ActiveValue::{NotSet, Set};

pub(crate) fn stage_to_db(stage: Stage) -> DealStage {
    match stage {
        Stage::NewRequest => DealStage::NewRequest,
        Stage::Engaged => DealStage::Engaged,
        Stage::EstimateInProgress => DealStage::EstimateInProgress,
        Stage::EstimateSent => DealStage::EstimateSent,
        Stage::FollowUp => DealStage::FollowUp,
        Stage::Negotiation => DealStage::Negotiation,
        Stage::ClosedWon => DealStage::ClosedWon,
        Stage::ClosedLost => DealStage::ClosedLost,
        Stage::DeclinedToBid => DealStage::DeclinedToBid,
    }
}

pub(crate) fn stage_from_db(stage: DealStage) -> Stage {
    match stage {
        DealStage::NewRequest => Stage::NewRequest,
        DealStage::Engaged => Stage::Engaged,
        DealStage::EstimateInProgress => Stage::EstimateInProgress,
        DealStage::EstimateSent => Stage::EstimateSent,
        DealStage::FollowUp => Stage::FollowUp,
        DealStage::Negotiation => Stage::Negotiation,
        DealStage::ClosedWon => Stage::ClosedWon,
        DealStage::ClosedLost => Stage::ClosedLost,
        DealStage::DeclinedToBid => Stage::DeclinedToBid,
    }
}

fn role_to_db(role: Role) -> ActorRole {
    match role {
        Role::Admin => ActorRole::Admin,
        Role::BdStaff => ActorRole::BdStaff,
        Role::Estimator => ActorRole::Estimator,
    }
}

fn role_from_db(role: ActorRole) -> Role {
    match role {
        ActorRole::Admin => Role::Admin,
        ActorRole::BdStaff => Role::BdStaff,
        ActorRole::Estimator => Role::Estimator,
    }
}

pub(crate) fn deal_from_model(model: deals::Model) -> Deal {
    Deal {
        id: model.id,
        title: model.title,
        current_stage: stage_from_db(model.current_stage),
        sub_reason: model.sub_reason,
        version: model.version,
        stage_changed_at: model.stage_changed_at.with_timezone(&Utc),
        closed_at: model.closed_at.map(|at| at.with_timezone(&Utc)),
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

pub(crate) fn deal_to_active(deal: &Deal) -> deals::ActiveModel {
    deals::ActiveModel {
        id: Set(deal.id),
        title: Set(deal.title.clone()),
        current_stage: Set(stage_to_db(deal.current_stage)),
        sub_reason: Set(deal.sub_reason.clone()),
        version: Set(deal.version),
        stage_changed_at: Set(deal.stage_changed_at.into()),
        closed_at: Set(deal.closed_at.map(Into::into)),
        created_at: Set(deal.created_at.into()),
        updated_at: Set(deal.updated_at.into()),
    }
}

/// Columns a save may change. Identity and creation time stay put.
pub(crate) fn deal_to_update(deal: &Deal) -> deals::ActiveModel {
    deals::ActiveModel {
        id: NotSet,
        created_at: NotSet,
        ..deal_to_active(deal)
    }
}

pub(crate) fn transition_from_model(model: stage_transitions::Model) -> StageTransition {
    StageTransition {
        id: model.id,
        deal_id: model.deal_id,
        sequence: model.sequence,
        from_stage: stage_from_db(model.from_stage),
        to_stage: stage_from_db(model.to_stage),
        actor: Actor::new(model.actor_id, role_from_db(model.actor_role)),
        reason: model.reason,
        overridden: model.overridden,
        timestamp: model.occurred_at.with_timezone(&Utc),
    }
}

pub(crate) fn transition_to_active(transition: &StageTransition) -> stage_transitions::ActiveModel {
    stage_transitions::ActiveModel {
        id: Set(transition.id),
        deal_id: Set(transition.deal_id),
        sequence: Set(transition.sequence),
        from_stage: Set(stage_to_db(transition.from_stage)),
        to_stage: Set(stage_to_db(transition.to_stage)),
        actor_id: Set(transition.actor.id),
        actor_role: Set(role_to_db(transition.actor.role)),
        reason: Set(transition.reason.clone()),
        overridden: Set(transition.overridden),
        occurred_at: Set(transition.timestamp.into()),
    }
}
