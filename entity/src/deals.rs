use sea_orm::prelude::{DateTimeWithTimeZone, *};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "deals")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub title: String,
    #[sea_orm(indexed)]
    pub current_stage: DealStage,
    pub sub_reason: Option<String>,
    pub version: i64,
    pub stage_changed_at: DateTimeWithTimeZone,
    pub closed_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::stage_transitions::Entity")]
    StageTransitions,
}

impl Related<super::stage_transitions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StageTransitions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Copy, Clone, Debug, EnumIter, DeriveActiveEnum, Eq, PartialEq)]
#[sea_orm(rs_type = "String", db_type = "String(Some(32))")]
pub enum DealStage {
    #[sea_orm(string_value = "NEW_REQUEST")]
    NewRequest,
    #[sea_orm(string_value = "ENGAGED")]
    Engaged,
    #[sea_orm(string_value = "ESTIMATE_IN_PROGRESS")]
    EstimateInProgress,
    #[sea_orm(string_value = "ESTIMATE_SENT")]
    EstimateSent,
    #[sea_orm(string_value = "FOLLOW_UP")]
    FollowUp,
    #[sea_orm(string_value = "NEGOTIATION")]
    Negotiation,
    #[sea_orm(string_value = "CLOSED_WON")]
    ClosedWon,
    #[sea_orm(string_value = "CLOSED_LOST")]
    ClosedLost,
    #[sea_orm(string_value = "DECLINED_TO_BID")]
    DeclinedToBid,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveActiveEnum, Eq, PartialEq)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
pub enum ActorRole {
    #[sea_orm(string_value = "ADMIN")]
    Admin,
    #[sea_orm(string_value = "BD_STAFF")]
    BdStaff,
    #[sea_orm(string_value = "ESTIMATOR")]
    Estimator,
}
