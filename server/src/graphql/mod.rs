mod nodes;

use async_graphql::{Context, EmptySubscription, ErrorExtensions, ID, Object, Schema};
use platform_api::ApiError;
use products_pipeline::{Actor, Deal, PipelineEngine, PipelineError, Stage};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::activity::ActivityFeed;

const DEFAULT_ACTIVITY_LIMIT: i32 = 20;
const MAX_ACTIVITY_LIMIT: i32 = 100;

pub use nodes::{ActivityNode, DealNode, PipelineStageNode, StageValue, TransitionNode};

pub type SchemaType = Schema<QueryRoot, MutationRoot, EmptySubscription>;

pub fn build_schema(engine: PipelineEngine, activity: ActivityFeed) -> SchemaType {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(engine)
        .data(activity)
        .finish()
}

#[derive(Default)]
pub struct QueryRoot;

#[derive(Default)]
pub struct MutationRoot;

#[Object]
impl QueryRoot {
    #[graphql(name = "pipelineStages")]
    async fn pipeline_stages(&self) -> Vec<PipelineStageNode> {
        Stage::ALL.into_iter().map(PipelineStageNode::from).collect()
    }

    #[instrument(name = "graphql.deal", skip_all)]
    async fn deal(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<DealNode> {
        require_actor(ctx)?;
        let deal = load(ctx, &id).await?;
        Ok(deal.into())
    }

    #[graphql(name = "dealHistory")]
    #[instrument(name = "graphql.deal_history", skip_all)]
    async fn deal_history(
        &self,
        ctx: &Context<'_>,
        id: ID,
    ) -> async_graphql::Result<Vec<TransitionNode>> {
        require_actor(ctx)?;
        let deal_id = parse_uuid(&id)?;
        let history = engine(ctx)?
            .history(deal_id)
            .await
            .map_err(pipeline_error)?;
        Ok(history.into_iter().map(TransitionNode::from).collect())
    }

    /// Latest stage changes across all deals, newest first.
    #[graphql(name = "recentActivity")]
    async fn recent_activity(
        &self,
        ctx: &Context<'_>,
        limit: Option<i32>,
    ) -> async_graphql::Result<Vec<ActivityNode>> {
        require_actor(ctx)?;
        let limit = limit
            .unwrap_or(DEFAULT_ACTIVITY_LIMIT)
            .clamp(1, MAX_ACTIVITY_LIMIT) as usize;
        let feed = ctx
            .data::<ActivityFeed>()
            .map_err(|_| ApiError::internal(anyhow::anyhow!("activity feed missing")).extend())?;
        Ok(feed
            .recent(limit)
            .into_iter()
            .map(ActivityNode::from)
            .collect())
    }
}

#[Object]
impl MutationRoot {
    #[graphql(name = "openDeal")]
    #[instrument(name = "graphql.open_deal", skip_all)]
    async fn open_deal(&self, ctx: &Context<'_>, title: String) -> async_graphql::Result<DealNode> {
        let actor = require_actor(ctx)?;
        let deal = engine(ctx)?
            .open_deal(&title, &actor)
            .await
            .map_err(pipeline_error)?;
        Ok(deal.into())
    }

    /// Moves a deal the caller last saw at `expected_version`.
    #[graphql(name = "transitionDeal")]
    #[instrument(name = "graphql.transition_deal", skip_all, fields(deal_id = %id.as_str()))]
    async fn transition_deal(
        &self,
        ctx: &Context<'_>,
        id: ID,
        stage: StageValue,
        expected_version: i64,
        reason: Option<String>,
    ) -> async_graphql::Result<DealNode> {
        let actor = require_actor(ctx)?;
        let deal = load(ctx, &id).await?;
        if deal.version != expected_version {
            return Err(pipeline_error(PipelineError::ConflictRetry { deal_id: deal.id }));
        }
        let moved = engine(ctx)?
            .transition(&deal, stage.into(), &actor, reason.as_deref())
            .await
            .map_err(pipeline_error)?;
        Ok(moved.into())
    }

    #[graphql(name = "overrideDealStage")]
    #[instrument(name = "graphql.override_deal_stage", skip_all, fields(deal_id = %id.as_str()))]
    async fn override_deal_stage(
        &self,
        ctx: &Context<'_>,
        id: ID,
        stage: StageValue,
        reason: Option<String>,
    ) -> async_graphql::Result<DealNode> {
        let actor = require_actor(ctx)?;
        let deal = load(ctx, &id).await?;
        let moved = engine(ctx)?
            .administrative_override(&deal, stage.into(), &actor, reason.as_deref())
            .await
            .map_err(pipeline_error)?;
        Ok(moved.into())
    }
}

fn engine<'a>(ctx: &Context<'a>) -> async_graphql::Result<&'a PipelineEngine> {
    ctx.data::<PipelineEngine>()
        .map_err(|_| ApiError::internal(anyhow::anyhow!("pipeline engine missing")).extend())
}

fn require_actor(ctx: &Context<'_>) -> async_graphql::Result<Actor> {
    ctx.data_opt::<Actor>()
        .copied()
        .ok_or_else(|| ApiError::Unauthorized.extend())
}

fn parse_uuid(id: &ID) -> async_graphql::Result<Uuid> {
    Uuid::parse_str(id.as_str())
        .map_err(|_| ApiError::InvalidInput(format!("invalid id {}", id.as_str())).extend())
}

async fn load(ctx: &Context<'_>, id: &ID) -> async_graphql::Result<Deal> {
    let deal_id = parse_uuid(id)?;
    engine(ctx)?.load_deal(deal_id).await.map_err(pipeline_error)
}

fn pipeline_error(err: PipelineError) -> async_graphql::Error {
    let api = match &err {
        PipelineError::InvalidTransition { .. } | PipelineError::MissingSubReason { .. } => {
            ApiError::rejected(err.code(), err.to_string())
        }
        PipelineError::ConflictRetry { .. } => ApiError::Conflict(err.to_string()),
        PipelineError::PersistenceUnavailable(detail) => {
            warn!(%detail, "store unavailable");
            ApiError::Unavailable(detail.clone())
        }
        PipelineError::Unauthorized { .. } => ApiError::Forbidden(err.to_string()),
        PipelineError::NotFound(_) => ApiError::NotFound,
        PipelineError::InvalidInput(message) => ApiError::InvalidInput(message.clone()),
    };
    api.extend()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_graphql::{Request, Value};
    use products_pipeline::{
        ChannelAuditSink, FanoutAuditSink, InMemoryDealStore, RecordingAuditSink, Role,
    };
    use serde_json::json;
    use std::{sync::Arc, time::Duration};

    fn wired() -> (SchemaType, RecordingAuditSink, ActivityFeed) {
        let audit = RecordingAuditSink::new();
        let (channel, rx) = ChannelAuditSink::new();
        let feed = ActivityFeed::default();
        feed.spawn(rx);
        let sinks = FanoutAuditSink::default()
            .with(Arc::new(audit.clone()))
            .with(Arc::new(channel));
        let engine = PipelineEngine::new(Arc::new(InMemoryDealStore::new()), Arc::new(sinks));
        (build_schema(engine, feed.clone()), audit, feed)
    }

    fn schema() -> (SchemaType, RecordingAuditSink) {
        let (schema, audit, _) = wired();
        (schema, audit)
    }

    fn as_staff(query: impl Into<String>) -> Request {
        Request::new(query).data(Actor::new(Uuid::new_v4(), Role::BdStaff))
    }

    fn as_admin(query: impl Into<String>) -> Request {
        Request::new(query).data(Actor::new(Uuid::new_v4(), Role::Admin))
    }

    fn code(response: &async_graphql::Response) -> Option<Value> {
        response
            .errors
            .first()
            .and_then(|e| e.extensions.as_ref())
            .and_then(|ext| ext.get("code"))
            .cloned()
    }

    async fn open(schema: &SchemaType, title: &str) -> serde_json::Value {
        let response = schema
            .execute(as_staff(format!(
                r#"mutation {{ openDeal(title: "{title}") {{ id version stage }} }}"#
            )))
            .await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        response.data.into_json().unwrap()["openDeal"].clone()
    }

    #[tokio::test]
    async fn lists_stages_in_board_order() {
        let (schema, _) = schema();
        let response = schema
            .execute(Request::new("{ pipelineStages { key probability terminal } }"))
            .await;
        assert!(response.errors.is_empty());
        let body = response.data.into_json().unwrap();
        let stages = body["pipelineStages"].as_array().unwrap();
        assert_eq!(stages.len(), 9);
        assert_eq!(
            stages[0],
            json!({"key": "NEW_REQUEST", "probability": 10, "terminal": false})
        );
        assert_eq!(stages[8]["key"], json!("DECLINED_TO_BID"));
    }

    #[tokio::test]
    async fn loss_stages_list_their_reason_codes() {
        let (schema, _) = schema();
        let response = schema
            .execute(Request::new("{ pipelineStages { key subReasons { code label } } }"))
            .await;
        assert!(response.errors.is_empty());
        let body = response.data.into_json().unwrap();
        let stages = body["pipelineStages"].as_array().unwrap();
        assert_eq!(stages[0]["subReasons"], json!([]));
        assert_eq!(stages[7]["key"], json!("CLOSED_LOST"));
        assert_eq!(
            stages[7]["subReasons"][2],
            json!({"code": "COMPETITOR", "label": "Lost to Competitor"})
        );
        assert_eq!(stages[8]["subReasons"][0]["code"], json!("TOO_SMALL"));
    }

    #[tokio::test]
    async fn coded_reasons_carry_their_label() {
        let (schema, _) = schema();
        let id = open(&schema, "Kiosk").await["id"].as_str().unwrap().to_string();
        let response = schema
            .execute(as_staff(format!(
                r#"mutation {{ transitionDeal(id: "{id}", stage: DECLINED_TO_BID, expectedVersion: 1, reason: "CAPACITY") {{ subReason subReasonLabel }} }}"#
            )))
            .await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        assert_eq!(
            response.data.into_json().unwrap()["transitionDeal"],
            json!({"subReason": "CAPACITY", "subReasonLabel": "No Capacity"})
        );
    }

    #[tokio::test]
    async fn recent_activity_lists_committed_moves() {
        let (schema, _, feed) = wired();
        let id = open(&schema, "Pavilion").await["id"].as_str().unwrap().to_string();
        let moved = schema
            .execute(as_staff(format!(
                r#"mutation {{ transitionDeal(id: "{id}", stage: ENGAGED, expectedVersion: 1) {{ version }} }}"#
            )))
            .await;
        assert!(moved.errors.is_empty(), "{:?}", moved.errors);

        for _ in 0..100 {
            if !feed.recent(1).is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let response = schema
            .execute(as_staff("{ recentActivity(limit: 5) { dealId dealTitle version summary } }"))
            .await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        assert_eq!(
            response.data.into_json().unwrap()["recentActivity"],
            json!([{
                "dealId": id,
                "dealTitle": "Pavilion",
                "version": 2,
                "summary": "Stage: New Request -> Engaged"
            }])
        );
    }

    #[tokio::test]
    async fn requests_without_an_actor_are_unauthorized() {
        let (schema, _) = schema();
        let response = schema
            .execute(Request::new(r#"mutation { openDeal(title: "Dock") { id } }"#))
            .await;
        assert_eq!(code(&response), Some(Value::from("UNAUTHORIZED")));
    }

    #[tokio::test]
    async fn transition_records_history() {
        let (schema, audit) = schema();
        let deal = open(&schema, "Warehouse fit-out").await;
        let id = deal["id"].as_str().unwrap().to_string();

        let response = schema
            .execute(as_staff(format!(
                r#"mutation {{ transitionDeal(id: "{id}", stage: NEGOTIATION, expectedVersion: 1) {{ stage version }} }}"#
            )))
            .await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        assert_eq!(
            response.data.into_json().unwrap()["transitionDeal"],
            json!({"stage": "NEGOTIATION", "version": 2})
        );

        let history = schema
            .execute(as_staff(format!(
                r#"{{ dealHistory(id: "{id}") {{ sequence fromStage toStage summary }} }}"#
            )))
            .await;
        assert!(history.errors.is_empty());
        assert_eq!(
            history.data.into_json().unwrap()["dealHistory"],
            json!([{
                "sequence": 2,
                "fromStage": "NEW_REQUEST",
                "toStage": "NEGOTIATION",
                "summary": "Stage: New Request -> Negotiation"
            }])
        );
        assert_eq!(audit.events().len(), 1);
    }

    #[tokio::test]
    async fn loss_without_reason_reports_its_code() {
        let (schema, _) = schema();
        let id = open(&schema, "Roof").await["id"].as_str().unwrap().to_string();
        let response = schema
            .execute(as_staff(format!(
                r#"mutation {{ transitionDeal(id: "{id}", stage: CLOSED_LOST, expectedVersion: 1) {{ stage }} }}"#
            )))
            .await;
        assert_eq!(code(&response), Some(Value::from("MISSING_SUB_REASON")));
    }

    #[tokio::test]
    async fn stale_version_is_a_conflict() {
        let (schema, _) = schema();
        let id = open(&schema, "Canopy").await["id"].as_str().unwrap().to_string();
        let response = schema
            .execute(as_staff(format!(
                r#"mutation {{ transitionDeal(id: "{id}", stage: ENGAGED, expectedVersion: 7) {{ stage }} }}"#
            )))
            .await;
        assert_eq!(code(&response), Some(Value::from("CONFLICT_RETRY")));
    }

    #[tokio::test]
    async fn override_requires_admin_and_reopens() {
        let (schema, _) = schema();
        let id = open(&schema, "Mezzanine").await["id"].as_str().unwrap().to_string();
        let lost = schema
            .execute(as_staff(format!(
                r#"mutation {{ transitionDeal(id: "{id}", stage: CLOSED_LOST, expectedVersion: 1, reason: "budget") {{ subReason isClosed }} }}"#
            )))
            .await;
        assert_eq!(
            lost.data.into_json().unwrap()["transitionDeal"],
            json!({"subReason": "budget", "isClosed": true})
        );

        let reopen = format!(
            r#"mutation {{ overrideDealStage(id: "{id}", stage: NEGOTIATION) {{ stage subReason closedAt }} }}"#
        );
        let denied = schema.execute(as_staff(reopen.clone())).await;
        assert_eq!(code(&denied), Some(Value::from("UNAUTHORIZED")));

        let response = schema.execute(as_admin(reopen)).await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        assert_eq!(
            response.data.into_json().unwrap()["overrideDealStage"],
            json!({"stage": "NEGOTIATION", "subReason": null, "closedAt": null})
        );
    }

    #[tokio::test]
    async fn unknown_deal_is_not_found() {
        let (schema, _) = schema();
        let response = schema
            .execute(as_staff(format!(r#"{{ deal(id: "{}") {{ id }} }}"#, Uuid::new_v4())))
            .await;
        assert_eq!(code(&response), Some(Value::from("NOT_FOUND")));
    }

    #[tokio::test]
    async fn malformed_id_is_invalid_input() {
        let (schema, _) = schema();
        let response = schema
            .execute(as_staff(r#"{ deal(id: "not-a-uuid") { id } }"#))
            .await;
        assert_eq!(code(&response), Some(Value::from("INVALID_INPUT")));
    }
}
