use std::{future::Future, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    audit::{AuditSink, TransitionEvent},
    deal::{Actor, Deal, StageTransition},
    error::{PipelineError, PipelineResult, StoreResult},
    stage::Stage,
    store::DealStore,
};

const MAX_TITLE_LEN: usize = 255;

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Upper bound for every individual store call.
    pub store_timeout: Duration,
    /// Retry once when a version conflict came from a write that left the
    /// stage untouched.
    pub retry_on_conflict: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(5),
            retry_on_conflict: true,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Mode {
    Regular,
    Override,
}

/// A validated change, ready to be committed.
#[derive(Debug)]
struct Plan {
    next: Deal,
    expected_version: i64,
    transition: StageTransition,
}

/// Validates and commits deal stage changes.
///
/// Holds no per-deal state; every call reads and writes through the store,
/// so one engine can be shared across tasks behind an `Arc`.
#[derive(Clone)]
pub struct PipelineEngine {
    store: Arc<dyn DealStore>,
    audit: Arc<dyn AuditSink>,
    config: EngineConfig,
}

impl PipelineEngine {
    pub fn new(store: Arc<dyn DealStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            store,
            audit,
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn ping(&self) -> PipelineResult<()> {
        self.call("ping", self.store.ping()).await
    }

    #[instrument(name = "pipeline.open_deal", skip_all, fields(actor = %actor.id))]
    pub async fn open_deal(&self, title: &str, actor: &Actor) -> PipelineResult<Deal> {
        let title = title.trim();
        if title.is_empty() {
            return Err(PipelineError::InvalidInput("title must not be blank".into()));
        }
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(PipelineError::InvalidInput(format!(
                "title exceeds {MAX_TITLE_LEN} characters"
            )));
        }
        let deal = Deal::open(title, Utc::now());
        self.call("insert", self.store.insert(&deal)).await?;
        info!(deal_id = %deal.id, "deal opened");
        Ok(deal)
    }

    pub async fn load_deal(&self, deal_id: Uuid) -> PipelineResult<Deal> {
        self.call("load", self.store.load(deal_id)).await
    }

    /// Transitions for a deal, oldest first.
    #[instrument(name = "pipeline.history", skip_all, fields(deal_id = %deal_id))]
    pub async fn history(&self, deal_id: Uuid) -> PipelineResult<Vec<StageTransition>> {
        self.call("history", self.store.history(deal_id)).await
    }

    /// Moves `deal` to `target`.
    ///
    /// `deal` is the caller's view; its version is the one the write is
    /// conditioned on.
    #[instrument(
        name = "pipeline.transition",
        skip_all,
        fields(deal_id = %deal.id, from = %deal.current_stage, to = %target, actor = %actor.id)
    )]
    pub async fn transition(
        &self,
        deal: &Deal,
        target: Stage,
        actor: &Actor,
        reason: Option<&str>,
    ) -> PipelineResult<Deal> {
        self.apply(deal, target, actor, reason, Mode::Regular).await
    }

    /// Moves `deal` to `target` even out of a terminal stage. Admins only.
    #[instrument(
        name = "pipeline.override",
        skip_all,
        fields(deal_id = %deal.id, from = %deal.current_stage, to = %target, actor = %actor.id)
    )]
    pub async fn administrative_override(
        &self,
        deal: &Deal,
        target: Stage,
        actor: &Actor,
        reason: Option<&str>,
    ) -> PipelineResult<Deal> {
        if !actor.is_admin() {
            warn!(role = %actor.role, "override rejected");
            return Err(PipelineError::Unauthorized { actor: actor.id });
        }
        self.apply(deal, target, actor, reason, Mode::Override).await
    }

    async fn apply(
        &self,
        deal: &Deal,
        target: Stage,
        actor: &Actor,
        reason: Option<&str>,
        mode: Mode,
    ) -> PipelineResult<Deal> {
        let reason = normalize_reason(reason);
        let Some(plan) = plan_move(deal, target, actor, reason.clone(), mode, Utc::now())? else {
            return self.confirm_unchanged(deal).await;
        };

        let plan = match self.commit(&plan).await {
            Ok(()) => plan,
            Err(PipelineError::ConflictRetry { .. }) if self.config.retry_on_conflict => {
                let fresh = self.load_deal(deal.id).await?;
                if fresh.current_stage != deal.current_stage || fresh.sub_reason != deal.sub_reason
                {
                    warn!(
                        current = %fresh.current_stage,
                        version = fresh.version,
                        "stage moved underneath caller"
                    );
                    return Err(PipelineError::ConflictRetry { deal_id: deal.id });
                }
                warn!(version = fresh.version, "version conflict; retrying once");
                let Some(retry) = plan_move(&fresh, target, actor, reason, mode, Utc::now())? else {
                    return Ok(fresh);
                };
                self.commit(&retry).await?;
                retry
            }
            Err(err) => {
                if matches!(err, PipelineError::ConflictRetry { .. }) {
                    warn!("version conflict");
                }
                return Err(err);
            }
        };

        info!(
            version = plan.next.version,
            overridden = plan.transition.overridden,
            "stage transition committed"
        );
        self.audit
            .publish(&TransitionEvent::new(&plan.next, plan.transition));
        Ok(plan.next)
    }

    /// Answers a move that changes nothing, checked against the stored deal.
    async fn confirm_unchanged(&self, deal: &Deal) -> PipelineResult<Deal> {
        let fresh = self.load_deal(deal.id).await?;
        if fresh.version == deal.version {
            debug!("stage unchanged; nothing to record");
            return Ok(fresh);
        }
        let same_view =
            fresh.current_stage == deal.current_stage && fresh.sub_reason == deal.sub_reason;
        if same_view && self.config.retry_on_conflict {
            debug!(version = fresh.version, "stage unchanged at newer version");
            return Ok(fresh);
        }
        warn!(
            current = %fresh.current_stage,
            version = fresh.version,
            "stage moved underneath caller"
        );
        Err(PipelineError::ConflictRetry { deal_id: deal.id })
    }

    async fn commit(&self, plan: &Plan) -> PipelineResult<()> {
        let mut tx = self.call("begin", self.store.begin()).await?;
        self.call("save", tx.save(&plan.next, plan.expected_version))
            .await?;
        self.call("append_transition", tx.append_transition(&plan.transition))
            .await?;
        match self.call("commit", tx.commit()).await {
            Err(PipelineError::PersistenceUnavailable(detail)) => {
                if self.landed(plan).await {
                    warn!(%detail, "commit reported failure but the transition is stored");
                    Ok(())
                } else {
                    Err(PipelineError::PersistenceUnavailable(detail))
                }
            }
            other => other,
        }
    }

    /// Whether `plan` is visible in the store despite a failed commit call.
    async fn landed(&self, plan: &Plan) -> bool {
        let Ok(stored) = self.load_deal(plan.next.id).await else {
            return false;
        };
        if stored.version < plan.next.version {
            return false;
        }
        match self.history(plan.next.id).await {
            Ok(history) => history.iter().any(|t| t.id == plan.transition.id),
            Err(_) => false,
        }
    }

    async fn call<T, F>(&self, op: &'static str, fut: F) -> PipelineResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        match timeout(self.config.store_timeout, fut).await {
            Ok(result) => result.map_err(PipelineError::from),
            Err(_) => {
                let timeout_ms = self.config.store_timeout.as_millis() as u64;
                warn!(op, timeout_ms, "store call timed out");
                Err(PipelineError::PersistenceUnavailable(format!(
                    "{op} timed out after {timeout_ms}ms"
                )))
            }
        }
    }
}

fn normalize_reason(reason: Option<&str>) -> Option<String> {
    reason
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
}

/// Applies the stage rules to `deal`. `Ok(None)` means the move changes nothing.
fn plan_move(
    deal: &Deal,
    target: Stage,
    actor: &Actor,
    reason: Option<String>,
    mode: Mode,
    now: DateTime<Utc>,
) -> PipelineResult<Option<Plan>> {
    if mode == Mode::Regular && deal.current_stage.is_terminal() {
        return Err(PipelineError::InvalidTransition {
            deal_id: deal.id,
            stage: deal.current_stage,
        });
    }
    if target.requires_sub_reason() && reason.is_none() {
        return Err(PipelineError::MissingSubReason { stage: target });
    }

    let sub_reason = if target.requires_sub_reason() {
        reason.clone()
    } else {
        None
    };
    if target == deal.current_stage && sub_reason == deal.sub_reason {
        return Ok(None);
    }

    let mut next = deal.clone();
    next.current_stage = target;
    next.sub_reason = sub_reason;
    next.version = deal.version + 1;
    next.updated_at = now;
    if target != deal.current_stage {
        next.stage_changed_at = now;
    }
    next.closed_at = match (deal.current_stage.is_terminal(), target.is_terminal()) {
        (_, false) => None,
        (true, true) => deal.closed_at.or(Some(now)),
        (false, true) => Some(now),
    };

    let transition = StageTransition {
        id: Uuid::new_v4(),
        deal_id: deal.id,
        sequence: next.version,
        from_stage: deal.current_stage,
        to_stage: target,
        actor: *actor,
        reason,
        overridden: mode == Mode::Override,
        timestamp: now,
    };

    Ok(Some(Plan {
        next,
        expected_version: deal.version,
        transition,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deal_at(stage: Stage) -> Deal {
        let mut deal = Deal::open("Parking structure", Utc::now());
        deal.current_stage = stage;
        if stage.requires_sub_reason() {
            deal.sub_reason = Some("price".into());
        }
        if stage.is_terminal() {
            deal.closed_at = Some(deal.created_at);
        }
        deal
    }

    fn staff() -> Actor {
        Actor::staff(Uuid::new_v4())
    }

    #[test]
    fn blank_reasons_are_treated_as_missing() {
        assert_eq!(normalize_reason(Some("  ")), None);
        assert_eq!(normalize_reason(Some(" budget ")), Some("budget".into()));
        let err = plan_move(
            &deal_at(Stage::Negotiation),
            Stage::ClosedLost,
            &staff(),
            normalize_reason(Some("   ")),
            Mode::Regular,
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err, PipelineError::MissingSubReason { stage: Stage::ClosedLost });
    }

    #[test]
    fn terminal_lock_is_checked_before_reason() {
        let deal = deal_at(Stage::ClosedWon);
        let err = plan_move(&deal, Stage::ClosedLost, &staff(), None, Mode::Regular, Utc::now())
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidTransition { .. }));
    }

    #[test]
    fn backward_moves_are_allowed() {
        let deal = deal_at(Stage::Negotiation);
        let planned = plan_move(&deal, Stage::Engaged, &staff(), None, Mode::Regular, Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(planned.next.current_stage, Stage::Engaged);
        assert_eq!(planned.next.version, deal.version + 1);
        assert_eq!(planned.expected_version, deal.version);
        assert_eq!(planned.transition.sequence, planned.next.version);
        assert!(!planned.transition.overridden);
    }

    #[test]
    fn same_stage_is_a_no_op() {
        let deal = deal_at(Stage::FollowUp);
        let result = plan_move(
            &deal,
            Stage::FollowUp,
            &staff(),
            Some("still waiting".into()),
            Mode::Regular,
            Utc::now(),
        )
        .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn closing_stamps_closed_at_and_reopening_clears_it() {
        let now = Utc::now();
        let open = deal_at(Stage::Negotiation);
        let closed = plan_move(&open, Stage::ClosedWon, &staff(), None, Mode::Regular, now)
            .unwrap()
            .unwrap()
            .next;
        assert_eq!(closed.closed_at, Some(now));
        assert_eq!(closed.stage_changed_at, now);

        let admin = Actor::admin(Uuid::new_v4());
        let reopened = plan_move(&closed, Stage::Negotiation, &admin, None, Mode::Override, now)
            .unwrap()
            .unwrap();
        assert_eq!(reopened.next.closed_at, None);
        assert!(reopened.transition.overridden);
    }

    #[test]
    fn override_between_terminal_stages_keeps_original_close_date() {
        let deal = deal_at(Stage::ClosedLost);
        let admin = Actor::admin(Uuid::new_v4());
        let later = deal.created_at + chrono::Duration::days(3);
        let next = plan_move(
            &deal,
            Stage::DeclinedToBid,
            &admin,
            Some("not our scope".into()),
            Mode::Override,
            later,
        )
        .unwrap()
        .unwrap()
        .next;
        assert_eq!(next.closed_at, deal.closed_at);
        assert_eq!(next.sub_reason.as_deref(), Some("not our scope"));
    }
}
