//! Persistence seam consumed by the engine.
//!
//! Stores own durability. The engine only ever mutates a deal through a
//! [`DealTransaction`], so the deal update and its history row land together
//! or not at all.

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    deal::{Deal, StageTransition},
    error::StoreResult,
};

#[async_trait]
pub trait DealStore: Send + Sync {
    async fn load(&self, deal_id: Uuid) -> StoreResult<Deal>;

    /// Persists a newly opened deal. Fails with `Duplicate` if the id exists.
    async fn insert(&self, deal: &Deal) -> StoreResult<()>;

    /// Transitions for `deal_id`, ordered by sequence.
    async fn history(&self, deal_id: Uuid) -> StoreResult<Vec<StageTransition>>;

    async fn begin(&self) -> StoreResult<Box<dyn DealTransaction>>;

    /// Cheap liveness probe used by health checks.
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// A unit of work against the store. Dropping it without `commit` discards
/// everything staged on it.
#[async_trait]
pub trait DealTransaction: Send {
    /// Writes `deal` if the stored version still equals `expected_version`.
    /// The stored version becomes `deal.version`.
    async fn save(&mut self, deal: &Deal, expected_version: i64) -> StoreResult<()>;

    async fn append_transition(&mut self, transition: &StageTransition) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
