use std::sync::Arc;

use async_trait::async_trait;
use entity::{deals, stage_transitions};
use products_pipeline::{Deal, DealStore, DealTransaction, StageTransition, StoreError, StoreResult};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    QueryFilter, QueryOrder, SqlErr, Statement, TransactionTrait,
};
use tracing::debug;
use uuid::Uuid;

use crate::convert::{
    deal_from_model, deal_to_active, deal_to_update, transition_from_model, transition_to_active,
};

/// [`DealStore`] backed by a sea-orm connection.
#[derive(Clone, Debug)]
pub struct SeaOrmDealStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmDealStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db: Arc::new(db) }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

fn store_error(err: DbErr) -> StoreError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(detail)) => StoreError::Duplicate(detail),
        _ => StoreError::Unavailable(err.to_string()),
    }
}

#[async_trait]
impl DealStore for SeaOrmDealStore {
    async fn load(&self, deal_id: Uuid) -> StoreResult<Deal> {
        deals::Entity::find_by_id(deal_id)
            .one(self.db.as_ref())
            .await
            .map_err(store_error)?
            .map(deal_from_model)
            .ok_or(StoreError::NotFound(deal_id))
    }

    async fn insert(&self, deal: &Deal) -> StoreResult<()> {
        deals::Entity::insert(deal_to_active(deal))
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn history(&self, deal_id: Uuid) -> StoreResult<Vec<StageTransition>> {
        let rows = stage_transitions::Entity::find()
            .filter(stage_transitions::Column::DealId.eq(deal_id))
            .order_by_asc(stage_transitions::Column::Sequence)
            .all(self.db.as_ref())
            .await
            .map_err(store_error)?;
        Ok(rows.into_iter().map(transition_from_model).collect())
    }

    async fn begin(&self) -> StoreResult<Box<dyn DealTransaction>> {
        let txn = self.db.begin().await.map_err(store_error)?;
        Ok(Box::new(SeaOrmTransaction { txn }))
    }

    async fn ping(&self) -> StoreResult<()> {
        let backend = self.db.get_database_backend();
        self.db
            .execute(Statement::from_string(backend, "SELECT 1".to_string()))
            .await
            .map_err(store_error)?;
        Ok(())
    }
}

/// Rolls back on drop unless committed.
struct SeaOrmTransaction {
    txn: DatabaseTransaction,
}

#[async_trait]
impl DealTransaction for SeaOrmTransaction {
    async fn save(&mut self, deal: &Deal, expected_version: i64) -> StoreResult<()> {
        let result = deals::Entity::update_many()
            .set(deal_to_update(deal))
            .filter(deals::Column::Id.eq(deal.id))
            .filter(deals::Column::Version.eq(expected_version))
            .exec(&self.txn)
            .await
            .map_err(store_error)?;
        if result.rows_affected == 1 {
            return Ok(());
        }

        let current = deals::Entity::find_by_id(deal.id)
            .one(&self.txn)
            .await
            .map_err(store_error)?;
        match current {
            None => Err(StoreError::NotFound(deal.id)),
            Some(row) => {
                debug!(deal_id = %deal.id, expected_version, actual = row.version, "conditional update missed");
                Err(StoreError::VersionConflict {
                    deal_id: deal.id,
                    expected: expected_version,
                    actual: Some(row.version),
                })
            }
        }
    }

    async fn append_transition(&mut self, transition: &StageTransition) -> StoreResult<()> {
        stage_transitions::Entity::insert(transition_to_active(transition))
            .exec_without_returning(&self.txn)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.txn.commit().await.map_err(store_error)
    }
}
