//! Process-local [`DealStore`] for tests and single-node development.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    deal::{Deal, StageTransition},
    error::{StoreError, StoreResult},
    store::{DealStore, DealTransaction},
};

#[derive(Default)]
struct State {
    deals: HashMap<Uuid, Deal>,
    transitions: HashMap<Uuid, Vec<StageTransition>>,
}

impl State {
    fn check_version(&self, deal_id: Uuid, expected: i64) -> StoreResult<()> {
        let stored = self
            .deals
            .get(&deal_id)
            .ok_or(StoreError::NotFound(deal_id))?;
        if stored.version != expected {
            return Err(StoreError::VersionConflict {
                deal_id,
                expected,
                actual: Some(stored.version),
            });
        }
        Ok(())
    }

    fn check_transition(&self, transition: &StageTransition) -> StoreResult<()> {
        let taken = self
            .transitions
            .get(&transition.deal_id)
            .is_some_and(|rows| rows.iter().any(|t| t.sequence == transition.sequence));
        if taken {
            return Err(StoreError::Duplicate(format!(
                "transition {} for deal {}",
                transition.sequence, transition.deal_id
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryDealStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryDealStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().deals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl DealStore for InMemoryDealStore {
    async fn load(&self, deal_id: Uuid) -> StoreResult<Deal> {
        self.lock()
            .deals
            .get(&deal_id)
            .cloned()
            .ok_or(StoreError::NotFound(deal_id))
    }

    async fn insert(&self, deal: &Deal) -> StoreResult<()> {
        let mut state = self.lock();
        if state.deals.contains_key(&deal.id) {
            return Err(StoreError::Duplicate(format!("deal {}", deal.id)));
        }
        state.deals.insert(deal.id, deal.clone());
        Ok(())
    }

    async fn history(&self, deal_id: Uuid) -> StoreResult<Vec<StageTransition>> {
        let mut rows = self
            .lock()
            .transitions
            .get(&deal_id)
            .cloned()
            .unwrap_or_default();
        rows.sort_by_key(|t| t.sequence);
        Ok(rows)
    }

    async fn begin(&self) -> StoreResult<Box<dyn DealTransaction>> {
        Ok(Box::new(InMemoryTransaction {
            state: self.state.clone(),
            saves: Vec::new(),
            transitions: Vec::new(),
        }))
    }
}

struct InMemoryTransaction {
    state: Arc<Mutex<State>>,
    saves: Vec<(Deal, i64)>,
    transitions: Vec<StageTransition>,
}

impl InMemoryTransaction {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl DealTransaction for InMemoryTransaction {
    async fn save(&mut self, deal: &Deal, expected_version: i64) -> StoreResult<()> {
        self.lock().check_version(deal.id, expected_version)?;
        self.saves.push((deal.clone(), expected_version));
        Ok(())
    }

    async fn append_transition(&mut self, transition: &StageTransition) -> StoreResult<()> {
        self.lock().check_transition(transition)?;
        self.transitions.push(transition.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let InMemoryTransaction {
            state,
            saves,
            transitions,
        } = *self;
        let mut state = state.lock().unwrap_or_else(|e| e.into_inner());

        // Validate everything before touching state so a failed commit applies nothing.
        for (deal, expected) in &saves {
            state.check_version(deal.id, *expected)?;
        }
        for transition in &transitions {
            state.check_transition(transition)?;
        }

        for (deal, _) in saves {
            state.deals.insert(deal.id, deal);
        }
        for transition in transitions {
            state
                .transitions
                .entry(transition.deal_id)
                .or_default()
                .push(transition);
        }
        Ok(())
    }
}
