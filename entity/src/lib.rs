//! sea-orm entities for the deal pipeline tables.

pub mod deals;
pub mod stage_transitions;

pub use deals::{ActorRole, DealStage};
