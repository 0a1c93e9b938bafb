//! Deal pipeline stage engine.
//!
//! Owns a deal's current stage, validates moves between the nine pipeline
//! stages, and keeps the append-only transition history. Persistence and
//! audit delivery are injected through [`DealStore`] and [`AuditSink`].

pub mod audit;
pub mod deal;
pub mod engine;
pub mod error;
pub mod memory;
pub mod replay;
pub mod stage;
pub mod store;

pub use audit::{
    AuditSink, ChannelAuditSink, FanoutAuditSink, RecordingAuditSink, TracingAuditSink,
    TransitionEvent,
};
pub use deal::{Actor, Deal, Role, StageTransition, UnknownRole};
pub use engine::{EngineConfig, PipelineEngine};
pub use error::{PipelineError, PipelineResult, StoreError, StoreResult};
pub use memory::InMemoryDealStore;
pub use replay::{HistoryError, replay};
pub use stage::{Stage, SubReasonOption, UnknownStage};
pub use store::{DealStore, DealTransaction};
