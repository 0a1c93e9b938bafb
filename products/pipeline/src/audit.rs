//! Transition events and the sinks that receive them.
//!
//! Publishing happens after the store commits and is fire-and-forget: a sink
//! must not block and has no way to fail the operation that produced the event.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    deal::{Deal, StageTransition},
    stage::Stage,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub deal_id: Uuid,
    pub deal_title: String,
    pub version: i64,
    pub transition: StageTransition,
}

impl TransitionEvent {
    pub fn new(deal: &Deal, transition: StageTransition) -> Self {
        Self {
            deal_id: deal.id,
            deal_title: deal.title.clone(),
            version: deal.version,
            transition,
        }
    }

    /// Human readable activity line, e.g. `Stage: Negotiation -> Closed Won`.
    pub fn summary(&self) -> String {
        Self::line(self.transition.from_stage, self.transition.to_stage)
    }

    pub fn line(from: Stage, to: Stage) -> String {
        format!("Stage: {} -> {}", from.display_name(), to.display_name())
    }
}

pub trait AuditSink: Send + Sync {
    fn publish(&self, event: &TransitionEvent);
}

/// Emits one structured log line per transition.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn publish(&self, event: &TransitionEvent) {
        let t = &event.transition;
        info!(
            target: "pipeline.audit",
            deal_id = %event.deal_id,
            from = %t.from_stage,
            to = %t.to_stage,
            actor = %t.actor.id,
            role = %t.actor.role,
            overridden = t.overridden,
            sequence = t.sequence,
            "{}",
            event.summary()
        );
    }
}

/// Feeds events into an unbounded channel for activity-feed consumers.
#[derive(Clone, Debug)]
pub struct ChannelAuditSink {
    tx: mpsc::UnboundedSender<TransitionEvent>,
}

impl ChannelAuditSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TransitionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl AuditSink for ChannelAuditSink {
    fn publish(&self, event: &TransitionEvent) {
        if self.tx.send(event.clone()).is_err() {
            warn!(deal_id = %event.deal_id, "audit channel closed; dropping transition event");
        }
    }
}

/// Keeps every published event in memory.
#[derive(Clone, Default)]
pub struct RecordingAuditSink {
    events: Arc<Mutex<Vec<TransitionEvent>>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TransitionEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl AuditSink for RecordingAuditSink {
    fn publish(&self, event: &TransitionEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
    }
}

/// Publishes to several sinks in order.
#[derive(Clone, Default)]
pub struct FanoutAuditSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl FanoutAuditSink {
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self { sinks }
    }

    pub fn with(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl AuditSink for FanoutAuditSink {
    fn publish(&self, event: &TransitionEvent) {
        for sink in &self.sinks {
            sink.publish(event);
        }
    }
}
