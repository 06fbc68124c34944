//! Outbound pipeline events.
//!
//! Inline listeners run on the emitting task and must not block. Async
//! consumers (notification adapters, tests) take a `broadcast` receiver;
//! a receiver that falls behind loses the oldest events and the pipeline
//! never waits on it.

use crate::domain::errors::GateRejection;
use crate::domain::events::{EventListener, PipelineEvent};
use crate::domain::market::RegimeState;
use crate::domain::signals::Signal;
use std::sync::Arc;
use tokio::sync::broadcast;

pub const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct EventBus {
    listeners: Arc<[Arc<dyn EventListener>]>,
    sender: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_listeners(Vec::new())
    }

    /// Listeners are fixed for the life of the bus.
    pub fn with_listeners(listeners: Vec<Arc<dyn EventListener>>) -> Self {
        let (sender, _) = broadcast::channel(DEFAULT_EVENT_CAPACITY);
        Self {
            listeners: listeners.into(),
            sender,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn emit(&self, event: PipelineEvent) {
        for listener in self.listeners.iter() {
            listener.on_event(&event);
        }
        // Err only means nobody is subscribed
        let _ = self.sender.send(event);
    }

    /// Announces a label change. Neutral states are reported as `None`.
    pub fn regime_changed(&self, previous: &RegimeState, next: &RegimeState) {
        self.emit(PipelineEvent::RegimeChanged {
            symbol: next.symbol.clone(),
            from: previous.label(),
            to: next.label(),
            confidence: next.confidence,
        });
    }

    pub fn signal_published(&self, signal: &Signal) {
        self.emit(PipelineEvent::SignalPublished {
            signal: Box::new(signal.clone()),
        });
    }

    pub fn signal_completed(&self, signal: &Signal) {
        self.emit(PipelineEvent::SignalCompleted {
            id: signal.id,
            symbol: signal.symbol.clone(),
            status: signal.status,
            exit_price: signal.exit_price,
            profit_loss_percent: signal.profit_loss_percent,
            hit_target: signal.hit_target,
        });
    }

    pub fn candidate_rejected(&self, symbol: &str, rejection: &GateRejection) {
        self.emit(PipelineEvent::CandidateRejected {
            symbol: symbol.to_string(),
            reason_code: rejection.code().to_string(),
            reason: rejection.to_string(),
        });
    }

    pub fn strategy_disabled(&self, strategy_id: &str, reason: &str) {
        self.emit(PipelineEvent::StrategyDisabled {
            strategy_id: strategy_id.to_string(),
            reason: reason.to_string(),
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
