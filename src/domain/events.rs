use crate::domain::market::RegimeType;
use crate::domain::signals::{Signal, SignalStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

/// Outbound pipeline events, fanned out through the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    RegimeChanged {
        symbol: String,
        /// `None` is the neutral fallback
        from: Option<RegimeType>,
        to: Option<RegimeType>,
        confidence: f64,
    },
    SignalPublished {
        signal: Box<Signal>,
    },
    SignalCompleted {
        id: Uuid,
        symbol: String,
        status: SignalStatus,
        exit_price: Option<Decimal>,
        profit_loss_percent: Option<Decimal>,
        hit_target: Option<u8>,
    },
    CandidateRejected {
        symbol: String,
        reason_code: String,
        reason: String,
    },
    StrategyDisabled {
        strategy_id: String,
        reason: String,
    },
}

impl PipelineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineEvent::RegimeChanged { .. } => "RegimeChanged",
            PipelineEvent::SignalPublished { .. } => "SignalPublished",
            PipelineEvent::SignalCompleted { .. } => "SignalCompleted",
            PipelineEvent::CandidateRejected { .. } => "CandidateRejected",
            PipelineEvent::StrategyDisabled { .. } => "StrategyDisabled",
        }
    }
}

/// Synchronous sink for pipeline events. Implementations must not block.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &PipelineEvent);
}

/// Writes every event to the tracing log.
pub struct LoggingListener;

impl EventListener for LoggingListener {
    fn on_event(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::RegimeChanged {
                symbol,
                from,
                to,
                confidence,
            } => {
                let label = |r: &Option<RegimeType>| {
                    r.map(|r| r.to_string()).unwrap_or_else(|| "NEUTRAL".to_string())
                };
                let (from, to) = (label(from), label(to));
                info!(
                    "Event [{}]: regime {} -> {} ({:.0}% confidence)",
                    symbol, from, to, confidence
                );
            }
            PipelineEvent::SignalPublished { signal } => {
                info!(
                    "Event [{}]: published {} {} @ {} stop {} targets {:?} (score {:.1}, {})",
                    signal.symbol,
                    signal.id,
                    signal.direction,
                    signal.entry,
                    signal.stop_loss,
                    signal.targets,
                    signal.quality_score,
                    signal.quality_tier
                );
            }
            PipelineEvent::SignalCompleted {
                id,
                symbol,
                status,
                profit_loss_percent,
                ..
            } => {
                info!(
                    "Event [{}]: signal {} completed {} (P&L {}%)",
                    symbol,
                    id,
                    status,
                    profit_loss_percent
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "n/a".to_string())
                );
            }
            PipelineEvent::CandidateRejected {
                symbol,
                reason_code,
                reason,
            } => {
                info!("Event [{}]: candidate rejected ({}): {}", symbol, reason_code, reason);
            }
            PipelineEvent::StrategyDisabled {
                strategy_id,
                reason,
            } => {
                warn!("Event: strategy {} disabled: {}", strategy_id, reason);
            }
        }
    }
}
