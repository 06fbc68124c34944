//! Publish -> track -> learn, driven step by step with fixed clocks.

use chrono::{DateTime, TimeZone, Utc};
use ignitex::application::gate::{Candidate, GateDecision, QualityGate};
use ignitex::application::learning::FeedbackEngine;
use ignitex::application::lifecycle::SignalLifecycleTracker;
use ignitex::application::strategies::StrategyRegistry;
use ignitex::config::{EnsembleConfig, LearningConfig, QualityGateConfig};
use ignitex::domain::market::{RegimeState, RegimeType};
use ignitex::domain::performance::PerformanceBook;
use ignitex::domain::repositories::SignalRepository;
use ignitex::domain::signals::{
    ConsensusResult, Contribution, Direction, QualityTier, SignalStatus,
};
use ignitex::infrastructure::event_bus::EventBus;
use ignitex::infrastructure::mock::MockMarketDataService;
use ignitex::infrastructure::repositories::{
    InMemoryPerformanceRepository, InMemorySignalRepository, InMemoryWeightRepository,
};
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::sync::mpsc;

fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, h, m, 0).unwrap()
}

fn candidate(symbol: &str, contributors: &[&str], now: DateTime<Utc>) -> Candidate {
    let regime = RegimeState::classified(symbol, RegimeType::BullMomentum, 80.0, now);
    let weight = 1.0 / contributors.len() as f64;
    Candidate {
        consensus: ConsensusResult {
            symbol: symbol.to_string(),
            direction: Direction::Long,
            weighted_confidence: 100.0,
            agreement_score: 100.0,
            vote_share: 100.0,
            opposing_share: 0.0,
            votes_for: contributors.len(),
            votes_against: 0,
            quality_tier: QualityTier::High,
            regime_at_evaluation: RegimeType::BullMomentum,
            threshold_used: regime.adaptive_consensus_threshold,
            quality_adjustment: regime.quality_adjustment,
            contributors: contributors
                .iter()
                .map(|id| Contribution {
                    strategy_id: id.to_string(),
                    weight,
                    confidence: 100.0,
                    contribution: weight,
                })
                .collect(),
        },
        regime,
        price: dec!(100),
        atr: Some(1.0),
        atr_pct: Some(1.0),
        evaluated_at: now,
    }
}

#[tokio::test]
async fn test_published_signal_completes_once_and_feeds_learning() {
    let signal_repo = InMemorySignalRepository::new();
    let market = MockMarketDataService::new();
    let registry = Arc::new(StrategyRegistry::with_default_strategies(EnsembleConfig::default()));
    let learning = FeedbackEngine::load(
        LearningConfig::default(),
        Arc::new(InMemoryPerformanceRepository::new()),
        Arc::new(InMemoryWeightRepository::new()),
        registry.clone(),
        at(9, 0),
    )
    .await
    .unwrap();

    let (published_tx, mut published_rx) = mpsc::channel(8);
    let (outcome_tx, mut outcome_rx) = mpsc::channel(8);
    let gate = QualityGate::new(
        QualityGateConfig {
            persist_retry_delay_ms: 1,
            ..QualityGateConfig::default()
        },
        Arc::new(signal_repo.clone()),
        Arc::new(market.clone()),
        learning.book_receiver(),
        published_tx,
        EventBus::new(),
    );
    let tracker = SignalLifecycleTracker::new(
        Arc::new(signal_repo.clone()),
        Arc::new(market.clone()),
        outcome_tx,
        EventBus::new(),
    );

    let decision = gate
        .evaluate(candidate("BTCUSDT", &["TrendAlignment", "StatMomentum", "VolumeSurge", "BollingerBreakout"], at(14, 0)))
        .await;
    assert!(matches!(decision, GateDecision::Published(_)), "{:?}", decision);

    let signal = published_rx.recv().await.unwrap();
    tracker.track(signal.clone()).await;

    // No crossing yet
    market.set_price("BTCUSDT", dec!(100.5)).await;
    assert!(tracker.heartbeat(at(14, 5)).await.unwrap().is_empty());

    market.set_price("BTCUSDT", signal.targets[0]).await;
    let outcomes = tracker.heartbeat(at(14, 10)).await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].status, SignalStatus::Success);
    assert!(tracker.heartbeat(at(14, 15)).await.unwrap().is_empty());

    let stored = signal_repo.find_by_id(signal.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SignalStatus::Success);
    assert_eq!(stored.hit_target, Some(1));

    let outcome = outcome_rx.recv().await.unwrap();
    assert!(outcome_rx.try_recv().is_err());
    let weights = learning.process(&outcome, at(14, 10)).await.unwrap();
    assert!(weights.vector.is_normalized());

    let book = learning.current_book();
    for id in ["TrendAlignment", "StatMomentum", "VolumeSurge", "BollingerBreakout"] {
        assert_eq!(book.get(id, RegimeType::BullMomentum).unwrap().wins, 1);
    }
}

#[tokio::test]
async fn test_signal_expires_at_last_price() {
    let signal_repo = InMemorySignalRepository::new();
    let market = MockMarketDataService::new();
    let (published_tx, mut published_rx) = mpsc::channel(8);
    let (outcome_tx, _outcome_rx) = mpsc::channel(8);
    let (_book_tx, book_rx) = tokio::sync::watch::channel(Arc::new(PerformanceBook::default()));

    let gate = QualityGate::new(
        QualityGateConfig::default(),
        Arc::new(signal_repo.clone()),
        Arc::new(market.clone()),
        book_rx,
        published_tx,
        EventBus::new(),
    );
    let tracker = SignalLifecycleTracker::new(
        Arc::new(signal_repo.clone()),
        Arc::new(market.clone()),
        outcome_tx,
        EventBus::new(),
    );

    let decision = gate
        .evaluate(candidate("ETHUSDT", &["TrendAlignment", "StatMomentum", "BollingerBreakout", "VolumeSurge"], at(14, 0)))
        .await;
    assert!(matches!(decision, GateDecision::Published(_)), "{:?}", decision);
    let signal = published_rx.recv().await.unwrap();
    tracker.track(signal.clone()).await;

    market.set_price("ETHUSDT", dec!(100.4)).await;
    let outcomes = tracker.heartbeat(signal.expires_at).await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].status, SignalStatus::Expired);
    assert_eq!(outcomes[0].profit_loss_percent, Some(dec!(0.4)));
    assert_eq!(tracker.active_count().await, 0);
}
