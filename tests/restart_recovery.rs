//! State that must survive a restart: active signals, the daily budget and
//! the learned weights.

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
use ignitex::infrastructure::persistence::{
    Database, SqlitePerformanceRepository, SqliteSignalRepository, SqliteWeightRepository,
};
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, h, m, 0).unwrap()
}

fn candidate(symbol: &str, now: DateTime<Utc>) -> Candidate {
    let regime = RegimeState::classified(symbol, RegimeType::BullMomentum, 80.0, now);
    let ids = ["TrendAlignment", "StatMomentum", "BollingerBreakout", "VolumeSurge"];
    Candidate {
        consensus: ConsensusResult {
            symbol: symbol.to_string(),
            direction: Direction::Long,
            weighted_confidence: 100.0,
            agreement_score: 100.0,
            vote_share: 100.0,
            opposing_share: 0.0,
            votes_for: 4,
            votes_against: 0,
            quality_tier: QualityTier::High,
            regime_at_evaluation: RegimeType::BullMomentum,
            threshold_used: regime.adaptive_consensus_threshold,
            quality_adjustment: regime.quality_adjustment,
            contributors: ids
                .iter()
                .map(|id| Contribution {
                    strategy_id: id.to_string(),
                    weight: 0.25,
                    confidence: 100.0,
                    contribution: 0.25,
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

fn gate(repo: Arc<dyn SignalRepository>) -> (QualityGate, mpsc::Receiver<ignitex::domain::signals::Signal>) {
    let (published_tx, published_rx) = mpsc::channel(8);
    let (_, book_rx) = watch::channel(Arc::new(PerformanceBook::default()));
    let gate = QualityGate::new(
        QualityGateConfig {
            persist_retry_delay_ms: 1,
            ..QualityGateConfig::default()
        },
        repo,
        Arc::new(MockMarketDataService::new()),
        book_rx,
        published_tx,
        EventBus::new(),
    );
    (gate, published_rx)
}

#[tokio::test]
async fn test_restart_keeps_budget_and_active_signals() {
    let db = Database::in_memory().await.unwrap();
    let repo: Arc<dyn SignalRepository> = Arc::new(SqliteSignalRepository::new(db.pool.clone()));
    let market = MockMarketDataService::new();

    // First run publishes one signal
    let (first_gate, mut published_rx) = gate(repo.clone());
    let decision = first_gate.evaluate(candidate("BTCUSDT", at(14, 0))).await;
    assert!(matches!(decision, GateDecision::Published(_)), "{:?}", decision);
    let published = published_rx.recv().await.unwrap();
    drop(first_gate);

    // Second run rebuilds from storage
    let (second_gate, _rx) = gate(repo.clone());
    second_gate.rebuild_from_repository(at(14, 5)).await.unwrap();
    let status = second_gate.budget_status(at(14, 5)).await;
    assert_eq!(status.published_today, 1);
    assert_eq!(status.next_eligible_at, Some(at(14, 30)));

    // Spacing still applies after the restart
    let decision = second_gate.evaluate(candidate("ETHUSDT", at(14, 5))).await;
    assert!(matches!(decision, GateDecision::Queued { .. }), "{:?}", decision);

    // Same symbol is blocked by the surviving ACTIVE signal
    let decision = second_gate.evaluate(candidate("BTCUSDT", at(14, 6))).await;
    assert!(matches!(decision, GateDecision::Rejected(_)), "{:?}", decision);

    let (outcome_tx, mut outcome_rx) = mpsc::channel(8);
    let tracker = SignalLifecycleTracker::new(repo.clone(), Arc::new(market.clone()), outcome_tx, EventBus::new());
    assert_eq!(tracker.resume_from_repository().await.unwrap(), 1);

    market.set_price("BTCUSDT", published.stop_loss).await;
    let outcomes = tracker.heartbeat(at(14, 20)).await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].status, SignalStatus::Failed);
    assert_eq!(outcome_rx.recv().await.unwrap().signal_id, published.id);

    let stored = repo.find_by_id(published.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SignalStatus::Failed);
    assert!(repo.find_active().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_learned_weights_survive_restart() {
    let db = Database::in_memory().await.unwrap();
    let perf_repo = Arc::new(SqlitePerformanceRepository::new(db.pool.clone()));
    let weight_repo = Arc::new(SqliteWeightRepository::new(db.pool.clone()));
    let registry = Arc::new(StrategyRegistry::with_default_strategies(EnsembleConfig::default()));

    let first = FeedbackEngine::load(
        LearningConfig::default(),
        perf_repo.clone(),
        weight_repo.clone(),
        registry.clone(),
        at(9, 0),
    )
    .await
    .unwrap();

    let outcome = ignitex::domain::signals::SignalOutcome {
        signal_id: uuid::Uuid::new_v4(),
        symbol: "BTCUSDT".to_string(),
        direction: Direction::Long,
        status: SignalStatus::Success,
        strategy_id: "TrendAlignment".to_string(),
        contributors: vec!["TrendAlignment".to_string()],
        regime: RegimeType::BullRange,
        profit_loss_percent: Some(dec!(3)),
        completed_at: at(10, 0),
    };
    let learned = first.process(&outcome, at(10, 0)).await.unwrap();
    drop(first);

    let second = FeedbackEngine::load(LearningConfig::default(), perf_repo, weight_repo, registry, at(11, 0))
        .await
        .unwrap();
    let restored = second.current_weights();
    assert_eq!(restored.vector.version, learned.vector.version);
    assert_eq!(restored.momentum, learned.momentum);
    let record = second
        .current_book()
        .get("TrendAlignment", RegimeType::BullRange)
        .cloned()
        .unwrap();
    assert_eq!(record.wins, 1);
}
