use chrono::Utc;
use ignitex::application::system::{Application, CycleOutcome, Storage};
use ignitex::config::Config;
use ignitex::domain::events::PipelineEvent;
use ignitex::domain::market::Tick;
use ignitex::domain::ports::MarketDataService;
use ignitex::infrastructure::mock::{MockMarketDataService, random_walk_candles};
use ignitex::infrastructure::repositories::{
    InMemoryPerformanceRepository, InMemorySignalRepository, InMemoryWeightRepository,
};
use std::sync::Arc;

fn storage() -> Storage {
    Storage {
        signal_repository: Arc::new(InMemorySignalRepository::new()),
        performance_repository: Arc::new(InMemoryPerformanceRepository::new()),
        weight_repository: Arc::new(InMemoryWeightRepository::new()),
    }
}

async fn app_with_history(market: &MockMarketDataService) -> anyhow::Result<Application> {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .try_init();

    let start_ts = Utc::now().timestamp_millis() - 200 * 60_000;
    let candles = random_walk_candles("BTCUSDT", 100.0, 200, 0.3, 0.2, 11, start_ts);
    market.push_candles("BTCUSDT", candles).await;

    Application::assemble(Config::default(), Arc::new(market.clone()), storage()).await
}

#[tokio::test]
async fn test_tick_runs_full_cycle() -> anyhow::Result<()> {
    let market = MockMarketDataService::new();
    let app = app_with_history(&market).await?;
    let mut events = app.event_bus.subscribe();

    let prices = market.get_prices(vec!["BTCUSDT".to_string()]).await?;
    let last = prices["BTCUSDT"];
    let outcome = app
        .pipeline
        .process_tick(Tick::new("BTCUSDT", last, Utc::now().timestamp_millis()), Utc::now())
        .await;

    assert!(
        matches!(outcome, CycleOutcome::Gate(_) | CycleOutcome::NoConsensus(_)),
        "unexpected {:?}",
        outcome
    );
    assert_eq!(app.metrics.cycles_total.with_label_values(&["BTCUSDT"]).get(), 1.0);
    assert_eq!(
        app.metrics
            .ensemble_duration_seconds
            .with_label_values(&["BTCUSDT"])
            .get_sample_count(),
        1
    );

    // Regime was evaluated on the way through
    let regime = app.regimes.current("BTCUSDT", Utc::now());
    assert!(!regime.neutral);
    match events.try_recv()? {
        PipelineEvent::RegimeChanged { symbol, from, to, .. } => {
            assert_eq!(symbol, "BTCUSDT");
            assert_eq!(from, None);
            assert_eq!(to, Some(regime.regime));
        }
        other => panic!("unexpected first event {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_symbol_without_history_is_skipped() -> anyhow::Result<()> {
    let market = MockMarketDataService::new();
    let app = app_with_history(&market).await?;

    let outcome = app
        .pipeline
        .process_tick(Tick::new("ETHUSDT", rust_decimal_macros::dec!(3400), 0), Utc::now())
        .await;
    assert!(matches!(outcome, CycleOutcome::Skipped(_)));
    Ok(())
}

#[tokio::test]
async fn test_start_report_and_shutdown() -> anyhow::Result<()> {
    let market = MockMarketDataService::new();
    let app = app_with_history(&market).await?;
    let handle = app.start().await?;

    let status = handle.status().await;
    assert_eq!(status.published_today, 0);
    assert_eq!(status.weights.len(), 6);
    let sum: f64 = status.weights.values().sum();
    assert!((sum - 1.0).abs() < 1e-9);
    assert!(status.disabled_strategies.is_empty());
    assert_eq!(status.regimes.len(), 2);

    let gate = handle.gate.clone();
    handle.shutdown().await;
    assert!(gate.is_shutting_down());
    Ok(())
}
