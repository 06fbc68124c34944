use crate::application::gate::QualityGate;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Coordinates an orderly stop of every pipeline loop.
///
/// Loops hold a `watch::Receiver<bool>` from [`ShutdownService::subscribe`]
/// and finish their current unit of work (ensemble run, heartbeat, outcome)
/// before returning.
pub struct ShutdownService {
    shutdown_tx: watch::Sender<bool>,
    gate: Arc<QualityGate>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    grace: Duration,
}

impl ShutdownService {
    pub fn new(gate: Arc<QualityGate>, grace: Duration) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            gate,
            tasks: Mutex::new(Vec::new()),
            grace,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub fn is_triggered(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Tracks a task that must finish before shutdown completes.
    pub async fn register(&self, handle: JoinHandle<()>) {
        self.tasks.lock().await.push(handle);
    }

    pub async fn shutdown(&self) {
        if self.shutdown_tx.send_replace(true) {
            return;
        }
        info!("Initiating Graceful Shutdown Sequence...");

        info!("Step 1: Closing the quality gate to new candidates...");
        self.gate.begin_shutdown().await;

        info!("Step 2: Waiting for in-flight cycles, heartbeat and learning to finish...");
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        let count = tasks.len();
        let aborts: Vec<_> = tasks.iter().map(|t| t.abort_handle()).collect();

        match tokio::time::timeout(self.grace, join_all(tasks)).await {
            Ok(results) => {
                let failed = results.iter().filter(|r| r.is_err()).count();
                if failed > 0 {
                    warn!("{} of {} tasks ended abnormally", failed, count);
                }
            }
            Err(_) => {
                warn!("Tasks still running after {:?}, aborting", self.grace);
                for handle in aborts {
                    handle.abort();
                }
            }
        }

        info!("Graceful Shutdown Complete. Goodbye!");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QualityGateConfig;
    use crate::infrastructure::event_bus::EventBus;
    use crate::infrastructure::mock::MockMarketDataService;
    use crate::infrastructure::repositories::InMemorySignalRepository;
    use crate::domain::performance::PerformanceBook;
    use tokio::sync::mpsc;

    fn gate() -> Arc<QualityGate> {
        let (published_tx, _rx) = mpsc::channel(4);
        let (_book_tx, book_rx) = watch::channel(Arc::new(PerformanceBook::default()));
        Arc::new(QualityGate::new(
            QualityGateConfig::default(),
            Arc::new(InMemorySignalRepository::new()),
            Arc::new(MockMarketDataService::new()),
            book_rx,
            published_tx,
            EventBus::new(),
        ))
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_loops() {
        let gate = gate();
        let service = ShutdownService::new(gate.clone(), Duration::from_secs(5));
        let mut rx = service.subscribe();
        let (done_tx, mut done_rx) = mpsc::channel(1);

        service
            .register(tokio::spawn(async move {
                let _ = rx.changed().await;
                tokio::time::sleep(Duration::from_millis(20)).await;
                let _ = done_tx.send(()).await;
            }))
            .await;

        service.shutdown().await;
        assert!(service.is_triggered());
        assert!(gate.is_shutting_down());
        assert!(done_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_stuck_task_is_aborted() {
        let service = ShutdownService::new(gate(), Duration::from_millis(20));
        service
            .register(tokio::spawn(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }))
            .await;
        service.shutdown().await;
        // Second call is a no-op
        service.shutdown().await;
        assert!(service.is_triggered());
    }
}
