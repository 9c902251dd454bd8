//! Deferred execution of phase two.
//!
//! Jobs are queued by the trigger and run one at a time on a spawned task.
//! There is no result channel: a submitted job's outcome is only visible
//! through the messaging side effect, the record update and the logs.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::orchestrator::{DeliveryOrchestrator, PhaseOneOutput};

/// Queue feeding a background phase-two worker.
#[derive(Debug)]
pub struct PhaseTwoQueue {
    sender: Mutex<Option<mpsc::UnboundedSender<PhaseOneOutput>>>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl PhaseTwoQueue {
    /// Spawns the worker on the current runtime.
    #[must_use]
    pub fn start(orchestrator: Arc<DeliveryOrchestrator>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<PhaseOneOutput>();

        let worker = tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                let record_id = job.record_id;
                let outcome = orchestrator.run_phase_two(&job).await;
                debug!(record_id, delivered = ?outcome.delivered, "Phase-two job finished");
            }
            info!("Phase-two worker stopped");
        });

        Self {
            sender: Mutex::new(Some(sender)),
            worker: tokio::sync::Mutex::new(Some(worker)),
        }
    }

    /// Queues phase two for a record and returns immediately.
    ///
    /// Returns `false` if the queue has been shut down; the job is dropped.
    pub fn submit(&self, job: PhaseOneOutput) -> bool {
        let record_id = job.record_id;
        let Ok(guard) = self.sender.lock() else {
            warn!(record_id, "Phase-two queue lock poisoned, job dropped");
            return false;
        };
        match guard.as_ref().map(|sender| sender.send(job)) {
            Some(Ok(())) => {
                debug!(record_id, "Phase two queued");
                true
            }
            _ => {
                warn!(record_id, "Phase-two queue closed, job dropped");
                false
            }
        }
    }

    /// Stops accepting jobs and waits for queued ones to finish.
    pub async fn shutdown(&self) {
        let sender = self.sender.lock().ok().and_then(|mut guard| guard.take());
        drop(sender);

        if let Some(worker) = self.worker.lock().await.take() {
            if let Err(e) = worker.await {
                warn!(error = %e, "Phase-two worker ended abnormally");
            }
        }
    }
}
