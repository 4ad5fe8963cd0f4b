//! Bounded work queue drained by a fixed pool of worker threads.
//!
//! Each worker takes one trigger event at a time and drives the matching
//! task to completion on the shared tokio runtime before taking the next.
//! Every run, successful or not, produces a [`TaskReport`] on the report
//! channel.

use crate::config::QueueConfig;
use crate::error::{NarratorError, Result};
use crate::pipeline::generate::GenerateSpeechTask;
use crate::pipeline::merge::MergeAudioVideoTask;
use crate::pipeline::services::Services;
use crate::pipeline::task::{Action, TaskProgress, TaskReport, TaskState, TriggerEvent};
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, unbounded};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::runtime::Handle;

enum Job {
    Run(TriggerEvent),
    Stop,
}

/// Run the task named by `event` inline.
pub async fn run_event(services: &Services, event: &TriggerEvent) -> TaskReport {
    match event.action {
        Action::GenerateAudioVideo => {
            GenerateSpeechTask::new(event.record_id.as_str())
                .run(services)
                .await
        }
        Action::MergeAudioVideo => {
            MergeAudioVideoTask::new(event.record_id.as_str())
                .run(services)
                .await
        }
    }
}

/// Cloneable submission side of a [`WorkQueue`].
#[derive(Clone)]
pub struct QueueHandle {
    sender: Sender<Job>,
    capacity: usize,
}

impl QueueHandle {
    /// Enqueue without blocking. Fails with `Queue` when full or stopped.
    pub fn submit(&self, event: TriggerEvent) -> Result<()> {
        match self.sender.try_send(Job::Run(event)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(NarratorError::Queue {
                message: "Queue full".to_string(),
            }),
            Err(TrySendError::Disconnected(_)) => Err(NarratorError::Queue {
                message: "Queue closed".to_string(),
            }),
        }
    }

    /// Number of events waiting for a worker.
    pub fn pending(&self) -> usize {
        self.sender.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Worker pool plus its queue and report channel.
pub struct WorkQueue {
    handle: QueueHandle,
    workers: Vec<JoinHandle<()>>,
    reports: Receiver<TaskReport>,
    /// Set once shutdown begins. Chained submissions hold the read lock so
    /// none can land behind the `Stop`s.
    closing: Arc<RwLock<bool>>,
}

impl WorkQueue {
    /// Spawn `config.workers` threads that run tasks on `runtime`.
    ///
    /// `runtime` must be a multi-threaded runtime; workers block on it from
    /// outside its own threads.
    pub fn start(services: Arc<Services>, runtime: Handle, config: &QueueConfig) -> Result<Self> {
        if config.workers == 0 || config.capacity == 0 {
            return Err(NarratorError::Queue {
                message: "workers and capacity must both be at least 1".to_string(),
            });
        }

        let (job_tx, job_rx) = bounded::<Job>(config.capacity);
        let (report_tx, report_rx) = unbounded::<TaskReport>();
        let handle = QueueHandle {
            sender: job_tx,
            capacity: config.capacity,
        };

        let closing = Arc::new(RwLock::new(false));
        let mut workers = Vec::with_capacity(config.workers);
        for index in 0..config.workers {
            let worker = Worker {
                index,
                services: services.clone(),
                runtime: runtime.clone(),
                jobs: job_rx.clone(),
                reports: report_tx.clone(),
                chain: config.chain_merge.then(|| handle.clone()),
                closing: closing.clone(),
            };
            let thread = thread::Builder::new()
                .name(format!("narrator-worker-{index}"))
                .spawn(move || worker.run())?;
            workers.push(thread);
        }
        tracing::info!(
            workers = config.workers,
            capacity = config.capacity,
            chain_merge = config.chain_merge,
            "work queue started"
        );

        Ok(Self {
            handle,
            workers,
            reports: report_rx,
            closing,
        })
    }

    pub fn handle(&self) -> QueueHandle {
        self.handle.clone()
    }

    pub fn submit(&self, event: TriggerEvent) -> Result<()> {
        self.handle.submit(event)
    }

    /// Receiving side of the report channel.
    pub fn reports(&self) -> Receiver<TaskReport> {
        self.reports.clone()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Let workers finish what is queued, then stop and join them.
    ///
    /// Merges chained by tasks still running are not queued; each is
    /// reported as a failed merge instead.
    pub fn shutdown(self) -> std::result::Result<(), String> {
        match self.closing.write() {
            Ok(mut closing) => *closing = true,
            Err(poisoned) => *poisoned.into_inner() = true,
        }
        for _ in &self.workers {
            if self.handle.sender.send(Job::Stop).is_err() {
                break;
            }
        }
        let mut panicked = Vec::new();
        for (index, worker) in self.workers.into_iter().enumerate() {
            if worker.join().is_err() {
                panicked.push(index);
            }
        }
        tracing::info!("work queue stopped");
        if panicked.is_empty() {
            Ok(())
        } else {
            Err(format!("Worker thread(s) {panicked:?} panicked"))
        }
    }
}

struct Worker {
    index: usize,
    services: Arc<Services>,
    runtime: Handle,
    jobs: Receiver<Job>,
    reports: Sender<TaskReport>,
    chain: Option<QueueHandle>,
    closing: Arc<RwLock<bool>>,
}

impl Worker {
    fn run(self) {
        while let Ok(Job::Run(event)) = self.jobs.recv() {
            tracing::debug!(worker = self.index, action = %event.action, record_id = %event.record_id, "picked up task");
            let report = self.execute(&event);

            let chained = if report.succeeded() && event.action == Action::GenerateAudioVideo {
                self.chain_merge(&event.record_id)
            } else {
                None
            };

            self.report(report);
            if let Some(dropped) = chained {
                self.report(dropped);
            }
        }
        tracing::debug!(worker = self.index, "worker exiting");
    }

    fn report(&self, report: TaskReport) {
        if self.reports.send(report).is_err() {
            tracing::trace!("report channel closed");
        }
    }

    /// Enqueue the follow-up merge. A merge that cannot be queued comes back
    /// as a failed report.
    fn chain_merge(&self, record_id: &str) -> Option<TaskReport> {
        let chain = self.chain.as_ref()?;
        let guard = self.closing.read();
        let outcome = if guard.as_deref().map_or(true, |closing| *closing) {
            tracing::warn!(record_id, "chained merge dropped: queue shutting down");
            Err(NarratorError::Queue {
                message: "Queue shutting down".to_string(),
            })
        } else {
            chain.submit(TriggerEvent::new(Action::MergeAudioVideo, record_id))
        };
        drop(guard);
        match outcome {
            Ok(()) => {
                tracing::info!(record_id, "chained merge task");
                None
            }
            Err(e) => Some(TaskProgress::start(Action::MergeAudioVideo, record_id).fail(&e)),
        }
    }

    /// A panicking task is reported as failed; the worker keeps going.
    fn execute(&self, event: &TriggerEvent) -> TaskReport {
        let services = &self.services;
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
            self.runtime.block_on(run_event(services, event))
        }));
        outcome.unwrap_or_else(|_| {
            tracing::error!(
                worker = self.index,
                task = event.action.task_name(),
                record_id = %event.record_id,
                "task panicked"
            );
            TaskReport {
                action: event.action,
                record_id: event.record_id.clone(),
                state: TaskState::Failed,
                failed_at: None,
                upload: None,
                error: Some("task panicked".to_string()),
                error_kind: Some("panic"),
                elapsed: Duration::ZERO,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::services::mock_services;
    use crate::pipeline::task::TaskState;
    use crate::publish::MemoryStorage;
    use crate::record::InMemoryGateway;
    use serde_json::json;
    use tempfile::TempDir;

    const WAIT: Duration = Duration::from_secs(10);

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap()
    }

    fn queue_config(workers: usize, capacity: usize, chain_merge: bool) -> QueueConfig {
        QueueConfig {
            workers,
            capacity,
            chain_merge,
        }
    }

    fn services(records: Arc<InMemoryGateway>, root: &TempDir) -> Arc<Services> {
        Arc::new(mock_services(records, Arc::new(MemoryStorage::new()), root.path()))
    }

    #[test]
    fn test_every_run_is_reported() {
        let rt = runtime();
        let root = TempDir::new().unwrap();
        let records = Arc::new(
            InMemoryGateway::new()
                .with_record("rec1", json!({ "Text Prompt": "Hello world", "Goods name": "Widget" }))
                .with_record("rec2", json!({ "Goods name": "Gadget" })),
        );
        let queue = WorkQueue::start(
            services(records.clone(), &root),
            rt.handle().clone(),
            &queue_config(2, 8, false),
        )
        .unwrap();

        queue
            .submit(TriggerEvent::new(Action::GenerateAudioVideo, "rec1"))
            .unwrap();
        queue
            .submit(TriggerEvent::new(Action::MergeAudioVideo, "rec2"))
            .unwrap();

        let reports = queue.reports();
        let mut received = vec![
            reports.recv_timeout(WAIT).unwrap(),
            reports.recv_timeout(WAIT).unwrap(),
        ];
        received.sort_by(|a, b| a.record_id.cmp(&b.record_id));

        assert!(received[0].succeeded());
        assert_eq!(received[1].state, TaskState::Failed);
        assert_eq!(received[1].error_kind, Some("missing_field"));
        assert_eq!(records.fields("rec1").unwrap()["Audio Complete"], json!(true));
        queue.shutdown().unwrap();
    }

    struct SlowSynthesizer;

    impl crate::tts::SpeechSynthesizer for SlowSynthesizer {
        fn synthesize(&self, _text: &str, _beam_width: u32) -> Result<Vec<u8>> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(vec![0; 64])
        }

        fn model_name(&self) -> &str {
            "slow"
        }

        fn sample_rate(&self) -> u32 {
            16000
        }
    }

    #[test]
    fn test_full_queue_rejects_without_blocking() {
        let rt = runtime();
        let root = TempDir::new().unwrap();
        let records = Arc::new(InMemoryGateway::new().with_record(
            "rec1",
            json!({ "Text Prompt": "Hello world", "Goods name": "Widget" }),
        ));
        let mut slow = mock_services(records, Arc::new(MemoryStorage::new()), root.path());
        slow.synthesizer = Arc::new(SlowSynthesizer);
        let queue =
            WorkQueue::start(Arc::new(slow), rt.handle().clone(), &queue_config(1, 1, false))
                .unwrap();
        let handle = queue.handle();

        let mut rejected = 0;
        for _ in 0..20 {
            if let Err(e) = handle.submit(TriggerEvent::new(Action::GenerateAudioVideo, "rec1")) {
                assert!(matches!(e, NarratorError::Queue { .. }));
                rejected += 1;
            }
        }

        // At most one task running plus one waiting.
        assert!(rejected >= 18, "rejected {rejected}");
        assert_eq!(handle.capacity(), 1);
        queue.shutdown().unwrap();
    }

    #[test]
    fn test_chain_merge_enqueues_merge_after_generate() {
        let rt = runtime();
        let root = TempDir::new().unwrap();
        let records = Arc::new(InMemoryGateway::new().with_record(
            "rec1",
            json!({ "Text Prompt": "Hello world", "Goods name": "Widget" }),
        ));
        let queue = WorkQueue::start(
            services(records, &root),
            rt.handle().clone(),
            &queue_config(1, 4, true),
        )
        .unwrap();

        queue
            .submit(TriggerEvent::new(Action::GenerateAudioVideo, "rec1"))
            .unwrap();

        let reports = queue.reports();
        let first = reports.recv_timeout(WAIT).unwrap();
        let second = reports.recv_timeout(WAIT).unwrap();
        assert_eq!(first.action, Action::GenerateAudioVideo);
        assert!(first.succeeded());
        assert_eq!(second.action, Action::MergeAudioVideo);
        assert_eq!(second.record_id, "rec1");
        // No source video on the record: the chained merge fails fast.
        assert_eq!(second.error_kind, Some("missing_field"));
        queue.shutdown().unwrap();
    }

    #[test]
    fn test_merge_chained_during_shutdown_is_reported_not_lost() {
        let rt = runtime();
        let root = TempDir::new().unwrap();
        let records = Arc::new(InMemoryGateway::new().with_record(
            "rec1",
            json!({ "Text Prompt": "Hello world", "Goods name": "Widget" }),
        ));
        let mut slow = mock_services(records, Arc::new(MemoryStorage::new()), root.path());
        slow.synthesizer = Arc::new(SlowSynthesizer);
        let queue =
            WorkQueue::start(Arc::new(slow), rt.handle().clone(), &queue_config(1, 4, true))
                .unwrap();
        let reports = queue.reports();

        queue
            .submit(TriggerEvent::new(Action::GenerateAudioVideo, "rec1"))
            .unwrap();
        // Generate is still synthesizing when shutdown starts.
        queue.shutdown().unwrap();

        let generate = reports.recv_timeout(WAIT).unwrap();
        let merge = reports.recv_timeout(WAIT).unwrap();
        assert_eq!(generate.action, Action::GenerateAudioVideo);
        assert!(generate.succeeded());
        assert_eq!(merge.action, Action::MergeAudioVideo);
        assert_eq!(merge.record_id, "rec1");
        assert_eq!(merge.error_kind, Some("queue"));
        assert!(merge.error.as_deref().unwrap_or("").contains("shutting down"));
        assert!(reports.try_recv().is_err());
    }

    #[test]
    fn test_submit_after_shutdown_fails() {
        let rt = runtime();
        let root = TempDir::new().unwrap();
        let queue = WorkQueue::start(
            services(Arc::new(InMemoryGateway::new()), &root),
            rt.handle().clone(),
            &queue_config(1, 2, false),
        )
        .unwrap();
        let handle = queue.handle();
        assert_eq!(queue.worker_count(), 1);

        queue.shutdown().unwrap();

        let err = handle
            .submit(TriggerEvent::new(Action::MergeAudioVideo, "rec1"))
            .unwrap_err();
        assert!(err.to_string().contains("Queue closed"));
    }

    #[test]
    fn test_zero_workers_is_rejected() {
        let rt = runtime();
        let root = TempDir::new().unwrap();
        let result = WorkQueue::start(
            services(Arc::new(InMemoryGateway::new()), &root),
            rt.handle().clone(),
            &queue_config(0, 2, false),
        );
        assert!(result.is_err());
    }
}
