use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use taglens_core::{Result, TagLensError, Task};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tracing::{error, info};

use crate::DialogueEngine;

pub const QUEUE_CAPACITY: usize = 2000;
pub const DEFAULT_PAGE: usize = 1;
pub const DEFAULT_LIMIT: usize = 10;
pub const MAX_LIMIT: usize = 100;

/// Pending tasks plus the bounded work queue feeding the single worker.
///
/// The pending list answers status queries and pagination; the queue
/// provides backpressure. A task leaves the pending list only after its
/// worker run finishes, success or failure.
pub struct TaskRegistry {
    pending: Mutex<Vec<Task>>,
    sender: Sender<Task>,
}

#[derive(Debug, Serialize)]
pub struct TaskPage {
    pub tasks: Vec<Task>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub total_pages: usize,
}

impl TaskRegistry {
    /// Registry without a worker; the caller owns the receiving end. Used
    /// directly by tests, via [`TaskRegistry::start`] everywhere else.
    pub fn new() -> (Arc<Self>, Receiver<Task>) {
        let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
        (
            Arc::new(Self {
                pending: Mutex::new(Vec::new()),
                sender,
            }),
            receiver,
        )
    }

    pub fn start(engine: DialogueEngine) -> Arc<Self> {
        let (registry, mut receiver) = Self::new();
        let worker = Arc::clone(&registry);
        tokio::spawn(async move {
            while let Some(task) = receiver.recv().await {
                info!(task_id = %task.id, "executing task");
                if let Err(err) = engine.run(&task).await {
                    error!(task_id = %task.id, "task failed: {err:#}");
                }
                worker.finish(&task.id);
            }
        });
        registry
    }

    /// Appends to the pending list, then enqueues. Blocks when the queue is
    /// full, pushing the backpressure onto the submitting client.
    pub async fn submit(&self, task: Task) -> Result<()> {
        self.pending.lock().push(task.clone());
        self.sender
            .send(task)
            .await
            .map_err(|_| TagLensError::Configuration("task queue closed".into()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.pending.lock().iter().any(|task| task.id == id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// `page` must be ≥ 1 and `limit` ≥ 1; use the parse helpers below for
    /// raw query parameters.
    pub fn page(&self, page: usize, limit: usize) -> TaskPage {
        let pending = self.pending.lock();
        let total = pending.len();
        let offset = ((page - 1) * limit).min(total);
        let end = (offset + limit).min(total);
        TaskPage {
            tasks: pending[offset..end].to_vec(),
            total,
            page,
            limit,
            total_pages: total.div_ceil(limit),
        }
    }

    fn finish(&self, id: &str) {
        let mut pending = self.pending.lock();
        if let Some(position) = pending.iter().position(|task| task.id == id) {
            pending.remove(position);
        }
    }
}

/// Invalid or out-of-range values fall back to the default rather than
/// erroring, matching the lenient query contract.
pub fn parse_page_param(raw: Option<&str>) -> usize {
    raw.and_then(|value| value.parse::<usize>().ok())
        .filter(|&page| page >= 1)
        .unwrap_or(DEFAULT_PAGE)
}

pub fn parse_limit_param(raw: Option<&str>) -> usize {
    raw.and_then(|value| value.parse::<usize>().ok())
        .filter(|&limit| (1..=MAX_LIMIT).contains(&limit))
        .unwrap_or(DEFAULT_LIMIT)
}
