//! Single-flight submission of compiled prompts to the execution engine.
//!
//! Requests are accepted immediately but handled one at a time, in the order
//! they arrived, by a single [`SubmissionWorker`]. Seeds are advanced after
//! every accepted submission, so each one gets its own.

use futures::future::BoxFuture;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::compiler::{Compiler, Prompt};
use crate::error::{EngineError, NodeError};
use crate::graph::Document;
use crate::migrate::FlowTable;

/// Body of a prompt submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptRequest {
    pub number: i64,
    pub prompt: Prompt,
    pub flows: FlowTable,
    pub extra_data: ExtraData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtraData {
    pub extra_pnginfo: PngInfo,
}

/// Metadata the engine embeds in generated images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PngInfo {
    pub workflow: Document,
}

impl ExtraData {
    pub fn with_workflow(workflow: Document) -> Self {
        Self {
            extra_pnginfo: PngInfo { workflow },
        }
    }
}

/// The engine's answer to an accepted submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueReceipt {
    pub prompt_id: String,
    #[serde(default)]
    pub number: i64,
    #[serde(default)]
    pub node_errors: BTreeMap<String, NodeError>,
}

/// Transport to the execution engine.
pub trait EngineClient: Send + Sync + 'static {
    /// Submit a prompt. A rejection is reported as [`EngineError::Rejected`].
    fn queue_prompt(&self, prompt: &PromptRequest) -> BoxFuture<'_, Result<QueueReceipt, EngineError>>;
}

/// A workflow to be compiled and submitted `batch_count` times.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub number: i64,
    pub batch_count: usize,
    pub document: Document,
}

/// What happened to a [`SubmitRequest`].
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    /// One receipt per accepted run.
    pub receipts: Vec<QueueReceipt>,
    /// The failure that stopped the remaining runs, if any.
    pub error: Option<EngineError>,
    /// The document with its seeds advanced past every accepted run.
    pub document: Document,
    pub missing_types: Vec<String>,
}

/// A request queued for the worker.
pub struct QueueItem {
    pub request: SubmitRequest,
    pub respond: oneshot::Sender<SubmitOutcome>,
}

/// Handle for a queued request.
pub struct Ticket {
    rx: oneshot::Receiver<SubmitOutcome>,
}

impl Ticket {
    /// Waits for the request to be processed. `None` if the worker stopped first.
    pub async fn outcome(self) -> Option<SubmitOutcome> {
        self.rx.await.ok()
    }
}

/// FIFO queue in front of the submission worker.
#[derive(Clone)]
pub struct SubmissionQueue {
    tx: mpsc::Sender<QueueItem>,
}

impl SubmissionQueue {
    /// Create a new queue and return (queue_handle, receiver).
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<QueueItem>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }

    /// Enqueue a request without waiting for it to run.
    pub async fn submit(&self, request: SubmitRequest) -> Result<Ticket, EngineError> {
        let (respond, rx) = oneshot::channel();
        self.tx
            .send(QueueItem { request, respond })
            .await
            .map_err(|_| EngineError::Transport("submission worker has stopped".to_string()))?;
        Ok(Ticket { rx })
    }
}

/// Drains a [`SubmissionQueue`], one request at a time.
pub struct SubmissionWorker {
    rx: mpsc::Receiver<QueueItem>,
    compiler: Arc<Compiler>,
    client: Arc<dyn EngineClient>,
    rng: StdRng,
}

impl SubmissionWorker {
    pub fn new(
        rx: mpsc::Receiver<QueueItem>,
        compiler: Arc<Compiler>,
        client: Arc<dyn EngineClient>,
    ) -> Self {
        let rng = match compiler.config().queue.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            rx,
            compiler,
            client,
            rng,
        }
    }

    /// Makes seed randomization reproducible.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Processes requests until every queue handle is dropped.
    pub async fn run(mut self) {
        while let Some(item) = self.rx.recv().await {
            let number = item.request.number;
            let outcome = self.process(item.request).await;
            if item.respond.send(outcome).is_err() {
                debug!(number, "Submitter dropped its ticket");
            }
        }
        debug!("Submission queue closed");
    }

    async fn process(&mut self, request: SubmitRequest) -> SubmitOutcome {
        let SubmitRequest {
            number,
            batch_count,
            mut document,
        } = request;
        let mut outcome = SubmitOutcome {
            receipts: Vec::with_capacity(batch_count),
            error: None,
            document: Document::default(),
            missing_types: Vec::new(),
        };

        for run in 0..batch_count {
            let compiled = match self.compiler.compile(&document).await {
                Ok(compiled) => compiled,
                Err(e) => {
                    warn!(number, run, error = %e, "Failed to compile workflow");
                    outcome.error = Some(e.into());
                    break;
                }
            };
            outcome.missing_types = compiled.missing_types.clone();

            match self.client.queue_prompt(&compiled.to_request(number)).await {
                Ok(receipt) => {
                    if !receipt.node_errors.is_empty() {
                        warn!(number, prompt_id = %receipt.prompt_id, nodes = receipt.node_errors.len(), "Engine reported node errors");
                    }
                    outcome.receipts.push(receipt);
                }
                Err(e) => {
                    warn!(number, run, error = %e, "Engine rejected prompt");
                    outcome.error = Some(e);
                    break;
                }
            }

            if let Some(path) = &self.compiler.config().snapshot.path {
                if let Err(e) = compiled.save_snapshot(path) {
                    warn!(path = %path.display(), error = %e, "Failed to write workflow snapshot");
                }
            }
            self.compiler
                .advance_seed_controls(&mut document, &mut self.rng);
        }

        outcome.document = document;
        outcome
    }
}
