use std::sync::Arc;
use std::thread;

use embed_core::{EmbeddingVector, LifecycleState};
use embed_error::{ErrorPolicy, TracingPolicy, WorkerError};
use tokio::sync::{mpsc, oneshot, watch};
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::context::EmbeddingContext;
use crate::error::RecvError;
use crate::protocol::{self, WorkerCommand, WorkerResponse};
use crate::provider::InferenceRuntime;
use crate::vocab::VocabSource;
use crate::worker::{EmbedWorker, WorkerMessage, WorkerReply, WorkerRequest};

/// A handle to the embed worker.
/// Cheap to clone; every clone talks to the same worker and the same context.
#[derive(Clone, Debug)]
pub struct EmbedWorkerHandle {
    request_sender: mpsc::Sender<WorkerMessage>,
    state: watch::Receiver<LifecycleState>,
}

impl EmbedWorkerHandle {
    /// Create a builder to configure the worker before starting it.
    pub fn builder(config: WorkerConfig, runtime: Arc<dyn InferenceRuntime>) -> EmbedWorkerBuilder {
        EmbedWorkerBuilder::new(config, runtime)
    }

    /// Spawn a worker with default settings and the configured vocabulary source.
    pub fn spawn(
        config: WorkerConfig,
        runtime: Arc<dyn InferenceRuntime>,
    ) -> std::io::Result<Self> {
        Self::builder(config, runtime).build()
    }

    /// Send one command and wait for its response; failures arrive as error responses.
    pub async fn send(&self, command: WorkerCommand) -> Result<WorkerResponse, RecvError> {
        let reply = self.request(command).await?;
        Ok(reply.unwrap_or_else(WorkerResponse::from))
    }

    async fn request(&self, command: WorkerCommand) -> Result<WorkerReply, RecvError> {
        let (responder, response_rx) = oneshot::channel();
        let request = WorkerRequest {
            id: Uuid::new_v4(),
            command,
            responder,
        };
        self.request_sender
            .send(WorkerMessage::Request(request))
            .await
            .map_err(|_| RecvError::SendError)?;
        response_rx.await.map_err(|_| RecvError::RecvError)
    }

    /// Initialize the worker's context. Succeeds at most once per worker.
    pub async fn init(&self) -> Result<(), WorkerError> {
        match self.request(WorkerCommand::Init).await?? {
            WorkerResponse::InitComplete => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Embed `text`; the result is unit length.
    pub async fn infer(&self, text: impl Into<String>) -> Result<EmbeddingVector, WorkerError> {
        let command = WorkerCommand::Infer { text: text.into() };
        match self.request(command).await?? {
            WorkerResponse::InferComplete { embedding } => Ok(embedding),
            other => Err(unexpected(other)),
        }
    }

    /// Accept a serialized command and return the serialized response.
    ///
    /// Malformed input and channel failures come back as error responses, so the caller always
    /// gets exactly one well-formed reply.
    pub async fn post_json(&self, raw: &str) -> String {
        let response = match protocol::decode_command(raw) {
            Ok(command) => match self.send(command).await {
                Ok(response) => response,
                Err(e) => WorkerResponse::from(WorkerError::from(e)),
            },
            Err(e) => WorkerResponse::from(e),
        };
        protocol::encode_response(&response)
    }

    /// Current lifecycle state of the worker's context.
    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.clone()
    }

    /// Sends a shutdown signal to the worker. Requests already running still get their response;
    /// anything sent afterwards fails with a [`RecvError`].
    pub async fn shutdown(&self) {
        let _ = self.request_sender.send(WorkerMessage::Shutdown).await;
    }
}

fn unexpected(response: WorkerResponse) -> WorkerError {
    WorkerError::uncaught(format!("unexpected response: {response:?}"))
}

/// Configures and starts an [`EmbedWorker`] on its own thread.
///
/// The worker runs a current-thread tokio runtime on a dedicated thread, so the host's runtime
/// (if any) is never blocked by session creation or pooling.
pub struct EmbedWorkerBuilder {
    config: WorkerConfig,
    runtime: Arc<dyn InferenceRuntime>,
    vocab_source: Option<Arc<dyn VocabSource>>,
    policy: Option<Arc<dyn ErrorPolicy>>,
}

impl EmbedWorkerBuilder {
    pub fn new(config: WorkerConfig, runtime: Arc<dyn InferenceRuntime>) -> Self {
        Self {
            config,
            runtime,
            vocab_source: None,
            policy: None,
        }
    }

    /// Read the vocabulary from `source` instead of the configured location.
    pub fn with_vocab_source(mut self, source: Arc<dyn VocabSource>) -> Self {
        self.vocab_source = Some(source);
        self
    }

    /// How failures are reported. Defaults to [`TracingPolicy`].
    pub fn with_error_policy(mut self, policy: Arc<dyn ErrorPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Spawn the worker thread and return a handle to it.
    pub fn build(self) -> std::io::Result<EmbedWorkerHandle> {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));

        let context = match self.vocab_source {
            Some(source) => EmbeddingContext::new(self.config, self.runtime, source),
            None => EmbeddingContext::with_configured_vocab(self.config, self.runtime),
        };
        let state = context.subscribe();
        let policy = self
            .policy
            .unwrap_or_else(|| Arc::new(TracingPolicy) as Arc<dyn ErrorPolicy>);

        thread::Builder::new().name("embed-worker".into()).spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    // dropping `rx` here makes every request fail with a send error
                    tracing::error!(error = %e, "failed to build embed worker runtime");
                    return;
                }
            };
            rt.block_on(EmbedWorker::new(rx, Arc::new(context), policy).run());
        })?;

        Ok(EmbedWorkerHandle {
            request_sender: tx,
            state,
        })
    }
}
