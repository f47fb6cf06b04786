//! Mock inference runtime, session and vocabulary source for exercising the worker end to end.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use embed_core::{Tensor, TensorData};
use embed_error::{ErrorKind, ErrorPolicy, Severity, WorkerError};
use embed_worker::vocab::FetchError;
use embed_worker::{
    EmbedWorkerHandle, InferenceRuntime, InferenceSession, ProviderError, SessionOptions,
    VocabSource, WorkerConfig,
};
use serde_json::{json, Value};

pub const HIDDEN_SIZE: usize = 4;

/// Token ids used by [`sample_vocab`].
pub const HELLO_ID: i64 = 7;
pub const WORLD_ID: i64 = 5;
pub const UNK_ID: i64 = 1;

/// A tokenizer document in the usual `{"model": {"vocab": {...}}}` layout.
pub fn sample_vocab() -> Value {
    json!({
        "version": "1.0",
        "model": {
            "type": "WordPiece",
            "unk_token": "[UNK]",
            "vocab": {
                "[PAD]": 0,
                "[UNK]": UNK_ID,
                "hello": HELLO_ID,
                "world": WORLD_ID,
                "rust": 11,
            }
        }
    })
}

/// Small, fast config: `max_length` 8, 1 s init timeout, two pooling chunks.
pub fn sample_config() -> WorkerConfig {
    WorkerConfig {
        max_length: 8,
        init_timeout_ms: 1_000,
        parallelism: Some(2),
        ..Default::default()
    }
}

/// Hidden state row for a token: `[id, 1, 1, ...]`, so the pooled mean is predictable.
pub fn hidden_row(id: i64) -> Vec<f32> {
    let mut row = vec![1.0; HIDDEN_SIZE];
    row[0] = id as f32;
    row
}

/// Records how often it was run and what it was given.
#[derive(Debug, Default)]
pub struct MockSession {
    runs: AtomicUsize,
    last_inputs: Mutex<Vec<Tensor>>,
    delay: Duration,
    failure: Option<String>,
}

impl MockSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn last_inputs(&self) -> Vec<Tensor> {
        self.last_inputs
            .lock()
            .map(|inputs| inputs.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl InferenceSession for MockSession {
    async fn run(&self, inputs: Vec<Tensor>) -> Result<Vec<Tensor>, ProviderError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_inputs.lock() {
            *last = inputs.clone();
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(message) = &self.failure {
            return Err(message.clone().into());
        }

        let ids: Vec<i64> = match inputs.first().map(|t| &t.data) {
            Some(TensorData::Int64(ids)) => ids.clone(),
            Some(TensorData::Int32(ids)) => ids.iter().map(|&id| i64::from(id)).collect(),
            _ => return Err("input_ids missing or not an integer tensor".into()),
        };
        let seq_len = ids.len();
        let hidden = ids.into_iter().flat_map(hidden_row).collect();
        let output = Tensor::new(
            "last_hidden_state",
            vec![1, seq_len, HIDDEN_SIZE],
            TensorData::Float32(hidden),
        )?;
        Ok(vec![output])
    }
}

/// Hands out one shared [`MockSession`] after an optional delay.
#[derive(Debug)]
pub struct MockRuntime {
    available: bool,
    delay: Duration,
    failure: Option<String>,
    session: Arc<MockSession>,
    sessions_created: AtomicUsize,
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new(MockSession::new())
    }
}

impl MockRuntime {
    pub fn new(session: MockSession) -> Self {
        Self {
            available: true,
            delay: Duration::ZERO,
            failure: None,
            session: Arc::new(session),
            sessions_created: AtomicUsize::new(0),
        }
    }

    /// A runtime that never finished loading.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    pub fn session(&self) -> Arc<MockSession> {
        Arc::clone(&self.session)
    }

    pub fn sessions_created(&self) -> usize {
        self.sessions_created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceRuntime for MockRuntime {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn create_session(
        &self,
        model_location: &str,
        options: &SessionOptions,
    ) -> Result<Arc<dyn InferenceSession>, ProviderError> {
        tracing::debug!(model_location, ?options, "mock session requested");
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(message) = &self.failure {
            return Err(message.clone().into());
        }
        self.sessions_created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.session) as Arc<dyn InferenceSession>)
    }
}

/// Serves a fixed document, or a fixed failure status. Clones share the fetch counter.
#[derive(Debug, Clone)]
pub struct MockVocabSource {
    document: Value,
    status: Option<u16>,
    delay: Duration,
    fetches: Arc<AtomicUsize>,
}

impl Default for MockVocabSource {
    fn default() -> Self {
        Self::new(sample_vocab())
    }
}

impl MockVocabSource {
    pub fn new(document: Value) -> Self {
        Self {
            document,
            status: None,
            delay: Duration::ZERO,
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_status(status: u16) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VocabSource for MockVocabSource {
    fn location(&self) -> &str {
        "mock://tokenizer.json"
    }

    async fn fetch(&self) -> Result<Value, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.status {
            Some(status) => Err(FetchError::Status { status }),
            None => Ok(self.document.clone()),
        }
    }
}

/// Remembers the kind of every error the worker reported.
#[derive(Debug, Default)]
pub struct RecordingPolicy {
    kinds: Mutex<Vec<ErrorKind>>,
}

impl RecordingPolicy {
    pub fn kinds(&self) -> Vec<ErrorKind> {
        self.kinds
            .lock()
            .map(|kinds| kinds.clone())
            .unwrap_or_default()
    }
}

impl ErrorPolicy for RecordingPolicy {
    fn classify(&self, error: &WorkerError) -> Severity {
        error.severity()
    }

    fn emit(&self, error: &WorkerError) {
        if let Ok(mut kinds) = self.kinds.lock() {
            kinds.push(error.kind());
        }
    }
}

/// Spawn a worker wired to the given mocks.
pub fn spawn_worker(
    config: WorkerConfig,
    runtime: Arc<MockRuntime>,
    vocab: MockVocabSource,
) -> EmbedWorkerHandle {
    EmbedWorkerHandle::builder(config, runtime)
        .with_vocab_source(Arc::new(vocab))
        .build()
        .expect("spawn embed worker thread")
}

/// Euclidean norm, for asserting unit length.
pub fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}
