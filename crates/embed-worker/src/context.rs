use std::sync::{Arc, OnceLock};

use embed_core::{EmbeddingVector, LifecycleState};
use embed_error::{ErrorDetail, WorkerError};
use tokio::sync::watch;
use tracing::instrument;

use crate::cancel_token::{cancellation_pair, CancellationListener};
use crate::config::WorkerConfig;
use crate::pipeline::{self, PipelineOptions};
use crate::provider::{InferenceRuntime, InferenceSession, SessionOptions};
use crate::tokenizer::Tokenizer;
use crate::vocab::{self, VocabSource};

/// Session and tokenizer, written once when initialization wins its race.
#[derive(Debug)]
struct Resources {
    session: Arc<dyn InferenceSession>,
    tokenizer: Tokenizer,
}

/// One execution context: owns the lifecycle state and, once ready, the session and tokenizer.
///
/// Initialization runs at most once. Session creation and the vocabulary load are spawned as a
/// single task and raced against `init_timeout`; if the timer wins, the task is abandoned (not
/// aborted) and told so through a cancellation flag, and nothing it produces is ever stored.
/// After `Ready`, inference reads the resources without locking.
#[derive(Debug)]
pub struct EmbeddingContext {
    config: Arc<WorkerConfig>,
    runtime: Arc<dyn InferenceRuntime>,
    vocab_source: Arc<dyn VocabSource>,
    options: PipelineOptions,
    state: watch::Sender<LifecycleState>,
    resources: OnceLock<Resources>,
}

impl EmbeddingContext {
    pub fn new(
        config: WorkerConfig,
        runtime: Arc<dyn InferenceRuntime>,
        vocab_source: Arc<dyn VocabSource>,
    ) -> Self {
        let options = PipelineOptions::from_config(&config);
        let (state, _) = watch::channel(LifecycleState::Uninitialized);
        Self {
            config: Arc::new(config),
            runtime,
            vocab_source,
            options,
            state,
            resources: OnceLock::new(),
        }
    }

    /// Like [`EmbeddingContext::new`], reading the vocabulary from the configured location.
    pub fn with_configured_vocab(config: WorkerConfig, runtime: Arc<dyn InferenceRuntime>) -> Self {
        let source = vocab::source_for(&config);
        Self::new(config, runtime, source)
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Observe lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Atomically move `from -> to`; on mismatch returns the state actually found.
    fn transition(&self, from: LifecycleState, to: LifecycleState) -> Result<(), LifecycleState> {
        debug_assert!(from.can_transition_to(to));
        let mut found = from;
        let changed = self.state.send_if_modified(|s| {
            if *s == from {
                *s = to;
                true
            } else {
                found = *s;
                false
            }
        });
        if changed {
            tracing::info!(target: "embed_lifecycle", %from, %to, "lifecycle transition");
            Ok(())
        } else {
            Err(found)
        }
    }

    /// Run initialization. Only the first call proceeds; any later or concurrent call is
    /// rejected with a state error and leaves the context untouched.
    #[instrument(skip(self), fields(model = %self.config.model_location, timeout_ms = self.config.init_timeout_ms))]
    pub async fn initialize(&self) -> Result<(), WorkerError> {
        self.transition(LifecycleState::Uninitialized, LifecycleState::Initializing)
            .map_err(|state| WorkerError::new(ErrorDetail::InitRejected { state }))?;

        match self.race_initialization().await {
            Ok(resources) => {
                if self.resources.set(resources).is_err() {
                    self.settle(LifecycleState::Failed);
                    return Err(WorkerError::uncaught("context resources were already set"));
                }
                self.settle(LifecycleState::Ready);
                Ok(())
            }
            Err(e) => {
                self.settle(LifecycleState::Failed);
                Err(e)
            }
        }
    }

    /// Leave `Initializing`. Only the caller that won the init transition gets here, so a
    /// mismatch means that invariant is broken.
    fn settle(&self, to: LifecycleState) {
        if let Err(found) = self.transition(LifecycleState::Initializing, to) {
            tracing::error!(
                target: "embed_lifecycle",
                %found,
                %to,
                "lifecycle left initializing outside the init winner"
            );
        }
    }

    async fn race_initialization(&self) -> Result<Resources, WorkerError> {
        if !self.runtime.is_available() {
            return Err(WorkerError::new(ErrorDetail::Initialization {
                reason: "runtime does not expose session creation".into(),
            }));
        }

        let (cancel, listener) = cancellation_pair();
        let work = tokio::spawn(load_resources(
            Arc::clone(&self.config),
            Arc::clone(&self.runtime),
            Arc::clone(&self.vocab_source),
            listener,
        ));

        match tokio::time::timeout(self.config.init_timeout(), work).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(WorkerError::with_cause(
                ErrorDetail::Uncaught {
                    message: "initialization task failed".into(),
                },
                join_err,
            )),
            Err(_elapsed) => {
                // the JoinHandle is dropped here: the task keeps running, detached
                cancel.cancel();
                Err(WorkerError::new(ErrorDetail::Timeout {
                    timeout_ms: self.config.init_timeout_ms,
                }))
            }
        }
    }

    /// Compute the embedding for `text`. Refused unless the context is `Ready`; a refused
    /// request never reaches the inference provider.
    pub async fn embed(&self, text: &str) -> Result<EmbeddingVector, WorkerError> {
        let state = self.state();
        let resources = match self.resources.get() {
            Some(resources) if state.is_ready() => resources,
            _ => return Err(WorkerError::not_initialized(state)),
        };
        pipeline::compute_embedding(text, &resources.tokenizer, &resources.session, &self.options)
            .await
    }
}

fn abandon_checkpoint(listener: &CancellationListener, timeout_ms: u64) -> Result<(), WorkerError> {
    listener.checkpoint().map_err(|abandoned| {
        tracing::debug!(target: "embed_lifecycle", "init work finished after timeout, discarding");
        WorkerError::with_cause(ErrorDetail::Timeout { timeout_ms }, abandoned)
    })
}

async fn load_resources(
    config: Arc<WorkerConfig>,
    runtime: Arc<dyn InferenceRuntime>,
    vocab_source: Arc<dyn VocabSource>,
    listener: CancellationListener,
) -> Result<Resources, WorkerError> {
    let options = SessionOptions::from_config(&config);
    let session = match runtime.create_session(&config.model_location, &options).await {
        Ok(session) => session,
        Err(e) => {
            return Err(WorkerError::with_boxed_cause(
                ErrorDetail::Session {
                    model_location: config.model_location.clone(),
                    execution_providers: options.execution_providers,
                    optimization_level: options.optimization_level,
                },
                e,
            ))
        }
    };
    abandon_checkpoint(&listener, config.init_timeout_ms)?;
    tracing::debug!(target: "embed_lifecycle", "inference session created");

    let tokenizer = vocab::load_tokenizer(
        vocab_source.as_ref(),
        &config.vocab_pointer,
        &config.unknown_token,
        config.max_length,
    )
    .await?;
    abandon_checkpoint(&listener, config.init_timeout_ms)?;

    Ok(Resources { session, tokenizer })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderError;
    use crate::vocab::FetchError;
    use async_trait::async_trait;
    use embed_core::{Tensor, TensorData};
    use embed_error::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug)]
    struct OnesSession {
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl InferenceSession for OnesSession {
        async fn run(&self, inputs: Vec<Tensor>) -> Result<Vec<Tensor>, ProviderError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let seq_len = inputs[0].shape[1];
            Ok(vec![Tensor::new(
                "out",
                vec![1, seq_len, 3],
                TensorData::Float32(vec![1.0; seq_len * 3]),
            )?])
        }
    }

    #[derive(Debug)]
    struct Runtime {
        available: bool,
        delay: Duration,
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl InferenceRuntime for Runtime {
        fn is_available(&self) -> bool {
            self.available
        }

        async fn create_session(
            &self,
            _model_location: &str,
            _options: &SessionOptions,
        ) -> Result<Arc<dyn InferenceSession>, ProviderError> {
            tokio::time::sleep(self.delay).await;
            Ok(Arc::new(OnesSession {
                runs: Arc::clone(&self.runs),
            }))
        }
    }

    #[derive(Debug)]
    struct StaticVocab {
        fetches: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl VocabSource for StaticVocab {
        fn location(&self) -> &str {
            "static"
        }

        async fn fetch(&self) -> Result<serde_json::Value, FetchError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(serde_json::json!({ "model": { "vocab": { "[UNK]": 0, "hi": 1 } } }))
        }
    }

    /// How often the model ran and how often the vocabulary was fetched.
    struct Counters {
        runs: Arc<AtomicUsize>,
        fetches: Arc<AtomicUsize>,
    }

    fn context(available: bool, delay: Duration, timeout_ms: u64) -> (EmbeddingContext, Counters) {
        let runs = Arc::new(AtomicUsize::new(0));
        let fetches = Arc::new(AtomicUsize::new(0));
        let config = WorkerConfig {
            max_length: 4,
            init_timeout_ms: timeout_ms,
            parallelism: Some(2),
            ..Default::default()
        };
        let runtime = Arc::new(Runtime {
            available,
            delay,
            runs: Arc::clone(&runs),
        });
        let vocab = Arc::new(StaticVocab {
            fetches: Arc::clone(&fetches),
        });
        (
            EmbeddingContext::new(config, runtime, vocab),
            Counters { runs, fetches },
        )
    }

    #[tokio::test]
    async fn initializes_then_serves() {
        let (ctx, counters) = context(true, Duration::ZERO, 1_000);
        assert_eq!(ctx.state(), LifecycleState::Uninitialized);

        ctx.initialize().await.unwrap();
        assert_eq!(ctx.state(), LifecycleState::Ready);
        assert_eq!(counters.fetches.load(Ordering::SeqCst), 1);

        let v = ctx.embed("hi there").await.unwrap();
        assert_eq!(v.len(), 3);
        assert_eq!(counters.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejects_inference_before_ready() {
        let (ctx, counters) = context(true, Duration::ZERO, 1_000);
        let err = ctx.embed("hi").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
        assert_eq!(counters.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unavailable_runtime_fails_initialization() {
        let (ctx, _) = context(false, Duration::ZERO, 1_000);
        let err = ctx.initialize().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Initialization);
        assert_eq!(ctx.state(), LifecycleState::Failed);
    }

    #[tokio::test]
    async fn timeout_wins_and_abandoned_work_stops_at_checkpoint() {
        let (ctx, counters) = context(true, Duration::from_millis(200), 20);
        let err = ctx.initialize().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(ctx.state(), LifecycleState::Failed);

        // the late session arrives; the loader must stop there instead of fetching the vocabulary
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(counters.fetches.load(Ordering::SeqCst), 0);
        assert_eq!(ctx.state(), LifecycleState::Failed);
        assert_eq!(ctx.embed("hi").await.unwrap_err().kind(), ErrorKind::State);
        assert_eq!(counters.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn second_initialize_is_rejected() {
        let (ctx, _) = context(true, Duration::ZERO, 1_000);
        ctx.initialize().await.unwrap();
        let err = ctx.initialize().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
        assert_eq!(ctx.state(), LifecycleState::Ready);
    }

    #[tokio::test]
    async fn concurrent_initialize_has_single_winner() {
        let (ctx, _) = context(true, Duration::from_millis(30), 1_000);
        let (a, b) = tokio::join!(ctx.initialize(), ctx.initialize());
        assert_eq!(usize::from(a.is_ok()) + usize::from(b.is_ok()), 1);
        let loser = a.err().or(b.err()).unwrap();
        assert_eq!(loser.kind(), ErrorKind::State);
        assert_eq!(ctx.state(), LifecycleState::Ready);
    }

    struct Captured(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn settling_without_winning_init_is_logged_and_ignored() {
        let buf = Arc::new(std::sync::Mutex::new(Vec::new()));
        let writer = {
            let buf = Arc::clone(&buf);
            move || Captured(Arc::clone(&buf))
        };
        let subscriber = tracing_subscriber::fmt()
            .with_writer(writer)
            .with_ansi(false)
            .finish();

        let (ctx, _) = context(true, Duration::ZERO, 1_000);
        tracing::subscriber::with_default(subscriber, || ctx.settle(LifecycleState::Ready));

        assert_eq!(ctx.state(), LifecycleState::Uninitialized);
        let out = String::from_utf8(buf.lock().unwrap().clone()).unwrap();
        assert!(out.contains("ERROR"), "{out}");
        assert!(out.contains("lifecycle left initializing outside the init winner"));
    }

    #[tokio::test]
    async fn subscribers_see_transitions() {
        let (ctx, _) = context(true, Duration::ZERO, 1_000);
        let rx = ctx.subscribe();
        ctx.initialize().await.unwrap();
        assert_eq!(*rx.borrow(), LifecycleState::Ready);
    }
}
