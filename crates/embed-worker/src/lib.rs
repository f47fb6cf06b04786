//! Sentence embedding worker.
//!
//! A worker owns one [`EmbeddingContext`]: it is initialized once (inference session plus
//! vocabulary, raced against a timeout) and then turns text into a unit-length embedding by
//! running the model and mean-pooling its last hidden state over the attention mask.
//!
//! The host talks to the worker through an [`EmbedWorkerHandle`], either with typed calls
//! ([`EmbedWorkerHandle::init`], [`EmbedWorkerHandle::infer`]) or with serialized
//! [`WorkerCommand`]s via [`EmbedWorkerHandle::post_json`]. Every failure reaches the host as a
//! structured error record; see [`embed_error`].
//!
//! The inference engine is not part of this crate: hosts supply an [`InferenceRuntime`].
//!
//! ```rust,ignore
//! let config = WorkerConfig::load()?;
//! let worker = EmbedWorkerHandle::spawn(config, Arc::new(MyOnnxRuntime::new()))?;
//! worker.init().await?;
//! let embedding = worker.infer("hello world").await?;
//! ```
pub mod cancel_token;
pub mod config;
pub mod context;
pub mod error;
pub mod handle;
pub mod pipeline;
pub mod pooling;
pub mod protocol;
pub mod provider;
pub mod telemetry;
pub mod tokenizer;
pub mod vocab;
pub mod worker;

pub use config::{ConfigError, WorkerConfig};
pub use context::EmbeddingContext;
pub use error::RecvError;
pub use handle::{EmbedWorkerBuilder, EmbedWorkerHandle};
pub use pipeline::PipelineOptions;
pub use protocol::{WorkerCommand, WorkerResponse};
pub use provider::{InferenceRuntime, InferenceSession, ProviderError, SessionOptions};
pub use tokenizer::{Tokenizer, Vocabulary};
pub use vocab::{FetchError, FileVocabSource, HttpVocabSource, VocabSource};
