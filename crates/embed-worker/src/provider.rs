//! Contract with the inference provider. The provider itself is external; the worker only
//! creates a session once and then runs it with named tensors.

use std::sync::Arc;

use async_trait::async_trait;
use embed_core::Tensor;
use serde::{Deserialize, Serialize};

use crate::config::WorkerConfig;

pub type ProviderError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOptions {
    pub execution_providers: Vec<String>,
    pub optimization_level: String,
}

impl SessionOptions {
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            execution_providers: config.execution_providers.clone(),
            optimization_level: config.optimization_level.clone(),
        }
    }
}

/// The loaded runtime environment that sessions are created from.
#[async_trait]
pub trait InferenceRuntime: Send + Sync + std::fmt::Debug {
    /// Whether the runtime finished loading and can create sessions.
    fn is_available(&self) -> bool;

    async fn create_session(
        &self,
        model_location: &str,
        options: &SessionOptions,
    ) -> Result<Arc<dyn InferenceSession>, ProviderError>;
}

/// A loaded model. Shared read-only by every inference call.
#[async_trait]
pub trait InferenceSession: Send + Sync + std::fmt::Debug {
    /// Run the model on the named inputs and return its named outputs, in model order.
    async fn run(&self, inputs: Vec<Tensor>) -> Result<Vec<Tensor>, ProviderError>;
}
