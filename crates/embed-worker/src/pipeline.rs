use std::sync::Arc;

use embed_core::{
    ElementType, EmbeddingVector, Encoding, Tensor, TensorData, ATTENTION_MASK, INPUT_IDS,
    TOKEN_TYPE_IDS,
};
use embed_error::{ErrorDetail, WorkerError};
use tracing::instrument;

use crate::config::WorkerConfig;
use crate::pooling;
use crate::provider::InferenceSession;
use crate::tokenizer::Tokenizer;

/// Per-call knobs taken from the worker config.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub input_element_type: ElementType,
    pub output_name: Option<String>,
    pub parallelism: usize,
}

impl PipelineOptions {
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            input_element_type: config.input_element_type,
            output_name: config.output_name.clone(),
            parallelism: config.effective_parallelism(),
        }
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from_config(&WorkerConfig::default())
    }
}

/// The three `[1, L]` integer inputs, in the order the provider expects them.
pub fn build_inputs(
    encoding: &Encoding,
    element_type: ElementType,
) -> Result<Vec<Tensor>, WorkerError> {
    let shape = vec![1, encoding.len()];
    [
        (INPUT_IDS, &encoding.ids),
        (ATTENTION_MASK, &encoding.attention_mask),
        (TOKEN_TYPE_IDS, &encoding.token_type_ids),
    ]
    .into_iter()
    .map(|(name, values)| {
        Tensor::from_ints(name, shape.clone(), values, element_type).map_err(|e| {
            WorkerError::with_cause(
                ErrorDetail::Embedding {
                    reason: format!("failed to build input tensor {name}"),
                },
                e,
            )
        })
    })
    .collect()
}

/// Pick the named output, or the first one when no name is configured.
pub fn select_output(outputs: Vec<Tensor>, name: Option<&str>) -> Result<Tensor, WorkerError> {
    match name {
        Some(name) => outputs
            .into_iter()
            .find(|t| t.name == name)
            .ok_or_else(|| WorkerError::embedding(format!("model produced no output named {name}"))),
        None => outputs
            .into_iter()
            .next()
            .ok_or_else(|| WorkerError::embedding("model produced no outputs")),
    }
}

/// Validate `[1, seq_len, H]` float output and return `(H, data)`.
pub fn hidden_states(output: Tensor, seq_len: usize) -> Result<(usize, Vec<f32>), WorkerError> {
    let hidden_size = match output.shape.as_slice() {
        [1, s, h] if *s == seq_len && *h > 0 => *h,
        dims => {
            return Err(WorkerError::embedding(format!(
                "output {} has dims {dims:?}, expected [1, {seq_len}, H]",
                output.name
            )))
        }
    };
    let data = match output.data {
        TensorData::Float32(data) => data,
        other => {
            return Err(WorkerError::embedding(format!(
                "output {} holds {} values, expected float32",
                output.name,
                other.element_type()
            )))
        }
    };
    if data.len() != seq_len * hidden_size {
        return Err(WorkerError::embedding(format!(
            "output {} holds {} values, dims require {}",
            output.name,
            data.len(),
            seq_len * hidden_size
        )));
    }
    Ok((hidden_size, data))
}

/// Masked mean pooling followed by L2 normalization, on the blocking pool.
pub async fn pool_and_normalize(
    hidden: Vec<f32>,
    mask: Vec<i64>,
    hidden_size: usize,
    parallelism: usize,
) -> Result<EmbeddingVector, WorkerError> {
    let max_length = mask.len();
    let pooled = tokio::task::spawn_blocking(move || {
        pooling::masked_sum(&hidden, &mask, hidden_size, parallelism)
    })
    .await
    .map_err(|e| {
        WorkerError::with_cause(
            ErrorDetail::Embedding {
                reason: "pooling task failed".into(),
            },
            e,
        )
    })?;

    tracing::trace!(valid_tokens = pooled.valid_tokens, "pooled hidden states");
    let mean = pooled
        .mean()
        .ok_or_else(|| WorkerError::new(ErrorDetail::NoValidTokens { max_length }))?;
    pooling::l2_normalize(mean)
        .ok_or_else(|| WorkerError::embedding("mean embedding has zero or non-finite norm"))
}

/// Tokenize, run the session, pool and normalize. No retries: the first failure is returned.
///
/// Text with no tokens is rejected before the session is run.
#[instrument(skip_all, fields(text_len = text.len(), max_length = tokenizer.max_length()))]
pub async fn compute_embedding(
    text: &str,
    tokenizer: &Tokenizer,
    session: &Arc<dyn InferenceSession>,
    options: &PipelineOptions,
) -> Result<EmbeddingVector, WorkerError> {
    let encoding = tokenizer.encode(text);
    if encoding.valid_tokens() == 0 {
        return Err(WorkerError::new(ErrorDetail::NoValidTokens {
            max_length: encoding.len(),
        }));
    }
    let seq_len = encoding.len();
    let inputs = build_inputs(&encoding, options.input_element_type)?;

    let outputs = match session.run(inputs).await {
        Ok(outputs) => outputs,
        Err(e) => {
            return Err(WorkerError::with_boxed_cause(
                ErrorDetail::Embedding {
                    reason: "inference provider failed".into(),
                },
                e,
            ))
        }
    };
    let output = select_output(outputs, options.output_name.as_deref())?;
    let (hidden_size, hidden) = hidden_states(output, seq_len)?;

    let embedding =
        pool_and_normalize(hidden, encoding.attention_mask, hidden_size, options.parallelism)
            .await?;
    tracing::debug!(hidden_size, "embedding computed");
    Ok(embedding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderError;
    use crate::tokenizer::Vocabulary;
    use async_trait::async_trait;
    use embed_error::ErrorKind;
    use std::collections::HashMap;

    /// Echoes each input id as a hidden row `[id, 1.0]`.
    #[derive(Debug)]
    struct EchoSession;

    #[async_trait]
    impl InferenceSession for EchoSession {
        async fn run(&self, inputs: Vec<Tensor>) -> Result<Vec<Tensor>, ProviderError> {
            let ids = match &inputs[0].data {
                TensorData::Int64(v) => v.iter().map(|&x| x as f32).collect::<Vec<_>>(),
                TensorData::Int32(v) => v.iter().map(|&x| x as f32).collect(),
                TensorData::Float32(_) => return Err("float ids".into()),
            };
            let seq_len = ids.len();
            let data = ids.into_iter().flat_map(|id| [id, 1.0]).collect();
            Ok(vec![Tensor::new(
                "last_hidden_state",
                vec![1, seq_len, 2],
                TensorData::Float32(data),
            )?])
        }
    }

    #[derive(Debug)]
    struct FailingSession;

    #[async_trait]
    impl InferenceSession for FailingSession {
        async fn run(&self, _inputs: Vec<Tensor>) -> Result<Vec<Tensor>, ProviderError> {
            Err("device lost".into())
        }
    }

    fn tokenizer() -> Tokenizer {
        let ids = HashMap::from([
            ("hello".to_string(), 3),
            ("world".to_string(), 4),
            ("[UNK]".to_string(), 0),
        ]);
        Tokenizer::new(Vocabulary::new(ids, "[UNK]").unwrap(), 4).unwrap()
    }

    fn options() -> PipelineOptions {
        PipelineOptions {
            input_element_type: ElementType::Int64,
            output_name: None,
            parallelism: 2,
        }
    }

    #[tokio::test]
    async fn computes_unit_norm_mean_embedding() {
        let session: Arc<dyn InferenceSession> = Arc::new(EchoSession);
        let v = compute_embedding("hello world", &tokenizer(), &session, &options())
            .await
            .unwrap();
        // mean of [3,1] and [4,1] is [3.5, 1.0]
        let norm = (3.5f32 * 3.5 + 1.0).sqrt();
        assert!((v[0] - 3.5 / norm).abs() < 1e-6);
        assert!((v[1] - 1.0 / norm).abs() < 1e-6);
        assert!((v.iter().map(|x| x * x).sum::<f32>().sqrt() - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn empty_text_reports_no_valid_tokens() {
        // the session would reject these inputs, so reaching it would change the error kind
        let session: Arc<dyn InferenceSession> = Arc::new(FailingSession);
        let err = compute_embedding("", &tokenizer(), &session, &options())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoValidTokens);
        assert_eq!(err.to_record().details["max_length"], 4);
    }

    #[tokio::test]
    async fn zero_norm_is_an_embedding_error() {
        let err = pool_and_normalize(vec![0.0; 8], vec![1, 1, 0, 0], 2, 2)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Embedding);
    }

    #[tokio::test]
    async fn provider_failure_is_wrapped() {
        let session: Arc<dyn InferenceSession> = Arc::new(FailingSession);
        let err = compute_embedding("hello", &tokenizer(), &session, &options())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Embedding);
        assert_eq!(err.to_record().cause.as_deref(), Some("device lost"));
    }

    #[test]
    fn inputs_follow_element_type() {
        let enc = tokenizer().encode("hello");
        let inputs = build_inputs(&enc, ElementType::Int32).unwrap();
        let names: Vec<_> = inputs.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, [INPUT_IDS, ATTENTION_MASK, TOKEN_TYPE_IDS]);
        assert!(inputs.iter().all(|t| t.shape == vec![1, 4]));
        assert_eq!(inputs[1].data, TensorData::Int32(vec![1, 0, 0, 0]));
    }

    #[test]
    fn output_selection_and_dims_are_checked() {
        let a = Tensor::new("a", vec![1, 2, 1], TensorData::Float32(vec![1.0, 2.0])).unwrap();
        let b = Tensor::new("b", vec![1, 1, 2], TensorData::Float32(vec![1.0, 2.0])).unwrap();

        let picked = select_output(vec![a.clone(), b.clone()], Some("b")).unwrap();
        assert_eq!(picked.name, "b");
        assert_eq!(select_output(vec![a.clone(), b.clone()], None).unwrap().name, "a");
        assert!(select_output(vec![a.clone()], Some("missing")).is_err());
        assert!(select_output(vec![], None).is_err());

        assert_eq!(hidden_states(a.clone(), 2).unwrap().0, 1);
        assert_eq!(hidden_states(a, 3).unwrap_err().kind(), ErrorKind::Embedding);
        let ints = Tensor::new("i", vec![1, 1, 1], TensorData::Int64(vec![1])).unwrap();
        assert!(hidden_states(ints, 1).is_err());
    }
}
