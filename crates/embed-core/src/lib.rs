//! Plain data types shared between the embedding worker and its host.
//!
//! Nothing in here performs I/O or knows about the inference provider; the types are the
//! vocabulary the other crates speak: token encodings, shaped tensors, lifecycle states and the
//! final embedding vector.
pub mod encoding;
pub mod lifecycle;
pub mod tensor;

pub use encoding::Encoding;
pub use lifecycle::LifecycleState;
pub use tensor::{ElementType, ShapeError, Tensor, TensorData};

/// The sole externally visible result of a successful inference request: `hidden_size` floats
/// with unit L2 norm.
pub type EmbeddingVector = Vec<f32>;

/// Input names the inference provider expects for the three integer tensors.
pub const INPUT_IDS: &str = "input_ids";
pub const ATTENTION_MASK: &str = "attention_mask";
pub const TOKEN_TYPE_IDS: &str = "token_type_ids";
