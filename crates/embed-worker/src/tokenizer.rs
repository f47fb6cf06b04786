use std::collections::HashMap;

use embed_core::Encoding;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TokenizerError {
    #[error("vocabulary has no entry for the unknown token {0:?}")]
    MissingUnknownToken(String),

    #[error("vocabulary entry {token:?} has invalid id {value}")]
    InvalidId {
        token: String,
        value: serde_json::Value,
    },

    #[error("max_length must be at least 1")]
    ZeroMaxLength,
}

/// Token -> id lookup with a designated unknown-token id. Immutable once built.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    ids: HashMap<String, i64>,
    unk_id: i64,
}

impl Vocabulary {
    pub fn new(ids: HashMap<String, i64>, unknown_token: &str) -> Result<Self, TokenizerError> {
        let unk_id = *ids
            .get(unknown_token)
            .ok_or_else(|| TokenizerError::MissingUnknownToken(unknown_token.to_string()))?;
        Ok(Self { ids, unk_id })
    }

    /// Build from the JSON object found in a tokenizer document. Ids must be non-negative
    /// integers.
    pub fn from_json_map(
        map: &serde_json::Map<String, serde_json::Value>,
        unknown_token: &str,
    ) -> Result<Self, TokenizerError> {
        let mut ids = HashMap::with_capacity(map.len());
        for (token, value) in map {
            let id = value
                .as_u64()
                .and_then(|v| i64::try_from(v).ok())
                .ok_or_else(|| TokenizerError::InvalidId {
                    token: token.clone(),
                    value: value.clone(),
                })?;
            ids.insert(token.clone(), id);
        }
        Self::new(ids, unknown_token)
    }

    pub fn id_of(&self, token: &str) -> i64 {
        self.ids.get(token).copied().unwrap_or(self.unk_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Whitespace tokenizer producing fixed-length encodings.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    vocab: Vocabulary,
    max_length: usize,
}

impl Tokenizer {
    pub fn new(vocab: Vocabulary, max_length: usize) -> Result<Self, TokenizerError> {
        if max_length == 0 {
            return Err(TokenizerError::ZeroMaxLength);
        }
        Ok(Self { vocab, max_length })
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    /// Lower-case, split on whitespace runs, look up ids, then pad or truncate to `max_length`.
    pub fn encode(&self, text: &str) -> Encoding {
        let lowered = text.to_lowercase();
        let mut ids: Vec<i64> = lowered
            .split_whitespace()
            .take(self.max_length)
            .map(|token| self.vocab.id_of(token))
            .collect();
        let real = ids.len();

        let mut attention_mask = vec![1_i64; real];
        ids.resize(self.max_length, 0);
        attention_mask.resize(self.max_length, 0);

        Encoding {
            ids,
            attention_mask,
            token_type_ids: vec![0; self.max_length],
        }
    }
}
