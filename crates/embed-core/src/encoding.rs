use serde::{Deserialize, Serialize};

/// Fixed-length tokenizer output.
///
/// All three sequences share the same length, the tokenizer's configured maximum. Padding
/// positions carry id 0 and mask 0, so a genuine token that maps to id 0 (for example the
/// unknown token in some vocabularies) is only distinguishable from padding through the mask.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Encoding {
    pub ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
    pub token_type_ids: Vec<i64>,
}

impl Encoding {
    /// Sequence length shared by all three vectors.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Number of genuine (non-padding) positions.
    pub fn valid_tokens(&self) -> usize {
        self.attention_mask.iter().filter(|&&m| m == 1).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_tokens_counts_mask_not_ids() {
        let enc = Encoding {
            ids: vec![5, 0, 0, 0],
            attention_mask: vec![1, 1, 0, 0],
            token_type_ids: vec![0; 4],
        };
        assert_eq!(enc.len(), 4);
        assert_eq!(enc.valid_tokens(), 2);
    }
}
