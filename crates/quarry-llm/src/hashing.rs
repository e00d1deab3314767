//! Deterministic local embedder based on feature hashing.
//!
//! Each identifier token and each of its padded character trigrams is hashed
//! into a signed bucket; the resulting vector is L2-normalised. No network,
//! no model files, identical output on every platform.

use crate::error::LlmError;
use crate::provider::EmbeddingFunction;

pub const DEFAULT_HASH_DIMENSIONS: usize = 256;

const TRIGRAM_WEIGHT: f32 = 0.5;

#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
    model: String,
}

impl HashingEmbedder {
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        let dimensions = dimensions.max(1);
        Self {
            dimensions,
            model: format!("feature-hash-{dimensions}"),
        }
    }

    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Synchronous embedding; never fails.
    #[must_use]
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in tokens(text) {
            self.accumulate(&mut vector, token.as_bytes(), 1.0);
            let padded: Vec<char> = format!("^{token}$").chars().collect();
            for window in padded.windows(3) {
                let gram: String = window.iter().collect();
                self.accumulate(&mut vector, gram.as_bytes(), TRIGRAM_WEIGHT);
            }
        }
        normalize(&mut vector);
        vector
    }

    fn accumulate(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        let hash = blake3::hash(feature);
        let bytes = hash.as_bytes();
        let mut word = [0u8; 8];
        word.copy_from_slice(&bytes[..8]);
        let value = u64::from_le_bytes(word);
        #[allow(clippy::cast_possible_truncation)]
        let bucket = (value % self.dimensions as u64) as usize;
        let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_DIMENSIONS)
    }
}

impl EmbeddingFunction for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        Ok(self.embed_sync(text))
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn provider_name(&self) -> &str {
        "hash"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .flat_map(|word| word.split('_'))
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}
