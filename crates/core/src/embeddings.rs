use crate::error::ProviderError;
use async_trait::async_trait;

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

/// External service (or local model) turning text into vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn model_name(&self) -> &str;

    /// Most texts accepted by one `embed` call; larger inputs are split by the caller.
    fn max_batch_size(&self) -> usize {
        usize::MAX
    }

    /// One vector per input text, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::MalformedResponse("empty embedding response".to_string()))
    }
}

#[async_trait]
impl<T: EmbeddingProvider + ?Sized> EmbeddingProvider for Box<T> {
    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn max_batch_size(&self) -> usize {
        (**self).max_batch_size()
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        (**self).embed(texts).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        (**self).embed_query(text).await
    }
}

/// Offline embedder hashing character trigrams into a fixed number of buckets.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    /// L2-normalised counts of word-bounded character trigrams.
    ///
    /// Each lowercase alphanumeric word is padded with spaces so that prefixes and suffixes get
    /// their own trigrams; punctuation never bridges two words.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];

        for word in words(text) {
            let padded: Vec<char> = format!(" {word} ").chars().collect();
            for trigram in padded.windows(3) {
                let index = bucket(trigram, vector.len());
                vector[index] += 1.0;
            }
        }

        let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|value| *value /= norm);
        }
        vector
    }
}

/// Lowercase alphanumeric runs; everything else separates words.
pub fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|character: char| !character.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
}

// 64-bit FNV-1a over the trigram's UTF-8 bytes.
fn bucket(trigram: &[char], buckets: usize) -> usize {
    let mut buffer = [0u8; 4];
    let hash = trigram.iter().fold(0xcbf2_9ce4_8422_2325u64, |hash, character| {
        character
            .encode_utf8(&mut buffer)
            .bytes()
            .fold(hash, |hash, byte| (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3))
    });
    (hash % buckets as u64) as usize
}

#[async_trait]
impl EmbeddingProvider for CharacterNgramEmbedder {
    fn model_name(&self) -> &str {
        "char-trigram"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

/// Cosine similarity; mismatched or zero-length vectors score 0.
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }

    let dot: f32 = left.iter().zip(right).map(|(a, b)| a * b).sum();
    let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();

    if left_norm < f32::EPSILON || right_norm < f32::EPSILON {
        0.0
    } else {
        dot / (left_norm * right_norm)
    }
}

#[cfg(test)]
mod tests {
    use super::{cosine_similarity, CharacterNgramEmbedder, EmbeddingProvider};

    #[test]
    fn embedder_is_deterministic() {
        let embedder = CharacterNgramEmbedder::default();
        let first = embedder.embed_text("Total revenue was $4.2M in Q3");
        let second = embedder.embed_text("Total revenue was $4.2M in Q3");
        assert_eq!(first, second);
    }

    #[test]
    fn embedder_outputs_expected_length() {
        let embedder = CharacterNgramEmbedder { dimensions: 32 };
        let vector = embedder.embed_text("abc");
        assert_eq!(vector.len(), 32);
    }

    #[test]
    fn punctuation_and_case_do_not_change_the_vector() {
        let embedder = CharacterNgramEmbedder::default();
        assert_eq!(
            embedder.embed_text("Q3 revenue!"),
            embedder.embed_text("q3, REVENUE")
        );
    }

    #[test]
    fn shared_words_score_higher_than_unrelated_text() {
        let embedder = CharacterNgramEmbedder::default();
        let query = embedder.embed_text("What was Q3 revenue?");
        let related = embedder.embed_text("Total revenue was $4.2M in Q3");
        let unrelated = embedder.embed_text("Headcount grew to forty people");

        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[test]
    fn text_without_words_embeds_to_zero() {
        let vector = CharacterNgramEmbedder::default().embed_text("  ?! ");
        assert!(vector.iter().all(|value| *value == 0.0));
    }

    #[tokio::test]
    async fn batch_embedding_keeps_input_order() {
        let embedder = CharacterNgramEmbedder::default();
        let texts = vec!["revenue".to_string(), "weather".to_string()];

        let vectors = embedder.embed(&texts).await.unwrap();
        let query = embedder.embed_query("weather").await.unwrap();

        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[1], query);
    }

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let score = cosine_similarity(&[0.3, 0.4], &[0.3, 0.4]);
        assert!((score - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
