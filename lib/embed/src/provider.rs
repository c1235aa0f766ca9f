//! Text encoding behind a lazily initialized, construct-once provider.
//!
//! The pretrained model is opaque to the engine: anything implementing
//! [`TextEncoder`] can sit behind [`EmbeddingProvider`]. The default
//! encoder is a deterministic trigram/word hashing encoder, which keeps the
//! pipeline self-contained; a real sentence encoder slots in through the
//! same trait.

use matchx_core::{Error, Result, Vector};
use std::collections::HashSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

/// Engine-wide embedding dimension
pub const EMBEDDING_DIM: usize = 384;

/// A text-encoding model: pure, deterministic text -> vector
pub trait TextEncoder: Send + Sync {
    /// Encode a text into a fixed-dimension vector
    fn encode(&self, text: &str) -> Result<Vector>;

    /// Returns the embedding dimension
    fn dimension(&self) -> usize;

    /// Returns the model name/identifier
    fn model_name(&self) -> &str;
}

type EncoderFactory = Box<dyn Fn() -> Result<Arc<dyn TextEncoder>> + Send + Sync>;

/// Lazily initialized, thread-safe handle to the text-encoding model.
///
/// Loading a model is expensive and memory-heavy, so it happens at most
/// once per provider: concurrent first callers serialize on the same
/// initialization and observe the same instance. If initialization fails,
/// every subsequent call fails with [`Error::ModelUnavailable`] — callers
/// treat embedding as best-effort infrastructure, never a precondition for
/// entity writes.
pub struct EmbeddingProvider {
    dim: usize,
    factory: EncoderFactory,
    encoder: OnceLock<std::result::Result<Arc<dyn TextEncoder>, String>>,
}

impl EmbeddingProvider {
    pub fn new<F>(dim: usize, factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn TextEncoder>> + Send + Sync + 'static,
    {
        Self {
            dim,
            factory: Box::new(factory),
            encoder: OnceLock::new(),
        }
    }

    /// Provider backed by the deterministic hashing encoder
    pub fn hashing() -> Self {
        Self::new(EMBEDDING_DIM, || {
            Ok(Arc::new(HashingEncoder::new(EMBEDDING_DIM)) as Arc<dyn TextEncoder>)
        })
    }

    /// Expected embedding dimension (known without touching the model)
    #[inline]
    pub fn dimension(&self) -> usize {
        self.dim
    }

    fn encoder(&self) -> Result<Arc<dyn TextEncoder>> {
        let slot = self.encoder.get_or_init(|| {
            let encoder = (self.factory)().map_err(|e| e.to_string())?;
            if encoder.dimension() != self.dim {
                return Err(format!(
                    "encoder '{}' produces dimension {}, expected {}",
                    encoder.model_name(),
                    encoder.dimension(),
                    self.dim
                ));
            }
            Ok(encoder)
        });
        match slot {
            Ok(encoder) => Ok(encoder.clone()),
            Err(msg) => Err(Error::ModelUnavailable(msg.clone())),
        }
    }

    /// Whether the underlying model initialized successfully.
    /// Forces initialization on first call.
    pub fn is_available(&self) -> bool {
        self.encoder().is_ok()
    }

    /// Embed a text into a fixed-dimension vector.
    ///
    /// Deterministic for identical input. An exceeded `deadline` fails
    /// with [`Error::Timeout`] and writes nothing.
    pub fn embed(&self, text: &str, deadline: Option<Instant>) -> Result<Vector> {
        if let Some(d) = deadline {
            if Instant::now() >= d {
                return Err(Error::Timeout);
            }
        }
        let encoder = self.encoder()?;
        let vector = encoder.encode(text)?;
        if let Some(d) = deadline {
            if Instant::now() >= d {
                return Err(Error::Timeout);
            }
        }
        Ok(vector)
    }
}

/// Deterministic hashing encoder.
///
/// Hashes character trigrams and whitespace tokens into a fixed-size
/// normalized vector. No semantics beyond lexical overlap, but identical
/// texts always map to identical vectors and similar texts land close.
pub struct HashingEncoder {
    dim: usize,
}

impl HashingEncoder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl TextEncoder for HashingEncoder {
    fn encode(&self, text: &str) -> Result<Vector> {
        let mut components = vec![0.0f32; self.dim];
        let normalized = text.to_lowercase();

        for trigram in generate_trigrams(&normalized) {
            let mut hasher = DefaultHasher::new();
            trigram.hash(&mut hasher);
            let pos = (hasher.finish() as usize) % self.dim;
            components[pos] += 1.0;
        }

        // Whole words carry more signal than trigrams
        for word in normalized.split_whitespace() {
            let mut hasher = DefaultHasher::new();
            word.hash(&mut hasher);
            let pos = (hasher.finish() as usize) % self.dim;
            components[pos] += 2.0;
        }

        let mut vector = Vector::new(components);
        vector.normalize();
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn model_name(&self) -> &str {
        "hashing-trigram"
    }
}

/// Generate character trigrams from a string
fn generate_trigrams(s: &str) -> HashSet<String> {
    let padded = format!("  {}  ", s);
    let chars: Vec<char> = padded.chars().collect();

    if chars.len() < 3 {
        return HashSet::new();
    }

    chars
        .windows(3)
        .map(|w| w.iter().collect::<String>())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_embed_deterministic() {
        let provider = EmbeddingProvider::hashing();
        let v1 = provider.embed("rust backend internship", None).unwrap();
        let v2 = provider.embed("rust backend internship", None).unwrap();
        assert_eq!(v1, v2);
        assert_eq!(v1.dim(), EMBEDDING_DIM);
    }

    #[test]
    fn test_similar_texts_closer_than_unrelated() {
        let provider = EmbeddingProvider::hashing();
        let a = provider.embed("rust systems programming", None).unwrap();
        let b = provider.embed("rust systems engineer", None).unwrap();
        let c = provider.embed("marketing social media intern", None).unwrap();

        assert!(a.cosine_similarity(&b) > a.cosine_similarity(&c));
    }

    #[test]
    fn test_embedding_is_normalized() {
        let provider = EmbeddingProvider::hashing();
        let v = provider.embed("some text", None).unwrap();
        let norm = matchx_core::vector::norm(v.as_slice());
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_failed_init_sticks() {
        let provider = EmbeddingProvider::new(EMBEDDING_DIM, || {
            Err(Error::ModelUnavailable("no model file".into()))
        });
        assert!(matches!(
            provider.embed("text", None),
            Err(Error::ModelUnavailable(_))
        ));
        // Still unavailable on the second call
        assert!(matches!(
            provider.embed("text", None),
            Err(Error::ModelUnavailable(_))
        ));
    }

    #[test]
    fn test_factory_runs_once() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        let provider = EmbeddingProvider::new(EMBEDDING_DIM, || {
            CALLS.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(HashingEncoder::new(EMBEDDING_DIM)) as Arc<dyn TextEncoder>)
        });
        provider.embed("a", None).unwrap();
        provider.embed("b", None).unwrap();
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dimension_mismatch_fails_init() {
        let provider = EmbeddingProvider::new(EMBEDDING_DIM, || {
            Ok(Arc::new(HashingEncoder::new(16)) as Arc<dyn TextEncoder>)
        });
        assert!(matches!(
            provider.embed("text", None),
            Err(Error::ModelUnavailable(_))
        ));
    }

    #[test]
    fn test_expired_deadline() {
        let provider = EmbeddingProvider::hashing();
        let past = Instant::now() - std::time::Duration::from_secs(1);
        assert!(matches!(
            provider.embed("text", Some(past)),
            Err(Error::Timeout)
        ));
    }
}
