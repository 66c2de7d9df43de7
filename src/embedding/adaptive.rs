//! Embedding with batch-size back-off.
//!
//! Texts are sent to the provider in batches of the current size. When the
//! provider reports [`EmbedError::ResourceExhausted`], the same batch is
//! retried at half the size; the reduced size is kept for the remaining
//! texts of the call. At a batch size of 1 the error is returned to the caller.

use crate::error::EmbedError;

use super::EmbeddingProvider;

/// Embed `texts` in input order, halving the batch size on resource exhaustion.
///
/// `initial_batch` of 0 is treated as 1. Errors other than resource
/// exhaustion are returned immediately.
pub async fn embed_adaptive(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    initial_batch: usize,
) -> Result<Vec<Vec<f32>>, EmbedError> {
    let mut batch = initial_batch.max(1);
    let mut out = Vec::with_capacity(texts.len());
    let mut i = 0;

    while i < texts.len() {
        let end = (i + batch).min(texts.len());
        match provider.embed(&texts[i..end]).await {
            Ok(vectors) => {
                if vectors.len() != end - i {
                    return Err(EmbedError::CountMismatch {
                        expected: end - i,
                        actual: vectors.len(),
                    });
                }
                out.extend(vectors);
                i = end;
            }
            Err(EmbedError::ResourceExhausted(msg)) if batch > 1 => {
                batch = (batch / 2).max(1);
                tracing::warn!(batch_size = batch, error = %msg, "embedding ran out of resources, reducing batch size");
            }
            Err(e) => return Err(e),
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Fails every batch larger than `limit`; records the batch sizes it saw.
    struct Limited {
        limit: usize,
        calls: Mutex<Vec<usize>>,
    }

    impl Limited {
        fn new(limit: usize) -> Self {
            Self {
                limit,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for Limited {
        fn model_name(&self) -> &str {
            "limited"
        }
        fn dims(&self) -> usize {
            1
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            self.calls.lock().unwrap().push(texts.len());
            if texts.len() > self.limit {
                return Err(EmbedError::ResourceExhausted("out of memory".to_string()));
            }
            Ok(texts
                .iter()
                .map(|t| vec![t.parse::<f32>().unwrap()])
                .collect())
        }
    }

    fn numbered(n: usize) -> Vec<String> {
        (0..n).map(|i| i.to_string()).collect()
    }

    #[tokio::test]
    async fn test_halves_until_batch_fits() {
        let provider = Limited::new(2);
        let out = embed_adaptive(&provider, &numbered(5), 8).await.unwrap();
        let flat: Vec<f32> = out.into_iter().flatten().collect();
        assert_eq!(flat, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        // 8 fails, 4 fails, then 2,2,1 succeed at the reduced size
        assert_eq!(*provider.calls.lock().unwrap(), vec![5, 4, 2, 2, 1]);
    }

    #[tokio::test]
    async fn test_gives_up_at_batch_size_one() {
        let provider = Limited::new(0);
        let err = embed_adaptive(&provider, &numbered(3), 4).await.unwrap_err();
        assert!(matches!(err, EmbedError::ResourceExhausted(_)));
        assert_eq!(*provider.calls.lock().unwrap(), vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_other_errors_propagate_immediately() {
        let provider = super::super::DisabledProvider;
        let err = embed_adaptive(&provider, &numbered(3), 4).await.unwrap_err();
        assert!(matches!(err, EmbedError::Disabled));
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_calls() {
        let provider = Limited::new(4);
        assert!(embed_adaptive(&provider, &[], 4).await.unwrap().is_empty());
        assert!(provider.calls.lock().unwrap().is_empty());
    }
}
