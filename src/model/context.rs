//! Inference context: position tracking over a decode backend.

use tracing::{debug, trace};

use crate::config::ContextConfig;
use crate::error::{ProcessorError, Result};
use crate::model::backend::ModelBackend;

/// A decode session over a loaded model.
///
/// The context owns the backend, tracks the absolute write position, and
/// guarantees that the total number of tokens fed never exceeds the window.
pub struct InferenceContext {
    backend: Box<dyn ModelBackend>,
    window: usize,
    batch_size: usize,
    position: usize,
}

impl InferenceContext {
    /// Open a session and verify the backend provides the requested window.
    ///
    /// On failure the backend is handed back so the caller can attempt a
    /// single recreation before giving up.
    pub fn create(
        mut backend: Box<dyn ModelBackend>,
        params: &ContextConfig,
    ) -> std::result::Result<Self, (Box<dyn ModelBackend>, ProcessorError)> {
        if let Err(e) = backend.open(params) {
            return Err((backend, e));
        }
        let actual = backend.context_window();
        if actual != params.context_window {
            return Err((
                backend,
                ProcessorError::ContextMismatch {
                    requested: params.context_window,
                    actual,
                },
            ));
        }
        debug!(
            window = params.context_window,
            batch_size = params.batch_size,
            "inference context created"
        );
        Ok(Self {
            backend,
            window: params.context_window,
            batch_size: params.batch_size,
            position: 0,
        })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Tokens that can still be fed before the window is full.
    pub fn remaining(&self) -> usize {
        self.window - self.position
    }

    /// Start a fresh sequence. The next decode at position 0 discards the
    /// backend's cached keys and values.
    pub fn reset(&mut self) {
        self.position = 0;
    }

    /// Feed prompt tokens in fixed-size batches; returns the logits for the
    /// final prompt token.
    pub fn prefill(&mut self, tokens: &[u32]) -> Result<Vec<f32>> {
        if tokens.is_empty() {
            return Err(ProcessorError::DecodeFailure {
                message: "cannot prefill an empty token sequence".to_string(),
            });
        }
        self.check_capacity(tokens.len())?;

        let mut logits = Vec::new();
        for chunk in tokens.chunks(self.batch_size) {
            trace!(position = self.position, len = chunk.len(), "prefill batch");
            logits = self.backend.decode(chunk, self.position)?;
            self.position += chunk.len();
        }
        Ok(logits)
    }

    /// Feed one generated token; returns the logits for the next step.
    pub fn feed(&mut self, token: u32) -> Result<Vec<f32>> {
        self.check_capacity(1)?;
        let logits = self.backend.decode(&[token], self.position)?;
        self.position += 1;
        Ok(logits)
    }

    fn check_capacity(&self, incoming: usize) -> Result<()> {
        if self.position + incoming > self.window {
            return Err(ProcessorError::DecodeFailure {
                message: format!(
                    "context window overflow: {} tokens at position {} exceeds window {}",
                    incoming, self.position, self.window
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::backend::MockBackend;

    fn params(window: usize, batch: usize) -> ContextConfig {
        ContextConfig {
            context_window: window,
            batch_size: batch,
            thread_count: 1,
            kv_cache_f32: true,
        }
    }

    #[test]
    fn test_create_and_prefill() {
        let backend = Box::new(MockBackend::new(vec![3]));
        let calls = backend.decode_calls.clone();
        let mut context = InferenceContext::create(backend, &params(32, 4)).unwrap();

        let tokens: Vec<u32> = (0..10).collect();
        context.prefill(&tokens).unwrap();
        assert_eq!(context.position(), 10);
        assert_eq!(context.remaining(), 22);
        // 10 tokens in batches of 4 means 3 decode calls
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[test]
    fn test_window_mismatch_returns_backend() {
        let backend = Box::new(MockBackend::new(vec![3]).with_windows(vec![16]));
        match InferenceContext::create(backend, &params(32, 4)) {
            Err((_, ProcessorError::ContextMismatch { requested, actual })) => {
                assert_eq!(requested, 32);
                assert_eq!(actual, 16);
            }
            _ => panic!("expected a window mismatch"),
        }
    }

    #[test]
    fn test_overflow_rejected_without_decode() {
        let backend = Box::new(MockBackend::new(vec![3]));
        let calls = backend.decode_calls.clone();
        let mut context = InferenceContext::create(backend, &params(8, 4)).unwrap();

        let tokens: Vec<u32> = (0..9).collect();
        assert!(context.prefill(&tokens).is_err());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert_eq!(context.position(), 0);
    }

    #[test]
    fn test_feed_to_window_edge() {
        let backend = Box::new(MockBackend::new(vec![3]));
        let mut context = InferenceContext::create(backend, &params(4, 4)).unwrap();

        context.prefill(&[1, 2, 3]).unwrap();
        context.feed(7).unwrap();
        assert_eq!(context.remaining(), 0);
        assert!(context.feed(7).is_err());

        context.reset();
        assert_eq!(context.position(), 0);
        assert!(context.feed(7).is_ok());
    }
}
