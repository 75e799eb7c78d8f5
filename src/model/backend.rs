//! Decode backend seam.
//!
//! `ModelBackend` is the narrow interface the inference context drives: open
//! a session with the configured parameters, report the actual window, and
//! decode token batches into next-token logits. The production implementation
//! wraps candle's quantized llama weights; tests substitute a scripted mock.

use candle_core::{Device, Tensor};
use candle_transformers::models::quantized_llama::ModelWeights;
use tracing::debug;

use crate::config::ContextConfig;
use crate::error::{ProcessorError, Result};

/// A loaded model capable of decoding token sequences.
pub trait ModelBackend: Send {
    /// Prepare a decode session with the given parameters. Called once per
    /// context creation; a fresh call discards any prior session state.
    fn open(&mut self, params: &ContextConfig) -> Result<()>;

    /// Window size the open session actually provides.
    fn context_window(&self) -> usize;

    /// Decode `tokens` starting at absolute position `position` and return
    /// the logits for the final token of the batch. Position 0 starts a new
    /// sequence and resets the KV cache.
    fn decode(&mut self, tokens: &[u32], position: usize) -> Result<Vec<f32>>;
}

impl std::fmt::Debug for dyn ModelBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelBackend")
            .field("context_window", &self.context_window())
            .finish_non_exhaustive()
    }
}

/// Size the global compute thread pool. Effective once per process; later
/// calls with a different count are ignored by the pool and logged.
pub fn configure_threads(count: usize) {
    static POOL: std::sync::Once = std::sync::Once::new();
    POOL.call_once(|| {
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(count)
            .build_global()
        {
            debug!(threads = count, error = %e, "global thread pool already configured");
        }
    });
}

/// Candle-based backend over quantized GGUF llama weights.
pub struct CandleBackend {
    weights: ModelWeights,
    device: Device,
    window: usize,
    kv_cache_f32: bool,
}

impl CandleBackend {
    pub fn new(weights: ModelWeights, device: Device) -> Self {
        Self {
            weights,
            device,
            window: 0,
            kv_cache_f32: true,
        }
    }
}

impl ModelBackend for CandleBackend {
    fn open(&mut self, params: &ContextConfig) -> Result<()> {
        // candle keeps its KV cache inside the weights and grows it on
        // demand, so the requested window is what the session provides. The
        // cache computes in f32 on this path; the flag is recorded so a
        // narrower mode is a backend-local change.
        self.window = params.context_window;
        self.kv_cache_f32 = params.kv_cache_f32;
        Ok(())
    }

    fn context_window(&self) -> usize {
        self.window
    }

    fn decode(&mut self, tokens: &[u32], position: usize) -> Result<Vec<f32>> {
        let input = Tensor::new(tokens, &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(|e| ProcessorError::DecodeFailure {
                message: format!("failed to build input tensor: {}", e),
            })?;

        let logits = self
            .weights
            .forward(&input, position)
            .map_err(|e| ProcessorError::DecodeFailure {
                message: format!("forward pass failed at position {}: {}", position, e),
            })?;

        logits
            .squeeze(0)
            .and_then(|t| t.to_dtype(candle_core::DType::F32))
            .and_then(|t| t.to_vec1::<f32>())
            .map_err(|e| ProcessorError::DecodeFailure {
                message: format!("failed to extract logits: {}", e),
            })
    }
}

/// Scripted backend for driving the engine without model files.
#[cfg(test)]
pub(crate) struct MockBackend {
    /// Window reported after each `open` call; the last entry repeats once
    /// the list is exhausted. Empty means echo whatever was requested.
    pub windows: Vec<usize>,
    /// Token ids emitted as one-hot logits, in order. The cursor advances
    /// when the current script token is fed back, and rewinds when a decode
    /// starts at position 0, mirroring the KV reset.
    pub script: Vec<u32>,
    /// Fail the nth decode call (1-based, counted across the backend's life).
    pub fail_on_call: Option<usize>,
    pub vocab_size: usize,
    pub open_calls: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    pub decode_calls: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    window: usize,
    cursor: usize,
}

#[cfg(test)]
impl MockBackend {
    pub fn new(script: Vec<u32>) -> Self {
        Self {
            windows: Vec::new(),
            script,
            fail_on_call: None,
            vocab_size: 16,
            open_calls: Default::default(),
            decode_calls: Default::default(),
            window: 0,
            cursor: 0,
        }
    }

    pub fn with_windows(mut self, windows: Vec<usize>) -> Self {
        self.windows = windows;
        self
    }
}

#[cfg(test)]
impl ModelBackend for MockBackend {
    fn open(&mut self, params: &ContextConfig) -> Result<()> {
        let call = self
            .open_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.window = if self.windows.is_empty() {
            params.context_window
        } else {
            *self
                .windows
                .get(call)
                .unwrap_or_else(|| self.windows.last().unwrap())
        };
        self.cursor = 0;
        Ok(())
    }

    fn context_window(&self) -> usize {
        self.window
    }

    fn decode(&mut self, tokens: &[u32], position: usize) -> Result<Vec<f32>> {
        let call = self
            .decode_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
            + 1;
        if self.fail_on_call == Some(call) {
            return Err(ProcessorError::DecodeFailure {
                message: "injected decode failure".to_string(),
            });
        }
        assert!(!tokens.is_empty());
        if position == 0 {
            self.cursor = 0;
        }
        // a single-token feed of the current script token moves the script
        // forward; prompt batches leave the cursor alone
        if tokens.len() == 1
            && self.script.get(self.cursor) == Some(&tokens[0])
            && self.cursor + 1 < self.script.len()
        {
            self.cursor += 1;
        }
        let token = *self
            .script
            .get(self.cursor)
            .or_else(|| self.script.last())
            .unwrap_or(&0);
        let mut logits = vec![0.0f32; self.vocab_size];
        logits[token as usize] = 10.0;
        Ok(logits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_echoes_requested_window() {
        let mut backend = MockBackend::new(vec![3]);
        let params = ContextConfig {
            context_window: 128,
            batch_size: 8,
            thread_count: 1,
            kv_cache_f32: true,
        };
        backend.open(&params).unwrap();
        assert_eq!(backend.context_window(), 128);
    }

    #[test]
    fn test_mock_script_rewinds_at_position_zero() {
        let mut backend = MockBackend::new(vec![3, 4, 5]);
        let params = ContextConfig {
            context_window: 64,
            batch_size: 8,
            thread_count: 1,
            kv_cache_f32: true,
        };
        backend.open(&params).unwrap();

        let argmax = |logits: Vec<f32>| {
            logits
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
                .map(|(i, _)| i as u32)
                .unwrap()
        };

        assert_eq!(argmax(backend.decode(&[9], 0).unwrap()), 3);
        assert_eq!(argmax(backend.decode(&[3], 1).unwrap()), 4);
        // a fresh sequence replays the script from the start
        assert_eq!(argmax(backend.decode(&[9], 0).unwrap()), 3);
    }

    #[test]
    fn test_mock_failure_injection() {
        let mut backend = MockBackend::new(vec![3]);
        backend.fail_on_call = Some(2);
        let params = ContextConfig {
            context_window: 64,
            batch_size: 8,
            thread_count: 1,
            kv_cache_f32: true,
        };
        backend.open(&params).unwrap();
        assert!(backend.decode(&[1], 0).is_ok());
        assert!(matches!(
            backend.decode(&[2], 1),
            Err(ProcessorError::DecodeFailure { .. })
        ));
    }
}
