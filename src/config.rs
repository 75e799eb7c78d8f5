//! Engine configuration.
//!
//! Split into model, context, and generation sections so callers can tweak
//! one concern without touching the others. All values have documented
//! defaults and pass through `validate()` before the engine uses them.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ProcessorError, Result};
use crate::model::{DEFAULT_BATCH_SIZE, DEFAULT_CONTEXT_WINDOW, DEFAULT_THREAD_COUNT};

/// Default generation budget per request.
pub const DEFAULT_MAX_OUTPUT_TOKENS: usize = 512;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub model: ModelConfig,
    pub context: ContextConfig,
    pub generation: GenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Path to the GGUF model file
    pub model_path: PathBuf,

    /// Path to the tokenizer definition (tokenizer.json)
    pub tokenizer_path: PathBuf,

    /// Number of layers to offload to the GPU. With the candle backend the
    /// model lives on a single device, so any non-zero value selects the GPU
    /// (when built with the `cuda` feature) and 0 pins the CPU.
    pub gpu_layers: usize,

    /// Memory-map the model file instead of reading it into an owned buffer
    pub use_mmap: bool,

    /// Pin mapped pages in RAM (best effort, Unix only)
    pub use_mlock: bool,

    /// Load only the vocabulary, skipping weight tensors
    pub vocab_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Context window size in tokens
    pub context_window: usize,

    /// Number of prompt tokens fed per decode batch
    pub batch_size: usize,

    /// Worker threads for CPU decode
    pub thread_count: usize,

    /// Keep the KV cache in f32 rather than a narrower type
    pub kv_cache_f32: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Maximum number of tokens to generate per request
    pub max_output_tokens: usize,

    /// Temperature for stochastic sampling; <= 0 means greedy argmax
    pub temperature: f64,

    /// Min-p threshold: tokens below `min_p * p_max` are excluded
    pub min_p: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig {
                model_path: PathBuf::new(),
                tokenizer_path: PathBuf::new(),
                gpu_layers: 0,
                use_mmap: true,
                use_mlock: false,
                vocab_only: false,
            },
            context: ContextConfig {
                context_window: DEFAULT_CONTEXT_WINDOW,
                batch_size: DEFAULT_BATCH_SIZE,
                thread_count: DEFAULT_THREAD_COUNT,
                kv_cache_f32: true,
            },
            generation: GenerationConfig {
                max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
                temperature: 0.0,
                min_p: 0.0,
            },
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ProcessorError::ConfigurationError {
            parameter: "config_file".to_string(),
            message: format!("failed to read {}: {}", path.display(), e),
        })?;
        let config: EngineConfig =
            serde_json::from_str(&contents).map_err(|e| ProcessorError::ConfigurationError {
                parameter: "config_file".to_string(),
                message: format!("failed to parse {}: {}", path.display(), e),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.model_path.as_os_str().is_empty() {
            return Err(ProcessorError::ConfigurationError {
                parameter: "model_path".to_string(),
                message: "model path cannot be empty".to_string(),
            });
        }

        if self.context.context_window == 0 {
            return Err(ProcessorError::ConfigurationError {
                parameter: "context_window".to_string(),
                message: "context window must be at least 1 token".to_string(),
            });
        }

        if self.context.batch_size == 0 {
            return Err(ProcessorError::ConfigurationError {
                parameter: "batch_size".to_string(),
                message: "batch size must be at least 1".to_string(),
            });
        }

        if self.context.batch_size > self.context.context_window {
            return Err(ProcessorError::ConfigurationError {
                parameter: "batch_size".to_string(),
                message: "batch size cannot exceed the context window".to_string(),
            });
        }

        if self.context.thread_count == 0 {
            return Err(ProcessorError::ConfigurationError {
                parameter: "thread_count".to_string(),
                message: "thread count must be at least 1".to_string(),
            });
        }

        if self.generation.max_output_tokens == 0 {
            return Err(ProcessorError::ConfigurationError {
                parameter: "max_output_tokens".to_string(),
                message: "generation budget must be at least 1 token".to_string(),
            });
        }

        if !(0.0..=1.0).contains(&self.generation.min_p) {
            return Err(ProcessorError::ConfigurationError {
                parameter: "min_p".to_string(),
                message: "min_p must be between 0 and 1".to_string(),
            });
        }

        Ok(())
    }
}
