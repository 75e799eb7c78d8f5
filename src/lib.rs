//! Local language-model inference driver for the TextMaster study app.
//!
//! The crate loads a quantized GGUF model, formats study-task prompts, and
//! runs token-by-token generation behind an async façade:
//!
//! ```no_run
//! use textmaster_llm::{EngineConfig, LlmProcessor};
//!
//! # async fn run() -> textmaster_llm::Result<()> {
//! let mut config = EngineConfig::default();
//! config.model.model_path = "/models/llama-7b-q4.gguf".into();
//! config.model.tokenizer_path = "/models/tokenizer.json".into();
//!
//! let processor = LlmProcessor::new(config)?;
//! processor.initialize().await?;
//! let output = processor.generate_quiz("Photosynthesis converts light...").await?;
//! println!("{}", output.text);
//! # Ok(())
//! # }
//! ```

// Public modules
pub mod config;
pub mod engine;
pub mod error;
pub mod prompt;
pub mod types;

// Internal modules
mod model;
mod utils;

/// Crate version, from the build manifest.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-exports for the public API
pub use config::{ContextConfig, EngineConfig, GenerationConfig, ModelConfig};
pub use engine::{EngineState, GenerationEngine, LlmProcessor};
pub use error::{ProcessorError, Result};
pub use model::{
    CandleBackend, InferenceContext, ModelBackend, ModelHandle, ModelStore, TokenStream,
    TokenizerAdapter,
};
pub use prompt::format_prompt;
pub use types::{
    GenerationKind, GenerationOutput, GenerationRequest, JobHandle, SamplingParams,
};
pub use utils::{setup_logging, LogConfig};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_set() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_default_config_needs_paths() {
        // the default config is a template; paths must be filled in
        assert!(EngineConfig::default().validate().is_err());
    }
}
