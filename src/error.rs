//! Error taxonomy for the inference driver.
//!
//! Every fallible step (load, context creation, tokenize, decode) reports a
//! structured error kind with a human-readable message; nothing in this crate
//! panics on an expected failure mode.

use std::error::Error as StdError;
use std::path::PathBuf;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ProcessorError>;

/// Failure kinds surfaced by the inference driver.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    /// The configured model path does not resolve to a readable file.
    #[error("model file not found: {path}")]
    ModelNotFound {
        /// Path that failed to resolve.
        path: PathBuf,
    },

    /// The model file exists but could not be parsed or allocated.
    #[error("failed to load model: {message}")]
    ModelLoadFailure {
        /// What went wrong during parse/alloc.
        message: String,
        /// Underlying cause, when the backend reported one.
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    /// The inference context could not be created.
    #[error("failed to create inference context: {message}")]
    ContextCreateFailure {
        /// What went wrong.
        message: String,
    },

    /// The created context reported a window size other than the requested
    /// one, and a single recreation attempt did not fix it.
    #[error("context window mismatch: requested {requested} tokens, context reports {actual}")]
    ContextMismatch {
        /// Window size that was asked for.
        requested: usize,
        /// Window size the context actually reports.
        actual: usize,
    },

    /// The model's vocabulary is unusable (missing special tokens, bad file).
    #[error("vocabulary unusable: {message}")]
    VocabError {
        /// What the vocabulary probe found.
        message: String,
    },

    /// The formatted prompt tokenizes to at least the context window size.
    #[error("input too long: {token_count} tokens for a {context_window}-token context window")]
    InputTooLong {
        /// Encoded prompt length.
        token_count: usize,
        /// Configured context window.
        context_window: usize,
    },

    /// A batch or single-token decode step failed at runtime.
    #[error("decode step failed: {message}")]
    DecodeFailure {
        /// What the backend reported.
        message: String,
    },

    /// The vocabulary rejected the input text during encoding.
    #[error("failed to tokenize input: {message}")]
    TokenizeError {
        /// What the tokenizer reported.
        message: String,
    },

    /// A generation operation was requested before a successful `initialize`.
    #[error("engine is not initialized; call initialize() first")]
    NotInitialized,

    /// A configuration value failed validation.
    #[error("configuration error for {parameter}: {message}")]
    ConfigurationError {
        /// Offending parameter name.
        parameter: String,
        /// Why it was rejected.
        message: String,
    },

    /// The processor's worker has shut down and can no longer accept work.
    #[error("processor is shut down")]
    Shutdown,
}

impl ProcessorError {
    /// Whether the engine remains usable (`Ready`) after this failure.
    ///
    /// Generation-scope failures abort only the current request;
    /// initialization failures leave the engine in `Failed` until the next
    /// `initialize`.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProcessorError::InputTooLong { .. }
                | ProcessorError::DecodeFailure { .. }
                | ProcessorError::TokenizeError { .. }
        )
    }
}
