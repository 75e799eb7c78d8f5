//! Model loading, vocabulary handling, and the inference context.

mod backend;
mod context;
mod store;
mod vocab;

pub use backend::{configure_threads, CandleBackend, ModelBackend};
pub use context::InferenceContext;
pub use store::{ModelHandle, ModelStore};
pub use vocab::{TokenStream, TokenizerAdapter};

#[cfg(test)]
pub(crate) use backend::MockBackend;
#[cfg(test)]
pub(crate) use vocab::test_adapter;

// Context defaults, referenced by the config layer
pub(crate) const DEFAULT_CONTEXT_WINDOW: usize = 2048;
pub(crate) const DEFAULT_BATCH_SIZE: usize = 64;
pub(crate) const DEFAULT_THREAD_COUNT: usize = 4;
