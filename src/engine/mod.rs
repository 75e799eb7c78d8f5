//! Generation engine and its async façade.

mod generation;
mod processor;
mod sampler;

pub use generation::{EngineState, GenerationEngine};
pub use processor::LlmProcessor;
pub use sampler::Sampler;
