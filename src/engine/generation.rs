//! Generation engine: lifecycle state machine and the decode loop.

use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::engine::sampler::Sampler;
use crate::error::{ProcessorError, Result};
use crate::model::{configure_threads, InferenceContext, ModelHandle, ModelStore};
use crate::prompt;
use crate::types::{GenerationOutput, GenerationRequest, SamplingParams};

/// Engine lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No model loaded
    Uninitialized,
    /// `initialize` in progress
    Loading,
    /// Model and context ready, accepting requests
    Ready,
    /// A request is being decoded
    Generating,
    /// Initialization failed; `initialize` must succeed before any request
    Failed,
}

/// Owns the model, the inference context, and the decode loop.
///
/// Synchronous by design; the async façade runs it on a dedicated worker.
pub struct GenerationEngine {
    config: EngineConfig,
    handle: Option<ModelHandle>,
    context: Option<InferenceContext>,
    state: EngineState,
}

impl GenerationEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            handle: None,
            context: None,
            state: EngineState::Uninitialized,
        })
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Load the model and open the inference context. Any resources from a
    /// previous initialization are released first.
    pub fn initialize(&mut self) -> Result<()> {
        self.release();
        self.state = EngineState::Loading;
        match self.try_initialize() {
            Ok(()) => {
                self.state = EngineState::Ready;
                info!("engine ready");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "initialization failed");
                self.release();
                self.state = EngineState::Failed;
                Err(e)
            }
        }
    }

    fn try_initialize(&mut self) -> Result<()> {
        configure_threads(self.config.context.thread_count);
        let mut handle = ModelStore::load(&self.config.model)?;
        if let Some(adapter) = handle.adapter() {
            adapter.verify()?;
        }
        let backend = handle.take_backend();
        self.install(handle, backend)
    }

    fn install(
        &mut self,
        handle: ModelHandle,
        backend: Option<Box<dyn crate::model::ModelBackend>>,
    ) -> Result<()> {
        let backend = backend.ok_or_else(|| ProcessorError::ContextCreateFailure {
            message: "model holds no weights (vocabulary-only load)".to_string(),
        })?;
        let context = self.create_context(backend)?;
        self.handle = Some(handle);
        self.context = Some(context);
        Ok(())
    }

    /// Open the context, retrying exactly once when the reported window does
    /// not match the requested one.
    fn create_context(
        &self,
        backend: Box<dyn crate::model::ModelBackend>,
    ) -> Result<InferenceContext> {
        match InferenceContext::create(backend, &self.config.context) {
            Ok(context) => Ok(context),
            Err((backend, ProcessorError::ContextMismatch { requested, actual })) => {
                warn!(requested, actual, "context window mismatch, recreating");
                match InferenceContext::create(backend, &self.config.context) {
                    Ok(context) => Ok(context),
                    Err((_, e)) => Err(e),
                }
            }
            Err((_, e)) => Err(e),
        }
    }

    /// Run one generation request to completion.
    pub fn generate(&mut self, request: &GenerationRequest) -> Result<GenerationOutput> {
        if self.state != EngineState::Ready {
            return Err(ProcessorError::NotInitialized);
        }
        self.state = EngineState::Generating;
        let result = self.run_generation(request);
        // request-scope failures leave the engine usable
        self.state = EngineState::Ready;
        result
    }

    fn run_generation(&mut self, request: &GenerationRequest) -> Result<GenerationOutput> {
        let started = Instant::now();
        let adapter = self
            .handle
            .as_ref()
            .and_then(|h| h.adapter())
            .ok_or(ProcessorError::NotInitialized)?;
        let context = self.context.as_mut().ok_or(ProcessorError::NotInitialized)?;
        let eos = adapter.eos_token();

        let prompt_text = prompt::format_prompt(request.kind, &request.input);
        let tokens = adapter.encode(&prompt_text, true)?;
        let window = context.window();
        // validated before any token reaches the backend
        if tokens.len() >= window {
            return Err(ProcessorError::InputTooLong {
                token_count: tokens.len(),
                context_window: window,
            });
        }
        debug!(
            kind = ?request.kind,
            prompt_tokens = tokens.len(),
            "starting generation"
        );

        context.reset();
        let budget = self
            .config
            .generation
            .max_output_tokens
            .min(window - tokens.len());
        let sampling = request.sampling.clone().unwrap_or(SamplingParams {
            temperature: self.config.generation.temperature,
            min_p: self.config.generation.min_p,
            seed: crate::types::DEFAULT_SEED,
        });
        let mut sampler = Sampler::new(sampling);
        let mut stream = adapter.stream();
        let mut text = String::new();
        let mut token_count = 0usize;

        let mut logits = context.prefill(&tokens)?;
        for index in 0..budget {
            let token = sampler.sample(&logits)?;
            // the stop token ends generation before its text is appended
            if eos == Some(token) {
                break;
            }
            if let Some(fragment) = stream.next_token(token)? {
                text.push_str(&fragment);
            }
            token_count += 1;
            // hitting the budget ceiling is a normal completion
            if index + 1 == budget {
                break;
            }
            logits = context.feed(token)?;
        }
        if let Some(rest) = stream.flush()? {
            text.push_str(&rest);
        }

        let elapsed = started.elapsed();
        info!(
            kind = ?request.kind,
            tokens = token_count,
            elapsed_ms = elapsed.as_millis() as u64,
            "generation finished"
        );
        Ok(GenerationOutput {
            text,
            token_count,
            elapsed,
        })
    }

    /// Release the context and model. Callable from any state, any number of
    /// times.
    pub fn cleanup(&mut self) {
        self.release();
        self.state = EngineState::Uninitialized;
    }

    fn release(&mut self) {
        self.context = None;
        if let Some(handle) = self.handle.as_mut() {
            handle.unload();
        }
        self.handle = None;
    }

    #[cfg(test)]
    pub(crate) fn initialize_with(
        &mut self,
        backend: Option<Box<dyn crate::model::ModelBackend>>,
        adapter: crate::model::TokenizerAdapter,
    ) -> Result<()> {
        self.release();
        self.state = EngineState::Loading;
        let result = adapter
            .verify()
            .and_then(|_| self.install(ModelHandle::from_parts(None, adapter), backend));
        match result {
            Ok(()) => {
                self.state = EngineState::Ready;
                Ok(())
            }
            Err(e) => {
                self.release();
                self.state = EngineState::Failed;
                Err(e)
            }
        }
    }
}
