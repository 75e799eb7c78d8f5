//! Async façade over the generation engine.
//!
//! A single dedicated worker owns the engine and consumes a command queue in
//! strict submission order, so requests are never rejected for being
//! concurrent; they wait their turn. Callers get a `JobHandle` that resolves
//! exactly once, plus optional channels carrying status and error strings in
//! occurrence order.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::info;

use crate::config::EngineConfig;
use crate::engine::generation::{EngineState, GenerationEngine};
use crate::error::{ProcessorError, Result};
use crate::types::{GenerationKind, GenerationOutput, GenerationRequest, JobHandle};

enum Command {
    Initialize {
        reply: oneshot::Sender<Result<()>>,
    },
    Generate {
        request: GenerationRequest,
        reply: oneshot::Sender<Result<GenerationOutput>>,
    },
    Cleanup {
        reply: oneshot::Sender<()>,
    },
    Shutdown,
}

/// Handle to the inference worker. Must be created inside a tokio runtime.
pub struct LlmProcessor {
    commands: mpsc::UnboundedSender<Command>,
    state: Arc<Mutex<EngineState>>,
    status: Option<mpsc::UnboundedReceiver<String>>,
    errors: Option<mpsc::UnboundedReceiver<String>>,
}

impl LlmProcessor {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let engine = GenerationEngine::new(config)?;
        Ok(Self::spawn(engine))
    }

    #[cfg(test)]
    pub(crate) fn from_engine(engine: GenerationEngine) -> Self {
        Self::spawn(engine)
    }

    fn spawn(engine: GenerationEngine) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(engine.state()));
        let worker_state = state.clone();
        tokio::task::spawn_blocking(move || {
            worker_loop(engine, command_rx, worker_state, status_tx, error_tx)
        });
        Self {
            commands,
            state,
            status: Some(status_rx),
            errors: Some(error_rx),
        }
    }

    /// Load the model and prepare the context.
    pub async fn initialize(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Initialize { reply })
            .map_err(|_| ProcessorError::Shutdown)?;
        rx.await.map_err(|_| ProcessorError::Shutdown)?
    }

    /// Release the model and context. Safe to call at any time.
    pub async fn cleanup(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Cleanup { reply })
            .map_err(|_| ProcessorError::Shutdown)?;
        rx.await.map_err(|_| ProcessorError::Shutdown)?;
        Ok(())
    }

    /// Enqueue a request without waiting. The returned handle resolves with
    /// the job's single terminal event, even if the worker is gone.
    pub fn submit(&self, request: GenerationRequest) -> JobHandle {
        let (reply, rx) = oneshot::channel();
        // a failed send drops the reply sender, which resolves the handle
        // with a shutdown error
        let _ = self.commands.send(Command::Generate { request, reply });
        JobHandle::new(rx)
    }

    /// Enqueue a request and wait for its result.
    pub async fn generate(&self, request: GenerationRequest) -> Result<GenerationOutput> {
        self.submit(request).wait().await
    }

    pub async fn generate_study_guide(
        &self,
        input: impl Into<String>,
    ) -> Result<GenerationOutput> {
        self.generate(GenerationRequest::new(GenerationKind::StudyGuide, input))
            .await
    }

    pub async fn generate_quiz(&self, input: impl Into<String>) -> Result<GenerationOutput> {
        self.generate(GenerationRequest::new(GenerationKind::Quiz, input))
            .await
    }

    pub async fn generate_flashcards(
        &self,
        input: impl Into<String>,
    ) -> Result<GenerationOutput> {
        self.generate(GenerationRequest::new(GenerationKind::Flashcards, input))
            .await
    }

    pub async fn generate_enumerations(
        &self,
        input: impl Into<String>,
    ) -> Result<GenerationOutput> {
        self.generate(GenerationRequest::new(GenerationKind::Enumerations, input))
            .await
    }

    pub fn submit_study_guide(&self, input: impl Into<String>) -> JobHandle {
        self.submit(GenerationRequest::new(GenerationKind::StudyGuide, input))
    }

    pub fn submit_quiz(&self, input: impl Into<String>) -> JobHandle {
        self.submit(GenerationRequest::new(GenerationKind::Quiz, input))
    }

    pub fn submit_flashcards(&self, input: impl Into<String>) -> JobHandle {
        self.submit(GenerationRequest::new(GenerationKind::Flashcards, input))
    }

    pub fn submit_enumerations(&self, input: impl Into<String>) -> JobHandle {
        self.submit(GenerationRequest::new(GenerationKind::Enumerations, input))
    }

    /// Current engine state, mirrored from the worker.
    pub fn state(&self) -> EngineState {
        *self.state.lock()
    }

    /// Take the status-message channel. Available once.
    pub fn take_status_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<String>> {
        self.status.take()
    }

    /// Take the error-message channel. Available once.
    pub fn take_error_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<String>> {
        self.errors.take()
    }

    /// Stop the worker. Queued jobs resolve with a shutdown error.
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

impl Drop for LlmProcessor {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

fn worker_loop(
    mut engine: GenerationEngine,
    mut commands: mpsc::UnboundedReceiver<Command>,
    state: Arc<Mutex<EngineState>>,
    status: mpsc::UnboundedSender<String>,
    errors: mpsc::UnboundedSender<String>,
) {
    while let Some(command) = commands.blocking_recv() {
        match command {
            Command::Initialize { reply } => {
                let _ = status.send("Loading LLM model...".to_string());
                *state.lock() = EngineState::Loading;
                let result = engine.initialize();
                match &result {
                    Ok(()) => {
                        let _ = status.send("LLM model loaded".to_string());
                    }
                    Err(e) => {
                        let _ = errors.send(e.to_string());
                    }
                }
                *state.lock() = engine.state();
                let _ = reply.send(result);
            }
            Command::Generate { request, reply } => {
                let label = request.kind.label();
                let _ = status.send(format!("Generating {}...", label));
                *state.lock() = EngineState::Generating;
                let result = engine.generate(&request);
                match &result {
                    Ok(output) => {
                        let _ = status.send(format!(
                            "Generated {} ({} tokens)",
                            label, output.token_count
                        ));
                    }
                    Err(e) => {
                        let _ = errors.send(e.to_string());
                    }
                }
                *state.lock() = engine.state();
                let _ = reply.send(result);
            }
            Command::Cleanup { reply } => {
                engine.cleanup();
                *state.lock() = engine.state();
                let _ = status.send("LLM model released".to_string());
                let _ = reply.send(());
            }
            Command::Shutdown => break,
        }
    }
    engine.cleanup();
    info!("inference worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use crate::model::{test_adapter, MockBackend};

    const EOS: u32 = 2;

    fn test_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.model.model_path = PathBuf::from("unused.gguf");
        config.model.tokenizer_path = PathBuf::from("unused.json");
        config.context.context_window = 256;
        config.context.batch_size = 8;
        config.generation.max_output_tokens = 16;
        config
    }

    fn ready_processor(script: Vec<u32>) -> LlmProcessor {
        let mut engine = GenerationEngine::new(test_config()).unwrap();
        engine
            .initialize_with(Some(Box::new(MockBackend::new(script))), test_adapter())
            .unwrap();
        LlmProcessor::from_engine(engine)
    }

    #[tokio::test]
    async fn test_generate_before_initialize_reports_error() {
        let engine = GenerationEngine::new(test_config()).unwrap();
        let mut processor = LlmProcessor::from_engine(engine);
        let mut errors = processor.take_error_receiver().unwrap();

        let result = processor.generate_quiz("alpha").await;
        assert!(matches!(result, Err(ProcessorError::NotInitialized)));

        let message = errors.recv().await.unwrap();
        assert!(message.contains("not initialized"));
    }

    #[tokio::test]
    async fn test_jobs_run_in_submission_order() {
        let mut processor = ready_processor(vec![3, EOS]);
        let mut status = processor.take_status_receiver().unwrap();

        let quiz = processor.submit_quiz("alpha beta");
        let cards = processor.submit_flashcards("gamma delta");
        let (cards_result, quiz_result) = futures::join!(cards.wait(), quiz.wait());
        assert!(cards_result.is_ok());
        assert!(quiz_result.is_ok());

        let mut starts = Vec::new();
        while let Ok(message) = status.try_recv() {
            if message.starts_with("Generating") {
                starts.push(message);
            }
        }
        assert_eq!(
            starts,
            vec![
                "Generating quiz...".to_string(),
                "Generating flashcards...".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_named_operations() {
        let processor = ready_processor(vec![3, 4, EOS]);
        let output = processor.generate_study_guide("alpha beta").await.unwrap();
        assert_eq!(output.text, "alpha beta");
        let output = processor.generate_enumerations("alpha").await.unwrap();
        assert!(!output.text.is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_then_generate() {
        let processor = ready_processor(vec![3, EOS]);
        processor.cleanup().await.unwrap();
        assert_eq!(processor.state(), EngineState::Uninitialized);
        assert!(matches!(
            processor.generate_quiz("alpha").await,
            Err(ProcessorError::NotInitialized)
        ));
        // cleanup again is harmless
        processor.cleanup().await.unwrap();
    }

    #[tokio::test]
    async fn test_state_mirror() {
        let processor = ready_processor(vec![3, EOS]);
        assert_eq!(processor.state(), EngineState::Ready);
        processor.generate_quiz("alpha").await.unwrap();
        assert_eq!(processor.state(), EngineState::Ready);
    }

    #[tokio::test]
    async fn test_shutdown_resolves_pending_handles() {
        let processor = ready_processor(vec![3, EOS]);
        processor.shutdown();
        let handle = processor.submit_quiz("alpha");
        assert!(matches!(handle.wait().await, Err(ProcessorError::Shutdown)));
    }
}
