//! Common type definitions used throughout the driver.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ProcessorError, Result};

/// The four study-content generation tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GenerationKind {
    /// Sectioned study guide covering main ideas and details
    StudyGuide,
    /// Question/answer pairs, one pair per blank-line-separated block
    Quiz,
    /// Term/definition pairs, one pair per blank-line-separated block
    Flashcards,
    /// Key points, one per line
    Enumerations,
}

impl GenerationKind {
    /// Human-readable task name, used in status messages.
    pub fn label(&self) -> &'static str {
        match self {
            GenerationKind::StudyGuide => "study guide",
            GenerationKind::Quiz => "quiz",
            GenerationKind::Flashcards => "flashcards",
            GenerationKind::Enumerations => "enumerations",
        }
    }
}

/// Per-request sampling controls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingParams {
    /// Temperature; <= 0 selects greedy argmax
    pub temperature: f64,
    /// Min-p threshold; >= 1 selects greedy argmax
    pub min_p: f64,
    /// RNG seed for the stochastic draw
    pub seed: u64,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            min_p: 0.0,
            seed: DEFAULT_SEED,
        }
    }
}

/// Default sampling seed, fixed so repeated runs are reproducible.
pub const DEFAULT_SEED: u64 = 299792458;

impl SamplingParams {
    /// Greedy argmax selection.
    pub fn greedy() -> Self {
        Self::default()
    }

    /// Whether these parameters reduce to deterministic argmax.
    pub fn is_greedy(&self) -> bool {
        self.temperature <= 0.0 || self.min_p >= 1.0
    }
}

/// A single generation request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Which task template to apply
    pub kind: GenerationKind,
    /// Source text, embedded verbatim in the prompt
    pub input: String,
    /// Sampling controls; `None` uses the engine's configured defaults
    pub sampling: Option<SamplingParams>,
}

impl GenerationRequest {
    pub fn new(kind: GenerationKind, input: impl Into<String>) -> Self {
        Self {
            kind,
            input: input.into(),
            sampling: None,
        }
    }

    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = Some(sampling);
        self
    }
}

/// Result of a completed generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOutput {
    /// Generated text, stop token excluded
    pub text: String,
    /// Number of tokens generated
    pub token_count: usize,
    /// Wall-clock time spent in the decode loop
    pub elapsed: Duration,
}

/// Handle to a submitted job. Resolves exactly once, with either the
/// generated output or the error that aborted the request.
#[derive(Debug)]
pub struct JobHandle {
    receiver: tokio::sync::oneshot::Receiver<Result<GenerationOutput>>,
}

impl JobHandle {
    pub(crate) fn new(
        receiver: tokio::sync::oneshot::Receiver<Result<GenerationOutput>>,
    ) -> Self {
        Self { receiver }
    }

    /// Wait for the job's terminal event.
    pub async fn wait(self) -> Result<GenerationOutput> {
        self.receiver.await.map_err(|_| ProcessorError::Shutdown)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels() {
        assert_eq!(GenerationKind::StudyGuide.label(), "study guide");
        assert_eq!(GenerationKind::Enumerations.label(), "enumerations");
    }

    #[test]
    fn test_greedy_reduction() {
        assert!(SamplingParams::greedy().is_greedy());
        assert!(SamplingParams {
            temperature: 0.8,
            min_p: 1.0,
            seed: 1,
        }
        .is_greedy());
        assert!(!SamplingParams {
            temperature: 0.8,
            min_p: 0.05,
            seed: 1,
        }
        .is_greedy());
    }

    #[tokio::test]
    async fn test_job_handle_resolves_once() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let handle = JobHandle::new(rx);
        tx.send(Ok(GenerationOutput {
            text: "done".to_string(),
            token_count: 1,
            elapsed: Duration::from_millis(5),
        }))
        .unwrap();
        let output = handle.wait().await.unwrap();
        assert_eq!(output.text, "done");
    }

    #[tokio::test]
    async fn test_job_handle_dropped_sender() {
        let (tx, rx) = tokio::sync::oneshot::channel::<Result<GenerationOutput>>();
        let handle = JobHandle::new(rx);
        drop(tx);
        assert!(matches!(handle.wait().await, Err(ProcessorError::Shutdown)));
    }
}
