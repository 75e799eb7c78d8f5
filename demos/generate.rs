//! End-to-end demo: load a GGUF model and generate study content.
//!
//! ```text
//! cargo run --example generate -- <model.gguf> <tokenizer.json> <task> <input-file>
//! ```
//!
//! `task` is one of: study-guide, quiz, flashcards, enumerations.

use std::path::PathBuf;

use anyhow::{bail, Context};
use textmaster_llm::{
    setup_logging, EngineConfig, GenerationKind, GenerationRequest, LlmProcessor, LogConfig,
    SamplingParams,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_logging(&LogConfig::default());

    let mut args = std::env::args().skip(1);
    let (model, tokenizer, task, input_file) = match (
        args.next(),
        args.next(),
        args.next(),
        args.next(),
    ) {
        (Some(m), Some(t), Some(k), Some(i)) => (m, t, k, i),
        _ => bail!("usage: generate <model.gguf> <tokenizer.json> <task> <input-file>"),
    };

    let kind = match task.as_str() {
        "study-guide" => GenerationKind::StudyGuide,
        "quiz" => GenerationKind::Quiz,
        "flashcards" => GenerationKind::Flashcards,
        "enumerations" => GenerationKind::Enumerations,
        other => bail!("unknown task {other:?}"),
    };

    let input = std::fs::read_to_string(&input_file)
        .with_context(|| format!("reading {input_file}"))?;

    let mut config = EngineConfig::default();
    config.model.model_path = PathBuf::from(model);
    config.model.tokenizer_path = PathBuf::from(tokenizer);

    let mut processor = LlmProcessor::new(config)?;
    if let Some(mut status) = processor.take_status_receiver() {
        tokio::spawn(async move {
            while let Some(message) = status.recv().await {
                eprintln!("[status] {message}");
            }
        });
    }
    if let Some(mut errors) = processor.take_error_receiver() {
        tokio::spawn(async move {
            while let Some(message) = errors.recv().await {
                eprintln!("[error] {message}");
            }
        });
    }

    processor.initialize().await?;
    let request = GenerationRequest::new(kind, input).with_sampling(SamplingParams::greedy());
    let output = processor.generate(request).await?;

    println!("{}", output.text);
    eprintln!(
        "generated {} tokens in {:.1}s",
        output.token_count,
        output.elapsed.as_secs_f64()
    );

    processor.cleanup().await?;
    processor.shutdown();
    Ok(())
}
