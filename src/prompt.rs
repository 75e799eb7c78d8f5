//! Prompt templates for the four study-content tasks.
//!
//! Each template is fixed text around the source material, which is embedded
//! verbatim. The instructions pin the output shape the app's parsers rely on:
//! quiz and flashcard pairs are separated by blank lines with the question or
//! term on the first line of each block, and enumerations put one point per
//! line.

use crate::types::GenerationKind;

/// Build the full prompt for a task over the given source text.
pub fn format_prompt(kind: GenerationKind, input: &str) -> String {
    match kind {
        GenerationKind::StudyGuide => format!(
            "You are a study assistant. Create a comprehensive study guide from the \
             following text. Organize it into clear sections with headings, covering \
             the main ideas first and supporting details under each.\n\n\
             Text:\n{input}\n\n\
             Study guide:\n"
        ),
        GenerationKind::Quiz => format!(
            "You are a study assistant. Write quiz questions with answers from the \
             following text. Put each question on one line and its answer on the \
             next line, and separate each question-answer pair from the next with \
             a single blank line. Do not number the questions.\n\n\
             Text:\n{input}\n\n\
             Quiz:\n"
        ),
        GenerationKind::Flashcards => format!(
            "You are a study assistant. Create flashcards from the following text. \
             Put each term or concept on one line and its definition on the next \
             line, and separate each card from the next with a single blank \
             line.\n\n\
             Text:\n{input}\n\n\
             Flashcards:\n"
        ),
        GenerationKind::Enumerations => format!(
            "You are a study assistant. List the key points from the following \
             text. Write exactly one point per line, with no blank lines between \
             points.\n\n\
             Text:\n{input}\n\n\
             Key points:\n"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "The mitochondrion is the powerhouse of the cell.\n\
                          It produces ATP through oxidative phosphorylation.";

    #[test]
    fn test_input_embedded_verbatim() {
        for kind in [
            GenerationKind::StudyGuide,
            GenerationKind::Quiz,
            GenerationKind::Flashcards,
            GenerationKind::Enumerations,
        ] {
            let prompt = format_prompt(kind, SOURCE);
            assert!(
                prompt.contains(SOURCE),
                "{:?} prompt must embed the source text unchanged",
                kind
            );
        }
    }

    #[test]
    fn test_templates_differ_per_task() {
        let guide = format_prompt(GenerationKind::StudyGuide, SOURCE);
        let quiz = format_prompt(GenerationKind::Quiz, SOURCE);
        let cards = format_prompt(GenerationKind::Flashcards, SOURCE);
        let points = format_prompt(GenerationKind::Enumerations, SOURCE);
        assert_ne!(guide, quiz);
        assert_ne!(quiz, cards);
        assert_ne!(cards, points);
    }

    #[test]
    fn test_pair_delimiting_instructions() {
        let quiz = format_prompt(GenerationKind::Quiz, SOURCE);
        assert!(quiz.contains("blank line"));
        let cards = format_prompt(GenerationKind::Flashcards, SOURCE);
        assert!(cards.contains("blank line"));
        let points = format_prompt(GenerationKind::Enumerations, SOURCE);
        assert!(points.contains("one point per line"));
    }

    #[test]
    fn test_empty_input_still_formats() {
        let prompt = format_prompt(GenerationKind::StudyGuide, "");
        assert!(prompt.contains("Text:\n\n"));
    }
}
