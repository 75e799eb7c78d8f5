//! Vocabulary access over the HuggingFace `tokenizers` crate.

use std::path::Path;

use tokenizers::Tokenizer;
use tracing::debug;

use crate::error::{ProcessorError, Result};

// Special-token spellings vary across model families; probe the usual ones.
const BOS_CANDIDATES: &[&str] = &["<s>", "<|startoftext|>", "<bos>", "<|begin_of_text|>"];
const EOS_CANDIDATES: &[&str] = &["</s>", "<|endoftext|>", "<|eot_id|>", "<eos>"];

/// Encode/decode wrapper with resolved special tokens.
pub struct TokenizerAdapter {
    tokenizer: Tokenizer,
    bos: Option<u32>,
    eos: Option<u32>,
}

impl TokenizerAdapter {
    /// Load a tokenizer definition from a `tokenizer.json` file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let tokenizer = Tokenizer::from_file(path).map_err(|e| ProcessorError::VocabError {
            message: format!("failed to load tokenizer from {}: {}", path.display(), e),
        })?;
        Ok(Self::from_tokenizer(tokenizer))
    }

    pub fn from_tokenizer(tokenizer: Tokenizer) -> Self {
        let probe = |candidates: &[&str]| {
            candidates
                .iter()
                .find_map(|token| tokenizer.token_to_id(token))
        };
        let bos = probe(BOS_CANDIDATES);
        let eos = probe(EOS_CANDIDATES);
        debug!(?bos, ?eos, "resolved special tokens");
        Self { tokenizer, bos, eos }
    }

    /// Check the vocabulary is usable for generation: both a begin-of-sequence
    /// and an end-of-sequence token must resolve.
    pub fn verify(&self) -> Result<()> {
        if self.bos.is_none() {
            return Err(ProcessorError::VocabError {
                message: "no begin-of-sequence token in vocabulary".to_string(),
            });
        }
        if self.eos.is_none() {
            return Err(ProcessorError::VocabError {
                message: "no end-of-sequence token in vocabulary".to_string(),
            });
        }
        Ok(())
    }

    /// Encode text to token ids, optionally prefixing the BOS token. No stop
    /// token is ever appended.
    pub fn encode(&self, text: &str, add_bos: bool) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| ProcessorError::TokenizeError {
                message: e.to_string(),
            })?;
        let mut ids = Vec::with_capacity(encoding.get_ids().len() + 1);
        if add_bos {
            if let Some(bos) = self.bos {
                ids.push(bos);
            }
        }
        ids.extend_from_slice(encoding.get_ids());
        Ok(ids)
    }

    /// Decode token ids to text, dropping special tokens.
    pub fn decode(&self, ids: &[u32]) -> Result<String> {
        self.tokenizer
            .decode(ids, true)
            .map_err(|e| ProcessorError::TokenizeError {
                message: e.to_string(),
            })
    }

    pub fn bos_token(&self) -> Option<u32> {
        self.bos
    }

    pub fn eos_token(&self) -> Option<u32> {
        self.eos
    }

    /// Start an incremental detokenization stream.
    pub fn stream(&self) -> TokenStream<'_> {
        TokenStream {
            adapter: self,
            tokens: Vec::new(),
            prev_index: 0,
            current_index: 0,
        }
    }
}

/// Incremental detokenizer.
///
/// Token pieces do not map one-to-one onto UTF-8 text: a single character can
/// span several tokens. The stream holds fragments back until the decoded
/// text grows by at least one complete character, so callers only ever see
/// whole characters.
pub struct TokenStream<'a> {
    adapter: &'a TokenizerAdapter,
    tokens: Vec<u32>,
    prev_index: usize,
    current_index: usize,
}

impl TokenStream<'_> {
    /// Append a token; returns the newly completed text fragment, if any.
    pub fn next_token(&mut self, token: u32) -> Result<Option<String>> {
        let prev_text = self
            .adapter
            .decode(&self.tokens[self.prev_index..self.current_index])?;
        self.tokens.push(token);
        let text = self.adapter.decode(&self.tokens[self.prev_index..])?;
        if text.len() > prev_text.len() && text.chars().last().is_some_and(|c| c.is_alphanumeric())
        {
            let (_, fragment) = text.split_at(prev_text.len());
            let fragment = fragment.to_string();
            self.prev_index = self.current_index;
            self.current_index = self.tokens.len();
            Ok(Some(fragment))
        } else {
            Ok(None)
        }
    }

    /// Surface any text still held back.
    pub fn flush(&mut self) -> Result<Option<String>> {
        let prev_text = self
            .adapter
            .decode(&self.tokens[self.prev_index..self.current_index])?;
        let text = self.adapter.decode(&self.tokens[self.prev_index..])?;
        if text.len() > prev_text.len() {
            let (_, fragment) = text.split_at(prev_text.len());
            let fragment = fragment.to_string();
            self.prev_index = self.tokens.len();
            self.current_index = self.tokens.len();
            Ok(Some(fragment))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
pub(crate) fn test_tokenizer_json() -> String {
    // Minimal word-level vocabulary; unknown words map to <unk>.
    serde_json::json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [
            {
                "id": 1, "content": "<s>", "single_word": false, "lstrip": false,
                "rstrip": false, "normalized": false, "special": true
            },
            {
                "id": 2, "content": "</s>", "single_word": false, "lstrip": false,
                "rstrip": false, "normalized": false, "special": true
            }
        ],
        "normalizer": null,
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": {
                "<unk>": 0, "<s>": 1, "</s>": 2,
                "alpha": 3, "beta": 4, "gamma": 5, "delta": 6,
                "photosynthesis": 7, "converts": 8, "light": 9, "energy": 10
            },
            "unk_token": "<unk>"
        }
    })
    .to_string()
}

#[cfg(test)]
pub(crate) fn test_adapter() -> TokenizerAdapter {
    let tokenizer = Tokenizer::from_bytes(test_tokenizer_json().as_bytes())
        .expect("test tokenizer definition must parse");
    TokenizerAdapter::from_tokenizer(tokenizer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_round_trip() {
        let adapter = test_adapter();
        let ids = adapter.encode("alpha beta gamma", false).unwrap();
        assert_eq!(ids, vec![3, 4, 5]);
        assert_eq!(adapter.decode(&ids).unwrap(), "alpha beta gamma");
    }

    #[test]
    fn test_bos_prefix() {
        let adapter = test_adapter();
        let ids = adapter.encode("alpha", true).unwrap();
        assert_eq!(ids, vec![1, 3]);
        // no stop token appended either way
        assert!(!ids.contains(&2));
    }

    #[test]
    fn test_special_token_probe() {
        let adapter = test_adapter();
        assert_eq!(adapter.bos_token(), Some(1));
        assert_eq!(adapter.eos_token(), Some(2));
        assert!(adapter.verify().is_ok());
    }

    #[test]
    fn test_decode_drops_special_tokens() {
        let adapter = test_adapter();
        assert_eq!(adapter.decode(&[1, 3, 2]).unwrap(), "alpha");
    }

    #[test]
    fn test_stream_matches_full_decode() {
        let adapter = test_adapter();
        let tokens = [3u32, 4, 5, 6];
        let mut stream = adapter.stream();
        let mut out = String::new();
        for token in tokens {
            if let Some(fragment) = stream.next_token(token).unwrap() {
                out.push_str(&fragment);
            }
        }
        if let Some(rest) = stream.flush().unwrap() {
            out.push_str(&rest);
        }
        assert_eq!(out, adapter.decode(&tokens).unwrap());
        assert_eq!(out, "alpha beta gamma delta");
    }

    #[test]
    fn test_stream_flush_drains_once() {
        let adapter = test_adapter();
        let mut stream = adapter.stream();
        stream.next_token(3).unwrap();
        stream.flush().unwrap();
        // a second flush has nothing left to surface
        assert!(stream.flush().unwrap().is_none());
    }
}
