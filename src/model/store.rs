//! Model file loading.
//!
//! The store turns a `ModelConfig` into a `ModelHandle`: it checks the file
//! exists before anything else, applies the free-memory guard, reads the GGUF
//! container (memory-mapped or buffered), and loads the tokenizer. A
//! `vocab_only` load skips the weight tensors entirely.

use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::PathBuf;

use candle_core::quantized::gguf_file;
use candle_core::Device;
use candle_transformers::models::quantized_llama::ModelWeights;
use memmap2::Mmap;
use tracing::{info, warn};

use crate::config::ModelConfig;
use crate::error::{ProcessorError, Result};
use crate::model::backend::{CandleBackend, ModelBackend};
use crate::model::vocab::TokenizerAdapter;
use crate::utils;

/// Loads models from disk.
pub struct ModelStore;

impl ModelStore {
    pub fn load(config: &ModelConfig) -> Result<ModelHandle> {
        let path = &config.model_path;
        let metadata = std::fs::metadata(path).map_err(|_| ProcessorError::ModelNotFound {
            path: path.clone(),
        })?;
        if !metadata.is_file() {
            return Err(ProcessorError::ModelNotFound { path: path.clone() });
        }
        let model_bytes = metadata.len();

        // The guard never fails a load on its own. When memory is tight it
        // downgrades to mapped, unpinned pages so the OS can reclaim them.
        let mut use_mmap = config.use_mmap;
        let mut use_mlock = config.use_mlock;
        if !utils::fits_load_margin(model_bytes) {
            warn!(
                model_bytes,
                margin = utils::LOAD_MEMORY_MARGIN,
                "free memory below load margin, forcing mmap and dropping mlock"
            );
            use_mmap = true;
            use_mlock = false;
        }

        let adapter = TokenizerAdapter::from_file(&config.tokenizer_path)?;

        if config.vocab_only {
            info!(path = %path.display(), "vocabulary-only load, skipping weights");
            return Ok(ModelHandle {
                backend: None,
                adapter: Some(adapter),
                path: path.clone(),
            });
        }

        let device = select_device(config.gpu_layers);
        let file = File::open(path).map_err(|e| ProcessorError::ModelLoadFailure {
            message: format!("failed to open {}", path.display()),
            source: Some(Box::new(e)),
        })?;

        let weights = if use_mmap {
            let mmap = unsafe {
                Mmap::map(&file).map_err(|e| ProcessorError::ModelLoadFailure {
                    message: format!("failed to map {}", path.display()),
                    source: Some(Box::new(e)),
                })?
            };
            #[cfg(unix)]
            if use_mlock {
                if let Err(e) = mmap.lock() {
                    warn!(error = %e, "mlock failed, continuing with unpinned pages");
                }
            }
            #[cfg(not(unix))]
            let _ = use_mlock;
            let mut cursor = Cursor::new(&mmap[..]);
            read_weights(&mut cursor, &device)?
        } else {
            let mut reader = BufReader::new(file);
            read_weights(&mut reader, &device)?
        };

        info!(
            path = %path.display(),
            model_bytes,
            mmap = use_mmap,
            "model loaded"
        );
        Ok(ModelHandle {
            backend: Some(Box::new(CandleBackend::new(weights, device))),
            adapter: Some(adapter),
            path: path.clone(),
        })
    }
}

fn read_weights<R: Read + Seek>(reader: &mut R, device: &Device) -> Result<ModelWeights> {
    let content =
        gguf_file::Content::read(reader).map_err(|e| ProcessorError::ModelLoadFailure {
            message: "invalid GGUF container".to_string(),
            source: Some(Box::new(e)),
        })?;
    ModelWeights::from_gguf(content, reader, device).map_err(|e| {
        ProcessorError::ModelLoadFailure {
            message: "failed to build model weights".to_string(),
            source: Some(Box::new(e)),
        }
    })
}

fn select_device(gpu_layers: usize) -> Device {
    if gpu_layers == 0 {
        return Device::Cpu;
    }
    match Device::cuda_if_available(0) {
        Ok(device) => device,
        Err(e) => {
            warn!(error = %e, "no usable GPU, falling back to CPU");
            Device::Cpu
        }
    }
}

/// A loaded model: optional decode backend plus the tokenizer.
pub struct ModelHandle {
    backend: Option<Box<dyn ModelBackend>>,
    adapter: Option<TokenizerAdapter>,
    path: PathBuf,
}

impl ModelHandle {
    #[cfg(test)]
    pub(crate) fn from_parts(
        backend: Option<Box<dyn ModelBackend>>,
        adapter: TokenizerAdapter,
    ) -> Self {
        Self {
            backend,
            adapter: Some(adapter),
            path: PathBuf::new(),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn adapter(&self) -> Option<&TokenizerAdapter> {
        self.adapter.as_ref()
    }

    /// Move the decode backend out, leaving the tokenizer in place. `None`
    /// for vocabulary-only loads or when already taken.
    pub fn take_backend(&mut self) -> Option<Box<dyn ModelBackend>> {
        self.backend.take()
    }

    pub fn is_loaded(&self) -> bool {
        self.adapter.is_some()
    }

    /// Release everything the handle holds. Safe to call repeatedly; calls
    /// after the first are no-ops.
    pub fn unload(&mut self) {
        if self.backend.is_some() || self.adapter.is_some() {
            info!(path = %self.path.display(), "model unloaded");
        }
        self.backend = None;
        self.adapter = None;
    }
}
