//! Logging setup and system memory queries.

mod logging;
mod memory;

pub use logging::{setup_logging, LogConfig};
pub use memory::{available_memory_bytes, fits_load_margin, LOAD_MEMORY_MARGIN};
