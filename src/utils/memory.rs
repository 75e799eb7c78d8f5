//! System memory queries for the pre-load check.

use sysinfo::System;

/// A load is considered safe when free memory covers the model size with
/// this much headroom.
pub const LOAD_MEMORY_MARGIN: f64 = 1.2;

/// Best-effort query of currently available system memory, in bytes.
/// `None` when the platform query yields nothing useful.
pub fn available_memory_bytes() -> Option<u64> {
    let mut system = System::new();
    system.refresh_memory();
    let available = system.available_memory();
    if available == 0 {
        None
    } else {
        Some(available)
    }
}

/// Whether a model of `model_bytes` fits within the load margin. When the
/// memory query fails, the load proceeds as if memory were sufficient.
pub fn fits_load_margin(model_bytes: u64) -> bool {
    match available_memory_bytes() {
        Some(available) => margin_satisfied(model_bytes, available),
        None => true,
    }
}

fn margin_satisfied(model_bytes: u64, available_bytes: u64) -> bool {
    (model_bytes as f64) * LOAD_MEMORY_MARGIN <= available_bytes as f64
}
