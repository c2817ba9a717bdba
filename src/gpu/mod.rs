// ============================================================================
// GPU MODULE: optional hardware path for layer filters
// ============================================================================
//
// The editing core never requires a device. A session may carry one
// `FilterAccelerator`; if it declines a job, or hands back a buffer of the
// wrong size, the CPU filters in `ops::filters` run instead.
// ============================================================================

use crate::ops::filters::FilterParams;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AcceleratorOutcome {
    /// Filtered RGBA8, same dimensions as the input.
    Applied(Vec<u8>),
    Declined(String),
}

pub trait FilterAccelerator: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, rgba: &[u8], width: u32, height: u32, filter: &FilterParams)
    -> AcceleratorOutcome;
}
