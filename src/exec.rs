/*------------------------------------------------------------------------------
ExecutionMode
------------------------------------------------------------------------------*/

/// Execution context for the side-effect-free phases of a correction pass.
///
/// Split-region computation and per-frame region unions are embarrassingly
/// parallel; graph surgery is always sequential. The mode is passed explicitly
/// through every entry point that has a parallel phase, there is no global
/// toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Sequential,
    Parallel,
}

impl ExecutionMode {
    #[inline(always)]
    pub fn is_parallel(&self) -> bool {
        *self == ExecutionMode::Parallel
    }
}

impl Default for ExecutionMode {
    fn default() -> Self {
        ExecutionMode::Sequential
    }
}
