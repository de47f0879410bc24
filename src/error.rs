use thiserror::Error;

use crate::isa::IsaTier;
use crate::registry::OpType;

#[derive(Debug, Error)]
pub enum LpgemmError {
    /// The requested datatype combination has no kernel (not even a
    /// portable reference one) on the active ISA tier. Callers must
    /// check this before any kernel is invoked; the engine never calls
    /// through an absent handle.
    #[error("no kernel for {op:?} on ISA tier {tier:?}")]
    UnsupportedKernel { op: OpType, tier: IsaTier },

    /// The resolved context carries a different datatype combination
    /// than the entry point that fetched it.
    #[error("context type mismatch: expected {expected:?}, got {actual:?}")]
    ContextTypeMismatch { expected: OpType, actual: OpType },
}

pub type LpgemmResult<T> = Result<T, LpgemmError>;
