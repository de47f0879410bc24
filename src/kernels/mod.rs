//! Micro-kernel families.
//!
//! Every family member implements the same block-level contract: given
//! one `m x n` output block (`n` at most NR), the full `k` extent of
//! the current KC partition, and operand views in either packed or
//! identity layout, compute
//!
//! `C = alpha * A * B + beta * C`, then the post-op pipeline,
//!
//! sweeping MR-row groups internally and splitting column fringes
//! internally. `beta == 0` must not read C, and the pipeline runs only
//! when the cursor marks the final KC partition.

use crate::postops::{PostOp, PostOpCursor};
use crate::types::{APanel, BPanel};

pub mod reference;

#[cfg(target_arch = "x86_64")]
pub mod f32_avx2;

/// Block-level kernel handle stored in the registry.
///
/// # Safety
/// `a` must cover `m` rows by `k` columns under its stride scheme, `b`
/// must cover `k` by `n`, and `c` must cover `m` rows of `ldc` elements
/// reaching column `n`. Bias slices in `ops` must reach the cursor's
/// terminal row/col positions.
pub type BlockKernel<TA, TB, TC, ACC> = unsafe fn(
    m: usize,
    n: usize,
    k: usize,
    a: APanel<TA>,
    b: BPanel<TB>,
    c: *mut TC,
    ldc: usize,
    alpha: ACC,
    beta: ACC,
    ops: &[PostOp<'_, ACC>],
    cursor: PostOpCursor,
);
