//! Portable reference kernels.
//!
//! One generic kernel covers every datatype combination; the registry
//! instantiates it per combination and uses it both as the fallback on
//! tiers without a SIMD member and as the low-precision implementation
//! behind the wide tiers. The stride scheme of [`APanel`]/[`BPanel`]
//! lets the same code walk packed panels and unpacked sources.
//!
//! Accumulation is always in the `ACC` scalar (i32 for the integer
//! combinations, f32 otherwise); the store converts through
//! [`FromAcc`], which is where the fixed per-type downconvert policy
//! lives: i16 saturates, i32 truncates (wrapping), floats store as-is.

use half::bf16;

use crate::postops::{self, Accumulator, PostOp, PostOpCursor};
use crate::types::{APanel, BPanel};

/// Widening load into the accumulator scalar.
pub trait IntoAcc<A>: Copy {
    fn into_acc(self) -> A;
}

/// Downconvert on store.
pub trait FromAcc<A>: Copy {
    fn from_acc(v: A) -> Self;
}

impl IntoAcc<f32> for f32 {
    #[inline(always)]
    fn into_acc(self) -> f32 {
        self
    }
}

impl IntoAcc<f32> for bf16 {
    #[inline(always)]
    fn into_acc(self) -> f32 {
        self.to_f32()
    }
}

impl IntoAcc<i32> for u8 {
    #[inline(always)]
    fn into_acc(self) -> i32 {
        self as i32
    }
}

impl IntoAcc<i32> for i8 {
    #[inline(always)]
    fn into_acc(self) -> i32 {
        self as i32
    }
}

impl IntoAcc<i32> for i16 {
    #[inline(always)]
    fn into_acc(self) -> i32 {
        self as i32
    }
}

impl IntoAcc<i32> for i32 {
    #[inline(always)]
    fn into_acc(self) -> i32 {
        self
    }
}

impl FromAcc<f32> for f32 {
    #[inline(always)]
    fn from_acc(v: f32) -> f32 {
        v
    }
}

impl FromAcc<i32> for i16 {
    #[inline(always)]
    fn from_acc(v: i32) -> i16 {
        v.clamp(i16::MIN as i32, i16::MAX as i32) as i16
    }
}

impl FromAcc<i32> for i32 {
    #[inline(always)]
    fn from_acc(v: i32) -> i32 {
        v
    }
}

/// Generic block kernel, `MR` fixed at instantiation.
///
/// # Safety
/// See [`crate::kernels::BlockKernel`].
pub unsafe fn block_kernel<const MR: usize, TA, TB, TC, ACC>(
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
) where
    TA: IntoAcc<ACC>,
    TB: IntoAcc<ACC>,
    TC: IntoAcc<ACC> + FromAcc<ACC>,
    ACC: Accumulator,
{
    for r in 0..m {
        let a_row = a.ptr.add((r / MR) * a.ps + (r % MR) * a.rs);
        for j in 0..n {
            let mut acc = ACC::ZERO;
            for kk in 0..k {
                let av = (*a_row.add(kk * a.cs)).into_acc();
                let bv = (*b.ptr.add(kk * b.rs + j * b.cs)).into_acc();
                acc = acc.add(av.mul(bv));
            }
            acc = alpha.mul(acc);
            let cp = c.add(r * ldc + j);
            if beta != ACC::ZERO {
                acc = acc.add(beta.mul((*cp).into_acc()));
            }
            if cursor.last_k {
                acc = postops::apply(acc, ops, cursor.row + r, cursor.col + j);
            }
            *cp = TC::from_acc(acc);
        }
    }
}
