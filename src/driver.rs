//! Blocked GEMM driver and public entry points.
//!
//! The driver runs the classic five-loop nest around the block kernel:
//! NC column blocks, KC depth partitions (B packed once per partition),
//! MC row blocks (A packed once per row block), then NR-wide chunks
//! handed to the kernel. `beta` applies on the first KC partition only;
//! later partitions accumulate with beta = 1. The post-op pipeline is
//! armed only on the final partition, through the cursor.
//!
//! Entry points validate the caller's slices with asserts (contract
//! violations are bugs, not recoverable errors), resolve the registry
//! context, plan the blocking for the problem shape and drop into the
//! nest. Degenerate problems (`m`, `n` or `k` of zero) return without
//! touching C.

use rayon::prelude::*;

use crate::blocking;
use crate::cache_params::{AlignedVec, BlockSizes};
use crate::error::{LpgemmError, LpgemmResult};
use crate::packing::{packed_a_len, packed_b_len};
use crate::postops::{Accumulator, BiasAxis, PostOp, PostOpCursor};
use crate::registry::{self, OpHandles, OpType, TypedHandles};
use crate::types::{APanel, BPanel};

/// The five-loop nest. `bs` must already be planned (tile-aligned,
/// non-zero for a non-degenerate problem).
///
/// # Safety
/// Pointers must cover the extents implied by `m`/`n`/`k` and the
/// leading dimensions; C must not alias A or B.
unsafe fn gemm_blocked<TA, TB, TC, ACC>(
    h: &TypedHandles<TA, TB, TC, ACC>,
    bs: BlockSizes,
    m: usize,
    n: usize,
    k: usize,
    alpha: ACC,
    a: *const TA,
    lda: usize,
    b: *const TB,
    ldb: usize,
    beta: ACC,
    c: *mut TC,
    ldc: usize,
    ops: &[PostOp<'_, ACC>],
) where
    TA: Copy + Default,
    TB: Copy + Default,
    ACC: Accumulator,
{
    let BlockSizes { mc, nc, kc, mr, nr } = bs;

    let mut a_scratch = AlignedVec::<TA>::new();
    let mut b_scratch = AlignedVec::<TB>::new();
    if h.pack_a.is_some() {
        a_scratch.reserve(packed_a_len(mc, kc, mr));
    }
    if h.pack_b.is_some() {
        b_scratch.reserve(packed_b_len(kc, nc, nr));
    }

    let mut jc = 0;
    while jc < n {
        let nc_cur = nc.min(n - jc);
        let mut pc = 0;
        while pc < k {
            let kc_cur = kc.min(k - pc);
            let first_kc = pc == 0;
            let last_kc = pc + kc_cur == k;
            let beta_eff = if first_kc { beta } else { ACC::ONE };

            if let Some(pack_b) = h.pack_b {
                pack_b(
                    b.add(pc * ldb + jc),
                    ldb,
                    kc_cur,
                    nc_cur,
                    nr,
                    b_scratch.as_mut_ptr(),
                );
            }

            let mut ic = 0;
            while ic < m {
                let mc_cur = mc.min(m - ic);

                let a_view = if let Some(pack_a) = h.pack_a {
                    pack_a(
                        a.add(ic * lda + pc),
                        lda,
                        mc_cur,
                        kc_cur,
                        mr,
                        a_scratch.as_mut_ptr(),
                    );
                    APanel {
                        ptr: a_scratch.as_ptr(),
                        rs: 1,
                        cs: mr,
                        ps: mr * kc_cur,
                    }
                } else {
                    APanel {
                        ptr: a.add(ic * lda + pc),
                        rs: lda,
                        cs: 1,
                        ps: mr * lda,
                    }
                };

                let mut jr = 0;
                while jr < nc_cur {
                    let nr_cur = nr.min(nc_cur - jr);
                    let b_view = if h.pack_b.is_some() {
                        BPanel {
                            ptr: b_scratch.as_ptr().add((jr / nr) * kc_cur * nr),
                            rs: nr,
                            cs: 1,
                        }
                    } else {
                        BPanel {
                            ptr: b.add(pc * ldb + jc + jr),
                            rs: ldb,
                            cs: 1,
                        }
                    };
                    let cursor = PostOpCursor {
                        row: ic,
                        col: jc + jr,
                        last_k: last_kc,
                    };
                    (h.kernel)(
                        mc_cur,
                        nr_cur,
                        kc_cur,
                        a_view,
                        b_view,
                        c.add(ic * ldc + jc + jr),
                        ldc,
                        alpha,
                        beta_eff,
                        ops,
                        cursor,
                    );
                    jr += nr;
                }
                ic += mc;
            }
            pc += kc;
        }
        jc += nc;
    }
}

fn validate<TA, TB, TC, ACC>(
    m: usize,
    n: usize,
    k: usize,
    a: &[TA],
    lda: usize,
    b: &[TB],
    ldb: usize,
    c: &[TC],
    ldc: usize,
    ops: &[PostOp<'_, ACC>],
) {
    assert!(lda >= k, "lda {lda} < k {k}");
    assert!(ldb >= n, "ldb {ldb} < n {n}");
    assert!(ldc >= n, "ldc {ldc} < n {n}");
    assert!(a.len() >= (m - 1) * lda + k, "A slice too short");
    assert!(b.len() >= (k - 1) * ldb + n, "B slice too short");
    assert!(c.len() >= (m - 1) * ldc + n, "C slice too short");
    for op in ops {
        if let PostOp::Bias { values, axis } = op {
            match axis {
                BiasAxis::Col => assert!(values.len() >= n, "bias shorter than n"),
                BiasAxis::Row => assert!(values.len() >= m, "bias shorter than m"),
            }
        }
    }
}

/// Shared body of the per-combination entry points: validate, plan,
/// run the nest.
#[allow(clippy::too_many_arguments)]
fn run<TA, TB, TC, ACC>(
    h: &TypedHandles<TA, TB, TC, ACC>,
    base: BlockSizes,
    m: usize,
    n: usize,
    k: usize,
    alpha: ACC,
    a: &[TA],
    lda: usize,
    b: &[TB],
    ldb: usize,
    beta: ACC,
    c: &mut [TC],
    ldc: usize,
    ops: &[PostOp<'_, ACC>],
) -> LpgemmResult<()>
where
    TA: Copy + Default,
    TB: Copy + Default,
    ACC: Accumulator,
{
    if m == 0 || n == 0 || k == 0 {
        return Ok(());
    }
    validate(m, n, k, a, lda, b, ldb, c, ldc, ops);
    let bs = blocking::plan(base, m, n, k);
    unsafe {
        gemm_blocked(
            h,
            bs,
            m,
            n,
            k,
            alpha,
            a.as_ptr(),
            lda,
            b.as_ptr(),
            ldb,
            beta,
            c.as_mut_ptr(),
            ldc,
            ops,
        );
    }
    Ok(())
}

macro_rules! gemm_entry {
    ($(#[$doc:meta])* $name:ident, $variant:ident, $ta:ty, $tb:ty, $tc:ty, $acc:ty) => {
        $(#[$doc])*
        #[allow(clippy::too_many_arguments)]
        pub fn $name(
            m: usize,
            n: usize,
            k: usize,
            alpha: $acc,
            a: &[$ta],
            lda: usize,
            b: &[$tb],
            ldb: usize,
            beta: $acc,
            c: &mut [$tc],
            ldc: usize,
            ops: &[PostOp<'_, $acc>],
        ) -> LpgemmResult<()> {
            let ctx = registry::resolve(OpType::$variant)?;
            let OpHandles::$variant(h) = &ctx.handles else {
                return Err(LpgemmError::ContextTypeMismatch {
                    expected: OpType::$variant,
                    actual: ctx.op,
                });
            };
            run(h, ctx.blocking, m, n, k, alpha, a, lda, b, ldb, beta, c, ldc, ops)
        }
    };
}

gemm_entry!(
    /// Row-major f32 GEMM: `C = alpha * A * B + beta * C`, then the
    /// post-op pipeline.
    gemm_f32, F32F32F32, f32, f32, f32, f32
);
gemm_entry!(
    /// u8 x i8 -> i16 GEMM with i32 accumulation; the store saturates.
    gemm_u8s8s16, U8S8S16, u8, i8, i16, i32
);
gemm_entry!(
    /// i8 x i8 -> i16 GEMM with i32 accumulation; the store saturates.
    gemm_s8s8s16, S8S8S16, i8, i8, i16, i32
);
gemm_entry!(
    /// u8 x i8 -> i32 GEMM, i32 accumulation throughout.
    gemm_u8s8s32, U8S8S32, u8, i8, i32, i32
);
gemm_entry!(
    /// i8 x i8 -> i32 GEMM, i32 accumulation throughout.
    gemm_s8s8s32, S8S8S32, i8, i8, i32, i32
);
gemm_entry!(
    /// bf16 x bf16 -> f32 GEMM, f32 accumulation.
    gemm_bf16, Bf16Bf16F32, half::bf16, half::bf16, f32, f32
);

/// f32 GEMM with caller-chosen blocking, for tuning experiments. The
/// result is identical to [`gemm_f32`] for any valid blocking.
#[allow(clippy::too_many_arguments)]
pub fn gemm_f32_with_block_sizes(
    m: usize,
    n: usize,
    k: usize,
    alpha: f32,
    a: &[f32],
    lda: usize,
    b: &[f32],
    ldb: usize,
    beta: f32,
    c: &mut [f32],
    ldc: usize,
    ops: &[PostOp<'_, f32>],
    bs: BlockSizes,
) -> LpgemmResult<()> {
    let ctx = registry::resolve(OpType::F32F32F32)?;
    let OpHandles::F32F32F32(h) = &ctx.handles else {
        return Err(LpgemmError::ContextTypeMismatch {
            expected: OpType::F32F32F32,
            actual: ctx.op,
        });
    };
    if m == 0 || n == 0 || k == 0 {
        return Ok(());
    }
    assert!(bs.mr == ctx.blocking.mr && bs.nr == ctx.blocking.nr, "tile shape is fixed");
    assert!(bs.mc >= bs.mr && bs.mc % bs.mr == 0, "MC must be a positive MR multiple");
    assert!(bs.nc >= bs.nr && bs.nc % bs.nr == 0, "NC must be a positive NR multiple");
    assert!(bs.kc > 0, "KC must be positive");
    validate(m, n, k, a, lda, b, ldb, c, ldc, ops);
    unsafe {
        gemm_blocked(
            h,
            bs,
            m,
            n,
            k,
            alpha,
            a.as_ptr(),
            lda,
            b.as_ptr(),
            ldb,
            beta,
            c.as_mut_ptr(),
            ldc,
            ops,
        );
    }
    Ok(())
}

/// Multi-threaded f32 GEMM. NC-wide column blocks go to the rayon
/// pool; workers own disjoint column ranges of C and private pack
/// scratch, so no synchronization happens below the join.
#[allow(clippy::too_many_arguments)]
pub fn par_gemm_f32(
    m: usize,
    n: usize,
    k: usize,
    alpha: f32,
    a: &[f32],
    lda: usize,
    b: &[f32],
    ldb: usize,
    beta: f32,
    c: &mut [f32],
    ldc: usize,
    ops: &[PostOp<'_, f32>],
) -> LpgemmResult<()> {
    let ctx = registry::resolve(OpType::F32F32F32)?;
    let OpHandles::F32F32F32(h) = &ctx.handles else {
        return Err(LpgemmError::ContextTypeMismatch {
            expected: OpType::F32F32F32,
            actual: ctx.op,
        });
    };
    if m == 0 || n == 0 || k == 0 {
        return Ok(());
    }
    validate(m, n, k, a, lda, b, ldb, c, ldc, ops);

    let bs = blocking::plan(ctx.blocking, m, n, k);
    let n_blocks = n.div_ceil(bs.nc);
    if n_blocks <= 1 {
        unsafe {
            gemm_blocked(
                h,
                bs,
                m,
                n,
                k,
                alpha,
                a.as_ptr(),
                lda,
                b.as_ptr(),
                ldb,
                beta,
                c.as_mut_ptr(),
                ldc,
                ops,
            );
        }
        return Ok(());
    }

    let h = *h;
    let a_addr = a.as_ptr() as usize;
    let b_addr = b.as_ptr() as usize;
    let c_addr = c.as_mut_ptr() as usize;

    (0..n_blocks).into_par_iter().for_each(|blk| {
        let jc = blk * bs.nc;
        let nc_cur = bs.nc.min(n - jc);
        // Column-axis bias must keep indexing in global coordinates,
        // so re-base its slice alongside the operand pointers.
        let local_ops: Vec<PostOp<'_, f32>> = ops
            .iter()
            .map(|op| match *op {
                PostOp::Bias {
                    values,
                    axis: BiasAxis::Col,
                } => PostOp::Bias {
                    values: &values[jc..],
                    axis: BiasAxis::Col,
                },
                other => other,
            })
            .collect();
        unsafe {
            gemm_blocked(
                &h,
                bs,
                m,
                nc_cur,
                k,
                alpha,
                a_addr as *const f32,
                lda,
                (b_addr as *const f32).add(jc),
                ldb,
                beta,
                (c_addr as *mut f32).add(jc),
                ldc,
                &local_ops,
            );
        }
    });
    Ok(())
}
