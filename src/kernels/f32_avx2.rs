//! f32 AVX2+FMA micro-kernel family, MR = 6, NR = 16.
//!
//! The full tile keeps twelve YMM accumulators live (two per row), one
//! broadcast register for A and two B loads per k step. Column fringes
//! split greedily into 16 / 8 / 4 / 2 / 1 wide tiles; the 16 and 8
//! widths are vector code, the narrow widths share the scalar
//! reference math. Row fringes dispatch through a table indexed by the
//! exact remainder, one monomorphized variant per row count.
//!
//! Callers must only reach this family through a registry tier that
//! verified AVX2 and FMA support.

use core::arch::x86_64::*;

use crate::postops::{self, BiasAxis, PostOp, PostOpCursor};
use crate::types::{APanel, BPanel};

pub const MR: usize = 6;
pub const NR: usize = 16;

type RowKernelFn = unsafe fn(
    n: usize,
    k: usize,
    a_row: *const f32,
    rs_a: usize,
    cs_a: usize,
    b: BPanel<f32>,
    c: *mut f32,
    ldc: usize,
    alpha: f32,
    beta: f32,
    ops: &[PostOp<'_, f32>],
    row0: usize,
    col0: usize,
    last_k: bool,
);

/// Row-fringe dispatch, indexed by the remainder row count (0 unused).
static FRINGE: [Option<RowKernelFn>; MR] = [
    None,
    Some(ker_rows_1 as RowKernelFn),
    Some(ker_rows_2 as RowKernelFn),
    Some(ker_rows_3 as RowKernelFn),
    Some(ker_rows_4 as RowKernelFn),
    Some(ker_rows_5 as RowKernelFn),
];

/// Block kernel entry, signature per [`crate::kernels::BlockKernel`].
///
/// # Safety
/// Operand bounds per the block-kernel contract, plus: the CPU must
/// support AVX2 and FMA.
pub unsafe fn block_kernel_f32(
    m: usize,
    n: usize,
    k: usize,
    a: APanel<f32>,
    b: BPanel<f32>,
    c: *mut f32,
    ldc: usize,
    alpha: f32,
    beta: f32,
    ops: &[PostOp<'_, f32>],
    cursor: PostOpCursor,
) {
    debug_assert_eq!(b.cs, 1);
    let mut r0 = 0;
    let mut g = 0;
    while m - r0 >= MR {
        ker_rows_6(
            n,
            k,
            a.ptr.add(g * a.ps),
            a.rs,
            a.cs,
            b,
            c.add(r0 * ldc),
            ldc,
            alpha,
            beta,
            ops,
            cursor.row + r0,
            cursor.col,
            cursor.last_k,
        );
        r0 += MR;
        g += 1;
    }
    let rem = m - r0;
    if let Some(ker) = FRINGE[rem] {
        ker(
            n,
            k,
            a.ptr.add(g * a.ps),
            a.rs,
            a.cs,
            b,
            c.add(r0 * ldc),
            ldc,
            alpha,
            beta,
            ops,
            cursor.row + r0,
            cursor.col,
            cursor.last_k,
        );
    }
}

macro_rules! row_kernel {
    ($name:ident, $rows:literal) => {
        #[target_feature(enable = "avx2", enable = "fma")]
        unsafe fn $name(
            n: usize,
            k: usize,
            a_row: *const f32,
            rs_a: usize,
            cs_a: usize,
            b: BPanel<f32>,
            c: *mut f32,
            ldc: usize,
            alpha: f32,
            beta: f32,
            ops: &[PostOp<'_, f32>],
            row0: usize,
            col0: usize,
            last_k: bool,
        ) {
            row_group::<$rows>(
                n, k, a_row, rs_a, cs_a, b, c, ldc, alpha, beta, ops, row0, col0, last_k,
            )
        }
    };
}

row_kernel!(ker_rows_1, 1);
row_kernel!(ker_rows_2, 2);
row_kernel!(ker_rows_3, 3);
row_kernel!(ker_rows_4, 4);
row_kernel!(ker_rows_5, 5);
row_kernel!(ker_rows_6, 6);

/// One MR-group row band: greedy 16/8/4/2/1 column chain.
#[inline(always)]
#[allow(clippy::too_many_arguments)]
unsafe fn row_group<const ROWS: usize>(
    n: usize,
    k: usize,
    a_row: *const f32,
    rs_a: usize,
    cs_a: usize,
    b: BPanel<f32>,
    c: *mut f32,
    ldc: usize,
    alpha: f32,
    beta: f32,
    ops: &[PostOp<'_, f32>],
    row0: usize,
    col0: usize,
    last_k: bool,
) {
    let mut j = 0;
    while n - j >= 16 {
        tile_x16::<ROWS>(
            k,
            a_row,
            rs_a,
            cs_a,
            b.ptr.add(j),
            b.rs,
            c.add(j),
            ldc,
            alpha,
            beta,
            ops,
            row0,
            col0 + j,
            last_k,
        );
        j += 16;
    }
    if n - j >= 8 {
        tile_x8::<ROWS>(
            k,
            a_row,
            rs_a,
            cs_a,
            b.ptr.add(j),
            b.rs,
            c.add(j),
            ldc,
            alpha,
            beta,
            ops,
            row0,
            col0 + j,
            last_k,
        );
        j += 8;
    }
    for width in [4, 2, 1] {
        if n - j >= width {
            scalar_tile::<ROWS>(
                width,
                k,
                a_row,
                rs_a,
                cs_a,
                b.ptr.add(j),
                b.rs,
                c.add(j),
                ldc,
                alpha,
                beta,
                ops,
                row0,
                col0 + j,
                last_k,
            );
            j += width;
        }
    }
}

/// Full-width tile: ROWS x 16, two YMM accumulators per row.
#[inline(always)]
#[allow(clippy::too_many_arguments)]
unsafe fn tile_x16<const ROWS: usize>(
    k: usize,
    a_row: *const f32,
    rs_a: usize,
    cs_a: usize,
    b_ptr: *const f32,
    rs_b: usize,
    c: *mut f32,
    ldc: usize,
    alpha: f32,
    beta: f32,
    ops: &[PostOp<'_, f32>],
    row0: usize,
    col0: usize,
    last_k: bool,
) {
    let mut lo = [_mm256_setzero_ps(); ROWS];
    let mut hi = [_mm256_setzero_ps(); ROWS];

    for kk in 0..k {
        let bk = b_ptr.add(kk * rs_b);
        let b_lo = _mm256_loadu_ps(bk);
        let b_hi = _mm256_loadu_ps(bk.add(8));
        for r in 0..ROWS {
            let av = _mm256_set1_ps(*a_row.add(r * rs_a + kk * cs_a));
            lo[r] = _mm256_fmadd_ps(av, b_lo, lo[r]);
            hi[r] = _mm256_fmadd_ps(av, b_hi, hi[r]);
        }
    }

    let va = _mm256_set1_ps(alpha);
    for r in 0..ROWS {
        lo[r] = _mm256_mul_ps(lo[r], va);
        hi[r] = _mm256_mul_ps(hi[r], va);
    }

    if beta != 0.0 {
        let vb = _mm256_set1_ps(beta);
        for r in 0..ROWS {
            let crow = c.add(r * ldc);
            lo[r] = _mm256_fmadd_ps(vb, _mm256_loadu_ps(crow), lo[r]);
            hi[r] = _mm256_fmadd_ps(vb, _mm256_loadu_ps(crow.add(8)), hi[r]);
        }
    }

    if last_k {
        for op in ops {
            match *op {
                PostOp::Disable => break,
                PostOp::Bias { values, axis } => match axis {
                    BiasAxis::Col => {
                        let b_lo = _mm256_loadu_ps(values.as_ptr().add(col0));
                        let b_hi = _mm256_loadu_ps(values.as_ptr().add(col0 + 8));
                        for r in 0..ROWS {
                            lo[r] = _mm256_add_ps(lo[r], b_lo);
                            hi[r] = _mm256_add_ps(hi[r], b_hi);
                        }
                    }
                    BiasAxis::Row => {
                        for r in 0..ROWS {
                            let bv = _mm256_set1_ps(values[row0 + r]);
                            lo[r] = _mm256_add_ps(lo[r], bv);
                            hi[r] = _mm256_add_ps(hi[r], bv);
                        }
                    }
                },
                PostOp::Relu => {
                    let zero = _mm256_setzero_ps();
                    for r in 0..ROWS {
                        lo[r] = _mm256_max_ps(lo[r], zero);
                        hi[r] = _mm256_max_ps(hi[r], zero);
                    }
                }
                PostOp::ReluScale(scale) => {
                    let zero = _mm256_setzero_ps();
                    let vs = _mm256_set1_ps(scale);
                    for r in 0..ROWS {
                        let neg_lo = _mm256_cmp_ps::<_CMP_LT_OQ>(lo[r], zero);
                        let neg_hi = _mm256_cmp_ps::<_CMP_LT_OQ>(hi[r], zero);
                        lo[r] = _mm256_blendv_ps(lo[r], _mm256_mul_ps(lo[r], vs), neg_lo);
                        hi[r] = _mm256_blendv_ps(hi[r], _mm256_mul_ps(hi[r], vs), neg_hi);
                    }
                }
                PostOp::GeluTanh => {
                    for r in 0..ROWS {
                        map_pair(&mut lo[r], &mut hi[r], postops::gelu_tanh_f32);
                    }
                }
                PostOp::GeluErf => {
                    for r in 0..ROWS {
                        map_pair(&mut lo[r], &mut hi[r], postops::gelu_erf_f32);
                    }
                }
                PostOp::Clip { min, max } => {
                    let vmin = _mm256_set1_ps(min);
                    let vmax = _mm256_set1_ps(max);
                    for r in 0..ROWS {
                        lo[r] = _mm256_min_ps(_mm256_max_ps(lo[r], vmin), vmax);
                        hi[r] = _mm256_min_ps(_mm256_max_ps(hi[r], vmin), vmax);
                    }
                }
            }
        }
    }

    for r in 0..ROWS {
        let crow = c.add(r * ldc);
        _mm256_storeu_ps(crow, lo[r]);
        _mm256_storeu_ps(crow.add(8), hi[r]);
    }
}

/// Half-width tile: ROWS x 8, one YMM accumulator per row.
#[inline(always)]
#[allow(clippy::too_many_arguments)]
unsafe fn tile_x8<const ROWS: usize>(
    k: usize,
    a_row: *const f32,
    rs_a: usize,
    cs_a: usize,
    b_ptr: *const f32,
    rs_b: usize,
    c: *mut f32,
    ldc: usize,
    alpha: f32,
    beta: f32,
    ops: &[PostOp<'_, f32>],
    row0: usize,
    col0: usize,
    last_k: bool,
) {
    let mut acc = [_mm256_setzero_ps(); ROWS];

    for kk in 0..k {
        let bv = _mm256_loadu_ps(b_ptr.add(kk * rs_b));
        for r in 0..ROWS {
            let av = _mm256_set1_ps(*a_row.add(r * rs_a + kk * cs_a));
            acc[r] = _mm256_fmadd_ps(av, bv, acc[r]);
        }
    }

    let va = _mm256_set1_ps(alpha);
    for r in 0..ROWS {
        acc[r] = _mm256_mul_ps(acc[r], va);
    }

    if beta != 0.0 {
        let vb = _mm256_set1_ps(beta);
        for r in 0..ROWS {
            acc[r] = _mm256_fmadd_ps(vb, _mm256_loadu_ps(c.add(r * ldc)), acc[r]);
        }
    }

    if last_k {
        for op in ops {
            match *op {
                PostOp::Disable => break,
                PostOp::Bias { values, axis } => match axis {
                    BiasAxis::Col => {
                        let bv = _mm256_loadu_ps(values.as_ptr().add(col0));
                        for r in 0..ROWS {
                            acc[r] = _mm256_add_ps(acc[r], bv);
                        }
                    }
                    BiasAxis::Row => {
                        for r in 0..ROWS {
                            let bv = _mm256_set1_ps(values[row0 + r]);
                            acc[r] = _mm256_add_ps(acc[r], bv);
                        }
                    }
                },
                PostOp::Relu => {
                    let zero = _mm256_setzero_ps();
                    for r in 0..ROWS {
                        acc[r] = _mm256_max_ps(acc[r], zero);
                    }
                }
                PostOp::ReluScale(scale) => {
                    let zero = _mm256_setzero_ps();
                    let vs = _mm256_set1_ps(scale);
                    for r in 0..ROWS {
                        let neg = _mm256_cmp_ps::<_CMP_LT_OQ>(acc[r], zero);
                        acc[r] = _mm256_blendv_ps(acc[r], _mm256_mul_ps(acc[r], vs), neg);
                    }
                }
                PostOp::GeluTanh => {
                    for r in 0..ROWS {
                        map_one(&mut acc[r], postops::gelu_tanh_f32);
                    }
                }
                PostOp::GeluErf => {
                    for r in 0..ROWS {
                        map_one(&mut acc[r], postops::gelu_erf_f32);
                    }
                }
                PostOp::Clip { min, max } => {
                    let vmin = _mm256_set1_ps(min);
                    let vmax = _mm256_set1_ps(max);
                    for r in 0..ROWS {
                        acc[r] = _mm256_min_ps(_mm256_max_ps(acc[r], vmin), vmax);
                    }
                }
            }
        }
    }

    for r in 0..ROWS {
        _mm256_storeu_ps(c.add(r * ldc), acc[r]);
    }
}

/// Narrow widths (4, 2, 1): scalar math sharing the pipeline handlers.
#[inline(always)]
#[allow(clippy::too_many_arguments)]
unsafe fn scalar_tile<const ROWS: usize>(
    cols: usize,
    k: usize,
    a_row: *const f32,
    rs_a: usize,
    cs_a: usize,
    b_ptr: *const f32,
    rs_b: usize,
    c: *mut f32,
    ldc: usize,
    alpha: f32,
    beta: f32,
    ops: &[PostOp<'_, f32>],
    row0: usize,
    col0: usize,
    last_k: bool,
) {
    for r in 0..ROWS {
        for j in 0..cols {
            let mut acc = 0.0f32;
            for kk in 0..k {
                let av = *a_row.add(r * rs_a + kk * cs_a);
                let bv = *b_ptr.add(kk * rs_b + j);
                acc = av.mul_add(bv, acc);
            }
            acc *= alpha;
            let cp = c.add(r * ldc + j);
            if beta != 0.0 {
                acc = beta.mul_add(*cp, acc);
            }
            if last_k {
                acc = postops::apply(acc, ops, row0 + r, col0 + j);
            }
            *cp = acc;
        }
    }
}

/// Spill two accumulators, map a scalar function, reload.
#[inline(always)]
unsafe fn map_pair(lo: &mut __m256, hi: &mut __m256, f: impl Fn(f32) -> f32) {
    let mut buf = [0.0f32; 16];
    _mm256_storeu_ps(buf.as_mut_ptr(), *lo);
    _mm256_storeu_ps(buf.as_mut_ptr().add(8), *hi);
    for v in &mut buf {
        *v = f(*v);
    }
    *lo = _mm256_loadu_ps(buf.as_ptr());
    *hi = _mm256_loadu_ps(buf.as_ptr().add(8));
}

#[inline(always)]
unsafe fn map_one(acc: &mut __m256, f: impl Fn(f32) -> f32) {
    let mut buf = [0.0f32; 8];
    _mm256_storeu_ps(buf.as_mut_ptr(), *acc);
    for v in &mut buf {
        *v = f(*v);
    }
    *acc = _mm256_loadu_ps(buf.as_ptr());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::reference;

    fn avx2_available() -> bool {
        is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma")
    }

    fn lcg_fill(buf: &mut [f32], seed: &mut u64) {
        for v in buf.iter_mut() {
            *seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            *v = ((*seed >> 33) as i32 % 1000) as f32 / 250.0 - 2.0;
        }
    }

    fn run_pair(
        m: usize,
        n: usize,
        k: usize,
        alpha: f32,
        beta: f32,
        ops: &[PostOp<'_, f32>],
    ) -> (Vec<f32>, Vec<f32>) {
        let mut seed = 0x5eed_0000 + (m * 31 + n * 7 + k) as u64;
        let mut a = vec![0.0f32; m * k];
        let mut b = vec![0.0f32; k * n];
        let mut c0 = vec![0.0f32; m * n];
        lcg_fill(&mut a, &mut seed);
        lcg_fill(&mut b, &mut seed);
        lcg_fill(&mut c0, &mut seed);

        let mut c_simd = c0.clone();
        let mut c_ref = c0;
        let ap = APanel {
            ptr: a.as_ptr(),
            rs: k,
            cs: 1,
            ps: MR * k,
        };
        let bp = BPanel {
            ptr: b.as_ptr(),
            rs: n,
            cs: 1,
        };
        let cur = PostOpCursor {
            row: 0,
            col: 0,
            last_k: true,
        };
        unsafe {
            block_kernel_f32(m, n, k, ap, bp, c_simd.as_mut_ptr(), n, alpha, beta, ops, cur);
            reference::block_kernel::<MR, f32, f32, f32, f32>(
                m,
                n,
                k,
                ap,
                bp,
                c_ref.as_mut_ptr(),
                n,
                alpha,
                beta,
                ops,
                cur,
            );
        }
        (c_simd, c_ref)
    }

    fn assert_close(a: &[f32], b: &[f32], tol: f32) {
        for (i, (x, y)) in a.iter().zip(b).enumerate() {
            assert!(
                (x - y).abs() <= tol * (1.0 + y.abs()),
                "element {i}: {x} vs {y}"
            );
        }
    }

    #[test]
    fn full_tile_matches_reference() {
        if !avx2_available() {
            return;
        }
        let (simd, refr) = run_pair(6, 16, 64, 1.5, 0.5, &[]);
        assert_close(&simd, &refr, 1e-4);
    }

    #[test]
    fn all_row_and_col_fringes_match_reference() {
        if !avx2_available() {
            return;
        }
        for m in 1..=13 {
            for n in 1..=17 {
                let (simd, refr) = run_pair(m, n, 24, 1.0, 1.0, &[]);
                assert_close(&simd, &refr, 1e-4);
            }
        }
    }

    #[test]
    fn eight_plus_two_chain() {
        if !avx2_available() {
            return;
        }
        // n = 10 exercises the 8-wide vector tile followed by the
        // 2-wide scalar tile
        let (simd, refr) = run_pair(6, 10, 32, 2.0, 0.0, &[]);
        assert_close(&simd, &refr, 1e-4);
    }

    #[test]
    fn vector_postops_match_scalar_handlers() {
        if !avx2_available() {
            return;
        }
        let bias: Vec<f32> = (0..16).map(|j| j as f32 * 0.25 - 2.0).collect();
        let ops = [
            PostOp::Bias {
                values: &bias,
                axis: BiasAxis::Col,
            },
            PostOp::ReluScale(0.1),
            PostOp::GeluTanh,
            PostOp::Clip {
                min: -1.0,
                max: 1.0,
            },
        ];
        let (simd, refr) = run_pair(6, 16, 40, 1.0, 0.5, &ops);
        assert_close(&simd, &refr, 1e-4);
        let (simd, refr) = run_pair(5, 16, 40, 1.0, 0.5, &ops);
        assert_close(&simd, &refr, 1e-4);
    }

    #[test]
    fn gelu_erf_vector_path() {
        if !avx2_available() {
            return;
        }
        let (simd, refr) = run_pair(6, 16, 16, 0.5, 0.0, &[PostOp::GeluErf]);
        assert_close(&simd, &refr, 1e-4);
    }
}
