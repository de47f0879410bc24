//! Operand packing into contiguous micro-panel layouts.
//!
//! Packing copies one cache block of a source matrix into driver
//! scratch, reordered so the micro-kernel's inner loop walks unit
//! strides:
//!
//! - A blocks become MR-row panels stored column-major within the
//!   panel: element `(r, k)` at `(r / mr) * (mr * kc) + k * mr + r % mr`.
//! - B blocks become NR-column panels stored row-major within the
//!   panel: element `(k, j)` at `(j / nr) * (kc * nr) + k * nr + j % nr`.
//!
//! Edge panels are zero-padded to the full MR/NR width so kernels never
//! branch on panel interior bounds; padded lanes fall in the fringe
//! region the store path masks off anyway, and zeros keep the padded
//! multiply-accumulates inert.

/// Signature of an A-side pack handle: copy an `m x k` row-major block
/// (leading dimension `ld`) into `dst` as MR-row panels. `dst` must
/// hold `ceil(m / mr) * mr * k` elements.
pub type PackAFn<T> = unsafe fn(src: *const T, ld: usize, m: usize, k: usize, mr: usize, dst: *mut T);

/// Signature of a B-side pack handle: copy a `k x n` row-major block
/// (leading dimension `ld`) into `dst` as NR-column panels. `dst` must
/// hold `ceil(n / nr) * nr * k` elements.
pub type PackBFn<T> = unsafe fn(src: *const T, ld: usize, k: usize, n: usize, nr: usize, dst: *mut T);

/// Number of elements a packed A block occupies.
#[inline]
pub fn packed_a_len(m: usize, k: usize, mr: usize) -> usize {
    m.div_ceil(mr) * mr * k
}

/// Number of elements a packed B block occupies.
#[inline]
pub fn packed_b_len(k: usize, n: usize, nr: usize) -> usize {
    n.div_ceil(nr) * nr * k
}

/// Pack an A block into MR-row panels.
///
/// # Safety
/// `src` must cover `m` rows of `ld >= k` elements; `dst` must have
/// room for [`packed_a_len`] elements.
pub unsafe fn pack_a_panels<T: Copy + Default>(
    src: *const T,
    ld: usize,
    m: usize,
    k: usize,
    mr: usize,
    dst: *mut T,
) {
    let panel_len = mr * k;
    let mut g = 0;
    let mut r0 = 0;
    while r0 < m {
        let rows = mr.min(m - r0);
        let panel = dst.add(g * panel_len);
        for kk in 0..k {
            for r in 0..rows {
                *panel.add(kk * mr + r) = *src.add((r0 + r) * ld + kk);
            }
            for r in rows..mr {
                *panel.add(kk * mr + r) = T::default();
            }
        }
        g += 1;
        r0 += mr;
    }
}

/// Pack a B block into NR-column panels.
///
/// # Safety
/// `src` must cover `k` rows of `ld` elements reaching column `n`;
/// `dst` must have room for [`packed_b_len`] elements.
pub unsafe fn pack_b_panels<T: Copy + Default>(
    src: *const T,
    ld: usize,
    k: usize,
    n: usize,
    nr: usize,
    dst: *mut T,
) {
    let panel_len = k * nr;
    let mut g = 0;
    let mut j0 = 0;
    while j0 < n {
        let cols = nr.min(n - j0);
        let panel = dst.add(g * panel_len);
        for kk in 0..k {
            for j in 0..cols {
                *panel.add(kk * nr + j) = *src.add(kk * ld + j0 + j);
            }
            for j in cols..nr {
                *panel.add(kk * nr + j) = T::default();
            }
        }
        g += 1;
        j0 += nr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_a_layout_and_padding() {
        // 4x3 block, mr = 3: one full panel and one padded single-row panel
        let src: Vec<i8> = (0..12).collect();
        let mut dst = vec![99i8; packed_a_len(4, 3, 3)];
        unsafe { pack_a_panels(src.as_ptr(), 3, 4, 3, 3, dst.as_mut_ptr()) };
        // panel 0, k-major, 3 rows per k
        assert_eq!(&dst[..9], &[0, 3, 6, 1, 4, 7, 2, 5, 8]);
        // panel 1: row 3 plus two zero-padded rows
        assert_eq!(&dst[9..], &[9, 0, 0, 10, 0, 0, 11, 0, 0]);
    }

    #[test]
    fn pack_b_layout_and_padding() {
        // 2x5 block, nr = 4: full panel then a 1-column padded panel
        let src: Vec<i16> = (0..10).collect();
        let mut dst = vec![-1i16; packed_b_len(2, 5, 4)];
        unsafe { pack_b_panels(src.as_ptr(), 5, 2, 5, 4, dst.as_mut_ptr()) };
        assert_eq!(&dst[..8], &[0, 1, 2, 3, 5, 6, 7, 8]);
        assert_eq!(&dst[8..], &[4, 0, 0, 0, 9, 0, 0, 0]);
    }

    #[test]
    fn pack_b_respects_leading_dimension() {
        // source is a 2x6 matrix, pack only its left 2x3 sub-block
        let src: Vec<u8> = (0..12).collect();
        let mut dst = vec![0u8; packed_b_len(2, 3, 4)];
        unsafe { pack_b_panels(src.as_ptr(), 6, 2, 3, 4, dst.as_mut_ptr()) };
        assert_eq!(&dst[..], &[0, 1, 2, 0, 6, 7, 8, 0]);
    }
}
