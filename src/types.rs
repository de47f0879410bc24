//! Typed operand views shared by the tiling driver and the kernels.
//!
//! All strides are in elements, never bytes. A view never owns its
//! memory; lifetimes are managed by the driver (source matrices come
//! from the caller, packed panels live in driver scratch for the
//! duration of the block loop).

/// Which operand of the multiply a query refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    A,
    B,
}

/// View of the A operand for one row block, grouped in MR-row panels.
///
/// Element `(r, k)` of the block lives at
/// `ptr + (r / mr) * ps + (r % mr) * rs + k * cs`.
///
/// Packed layout: `rs = 1`, `cs = MR`, `ps = MR * KC`.
/// Identity (unpacked row-major source): `rs = lda`, `cs = 1`,
/// `ps = MR * lda`. The same kernel code walks both.
#[derive(Debug, Clone, Copy)]
pub struct APanel<T> {
    pub ptr: *const T,
    /// Stride between consecutive rows inside one MR group.
    pub rs: usize,
    /// Stride between consecutive k positions.
    pub cs: usize,
    /// Stride between consecutive MR groups.
    pub ps: usize,
}

/// View of the B operand for one NR-wide column chunk.
///
/// Element `(k, j)` lives at `ptr + k * rs + j * cs`.
///
/// Packed layout: `rs = NR`, `cs = 1` (the driver advances the base
/// pointer by `KC * NR` per chunk). Identity: `rs = ldb`, `cs = 1`.
#[derive(Debug, Clone, Copy)]
pub struct BPanel<T> {
    pub ptr: *const T,
    pub rs: usize,
    pub cs: usize,
}
