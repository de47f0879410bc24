//! Per-call blocking plan.
//!
//! The registry derives cache-budget block sizes once per datatype
//! combination ([`crate::cache_params::block_sizes`]); `plan` adapts
//! them to one problem's dimensions. The only reshaping beyond clamping
//! is the narrow-K trade: when `k` is far below KC, the K loop would
//! run a single short partition while the packed A panel used only a
//! sliver of its L2 budget, so KC shrinks to cover `k` exactly and MC
//! regrows within the same A-panel byte budget.

use crate::cache_params::{BlockSizes, KC_ALIGN};

fn round_up(v: usize, q: usize) -> usize {
    v.div_ceil(q) * q
}

/// Clamp the cache-derived `base` sizes to an `m x n x k` problem.
///
/// Infallible; degenerate dimensions yield the all-zero plan (the
/// driver's loops then run zero iterations).
pub fn plan(base: BlockSizes, m: usize, n: usize, k: usize) -> BlockSizes {
    let BlockSizes { mr, nr, .. } = base;
    if m == 0 || n == 0 || k == 0 {
        return BlockSizes {
            mc: 0,
            nc: 0,
            kc: 0,
            mr,
            nr,
        };
    }

    let mut kc = base.kc;
    let mut mc = base.mc;

    if k < base.kc {
        // Narrow K: one partition covering all of k, rounded up to the
        // unroll quantum, and MC regrown within mc*kc elements.
        kc = round_up(k, KC_ALIGN).min(base.kc);
        let budget = base.mc * base.kc;
        mc = (budget / kc) / mr * mr;
    }

    mc = mc.min(round_up(m, mr)).max(mr);
    let nc = base.nc.min(round_up(n, nr)).max(nr);

    BlockSizes { mc, nc, kc, mr, nr }
}
