//! Fused post-operation pipeline.
//!
//! A pipeline is an ordered slice of [`PostOp`] nodes applied to the
//! accumulator of each output element after the `alpha*A*B + beta*C`
//! update, in slice order, stopping at the first [`PostOp::Disable`].
//! The pipeline runs only on the final KC partition of the K loop,
//! gated by [`PostOpCursor::last_k`].
//!
//! The scalar handlers on [`Accumulator`] are the single definition of
//! each node's semantics. The portable kernels and the narrow widths of
//! the SIMD family call [`apply`] directly; the wide SIMD paths
//! re-express bias/relu/relu-scale/clip in registers and fall back to
//! the scalar handlers (via spill and reload) for the two GELU
//! approximations.

/// Axis a bias vector runs along.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiasAxis {
    /// One bias value per output column (the usual case).
    Col,
    /// One bias value per output row, for transposed output layouts.
    Row,
}

/// One node of the post-op pipeline, over the accumulator scalar `A`.
#[derive(Debug, Clone, Copy)]
pub enum PostOp<'a, A> {
    /// Sentinel: stop processing the pipeline here.
    Disable,
    /// Add `values[col]` (or `values[row]` for [`BiasAxis::Row`]).
    Bias { values: &'a [A], axis: BiasAxis },
    /// `max(x, 0)`.
    Relu,
    /// Leaky relu: negative inputs are multiplied by the scale.
    ReluScale(A),
    /// GELU, tanh approximation.
    GeluTanh,
    /// GELU, erf formulation.
    GeluErf,
    /// Clamp to `[min, max]`.
    Clip { min: A, max: A },
}

/// Output-space position of the element a kernel is about to store,
/// plus the last-K gate. The driver seeds `row`/`col` with the block
/// origin; kernels add their local offsets.
#[derive(Debug, Clone, Copy)]
pub struct PostOpCursor {
    pub row: usize,
    pub col: usize,
    pub last_k: bool,
}

/// Accumulator scalars the engine computes in: `f32` for the float
/// paths, `i32` for every integer path.
pub trait Accumulator: Copy + PartialEq + PartialOrd {
    const ZERO: Self;
    const ONE: Self;

    fn add(self, rhs: Self) -> Self;
    fn mul(self, rhs: Self) -> Self;

    fn relu(self) -> Self;
    fn relu_scale(self, scale: Self) -> Self;
    fn clip(self, min: Self, max: Self) -> Self;
    fn gelu_tanh(self) -> Self;
    fn gelu_erf(self) -> Self;
}

impl Accumulator for f32 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;

    #[inline(always)]
    fn add(self, rhs: Self) -> Self {
        self + rhs
    }

    #[inline(always)]
    fn mul(self, rhs: Self) -> Self {
        self * rhs
    }

    #[inline(always)]
    fn relu(self) -> Self {
        self.max(0.0)
    }

    #[inline(always)]
    fn relu_scale(self, scale: Self) -> Self {
        if self < 0.0 {
            self * scale
        } else {
            self
        }
    }

    #[inline(always)]
    fn clip(self, min: Self, max: Self) -> Self {
        self.max(min).min(max)
    }

    #[inline(always)]
    fn gelu_tanh(self) -> Self {
        gelu_tanh_f32(self)
    }

    #[inline(always)]
    fn gelu_erf(self) -> Self {
        gelu_erf_f32(self)
    }
}

impl Accumulator for i32 {
    const ZERO: Self = 0;
    const ONE: Self = 1;

    #[inline(always)]
    fn add(self, rhs: Self) -> Self {
        self.wrapping_add(rhs)
    }

    #[inline(always)]
    fn mul(self, rhs: Self) -> Self {
        self.wrapping_mul(rhs)
    }

    #[inline(always)]
    fn relu(self) -> Self {
        self.max(0)
    }

    #[inline(always)]
    fn relu_scale(self, scale: Self) -> Self {
        if self < 0 {
            self.wrapping_mul(scale)
        } else {
            self
        }
    }

    #[inline(always)]
    fn clip(self, min: Self, max: Self) -> Self {
        self.clamp(min, max)
    }

    // Integer accumulators route GELU through f32, rounding to nearest
    // on the way back.
    #[inline(always)]
    fn gelu_tanh(self) -> Self {
        gelu_tanh_f32(self as f32).round() as i32
    }

    #[inline(always)]
    fn gelu_erf(self) -> Self {
        gelu_erf_f32(self as f32).round() as i32
    }
}

/// `0.5 * x * (1 + tanh(sqrt(2/pi) * (x + 0.044715 * x^3)))`
#[inline(always)]
pub(crate) fn gelu_tanh_f32(x: f32) -> f32 {
    const SQRT_2_OVER_PI: f32 = 0.797_884_6;
    const COEF: f32 = 0.044_715;
    let inner = SQRT_2_OVER_PI * (x + COEF * x * x * x);
    0.5 * x * (1.0 + inner.tanh())
}

/// `0.5 * x * (1 + erf(x / sqrt(2)))`
#[inline(always)]
pub(crate) fn gelu_erf_f32(x: f32) -> f32 {
    const FRAC_1_SQRT_2: f32 = std::f32::consts::FRAC_1_SQRT_2;
    0.5 * x * (1.0 + erf_f32(x * FRAC_1_SQRT_2))
}

/// erf via the Abramowitz & Stegun 7.1.26 rational approximation
/// (max absolute error about 1.5e-7, well inside f32 noise for GEMM
/// outputs).
#[inline(always)]
pub(crate) fn erf_f32(x: f32) -> f32 {
    const A1: f32 = 0.254_829_592;
    const A2: f32 = -0.284_496_736;
    const A3: f32 = 1.421_413_741;
    const A4: f32 = -1.453_152_027;
    const A5: f32 = 1.061_405_429;
    const P: f32 = 0.327_591_1;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - (((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t) * (-x * x).exp();
    sign * y
}

/// Run the pipeline on one accumulator value at output position
/// `(row, col)`.
#[inline(always)]
pub fn apply<A: Accumulator>(mut v: A, ops: &[PostOp<'_, A>], row: usize, col: usize) -> A {
    for op in ops {
        match *op {
            PostOp::Disable => break,
            PostOp::Bias { values, axis } => {
                let idx = match axis {
                    BiasAxis::Col => col,
                    BiasAxis::Row => row,
                };
                v = v.add(values[idx]);
            }
            PostOp::Relu => v = v.relu(),
            PostOp::ReluScale(scale) => v = v.relu_scale(scale),
            PostOp::GeluTanh => v = v.gelu_tanh(),
            PostOp::GeluErf => v = v.gelu_erf(),
            PostOp::Clip { min, max } => v = v.clip(min, max),
        }
    }
    v
}
