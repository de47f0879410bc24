//! lpgemm-kernels: cache-blocked low-precision GEMM with fused post-ops.
//!
//! This crate provides row-major GEMM over mixed-precision operand
//! combinations with:
//! - **Runtime ISA Dispatch**: one kernel table per process, selected
//!   from the detected instruction-set tier
//! - **Cache-Aware Blocking**: MC/NC/KC derived from the machine's
//!   L1/L2/L3 sizes, with a narrow-K rebalance
//! - **Fused Post-Ops**: bias, relu, leaky relu, two GELU variants and
//!   clip applied on the accumulators before the store
//! - **Panel Packing**: operands repacked into unit-stride micro-panels
//!   where the datatype combination profits from it
//!
//! # Quick Start
//!
//! ```no_run
//! use lpgemm_kernels::{gemm_f32, PostOp};
//!
//! let (m, n, k) = (128, 128, 128);
//! let a = vec![1.0f32; m * k];
//! let b = vec![1.0f32; k * n];
//! let mut c = vec![0.0f32; m * n];
//! gemm_f32(m, n, k, 1.0, &a, k, &b, n, 0.0, &mut c, n, &[PostOp::Relu])?;
//! # Ok::<(), lpgemm_kernels::LpgemmError>(())
//! ```

pub mod blocking;
pub mod cache_params;
pub mod driver;
pub mod error;
pub mod isa;
pub mod kernels;
pub mod packing;
pub mod postops;
pub mod registry;
pub mod types;

pub use cache_params::{AlignedVec, BlockSizes};
pub use driver::{
    gemm_bf16, gemm_f32, gemm_f32_with_block_sizes, gemm_s8s8s16, gemm_s8s8s32, gemm_u8s8s16,
    gemm_u8s8s32, par_gemm_f32,
};
pub use error::{LpgemmError, LpgemmResult};
pub use isa::{detect_isa_tier, IsaTier};
pub use postops::{BiasAxis, PostOp, PostOpCursor};
pub use registry::{
    get_block_sizes, get_micro_tile_shape, get_pack_strides, resolve, KernelContext, OpType,
    Registry,
};
pub use types::Operand;
