//! Kernel registry: one immutable table per ISA tier mapping every
//! datatype combination to its kernel and pack handles plus derived
//! blocking sizes.
//!
//! The process-wide registry is built once for the detected tier and
//! cached in a `OnceLock`; [`Registry::for_tier`] builds a table for an
//! explicit tier so lower tiers stay testable on wider machines.
//!
//! Tier coverage mirrors the hardware reality the engine targets: the
//! AVX-512 tiers carry every combination (low-precision ones through
//! the portable kernels), the AVX2 tier drops the 32-bit-accumulator
//! integer paths and bf16, and `Generic` keeps only f32. Resolving an
//! absent entry is the engine's one recoverable error; nothing ever
//! calls through a missing handle.

use std::sync::OnceLock;

use half::bf16;

use crate::cache_params::{self, BlockSizes};
use crate::error::{LpgemmError, LpgemmResult};
use crate::isa::{detect_isa_tier, IsaTier};
use crate::kernels::{reference, BlockKernel};
use crate::packing::{pack_a_panels, pack_b_panels, PackAFn, PackBFn};
use crate::types::Operand;

/// Supported datatype combinations, named A-type / B-type / C-type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpType {
    /// f32 x f32 -> f32, f32 accumulation.
    F32F32F32,
    /// u8 x i8 -> i16, i32 accumulation, saturating store.
    U8S8S16,
    /// i8 x i8 -> i16, i32 accumulation, saturating store.
    S8S8S16,
    /// u8 x i8 -> i32, i32 accumulation.
    U8S8S32,
    /// i8 x i8 -> i32, i32 accumulation.
    S8S8S32,
    /// bf16 x bf16 -> f32, f32 accumulation.
    Bf16Bf16F32,
}

impl OpType {
    pub const ALL: [OpType; 6] = [
        OpType::F32F32F32,
        OpType::U8S8S16,
        OpType::S8S8S16,
        OpType::U8S8S32,
        OpType::S8S8S32,
        OpType::Bf16Bf16F32,
    ];
}

/// Handles for one datatype combination: the block kernel plus the
/// optional pack handles (`None` means the operand is consumed in
/// place).
#[derive(Clone, Copy)]
pub struct TypedHandles<TA, TB, TC, ACC> {
    pub kernel: BlockKernel<TA, TB, TC, ACC>,
    pub pack_a: Option<PackAFn<TA>>,
    pub pack_b: Option<PackBFn<TB>>,
}

/// Type-erased union of per-combination handles.
#[derive(Clone, Copy)]
pub enum OpHandles {
    F32F32F32(TypedHandles<f32, f32, f32, f32>),
    U8S8S16(TypedHandles<u8, i8, i16, i32>),
    S8S8S16(TypedHandles<i8, i8, i16, i32>),
    U8S8S32(TypedHandles<u8, i8, i32, i32>),
    S8S8S32(TypedHandles<i8, i8, i32, i32>),
    Bf16Bf16F32(TypedHandles<bf16, bf16, f32, f32>),
}

macro_rules! for_each_handles {
    ($handles:expr, $h:ident => $body:expr) => {
        match $handles {
            OpHandles::F32F32F32($h) => $body,
            OpHandles::U8S8S16($h) => $body,
            OpHandles::S8S8S16($h) => $body,
            OpHandles::U8S8S32($h) => $body,
            OpHandles::S8S8S32($h) => $body,
            OpHandles::Bf16Bf16F32($h) => $body,
        }
    };
}

/// One resolved registry entry: blocking sizes and handles for a
/// datatype combination on the registry's tier.
pub struct KernelContext {
    pub op: OpType,
    pub blocking: BlockSizes,
    pub handles: OpHandles,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum KernelClass {
    Simd,
    Reference,
    Unsupported,
}

fn class_for(tier: IsaTier, op: OpType) -> KernelClass {
    use IsaTier::*;
    use OpType::*;
    match tier {
        Avx512VnniBf16 | Avx512Vnni | Avx512 => match op {
            F32F32F32 => KernelClass::Simd,
            _ => KernelClass::Reference,
        },
        Avx2 => match op {
            F32F32F32 => KernelClass::Simd,
            U8S8S16 | S8S8S16 => KernelClass::Reference,
            U8S8S32 | S8S8S32 | Bf16Bf16F32 => KernelClass::Unsupported,
        },
        Generic => match op {
            F32F32F32 => KernelClass::Reference,
            _ => KernelClass::Unsupported,
        },
    }
}

/// Micro-tile geometry per combination. The low-precision tiles are
/// wider because their packed operands are narrower and the same L1
/// strip budget covers more columns.
fn tile_shape(op: OpType) -> (usize, usize) {
    match op {
        OpType::F32F32F32 => (6, 16),
        OpType::U8S8S16 | OpType::S8S8S16 => (6, 32),
        OpType::U8S8S32 | OpType::S8S8S32 => (6, 64),
        OpType::Bf16Bf16F32 => (6, 64),
    }
}

/// Size of the widest packed operand element, for the cache budgets.
fn packed_elem_bytes(op: OpType) -> usize {
    match op {
        OpType::F32F32F32 => 4,
        OpType::Bf16Bf16F32 => 2,
        _ => 1,
    }
}

fn f32_kernel(class: KernelClass) -> BlockKernel<f32, f32, f32, f32> {
    match class {
        #[cfg(target_arch = "x86_64")]
        KernelClass::Simd => crate::kernels::f32_avx2::block_kernel_f32,
        _ => reference::block_kernel::<6, f32, f32, f32, f32>,
    }
}

fn build_context(tier: IsaTier, op: OpType) -> Option<KernelContext> {
    let class = class_for(tier, op);
    if class == KernelClass::Unsupported {
        return None;
    }
    let (mr, nr) = tile_shape(op);
    let blocking = cache_params::block_sizes(mr, nr, packed_elem_bytes(op));

    // Pack handles follow the operand layouts the kernels expect: B is
    // packed for every low-precision combination, A only where the
    // 32-bit output paths reread it across column blocks; f32 streams
    // both operands in place.
    let handles = match op {
        OpType::F32F32F32 => OpHandles::F32F32F32(TypedHandles {
            kernel: f32_kernel(class),
            pack_a: None,
            pack_b: None,
        }),
        OpType::U8S8S16 => OpHandles::U8S8S16(TypedHandles {
            kernel: reference::block_kernel::<6, u8, i8, i16, i32>,
            pack_a: None,
            pack_b: Some(pack_b_panels::<i8> as PackBFn<i8>),
        }),
        OpType::S8S8S16 => OpHandles::S8S8S16(TypedHandles {
            kernel: reference::block_kernel::<6, i8, i8, i16, i32>,
            pack_a: None,
            pack_b: Some(pack_b_panels::<i8> as PackBFn<i8>),
        }),
        OpType::U8S8S32 => OpHandles::U8S8S32(TypedHandles {
            kernel: reference::block_kernel::<6, u8, i8, i32, i32>,
            pack_a: Some(pack_a_panels::<u8> as PackAFn<u8>),
            pack_b: Some(pack_b_panels::<i8> as PackBFn<i8>),
        }),
        OpType::S8S8S32 => OpHandles::S8S8S32(TypedHandles {
            kernel: reference::block_kernel::<6, i8, i8, i32, i32>,
            pack_a: Some(pack_a_panels::<i8> as PackAFn<i8>),
            pack_b: Some(pack_b_panels::<i8> as PackBFn<i8>),
        }),
        OpType::Bf16Bf16F32 => OpHandles::Bf16Bf16F32(TypedHandles {
            kernel: reference::block_kernel::<6, bf16, bf16, f32, f32>,
            pack_a: None,
            pack_b: Some(pack_b_panels::<bf16> as PackBFn<bf16>),
        }),
    };

    Some(KernelContext {
        op,
        blocking,
        handles,
    })
}

/// Immutable kernel table for one ISA tier.
pub struct Registry {
    tier: IsaTier,
    entries: [Option<KernelContext>; 6],
}

impl Registry {
    /// Build the table for an explicit tier. The global registry uses
    /// the detected tier; tests use this to reach lower tiers.
    pub fn for_tier(tier: IsaTier) -> Self {
        Self {
            tier,
            entries: OpType::ALL.map(|op| build_context(tier, op)),
        }
    }

    pub fn tier(&self) -> IsaTier {
        self.tier
    }

    /// Look up the context for a datatype combination.
    pub fn resolve(&self, op: OpType) -> LpgemmResult<&KernelContext> {
        self.entries[op as usize]
            .as_ref()
            .ok_or(LpgemmError::UnsupportedKernel {
                op,
                tier: self.tier,
            })
    }
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// The process-wide registry for the detected ISA tier.
pub fn global() -> &'static Registry {
    REGISTRY.get_or_init(|| Registry::for_tier(detect_isa_tier()))
}

/// Resolve a combination against the process-wide registry.
pub fn resolve(op: OpType) -> LpgemmResult<&'static KernelContext> {
    global().resolve(op)
}

/// Cache-blocking sizes `(MC, NC, KC)` for a combination.
pub fn get_block_sizes(op: OpType) -> LpgemmResult<(usize, usize, usize)> {
    let ctx = resolve(op)?;
    Ok((ctx.blocking.mc, ctx.blocking.nc, ctx.blocking.kc))
}

/// Micro-tile shape `(MR, NR)` for a combination.
pub fn get_micro_tile_shape(op: OpType) -> LpgemmResult<(usize, usize)> {
    let ctx = resolve(op)?;
    Ok((ctx.blocking.mr, ctx.blocking.nr))
}

/// Packed `(row_stride, col_stride)` of an operand, or `None` when the
/// operand is consumed in place with its caller-provided strides.
pub fn get_pack_strides(ctx: &KernelContext, operand: Operand) -> Option<(usize, usize)> {
    let packed = for_each_handles!(&ctx.handles, h => match operand {
        Operand::A => h.pack_a.is_some(),
        Operand::B => h.pack_b.is_some(),
    });
    if !packed {
        return None;
    }
    match operand {
        Operand::A => Some((1, ctx.blocking.mr)),
        Operand::B => Some((ctx.blocking.nr, 1)),
    }
}
