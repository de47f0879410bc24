//! Runtime ISA tier detection.
//!
//! The engine selects one kernel table per process based on the highest
//! instruction-set tier the CPU supports. The probe runs once; the result
//! is cached in a `OnceLock` and never re-evaluated mid-run.

use std::sync::OnceLock;

/// ISA capability tiers, highest first.
///
/// Tier boundaries follow the kernel table granularity: VNNI and BF16
/// extensions unlock the wide low-precision tables, plain AVX-512 and
/// AVX2 carry progressively smaller ones, and `Generic` means no usable
/// vector extension (portable reference kernels only).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsaTier {
    /// Server-class AVX-512 with both VNNI and BF16 (Zen4 / Genoa class).
    Avx512VnniBf16,
    /// AVX-512 with VNNI (Icelake class).
    Avx512Vnni,
    /// Baseline AVX-512 (Skylake-X class).
    Avx512,
    /// AVX2 + FMA (Haswell / Milan class).
    Avx2,
    /// No vector extension the engine targets.
    Generic,
}

static ISA_TIER: OnceLock<IsaTier> = OnceLock::new();

/// Returns the ISA tier for this process, probing the CPU on first call.
pub fn detect_isa_tier() -> IsaTier {
    *ISA_TIER.get_or_init(probe_isa_tier)
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
fn probe_isa_tier() -> IsaTier {
    if is_x86_feature_detected!("avx512f")
        && is_x86_feature_detected!("avx512vnni")
        && is_x86_feature_detected!("avx512bf16")
    {
        IsaTier::Avx512VnniBf16
    } else if is_x86_feature_detected!("avx512f") && is_x86_feature_detected!("avx512vnni") {
        IsaTier::Avx512Vnni
    } else if is_x86_feature_detected!("avx512f") {
        IsaTier::Avx512
    } else if is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma") {
        IsaTier::Avx2
    } else {
        IsaTier::Generic
    }
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
fn probe_isa_tier() -> IsaTier {
    IsaTier::Generic
}
