//! Cache-aware blocking budgets and aligned packing buffers.
//!
//! Detects L1D / L2 / L3 sizes via CPUID (x86) or sysfs (Linux), then
//! derives the three cache-blocking sizes for a given micro-kernel tile
//! shape so that:
//!   - NR * KC * sizeof(elem) fits the L1D budget (B strip streamed by
//!     the micro-kernel inner loop),
//!   - MC * KC * sizeof(elem) fits 80% of L2 (packed A panel),
//!   - NC * KC * sizeof(elem) fits 40% of L3 (shared packed B panel).
//!
//! Cache sizes are probed once and cached in a `OnceLock`.

use std::sync::OnceLock;

/// (L1D bytes, L2 bytes, L3 bytes)
fn detect_cache_sizes() -> (usize, usize, usize) {
    #[cfg(target_arch = "x86_64")]
    {
        if let Some(sizes) = detect_x86_cache() {
            return sizes;
        }
    }
    #[cfg(target_os = "linux")]
    {
        if let Some(sizes) = detect_sysfs_cache() {
            return sizes;
        }
    }
    // Conservative fallback: 32 KB L1D, 512 KB L2, 8 MB L3
    (32 * 1024, 512 * 1024, 8 * 1024 * 1024)
}

#[cfg(target_arch = "x86_64")]
fn detect_x86_cache() -> Option<(usize, usize, usize)> {
    // CPUID leaf 4: deterministic cache parameters (Intel & AMD Zen+)
    let mut l1d: Option<usize> = None;
    let mut l2: Option<usize> = None;
    let mut l3: Option<usize> = None;

    for sub in 0..16u32 {
        let info = unsafe { std::arch::x86_64::__cpuid_count(4, sub) };
        let cache_type = info.eax & 0x1F;
        if cache_type == 0 {
            break;
        }
        let level = (info.eax >> 5) & 0x7;
        let line_size = (info.ebx & 0xFFF) + 1;
        let partitions = ((info.ebx >> 12) & 0x3FF) + 1;
        let ways = ((info.ebx >> 22) & 0x3FF) + 1;
        let sets = info.ecx + 1;
        let size = line_size as usize * partitions as usize * ways as usize * sets as usize;

        match (level, cache_type) {
            (1, 1) => l1d = Some(size),
            (2, 3) | (2, 2) => l2 = Some(size),
            (3, 3) | (3, 2) => l3 = Some(size),
            _ => {}
        }
    }

    match (l1d, l2) {
        (Some(d), Some(u)) => Some((d, u, l3.unwrap_or(8 * 1024 * 1024))),
        _ => None,
    }
}

#[cfg(target_os = "linux")]
fn detect_sysfs_cache() -> Option<(usize, usize, usize)> {
    let mut l1d: Option<usize> = None;
    let mut l2: Option<usize> = None;
    let mut l3: Option<usize> = None;

    for idx in 0..8 {
        let base = format!("/sys/devices/system/cpu/cpu0/cache/index{idx}");
        let level = match std::fs::read_to_string(format!("{base}/level")) {
            Ok(s) => s,
            Err(_) => continue,
        };
        let ctype = match std::fs::read_to_string(format!("{base}/type")) {
            Ok(s) => s,
            Err(_) => continue,
        };
        let size_str = match std::fs::read_to_string(format!("{base}/size")) {
            Ok(s) => s,
            Err(_) => continue,
        };
        let size_str = size_str.trim();

        let size = if let Some(kb) = size_str.strip_suffix('K') {
            kb.parse::<usize>().ok()? * 1024
        } else if let Some(mb) = size_str.strip_suffix('M') {
            mb.parse::<usize>().ok()? * 1024 * 1024
        } else {
            size_str.parse::<usize>().ok()?
        };

        let level: u32 = level.trim().parse().ok()?;
        let ctype = ctype.trim();

        match (level, ctype) {
            (1, "Data") => l1d = Some(size),
            (2, "Unified") => l2 = Some(size),
            (3, "Unified") => l3 = Some(size),
            _ => {}
        }
    }

    match (l1d, l2) {
        (Some(d), Some(u)) => Some((d, u, l3.unwrap_or(8 * 1024 * 1024))),
        _ => None,
    }
}

static CACHE_SIZES: OnceLock<(usize, usize, usize)> = OnceLock::new();

fn cache_sizes() -> (usize, usize, usize) {
    *CACHE_SIZES.get_or_init(detect_cache_sizes)
}

/// Returns the detected L1D size in bytes.
pub fn l1d_size() -> usize {
    cache_sizes().0
}

/// Returns the detected L2 size in bytes.
pub fn l2_size() -> usize {
    cache_sizes().1
}

/// Returns the detected L3 size in bytes.
pub fn l3_size() -> usize {
    cache_sizes().2
}

/// Cache-blocking sizes for one micro-kernel tile shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSizes {
    pub mc: usize,
    pub nc: usize,
    pub kc: usize,
    pub mr: usize,
    pub nr: usize,
}

/// KC quantum: the micro-kernel K loops unroll by up to 8, and the
/// narrow-K adjustment rounds to this as well.
pub const KC_ALIGN: usize = 8;

/// Compute KC so one NR-wide B strip (NR * KC elements) stays L1D
/// resident while A is streamed and C lives in registers.
/// Rounded down to a multiple of [`KC_ALIGN`], clamped to [64, 768].
pub fn compute_kc(nr: usize, elem_bytes: usize) -> usize {
    let (l1d, _, _) = cache_sizes();
    let kc_raw = l1d / (nr * elem_bytes);
    (kc_raw & !(KC_ALIGN - 1)).clamp(64, 768)
}

/// Compute MC so the packed A panel (MC x KC) fits 80% of L2, leaving
/// room for B strips and C stores transiting L2.
/// Rounded down to a multiple of MR, clamped to [MR, 960].
pub fn compute_mc(kc: usize, mr: usize, elem_bytes: usize) -> usize {
    let (_, l2, _) = cache_sizes();
    let budget = (l2 * 4) / 5;
    let mc_raw = budget / (kc * elem_bytes);
    (mc_raw / mr * mr).clamp(mr, 960)
}

/// Compute NC so the packed B panel (KC x NC), shared by all cores via
/// L3, fits a conservative 40% of L3.
/// Rounded down to a multiple of NR, clamped to [NR, 8192].
pub fn compute_nc(kc: usize, nr: usize, elem_bytes: usize) -> usize {
    let (_, _, l3) = cache_sizes();
    let budget = (l3 * 2) / 5;
    let nc_raw = budget / (kc * elem_bytes);
    (nc_raw / nr * nr).clamp(nr, 8192)
}

/// Derive all three blocking sizes for a micro-kernel tile shape.
/// `elem_bytes` is the size of the widest packed operand element.
pub fn block_sizes(mr: usize, nr: usize, elem_bytes: usize) -> BlockSizes {
    let kc = compute_kc(nr, elem_bytes);
    let mc = compute_mc(kc, mr, elem_bytes);
    let nc = compute_nc(kc, nr, elem_bytes);
    BlockSizes { mc, nc, kc, mr, nr }
}

// ── Cache-line aligned buffer ─────────────────────────────────────────

/// A `Vec`-like buffer guaranteed to be aligned to 64 bytes (cache line).
/// Used for packed A/B panels so SIMD loads never cross cache-line
/// boundaries.
pub struct AlignedVec<T> {
    ptr: *mut T,
    len: usize,
    cap: usize,
}

unsafe impl<T: Send> Send for AlignedVec<T> {}
unsafe impl<T: Sync> Sync for AlignedVec<T> {}

impl<T> AlignedVec<T> {
    const ALIGN: usize = 64;

    #[inline]
    pub fn new() -> Self {
        Self {
            ptr: std::ptr::null_mut(),
            len: 0,
            cap: 0,
        }
    }

    /// Allocate a buffer with capacity and length `len`, uninitialized.
    /// Callers must write every element they later read.
    pub fn with_len(len: usize) -> Self {
        let mut v = Self::new();
        v.reserve(len);
        unsafe { v.set_len(len) };
        v
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.cap
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.ptr
    }

    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.ptr
    }

    /// Grow to at least `new_cap` elements, preserving existing data.
    pub fn reserve(&mut self, new_cap: usize) {
        if new_cap <= self.cap {
            return;
        }
        let elem_size = std::mem::size_of::<T>();
        assert!(elem_size > 0, "ZST not supported");
        let byte_size = new_cap * elem_size;
        let layout = std::alloc::Layout::from_size_align(byte_size, Self::ALIGN).unwrap();
        let new_ptr = unsafe { std::alloc::alloc(layout) as *mut T };
        assert!(!new_ptr.is_null(), "allocation failed");
        if self.len > 0 && !self.ptr.is_null() {
            unsafe {
                std::ptr::copy_nonoverlapping(self.ptr, new_ptr, self.len);
            }
        }
        self.dealloc();
        self.ptr = new_ptr;
        self.cap = new_cap;
    }

    /// Set length without initialization. Caller must ensure elements
    /// are valid before they are read.
    #[inline]
    pub unsafe fn set_len(&mut self, len: usize) {
        debug_assert!(len <= self.cap);
        self.len = len;
    }

    fn dealloc(&mut self) {
        if !self.ptr.is_null() && self.cap > 0 {
            let elem_size = std::mem::size_of::<T>();
            let byte_size = self.cap * elem_size;
            let layout = std::alloc::Layout::from_size_align(byte_size, Self::ALIGN).unwrap();
            unsafe {
                std::alloc::dealloc(self.ptr as *mut u8, layout);
            }
        }
    }
}

impl<T> Drop for AlignedVec<T> {
    fn drop(&mut self) {
        self.dealloc();
    }
}

impl<T> Default for AlignedVec<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_detection_sane() {
        let (l1d, l2, l3) = cache_sizes();
        assert!(l1d >= 16 * 1024, "L1D too small: {l1d}");
        assert!(l1d <= 128 * 1024, "L1D too large: {l1d}");
        assert!(l2 >= 128 * 1024, "L2 too small: {l2}");
        assert!(l2 <= 16 * 1024 * 1024, "L2 too large: {l2}");
        assert!(l3 >= 1024 * 1024, "L3 too small: {l3}");
        assert!(l3 <= 128 * 1024 * 1024, "L3 too large: {l3}");
    }

    #[test]
    fn f32_6x16_budgets() {
        let b = block_sizes(6, 16, 4);
        assert!(b.kc >= 64 && b.kc <= 768);
        assert_eq!(b.kc % KC_ALIGN, 0);
        assert!(b.mc >= 6 && b.mc % 6 == 0);
        assert!(b.nc >= 16 && b.nc % 16 == 0);
        // A panel must fit the L2 budget
        assert!(b.mc * b.kc * 4 <= (l2_size() * 4) / 5);
    }

    #[test]
    fn s16_6x32_budgets() {
        // u8/s8 inputs pack at 1 byte
        let b = block_sizes(6, 32, 1);
        assert!(b.kc >= 64 && b.kc <= 768);
        assert!(b.mc % 6 == 0);
        assert!(b.nc % 32 == 0);
    }

    #[test]
    fn aligned_vec_roundtrip() {
        let mut v = AlignedVec::<f32>::new();
        assert_eq!(v.capacity(), 0);
        v.reserve(1024);
        assert!(v.capacity() >= 1024);
        assert_eq!(v.as_ptr() as usize % 64, 0, "not 64-byte aligned");
        unsafe {
            v.set_len(1024);
            for i in 0..1024 {
                *v.as_mut_ptr().add(i) = i as f32;
            }
            for i in 0..1024 {
                assert_eq!(*v.as_ptr().add(i), i as f32);
            }
        }
        v.reserve(2048);
        assert_eq!(v.as_ptr() as usize % 64, 0, "not aligned after regrow");
        unsafe {
            for i in 0..1024 {
                assert_eq!(*v.as_ptr().add(i), i as f32);
            }
        }
    }
}
