//! Runtime target-feature dispatch for lane loops.
//!
//! With the `simd` feature the wrapped closure is compiled once per instruction set
//! `pulp` knows about and the best one available on the running CPU is picked.
//! Without it the closure is simply called.

#[inline(always)]
pub(crate) fn dispatch<R>(f: impl FnOnce() -> R) -> R {
    #[cfg(feature = "simd")]
    {
        pulp::Arch::new().dispatch(f)
    }
    #[cfg(not(feature = "simd"))]
    {
        f()
    }
}

/// Number of elements below which a lane loop runs without dispatch.
pub(crate) const DISPATCH_MIN_LEN: usize = 64;

#[inline(always)]
pub(crate) fn dispatch_if_large<R>(len: usize, f: impl FnOnce() -> R) -> R {
    // Dispatch overhead dominates short runs. Correctness does not depend on this.
    if len >= DISPATCH_MIN_LEN {
        dispatch(f)
    } else {
        f()
    }
}
