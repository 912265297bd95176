//! Operand and destination capabilities.
//!
//! Kernels never index matrices directly. They consume *runs*: a borrowed slice
//! plus an element step, where element `k` of the run lives at `data[k * step]`.
//! A run with step 0 is a broadcast of a single value.

use crate::scheme::AccessPolicy;
use crate::shape::{MatrixShape, DYNAMIC};

// ============================================================================
// Runs
// ============================================================================

/// A read-only run of elements.
#[derive(Clone, Copy, Debug)]
pub struct Run<'a, T> {
    data: &'a [T],
    step: usize,
}

impl<'a, T: Copy> Run<'a, T> {
    #[inline]
    pub fn contiguous(data: &'a [T]) -> Self {
        Self { data, step: 1 }
    }

    #[inline]
    pub fn strided(data: &'a [T], step: usize) -> Self {
        Self { data, step }
    }

    /// A run that presents `value` at every position.
    #[inline]
    pub fn broadcast(value: &'a T) -> Self {
        Self {
            data: std::slice::from_ref(value),
            step: 0,
        }
    }

    #[inline]
    pub fn is_broadcast(&self) -> bool {
        self.step == 0
    }

    /// True for unit-stride and broadcast runs.
    #[inline]
    pub fn is_flat(&self) -> bool {
        self.step <= 1
    }

    #[inline(always)]
    pub fn get(&self, k: usize) -> T {
        self.data[k * self.step]
    }

    /// Load `W` consecutive run elements starting at `k`.
    ///
    /// Broadcast runs splat their value without touching memory per lane.
    #[inline(always)]
    pub fn load<const W: usize>(&self, k: usize) -> [T; W] {
        match self.step {
            0 => [self.data[0]; W],
            1 => {
                let lanes = &self.data[k..k + W];
                std::array::from_fn(|l| lanes[l])
            }
            s => std::array::from_fn(|l| self.data[(k + l) * s]),
        }
    }
}

/// A mutable run of destination elements. The step is never zero.
#[derive(Debug)]
pub struct RunMut<'a, T> {
    data: &'a mut [T],
    step: usize,
}

impl<'a, T: Copy> RunMut<'a, T> {
    #[inline]
    pub fn contiguous(data: &'a mut [T]) -> Self {
        Self { data, step: 1 }
    }

    #[inline]
    pub fn strided(data: &'a mut [T], step: usize) -> Self {
        debug_assert!(step > 0, "destination runs cannot broadcast");
        Self { data, step }
    }

    #[inline(always)]
    pub fn get(&self, k: usize) -> T {
        self.data[k * self.step]
    }

    #[inline(always)]
    pub fn set(&mut self, k: usize, value: T) {
        self.data[k * self.step] = value;
    }

    #[inline(always)]
    pub fn get_mut(&mut self, k: usize) -> &mut T {
        &mut self.data[k * self.step]
    }

    #[inline(always)]
    pub fn load<const W: usize>(&self, k: usize) -> [T; W] {
        if self.step == 1 {
            let lanes = &self.data[k..k + W];
            std::array::from_fn(|l| lanes[l])
        } else {
            std::array::from_fn(|l| self.data[(k + l) * self.step])
        }
    }

    #[inline(always)]
    pub fn store<const W: usize>(&mut self, k: usize, values: [T; W]) {
        if self.step == 1 {
            self.data[k..k + W].copy_from_slice(&values);
        } else {
            for (l, v) in values.into_iter().enumerate() {
                self.data[(k + l) * self.step] = v;
            }
        }
    }
}

// ============================================================================
// Operand traits
// ============================================================================

/// A readable matrix operand.
///
/// Elements are addressed column-major. `ROWS` and `COLS` are the dimensions
/// fixed by the type ([`DYNAMIC`] when only known at run time). `LINEAR_INDEX`
/// is a property of the type: when true, [`Operand::linear_run`] must return a
/// run covering all `nrows() * ncols()` elements in column-major order.
pub trait Operand<T: Copy> {
    const ROWS: usize = DYNAMIC;
    const COLS: usize = DYNAMIC;
    const LINEAR_INDEX: bool;
    /// Broadcast operands have no shape constraint and present one value everywhere.
    const SINGLE: bool = false;

    fn nrows(&self) -> usize;

    fn ncols(&self) -> usize;

    #[inline]
    fn shape(&self) -> MatrixShape {
        MatrixShape::with_consts(Self::ROWS, Self::COLS, self.nrows(), self.ncols())
    }

    /// The whole operand as one flat run, if its layout allows it.
    fn linear_run(&self) -> Option<Run<'_, T>>;

    /// Column `j` as a run of `nrows()` elements.
    fn column_run(&self, j: usize) -> Run<'_, T>;

    #[inline]
    fn get(&self, i: usize, j: usize) -> T {
        self.column_run(j).get(i)
    }
}

/// A writable destination operand.
///
/// `ACCESS` reports which traversals the destination admits. The default derives
/// it from linear-index support: cost-compared when flat indexing works, PerColumn
/// otherwise.
pub trait OperandMut<T: Copy>: Operand<T> {
    const ACCESS: AccessPolicy = if Self::LINEAR_INDEX {
        AccessPolicy::Custom
    } else {
        AccessPolicy::PerColumn
    };

    fn linear_run_mut(&mut self) -> Option<RunMut<'_, T>>;

    fn column_run_mut(&mut self, j: usize) -> RunMut<'_, T>;
}

impl<T: Copy, O: Operand<T> + ?Sized> Operand<T> for &O {
    const ROWS: usize = O::ROWS;
    const COLS: usize = O::COLS;
    const LINEAR_INDEX: bool = O::LINEAR_INDEX;
    const SINGLE: bool = O::SINGLE;

    #[inline]
    fn nrows(&self) -> usize {
        (**self).nrows()
    }

    #[inline]
    fn ncols(&self) -> usize {
        (**self).ncols()
    }

    #[inline]
    fn linear_run(&self) -> Option<Run<'_, T>> {
        (**self).linear_run()
    }

    #[inline]
    fn column_run(&self, j: usize) -> Run<'_, T> {
        (**self).column_run(j)
    }
}

// ============================================================================
// Single-value operand
// ============================================================================

/// A scalar presented as an operand of any shape.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Single<T>(pub T);

/// Wrap a scalar as a broadcast operand.
#[inline]
pub fn single<T>(value: T) -> Single<T> {
    Single(value)
}

impl<T: Copy> Operand<T> for Single<T> {
    const LINEAR_INDEX: bool = true;
    const SINGLE: bool = true;

    #[inline]
    fn nrows(&self) -> usize {
        1
    }

    #[inline]
    fn ncols(&self) -> usize {
        1
    }

    #[inline]
    fn linear_run(&self) -> Option<Run<'_, T>> {
        Some(Run::broadcast(&self.0))
    }

    #[inline]
    fn column_run(&self, _j: usize) -> Run<'_, T> {
        Run::broadcast(&self.0)
    }
}
