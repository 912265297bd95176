//! Cost model for comparing traversal categories.
//!
//! Costs are dimensionless loop-step counts plus fixed penalties. Only the
//! ordering of two costs computed for the same sources and destination means
//! anything; the absolute values are not comparable across expressions.

use crate::shape::MatrixShape;
use crate::sources::{RunGroup, Sources};
use crate::{
    MACC_CACHE_COST, MACC_COLUMN_SETUP_COST, MACC_SHORTCOL_UBOUND, MACC_SHORT_PERCOL_COST,
    MACC_SHORT_PERCOL_ROWS,
};

/// How the index space is walked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TraversalCategory {
    /// One flat index over `rows * cols` elements in column-major order.
    Linear,
    /// Columns outer, rows inner.
    PerColumn,
}

/// How many elements a kernel step processes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KernelCategory {
    Scalar,
    Simd { width: usize },
}

impl KernelCategory {
    #[inline]
    pub fn width(self) -> usize {
        match self {
            KernelCategory::Scalar => 1,
            KernelCategory::Simd { width } => width.max(1),
        }
    }
}

/// Facts about a source set that the cost model reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExprProfile {
    /// Every source supports linear indexing.
    pub linear_index: bool,
    /// Every source's flat run is unit-stride or broadcast.
    pub flat: bool,
}

impl ExprProfile {
    pub fn of<T: Copy, S: Sources<T>>(sources: &S) -> Self {
        let flat = S::LINEAR_INDEX
            && sources
                .linear_runs()
                .map(|runs| runs.is_flat())
                .unwrap_or(false);
        Self {
            linear_index: S::LINEAR_INDEX,
            flat,
        }
    }
}

/// Tunable traversal cost policy.
///
/// These values only steer the choice between traversals; they never change
/// computed results.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CostModel {
    /// Charged for out-of-order memory streams.
    pub cache_cost: i64,
    /// Added to PerColumn when `rows <= short_percol_rows`.
    pub short_percol_cost: i64,
    /// Row count below which PerColumn also pays `cache_cost`.
    pub shortcol_ubound: usize,
    pub short_percol_rows: usize,
    /// Setup charged once per column.
    pub column_setup_cost: i64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            cache_cost: MACC_CACHE_COST,
            short_percol_cost: MACC_SHORT_PERCOL_COST,
            shortcol_ubound: MACC_SHORTCOL_UBOUND,
            short_percol_rows: MACC_SHORT_PERCOL_ROWS,
            column_setup_cost: MACC_COLUMN_SETUP_COST,
        }
    }
}

#[inline]
fn as_cost(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Lane steps plus scalar cleanup steps for a run of `n` elements.
#[inline]
fn steps(n: usize, kernel: KernelCategory) -> i64 {
    let w = kernel.width();
    as_cost(n / w).saturating_add(as_cost(n % w))
}

impl CostModel {
    pub fn cost(
        &self,
        expr: &ExprProfile,
        shape: &MatrixShape,
        traversal: TraversalCategory,
        kernel: KernelCategory,
    ) -> i64 {
        let rows = shape.nrows();
        let cols = shape.ncols();
        match traversal {
            TraversalCategory::Linear => {
                let penalty = if expr.flat { 0 } else { self.cache_cost };
                steps(rows.saturating_mul(cols), kernel).saturating_add(penalty)
            }
            TraversalCategory::PerColumn => {
                let per_col = steps(rows, kernel).saturating_add(self.column_setup_cost);
                let mut cost = as_cost(cols).saturating_mul(per_col);
                if rows < self.shortcol_ubound {
                    cost = cost.saturating_add(self.cache_cost);
                }
                if rows <= self.short_percol_rows {
                    cost = cost.saturating_add(self.short_percol_cost);
                }
                cost
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLAT: ExprProfile = ExprProfile {
        linear_index: true,
        flat: true,
    };
    const STEPPED: ExprProfile = ExprProfile {
        linear_index: true,
        flat: false,
    };

    #[test]
    fn test_kernel_width() {
        assert_eq!(KernelCategory::Scalar.width(), 1);
        assert_eq!(KernelCategory::Simd { width: 4 }.width(), 4);
    }

    #[test]
    fn test_steps_count_remainder() {
        assert_eq!(steps(10, KernelCategory::Scalar), 10);
        assert_eq!(steps(10, KernelCategory::Simd { width: 4 }), 2 + 2);
        assert_eq!(steps(0, KernelCategory::Simd { width: 4 }), 0);
    }

    #[test]
    fn test_linear_cost() {
        let model = CostModel::default();
        let shape = MatrixShape::new(13, 9);
        let k = KernelCategory::Scalar;
        assert_eq!(model.cost(&FLAT, &shape, TraversalCategory::Linear, k), 117);
        assert_eq!(
            model.cost(&STEPPED, &shape, TraversalCategory::Linear, k),
            117 + MACC_CACHE_COST
        );
    }

    #[test]
    fn test_percol_cost_penalties() {
        let model = CostModel::default();
        let k = KernelCategory::Scalar;

        // short columns pay both penalties
        let short = MatrixShape::new(2, 10);
        assert_eq!(
            model.cost(&FLAT, &short, TraversalCategory::PerColumn, k),
            10 * (2 + MACC_COLUMN_SETUP_COST) + MACC_CACHE_COST + MACC_SHORT_PERCOL_COST
        );

        // tall columns pay neither
        let tall = MatrixShape::new(500, 3);
        assert_eq!(
            model.cost(&FLAT, &tall, TraversalCategory::PerColumn, k),
            3 * (500 + MACC_COLUMN_SETUP_COST)
        );
    }

    #[test]
    fn test_custom_model() {
        let model = CostModel {
            cache_cost: 0,
            short_percol_cost: 0,
            column_setup_cost: 0,
            ..CostModel::default()
        };
        let shape = MatrixShape::new(8, 8);
        let k = KernelCategory::Simd { width: 2 };
        assert_eq!(
            model.cost(&STEPPED, &shape, TraversalCategory::Linear, k),
            model.cost(&FLAT, &shape, TraversalCategory::PerColumn, k)
        );
    }
}
