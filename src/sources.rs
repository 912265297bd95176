//! Source sets: tuples of one to four operands feeding an n-ary kernel.
//!
//! A source set combines the facts of its members (fixed dimensions, linear-index
//! support) and hands out one run per member for a column or for the whole
//! flattened index space.

use crate::operand::{Operand, Run};
use crate::shape::{common_fixed, ShapeFold};
use crate::{EvalError, Result};

/// One run per source, read in lock step.
pub trait RunGroup<T: Copy> {
    /// Per-position kernel arguments, one element per source.
    type Args: Copy;

    fn args(&self, k: usize) -> Self::Args;

    fn lanes<const W: usize>(&self, k: usize) -> [Self::Args; W];

    /// True when every run is unit-stride or broadcast.
    fn is_flat(&self) -> bool;
}

/// A set of source operands.
pub trait Sources<T: Copy> {
    type Args: Copy;
    type Runs<'a>: RunGroup<T, Args = Self::Args>
    where
        Self: 'a,
        T: 'a;

    const ARITY: usize;
    const ROWS: usize;
    const COLS: usize;
    const LINEAR_INDEX: bool;

    /// Push every shaped (non-broadcast) member into `fold`.
    fn fold_shape(&self, fold: ShapeFold) -> Result<ShapeFold>;

    /// Check that every shaped member has exactly `n` elements.
    fn check_len(&self, n: usize) -> Result<()>;

    fn linear_runs(&self) -> Option<Self::Runs<'_>>;

    fn column_runs(&self, j: usize) -> Self::Runs<'_>;
}

macro_rules! elem {
    ($_s:ident) => {
        T
    };
    ($_s:ident, $t:ty) => {
        $t
    };
}

macro_rules! fold_fixed {
    ($c:ident; $s:ident) => {
        <$s as Operand<T>>::$c
    };
    ($c:ident; $s:ident, $($rest:ident),+) => {
        common_fixed(<$s as Operand<T>>::$c, fold_fixed!($c; $($rest),+))
    };
}

macro_rules! impl_sources {
    ($arity:expr; $($src:ident $idx:tt $run:ident),+) => {
        impl<'r, T: Copy> RunGroup<T> for ($(elem!($run, Run<'r, T>),)+) {
            type Args = ($(elem!($src),)+);

            #[inline(always)]
            fn args(&self, k: usize) -> Self::Args {
                ($(self.$idx.get(k),)+)
            }

            #[inline(always)]
            fn lanes<const W: usize>(&self, k: usize) -> [Self::Args; W] {
                $(let $run = self.$idx.load::<W>(k);)+
                std::array::from_fn(|l| ($($run[l],)+))
            }

            #[inline]
            fn is_flat(&self) -> bool {
                true $(&& self.$idx.is_flat())+
            }
        }

        impl<T: Copy, $($src: Operand<T>),+> Sources<T> for ($($src,)+) {
            type Args = ($(elem!($src),)+);
            type Runs<'a> = ($(elem!($run, Run<'a, T>),)+) where Self: 'a, T: 'a;

            const ARITY: usize = $arity;
            const ROWS: usize = fold_fixed!(ROWS; $($src),+);
            const COLS: usize = fold_fixed!(COLS; $($src),+);
            const LINEAR_INDEX: bool = true $(&& <$src as Operand<T>>::LINEAR_INDEX)+;

            fn fold_shape(&self, mut fold: ShapeFold) -> Result<ShapeFold> {
                $(
                    if !<$src as Operand<T>>::SINGLE {
                        fold = fold.push(self.$idx.nrows(), self.$idx.ncols())?;
                    }
                )+
                Ok(fold)
            }

            fn check_len(&self, n: usize) -> Result<()> {
                $(
                    if !<$src as Operand<T>>::SINGLE {
                        let found = self.$idx.nrows() * self.$idx.ncols();
                        if found != n {
                            return Err(EvalError::LengthMismatch { expected: n, found });
                        }
                    }
                )+
                Ok(())
            }

            #[inline]
            fn linear_runs(&self) -> Option<Self::Runs<'_>> {
                Some(($(self.$idx.linear_run()?,)+))
            }

            #[inline]
            fn column_runs(&self, j: usize) -> Self::Runs<'_> {
                ($(self.$idx.column_run(j),)+)
            }
        }
    };
}

impl_sources!(1; A 0 ra);
impl_sources!(2; A 0 ra, B 1 rb);
impl_sources!(3; A 0 ra, B 1 rb, C 2 rc);
impl_sources!(4; A 0 ra, B 1 rb, C 2 rc, E 3 re);
