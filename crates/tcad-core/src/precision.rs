//! Floating precision abstraction.
//!
//! Algorithms are written once, generic over `T: Precision`. Engines run
//! in standard (`f64`) or extended ([`Extended`], double-double) precision.
//! Conversion between precisions goes through the widest form,
//! [`Precision::to_extended`] and [`Precision::from_extended`]; the
//! equation holder is the only caller that moves data between engines of
//! different precision.

use std::fmt::{Debug, Display};
use std::ops::{AddAssign, DivAssign, MulAssign, SubAssign};

use num_traits::Float;
use twofloat::TwoFloat;

/// Extended precision: an unevaluated sum of two `f64`s.
pub type Extended = TwoFloat;

mod private {
    pub trait Sealed {}
    impl Sealed for f64 {}
    impl Sealed for super::Extended {}
}

/// Which concrete float an engine runs in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrecisionKind {
    /// `f64`.
    Double,
    /// Double-double.
    Extended,
}

impl PrecisionKind {
    /// Short name used in messages and serialized output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Double => "double",
            Self::Extended => "extended",
        }
    }
}

/// Numeric bound for every value the engine stores or computes.
///
/// Sealed: implemented for `f64` and [`Extended`] only.
pub trait Precision:
    private::Sealed
    + Float
    + AddAssign
    + SubAssign
    + MulAssign
    + DivAssign
    + Debug
    + Display
    + Send
    + Sync
    + 'static
{
    /// Which concrete float this is.
    const KIND: PrecisionKind;

    /// Convert from an `f64` constant or parameter (exact for both
    /// implementors).
    fn narrow(v: f64) -> Self;

    /// Nearest `f64`, for reporting and tolerances.
    fn widen(self) -> f64;

    /// Lossless conversion into the widest precision.
    fn to_extended(self) -> Extended;

    /// Conversion from the widest precision (may round).
    fn from_extended(v: Extended) -> Self;

    /// Convert into another precision through the widest form.
    #[inline]
    fn convert<U: Precision>(self) -> U {
        U::from_extended(self.to_extended())
    }
}

impl Precision for f64 {
    const KIND: PrecisionKind = PrecisionKind::Double;

    #[inline]
    fn narrow(v: f64) -> Self {
        v
    }

    #[inline]
    fn widen(self) -> f64 {
        self
    }

    #[inline]
    fn to_extended(self) -> Extended {
        Extended::from(self)
    }

    #[inline]
    fn from_extended(v: Extended) -> Self {
        v.hi() + v.lo()
    }
}

impl Precision for Extended {
    const KIND: PrecisionKind = PrecisionKind::Extended;

    #[inline]
    fn narrow(v: f64) -> Self {
        Extended::from(v)
    }

    #[inline]
    fn widen(self) -> f64 {
        self.hi() + self.lo()
    }

    #[inline]
    fn to_extended(self) -> Extended {
        self
    }

    #[inline]
    fn from_extended(v: Extended) -> Self {
        v
    }
}

/// Elementwise precision conversion of a slice.
pub fn convert_slice<T: Precision, U: Precision>(src: &[T]) -> Vec<U> {
    src.iter().map(|&v| v.convert()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_survives_a_round_trip_through_extended() {
        let v: f64 = 0.1;
        let e: Extended = v.convert();
        assert_eq!(e.hi(), 0.1);
        assert_eq!(e.lo(), 0.0);
        assert_eq!(e.convert::<f64>(), v);
    }

    #[test]
    fn extended_keeps_what_double_loses() {
        let tiny = 1.0e-20;
        let e = Extended::narrow(1.0) + Extended::narrow(tiny);
        assert_eq!(e.hi(), 1.0);
        assert_eq!(e.lo(), tiny);
        assert_eq!((e - Extended::narrow(1.0)).widen(), tiny);
        assert_eq!(e.convert::<f64>(), 1.0);
    }

    #[test]
    fn convert_slice_preserves_order() {
        let out: Vec<Extended> = convert_slice(&[1.0f64, -2.0, 3.5]);
        let back: Vec<f64> = convert_slice(&out);
        assert_eq!(back, vec![1.0, -2.0, 3.5]);
    }

    #[test]
    fn kinds_are_distinct() {
        assert_eq!(<f64 as Precision>::KIND.as_str(), "double");
        assert_eq!(<Extended as Precision>::KIND.as_str(), "extended");
    }
}
