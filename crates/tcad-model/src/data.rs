//! Uniform-or-vector value holder.
//!
//! A model whose value is the same at every element is stored as one
//! scalar plus a length. Expansion to a vector is lossless.

use std::borrow::Cow;
use std::fmt;

use tcad_core::{KernelConfig, Precision};

use crate::kernels;

/// Values of one model over its domain.
#[derive(Clone, Debug, PartialEq)]
pub enum ModelData<T> {
    /// The same value at every element.
    Uniform {
        /// The shared value.
        value: T,
        /// Element count.
        len: usize,
    },
    /// One value per element.
    Vector(Vec<T>),
}

/// Two operands of an elementwise operation had different lengths.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LengthMismatch {
    /// Length of the left operand.
    pub left: usize,
    /// Length of the right operand.
    pub right: usize,
}

impl fmt::Display for LengthMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "length mismatch: {} vs {}", self.left, self.right)
    }
}

impl std::error::Error for LengthMismatch {}

impl<T: Precision> ModelData<T> {
    /// `len` copies of `value`.
    pub fn uniform(value: T, len: usize) -> Self {
        Self::Uniform { value, len }
    }

    /// `len` zeros.
    pub fn zeros(len: usize) -> Self {
        Self::uniform(T::zero(), len)
    }

    /// Explicit per-element values.
    pub fn from_vec(values: Vec<T>) -> Self {
        Self::Vector(values)
    }

    /// Element count.
    pub fn len(&self) -> usize {
        match self {
            Self::Uniform { len, .. } => *len,
            Self::Vector(v) => v.len(),
        }
    }

    /// Whether there are no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether stored in uniform form.
    pub fn is_uniform(&self) -> bool {
        matches!(self, Self::Uniform { .. })
    }

    /// The shared value, when uniform.
    pub fn uniform_value(&self) -> Option<T> {
        match self {
            Self::Uniform { value, .. } => Some(*value),
            Self::Vector(_) => None,
        }
    }

    /// Uniform zero. A vector of zeros is not reported as zero.
    pub fn is_zero(&self) -> bool {
        self.uniform_value() == Some(T::zero())
    }

    /// Uniform one. A vector of ones is not reported as one.
    pub fn is_one(&self) -> bool {
        self.uniform_value() == Some(T::one())
    }

    /// Value at `index`.
    pub fn get(&self, index: usize) -> Option<T> {
        match self {
            Self::Uniform { value, len } => (index < *len).then_some(*value),
            Self::Vector(v) => v.get(index).copied(),
        }
    }

    /// Borrow as a slice, expanding a uniform value.
    pub fn values(&self) -> Cow<'_, [T]> {
        match self {
            Self::Uniform { value, len } => Cow::Owned(vec![*value; *len]),
            Self::Vector(v) => Cow::Borrowed(v.as_slice()),
        }
    }

    /// Owned per-element values.
    pub fn to_vec(&self) -> Vec<T> {
        self.values().into_owned()
    }

    /// Convert to vector form in place.
    pub fn expand(&mut self) {
        if let Self::Uniform { value, len } = *self {
            *self = Self::Vector(vec![value; len]);
        }
    }

    /// Mutable per-element values, expanding first.
    pub fn values_mut(&mut self) -> &mut [T] {
        self.expand();
        match self {
            Self::Vector(v) => v,
            Self::Uniform { .. } => &mut [],
        }
    }

    /// Convert to another precision.
    pub fn convert<U: Precision>(&self) -> ModelData<U> {
        match self {
            Self::Uniform { value, len } => ModelData::uniform(value.convert(), *len),
            Self::Vector(v) => ModelData::Vector(v.iter().map(|x| x.convert()).collect()),
        }
    }

    /// `self[i] = op(self[i])`.
    pub fn map(&mut self, cfg: &KernelConfig, op: impl Fn(T) -> T + Sync + Send) {
        match self {
            Self::Uniform { value, .. } => *value = op(*value),
            Self::Vector(v) => kernels::map_in_place(v, cfg, op),
        }
    }

    /// `self[i] = op(self[i], other[i])`, staying uniform when both are.
    pub fn zip_with(
        &mut self,
        other: &ModelData<T>,
        cfg: &KernelConfig,
        op: impl Fn(T, T) -> T + Sync + Send,
    ) -> Result<(), LengthMismatch> {
        if self.len() != other.len() {
            return Err(LengthMismatch {
                left: self.len(),
                right: other.len(),
            });
        }
        if let (Self::Uniform { value: a, .. }, Self::Uniform { value: b, .. }) = (&mut *self, other) {
            *a = op(*a, *b);
            return Ok(());
        }
        match other {
            Self::Uniform { value: b, .. } => {
                let b = *b;
                self.map(cfg, |x| op(x, b));
            }
            Self::Vector(b) => kernels::zip_with(self.values_mut(), b, cfg, op),
        }
        Ok(())
    }

    /// `self += other`.
    pub fn plus_equal(&mut self, other: &ModelData<T>, cfg: &KernelConfig) -> Result<(), LengthMismatch> {
        self.zip_with(other, cfg, |a, b| a + b)
    }

    /// `self *= other`.
    pub fn times_equal(&mut self, other: &ModelData<T>, cfg: &KernelConfig) -> Result<(), LengthMismatch> {
        self.zip_with(other, cfg, |a, b| a * b)
    }

    /// `out[i] = self[index[i]]`. A uniform value stays uniform.
    ///
    /// Indices must be below `self.len()`.
    pub fn gather(&self, index: &[usize], cfg: &KernelConfig) -> ModelData<T> {
        match self {
            Self::Uniform { value, .. } => ModelData::uniform(*value, index.len()),
            Self::Vector(v) => ModelData::Vector(kernels::gather(v, index, cfg)),
        }
    }

    /// Zero every element not listed in `keep`.
    ///
    /// Indices in `keep` beyond the length are ignored.
    pub fn restrict_to(&mut self, keep: &[usize]) {
        let len = self.len();
        let mut out = vec![T::zero(); len];
        for &i in keep {
            if let Some(v) = self.get(i) {
                out[i] = v;
            }
        }
        *self = Self::Vector(out);
    }
}
