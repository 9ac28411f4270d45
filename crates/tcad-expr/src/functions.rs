//! The function registry.
//!
//! Every function the evaluator can call is an entry here. Built-ins are
//! installed by [`FunctionRegistry::builtin`]; callers may register more.

use indexmap::IndexMap;
use tcad_core::Precision;

use crate::math;

/// Reductions from a field to a scalar.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reduction {
    /// Sum of the elements.
    Sum,
    /// Largest element.
    Max,
    /// Smallest element.
    Min,
}

impl Reduction {
    /// Reduce `values`. An empty input reduces to zero.
    pub fn apply<T: Precision>(self, values: &[T]) -> T {
        match self {
            Self::Sum => values.iter().fold(T::zero(), |acc, &v| acc + v),
            Self::Max => values.iter().copied().reduce(T::max).unwrap_or(T::zero()),
            Self::Min => values.iter().copied().reduce(T::min).unwrap_or(T::zero()),
        }
    }

    /// Reduce `len` copies of `value`.
    pub fn apply_uniform<T: Precision>(self, value: T, len: usize) -> T {
        match self {
            Self::Sum => value * T::narrow(len as f64),
            Self::Max | Self::Min if len == 0 => T::zero(),
            Self::Max | Self::Min => value,
        }
    }
}

/// A callable entry.
#[derive(Clone, Copy, Debug)]
pub enum Function<T> {
    /// One argument, elementwise.
    Unary(fn(T) -> T),
    /// Two arguments, elementwise.
    Binary(fn(T, T) -> T),
    /// Three arguments, elementwise.
    Ternary(fn(T, T, T) -> T),
    /// One argument, reduced to a scalar.
    Reduce(Reduction),
}

impl<T> Function<T> {
    /// Arguments the function takes.
    pub fn arity(&self) -> usize {
        match self {
            Self::Unary(_) | Self::Reduce(_) => 1,
            Self::Binary(_) => 2,
            Self::Ternary(_) => 3,
        }
    }
}

/// Named functions.
#[derive(Clone, Debug)]
pub struct FunctionRegistry<T> {
    entries: IndexMap<String, Function<T>>,
}

impl<T: Precision> Default for FunctionRegistry<T> {
    fn default() -> Self {
        Self::builtin()
    }
}

impl<T: Precision> FunctionRegistry<T> {
    /// A registry with nothing in it.
    pub fn empty() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    /// The standard function set.
    pub fn builtin() -> Self {
        let mut r = Self::empty();
        let unary: [(&str, fn(T) -> T); 23] = [
            ("abs", T::abs),
            ("exp", T::exp),
            ("log", T::ln),
            ("sqrt", T::sqrt),
            ("B", math::bernoulli),
            ("dBdx", math::bernoulli_dx),
            ("step", math::step),
            ("sgn", math::sgn),
            ("sinh", T::sinh),
            ("cosh", T::cosh),
            ("tanh", T::tanh),
            ("asinh", T::asinh),
            ("acosh", T::acosh),
            ("atanh", T::atanh),
            ("erf", math::erf),
            ("erfc", math::erfc),
            ("derfdx", math::erf_dx),
            ("derfcdx", math::erfc_dx),
            ("Fermi", math::fermi),
            ("dFermidx", math::fermi_dx),
            ("InvFermi", math::inv_fermi),
            ("dInvFermidx", math::inv_fermi_dx),
            ("!", math::not),
        ];
        for (name, f) in unary {
            r.register(name, Function::Unary(f));
        }
        let binary: [(&str, fn(T, T) -> T); 11] = [
            ("pow", T::powf),
            ("min", T::min),
            ("max", T::max),
            ("&&", math::and),
            ("||", math::or),
            ("==", math::eq),
            ("!=", math::ne),
            ("<", math::lt),
            ("<=", math::le),
            (">", math::gt),
            (">=", math::ge),
        ];
        for (name, f) in binary {
            r.register(name, Function::Binary(f));
        }
        r.register("ifelse", Function::Ternary(math::select));
        r.register("vec_sum", Function::Reduce(Reduction::Sum));
        r.register("vec_max", Function::Reduce(Reduction::Max));
        r.register("vec_min", Function::Reduce(Reduction::Min));
        r
    }

    /// Add or replace `name`.
    pub fn register(&mut self, name: &str, function: Function<T>) {
        self.entries.insert(name.to_string(), function);
    }

    /// Look up `name`.
    pub fn get(&self, name: &str) -> Option<Function<T>> {
        self.entries.get(name).copied()
    }

    /// Registered names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tcad_core::Extended;

    #[test]
    fn builtin_arities() {
        let r = FunctionRegistry::<f64>::builtin();
        assert_eq!(r.get("B").map(|f| f.arity()), Some(1));
        assert_eq!(r.get("pow").map(|f| f.arity()), Some(2));
        assert_eq!(r.get("ifelse").map(|f| f.arity()), Some(3));
        assert_eq!(r.get("vec_max").map(|f| f.arity()), Some(1));
        assert!(r.get("gamma").is_none());
    }

    #[test]
    fn reductions() {
        assert_eq!(Reduction::Sum.apply(&[1.0f64, 2.0, 3.5]), 6.5);
        assert_eq!(Reduction::Max.apply(&[1.0f64, -2.0]), 1.0);
        assert_eq!(Reduction::Min.apply::<f64>(&[]), 0.0);
        assert_eq!(Reduction::Sum.apply_uniform(2.0f64, 4), 8.0);
        assert_eq!(Reduction::Min.apply_uniform(2.0f64, 4), 2.0);
    }

    #[test]
    fn registration_replaces() {
        let mut r = FunctionRegistry::<Extended>::builtin();
        let n = r.names().count();
        r.register("abs", Function::Unary(|x| x * Extended::from(2.0)));
        assert_eq!(r.names().count(), n);
        match r.get("abs") {
            Some(Function::Unary(f)) => assert_eq!(f(Extended::from(-1.5)), Extended::from(-3.0)),
            other => panic!("expected unary, got {other:?}"),
        }
    }
}
