//! Elementwise special functions.
//!
//! All functions are generic over [`Precision`] and evaluated in the
//! caller's precision. Logical functions return `1` or `0`.

use tcad_core::Precision;

fn c<T: Precision>(v: f64) -> T {
    T::narrow(v)
}

fn truth<T: Precision>(b: bool) -> T {
    if b {
        T::one()
    } else {
        T::zero()
    }
}

fn is_true<T: Precision>(x: T) -> bool {
    x != T::zero()
}

// ── Bernoulli ──────────────────────────────────────────────────────

/// `|ln(eps)|`: beyond this the exponential terms vanish.
fn log_epsilon<T: Precision>() -> T {
    T::epsilon().ln().abs()
}

/// Bernoulli function `x / (exp(x) - 1)`.
pub fn bernoulli<T: Precision>(x: T) -> T {
    if x == T::zero() {
        return T::one();
    }
    if x.abs() < log_epsilon::<T>() {
        let ex1 = x.exp_m1();
        if x != ex1 {
            x / ex1
        } else {
            T::one() / (T::one() + c::<T>(0.5) * x)
        }
    } else if x > T::zero() {
        x * (-x).exp()
    } else {
        -x
    }
}

/// Derivative of [`bernoulli`].
pub fn bernoulli_dx<T: Precision>(x: T) -> T {
    if x == T::zero() {
        return c(-0.5);
    }
    if x.abs() < log_epsilon::<T>() {
        let ex1 = x.exp_m1();
        if x != ex1 {
            (ex1 - x * x.exp()) / (ex1 * ex1)
        } else {
            (c::<T>(-0.5) - x / c(3.0)) / (T::one() + x)
        }
    } else if x > T::zero() {
        (-x).exp() * (T::one() - x)
    } else {
        -T::one() - x * x.exp()
    }
}

// ── Steps ──────────────────────────────────────────────────────────

/// `1` for `x >= 0`, else `0`.
pub fn step<T: Precision>(x: T) -> T {
    truth(x >= T::zero())
}

/// `-1`, `0` or `1`.
pub fn sgn<T: Precision>(x: T) -> T {
    if x > T::zero() {
        T::one()
    } else if x < T::zero() {
        -T::one()
    } else {
        T::zero()
    }
}

// ── Error function ─────────────────────────────────────────────────

const FRAC_2_SQRT_PI: f64 = std::f64::consts::FRAC_2_SQRT_PI;

/// Below this magnitude `erf` is summed as a power series; above it
/// `erfc` is evaluated as a continued fraction.
const ERF_SERIES_LIMIT: f64 = 2.0;

const MAX_TERMS: usize = 500;

fn erf_series<T: Precision>(x: T) -> T {
    let x2 = x * x;
    let mut term = x;
    let mut sum = x;
    for n in 1..MAX_TERMS {
        let nf: T = c(n as f64);
        term = -term * x2 / nf;
        let contribution = term / (c::<T>(2.0) * nf + T::one());
        sum += contribution;
        if contribution.abs() <= T::epsilon() * sum.abs() {
            break;
        }
    }
    sum * c(FRAC_2_SQRT_PI)
}

/// `erfc(x)` for `x >= ERF_SERIES_LIMIT` by modified Lentz.
fn erfc_fraction<T: Precision>(x: T) -> T {
    let tiny = T::min_positive_value();
    let mut f = x;
    let mut big_c = f;
    let mut d = T::zero();
    for n in 1..MAX_TERMS {
        let a: T = c(n as f64 * 0.5);
        d = x + a * d;
        if d == T::zero() {
            d = tiny;
        }
        big_c = x + a / big_c;
        if big_c == T::zero() {
            big_c = tiny;
        }
        d = T::one() / d;
        let delta = big_c * d;
        f *= delta;
        if (delta - T::one()).abs() <= T::epsilon() {
            break;
        }
    }
    (-x * x).exp() * c(0.5 * FRAC_2_SQRT_PI) / f
}

/// Error function.
pub fn erf<T: Precision>(x: T) -> T {
    if x.abs() < c(ERF_SERIES_LIMIT) {
        erf_series(x)
    } else if x > T::zero() {
        T::one() - erfc_fraction(x)
    } else {
        erfc_fraction(-x) - T::one()
    }
}

/// Complementary error function.
pub fn erfc<T: Precision>(x: T) -> T {
    if x.abs() < c(ERF_SERIES_LIMIT) {
        T::one() - erf_series(x)
    } else if x > T::zero() {
        erfc_fraction(x)
    } else {
        c::<T>(2.0) - erfc_fraction(-x)
    }
}

/// Derivative of [`erf`].
pub fn erf_dx<T: Precision>(x: T) -> T {
    c::<T>(FRAC_2_SQRT_PI) * (-x * x).exp()
}

/// Derivative of [`erfc`].
pub fn erfc_dx<T: Precision>(x: T) -> T {
    -erf_dx(x)
}

// ── Fermi integral of order 1/2 ────────────────────────────────────
//
// Inverse by Joyce-Dixon below the breakpoint and by the degenerate
// expansion above it; the offset joins the two branches. The forward
// integral is Newton iteration on the inverse.

const FERMI_BREAKPOINT: f64 = 8.46296036621705;
const FERMI_OFFSET: f64 = -0.0137050034663995;
const JOYCE: [f64; 4] = [
    0.353_553_390_593_273_8,
    -4.9500897298752622e-3,
    1.4838577128872821e-4,
    -4.4256301190009895e-6,
];
const FERMI_MAX_ITERATIONS: usize = 20;

fn fermi_tolerance<T: Precision>() -> T {
    match T::KIND {
        tcad_core::PrecisionKind::Double => c(1e-12),
        tcad_core::PrecisionKind::Extended => c(1e-24),
    }
}

fn joyce<T: Precision>(r: T) -> T {
    let mut sum = r.ln();
    let mut power = r;
    for k in JOYCE {
        sum += c::<T>(k) * power;
        power *= r;
    }
    sum
}

fn joyce_dx<T: Precision>(r: T) -> T {
    let mut sum = T::one() / r;
    let mut power = T::one();
    for (i, k) in JOYCE.into_iter().enumerate() {
        sum += c::<T>(k * (i + 1) as f64) * power;
        power *= r;
    }
    sum
}

fn expansion<T: Precision>(r: T) -> T {
    let d1: T = c(0.75 * std::f64::consts::PI.sqrt());
    let d3: T = c(std::f64::consts::PI * std::f64::consts::PI / 6.0);
    ((d1 * r).powf(c(4.0 / 3.0)) - d3).sqrt() + c(FERMI_OFFSET)
}

fn expansion_dx<T: Precision>(r: T) -> T {
    let d0: T = c(0.5 * std::f64::consts::PI.sqrt());
    let d1: T = c(0.75 * std::f64::consts::PI.sqrt());
    d0 * (d1 * r).powf(c(1.0 / 3.0)) / expansion(r)
}

/// Inverse of the Fermi integral: `eta` such that `fermi(eta) == r`.
pub fn inv_fermi<T: Precision>(r: T) -> T {
    if r < c(FERMI_BREAKPOINT) {
        joyce(r)
    } else {
        expansion(r)
    }
}

/// Derivative of [`inv_fermi`].
pub fn inv_fermi_dx<T: Precision>(r: T) -> T {
    if r < c(FERMI_BREAKPOINT) {
        joyce_dx(r)
    } else {
        expansion_dx(r)
    }
}

/// Starting point for the Newton iteration: the Boltzmann limit for
/// negative `eta`, otherwise the inverted degenerate expansion.
fn fermi_guess<T: Precision>(eta: T) -> T {
    if eta < T::zero() {
        return eta.exp();
    }
    let d1: T = c(0.75 * std::f64::consts::PI.sqrt());
    let d3: T = c(std::f64::consts::PI * std::f64::consts::PI / 6.0);
    let shifted = eta - c(FERMI_OFFSET);
    (shifted * shifted + d3).powf(c(0.75)) / d1
}

/// Normalized Fermi-Dirac integral of order 1/2.
pub fn fermi<T: Precision>(eta: T) -> T {
    let tol = fermi_tolerance::<T>();
    let mut r = fermi_guess(eta);
    for _ in 0..FERMI_MAX_ITERATIONS {
        let f = inv_fermi(r) - eta;
        let mut upd = -f / inv_fermi_dx(r);
        while upd + r <= T::zero() {
            upd *= c(0.5);
        }
        r += upd;
        if upd.abs() / (r.abs() + tol) <= tol {
            break;
        }
    }
    r
}

/// Derivative of [`fermi`].
pub fn fermi_dx<T: Precision>(eta: T) -> T {
    T::one() / inv_fermi_dx(fermi(eta))
}

// ── Logical ────────────────────────────────────────────────────────

/// `!x`
pub fn not<T: Precision>(x: T) -> T {
    truth(!is_true(x))
}

/// `x && y`
pub fn and<T: Precision>(x: T, y: T) -> T {
    truth(is_true(x) && is_true(y))
}

/// `x || y`
pub fn or<T: Precision>(x: T, y: T) -> T {
    truth(is_true(x) || is_true(y))
}

/// `x == y`
pub fn eq<T: Precision>(x: T, y: T) -> T {
    truth(x == y)
}

/// `x != y`
pub fn ne<T: Precision>(x: T, y: T) -> T {
    truth(x != y)
}

/// `x < y`
pub fn lt<T: Precision>(x: T, y: T) -> T {
    truth(x < y)
}

/// `x <= y`
pub fn le<T: Precision>(x: T, y: T) -> T {
    truth(x <= y)
}

/// `x > y`
pub fn gt<T: Precision>(x: T, y: T) -> T {
    truth(x > y)
}

/// `x >= y`
pub fn ge<T: Precision>(x: T, y: T) -> T {
    truth(x >= y)
}

/// `x ? y : z`
pub fn select<T: Precision>(x: T, y: T, z: T) -> T {
    if is_true(x) {
        y
    } else {
        z
    }
}
