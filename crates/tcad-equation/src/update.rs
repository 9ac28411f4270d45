//! Applying a Newton update to a solution variable.

use std::fmt;

use tcad_core::{Diagnostics, Precision, Scope, Severity, UpdateConfig, UpdateError};

/// How a solution update is applied to a variable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum UpdatePolicy {
    /// `new = old + update`.
    #[default]
    Default,
    /// Large steps are compressed logarithmically; a positive value never
    /// reaches zero.
    LogDamp,
    /// Steps that would make a positive value non-positive are clamped to
    /// a fraction of the old value.
    Positive,
}

impl UpdatePolicy {
    /// Keyword used in serialized commands.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::LogDamp => "log_damp",
            Self::Positive => "positive",
        }
    }

    /// Parse a serialized keyword.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "default" => Some(Self::Default),
            "log_damp" => Some(Self::LogDamp),
            "positive" => Some(Self::Positive),
            _ => None,
        }
    }
}

impl fmt::Display for UpdatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Size of the last update applied to a variable.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct UpdateStats {
    /// Largest `|update|`.
    pub abs_error: f64,
    /// Node of the largest absolute update.
    pub abs_node: usize,
    /// Largest `|update| / (|new| + min_error)`.
    pub rel_error: f64,
    /// Node of the largest relative update.
    pub rel_node: usize,
}

impl UpdateStats {
    /// Whether both errors are within their tolerances.
    pub fn converged(&self, abs_tolerance: f64, rel_tolerance: f64) -> bool {
        self.abs_error <= abs_tolerance && self.rel_error <= rel_tolerance
    }

    /// The larger of two statistics, per field.
    pub fn max(self, other: UpdateStats) -> UpdateStats {
        let (abs_error, abs_node) = if other.abs_error > self.abs_error {
            (other.abs_error, other.abs_node)
        } else {
            (self.abs_error, self.abs_node)
        };
        let (rel_error, rel_node) = if other.rel_error > self.rel_error {
            (other.rel_error, other.rel_node)
        } else {
            (self.rel_error, self.rel_node)
        };
        UpdateStats {
            abs_error,
            abs_node,
            rel_error,
            rel_node,
        }
    }
}

/// Compress a step above `scale` logarithmically.
fn log_damp<T: Precision>(old: T, update: T, cfg: &UpdateConfig) -> T {
    let scale = T::narrow(cfg.log_damp_scale);
    let max_step = T::narrow(cfg.max_log_step);
    let mut step = update;
    if update.abs() > scale {
        let damped = (T::one() + update.abs() / scale).ln().min(max_step);
        step = update.signum() * scale * damped;
    }
    let new = old + step;
    if old > T::zero() && new <= T::zero() {
        // Switch to a multiplicative step.
        let ratio = (step / old).max(-max_step);
        return old * ratio.exp() - old;
    }
    step
}

/// The clamped value for a positive variable whose step would cross zero.
///
/// Tries `old * floor_ratio`, then half of `old`, then `old` itself, so the
/// result stays positive even when the products underflow.
fn positive_floor<T: Precision>(old: T, floor_ratio: T) -> T {
    let floor = old * floor_ratio;
    if floor > T::zero() {
        return floor;
    }
    let half = old * T::narrow(0.5);
    if half > T::zero() {
        half
    } else {
        old
    }
}

/// Apply `updates` to `values` under `policy`.
///
/// `values` is overwritten with the new solution. Clamped nodes are
/// reported as warnings; a node already non-positive under
/// [`UpdatePolicy::Positive`] is fatal.
pub fn apply_update<T: Precision>(
    policy: UpdatePolicy,
    values: &mut [T],
    updates: &[T],
    cfg: &UpdateConfig,
    variable: &str,
    scope: &Scope,
    diagnostics: &mut Diagnostics,
) -> Result<UpdateStats, UpdateError> {
    if values.len() != updates.len() {
        return Err(UpdateError::LengthMismatch {
            expected: values.len(),
            actual: updates.len(),
        });
    }
    let floor_ratio = T::narrow(cfg.positive_floor_ratio);
    let min_error = T::narrow(cfg.min_error);
    let mut stats = UpdateStats::default();

    for (node, (value, &raw)) in values.iter_mut().zip(updates).enumerate() {
        let old = *value;
        let (step, new) = match policy {
            UpdatePolicy::Default => (raw, old + raw),
            UpdatePolicy::LogDamp => {
                let step = log_damp(old, raw, cfg);
                (step, old + step)
            }
            UpdatePolicy::Positive => {
                if old <= T::zero() {
                    let message = format!(
                        "solution variable \"{variable}\" is non-positive ({old}) at node {node}"
                    );
                    diagnostics.write_out(Severity::Fatal, scope, message);
                    return Err(UpdateError::NonPositiveSolutionVariable {
                        scope: scope.clone(),
                        variable: variable.to_string(),
                        node,
                        value: old.widen(),
                    });
                }
                let new = old + raw;
                if new <= T::zero() {
                    diagnostics.write_out(
                        Severity::Warning,
                        scope,
                        format!(
                            "solution variable \"{variable}\" would become non-positive at node {node}; clamped"
                        ),
                    );
                    let floor = positive_floor(old, floor_ratio);
                    (floor - old, floor)
                } else {
                    (raw, new)
                }
            }
        };
        *value = new;

        let abs = step.abs().widen();
        if abs > stats.abs_error {
            stats.abs_error = abs;
            stats.abs_node = node;
        }
        let rel = (step.abs() / (new.abs() + min_error)).widen();
        if rel > stats.rel_error {
            stats.rel_error = rel;
            stats.rel_node = node;
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tcad_core::Extended;

    fn run<T: Precision>(
        policy: UpdatePolicy,
        values: &mut [T],
        updates: &[T],
    ) -> (Result<UpdateStats, UpdateError>, Diagnostics) {
        let mut log = Diagnostics::new();
        let r = apply_update(
            policy,
            values,
            updates,
            &UpdateConfig::default(),
            "n",
            &Scope::device("d").region("r"),
            &mut log,
        );
        (r, log)
    }

    #[test]
    fn default_adds_and_records_errors() {
        let mut v = [1.0, 2.0];
        let (stats, _) = run(UpdatePolicy::Default, &mut v, &[0.5, -1.5]);
        let stats = stats.unwrap();
        assert_eq!(v, [1.5, 0.5]);
        assert_eq!((stats.abs_error, stats.abs_node), (1.5, 1));
        assert_eq!(stats.rel_node, 1);
        assert!((stats.rel_error - 3.0).abs() < 1e-6);
    }

    #[test]
    fn small_log_damp_steps_are_unchanged() {
        let mut v = [1.0];
        run(UpdatePolicy::LogDamp, &mut v, &[0.01]).0.unwrap();
        assert!((v[0] - 1.01).abs() < 1e-15);
    }

    #[test]
    fn large_log_damp_steps_are_compressed() {
        let mut v = [0.0];
        run(UpdatePolicy::LogDamp, &mut v, &[10.0]).0.unwrap();
        let expected = 0.0259 * (1.0f64 + 10.0 / 0.0259).ln();
        assert!((v[0] - expected).abs() < 1e-12);
    }

    #[test]
    fn positive_clamps_to_floor() {
        let mut v = [2.0, 1.0];
        let (stats, log) = run(UpdatePolicy::Positive, &mut v, &[-5.0, 0.25]);
        stats.unwrap();
        assert!((v[0] - 2.0e-3).abs() < 1e-15);
        assert_eq!(v[1], 1.25);
        assert_eq!(log.count(Severity::Warning), 1);
        assert!(log.records()[0].message.contains("non-positive"));
    }

    #[test]
    fn positive_floor_survives_underflow() {
        let tiny = f64::from_bits(1);
        let mut v = [tiny];
        run(UpdatePolicy::Positive, &mut v, &[-1.0]).0.unwrap();
        assert_eq!(v[0], tiny);

        let mut v = [Extended::from(1.0e-300)];
        run(UpdatePolicy::Positive, &mut v, &[Extended::from(-1.0)]).0.unwrap();
        assert!(v[0] > Extended::from(0.0) && v[0] < Extended::from(1.0e-300));

        let mut v = [1.0e-300f64];
        run(UpdatePolicy::Positive, &mut v, &[-1.0]).0.unwrap();
        assert!(v[0] > 0.0);
    }

    #[test]
    fn positive_rejects_non_positive_start() {
        let mut v = [1.0, -1.0];
        let (r, log) = run(UpdatePolicy::Positive, &mut v, &[0.0, 0.0]);
        match r {
            Err(UpdateError::NonPositiveSolutionVariable { node, value, .. }) => {
                assert_eq!(node, 1);
                assert_eq!(value, -1.0);
            }
            other => panic!("expected NonPositiveSolutionVariable, got {other:?}"),
        }
        assert!(log.has_fatal());
    }

    #[test]
    fn length_mismatch() {
        let mut v = [1.0];
        let (r, _) = run(UpdatePolicy::Default, &mut v, &[0.0, 0.0]);
        assert_eq!(r, Err(UpdateError::LengthMismatch { expected: 1, actual: 2 }));
    }

    #[test]
    fn policy_keywords() {
        for p in [UpdatePolicy::Default, UpdatePolicy::LogDamp, UpdatePolicy::Positive] {
            assert_eq!(UpdatePolicy::from_keyword(p.as_str()), Some(p));
        }
        assert_eq!(UpdatePolicy::from_keyword("damped"), None);
    }

    proptest! {
        #[test]
        fn log_damp_from_one_stays_positive(step in -1.0e12f64..1.0e12) {
            let mut v = [1.0];
            run(UpdatePolicy::LogDamp, &mut v, &[step]).0.unwrap();
            prop_assert!(v[0] > 0.0);
        }

        #[test]
        fn log_damp_keeps_positive_values_positive(
            old in 1.0e-6f64..1.0e6,
            step in -1.0e12f64..1.0e12,
        ) {
            let mut v = [old];
            run(UpdatePolicy::LogDamp, &mut v, &[step]).0.unwrap();
            prop_assert!(v[0] > 0.0);
        }

        #[test]
        fn positive_never_crosses_zero(
            old in prop_oneof![
                1.0e-6f64..1.0e6,
                (1u64..(1u64 << 52)).prop_map(f64::from_bits),
                1.0e-320f64..1.0e-300,
            ],
            step in -1.0e12f64..1.0e12,
        ) {
            let mut v = [old];
            run(UpdatePolicy::Positive, &mut v, &[step]).0.unwrap();
            prop_assert!(v[0] > 0.0);
        }

        #[test]
        fn positive_never_crosses_zero_in_extended_precision(
            old in prop_oneof![1.0e-6f64..1.0e6, 1.0e-300f64..1.0e-280],
            step in -1.0e12f64..1.0e12,
        ) {
            let mut v = [Extended::from(old)];
            run(UpdatePolicy::Positive, &mut v, &[Extended::from(step)]).0.unwrap();
            prop_assert!(v[0] > Extended::from(0.0));
        }
    }
}
