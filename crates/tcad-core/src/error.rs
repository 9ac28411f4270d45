//! Error types for the tcad engine.
//!
//! Organized by layer: model cache, equation assembly, and solution
//! update. Expression evaluation never fails with an error value; its
//! messages are collected and surface here as
//! [`ModelError::EvaluationFailed`].

use std::error::Error;
use std::fmt;

use crate::diagnostics::Scope;
use crate::id::DomainKind;
use crate::matrix::PermutationEntry;

/// Errors from the model cache and dependency tracker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelError {
    /// No model of this kind and name exists in the owner.
    MissingModel {
        /// Domain the lookup was scoped to.
        kind: DomainKind,
        /// Requested model name.
        name: String,
    },
    /// A model was read while it was being computed.
    CyclicDependency {
        /// The model read re-entrantly.
        name: String,
    },
    /// A value vector does not match the owner's element count.
    LengthMismatch {
        /// Model being written or computed.
        name: String,
        /// Element count of the owning domain.
        expected: usize,
        /// Length supplied.
        actual: usize,
    },
    /// An expression produced data for the wrong domain.
    InvalidResultType {
        /// Model being computed.
        name: String,
        /// Domain of the model.
        kind: DomainKind,
        /// Type name the expression evaluated to.
        found: String,
    },
    /// Expression evaluation produced no usable result.
    EvaluationFailed {
        /// Model being computed.
        name: String,
        /// Accumulated evaluator messages.
        messages: Vec<String>,
    },
    /// A contact-restricted model names a contact the owner does not have.
    UnknownContact {
        /// The contact name.
        name: String,
    },
    /// A node index is outside the owner's node range.
    NodeOutOfRange {
        /// Offending index.
        node: usize,
        /// Number of nodes in the owner.
        node_count: usize,
    },
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingModel { kind, name } => {
                write!(f, "could not find {kind} model \"{name}\"")
            }
            Self::CyclicDependency { name } => {
                write!(f, "cyclic dependency while evaluating model \"{name}\"")
            }
            Self::LengthMismatch {
                name,
                expected,
                actual,
            } => write!(
                f,
                "model \"{name}\" expects {expected} values, got {actual}"
            ),
            Self::InvalidResultType { name, kind, found } => write!(
                f,
                "{kind} model \"{name}\" evaluates to {found}"
            ),
            Self::EvaluationFailed { name, messages } => {
                write!(f, "while evaluating model \"{name}\"")?;
                for m in messages {
                    write!(f, "\n{m}")?;
                }
                Ok(())
            }
            Self::UnknownContact { name } => write!(f, "unknown contact \"{name}\""),
            Self::NodeOutOfRange { node, node_count } => {
                write!(f, "node {node} out of range (node count {node_count})")
            }
        }
    }
}

impl Error for ModelError {}

/// Errors from equation assembly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssemblyError {
    /// A model an equation refers to does not exist.
    MissingEquationModel {
        /// Where the equation lives.
        scope: Scope,
        /// Missing model name.
        model: String,
        /// Domain the model was expected on.
        kind: DomainKind,
    },
    /// An equation has no index in the region it assembles into.
    MissingEquationIndex {
        /// Where the lookup happened.
        scope: Scope,
        /// Equation name looked up.
        equation: String,
    },
    /// A contact equation names a circuit node that is not registered.
    MissingCircuitNode {
        /// Contact equation scope.
        scope: Scope,
        /// Circuit node name.
        node: String,
    },
    /// Two permutation writes targeted the same row in one assembly call.
    PermutationRowConflict {
        /// Row written twice.
        row: usize,
        /// Entry already present.
        existing: PermutationEntry,
        /// Entry that was rejected.
        attempted: PermutationEntry,
    },
    /// A DC/Time pass ran before the cycle's permutation pass.
    PermutationsNotLoaded,
    /// A model read failed during assembly.
    Model {
        /// Where the read happened.
        scope: Scope,
        /// The underlying model error.
        source: ModelError,
    },
    /// A fatal diagnostic aborted assembly.
    Fatal {
        /// Where the diagnostic was raised.
        scope: Scope,
        /// The diagnostic message.
        message: String,
    },
}

impl fmt::Display for AssemblyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingEquationModel { scope, model, kind } => write!(
                f,
                "{scope}: missing {kind} model \"{model}\""
            ),
            Self::MissingEquationIndex { scope, equation } => {
                write!(f, "{scope}: no equation index for \"{equation}\"")
            }
            Self::MissingCircuitNode { scope, node } => {
                write!(f, "{scope}: circuit node \"{node}\" does not exist")
            }
            Self::PermutationRowConflict {
                row,
                existing,
                attempted,
            } => write!(
                f,
                "row {row} permuted twice ({existing} then {attempted})"
            ),
            Self::PermutationsNotLoaded => {
                write!(f, "assembly pass ran before the permutation pass")
            }
            Self::Model { scope, source } => write!(f, "{scope}: {source}"),
            Self::Fatal { scope, message } => write!(f, "{scope}: {message}"),
        }
    }
}

impl Error for AssemblyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Model { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Errors from applying a solution update.
#[derive(Clone, Debug, PartialEq)]
pub enum UpdateError {
    /// Update vector length does not match the variable's node count.
    LengthMismatch {
        /// Node count of the region.
        expected: usize,
        /// Length supplied.
        actual: usize,
    },
    /// A positive-only variable was already non-positive before updating.
    NonPositiveSolutionVariable {
        /// Equation scope.
        scope: Scope,
        /// Variable being updated.
        variable: String,
        /// Node holding the value.
        node: usize,
        /// The offending value.
        value: f64,
    },
    /// Reading or writing the variable's model failed.
    Model(ModelError),
}

impl fmt::Display for UpdateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LengthMismatch { expected, actual } => {
                write!(f, "update has {actual} entries, expected {expected}")
            }
            Self::NonPositiveSolutionVariable {
                scope,
                variable,
                node,
                value,
            } => write!(
                f,
                "{scope}: solution variable \"{variable}\" is non-positive ({value}) at node {node}"
            ),
            Self::Model(e) => write!(f, "model: {e}"),
        }
    }
}

impl Error for UpdateError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Model(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ModelError> for UpdateError {
    fn from(e: ModelError) -> Self {
        Self::Model(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_names_kind() {
        let e = ModelError::MissingModel {
            kind: DomainKind::Edge,
            name: "ElectronCurrent".into(),
        };
        assert_eq!(e.to_string(), "could not find edge model \"ElectronCurrent\"");
    }

    #[test]
    fn assembly_model_error_exposes_source() {
        let e = AssemblyError::Model {
            scope: Scope::device("d").region("r"),
            source: ModelError::CyclicDependency { name: "a".into() },
        };
        assert!(e.source().is_some());
        assert!(e.to_string().contains("cyclic dependency"));
    }

    #[test]
    fn evaluation_failure_lists_messages() {
        let e = ModelError::EvaluationFailed {
            name: "e".into(),
            messages: vec!["one".into(), "two".into()],
        };
        assert_eq!(e.to_string(), "while evaluating model \"e\"\none\ntwo");
    }
}
