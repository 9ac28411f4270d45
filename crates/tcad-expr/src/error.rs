//! Evaluator messages.
//!
//! Evaluation never returns `Err`; these accumulate alongside a
//! best-effort result and are rendered to strings when a model
//! calculation fails.

use std::error::Error;
use std::fmt;

use tcad_core::ModelError;

/// One problem found while evaluating an expression.
#[derive(Clone, Debug, PartialEq)]
pub enum EvalError {
    /// No model of that name resolves in the owner.
    MissingModel {
        /// Referenced name.
        name: String,
    },
    /// No parameter or circuit node of that name.
    MissingVariable {
        /// Referenced name.
        name: String,
    },
    /// Reading a referenced model failed.
    Model {
        /// Referenced name.
        name: String,
        /// Underlying failure.
        source: ModelError,
    },
    /// Operands live on domains that cannot be combined.
    IncompatibleDomains {
        /// Operator or function name.
        context: String,
        /// Type name of one operand.
        left: &'static str,
        /// Type name of the other operand.
        right: &'static str,
    },
    /// Operands on the same domain have different lengths.
    LengthMismatch {
        /// Operator or function name.
        context: String,
        /// Length of one operand.
        left: usize,
        /// Length of the other operand.
        right: usize,
    },
    /// Function name not in the registry.
    UnknownFunction {
        /// Called name.
        name: String,
    },
    /// Function called with the wrong number of arguments.
    WrongArity {
        /// Called name.
        name: String,
        /// Arguments the function takes.
        expected: usize,
        /// Arguments supplied.
        found: usize,
    },
    /// A function argument was invalid.
    InvalidArgument {
        /// Called name.
        function: String,
    },
    /// A result contained NaN or infinity.
    NonFinite {
        /// Canonical text of the offending sub-expression.
        expression: String,
    },
    /// The expression tree carries an unparsed fragment.
    InvalidExpression {
        /// The fragment.
        text: String,
    },
}

impl EvalError {
    /// The model error behind this message, if any.
    pub fn model_error(&self) -> Option<&ModelError> {
        match self {
            Self::Model { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingModel { name } => {
                write!(f, "could not find a model by the name of {name}")
            }
            Self::MissingVariable { name } => write!(f, "value for \"{name}\" not available"),
            Self::Model { name, source } => write!(f, "while reading \"{name}\": {source}"),
            Self::IncompatibleDomains {
                context,
                left,
                right,
            } => write!(f, "{context} cannot combine {left} and {right} arguments"),
            Self::LengthMismatch {
                context,
                left,
                right,
            } => write!(f, "{context} has arguments of length {left} and {right}"),
            Self::UnknownFunction { name } => write!(f, "unknown function \"{name}\""),
            Self::WrongArity {
                name,
                expected,
                found,
            } => write!(f, "function {name} takes {expected} arguments, got {found}"),
            Self::InvalidArgument { function } => {
                write!(f, "invalid argument while evaluating function {function}")
            }
            Self::NonFinite { expression } => {
                write!(f, "non-finite value while evaluating {expression}")
            }
            Self::InvalidExpression { text } => {
                write!(f, "could not evaluate expression type for {text}")
            }
        }
    }
}

impl Error for EvalError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Model { source, .. } => Some(source),
            _ => None,
        }
    }
}
