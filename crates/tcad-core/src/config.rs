//! Engine configuration and validation.
//!
//! All structs carry `Default` values matching the engine's historical
//! constants. [`AssemblyConfig::validate`] checks the numeric invariants
//! before a device is built.

use std::error::Error;
use std::fmt;

use crate::diagnostics::Severity;

// ── KernelConfig ───────────────────────────────────────────────────

/// Controls how elementwise vector kernels are partitioned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KernelConfig {
    /// Vectors shorter than this run serially. Default: 8192.
    pub min_parallel_len: usize,
    /// Contiguous chunk length handed to each worker. Default: 2048.
    pub chunk_len: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            min_parallel_len: 8192,
            chunk_len: 2048,
        }
    }
}

impl KernelConfig {
    /// A configuration that never parallelises.
    pub fn serial() -> Self {
        Self {
            min_parallel_len: usize::MAX,
            chunk_len: 2048,
        }
    }

    /// Whether a vector of `len` elements should be processed in parallel.
    pub fn is_parallel(&self, len: usize) -> bool {
        len >= self.min_parallel_len
    }
}

// ── UpdateConfig ───────────────────────────────────────────────────

/// Constants for solution update policies.
#[derive(Clone, Debug, PartialEq)]
pub struct UpdateConfig {
    /// Step scale for logarithmic damping. Default: 0.0259.
    pub log_damp_scale: f64,
    /// Bound on `|step / value|` in the log-damped exponent. Default: 20.
    pub max_log_step: f64,
    /// Fraction of the old value a positive variable is clamped to. Default: 1e-3.
    pub positive_floor_ratio: f64,
    /// Added to `|value|` when forming relative errors. Default: 1e-10.
    pub min_error: f64,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            log_damp_scale: 0.0259,
            max_log_step: 20.0,
            positive_floor_ratio: 1.0e-3,
            min_error: 1.0e-10,
        }
    }
}

// ── MeasureModels ──────────────────────────────────────────────────

/// Names of the geometric measure models a region provides.
///
/// The geometry collaborator writes these as data models; assembly only
/// reads them by name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeasureModels {
    /// Node model: control volume per node. Default: `NodeVolume`.
    pub node_volume: String,
    /// Edge model: flux coupling area per edge. Default: `EdgeCouple`.
    pub edge_couple: String,
    /// Edge model: volume share of the first endpoint. Default: `EdgeNodeVolume`.
    pub edge_node0_volume: String,
    /// Edge model: volume share of the second endpoint. Default: `EdgeNodeVolume`.
    pub edge_node1_volume: String,
    /// Element-edge model: flux coupling area per element-edge.
    /// Default: `ElementEdgeCouple`.
    pub element_edge_couple: String,
    /// Element-edge model: volume share of the first endpoint.
    /// Default: `ElementNodeVolume`.
    pub element_node0_volume: String,
    /// Element-edge model: volume share of the second endpoint.
    /// Default: `ElementNodeVolume`.
    pub element_node1_volume: String,
    /// Node model: interface area at each interface node.
    /// Default: `SurfaceArea`.
    pub surface_area: String,
}

impl Default for MeasureModels {
    fn default() -> Self {
        Self {
            node_volume: "NodeVolume".into(),
            edge_couple: "EdgeCouple".into(),
            edge_node0_volume: "EdgeNodeVolume".into(),
            edge_node1_volume: "EdgeNodeVolume".into(),
            element_edge_couple: "ElementEdgeCouple".into(),
            element_node0_volume: "ElementNodeVolume".into(),
            element_node1_volume: "ElementNodeVolume".into(),
            surface_area: "SurfaceArea".into(),
        }
    }
}

impl MeasureModels {
    fn names(&self) -> [(&'static str, &str); 8] {
        [
            ("node_volume", self.node_volume.as_str()),
            ("edge_couple", self.edge_couple.as_str()),
            ("edge_node0_volume", self.edge_node0_volume.as_str()),
            ("edge_node1_volume", self.edge_node1_volume.as_str()),
            ("element_edge_couple", self.element_edge_couple.as_str()),
            ("element_node0_volume", self.element_node0_volume.as_str()),
            ("element_node1_volume", self.element_node1_volume.as_str()),
            ("surface_area", self.surface_area.as_str()),
        ]
    }
}

// ── AssemblyConfig ─────────────────────────────────────────────────

/// Top-level engine configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct AssemblyConfig {
    /// Severity used when an equation's primary model is missing.
    /// `Fatal` aborts assembly; `Error` assembles a zero contribution.
    /// Default: `Fatal`.
    pub missing_model_severity: Severity,
    /// Vector kernel partitioning.
    pub kernel: KernelConfig,
    /// Update policy constants.
    pub update: UpdateConfig,
    /// Geometric measure model names.
    pub measures: MeasureModels,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            missing_model_severity: Severity::Fatal,
            kernel: KernelConfig::default(),
            update: UpdateConfig::default(),
            measures: MeasureModels::default(),
        }
    }
}

impl AssemblyConfig {
    /// Check numeric invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kernel.chunk_len == 0 {
            return Err(ConfigError::ZeroChunkLength);
        }
        if self.missing_model_severity < Severity::Error {
            return Err(ConfigError::MissingModelSeverityTooLow {
                severity: self.missing_model_severity,
            });
        }
        for (field, name) in self.measures.names() {
            if name.is_empty() {
                return Err(ConfigError::EmptyMeasureName { field });
            }
        }
        let u = &self.update;
        for (name, value) in [
            ("log_damp_scale", u.log_damp_scale),
            ("max_log_step", u.max_log_step),
            ("min_error", u.min_error),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::InvalidConstant { name, value });
            }
        }
        if !(u.positive_floor_ratio > 0.0 && u.positive_floor_ratio < 1.0) {
            return Err(ConfigError::InvalidConstant {
                name: "positive_floor_ratio",
                value: u.positive_floor_ratio,
            });
        }
        Ok(())
    }
}

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected by [`AssemblyConfig::validate`].
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigError {
    /// Kernel chunk length is zero.
    ZeroChunkLength,
    /// Missing models must be at least `Error` severity.
    MissingModelSeverityTooLow {
        /// The configured severity.
        severity: Severity,
    },
    /// An update constant is out of range.
    InvalidConstant {
        /// Field name.
        name: &'static str,
        /// Configured value.
        value: f64,
    },
    /// A measure model name is empty.
    EmptyMeasureName {
        /// Field name.
        field: &'static str,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroChunkLength => write!(f, "kernel chunk_len must be at least 1"),
            Self::MissingModelSeverityTooLow { severity } => write!(
                f,
                "missing_model_severity must be error or fatal, got {severity}"
            ),
            Self::InvalidConstant { name, value } => {
                write!(f, "update constant {name} out of range: {value}")
            }
            Self::EmptyMeasureName { field } => {
                write!(f, "measure model name {field} must not be empty")
            }
        }
    }
}

impl Error for ConfigError {}
