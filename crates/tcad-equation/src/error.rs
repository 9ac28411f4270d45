//! Device-level errors.

use std::error::Error;
use std::fmt;

use tcad_core::{AssemblyError, ConfigError, ModelError, UpdateError};
use tcad_mesh::MeshError;

/// Errors from building or driving a [`Device`](crate::Device).
#[derive(Clone, Debug, PartialEq)]
pub enum DeviceError {
    /// The assembly configuration is invalid.
    Config(ConfigError),
    /// A region with this name already exists.
    DuplicateRegion {
        /// Region name.
        name: String,
    },
    /// No region with this name exists.
    UnknownRegion {
        /// Region name.
        name: String,
    },
    /// A contact with this name already exists.
    DuplicateContact {
        /// Contact name.
        name: String,
    },
    /// An interface names the same region on both sides.
    SelfInterface {
        /// Interface name.
        name: String,
    },
    /// No contact with this name exists.
    UnknownContact {
        /// Contact name.
        name: String,
    },
    /// No interface with this name exists.
    UnknownInterface {
        /// Interface name.
        name: String,
    },
    /// An equation with this name is already registered in the scope.
    DuplicateEquation {
        /// Equation name.
        name: String,
    },
    /// Building geometry failed.
    Mesh(MeshError),
    /// A model read or write failed outside assembly.
    Model(ModelError),
    /// An assembly pass failed.
    Assembly(AssemblyError),
    /// Applying a solution update failed.
    Update(UpdateError),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::DuplicateRegion { name } => write!(f, "region \"{name}\" already exists"),
            Self::UnknownRegion { name } => write!(f, "unknown region \"{name}\""),
            Self::DuplicateContact { name } => write!(f, "contact \"{name}\" already exists"),
            Self::SelfInterface { name } => {
                write!(f, "interface \"{name}\" joins a region to itself")
            }
            Self::UnknownContact { name } => write!(f, "unknown contact \"{name}\""),
            Self::UnknownInterface { name } => write!(f, "unknown interface \"{name}\""),
            Self::DuplicateEquation { name } => {
                write!(f, "equation \"{name}\" already exists")
            }
            Self::Mesh(e) => write!(f, "mesh: {e}"),
            Self::Model(e) => write!(f, "model: {e}"),
            Self::Assembly(e) => write!(f, "assembly: {e}"),
            Self::Update(e) => write!(f, "update: {e}"),
        }
    }
}

impl Error for DeviceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Mesh(e) => Some(e),
            Self::Model(e) => Some(e),
            Self::Assembly(e) => Some(e),
            Self::Update(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for DeviceError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<MeshError> for DeviceError {
    fn from(e: MeshError) -> Self {
        Self::Mesh(e)
    }
}

impl From<ModelError> for DeviceError {
    fn from(e: ModelError) -> Self {
        Self::Model(e)
    }
}

impl From<AssemblyError> for DeviceError {
    fn from(e: AssemblyError) -> Self {
        Self::Assembly(e)
    }
}

impl From<UpdateError> for DeviceError {
    fn from(e: UpdateError) -> Self {
        Self::Update(e)
    }
}
