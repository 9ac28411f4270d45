//! A standard- or extended-precision device behind one handle.
//!
//! Regions, interfaces and equations of one device share a precision, so
//! the holder wraps the whole device. Callers pass buffers and solution
//! vectors of whatever precision they work in; when it differs from the
//! device's, records are produced in the device's precision and converted
//! here. Nothing below the holder converts.

use std::any::Any;

use tcad_core::{
    convert_slice, AssemblyBuffers, AssemblyConfig, Extended, Precision, PrecisionKind,
    TimeMode, WhatToLoad,
};

use crate::device::Device;
use crate::equation::BulkEquation;
use crate::error::DeviceError;
use crate::update::UpdateStats;

/// A standard- or extended-precision device.
#[derive(Debug)]
pub enum DeviceHolder {
    /// `f64` device.
    Double(Device<f64>),
    /// Double-double device.
    Extended(Device<Extended>),
}

/// Run `$body` with `$d` bound to the wrapped device.
macro_rules! with_device {
    ($holder:expr, $d:ident => $body:expr) => {
        match $holder {
            DeviceHolder::Double($d) => $body,
            DeviceHolder::Extended($d) => $body,
        }
    };
}

/// Assemble `device` into `out`, converting only if the precisions differ.
fn assemble_into<T: Precision, U: Precision>(
    device: &mut Device<T>,
    what: WhatToLoad,
    time: TimeMode,
    out: &mut AssemblyBuffers<U>,
) -> Result<(), DeviceError> {
    if let Some(same) = (&mut *out as &mut dyn Any).downcast_mut::<AssemblyBuffers<T>>() {
        return device.assemble(what, time, same);
    }
    let mut scratch = AssemblyBuffers::<T>::new();
    device.assemble(what, time, &mut scratch)?;
    out.extend_converted(&scratch);
    Ok(())
}

/// Update `device` from a solution of any precision.
///
/// The solution is copied into the device's precision; when both match
/// the copy is exact.
fn update_from<T: Precision, U: Precision>(
    device: &mut Device<T>,
    solution: &[U],
) -> Result<UpdateStats, DeviceError> {
    device.update(&convert_slice::<U, T>(solution))
}

impl DeviceHolder {
    /// A new empty device of precision `kind`.
    pub fn new(
        kind: PrecisionKind,
        name: impl Into<String>,
        config: AssemblyConfig,
    ) -> Result<Self, DeviceError> {
        Ok(match kind {
            PrecisionKind::Double => Self::Double(Device::new(name, config)?),
            PrecisionKind::Extended => Self::Extended(Device::new(name, config)?),
        })
    }

    /// Precision of the wrapped device.
    pub fn precision(&self) -> PrecisionKind {
        match self {
            Self::Double(_) => PrecisionKind::Double,
            Self::Extended(_) => PrecisionKind::Extended,
        }
    }

    /// Device name.
    pub fn name(&self) -> &str {
        with_device!(self, d => d.name())
    }

    /// Total number of rows.
    pub fn row_count(&self) -> usize {
        with_device!(self, d => d.row_count())
    }

    /// A bulk equation by region and name.
    pub fn equation(&self, region: &str, name: &str) -> Option<&BulkEquation> {
        with_device!(self, d => d.equation(region, name))
    }

    /// Variable solved by a bulk equation.
    pub fn variable(&self, region: &str, name: &str) -> Option<&str> {
        self.equation(region, name).map(BulkEquation::variable)
    }

    /// Last absolute and relative update error of a bulk equation.
    pub fn errors(&self, region: &str, name: &str) -> Option<(f64, f64)> {
        self.equation(region, name).map(|e| {
            let s = e.last_update();
            (s.abs_error, s.rel_error)
        })
    }

    /// Combined statistics of the last update.
    pub fn last_update(&self) -> UpdateStats {
        with_device!(self, d => d.last_update())
    }

    /// Start an assembly cycle.
    pub fn load_permutations(&mut self) -> Result<(), DeviceError> {
        with_device!(self, d => d.load_permutations().map(|_| ()))
    }

    /// Append one pass to `out`, in `out`'s precision.
    pub fn assemble<U: Precision>(
        &mut self,
        what: WhatToLoad,
        time: TimeMode,
        out: &mut AssemblyBuffers<U>,
    ) -> Result<(), DeviceError> {
        with_device!(self, d => assemble_into(d, what, time, out))
    }

    /// Apply a solution update given in any precision.
    pub fn update<U: Precision>(&mut self, solution: &[U]) -> Result<UpdateStats, DeviceError> {
        with_device!(self, d => update_from(d, solution))
    }

    /// The wrapped `f64` device.
    pub fn as_double_mut(&mut self) -> Option<&mut Device<f64>> {
        match self {
            Self::Double(d) => Some(d),
            Self::Extended(_) => None,
        }
    }

    /// The wrapped double-double device.
    pub fn as_extended_mut(&mut self) -> Option<&mut Device<Extended>> {
        match self {
            Self::Extended(d) => Some(d),
            Self::Double(_) => None,
        }
    }

    /// Commands recreating the device.
    pub fn serialize(&self) -> String {
        with_device!(self, d => d.serialize())
    }
}

impl From<Device<Extended>> for DeviceHolder {
    fn from(d: Device<Extended>) -> Self {
        Self::Extended(d)
    }
}

impl From<Device<f64>> for DeviceHolder {
    fn from(d: Device<f64>) -> Self {
        Self::Double(d)
    }
}
