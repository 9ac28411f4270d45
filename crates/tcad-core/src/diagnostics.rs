//! Scoped diagnostics.
//!
//! Every message carries the device/region/contact/interface scope and,
//! when relevant, the equation name, so failures are attributable without
//! a stack trace. Records are emitted as `tracing` events when written
//! and retained for inspection after the operation that produced them.

use std::fmt;

/// Severity of a diagnostic record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    /// Detail useful only when tracing a specific problem.
    Verbose,
    /// Informational.
    Info,
    /// Suspicious but harmless.
    Warning,
    /// The contribution is degraded (commonly zero); work continues.
    Error,
    /// The operation is aborted.
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Verbose => "verbose",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// Where a diagnostic originated.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Scope {
    /// Owning device.
    pub device: String,
    /// Region, if the message concerns one.
    pub region: Option<String>,
    /// Contact, if the message concerns one.
    pub contact: Option<String>,
    /// Interface, if the message concerns one.
    pub interface: Option<String>,
    /// Equation, if the message concerns one.
    pub equation: Option<String>,
}

impl Scope {
    /// Scope covering a whole device.
    pub fn device(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ..Self::default()
        }
    }

    /// Narrow to a region.
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Narrow to a contact.
    pub fn contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = Some(contact.into());
        self
    }

    /// Narrow to an interface.
    pub fn interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }

    /// Narrow to an equation.
    pub fn equation(mut self, equation: impl Into<String>) -> Self {
        self.equation = Some(equation.into());
        self
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Device: \"{}\"", self.device)?;
        if let Some(r) = &self.region {
            write!(f, " Region: \"{r}\"")?;
        }
        if let Some(c) = &self.contact {
            write!(f, " Contact: \"{c}\"")?;
        }
        if let Some(i) = &self.interface {
            write!(f, " Interface: \"{i}\"")?;
        }
        if let Some(e) = &self.equation {
            write!(f, " Equation: \"{e}\"")?;
        }
        Ok(())
    }
}

/// One retained diagnostic record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity the record was written at.
    pub severity: Severity,
    /// Origin of the record.
    pub scope: Scope,
    /// Human-readable message.
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}\n{}", self.severity, self.scope, self.message)
    }
}

/// Diagnostic log for one operation (typically an assembly pass).
#[derive(Clone, Debug, Default)]
pub struct Diagnostics {
    records: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a record: emit it as a `tracing` event and retain it.
    pub fn write_out(&mut self, severity: Severity, scope: &Scope, message: impl Into<String>) {
        let message = message.into();
        match severity {
            Severity::Verbose => tracing::debug!(scope = %scope, "{message}"),
            Severity::Info => tracing::info!(scope = %scope, "{message}"),
            Severity::Warning => tracing::warn!(scope = %scope, "{message}"),
            Severity::Error => tracing::error!(scope = %scope, "{message}"),
            Severity::Fatal => tracing::error!(scope = %scope, fatal = true, "{message}"),
        }
        self.records.push(Diagnostic {
            severity,
            scope: scope.clone(),
            message,
        });
    }

    /// All records, oldest first.
    pub fn records(&self) -> &[Diagnostic] {
        &self.records
    }

    /// Number of records at exactly `severity`.
    pub fn count(&self, severity: Severity) -> usize {
        self.records.iter().filter(|d| d.severity == severity).count()
    }

    /// Whether any record is at least `severity`.
    pub fn any_at_least(&self, severity: Severity) -> bool {
        self.records.iter().any(|d| d.severity >= severity)
    }

    /// Whether any record is fatal.
    pub fn has_fatal(&self) -> bool {
        self.any_at_least(Severity::Fatal)
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Move every record of `other` into this log without re-emitting it.
    pub fn append(&mut self, other: &mut Diagnostics) {
        self.records.append(&mut other.records);
    }

    /// Remove and return all records.
    pub fn take(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.records)
    }
}
