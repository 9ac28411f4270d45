//! Sparse accumulator records, pass selectors, and row permutations.
//!
//! Assembly appends `(row, col, value)` and `(row, value)` records to
//! plain vectors. Duplicates are summed downstream by the solver stage;
//! nothing here deduplicates.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::AssemblyError;
use crate::precision::Precision;

/// One Jacobian contribution.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RowColValue<T> {
    /// Equation row.
    pub row: usize,
    /// Solution column.
    pub col: usize,
    /// Contribution.
    pub value: T,
}

impl<T> RowColValue<T> {
    /// Create a record.
    pub fn new(row: usize, col: usize, value: T) -> Self {
        Self { row, col, value }
    }
}

/// One residual contribution.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RhsEntry<T> {
    /// Equation row.
    pub row: usize,
    /// Contribution.
    pub value: T,
}

impl<T> RhsEntry<T> {
    /// Create a record.
    pub fn new(row: usize, value: T) -> Self {
        Self { row, value }
    }
}

/// Which outputs an assembly pass fills.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WhatToLoad {
    /// Jacobian only.
    MatrixOnly,
    /// Residual only.
    Rhs,
    /// Jacobian and residual.
    MatrixAndRhs,
    /// Row permutations only; no numeric output.
    PermutationOnly,
}

impl WhatToLoad {
    /// Whether Jacobian records are produced.
    pub fn loads_matrix(self) -> bool {
        matches!(self, Self::MatrixOnly | Self::MatrixAndRhs)
    }

    /// Whether residual records are produced.
    pub fn loads_rhs(self) -> bool {
        matches!(self, Self::Rhs | Self::MatrixAndRhs)
    }

    /// Whether this is the permutation pass.
    pub fn is_permutation_only(self) -> bool {
        self == Self::PermutationOnly
    }
}

/// Steady-state or time-derivative terms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimeMode {
    /// Steady-state node/edge/element contributions.
    Dc,
    /// Charge and displacement contributions.
    Time,
}

/// Where an original row is moved to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PermutationEntry {
    row: Option<usize>,
    keep_copy: bool,
}

impl PermutationEntry {
    /// Move the original row to `row`.
    pub fn new(row: usize, keep_copy: bool) -> Self {
        Self {
            row: Some(row),
            keep_copy,
        }
    }

    /// Drop the original row entirely.
    pub fn dropped() -> Self {
        Self {
            row: None,
            keep_copy: false,
        }
    }

    /// Target row, or `None` when the row is dropped.
    pub fn row(&self) -> Option<usize> {
        self.row
    }

    /// Whether the original equation is kept as a secondary row.
    pub fn keep_copy(&self) -> bool {
        self.keep_copy
    }
}

impl fmt::Display for PermutationEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.row {
            Some(r) => write!(f, "-> {r}")?,
            None => write!(f, "-> dropped")?,
        }
        if self.keep_copy {
            write!(f, " (keep copy)")?;
        }
        Ok(())
    }
}

/// Row permutations established by one assembly cycle.
///
/// Each row key may be written once; a second write is a
/// [`AssemblyError::PermutationRowConflict`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PermutationMap {
    entries: BTreeMap<usize, PermutationEntry>,
}

impl PermutationMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record where `row` goes.
    pub fn insert(&mut self, row: usize, entry: PermutationEntry) -> Result<(), AssemblyError> {
        if let Some(existing) = self.entries.get(&row) {
            return Err(AssemblyError::PermutationRowConflict {
                row,
                existing: *existing,
                attempted: entry,
            });
        }
        self.entries.insert(row, entry);
        Ok(())
    }

    /// The entry for `row`, if it is permuted.
    pub fn get(&self, row: usize) -> Option<&PermutationEntry> {
        self.entries.get(&row)
    }

    /// Final destination of `row`: itself when not permuted, `None` when dropped.
    pub fn target(&self, row: usize) -> Option<usize> {
        match self.entries.get(&row) {
            Some(e) => e.row(),
            None => Some(row),
        }
    }

    /// Every row a record originally on `row` lands in.
    pub fn destinations(&self, row: usize) -> impl Iterator<Item = usize> {
        let (first, copy) = match self.entries.get(&row) {
            None => (Some(row), None),
            Some(e) if e.keep_copy() => (e.row(), Some(row)),
            Some(e) => (e.row(), None),
        };
        first.into_iter().chain(copy)
    }

    /// Number of permuted rows.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no row is permuted.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries ordered by original row.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &PermutationEntry)> {
        self.entries.iter().map(|(r, e)| (*r, e))
    }

    /// Forget every entry, starting a new cycle.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Output buffers for one assembly call.
#[derive(Clone, Debug, PartialEq)]
pub struct AssemblyBuffers<T> {
    /// Jacobian records.
    pub matrix: Vec<RowColValue<T>>,
    /// Residual records.
    pub rhs: Vec<RhsEntry<T>>,
}

impl<T> Default for AssemblyBuffers<T> {
    fn default() -> Self {
        Self {
            matrix: Vec::new(),
            rhs: Vec::new(),
        }
    }
}

impl<T: Precision> AssemblyBuffers<T> {
    /// Create empty buffers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a Jacobian record.
    pub fn push_matrix(&mut self, row: usize, col: usize, value: T) {
        self.matrix.push(RowColValue::new(row, col, value));
    }

    /// Append a residual record.
    pub fn push_rhs(&mut self, row: usize, value: T) {
        self.rhs.push(RhsEntry::new(row, value));
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.matrix.is_empty() && self.rhs.is_empty()
    }

    /// Drop all records.
    pub fn clear(&mut self) {
        self.matrix.clear();
        self.rhs.clear();
    }

    /// Append every record of `other` converted elementwise to `T`.
    pub fn extend_converted<U: Precision>(&mut self, other: &AssemblyBuffers<U>) {
        self.matrix.extend(
            other
                .matrix
                .iter()
                .map(|m| RowColValue::new(m.row, m.col, m.value.convert())),
        );
        self.rhs.extend(
            other
                .rhs
                .iter()
                .map(|r| RhsEntry::new(r.row, r.value.convert())),
        );
    }

    /// Append every record of `other` with its row moved through `permutation`.
    ///
    /// Records on dropped rows are discarded. A row permuted with
    /// `keep_copy` contributes at both its target and its original row.
    pub fn extend_permuted(&mut self, other: &AssemblyBuffers<T>, permutation: &PermutationMap) {
        for m in &other.matrix {
            for row in permutation.destinations(m.row) {
                self.push_matrix(row, m.col, m.value);
            }
        }
        for r in &other.rhs {
            for row in permutation.destinations(r.row) {
                self.push_rhs(row, r.value);
            }
        }
    }

    /// Residual summed per row.
    pub fn rhs_by_row(&self) -> BTreeMap<usize, T> {
        let mut out = BTreeMap::new();
        for r in &self.rhs {
            *out.entry(r.row).or_insert(T::zero()) += r.value;
        }
        out
    }

    /// Jacobian summed per `(row, col)`.
    pub fn matrix_by_entry(&self) -> BTreeMap<(usize, usize), T> {
        let mut out = BTreeMap::new();
        for m in &self.matrix {
            *out.entry((m.row, m.col)).or_insert(T::zero()) += m.value;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::precision::Extended;

    #[test]
    fn second_write_to_row_is_rejected() {
        let mut p = PermutationMap::new();
        p.insert(4, PermutationEntry::new(1, false)).unwrap();
        let err = p.insert(4, PermutationEntry::dropped()).unwrap_err();
        match err {
            AssemblyError::PermutationRowConflict { row, existing, .. } => {
                assert_eq!(row, 4);
                assert_eq!(existing.row(), Some(1));
            }
            other => panic!("expected PermutationRowConflict, got {other:?}"),
        }
        assert_eq!(p.target(4), Some(1));
    }

    #[test]
    fn unpermuted_rows_map_to_themselves() {
        let mut p = PermutationMap::new();
        p.insert(2, PermutationEntry::dropped()).unwrap();
        assert_eq!(p.target(7), Some(7));
        assert_eq!(p.target(2), None);
    }

    #[test]
    fn permuted_records_follow_their_rows() {
        let mut p = PermutationMap::new();
        p.insert(1, PermutationEntry::new(0, false)).unwrap();
        p.insert(2, PermutationEntry::dropped()).unwrap();
        p.insert(3, PermutationEntry::new(0, true)).unwrap();
        let mut bulk = AssemblyBuffers::<f64>::new();
        for row in 0..4 {
            bulk.push_rhs(row, 1.0 + row as f64);
        }
        bulk.push_matrix(2, 2, 5.0);
        let mut out = AssemblyBuffers::new();
        out.extend_permuted(&bulk, &p);
        let rows = out.rhs_by_row();
        assert_eq!(rows.get(&0), Some(&7.0));
        assert_eq!(rows.get(&1), None);
        assert_eq!(rows.get(&2), None);
        assert_eq!(rows.get(&3), Some(&4.0));
        assert!(out.matrix.is_empty());
    }

    #[test]
    fn load_selectors() {
        assert!(WhatToLoad::MatrixAndRhs.loads_matrix());
        assert!(WhatToLoad::MatrixAndRhs.loads_rhs());
        assert!(!WhatToLoad::Rhs.loads_matrix());
        assert!(!WhatToLoad::PermutationOnly.loads_rhs());
        assert!(WhatToLoad::PermutationOnly.is_permutation_only());
    }

    #[test]
    fn buffers_convert_and_sum() {
        let mut wide = AssemblyBuffers::<f64>::new();
        wide.push_rhs(0, 1.5);
        wide.push_rhs(0, 2.5);
        wide.push_matrix(0, 1, -1.0);
        let mut extended = AssemblyBuffers::<Extended>::new();
        extended.extend_converted(&wide);
        assert_eq!(extended.rhs_by_row().get(&0), Some(&Extended::from(4.0)));
        assert_eq!(
            extended.matrix_by_entry().get(&(0, 1)),
            Some(&Extended::from(-1.0))
        );
    }
}
