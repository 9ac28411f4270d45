//! The device: regions, boundaries and equations driven as one system.
//!
//! [`Device`] owns every region, interface and equation of one simulated
//! device and lays their rows out in a single global numbering:
//!
//! ```text
//! region 0 rows | region 1 rows | ... | circuit node rows
//! ```
//!
//! # Assembly cycle
//!
//! Every cycle starts with the permutation pass
//! ([`load_permutations`](Device::load_permutations), or
//! [`assemble`](Device::assemble) with [`WhatToLoad::PermutationOnly`]),
//! which lets contact and interface equations claim bulk rows. DC and
//! time passes may then run any number of times. A DC or time pass
//! without a loaded permutation fails with
//! [`AssemblyError::PermutationsNotLoaded`]. Changing the equation layout
//! ends the cycle.
//!
//! Contact and interface contributions land on their rows as written.
//! Bulk contributions go through the permutation map: a dropped row is
//! discarded, a moved row lands on its target, and a row moved with
//! `keep_copy` lands on both.

use std::sync::Arc;

use tcad_core::{
    AssemblyBuffers, AssemblyConfig, AssemblyError, Diagnostics, DomainKind, PermutationMap,
    Precision, Scope, Severity, TimeMode, UpdateError, WhatToLoad,
};
use tcad_mesh::{Contact, Interface, Topology};
use tcad_model::{InterfaceModels, Region, RegionId};
use tracing::{debug, info};

use crate::circuit::CircuitNodes;
use crate::command::{serialize_interface_model, serialize_region};
use crate::contact::{active_nodes, ContactEquation};
use crate::equation::BulkEquation;
use crate::error::DeviceError;
use crate::interface::InterfaceEquation;
use crate::update::UpdateStats;

// Compile-time assertion: a device can move to a worker thread.
const _: () = {
    #[allow(dead_code)]
    fn assert_send<T: Send>() {}
    #[allow(dead_code)]
    fn check() {
        assert_send::<Device<f64>>();
        assert_send::<Device<tcad_core::Extended>>();
    }
};

/// Where the device is within an assembly cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Cycle {
    /// No permutation pass since the last layout change.
    Idle,
    /// Permutations are loaded; DC and time passes may run.
    Permuted,
}

/// An interface's models and the indices of its two regions.
#[derive(Debug)]
struct Coupled<T: Precision> {
    models: InterfaceModels<T>,
    regions: [usize; 2],
}

/// One simulated device.
#[derive(Debug)]
pub struct Device<T: Precision> {
    name: String,
    config: AssemblyConfig,
    regions: Vec<Region<T>>,
    interfaces: Vec<Coupled<T>>,
    equations: Vec<(usize, BulkEquation)>,
    contact_equations: Vec<(usize, ContactEquation)>,
    interface_equations: Vec<(usize, InterfaceEquation)>,
    circuit: CircuitNodes,
    permutation: PermutationMap,
    cycle: Cycle,
    layout: Vec<(RegionId, u64)>,
    diagnostics: Diagnostics,
    last_update: UpdateStats,
}

/// Both regions of an interface, mutably.
fn pair_mut<T: Precision>(regions: &mut [Region<T>], [a, b]: [usize; 2]) -> [&mut Region<T>; 2] {
    if a < b {
        let (lo, hi) = regions.split_at_mut(b);
        [&mut lo[a], &mut hi[0]]
    } else {
        let (lo, hi) = regions.split_at_mut(a);
        [&mut hi[0], &mut lo[b]]
    }
}

impl<T: Precision> Device<T> {
    /// An empty device.
    pub fn new(name: impl Into<String>, config: AssemblyConfig) -> Result<Self, DeviceError> {
        config.validate()?;
        Ok(Self {
            name: name.into(),
            config,
            regions: Vec::new(),
            interfaces: Vec::new(),
            equations: Vec::new(),
            contact_equations: Vec::new(),
            interface_equations: Vec::new(),
            circuit: CircuitNodes::new(),
            permutation: PermutationMap::new(),
            cycle: Cycle::Idle,
            layout: Vec::new(),
            diagnostics: Diagnostics::new(),
            last_update: UpdateStats::default(),
        })
    }

    // ── Accessors ──────────────────────────────────────────────────

    /// Device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Assembly configuration.
    pub fn config(&self) -> &AssemblyConfig {
        &self.config
    }

    /// Diagnostics recorded so far.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Drain the recorded diagnostics.
    pub fn take_diagnostics(&mut self) -> Diagnostics {
        std::mem::take(&mut self.diagnostics)
    }

    /// A region by name.
    pub fn region(&self, name: &str) -> Option<&Region<T>> {
        self.regions.iter().find(|r| r.name() == name)
    }

    /// A region by name, mutably.
    ///
    /// Register equations through [`add_equation`](Self::add_equation) so
    /// they are assembled. Equation slots or contacts changed through this
    /// handle renumber the device and end the current cycle on the next
    /// pass.
    pub fn region_mut(&mut self, name: &str) -> Option<&mut Region<T>> {
        self.regions.iter_mut().find(|r| r.name() == name)
    }

    /// Regions in creation order.
    pub fn regions(&self) -> impl Iterator<Item = &Region<T>> {
        self.regions.iter()
    }

    /// An interface's models by name.
    pub fn interface(&self, name: &str) -> Option<&InterfaceModels<T>> {
        self.interfaces
            .iter()
            .find(|c| c.models.name() == name)
            .map(|c| &c.models)
    }

    /// An interface's models by name, mutably.
    pub fn interface_mut(&mut self, name: &str) -> Option<&mut InterfaceModels<T>> {
        self.interfaces
            .iter_mut()
            .find(|c| c.models.name() == name)
            .map(|c| &mut c.models)
    }

    /// Bulk equations with their region names.
    pub fn equations(&self) -> impl Iterator<Item = (&str, &BulkEquation)> {
        self.equations
            .iter()
            .map(|(r, e)| (self.regions[*r].name(), e))
    }

    /// A bulk equation by region and name.
    pub fn equation(&self, region: &str, name: &str) -> Option<&BulkEquation> {
        self.equations()
            .find(|(r, e)| *r == region && e.name() == name)
            .map(|(_, e)| e)
    }

    /// Contact equations in registration order.
    pub fn contact_equations(&self) -> impl Iterator<Item = &ContactEquation> {
        self.contact_equations.iter().map(|(_, e)| e)
    }

    /// A contact equation by contact and name.
    pub fn contact_equation(&self, contact: &str, name: &str) -> Option<&ContactEquation> {
        self.contact_equations()
            .find(|e| e.contact() == contact && e.name() == name)
    }

    /// Interface equations with their interface names.
    pub fn interface_equations(&self) -> impl Iterator<Item = (&str, &InterfaceEquation)> {
        self.interface_equations
            .iter()
            .map(|(i, e)| (self.interfaces[*i].models.name(), e))
    }

    /// Circuit coupling points.
    pub fn circuit(&self) -> &CircuitNodes {
        &self.circuit
    }

    /// Permutations of the current cycle.
    pub fn permutation(&self) -> &PermutationMap {
        &self.permutation
    }

    /// Total number of rows, circuit rows included.
    pub fn row_count(&self) -> usize {
        self.circuit.base() + self.circuit.len()
    }

    /// Combined statistics of the last [`update`](Self::update).
    pub fn last_update(&self) -> UpdateStats {
        self.last_update
    }

    // ── Building ───────────────────────────────────────────────────

    /// Add a region on `topology`. Its coordinate models are created.
    pub fn add_region(
        &mut self,
        name: &str,
        topology: Arc<Topology>,
    ) -> Result<&mut Region<T>, DeviceError> {
        if self.region(name).is_some() {
            return Err(DeviceError::DuplicateRegion {
                name: name.to_string(),
            });
        }
        let mut region =
            Region::new(self.name.as_str(), name, topology).with_kernel(self.config.kernel.clone());
        for (node, _, value) in self.circuit.iter() {
            region.set_parameter(node, value);
        }
        self.regions.push(region);
        self.renumber();
        let index = self.regions.len() - 1;
        Ok(&mut self.regions[index])
    }

    fn region_index(&self, name: &str) -> Result<usize, DeviceError> {
        self.regions
            .iter()
            .position(|r| r.name() == name)
            .ok_or_else(|| DeviceError::UnknownRegion {
                name: name.to_string(),
            })
    }

    fn contact_region(&self, contact: &str) -> Result<usize, DeviceError> {
        self.regions
            .iter()
            .position(|r| r.contact(contact).is_some())
            .ok_or_else(|| DeviceError::UnknownContact {
                name: contact.to_string(),
            })
    }

    fn interface_index(&self, name: &str) -> Result<usize, DeviceError> {
        self.interfaces
            .iter()
            .position(|c| c.models.name() == name)
            .ok_or_else(|| DeviceError::UnknownInterface {
                name: name.to_string(),
            })
    }

    /// Add contact `name` on `region` at `nodes`.
    pub fn add_contact(&mut self, name: &str, region: &str, nodes: Vec<usize>) -> Result<(), DeviceError> {
        if self.contact_region(name).is_ok() {
            return Err(DeviceError::DuplicateContact {
                name: name.to_string(),
            });
        }
        let index = self.region_index(region)?;
        let r = &mut self.regions[index];
        let contact = Contact::new(name, region, nodes, r.node_count())?;
        r.add_contact(contact);
        self.cycle = Cycle::Idle;
        Ok(())
    }

    /// Add interface `name` joining `(region0 node, region1 node)` pairs.
    pub fn add_interface(
        &mut self,
        name: &str,
        region0: &str,
        region1: &str,
        pairs: &[(usize, usize)],
    ) -> Result<&mut InterfaceModels<T>, DeviceError> {
        let r0 = self.region_index(region0)?;
        let r1 = self.region_index(region1)?;
        if r0 == r1 {
            return Err(DeviceError::SelfInterface {
                name: name.to_string(),
            });
        }
        let interface = Interface::new(
            name,
            (region0, self.regions[r0].node_count()),
            (region1, self.regions[r1].node_count()),
            pairs,
        )?;
        let models =
            InterfaceModels::new(self.name.as_str(), interface).with_kernel(self.config.kernel.clone());
        let coupled = Coupled {
            models,
            regions: [r0, r1],
        };
        let index = match self.interface_index(name) {
            Ok(i) => {
                self.interfaces[i] = coupled;
                i
            }
            Err(_) => {
                self.interfaces.push(coupled);
                self.interfaces.len() - 1
            }
        };
        self.cycle = Cycle::Idle;
        Ok(&mut self.interfaces[index].models)
    }

    /// Register a bulk equation in `region`.
    pub fn add_equation(&mut self, region: &str, equation: BulkEquation) -> Result<(), DeviceError> {
        let index = self.region_index(region)?;
        if self
            .equations
            .iter()
            .any(|(r, e)| *r == index && e.name() == equation.name())
        {
            return Err(DeviceError::DuplicateEquation {
                name: equation.name().to_string(),
            });
        }
        self.regions[index].add_equation(equation.name(), equation.variable());
        info!(
            device = %self.name,
            region,
            equation = equation.name(),
            variable = equation.variable(),
            "equation added"
        );
        self.equations.push((index, equation));
        self.renumber();
        Ok(())
    }

    /// Register a contact equation on its contact.
    pub fn add_contact_equation(&mut self, equation: ContactEquation) -> Result<(), DeviceError> {
        let index = self.contact_region(equation.contact())?;
        if self.contact_equation(equation.contact(), equation.name()).is_some() {
            return Err(DeviceError::DuplicateEquation {
                name: equation.name().to_string(),
            });
        }
        self.contact_equations.push((index, equation));
        self.cycle = Cycle::Idle;
        Ok(())
    }

    /// Register an interface equation on `interface`.
    pub fn add_interface_equation(
        &mut self,
        interface: &str,
        equation: InterfaceEquation,
    ) -> Result<(), DeviceError> {
        let index = self.interface_index(interface)?;
        if self
            .interface_equations
            .iter()
            .any(|(i, e)| *i == index && e.name() == equation.name())
        {
            return Err(DeviceError::DuplicateEquation {
                name: equation.name().to_string(),
            });
        }
        self.interface_equations.push((index, equation));
        self.cycle = Cycle::Idle;
        Ok(())
    }

    /// Register a circuit node. Returns its global row.
    pub fn add_circuit_node(&mut self, name: &str, value: f64) -> usize {
        self.circuit.add(name, value);
        for region in &mut self.regions {
            region.set_parameter(name, value);
        }
        self.renumber();
        self.circuit.row(name).unwrap_or(self.row_count())
    }

    /// Overwrite a circuit node's value; regions see it as a parameter.
    pub fn set_circuit_value(&mut self, name: &str, value: f64) -> bool {
        if !self.circuit.set_value(name, value) {
            return false;
        }
        for region in &mut self.regions {
            region.set_parameter(name, value);
        }
        true
    }

    /// Lay out global rows: regions in order, then circuit nodes.
    fn layout_fingerprint(&self) -> Vec<(RegionId, u64)> {
        self.regions
            .iter()
            .map(|r| (r.id(), r.layout_revision()))
            .collect()
    }

    fn renumber(&mut self) {
        let mut base = 0;
        for region in &mut self.regions {
            region.set_base_equation(base);
            base += region.equation_count();
        }
        debug!(device = %self.name, rows = base, "equations renumbered");
        self.circuit.set_base(base);
        self.cycle = Cycle::Idle;
    }

    // ── Ownership masks ────────────────────────────────────────────

    fn contact_mask(&self, index: usize) -> Vec<bool> {
        let (ri, eq) = &self.contact_equations[index];
        let region = &self.regions[*ri];
        let Some(contact) = region.contact(eq.contact()) else {
            return vec![false; region.node_count()];
        };
        let claimed = region
            .contacts()
            .take_while(|c| c.name() != eq.contact())
            .filter(|c| {
                self.contact_equations
                    .iter()
                    .any(|(r, e)| r == ri && e.contact() == c.name() && e.name() == eq.name())
            });
        active_nodes(region.node_count(), contact, claimed)
    }

    /// Whether node `node` of `region` is already owned for `equation` by
    /// a contact equation or by an interface equation listed before
    /// `before`.
    fn side_claimed(&self, region: usize, node: usize, equation: &str, before: usize) -> bool {
        let by_contact = self.contact_equations.iter().any(|(r, e)| {
            *r == region
                && e.name() == equation
                && self.regions[*r]
                    .contact(e.contact())
                    .is_some_and(|c| c.contains(node))
        });
        let by_interface = self.interface_equations[..before].iter().any(|(i, e)| {
            let coupled = &self.interfaces[*i];
            (0..2).any(|side| {
                coupled.regions[side] == region
                    && e.side_name(side) == equation
                    && coupled.models.side_nodes(side).contains(&node)
            })
        });
        by_contact || by_interface
    }

    fn interface_mask(&self, index: usize) -> Vec<bool> {
        let (ii, eq) = &self.interface_equations[index];
        let coupled = &self.interfaces[*ii];
        (0..coupled.models.interface().len())
            .map(|pair| {
                (0..2).all(|side| {
                    let node = coupled.models.side_nodes(side)[pair];
                    !self.side_claimed(coupled.regions[side], node, eq.side_name(side), index)
                })
            })
            .collect()
    }

    // ── Assembly ───────────────────────────────────────────────────

    /// Run contact and interface equations for one pass.
    fn boundary_pass(
        &mut self,
        what: WhatToLoad,
        time: TimeMode,
        out: &mut AssemblyBuffers<T>,
    ) -> Result<(), AssemblyError> {
        let contact_masks: Vec<_> = (0..self.contact_equations.len())
            .map(|i| self.contact_mask(i))
            .collect();
        let interface_masks: Vec<_> = (0..self.interface_equations.len())
            .map(|i| self.interface_mask(i))
            .collect();
        let Self {
            config,
            regions,
            interfaces,
            contact_equations,
            interface_equations,
            circuit,
            permutation,
            diagnostics,
            ..
        } = self;

        for ((ri, eq), active) in contact_equations.iter().zip(&contact_masks) {
            eq.assemble(
                &mut regions[*ri],
                active,
                circuit,
                permutation,
                config,
                diagnostics,
                what,
                time,
                out,
            )?;
        }
        for ((ii, eq), active) in interface_equations.iter().zip(&interface_masks) {
            let coupled = &mut interfaces[*ii];
            eq.assemble(
                &mut coupled.models,
                pair_mut(regions, coupled.regions),
                active,
                permutation,
                config,
                diagnostics,
                what,
                time,
                out,
            )?;
        }
        Ok(())
    }

    fn record_conflict(&mut self, error: &AssemblyError) {
        if let AssemblyError::PermutationRowConflict { .. } = error {
            self.diagnostics
                .write_out(Severity::Fatal, &Scope::device(&self.name), error.to_string());
        }
    }

    /// Start a cycle: rebuild the permutation map.
    pub fn load_permutations(&mut self) -> Result<&PermutationMap, DeviceError> {
        self.renumber();
        self.permutation.clear();
        let mut scratch = AssemblyBuffers::new();
        if let Err(e) = self.boundary_pass(WhatToLoad::PermutationOnly, TimeMode::Dc, &mut scratch) {
            self.record_conflict(&e);
            return Err(e.into());
        }
        self.cycle = Cycle::Permuted;
        self.layout = self.layout_fingerprint();
        debug!(
            device = %self.name,
            permuted = self.permutation.len(),
            "permutations loaded"
        );
        Ok(&self.permutation)
    }

    /// Append one pass of the whole device to `out`.
    ///
    /// [`WhatToLoad::PermutationOnly`] starts a new cycle and appends
    /// nothing.
    pub fn assemble(
        &mut self,
        what: WhatToLoad,
        time: TimeMode,
        out: &mut AssemblyBuffers<T>,
    ) -> Result<(), DeviceError> {
        if what.is_permutation_only() {
            return self.load_permutations().map(|_| ());
        }
        if self.cycle == Cycle::Permuted && self.layout != self.layout_fingerprint() {
            debug!(device = %self.name, "region layout changed since the permutation pass");
            self.renumber();
        }
        if self.cycle != Cycle::Permuted {
            self.diagnostics.write_out(
                Severity::Fatal,
                &Scope::device(&self.name),
                "assembly pass ran before the permutation pass",
            );
            return Err(AssemblyError::PermutationsNotLoaded.into());
        }
        self.boundary_pass(what, time, out)?;

        let mut bulk = AssemblyBuffers::new();
        for (ri, eq) in &self.equations {
            eq.assemble(
                &mut self.regions[*ri],
                &self.config,
                &mut self.diagnostics,
                what,
                time,
                &mut bulk,
            )?;
        }
        out.extend_permuted(&bulk, &self.permutation);
        debug!(
            device = %self.name,
            ?what,
            ?time,
            matrix = out.matrix.len(),
            rhs = out.rhs.len(),
            "device assembled"
        );
        Ok(())
    }

    /// Permutation pass followed by one `what`/`time` pass.
    pub fn assemble_cycle(
        &mut self,
        what: WhatToLoad,
        time: TimeMode,
        out: &mut AssemblyBuffers<T>,
    ) -> Result<(), DeviceError> {
        self.load_permutations()?;
        self.assemble(what, time, out)
    }

    // ── Update ─────────────────────────────────────────────────────

    /// Apply a solution update over all rows.
    ///
    /// Each bulk equation updates its variable under its policy, circuit
    /// nodes take their rows' updates, and contact currents and charges
    /// are recomputed.
    pub fn update(&mut self, solution: &[T]) -> Result<UpdateStats, DeviceError> {
        let rows = self.row_count();
        if solution.len() != rows {
            return Err(UpdateError::LengthMismatch {
                expected: rows,
                actual: solution.len(),
            }
            .into());
        }
        let mut stats = UpdateStats::default();
        for (ri, eq) in &mut self.equations {
            let region = &mut self.regions[*ri];
            let Some(start) = region.equation_number(eq.name(), 0) else {
                continue;
            };
            let end = start + region.node_count();
            let s = eq.update(
                region,
                &solution[start..end],
                &self.config.update,
                &mut self.diagnostics,
            )?;
            stats = stats.max(s);
        }

        let circuit: Vec<(String, f64)> = self
            .circuit
            .iter()
            .map(|(name, row, value)| (name.to_string(), value + solution[row].widen()))
            .collect();
        for (name, value) in circuit {
            self.set_circuit_value(&name, value);
        }

        self.integrate_contacts()?;
        self.last_update = stats;
        debug!(
            device = %self.name,
            abs_error = stats.abs_error,
            rel_error = stats.rel_error,
            "device updated"
        );
        Ok(stats)
    }

    /// Recompute every contact equation's current and charge.
    pub fn integrate_contacts(&mut self) -> Result<(), DeviceError> {
        let masks: Vec<_> = (0..self.contact_equations.len())
            .map(|i| self.contact_mask(i))
            .collect();
        for ((ri, eq), active) in self.contact_equations.iter_mut().zip(&masks) {
            eq.integrate(
                &mut self.regions[*ri],
                active,
                &self.config,
                &mut self.diagnostics,
            )?;
        }
        Ok(())
    }

    // ── Serialization ──────────────────────────────────────────────

    /// Commands recreating every model and equation of the device.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for (index, region) in self.regions.iter().enumerate() {
            out.push_str(&serialize_region(region));
            for (_, eq) in self.equations.iter().filter(|(r, _)| *r == index) {
                out.push_str(&eq.serialize(&self.name, region.name()));
            }
        }
        for coupled in &self.interfaces {
            for name in coupled.models.models().names(DomainKind::Node) {
                if let Some(s) = serialize_interface_model(&self.name, &coupled.models, name) {
                    out.push_str(&s);
                }
            }
        }
        for (_, eq) in &self.contact_equations {
            out.push_str(&eq.serialize(&self.name));
        }
        for (index, eq) in &self.interface_equations {
            out.push_str(&eq.serialize(&self.name, self.interfaces[*index].models.name()));
        }
        out
    }
}
