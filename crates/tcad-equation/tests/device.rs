//! Whole-device assembly: cycle ordering, permutations, contacts,
//! interfaces, circuit coupling, updates and the precision holder.

use std::collections::BTreeMap;

use proptest::prelude::*;
use tcad_core::{
    AssemblyBuffers, AssemblyConfig, AssemblyError, Diagnostics, DomainKind, Extended,
    PermutationEntry, PermutationMap, Precision, PrecisionKind, Severity, TimeMode, UpdateError,
    WhatToLoad,
};
use tcad_equation::{
    BulkEquation, CircuitNodes, ContactEquation, Device, DeviceError, DeviceHolder,
    InterfaceCoupling, InterfaceEquation,
};
use tcad_mesh::Contact;
use tcad_model::Region;
use tcad_test_utils::{line_region, line_topology, messages_at, two_region_device};

/// Two regions, each with a Poisson equation driven by a uniform edge
/// field: 2 on the left, 1 on the right. Rows: left 0..2, right 2..4.
fn poisson_device() -> Device<f64> {
    let mut d = two_region_device::<f64>();
    for (region, field) in [("left", 2.0), ("right", 1.0)] {
        d.add_equation(region, BulkEquation::new("Poisson", "psi").with_edge_model("E"))
            .unwrap();
        d.region_mut(region)
            .unwrap()
            .set_uniform(DomainKind::Edge, "E", field);
    }
    d.interface_mut("mid").unwrap().set_uniform("jump", 0.25);
    d
}

fn dc(d: &mut Device<f64>, what: WhatToLoad) -> AssemblyBuffers<f64> {
    let mut out = AssemblyBuffers::new();
    d.assemble_cycle(what, TimeMode::Dc, &mut out).unwrap();
    out
}

fn rows(out: &AssemblyBuffers<f64>) -> Vec<(usize, f64)> {
    out.rhs_by_row().into_iter().collect()
}

// ── Sign symmetry ──────────────────────────────────────────────────

#[test]
fn single_edge_flux_is_antisymmetric() {
    let mut r = line_region("r", &[0.0, 1.0]);
    r.set_uniform(DomainKind::Edge, "EdgeCouple", 3.0);
    r.set_uniform(DomainKind::Edge, "f", 2.0);
    r.add_equation("Flux", "u");
    let eq = BulkEquation::new("Flux", "u").with_edge_model("f");
    let mut out = AssemblyBuffers::new();
    eq.assemble(
        &mut r,
        &AssemblyConfig::default(),
        &mut Diagnostics::new(),
        WhatToLoad::Rhs,
        TimeMode::Dc,
        &mut out,
    )
    .unwrap();
    assert_eq!(rows(&out), vec![(0, 6.0), (1, -6.0)]);
}

proptest! {
    #[test]
    fn closed_mesh_flux_sums_to_zero(fluxes in prop::collection::vec(-1.0e3f64..1.0e3, 1..24)) {
        let xs: Vec<f64> = (0..=fluxes.len()).map(|i| i as f64).collect();
        let mut r = line_region("r", &xs);
        r.set_values(DomainKind::Edge, "f", fluxes.clone()).unwrap();
        r.add_equation("Flux", "u");
        let eq = BulkEquation::new("Flux", "u").with_edge_model("f");
        let mut out = AssemblyBuffers::new();
        eq.assemble(
            &mut r,
            &AssemblyConfig::default(),
            &mut Diagnostics::new(),
            WhatToLoad::Rhs,
            TimeMode::Dc,
            &mut out,
        )
        .unwrap();
        let total: f64 = out.rhs.iter().map(|e| e.value).sum();
        let scale: f64 = fluxes.iter().map(|f| f.abs()).sum::<f64>().max(1.0);
        prop_assert!(total.abs() <= 1.0e-12 * scale);
    }
}

// ── Cycle ordering ─────────────────────────────────────────────────

#[test]
fn dc_pass_before_permutations_is_fatal() {
    let mut d = poisson_device();
    let mut out = AssemblyBuffers::new();
    match d.assemble(WhatToLoad::Rhs, TimeMode::Dc, &mut out) {
        Err(DeviceError::Assembly(AssemblyError::PermutationsNotLoaded)) => {}
        other => panic!("expected PermutationsNotLoaded, got {other:?}"),
    }
    assert!(out.is_empty());
    assert!(d.diagnostics().has_fatal());

    d.assemble(WhatToLoad::PermutationOnly, TimeMode::Dc, &mut out).unwrap();
    assert!(out.is_empty());
    d.assemble(WhatToLoad::Rhs, TimeMode::Dc, &mut out).unwrap();
    assert!(!out.is_empty());
}

#[test]
fn layout_change_ends_the_cycle() {
    let mut d = poisson_device();
    d.load_permutations().unwrap();
    d.add_contact("anode", "left", vec![0]).unwrap();
    let mut out = AssemblyBuffers::new();
    assert!(matches!(
        d.assemble(WhatToLoad::Rhs, TimeMode::Dc, &mut out),
        Err(DeviceError::Assembly(AssemblyError::PermutationsNotLoaded))
    ));
}

#[test]
fn equation_added_through_region_handle_ends_the_cycle() {
    let mut d = poisson_device();
    d.load_permutations().unwrap();
    d.region_mut("left").unwrap().add_equation("Extra", "phi");

    let mut out = AssemblyBuffers::new();
    assert!(matches!(
        d.assemble(WhatToLoad::Rhs, TimeMode::Dc, &mut out),
        Err(DeviceError::Assembly(AssemblyError::PermutationsNotLoaded))
    ));
    assert!(out.rhs.is_empty());
    assert_eq!(d.region("right").unwrap().base_equation(), 4);
    assert_eq!(d.row_count(), 6);

    d.load_permutations().unwrap();
    d.assemble(WhatToLoad::Rhs, TimeMode::Dc, &mut out).unwrap();
    assert_eq!(out.rhs_by_row().get(&4), Some(&1.0));
}

#[test]
fn model_writes_keep_the_cycle() {
    let mut d = poisson_device();
    d.load_permutations().unwrap();
    d.region_mut("left")
        .unwrap()
        .set_uniform(DomainKind::Edge, "E", 3.0);
    let mut out = AssemblyBuffers::new();
    d.assemble(WhatToLoad::Rhs, TimeMode::Dc, &mut out).unwrap();
    assert_eq!(out.rhs_by_row().get(&0), Some(&3.0));
}

#[test]
fn passes_repeat_within_one_cycle() {
    let mut d = poisson_device();
    d.load_permutations().unwrap();
    let mut first = AssemblyBuffers::new();
    let mut second = AssemblyBuffers::new();
    d.assemble(WhatToLoad::MatrixAndRhs, TimeMode::Dc, &mut first).unwrap();
    d.assemble(WhatToLoad::MatrixAndRhs, TimeMode::Dc, &mut second).unwrap();
    assert_eq!(first, second);
}

// ── Bulk rows ──────────────────────────────────────────────────────

#[test]
fn regions_take_consecutive_rows() {
    let d = poisson_device();
    assert_eq!(d.row_count(), 4);
    assert_eq!(d.region("left").unwrap().base_equation(), 0);
    assert_eq!(d.region("right").unwrap().base_equation(), 2);
}

#[test]
fn uncoupled_regions_assemble_independently() {
    let mut d = poisson_device();
    let out = dc(&mut d, WhatToLoad::Rhs);
    assert_eq!(rows(&out), vec![(0, 2.0), (1, -2.0), (2, 1.0), (3, -1.0)]);
}

#[test]
fn missing_model_below_fatal_assembles_nothing() {
    let config = AssemblyConfig {
        missing_model_severity: Severity::Error,
        ..AssemblyConfig::default()
    };
    let mut d = Device::<f64>::new("dev", config).unwrap();
    d.add_region("r", line_topology(&[0.0, 1.0])).unwrap();
    d.add_equation("r", BulkEquation::new("Poisson", "psi").with_edge_model("E"))
        .unwrap();
    let out = dc(&mut d, WhatToLoad::Rhs);
    assert!(out.is_empty());
    let errors = messages_at(d.diagnostics(), Severity::Error);
    assert!(errors.iter().any(|m| m.contains("EdgeCouple")));
}

// ── Contacts ───────────────────────────────────────────────────────

#[test]
fn contact_replaces_bulk_rows() {
    let mut d = poisson_device();
    d.add_contact("anode", "left", vec![0]).unwrap();
    d.region_mut("left")
        .unwrap()
        .set_uniform(DomainKind::Node, "bc", 6.0);
    d.add_contact_equation(ContactEquation::new("Poisson", "anode").with_node_model("bc"))
        .unwrap();

    let perm = d.load_permutations().unwrap();
    assert_eq!(perm.get(0), Some(&PermutationEntry::dropped()));
    assert_eq!(perm.len(), 1);

    let mut out = AssemblyBuffers::new();
    d.assemble(WhatToLoad::Rhs, TimeMode::Dc, &mut out).unwrap();
    assert_eq!(rows(&out), vec![(0, 3.0), (1, -2.0), (2, 1.0), (3, -1.0)]);
}

#[test]
fn contact_current_drives_circuit_node() {
    let mut d = poisson_device();
    d.add_contact("anode", "left", vec![0]).unwrap();
    let row = d.add_circuit_node("V1", 0.0);
    assert_eq!(row, 4);
    assert_eq!(d.row_count(), 5);
    d.region_mut("left")
        .unwrap()
        .set_uniform(DomainKind::Edge, "E:V1", 0.5);
    d.add_contact_equation(
        ContactEquation::new("Poisson", "anode")
            .with_edge_model("E")
            .with_edge_current_model("E")
            .with_circuit_node("V1"),
    )
    .unwrap();

    let out = dc(&mut d, WhatToLoad::MatrixAndRhs);
    let rhs = out.rhs_by_row();
    assert_eq!(rhs.get(&0), Some(&2.0));
    assert_eq!(rhs.get(&4), Some(&2.0));
    let m = out.matrix_by_entry();
    assert_eq!(m.get(&(0, 4)), Some(&0.5));
    assert_eq!(m.get(&(4, 4)), Some(&0.5));

    d.update(&[0.0, 0.0, 0.0, 0.0, 0.5]).unwrap();
    assert_eq!(d.circuit().value("V1"), Some(0.5));
    assert_eq!(d.region("left").unwrap().parameter("V1"), Some(0.5));
    assert_eq!(d.contact_equation("anode", "Poisson").unwrap().current(), 2.0);
}

#[test]
fn unknown_circuit_node_aborts_the_pass() {
    let mut d = poisson_device();
    d.add_contact("anode", "left", vec![0]).unwrap();
    d.add_contact_equation(ContactEquation::new("Poisson", "anode").with_circuit_node("V9"))
        .unwrap();
    d.load_permutations().unwrap();
    let mut out = AssemblyBuffers::new();
    match d.assemble(WhatToLoad::Rhs, TimeMode::Dc, &mut out) {
        Err(DeviceError::Assembly(AssemblyError::MissingCircuitNode { node, .. })) => {
            assert_eq!(node, "V9");
        }
        other => panic!("expected MissingCircuitNode, got {other:?}"),
    }
}

#[test]
fn contact_equations_need_a_known_contact() {
    let mut d = poisson_device();
    match d.add_contact_equation(ContactEquation::new("Poisson", "nowhere")) {
        Err(DeviceError::UnknownContact { name }) => assert_eq!(name, "nowhere"),
        other => panic!("expected UnknownContact, got {other:?}"),
    }
}

// ── Permutation uniqueness ─────────────────────────────────────────

#[test]
fn second_write_to_a_row_is_rejected() {
    let mut r: Region<f64> = line_region("r", &[0.0, 1.0, 2.0]);
    r.add_equation("Poisson", "psi");
    r.add_contact(Contact::new("a", "r", vec![0, 1], 3).unwrap());
    r.add_contact(Contact::new("b", "r", vec![1, 2], 3).unwrap());
    let mut perm = PermutationMap::new();
    let mut log = Diagnostics::new();
    let config = AssemblyConfig::default();
    let circuit = CircuitNodes::new();
    let mut out = AssemblyBuffers::new();

    ContactEquation::new("Poisson", "a")
        .assemble(
            &mut r,
            &[true, true, false],
            &circuit,
            &mut perm,
            &config,
            &mut log,
            WhatToLoad::PermutationOnly,
            TimeMode::Dc,
            &mut out,
        )
        .unwrap();
    let second = ContactEquation::new("Poisson", "b").assemble(
        &mut r,
        &[false, true, true],
        &circuit,
        &mut perm,
        &config,
        &mut log,
        WhatToLoad::PermutationOnly,
        TimeMode::Dc,
        &mut out,
    );
    match second {
        Err(AssemblyError::PermutationRowConflict { row, existing, .. }) => {
            assert_eq!(row, 1);
            assert_eq!(existing, PermutationEntry::dropped());
        }
        other => panic!("expected PermutationRowConflict, got {other:?}"),
    }
}

#[test]
fn overlapping_contacts_share_nodes_without_conflict() {
    let mut d = Device::<f64>::new("dev", AssemblyConfig::default()).unwrap();
    d.add_region("r", line_topology(&[0.0, 1.0, 2.0])).unwrap();
    d.add_equation("r", BulkEquation::new("Poisson", "psi")).unwrap();
    d.add_contact("a", "r", vec![0, 1]).unwrap();
    d.add_contact("b", "r", vec![1, 2]).unwrap();
    for contact in ["a", "b"] {
        d.add_contact_equation(ContactEquation::new("Poisson", contact))
            .unwrap();
    }
    let perm = d.load_permutations().unwrap();
    assert_eq!(perm.len(), 3);
}

// ── Interfaces ─────────────────────────────────────────────────────

fn with_interface(coupling: InterfaceCoupling) -> Device<f64> {
    let mut d = poisson_device();
    d.add_interface_equation("mid", InterfaceEquation::new("PotentialJump", "jump", coupling).with_sides("Poisson", "Poisson"))
        .unwrap();
    d
}

#[test]
fn continuous_interface_swaps_out_region1_row() {
    let mut d = with_interface(InterfaceCoupling::Continuous);
    assert_eq!(
        d.load_permutations().unwrap().get(2),
        Some(&PermutationEntry::new(1, false))
    );
    let out = dc(&mut d, WhatToLoad::Rhs);
    assert_eq!(rows(&out), vec![(0, 2.0), (1, -1.0), (2, 0.25), (3, -1.0)]);
}

#[test]
fn fluxterm_interface_keeps_both_equations() {
    let mut d = with_interface(InterfaceCoupling::FluxTerm);
    assert!(d.load_permutations().unwrap().is_empty());
    let out = dc(&mut d, WhatToLoad::Rhs);
    assert_eq!(rows(&out), vec![(0, 2.0), (1, -1.75), (2, 0.75), (3, -1.0)]);
}

#[test]
fn hybrid_interface_keeps_a_copy() {
    let mut d = with_interface(InterfaceCoupling::Hybrid);
    assert_eq!(
        d.load_permutations().unwrap().get(2),
        Some(&PermutationEntry::new(1, true))
    );
    let out = dc(&mut d, WhatToLoad::Rhs);
    assert_eq!(rows(&out), vec![(0, 2.0), (1, -1.0), (2, 0.75), (3, -1.0)]);
}

#[test]
fn contact_on_interface_node_wins() {
    let mut d = with_interface(InterfaceCoupling::Continuous);
    d.add_contact("gate", "right", vec![0]).unwrap();
    d.add_contact_equation(ContactEquation::new("Poisson", "gate"))
        .unwrap();
    let perm = d.load_permutations().unwrap();
    assert_eq!(perm.get(2), Some(&PermutationEntry::dropped()));
    assert_eq!(perm.len(), 1);
}

#[test]
fn interface_must_join_two_regions() {
    let mut d = two_region_device::<f64>();
    match d.add_interface("loop", "left", "left", &[(0, 1)]) {
        Err(DeviceError::SelfInterface { name }) => assert_eq!(name, "loop"),
        other => panic!("expected SelfInterface, got {other:?}"),
    }
}

// ── Update ─────────────────────────────────────────────────────────

#[test]
fn update_writes_every_region() {
    let mut d = poisson_device();
    let stats = d.update(&[0.1, 0.2, 0.3, 0.4]).unwrap();
    assert_eq!(stats.abs_error, 0.4);
    assert!((stats.rel_error - 1.0).abs() < 1.0e-6);
    let mut right = d.region_mut("right").unwrap().values(DomainKind::Node, "psi").unwrap().to_vec();
    right.iter_mut().for_each(|v| *v = (*v * 10.0).round());
    assert_eq!(right, vec![3.0, 4.0]);
    assert_eq!(d.last_update(), stats);
}

#[test]
fn update_length_must_match_rows() {
    let mut d = poisson_device();
    match d.update(&[0.0; 3]) {
        Err(DeviceError::Update(UpdateError::LengthMismatch { expected, actual })) => {
            assert_eq!((expected, actual), (4, 3));
        }
        other => panic!("expected LengthMismatch, got {other:?}"),
    }
}

#[test]
fn duplicate_names_are_rejected() {
    let mut d = poisson_device();
    assert!(matches!(
        d.add_region("left", line_topology(&[0.0, 1.0])),
        Err(DeviceError::DuplicateRegion { .. })
    ));
    assert!(matches!(
        d.add_equation("left", BulkEquation::new("Poisson", "phi")),
        Err(DeviceError::DuplicateEquation { .. })
    ));
    d.add_contact("anode", "left", vec![0]).unwrap();
    assert!(matches!(
        d.add_contact("anode", "right", vec![1]),
        Err(DeviceError::DuplicateContact { .. })
    ));
}

// ── Precision holder ───────────────────────────────────────────────

fn extended_holder(left_field: Extended) -> DeviceHolder {
    let mut d = two_region_device::<Extended>();
    for (region, field) in [("left", left_field), ("right", Extended::from(1.0))] {
        d.add_equation(region, BulkEquation::new("Poisson", "psi").with_edge_model("E"))
            .unwrap();
        d.region_mut(region)
            .unwrap()
            .set_uniform(DomainKind::Edge, "E", field);
    }
    DeviceHolder::from(d)
}

#[test]
fn extended_holder_narrows_into_double_buffers() {
    let mut holder = extended_holder(Extended::from(2.0));
    assert_eq!(holder.precision(), PrecisionKind::Extended);
    holder.load_permutations().unwrap();
    let mut out = AssemblyBuffers::<f64>::new();
    holder.assemble(WhatToLoad::Rhs, TimeMode::Dc, &mut out).unwrap();

    let expected = dc(&mut poisson_device(), WhatToLoad::Rhs).rhs_by_row();
    assert_eq!(out.rhs_by_row(), expected);
}

#[test]
fn extended_holder_keeps_digits_double_drops() {
    let tail = 1.0e-20;
    let field = Extended::from(1.0) + Extended::from(tail);
    let mut holder = extended_holder(field);
    holder.load_permutations().unwrap();

    let mut native = AssemblyBuffers::<Extended>::new();
    holder.assemble(WhatToLoad::Rhs, TimeMode::Dc, &mut native).unwrap();
    let row0 = native.rhs_by_row()[&0];
    assert_eq!((row0 - Extended::from(1.0)).widen(), tail);

    let mut narrowed = AssemblyBuffers::<f64>::new();
    holder.assemble(WhatToLoad::Rhs, TimeMode::Dc, &mut narrowed).unwrap();
    assert_eq!(narrowed.rhs_by_row()[&0], 1.0);
}

#[test]
fn holder_assembles_natively_when_precisions_match() {
    let mut holder = DeviceHolder::from(poisson_device());
    assert_eq!(holder.precision(), PrecisionKind::Double);
    holder.load_permutations().unwrap();
    let mut out = AssemblyBuffers::<f64>::new();
    holder.assemble(WhatToLoad::Rhs, TimeMode::Dc, &mut out).unwrap();
    let summed: BTreeMap<usize, f64> = out.rhs_by_row();
    assert_eq!(summed.len(), 4);
}

#[test]
fn holder_updates_from_either_precision() {
    let mut holder = extended_holder(Extended::from(2.0));
    holder.update(&[0.5f64, 0.25, 0.0, 0.0]).unwrap();
    let (abs, _) = holder.errors("left", "Poisson").unwrap();
    assert_eq!(abs, 0.5);
    assert_eq!(holder.variable("left", "Poisson"), Some("psi"));
    holder.update(&[Extended::from(0.0); 4]).unwrap();
    assert_eq!(holder.last_update().abs_error, 0.0);
}

#[test]
fn empty_holder_reports_its_precision() {
    let holder =
        DeviceHolder::new(PrecisionKind::Extended, "dev", AssemblyConfig::default()).unwrap();
    assert_eq!(holder.precision(), PrecisionKind::Extended);
    assert_eq!(holder.name(), "dev");
    assert_eq!(holder.row_count(), 0);
}

// ── Serialization ──────────────────────────────────────────────────

#[test]
fn device_serializes_equations_and_models() {
    let d = with_interface(InterfaceCoupling::Hybrid);
    let text = d.serialize();
    assert!(text.contains("begin_equation \"Poisson\""));
    assert!(text.contains("COMMAND equation -device \"dev\" -region \"left\" -name \"Poisson\""));
    assert!(text.contains("begin_interface_equation \"PotentialJump\""));
    assert!(text.contains("-type \"hybrid\""));
    assert!(text.contains("begin_edge_model \"E\""));
}
