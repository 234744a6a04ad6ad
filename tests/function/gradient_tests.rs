//! Analytic gradients of composed models against central differences.

use crate::test_helpers::{assert_gradient_matches, init_logging};
use num_complex::Complex64;
use psrmeal::function::Graph;
use psrmeal::models::{Britton2000, Faraday, RotatingVectorModel};
use psrmeal::parameters::Estimate;
use psrmeal::value::{Spinor, ValueKind};

fn britton(graph: &mut Graph) -> Britton2000 {
    let model = Britton2000::new(graph).unwrap();
    let backend = model.get_backend();
    backend.set_gain(graph, Estimate::exact(1.3)).unwrap();
    backend.set_diff_gain(graph, Estimate::exact(0.12)).unwrap();
    backend.set_diff_phase(graph, Estimate::exact(-0.7)).unwrap();
    model.set_delta_theta(graph, Estimate::exact(0.05)).unwrap();
    model.set_sigma_theta(graph, Estimate::exact(0.3)).unwrap();
    model.set_delta_chi(graph, Estimate::exact(-0.04)).unwrap();
    model.set_sigma_chi(graph, Estimate::exact(0.2)).unwrap();
    model
}

#[test]
fn test_congruence_gradient() {
    init_logging();
    let mut graph = Graph::new();
    let model = britton(&mut graph);
    let source = graph.coherency("source", [1.0, 0.2, -0.3, 0.4]).unwrap();
    let congruence = graph.congruence().unwrap();
    graph.set_transformation(congruence, model.node()).unwrap();
    graph.set_input(congruence, source).unwrap();

    assert_eq!(graph.nparam(congruence).unwrap(), 11);
    assert_gradient_matches(&mut graph, congruence, 1e-6, 1e-7);
}

#[test]
fn test_mueller_gradient() {
    let mut graph = Graph::new();
    let model = britton(&mut graph);
    let mueller = graph.mueller(model.node()).unwrap();
    assert_gradient_matches(&mut graph, mueller, 1e-6, 1e-7);
}

#[test]
fn test_rvm_gradient() {
    let mut graph = Graph::new();
    let rvm = RotatingVectorModel::new(&mut graph).unwrap();
    rvm.set_reference_position_angle(&mut graph, Estimate::exact(0.3)).unwrap();
    rvm.set_line_of_sight(&mut graph, Estimate::exact(1.1)).unwrap();
    rvm.set_magnetic_axis(&mut graph, Estimate::exact(0.9)).unwrap();
    rvm.set_magnetic_meridian(&mut graph, Estimate::exact(0.05)).unwrap();

    for &phase in &[-0.4, 0.0, 0.25] {
        rvm.set_abscissa(&mut graph, phase).unwrap();
        assert_gradient_matches(&mut graph, rvm.q(), 1e-6, 1e-7);
        assert_gradient_matches(&mut graph, rvm.u(), 1e-6, 1e-7);
    }
}

#[test]
fn test_faraday_gradient() {
    let mut graph = Graph::new();
    let faraday = Faraday::new(&mut graph, 1400.0).unwrap();
    faraday
        .set_rotation_measure(&mut graph, Estimate::exact(35.0))
        .unwrap();
    faraday
        .set_reference_frequency(&mut graph, Some(1200.0))
        .unwrap();
    let mueller = graph.mueller(faraday.node()).unwrap();
    assert_gradient_matches(&mut graph, mueller, 1e-5, 1e-7);
}

#[test]
fn test_spinor_coherency_gradient() {
    let mut graph = Graph::new();
    let spinor = graph
        .spinor(
            "field",
            Spinor::new(Complex64::new(0.8, -0.1), Complex64::new(0.3, 0.5)),
        )
        .unwrap();
    let gain = graph.gain("g", ValueKind::Jones, 1.2).unwrap();
    let outer = graph.outer(spinor).unwrap();
    let congruence = graph.congruence().unwrap();
    graph.set_transformation(congruence, gain).unwrap();
    graph.set_input(congruence, outer).unwrap();

    assert_eq!(graph.nparam(congruence).unwrap(), 5);
    assert_gradient_matches(&mut graph, congruence, 1e-6, 1e-7);
}
