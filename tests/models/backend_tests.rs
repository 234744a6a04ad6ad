//! Receiver models: single-axis backend, variable backend and feed.

use approx::assert_relative_eq;
use num_complex::Complex64;
use psrmeal::error::ErrorKind;
use psrmeal::function::Graph;
use psrmeal::models::{Britton2000, SingleAxis, VariableBackend};
use psrmeal::parameters::Estimate;
use psrmeal::value::Jones;

use crate::test_helpers::value_approx_eq;

/// `G diag(exp(gamma/2 + i phi/2), exp(-gamma/2 - i phi/2))`
fn single_axis_jones(gain: f64, diff_gain: f64, diff_phase: f64) -> Jones {
    let zero = Complex64::new(0.0, 0.0);
    let half = Complex64::new(0.5 * diff_gain, 0.5 * diff_phase);
    Jones::new(gain * half.exp(), zero, zero, gain * (-half).exp())
}

#[test]
fn test_variable_backend_scenario() {
    let mut graph = Graph::new();
    let backend = VariableBackend::new(&mut graph).unwrap();
    backend.set_gain(&mut graph, Estimate::exact(2.0)).unwrap();
    backend.set_diff_gain(&mut graph, Estimate::exact(0.1)).unwrap();
    backend.set_diff_phase(&mut graph, Estimate::exact(0.0)).unwrap();
    for i in 0..3 {
        assert!(graph.get_infit(backend.node(), i).unwrap());
    }

    let j = graph.evaluate(backend.node(), None).unwrap().as_jones().unwrap();
    let expected = single_axis_jones(2.0, 0.1, 0.0);
    for (a, b) in j.iter().zip(expected.iter()) {
        assert_relative_eq!(a.re, b.re, epsilon = 1e-14);
        assert_relative_eq!(a.im, b.im, epsilon = 1e-14);
    }

    let half = graph.scalar_constant(0.5).unwrap();
    backend.set_gain_variation(&mut graph, half).unwrap();
    let err = backend
        .set_gain(&mut graph, Estimate::exact(3.0))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    // the variation now supplies the gain
    let j = graph.evaluate(backend.node(), None).unwrap().as_jones().unwrap();
    assert_relative_eq!(j[(0, 0)].re, 0.5 * 0.05f64.exp(), epsilon = 1e-14);
    assert_relative_eq!(backend.get_gain(&mut graph).unwrap().value, 0.5);
}

#[test]
fn test_gain_varies_with_time() {
    let mut graph = Graph::new();
    let backend = VariableBackend::new(&mut graph).unwrap();
    let drift = graph.polynomial("gain", 2, 0.0).unwrap();
    graph.set_param(drift, 0, 1.0).unwrap();
    graph.set_param(drift, 1, 0.25).unwrap();
    backend.set_gain_variation(&mut graph, drift).unwrap();

    // gain, diff_gain, diff_phase of the backend plus two coefficients
    assert_eq!(graph.nparam(backend.node()).unwrap(), 5);

    for &(t, gain) in &[(0.0, 1.0), (2.0, 1.5), (-4.0, 0.0)] {
        graph.set_abscissa(drift, t).unwrap();
        let j = graph.evaluate(backend.node(), None).unwrap();
        let expected = psrmeal::Value::Jones(single_axis_jones(gain, 0.0, 0.0));
        assert!(value_approx_eq(&j, &expected, 1e-14));
    }
}

#[test]
fn test_britton_ideal_feed() {
    let mut graph = Graph::new();
    let model = Britton2000::new(&mut graph).unwrap();
    let backend = model.get_backend();
    backend.set_gain(&mut graph, Estimate::exact(1.2)).unwrap();
    backend.set_diff_phase(&mut graph, Estimate::exact(0.3)).unwrap();

    let reference = SingleAxis::new(&mut graph).unwrap();
    reference.set_gain(&mut graph, Estimate::exact(1.2)).unwrap();
    reference.set_diff_phase(&mut graph, Estimate::exact(0.3)).unwrap();

    let a = graph.evaluate(model.node(), None).unwrap();
    let b = graph.evaluate(reference.node(), None).unwrap();
    assert!(value_approx_eq(&a, &b, 1e-14));
}

#[test]
fn test_britton_reductions() {
    let mut graph = Graph::new();
    let model = Britton2000::new(&mut graph).unwrap();
    model.set_delta_theta(&mut graph, Estimate::exact(0.1)).unwrap();
    model.set_delta_chi(&mut graph, Estimate::exact(0.2)).unwrap();
    assert_eq!(graph.nparam(model.node()).unwrap(), 7);

    model.equal_orientations(&mut graph).unwrap();
    assert_eq!(model.get_delta_theta(&graph).unwrap().value, 0.0);
    assert!(!graph.get_infit(model.node(), 3).unwrap());
    assert_relative_eq!(model.get_delta_chi(&graph).unwrap().value, 0.2);

    model.equal_ellipticities(&mut graph).unwrap();
    assert_eq!(model.get_delta_chi(&graph).unwrap().value, 0.0);
    assert!(!graph.get_infit(model.node(), 5).unwrap());

    // the topology is unchanged
    assert_eq!(graph.nparam(model.node()).unwrap(), 7);
    let free = (0..7)
        .filter(|&i| graph.get_infit(model.node(), i).unwrap())
        .count();
    assert_eq!(free, 5);
}

#[test]
fn test_britton_orientation_rotates_feed() {
    let mut graph = Graph::new();
    let model = Britton2000::new(&mut graph).unwrap();
    model.set_sigma_theta(&mut graph, Estimate::exact(0.4)).unwrap();

    let j = graph.evaluate(model.get_feed(), None).unwrap().as_jones().unwrap();
    // R_V(0.2) = cos(0.2) I + i sin(0.2) sigma_3
    assert_relative_eq!(j[(0, 0)].re, 0.2f64.cos(), epsilon = 1e-14);
    assert_relative_eq!(j[(0, 1)].re, 0.2f64.sin(), epsilon = 1e-14);
    assert_relative_eq!(j[(1, 0)].re, -(0.2f64.sin()), epsilon = 1e-14);
}
