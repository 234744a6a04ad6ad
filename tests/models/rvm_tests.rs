//! Rotating vector model and its complex linear-polarization form.

use approx::assert_relative_eq;
use num_complex::Complex64;
use psrmeal::function::Graph;
use psrmeal::models::{ComplexRvm, RotatingVectorModel};
use psrmeal::parameters::Estimate;

use crate::test_helpers::{assert_gradient_matches, rvm_position_angle};

fn set_geometry(graph: &mut Graph, rvm: &RotatingVectorModel, psi0: f64, zeta: f64, alpha: f64, phi0: f64) {
    rvm.set_reference_position_angle(graph, Estimate::exact(psi0)).unwrap();
    rvm.set_line_of_sight(graph, Estimate::exact(zeta)).unwrap();
    rvm.set_magnetic_axis(graph, Estimate::exact(alpha)).unwrap();
    rvm.set_magnetic_meridian(graph, Estimate::exact(phi0)).unwrap();
}

#[test]
fn test_stokes_are_normalised() {
    let mut graph = Graph::new();
    let rvm = RotatingVectorModel::new(&mut graph).unwrap();
    set_geometry(&mut graph, &rvm, -0.4, 0.8, 0.5, 0.2);

    for k in 0..20 {
        let phase = -1.0 + 0.1 * k as f64;
        rvm.set_abscissa(&mut graph, phase).unwrap();
        let q = graph.evaluate_scalar(rvm.q()).unwrap();
        let u = graph.evaluate_scalar(rvm.u()).unwrap();
        assert_relative_eq!(q * q + u * u, 1.0, epsilon = 1e-12);

        let psi = rvm_position_angle(-0.4, 0.8, 0.5, 0.2, phase);
        assert_relative_eq!(q, (2.0 * psi).cos(), epsilon = 1e-12);
        assert_relative_eq!(u, (2.0 * psi).sin(), epsilon = 1e-12);
    }
}

#[test]
fn test_complex_rvm_states() {
    let mut graph = Graph::new();
    let mut model = ComplexRvm::new(&mut graph).unwrap();
    let rvm = *model.get_rvm();
    set_geometry(&mut graph, &rvm, 0.1, 1.2, 1.0, 0.0);

    let phases = [-0.3, 0.0, 0.4];
    for (i, &phase) in phases.iter().enumerate() {
        let linear = Complex64::new(0.0, 1.0 + i as f64);
        assert_eq!(model.add_state(&mut graph, phase, linear).unwrap(), i);
    }
    // three gains, the constrained complex phase and four angles
    assert_eq!(graph.nparam(model.node()).unwrap(), 3 + 2 + 4);
    for leaf in [rvm.psi0(), rvm.zeta(), rvm.alpha(), rvm.phi0()] {
        let index = graph.find_parameter(model.node(), leaf).unwrap().unwrap();
        assert!((5..9).contains(&index));
    }

    for (i, &phase) in phases.iter().enumerate() {
        model.set_state(&mut graph, i).unwrap();
        let z = graph.evaluate(model.node(), None).unwrap().as_complex().unwrap();
        let psi = rvm_position_angle(0.1, 1.2, 1.0, 0.0, phase);
        let expected = Complex64::from_polar(1.0 + i as f64, 2.0 * psi);
        assert_relative_eq!(z.re, expected.re, epsilon = 1e-12);
        assert_relative_eq!(z.im, expected.im, epsilon = 1e-12);
    }
}

#[test]
fn test_complex_rvm_gradient() {
    let mut graph = Graph::new();
    let mut model = ComplexRvm::new(&mut graph).unwrap();
    let rvm = *model.get_rvm();
    set_geometry(&mut graph, &rvm, 0.3, 1.1, 0.9, 0.05);
    for &phase in &[-0.2, 0.1] {
        model.add_state(&mut graph, phase, Complex64::new(0.7, 0.0)).unwrap();
    }

    for i in 0..2 {
        model.set_state(&mut graph, i).unwrap();
        assert_gradient_matches(&mut graph, model.node(), 1e-6, 1e-7);
    }

    // the unit phase is computed from the RVM, so its inputs are not fitted
    let node = model.node();
    let constrained: Vec<usize> = (0..graph.nparam(node).unwrap())
        .filter(|&i| !graph.get_infit(node, i).unwrap())
        .collect();
    assert_eq!(constrained, vec![2, 3]);
    assert_eq!(graph.get_param_name(node, 2).unwrap(), "real");
    assert_eq!(graph.get_param_name(node, 3).unwrap(), "imag");
}

#[test]
fn test_position_angle_follows_phase() {
    let mut graph = Graph::new();
    let rvm = RotatingVectorModel::new(&mut graph).unwrap();
    let (alpha, zeta) = (60f64.to_radians(), 70f64.to_radians());
    set_geometry(&mut graph, &rvm, 0.0, zeta, alpha, 0.0);

    rvm.set_abscissa(&mut graph, 0.0).unwrap();
    assert_relative_eq!(rvm.position_angle(&mut graph).unwrap(), 0.0, epsilon = 1e-12);

    // steepest swing at the magnetic meridian
    let h = 1e-5;
    rvm.set_abscissa(&mut graph, h).unwrap();
    let upper = rvm.position_angle(&mut graph).unwrap();
    rvm.set_abscissa(&mut graph, -h).unwrap();
    let lower = rvm.position_angle(&mut graph).unwrap();
    let slope = (upper - lower) / (2.0 * h);
    assert_relative_eq!(slope, alpha.sin() / (zeta - alpha).sin(), epsilon = 1e-6);
}
