//! Fit a backend per channel, store the solutions and apply them elsewhere.

use approx::assert_relative_eq;
use num_complex::Complex64;
use psrmeal::error::ErrorKind;
use psrmeal::extension::PolnCalibratorExtension;
use psrmeal::fit::{ModelFit, Observation};
use psrmeal::function::Graph;
use psrmeal::interface;
use psrmeal::models::SingleAxis;
use psrmeal::parameters::Estimate;
use psrmeal::value::{coherency, Jones, Value};

use crate::test_helpers::init_logging;

const SOURCES: [[f64; 4]; 2] = [[1.0, 0.0, 0.8, 0.1], [1.0, 0.2, -0.1, 0.7]];

/// Truth of channel `ichan`: (G, gamma, phi).
fn truth(ichan: usize) -> (f64, f64, f64) {
    let x = ichan as f64;
    (1.0 + 0.1 * x, 0.05 * x - 0.1, 0.2 * x)
}

fn simulate(ichan: usize) -> Vec<Observation<[f64; 4]>> {
    let (gain, gamma, phi) = truth(ichan);
    let mut graph = Graph::new();
    let backend = SingleAxis::new(&mut graph).unwrap();
    let backend_interface = interface::single_axis();
    for command in [
        format!("G={}", gain),
        format!("gamma={}", gamma),
        format!("phi={}", phi),
    ] {
        backend_interface.process(&backend, &mut graph, &command).unwrap();
    }
    let j = graph.evaluate(backend.node(), None).unwrap().as_jones().unwrap();

    let variance = Complex64::new(1e-4, 1e-4);
    SOURCES
        .iter()
        .map(|s| {
            Observation::new(
                *s,
                Value::Jones(j * coherency(*s) * j.adjoint()),
                Value::Jones(Jones::new(variance, variance, variance, variance)),
            )
        })
        .collect()
}

#[test]
fn test_calibration_workflow() {
    init_logging();
    let nchan = 4;
    let mut extension = PolnCalibratorExtension::new("SingleAxis", nchan);

    let mut graph = Graph::new();
    let backend = SingleAxis::new(&mut graph).unwrap();
    let input = graph.constant(Value::Jones(coherency(SOURCES[0]))).unwrap();
    let congruence = graph.congruence().unwrap();
    graph.set_transformation(congruence, backend.node()).unwrap();
    graph.set_input(congruence, input).unwrap();

    // channel 2 is flagged and never fit
    for ichan in (0..nchan).filter(|&c| c != 2) {
        backend.set_gain(&mut graph, Estimate::exact(1.0)).unwrap();
        backend.set_diff_gain(&mut graph, Estimate::exact(0.0)).unwrap();
        backend.set_diff_phase(&mut graph, Estimate::exact(0.0)).unwrap();

        let report = ModelFit::new()
            .fit(&mut graph, congruence, &simulate(ichan), |g, s| {
                g.set_constant(input, Value::Jones(coherency(*s)))
            })
            .unwrap();
        assert!(report.converged);

        extension.record(ichan, &graph, backend.node()).unwrap();
        extension
            .get_transformation_mut(ichan)
            .unwrap()
            .unwrap()
            .set_goodness(report.chisq, report.nfree);
    }

    let text = extension.to_json().unwrap();
    let restored = PolnCalibratorExtension::from_json(&text).unwrap();
    assert_eq!(restored, extension);
    assert!(!restored.get_valid(2).unwrap());

    let mut target_graph = Graph::new();
    let target = SingleAxis::new(&mut target_graph).unwrap();
    let target_interface = interface::single_axis();
    for ichan in [0, 1, 3] {
        restored.apply(ichan, &mut target_graph, target.node()).unwrap();
        let (gain, gamma, phi) = truth(ichan);
        let fitted = target_interface
            .get_estimate(&target, &mut target_graph, "G")
            .unwrap();
        assert_relative_eq!(fitted.value, gain, epsilon = 1e-6);
        assert!(fitted.variance > 0.0);
        assert_relative_eq!(
            target_interface.get_estimate(&target, &mut target_graph, "gamma").unwrap().value,
            gamma,
            epsilon = 1e-6
        );
        assert_relative_eq!(
            target_interface.get_estimate(&target, &mut target_graph, "phi").unwrap().value,
            phi,
            epsilon = 1e-6
        );
        let transformation = restored.get_transformation(ichan).unwrap().unwrap();
        assert_eq!(transformation.get_nfree(), 2 * 8 - 3);
    }

    let err = restored.apply(2, &mut target_graph, target.node()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[test]
fn test_parameter_listing_transfers_state() {
    let mut graph = Graph::new();
    let source = SingleAxis::new(&mut graph).unwrap();
    interface::single_axis()
        .process(&source, &mut graph, "G=2.5+/-0.1")
        .unwrap();
    graph.set_infit(source.node(), 2, false).unwrap();
    let listing = graph.print_parameters(source.node()).unwrap();

    let target = SingleAxis::new(&mut graph).unwrap();
    graph.parse_parameters(target.node(), &listing).unwrap();

    let gain = target.get_gain(&graph).unwrap();
    assert_relative_eq!(gain.value, 2.5, epsilon = 1e-12);
    assert_relative_eq!(gain.get_error(), 0.1, epsilon = 1e-12);
    assert!(!graph.get_infit(target.node(), 2).unwrap());
}
