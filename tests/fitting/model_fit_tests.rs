//! Generic model fits against simulated observations.

use approx::assert_relative_eq;
use psrmeal::error::ErrorKind;
use psrmeal::fit::{ModelFit, Observation};
use psrmeal::function::Graph;
use psrmeal::lm::LevenbergMarquardt;
use psrmeal::models::SingleAxis;
use psrmeal::parameters::Estimate;
use psrmeal::value::{coherency, Jones, Value};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

use crate::test_helpers::init_logging;

const SOURCES: [[f64; 4]; 3] = [
    [1.0, 0.3, 0.5, 0.2],
    [1.0, -0.4, 0.1, 0.6],
    [1.0, 0.0, -0.7, 0.1],
];

/// `J rho J^dagger` for a backend with known parameters.
fn observed(gain: f64, diff_gain: f64, diff_phase: f64, stokes: [f64; 4]) -> Jones {
    let mut graph = Graph::new();
    let backend = SingleAxis::new(&mut graph).unwrap();
    backend.set_gain(&mut graph, Estimate::exact(gain)).unwrap();
    backend.set_diff_gain(&mut graph, Estimate::exact(diff_gain)).unwrap();
    backend.set_diff_phase(&mut graph, Estimate::exact(diff_phase)).unwrap();
    let j = graph.evaluate(backend.node(), None).unwrap().as_jones().unwrap();
    j * coherency(stokes) * j.adjoint()
}

/// A congruence of a single-axis backend whose input is switched per observation.
fn calibrator(graph: &mut Graph) -> (SingleAxis, psrmeal::NodeId, psrmeal::NodeId) {
    let backend = SingleAxis::new(graph).unwrap();
    let input = graph.constant(Value::Jones(coherency(SOURCES[0]))).unwrap();
    let congruence = graph.congruence().unwrap();
    graph.set_transformation(congruence, backend.node()).unwrap();
    graph.set_input(congruence, input).unwrap();
    (backend, input, congruence)
}

fn uniform_variance(variance: f64) -> Value {
    let v = num_complex::Complex64::new(variance, variance);
    Value::Jones(Jones::new(v, v, v, v))
}

#[test]
fn test_backend_solution_recovered() {
    init_logging();
    let mut graph = Graph::new();
    let (backend, input, congruence) = calibrator(&mut graph);

    let observations: Vec<Observation<[f64; 4]>> = SOURCES
        .iter()
        .map(|s| {
            Observation::new(
                *s,
                Value::Jones(observed(1.5, 0.2, 0.6, *s)),
                uniform_variance(1e-4),
            )
        })
        .collect();

    let report = ModelFit::new()
        .fit(&mut graph, congruence, &observations, |g, s| {
            g.set_constant(input, Value::Jones(coherency(*s)))
        })
        .unwrap();

    assert!(report.converged, "{}", report.message);
    assert!(report.chisq < 1e-8);
    assert_relative_eq!(backend.get_gain(&graph).unwrap().value, 1.5, epsilon = 1e-6);
    assert_relative_eq!(backend.get_diff_gain(&graph).unwrap().value, 0.2, epsilon = 1e-6);
    assert_relative_eq!(backend.get_diff_phase(&graph).unwrap().value, 0.6, epsilon = 1e-6);
    assert!(backend.get_gain(&graph).unwrap().variance > 0.0);
    assert_eq!(report.covariance.shape(), &[3, 3]);
}

#[test]
fn test_noisy_fit_has_sensible_chisq() {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let sigma = 0.01;
    let noise = Normal::new(0.0, sigma).unwrap();

    let mut graph = Graph::new();
    let (backend, input, congruence) = calibrator(&mut graph);

    let mut observations = Vec::new();
    for _ in 0..20 {
        for s in SOURCES {
            let mut data = observed(1.2, -0.1, 0.3, s);
            for z in data.iter_mut() {
                z.re += noise.sample(&mut rng);
                z.im += noise.sample(&mut rng);
            }
            observations.push(Observation::new(s, Value::Jones(data), uniform_variance(sigma * sigma)));
        }
    }

    let report = ModelFit::new()
        .fit(&mut graph, congruence, &observations, |g, s| {
            g.set_constant(input, Value::Jones(coherency(*s)))
        })
        .unwrap();

    assert!(report.converged);
    assert_eq!(report.nfree, 60 * 8 - 3);
    // chi-squared per degree of freedom is of order unity
    let reduced = report.reduced_chisq();
    assert!(reduced > 0.7 && reduced < 1.3, "reduced chisq {}", reduced);

    let gain = backend.get_gain(&graph).unwrap();
    assert!((gain.value - 1.2).abs() < 5.0 * gain.get_error());
}

#[test]
fn test_non_finite_data_rejected() {
    let mut graph = Graph::new();
    let x = graph.scalar_value("x", 1.0).unwrap();
    let observations = vec![
        Observation::new((), Value::Scalar(f64::NAN), Value::Scalar(1.0)),
        Observation::new((), Value::Scalar(2.0), Value::Scalar(1.0)),
    ];
    let err = ModelFit::new()
        .fit(&mut graph, x, &observations, |_, _| Ok(()))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[test]
fn test_iteration_limit_reported() {
    let mut graph = Graph::new();
    let x = graph.scalar_value("x", 0.0).unwrap();
    let y = graph.exp(x).unwrap();
    let observations = vec![Observation::new((), Value::Scalar(2.0), Value::Scalar(0.01))];

    let solver = LevenbergMarquardt::new().with_max_iterations(2);
    let report = ModelFit::with_solver(solver)
        .fit(&mut graph, y, &observations, |_, _| Ok(()))
        .unwrap();
    assert!(!report.converged);
    assert_eq!(report.iterations, 2);
}
