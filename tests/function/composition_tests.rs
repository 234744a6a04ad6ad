//! Parameter mapping, sharing and cache invalidation across composed models.

use approx::assert_relative_eq;
use psrmeal::function::{EvaluationPolicy, Graph};
use psrmeal::models::SingleAxis;
use psrmeal::parameters::Estimate;
use psrmeal::value::{coherency, Axis, Value, ValueKind};

#[test]
fn test_distinct_models_fill_index_space() {
    let mut graph = Graph::new();
    let backend = SingleAxis::new(&mut graph).unwrap();
    let feed = graph.rotation("feed", Axis::V, 0.1).unwrap();
    let source = graph.coherency("source", [1.0, 0.1, 0.2, 0.3]).unwrap();

    let jones = graph
        .product(ValueKind::Jones, &[backend.node(), feed])
        .unwrap();
    let congruence = graph.congruence().unwrap();
    graph.set_transformation(congruence, jones).unwrap();
    graph.set_input(congruence, source).unwrap();

    assert_eq!(graph.nparam(congruence).unwrap(), 3 + 1 + 4);
    for (leaf, first) in [(feed, 3), (source, 4)] {
        assert_eq!(graph.find_parameter(congruence, leaf).unwrap(), Some(first));
    }
}

#[test]
fn test_shared_model_counted_once() {
    let mut graph = Graph::new();
    let backend = SingleAxis::new(&mut graph).unwrap();

    // the same backend on both sides of a product
    let twice = graph
        .product(ValueKind::Jones, &[backend.node(), backend.node()])
        .unwrap();
    assert_eq!(graph.nparam(twice).unwrap(), 3);

    backend.set_gain(&mut graph, Estimate::exact(3.0)).unwrap();
    let j = graph.evaluate(twice, None).unwrap().as_jones().unwrap();
    assert_relative_eq!(j[(0, 0)].re, 9.0, epsilon = 1e-12);
}

#[test]
fn test_write_reaches_every_parent() {
    let mut graph = Graph::new();
    let x = graph.scalar_value("x", 0.5).unwrap();
    let s = graph.sin(x).unwrap();
    let q = graph.square(x).unwrap();
    let top = graph.add(s, q).unwrap();

    assert_relative_eq!(graph.evaluate_scalar(top).unwrap(), 0.5f64.sin() + 0.25);
    assert_relative_eq!(graph.evaluate_scalar(s).unwrap(), 0.5f64.sin());

    graph.set_param(x, 0, 1.5).unwrap();
    assert!(graph.evaluation_changed(s).unwrap());
    assert!(graph.evaluation_changed(q).unwrap());
    assert!(graph.evaluation_changed(top).unwrap());
    assert_relative_eq!(graph.evaluate_scalar(top).unwrap(), 1.5f64.sin() + 2.25);
}

fn calibrated_source(graph: &mut Graph, gain: f64, phase: f64) -> psrmeal::NodeId {
    let backend = SingleAxis::new(graph).unwrap();
    backend.set_gain(graph, Estimate::exact(gain)).unwrap();
    backend.set_diff_phase(graph, Estimate::exact(phase)).unwrap();
    let source = graph
        .constant(Value::Jones(coherency([1.0, 0.3, 0.4, 0.1])))
        .unwrap();
    let congruence = graph.congruence().unwrap();
    graph.set_transformation(congruence, backend.node()).unwrap();
    graph.set_input(congruence, source).unwrap();
    congruence
}

#[test]
fn test_cache_never_stale() {
    let mut graph = Graph::new();
    let cached = calibrated_source(&mut graph, 1.0, 0.0);
    let first = graph.evaluate(cached, None).unwrap();
    let again = graph.evaluate(cached, None).unwrap();
    assert_eq!(first, again);

    graph.set_param(cached, 0, 1.7).unwrap();
    graph.set_param(cached, 2, 0.2).unwrap();
    let updated = graph.evaluate(cached, None).unwrap();

    let mut fresh = Graph::new();
    let rebuilt = calibrated_source(&mut fresh, 1.7, 0.4);
    fresh.set_policy(rebuilt, EvaluationPolicy::NotCached).unwrap();
    assert_eq!(updated, fresh.evaluate(rebuilt, None).unwrap());
}

#[test]
fn test_estimate_of_square() {
    let mut graph = Graph::new();
    let x = graph.scalar_value("x", 3.0).unwrap();
    graph.set_variance(x, 0, 0.04).unwrap();
    let y = graph.square(x).unwrap();

    let estimate = graph.estimate_scalar(y).unwrap();
    assert_eq!(estimate.value, 9.0);
    assert_relative_eq!(estimate.variance, 36.0 * 0.04, epsilon = 1e-14);
}

#[test]
fn test_vector_switch_invalidates() {
    let mut graph = Graph::new();
    let a = graph.scalar_value("a", 1.0).unwrap();
    let b = graph.scalar_value("b", 2.0).unwrap();
    let vector = graph.vector(ValueKind::Scalar, &[a, b]).unwrap();
    let doubled = graph.scale(2.0, vector).unwrap();

    assert_eq!(graph.evaluate_scalar(doubled).unwrap(), 2.0);
    graph.set_index(vector, 1).unwrap();
    assert_eq!(graph.evaluate_scalar(doubled).unwrap(), 4.0);
    assert_eq!(graph.nparam(doubled).unwrap(), 2);
}
