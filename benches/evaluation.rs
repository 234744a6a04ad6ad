//! Benchmarks for graph evaluation and model fitting

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use psrmeal::fit::{ComplexRvmFit, LinearPolarization};
use psrmeal::function::Graph;
use psrmeal::models::{Britton2000, SingleAxis};
use psrmeal::parameters::Estimate;
use psrmeal::value::{Value, ValueKind};

fn bench_congruence(c: &mut Criterion) {
    let mut group = c.benchmark_group("congruence");

    let mut graph = Graph::new();
    let feed = Britton2000::new(&mut graph).unwrap();
    let backend = SingleAxis::new(&mut graph).unwrap();
    let instrument = graph
        .product(ValueKind::Jones, &[backend.node(), feed.node()])
        .unwrap();
    let source = graph.coherency("source", [1.0, 0.2, 0.3, 0.1]).unwrap();
    let congruence = graph.congruence().unwrap();
    graph.set_transformation(congruence, instrument).unwrap();
    graph.set_input(congruence, source).unwrap();

    // alternate between two values so the cache never answers
    group.bench_function("value", |b| {
        let mut toggle = false;
        b.iter(|| {
            toggle = !toggle;
            let gain = if toggle { 1.1 } else { 1.2 };
            backend.set_gain(&mut graph, Estimate::exact(gain)).unwrap();
            black_box(graph.evaluate(congruence, None).unwrap())
        })
    });

    group.bench_function("gradient", |b| {
        let mut gradient: Vec<Value> = Vec::new();
        let mut toggle = false;
        b.iter(|| {
            toggle = !toggle;
            let gain = if toggle { 1.1 } else { 1.2 };
            backend.set_gain(&mut graph, Estimate::exact(gain)).unwrap();
            black_box(graph.evaluate(congruence, Some(&mut gradient)).unwrap())
        })
    });

    group.bench_function("cached", |b| {
        b.iter(|| black_box(graph.evaluate(congruence, None).unwrap()))
    });

    group.finish();
}

fn rvm_data(nbin: usize) -> Vec<LinearPolarization> {
    let (alpha, zeta) = (60f64.to_radians(), 70f64.to_radians());
    (0..nbin)
        .map(|k| {
            let phi = (-45.0 + 90.0 * k as f64 / (nbin - 1) as f64).to_radians();
            let n = zeta.sin() * alpha.cos() - zeta.cos() * alpha.sin() * phi.cos();
            let e = alpha.sin() * phi.sin();
            let psi = e.atan2(n);
            LinearPolarization::new(
                phi,
                Estimate::new((2.0 * psi).cos(), 1e-4),
                Estimate::new((2.0 * psi).sin(), 1e-4),
            )
        })
        .collect()
}

fn bench_rvm_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("complex_rvm_fit");
    group.sample_size(10); // Reduce sample size for slow benchmarks

    for nbin in [16, 64, 256] {
        group.bench_with_input(BenchmarkId::new("solve", nbin), &nbin, |b, &nbin| {
            b.iter(|| {
                let mut fit = ComplexRvmFit::new().unwrap();
                fit.set_observations(rvm_data(nbin));
                fit.set_magnetic_axis(Estimate::exact(59f64.to_radians())).unwrap();
                fit.solve().unwrap();
                black_box(fit.get_chisq())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_congruence, bench_rvm_fit);
criterion_main!(benches);
