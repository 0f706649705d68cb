use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use gpso::{Domain, Gpso};

fn sphere(x: &[f64]) -> f64 {
    -x.iter().map(|v| v * v).sum::<f64>()
}

fn bench_sphere(c: &mut Criterion) {
    let mut group = c.benchmark_group("gpso_sphere");
    group.sample_size(10);

    for dims in [1, 2, 4] {
        group.bench_with_input(BenchmarkId::new("dims", dims), &dims, |b, &dims| {
            let domain = Domain::new(vec![-5.0; dims], vec![5.0; dims]).unwrap();
            b.iter(|| {
                let mut opt = Gpso::builder().varsigma(3.0).build().unwrap();
                opt.run(sphere, &domain, 30).unwrap()
            });
        });
    }
    group.finish();
}

fn bench_lookahead_depth(c: &mut Criterion) {
    let mut group = c.benchmark_group("gpso_budget");
    group.sample_size(10);

    let domain = Domain::new(vec![-1.0, -1.0], vec![1.0, 1.0]).unwrap();
    for budget in [20, 50] {
        group.bench_with_input(BenchmarkId::new("n_max", budget), &budget, |b, &budget| {
            b.iter(|| {
                let mut opt = Gpso::builder().eta(0.05).build().unwrap();
                opt.run(
                    |x: &[f64]| -(x[0] - 0.3).powi(2) - (x[1] + 0.4).powi(2),
                    &domain,
                    budget,
                )
                .unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_sphere, bench_lookahead_depth);
criterion_main!(benches);
