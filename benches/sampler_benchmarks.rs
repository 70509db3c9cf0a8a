//! Simulator and sampler benchmarks.
//!
//! Statistical setup:
//! - Sample size: 100 iterations for the cheap stages, 10 for full fits
//! - Confidence intervals: 95% (Criterion default)
//!
//! Run with: cargo bench --bench sampler_benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use occusim::mcmc::graph::Graph;
use occusim::mcmc::{ChainSettings, GibbsEngine, McmcEngine, SamplerJob};
use occusim::prelude::*;
use occusim::scenarios::driver::{build_data, build_inits, monitors};

/// Data simulation across site counts.
fn bench_simulate(c: &mut Criterion) {
    let mut group = c.benchmark_group("Simulate");
    group.sample_size(100);
    group.confidence_level(0.95);

    for sites in [100, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::new("constant", sites), &sites, |b, &sites| {
            let sim = OccupancySimulator::new(sites, 3, OccupancyProcess::Constant { psi: 0.7, p: 0.4 })
                .unwrap();
            let mut rng = SimRng::new(42);
            b.iter(|| black_box(sim.simulate(&mut rng).unwrap()));
        });
    }

    group.finish();
}

/// Model graph compilation (loop unrolling, shapes, topological sort).
fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("Compile");
    group.sample_size(100);

    let scenario = OccupancyScenario::new(ScenarioConfig::vegetation()).unwrap();
    let data = scenario.simulate().unwrap();
    let template = scenario.template();
    let model = template.build();
    let set = build_data(&template, &data).unwrap();

    group.bench_function("vegetation", |b| {
        b.iter(|| black_box(Graph::compile(&model, &set).unwrap()));
    });
    group.bench_function("parse", |b| {
        let text = model.to_string();
        b.iter(|| black_box(Model::parse(&text).unwrap()));
    });

    group.finish();
}

/// One short chain of the built-in Gibbs engine per template.
fn bench_gibbs(c: &mut Criterion) {
    let mut group = c.benchmark_group("Gibbs");
    group.sample_size(10);

    for config in [ScenarioConfig::model_of_the_mean(), ScenarioConfig::vegetation()] {
        let name = config.scenario.name.clone();
        let scenario = OccupancyScenario::new(config).unwrap();
        let mut rng = scenario.rng();
        let data = scenario.simulate_with(&mut rng).unwrap();
        let template = scenario.template();
        let job = SamplerJob {
            model: template.build(),
            data: build_data(&template, &data).unwrap(),
            monitor: monitors(&template),
            inits: build_inits(&template, &data, &mut rng, 1),
            settings: ChainSettings {
                chains: 1,
                iterations: 200,
                burn_in: 50,
                thin: 1,
            },
        };
        let engine = GibbsEngine::new();
        group.bench_function(BenchmarkId::new("chain_200", name), |b| {
            b.iter(|| black_box(engine.run(&job).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_simulate, bench_compile, bench_gibbs);
criterion_main!(benches);
