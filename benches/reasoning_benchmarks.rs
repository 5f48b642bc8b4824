//! Reasoning performance benchmarks: direct lookup, transitive chains,
//! rule chaining, and bundle throughput.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use sys2::hdc::consts;
use sys2::{Config, Session, Strategy, Vector};

fn make_bench_session() -> Session {
    let mut config = Config::for_tests();
    // No wall-clock pressure while measuring
    config.proof.timeout_ms = 60_000;
    Session::new(config).expect("session")
}

fn bench_direct_ask(c: &mut Criterion) {
    let mut group = c.benchmark_group("direct_ask");
    for size in [100usize, 1_000, 5_000] {
        let mut session = make_bench_session();
        let program: String = (0..size)
            .map(|i| format!("IS_A Entity{i} Class{}\n", i % 50))
            .collect();
        session.run(&program).expect("populates");

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| session.ask("Entity7 IS_A Class7").expect("asks"));
        });
    }
    group.finish();
}

fn bench_transitive_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("isa_chain");
    for depth in [4usize, 8, 12] {
        let mut session = make_bench_session();
        let program: String = (0..depth)
            .map(|i| format!("IS_A Level{i} Level{}\n", i + 1))
            .collect();
        session.run(&program).expect("populates");
        let query = format!("Level0 IS_A Level{depth}");

        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| session.ask(&query).expect("asks"));
        });
    }
    group.finish();
}

fn bench_rule_chaining(c: &mut Criterion) {
    let mut group = c.benchmark_group("rule_chain");
    for facts in [50usize, 500] {
        let mut session = make_bench_session();
        let program: String = (0..facts)
            .map(|i| format!("parentOf P{i} C{i}\nlikes C{i} Music\n"))
            .collect();
        session.run(&program).expect("populates");
        session
            .run("@r rule (And (parentOf ?p ?c) (likes ?c Music)) (proudOf ?p ?c)")
            .expect("rule");
        let last = facts - 1;
        let goal = sys2::CompoundTree::Leaf(sys2::TriplePattern::ground(
            "proudOf",
            &[&format!("P{last}"), &format!("C{last}")],
        ));

        group.bench_with_input(BenchmarkId::from_parameter(facts), &facts, |b, _| {
            b.iter(|| session.prove(&goal, None));
        });
    }
    group.finish();
}

fn bench_bundle(c: &mut Criterion) {
    let mut group = c.benchmark_group("bundle");
    for count in [3usize, 9, 27] {
        let vectors: Vec<Vector> = (0..count)
            .map(|i| Vector::from_name(&format!("V{i}"), consts::GEOMETRY_DEFAULT, Strategy::Dense))
            .collect();
        let refs: Vec<&Vector> = vectors.iter().collect();

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| Vector::bundle(&refs).expect("bundles"));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_direct_ask,
    bench_transitive_chain,
    bench_rule_chaining,
    bench_bundle
);
criterion_main!(benches);
