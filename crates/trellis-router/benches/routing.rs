//! Trie lookup benchmarks.
//!
//! Run with: `cargo bench -p trellis-router`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use http::Method;
use trellis_router::{Params, PatternRouter, Tree};

fn build_tree(num_routes: usize) -> Tree<usize> {
    let mut tree = Tree::new();

    for i in 0..num_routes / 3 {
        tree.add(Method::GET, &format!("/api/v1/resource{i}"), i);
    }

    for i in 0..num_routes / 3 {
        tree.add(Method::GET, &format!("/api/v1/resource{i}/:id"), i);
    }

    for i in 0..num_routes / 3 {
        tree.add(Method::GET, &format!("/api/v1/org/:org/resource{i}/:id"), i);
    }

    tree
}

fn bench_literal_match(c: &mut Criterion) {
    let tree = build_tree(100);
    let mut params = Params::new();

    c.bench_function("literal_match", |b| {
        b.iter(|| {
            black_box(tree.find(&Method::GET, "/api/v1/resource20", &mut params));
        });
    });
}

fn bench_param_match(c: &mut Criterion) {
    let tree = build_tree(100);
    let mut params = Params::new();

    c.bench_function("param_match", |b| {
        b.iter(|| {
            black_box(tree.find(&Method::GET, "/api/v1/resource25/12345", &mut params));
        });
    });
}

fn bench_ambiguous_params(c: &mut Criterion) {
    let tree = build_tree(100);
    let mut params = Params::new();

    c.bench_function("ambiguous_params", |b| {
        b.iter(|| {
            black_box(tree.find(
                &Method::GET,
                "/api/v1/org/acme-corp/resource10/12345",
                &mut params,
            ));
        });
    });
}

fn bench_miss(c: &mut Criterion) {
    let tree = build_tree(100);
    let mut params = Params::new();

    c.bench_function("miss", |b| {
        b.iter(|| {
            black_box(tree.find(&Method::GET, "/api/v1/nonexistent/path", &mut params));
        });
    });
}

fn bench_pattern_fallback(c: &mut Criterion) {
    let mut patterns = PatternRouter::new();
    for i in 0..20 {
        patterns
            .add_str(Method::GET, &format!("^/static{i}/.*"), i)
            .unwrap();
    }

    c.bench_function("pattern_fallback", |b| {
        b.iter(|| {
            black_box(patterns.find(&Method::GET, "/static19/app.js"));
        });
    });
}

fn bench_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("scaling");

    for size in [30, 99, 300] {
        let tree = build_tree(size);
        let mut params = Params::new();
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                black_box(tree.find(&Method::GET, "/api/v1/resource5/42", &mut params));
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_literal_match,
    bench_param_match,
    bench_ambiguous_params,
    bench_miss,
    bench_pattern_fallback,
    bench_scaling
);
criterion_main!(benches);
