//! Benchmarks for WHERE compilation and statement assembly.
//!
//! Benchmark targets:
//! - Flat predicate lists of 1-64 leaves: <20us
//! - Nested groups: <50us
//! - IN lists of 10k values: <2ms

// Criterion macros generate items without docs - this is expected for benchmarks
// Benchmarks use expect/unwrap for simplicity - panics are acceptable in benchmarks
#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used)]

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::time::Duration;

use dbflow::Value;
use dbflow::query::{Logic, Operator, PredicateNode, QueryState, build_count, build_select, compile};

// ============================================================================
// Fixtures
// ============================================================================

fn flat(n: usize) -> Vec<PredicateNode> {
    (0..n)
        .map(|i| {
            let logic = if i % 3 == 0 { Logic::Or } else { Logic::And };
            PredicateNode::leaf(format!("col_{i}"), Operator::Ge, i, logic).unwrap()
        })
        .collect()
}

fn nested(depth: usize, width: usize) -> Vec<PredicateNode> {
    if depth == 0 {
        return flat(width);
    }
    let mut nodes = flat(width);
    nodes.push(PredicateNode::Group {
        logic: Logic::Or,
        nodes: nested(depth - 1, width),
    });
    nodes
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_flat(c: &mut Criterion) {
    let mut group = c.benchmark_group("where_flat");
    group.measurement_time(Duration::from_secs(5));

    for n in [1_usize, 8, 64] {
        let nodes = flat(n);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &nodes, |b, nodes| {
            b.iter(|| compile(black_box(nodes)));
        });
    }

    group.finish();
}

fn bench_nested(c: &mut Criterion) {
    let mut group = c.benchmark_group("where_nested");

    for depth in [1_usize, 4, 8] {
        let nodes = nested(depth, 4);
        group.bench_with_input(BenchmarkId::new("depth", depth), &nodes, |b, nodes| {
            b.iter(|| compile(black_box(nodes)));
        });
    }

    group.finish();
}

fn bench_in_list(c: &mut Criterion) {
    let mut group = c.benchmark_group("where_in_list");

    for n in [10_usize, 1_000, 10_000] {
        let values: Vec<Value> = (0..n).map(Value::from).collect();
        let nodes = vec![PredicateNode::leaf("id", Operator::In, values, Logic::And).unwrap()];
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &nodes, |b, nodes| {
            b.iter(|| compile(black_box(nodes)));
        });
    }

    group.finish();
}

fn bench_statements(c: &mut Criterion) {
    let mut group = c.benchmark_group("statement_assembly");

    let mut state = QueryState::new("users");
    state.alias = "u".to_string();
    state.select = "u.id, u.name, count(o.id) AS orders".to_string();
    state.joins = vec!["LEFT JOIN `orders` o ON o.user_id = u.id".to_string()];
    state.predicates = nested(2, 4);
    state.group_by = "u.id".to_string();
    state.order_by = "u.id DESC".to_string();

    group.bench_function("select", |b| {
        b.iter(|| build_select(black_box(&state)).unwrap());
    });
    group.bench_function("count", |b| {
        b.iter(|| build_count(black_box(&state)).unwrap());
    });

    group.finish();
}

criterion_group!(benches, bench_flat, bench_nested, bench_in_list, bench_statements);
criterion_main!(benches);
