//! Parsing benchmarks.
//!
//! Everything here runs on each keystroke in an editor, so it has to stay
//! well under a millisecond for realistic queries.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use logql_lens::builder::{build_visual_query, render_visual_query};
use logql_lens::completion::classify;
use logql_lens::logql::parse;
use logql_lens::query::identify_query;

const QUERIES: &[(&str, &str)] = &[
    ("selector", r#"{job="mysql", env=~"prod|staging"}"#),
    (
        "pipeline",
        r#"{job="mysql"} |= "error" != "timeout" | json | duration > 10s | line_format "{{.msg}}""#,
    ),
    (
        "metrics",
        r#"sum by (host) (rate({job="api"} | logfmt | unwrap latency | __error__="" [5m])) / on (host) sum by (host) (count_over_time({job="api"}[5m]))"#,
    ),
];

/// Parse into a syntax tree
fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");

    for (name, query) in QUERIES {
        group.bench_with_input(BenchmarkId::from_parameter(name), query, |b, query| {
            b.iter(|| black_box(parse(black_box(query))));
        });
    }

    group.bench_function("incomplete", |b| {
        b.iter(|| black_box(parse(black_box(r#"sum(rate({job="api", level=~"#))));
    });

    group.finish();
}

/// Cursor classification at every position of a query, as while typing
fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify");
    let (_, query) = QUERIES[1];

    group.bench_function("end_of_query", |b| {
        b.iter(|| black_box(classify(black_box(query), query.len())));
    });

    group.bench_function("every_prefix", |b| {
        b.iter(|| {
            for cursor in (0..=query.len()).filter(|&i| query.is_char_boundary(i)) {
                black_box(classify(&query[..cursor], cursor));
            }
        });
    });

    group.finish();
}

/// Visual query build and render
fn bench_visual_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("visual_query");

    for (name, query) in QUERIES {
        group.bench_with_input(BenchmarkId::new("build", name), query, |b, query| {
            b.iter(|| black_box(build_visual_query(black_box(query))));
        });

        let built = build_visual_query(query).query;
        group.bench_with_input(BenchmarkId::new("render", name), &built, |b, built| {
            b.iter(|| black_box(render_visual_query(black_box(built))));
        });
    }

    group.finish();
}

fn bench_identify_query(c: &mut Criterion) {
    let text = format!(
        "Here is a query that should help: {} It sums request latency per host.",
        QUERIES[2].1
    );

    c.bench_function("identify_query", |b| {
        b.iter(|| black_box(identify_query(black_box(&text))));
    });
}

criterion_group!(
    benches,
    bench_parse,
    bench_classify,
    bench_visual_query,
    bench_identify_query
);
criterion_main!(benches);
