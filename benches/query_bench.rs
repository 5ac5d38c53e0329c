//! Benchmarks for the log query engine
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use logviewer::config::{ExecutionConfig, QueryConfig};
use logviewer::index::TokenIndex;
use logviewer::log::LogItem;
use logviewer::pattern::Pattern;
use logviewer::query::{compile, Cancellation, Executor};

fn create_test_records(count: usize) -> Vec<LogItem> {
    (0..count)
        .map(|i| {
            let message = match i % 4 {
                0 => format!("GET /api/items/{} took {}ms status=200", i, i % 97),
                1 => format!("POST /api/orders took {}ms status=201", i % 53),
                2 => format!("error {} while reading block {}", 500 + i % 4, i),
                _ => format!("cache miss key=user:{}", i % 1000),
            };
            LogItem::new("bench.log", i as u64 + 1, i as u64 * 64, message)
        })
        .collect()
}

fn bench_pattern(c: &mut Criterion) {
    let mut group = c.benchmark_group("pattern");

    let literal = Pattern::new("cache miss").unwrap();
    let captures = Pattern::new("{method} {path} took {ms:number}ms").unwrap();
    let line = "GET /api/items/42 took 17ms status=200";

    group.bench_function("literal", |b| b.iter(|| literal.is_match(black_box(line))));
    group.bench_function("captures", |b| b.iter(|| captures.matches(black_box(line))));

    group.finish();
}

fn bench_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("index");

    for size in [1_000, 10_000] {
        let records = create_test_records(size);
        group.throughput(Throughput::Elements(size as u64));

        group.bench_function(format!("build_{}", size), |b| {
            b.iter(|| TokenIndex::build(black_box(&records)))
        });

        let index = TokenIndex::build(&records);
        group.bench_function(format!("candidates_{}", size), |b| {
            b.iter(|| index.candidates(black_box("while reading")))
        });
    }

    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("query");
    let records = create_test_records(50_000);
    group.throughput(Throughput::Elements(records.len() as u64));

    let queries = [
        ("phrase", r#""error {code:number}""#),
        (
            "group_by",
            r#""{method} {path} took {ms:number}ms" | group by method compute count(), mean(ms), median(ms)"#,
        ),
        (
            "parse_kv",
            r#""status=" | parse @message with kv | aggregate distinct(status)"#,
        ),
    ];

    for (name, text) in queries {
        let plan = compile(text, &QueryConfig::default()).unwrap();

        for (mode, config) in [
            ("sequential", ExecutionConfig {
                parallel_threshold: usize::MAX,
                ..ExecutionConfig::default()
            }),
            ("parallel", ExecutionConfig::default()),
        ] {
            let executor = Executor::new(config);
            group.bench_function(format!("{}_{}", name, mode), |b| {
                b.iter(|| {
                    executor
                        .execute(&plan, black_box(records.clone()), &Cancellation::new())
                        .unwrap()
                })
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_pattern, bench_index, bench_query);
criterion_main!(benches);
