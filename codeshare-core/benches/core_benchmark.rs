use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use codeshare_core::{BoundaryConfig, BoundaryEnforcer, LineTable, ReplicatedDocument};
use std::hint::black_box;

fn sample_body(lines: usize) -> String {
    (0..lines).map(|i| format!("    x{i} = {i} * 2\n")).collect()
}

fn bench_local_delta(c: &mut Criterion) {
    let mut group = c.benchmark_group("CRDT Operations");
    group.throughput(Throughput::Elements(1));

    group.bench_function("local_keystroke_delta", |b| {
        // Keystrokes land on an ever-growing document.
        let mut doc = ReplicatedDocument::with_client_id(1);
        let mut text = sample_body(200);
        doc.replace_text(&text);

        b.iter(|| {
            text.push('a');
            black_box(doc.replace_text(black_box(&text)));
        })
    });

    group.finish();
}

fn bench_apply_remote(c: &mut Criterion) {
    let mut group = c.benchmark_group("CRDT Operations");
    group.throughput(Throughput::Elements(1));

    let mut source = ReplicatedDocument::with_client_id(1);
    let delta = source.replace_text(&sample_body(200)).unwrap_or_default();

    group.bench_function("apply_remote_delta", |b| {
        // Same update repeatedly: exercises the idempotent path.
        let mut dest = ReplicatedDocument::with_client_id(2);
        b.iter(|| {
            dest.apply_delta(black_box(&delta)).unwrap();
        })
    });

    group.finish();
}

fn bench_boundary_check(c: &mut Criterion) {
    let config = BoundaryConfig::new("def solve(data):\n", "\n\nprint(solve(input()))\n");
    let enforcer = BoundaryEnforcer::new(config.clone(), "");
    let candidate = config.wrap(&sample_body(500));

    c.bench_function("boundary_enforce_500_lines", |b| {
        b.iter(|| {
            black_box(enforcer.enforce(black_box(&candidate)));
        })
    });
}

fn bench_line_resolution(c: &mut Criterion) {
    let text = sample_body(1000);

    c.bench_function("line_table_resolve", |b| {
        b.iter(|| {
            let table = LineTable::new(black_box(&text));
            black_box(table.offset_of(500, 8));
        })
    });
}

criterion_group!(
    benches,
    bench_local_delta,
    bench_apply_remote,
    bench_boundary_check,
    bench_line_resolution
);
criterion_main!(benches);
