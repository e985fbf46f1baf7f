//! Benchmark: computed reads (cache hit vs recompute after a patch)

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use canopy_core::{record, Container, ContainerTemplate, Resolution, Runtime, State};
use serde_json::json;

fn container() -> Container {
    let template = ContainerTemplate::builder("bench")
        .initial_state(|| {
            record([
                ("items", json!((0..256).collect::<Vec<i64>>())),
                ("n", json!(0)),
            ])
        })
        .effect_sync("bump", |_, _| {
            Ok(Resolution::transform(|state: &State| {
                let n = state["n"].as_i64().unwrap_or(0);
                record([("n", json!(n + 1))])
            }))
        })
        .computed("sum", |t| {
            let items = t.get_as::<Vec<i64>>("items").unwrap_or_default();
            let n = t.get_as::<i64>("n").unwrap_or(0);
            json!(items.iter().sum::<i64>() + n)
        })
        .build()
        .unwrap();

    Runtime::default().attach(&template, None).unwrap()
}

fn benchmark_cached_read(c: &mut Criterion) {
    let container = container();
    container.get("sum").unwrap();

    c.bench_function("computed_cached_read", |b| {
        b.iter(|| black_box(container.get("sum").unwrap()))
    });
}

fn benchmark_read_after_patch(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let container = container();

    c.bench_function("computed_read_after_patch", |b| {
        b.iter(|| {
            rt.block_on(container.dispatch("bump", vec![])).unwrap();
            black_box(container.get("sum").unwrap())
        })
    });
}

fn benchmark_nested_read(c: &mut Criterion) {
    let runtime = Runtime::default();
    let mut parent = container();
    for depth in 0..8 {
        let template = ContainerTemplate::builder(format!("level{depth}"))
            .initial_state(State::new)
            .build()
            .unwrap();
        parent = runtime.attach(&template, Some(&parent)).unwrap();
    }

    c.bench_function("inherited_read_depth_8", |b| {
        b.iter(|| black_box(parent.get("sum").unwrap()))
    });
}

criterion_group!(
    benches,
    benchmark_cached_read,
    benchmark_read_after_patch,
    benchmark_nested_read
);
criterion_main!(benches);
