use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use item_pipeline::expression::field;
use item_pipeline::io::{CollectExporter, ListFeeder};
use item_pipeline::path;
use item_pipeline::pipeline::{Pipeline, Step};
use item_pipeline::processor::{Assigner, Defaulter, Dropper, Mapper, Selector};
use item_pipeline::types::Item;
use serde_json::{Value, json};

fn companies(n: usize) -> Vec<Item> {
    (0..n)
        .map(|i| {
            let industry = if i % 10 == 0 { "Not Applic" } else { "Materials" };
            Item::from_value(json!({
                "Company name": format!("COMPANY {i}"),
                "ASX code": format!("C{i:04}"),
                "GICS industry group": industry,
                "address": {"city": null},
            }))
            .expect("object")
        })
        .collect()
}

fn steps(items: Vec<Item>, sink: CollectExporter) -> Vec<Step> {
    vec![
        Step::action(ListFeeder::new(items)),
        Step::action(Dropper::new(
            Selector::item(),
            field("GICS industry group").is_in(vec!["Not Applic", "Class Pend"]),
        )),
        Step::action(Assigner::new(field("exchange"), "ASX")),
        Step::action(Defaulter::new(field("address.city"), "Unknown")),
        Step::action(
            Mapper::keys(
                Selector::item(),
                json!({"Company name": "name", "ASX code": "code", "GICS industry group": "industry"}),
            )
            .expect("mapping"),
        ),
        Step::branch([Step::export(sink)]),
    ]
}

fn bench_path_lookup(c: &mut Criterion) {
    let record: Value = json!({"users": [{"address": {"city": "Brisbane"}}]});
    c.bench_function("path_split_and_get", |b| {
        b.iter(|| {
            let segments = path::split("users[0].address.city");
            std::hint::black_box(path::get(&segments, &record).is_some());
        });
    });
}

fn bench_pipeline_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline_run");
    for size in [100usize, 1_000, 10_000] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_batched(
                || Pipeline::new(steps(companies(size), CollectExporter::new())),
                |pipeline| std::hint::black_box(pipeline.run().expect("run")),
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_path_lookup, bench_pipeline_run);
criterion_main!(benches);
