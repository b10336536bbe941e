use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use trendlab::prelude::*;

fn trend_splitter(length: usize) -> DataSplitter {
    let close = SinusoidConfig::default()
        .with_length(length)
        .with_frequency(0.03)
        .with_height(10.0)
        .generate();
    let table = create_dataframe(&close, 0.005, Some(42)).unwrap();
    let table = add_technical_indicators(table, &["trend_1d", "ema", "rsi_30", "simple_rtn", "target"]).unwrap();
    let mut table = remove_features(table, &["open", "high", "low", "adj_close", "volume"]).unwrap();
    table.drop_missing();
    DataSplitter::new(table, "target").unwrap()
}

fn bench_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("fit");
    group.sample_size(10);

    let split = trend_splitter(2000).split_simple(0.7).unwrap();
    for name in ["decision tree", "xgboost", "gaussian naive bayes", "svc", "mlp"] {
        group.bench_with_input(BenchmarkId::new("fit", name), &split, |b, split| {
            b.iter(|| {
                let mut model = get_classifier(name, None, None).unwrap();
                model.fit(black_box(split)).unwrap();
                model
            })
        });
    }

    group.finish();
}

fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate");

    let split = trend_splitter(5000).split_simple(0.7).unwrap();
    let mut model = get_classifier("decision tree", None, None).unwrap();
    model.fit(&split).unwrap();
    group.bench_function("decision tree", |b| b.iter(|| model.evaluate(black_box(&split)).unwrap()));

    group.finish();
}

fn bench_cross_validation(c: &mut Criterion) {
    let mut group = c.benchmark_group("cross_validation");
    group.sample_size(10);

    for length in [1000, 4000] {
        let splitter = trend_splitter(length);
        group.bench_with_input(BenchmarkId::new("decision tree", length), &splitter, |b, splitter| {
            b.iter(|| {
                let mut model = get_classifier("decision tree", None, None).unwrap();
                model.evaluate_cross_validation(black_box(splitter), "target", false).unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fit, bench_evaluate, bench_cross_validation);
criterion_main!(benches);
