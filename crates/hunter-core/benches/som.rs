use criterion::{black_box, criterion_group, criterion_main, Criterion};
use hunter_core::config::SomConfig;
use hunter_core::score::ScoreModel;
use hunter_core::som::{AsyncSomWorker, SomSnapshot};

fn bench_worker_round_trip(c: &mut Criterion) {
    let points: Vec<Vec<f32>> = (0..2_000).map(|i| vec![(i as f32).sin(), (i as f32).cos()]).collect();
    let weights = vec![1.0; points.len()];
    let mask = vec![true; points.len()];
    let model = ScoreModel::new(points.len(), 0);

    c.bench_function("som/train_and_map/2k_points_16x16", |b| {
        b.iter(|| {
            let worker = AsyncSomWorker::spawn();
            worker.start_work(
                0,
                SomSnapshot {
                    points: points.clone(),
                    weights: weights.clone(),
                    mask: mask.clone(),
                    config: SomConfig {
                        width: 16,
                        height: 16,
                        iterations_a: 200,
                        iterations_b: 100,
                    },
                },
            );
            while !worker.is_ready(0) {
                std::thread::yield_now();
            }
            let grid = worker.ready(0).unwrap();
            black_box(grid.get_display(&model, 3));
        });
    });
}

criterion_group!(benches, bench_worker_round_trip);
criterion_main!(benches);
