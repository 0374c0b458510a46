use criterion::{black_box, criterion_group, criterion_main, Criterion};
use hunter_core::ids::FrameId;
use hunter_core::score::ScoreModel;

fn bench_top_n(c: &mut Criterion) {
    let catalog = synthetic_catalog(50_000);
    let model = ScoreModel::new(catalog.len(), 0);

    c.bench_function("top_n/50k", |b| {
        b.iter(|| black_box(model.top_n(&catalog, 100, 5, 3)));
    });
}

fn bench_weighted_sample(c: &mut Criterion) {
    let model = ScoreModel::new(50_000, 0);

    c.bench_function("weighted_sample/50k", |b| {
        b.iter(|| black_box(model.weighted_sample(256, 1.0)));
    });
}

fn bench_apply_bayes(c: &mut Criterion) {
    let mut model = ScoreModel::new(10_000, 0);
    let features: Vec<Vec<f32>> = (0..10_000)
        .map(|i| vec![(i as f32).sin(), (i as f32).cos()])
        .collect();
    let screen: Vec<FrameId> = (0..10_000).map(FrameId::new).collect();
    let likes = vec![FrameId::new(0), FrameId::new(1)];

    c.bench_function("apply_bayes/10k", |b| {
        b.iter(|| {
            model.reset(1.0);
            model.apply_bayes(&likes, &screen, |a, b| {
                hunter_core::linalg::inverse_score(&features[a.get()], &features[b.get()])
            });
        });
    });
}

fn synthetic_catalog(n: usize) -> hunter_core::frame::FrameCatalog {
    let frames = (0..n)
        .map(|i| hunter_core::frame::VideoFrame {
            id: FrameId::new(i),
            video_id: hunter_core::ids::VideoId::new((i / 100) as u32),
            shot_id: hunter_core::ids::ShotId::new((i / 10) as u32),
            frame_num: hunter_core::ids::FrameNum::new(i as u32),
            filename: format!("f{i}.jpg").into(),
            metadata: None,
        })
        .collect();
    hunter_core::frame::FrameCatalog::from_frames(frames)
}

criterion_group!(benches, bench_top_n, bench_weighted_sample, bench_apply_bayes);
criterion_main!(benches);
