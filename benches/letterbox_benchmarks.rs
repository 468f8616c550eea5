use abg_remover::{
    backends::{MockBackend, MockMask},
    BackendType, InferenceSession, Letterbox, Mask, MattingConfig, MattingPipeline,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{Rgb, RgbImage};
use std::sync::Arc;

const SIDE: u32 = 1024;

fn test_image(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    })
}

fn image_sizes() -> Vec<(&'static str, u32, u32)> {
    vec![
        ("small_640x480", 640, 480),
        ("portrait_1080x1920", 1080, 1920),
        ("large_4000x3000", 4000, 3000),
    ]
}

fn benchmark_letterbox(c: &mut Criterion) {
    let letterbox = Letterbox::new(SIDE);

    let mut group = c.benchmark_group("letterbox");
    group.sample_size(10); // Reduce sample size for faster benchmarks

    for (name, width, height) in image_sizes() {
        let image = test_image(width, height);

        group.bench_with_input(BenchmarkId::new("forward", name), &image, |b, image| {
            b.iter(|| black_box(letterbox.forward(image).unwrap()));
        });

        let (tensor, geometry) = letterbox.forward(&image).unwrap();
        let raw_mask = tensor
            .mean_axis(ndarray::Axis(1))
            .unwrap()
            .insert_axis(ndarray::Axis(1));
        group.bench_with_input(
            BenchmarkId::new("inverse", name),
            &(raw_mask, geometry),
            |b, (raw_mask, geometry)| {
                b.iter(|| black_box(letterbox.inverse(raw_mask, geometry).unwrap()));
            },
        );
    }

    group.finish();
}

fn benchmark_compositing(c: &mut Criterion) {
    let mut group = c.benchmark_group("composite");
    group.sample_size(10);

    for (name, width, height) in image_sizes() {
        let image = test_image(width, height);
        let mask = Mask::filled(width, height, 0.5);

        group.bench_with_input(
            BenchmarkId::from_parameter(name),
            &(image, mask),
            |b, (image, mask)| {
                b.iter(|| black_box(MattingPipeline::composite(image, mask).unwrap()));
            },
        );
    }

    group.finish();
}

fn benchmark_mock_pipeline(c: &mut Criterion) {
    let config = MattingConfig::builder()
        .backend_type(BackendType::Mock)
        .canvas_side(SIDE)
        .build()
        .unwrap();
    let backend = MockBackend::new(MockMask::Luminance);
    let session = InferenceSession::with_backend(config, Box::new(backend));
    let pipeline = MattingPipeline::with_session(Arc::new(session));
    let image = test_image(1080, 1920);

    c.bench_function("matte_portrait_1080x1920_mock", |b| {
        b.iter(|| black_box(pipeline.matte(&image).unwrap()));
    });
}

criterion_group!(
    benches,
    benchmark_letterbox,
    benchmark_compositing,
    benchmark_mock_pipeline
);
criterion_main!(benches);
