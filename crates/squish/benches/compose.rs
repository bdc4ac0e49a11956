use criterion::{Criterion, black_box, criterion_group, criterion_main};
use image::{Rgb, RgbImage};
use squish::compare::{DividerState, compose};

fn criterion_benchmark(c: &mut Criterion) {
    let original = RgbImage::from_fn(1080, 608, |x, y| Rgb([x as u8, y as u8, 40]));
    let processed = RgbImage::from_fn(1080, 608, |x, y| Rgb([y as u8, x as u8, 90]));
    let divider = DividerState::new(1080);

    c.bench_function("compose 1080x608", |b| {
        b.iter(|| {
            compose(
                black_box(&original),
                black_box(Some(&processed)),
                black_box(&divider),
            )
        })
    });
    c.bench_function("compose original only", |b| {
        b.iter(|| compose(black_box(&original), None, black_box(&divider)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
