use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tldw::{chunk_segments, CaptionSegment, TimestampLinker};

fn make_segments(count: usize) -> Vec<CaptionSegment> {
    (0..count)
        .map(|i| {
            CaptionSegment::new(
                format!("caption segment number {} with some realistic spoken text", i),
                i as f64 * 4.0,
                i as f64 * 4.0 + 4.0,
            )
        })
        .collect()
}

fn bench_chunking(c: &mut Criterion) {
    let segments = make_segments(5000);

    c.bench_function("chunk_5000_segments", |b| {
        b.iter(|| chunk_segments(black_box(&segments), black_box(25_000)))
    });
}

fn bench_linkify(c: &mut Criterion) {
    let linker = TimestampLinker::new(Some(3600.0));
    let text = (0..200)
        .map(|i| format!("- **point {}** with detail [{}:{:02}]", i, i / 60, i % 60))
        .collect::<Vec<_>>()
        .join("\n");

    c.bench_function("linkify_200_bullets", |b| {
        b.iter(|| linker.linkify(black_box(&text)))
    });
}

criterion_group!(benches, bench_chunking, bench_linkify);
criterion_main!(benches);
