use criterion::{black_box, criterion_group, criterion_main, Criterion};
use git_pack::delta::{Delta, DeltaIndex, Expander};

fn sample(len: usize, every: usize) -> (Vec<u8>, Vec<u8>) {
    let source: Vec<u8> = (0..len).map(|i| (i * 7 % 251) as u8).collect();
    let mut target = source.clone();
    for i in (0..target.len()).step_by(every) {
        target[i] ^= 0xFF;
    }
    (source, target)
}

fn bench_delta_index(c: &mut Criterion) {
    let (source, _) = sample(64 * 1024, 1024);
    c.bench_function("delta_index_64k", |b| {
        b.iter(|| DeltaIndex::new(black_box(&source)));
    });
}

fn bench_delta_compress(c: &mut Criterion) {
    let (source, target) = sample(4096, 2048);
    c.bench_function("delta_compress_4k", |b| {
        b.iter(|| Delta::new(black_box(&source), black_box(&target)));
    });

    // Window reuse: one index, many targets.
    let (source, target) = sample(64 * 1024, 1024);
    let index = DeltaIndex::new(&source);
    c.bench_function("delta_compress_64k_prebuilt_index", |b| {
        b.iter(|| Delta::with_index(&index, black_box(&source), black_box(&target)));
    });
}

fn bench_delta_expand(c: &mut Criterion) {
    for (name, len) in [("delta_expand_4k", 4096), ("delta_expand_64k", 64 * 1024)] {
        let (source, target) = sample(len, 1024);
        let delta = Delta::new(&source, &target);
        c.bench_function(name, |b| {
            b.iter(|| {
                Expander::new(delta.data())
                    .unwrap()
                    .expand(black_box(&source))
                    .unwrap()
            });
        });
    }
}

criterion_group!(benches, bench_delta_index, bench_delta_compress, bench_delta_expand);
criterion_main!(benches);
