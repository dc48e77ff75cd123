use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use equalizer::{
    build_histogram, scan, BinCount, ChannelBuffer, CpuBackend, ScanAlgorithm, DEFAULT_GROUP_SIZE,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_channel(len: usize) -> ChannelBuffer {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    ChannelBuffer::new((0..len).map(|_| rng.random::<u16>()).collect())
}

fn bench_scan(c: &mut Criterion) {
    let backend = CpuBackend::new();
    let channel = random_channel(1 << 20);

    let mut group = c.benchmark_group("scan");
    for bins in [256u32, 4096, 65536] {
        let bins = BinCount::new(bins).unwrap();
        let (histogram, _) = build_histogram(&backend, &channel, bins, DEFAULT_GROUP_SIZE).unwrap();
        group.throughput(Throughput::Elements(bins.get() as u64));

        for algorithm in [ScanAlgorithm::WorkEfficient, ScanAlgorithm::StepEfficient] {
            group.bench_with_input(
                BenchmarkId::new(algorithm.to_string(), bins.get()),
                &histogram,
                |b, histogram| b.iter(|| scan(&backend, histogram, algorithm).unwrap()),
            );
        }
    }
    group.finish();
}

fn bench_histogram(c: &mut Criterion) {
    let backend = CpuBackend::new();
    let mut group = c.benchmark_group("histogram");

    for len in [1usize << 16, 1 << 20] {
        let channel = random_channel(len);
        group.throughput(Throughput::Elements(len as u64));
        for group_size in [64u32, 256, 1024] {
            group.bench_with_input(
                BenchmarkId::new(format!("group_{group_size}"), len),
                &channel,
                |b, channel| {
                    b.iter(|| {
                        build_histogram(&backend, channel, BinCount::DEFAULT, group_size).unwrap()
                    })
                },
            );
        }
    }
    group.finish();
}

criterion_group!(benches, bench_scan, bench_histogram);
criterion_main!(benches);
