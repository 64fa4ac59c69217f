//! Replay buffer and reward sweep benchmarks
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fds_core::analyzer::RewardAnalyzer;
use fds_core::{Action, Experience, ReplayBuffer, RewardFunction};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn filled(capacity: usize) -> ReplayBuffer {
    let mut buffer = ReplayBuffer::new(capacity);
    for i in 0..capacity {
        buffer.push(Experience::terminal(vec![i as f64; 16], Action::ALL[i % 3], i as f64));
    }
    buffer
}

fn bench_buffer_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("Replay Push (full buffer)");

    for size in [1_000, 10_000, 100_000].iter() {
        let mut buffer = filled(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                buffer.push(black_box(Experience::terminal(vec![0.5; 16], Action::Block, 1.0)));
            });
        });
    }
    group.finish();
}

fn bench_buffer_sample(c: &mut Criterion) {
    let mut group = c.benchmark_group("Replay Sample 64");

    for size in [1_000, 10_000, 100_000].iter() {
        let buffer = filled(*size);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        group.bench_with_input(BenchmarkId::from_parameter(size), &buffer, |b, buffer| {
            b.iter(|| {
                black_box(buffer.sample_batch(64, &mut rng).ok());
            });
        });
    }
    group.finish();
}

fn bench_thresholds(c: &mut Criterion) {
    let rf = RewardFunction::default();
    let analyzer = RewardAnalyzer::new(&rf);
    let mut group = c.benchmark_group("Decision Thresholds");

    for resolution in [1_000usize, 10_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(resolution), resolution, |b, &resolution| {
            b.iter(|| {
                black_box(analyzer.decision_thresholds(black_box(1_000_000.0), resolution).ok());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_buffer_push, bench_buffer_sample, bench_thresholds);
criterion_main!(benches);
