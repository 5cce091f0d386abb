// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Performance benchmarks for the tempo map
//!
//! Run with: cargo bench
//!
//! These benchmarks measure:
//! - Domain conversions on maps with many sections
//! - Grid generation for a visible range
//! - Cost of a mutation (copy, recompute, swap)
//! - Per-block transport processing

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tempomap::{
    BbtTime, Meter, MeterPosition, RoundMode, Tempo, TempoKind, TempoMap, TempoPosition,
    TransportClock,
};

/// A map with `count` tempo changes every four bars, alternating ramps,
/// and a meter change every sixteen bars
fn build_map(count: usize) -> TempoMap {
    let map = TempoMap::new(48000).unwrap();
    for i in 1..=count {
        let bpm = 90.0 + (i % 7) as f64 * 10.0;
        let kind = if i % 2 == 0 {
            TempoKind::Ramp
        } else {
            TempoKind::Constant
        };
        map.add_tempo(Tempo::new(bpm), kind, TempoPosition::quarter_note(i as f64 * 16.0))
            .unwrap();
    }
    for i in 1..=count / 4 {
        let meter = if i % 2 == 0 { Meter::new(4, 4) } else { Meter::new(7, 8) };
        let bar = 1 + (i as u32) * 16;
        map.add_meter(meter, MeterPosition::Music(BbtTime::new(bar, 1, 0)))
            .unwrap();
    }
    map
}

fn bench_conversions(c: &mut Criterion) {
    let mut group = c.benchmark_group("conversions");

    for size in [10usize, 100, 1000].iter() {
        let map = build_map(*size);
        let end = map.frame_at_quarter_note(*size as f64 * 16.0);

        group.bench_with_input(BenchmarkId::new("frame_at_quarter_note", size), size, |b, &size| {
            let metrics = map.read();
            let qn = size as f64 * 8.0 + 0.5;
            b.iter(|| black_box(metrics.frame_at_quarter_note(black_box(qn))))
        });

        group.bench_with_input(BenchmarkId::new("bbt_at_frame", size), size, |b, _| {
            let metrics = map.read();
            b.iter(|| black_box(metrics.bbt_at_frame(black_box(end / 2))))
        });

        group.bench_with_input(BenchmarkId::new("frame_at_bbt", size), size, |b, _| {
            let metrics = map.read();
            let bbt = BbtTime::new(*size as u32 * 2, 2, 480);
            b.iter(|| black_box(metrics.frame_at_bbt(black_box(&bbt))))
        });

        group.bench_with_input(BenchmarkId::new("locked_query", size), size, |b, _| {
            b.iter(|| black_box(map.tempo_at_frame(black_box(end / 3))))
        });
    }

    group.finish();
}

fn bench_grid(c: &mut Criterion) {
    let map = build_map(100);
    let start = map.frame_at_bbt(&BbtTime::new(100, 1, 0));
    let end = map.frame_at_bbt(&BbtTime::new(132, 1, 0));

    c.bench_function("grid_32_bars", |b| {
        b.iter(|| black_box(map.grid(black_box(start), black_box(end), 0)))
    });

    c.bench_function("round_to_beat", |b| {
        b.iter(|| black_box(map.round_to_beat(black_box(start + 777), RoundMode::Nearest)))
    });
}

fn bench_mutation(c: &mut Criterion) {
    let mut group = c.benchmark_group("mutation");

    for size in [10usize, 100, 1000].iter() {
        let map = build_map(*size);
        let pulse = *size as f64 * 2.0 + 0.125;

        group.bench_with_input(BenchmarkId::new("add_remove_tempo", size), size, |b, _| {
            b.iter(|| {
                let id = map
                    .add_tempo(Tempo::new(133.0), TempoKind::Ramp, TempoPosition::Music(pulse))
                    .unwrap();
                map.remove_tempo(id).unwrap();
            })
        });
    }

    group.finish();
}

fn bench_transport(c: &mut Criterion) {
    let map = Arc::new(build_map(100));

    c.bench_function("transport_block_512", |b| {
        let mut clock = TransportClock::new(Arc::clone(&map));
        clock.start();
        b.iter(|| {
            if clock.position() > 48000 * 600 {
                clock.locate(0);
            }
            black_box(clock.process(512))
        })
    });
}

criterion_group!(
    benches,
    bench_conversions,
    bench_grid,
    bench_mutation,
    bench_transport,
);
criterion_main!(benches);
