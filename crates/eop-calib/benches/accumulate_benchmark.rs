use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use eop_calib::{PassContext, UniformWeight, accumulate, accumulate_par, combine};
use eop_core::{AcceptAll, CalibrationMap, ChannelGrid, Event, Observation, RecHit};
use std::hint::black_box;

// Barrel-sized grid, 3x3 clusters, two candidates per entry. Deterministic.
fn make_events(grid: ChannelGrid, n: usize) -> Vec<Event> {
    let b = grid.bounds();
    let (n_eta, n_phi) = (grid.n_eta() as i32, grid.n_phi() as i32);
    (0..n)
        .map(|k| {
            let k = k as i32;
            let obs = (0..2)
                .map(|c| {
                    let ieta = b.ieta_min + 1 + (k * 7 + c * 31).rem_euclid(n_eta - 2);
                    let iphi = b.iphi_min + 1 + (k * 13 + c * 101).rem_euclid(n_phi - 2);
                    let hits = (-1..=1)
                        .flat_map(|de| (-1..=1).map(move |dp| (de, dp)))
                        .map(|(de, dp)| RecHit {
                            ieta: ieta + de,
                            iphi: iphi + dp,
                            energy: if de == 0 && dp == 0 { 30.0 } else { 1.5 },
                            fraction: 1.0,
                            flag: 0,
                        })
                        .collect();
                    Observation {
                        energy: 42.0,
                        momentum: 40.0 + f64::from(k % 5),
                        ieta_seed: ieta,
                        regression: 1.01,
                        hits,
                    }
                })
                .collect();
            Event::new(obs)
        })
        .collect()
}

fn bench_accumulate(c: &mut Criterion) {
    let grid = ChannelGrid::new(-85, 85, 1, 360).unwrap();
    let ic = CalibrationMap::unit(grid);
    let ctx = PassContext::new(&ic, &UniformWeight, &AcceptAll);

    let mut group = c.benchmark_group("accumulate");
    for n in [1_000usize, 10_000, 100_000] {
        let events = make_events(grid, n);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("sequential", n), &events, |b, ev| {
            b.iter(|| black_box(accumulate(ev, ctx).unwrap()))
        });
        group.bench_with_input(BenchmarkId::new("parallel", n), &events, |b, ev| {
            b.iter(|| black_box(accumulate_par(ev, 0, ctx).unwrap()))
        });
    }
    group.finish();

    let sums = accumulate(&make_events(grid, 10_000), ctx).unwrap();
    c.bench_function("combine_barrel", |b| {
        b.iter(|| black_box(combine(&sums.numerator, &sums.denominator, Some(&ic)).unwrap()))
    });
}

criterion_group!(benches, bench_accumulate);
criterion_main!(benches);
