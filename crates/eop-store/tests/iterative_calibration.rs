//! Integration tests: full accumulate → store → recombine loop through files.

use approx::assert_relative_eq;
use eop_calib::{AccumulateOptions, EnergyEstimate, PassContext, UniformWeight, try_accumulate};
use eop_core::{AcceptAll, CalibrationMap, ChannelGrid, Event, Observation, ObservationSource, RecHit};
use eop_store::{JsonlSource, MapFile, PULL, TEMPORARY_IC, merge_stores, recombine, write_jsonl, write_merged, write_pass};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn tmp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let p = std::env::temp_dir().join(format!("eopic_store_{}_{}_{}", std::process::id(), nanos, name));
    std::fs::create_dir_all(&p).unwrap();
    p
}

fn grid() -> ChannelGrid {
    ChannelGrid::new(0, 0, 1, 3).unwrap()
}

// Channel response: a deposit of true energy T reads as T * MISCALIB[c].
const MISCALIB: [f64; 3] = [0.8, 1.0, 1.25];

fn single_hit_events(n: usize) -> Vec<Event> {
    (0..n)
        .map(|k| {
            let iphi = 1 + (k % 2) as i32; // channel 3 never hit
            let true_e = 20.0 + k as f64;
            let read = true_e * MISCALIB[(iphi - 1) as usize];
            Event::new(vec![Observation {
                energy: read,
                momentum: true_e,
                ieta_seed: 0,
                regression: 1.0,
                hits: vec![RecHit { ieta: 0, iphi, energy: read, fraction: 1.0, flag: 0 }],
            }])
        })
        .collect()
}

fn run_pass(source: &JsonlSource, ic: &CalibrationMap, out: &PathBuf) {
    let opts = AccumulateOptions { energy: EnergyEstimate::Recalibrated, ..Default::default() };
    let ctx = PassContext::new(ic, &UniformWeight, &AcceptAll).with_options(opts);
    let sums = try_accumulate(source.events().unwrap(), ctx).unwrap();
    let mut f = MapFile::create(out);
    write_pass(&mut f, &sums, ic).unwrap();
    f.save().unwrap();
}

#[test]
fn two_iterations_converge_to_inverse_response() {
    let dir = tmp_dir("iterate");
    let ntuple = dir.join("events.jsonl");
    write_jsonl(&ntuple, &single_hit_events(40)).unwrap();
    let source = JsonlSource::new(vec![ntuple]).unwrap();

    // Iteration 0: unit prior.
    let out0 = dir.join("IC_0.json");
    run_pass(&source, &CalibrationMap::unit(grid()), &out0);
    let mut f0 = MapFile::open(&out0).unwrap();
    recombine(&mut f0, None, "IC").unwrap();
    f0.save().unwrap();

    let f0 = MapFile::open(&out0).unwrap();
    let ic1 = f0.get_calibration("IC").unwrap();
    assert_relative_eq!(ic1.get(0).unwrap(), 1.0 / 0.8, max_relative = 1e-12);
    assert_relative_eq!(ic1.get(1).unwrap(), 1.0, max_relative = 1e-12);
    // Untouched channel: undefined in the file, unit when used as a prior.
    assert_eq!(f0.get_map("IC").unwrap().values()[2], None);
    assert_eq!(ic1.get(2), Some(1.0));
    assert!(!f0.list_keys().iter().any(|k| k.name == TEMPORARY_IC));

    // Iteration 1: the pull is now flat.
    let out1 = dir.join("IC_1.json");
    run_pass(&source, &ic1, &out1);
    let mut f1 = MapFile::open(&out1).unwrap();
    recombine(&mut f1, Some(&ic1), "IC").unwrap();
    let pull = f1.get_map(PULL).unwrap();
    assert_relative_eq!(pull.values()[0].unwrap(), 1.0, max_relative = 1e-12);
    assert_relative_eq!(pull.values()[1].unwrap(), 1.0, max_relative = 1e-12);
    assert_eq!(pull.values()[2], None);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn merged_halves_equal_single_pass() {
    let dir = tmp_dir("merge");
    let events = single_hit_events(30);
    let (a, b) = events.split_at(11);
    let pa = dir.join("a.jsonl");
    let pb = dir.join("b.jsonl");
    write_jsonl(&pa, a).unwrap();
    write_jsonl(&pb, b).unwrap();

    let unit = CalibrationMap::unit(grid());
    run_pass(&JsonlSource::new(vec![pa.clone()]).unwrap(), &unit, &dir.join("a.json"));
    run_pass(&JsonlSource::new(vec![pb.clone()]).unwrap(), &unit, &dir.join("b.json"));
    run_pass(&JsonlSource::new(vec![pa, pb]).unwrap(), &unit, &dir.join("all.json"));

    let inputs = [MapFile::open(dir.join("a.json")).unwrap(), MapFile::open(dir.join("b.json")).unwrap()];
    let merged = merge_stores(&inputs).unwrap();
    let mut out = MapFile::create(dir.join("merged.json"));
    write_merged(&mut out, &merged).unwrap();
    let c_merged = recombine(&mut out, None, "IC").unwrap();

    let mut all = MapFile::open(dir.join("all.json")).unwrap();
    let c_all = recombine(&mut all, None, "IC").unwrap();

    for (x, y) in c_merged.updated.values().iter().zip(c_all.updated.values()) {
        match (x, y) {
            (Some(x), Some(y)) => assert_relative_eq!(*x, *y, max_relative = 1e-12),
            (None, None) => {}
            _ => panic!("defined channels differ: {x:?} vs {y:?}"),
        }
    }

    let _ = std::fs::remove_dir_all(&dir);
}
