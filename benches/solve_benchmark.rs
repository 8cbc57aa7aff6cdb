use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};

use celltrack_rs::{
    DistanceAssigner, ExecutionMode, GeometricSplitAndMerge, ObjectId,
    ObjectPopulation, Region, TrackArena, TrackTreePopulation,
};

/* ----------------------------------------------------------------------------
 * Synthetic movie: parallel cell pairs fused over a midsection
 * ----------------------------------------------------------------------------*/

fn chain(
    pop: &mut ObjectPopulation,
    frames: std::ops::Range<usize>,
    region: &Region,
) -> Vec<ObjectId> {
    let ids: Vec<ObjectId> =
        frames.map(|f| pop.add_object(f, 0, region.clone())).collect();
    for w in ids.windows(2) {
        pop.set_track_links(Some(w[0]), Some(w[1]), true, true, true);
    }
    ids
}

fn fused_lineage(
    pop: &mut ObjectPopulation,
    x: i32,
    frames: usize,
    fused_from: usize,
    fused_to: usize,
) {
    let lower = Region::rect(x, 0, 2, 2);
    let upper = Region::rect(x, 10, 2, 2);
    let fused = lower.union(&upper);

    let pre_a = chain(pop, 0..fused_from, &lower);
    let pre_b = chain(pop, 0..fused_from, &upper);
    let mid = chain(pop, fused_from..fused_to, &fused);
    let post_a = chain(pop, fused_to..frames, &lower);
    let post_b = chain(pop, fused_to..frames, &upper);

    let (pa, pb) = (*pre_a.last().unwrap(), *pre_b.last().unwrap());
    let (head, tail) = (mid[0], *mid.last().unwrap());
    pop.set_track_links(Some(pa), Some(head), false, true, false);
    pop.set_track_links(Some(pb), Some(head), false, true, false);
    pop.set_track_links(Some(tail), Some(post_a[0]), false, true, false);
    pop.set_track_links(Some(tail), Some(post_b[0]), true, false, false);
}

fn build_population(lineages: usize, frames: usize) -> ObjectPopulation {
    let mut pop = ObjectPopulation::new();
    for i in 0..lineages {
        fused_lineage(&mut pop, i as i32 * 40, frames, frames / 3, 2 * frames / 3);
    }
    pop
}

fn bench_solve_merge_events(c: &mut Criterion) {
    let pop = build_population(8, 30);

    let mut group = c.benchmark_group("solve_merge_events");
    for mode in [ExecutionMode::Sequential, ExecutionMode::Parallel] {
        group.bench_function(format!("{:?}", mode), |b| {
            b.iter(|| {
                let mut pop = pop.clone();
                let mut arena = TrackArena::from_population(&pop);
                let mut trees = TrackTreePopulation::new(&arena);
                let oracle = GeometricSplitAndMerge::new();
                let assigner = DistanceAssigner::new(6.0);
                trees.solve_merge_events(
                    &mut arena,
                    &mut pop,
                    &|_, _, _, _| true,
                    &oracle,
                    &assigner,
                    mode,
                );
                arena.len()
            });
        });
    }
    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .sample_size(20)
        .measurement_time(Duration::from_secs(10))
        .warm_up_time(Duration::from_secs(3));
    targets = bench_solve_merge_events
}
criterion_main!(benches);
