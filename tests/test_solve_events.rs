use celltrack_rs::{
    DistanceAssigner, ExecutionMode, GeometricSplitAndMerge, ObjectId,
    ObjectPopulation, Region, TrackArena, TrackTreePopulation,
};

/*----------------------------------------------------------------------------
Synthetic lineage builders
----------------------------------------------------------------------------*/

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn lower_region() -> Region {
    Region::rect(0, 0, 2, 2)
}

fn upper_region() -> Region {
    Region::rect(0, 10, 2, 2)
}

fn fused_region() -> Region {
    lower_region().union(&upper_region())
}

fn link_chain(pop: &mut ObjectPopulation, ids: &[ObjectId]) {
    for w in ids.windows(2) {
        pop.set_track_links(Some(w[0]), Some(w[1]), true, true, true);
    }
}

/// Two cells tracked separately over frames 0-1, erroneously fused into a
/// single track over frames 2-4, then tracked separately again over 5-6.
fn fused_midsection() -> (ObjectPopulation, TrackArena) {
    let mut pop = ObjectPopulation::new();

    let a: Vec<ObjectId> =
        (0..2).map(|f| pop.add_object(f, 1, lower_region())).collect();
    let b: Vec<ObjectId> =
        (0..2).map(|f| pop.add_object(f, 2, upper_region())).collect();
    let m: Vec<ObjectId> =
        (2..5).map(|f| pop.add_object(f, 1, fused_region())).collect();
    let c: Vec<ObjectId> =
        (5..7).map(|f| pop.add_object(f, 1, lower_region())).collect();
    let d: Vec<ObjectId> =
        (5..7).map(|f| pop.add_object(f, 2, upper_region())).collect();
    link_chain(&mut pop, &a);
    link_chain(&mut pop, &b);
    link_chain(&mut pop, &m);
    link_chain(&mut pop, &c);
    link_chain(&mut pop, &d);

    // both early tracks point into the fused one, which fans out again
    pop.set_track_links(Some(a[1]), Some(m[0]), false, true, false);
    pop.set_track_links(Some(b[1]), Some(m[0]), false, true, false);
    pop.set_track_links(Some(m[2]), Some(c[0]), false, true, false);
    pop.set_track_links(Some(m[2]), Some(d[0]), true, false, false);

    let arena = TrackArena::from_population(&pop);
    (pop, arena)
}

fn solve_merge_fused_midsection(mode: ExecutionMode) {
    init_logger();
    let (mut pop, mut arena) = fused_midsection();
    assert_eq!(arena.len(), 5);

    let mut trees = TrackTreePopulation::new(&arena);
    assert_eq!(trees.trees().len(), 1);

    let oracle = GeometricSplitAndMerge::new();
    let assigner = DistanceAssigner::new(4.0);
    // the oracle forbids every sibling pair: only splitting may resolve
    trees.solve_merge_events(
        &mut arena,
        &mut pop,
        &|_, _, _, _| true,
        &oracle,
        &assigner,
        mode,
    );

    // the fused midsection is gone, two clean lineages remain
    assert_eq!(arena.len(), 2);
    assert_eq!(trees.trees().len(), 2);
    for t in arena.ids() {
        let track = arena.get(t);
        assert!(!track.is_merge());
        assert!(!track.is_split());
        assert_eq!(track.first_frame(&pop), 0);
        assert_eq!(track.last_frame(&pop), 6);
        assert_eq!(track.length(), 7);

        // each corrected lineage stays on its own side of the image
        let side = pop.region(track.head()).center().y < 5.0;
        for &o in track.objects() {
            assert_eq!(pop.region(o).center().y < 5.0, side);
            assert_eq!(pop.track_head(o), track.head());
        }
    }
}

#[test]
fn test_solve_merge_events_splits_fused_midsection() {
    solve_merge_fused_midsection(ExecutionMode::Sequential);
}

#[test]
fn test_solve_merge_events_parallel_matches_sequential() {
    solve_merge_fused_midsection(ExecutionMode::Parallel);
}

#[test]
fn test_solve_split_events_fuses_spurious_division() {
    init_logger();
    // one cell over frames 0-1 spuriously divided into two parallel tracks
    // over frames 2-5
    let mut pop = ObjectPopulation::new();
    let root: Vec<ObjectId> =
        (0..2).map(|f| pop.add_object(f, 1, lower_region())).collect();
    let s1: Vec<ObjectId> = (2..6)
        .map(|f| pop.add_object(f, 1, Region::rect(0, 0, 2, 2)))
        .collect();
    let s2: Vec<ObjectId> = (2..6)
        .map(|f| pop.add_object(f, 1, Region::rect(2, 0, 2, 2)))
        .collect();
    link_chain(&mut pop, &root);
    link_chain(&mut pop, &s1);
    link_chain(&mut pop, &s2);
    pop.set_track_links(Some(root[1]), Some(s1[0]), false, true, false);
    pop.set_track_links(Some(root[1]), Some(s2[0]), true, false, false);

    let mut arena = TrackArena::from_population(&pop);
    assert_eq!(arena.len(), 3);
    let mut trees = TrackTreePopulation::new(&arena);

    let oracle = GeometricSplitAndMerge::new();
    let assigner = DistanceAssigner::new(4.0);
    // nothing is forbidden: siblings of the division collapse back together
    trees.solve_split_events(
        &mut arena,
        &mut pop,
        &|_, _, _, _| false,
        &oracle,
        &assigner,
        ExecutionMode::Sequential,
    );

    assert_eq!(arena.len(), 1);
    let t = arena.ids()[0];
    let track = arena.get(t);
    assert_eq!(track.first_frame(&pop), 0);
    assert_eq!(track.last_frame(&pop), 5);
    assert_eq!(track.length(), 6);
    assert!(!track.is_split());
    // fused frames carry the unions and remember the original siblings
    for &o in &track.objects()[2..] {
        assert_eq!(pop.region(o).size(), 8);
        assert_eq!(track.split_regions(o).unwrap().len(), 2);
    }
    for &o in track.objects() {
        assert_eq!(pop.track_head(o), track.head());
    }
}

#[test]
fn test_solve_merge_events_fuses_overlapping_tracks() {
    init_logger();
    // two tracks over [0,5] and [2,5] converge into one continuation; with
    // nothing forbidden the pair collapses into a single [0,5] track
    let mut pop = ObjectPopulation::new();
    let a: Vec<ObjectId> =
        (0..6).map(|f| pop.add_object(f, 1, lower_region())).collect();
    let b: Vec<ObjectId> = (2..6)
        .map(|f| pop.add_object(f, 1, Region::rect(1, 1, 2, 2)))
        .collect();
    let next: Vec<ObjectId> =
        (6..8).map(|f| pop.add_object(f, 1, lower_region())).collect();
    link_chain(&mut pop, &a);
    link_chain(&mut pop, &b);
    link_chain(&mut pop, &next);
    pop.set_track_links(Some(a[5]), Some(next[0]), false, true, false);
    pop.set_track_links(Some(b[3]), Some(next[0]), true, false, false);

    let mut arena = TrackArena::from_population(&pop);
    assert_eq!(arena.len(), 3);
    let mut trees = TrackTreePopulation::new(&arena);

    let oracle = GeometricSplitAndMerge::new();
    let assigner = DistanceAssigner::new(4.0);
    trees.solve_merge_events(
        &mut arena,
        &mut pop,
        &|_, _, _, _| false,
        &oracle,
        &assigner,
        ExecutionMode::Sequential,
    );

    assert_eq!(arena.len(), 1);
    let track = arena.get(arena.ids()[0]);
    assert_eq!(track.first_frame(&pop), 0);
    assert_eq!(track.last_frame(&pop), 7);
    assert!(!track.is_merge());
    // the overlap was unioned and the originals recorded
    for &o in &a[2..6] {
        assert_eq!(track.split_regions(o).unwrap().len(), 2);
    }
}

#[test]
fn test_tree_population_components() {
    let mut pop = ObjectPopulation::new();
    let a: Vec<ObjectId> =
        (0..3).map(|f| pop.add_object(f, 1, lower_region())).collect();
    let b: Vec<ObjectId> =
        (0..3).map(|f| pop.add_object(f, 2, upper_region())).collect();
    link_chain(&mut pop, &a);
    link_chain(&mut pop, &b);
    let arena = TrackArena::from_population(&pop);
    let trees = TrackTreePopulation::new(&arena);
    assert_eq!(trees.trees().len(), 2);
    for tree in trees.trees() {
        assert_eq!(tree.len(), 1);
        assert!(tree.get_first_merge(&arena, &pop).is_none());
        assert!(tree.get_first_split(&arena, &pop).is_none());
    }
}
