use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use log::{debug, trace};
use rayon::prelude::*;

use crate::assigner::TrackAssigner;
use crate::exec::ExecutionMode;
use crate::object::{ObjectId, ObjectPopulation};
use crate::region::{center_distance_sq, Region};
use crate::split_merge::SplitAndMerge;

/*------------------------------------------------------------------------------
Track / TrackArena
------------------------------------------------------------------------------*/

/// Stable surrogate id of a [`Track`] inside its [`TrackArena`].
pub type TrackId = usize;

/// A maximal run of per-frame objects sharing one trackhead, with
/// previous/next edges to neighboring tracks stored as arena ids.
///
/// Equality and ordering of tracks are keyed on the surrogate id only; two
/// tracks with equal-content heads are distinct. Hashing on mutable content
/// would break once a merge rewrites the sequence.
#[derive(Debug, Clone)]
pub struct Track {
    objects: Vec<ObjectId>,
    previous: Vec<TrackId>,
    next: Vec<TrackId>,
    /// Candidate sub-regions per object, populated on demand by the oracle
    /// and by merges (which record the pre-merge regions for a later split).
    /// An empty list marks a gap frame.
    split_regions: HashMap<ObjectId, Vec<Region>>,
}

impl Track {
    /// The identity anchor: the first object of the sequence.
    #[inline(always)]
    pub fn head(&self) -> ObjectId {
        self.objects[0]
    }

    #[inline(always)]
    pub fn tail(&self) -> ObjectId {
        *self.objects.last().unwrap()
    }

    #[inline(always)]
    pub fn objects(&self) -> &[ObjectId] {
        &self.objects
    }

    #[inline(always)]
    pub fn previous(&self) -> &[TrackId] {
        &self.previous
    }

    #[inline(always)]
    pub fn next(&self) -> &[TrackId] {
        &self.next
    }

    #[inline(always)]
    pub fn length(&self) -> usize {
        self.objects.len()
    }

    /// True when several tracks converge into this one.
    #[inline(always)]
    pub fn is_merge(&self) -> bool {
        self.previous.len() > 1
    }

    /// True when this track diverges into several.
    #[inline(always)]
    pub fn is_split(&self) -> bool {
        self.next.len() > 1
    }

    pub fn first_frame(&self, population: &ObjectPopulation) -> usize {
        population.frame(self.head())
    }

    pub fn last_frame(&self, population: &ObjectPopulation) -> usize {
        population.frame(self.tail())
    }

    pub fn object_at_frame(
        &self,
        population: &ObjectPopulation,
        frame: usize,
    ) -> Option<ObjectId> {
        self.objects
            .iter()
            .copied()
            .find(|&o| population.frame(o) == frame)
    }

    pub fn split_regions(&self, object: ObjectId) -> Option<&[Region]> {
        self.split_regions.get(&object).map(|r| r.as_slice())
    }
}

/// Deterministic pairing of two unordered region pairs.
///
/// Returns, for each element of `pair_a`, the index of its partner in
/// `pair_b`, minimizing the summed squared center distance over the two
/// possible pairings. The straight pairing wins ties.
pub fn match_order(
    pair_a: (&Region, &Region),
    pair_b: (&Region, &Region),
) -> [usize; 2] {
    let straight = center_distance_sq(pair_a.0, pair_b.0)
        + center_distance_sq(pair_a.1, pair_b.1);
    let crossed = center_distance_sq(pair_a.0, pair_b.1)
        + center_distance_sq(pair_a.1, pair_b.0);
    if straight <= crossed {
        [0, 1]
    } else {
        [1, 0]
    }
}

/// Arena of all tracks of one population.
///
/// Removed slots stay `None` so ids remain stable; previous/next edges are
/// id lists kept in symmetric closure by `add_edge`/`remove_edge`.
#[derive(Debug, Clone, Default)]
pub struct TrackArena {
    tracks: Vec<Option<Track>>,
}

impl TrackArena {
    pub fn new() -> Self {
        Self { tracks: Vec::new() }
    }

    /// Group the population's objects by trackhead into tracks and wire the
    /// previous/next edges from the persisted object-level pointers.
    pub fn from_population(population: &ObjectPopulation) -> Self {
        let mut by_head: BTreeMap<ObjectId, Vec<ObjectId>> = BTreeMap::new();
        for id in population.ids() {
            by_head.entry(population.track_head(id)).or_default().push(id);
        }

        let mut arena = Self::new();
        let mut track_of: HashMap<ObjectId, TrackId> = HashMap::new();
        for (_, mut objects) in by_head {
            objects.sort_by_key(|&o| population.frame(o));
            let ids = objects.clone();
            let t = arena.add_track(population, objects);
            for o in ids {
                track_of.insert(o, t);
            }
        }

        for t in arena.ids() {
            let objects = arena.get(t).objects().to_vec();
            for o in objects {
                if let Some(n) = population.next(o) {
                    let tn = track_of[&n];
                    if tn != t && !arena.get(t).next.contains(&tn) {
                        arena.add_edge(population, t, tn);
                    }
                }
                if let Some(p) = population.previous(o) {
                    let tp = track_of[&p];
                    if tp != t && !arena.get(tp).next.contains(&t) {
                        arena.add_edge(population, tp, t);
                    }
                }
            }
        }
        arena
    }

    /// Register a track. The sequence must be non-empty, strictly
    /// frame-sorted, share a single trackhead, and start with it.
    pub fn add_track(
        &mut self,
        population: &ObjectPopulation,
        objects: Vec<ObjectId>,
    ) -> TrackId {
        assert!(!objects.is_empty(), "track must contain at least one object");
        let head = objects[0];
        assert!(
            population.track_head(head) == head,
            "first object of a track must be its own trackhead"
        );
        for w in objects.windows(2) {
            assert!(
                population.frame(w[0]) < population.frame(w[1]),
                "track objects must be strictly frame-sorted"
            );
        }
        for &o in &objects {
            assert!(
                population.track_head(o) == head,
                "all objects of a track must share its trackhead"
            );
        }
        let id = self.tracks.len();
        self.tracks.push(Some(Track {
            objects,
            previous: Vec::new(),
            next: Vec::new(),
            split_regions: HashMap::new(),
        }));
        id
    }

    pub fn get(&self, id: TrackId) -> &Track {
        self.tracks[id]
            .as_ref()
            .unwrap_or_else(|| panic!("track {} was discarded", id))
    }

    fn get_mut(&mut self, id: TrackId) -> &mut Track {
        self.tracks[id]
            .as_mut()
            .unwrap_or_else(|| panic!("track {} was discarded", id))
    }

    pub fn contains(&self, id: TrackId) -> bool {
        id < self.tracks.len() && self.tracks[id].is_some()
    }

    /// Ids of all live tracks, ascending.
    pub fn ids(&self) -> Vec<TrackId> {
        (0..self.tracks.len())
            .filter(|&id| self.tracks[id].is_some())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tracks.iter().filter(|t| t.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn find_track_of_object(&self, object: ObjectId) -> Option<TrackId> {
        self.ids()
            .into_iter()
            .find(|&t| self.get(t).objects.contains(&object))
    }

    pub fn tracks_starting_at(
        &self,
        population: &ObjectPopulation,
        frame: usize,
    ) -> Vec<TrackId> {
        self.ids()
            .into_iter()
            .filter(|&t| self.get(t).first_frame(population) == frame)
            .collect()
    }

    pub fn tracks_ending_at(
        &self,
        population: &ObjectPopulation,
        frame: usize,
    ) -> Vec<TrackId> {
        self.ids()
            .into_iter()
            .filter(|&t| self.get(t).last_frame(population) == frame)
            .collect()
    }

    /*--------------------------------------------------------------------------
    Edges
    --------------------------------------------------------------------------*/

    /// Add the symmetric edge `a -> b`.
    ///
    /// `b` must begin strictly after `a` ends; when a side already has
    /// neighbors they must all share the boundary frame.
    pub fn add_edge(
        &mut self,
        population: &ObjectPopulation,
        a: TrackId,
        b: TrackId,
    ) {
        assert!(a != b, "a track cannot neighbor itself");
        let a_last = self.get(a).last_frame(population);
        let b_first = self.get(b).first_frame(population);
        assert!(
            a_last < b_first,
            "next track must begin strictly after the previous one ends"
        );
        for &n in &self.get(a).next {
            assert!(
                self.get(n).first_frame(population) == b_first,
                "all next neighbors must share the same first frame"
            );
        }
        for &p in &self.get(b).previous {
            assert!(
                self.get(p).last_frame(population) == a_last,
                "all previous neighbors must share the same last frame"
            );
        }
        if !self.get(a).next.contains(&b) {
            self.get_mut(a).next.push(b);
        }
        if !self.get(b).previous.contains(&a) {
            self.get_mut(b).previous.push(a);
        }
    }

    /// Remove the symmetric edge `a -> b` if present.
    pub fn remove_edge(&mut self, a: TrackId, b: TrackId) {
        if self.contains(a) {
            self.get_mut(a).next.retain(|&n| n != b);
        }
        if self.contains(b) {
            self.get_mut(b).previous.retain(|&p| p != a);
        }
    }

    fn discard(&mut self, id: TrackId) {
        self.tracks[id] = None;
    }

    /// Move every edge of `from` onto `to`.
    ///
    /// `to` must already carry its final object list so the boundary-frame
    /// checks below see the merged extent.
    fn transfer_edges(
        &mut self,
        population: &ObjectPopulation,
        from: TrackId,
        to: TrackId,
    ) {
        let previous = self.get(from).previous.clone();
        let next = self.get(from).next.clone();
        for p in previous {
            self.get_mut(p).next.retain(|&n| n != from);
            if p != to && !self.get(p).next.contains(&to) {
                for &n in &self.get(p).next {
                    debug_assert!(
                        self.get(n).first_frame(population)
                            == self.get(to).first_frame(population),
                        "all next neighbors must share the same first frame"
                    );
                }
                self.get_mut(p).next.push(to);
            }
            if p != to && !self.get(to).previous.contains(&p) {
                for &q in &self.get(to).previous {
                    debug_assert!(
                        self.get(q).last_frame(population)
                            == self.get(p).last_frame(population),
                        "all previous neighbors must share the same last frame"
                    );
                }
                self.get_mut(to).previous.push(p);
            }
        }
        for n in next {
            self.get_mut(n).previous.retain(|&p| p != from);
            if n != to && !self.get(n).previous.contains(&to) {
                for &p in &self.get(n).previous {
                    debug_assert!(
                        self.get(p).last_frame(population)
                            == self.get(to).last_frame(population),
                        "all previous neighbors must share the same last frame"
                    );
                }
                self.get_mut(n).previous.push(to);
            }
            if n != to && !self.get(to).next.contains(&n) {
                for &m in &self.get(to).next {
                    debug_assert!(
                        self.get(m).first_frame(population)
                            == self.get(n).first_frame(population),
                        "all next neighbors must share the same first frame"
                    );
                }
                self.get_mut(to).next.push(n);
            }
        }
    }

    /*--------------------------------------------------------------------------
    Split regions
    --------------------------------------------------------------------------*/

    /// Ask the oracle for candidate sub-regions of every object of the track
    /// that does not already carry them (merges record theirs directly).
    ///
    /// The oracle calls are independent and run on the rayon pool in
    /// parallel mode; insertion into the track is always sequential.
    pub fn set_split_regions(
        &mut self,
        population: &ObjectPopulation,
        t: TrackId,
        oracle: &dyn SplitAndMerge,
        mode: ExecutionMode,
    ) {
        let missing: Vec<ObjectId> = self
            .get(t)
            .objects
            .iter()
            .copied()
            .filter(|o| !self.get(t).split_regions.contains_key(o))
            .collect();
        let computed: Vec<(ObjectId, Vec<Region>)> = if mode.is_parallel() {
            missing
                .par_iter()
                .map(|&o| (o, oracle.compute_split_cost(population, o).0))
                .collect()
        } else {
            missing
                .iter()
                .map(|&o| (o, oracle.compute_split_cost(population, o).0))
                .collect()
        };
        let track = self.get_mut(t);
        for (o, regions) in computed {
            track.split_regions.insert(o, regions);
        }
    }

    /*--------------------------------------------------------------------------
    Split
    --------------------------------------------------------------------------*/

    /// Split a whole track into two parallel tracks end to end, using the
    /// precomputed split regions.
    ///
    /// Identity continuity between consecutive frames is decided by
    /// [`match_order`] against the previous frame's chosen pairing. Returns
    /// `None` without mutating anything if any frame yields other than
    /// exactly two usable regions. Both ends are re-linked through the
    /// assigner.
    pub fn split_in_two(
        &mut self,
        population: &mut ObjectPopulation,
        t: TrackId,
        assigner: &dyn TrackAssigner,
    ) -> Option<(TrackId, TrackId)> {
        let objects = self.get(t).objects.clone();
        let mut pairs: Vec<(Region, Region)> = Vec::with_capacity(objects.len());
        for &o in &objects {
            match self.get(t).split_regions.get(&o) {
                Some(r) if r.len() == 2 => {
                    pairs.push((r[0].clone(), r[1].clone()))
                }
                _ => return None,
            }
        }

        // orient each frame's pair against the previous frame's choice
        let mut chain_a: Vec<Region> = Vec::with_capacity(pairs.len());
        let mut chain_b: Vec<Region> = Vec::with_capacity(pairs.len());
        chain_a.push(pairs[0].0.clone());
        chain_b.push(pairs[0].1.clone());
        for pair in pairs.iter().skip(1) {
            let order = match_order(
                (chain_a.last().unwrap(), chain_b.last().unwrap()),
                (&pair.0, &pair.1),
            );
            if order == [0, 1] {
                chain_a.push(pair.0.clone());
                chain_b.push(pair.1.clone());
            } else {
                chain_a.push(pair.1.clone());
                chain_b.push(pair.0.clone());
            }
        }

        debug!("split_in_two: track {} over {} frames", t, objects.len());

        let previous = self.get(t).previous.clone();
        let next = self.get(t).next.clone();

        // chain A reuses the original objects, chain B gets duplicates
        let mut objects_b = Vec::with_capacity(objects.len());
        for (i, &o) in objects.iter().enumerate() {
            let o2 = population.duplicate(o);
            population.set_region(o, chain_a[i].clone());
            population.set_region(o2, chain_b[i].clone());
            objects_b.push(o2);
        }
        for w in objects_b.windows(2) {
            population.set_track_links(Some(w[0]), Some(w[1]), true, true, false);
        }
        let head_b = objects_b[0];
        for &o in &objects_b {
            population.set_track_head(o, head_b, false);
        }

        for &p in &previous {
            self.remove_edge(p, t);
        }
        for &n in &next {
            self.remove_edge(t, n);
        }
        self.get_mut(t).split_regions.clear();
        let tb = self.add_track(population, objects_b);

        assigner.assign(self, population, &previous, &[t, tb], &[], &[]);
        assigner.assign(self, population, &[t, tb], &next, &[], &[]);
        Some((t, tb))
    }

    /// Progressive direction-driven split of a track, frame by frame.
    ///
    /// Each frame's object is decomposed (or kept whole at a gap frame), the
    /// new candidate tracks are linked against the rolling neighbor frontier
    /// with the sibling tracks at the boundary as extra context, candidates
    /// sharing one unique neighbor are coalesced back, trivial 1-1 links are
    /// simplified, and the survivors become the next frontier.
    ///
    /// Aborts with `None` and no mutation if any frame is reported as not
    /// splittable. All-gap tracks are not rejected: gap frames silently
    /// produce singleton tracks bridging both sides.
    pub fn split_track(
        &mut self,
        population: &mut ObjectPopulation,
        t: TrackId,
        forward: bool,
        assigner: &dyn TrackAssigner,
        oracle: &dyn SplitAndMerge,
        mode: ExecutionMode,
    ) -> Option<Vec<TrackId>> {
        self.set_split_regions(population, t, oracle, mode);
        for &o in self.get(t).objects() {
            if self.get(t).split_regions[&o].len() == 1 {
                trace!("split_track: track {} not splittable at object {}", t, o);
                return None;
            }
        }

        let previous = self.get(t).previous.clone();
        let next = self.get(t).next.clone();
        let mut objects = self.get(t).objects.clone();
        let mut regions_map = self.get_mut(t).split_regions.clone();
        if !forward {
            objects.reverse();
        }
        debug!(
            "split_track: track {} ({} frames, forward: {})",
            t,
            objects.len(),
            forward
        );

        for &p in &previous {
            self.remove_edge(p, t);
        }
        for &n in &next {
            self.remove_edge(t, n);
        }
        self.discard(t);

        let mut produced: HashSet<ObjectId> = HashSet::new();
        let mut frontier: Vec<TrackId> =
            if forward { previous.clone() } else { next.clone() };

        for &o in &objects {
            let frame = population.frame(o);
            let regions = regions_map.remove(&o).unwrap_or_default();

            // cut the object's stale chain pointers, it becomes its own track
            population.set_track_links(Some(o), None, false, true, false);
            population.set_track_links(None, Some(o), true, false, true);

            let mut candidates: Vec<TrackId> = Vec::new();
            if regions.len() == 2 {
                let o2 = population.duplicate(o);
                population.set_region(o, regions[0].clone());
                population.set_region(o2, regions[1].clone());
                candidates.push(self.add_track(population, vec![o]));
                candidates.push(self.add_track(population, vec![o2]));
                produced.insert(o2);
            } else {
                // gap: the merged detection stays whole and bridges both sides
                candidates.push(self.add_track(population, vec![o]));
            }
            produced.insert(o);

            // conflict-aware context: every sibling ending/starting at the
            // boundary, not just the tracks under correction
            let (earlier, later) = if forward {
                (frontier.clone(), candidates.clone())
            } else {
                (candidates.clone(), frontier.clone())
            };
            let (earlier_ctx, later_ctx) = if forward {
                (
                    if frame > 0 {
                        self.tracks_ending_at(population, frame - 1)
                    } else {
                        Vec::new()
                    },
                    self.tracks_starting_at(population, frame),
                )
            } else {
                (
                    self.tracks_ending_at(population, frame),
                    self.tracks_starting_at(population, frame + 1),
                )
            };
            assigner.assign(
                self,
                population,
                &earlier,
                &later,
                &earlier_ctx,
                &later_ctx,
            );

            // coalesce candidates that ended up on the same unique neighbor
            let mut by_neighbor: HashMap<TrackId, Vec<TrackId>> = HashMap::new();
            for &c in &candidates {
                let neighbors = if forward {
                    self.get(c).previous()
                } else {
                    self.get(c).next()
                };
                if neighbors.len() == 1 {
                    by_neighbor.entry(neighbors[0]).or_default().push(c);
                }
            }
            for group in by_neighbor.values() {
                if group.len() > 1 {
                    if let Some(survivor) =
                        self.merge_list(population, group, mode)
                    {
                        candidates
                            .retain(|c| !group.contains(c) || *c == survivor);
                        if !candidates.contains(&survivor) {
                            candidates.push(survivor);
                        }
                    }
                }
            }

            // opportunistic 1-1 simplification, survivors become the frontier
            let mut new_frontier: Vec<TrackId> = Vec::new();
            for &c in &candidates {
                if !self.contains(c) {
                    continue;
                }
                let s = self.simplify_track(population, c);
                if !new_frontier.contains(&s) {
                    new_frontier.push(s);
                }
            }
            frontier = new_frontier;
        }

        // final boundary: link the frontier back to the far side
        if forward {
            assigner.assign(self, population, &frontier, &next, &[], &[]);
        } else {
            assigner.assign(self, population, &previous, &frontier, &[], &[]);
        }

        let result: Vec<TrackId> = self
            .ids()
            .into_iter()
            .filter(|&id| {
                self.get(id).objects.iter().any(|o| produced.contains(o))
            })
            .collect();
        Some(result)
    }

    /*--------------------------------------------------------------------------
    Merge
    --------------------------------------------------------------------------*/

    /// Merge `t2` into `t1`, unioning the regions of frames covered by both
    /// and splicing the frames covered by only one.
    ///
    /// Returns `None` when the frame ranges are disjoint, or when the
    /// uncovered range of one track conflicts with the other already having
    /// neighbors on that side. The pre-merge regions of every unioned frame
    /// are recorded as candidate split regions.
    pub fn merge_pair(
        &mut self,
        population: &mut ObjectPopulation,
        t1: TrackId,
        t2: TrackId,
        mode: ExecutionMode,
    ) -> Option<TrackId> {
        assert!(t1 != t2, "cannot merge a track with itself");
        let (f1a, f1b) = {
            let t = self.get(t1);
            (t.first_frame(population), t.last_frame(population))
        };
        let (f2a, f2b) = {
            let t = self.get(t2);
            (t.first_frame(population), t.last_frame(population))
        };
        if f1b < f2a || f2b < f1a {
            return None;
        }
        if f1a < f2a && !self.get(t2).previous.is_empty() {
            return None;
        }
        if f2a < f1a && !self.get(t1).previous.is_empty() {
            return None;
        }
        if f1b > f2b && !self.get(t2).next.is_empty() {
            return None;
        }
        if f2b > f1b && !self.get(t1).next.is_empty() {
            return None;
        }
        debug!(
            "merge_pair: {} [{},{}] <- {} [{},{}]",
            t1, f1a, f1b, t2, f2a, f2b
        );

        let map1: BTreeMap<usize, ObjectId> = self
            .get(t1)
            .objects
            .iter()
            .map(|&o| (population.frame(o), o))
            .collect();
        let map2: BTreeMap<usize, ObjectId> = self
            .get(t2)
            .objects
            .iter()
            .map(|&o| (population.frame(o), o))
            .collect();

        let shared: Vec<(ObjectId, ObjectId)> = map2
            .iter()
            .filter_map(|(f, &o2)| map1.get(f).map(|&o1| (o1, o2)))
            .collect();

        // region unions are side-effect free and may run on the pool
        let unions: Vec<Region> = if mode.is_parallel() {
            shared
                .par_iter()
                .map(|&(o1, o2)| {
                    population.region(o1).union(population.region(o2))
                })
                .collect()
        } else {
            shared
                .iter()
                .map(|&(o1, o2)| {
                    population.region(o1).union(population.region(o2))
                })
                .collect()
        };

        // sequential surgery from here on
        let head2 = self.get(t2).head();
        let tail2 = self.get(t2).tail();
        for (&(o1, o2), union) in shared.iter().zip(unions) {
            let originals =
                vec![population.region(o1).clone(), population.region(o2).clone()];
            self.get_mut(t1).split_regions.insert(o1, originals);
            population.set_region(o1, union);
        }

        // re-point external object links aimed at removed boundary objects
        let surviving_at = |f: usize| -> ObjectId {
            map1.get(&f).or_else(|| map2.get(&f)).copied().unwrap()
        };
        let removed: HashSet<ObjectId> =
            shared.iter().map(|&(_, o2)| o2).collect();
        if removed.contains(&head2) {
            let survivor = surviving_at(f2a);
            for &p in &self.get(t2).previous.clone() {
                let tp = self.get(p).tail();
                if population.next(tp) == Some(head2) {
                    population.set_track_links(
                        Some(tp),
                        Some(survivor),
                        false,
                        true,
                        false,
                    );
                }
            }
        }
        if removed.contains(&tail2) {
            let survivor = surviving_at(f2b);
            for &n in &self.get(t2).next.clone() {
                let hn = self.get(n).head();
                if population.previous(hn) == Some(tail2) {
                    population.set_track_links(
                        Some(survivor),
                        Some(hn),
                        true,
                        false,
                        false,
                    );
                }
            }
        }
        for &o2 in &removed {
            population.remove(o2);
        }

        // rebuild the merged sequence and its object-level chain
        let merged: Vec<ObjectId> = map1
            .iter()
            .map(|(&f, &o)| (f, o))
            .chain(
                map2.iter()
                    .filter(|(_, o2)| !removed.contains(o2))
                    .map(|(&f, &o)| (f, o)),
            )
            .collect::<BTreeMap<usize, ObjectId>>()
            .into_values()
            .collect();
        let head = merged[0];
        for &o in &merged {
            population.set_track_head(o, head, false);
        }
        for i in 1..merged.len() {
            if population.previous(merged[i]) != Some(merged[i - 1]) {
                population.set_track_links(
                    Some(merged[i - 1]),
                    Some(merged[i]),
                    true,
                    true,
                    false,
                );
            }
        }

        // adopt t2's recorded split regions for the spliced objects
        let spliced_regions: Vec<(ObjectId, Vec<Region>)> = self
            .get(t2)
            .split_regions
            .iter()
            .filter(|(o, _)| !removed.contains(o))
            .map(|(&o, r)| (o, r.clone()))
            .collect();
        for (o, r) in spliced_regions {
            self.get_mut(t1).split_regions.insert(o, r);
        }

        self.get_mut(t1).objects = merged;
        self.transfer_edges(population, t2, t1);
        self.discard(t2);
        Some(t1)
    }

    /// N-ary merge of tracks sharing identical first and last frames,
    /// processed in ascending id order.
    ///
    /// Frames covered by at least two tracks get their regions unioned (the
    /// originals recorded for a later split); frames covered by exactly one
    /// track are flagged as gaps. All non-first inputs are discarded.
    pub fn merge_list(
        &mut self,
        population: &mut ObjectPopulation,
        tracks: &[TrackId],
        mode: ExecutionMode,
    ) -> Option<TrackId> {
        let mut ids: Vec<TrackId> = tracks.to_vec();
        ids.sort_unstable();
        ids.dedup();
        if ids.len() < 2 {
            return ids.first().copied();
        }
        let first = self.get(ids[0]).first_frame(population);
        let last = self.get(ids[0]).last_frame(population);
        for &id in &ids[1..] {
            assert!(
                self.get(id).first_frame(population) == first
                    && self.get(id).last_frame(population) == last,
                "merge_list requires identical first and last frames"
            );
        }
        let target = ids[0];
        debug!("merge_list: {:?} [{},{}] -> {}", ids, first, last, target);

        // frame maps are snapshotted up front: the removals below would
        // otherwise invalidate per-frame lookups on the later inputs
        let frame_maps: Vec<(TrackId, BTreeMap<usize, ObjectId>)> = ids
            .iter()
            .map(|&id| {
                let map = self
                    .get(id)
                    .objects
                    .iter()
                    .map(|&o| (population.frame(o), o))
                    .collect();
                (id, map)
            })
            .collect();
        let frames: BTreeSet<usize> = frame_maps
            .iter()
            .flat_map(|(_, map)| map.keys().copied())
            .collect();

        let mut merged: Vec<ObjectId> = Vec::new();
        for &f in &frames {
            let covering: Vec<(TrackId, ObjectId)> = frame_maps
                .iter()
                .filter_map(|&(id, ref map)| {
                    map.get(&f).map(|&o| (id, o))
                })
                .collect();
            if covering.len() >= 2 {
                let survivor = covering[0].1;
                let originals: Vec<Region> = covering
                    .iter()
                    .map(|&(_, o)| population.region(o).clone())
                    .collect();
                let union = if mode.is_parallel() && originals.len() > 2 {
                    originals
                        .par_iter()
                        .cloned()
                        .reduce_with(|a, b| a.union(&b))
                        .unwrap()
                } else {
                    originals[1..]
                        .iter()
                        .fold(originals[0].clone(), |a, b| a.union(b))
                };
                self.get_mut(target).split_regions.insert(survivor, originals);
                population.set_region(survivor, union);
                for &(tr, o) in &covering[1..] {
                    // re-point external links aimed at the removed object
                    for &p in &self.get(tr).previous.clone() {
                        let tp = self.get(p).tail();
                        if population.next(tp) == Some(o) {
                            population.set_track_links(
                                Some(tp),
                                Some(survivor),
                                false,
                                true,
                                false,
                            );
                        }
                    }
                    for &n in &self.get(tr).next.clone() {
                        let hn = self.get(n).head();
                        if population.previous(hn) == Some(o) {
                            population.set_track_links(
                                Some(survivor),
                                Some(hn),
                                true,
                                false,
                                false,
                            );
                        }
                    }
                    population.remove(o);
                }
                merged.push(survivor);
            } else {
                // gap: only one input genuinely covers this frame
                let (_, o) = covering[0];
                self.get_mut(target).split_regions.insert(o, Vec::new());
                merged.push(o);
            }
        }

        let head = merged[0];
        for &o in &merged {
            population.set_track_head(o, head, false);
        }
        for i in 1..merged.len() {
            if population.previous(merged[i]) != Some(merged[i - 1]) {
                population.set_track_links(
                    Some(merged[i - 1]),
                    Some(merged[i]),
                    true,
                    true,
                    false,
                );
            }
        }

        self.get_mut(target).objects = merged;
        for &id in &ids[1..] {
            self.transfer_edges(population, id, target);
            self.discard(id);
        }
        Some(target)
    }

    /*--------------------------------------------------------------------------
    Append / simplify
    --------------------------------------------------------------------------*/

    /// Concatenate two strictly sequential, singly-linked tracks into `t1`.
    ///
    /// Both tracks must have exactly one neighbor on the joining side and it
    /// must be the other track; anything else is a contract violation.
    pub fn append_track(
        &mut self,
        population: &mut ObjectPopulation,
        t1: TrackId,
        t2: TrackId,
    ) -> TrackId {
        assert!(
            self.get(t1).next == [t2],
            "appended-to track must have exactly one next neighbor: the appendee"
        );
        assert!(
            self.get(t2).previous == [t1],
            "appendee must have exactly one previous neighbor: the appended-to track"
        );
        trace!("append_track: {} <- {}", t1, t2);

        let tail1 = self.get(t1).tail();
        let head2 = self.get(t2).head();
        population.set_track_links(Some(tail1), Some(head2), true, true, false);
        let head = self.get(t1).head();
        let objects2 = self.get(t2).objects.clone();
        for &o in &objects2 {
            population.set_track_head(o, head, false);
        }

        let next2 = self.get(t2).next.clone();
        for &n in &next2 {
            let prevs = &mut self.get_mut(n).previous;
            prevs.retain(|&p| p != t2);
            if !prevs.contains(&t1) {
                prevs.push(t1);
            }
        }
        let regions2 = std::mem::take(&mut self.get_mut(t2).split_regions);
        {
            let t = self.get_mut(t1);
            t.objects.extend(objects2);
            t.next = next2;
            t.split_regions.extend(regions2);
        }
        self.discard(t2);
        t1
    }

    /// Collapse every trivial 1-1 previous/next link around `track` until no
    /// further join is possible; returns the surviving id.
    pub fn simplify_track(
        &mut self,
        population: &mut ObjectPopulation,
        track: TrackId,
    ) -> TrackId {
        let mut cur = track;
        loop {
            let join = {
                let t = self.get(cur);
                if t.previous.len() == 1
                    && self.get(t.previous[0]).next.len() == 1
                {
                    Some(t.previous[0])
                } else {
                    None
                }
            };
            match join {
                Some(p) => cur = self.append_track(population, p, cur),
                None => break,
            }
        }
        loop {
            let join = {
                let t = self.get(cur);
                if t.next.len() == 1 && self.get(t.next[0]).previous.len() == 1
                {
                    Some(t.next[0])
                } else {
                    None
                }
            };
            match join {
                Some(n) => {
                    self.append_track(population, cur, n);
                }
                None => break,
            }
        }
        cur
    }
}
