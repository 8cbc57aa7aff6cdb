use std::collections::{BTreeSet, HashSet, VecDeque};

use log::{debug, trace};

use crate::assigner::TrackAssigner;
use crate::exec::ExecutionMode;
use crate::object::ObjectPopulation;
use crate::split_merge::SplitAndMerge;
use crate::track::{Track, TrackArena, TrackId};

/*------------------------------------------------------------------------------
JunctionKind / TrackTree
------------------------------------------------------------------------------*/

/// The two kinds of topologically ambiguous junctions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JunctionKind {
    /// Several tracks converge into one (`previous.len() > 1`).
    Merge,
    /// One track diverges into several (`next.len() > 1`).
    Split,
}

impl JunctionKind {
    pub(crate) fn neighbors<'a>(&self, track: &'a Track) -> &'a [TrackId] {
        match self {
            JunctionKind::Merge => track.previous(),
            JunctionKind::Split => track.next(),
        }
    }

    fn is_junction(&self, track: &Track) -> bool {
        match self {
            JunctionKind::Merge => track.is_merge(),
            JunctionKind::Split => track.is_split(),
        }
    }
}

/// One connected component of the track graph.
///
/// Membership is keyed on the surrogate track id (identity semantics: two
/// tracks with equal-content heads stay distinct entries). A component is a
/// forest, not a single root, since merges create convergence.
#[derive(Debug, Clone)]
pub struct TrackTree {
    tracks: BTreeSet<TrackId>,
}

impl TrackTree {
    pub fn new(tracks: impl IntoIterator<Item = TrackId>) -> Self {
        Self { tracks: tracks.into_iter().collect() }
    }

    pub fn track_ids(&self) -> impl Iterator<Item = TrackId> + '_ {
        self.tracks.iter().copied()
    }

    pub fn contains(&self, id: TrackId) -> bool {
        self.tracks.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub(crate) fn retain_live(&mut self, arena: &TrackArena) {
        self.tracks.retain(|&t| arena.contains(t));
    }

    fn frame_ordered(
        &self,
        arena: &TrackArena,
        population: &ObjectPopulation,
    ) -> Vec<TrackId> {
        let mut ids: Vec<TrackId> =
            self.tracks.iter().copied().filter(|&t| arena.contains(t)).collect();
        ids.sort_by_key(|&t| (arena.get(t).first_frame(population), t));
        ids
    }

    /// First track of the component, in frame order, that is a junction of
    /// the given kind and not in `seen`.
    pub fn first_junction(
        &self,
        arena: &TrackArena,
        population: &ObjectPopulation,
        kind: JunctionKind,
        seen: &HashSet<TrackId>,
    ) -> Option<TrackId> {
        self.frame_ordered(arena, population)
            .into_iter()
            .find(|&t| !seen.contains(&t) && kind.is_junction(arena.get(t)))
    }

    pub fn get_first_merge(
        &self,
        arena: &TrackArena,
        population: &ObjectPopulation,
    ) -> Option<TrackId> {
        self.first_junction(arena, population, JunctionKind::Merge, &HashSet::new())
    }

    pub fn get_first_split(
        &self,
        arena: &TrackArena,
        population: &ObjectPopulation,
    ) -> Option<TrackId> {
        self.first_junction(arena, population, JunctionKind::Split, &HashSet::new())
    }

    /*--------------------------------------------------------------------------
    Common track search
    --------------------------------------------------------------------------*/

    fn closure(
        arena: &TrackArena,
        start: TrackId,
        forward: bool,
    ) -> HashSet<TrackId> {
        let mut out = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(start);
        while let Some(t) = queue.pop_front() {
            let neighbors = if forward {
                arena.get(t).next()
            } else {
                arena.get(t).previous()
            };
            for &n in neighbors {
                if out.insert(n) {
                    queue.push_back(n);
                }
            }
        }
        out
    }

    /// The common descendant or ancestor track shared by `t1` and `t2`,
    /// searching transitively when there is no direct common neighbor.
    ///
    /// A shared descendant (nearest first frame) is preferred over a shared
    /// ancestor (nearest last frame).
    pub fn common_track(
        arena: &TrackArena,
        population: &ObjectPopulation,
        t1: TrackId,
        t2: TrackId,
    ) -> Option<TrackId> {
        let down1 = Self::closure(arena, t1, true);
        let down2 = Self::closure(arena, t2, true);
        let descendant = down1
            .intersection(&down2)
            .copied()
            .filter(|&t| t != t1 && t != t2)
            .min_by_key(|&t| (arena.get(t).first_frame(population), t));
        if descendant.is_some() {
            return descendant;
        }
        let up1 = Self::closure(arena, t1, false);
        let up2 = Self::closure(arena, t2, false);
        up1.intersection(&up2)
            .copied()
            .filter(|&t| t != t1 && t != t2)
            .max_by_key(|&t| (arena.get(t).last_frame(population), usize::MAX - t))
    }

    /*--------------------------------------------------------------------------
    Split orchestration
    --------------------------------------------------------------------------*/

    /// Split the track shared by `t1` and `t2` until no common conflicting
    /// track remains or a split attempt fails.
    ///
    /// Any successful split invalidates the component boundary, so the whole
    /// population is rebuilt from the current track set; returns the fresh
    /// tree set, or `None` if nothing changed.
    pub fn split(
        &self,
        arena: &mut TrackArena,
        population: &mut ObjectPopulation,
        t1: TrackId,
        t2: TrackId,
        oracle: &dyn SplitAndMerge,
        assigner: &dyn TrackAssigner,
        mode: ExecutionMode,
    ) -> Option<Vec<TrackTree>> {
        let anchor1 = arena.get(t1).head();
        let anchor2 = arena.get(t2).head();
        let mut changed = false;
        let (mut a, mut b) = (t1, t2);
        let mut guard = arena.len() + 1;

        while let Some(common) =
            Self::common_track(arena, population, a, b)
        {
            if guard == 0 {
                debug!("tree split: bailing out after too many rounds");
                break;
            }
            guard -= 1;

            let forward = arena.get(common).first_frame(population)
                > arena.get(a).last_frame(population);
            trace!(
                "tree split: common track {} of ({}, {}), forward: {}",
                common,
                a,
                b,
                forward
            );
            match arena.split_track(
                population, common, forward, assigner, oracle, mode,
            ) {
                None => break,
                Some(produced) => {
                    changed = true;
                    for t in produced {
                        if arena.contains(t) {
                            arena.simplify_track(population, t);
                        }
                    }
                    // the handles may have been absorbed by simplification
                    let na = arena.find_track_of_object(anchor1);
                    let nb = arena.find_track_of_object(anchor2);
                    match (na, nb) {
                        (Some(x), Some(y)) if x != y => {
                            a = x;
                            b = y;
                        }
                        _ => break,
                    }
                }
            }
        }

        if changed {
            Some(build_trees(arena))
        } else {
            None
        }
    }
}

/// Partition the arena's live tracks into connected components.
pub(crate) fn build_trees(arena: &TrackArena) -> Vec<TrackTree> {
    let mut visited: HashSet<TrackId> = HashSet::new();
    let mut trees = Vec::new();
    for t in arena.ids() {
        if visited.contains(&t) {
            continue;
        }
        let mut component = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back(t);
        visited.insert(t);
        while let Some(cur) = queue.pop_front() {
            component.push(cur);
            let track = arena.get(cur);
            for &n in track.previous().iter().chain(track.next()) {
                if visited.insert(n) {
                    queue.push_back(n);
                }
            }
        }
        trees.push(TrackTree::new(component));
    }
    trees
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Region;

    fn singleton(
        pop: &mut ObjectPopulation,
        arena: &mut TrackArena,
        frame: usize,
        x: i32,
    ) -> TrackId {
        let o = pop.add_object(frame, 0, Region::rect(x, 0, 2, 2));
        arena.add_track(pop, vec![o])
    }

    #[test]
    fn test_common_track_prefers_shared_descendant() {
        let mut pop = ObjectPopulation::new();
        let mut arena = TrackArena::new();
        let a = singleton(&mut pop, &mut arena, 0, 0);
        let b = singleton(&mut pop, &mut arena, 0, 10);
        let m = singleton(&mut pop, &mut arena, 1, 5);
        arena.add_edge(&pop, a, m);
        arena.add_edge(&pop, b, m);
        assert_eq!(TrackTree::common_track(&arena, &pop, a, b), Some(m));
    }

    #[test]
    fn test_common_track_falls_back_to_ancestor() {
        let mut pop = ObjectPopulation::new();
        let mut arena = TrackArena::new();
        let m = singleton(&mut pop, &mut arena, 0, 5);
        let a = singleton(&mut pop, &mut arena, 1, 0);
        let b = singleton(&mut pop, &mut arena, 1, 10);
        arena.add_edge(&pop, m, a);
        arena.add_edge(&pop, m, b);
        assert_eq!(TrackTree::common_track(&arena, &pop, a, b), Some(m));
    }

    #[test]
    fn test_common_track_searches_transitively() {
        let mut pop = ObjectPopulation::new();
        let mut arena = TrackArena::new();
        let a = singleton(&mut pop, &mut arena, 0, 0);
        let x = singleton(&mut pop, &mut arena, 1, 0);
        let b = singleton(&mut pop, &mut arena, 1, 10);
        let m = singleton(&mut pop, &mut arena, 2, 5);
        arena.add_edge(&pop, a, x);
        arena.add_edge(&pop, x, m);
        arena.add_edge(&pop, b, m);
        assert_eq!(TrackTree::common_track(&arena, &pop, a, b), Some(m));
        let c = singleton(&mut pop, &mut arena, 0, 20);
        assert_eq!(TrackTree::common_track(&arena, &pop, a, c), None);
    }

    #[test]
    fn test_build_trees_partitions_components() {
        let mut pop = ObjectPopulation::new();
        let mut arena = TrackArena::new();
        let a = singleton(&mut pop, &mut arena, 0, 0);
        let m = singleton(&mut pop, &mut arena, 1, 0);
        let b = singleton(&mut pop, &mut arena, 0, 20);
        arena.add_edge(&pop, a, m);
        let trees = build_trees(&arena);
        assert_eq!(trees.len(), 2);
        let with_a = trees.iter().find(|t| t.contains(a)).unwrap();
        assert!(with_a.contains(m));
        assert!(!with_a.contains(b));
    }
}
