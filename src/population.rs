use std::collections::HashSet;

use log::{debug, info};

use crate::assigner::TrackAssigner;
use crate::exec::ExecutionMode;
use crate::object::ObjectPopulation;
use crate::split_merge::SplitAndMerge;
use crate::track::{TrackArena, TrackId};
use crate::tree::{build_trees, JunctionKind, TrackTree};

/// Decides whether two sibling tracks at a junction must not belong to the
/// same lineage. Returning `true` requests that the shared track be split.
pub trait ForbidFn:
    Fn(&TrackArena, &ObjectPopulation, TrackId, TrackId) -> bool
{
}
impl<F> ForbidFn for F where
    F: Fn(&TrackArena, &ObjectPopulation, TrackId, TrackId) -> bool
{
}

/*------------------------------------------------------------------------------
TrackTreePopulation
------------------------------------------------------------------------------*/

/// The full set of lineage components, with the two correction passes that
/// resolve erroneous merge and split events.
pub struct TrackTreePopulation {
    trees: Vec<TrackTree>,
}

impl TrackTreePopulation {
    pub fn new(arena: &TrackArena) -> Self {
        Self { trees: build_trees(arena) }
    }

    pub fn trees(&self) -> &[TrackTree] {
        &self.trees
    }

    /// Correct erroneous merge events: pairs of tracks converging into a
    /// shared continuation when the oracle forbids them to coexist.
    pub fn solve_merge_events(
        &mut self,
        arena: &mut TrackArena,
        population: &mut ObjectPopulation,
        forbid: &dyn ForbidFn,
        oracle: &dyn SplitAndMerge,
        assigner: &dyn TrackAssigner,
        mode: ExecutionMode,
    ) {
        info!("solving merge events over {} trees", self.trees.len());
        self.solve_by_splitting(
            arena, population, JunctionKind::Merge, forbid, oracle, assigner,
            mode,
        );
        self.solve_by_merging(
            arena, population, JunctionKind::Merge, forbid, oracle, mode,
        );
    }

    /// Correct erroneous split events: one track diverging into pairs the
    /// oracle forbids to coexist.
    pub fn solve_split_events(
        &mut self,
        arena: &mut TrackArena,
        population: &mut ObjectPopulation,
        forbid: &dyn ForbidFn,
        oracle: &dyn SplitAndMerge,
        assigner: &dyn TrackAssigner,
        mode: ExecutionMode,
    ) {
        info!("solving split events over {} trees", self.trees.len());
        self.solve_by_splitting(
            arena, population, JunctionKind::Split, forbid, oracle, assigner,
            mode,
        );
        self.solve_by_merging(
            arena, population, JunctionKind::Split, forbid, oracle, mode,
        );
    }

    /*--------------------------------------------------------------------------
    Phase 1: resolve by splitting the shared track
    --------------------------------------------------------------------------*/

    fn solve_by_splitting(
        &mut self,
        arena: &mut TrackArena,
        population: &mut ObjectPopulation,
        kind: JunctionKind,
        forbid: &dyn ForbidFn,
        oracle: &dyn SplitAndMerge,
        assigner: &dyn TrackAssigner,
        mode: ExecutionMode,
    ) {
        // every successful split strictly refines the lineage, so sweeps are
        // bounded by the number of live tracks
        let bound = arena.len().max(1);
        let mut sweeps = 0;
        loop {
            let mut changed = false;
            'sweep: for idx in 0..self.trees.len() {
                let mut seen: HashSet<TrackId> = HashSet::new();
                while let Some(junction) = self.trees[idx]
                    .first_junction(arena, population, kind, &seen)
                {
                    seen.insert(junction);
                    let neighbors = kind.neighbors(arena.get(junction)).to_vec();
                    let pair = first_forbidden_pair(
                        arena, population, &neighbors, forbid,
                    );
                    let Some((a, b)) = pair else { continue };
                    debug!(
                        "junction {}: forbidden sibling pair ({}, {})",
                        junction, a, b
                    );
                    if let Some(trees) = self.trees[idx]
                        .split(arena, population, a, b, oracle, assigner, mode)
                    {
                        // the component layout changed wholesale, restart
                        self.trees = trees;
                        changed = true;
                        break 'sweep;
                    }
                }
            }
            if !changed {
                break;
            }
            sweeps += 1;
            if sweeps >= bound {
                debug!("splitting pass reached its sweep bound");
                break;
            }
        }
    }

    /*--------------------------------------------------------------------------
    Phase 2: resolve by merging sibling tracks
    --------------------------------------------------------------------------*/

    fn solve_by_merging(
        &mut self,
        arena: &mut TrackArena,
        population: &mut ObjectPopulation,
        kind: JunctionKind,
        forbid: &dyn ForbidFn,
        oracle: &dyn SplitAndMerge,
        mode: ExecutionMode,
    ) {
        for idx in 0..self.trees.len() {
            let mut seen: HashSet<TrackId> = HashSet::new();
            while let Some(junction) = self.trees[idx]
                .first_junction(arena, population, kind, &seen)
            {
                seen.insert(junction);
                let mut current = junction;
                loop {
                    if !arena.contains(current) {
                        break;
                    }
                    let neighbors =
                        kind.neighbors(arena.get(current)).to_vec();
                    if neighbors.len() < 2 {
                        break;
                    }
                    let merged = Self::merge_cheapest_allowed_pair(
                        arena, population, &neighbors, kind, forbid, oracle,
                        mode,
                    );
                    let Some(merged) = merged else { break };
                    debug!(
                        "junction {}: merged siblings into track {}",
                        current, merged
                    );
                    let survivor = arena.simplify_track(population, merged);
                    // keep working on the same junction while it is ambiguous
                    if !arena.contains(current) {
                        current = survivor;
                    }
                }
                self.trees[idx].retain_live(arena);
            }
        }
        for tree in &mut self.trees {
            tree.retain_live(arena);
        }
        self.trees.retain(|t| !t.is_empty());
    }

    /// Try the allowed sibling pairs in ascending oracle merge cost until one
    /// actually merges.
    ///
    /// Costs are taken at the junction-side boundary: the tails of the
    /// siblings converging into a merge, the heads of those leaving a split.
    fn merge_cheapest_allowed_pair(
        arena: &mut TrackArena,
        population: &mut ObjectPopulation,
        neighbors: &[TrackId],
        kind: JunctionKind,
        forbid: &dyn ForbidFn,
        oracle: &dyn SplitAndMerge,
        mode: ExecutionMode,
    ) -> Option<TrackId> {
        let boundary = |t: TrackId| match kind {
            JunctionKind::Merge => arena.get(t).tail(),
            JunctionKind::Split => arena.get(t).head(),
        };
        let mut ranked: Vec<(f64, TrackId, TrackId)> = Vec::new();
        for i in 0..neighbors.len() {
            for j in (i + 1)..neighbors.len() {
                let (a, b) = (neighbors[i], neighbors[j]);
                if !arena.contains(a) || !arena.contains(b) {
                    continue;
                }
                if forbid(arena, population, a, b) {
                    continue;
                }
                let cost = oracle.compute_merge_cost(
                    population,
                    &[boundary(a), boundary(b)],
                );
                ranked.push((cost, a, b));
            }
        }
        ranked.sort_by(|x, y| x.0.total_cmp(&y.0));
        for (_, a, b) in ranked {
            if !arena.contains(a) || !arena.contains(b) {
                continue;
            }
            if let Some(m) = arena.merge_pair(population, a, b, mode) {
                return Some(m);
            }
        }
        None
    }
}

fn first_forbidden_pair(
    arena: &TrackArena,
    population: &ObjectPopulation,
    neighbors: &[TrackId],
    forbid: &dyn ForbidFn,
) -> Option<(TrackId, TrackId)> {
    for i in 0..neighbors.len() {
        for j in (i + 1)..neighbors.len() {
            if forbid(arena, population, neighbors[i], neighbors[j]) {
                return Some((neighbors[i], neighbors[j]));
            }
        }
    }
    None
}
