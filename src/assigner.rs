use log::{debug, trace};

use crate::lapjv::linear_assignment;
use crate::object::ObjectPopulation;
use crate::track::{match_order, TrackArena, TrackId};

/*------------------------------------------------------------------------------
TrackAssigner
------------------------------------------------------------------------------*/

/// Strategy (re)computing the previous/next links between tracks ending at one
/// frame and tracks starting at the following frame.
///
/// The context slices carry the wider sibling tracks present at the boundary;
/// they participate in the matching so a local 2-track decision cannot
/// silently swap identities a frame-wide match would have kept distinct, but
/// only links touching a focal track are rewritten.
///
/// An infeasible boundary is not an error: the tracks on both sides are left
/// explicitly unlinked.
pub trait TrackAssigner {
    fn assign(
        &self,
        arena: &mut TrackArena,
        population: &mut ObjectPopulation,
        previous: &[TrackId],
        next: &[TrackId],
        previous_context: &[TrackId],
        next_context: &[TrackId],
    );
}

/*------------------------------------------------------------------------------
DistanceAssigner
------------------------------------------------------------------------------*/

/// Default assigner: center-distance costs, a [`match_order`] fast path for
/// the 2-vs-2 case, and a min-cost bipartite matching with a distance cutoff
/// plus a gap-closing extension pass for everything else.
#[derive(Debug, Clone)]
pub struct DistanceAssigner {
    max_distance: f64,
    gap_closing_factor: f64,
}

impl DistanceAssigner {
    pub fn new(max_distance: f64) -> Self {
        assert!(
            max_distance.is_finite() && max_distance > 0.0,
            "max_distance must be positive and finite"
        );
        Self { max_distance, gap_closing_factor: 2.0 }
    }

    /// Cutoff multiplier for the second pass over leftover tracks.
    pub fn with_gap_closing_factor(mut self, factor: f64) -> Self {
        assert!(factor >= 1.0, "gap closing factor must be >= 1");
        self.gap_closing_factor = factor;
        self
    }

    fn infeasible_cost(&self) -> f64 {
        self.max_distance * self.gap_closing_factor * 2.0 + 1.0
    }

    fn pair_cost(
        &self,
        arena: &TrackArena,
        population: &ObjectPopulation,
        a: TrackId,
        b: TrackId,
    ) -> f64 {
        let ta = arena.get(a);
        let tb = arena.get(b);
        if ta.last_frame(population) >= tb.first_frame(population) {
            return self.infeasible_cost();
        }
        let ca = population.region(ta.tail()).center();
        let cb = population.region(tb.head()).center();
        (ca - cb).norm()
    }

    fn apply_match(
        &self,
        arena: &mut TrackArena,
        population: &ObjectPopulation,
        a: TrackId,
        b: TrackId,
        focal: bool,
    ) {
        if !focal {
            return;
        }
        if arena.get(a).last_frame(population)
            >= arena.get(b).first_frame(population)
        {
            return;
        }
        trace!("assign: link {} -> {}", a, b);
        arena.add_edge(population, a, b);
    }

    fn assign_general(
        &self,
        arena: &mut TrackArena,
        population: &ObjectPopulation,
        a_all: &[TrackId],
        b_all: &[TrackId],
        focal_prev: &[TrackId],
        focal_next: &[TrackId],
    ) {
        let cost: Vec<Vec<f64>> = a_all
            .iter()
            .map(|&a| {
                b_all
                    .iter()
                    .map(|&b| self.pair_cost(arena, population, a, b))
                    .collect()
            })
            .collect();
        let (rowsol, _) = match linear_assignment(&cost, self.max_distance) {
            Ok(sol) => sol,
            Err(err) => {
                debug!("assign: infeasible boundary, leaving unlinked ({})", err);
                return;
            }
        };

        let mut leftover_a: Vec<usize> = Vec::new();
        let mut matched_b = vec![false; b_all.len()];
        for (i, &j) in rowsol.iter().enumerate() {
            if j >= 0 {
                let (a, b) = (a_all[i], b_all[j as usize]);
                matched_b[j as usize] = true;
                let focal =
                    focal_prev.contains(&a) || focal_next.contains(&b);
                self.apply_match(arena, population, a, b, focal);
            } else {
                leftover_a.push(i);
            }
        }
        let leftover_b: Vec<usize> =
            (0..b_all.len()).filter(|&j| !matched_b[j]).collect();
        if leftover_a.is_empty() || leftover_b.is_empty() {
            return;
        }

        // gap-closing extension over the leftovers, with a wider cutoff
        let gap_cost: Vec<Vec<f64>> = leftover_a
            .iter()
            .map(|&i| leftover_b.iter().map(|&j| cost[i][j]).collect())
            .collect();
        let limit = self.max_distance * self.gap_closing_factor;
        if let Ok((gap_rowsol, _)) = linear_assignment(&gap_cost, limit) {
            for (gi, &gj) in gap_rowsol.iter().enumerate() {
                if gj >= 0 {
                    let a = a_all[leftover_a[gi]];
                    let b = b_all[leftover_b[gj as usize]];
                    let focal =
                        focal_prev.contains(&a) || focal_next.contains(&b);
                    self.apply_match(arena, population, a, b, focal);
                }
            }
        }
    }
}

/// Recompute the boundary object pointers of both sides from the track-level
/// edge lists, so the persisted object graph mirrors the track graph.
fn sync_boundary_links(
    arena: &TrackArena,
    population: &mut ObjectPopulation,
    prev_side: &[TrackId],
    next_side: &[TrackId],
) {
    for &a in prev_side {
        if !arena.contains(a) {
            continue;
        }
        let t = arena.get(a);
        let tail = t.tail();
        let target = match t.next() {
            [only] => Some(arena.get(*only).head()),
            _ => None,
        };
        population.set_track_links(Some(tail), target, false, true, false);
    }
    for &b in next_side {
        if !arena.contains(b) {
            continue;
        }
        let t = arena.get(b);
        let head = t.head();
        let source = match t.previous() {
            [only] => Some(arena.get(*only).tail()),
            _ => None,
        };
        population.set_track_links(source, Some(head), true, false, false);
    }
}

impl TrackAssigner for DistanceAssigner {
    fn assign(
        &self,
        arena: &mut TrackArena,
        population: &mut ObjectPopulation,
        previous: &[TrackId],
        next: &[TrackId],
        previous_context: &[TrackId],
        next_context: &[TrackId],
    ) {
        let focal_prev: Vec<TrackId> = previous
            .iter()
            .copied()
            .filter(|&t| arena.contains(t))
            .collect();
        let focal_next: Vec<TrackId> =
            next.iter().copied().filter(|&t| arena.contains(t)).collect();

        let mut a_all = focal_prev.clone();
        for &t in previous_context {
            if arena.contains(t) && !a_all.contains(&t) {
                a_all.push(t);
            }
        }
        let mut b_all = focal_next.clone();
        for &t in next_context {
            if arena.contains(t) && !b_all.contains(&t) {
                b_all.push(t);
            }
        }

        // clear every stale link that touches a focal track
        for &a in &a_all {
            for n in arena.get(a).next().to_vec() {
                if b_all.contains(&n)
                    && (focal_prev.contains(&a) || focal_next.contains(&n))
                {
                    arena.remove_edge(a, n);
                }
            }
        }

        if !a_all.is_empty() && !b_all.is_empty() {
            if a_all.len() == 2 && b_all.len() == 2 {
                // nearest-pairing fast path, no solver involved
                let ra0 = population.region(arena.get(a_all[0]).tail()).clone();
                let ra1 = population.region(arena.get(a_all[1]).tail()).clone();
                let rb0 = population.region(arena.get(b_all[0]).head()).clone();
                let rb1 = population.region(arena.get(b_all[1]).head()).clone();
                let order = match_order((&ra0, &ra1), (&rb0, &rb1));
                for (i, &a) in a_all.iter().enumerate() {
                    let b = b_all[order[i]];
                    if self.pair_cost(arena, population, a, b)
                        <= self.max_distance
                    {
                        let focal = focal_prev.contains(&a)
                            || focal_next.contains(&b);
                        self.apply_match(arena, population, a, b, focal);
                    }
                }
            } else {
                self.assign_general(
                    arena,
                    population,
                    &a_all,
                    &b_all,
                    &focal_prev,
                    &focal_next,
                );
            }
        }

        sync_boundary_links(arena, population, &a_all, &b_all);
    }
}
