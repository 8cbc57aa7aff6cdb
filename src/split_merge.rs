use crate::object::{ObjectId, ObjectPopulation};
use crate::region::{center_distance_sq, Region};

/*------------------------------------------------------------------------------
SplitAndMerge oracle
------------------------------------------------------------------------------*/

/// Cost / decomposition oracle consulted by the correction passes.
///
/// `compute_split_cost` proposes candidate sub-regions for one object:
/// - two regions: the object decomposes into two sub-objects (normal case),
/// - one region equal to the original: the object is not splittable,
/// - empty: the object carries no usable per-frame record (a gap).
///
/// Implementations must be side-effect free: split-region computation may run
/// on a worker pool across the objects of a track.
pub trait SplitAndMerge: Sync {
    /// Cost of treating `objects` as a single physical object.
    fn compute_merge_cost(
        &self,
        population: &ObjectPopulation,
        objects: &[ObjectId],
    ) -> f64;

    /// Candidate sub-regions for `object`, with the cost of the decomposition.
    fn compute_split_cost(
        &self,
        population: &ObjectPopulation,
        object: ObjectId,
    ) -> (Vec<Region>, f64);
}

/*------------------------------------------------------------------------------
GeometricSplitAndMerge
------------------------------------------------------------------------------*/

/// Default oracle: bisects a region at the median of its widest axis.
///
/// Good enough for roughly convex objects and for synthetic populations; real
/// pipelines plug in a segmentation-aware oracle instead.
#[derive(Debug, Clone, Default)]
pub struct GeometricSplitAndMerge;

impl GeometricSplitAndMerge {
    pub fn new() -> Self {
        Self
    }

    fn bisect(region: &Region) -> Option<(Region, Region)> {
        if region.size() < 2 {
            return None;
        }
        let c = region.center();
        let (mut var_x, mut var_y) = (0.0, 0.0);
        for &(x, y) in region.pixels() {
            var_x += (x as f64 - c.x) * (x as f64 - c.x);
            var_y += (y as f64 - c.y) * (y as f64 - c.y);
        }
        let mut pixels: Vec<(i32, i32)> = region.pixels().to_vec();
        if var_x >= var_y {
            pixels.sort_unstable_by_key(|&(x, y)| (x, y));
        } else {
            pixels.sort_unstable_by_key(|&(x, y)| (y, x));
        }
        let mid = pixels.len() / 2;
        let right = pixels.split_off(mid);
        Some((Region::new(pixels), Region::new(right)))
    }
}

impl SplitAndMerge for GeometricSplitAndMerge {
    fn compute_merge_cost(
        &self,
        population: &ObjectPopulation,
        objects: &[ObjectId],
    ) -> f64 {
        // Largest pairwise center distance of the group.
        let mut cost: f64 = 0.0;
        for (i, &a) in objects.iter().enumerate() {
            for &b in objects.iter().skip(i + 1) {
                let d = center_distance_sq(
                    population.region(a),
                    population.region(b),
                )
                .sqrt();
                cost = cost.max(d);
            }
        }
        cost
    }

    fn compute_split_cost(
        &self,
        population: &ObjectPopulation,
        object: ObjectId,
    ) -> (Vec<Region>, f64) {
        let region = population.region(object);
        match Self::bisect(region) {
            Some((a, b)) => {
                let separation = center_distance_sq(&a, &b).sqrt();
                (vec![a, b], 1.0 / separation.max(f64::EPSILON))
            }
            None => (vec![region.clone()], f64::INFINITY),
        }
    }
}
