use crate::region::Region;

/*------------------------------------------------------------------------------
TimedObject / ObjectPopulation
------------------------------------------------------------------------------*/

/// Stable surrogate id of a [`TimedObject`] inside its [`ObjectPopulation`].
pub type ObjectId = usize;

/// One per-frame detection. The trackhead / previous / next pointers are owned
/// by the population and mutated only through the link-editing facade.
#[derive(Debug, Clone)]
pub struct TimedObject {
    frame: usize,
    label: usize,
    region: Region,
    track_head: ObjectId,
    previous: Option<ObjectId>,
    next: Option<ObjectId>,
}

/// Arena of all detections of one movie, indexed by [`ObjectId`].
///
/// Removed slots stay `None` so ids remain stable for the whole lifetime of a
/// correction run.
#[derive(Debug, Clone, Default)]
pub struct ObjectPopulation {
    objects: Vec<Option<TimedObject>>,
}

impl ObjectPopulation {
    pub fn new() -> Self {
        Self { objects: Vec::new() }
    }

    pub fn add_object(
        &mut self,
        frame: usize,
        label: usize,
        region: Region,
    ) -> ObjectId {
        let id = self.objects.len();
        self.objects.push(Some(TimedObject {
            frame,
            label,
            region,
            track_head: id,
            previous: None,
            next: None,
        }));
        id
    }

    fn get(&self, id: ObjectId) -> &TimedObject {
        self.objects[id]
            .as_ref()
            .unwrap_or_else(|| panic!("object {} was removed", id))
    }

    fn get_mut(&mut self, id: ObjectId) -> &mut TimedObject {
        self.objects[id]
            .as_mut()
            .unwrap_or_else(|| panic!("object {} was removed", id))
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        id < self.objects.len() && self.objects[id].is_some()
    }

    /*--------------------------------------------------------------------------
    Read accessors
    --------------------------------------------------------------------------*/

    #[inline(always)]
    pub fn frame(&self, id: ObjectId) -> usize {
        self.get(id).frame
    }

    #[inline(always)]
    pub fn label(&self, id: ObjectId) -> usize {
        self.get(id).label
    }

    #[inline(always)]
    pub fn region(&self, id: ObjectId) -> &Region {
        &self.get(id).region
    }

    #[inline(always)]
    pub fn track_head(&self, id: ObjectId) -> ObjectId {
        self.get(id).track_head
    }

    #[inline(always)]
    pub fn previous(&self, id: ObjectId) -> Option<ObjectId> {
        self.get(id).previous
    }

    #[inline(always)]
    pub fn next(&self, id: ObjectId) -> Option<ObjectId> {
        self.get(id).next
    }

    /// Ids of all live objects, ascending.
    pub fn ids(&self) -> Vec<ObjectId> {
        (0..self.objects.len())
            .filter(|&id| self.objects[id].is_some())
            .collect()
    }

    /// Ids of all live objects at one frame, ascending.
    pub fn ids_at_frame(&self, frame: usize) -> Vec<ObjectId> {
        self.ids()
            .into_iter()
            .filter(|&id| self.frame(id) == frame)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.objects.iter().filter(|o| o.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /*--------------------------------------------------------------------------
    Link-editing facade
    --------------------------------------------------------------------------*/

    /// Persist a cross-frame link between `prev` and `next`.
    ///
    /// `set_next` writes `prev.next`, `set_prev` writes `next.previous`;
    /// either side may be `None` to unlink. With `reset_head_of_next` the
    /// trackhead of `next` (and of its downstream continuation chain) is
    /// rewritten: to `prev`'s head when the link makes `next` a continuation,
    /// back to `next` itself when unlinking.
    pub fn set_track_links(
        &mut self,
        prev: Option<ObjectId>,
        next: Option<ObjectId>,
        set_prev: bool,
        set_next: bool,
        reset_head_of_next: bool,
    ) {
        if let Some(p) = prev {
            assert!(
                next.map_or(true, |n| self.frame(p) < self.frame(n)),
                "track link must go strictly forward in time"
            );
            if set_next {
                self.get_mut(p).next = next;
            }
        }
        if let Some(n) = next {
            if set_prev {
                self.get_mut(n).previous = prev;
            }
            if reset_head_of_next {
                let head = match prev {
                    Some(p) if set_prev => self.track_head(p),
                    _ => n,
                };
                self.set_track_head(n, head, true);
            }
        }
    }

    /// Set the trackhead of `id`, following the 1-1 continuation chain
    /// downstream when `propagate` is set.
    pub fn set_track_head(
        &mut self,
        id: ObjectId,
        head: ObjectId,
        propagate: bool,
    ) {
        self.get_mut(id).track_head = head;
        if !propagate {
            return;
        }
        let mut cur = id;
        while let Some(n) = self.next(cur) {
            if self.previous(n) != Some(cur) || self.track_head(n) == head {
                break;
            }
            self.get_mut(n).track_head = head;
            cur = n;
        }
    }

    /*--------------------------------------------------------------------------
    Object mutation facade
    --------------------------------------------------------------------------*/

    /// New object at the same frame with the same label and region, unlinked,
    /// its own trackhead.
    pub fn duplicate(&mut self, id: ObjectId) -> ObjectId {
        let (frame, label, region) = {
            let o = self.get(id);
            (o.frame, o.label, o.region.clone())
        };
        self.add_object(frame, label, region)
    }

    pub fn set_region(&mut self, id: ObjectId, region: Region) {
        self.get_mut(id).region = region;
    }

    pub fn set_label(&mut self, id: ObjectId, label: usize) {
        self.get_mut(id).label = label;
    }

    /// Remove the object, detaching any neighbor pointers that reference it.
    pub fn remove(&mut self, id: ObjectId) {
        if let Some(p) = self.previous(id) {
            if self.contains(p) && self.next(p) == Some(id) {
                self.get_mut(p).next = None;
            }
        }
        if let Some(n) = self.next(id) {
            if self.contains(n) && self.previous(n) == Some(id) {
                self.get_mut(n).previous = None;
            }
        }
        self.objects[id] = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Region;

    fn two_frame_pair(pop: &mut ObjectPopulation) -> (ObjectId, ObjectId) {
        let a = pop.add_object(0, 0, Region::rect(0, 0, 2, 2));
        let b = pop.add_object(1, 0, Region::rect(0, 0, 2, 2));
        (a, b)
    }

    #[test]
    fn test_set_track_links_continuation() {
        let mut pop = ObjectPopulation::new();
        let (a, b) = two_frame_pair(&mut pop);
        pop.set_track_links(Some(a), Some(b), true, true, true);
        assert_eq!(pop.next(a), Some(b));
        assert_eq!(pop.previous(b), Some(a));
        assert_eq!(pop.track_head(b), a);
    }

    #[test]
    fn test_unlink_resets_head() {
        let mut pop = ObjectPopulation::new();
        let (a, b) = two_frame_pair(&mut pop);
        pop.set_track_links(Some(a), Some(b), true, true, true);
        pop.set_track_links(None, Some(b), true, false, true);
        assert_eq!(pop.previous(b), None);
        assert_eq!(pop.track_head(b), b);
        // a still points forward until its side is rewritten
        assert_eq!(pop.next(a), Some(b));
    }

    #[test]
    fn test_head_propagates_down_chain() {
        let mut pop = ObjectPopulation::new();
        let a = pop.add_object(0, 0, Region::rect(0, 0, 1, 1));
        let b = pop.add_object(1, 0, Region::rect(0, 0, 1, 1));
        let c = pop.add_object(2, 0, Region::rect(0, 0, 1, 1));
        pop.set_track_links(Some(a), Some(b), true, true, true);
        pop.set_track_links(Some(b), Some(c), true, true, true);
        assert_eq!(pop.track_head(c), a);
        pop.set_track_links(None, Some(b), true, false, true);
        assert_eq!(pop.track_head(b), b);
        assert_eq!(pop.track_head(c), b);
    }

    #[test]
    fn test_remove_detaches_neighbors() {
        let mut pop = ObjectPopulation::new();
        let (a, b) = two_frame_pair(&mut pop);
        pop.set_track_links(Some(a), Some(b), true, true, true);
        pop.remove(b);
        assert_eq!(pop.next(a), None);
        assert!(!pop.contains(b));
        assert_eq!(pop.len(), 1);
    }

    #[test]
    #[should_panic]
    fn test_backward_link_is_fatal() {
        let mut pop = ObjectPopulation::new();
        let (a, b) = two_frame_pair(&mut pop);
        pop.set_track_links(Some(b), Some(a), true, true, false);
    }
}
