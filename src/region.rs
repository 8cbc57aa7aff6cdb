use nalgebra::Point2;

/*------------------------------------------------------------------------------
Region struct
------------------------------------------------------------------------------*/

/// Pixel-set region of one segmented object.
///
/// Coordinates are stored sorted and deduplicated so that two regions built
/// from the same pixels compare equal regardless of insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pixels: Vec<(i32, i32)>,
}

impl Region {
    pub fn new(mut pixels: Vec<(i32, i32)>) -> Self {
        pixels.sort_unstable();
        pixels.dedup();
        Self { pixels }
    }

    /// Filled axis-aligned rectangle, handy for synthetic populations.
    pub fn rect(x: i32, y: i32, width: i32, height: i32) -> Self {
        assert!(width > 0 && height > 0, "rect must have positive extent");
        let mut pixels = Vec::with_capacity((width * height) as usize);
        for dx in 0..width {
            for dy in 0..height {
                pixels.push((x + dx, y + dy));
            }
        }
        Self::new(pixels)
    }

    #[inline(always)]
    pub fn pixels(&self) -> &[(i32, i32)] {
        &self.pixels
    }

    #[inline(always)]
    pub fn size(&self) -> usize {
        self.pixels.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Geometric center (mean pixel coordinate).
    pub fn center(&self) -> Point2<f64> {
        assert!(!self.pixels.is_empty(), "center of an empty region");
        let mut cx = 0.0;
        let mut cy = 0.0;
        for &(x, y) in &self.pixels {
            cx += x as f64;
            cy += y as f64;
        }
        let n = self.pixels.len() as f64;
        Point2::new(cx / n, cy / n)
    }

    /// Set union of two regions.
    pub fn union(&self, other: &Region) -> Region {
        let mut pixels =
            Vec::with_capacity(self.pixels.len() + other.pixels.len());
        pixels.extend_from_slice(&self.pixels);
        pixels.extend_from_slice(&other.pixels);
        Region::new(pixels)
    }
}

/// Squared euclidean distance between two region centers.
pub fn center_distance_sq(a: &Region, b: &Region) -> f64 {
    (a.center() - b.center()).norm_squared()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nearly_eq::assert_nearly_eq;

    #[test]
    fn test_center() {
        let region = Region::rect(0, 0, 3, 3);
        let c = region.center();
        assert_nearly_eq!(c.x, 1.0);
        assert_nearly_eq!(c.y, 1.0);
    }

    #[test]
    fn test_union_dedups() {
        let a = Region::rect(0, 0, 2, 2);
        let b = Region::rect(1, 0, 2, 2);
        let u = a.union(&b);
        assert_eq!(u.size(), 6);
    }

    #[test]
    fn test_center_distance() {
        let a = Region::rect(0, 0, 1, 1);
        let b = Region::rect(3, 4, 1, 1);
        assert_nearly_eq!(center_distance_sq(&a, &b), 25.0);
    }
}
