//! Caps the number of beads and marks the edge of the walled area.

use super::{Beading, BeadingParams, BeadingStrategy};
use crate::Coord;

/// Never produces more than `max_bead_count` extruded beads.
///
/// Thicker regions are laid out as `max_bead_count` beads at their optimal
/// width plus zero-width marker beads just inside the innermost walls. The
/// markers trace the boundary of the area left for infill.
#[derive(Debug)]
pub struct LimitedBeadingStrategy {
    params: BeadingParams,
    parent: Box<dyn BeadingStrategy>,
    max_bead_count: Coord,
}

impl LimitedBeadingStrategy {
    /// Thickness assigned to counts above the cap.
    const UNREACHABLE_THICKNESS: Coord = 10_000_000;
    /// Transition thickness for counts above the cap.
    const UNREACHABLE_TRANSITION: Coord = 9_000_000;

    /// Wrap `parent` with a cap of `max_bead_count` beads.
    pub fn new(max_bead_count: Coord, parent: Box<dyn BeadingStrategy>) -> Self {
        Self {
            params: *parent.params(),
            parent,
            max_bead_count,
        }
    }

    /// The cap.
    pub fn max_bead_count(&self) -> Coord {
        self.max_bead_count
    }

    fn insert_marker(ret: &mut Beading, index: usize, location: Coord) {
        let index = index.min(ret.bead_widths.len());
        ret.toolpath_locations.insert(index, location);
        ret.bead_widths.insert(index, 0);
    }
}

impl BeadingStrategy for LimitedBeadingStrategy {
    fn name(&self) -> String {
        format!("LimitedBeadingStrategy+{}", self.parent.name())
    }

    fn params(&self) -> &BeadingParams {
        &self.params
    }

    fn compute(&self, thickness: Coord, bead_count: Coord) -> Beading {
        let max = self.max_bead_count;
        let half = (max / 2) as usize;

        if bead_count <= max {
            let mut ret = self.parent.compute(thickness, bead_count);
            let count = ret.toolpath_locations.len() as Coord;
            if count % 2 == 0 && count == max && half > 0 {
                let location = ret.toolpath_locations[half - 1] + ret.bead_widths[half - 1] / 2;
                Self::insert_marker(&mut ret, half, location);
            }
            return ret;
        }
        if bead_count > max + 1 {
            log::warn!("bead count {bead_count} above the limit of {}", max + 1);
        }

        let optimal_thickness = self.parent.optimal_thickness(max);
        let mut ret = self.parent.compute(optimal_thickness, max);
        let count = ret.toolpath_locations.len();
        ret.left_over += thickness - ret.total_thickness;
        ret.total_thickness = thickness;

        if count % 2 == 1 {
            ret.toolpath_locations[count / 2] = thickness / 2;
            ret.bead_widths[count / 2] = thickness - optimal_thickness;
        }
        for i in 0..(count + 1) / 2 {
            ret.toolpath_locations[count - 1 - i] = thickness - ret.toolpath_locations[i];
        }

        if half == 0 || count < half {
            return ret;
        }
        let location = ret.toolpath_locations[half - 1] + ret.bead_widths[half - 1] / 2;
        Self::insert_marker(&mut ret, half, location);

        // Same marker on the other side.
        let opposite = count + 1 - half;
        if opposite < ret.toolpath_locations.len() {
            let location = ret.toolpath_locations[opposite] - ret.bead_widths[opposite] / 2;
            Self::insert_marker(&mut ret, opposite, location);
        }
        ret
    }

    fn optimal_thickness(&self, bead_count: Coord) -> Coord {
        if bead_count <= self.max_bead_count {
            self.parent.optimal_thickness(bead_count)
        } else {
            Self::UNREACHABLE_THICKNESS
        }
    }

    fn transition_thickness(&self, lower_bead_count: Coord) -> Coord {
        let max = self.max_bead_count;
        if lower_bead_count < max {
            self.parent.transition_thickness(lower_bead_count)
        } else if lower_bead_count == max {
            self.parent.optimal_thickness(max + 1) - 10
        } else {
            Self::UNREACHABLE_TRANSITION
        }
    }

    fn optimal_bead_count(&self, thickness: Coord) -> Coord {
        let max = self.max_bead_count;
        let parent_count = self.parent.optimal_bead_count(thickness);
        if parent_count <= max {
            parent_count
        } else if parent_count == max + 1 && thickness < self.parent.optimal_thickness(max + 1) - 10 {
            max
        } else {
            max + 1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util::{assert_symmetric, params};
    use super::super::DistributedBeadingStrategy;
    use super::*;

    fn strategy(max: Coord) -> LimitedBeadingStrategy {
        LimitedBeadingStrategy::new(max, Box::new(DistributedBeadingStrategy::new(params(400), 1)))
    }

    #[test]
    fn test_below_limit_is_forwarded() {
        let s = strategy(4);
        let b = s.compute(1200, 3);
        assert_eq!(b.bead_widths, vec![400, 400, 400]);
    }

    #[test]
    fn test_at_limit_gets_center_marker() {
        let s = strategy(4);
        let b = s.compute(1600, 4);
        assert_eq!(b.bead_widths, vec![400, 400, 0, 400, 400]);
        assert_eq!(b.toolpath_locations[2], 800);
    }

    #[test]
    fn test_above_limit_gets_two_markers() {
        let s = strategy(4);
        assert_eq!(s.optimal_bead_count(5000), 5);
        let b = s.compute(5000, 5);
        assert_eq!(b.bead_widths, vec![400, 400, 0, 0, 400, 400]);
        assert_eq!(b.toolpath_locations, vec![200, 600, 800, 4200, 4400, 4800]);
        assert_eq!(b.left_over, 5000 - 1600);
        assert_symmetric(&b);
    }

    #[test]
    fn test_thresholds_beyond_limit() {
        let s = strategy(4);
        assert_eq!(s.optimal_thickness(5), 10_000_000);
        assert_eq!(s.transition_thickness(4), 1990);
        assert_eq!(s.transition_thickness(5), 9_000_000);
        assert_eq!(s.optimal_bead_count(1900), 4);
        assert_eq!(s.optimal_bead_count(1995), 5);
    }
}
