//! Moves the outer wall inward.

use super::{Beading, BeadingParams, BeadingStrategy};
use crate::Coord;

/// Shifts the outermost bead inward by a fixed offset, never past the middle.
///
/// Only applies when there are at least three extruded beads; thinner layouts
/// come straight from the parent.
#[derive(Debug)]
pub struct OuterWallInsetBeadingStrategy {
    params: BeadingParams,
    parent: Box<dyn BeadingStrategy>,
    outer_wall_offset: Coord,
}

impl OuterWallInsetBeadingStrategy {
    /// Wrap `parent` with an outer wall offset.
    pub fn new(outer_wall_offset: Coord, parent: Box<dyn BeadingStrategy>) -> Self {
        Self {
            params: *parent.params(),
            parent,
            outer_wall_offset,
        }
    }
}

impl BeadingStrategy for OuterWallInsetBeadingStrategy {
    fn name(&self) -> String {
        format!("OuterWallInsetBeadingStrategy+{}", self.parent.name())
    }

    fn params(&self) -> &BeadingParams {
        &self.params
    }

    fn compute(&self, thickness: Coord, bead_count: Coord) -> Beading {
        let mut ret = self.parent.compute(thickness, bead_count);
        if ret.extruded_bead_count() < 3 {
            return ret;
        }
        let n = ret.toolpath_locations.len();
        let inset = (ret.toolpath_locations[0] + self.outer_wall_offset).min(thickness / 2);
        ret.toolpath_locations[0] = inset;
        ret.toolpath_locations[n - 1] = thickness - inset;
        ret
    }

    fn optimal_thickness(&self, bead_count: Coord) -> Coord {
        self.parent.optimal_thickness(bead_count)
    }

    fn transition_thickness(&self, lower_bead_count: Coord) -> Coord {
        self.parent.transition_thickness(lower_bead_count)
    }

    fn optimal_bead_count(&self, thickness: Coord) -> Coord {
        self.parent.optimal_bead_count(thickness)
    }

    fn transitioning_length(&self, lower_bead_count: Coord) -> Coord {
        self.parent.transitioning_length(lower_bead_count)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util::{assert_symmetric, params};
    use super::super::DistributedBeadingStrategy;
    use super::*;

    #[test]
    fn test_outer_wall_moves_inward() {
        let s = OuterWallInsetBeadingStrategy::new(
            50,
            Box::new(DistributedBeadingStrategy::new(params(400), 1)),
        );
        let b = s.compute(1600, 4);
        assert_eq!(b.toolpath_locations[0], 250);
        assert_eq!(b.toolpath_locations[3], 1350);
        assert_symmetric(&b);
    }

    #[test]
    fn test_two_beads_untouched() {
        let s = OuterWallInsetBeadingStrategy::new(
            50,
            Box::new(DistributedBeadingStrategy::new(params(400), 1)),
        );
        let b = s.compute(800, 2);
        assert_eq!(b.toolpath_locations, vec![200, 600]);
    }
}
