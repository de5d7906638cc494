//! Keeps the outer beads at their own preferred width.

use super::{Beading, BeadingParams, BeadingStrategy};
use crate::{Coord, CoordF};

/// Fixes the outermost bead on each side at the outer wall width and hands
/// the remaining thickness to the parent for the inner beads.
///
/// Below `minimum_variable_line_ratio * outer_width` nothing is printed.
#[derive(Debug)]
pub struct RedistributeBeadingStrategy {
    params: BeadingParams,
    parent: Box<dyn BeadingStrategy>,
    optimal_width_outer: Coord,
    minimum_variable_line_ratio: CoordF,
}

impl RedistributeBeadingStrategy {
    /// Wrap `parent` with an outer bead of `optimal_width_outer`.
    pub fn new(
        optimal_width_outer: Coord,
        minimum_variable_line_ratio: CoordF,
        parent: Box<dyn BeadingStrategy>,
    ) -> Self {
        Self {
            params: *parent.params(),
            parent,
            optimal_width_outer,
            minimum_variable_line_ratio,
        }
    }

    fn minimum_thickness(&self) -> Coord {
        (self.minimum_variable_line_ratio * self.optimal_width_outer as CoordF).round() as Coord
    }
}

impl BeadingStrategy for RedistributeBeadingStrategy {
    fn name(&self) -> String {
        format!("RedistributeBeadingStrategy+{}", self.parent.name())
    }

    fn params(&self) -> &BeadingParams {
        &self.params
    }

    fn compute(&self, thickness: Coord, bead_count: Coord) -> Beading {
        if bead_count <= 0 || thickness < self.minimum_thickness() {
            return Beading::empty(thickness);
        }
        if bead_count <= 2 {
            let width = thickness / bead_count;
            let mut ret = Beading::empty(thickness);
            ret.bead_widths = vec![width; bead_count as usize];
            ret.toolpath_locations = if bead_count == 1 {
                vec![thickness / 2]
            } else {
                vec![width / 2, thickness - width / 2]
            };
            ret.left_over = thickness - ret.covered_width();
            return ret;
        }

        let outer_width = (thickness / 2).min(self.optimal_width_outer);
        let inner = self.parent.compute(thickness - 2 * outer_width, bead_count - 2);

        let mut ret = Beading::empty(thickness);
        ret.bead_widths.push(outer_width);
        ret.toolpath_locations.push(outer_width / 2);
        for (width, location) in inner.bead_widths.iter().zip(&inner.toolpath_locations) {
            ret.bead_widths.push(*width);
            ret.toolpath_locations.push(location + outer_width);
        }
        ret.bead_widths.push(outer_width);
        ret.toolpath_locations.push(thickness - outer_width / 2);
        ret.left_over = thickness - ret.covered_width();
        ret
    }

    fn optimal_thickness(&self, bead_count: Coord) -> Coord {
        let inner_count = (bead_count - 2).max(0);
        let outer_count = bead_count.clamp(0, 2);
        self.parent.optimal_thickness(inner_count) + self.optimal_width_outer * outer_count
    }

    fn transition_thickness(&self, lower_bead_count: Coord) -> Coord {
        match lower_bead_count {
            0 => self.minimum_thickness(),
            1 => {
                let ratio = 1.0 + self.parent.split_middle_threshold();
                (ratio * self.optimal_width_outer as CoordF).round() as Coord
            }
            n => self.parent.transition_thickness(n - 2) + 2 * self.optimal_width_outer,
        }
    }

    fn optimal_bead_count(&self, thickness: Coord) -> Coord {
        if thickness < self.minimum_thickness() {
            0
        } else if thickness <= 2 * self.optimal_width_outer {
            if thickness > self.transition_thickness(1) {
                2
            } else {
                1
            }
        } else {
            self.parent.optimal_bead_count(thickness - 2 * self.optimal_width_outer) + 2
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util::{assert_symmetric, params};
    use super::super::DistributedBeadingStrategy;
    use super::*;

    fn strategy(outer: Coord) -> RedistributeBeadingStrategy {
        let mut p = params(400);
        p.split_middle_threshold = 0.7;
        p.add_middle_threshold = 0.85;
        RedistributeBeadingStrategy::new(outer, 0.5, Box::new(DistributedBeadingStrategy::new(p, 1)))
    }

    #[test]
    fn test_outer_beads_keep_outer_width() {
        let s = strategy(350);
        let b = s.compute(1500, 4);
        assert_eq!(b.bead_widths.len(), 4);
        assert_eq!(b.bead_widths[0], 350);
        assert_eq!(b.bead_widths[3], 350);
        assert_eq!(b.bead_widths[1], 400);
        assert_eq!(b.toolpath_locations[0], 175);
        assert_eq!(b.toolpath_locations[1], 550);
        assert_symmetric(&b);
        assert_eq!(b.left_over, 0);
    }

    #[test]
    fn test_thresholds() {
        let s = strategy(400);
        assert_eq!(s.optimal_thickness(1), 400);
        assert_eq!(s.optimal_thickness(3), 1200);
        assert_eq!(s.transition_thickness(0), 200);
        assert_eq!(s.transition_thickness(1), 680);
        assert_eq!(s.transition_thickness(2), 1140);
        assert_eq!(s.optimal_bead_count(199), 0);
        assert_eq!(s.optimal_bead_count(680), 1);
        assert_eq!(s.optimal_bead_count(681), 2);
        assert_eq!(s.optimal_bead_count(1140), 3);
    }

    #[test]
    fn test_too_thin_prints_nothing() {
        let s = strategy(400);
        let b = s.compute(150, 1);
        assert!(b.bead_widths.is_empty());
        assert_eq!(b.left_over, 150);
    }
}
