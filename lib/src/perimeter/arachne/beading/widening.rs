//! Prints features thinner than one bead as a single widened line.

use super::{Beading, BeadingParams, BeadingStrategy};
use crate::Coord;

/// Regions thinner than the preferred width but at least `min_input_width`
/// thick get one bead of at least `min_output_width`.
#[derive(Debug)]
pub struct WideningBeadingStrategy {
    params: BeadingParams,
    parent: Box<dyn BeadingStrategy>,
    min_input_width: Coord,
    min_output_width: Coord,
}

impl WideningBeadingStrategy {
    /// Wrap `parent`; `min_input_width` is the minimum feature size and
    /// `min_output_width` the minimum bead width.
    pub fn new(parent: Box<dyn BeadingStrategy>, min_input_width: Coord, min_output_width: Coord) -> Self {
        Self {
            params: *parent.params(),
            parent,
            min_input_width,
            min_output_width,
        }
    }
}

impl BeadingStrategy for WideningBeadingStrategy {
    fn name(&self) -> String {
        format!("WideningBeadingStrategy+{}", self.parent.name())
    }

    fn params(&self) -> &BeadingParams {
        &self.params
    }

    fn compute(&self, thickness: Coord, bead_count: Coord) -> Beading {
        if thickness >= self.optimal_width() {
            return self.parent.compute(thickness, bead_count);
        }
        let mut ret = Beading::empty(thickness);
        if thickness >= self.min_input_width {
            ret.bead_widths.push(thickness.max(self.min_output_width));
            ret.toolpath_locations.push(thickness / 2);
            ret.left_over = 0;
        }
        ret
    }

    fn optimal_thickness(&self, bead_count: Coord) -> Coord {
        self.parent.optimal_thickness(bead_count)
    }

    fn transition_thickness(&self, lower_bead_count: Coord) -> Coord {
        if lower_bead_count == 0 {
            self.min_input_width
        } else {
            self.parent.transition_thickness(lower_bead_count)
        }
    }

    fn optimal_bead_count(&self, thickness: Coord) -> Coord {
        if thickness < self.min_input_width {
            return 0;
        }
        self.parent.optimal_bead_count(thickness).max(1)
    }

    fn transitioning_length(&self, lower_bead_count: Coord) -> Coord {
        self.parent.transitioning_length(lower_bead_count)
    }

    fn nonlinear_thicknesses(&self, lower_bead_count: Coord) -> Vec<Coord> {
        let mut ret = vec![self.min_output_width];
        ret.extend(self.parent.nonlinear_thicknesses(lower_bead_count));
        ret
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util::params;
    use super::super::{DistributedBeadingStrategy, RedistributeBeadingStrategy};
    use super::*;

    fn strategy() -> WideningBeadingStrategy {
        let base = Box::new(DistributedBeadingStrategy::new(params(400), 1));
        let redistribute = Box::new(RedistributeBeadingStrategy::new(400, 0.5, base));
        WideningBeadingStrategy::new(redistribute, 100, 340)
    }

    #[test]
    fn test_thin_feature_is_widened() {
        let s = strategy();
        assert_eq!(s.optimal_bead_count(150), 1);
        let b = s.compute(150, 1);
        assert_eq!(b.bead_widths, vec![340]);
        assert_eq!(b.toolpath_locations, vec![75]);
        assert_eq!(b.left_over, 0);
    }

    #[test]
    fn test_below_minimum_feature_size() {
        let s = strategy();
        assert_eq!(s.optimal_bead_count(99), 0);
        assert!(s.compute(99, 0).bead_widths.is_empty());
        assert_eq!(s.transition_thickness(0), 100);
        assert_eq!(s.nonlinear_thicknesses(0), vec![340]);
    }

    #[test]
    fn test_normal_width_is_forwarded() {
        let s = strategy();
        let b = s.compute(800, 2);
        assert_eq!(b.bead_widths, vec![400, 400]);
    }
}
