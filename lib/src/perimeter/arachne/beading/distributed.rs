//! Base strategy: spread the surplus over the beads nearest the middle.

use super::{Beading, BeadingParams, BeadingStrategy};
use crate::{Coord, CoordF};

/// Beads at the preferred width, with the difference between the actual and
/// the optimal thickness shared out over the middle beads.
///
/// The share of bead `i` falls off quadratically with its distance to the
/// middle and reaches zero `distribution_radius` beads away from it.
#[derive(Debug, Clone)]
pub struct DistributedBeadingStrategy {
    params: BeadingParams,
    one_over_distribution_radius_squared: CoordF,
}

impl DistributedBeadingStrategy {
    /// Create the strategy. A radius below 2 puts the whole surplus on the
    /// middle one or two beads.
    pub fn new(params: BeadingParams, distribution_radius: usize) -> Self {
        let one_over_distribution_radius_squared = if distribution_radius >= 2 {
            let r = (distribution_radius - 1) as CoordF;
            1.0 / (r * r)
        } else {
            1.0
        };
        Self {
            params,
            one_over_distribution_radius_squared,
        }
    }

    fn weight(&self, bead_idx: usize, middle: CoordF) -> CoordF {
        let dev = bead_idx as CoordF - middle;
        (1.0 - self.one_over_distribution_radius_squared * dev * dev).max(0.0)
    }
}

impl BeadingStrategy for DistributedBeadingStrategy {
    fn name(&self) -> String {
        "DistributedBeadingStrategy".to_string()
    }

    fn params(&self) -> &BeadingParams {
        &self.params
    }

    fn compute(&self, thickness: Coord, bead_count: Coord) -> Beading {
        let mut ret = Beading::empty(thickness);
        match bead_count {
            n if n > 2 => {
                let n = n as usize;
                let optimal_width = self.params.optimal_width;
                let to_be_divided = (thickness - n as Coord * optimal_width) as CoordF;
                let middle = (n - 1) as CoordF / 2.0;
                let weights: Vec<CoordF> = (0..n).map(|i| self.weight(i, middle)).collect();
                let total_weight: CoordF = weights.iter().sum();

                let mut location = 0.0;
                let mut previous_width = 0.0;
                for (i, weight) in weights.iter().enumerate() {
                    let width = optimal_width as CoordF + to_be_divided * weight / total_weight;
                    location = if i == 0 {
                        width / 2.0
                    } else {
                        location + (previous_width + width) / 2.0
                    };
                    previous_width = width;
                    ret.bead_widths.push(width.round() as Coord);
                    ret.toolpath_locations.push(location.round() as Coord);
                }
                ret.left_over = 0;
            }
            2 => {
                let outer_width = thickness / 2;
                ret.bead_widths = vec![outer_width, outer_width];
                ret.toolpath_locations = vec![outer_width / 2, thickness - outer_width / 2];
                ret.left_over = 0;
            }
            1 => {
                ret.bead_widths = vec![thickness];
                ret.toolpath_locations = vec![thickness / 2];
                ret.left_over = 0;
            }
            _ => {}
        }
        ret
    }

    fn optimal_bead_count(&self, thickness: Coord) -> Coord {
        let optimal_width = self.params.optimal_width.max(1);
        let naive_count = thickness / optimal_width;
        let remainder = thickness - naive_count * optimal_width;
        let threshold = if naive_count % 2 == 1 {
            self.params.split_middle_threshold
        } else {
            self.params.add_middle_threshold
        };
        let minimum_line_width = (optimal_width as CoordF * threshold).round() as Coord;
        naive_count + Coord::from(remainder >= minimum_line_width)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util::{assert_symmetric, params};
    use super::*;

    #[test]
    fn test_surplus_goes_to_middle_bead() {
        let s = DistributedBeadingStrategy::new(params(400), 1);
        let b = s.compute(1300, 3);
        assert_eq!(b.bead_widths, vec![400, 500, 400]);
        assert_eq!(b.toolpath_locations, vec![200, 650, 1100]);
        assert_eq!(b.left_over, 0);
    }

    #[test]
    fn test_wider_distribution_spreads_surplus() {
        let s = DistributedBeadingStrategy::new(params(400), 3);
        let b = s.compute(2100, 5);
        assert_eq!(b.bead_widths.iter().sum::<Coord>(), 2100);
        assert!(b.bead_widths[1] > 400 && b.bead_widths[2] > b.bead_widths[1]);
        assert_eq!(b.bead_widths[0], 400);
        assert_symmetric(&b);
    }

    #[test]
    fn test_small_counts() {
        let s = DistributedBeadingStrategy::new(params(400), 1);
        let two = s.compute(700, 2);
        assert_eq!(two.bead_widths, vec![350, 350]);
        assert_eq!(two.toolpath_locations, vec![175, 525]);

        let one = s.compute(300, 1);
        assert_eq!(one.bead_widths, vec![300]);
        assert_eq!(one.toolpath_locations, vec![150]);

        let none = s.compute(50, 0);
        assert!(none.bead_widths.is_empty());
        assert_eq!(none.left_over, 50);
    }

    #[test]
    fn test_optimal_bead_count_thresholds() {
        let s = DistributedBeadingStrategy::new(params(400), 1);
        assert_eq!(s.optimal_bead_count(199), 0);
        assert_eq!(s.optimal_bead_count(200), 1);
        assert_eq!(s.optimal_bead_count(599), 1);
        assert_eq!(s.optimal_bead_count(600), 2);
        assert_eq!(s.transition_thickness(1), 600);
        assert!((s.transition_anchor_pos(1) - 0.5).abs() < 1e-9);
        assert_eq!(s.transitioning_length(0), 10);
        assert_eq!(s.transitioning_length(3), 400);
    }
}
