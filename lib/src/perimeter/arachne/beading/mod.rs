//! Beading strategies: how a local wall thickness is divided into beads.
//!
//! A [`BeadingStrategy`] answers two questions for a thickness `T`:
//! how many beads fit (`optimal_bead_count`), and for a given count, how wide
//! each bead is and where its centerline sits (`compute`). Transition
//! thresholds between counts `n` and `n + 1` are exposed so the wall generator
//! can blend smoothly across them.
//!
//! Strategies are composed as decorators around a base strategy:
//!
//! ```text
//! Distributed -> Redistribute -> [Widening] -> [OuterWallInset] -> Limited
//! ```
//!
//! [`BeadingStrategyFactory::make_strategy`] builds that chain from
//! [`WallSettings`](crate::config::WallSettings).

mod distributed;
mod limited;
mod outer_inset;
mod redistribute;
mod widening;

pub use distributed::DistributedBeadingStrategy;
pub use limited::LimitedBeadingStrategy;
pub use outer_inset::OuterWallInsetBeadingStrategy;
pub use redistribute::RedistributeBeadingStrategy;
pub use widening::WideningBeadingStrategy;

use crate::config::WallSettings;
use crate::{Coord, CoordF};
use std::fmt;

/// Bead layout for one thickness.
///
/// Locations are measured from one side of the shape, so a symmetric layout
/// has `loc[n - 1 - i] == total_thickness - loc[i]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Beading {
    /// The thickness this layout was computed for.
    pub total_thickness: Coord,
    /// Width of every bead, outermost first.
    pub bead_widths: Vec<Coord>,
    /// Centerline location of every bead, measured from the near side.
    pub toolpath_locations: Vec<Coord>,
    /// Thickness not covered by any bead.
    pub left_over: Coord,
}

impl Beading {
    /// Empty layout: everything is left over.
    pub fn empty(thickness: Coord) -> Self {
        Self {
            total_thickness: thickness,
            bead_widths: Vec::new(),
            toolpath_locations: Vec::new(),
            left_over: thickness,
        }
    }

    /// Number of beads, zero-width markers included.
    #[inline]
    pub fn bead_count(&self) -> usize {
        self.bead_widths.len()
    }

    /// Number of beads with a positive width.
    pub fn extruded_bead_count(&self) -> usize {
        self.bead_widths.iter().filter(|w| **w > 0).count()
    }

    /// Sum of all bead widths.
    pub fn covered_width(&self) -> Coord {
        self.bead_widths.iter().sum()
    }
}

/// Parameters shared by every strategy in a chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeadingParams {
    /// Preferred bead width.
    pub optimal_width: Coord,
    /// Fraction of the gap between `opt(n)` and `opt(n + 1)` at which an odd
    /// count splits its center bead.
    pub split_middle_threshold: CoordF,
    /// Same fraction for an even count gaining a center bead.
    pub add_middle_threshold: CoordF,
    /// Preferred length over which a transition is blended.
    pub default_transition_length: Coord,
    /// Wedge angle (radians) below which a count change is treated as a transition.
    pub transitioning_angle: CoordF,
}

/// Divides a local thickness into beads.
///
/// The provided methods implement the generic threshold logic in terms of
/// [`optimal_thickness`](Self::optimal_thickness); decorators override what
/// they change and forward the rest to their parent.
pub trait BeadingStrategy: Send + Sync + fmt::Debug {
    /// Short name of the strategy chain, for logging.
    fn name(&self) -> String;

    /// Parameters of this strategy.
    fn params(&self) -> &BeadingParams;

    /// Layout for `bead_count` beads over `thickness`.
    fn compute(&self, thickness: Coord, bead_count: Coord) -> Beading;

    /// Bead count that best fits `thickness`.
    fn optimal_bead_count(&self, thickness: Coord) -> Coord;

    /// Preferred width.
    fn optimal_width(&self) -> Coord {
        self.params().optimal_width
    }

    /// Thickness at which `bead_count` beads are all at their preferred width.
    fn optimal_thickness(&self, bead_count: Coord) -> Coord {
        self.optimal_width() * bead_count
    }

    /// Thickness at which the count changes from `lower_bead_count` to `lower_bead_count + 1`.
    fn transition_thickness(&self, lower_bead_count: Coord) -> Coord {
        let lower = self.optimal_thickness(lower_bead_count);
        let higher = self.optimal_thickness(lower_bead_count + 1);
        let threshold = if lower_bead_count % 2 == 1 {
            self.params().split_middle_threshold
        } else {
            self.params().add_middle_threshold
        };
        lower + (threshold * (higher - lower) as CoordF).round() as Coord
    }

    /// Length over which a transition out of `lower_bead_count` is blended.
    fn transitioning_length(&self, lower_bead_count: Coord) -> Coord {
        if lower_bead_count == 0 {
            10
        } else {
            self.params().default_transition_length
        }
    }

    /// Where in the blend the threshold sits: 1 means at the low end, 0 at the high end.
    fn transition_anchor_pos(&self, lower_bead_count: Coord) -> CoordF {
        let lower = self.optimal_thickness(lower_bead_count);
        let higher = self.optimal_thickness(lower_bead_count + 1);
        let transition = self.transition_thickness(lower_bead_count);
        if higher <= lower {
            return 0.5;
        }
        1.0 - (transition - lower) as CoordF / (higher - lower) as CoordF
    }

    /// Extra thicknesses where the layout changes non-linearly.
    fn nonlinear_thicknesses(&self, _lower_bead_count: Coord) -> Vec<Coord> {
        Vec::new()
    }

    /// Wedge angle below which a count change is treated as a transition.
    fn transitioning_angle(&self) -> CoordF {
        self.params().transitioning_angle
    }

    /// Split threshold, for odd counts.
    fn split_middle_threshold(&self) -> CoordF {
        self.params().split_middle_threshold
    }

    /// Add threshold, for even counts.
    fn add_middle_threshold(&self) -> CoordF {
        self.params().add_middle_threshold
    }
}

/// Builds the decorator chain used by the wall generator.
pub struct BeadingStrategyFactory;

impl BeadingStrategyFactory {
    /// Ratio of the outer width below which a single variable bead is dropped.
    pub const MINIMUM_VARIABLE_LINE_RATIO: CoordF = 0.5;

    /// Chain for the given wall settings and wall count.
    ///
    /// `max_bead_count` is usually twice the wall count, since every wall
    /// appears on both sides of a thin region.
    pub fn make_strategy(
        settings: &WallSettings,
        max_bead_count: Coord,
        print_thin_walls: bool,
    ) -> Box<dyn BeadingStrategy> {
        let params = BeadingParams {
            optimal_width: settings.wall_line_width_x,
            split_middle_threshold: settings.split_middle_threshold(),
            add_middle_threshold: settings.add_middle_threshold(),
            default_transition_length: settings.wall_transition_length,
            transitioning_angle: settings.wall_transition_angle,
        };
        let mut strategy: Box<dyn BeadingStrategy> = Box::new(DistributedBeadingStrategy::new(
            params,
            settings.wall_distribution_count,
        ));
        strategy = Box::new(RedistributeBeadingStrategy::new(
            settings.wall_line_width_0,
            Self::MINIMUM_VARIABLE_LINE_RATIO,
            strategy,
        ));
        if print_thin_walls {
            strategy = Box::new(WideningBeadingStrategy::new(
                strategy,
                settings.min_feature_size,
                settings.min_bead_width,
            ));
        }
        if settings.wall_0_inset > 0 {
            strategy = Box::new(OuterWallInsetBeadingStrategy::new(settings.wall_0_inset, strategy));
        }
        // Limited goes last: its zero-width marker must not be touched by other decorators.
        strategy = Box::new(LimitedBeadingStrategy::new(max_bead_count, strategy));
        log::debug!("beading strategy: {}", strategy.name());
        strategy
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;

    pub fn params(width: Coord) -> BeadingParams {
        BeadingParams {
            optimal_width: width,
            split_middle_threshold: 0.5,
            add_middle_threshold: 0.5,
            default_transition_length: 400,
            transitioning_angle: 10f64.to_radians(),
        }
    }

    pub fn assert_symmetric(beading: &Beading) {
        let n = beading.toolpath_locations.len();
        for i in 0..n {
            let mirrored = beading.total_thickness - beading.toolpath_locations[n - 1 - i];
            assert!(
                (beading.toolpath_locations[i] - mirrored).abs() <= 1,
                "layout not symmetric: {beading:?}"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_util::assert_symmetric;
    use super::*;
    use proptest::prelude::*;

    fn default_chain() -> Box<dyn BeadingStrategy> {
        BeadingStrategyFactory::make_strategy(&WallSettings::default(), 6, false)
    }

    #[test]
    fn test_factory_chain_name() {
        let s = default_chain();
        assert_eq!(s.name(), "LimitedBeadingStrategy+RedistributeBeadingStrategy+DistributedBeadingStrategy");
        let thin = BeadingStrategyFactory::make_strategy(
            &WallSettings::default().with_wall_0_inset(50),
            6,
            true,
        );
        assert!(thin.name().contains("Widening"));
        assert!(thin.name().contains("OuterWallInset"));
    }

    #[test]
    fn test_chain_counts_for_plain_widths() {
        let s = default_chain();
        assert_eq!(s.optimal_bead_count(100), 0);
        assert_eq!(s.optimal_bead_count(400), 1);
        assert_eq!(s.optimal_bead_count(800), 2);
        assert_eq!(s.optimal_bead_count(1200), 3);
        assert_eq!(s.optimal_bead_count(2400), 6);
        assert_eq!(s.optimal_bead_count(50_000), 7);
    }

    #[test]
    fn test_chain_layout_is_symmetric() {
        let s = default_chain();
        for t in [300, 450, 800, 1000, 1300, 1900, 2400] {
            let n = s.optimal_bead_count(t);
            let b = s.compute(t, n);
            assert_eq!(b.total_thickness, t);
            assert_symmetric(&b);
            assert!(b.covered_width() + b.left_over >= t - 2, "{b:?}");
        }
    }

    #[test]
    fn test_transition_anchor_in_unit_range() {
        let s = default_chain();
        for n in 0..6 {
            let a = s.transition_anchor_pos(n);
            assert!((0.0..=1.0).contains(&a), "anchor {a} for {n}");
            assert!(s.transition_thickness(n) <= s.transition_thickness(n + 1));
        }
    }

    proptest! {
        #[test]
        fn test_bead_count_monotonic(a in 0i64..4000, b in 0i64..4000) {
            let s = default_chain();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(s.optimal_bead_count(lo) <= s.optimal_bead_count(hi));
        }
    }
}
