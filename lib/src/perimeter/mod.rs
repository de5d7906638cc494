//! Wall (perimeter) generation.
//!
//! Walls are produced by the variable-width generator in [`arachne`]: every
//! wall is an [`ExtrusionLine`] whose width follows the local thickness of
//! the outline. Inset 0 is the outer wall; the area left inside the innermost
//! wall is returned as the inner contour for infill and skin.

pub mod arachne;

pub use arachne::{
    prepare_outline, Beading, BeadingStrategy, BeadingStrategyFactory, ExtrusionJunction, ExtrusionLine,
    VariableWidthLines, WallToolPaths,
};
