//! Joins open extrusion lines that share endpoints.

use super::line::ExtrusionLine;
use crate::Coord;

/// Joins open lines of the same inset whose endpoints lie within a stitch
/// distance, closing the result when its own ends meet.
#[derive(Debug, Clone, Copy)]
pub struct PolylineStitcher {
    max_stitch_distance: Coord,
}

impl PolylineStitcher {
    /// Stitcher joining endpoints closer than `max_stitch_distance`.
    pub fn new(max_stitch_distance: Coord) -> Self {
        Self { max_stitch_distance }
    }

    /// Stitch `lines`. Closed input lines are passed through unchanged.
    ///
    /// Lines are consumed in input order and always extended with the nearest
    /// candidate, so the result only depends on the input.
    pub fn stitch(&self, lines: Vec<ExtrusionLine>) -> Vec<ExtrusionLine> {
        let mut result = Vec::with_capacity(lines.len());
        let mut open: Vec<Option<ExtrusionLine>> = Vec::new();
        for line in lines {
            if line.is_closed || line.len() < 2 {
                if !line.is_empty() {
                    result.push(line);
                }
            } else {
                open.push(Some(line));
            }
        }

        for i in 0..open.len() {
            let Some(mut chain) = open[i].take() else {
                continue;
            };
            self.extend(&mut chain, &mut open);
            chain.reverse();
            self.extend(&mut chain, &mut open);
            chain.reverse();
            self.close_if_ends_meet(&mut chain);
            result.push(chain);
        }
        result
    }

    /// Repeatedly append the nearest candidate to the end of `chain`.
    fn extend(&self, chain: &mut ExtrusionLine, candidates: &mut [Option<ExtrusionLine>]) {
        let limit = self.max_stitch_distance as i128 * self.max_stitch_distance as i128;
        loop {
            let Some(end) = chain.last().map(|j| j.position) else {
                return;
            };
            if let Some(start) = chain.first().map(|j| j.position) {
                // Ends already meet: leave it for closing.
                if chain.len() > 2 && start.distance_squared(&end) <= limit {
                    return;
                }
            }
            let mut best: Option<(i128, usize, bool)> = None;
            for (idx, candidate) in candidates.iter().enumerate() {
                let Some(candidate) = candidate else {
                    continue;
                };
                if candidate.inset_idx != chain.inset_idx || candidate.is_odd != chain.is_odd {
                    continue;
                }
                let (Some(first), Some(last)) = (candidate.first(), candidate.last()) else {
                    continue;
                };
                for (d, reversed) in [
                    (end.distance_squared(&first.position), false),
                    (end.distance_squared(&last.position), true),
                ] {
                    if d <= limit && best.map_or(true, |(bd, _, _)| d < bd) {
                        best = Some((d, idx, reversed));
                    }
                }
            }
            let Some((d, idx, reversed)) = best else {
                return;
            };
            let Some(mut next) = candidates[idx].take() else {
                return;
            };
            if reversed {
                next.reverse();
            }
            let skip = usize::from(d == 0);
            chain.junctions.extend(next.junctions.into_iter().skip(skip));
        }
    }

    fn close_if_ends_meet(&self, chain: &mut ExtrusionLine) {
        if chain.len() < 3 {
            return;
        }
        let (Some(first), Some(last)) = (chain.first(), chain.last()) else {
            return;
        };
        if first.position.coincides_with(&last.position, self.max_stitch_distance) {
            if first.position == last.position {
                chain.junctions.pop();
            }
            chain.is_closed = chain.len() >= 3;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::junction::ExtrusionJunction;
    use super::*;
    use crate::geometry::Point;

    fn open_line(points: &[(Coord, Coord)], inset: usize) -> ExtrusionLine {
        ExtrusionLine::from_junctions(
            points
                .iter()
                .map(|&(x, y)| ExtrusionJunction::new(Point::new(x, y), 400, inset))
                .collect(),
            inset,
            false,
            false,
        )
    }

    #[test]
    fn test_fragments_become_loop() {
        let pieces = vec![
            open_line(&[(0, 0), (1000, 0)], 0),
            open_line(&[(1000, 1000), (0, 1000), (0, 10)], 0),
            open_line(&[(1000, 0), (1000, 1000)], 0),
        ];
        let stitched = PolylineStitcher::new(399).stitch(pieces);
        assert_eq!(stitched.len(), 1);
        assert!(stitched[0].is_closed);
        assert_eq!(stitched[0].len(), 5);
    }

    #[test]
    fn test_reversed_fragment_is_joined() {
        let pieces = vec![
            open_line(&[(0, 0), (1000, 0)], 1),
            open_line(&[(3000, 0), (1050, 0)], 1),
        ];
        let stitched = PolylineStitcher::new(399).stitch(pieces);
        assert_eq!(stitched.len(), 1);
        assert!(!stitched[0].is_closed);
        assert_eq!(stitched[0].last().map(|j| j.position), Some(Point::new(3000, 0)));
    }

    #[test]
    fn test_different_insets_stay_apart() {
        let pieces = vec![open_line(&[(0, 0), (1000, 0)], 0), open_line(&[(1000, 0), (2000, 0)], 1)];
        let stitched = PolylineStitcher::new(399).stitch(pieces);
        assert_eq!(stitched.len(), 2);
    }

    #[test]
    fn test_far_fragments_untouched() {
        let pieces = vec![open_line(&[(0, 0), (1000, 0)], 0), open_line(&[(5000, 0), (6000, 0)], 0)];
        let stitched = PolylineStitcher::new(399).stitch(pieces);
        assert_eq!(stitched.len(), 2);
        assert!(stitched.iter().all(|l| !l.is_closed));
    }
}
