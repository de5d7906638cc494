//! Greedy ordering of loops and open lines.
//!
//! Starting from the current nozzle position, the next path is always the one
//! whose start candidate lies closest. Closed loops may start at any vertex;
//! open lines start at either end.

use crate::geometry::Point;

/// Chosen order and start of one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderedPath {
    /// Index into the input slice.
    pub index: usize,
    /// Vertex the path starts at.
    pub start_vertex: usize,
    /// Whether the path is printed in reverse vertex order.
    pub backwards: bool,
    /// Whether the path is printed as a loop.
    pub is_closed: bool,
}

/// Nearest-neighbour path order optimizer.
#[derive(Debug, Clone)]
pub struct PathOrderOptimizer {
    start: Point,
    reverse_direction: bool,
    detect_loops: bool,
}

impl PathOrderOptimizer {
    pub fn new(start: Point) -> Self {
        Self {
            start,
            reverse_direction: false,
            detect_loops: false,
        }
    }

    /// Builder method: print every path against its natural direction.
    pub fn with_reverse_direction(mut self, reverse: bool) -> Self {
        self.reverse_direction = reverse;
        self
    }

    /// Builder method: treat open lines whose ends coincide as loops.
    pub fn with_detect_loops(mut self, detect: bool) -> Self {
        self.detect_loops = detect;
        self
    }

    /// Order closed loops. Empty loops are skipped.
    pub fn optimize_polygons<'p, I>(&self, polygons: I) -> Vec<OrderedPath>
    where
        I: IntoIterator<Item = &'p [Point]>,
    {
        let paths: Vec<(&[Point], bool)> = polygons.into_iter().map(|p| (p, true)).collect();
        self.optimize_paths(&paths)
    }

    /// Order open lines. Lines with fewer than two points are skipped.
    pub fn optimize_polylines<'p, I>(&self, lines: I) -> Vec<OrderedPath>
    where
        I: IntoIterator<Item = &'p [Point]>,
    {
        let paths: Vec<(&[Point], bool)> = lines
            .into_iter()
            .map(|p| {
                let is_loop = self.detect_loops && p.len() > 2 && p.first() == p.last();
                (p, is_loop)
            })
            .collect();
        self.optimize_paths(&paths)
    }

    /// Order a mix of loops and open lines, given as `(points, is_closed)`.
    pub fn optimize_paths(&self, paths: &[(&[Point], bool)]) -> Vec<OrderedPath> {
        let mut remaining: Vec<usize> = (0..paths.len())
            .filter(|&i| {
                let (points, closed) = paths[i];
                if closed {
                    !points.is_empty()
                } else {
                    points.len() >= 2
                }
            })
            .collect();
        let mut order = Vec::with_capacity(remaining.len());
        let mut current = self.start;

        while !remaining.is_empty() {
            let mut best: Option<(usize, usize, i128)> = None;
            for (slot, &index) in remaining.iter().enumerate() {
                let (points, closed) = paths[index];
                let (vertex, dist) = if closed {
                    nearest_vertex(points, current)
                } else {
                    let front = points[0].distance_squared(&current);
                    let back = points[points.len() - 1].distance_squared(&current);
                    if back < front {
                        (points.len() - 1, back)
                    } else {
                        (0, front)
                    }
                };
                if best.map_or(true, |(_, _, d)| dist < d) {
                    best = Some((slot, vertex, dist));
                }
            }
            let Some((slot, vertex, _)) = best else { break };
            let index = remaining.swap_remove(slot);
            let (points, closed) = paths[index];

            let mut backwards = !closed && vertex != 0;
            if self.reverse_direction {
                backwards = !backwards;
            }
            let start_vertex = if closed {
                vertex
            } else if backwards {
                points.len() - 1
            } else {
                0
            };
            current = if closed {
                points[start_vertex]
            } else if backwards {
                points[0]
            } else {
                points[points.len() - 1]
            };
            order.push(OrderedPath {
                index,
                start_vertex,
                backwards,
                is_closed: closed,
            });
        }
        order
    }
}

fn nearest_vertex(points: &[Point], p: Point) -> (usize, i128) {
    points
        .iter()
        .enumerate()
        .map(|(i, q)| (i, q.distance_squared(&p)))
        .min_by_key(|&(_, d)| d)
        .unwrap_or((0, i128::MAX))
}
