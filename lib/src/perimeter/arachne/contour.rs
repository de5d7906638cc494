//! Iso-line extraction on a regular sample grid.
//!
//! Marching squares over a scalar field sampled at grid nodes. Loops are
//! oriented with the positive side on their left, so a loop around a positive
//! region runs counter-clockwise and a loop around a negative hole runs
//! clockwise.

use crate::geometry::PointF;
use crate::CoordF;

/// Regular grid of sample nodes, row-major with `y` growing with the row.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SampleGrid {
    pub origin: PointF,
    pub pitch: CoordF,
    pub cols: usize,
    pub rows: usize,
}

impl SampleGrid {
    #[inline]
    pub fn len(&self) -> usize {
        self.cols * self.rows
    }

    #[inline]
    pub fn index(&self, col: usize, row: usize) -> usize {
        row * self.cols + col
    }

    #[inline]
    pub fn col_row(&self, idx: usize) -> (usize, usize) {
        (idx % self.cols, idx / self.cols)
    }

    #[inline]
    pub fn position(&self, idx: usize) -> PointF {
        let (c, r) = self.col_row(idx);
        PointF::new(
            self.origin.x + c as CoordF * self.pitch,
            self.origin.y + r as CoordF * self.pitch,
        )
    }

    /// Node nearest to `p`, if `p` lies on the grid.
    pub fn nearest(&self, p: PointF) -> Option<usize> {
        let c = ((p.x - self.origin.x) / self.pitch).round();
        let r = ((p.y - self.origin.y) / self.pitch).round();
        if c < 0.0 || r < 0.0 || c >= self.cols as CoordF || r >= self.rows as CoordF {
            return None;
        }
        Some(self.index(c as usize, r as usize))
    }

    /// Nodes within `radius` cells (Chebyshev distance) of `idx`, excluding `idx`.
    pub fn neighbours(&self, idx: usize, radius: usize) -> impl Iterator<Item = usize> + '_ {
        let (c, r) = self.col_row(idx);
        let c0 = c.saturating_sub(radius);
        let r0 = r.saturating_sub(radius);
        let c1 = (c + radius).min(self.cols - 1);
        let r1 = (r + radius).min(self.rows - 1);
        (r0..=r1)
            .flat_map(move |rr| (c0..=c1).map(move |cc| self.index(cc, rr)))
            .filter(move |&n| n != idx)
    }
}

/// A point where an iso-line crosses the grid edge between nodes `a` and `b`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Crossing {
    pub point: PointF,
    pub a: usize,
    pub b: usize,
    /// Parameter from `a` (0) to `b` (1).
    pub t: CoordF,
}

/// Grid edge id: even for the edge to the right of a node, odd for the edge above it.
fn edge_id(grid: &SampleGrid, col: usize, row: usize, vertical: bool) -> usize {
    2 * grid.index(col, row) + usize::from(vertical)
}

fn crossing_on_edge(grid: &SampleGrid, values: &[CoordF], edge: usize) -> Crossing {
    let a = edge / 2;
    let (c, r) = grid.col_row(a);
    let b = if edge % 2 == 0 { grid.index(c + 1, r) } else { grid.index(c, r + 1) };
    let (fa, fb) = (values[a], values[b]);
    let denom = fa - fb;
    let t = if denom.abs() > 1e-12 { (fa / denom).clamp(0.0, 1.0) } else { 0.5 };
    let pa = grid.position(a);
    let pb = grid.position(b);
    Crossing {
        point: pa + (pb - pa) * t,
        a,
        b,
        t,
    }
}

/// Closed iso-lines of `values` at level zero, positive side on the left.
///
/// Values are classified as positive when strictly greater than zero. The
/// outermost ring of nodes must be non-positive for every loop to close.
pub(crate) fn trace_loops(grid: &SampleGrid, values: &[CoordF]) -> Vec<Vec<Crossing>> {
    if grid.cols < 2 || grid.rows < 2 || values.len() != grid.len() {
        return Vec::new();
    }
    // (from_edge, to_edge) per segment.
    let mut segments: Vec<(usize, usize)> = Vec::new();
    let mut outgoing = vec![usize::MAX; 2 * grid.len()];

    for row in 0..grid.rows - 1 {
        for col in 0..grid.cols - 1 {
            // Corners and edges in counter-clockwise order.
            let corners = [
                grid.index(col, row),
                grid.index(col + 1, row),
                grid.index(col + 1, row + 1),
                grid.index(col, row + 1),
            ];
            let positive = corners.map(|n| values[n] > 0.0);
            if positive.iter().all(|p| *p) || positive.iter().all(|p| !*p) {
                continue;
            }
            let edges = [
                edge_id(grid, col, row, false),
                edge_id(grid, col + 1, row, true),
                edge_id(grid, col, row + 1, false),
                edge_id(grid, col, row, true),
            ];
            // Crossings in counter-clockwise order: exits go from a positive
            // corner to a negative one.
            let mut exits = Vec::with_capacity(2);
            let mut entries = Vec::with_capacity(2);
            for k in 0..4 {
                let from = positive[k];
                let to = positive[(k + 1) % 4];
                if from && !to {
                    exits.push(k);
                } else if !from && to {
                    entries.push(k);
                }
            }
            let center: CoordF = corners.iter().map(|&n| values[n]).sum::<CoordF>() / 4.0;
            let connect_positive = center > 0.0;
            for &exit in &exits {
                // Entry following the exit counter-clockwise joins the positive
                // corners through the cell; the one before it cuts them apart.
                let entry = if connect_positive {
                    entries.iter().copied().min_by_key(|&e| (e + 4 - exit) % 4)
                } else {
                    entries.iter().copied().min_by_key(|&e| (exit + 4 - e) % 4)
                };
                if let Some(entry) = entry {
                    outgoing[edges[exit]] = segments.len();
                    segments.push((edges[exit], edges[entry]));
                }
            }
        }
    }

    let mut visited = vec![false; segments.len()];
    let mut loops = Vec::new();
    for start in 0..segments.len() {
        if visited[start] {
            continue;
        }
        let mut ring = Vec::new();
        let mut current = start;
        loop {
            visited[current] = true;
            let (from, to) = segments[current];
            ring.push(crossing_on_edge(grid, values, from));
            let next = outgoing[to];
            if next == usize::MAX || next == start || visited[next] {
                break;
            }
            current = next;
        }
        if ring.len() >= 3 {
            loops.push(ring);
        }
    }
    loops
}
