use ndarray::Array2;

use crate::analysis::scoring::P_FLOOR;
use crate::models::{SlopeCell, SlopeSurface, SweepGrid};

/// Dense matrix view of one gene's grid over its sorted offset axes.
/// Rows are start offsets, columns end offsets; missing cells are NaN.
#[derive(Debug)]
pub struct GridView {
    pub srt_offs: Vec<i64>,
    pub end_offs: Vec<i64>,
    pub log2_mi: Array2<f64>,
    pub p_fdr: Array2<f64>,
}

impl GridView {
    pub fn from_grid(grid: &SweepGrid) -> Self {
        let srt_offs = grid.srt_offsets();
        let end_offs = grid.end_offsets();
        let shape = (srt_offs.len(), end_offs.len());
        let mut log2_mi = Array2::from_elem(shape, f64::NAN);
        let mut p_fdr = Array2::from_elem(shape, f64::NAN);

        for (&(s, e), cell) in grid.iter() {
            // Offsets come from the grid itself, so the lookups cannot
            // fail.
            let i = srt_offs.binary_search(&s).unwrap_or(0);
            let j = end_offs.binary_search(&e).unwrap_or(0);
            log2_mi[[i, j]] = cell.log2_mi;
            p_fdr[[i, j]] = cell.p_fdr;
        }
        GridView { srt_offs, end_offs, log2_mi, p_fdr }
    }
}

fn finite(val: f64) -> Option<f64> {
    if val.is_nan() {
        None
    } else {
        Some(val)
    }
}

/// First differences of the enrichment surface along each sweep axis,
/// normalized to "delta log2 MI per 1000 bp", plus the log10 ratio of
/// adjacent corrected p-values. The predecessor is the actual adjacent
/// coordinate in sorted order, not index arithmetic on raw offsets, so
/// ragged sweep edges stay correct.
///
/// Cells on the first coordinate of an axis have no predecessor and
/// keep `None` for that axis, never zero.
pub fn slope_surface(grid: &SweepGrid) -> SlopeSurface {
    let view = GridView::from_grid(grid);
    let kb = grid.step as f64 / 1000.0;

    let mut surface = SlopeSurface::default();
    for (i, &s) in view.srt_offs.iter().enumerate() {
        for (j, &e) in view.end_offs.iter().enumerate() {
            if view.log2_mi[[i, j]].is_nan() {
                continue;
            }
            let mut cell = SlopeCell::default();

            if i > 0 {
                cell.sl_sdir =
                    finite((view.log2_mi[[i, j]] - view.log2_mi[[i - 1, j]]) / kb);
                cell.p_ratio_sdir = finite(
                    (view.p_fdr[[i, j]].max(P_FLOOR)
                        / view.p_fdr[[i - 1, j]].max(P_FLOOR))
                    .log10(),
                );
            }
            if j > 0 {
                cell.sl_edir =
                    finite((view.log2_mi[[i, j]] - view.log2_mi[[i, j - 1]]) / kb);
                cell.p_ratio_edir = finite(
                    (view.p_fdr[[i, j]].max(P_FLOOR)
                        / view.p_fdr[[i, j - 1]].max(P_FLOOR))
                    .log10(),
                );
            }
            surface.cells.insert((s, e), cell);
        }
    }
    surface
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SweepCell;

    fn cell(log2_mi: f64, p_fdr: f64) -> SweepCell {
        SweepCell {
            low_counts: 10,
            high_counts: 10,
            p: p_fdr,
            p_fdr,
            log2_mi,
        }
    }

    fn square_grid() -> SweepGrid {
        let mut grid = SweepGrid::new("GENE", "tx", "tx", 500);
        grid.insert(-500, 0, cell(3.0, 1e-6));
        grid.insert(0, 0, cell(1.0, 1e-3));
        grid.insert(-500, 500, cell(2.0, 1e-4));
        grid.insert(0, 500, cell(-2.0, 1e-2));
        grid
    }

    #[test]
    fn first_coordinate_has_no_slope() {
        let surface = slope_surface(&square_grid());
        let corner = surface.cell(-500, 0).unwrap();
        assert_eq!(corner.sl_sdir, None);
        assert_eq!(corner.sl_edir, None);
        assert_eq!(corner.p_ratio_sdir, None);
        assert_eq!(corner.p_ratio_edir, None);
    }

    #[test]
    fn slopes_are_per_kilobase() {
        let surface = slope_surface(&square_grid());
        // From (-500, 0) at 3.0 to (0, 0) at 1.0 over a 500 bp step:
        // -2.0 per step = -4.0 per kb.
        let at_zero = surface.cell(0, 0).unwrap();
        assert_eq!(at_zero.sl_sdir, Some(-4.0));
        // p_fdr grows from 1e-6 to 1e-3 along the same move.
        assert!((at_zero.p_ratio_sdir.unwrap() - 3.0).abs() < 1e-9);

        let at_end = surface.cell(0, 500).unwrap();
        assert_eq!(at_end.sl_edir, Some(-6.0));
    }

    #[test]
    fn missing_neighbor_leaves_slope_undefined() {
        let mut grid = square_grid();
        grid.insert(500, 500, cell(1.5, 1e-2));
        // (500, 0) does not exist, so (500, 500) has a start-direction
        // predecessor at (0, 500) but no end-direction one... both
        // axes still resolve against sorted coordinates.
        let surface = slope_surface(&grid);
        let cell = surface.cell(500, 500).unwrap();
        assert!(cell.sl_sdir.is_some());
        assert!(cell.sl_edir.is_none());
    }

    #[test]
    fn zero_p_fdr_is_floored_in_ratio() {
        let mut grid = SweepGrid::new("GENE", "tx", "tx", 500);
        grid.insert(0, 0, cell(1.0, 0.0));
        grid.insert(500, 0, cell(2.0, 1e-3));
        let surface = slope_surface(&grid);
        let ratio = surface.cell(500, 0).unwrap().p_ratio_sdir.unwrap();
        assert!(ratio.is_finite());
    }
}
