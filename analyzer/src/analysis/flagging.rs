use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::analysis::slopes::slope_surface;
use crate::models::{Flag, FlagDirection, SlopeSurface, SweepGrid};

/// Significance side of the flagging predicate: either an absolute
/// FDR cutoff, or a cutoff on the log10 ratio of adjacent corrected
/// p-values along the triggering axis.
#[derive(Debug, Clone, Copy)]
pub enum SignificanceFilter {
    Absolute(f64),
    Relative(f64),
}

impl SignificanceFilter {
    fn passes(&self, p_fdr: f64, p_ratio: Option<f64>) -> bool {
        match *self {
            SignificanceFilter::Absolute(p_thr) => p_fdr < p_thr,
            SignificanceFilter::Relative(ratio_thr) => {
                p_ratio.map_or(false, |r| r > ratio_thr)
            }
        }
    }
}

/// Flagged coordinates of one gene, evaluated independently per sweep
/// direction. A cell may appear in one set, both, or neither.
pub fn get_flags_for_gene(
    grid: &SweepGrid,
    surface: &SlopeSurface,
    slope_thr: f64,
    filter: &SignificanceFilter,
) -> (BTreeSet<(i64, i64)>, BTreeSet<(i64, i64)>) {
    let mut start_flags = BTreeSet::new();
    let mut end_flags = BTreeSet::new();

    for (&(s, e), cell) in grid.iter() {
        let Some(slopes) = surface.cell(s, e) else {
            continue;
        };
        if slopes.sl_sdir.map_or(false, |sl| sl > slope_thr)
            && filter.passes(cell.p_fdr, slopes.p_ratio_sdir)
        {
            start_flags.insert((s, e));
        }
        if slopes.sl_edir.map_or(false, |sl| sl > slope_thr)
            && filter.passes(cell.p_fdr, slopes.p_ratio_edir)
        {
            end_flags.insert((s, e));
        }
    }
    (start_flags, end_flags)
}

/// Scan every gene's grid for boundary-sensitive cells. Pure filter:
/// the result does not depend on iteration order over genes or cells.
pub fn flag_by_slope(
    sweeps: &BTreeMap<String, SweepGrid>,
    slope_thr: f64,
    filter: &SignificanceFilter,
) -> Vec<Flag> {
    let mut flags = Vec::new();
    for (gene, grid) in sweeps {
        let surface = slope_surface(grid);
        let (start_flags, end_flags) =
            get_flags_for_gene(grid, &surface, slope_thr, filter);
        if !start_flags.is_empty() || !end_flags.is_empty() {
            debug!(
                gene = %gene,
                start = start_flags.len(),
                end = end_flags.len(),
                "flagged"
            );
        }
        for (srt_off, end_off) in start_flags {
            flags.push(Flag {
                gene_name: gene.clone(),
                srt_off,
                end_off,
                direction: FlagDirection::Start,
            });
        }
        for (srt_off, end_off) in end_flags {
            flags.push(Flag {
                gene_name: gene.clone(),
                srt_off,
                end_off,
                direction: FlagDirection::End,
            });
        }
    }
    flags
}

/// Gene names with at least one flagged cell in either direction.
pub fn get_flagged_genes(flags: &[Flag]) -> BTreeSet<String> {
    flags.iter().map(|f| f.gene_name.clone()).collect()
}
