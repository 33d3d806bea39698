use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Parameters identifying one analyzed sweep on disk. The directory
/// layout built from these is the cache key for all derived data:
/// re-running with the same parameters must hit the same files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenParams {
    pub screen_name: String,
    pub assembly: String,
    pub trim_length: String,
    pub mode: String,
    pub start: String,
    pub end: String,
    pub overlap: String,
    pub direction: String,
    /// Sweep step size in bp.
    pub step: i64,
}

impl ScreenParams {
    /// Directory holding the per-configuration count files of a double
    /// sweep, e.g.
    /// `{data_dir}/PDL1_IFNg/hg38/50/mode=collapse_direction=sense_overlap=both/double-sweep_step=500/`.
    pub fn sweep_path(&self, data_dir: &Path) -> PathBuf {
        data_dir
            .join(&self.screen_name)
            .join(&self.assembly)
            .join(&self.trim_length)
            .join(format!(
                "mode={}_direction={}_overlap={}",
                self.mode, self.direction, self.overlap
            ))
            .join(format!("double-sweep_step={}", self.step))
    }
}

/// One scored grid cell: raw channel counts plus the derived
/// enrichment statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepCell {
    pub low_counts: u64,
    pub high_counts: u64,
    pub p: f64,
    pub p_fdr: f64,
    pub log2_mi: f64,
}

/// One gene's double-sweep table, keyed by (start offset, end offset)
/// in bp relative to the transcript boundaries.
///
/// A missing key means the counting tool produced no row for this gene
/// at that configuration, which is distinct from a measured count of
/// zero.
#[derive(Debug, Clone)]
pub struct SweepGrid {
    pub gene: String,
    /// Symbolic position label the start offsets are relative to
    /// (`tx`, `cds`, ...), kept for display.
    pub start_label: String,
    pub end_label: String,
    /// Sweep step size in bp.
    pub step: i64,
    cells: BTreeMap<(i64, i64), SweepCell>,
}

impl SweepGrid {
    pub fn new(gene: &str, start_label: &str, end_label: &str, step: i64) -> Self {
        SweepGrid {
            gene: gene.to_string(),
            start_label: start_label.to_string(),
            end_label: end_label.to_string(),
            step,
            cells: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, srt_off: i64, end_off: i64, cell: SweepCell) {
        self.cells.insert((srt_off, end_off), cell);
    }

    pub fn cell(&self, srt_off: i64, end_off: i64) -> Option<&SweepCell> {
        self.cells.get(&(srt_off, end_off))
    }

    /// The unmodified transcript-boundary configuration.
    pub fn baseline(&self) -> Option<&SweepCell> {
        self.cell(0, 0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(i64, i64), &SweepCell)> {
        self.cells.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&(i64, i64), &mut SweepCell)> {
        self.cells.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Sorted distinct start offsets present in the grid.
    pub fn srt_offsets(&self) -> Vec<i64> {
        let mut offs: Vec<i64> = self.cells.keys().map(|&(s, _)| s).collect();
        offs.sort_unstable();
        offs.dedup();
        offs
    }

    /// Sorted distinct end offsets present in the grid.
    pub fn end_offsets(&self) -> Vec<i64> {
        let mut offs: Vec<i64> = self.cells.keys().map(|&(_, e)| e).collect();
        offs.sort_unstable();
        offs.dedup();
        offs
    }
}

/// Per-cell first differences of the enrichment surface. `None` marks
/// the first coordinate along an axis (no predecessor) or a difference
/// against a missing cell.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SlopeCell {
    /// Delta log2 MI per 1000 bp when moving the start boundary.
    pub sl_sdir: Option<f64>,
    /// Delta log2 MI per 1000 bp when moving the end boundary.
    pub sl_edir: Option<f64>,
    /// log10 ratio of adjacent corrected p-values, start direction.
    pub p_ratio_sdir: Option<f64>,
    /// log10 ratio of adjacent corrected p-values, end direction.
    pub p_ratio_edir: Option<f64>,
}

/// Slope surface of one gene's sweep, same coordinates as the grid.
#[derive(Debug, Clone, Default)]
pub struct SlopeSurface {
    pub cells: BTreeMap<(i64, i64), SlopeCell>,
}

impl SlopeSurface {
    pub fn cell(&self, srt_off: i64, end_off: i64) -> Option<&SlopeCell> {
        self.cells.get(&(srt_off, end_off))
    }
}

/// Which sweep axis triggered a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagDirection {
    Start,
    End,
}

impl std::fmt::Display for FlagDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlagDirection::Start => write!(f, "start"),
            FlagDirection::End => write!(f, "end"),
        }
    }
}

/// One grid cell that crossed the slope and significance thresholds.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Flag {
    pub gene_name: String,
    pub srt_off: i64,
    pub end_off: i64,
    pub direction: FlagDirection,
}

/// Best configuration found for a flagged gene, next to the values at
/// the unmodified transcript boundaries so reports can show deltas.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizedResult {
    pub gene_name: String,
    pub screen: String,
    pub mi_at_tx: f64,
    pub p_at_tx: f64,
    pub p_fdr_at_tx: f64,
    pub low_at_tx: u64,
    pub high_at_tx: u64,
    pub mi_opt: f64,
    pub p_opt: f64,
    pub p_fdr_opt: f64,
    pub low_opt: u64,
    pub high_opt: u64,
    pub srt_off_opt: i64,
    pub end_off_opt: i64,
    pub delta_log2_mi: f64,
    pub delta_log10_p: f64,
}

/// Failure conditions callers are expected to tell apart, e.g. an
/// interactive front end showing "no data for these parameters"
/// instead of crashing.
#[derive(Debug, thiserror::Error)]
pub enum AnalyzeError {
    #[error("no sweep data found at {0}")]
    SweepNotFound(PathBuf),
    #[error("sweep filename {0:?} does not match the start=<pos><sign><offset> naming contract")]
    BadSweepFilename(String),
    #[error("output file {0} already exists, delete or rename to continue")]
    ReportExists(PathBuf),
}
