use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use tracing::info;

use crate::models::{AnalyzeError, ScreenParams, SweepCell, SweepGrid};

/// One row of a per-configuration count file as written by the
/// counting tool: tab-separated, no header.
#[derive(Debug, Deserialize)]
struct CountRow {
    gene_name: String,
    low_counts: u64,
    high_counts: u64,
    p: f64,
    p_fdr: f64,
    log2_mi: f64,
}

/// Split a sweep token like `tx-1000` into its symbolic position label
/// and signed offset: `("tx", -1000)`. The label (`tx`, `cds`, ...) is
/// kept for display, the offset becomes the grid coordinate.
pub fn parse_sweep_token(token: &str) -> Result<(String, i64)> {
    let re = Regex::new(r"^([A-Za-z]+)([+-]\d+)$")?;
    let caps = re
        .captures(token)
        .ok_or_else(|| AnalyzeError::BadSweepFilename(token.to_string()))?;
    let offset: i64 = caps[2]
        .parse()
        .map_err(|_| AnalyzeError::BadSweepFilename(token.to_string()))?;
    Ok((caps[1].to_string(), offset))
}

/// Pull the `start=` and `end=` tokens out of a count filename like
/// `out_start=tx-1000_end=tx+500_.txt`.
fn parse_filename(filename: &str) -> Result<((String, i64), (String, i64))> {
    let re = Regex::new(r"start=([^_]+)_.*end=([^_]+)_")?;
    let caps = re
        .captures(filename)
        .ok_or_else(|| AnalyzeError::BadSweepFilename(filename.to_string()))?;
    Ok((parse_sweep_token(&caps[1])?, parse_sweep_token(&caps[2])?))
}

fn read_count_file(
    path: &Path,
    start: &(String, i64),
    end: &(String, i64),
    params: &ScreenParams,
    sweeps: &mut BTreeMap<String, SweepGrid>,
) -> Result<()> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("opening count file {}", path.display()))?;

    for row in reader.deserialize() {
        let row: CountRow = row
            .with_context(|| format!("parsing count file {}", path.display()))?;
        let grid = sweeps.entry(row.gene_name.clone()).or_insert_with(|| {
            SweepGrid::new(&row.gene_name, &start.0, &end.0, params.step)
        });
        grid.insert(
            start.1,
            end.1,
            SweepCell {
                low_counts: row.low_counts,
                high_counts: row.high_counts,
                p: row.p,
                p_fdr: row.p_fdr,
                log2_mi: row.log2_mi,
            },
        );
    }
    Ok(())
}

/// Assemble one sweep's count files into per-gene grids.
///
/// A missing sweep directory is the distinct `SweepNotFound`
/// condition; a count filename that fails the naming contract aborts
/// the whole load, since it means producer and consumer disagree about
/// the layout. A gene absent from one configuration file simply has no
/// cell at that coordinate, which is different from a measured zero.
pub fn read_analyzed_sweep(
    data_dir: &Path,
    params: &ScreenParams,
) -> Result<BTreeMap<String, SweepGrid>> {
    let sweep_path = params.sweep_path(data_dir);
    if !sweep_path.is_dir() {
        return Err(AnalyzeError::SweepNotFound(sweep_path).into());
    }

    let mut sweeps = BTreeMap::new();
    let mut n_files = 0usize;
    for entry in fs::read_dir(&sweep_path)
        .with_context(|| format!("listing sweep directory {}", sweep_path.display()))?
    {
        let entry = entry?;
        let filename = entry.file_name().to_string_lossy().into_owned();
        // The counting tool leaves `counts_*` stderr captures next to
        // the `out_*` result files.
        if !filename.starts_with("out") {
            continue;
        }
        let (start, end) = parse_filename(&filename)?;
        read_count_file(&entry.path(), &start, &end, params, &mut sweeps)?;
        n_files += 1;
    }

    info!(
        screen = %params.screen_name,
        files = n_files,
        genes = sweeps.len(),
        "assembled sweep grids"
    );
    Ok(sweeps)
}

/// Keyed, invalidatable cache of loaded sweeps so interactive callers
/// can switch between screens without re-reading hundreds of files.
/// The key is the sweep directory derived from the parameters.
#[derive(Default)]
pub struct SweepCache {
    loaded: HashMap<String, BTreeMap<String, SweepGrid>>,
}

impl SweepCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(data_dir: &Path, params: &ScreenParams) -> String {
        params.sweep_path(data_dir).to_string_lossy().into_owned()
    }

    pub fn get_or_load(
        &mut self,
        data_dir: &Path,
        params: &ScreenParams,
    ) -> Result<&BTreeMap<String, SweepGrid>> {
        let key = Self::key(data_dir, params);
        if !self.loaded.contains_key(&key) {
            let sweeps = read_analyzed_sweep(data_dir, params)?;
            self.loaded.insert(key.clone(), sweeps);
        }
        Ok(&self.loaded[&key])
    }

    pub fn invalidate(&mut self, data_dir: &Path, params: &ScreenParams) {
        self.loaded.remove(&Self::key(data_dir, params));
    }
}
