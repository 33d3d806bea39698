use std::env;
use std::path::Path;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::analysis::binned::{bin_insertions, drop_ins_in_genes, score_bins};
use crate::analysis::flagging::{flag_by_slope, get_flagged_genes, SignificanceFilter};
use crate::analysis::optimize::optimize_flagged_genes;
use crate::analysis::scoring::{score_grid, ScoringOptions};
use crate::data_handling::count_files::read_analyzed_sweep;
use crate::data_handling::insertions::read_insertions;
use crate::data_handling::refseq::read_refseq;
use crate::helper_functions::{
    flag_report_filename, optimized_report_filename, project_root,
};
use crate::models::ScreenParams;
use crate::reports::{
    write_binned_report, write_flag_report, write_optimized_report, write_params_json,
};

mod analysis;
mod data_handling;
mod helper_functions;
mod models;
mod reports;

const SCREEN_NAME: &str = "PDL1_IFNg";

// Flagging and optimization parameters. The screens in the archive
// were analyzed with a range of thresholds over time, so these are
// deliberately plain knobs rather than baked into the analysis code.
const SLOPE_THR: f64 = 1.0;
const P_THR: f64 = 1e-5;
const DELTA_MI_THR: f64 = 0.5;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // `analyzer [screen]` runs the sweep pipeline, `analyzer binned
    // [screen]` the whole-genome binned pass.
    let args: Vec<String> = env::args().collect();
    let binned = args.get(1).map(|a| a == "binned").unwrap_or(false);
    let screen_arg = if binned { args.get(2) } else { args.get(1) };

    let params = ScreenParams {
        screen_name: screen_arg.cloned().unwrap_or_else(|| SCREEN_NAME.to_string()),
        assembly: "hg38".to_string(),
        trim_length: "50".to_string(),
        mode: "collapse".to_string(),
        start: "tx".to_string(),
        end: "tx".to_string(),
        overlap: "both".to_string(),
        direction: "sense".to_string(),
        step: 500,
    };
    let root = project_root();
    if binned {
        return run_binned(&root, &params);
    }

    info!(
        screen = %params.screen_name,
        assembly = %params.assembly,
        step = params.step,
        "starting double-sweep analysis"
    );
    let sweep_data_dir = root.join("data/sweeps-analyzed");
    let flag_data_dir = root.join("data/sweep-flags");

    let mut sweeps = read_analyzed_sweep(&sweep_data_dir, &params)?;

    // Count files normally arrive with upstream-computed statistics;
    // set RESCORE to redo enrichment, p-values and FDR locally from
    // the raw counts.
    if env::var_os("RESCORE").is_some() {
        info!("rescoring grids from raw counts");
        let opts = ScoringOptions::default();
        for grid in sweeps.values_mut() {
            score_grid(grid, &opts)?;
        }
    }

    let flags = flag_by_slope(&sweeps, SLOPE_THR, &SignificanceFilter::Absolute(P_THR));
    let flagged_genes = get_flagged_genes(&flags);
    info!(
        flags = flags.len(),
        genes = flagged_genes.len(),
        "flagging finished"
    );

    let out_dir = params.sweep_path(&flag_data_dir);
    write_params_json(&out_dir, &params)?;
    write_flag_report(&out_dir.join(flag_report_filename(SLOPE_THR, P_THR)), &flags)?;

    let optimized =
        optimize_flagged_genes(&flags, &sweeps, &params.screen_name, DELTA_MI_THR);
    info!(genes = optimized.len(), "optimization finished");
    write_optimized_report(
        &out_dir.join(optimized_report_filename(DELTA_MI_THR)),
        &optimized,
    )?;

    Ok(())
}

/// Gene-agnostic pass: count raw insertions in fixed windows across
/// the genome and score each window against the genome-wide totals.
/// Set MASK_GENES to drop insertions inside annotated genes first.
fn run_binned(root: &Path, params: &ScreenParams) -> Result<()> {
    info!(
        screen = %params.screen_name,
        assembly = %params.assembly,
        step = params.step,
        "starting binned whole-genome analysis"
    );
    let mut insertions = read_insertions(
        &root.join("data/screen-insertions"),
        &params.screen_name,
        &params.assembly,
        &params.trim_length,
    )?;
    if env::var_os("MASK_GENES").is_some() {
        let refseq = read_refseq(
            &root.join(format!("data/genes/ncbi-genes-{}.txt", params.assembly)),
        )?;
        let before = insertions.len();
        insertions = drop_ins_in_genes(insertions, &refseq.gene_spans());
        info!(
            dropped = before - insertions.len(),
            kept = insertions.len(),
            "masked gene-covered insertions"
        );
    }

    let bins = bin_insertions(&insertions, params.step);
    info!(bins = bins.len(), step = params.step, "binned insertions");
    let scored = score_bins(bins, &ScoringOptions::default())?;

    let out_dir = root
        .join("data/binned-mi")
        .join(&params.screen_name)
        .join(&params.assembly)
        .join(&params.trim_length);
    write_binned_report(
        &out_dir.join(format!("binned-mi_step={}.csv", params.step)),
        &scored,
    )?;
    Ok(())
}
